//! Uploads the local CSV files into the landing bucket.
//!
//! One prefix per file stem (`Sales.csv` → `Sales/Sales.csv`) so the crawler
//! discovers one table per folder. Re-uploading overwrites the previous
//! objects, which makes re-runs idempotent.

use std::{
    io,
    path::{Path, PathBuf},
};

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use thiserror::Error;
use tracing::{info, warn};

/// Key prefix for the Glue ETL script
const SCRIPT_PREFIX: &str = "scripts";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to read data directory {path}: {source}")]
    ListDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no csv files found under {0}")]
    Empty(PathBuf),

    #[error("file name {0} cannot be mapped to an object key")]
    UnmappableFile(PathBuf),

    #[error("failed to upload {key}: {reason}")]
    Transfer { key: String, reason: String },

    #[error("{failed} of {total} uploads failed")]
    Incomplete { failed: usize, total: usize },
}

#[derive(Debug, Clone)]
pub struct UploadedObject {
    pub file: PathBuf,
    pub key: String,
}

#[derive(Debug)]
pub struct FailedUpload {
    pub file: PathBuf,
    pub error: UploadError,
}

/// Per-file outcome of an upload sweep. Failures never roll back objects
/// that were already written.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub uploaded: Vec<UploadedObject>,
    pub failed: Vec<FailedUpload>,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.uploaded.len() + self.failed.len()
    }
}

/// Upload every CSV file under `dir` into `bucket`, attempting the remaining
/// files when one fails.
pub async fn upload_data_dir(
    client: &Client,
    bucket: &str,
    dir: &Path,
) -> Result<UploadReport, UploadError> {
    let files = csv_files(dir)?;
    let mut report = UploadReport::default();

    for file in files {
        let key = match object_key(&file) {
            Some(key) => key,
            None => {
                report.failed.push(FailedUpload {
                    error: UploadError::UnmappableFile(file.clone()),
                    file,
                });
                continue;
            }
        };

        match put_file(client, bucket, &key, &file).await {
            Ok(()) => {
                info!(bucket, key = %key, "uploaded {}", file.display());
                report.uploaded.push(UploadedObject { file, key });
            }
            Err(error) => {
                warn!(bucket, key = %key, "upload failed: {error}");
                report.failed.push(FailedUpload { file, error });
            }
        }
    }

    Ok(report)
}

/// Upload the Glue ETL script next to the data so the provisioned job
/// definition can reference it. Returns the object key.
pub async fn upload_etl_script(
    client: &Client,
    bucket: &str,
    script: &Path,
) -> Result<String, UploadError> {
    let file_name = script
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| UploadError::UnmappableFile(script.to_path_buf()))?;

    let key = format!("{SCRIPT_PREFIX}/{file_name}");
    put_file(client, bucket, &key, script).await?;
    info!(bucket, key = %key, "uploaded etl script");

    Ok(key)
}

async fn put_file(
    client: &Client,
    bucket: &str,
    key: &str,
    file: &Path,
) -> Result<(), UploadError> {
    let body = ByteStream::from_path(file)
        .await
        .map_err(|err| UploadError::Transfer {
            key: key.to_string(),
            reason: err.to_string(),
        })?;

    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .body(body)
        .send()
        .await
        .map_err(|err| UploadError::Transfer {
            key: key.to_string(),
            reason: aws_sdk_s3::Error::from(err).to_string(),
        })?;

    Ok(())
}

/// List the CSV files directly under `dir`, sorted for a deterministic
/// upload order.
pub fn csv_files(dir: &Path) -> Result<Vec<PathBuf>, UploadError> {
    let entries = std::fs::read_dir(dir).map_err(|source| UploadError::ListDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| UploadError::ListDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = entry.path();
        if path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(UploadError::Empty(dir.to_path_buf()));
    }

    files.sort();
    Ok(files)
}

/// Object key for a data file: `<stem>/<file_name>`
pub fn object_key(file: &Path) -> Option<String> {
    let stem = file.file_stem()?.to_str()?;
    let name = file.file_name()?.to_str()?;

    Some(format!("{stem}/{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn key_uses_one_prefix_per_table() {
        assert_eq!(
            object_key(Path::new("/data/Sales.csv")).unwrap(),
            "Sales/Sales.csv"
        );
        assert_eq!(
            object_key(Path::new("Country_Table.csv")).unwrap(),
            "Country_Table/Country_Table.csv"
        );
    }

    #[test]
    fn lists_only_csv_files_sorted() {
        let dir = TempDir::new().unwrap();
        for name in ["b.csv", "a.CSV", "notes.txt", "c.parquet"] {
            let mut file = File::create(dir.path().join(name)).unwrap();
            writeln!(file, "col").unwrap();
        }

        let files = csv_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|path| path.file_name().unwrap().to_str().unwrap())
            .collect();

        assert_eq!(names, vec!["a.CSV", "b.csv"]);
    }

    #[test]
    fn empty_directory_is_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(csv_files(dir.path()), Err(UploadError::Empty(_))));
    }

    #[test]
    fn report_tracks_completion() {
        let mut report = UploadReport::default();
        assert!(report.is_complete());

        report.uploaded.push(UploadedObject {
            file: PathBuf::from("Sales.csv"),
            key: "Sales/Sales.csv".to_string(),
        });
        report.failed.push(FailedUpload {
            file: PathBuf::from("Costs.csv"),
            error: UploadError::Transfer {
                key: "Costs/Costs.csv".to_string(),
                reason: "access denied".to_string(),
            },
        });

        assert!(!report.is_complete());
        assert_eq!(report.total(), 2);
    }
}
