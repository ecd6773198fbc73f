//! Post-load validation: source CSV row counts vs warehouse row counts.
//!
//! Validation is a reporting step. Mismatches are collected per table and
//! surfaced to the operator, they never abort the remaining tables. Tables
//! on the skip list (known-unreliable schema discovery) are reported as
//! skipped rather than silently dropped.

use std::{
    collections::BTreeSet,
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{info, warn};

use crate::upload;
use crate::warehouse::{TableRowCount, WarehouseError};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("failed to list source files: {0}")]
    ListSources(#[from] upload::UploadError),

    #[error("file name {0} cannot be mapped to a table name")]
    UnmappableFile(PathBuf),

    #[error("failed to read source file {path}: {source}")]
    Source {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
}

/// Outcome of validating one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableValidation {
    Match {
        table: String,
        rows: u64,
    },
    Mismatch {
        table: String,
        source_rows: u64,
        warehouse_rows: u64,
    },
    Skipped {
        table: String,
    },
}

impl TableValidation {
    pub fn table(&self) -> &str {
        match self {
            TableValidation::Match { table, .. }
            | TableValidation::Mismatch { table, .. }
            | TableValidation::Skipped { table } => table,
        }
    }
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub results: Vec<TableValidation>,
}

impl ValidationReport {
    pub fn has_mismatches(&self) -> bool {
        self.results
            .iter()
            .any(|result| matches!(result, TableValidation::Mismatch { .. }))
    }
}

/// One table scheduled for validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTable {
    pub table: String,
    pub source: PathBuf,
    pub skipped: bool,
}

/// Map every CSV under `dir` to its warehouse table, marking skip-listed
/// tables. Skip list entries are matched after the same normalization the
/// catalog applies to table names.
pub fn build_plan(
    dir: &Path,
    skip_tables: &BTreeSet<String>,
) -> Result<Vec<PlannedTable>, ValidationError> {
    let skip: BTreeSet<String> = skip_tables.iter().map(|name| sanitize(name)).collect();

    upload::csv_files(dir)?
        .into_iter()
        .map(|source| {
            let table = table_name_for(&source)
                .ok_or_else(|| ValidationError::UnmappableFile(source.clone()))?;
            let skipped = skip.contains(&table);

            Ok(PlannedTable {
                table,
                source,
                skipped,
            })
        })
        .collect()
}

/// Warehouse table name for a source file, normalized the way the catalog
/// names discovered tables.
pub fn table_name_for(file: &Path) -> Option<String> {
    let stem = file.file_stem()?.to_str()?;
    Some(sanitize(stem))
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Count the data rows in a CSV file, excluding the header and trailing
/// blank lines.
pub fn count_source_rows(path: &Path) -> Result<u64, ValidationError> {
    let file = File::open(path).map_err(|source| ValidationError::Source {
        path: path.to_path_buf(),
        source,
    })?;

    let mut rows = 0u64;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| ValidationError::Source {
            path: path.to_path_buf(),
            source,
        })?;

        if index == 0 || line.trim().is_empty() {
            continue;
        }

        rows += 1;
    }

    Ok(rows)
}

/// Compare source and warehouse row counts for every planned table.
pub async fn validate_tables(
    plan: &[PlannedTable],
    warehouse: &impl TableRowCount,
) -> Result<ValidationReport, ValidationError> {
    let mut report = ValidationReport::default();

    for planned in plan {
        if planned.skipped {
            info!(table = %planned.table, "skipping validation, schema discovery is unreliable");
            report.results.push(TableValidation::Skipped {
                table: planned.table.clone(),
            });
            continue;
        }

        let source_rows = count_source_rows(&planned.source)?;
        let warehouse_rows = warehouse.table_row_count(&planned.table).await?;

        if source_rows == warehouse_rows {
            info!(table = %planned.table, rows = source_rows, "row counts match");
            report.results.push(TableValidation::Match {
                table: planned.table.clone(),
                rows: source_rows,
            });
        } else {
            warn!(
                table = %planned.table,
                source_rows,
                warehouse_rows,
                "row counts do not match"
            );
            report.results.push(TableValidation::Mismatch {
                table: planned.table.clone(),
                source_rows,
                warehouse_rows,
            });
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    #[rstest]
    #[case("Country_Table.csv", "country_table")]
    #[case("Sales.csv", "sales")]
    #[case("FX-Table.csv", "fx_table")]
    #[case("costs.csv", "costs")]
    fn table_names_follow_catalog_normalization(#[case] file: &str, #[case] expected: &str) {
        assert_eq!(table_name_for(Path::new(file)).unwrap(), expected);
    }

    #[test]
    fn header_only_file_has_zero_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.csv");
        fs::write(&path, "id,name\n").unwrap();

        assert_eq!(count_source_rows(&path).unwrap(), 0);
    }

    #[test]
    fn trailing_blank_lines_are_not_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.csv");
        fs::write(&path, "id,name\n1,a\n2,b\n\n").unwrap();

        assert_eq!(count_source_rows(&path).unwrap(), 2);
    }

    #[test]
    fn plan_marks_skip_listed_tables() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Country_Table.csv"), "a,b\n1,2\n").unwrap();
        fs::write(dir.path().join("Sales.csv"), "a,b\n1,2\n").unwrap();

        // Skip list entries use the raw file stem, matching happens on the
        // normalized table name.
        let skip = BTreeSet::from(["Country_Table".to_string()]);
        let plan = build_plan(dir.path(), &skip).unwrap();

        assert_eq!(plan.len(), 2);
        let country = plan.iter().find(|p| p.table == "country_table").unwrap();
        let sales = plan.iter().find(|p| p.table == "sales").unwrap();

        assert!(country.skipped);
        assert!(!sales.skipped);
    }
}
