//! Orchestration for the sluice data pipeline.
//!
//! The pipeline is a strictly sequential chain: provision the CloudFormation
//! stack, upload the local CSV files, run the Glue crawler, run the Glue ETL
//! job into Redshift and validate per-table row counts. Every stage must
//! reach terminal success before the next one starts; the first failure
//! aborts the rest of the chain.

use std::time::Instant;

use tracing::{info, instrument, warn};

pub mod clients;
pub mod config;
pub mod crawl;
pub mod error;
pub mod poll;
pub mod stack;
pub mod transform;
pub mod upload;
pub mod validate;
pub mod warehouse;

pub use error::{Error, Result};

/// Prelude to import all relevant models and functions
pub mod prelude {
    pub use super::clients::AwsClients;
    pub use super::config::{ConfigError, PipelineConfig};
    pub use super::stack::StackOutputs;
    pub use super::upload::UploadReport;
    pub use super::validate::{TableValidation, ValidationReport};

    pub use super::{run_pipeline, PipelineReport};
}

use clients::AwsClients;
use config::PipelineConfig;
use poll::Poller;
use stack::StackOutputs;
use upload::{UploadError, UploadReport};
use validate::{ValidationError, ValidationReport};

/// Everything a completed pipeline run produced
#[derive(Debug)]
pub struct PipelineReport {
    pub stack: StackOutputs,
    pub uploads: UploadReport,
    pub etl_run_id: String,
    pub validation: ValidationReport,
}

/// Execute the full pipeline: provision, upload, crawl, transform, validate
#[instrument(skip_all, err)]
pub async fn run_pipeline(config: &PipelineConfig, clients: &AwsClients) -> Result<PipelineReport> {
    let poller = Poller::from(config.poll);
    let start_time = Instant::now();

    info!("Running pipeline ...");

    let time = Instant::now();
    let outputs = stack::ensure_stack(&clients.cloudformation, config, &poller).await?;
    info!("Provisioned stack ... Elapsed time: {:.2?}", time.elapsed());

    let time = Instant::now();
    upload::upload_etl_script(&clients.s3, &outputs.bucket, &config.etl_script_path).await?;
    let uploads = upload::upload_data_dir(&clients.s3, &outputs.bucket, &config.data_dir).await?;

    if !uploads.is_complete() {
        // Objects that made it stay in the bucket, recovery is a re-run
        return Err(UploadError::Incomplete {
            failed: uploads.failed.len(),
            total: uploads.total(),
        }
        .into());
    }

    info!(
        "Uploaded {} files ... Elapsed time: {:.2?}",
        uploads.uploaded.len(),
        time.elapsed()
    );

    let time = Instant::now();
    crawl::run_crawler(&clients.glue, &outputs.crawler, &poller).await?;
    info!("Crawled data ... Elapsed time: {:.2?}", time.elapsed());

    let time = Instant::now();
    let etl_run_id = transform::run_etl_job(&clients.glue, &config.job_name, &poller).await?;
    info!("Transformed data ... Elapsed time: {:.2?}", time.elapsed());

    let time = Instant::now();
    let validation = validate_warehouse(config, clients).await?;
    info!("Validated tables ... Elapsed time: {:.2?}", time.elapsed());

    if validation.has_mismatches() {
        warn!("Row counts do not match for every table, see the validation report");
    }

    info!(
        "Finished processing pipeline ... Total time: {:.2?}",
        start_time.elapsed()
    );

    Ok(PipelineReport {
        stack: outputs,
        uploads,
        etl_run_id,
        validation,
    })
}

async fn validate_warehouse(
    config: &PipelineConfig,
    clients: &AwsClients,
) -> Result<ValidationReport> {
    let plan = validate::build_plan(&config.data_dir, &config.validation.skip_tables)?;

    let params = warehouse::resolve_params(&config.warehouse, &clients.secrets)
        .await
        .map_err(ValidationError::from)?;
    let warehouse = warehouse::Warehouse::connect(&params)
        .await
        .map_err(ValidationError::from)?;

    Ok(validate::validate_tables(&plan, &warehouse).await?)
}
