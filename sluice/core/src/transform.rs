//! Runs the Glue ETL job that loads the cataloged tables into the warehouse.
//!
//! The job itself owns the column mappings and table DDL; this stage only
//! starts it by name and waits for the run to terminate. Tables written
//! before a failure stay written — recovery is a full pipeline re-run.

use aws_sdk_glue::types::{JobRun, JobRunState};
use aws_sdk_glue::Client;
use thiserror::Error;
use tracing::info;

use crate::poll::Poller;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    Api(#[from] aws_sdk_glue::Error),

    #[error("glue returned no run id for job {0}")]
    NoRunId(String),

    #[error("job {job} run {run_id} ended in state {state}: {message}")]
    Failed {
        job: String,
        run_id: String,
        state: String,
        message: String,
    },

    #[error("job {job} run {run_id} did not finish after {attempts} status checks")]
    Timeout {
        job: String,
        run_id: String,
        attempts: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RunCheck {
    Pending,
    Succeeded,
    Failed { state: String, message: String },
}

/// Start the configured ETL job and block until the run is terminal,
/// returning the run id.
pub async fn run_etl_job(
    client: &Client,
    job: &str,
    poller: &Poller,
) -> Result<String, TransformError> {
    let started = client
        .start_job_run()
        .job_name(job)
        .send()
        .await
        .map_err(aws_sdk_glue::Error::from)?;

    let run_id = started
        .job_run_id()
        .ok_or_else(|| TransformError::NoRunId(job.to_string()))?
        .to_string();

    info!(job, run_id = %run_id, "etl job started");

    poller
        .wait_for(&format!("job {job} run {run_id}"), || {
            let client = client.clone();
            let job = job.to_string();
            let run_id = run_id.clone();

            async move {
                let output = client
                    .get_job_run()
                    .job_name(&job)
                    .run_id(&run_id)
                    .send()
                    .await
                    .map_err(aws_sdk_glue::Error::from)?;

                match output.job_run().map(check).unwrap_or(RunCheck::Pending) {
                    RunCheck::Pending => Ok(None),
                    RunCheck::Succeeded => Ok(Some(())),
                    RunCheck::Failed { state, message } => Err(TransformError::Failed {
                        job,
                        run_id,
                        state,
                        message,
                    }),
                }
            }
        })
        .await
        .map_err(|err| {
            err.or_timeout(|attempts| TransformError::Timeout {
                job: job.to_string(),
                run_id: run_id.clone(),
                attempts,
            })
        })?;

    info!(job, run_id = %run_id, "etl job succeeded");
    Ok(run_id)
}

fn check(run: &JobRun) -> RunCheck {
    match run.job_run_state() {
        Some(JobRunState::Succeeded) => RunCheck::Succeeded,
        Some(
            state @ (JobRunState::Failed
            | JobRunState::Stopped
            | JobRunState::Stopping
            | JobRunState::Timeout
            | JobRunState::Error
            | JobRunState::Expired),
        ) => {
            // STOPPING only ever precedes STOPPED, treat both as cancelled
            RunCheck::Failed {
                state: state.as_str().to_string(),
                message: run
                    .error_message()
                    .unwrap_or("no error message reported")
                    .to_string(),
            }
        }
        _ => RunCheck::Pending,
    }
}
