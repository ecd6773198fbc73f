//! CloudFormation stack provisioning.
//!
//! The stack owns every cloud resource the pipeline needs: the landing
//! bucket, the Glue database/crawler/job, their IAM roles and the Redshift
//! cluster and connection. Provisioning is idempotent — an existing healthy
//! stack is reused as-is, a half-created one is awaited, and a failed or
//! rolled-back one is surfaced for manual intervention rather than deleted.

use std::{io, path::PathBuf};

use aws_sdk_cloudformation::error::ProvideErrorMetadata;
use aws_sdk_cloudformation::operation::describe_stacks::DescribeStacksError;
use aws_sdk_cloudformation::types::{Capability, Output, Stack, StackStatus};
use aws_sdk_cloudformation::Client;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::poll::Poller;

/// Stack output key holding the generated bucket name
const BUCKET_OUTPUT_KEY: &str = "GeneratedBucketName";
/// Stack output key holding the generated crawler name
const CRAWLER_OUTPUT_KEY: &str = "GeneratedCrawler";

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("failed to read template {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Api(#[from] aws_sdk_cloudformation::Error),

    #[error("stack {stack} is in state {status} and needs manual intervention")]
    Unusable { stack: String, status: String },

    #[error("stack {stack} has no output named {key}")]
    MissingOutput { stack: String, key: String },

    #[error("stack {stack} did not reach a terminal state after {attempts} status checks")]
    Timeout { stack: String, attempts: u32 },
}

/// Resource names resolved from the stack outputs
#[derive(Debug, Clone)]
pub struct StackOutputs {
    pub bucket: String,
    pub crawler: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum StackHealth {
    /// Terminal success, resources are usable
    Available,
    /// A create or update is still running
    InProgress,
    /// Terminal failure (create failed, rollback), carries the status name
    Failed(String),
}

/// Ensure the configured stack exists and is usable, returning the resource
/// names from its outputs.
pub async fn ensure_stack(
    client: &Client,
    config: &PipelineConfig,
    poller: &Poller,
) -> Result<StackOutputs, ProvisionError> {
    let name = config.stack_name.as_str();

    let template =
        std::fs::read_to_string(&config.template_path).map_err(|source| ProvisionError::Template {
            path: config.template_path.clone(),
            source,
        })?;

    client
        .validate_template()
        .template_body(&template)
        .send()
        .await
        .map_err(aws_sdk_cloudformation::Error::from)?;
    debug!(stack = name, "template validated");

    let stack = match describe(client, name).await? {
        Some(existing) => match health(&existing) {
            StackHealth::Available => {
                info!(stack = name, "stack already exists, skipping create");
                existing
            }
            StackHealth::InProgress => {
                info!(stack = name, "stack operation already in flight, waiting");
                await_terminal(client, name, poller).await?
            }
            StackHealth::Failed(status) => {
                return Err(ProvisionError::Unusable {
                    stack: name.to_string(),
                    status,
                })
            }
        },
        None => {
            info!(stack = name, "creating stack");
            client
                .create_stack()
                .stack_name(name)
                .template_body(&template)
                .capabilities(Capability::CapabilityIam)
                .send()
                .await
                .map_err(aws_sdk_cloudformation::Error::from)?;

            await_terminal(client, name, poller).await?
        }
    };

    let outputs = StackOutputs {
        bucket: output_value(&stack, name, BUCKET_OUTPUT_KEY)?,
        crawler: output_value(&stack, name, CRAWLER_OUTPUT_KEY)?,
    };

    info!(
        stack = name,
        bucket = %outputs.bucket,
        crawler = %outputs.crawler,
        "stack is available"
    );

    Ok(outputs)
}

/// Describe the stack, mapping the "does not exist" service error to `None`
async fn describe(client: &Client, name: &str) -> Result<Option<Stack>, ProvisionError> {
    match client.describe_stacks().stack_name(name).send().await {
        Ok(output) => Ok(output.stacks().first().cloned()),
        Err(err) => {
            let service_err = err.into_service_error();
            if stack_missing(&service_err) {
                Ok(None)
            } else {
                Err(aws_sdk_cloudformation::Error::from(service_err).into())
            }
        }
    }
}

// CloudFormation reports a missing stack as a plain validation error, there
// is no typed variant to match on.
fn stack_missing(err: &DescribeStacksError) -> bool {
    err.meta()
        .message()
        .is_some_and(|message| message.contains("does not exist"))
}

async fn await_terminal(
    client: &Client,
    name: &str,
    poller: &Poller,
) -> Result<Stack, ProvisionError> {
    poller
        .wait_for(&format!("stack {name}"), || {
            let client = client.clone();
            let name = name.to_string();

            async move {
                let stack =
                    describe(&client, &name)
                        .await?
                        .ok_or_else(|| ProvisionError::Unusable {
                            stack: name.clone(),
                            status: "DELETED".to_string(),
                        })?;

                match health(&stack) {
                    StackHealth::Available => Ok(Some(stack)),
                    StackHealth::InProgress => Ok(None),
                    StackHealth::Failed(status) => Err(ProvisionError::Unusable {
                        stack: name.clone(),
                        status,
                    }),
                }
            }
        })
        .await
        .map_err(|err| {
            err.or_timeout(|attempts| ProvisionError::Timeout {
                stack: name.to_string(),
                attempts,
            })
        })
}

fn health(stack: &Stack) -> StackHealth {
    match stack.stack_status() {
        Some(status) => classify(status),
        None => StackHealth::Failed("UNKNOWN".to_string()),
    }
}

fn classify(status: &StackStatus) -> StackHealth {
    match status {
        StackStatus::CreateComplete | StackStatus::UpdateComplete => StackHealth::Available,
        StackStatus::CreateInProgress
        | StackStatus::ReviewInProgress
        | StackStatus::RollbackInProgress
        | StackStatus::UpdateInProgress
        | StackStatus::UpdateCompleteCleanupInProgress => StackHealth::InProgress,
        other => StackHealth::Failed(other.as_str().to_string()),
    }
}

fn output_value(stack: &Stack, name: &str, key: &str) -> Result<String, ProvisionError> {
    find_output(stack.outputs(), key)
        .map(str::to_string)
        .ok_or_else(|| ProvisionError::MissingOutput {
            stack: name.to_string(),
            key: key.to_string(),
        })
}

fn find_output<'a>(outputs: &'a [Output], key: &str) -> Option<&'a str> {
    outputs
        .iter()
        .find(|output| output.output_key() == Some(key))
        .and_then(|output| output.output_value())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_states_are_available() {
        assert_eq!(classify(&StackStatus::CreateComplete), StackHealth::Available);
        assert_eq!(classify(&StackStatus::UpdateComplete), StackHealth::Available);
    }

    #[test]
    fn running_operations_keep_polling() {
        assert_eq!(
            classify(&StackStatus::CreateInProgress),
            StackHealth::InProgress
        );
        assert_eq!(
            classify(&StackStatus::RollbackInProgress),
            StackHealth::InProgress
        );
    }

    #[test]
    fn rollback_and_failure_are_terminal() {
        assert_eq!(
            classify(&StackStatus::CreateFailed),
            StackHealth::Failed("CREATE_FAILED".to_string())
        );
        assert_eq!(
            classify(&StackStatus::RollbackComplete),
            StackHealth::Failed("ROLLBACK_COMPLETE".to_string())
        );
    }

    #[test]
    fn outputs_resolve_by_key() {
        let outputs = vec![
            Output::builder()
                .output_key(BUCKET_OUTPUT_KEY)
                .output_value("sluice-landing-bucket")
                .build(),
            Output::builder()
                .output_key(CRAWLER_OUTPUT_KEY)
                .output_value("sluice-crawler")
                .build(),
        ];

        assert_eq!(
            find_output(&outputs, BUCKET_OUTPUT_KEY),
            Some("sluice-landing-bucket")
        );
        assert_eq!(find_output(&outputs, CRAWLER_OUTPUT_KEY), Some("sluice-crawler"));
        assert_eq!(find_output(&outputs, "SomethingElse"), None);
    }

    #[test]
    fn missing_output_is_none() {
        assert_eq!(find_output(&[], BUCKET_OUTPUT_KEY), None);
    }
}
