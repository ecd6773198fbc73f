//! Service client construction.
//!
//! All clients share one SDK configuration built from the static credentials
//! and region in the pipeline configuration.

use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;

use crate::config::AwsSettings;

/// Handles to every AWS service the pipeline touches
#[derive(Debug, Clone)]
pub struct AwsClients {
    pub cloudformation: aws_sdk_cloudformation::Client,
    pub glue: aws_sdk_glue::Client,
    pub s3: aws_sdk_s3::Client,
    pub secrets: aws_sdk_secretsmanager::Client,
}

impl AwsClients {
    pub async fn from_settings(settings: &AwsSettings) -> Self {
        let credentials = Credentials::new(
            settings.access_key_id.clone(),
            settings.secret_access_key.clone(),
            None,
            None,
            "pipeline-environment",
        );

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        Self {
            cloudformation: aws_sdk_cloudformation::Client::new(&shared),
            glue: aws_sdk_glue::Client::new(&shared),
            s3: aws_sdk_s3::Client::new(&shared),
            secrets: aws_sdk_secretsmanager::Client::new(&shared),
        }
    }
}
