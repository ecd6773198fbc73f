//! Pipeline configuration resolved from the process environment.
//!
//! Every setting is read once at startup into an immutable [`PipelineConfig`]
//! that is passed to the stages explicitly; stage code never reaches into the
//! environment on its own.

use std::{collections::BTreeSet, path::PathBuf, time::Duration};

use thiserror::Error;

pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const AWS_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
pub const DATA_PATH: &str = "DATA_PATH";
pub const CLOUDFORMATION_TEMPLATE_PATH: &str = "CLOUDFORMATION_TEMPLATE_PATH";
pub const STACK_NAME: &str = "STACK_NAME";
pub const GLUE_JOB_NAME: &str = "GLUE_JOB_NAME";
pub const ETL_SCRIPT_PATH: &str = "ETL_SCRIPT_PATH";
pub const REDSHIFT_SECRET_NAME: &str = "REDSHIFT_SECRET_NAME";
pub const REDSHIFT_HOST: &str = "REDSHIFT_HOST";
pub const REDSHIFT_PORT: &str = "REDSHIFT_PORT";
pub const REDSHIFT_DATABASE: &str = "REDSHIFT_DATABASE";
pub const REDSHIFT_USER: &str = "REDSHIFT_USER";
pub const REDSHIFT_PASSWORD: &str = "REDSHIFT_PASSWORD";
pub const REDSHIFT_ENGINE: &str = "REDSHIFT_ENGINE";
pub const POLL_INTERVAL_SECS: &str = "POLL_INTERVAL_SECS";
pub const POLL_MAX_ATTEMPTS: &str = "POLL_MAX_ATTEMPTS";
pub const VALIDATION_SKIP_TABLES: &str = "VALIDATION_SKIP_TABLES";
pub const VALIDATION_FAIL_ON_MISMATCH: &str = "VALIDATION_FAIL_ON_MISMATCH";

const DEFAULT_ENGINE: &str = "redshift";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 360;

/// Errors raised while resolving the pipeline configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Static AWS credentials and region used for every service client
#[derive(Debug, Clone)]
pub struct AwsSettings {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

/// Warehouse connection settings
///
/// When `secret_id` is set the credentials are resolved from Secrets Manager
/// at validation time and take precedence over the inline settings.
#[derive(Debug, Clone)]
pub struct WarehouseSettings {
    pub secret_id: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub engine: String,
}

/// Fixed-interval polling bounds shared by the asynchronous stages
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

/// Validation policy
#[derive(Debug, Clone)]
pub struct ValidationSettings {
    /// Tables excluded from row-count validation because their discovered
    /// schema is known unreliable; reported as skipped, never omitted.
    pub skip_tables: BTreeSet<String>,
    /// Whether row-count mismatches fail the process exit code.
    pub fail_on_mismatch: bool,
}

/// Immutable configuration for a full pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub aws: AwsSettings,
    pub data_dir: PathBuf,
    pub template_path: PathBuf,
    pub stack_name: String,
    pub job_name: String,
    pub etl_script_path: PathBuf,
    pub warehouse: WarehouseSettings,
    pub poll: PollSettings,
    pub validation: ValidationSettings,
}

impl PipelineConfig {
    /// Resolve the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve the configuration from an arbitrary lookup function
    ///
    /// Unset and empty values are both treated as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str| lookup(name).filter(|value| !value.trim().is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let aws = AwsSettings {
            access_key_id: require(AWS_ACCESS_KEY_ID)?,
            secret_access_key: require(AWS_SECRET_ACCESS_KEY)?,
            region: require(AWS_DEFAULT_REGION)?,
        };

        let warehouse = WarehouseSettings {
            secret_id: get(REDSHIFT_SECRET_NAME),
            host: require(REDSHIFT_HOST)?,
            port: parse(REDSHIFT_PORT, require(REDSHIFT_PORT)?)?,
            database: require(REDSHIFT_DATABASE)?,
            user: require(REDSHIFT_USER)?,
            password: require(REDSHIFT_PASSWORD)?,
            engine: get(REDSHIFT_ENGINE).unwrap_or_else(|| DEFAULT_ENGINE.to_string()),
        };

        let poll = PollSettings {
            interval: Duration::from_secs(match get(POLL_INTERVAL_SECS) {
                Some(value) => parse(POLL_INTERVAL_SECS, value)?,
                None => DEFAULT_POLL_INTERVAL_SECS,
            }),
            max_attempts: match get(POLL_MAX_ATTEMPTS) {
                Some(value) => parse(POLL_MAX_ATTEMPTS, value)?,
                None => DEFAULT_POLL_MAX_ATTEMPTS,
            },
        };

        let validation = ValidationSettings {
            skip_tables: get(VALIDATION_SKIP_TABLES)
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            fail_on_mismatch: match get(VALIDATION_FAIL_ON_MISMATCH) {
                Some(value) => parse(VALIDATION_FAIL_ON_MISMATCH, value)?,
                None => false,
            },
        };

        Ok(Self {
            aws,
            data_dir: PathBuf::from(require(DATA_PATH)?),
            template_path: PathBuf::from(require(CLOUDFORMATION_TEMPLATE_PATH)?),
            stack_name: require(STACK_NAME)?,
            job_name: require(GLUE_JOB_NAME)?,
            etl_script_path: PathBuf::from(require(ETL_SCRIPT_PATH)?),
            warehouse,
            poll,
            validation,
        })
    }
}

fn parse<T>(name: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|err: T::Err| ConfigError::Invalid {
        name,
        value,
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            (AWS_ACCESS_KEY_ID, "AKIAEXAMPLE"),
            (AWS_SECRET_ACCESS_KEY, "secret"),
            (AWS_DEFAULT_REGION, "eu-central-1"),
            (DATA_PATH, "./data"),
            (CLOUDFORMATION_TEMPLATE_PATH, "./template.yml"),
            (STACK_NAME, "sluice-stack"),
            (GLUE_JOB_NAME, "sluice-load"),
            (ETL_SCRIPT_PATH, "./etl.py"),
            (REDSHIFT_HOST, "cluster.example.redshift.amazonaws.com"),
            (REDSHIFT_PORT, "5439"),
            (REDSHIFT_DATABASE, "dev"),
            (REDSHIFT_USER, "admin"),
            (REDSHIFT_PASSWORD, "hunter2"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<PipelineConfig, ConfigError> {
        PipelineConfig::from_lookup(|name| env.get(name).map(|value| value.to_string()))
    }

    #[test]
    fn loads_with_defaults() {
        let config = load(&base_env()).unwrap();

        assert_eq!(config.stack_name, "sluice-stack");
        assert_eq!(config.warehouse.port, 5439);
        assert_eq!(config.warehouse.engine, "redshift");
        assert_eq!(config.warehouse.secret_id, None);
        assert_eq!(config.poll.interval, Duration::from_secs(10));
        assert_eq!(config.poll.max_attempts, 360);
        assert!(config.validation.skip_tables.is_empty());
        assert!(!config.validation.fail_on_mismatch);
    }

    #[test]
    fn missing_variable_is_rejected() {
        let mut env = base_env();
        env.remove(STACK_NAME);

        match load(&env) {
            Err(ConfigError::Missing(name)) => assert_eq!(name, STACK_NAME),
            other => panic!("expected missing STACK_NAME, got {other:?}"),
        }
    }

    #[test]
    fn empty_value_counts_as_missing() {
        let mut env = base_env();
        env.insert(REDSHIFT_HOST, "  ");

        assert!(matches!(
            load(&env),
            Err(ConfigError::Missing(REDSHIFT_HOST))
        ));
    }

    #[test]
    fn non_numeric_port_is_rejected() {
        let mut env = base_env();
        env.insert(REDSHIFT_PORT, "not-a-port");

        match load(&env) {
            Err(ConfigError::Invalid { name, value, .. }) => {
                assert_eq!(name, REDSHIFT_PORT);
                assert_eq!(value, "not-a-port");
            }
            other => panic!("expected invalid port, got {other:?}"),
        }
    }

    #[test]
    fn skip_tables_are_split_and_trimmed() {
        let mut env = base_env();
        env.insert(VALIDATION_SKIP_TABLES, "Country_Table, Customer_Table ,");

        let config = load(&env).unwrap();
        assert_eq!(
            config.validation.skip_tables,
            BTreeSet::from(["Country_Table".to_string(), "Customer_Table".to_string()])
        );
    }

    #[test]
    fn mismatch_policy_is_parsed() {
        let mut env = base_env();
        env.insert(VALIDATION_FAIL_ON_MISMATCH, "true");
        assert!(load(&env).unwrap().validation.fail_on_mismatch);

        env.insert(VALIDATION_FAIL_ON_MISMATCH, "yes");
        assert!(matches!(load(&env), Err(ConfigError::Invalid { .. })));
    }
}
