use crate::{
    config::ConfigError, crawl::CrawlError, stack::ProvisionError, transform::TransformError,
    upload::UploadError, validate::ValidationError,
};

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(Box<ConfigError>),

    #[error(transparent)]
    Provision(Box<ProvisionError>),

    #[error(transparent)]
    Upload(Box<UploadError>),

    #[error(transparent)]
    Crawl(Box<CrawlError>),

    #[error(transparent)]
    Transform(Box<TransformError>),

    #[error(transparent)]
    Validation(Box<ValidationError>),
}

impl From<ConfigError> for Error {
    fn from(error: ConfigError) -> Self {
        Error::Config(Box::new(error))
    }
}

impl From<ProvisionError> for Error {
    fn from(error: ProvisionError) -> Self {
        Error::Provision(Box::new(error))
    }
}

impl From<UploadError> for Error {
    fn from(error: UploadError) -> Self {
        Error::Upload(Box::new(error))
    }
}

impl From<CrawlError> for Error {
    fn from(error: CrawlError) -> Self {
        Error::Crawl(Box::new(error))
    }
}

impl From<TransformError> for Error {
    fn from(error: TransformError) -> Self {
        Error::Transform(Box::new(error))
    }
}

impl From<ValidationError> for Error {
    fn from(error: ValidationError) -> Self {
        Error::Validation(Box::new(error))
    }
}
