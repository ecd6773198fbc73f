//! Schema discovery over the uploaded objects.
//!
//! Glue exposes no push notification for crawler completion, so the stage
//! starts the crawler and polls its state until the run is terminal. The
//! crawler has a known data-quality defect upstream of this stage: for some
//! source files it misdetects the header row and catalogs placeholder column
//! names. That is handled by the validation skip list, not here.

use aws_sdk_glue::types::{CrawlerState, LastCrawlInfo, LastCrawlStatus};
use aws_sdk_glue::Client;
use thiserror::Error;
use tracing::info;

use crate::poll::Poller;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Api(#[from] aws_sdk_glue::Error),

    #[error("crawler {0} does not exist")]
    NotFound(String),

    #[error("crawler {crawler} reported a failed run: {message}")]
    Failed { crawler: String, message: String },

    #[error("crawler {crawler} run was cancelled")]
    Cancelled { crawler: String },

    #[error("crawler {crawler} did not finish after {attempts} status checks")]
    Timeout { crawler: String, attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CrawlCheck {
    Pending,
    Succeeded,
    Failed(String),
    Cancelled,
}

/// Start the crawler and block until its run reaches a terminal state.
pub async fn run_crawler(client: &Client, crawler: &str, poller: &Poller) -> Result<(), CrawlError> {
    match client.start_crawler().name(crawler).send().await {
        Ok(_) => info!(crawler, "crawler started"),
        Err(err) => {
            let service_err = err.into_service_error();
            if service_err.is_crawler_running_exception() {
                info!(crawler, "crawler already running, attaching to the current run");
            } else {
                return Err(aws_sdk_glue::Error::from(service_err).into());
            }
        }
    }

    poller
        .wait_for(&format!("crawler {crawler}"), || {
            let client = client.clone();
            let name = crawler.to_string();

            async move {
                let output = client
                    .get_crawler()
                    .name(&name)
                    .send()
                    .await
                    .map_err(aws_sdk_glue::Error::from)?;

                let crawler = output
                    .crawler()
                    .ok_or_else(|| CrawlError::NotFound(name.clone()))?;

                match check(crawler.state(), crawler.last_crawl()) {
                    CrawlCheck::Pending => Ok(None),
                    CrawlCheck::Succeeded => Ok(Some(())),
                    CrawlCheck::Failed(message) => Err(CrawlError::Failed {
                        crawler: name.clone(),
                        message,
                    }),
                    CrawlCheck::Cancelled => Err(CrawlError::Cancelled {
                        crawler: name.clone(),
                    }),
                }
            }
        })
        .await
        .map_err(|err| {
            err.or_timeout(|attempts| CrawlError::Timeout {
                crawler: crawler.to_string(),
                attempts,
            })
        })?;

    info!(crawler, "crawler finished");
    Ok(())
}

fn check(state: Option<&CrawlerState>, last_crawl: Option<&LastCrawlInfo>) -> CrawlCheck {
    match state {
        Some(CrawlerState::Running) | Some(CrawlerState::Stopping) => CrawlCheck::Pending,
        Some(CrawlerState::Ready) => last_crawl_check(last_crawl),
        // Unknown state, keep polling until the bound trips
        _ => CrawlCheck::Pending,
    }
}

fn last_crawl_check(last_crawl: Option<&LastCrawlInfo>) -> CrawlCheck {
    let Some(last_crawl) = last_crawl else {
        // The crawler is READY but has not recorded the run yet
        return CrawlCheck::Pending;
    };

    match last_crawl.status() {
        Some(LastCrawlStatus::Succeeded) => CrawlCheck::Succeeded,
        Some(LastCrawlStatus::Failed) => CrawlCheck::Failed(
            last_crawl
                .error_message()
                .unwrap_or("no error message reported")
                .to_string(),
        ),
        Some(LastCrawlStatus::Cancelled) => CrawlCheck::Cancelled,
        _ => CrawlCheck::Pending,
    }
}
