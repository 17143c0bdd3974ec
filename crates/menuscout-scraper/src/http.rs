//! HTTP extraction: one `reqwest::Client` per task.
//!
//! Each session gets its own client with its own cookie store, so nothing a
//! target sets leaks into another task. The target URL must answer with a
//! JSON array of raw records, or an object wrapping one under `items`. Items
//! are decoded one by one so a single bad item becomes a row error instead
//! of failing the listing.

use std::marker::PhantomData;
use std::time::Duration;

use menuscout_core::{AppConfig, RecordError};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ScraperError;
use crate::session::{RawRecord, ScrapeSession, SessionFactory};
use crate::task::ScrapeTask;

const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct HttpSessionFactory {
    timeout: Duration,
    user_agent: String,
}

impl HttpSessionFactory {
    #[must_use]
    pub fn new(timeout_secs: u64, user_agent: &str) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            user_agent: user_agent.to_string(),
        }
    }

    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(
            config.scraper_request_timeout_secs,
            &config.scraper_user_agent,
        )
    }

    /// Build a fresh session outside the coordinator.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the client cannot be constructed.
    pub fn build<R>(&self) -> Result<HttpSession<R>, ScraperError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(&self.user_agent)
            .cookie_store(true)
            .build()?;
        Ok(HttpSession {
            client,
            _records: PhantomData,
        })
    }
}

impl<R> SessionFactory<R> for HttpSessionFactory
where
    R: DeserializeOwned + Send + 'static,
{
    type Session = HttpSession<R>;

    async fn open(&self, _task: &ScrapeTask) -> Result<HttpSession<R>, ScraperError> {
        self.build()
    }
}

pub struct HttpSession<R> {
    client: Client,
    _records: PhantomData<fn() -> R>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Listing {
    Bare(Vec<Value>),
    Wrapped { items: Vec<Value> },
}

impl Listing {
    fn into_items(self) -> Vec<Value> {
        match self {
            Listing::Bare(items) | Listing::Wrapped { items } => items,
        }
    }
}

/// Decode each listing item on its own; failures keep their position.
fn decode_items<R: DeserializeOwned>(items: Vec<Value>) -> Vec<RawRecord<R>> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value(item).map_err(|e| RecordError::Malformed {
                index,
                reason: e.to_string(),
            })
        })
        .collect()
}

impl<R> HttpSession<R>
where
    R: DeserializeOwned,
{
    /// GET `url` and decode its records.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::NotFound`]: HTTP 404.
    /// - [`ScraperError::UnexpectedStatus`]: any other non-2xx status.
    /// - [`ScraperError::Http`]: network or TLS failure.
    /// - [`ScraperError::Deserialize`]: the body is not a listing. Items that
    ///   do not decode are returned as [`RecordError::Malformed`] instead.
    pub async fn fetch(&self, url: &str) -> Result<Vec<RawRecord<R>>, ScraperError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::ACCEPT_LANGUAGE, "pt-BR,pt;q=0.9")
            .send()
            .await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ScraperError::NotFound {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(ScraperError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        let listing = serde_json::from_str::<Listing>(&body).map_err(|e| {
            ScraperError::Deserialize {
                context: format!("records from {url}"),
                source: e,
            }
        })?;
        Ok(decode_items(listing.into_items()))
    }
}

impl<R> ScrapeSession<R> for HttpSession<R>
where
    R: DeserializeOwned + Send + 'static,
{
    async fn extract(&mut self, task: &ScrapeTask) -> Result<Vec<RawRecord<R>>, ScraperError> {
        let records = self.fetch(&task.target_url).await?;
        let malformed = records.iter().filter(|r| r.is_err()).count();
        if malformed > 0 {
            tracing::warn!(
                task_id = task.id,
                url = %task.target_url,
                malformed,
                "listing items could not be decoded"
            );
        }
        tracing::debug!(
            task_id = task.id,
            url = %task.target_url,
            records = records.len(),
            "fetched records"
        );
        Ok(records)
    }

    async fn close(self) {
        drop(self.client);
    }
}
