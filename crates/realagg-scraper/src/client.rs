//! Shared HTTP fetch client used by every adapter.
//!
//! Wraps `reqwest::Client` with the identifying User-Agent, per-request
//! timeouts, status classification into [`ScrapeError`], and the shared
//! retry/backoff wrapper for transient failures.

use std::time::Duration;

use reqwest::Client;

use crate::error::ScrapeError;
use crate::retry::{retry_with_backoff, RetryPolicy};

#[derive(Clone)]
pub struct FetchClient {
    client: Client,
    retry: RetryPolicy,
}

impl FetchClient {
    /// Creates a client with the configured timeout, User-Agent, and retry
    /// policy. Redirects are followed; transport gzip is transparent.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        timeout_secs: u64,
        user_agent: &str,
        retry: RetryPolicy,
    ) -> Result<Self, ScrapeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client, retry })
    }

    /// Fetch a URL and return the body as text.
    ///
    /// # Errors
    ///
    /// Transient failures are retried per the policy; on exhaustion or a
    /// non-retryable status the typed [`ScrapeError`] is returned.
    pub async fn get_text(&self, url: &str) -> Result<String, ScrapeError> {
        retry_with_backoff(self.retry, || async move {
            let response = self.send_get(url, &[]).await?;
            Ok(response.text().await?)
        })
        .await
    }

    /// Fetch a URL with additional headers and return the body as text.
    ///
    /// # Errors
    ///
    /// Same contract as [`FetchClient::get_text`].
    pub async fn get_text_with_headers(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<String, ScrapeError> {
        retry_with_backoff(self.retry, || async move {
            let response = self.send_get(url, headers).await?;
            Ok(response.text().await?)
        })
        .await
    }

    /// Fetch a URL and deserialize the JSON body.
    ///
    /// # Errors
    ///
    /// Same transport contract as [`FetchClient::get_text`];
    /// [`ScrapeError::Deserialize`] (never retried) when the body is not
    /// valid JSON for `T`.
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, ScrapeError> {
        retry_with_backoff(self.retry, || async move {
            let response = self.send_get(url, &[]).await?;
            let body = response.text().await?;
            serde_json::from_str::<T>(&body).map_err(|source| ScrapeError::Deserialize {
                context: url.to_string(),
                source,
            })
        })
        .await
    }

    /// Fetch a URL and return the raw body bytes (gzipped sitemap payloads).
    ///
    /// # Errors
    ///
    /// Same contract as [`FetchClient::get_text`].
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ScrapeError> {
        retry_with_backoff(self.retry, || async move {
            let response = self.send_get(url, &[]).await?;
            Ok(response.bytes().await?.to_vec())
        })
        .await
    }

    /// POST a form body (AJAX endpoints) and deserialize the JSON response.
    ///
    /// # Errors
    ///
    /// Same contract as [`FetchClient::get_json`].
    pub async fn post_form_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        form: &[(&str, String)],
        headers: &[(&str, &str)],
    ) -> Result<T, ScrapeError> {
        retry_with_backoff(self.retry, || async move {
            let mut request = self.client.post(url).form(form);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            let response = request.send().await?;
            let response = Self::classify(url, response)?;
            let body = response.text().await?;
            serde_json::from_str::<T>(&body).map_err(|source| ScrapeError::Deserialize {
                context: url.to_string(),
                source,
            })
        })
        .await
    }

    async fn send_get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<reqwest::Response, ScrapeError> {
        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT_LANGUAGE, "cs-CZ,cs;q=0.9,en;q=0.8");
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request.send().await?;
        Self::classify(url, response)
    }

    fn classify(
        url: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ScrapeError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        Err(ScrapeError::from_status(
            status.as_u16(),
            url.to_string(),
            retry_after,
        ))
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
