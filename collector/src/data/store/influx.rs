//! InfluxDB 1.x HTTP adapter

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use super::line_protocol::encode_batch;
use super::{MetricStore, WriteError};
use crate::core::config::StoreConfig;
use crate::core::constants::{APP_NAME, STORE_ERROR_BODY_LIMIT};
use crate::domain::types::{Batch, Destination};

/// Writes batches through the `/write` endpoint
pub struct InfluxStore {
    client: reqwest::Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
}

impl InfluxStore {
    pub fn new(config: &StoreConfig) -> Result<Self, WriteError> {
        let mut base_url = Url::parse(&config.url)
            .map_err(|e| WriteError::Config(format!("invalid store URL '{}': {}", config.url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(format!("{}/{}", APP_NAME, env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WriteError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Check the store is reachable (`/ping` answers 204 on a healthy node)
    pub async fn ping(&self) -> Result<(), WriteError> {
        let url = self.endpoint("ping")?;
        let request = self.authorize(self.client.get(url));
        let resp = request.send().await?;
        check_status(resp).await
    }

    fn endpoint(&self, name: &str) -> Result<Url, WriteError> {
        self.base_url
            .join(name)
            .map_err(|e| WriteError::Config(format!("invalid endpoint '{}': {}", name, e)))
    }

    fn write_url(&self, destination: &Destination) -> Result<Url, WriteError> {
        let mut url = self.endpoint("write")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("db", &destination.database);
            if !destination.retention_policy.is_empty() {
                query.append_pair("rp", &destination.retention_policy);
            }
            query.append_pair("precision", destination.precision.as_str());
            query.append_pair("consistency", destination.consistency.as_str());
        }
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_ref()),
            None => request,
        }
    }
}

#[async_trait]
impl MetricStore for InfluxStore {
    async fn write(&self, batch: &Batch) -> Result<(), WriteError> {
        if batch.is_empty() {
            return Ok(());
        }

        let url = self.write_url(&batch.destination)?;
        let body = encode_batch(batch);
        tracing::trace!(points = batch.len(), body = %body, "Writing batch");

        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body);
        let resp = self.authorize(request).send().await?;
        check_status(resp).await
    }
}

async fn check_status(resp: reqwest::Response) -> Result<(), WriteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }

    let mut body = resp.text().await.unwrap_or_default();
    if body.len() > STORE_ERROR_BODY_LIMIT {
        let mut end = STORE_ERROR_BODY_LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }

    Err(WriteError::Rejected {
        status: status.as_u16(),
        body: body.trim().to_string(),
    })
}
