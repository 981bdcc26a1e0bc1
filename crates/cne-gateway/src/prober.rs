//! Endpoint reachability probes.
//!
//! Before a record with an endpoint is stored, the endpoint is sent an empty
//! POST and must answer `204 No Content`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use crate::error::{AppError, Result};

/// Checks that a callback endpoint is reachable.
#[async_trait]
pub trait EndpointProbe: Send + Sync {
    /// Probe the endpoint. Any failure aborts the registration.
    async fn probe(&self, endpoint: &Url) -> Result<()>;
}

/// Probe over HTTP with `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    /// Create a prober whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EndpointProbe for HttpProber {
    async fn probe(&self, endpoint: &Url) -> Result<()> {
        debug!(endpoint = %endpoint, "probing endpoint");

        let response = self
            .client
            .post(endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| AppError::ProbeFailed(format!("{endpoint} is not reachable: {e}")))?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(()),
            status => Err(AppError::ProbeFailed(format!(
                "{endpoint} answered {status}, expected 204 No Content"
            ))),
        }
    }
}

/// Probe that accepts every endpoint.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopProber;

#[async_trait]
impl EndpointProbe for NoopProber {
    async fn probe(&self, _endpoint: &Url) -> Result<()> {
        Ok(())
    }
}
