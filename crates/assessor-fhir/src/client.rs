//! `FhirDataClient`: scoped reads over the FHIR REST API.
//!
//! Each `RecordRef` in a scope becomes one `GET {base}/{type}/{id}`. The
//! client never searches or follows references, so a task sees exactly the
//! records it declared and nothing more.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use assessor_contracts::{
    error::{AssessorError, AssessorResult},
    task::{DataScope, DomainContext, DomainRecord, RecordRef},
};
use assessor_core::traits::ReferenceDataClient;

const FHIR_JSON: &str = "application/fhir+json";

/// Timeout for a single readiness probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct FhirDataClient {
    base_url: String,
    http: Client,
}

impl FhirDataClient {
    /// `timeout` bounds each individual request, including connect.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> AssessorResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("assessor-fhir/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| AssessorError::ConfigError {
                reason: format!("failed to build FHIR HTTP client: {e}"),
            })?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn record_url(&self, record: &RecordRef) -> String {
        format!("{}/{}/{}", self.base_url, record.resource_type, record.id)
    }

    async fn fetch_one(&self, record: &RecordRef) -> AssessorResult<DomainRecord> {
        let url = self.record_url(record);
        debug!(%url, "fetching record");

        let response = self
            .http
            .get(&url)
            .header(ACCEPT, FHIR_JSON)
            .send()
            .await
            .map_err(|e| unavailable_from(record, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssessorError::DataUnavailable {
                reason: format!("{}/{} returned HTTP {}", record.resource_type, record.id, status),
                transient: is_transient_status(status),
            });
        }

        let body: Value = response.json().await.map_err(|e| unavailable_from(record, &e))?;
        check_identity(record, &body)?;

        Ok(DomainRecord {
            resource_type: record.resource_type.clone(),
            id: record.id.clone(),
            body,
        })
    }

    /// Probe `{base}/metadata` once.
    pub async fn check_ready(&self) -> AssessorResult<()> {
        let url = format!("{}/metadata", self.base_url);
        let response = self
            .http
            .get(&url)
            .header(ACCEPT, FHIR_JSON)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| AssessorError::DataUnavailable {
                reason: format!("capability statement request failed: {e}"),
                transient: true,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AssessorError::DataUnavailable {
                reason: format!("capability statement returned HTTP {}", response.status()),
                transient: true,
            })
        }
    }

    /// Probe up to `retries` times, `interval` apart. Returns whether the
    /// server answered; callers decide whether to proceed without it.
    pub async fn wait_until_ready(&self, retries: u32, interval: Duration) -> bool {
        info!(base_url = %self.base_url, "checking FHIR server");
        for attempt in 1..=retries.max(1) {
            match self.check_ready().await {
                Ok(()) => {
                    info!(attempt, "FHIR server is up");
                    return true;
                }
                Err(e) => debug!(attempt, error = %e, "FHIR server not ready"),
            }
            if attempt < retries {
                tokio::time::sleep(interval).await;
            }
        }
        warn!(base_url = %self.base_url, retries, "FHIR server did not become ready");
        false
    }
}

#[async_trait]
impl ReferenceDataClient for FhirDataClient {
    async fn fetch(&self, scope: &DataScope) -> AssessorResult<DomainContext> {
        let mut records = Vec::with_capacity(scope.records.len());
        for record in &scope.records {
            records.push(self.fetch_one(record).await?);
        }
        Ok(DomainContext { records })
    }
}

fn unavailable_from(record: &RecordRef, e: &reqwest::Error) -> AssessorError {
    AssessorError::DataUnavailable {
        reason: format!("{}/{}: {}", record.resource_type, record.id, e),
        // A body that fails to decode will fail the same way next time.
        transient: e.is_timeout() || e.is_connect() || e.is_request(),
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// The server must hand back the resource that was asked for.
fn check_identity(record: &RecordRef, body: &Value) -> AssessorResult<()> {
    let resource_type = body.get("resourceType").and_then(Value::as_str);
    let id = body.get("id").and_then(Value::as_str);
    if resource_type == Some(record.resource_type.as_str()) && id == Some(record.id.as_str()) {
        return Ok(());
    }
    Err(AssessorError::DataUnavailable {
        reason: format!(
            "expected {}/{}, server returned {}/{}",
            record.resource_type,
            record.id,
            resource_type.unwrap_or("?"),
            id.unwrap_or("?")
        ),
        transient: false,
    })
}
