//! Certificate-to-record binding check.

use std::sync::Arc;

use reqwest::header::ACCEPT;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::client::{UpstreamClient, transport_error};
use super::token::CredentialCache;
use crate::routing::LookupType;
use crate::{Error, Result};

/// Computer record envelope returned by the Classic API.
#[derive(Debug, Deserialize)]
struct RecordEnvelope {
    computer: ComputerRecord,
}

#[derive(Debug, Deserialize)]
struct ComputerRecord {
    #[serde(default)]
    certificates: Vec<RegisteredCertificate>,
}

#[derive(Debug, Deserialize)]
struct RegisteredCertificate {
    #[serde(default)]
    common_name: Option<String>,
}

impl ComputerRecord {
    fn lists(&self, common_name: &str) -> bool {
        self.certificates
            .iter()
            .any(|c| c.common_name.as_deref() == Some(common_name))
    }
}

/// Checks that a certificate CN is registered on the addressed computer.
#[derive(Debug, Clone)]
pub struct RecordBindingChecker {
    client: UpstreamClient,
    credentials: Arc<CredentialCache>,
}

impl RecordBindingChecker {
    /// Create a checker sharing the process-wide credential cache.
    #[must_use]
    pub fn new(client: UpstreamClient, credentials: Arc<CredentialCache>) -> Self {
        Self {
            client,
            credentials,
        }
    }

    /// Whether `common_name` appears among the certificates of the record
    /// addressed by `lookup_type`/`lookup_value`.
    ///
    /// Comparison is exact and case-sensitive. A record the upstream reports
    /// as missing (404) is treated as not matching.
    ///
    /// # Errors
    ///
    /// Returns `Error::Upstream` if the token cannot be obtained, the lookup
    /// fails in transit, the upstream answers with any other non-success
    /// status, or the record body is malformed.
    pub async fn matches(
        &self,
        lookup_type: LookupType,
        lookup_value: &str,
        common_name: &str,
    ) -> Result<bool> {
        let token = self.credentials.token().await?;
        let path = format!("/JSSResource/computers/{lookup_type}/{lookup_value}");

        let response = self
            .client
            .request(Method::GET, &path)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| transport_error("Record lookup", &e))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!(%lookup_type, lookup_value, "Record not found");
                return Ok(false);
            }
            status if !status.is_success() => {
                return Err(Error::Upstream(format!(
                    "Record lookup returned HTTP {status}"
                )));
            }
            _ => {}
        }

        let record: RecordEnvelope = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("Malformed computer record: {e}")))?;

        Ok(record.computer.lists(common_name))
    }
}
