//! DNS-JSON lookups.
//!
//! Requests carry `name` and `type` query parameters; responses carry an
//! `Answer` array whose entries may include record types other than the one
//! asked for (a CNAME chain ahead of the A records, for instance).

use std::time::Duration;

use reqwest::header::ACCEPT;
use serde::Deserialize;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use super::record_type::type_number;
use super::{DNS_JSON_CONTENT_TYPE, DohClient, ensure_ok};
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct JsonResponse {
    #[serde(rename = "Answer", alias = "answer", default)]
    answer: Option<Vec<JsonAnswer>>,
}

#[derive(Debug, Deserialize)]
struct JsonAnswer {
    #[serde(rename = "type", alias = "Type")]
    rtype: u16,
    #[serde(alias = "Data")]
    data: String,
}

/// Extract the `data` of every answer whose type number is `wanted`, in
/// response order.
///
/// A missing or null `Answer` array yields no answers; a body that is not
/// DNS-JSON is an error.
pub fn parse_answers(body: &[u8], wanted: u16) -> Result<Vec<String>> {
    let response: JsonResponse = serde_json::from_slice(body)?;

    Ok(response
        .answer
        .unwrap_or_default()
        .into_iter()
        .filter(|a| a.rtype == wanted)
        .map(|a| a.data)
        .collect())
}

impl DohClient {
    /// Look up `name` for the record type mnemonic `record_type` (e.g. `"A"`).
    ///
    /// Unknown mnemonics fail before anything goes on the network.
    pub async fn query(
        &self,
        name: &str,
        record_type: &str,
        timeout: Duration,
    ) -> Result<Vec<String>> {
        let Some(wanted) = type_number(record_type) else {
            warn!(record_type, "Unsupported record type");
            return Err(Error::Resolver);
        };

        let deadline = Instant::now() + timeout;
        let endpoint = self.endpoints.pick();
        let mut url = endpoint.url().clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("name", name)
            .append_pair("type", record_type);

        debug!(endpoint = %endpoint, name, record_type, "Sending DNS-JSON query");

        let response = timeout_at(
            deadline,
            self.http
                .get(url)
                .header(ACCEPT, DNS_JSON_CONTENT_TYPE)
                .send(),
        )
        .await
        .map_err(|_| Error::Timeout(timeout))??;

        ensure_ok(&response, endpoint)?;

        let body = timeout_at(deadline, response.bytes())
            .await
            .map_err(|_| Error::Timeout(timeout))??;

        parse_answers(&body, wanted).inspect_err(|e| {
            warn!(endpoint = %endpoint, name, error = %e, "Malformed DNS-JSON response");
        })
    }
}
