//! HTTP client for the hosted SMS API
//!
//! All endpoints live behind a single URL; the method and its arguments are
//! passed as query parameters and responses come back as JSON. Uses
//! synchronous HTTP (ureq) to be executor-agnostic.

use std::time::Duration;

use chrono::NaiveDate;
use ureq::Agent;

use super::wire::{GetSmsResponse, StatusResponse};
use super::{STATUS_NO_SMS, STATUS_SUCCESS, SmsApi, normalize_message};
use crate::config::VoipCredentials;
use crate::error::Error;
use crate::models::{Message, VoipId};

/// Default API endpoint.
const DEFAULT_BASE_URL: &str = "https://www.voip.ms/api/v1/rest.php";

/// Retrieval page size. Effectively unbounded so a window always arrives in
/// one response.
const RETRIEVAL_LIMIT: u64 = 1_000_000;

/// Offset the API expects timestamps in, as its `timezone` parameter.
const TIMEZONE_PARAM: &str = "-5";

/// HTTP client for the remote message store
pub struct VoipClient {
    agent: Agent,
    credentials: VoipCredentials,
    base_url: String,
}

impl VoipClient {
    /// Create a client against the production endpoint.
    pub fn new(credentials: VoipCredentials) -> Self {
        Self::with_base_url(credentials, DEFAULT_BASE_URL)
    }

    /// Create a client against a custom endpoint. Used by tests.
    pub fn with_base_url(credentials: VoipCredentials, base_url: impl Into<String>) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(30)))
            .build();

        Self {
            agent: config.new_agent(),
            credentials,
            base_url: base_url.into(),
        }
    }

    /// Build the endpoint URL for one API method with authentication baked
    /// in. Extra parameters are appended already-encoded.
    fn method_url(&self, method: &str, params: &[(&str, &str)]) -> String {
        let mut url = format!(
            "{}?api_username={}&api_password={}&method={}",
            self.base_url,
            urlencoding::encode(&self.credentials.username),
            urlencoding::encode(&self.credentials.password),
            method,
        );

        for (key, value) in params {
            url.push_str(&format!("&{}={}", key, urlencoding::encode(value)));
        }

        url
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, Error> {
        let mut response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| Error::Network(e.to_string()))?;

        response
            .body_mut()
            .read_json()
            .map_err(|e| Error::Parse(e.to_string()))
    }
}

impl SmsApi for VoipClient {
    fn get_messages(
        &self,
        line: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Message>, Error> {
        let limit = RETRIEVAL_LIMIT.to_string();
        let from = from.format("%Y-%m-%d").to_string();
        let to = to.format("%Y-%m-%d").to_string();

        let url = self.method_url(
            "getSMS",
            &[
                ("did", line),
                ("limit", &limit),
                ("from", &from),
                ("to", &to),
                ("timezone", TIMEZONE_PARAM),
            ],
        );

        let response: GetSmsResponse = self.get_json(&url)?;

        match response.status.as_str() {
            STATUS_SUCCESS => response
                .sms
                .unwrap_or_default()
                .iter()
                .map(normalize_message)
                .collect(),
            STATUS_NO_SMS => Ok(Vec::new()),
            status => Err(Error::Api(status.to_string())),
        }
    }

    fn delete_message(&self, voip_id: VoipId) -> Result<(), Error> {
        let id = voip_id.as_i64().to_string();
        let url = self.method_url("deleteSMS", &[("id", &id)]);

        let response: StatusResponse = self.get_json(&url)?;

        match response.status.as_str() {
            STATUS_SUCCESS => Ok(()),
            status => Err(Error::Api(status.to_string())),
        }
    }

    fn send_message(&self, line: &str, contact: &str, text: &str) -> Result<(), Error> {
        let url = self.method_url(
            "sendSMS",
            &[("did", line), ("dst", contact), ("message", text)],
        );

        let response: StatusResponse = self.get_json(&url)?;

        match response.status.as_str() {
            STATUS_SUCCESS => Ok(()),
            status => Err(Error::Api(status.to_string())),
        }
    }
}
