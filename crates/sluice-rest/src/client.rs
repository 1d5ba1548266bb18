use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::codec::{Codec, PlainCodec};
use crate::error::RestError;

/// Default REST endpoint of the tunnel-provisioning service.
pub const DEFAULT_REST_URL: &str = "https://saucelabs.com/rest/v1";

/// Domain assigned to a tunnel created with neither a name nor explicit
/// domains. Overridable through [`RestClient::with_default_domain`]; the
/// default value is what the service has always used.
pub const DEFAULT_TUNNEL_DOMAIN: &str = "sauce-connect.proxy";

/// Cadences driving the two supervision activities.
#[derive(Debug, Clone, Copy)]
pub struct SuperviseIntervals {
    /// How often the remote status is polled.
    pub status: Duration,
    /// How often a heartbeat is reported, absent liveness updates.
    pub heartbeat: Duration,
}

impl Default for SuperviseIntervals {
    fn default() -> Self {
        Self {
            status: Duration::from_secs(5),
            heartbeat: Duration::from_secs(30),
        }
    }
}

/// Control-plane client: create, query, supervise, and shut down tunnels.
///
/// Cheap to clone; every clone shares the same connection pool.
#[derive(Clone)]
pub struct RestClient {
    pub(crate) base_url: String,
    pub(crate) username: String,
    password: String,
    http: reqwest::Client,
    codec: Arc<dyn Codec>,
    pub(crate) default_domain: String,
    pub(crate) intervals: SuperviseIntervals,
}

impl RestClient {
    pub fn new(base_url: &str, username: &str, password: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            http: reqwest::Client::new(),
            codec: Arc::new(PlainCodec),
            default_domain: DEFAULT_TUNNEL_DOMAIN.to_string(),
            intervals: SuperviseIntervals::default(),
        }
    }

    /// Replace the JSON codec, e.g. with [`crate::VerboseCodec`] for tracing
    /// every document on the wire.
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Override the domain assigned to unnamed, domain-less tunnels.
    pub fn with_default_domain(mut self, domain: &str) -> Self {
        self.default_domain = domain.to_string();
        self
    }

    /// Override the supervision cadences. Mostly useful in tests.
    pub fn with_supervise_intervals(mut self, intervals: SuperviseIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    /// Sign and send one request, returning the raw response body.
    ///
    /// Non-2xx responses become [`RestError::Request`] carrying the message
    /// extracted from a JSON `{"error": …}` body when there is one. The body
    /// is fully read on every path, so the connection always goes back to
    /// the pool.
    pub(crate) async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, RestError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .request(method, &url)
            .basic_auth(&self.username, Some(&self.password));
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = request.send().await.map_err(|source| RestError::Connect {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|source| RestError::Connect {
                url: url.clone(),
                source,
            })?;

        if !status.is_success() {
            return Err(RestError::Request {
                status,
                url,
                message: error_message(&bytes),
            });
        }

        Ok(bytes.to_vec())
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RestError> {
        let bytes = self.execute(Method::GET, path, None).await?;
        self.decode(&bytes)
    }

    pub(crate) fn encode<B: Serialize>(&self, body: &B) -> Result<Vec<u8>, RestError> {
        let value = serde_json::to_value(body)?;
        self.codec.encode(&value)
    }

    pub(crate) fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, RestError> {
        let value = self.codec.decode(bytes)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Query `versions.json` for the newest published client build.
    ///
    /// Returns `None` when nothing is published for the running platform.
    pub async fn latest_version(&self) -> Result<Option<VersionInfo>, RestError> {
        #[derive(Deserialize)]
        struct Platforms {
            linux: Option<VersionInfo>,
            linux32: Option<VersionInfo>,
            osx: Option<VersionInfo>,
            win32: Option<VersionInfo>,
        }

        #[derive(Deserialize)]
        struct Listing {
            #[serde(rename = "Sauce Connect")]
            sauce_connect: Platforms,
        }

        let listing: Listing = self.get_json("/versions.json").await?;
        let p = listing.sauce_connect;
        let info = match (std::env::consts::OS, std::env::consts::ARCH) {
            ("windows", _) => p.win32,
            ("linux", "x86") => p.linux32,
            ("linux", _) => p.linux,
            ("macos", _) => p.osx,
            _ => None,
        };
        Ok(info)
    }
}

/// One platform's build record in `versions.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    pub build: u32,
    pub download_url: String,
    #[serde(default)]
    pub sha1: String,
}

fn error_message(body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
    }

    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(doc) => doc.error,
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_extracts_json_error_field() {
        let body = br#"{"error": "Too many active org tunnels: 3 >= 2"}"#;
        assert_eq!(error_message(body), "Too many active org tunnels: 3 >= 2");
    }

    #[test]
    fn error_message_falls_back_to_raw_body() {
        assert_eq!(error_message(b"504 Gateway Timeout\n"), "504 Gateway Timeout");
    }

    #[test]
    fn base_url_loses_its_trailing_slash() {
        let client = RestClient::new("https://example.test/rest/v1/", "u", "p");
        assert_eq!(client.base_url, "https://example.test/rest/v1");
    }
}
