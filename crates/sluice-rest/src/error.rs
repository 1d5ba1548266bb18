use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by the control-plane client.
#[derive(Debug, Error)]
pub enum RestError {
    /// The request never reached the service.
    #[error("couldn't connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with a non-2xx status. `message` carries the
    /// server-provided error text when the body had one, else the raw body.
    #[error("{url} returned {status}: {message}")]
    Request {
        status: StatusCode,
        url: String,
        message: String,
    },

    /// The response body was not the JSON document we expected.
    #[error("couldn't decode JSON document: {0}")]
    Decode(#[from] serde_json::Error),

    /// The tunnel never reached the running state within the allotted time.
    /// The remote record may still exist; cleanup is the caller's.
    #[error("tunnel {id} didn't come up after {timeout:?}")]
    Timeout { id: String, timeout: Duration },
}
