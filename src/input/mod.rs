//! Where inputs come from: literal host values, or a document fetched from
//! a URL.
//!
//! Remote inputs go through an [`Opener`], which turns a URL into JSON
//! text. Any `Fn(&str) -> Result<String, E>` is an opener; without one the
//! query uses an [`HttpOpener`] built from its [`FetchConfig`].

mod http;

use std::time::Duration;

use log::debug;
use serde::{Deserialize, Deserializer};

pub use self::http::{HttpOpener, HttpResponse, Transport};
#[cfg(feature = "http")]
pub use self::http::ReqwestTransport;

use crate::error::{Error, Result};
use crate::jq::Value;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error fetching a remote input.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request could not be sent or its body could not be read.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("{url} answered with HTTP status {status}")]
    Status { url: String, status: u16 },

    #[error("response from {url} is larger than {limit} bytes")]
    TooLarge { url: String, limit: usize },

    /// A caller-supplied opener failed.
    #[error("opener failed for {url}: {source}")]
    Opener {
        url: String,
        #[source]
        source: BoxError,
    },

    /// The HTTP client could not be configured, before any request was made.
    #[error("could not build the HTTP client: {source}")]
    Client {
        #[source]
        source: BoxError,
    },

    /// No opener was given and the crate was built without HTTP support.
    #[error("cannot fetch {url}: built without the `http` feature")]
    NoTransport { url: String },
}

/// Turns a URL into the text of a JSON document.
pub trait Opener {
    fn open(&self, url: &str) -> core::result::Result<String, FetchError>;
}

impl<F, E> Opener for F
where
    F: Fn(&str) -> core::result::Result<String, E>,
    E: Into<BoxError>,
{
    fn open(&self, url: &str) -> core::result::Result<String, FetchError> {
        self(url).map_err(|err| FetchError::Opener {
            url: url.to_string(),
            source: err.into(),
        })
    }
}

/// Settings for the default HTTP opener.
///
/// Deserializable, with the timeout given in whole seconds:
///
/// ```
/// use jqhost::input::FetchConfig;
///
/// let config: FetchConfig = serde_json::from_str(r#"{"timeout_secs": 5}"#).unwrap();
/// assert_eq!(config.timeout, Some(std::time::Duration::from_secs(5)));
/// assert_eq!(config.max_body_bytes, FetchConfig::default().max_body_bytes);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Whole-request timeout; `None` waits indefinitely.
    #[serde(rename = "timeout_secs", deserialize_with = "timeout_from_secs")]
    pub timeout: Option<Duration>,
    pub user_agent: String,
    /// Bodies longer than this are rejected rather than truncated.
    pub max_body_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            timeout: Some(Duration::from_secs(30)),
            user_agent: concat!("jqhost/", env!("CARGO_PKG_VERSION")).to_string(),
            max_body_bytes: 64 * 1024 * 1024,
        }
    }
}

fn timeout_from_secs<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> core::result::Result<Option<Duration>, D::Error> {
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
}

/// Open `url` and parse what comes back as a single JSON document.
pub fn fetch_json(url: &str, opener: &dyn Opener) -> Result<Value> {
    let text = opener.open(url)?;
    Value::from_json_str(&text).map_err(|source| Error::InvalidJson {
        url: url.to_string(),
        source,
    })
}

/// The input half of a query, before resolution.
pub(crate) enum Source<'o> {
    Literal(Vec<Value>),
    Remote {
        url: String,
        opener: Option<Box<dyn Opener + 'o>>,
    },
}

impl Source<'_> {
    /// Produce the inputs, fetching if needed.
    pub(crate) fn resolve(self, config: &FetchConfig) -> Result<Vec<Value>> {
        match self {
            Source::Literal(values) => Ok(values),
            Source::Remote {
                url,
                opener: Some(opener),
            } => {
                debug!("fetching {} with caller opener", url);
                Ok(vec![fetch_json(&url, opener.as_ref())?])
            }
            Source::Remote { url, opener: None } => {
                let opener = default_opener(&url, config)?;
                Ok(vec![fetch_json(&url, opener.as_ref())?])
            }
        }
    }
}

#[cfg(feature = "http")]
fn default_opener(_url: &str, config: &FetchConfig) -> Result<Box<dyn Opener>> {
    Ok(Box::new(HttpOpener::from_config(config)?))
}

#[cfg(not(feature = "http"))]
fn default_opener(url: &str, _config: &FetchConfig) -> Result<Box<dyn Opener>> {
    Err(FetchError::NoTransport {
        url: url.to_string(),
    }
    .into())
}
