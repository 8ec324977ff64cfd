//! The default opener: HTTP GET, then decode the body using the charset
//! named in `Content-Type`.

use std::io::Read;

use encoding_rs::{Encoding, UTF_8};
use log::{debug, warn};

use super::{FetchConfig, FetchError, Opener};

/// A response as far as the opener cares: status, headers, body.
pub trait HttpResponse {
    fn status(&self) -> u16;

    /// Header value by case-insensitive name.
    fn header(&self, name: &str) -> Option<&str>;

    fn body(&mut self) -> &mut dyn Read;
}

/// Something that can perform a GET.
pub trait Transport {
    fn get(&self, url: &str) -> Result<Box<dyn HttpResponse>, FetchError>;
}

/// Fetches over a [`Transport`] and decodes the body to text.
pub struct HttpOpener<T> {
    transport: T,
    max_body_bytes: usize,
}

impl<T: Transport> HttpOpener<T> {
    pub fn new(transport: T) -> Self {
        HttpOpener {
            transport,
            max_body_bytes: FetchConfig::default().max_body_bytes,
        }
    }

    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }
}

#[cfg(feature = "http")]
impl HttpOpener<ReqwestTransport> {
    /// The production opener: a blocking reqwest client set up from `config`.
    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchError> {
        Ok(HttpOpener::new(ReqwestTransport::new(config)?).max_body_bytes(config.max_body_bytes))
    }
}

impl<T: Transport> Opener for HttpOpener<T> {
    fn open(&self, url: &str) -> Result<String, FetchError> {
        debug!("fetching {}", url);
        let mut response = self.transport.get(url)?;

        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let encoding = response
            .header("content-type")
            .and_then(charset)
            .unwrap_or(UTF_8);

        let mut body = Vec::new();
        Read::take(response.body(), self.max_body_bytes as u64 + 1)
            .read_to_end(&mut body)
            .map_err(|err| FetchError::Transport {
                url: url.to_string(),
                source: err.into(),
            })?;
        if body.len() > self.max_body_bytes {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                limit: self.max_body_bytes,
            });
        }

        let (text, used, malformed) = encoding.decode(&body);
        debug!("decoded {} bytes from {} as {}", body.len(), url, used.name());
        if malformed {
            warn!("{} contained bytes invalid in {}", url, used.name());
        }
        Ok(text.into_owned())
    }
}

/// The encoding named by a `Content-Type` charset parameter, if any and
/// if known.
fn charset(content_type: &str) -> Option<&'static Encoding> {
    let mime: mime::Mime = content_type.parse().ok()?;
    let label = mime.get_param(mime::CHARSET)?;
    Encoding::for_label(label.as_str().as_bytes())
}

/// [`Transport`] backed by a blocking reqwest client.
#[cfg(feature = "http")]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl ReqwestTransport {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|err| FetchError::Client { source: err.into() })?;
        Ok(ReqwestTransport { client })
    }
}

#[cfg(feature = "http")]
impl Transport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<Box<dyn HttpResponse>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| FetchError::Transport {
                url: url.to_string(),
                source: err.into(),
            })?;
        Ok(Box::new(response))
    }
}

#[cfg(feature = "http")]
impl HttpResponse for reqwest::blocking::Response {
    fn status(&self) -> u16 {
        reqwest::blocking::Response::status(self).as_u16()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name)?.to_str().ok()
    }

    fn body(&mut self) -> &mut dyn Read {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct Canned {
        status: u16,
        content_type: Option<&'static str>,
        body: Vec<u8>,
    }

    struct CannedResponse {
        status: u16,
        content_type: Option<&'static str>,
        body: Cursor<Vec<u8>>,
    }

    impl HttpResponse for CannedResponse {
        fn status(&self) -> u16 {
            self.status
        }

        fn header(&self, name: &str) -> Option<&str> {
            if name.eq_ignore_ascii_case("content-type") {
                self.content_type
            } else {
                None
            }
        }

        fn body(&mut self) -> &mut dyn Read {
            &mut self.body
        }
    }

    impl Transport for Canned {
        fn get(&self, _url: &str) -> Result<Box<dyn HttpResponse>, FetchError> {
            Ok(Box::new(CannedResponse {
                status: self.status,
                content_type: self.content_type,
                body: Cursor::new(self.body.clone()),
            }))
        }
    }

    fn ok(content_type: Option<&'static str>, body: &[u8]) -> Canned {
        Canned {
            status: 200,
            content_type,
            body: body.to_vec(),
        }
    }

    #[test]
    fn test_charset_parsing() {
        assert_eq!(charset("application/json; charset=utf-8"), Some(UTF_8));
        assert_eq!(
            charset("text/plain;charset=SHIFT_JIS"),
            Some(encoding_rs::SHIFT_JIS)
        );
        assert_eq!(charset("application/json"), None);
        assert_eq!(charset("application/json; charset=klingon"), None);
        assert_eq!(charset("not a mime type"), None);
    }

    #[test]
    fn test_decodes_declared_charset() {
        let (bytes, _, _) = encoding_rs::EUC_KR.encode("[\"안녕\"]");
        let opener = HttpOpener::new(ok(Some("application/json; charset=euc-kr"), &bytes));
        assert_eq!(opener.open("http://x").unwrap(), "[\"안녕\"]");
    }

    #[test]
    fn test_defaults_to_utf8() {
        let opener = HttpOpener::new(ok(None, "\"é\"".as_bytes()));
        assert_eq!(opener.open("http://x").unwrap(), "\"é\"");
    }

    #[test]
    fn test_error_status() {
        let opener = HttpOpener::new(Canned {
            status: 404,
            content_type: None,
            body: Vec::new(),
        });
        assert!(matches!(
            opener.open("http://x/missing"),
            Err(FetchError::Status { status: 404, .. })
        ));
    }

    #[test]
    fn test_body_limit() {
        let opener = HttpOpener::new(ok(None, b"[1,2,3]")).max_body_bytes(4);
        assert!(matches!(
            opener.open("http://x"),
            Err(FetchError::TooLarge { limit: 4, .. })
        ));

        let opener = HttpOpener::new(ok(None, b"[1]")).max_body_bytes(3);
        assert_eq!(opener.open("http://x").unwrap(), "[1]");
    }

    #[cfg(feature = "http")]
    #[test]
    fn test_client_build_failure() {
        let config = FetchConfig {
            user_agent: "bad\nagent".to_string(),
            ..FetchConfig::default()
        };
        let err = ReqwestTransport::new(&config).err().unwrap();
        assert!(matches!(err, FetchError::Client { .. }));
        assert!(
            err.to_string().starts_with("could not build the HTTP client"),
            "{}",
            err
        );
    }
}
