use super::decode::{decode_body, ContentEncoding};
use super::InterceptError;
use crate::feed::{transform_to_xml, ResolvedConfig, FEED_CONTENT_TYPE};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use std::io::{self, Cursor, Read, Seek, SeekFrom};

/// A fetched response as seen by the interceptor: metadata plus a body
/// that can be read once.
pub trait Response: Read {
    /// Numeric status, `200` for sources without one (files).
    fn status(&self) -> u16;
    /// Status message, e.g. `OK`.
    fn reason(&self) -> &str;
    /// Final URL after redirects.
    fn url(&self) -> &str;
    fn headers(&self) -> &HeaderMap;
}

/// A response whose body is already in memory.
#[derive(Debug, Clone)]
pub struct RawResponse {
    status: u16,
    reason: String,
    url: String,
    headers: HeaderMap,
    body: Cursor<Vec<u8>>,
}

impl RawResponse {
    pub fn new(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            reason: String::from("OK"),
            url: url.into(),
            headers: HeaderMap::new(),
            body: Cursor::new(body),
        }
    }

    pub fn with_status(mut self, status: u16, reason: impl Into<String>) -> Self {
        self.status = status;
        self.reason = reason.into();
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

impl Read for RawResponse {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }
}

impl Response for RawResponse {
    fn status(&self) -> u16 {
        self.status
    }

    fn reason(&self) -> &str {
        &self.reason
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// A response whose body has been replaced by the generated feed.
///
/// Status, reason, URL and every other header are carried over from the
/// original. `Content-Length` and `Content-Type` describe the feed and
/// `Content-Encoding` is gone. The whole feed is built by
/// [`InterceptedResponse::wrap`] before the first byte can be read.
#[derive(Debug, Clone)]
pub struct InterceptedResponse {
    status: u16,
    reason: String,
    url: String,
    headers: HeaderMap,
    body: Cursor<Vec<u8>>,
}

impl InterceptedResponse {
    /// Drains `original`, undoes its content coding and transforms the page.
    pub fn wrap<R: Response>(
        mut original: R,
        config: &ResolvedConfig,
    ) -> Result<Self, InterceptError> {
        let codings = ContentEncoding::from_headers(original.headers())?;

        let mut raw = Vec::new();
        original
            .read_to_end(&mut raw)
            .map_err(InterceptError::Read)?;
        let html = decode_body(raw, &codings)?;

        let url = original.url().to_owned();
        let feed = transform_to_xml(&html, &url, config)?;

        let mut headers = original.headers().clone();
        headers.remove(CONTENT_ENCODING);
        headers.insert(CONTENT_LENGTH, HeaderValue::from(feed.len()));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(FEED_CONTENT_TYPE));

        tracing::debug!(
            url = %url,
            html_bytes = html.len(),
            feed_bytes = feed.len(),
            "Replaced response body with feed"
        );

        Ok(Self {
            status: original.status(),
            reason: original.reason().to_owned(),
            url,
            headers,
            body: Cursor::new(feed),
        })
    }

    /// Byte length of the feed, as advertised in `Content-Length`.
    pub fn content_length(&self) -> usize {
        self.body.get_ref().len()
    }

    /// Current read position in the feed.
    pub fn position(&self) -> u64 {
        self.body.position()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The whole feed, regardless of how much has been read.
    pub fn into_body(self) -> Vec<u8> {
        self.body.into_inner()
    }
}

impl Read for InterceptedResponse {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }
}

impl Seek for InterceptedResponse {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.body.seek(pos)
    }
}

impl Response for InterceptedResponse {
    fn status(&self) -> u16 {
        self.status
    }

    fn reason(&self) -> &str {
        &self.reason
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}
