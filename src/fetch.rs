//! Fetching sources and running them through their processor.
//!
//! This is the host side of interception: it retrieves a response over HTTP
//! or from disk and hands it to [`Html2RssProcessor::process`]. Nothing here
//! retries; a failed source simply produces no feed this run.

use crate::intercept::{Html2RssProcessor, InterceptError, InterceptedResponse, RawResponse};
use futures::stream::{self, StreamExt};
use reqwest::header::{HeaderValue, ACCEPT_ENCODING};
use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_PAGE_SIZE: usize = 10 * 1024 * 1024; // 10MB
const MAX_REDIRECTS: usize = 5;

/// Errors that can occur while fetching and transforming one source.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
    /// The page was fetched but could not be turned into a feed.
    #[error("Failed to build feed from {url}: {source}")]
    Transform {
        url: String,
        #[source]
        source: InterceptError,
    },
}

/// Builds the HTTP client used for all sources.
///
/// `timeout` applies per request. Redirects are limited and loops rejected.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, FetchError> {
    Ok(reqwest::Client::builder()
        .redirect(redirect_policy())
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()?)
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("Too many redirects");
        }

        let url = attempt.url();
        for prev in attempt.previous() {
            if prev.as_str() == url.as_str() {
                return attempt.error("Redirect loop detected");
            }
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

/// Fetches `url` and replaces its body with the feed built by `processor`.
///
/// `http`/`https` go through `client`; `file` URLs are read from disk.
///
/// # Errors
///
/// - [`FetchError::Network`] / [`FetchError::Timeout`] / [`FetchError::HttpStatus`]
///   for transport failures
/// - [`FetchError::ResponseTooLarge`] when the body exceeds 10MB
/// - [`FetchError::UnsupportedScheme`] for schemes this transport cannot fetch
/// - [`FetchError::Transform`] when the page does not yield a feed
pub async fn fetch_source(
    client: &reqwest::Client,
    url: &str,
    processor: &Html2RssProcessor,
    timeout: Duration,
) -> Result<InterceptedResponse, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;

    let response = match parsed.scheme() {
        "http" | "https" => fetch_http(client, parsed, timeout).await?,
        "file" => read_file(&parsed).await?,
        // ftp responses can be processed but have to be supplied by the host
        scheme => return Err(FetchError::UnsupportedScheme(scheme.to_owned())),
    };

    processor.process(response)
}

async fn fetch_http(
    client: &reqwest::Client,
    url: Url,
    timeout: Duration,
) -> Result<RawResponse, FetchError> {
    let response = tokio::time::timeout(
        timeout,
        client
            .get(url)
            // The interceptor decodes these itself
            .header(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"))
            .send(),
    )
    .await
    .map_err(|_| FetchError::Timeout)?
    .map_err(FetchError::Network)?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }

    let final_url = response.url().to_string();
    let headers = response.headers().clone();
    let body = tokio::time::timeout(timeout, read_limited_bytes(response, MAX_PAGE_SIZE))
        .await
        .map_err(|_| FetchError::Timeout)??;

    tracing::debug!(url = %final_url, status = status.as_u16(), bytes = body.len(), "Fetched page");

    Ok(RawResponse::new(final_url, body)
        .with_status(status.as_u16(), status.canonical_reason().unwrap_or_default())
        .with_headers(headers))
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

async fn read_file(url: &Url) -> Result<RawResponse, FetchError> {
    let path = url
        .to_file_path()
        .map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
    let io_error = |source| FetchError::Io {
        path: path.display().to_string(),
        source,
    };

    let metadata = tokio::fs::metadata(&path).await.map_err(io_error)?;
    if metadata.len() > MAX_PAGE_SIZE as u64 {
        return Err(FetchError::ResponseTooLarge);
    }
    let body = tokio::fs::read(&path).await.map_err(io_error)?;

    Ok(RawResponse::new(url.as_str(), body))
}

/// A named page to turn into a feed.
#[derive(Debug, Clone)]
pub struct Source {
    pub name: String,
    pub url: String,
    pub processor: Html2RssProcessor,
}

/// Outcome of one source in [`fetch_all`].
pub struct SourceResult {
    pub name: String,
    pub result: Result<InterceptedResponse, FetchError>,
}

/// Fetches all sources with at most `concurrency` in flight.
///
/// Results are returned in completion order, not input order.
pub async fn fetch_all(
    client: &reqwest::Client,
    sources: Vec<Source>,
    concurrency: usize,
    timeout: Duration,
) -> Vec<SourceResult> {
    stream::iter(sources)
        .map(|source| async move {
            let result = fetch_source(client, &source.url, &source.processor, timeout).await;
            match &result {
                Ok(feed) => tracing::info!(
                    source = %source.name,
                    bytes = feed.content_length(),
                    "Source transformed"
                ),
                Err(e) => tracing::warn!(source = %source.name, error = %e, "Source failed"),
            }
            SourceResult {
                name: source.name,
                result,
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::SourceParams;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<html><head><title>Shop</title></head><body>
        <ul><li><a href="/p/1">Lamp</a></li><li><a href="/p/2">Desk</a></li></ul>
    </body></html>"#;

    fn processor() -> Html2RssProcessor {
        let params: SourceParams = [
            ("item", "//li"),
            ("item.title", "./a"),
            ("item.link", "./a/@href"),
        ]
        .into_iter()
        .collect();
        Html2RssProcessor::new(&params).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_http_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shop"))
            .and(header_exists("accept-encoding"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let client = build_client(DEFAULT_TIMEOUT).unwrap();
        let url = format!("{}/shop", server.uri());
        let feed = fetch_source(&client, &url, &processor(), DEFAULT_TIMEOUT)
            .await
            .unwrap();

        let body = String::from_utf8(feed.into_body()).unwrap();
        assert!(body.contains("<title>Lamp</title>"));
        assert!(body.contains(&format!("<link>{}/p/2</link>", server.uri())));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = build_client(DEFAULT_TIMEOUT).unwrap();
        let err = fetch_source(&client, &server.uri(), &processor(), DEFAULT_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus(404)));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b' '; MAX_PAGE_SIZE + 1]))
            .mount(&server)
            .await;

        let client = build_client(DEFAULT_TIMEOUT).unwrap();
        let err = fetch_source(&client, &server.uri(), &processor(), DEFAULT_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::ResponseTooLarge));
    }

    #[tokio::test]
    async fn test_unsupported_schemes() {
        let client = build_client(DEFAULT_TIMEOUT).unwrap();
        for url in ["ftp://example.com/page.html", "gopher://example.com/"] {
            let err = fetch_source(&client, url, &processor(), DEFAULT_TIMEOUT)
                .await
                .unwrap_err();
            assert!(matches!(err, FetchError::UnsupportedScheme(_)), "{url}");
        }
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let client = build_client(DEFAULT_TIMEOUT).unwrap();
        let err = fetch_source(&client, "not a url", &processor(), DEFAULT_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let client = build_client(DEFAULT_TIMEOUT).unwrap();
        let err = fetch_source(
            &client,
            "file:///definitely/not/here.html",
            &processor(),
            DEFAULT_TIMEOUT,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FetchError::Io { .. }));
    }
}
