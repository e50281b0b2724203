use super::response::{InterceptedResponse, Response};
use crate::feed::params::parse_flag;
use crate::feed::{ConfigError, ResolvedConfig, SourceParams};
use crate::fetch::FetchError;
use std::sync::Arc;

/// Namespace under which a host passes per-source settings.
pub const PARAM_PREFIX: &str = "html2rss.";

/// Host argument that turns interception on for a source.
pub const ENABLE_KEY: &str = "html2rss";

/// URL schemes whose responses can be intercepted.
pub const HANDLED_SCHEMES: &[&str] = &["http", "https", "ftp", "file"];

pub fn handles_scheme(scheme: &str) -> bool {
    HANDLED_SCHEMES
        .iter()
        .any(|handled| handled.eq_ignore_ascii_case(scheme))
}

/// Turns responses for one source into feeds.
///
/// The configuration is resolved once at construction and shared read-only
/// by every response the processor handles, so a bad path fails here rather
/// than on each fetch. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct Html2RssProcessor {
    config: Arc<ResolvedConfig>,
}

impl Html2RssProcessor {
    pub fn new(params: &SourceParams) -> Result<Self, ConfigError> {
        Ok(Self {
            config: Arc::new(ResolvedConfig::resolve(params)?),
        })
    }

    /// Builds a processor from a host's full argument list.
    ///
    /// Returns `Ok(None)` unless [`ENABLE_KEY`] is set to a true value. Only
    /// arguments under [`PARAM_PREFIX`] are used, with the prefix removed.
    pub fn for_source<I, K, V>(args: I) -> Result<Option<Self>, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut enabled = false;
        let mut prefixed = Vec::new();
        for (key, value) in args {
            let value: String = value.into();
            if key.as_ref() == ENABLE_KEY {
                enabled = parse_flag(ENABLE_KEY, &value)?;
            } else {
                prefixed.push((key.as_ref().to_owned(), value));
            }
        }
        if !enabled {
            return Ok(None);
        }
        let params = SourceParams::from_prefixed(prefixed, PARAM_PREFIX);
        Self::new(&params).map(Some)
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Replaces the body of `response` with the feed extracted from it.
    ///
    /// Every failure is reported as [`FetchError::Transform`] carrying the
    /// response URL.
    pub fn process<R: Response>(&self, response: R) -> Result<InterceptedResponse, FetchError> {
        let url = response.url().to_owned();
        InterceptedResponse::wrap(response, &self.config).map_err(|source| {
            tracing::warn!(url = %url, error = %source, "Failed to transform response");
            FetchError::Transform { url, source }
        })
    }
}
