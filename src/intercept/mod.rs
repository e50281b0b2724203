//! Response interception: swapping an HTML body for the feed built from it.
//!
//! The host fetches a source however it likes (HTTP, a local file, ...) and
//! hands the response to [`Html2RssProcessor::process`]. What comes back
//! looks like the original response except that the body, `Content-Length`
//! and `Content-Type` now describe an RSS document.

mod decode;
mod handler;
mod response;

pub use decode::{ContentEncoding, MAX_DECODED_SIZE};
pub use handler::{handles_scheme, Html2RssProcessor, ENABLE_KEY, HANDLED_SCHEMES, PARAM_PREFIX};
pub use response::{InterceptedResponse, RawResponse, Response};

use crate::feed::TransformError;
use std::io;
use thiserror::Error;

/// Why a response could not be replaced by a feed.
#[derive(Debug, Error)]
pub enum InterceptError {
    #[error("failed to read response body: {0}")]
    Read(#[source] io::Error),

    #[error("unsupported content encoding `{0}`")]
    UnsupportedEncoding(String),

    #[error("failed to decode response body: {0}")]
    Decode(#[source] io::Error),

    #[error("decoded response body exceeds {} bytes", MAX_DECODED_SIZE)]
    TooLarge,

    #[error(transparent)]
    Transform(#[from] TransformError),
}
