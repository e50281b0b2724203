//! Mapping HTML pages onto RSS feeds.
//!
//! A source is described by string settings ([`SourceParams`]) that are
//! resolved once into a [`ResolvedConfig`]. Each fetched page then runs
//! through [`transform()`]:
//!
//! - [`document`] parses the HTML into a tree XPath can query
//! - [`path`] evaluates the configured expressions for the channel and
//!   for every matched item element
//! - [`normalize`] and [`sanitize`] turn the results into text or cleaned markup
//! - [`date`] and [`guid`] derive `pubDate` and `guid`
//! - [`assemble`] builds and serializes the RSS document
//!
//! # Example
//!
//! ```ignore
//! use html2rss::feed::{transform_to_xml, ResolvedConfig, SourceParams};
//!
//! let params: SourceParams = [("item", "//article"), ("item.title", "./h2/text()")]
//!     .into_iter()
//!     .collect();
//! let config = ResolvedConfig::resolve(&params)?;
//! let rss = transform_to_xml(html, "https://example.com/", &config)?;
//! ```

pub mod assemble;
pub mod date;
pub mod document;
pub mod guid;
pub mod normalize;
pub mod params;
pub mod path;
pub mod sanitize;
mod transform;

pub use assemble::{
    ChannelDescriptor, FeedDocument, ItemDescriptor, SerializeError, FEED_CONTENT_TYPE,
};
pub use params::{ConfigError, ResolvedConfig, SourceParams};
pub use path::{ExtractedValue, FieldBinding, PathError, PathExpr};
pub use sanitize::CleanList;
pub use transform::{transform, transform_to_xml, TransformError};
