//! Turns HTML pages into RSS feeds.
//!
//! Each source names the repeated elements of a page that are feed items
//! and, relative to them, where titles, descriptions, links, identifiers and
//! dates live (XPath 1.0). Fetched responses are intercepted and their HTML
//! body replaced by the generated RSS 2.0 document.

pub mod config;
pub mod feed;
pub mod fetch;
pub mod intercept;
pub mod util;
