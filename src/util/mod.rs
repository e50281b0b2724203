//! Utility functions shared by the feed pipeline.
//!
//! - **Text hygiene**: removing characters XML cannot carry
//! - **Blank detection**: the whitespace-is-empty rule used for field emission
//!
//! # Examples
//!
//! ```
//! use html2rss::util::{non_blank, strip_control_chars};
//!
//! assert_eq!(strip_control_chars("a\u{0}b"), "ab");
//! assert_eq!(non_blank("  ".to_string()), None);
//! ```

mod text;

pub use text::{non_blank, strip_control_chars};
