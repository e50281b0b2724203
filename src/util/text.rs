use std::borrow::Cow;

/// Returns true for characters XML 1.0 does not allow anywhere in a document.
///
/// Tab, line feed and carriage return are the only C0 controls XML accepts.
/// U+FFFE and U+FFFF are noncharacters and are rejected by strict parsers.
fn is_xml_invalid(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}')
}

/// SEC-001: Strip characters that would make the generated feed unparsable.
///
/// Scraped pages routinely carry stray control bytes (form feeds from pasted
/// PDFs, NULs from broken CMS exports). Written verbatim into the feed they
/// make every conforming reader reject the whole document, not just the item.
///
/// Returns `Cow::Borrowed` when the input is already clean (common case).
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_xml_invalid) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|&c| !is_xml_invalid(c)).collect())
}

/// Converts a normalized field value into an optional one.
///
/// Whitespace-only values count as absent: they decide both whether a feed
/// element is written and whether an item survives.
pub fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
