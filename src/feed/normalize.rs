//! Turning path results into field strings.

use crate::feed::path::ExtractedValue;
use crate::feed::sanitize::{sanitize, to_html, CleanList, Fragment};
use sxd_document::dom;

/// Renders a value as plain text.
///
/// An element contributes only its own leading text, i.e. the text before
/// its first child node, not the text of its descendants. List members are
/// concatenated without a separator.
pub fn textualize(value: &ExtractedValue<'_>) -> String {
    let mut out = String::new();
    push_text(value, &mut out);
    out
}

fn push_text(value: &ExtractedValue<'_>, out: &mut String) {
    match value {
        ExtractedValue::Absent => {}
        ExtractedValue::Text(text) => out.push_str(text),
        ExtractedValue::Node(element) => push_leading_text(*element, out),
        ExtractedValue::NodeList(members) => {
            for member in members {
                push_text(member, out);
            }
        }
    }
}

fn push_leading_text(element: dom::Element<'_>, out: &mut String) {
    for child in element.children() {
        match child {
            dom::ChildOfElement::Text(text) => out.push_str(text.text()),
            _ => break,
        }
    }
}

/// Renders a value as sanitized markup.
///
/// An element contributes its children serialized as HTML, never its own
/// tag. Banned tags are unwrapped and banned attributes dropped on a copy;
/// the document itself is not touched.
pub fn markup(value: &ExtractedValue<'_>, clean: &CleanList) -> String {
    let mut out = String::new();
    push_markup(value, clean, &mut out);
    out
}

fn push_markup(value: &ExtractedValue<'_>, clean: &CleanList, out: &mut String) {
    match value {
        ExtractedValue::Absent => {}
        ExtractedValue::Text(text) => out.push_str(text),
        ExtractedValue::Node(element) => {
            let fragment = sanitize(Fragment::children_of(*element), clean);
            out.push_str(&to_html(&fragment));
        }
        ExtractedValue::NodeList(members) => {
            for member in members {
                push_markup(member, clean, out);
            }
        }
    }
}

/// Renders a value as text or sanitized markup according to `textonly`.
pub fn normalize(value: &ExtractedValue<'_>, textonly: bool, clean: &CleanList) -> String {
    if textonly {
        textualize(value)
    } else {
        markup(value, clean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::document::HtmlDocument;
    use crate::feed::path::{FieldBinding, PathExpr};
    use pretty_assertions::assert_eq;
    use sxd_xpath::Context;

    const PAGE: &str = r#"<html><body>
        <div id="d">Lead <b class="k">bold</b> tail<i>x</i></div>
        <p id="p1">One</p><p id="p2">Two</p>
    </body></html>"#;

    fn with_value<F>(expr: &str, check: F)
    where
        F: FnOnce(&ExtractedValue<'_>),
    {
        let doc = HtmlDocument::parse(PAGE.as_bytes(), None);
        let document = doc.document();
        let context = Context::new();
        let binding = FieldBinding::Compiled(PathExpr::compile(expr).unwrap());
        let value = binding
            .compile()
            .unwrap()
            .evaluate(&context, document.root().into())
            .unwrap();
        check(&value);
    }

    #[test]
    fn test_absent_is_empty() {
        let clean = CleanList::default();
        assert_eq!(textualize(&ExtractedValue::Absent), "");
        assert_eq!(markup(&ExtractedValue::Absent, &clean), "");
    }

    #[test]
    fn test_text_is_kept_verbatim() {
        let value = ExtractedValue::Text("a <b> & c".to_owned());
        assert_eq!(textualize(&value), "a <b> & c");
        assert_eq!(markup(&value, &CleanList::default()), "a <b> & c");
    }

    #[test]
    fn test_textualize_element_takes_leading_text_only() {
        with_value("//div", |value| {
            assert_eq!(textualize(value), "Lead ");
        });
    }

    #[test]
    fn test_markup_serializes_children_without_own_tag() {
        with_value("//div", |value| {
            assert_eq!(
                markup(value, &CleanList::default()),
                r#"Lead <b class="k">bold</b> tail<i>x</i>"#
            );
        });
    }

    #[test]
    fn test_markup_applies_clean_list() {
        with_value("//div", |value| {
            let clean = CleanList::parse("i @class");
            assert_eq!(markup(value, &clean), "Lead <b>bold</b> tailx");
        });
    }

    #[test]
    fn test_markup_does_not_mutate_document() {
        let doc = HtmlDocument::parse(PAGE.as_bytes(), None);
        let document = doc.document();
        let context = Context::new();
        let binding = FieldBinding::Compiled(PathExpr::compile("//div").unwrap());
        let compiled = binding.compile().unwrap();

        let value = compiled.evaluate(&context, document.root().into()).unwrap();
        let _ = markup(&value, &CleanList::parse("b @class"));

        let again = compiled.evaluate(&context, document.root().into()).unwrap();
        assert_eq!(
            markup(&again, &CleanList::default()),
            r#"Lead <b class="k">bold</b> tail<i>x</i>"#
        );
    }

    #[test]
    fn test_lists_concatenate_without_separator() {
        with_value("//p", |value| {
            assert_eq!(textualize(value), "OneTwo");
            assert_eq!(markup(value, &CleanList::default()), "OneTwo");
        });
        with_value("//p/@id", |value| {
            assert_eq!(textualize(value), "p1p2");
        });
    }

    #[test]
    fn test_normalize_dispatches_on_textonly() {
        with_value("//div", |value| {
            let clean = CleanList::default();
            assert_eq!(normalize(value, true, &clean), "Lead ");
            assert!(normalize(value, false, &clean).contains("<b"));
        });
    }
}
