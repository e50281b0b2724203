//! Markup sanitizing for descriptions that keep their HTML.
//!
//! Sanitizing works on an owned copy of the extracted subtree ([`Fragment`]),
//! so the parsed document stays intact for the fields read after it.

use quick_xml::escape::{escape, partial_escape};
use sxd_document::dom;

/// Script-related tags and handler attributes removed when `clean.scripts` is on.
pub const SCRIPT_CLEAN: &str = "script @onclick @onload @onunload @onmouseenter @onmouseleave";

/// Elements serialized without an end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose text content is written unescaped.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Banned tag and attribute names, parsed from the `clean` setting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanList {
    tags: Vec<String>,
    attributes: Vec<String>,
}

impl CleanList {
    /// Parses a whitespace-separated list; `@name` entries ban attributes,
    /// everything else bans tags. Names are matched case-insensitively.
    pub fn parse(spec: &str) -> Self {
        let mut list = Self::default();
        for entry in spec.split_whitespace() {
            match entry.strip_prefix('@') {
                Some("") => {}
                Some(attribute) => list.attributes.push(attribute.to_ascii_lowercase()),
                None => list.tags.push(entry.to_ascii_lowercase()),
            }
        }
        list
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.attributes.is_empty()
    }

    fn bans_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(name))
    }

    fn bans_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

/// An owned copy of a piece of markup.
///
/// Copying, sanitizing and serializing recurse once per nesting level; parsed
/// documents are at most [`MAX_DEPTH`](crate::feed::document::MAX_DEPTH) deep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Element {
        name: String,
        attributes: Vec<(String, String)>,
        children: Vec<Fragment>,
    },
    Text(String),
    Comment(String),
}

impl Fragment {
    /// Deep-copies `element`, including its own tag.
    pub fn copy_of(element: dom::Element<'_>) -> Self {
        Fragment::Element {
            name: element.name().local_part().to_owned(),
            attributes: element
                .attributes()
                .into_iter()
                .map(|a| (a.name().local_part().to_owned(), a.value().to_owned()))
                .collect(),
            children: Self::children_of(element),
        }
    }

    /// Deep-copies the children of `element`, leaving its own tag behind.
    pub fn children_of(element: dom::Element<'_>) -> Vec<Self> {
        element
            .children()
            .into_iter()
            .filter_map(|child| match child {
                dom::ChildOfElement::Element(e) => Some(Self::copy_of(e)),
                dom::ChildOfElement::Text(t) => Some(Fragment::Text(t.text().to_owned())),
                dom::ChildOfElement::Comment(c) => Some(Fragment::Comment(c.text().to_owned())),
                dom::ChildOfElement::ProcessingInstruction(_) => None,
            })
            .collect()
    }
}

/// Removes banned attributes everywhere and unwraps banned tags.
///
/// An unwrapped tag's children take its place in the parent, so its text
/// survives. Applying the same list twice changes nothing further.
pub fn sanitize(nodes: Vec<Fragment>, clean: &CleanList) -> Vec<Fragment> {
    if clean.is_empty() {
        return nodes;
    }
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        strip_into(node, clean, &mut out);
    }
    out
}

fn strip_into(node: Fragment, clean: &CleanList, out: &mut Vec<Fragment>) {
    match node {
        Fragment::Element {
            name,
            mut attributes,
            children,
        } => {
            let children = sanitize(children, clean);
            if clean.bans_tag(&name) {
                out.extend(children);
            } else {
                attributes.retain(|(attribute, _)| !clean.bans_attribute(attribute));
                out.push(Fragment::Element {
                    name,
                    attributes,
                    children,
                });
            }
        }
        other => out.push(other),
    }
}

/// Serializes fragments as HTML.
pub fn to_html(nodes: &[Fragment]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(node, false, &mut out);
    }
    out
}

fn write_node(node: &Fragment, raw_text: bool, out: &mut String) {
    match node {
        Fragment::Text(text) if raw_text => out.push_str(text),
        Fragment::Text(text) => out.push_str(&partial_escape(text.as_str())),
        Fragment::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        Fragment::Element {
            name,
            attributes,
            children,
        } => {
            out.push('<');
            out.push_str(name);
            for (attribute, value) in attributes {
                out.push(' ');
                out.push_str(attribute);
                out.push_str("=\"");
                out.push_str(&escape(value.as_str()));
                out.push('"');
            }
            out.push('>');

            let void = VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(name));
            if void && children.is_empty() {
                return;
            }
            let raw = RAW_TEXT_ELEMENTS.iter().any(|r| r.eq_ignore_ascii_case(name));
            for child in children {
                write_node(child, raw, out);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn el(name: &str, attributes: &[(&str, &str)], children: Vec<Fragment>) -> Fragment {
        Fragment::Element {
            name: name.to_owned(),
            attributes: attributes
                .iter()
                .map(|(a, v)| ((*a).to_owned(), (*v).to_owned()))
                .collect(),
            children,
        }
    }

    fn text(s: &str) -> Fragment {
        Fragment::Text(s.to_owned())
    }

    #[test]
    fn test_parse_clean_list() {
        let list = CleanList::parse("  strong EM @class @Style @ ");
        assert_eq!(list.tags(), &["strong".to_owned(), "em".to_owned()]);
        assert_eq!(list.attributes(), &["class".to_owned(), "style".to_owned()]);
    }

    #[test]
    fn test_parse_empty_clean_list() {
        assert!(CleanList::parse("").is_empty());
        assert!(CleanList::parse("   ").is_empty());
    }

    #[test]
    fn test_banned_tag_is_unwrapped_in_place() {
        let clean = CleanList::parse("strong");
        let nodes = vec![
            text("a "),
            el("strong", &[("class", "x")], vec![text("bold "), el("em", &[], vec![text("it")])]),
            text(" z"),
        ];
        let out = sanitize(nodes, &clean);
        assert_eq!(to_html(&out), "a bold <em>it</em> z");
    }

    #[test]
    fn test_banned_attribute_keeps_element() {
        let clean = CleanList::parse("@class @onclick");
        let nodes = vec![el(
            "a",
            &[("href", "/x"), ("class", "btn"), ("onclick", "go()")],
            vec![text("link")],
        )];
        let out = sanitize(nodes, &clean);
        assert_eq!(to_html(&out), r#"<a href="/x">link</a>"#);
    }

    #[test]
    fn test_nested_banned_tags_are_all_unwrapped() {
        let clean = CleanList::parse("font");
        let nodes = vec![el("font", &[], vec![el("font", &[], vec![text("deep")])])];
        assert_eq!(sanitize(nodes, &clean), vec![text("deep")]);
    }

    #[test]
    fn test_script_is_unwrapped_not_deleted() {
        let clean = CleanList::parse(SCRIPT_CLEAN);
        let nodes = vec![
            el("p", &[("onload", "x()")], vec![text("hi")]),
            el("script", &[], vec![text("var a = 1;")]),
        ];
        assert_eq!(to_html(&sanitize(nodes, &clean)), "<p>hi</p>var a = 1;");
    }

    #[test]
    fn test_to_html_escapes_text_and_attributes() {
        let nodes = vec![el("a", &[("title", "say \"hi\" & go")], vec![text("1 < 2 & 3 > 2")])];
        assert_eq!(
            to_html(&nodes),
            r#"<a title="say &quot;hi&quot; &amp; go">1 &lt; 2 &amp; 3 &gt; 2</a>"#
        );
    }

    #[test]
    fn test_to_html_void_elements_and_comments() {
        let nodes = vec![
            text("line"),
            el("br", &[], vec![]),
            el("img", &[("src", "a.png")], vec![]),
            Fragment::Comment(" c ".to_owned()),
        ];
        assert_eq!(to_html(&nodes), r#"line<br><img src="a.png"><!-- c -->"#);
    }

    #[test]
    fn test_to_html_raw_text_elements() {
        let nodes = vec![el("style", &[], vec![text("a > b { color: red }")])];
        assert_eq!(to_html(&nodes), "<style>a > b { color: red }</style>");
    }

    fn arb_fragment() -> impl Strategy<Value = Fragment> {
        let leaf = prop_oneof![
            "[a-z <&]{0,8}".prop_map(Fragment::Text),
            "[a-z ]{0,8}".prop_map(Fragment::Comment),
        ];
        leaf.prop_recursive(4, 32, 4, |inner| {
            (
                prop::sample::select(vec!["p", "b", "em", "div", "script", "font"]),
                prop::collection::vec(
                    (
                        prop::sample::select(vec!["class", "style", "href", "onclick"]),
                        "[a-z]{0,4}",
                    ),
                    0..3,
                ),
                prop::collection::vec(inner, 0..4),
            )
                .prop_map(|(name, attributes, children)| Fragment::Element {
                    name: name.to_owned(),
                    attributes: attributes
                        .into_iter()
                        .map(|(a, v)| (a.to_owned(), v))
                        .collect(),
                    children,
                })
        })
    }

    fn contains_banned(nodes: &[Fragment], clean: &CleanList) -> bool {
        nodes.iter().any(|node| match node {
            Fragment::Element {
                name,
                attributes,
                children,
            } => {
                clean.bans_tag(name)
                    || attributes.iter().any(|(a, _)| clean.bans_attribute(a))
                    || contains_banned(children, clean)
            }
            _ => false,
        })
    }

    fn text_content(nodes: &[Fragment], out: &mut String) {
        for node in nodes {
            match node {
                Fragment::Text(t) => out.push_str(t),
                Fragment::Element { children, .. } => text_content(children, out),
                Fragment::Comment(_) => {}
            }
        }
    }

    proptest! {
        #[test]
        fn prop_sanitize_is_idempotent(nodes in prop::collection::vec(arb_fragment(), 0..4)) {
            let clean = CleanList::parse("b font script @class @onclick");
            let once = sanitize(nodes, &clean);
            let twice = sanitize(once.clone(), &clean);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_sanitize_removes_banned_and_keeps_text(nodes in prop::collection::vec(arb_fragment(), 0..4)) {
            let clean = CleanList::parse("b font script @class @onclick");
            let mut before = String::new();
            text_content(&nodes, &mut before);

            let cleaned = sanitize(nodes, &clean);
            let mut after = String::new();
            text_content(&cleaned, &mut after);

            prop_assert!(!contains_banned(&cleaned, &clean));
            prop_assert_eq!(before, after);
        }
    }
}
