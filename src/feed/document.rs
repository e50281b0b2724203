//! Parsed HTML as a queryable tree.
//!
//! `scraper` (html5ever) does the error-correcting HTML parse; the result is
//! copied into an `sxd_document` package so XPath can run over it.

use scraper::{ElementRef, Html, Node as HtmlNode};
use sxd_document::{dom, Package};
use url::Url;

/// Attributes holding URLs that are made absolute against the response URL.
const LINK_ATTRIBUTES: &[&str] = &["href", "src"];

/// Elements nested deeper than this are unwrapped into their deepest kept
/// ancestor, so every later walk over the tree has a bounded depth.
pub const MAX_DEPTH: usize = 512;

/// A parsed page, exclusively owned by one transformation.
pub struct HtmlDocument {
    package: Package,
}

impl HtmlDocument {
    /// Parses `bytes` as HTML. Invalid UTF-8 is replaced rather than rejected.
    ///
    /// With a `base_url`, every `href`/`src` value is resolved against it so
    /// extracted links stay usable outside the page.
    pub fn parse(bytes: &[u8], base_url: Option<&str>) -> Self {
        let html = String::from_utf8_lossy(bytes);
        let parsed = Html::parse_document(&html);
        let base = base_url.and_then(|u| Url::parse(u).ok());

        let package = Package::new();
        {
            let document = package.as_document();
            let root = copy_tree(&document, parsed.root_element(), base.as_ref());
            document.root().append_child(root);
        }
        Self { package }
    }

    pub fn document(&self) -> dom::Document<'_> {
        self.package.as_document()
    }
}

/// Copies the subtree under `source` without recursion.
fn copy_tree<'d>(
    document: &dom::Document<'d>,
    source: ElementRef<'_>,
    base: Option<&Url>,
) -> dom::Element<'d> {
    let root = copy_element(document, source, base);
    // (element receiving the children, children left to copy)
    let mut stack = vec![(root, source.children())];

    while let Some((parent, children)) = stack.last_mut() {
        let parent = *parent;
        let Some(child) = children.next() else {
            stack.pop();
            continue;
        };
        match child.value() {
            HtmlNode::Element(_) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                if stack.len() < MAX_DEPTH {
                    let element = copy_element(document, child, base);
                    parent.append_child(element);
                    stack.push((element, child.children()));
                } else {
                    stack.push((parent, child.children()));
                }
            }
            HtmlNode::Text(text) => parent.append_child(document.create_text(text)),
            HtmlNode::Comment(comment) => parent.append_child(document.create_comment(comment)),
            _ => {}
        }
    }
    root
}

/// The element itself with its attributes, no children.
fn copy_element<'d>(
    document: &dom::Document<'d>,
    source: ElementRef<'_>,
    base: Option<&Url>,
) -> dom::Element<'d> {
    let value = source.value();
    let element = document.create_element(value.name());
    for (name, attr_value) in value.attrs() {
        match resolve_link(name, attr_value, base) {
            Some(absolute) => element.set_attribute_value(name, &absolute),
            None => element.set_attribute_value(name, attr_value),
        };
    }
    element
}

fn resolve_link(name: &str, value: &str, base: Option<&Url>) -> Option<String> {
    let base = base?;
    if !LINK_ATTRIBUTES.contains(&name) || value.trim().is_empty() {
        return None;
    }
    base.join(value.trim()).ok().map(|url| url.to_string())
}
