//! The output feed model and its RSS 2.0 serialization.

use crate::util::{non_blank, strip_control_chars};
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fmt::Display;
use std::io::Write;

/// Media type written into `Content-Type` for transformed responses.
pub const FEED_CONTENT_TYPE: &str = "application/rss+xml;charset=UTF-8";

/// Channel-level metadata. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelDescriptor {
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
}

impl ChannelDescriptor {
    /// Builds a descriptor from normalized values, dropping blank ones.
    pub fn new(title: String, description: String, link: String) -> Self {
        Self {
            title: non_blank(title),
            description: non_blank(description),
            link: non_blank(link),
        }
    }
}

/// One feed entry. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemDescriptor {
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub guid: Option<String>,
    pub pub_date: Option<String>,
}

impl ItemDescriptor {
    /// An item is only worth emitting if it has a title or a description.
    pub fn has_content(&self) -> bool {
        self.title.is_some() || self.description.is_some()
    }
}

/// A complete feed: one channel and its items in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedDocument {
    pub channel: ChannelDescriptor,
    pub items: Vec<ItemDescriptor>,
}

/// Serialization failed (only possible if the underlying writer fails).
#[derive(Debug, thiserror::Error)]
#[error("failed to serialize feed: {0}")]
pub struct SerializeError(String);

fn serialize_error<E: Display>(err: E) -> SerializeError {
    SerializeError(err.to_string())
}

impl FeedDocument {
    /// Serializes the feed as UTF-8 RSS 2.0 with an XML declaration.
    pub fn to_xml(&self) -> Result<Vec<u8>, SerializeError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(serialize_error)?;
        writer
            .write_event(Event::Start(
                BytesStart::new("rss").with_attributes([("version", "2.0")]),
            ))
            .map_err(serialize_error)?;
        writer
            .write_event(Event::Start(BytesStart::new("channel")))
            .map_err(serialize_error)?;

        let channel = &self.channel;
        write_optional(&mut writer, "title", channel.title.as_deref())?;
        write_optional(&mut writer, "description", channel.description.as_deref())?;
        write_optional(&mut writer, "link", channel.link.as_deref())?;

        for item in &self.items {
            writer
                .write_event(Event::Start(BytesStart::new("item")))
                .map_err(serialize_error)?;
            write_optional(&mut writer, "title", item.title.as_deref())?;
            write_optional(&mut writer, "description", item.description.as_deref())?;
            write_optional(&mut writer, "link", item.link.as_deref())?;
            if let Some(guid) = item.guid.as_deref() {
                // Content hashes are not URLs
                let start = BytesStart::new("guid").with_attributes([("isPermaLink", "false")]);
                write_text_element(&mut writer, start, guid)?;
            }
            write_optional(&mut writer, "pubDate", item.pub_date.as_deref())?;
            writer
                .write_event(Event::End(BytesEnd::new("item")))
                .map_err(serialize_error)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("channel")))
            .map_err(serialize_error)?;
        writer
            .write_event(Event::End(BytesEnd::new("rss")))
            .map_err(serialize_error)?;

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }
}

fn write_optional<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: Option<&str>,
) -> Result<(), SerializeError> {
    match value {
        Some(value) => write_text_element(writer, BytesStart::new(name), value),
        None => Ok(()),
    }
}

fn write_text_element<W: Write>(
    writer: &mut Writer<W>,
    start: BytesStart<'_>,
    value: &str,
) -> Result<(), SerializeError> {
    let end = start.to_end().into_owned();
    writer
        .write_event(Event::Start(start))
        .map_err(serialize_error)?;
    let clean = strip_control_chars(value);
    writer
        .write_event(Event::Text(BytesText::from_escaped(partial_escape(clean.as_ref()))))
        .map_err(serialize_error)?;
    writer
        .write_event(Event::End(end))
        .map_err(serialize_error)?;
    Ok(())
}
