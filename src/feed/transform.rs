//! The extraction pipeline: HTML bytes in, feed document out.

use crate::feed::assemble::{ChannelDescriptor, FeedDocument, ItemDescriptor, SerializeError};
use crate::feed::date::normalize_date;
use crate::feed::document::HtmlDocument;
use crate::feed::guid::derive_guid;
use crate::feed::normalize::{normalize, textualize};
use crate::feed::params::ResolvedConfig;
use crate::feed::path::{CompiledBinding, FieldBinding, PathError};
use crate::util::non_blank;
use sxd_xpath::nodeset::Node;
use sxd_xpath::Context;
use thiserror::Error;

/// A response could not be turned into a feed.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The item path matched nothing and empty feeds are not allowed.
    /// Usually means the site changed its layout.
    #[error("no items matched `{path}`")]
    EmptyFeed { path: String },

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Serialize(#[from] SerializeError),
}

impl TransformError {
    pub fn is_empty_feed(&self) -> bool {
        matches!(self, TransformError::EmptyFeed { .. })
    }
}

/// Every binding of a [`ResolvedConfig`], compiled for one response.
struct Bindings<'a> {
    channel_title: CompiledBinding<'a>,
    channel_description: CompiledBinding<'a>,
    channel_link: CompiledBinding<'a>,
    item: CompiledBinding<'a>,
    item_title: CompiledBinding<'a>,
    item_description: CompiledBinding<'a>,
    item_link: CompiledBinding<'a>,
    item_guid: CompiledBinding<'a>,
    item_date: CompiledBinding<'a>,
}

impl<'a> Bindings<'a> {
    fn compile(
        config: &'a ResolvedConfig,
        channel_link: &'a FieldBinding,
    ) -> Result<Self, PathError> {
        Ok(Self {
            channel_title: config.channel_title.compile()?,
            channel_description: config.channel_description.compile()?,
            channel_link: channel_link.compile()?,
            item: config.item.compile()?,
            item_title: config.item_title.compile()?,
            item_description: config.item_description.compile()?,
            item_link: config.item_link.compile()?,
            item_guid: config.item_guid.compile()?,
            item_date: config.item_date.compile()?,
        })
    }
}

/// Extracts a feed from an HTML page.
///
/// `response_url` is the final URL of the fetch. It is the base for relative
/// links and the channel link unless `channel.link` is configured.
pub fn transform(
    html: &[u8],
    response_url: &str,
    config: &ResolvedConfig,
) -> Result<FeedDocument, TransformError> {
    let page = HtmlDocument::parse(html, Some(response_url));
    let document = page.document();
    let root: Node<'_> = document.root().into();
    let context = Context::new();
    let channel_link = config.channel_link_for(response_url);
    let bindings = Bindings::compile(config, &channel_link)?;

    let channel = ChannelDescriptor::new(
        textualize(&bindings.channel_title.evaluate(&context, root)?),
        normalize(
            &bindings.channel_description.evaluate(&context, root)?,
            config.channel_description_textonly,
            &config.clean,
        ),
        textualize(&bindings.channel_link.evaluate(&context, root)?),
    );

    let matched = bindings.item.select(&context, root)?;
    if matched.is_empty() && !config.channel_allow_empty {
        return Err(TransformError::EmptyFeed {
            path: describe(&bindings.item),
        });
    }

    let mut items = Vec::with_capacity(matched.len());
    for (index, node) in matched.into_iter().enumerate() {
        let item = extract_item(&bindings, config, &context, node)?;
        if item.has_content() {
            items.push(item);
        } else {
            tracing::debug!(url = %response_url, index, "Skipping item without title or description");
        }
    }

    tracing::info!(url = %response_url, items = items.len(), "Transformed page into feed");
    Ok(FeedDocument { channel, items })
}

fn extract_item<'d>(
    bindings: &Bindings<'_>,
    config: &ResolvedConfig,
    context: &Context<'d>,
    node: Node<'d>,
) -> Result<ItemDescriptor, PathError> {
    let title = textualize(&bindings.item_title.evaluate(context, node)?);
    let description = normalize(
        &bindings.item_description.evaluate(context, node)?,
        config.item_description_textonly,
        &config.clean,
    );
    let link = textualize(&bindings.item_link.evaluate(context, node)?);
    let guid = derive_guid(&textualize(&bindings.item_guid.evaluate(context, node)?));

    let raw_date = textualize(&bindings.item_date.evaluate(context, node)?);
    let pub_date = normalize_date(&raw_date, &config.item_date_locale, &config.item_date_format);

    Ok(ItemDescriptor {
        title: non_blank(title),
        description: non_blank(description),
        link: non_blank(link),
        guid,
        pub_date: non_blank(pub_date),
    })
}

fn describe(binding: &CompiledBinding<'_>) -> String {
    match binding {
        CompiledBinding::Absent => String::from("(no item path)"),
        CompiledBinding::Constant(value) => (*value).to_owned(),
        CompiledBinding::Path { expr, .. } => (*expr).to_owned(),
    }
}

/// Runs [`transform`] and serializes the result.
pub fn transform_to_xml(
    html: &[u8],
    response_url: &str,
    config: &ResolvedConfig,
) -> Result<Vec<u8>, TransformError> {
    Ok(transform(html, response_url, config)?.to_xml()?)
}
