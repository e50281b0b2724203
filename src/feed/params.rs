//! Per-source settings: raw overrides and their resolved, validated form.

use crate::feed::date::DEFAULT_LOCALE;
use crate::feed::path::{FieldBinding, PathError, PathExpr};
use crate::feed::sanitize::{CleanList, SCRIPT_CLEAN};
use std::collections::BTreeMap;
use thiserror::Error;

pub const DEFAULT_CHANNEL_TITLE: &str = "/html/head/title/text()";
pub const DEFAULT_CHANNEL_DESCRIPTION: &str = "/html/head/meta[@name='description']/@value";

/// Keys understood by [`ResolvedConfig::resolve`].
pub const RECOGNIZED_KEYS: &[&str] = &[
    "channel.title",
    "channel.description",
    "channel.description.textonly",
    "channel.link",
    "channel.allowempty",
    "item",
    "item.title",
    "item.description",
    "item.description.textonly",
    "item.link",
    "item.guid",
    "item.date",
    "item.date.locale",
    "item.date.format",
    "clean",
    "clean.scripts",
];

/// Invalid per-source settings. The source is unusable until they are fixed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}: {source}")]
    Path {
        key: &'static str,
        #[source]
        source: PathError,
    },
    #[error("{key}: expected true or false, got `{value}`")]
    Flag { key: &'static str, value: String },
}

/// Raw `key → value` overrides for one source, as the host supplies them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceParams(BTreeMap<String, String>);

impl SourceParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps only the keys starting with `prefix`, with the prefix removed.
    ///
    /// Hosts namespace plugin settings among their own (`html2rss.item`,
    /// `html2rss.channel.title`, ...); this recovers the plain keys.
    pub fn from_prefixed<I, K, V>(args: I, prefix: &str) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        args.into_iter()
            .filter_map(|(key, value)| {
                key.as_ref()
                    .strip_prefix(prefix)
                    .filter(|k| !k.is_empty())
                    .map(|k| (k.to_owned(), value.into()))
            })
            .collect()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SourceParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Validated settings for one source, built once at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub channel_title: FieldBinding,
    pub channel_description: FieldBinding,
    pub channel_description_textonly: bool,
    /// `None` means the final URL of each response.
    pub channel_link: Option<FieldBinding>,
    pub channel_allow_empty: bool,
    pub item: FieldBinding,
    pub item_title: FieldBinding,
    pub item_description: FieldBinding,
    pub item_description_textonly: bool,
    pub item_link: FieldBinding,
    pub item_guid: FieldBinding,
    pub item_date: FieldBinding,
    pub item_date_locale: String,
    pub item_date_format: String,
    pub clean: CleanList,
}

impl ResolvedConfig {
    /// Merges `params` over the built-in defaults.
    ///
    /// An override replaces its default entirely. Unrecognized keys are
    /// ignored. Path settings are compiled here, so a bad expression fails
    /// registration instead of every fetch.
    pub fn resolve(params: &SourceParams) -> Result<Self, ConfigError> {
        for (key, _) in params.iter() {
            if !RECOGNIZED_KEYS.contains(&key) {
                tracing::debug!(key = %key, "Ignoring unrecognized source parameter");
            }
        }

        let mut clean = params.get("clean").unwrap_or_default().to_owned();
        if flag(params, "clean.scripts", true)? {
            clean.push(' ');
            clean.push_str(SCRIPT_CLEAN);
        }

        Ok(Self {
            channel_title: path_or(params, "channel.title", Some(DEFAULT_CHANNEL_TITLE))?,
            channel_description: path_or(
                params,
                "channel.description",
                Some(DEFAULT_CHANNEL_DESCRIPTION),
            )?,
            channel_description_textonly: flag(params, "channel.description.textonly", false)?,
            channel_link: match params.get("channel.link") {
                Some(_) => Some(path_or(params, "channel.link", None)?),
                None => None,
            },
            channel_allow_empty: flag(params, "channel.allowempty", false)?,
            item: path_or(params, "item", None)?,
            item_title: path_or(params, "item.title", None)?,
            item_description: path_or(params, "item.description", None)?,
            item_description_textonly: flag(params, "item.description.textonly", false)?,
            item_link: path_or(params, "item.link", None)?,
            item_guid: path_or(params, "item.guid", None)?,
            item_date: path_or(params, "item.date", None)?,
            item_date_locale: params
                .get("item.date.locale")
                .unwrap_or(DEFAULT_LOCALE)
                .to_owned(),
            item_date_format: params.get("item.date.format").unwrap_or_default().to_owned(),
            clean: CleanList::parse(&clean),
        })
    }

    /// The channel link binding for one response: the configured path, or
    /// the response's final URL as a constant.
    pub fn channel_link_for(&self, response_url: &str) -> FieldBinding {
        match &self.channel_link {
            Some(binding) => binding.clone(),
            None => FieldBinding::Constant(response_url.to_owned()),
        }
    }
}

/// The override for `key` compiled as a path, or `default` if none is given.
/// A blank override unsets the field.
fn path_or(
    params: &SourceParams,
    key: &'static str,
    default: Option<&str>,
) -> Result<FieldBinding, ConfigError> {
    let Some(source) = params.get(key).or(default) else {
        return Ok(FieldBinding::Absent);
    };
    if source.trim().is_empty() {
        return Ok(FieldBinding::Absent);
    }
    PathExpr::compile(source)
        .map(FieldBinding::Compiled)
        .map_err(|source| ConfigError::Path { key, source })
}

fn flag(params: &SourceParams, key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match params.get(key) {
        Some(value) => parse_flag(key, value),
        None => Ok(default),
    }
}

/// Reads a boolean setting. Accepts `true/yes/on/1` and `false/no/off/0`.
pub(crate) fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::Flag {
            key,
            value: value.to_owned(),
        }),
    }
}
