//! Date normalization for `pubDate`.
//!
//! Raw dates are parsed with a `strptime`-style format under a named locale
//! and always rendered as `Wed, 02 Oct 2024 15:04:05 +0000`, whatever locale
//! the page used.
//!
//! The active parse locale is process-wide state. Switching it happens inside
//! [`LocaleScope`], which holds a global lock for the whole parse and restores
//! the previous locale when dropped, so concurrent sources parsing with
//! different locales never see each other's month names.

use chrono::{DateTime, FixedOffset, Locale, NaiveDate, NaiveDateTime};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Output representation shared by every emitted date.
pub const OUTPUT_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Locale whose names are understood without translation.
pub const DEFAULT_LOCALE: &str = "C";

/// The process-wide parse locale. `None` is the C/POSIX locale.
static ACTIVE_LOCALE: Mutex<Option<Locale>> = Mutex::new(None);

/// Exclusive, scoped use of the process-wide parse locale.
struct LocaleScope {
    active: MutexGuard<'static, Option<Locale>>,
    saved: Option<Locale>,
}

impl LocaleScope {
    /// Blocks until no other parse is running, then switches to `locale`.
    fn enter(locale: Option<Locale>) -> Self {
        let mut active = ACTIVE_LOCALE
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let saved = std::mem::replace(&mut *active, locale);
        Self { active, saved }
    }

    /// Every C-locale reading of `raw`, most likely first.
    fn readings(&self, raw: &str, format: &str) -> Vec<String> {
        match *self.active {
            Some(locale) => {
                let table = name_table(locale, NameStyle::for_format(format));
                readings(&split_names(raw, &table))
            }
            None => vec![raw.to_owned()],
        }
    }
}

impl Drop for LocaleScope {
    fn drop(&mut self) {
        *self.active = self.saved;
    }
}

/// Looks up a locale name such as `fr_FR`, `de_DE.UTF-8` or `C`.
///
/// `Ok(None)` is the C locale; `Err(())` means the name is unknown.
fn lookup_locale(name: &str) -> Result<Option<Locale>, ()> {
    let base = name
        .split(['.', '@'])
        .next()
        .unwrap_or_default()
        .trim();
    match base {
        "" | "C" | "POSIX" => Ok(None),
        _ => Locale::try_from(base).map(Some).map_err(|_| ()),
    }
}

/// Which C-locale spelling is tried first when the locale uses the same
/// word for the full and abbreviated form (French "mars", "mai").
#[derive(Debug, Clone, Copy)]
struct NameStyle {
    months: [&'static str; 2],
    days: [&'static str; 2],
}

impl NameStyle {
    /// `%b` and `%a` only accept abbreviations, `%B` and `%A` accept both.
    fn for_format(format: &str) -> Self {
        let short_months =
            (format.contains("%b") || format.contains("%h")) && !format.contains("%B");
        let short_days = format.contains("%a") && !format.contains("%A");
        Self {
            months: if short_months { ["%b", "%B"] } else { ["%B", "%b"] },
            days: if short_days { ["%a", "%A"] } else { ["%A", "%a"] },
        }
    }
}

/// Upper bound on the candidate spellings tried for one date.
const MAX_READINGS: usize = 32;

/// Localized month and weekday names with every C-locale name each one can
/// stand for, longest first.
///
/// A word can be ambiguous: Spanish and Italian "mar" is both Tuesday and
/// March. Which one is meant is settled by parsing.
fn name_table(locale: Locale, style: NameStyle) -> Vec<(String, Vec<String>)> {
    let mut table: Vec<(String, Vec<String>)> = Vec::with_capacity(38);
    // 2024-01-01 is a Monday; the first seven days cover every weekday.
    let samples = (1..=12)
        .filter_map(|month| NaiveDate::from_ymd_opt(2024, month, 1))
        .map(|date| (date, style.months))
        .chain(
            (1..=7)
                .filter_map(|day| NaiveDate::from_ymd_opt(2024, 1, day))
                .map(|date| (date, style.days)),
        );
    for (date, formats) in samples {
        let Some(moment) = date.and_hms_opt(0, 0, 0).map(|d| d.and_utc()) else {
            continue;
        };
        for format in formats {
            let localized = moment.format_localized(format, locale).to_string();
            let c_name = moment.format(format).to_string();
            if localized.is_empty() || localized == c_name {
                continue;
            }
            match table.iter().position(|(name, _)| *name == localized) {
                Some(index) => {
                    let c_names = &mut table[index].1;
                    if !c_names.contains(&c_name) {
                        c_names.push(c_name);
                    }
                }
                None => table.push((localized, vec![c_name])),
            }
        }
    }
    table.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));
    table
}

#[derive(Debug, PartialEq)]
enum Piece<'a> {
    Text(&'a str),
    /// A localized name as written, with its C-locale candidates.
    Name {
        raw: &'a str,
        c_names: &'a [String],
    },
}

/// Splits `raw` at whole-word, case-insensitive occurrences of localized names.
fn split_names<'a>(raw: &'a str, table: &'a [(String, Vec<String>)]) -> Vec<Piece<'a>> {
    let mut pieces = Vec::new();
    let mut literal_start = 0;
    let mut pos = 0;
    let mut previous: Option<char> = None;

    'scan: while let Some(current) = raw[pos..].chars().next() {
        if !previous.is_some_and(char::is_alphabetic) {
            let rest = &raw[pos..];
            for (localized, c_names) in table {
                let Some(len) = prefix_len_ignore_case(rest, localized) else {
                    continue;
                };
                if rest[len..].chars().next().is_some_and(char::is_alphabetic) {
                    continue;
                }
                if literal_start < pos {
                    pieces.push(Piece::Text(&raw[literal_start..pos]));
                }
                pieces.push(Piece::Name {
                    raw: &rest[..len],
                    c_names: c_names.as_slice(),
                });
                previous = rest[..len].chars().last();
                pos += len;
                literal_start = pos;
                continue 'scan;
            }
        }
        previous = Some(current);
        pos += current.len_utf8();
    }
    if literal_start < raw.len() {
        pieces.push(Piece::Text(&raw[literal_start..]));
    }
    pieces
}

/// Expands `pieces` into full strings, one per combination of candidate
/// names. The word as written is the last candidate for each name.
fn readings(pieces: &[Piece<'_>]) -> Vec<String> {
    let mut readings = vec![String::new()];
    for piece in pieces {
        match piece {
            Piece::Text(text) => readings.iter_mut().for_each(|r| r.push_str(text)),
            Piece::Name { raw, c_names } => {
                let options: Vec<&str> = c_names
                    .iter()
                    .map(String::as_str)
                    .chain(std::iter::once(*raw))
                    .collect();
                readings = readings
                    .iter()
                    .flat_map(|prefix| options.iter().map(move |name| format!("{prefix}{name}")))
                    .take(MAX_READINGS)
                    .collect();
            }
        }
    }
    readings
}

/// Byte length of the prefix of `haystack` equal to `needle` ignoring case.
fn prefix_len_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    let mut consumed = 0;
    let mut hay = haystack.chars();
    for expected in needle.chars() {
        let actual = hay.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
        consumed += actual.len_utf8();
    }
    Some(consumed)
}

/// Parses C-locale text with `format`.
///
/// Formats without an offset are read as UTC; formats without a time of day
/// as midnight. An empty format accepts RFC 2822 or RFC 3339.
fn parse_timestamp(text: &str, format: &str) -> Option<DateTime<FixedOffset>> {
    if format.trim().is_empty() {
        return DateTime::parse_from_rfc2822(text)
            .or_else(|_| DateTime::parse_from_rfc3339(text))
            .ok();
    }
    if let Ok(parsed) = DateTime::parse_from_str(text, format) {
        return Some(parsed);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
        return Some(naive.and_utc().fixed_offset());
    }
    NaiveDate::parse_from_str(text, format)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Parses `raw` under `locale` with `format`.
///
/// Every failure (empty text, unknown locale, mismatching format) is `None`.
pub fn parse_date(raw: &str, locale: &str, format: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let Ok(locale) = lookup_locale(locale) else {
        tracing::debug!(locale = %locale, "Unknown date locale");
        return None;
    };

    let scope = LocaleScope::enter(locale);
    scope
        .readings(raw, format)
        .iter()
        .find_map(|text| parse_timestamp(text, format))
}

/// Normalizes `raw` into [`OUTPUT_FORMAT`], or an empty string if it cannot
/// be parsed. A bad date never fails the item.
pub fn normalize_date(raw: &str, locale: &str, format: &str) -> String {
    match parse_date(raw, locale, format) {
        Some(parsed) => parsed.format(OUTPUT_FORMAT).to_string(),
        None => {
            if !raw.trim().is_empty() {
                tracing::debug!(raw = %raw.trim(), format = %format, "Unparsable item date");
            }
            String::new()
        }
    }
}
