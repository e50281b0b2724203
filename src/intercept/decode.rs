//! Reversing `Content-Encoding` before the page is parsed.

use super::InterceptError;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use reqwest::header::{HeaderMap, CONTENT_ENCODING};
use std::io::Read;

/// SEC-003: Upper bound on a decoded body. A few kilobytes of gzip can
/// expand to gigabytes.
pub const MAX_DECODED_SIZE: usize = 50 * 1024 * 1024; // 50MB

/// A single content coding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Deflate,
}

impl ContentEncoding {
    fn parse(token: &str) -> Result<Self, InterceptError> {
        match token.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => Ok(Self::Identity),
            "gzip" | "x-gzip" => Ok(Self::Gzip),
            "deflate" => Ok(Self::Deflate),
            other => Err(InterceptError::UnsupportedEncoding(other.to_owned())),
        }
    }

    /// Reads the codings listed in `Content-Encoding`, in the order they were
    /// applied. An absent header yields an empty list.
    pub fn from_headers(headers: &HeaderMap) -> Result<Vec<Self>, InterceptError> {
        let mut codings = Vec::new();
        for value in headers.get_all(CONTENT_ENCODING) {
            let value = value
                .to_str()
                .map_err(|_| InterceptError::UnsupportedEncoding(format!("{value:?}")))?;
            for token in value.split(',') {
                match Self::parse(token)? {
                    Self::Identity => {}
                    coding => codings.push(coding),
                }
            }
        }
        Ok(codings)
    }
}

/// Undoes `codings` (listed in application order) on `body`.
pub fn decode_body(body: Vec<u8>, codings: &[ContentEncoding]) -> Result<Vec<u8>, InterceptError> {
    codings
        .iter()
        .rev()
        .try_fold(body, |body, coding| decode_one(&body, *coding))
}

fn decode_one(body: &[u8], coding: ContentEncoding) -> Result<Vec<u8>, InterceptError> {
    match coding {
        ContentEncoding::Identity => Ok(body.to_vec()),
        ContentEncoding::Gzip => read_limited(GzDecoder::new(body)),
        // Servers disagree on whether "deflate" means zlib-wrapped or raw
        ContentEncoding::Deflate => match read_limited(ZlibDecoder::new(body)) {
            Err(InterceptError::Decode(_)) => read_limited(DeflateDecoder::new(body)),
            other => other,
        },
    }
}

fn read_limited<R: Read>(reader: R) -> Result<Vec<u8>, InterceptError> {
    let mut out = Vec::new();
    reader
        .take(MAX_DECODED_SIZE as u64 + 1)
        .read_to_end(&mut out)
        .map_err(InterceptError::Decode)?;
    if out.len() > MAX_DECODED_SIZE {
        return Err(InterceptError::TooLarge);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
    use flate2::Compression;
    use reqwest::header::HeaderValue;
    use std::io::Write;

    const BODY: &[u8] = b"<html><body><p>compressed</p></body></html>";

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn headers(encoding: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ENCODING, HeaderValue::from_str(encoding).unwrap());
        headers
    }

    #[test]
    fn test_no_header_is_no_coding() {
        assert_eq!(ContentEncoding::from_headers(&HeaderMap::new()).unwrap(), vec![]);
        assert_eq!(ContentEncoding::from_headers(&headers("identity")).unwrap(), vec![]);
    }

    #[test]
    fn test_header_tokens() {
        assert_eq!(
            ContentEncoding::from_headers(&headers("GZIP")).unwrap(),
            vec![ContentEncoding::Gzip]
        );
        assert_eq!(
            ContentEncoding::from_headers(&headers("x-gzip")).unwrap(),
            vec![ContentEncoding::Gzip]
        );
        assert_eq!(
            ContentEncoding::from_headers(&headers("deflate, gzip")).unwrap(),
            vec![ContentEncoding::Deflate, ContentEncoding::Gzip]
        );
    }

    #[test]
    fn test_unknown_coding_is_rejected() {
        let err = ContentEncoding::from_headers(&headers("br")).unwrap_err();
        assert!(matches!(err, InterceptError::UnsupportedEncoding(ref c) if c == "br"));
    }

    #[test]
    fn test_gzip() {
        let decoded = decode_body(gzip(BODY), &[ContentEncoding::Gzip]).unwrap();
        assert_eq!(decoded, BODY);
    }

    #[test]
    fn test_deflate_zlib_and_raw() {
        let mut zlib = ZlibEncoder::new(Vec::new(), Compression::default());
        zlib.write_all(BODY).unwrap();
        let zlib = zlib.finish().unwrap();
        assert_eq!(decode_body(zlib, &[ContentEncoding::Deflate]).unwrap(), BODY);

        let mut raw = DeflateEncoder::new(Vec::new(), Compression::default());
        raw.write_all(BODY).unwrap();
        let raw = raw.finish().unwrap();
        assert_eq!(decode_body(raw, &[ContentEncoding::Deflate]).unwrap(), BODY);
    }

    #[test]
    fn test_codings_are_undone_in_reverse() {
        let mut zlib = ZlibEncoder::new(Vec::new(), Compression::default());
        zlib.write_all(BODY).unwrap();
        let twice = gzip(&zlib.finish().unwrap());
        let decoded =
            decode_body(twice, &[ContentEncoding::Deflate, ContentEncoding::Gzip]).unwrap();
        assert_eq!(decoded, BODY);
    }

    #[test]
    fn test_corrupt_gzip_is_decode_error() {
        let err = decode_body(b"not gzip at all".to_vec(), &[ContentEncoding::Gzip]).unwrap_err();
        assert!(matches!(err, InterceptError::Decode(_)));
    }

    #[test]
    fn test_decoded_size_is_capped() {
        let bomb = gzip(&vec![b'a'; MAX_DECODED_SIZE + 1]);
        let err = decode_body(bomb, &[ContentEncoding::Gzip]).unwrap_err();
        assert!(matches!(err, InterceptError::TooLarge));
    }
}
