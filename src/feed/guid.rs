use md5::{Digest, Md5};

/// Derives an item identifier from the raw text of its guid source.
///
/// The text is hashed as extracted, before any sanitizing. Blank input has
/// no identifier.
pub fn derive_guid(raw: &str) -> Option<String> {
    if raw.trim().is_empty() {
        return None;
    }
    Some(format!("{:x}", Md5::digest(raw.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            derive_guid("a1").as_deref(),
            Some("8a8bb7cd343aa2ad99b7d762030857a2")
        );
    }

    #[test]
    fn test_blank_input_has_no_guid() {
        assert_eq!(derive_guid(""), None);
        assert_eq!(derive_guid("  \n"), None);
    }

    #[test]
    fn test_digest_is_128_bit_hex() {
        let guid = derive_guid("https://example.com/post/1").unwrap();
        assert_eq!(guid.len(), 32);
        assert!(guid.chars().all(|c| c.is_ascii_hexdigit()));
    }

    proptest! {
        #[test]
        fn prop_guid_is_deterministic(text in "\\PC{1,64}") {
            prop_assume!(!text.trim().is_empty());
            prop_assert_eq!(derive_guid(&text), derive_guid(&text.clone()));
        }

        #[test]
        fn prop_one_character_changes_the_guid(text in "[a-z0-9]{1,32}", extra in "[a-z0-9]") {
            let changed = format!("{text}{extra}");
            prop_assert_ne!(derive_guid(&text), derive_guid(&changed));
        }
    }
}
