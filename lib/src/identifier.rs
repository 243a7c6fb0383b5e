//! Content-derived identifiers for reified statements and literal values.
//!
//! An identifier is the MD5 digest of the plain UTF-8 concatenation of its parts,
//! rendered as 32 lowercase hex digits. There is no separator between parts. An absent
//! language tag is always hashed as the empty string, so `lang = None` and `lang = ""`
//! produce the same identifier.

use md5::{Digest, Md5};

/// Hashes the concatenation of `parts`.
pub fn hash_parts(parts: &[&str]) -> String {
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Identifier of an object-valued statement.
pub fn statement_id(subject: &str, predicate: &str, object: &str) -> String {
    hash_parts(&[subject, predicate, object])
}

/// Identifier of a literal-valued statement; the language tag takes part in it.
pub fn literal_statement_id(subject: &str, predicate: &str, object: &str, language: &str) -> String {
    hash_parts(&[subject, predicate, object, language])
}

/// Identifier of a distinct literal value. Statements sharing `(value, language)`
/// resolve to the same value vertex.
pub fn value_id(value: &str, language: &str) -> String {
    hash_parts(&[value, language])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_object_statement_hash() {
        assert_eq!(
            statement_id(
                "http://example.org/Alice",
                "http://example.org/knows",
                "http://example.org/Bob"
            ),
            "cbe32d54e0f3dad472beb2c352338bb1"
        );
    }

    #[test]
    fn value_without_language_hashes_like_empty_string() {
        assert_eq!(value_id("30", ""), "34173cb38f07f89ddbebc2ac9128303f");
        assert_eq!(value_id("30", ""), hash_parts(&["30"]));
        assert_eq!(hash_parts(&[]), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn identifiers_are_deterministic() {
        let a = literal_statement_id("s", "p", "o", "en");
        let b = literal_statement_id("s", "p", "o", "en");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn shared_literal_collapses_to_one_value() {
        let v1 = value_id("Alice", "en");
        let v2 = value_id("Alice", "en");
        assert_eq!(v1, v2);
        assert_eq!(v1, "f0fdcca4722b31e6216f9bd7f29e933c");
        let s1 = literal_statement_id("http://ex/a", "http://ex/name", "Alice", "en");
        let s2 = literal_statement_id("http://ex/b", "http://ex/label", "Alice", "en");
        assert_ne!(s1, s2);
        assert_ne!(value_id("Alice", "en"), value_id("Alice", "de"));
    }
}
