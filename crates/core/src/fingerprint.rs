use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`.
pub fn fingerprint(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash of the plain concatenation of `parts`, with no separator.
///
/// `fingerprint_text(&["ab", "c"])` equals `fingerprint(b"abc")`; callers
/// that need to tell the parts apart must encode that themselves.
pub fn fingerprint_text(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_sha256_vector() {
        assert_eq!(
            fingerprint(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn text_parts_are_concatenated() {
        assert_eq!(fingerprint_text(&["ab", "c"]), fingerprint(b"abc"));
        assert_eq!(fingerprint_text(&[]), fingerprint(b""));
    }

    #[test]
    fn whitespace_changes_the_digest() {
        assert_ne!(
            fingerprint_text(&["table", "total?"]),
            fingerprint_text(&["table", "total? "])
        );
    }
}
