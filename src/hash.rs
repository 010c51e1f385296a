use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of everything `f` feeds into the hasher.
pub fn sha256_hex_with(f: impl FnOnce(&mut Sha256)) -> String {
    let mut hasher = Sha256::new();
    f(&mut hasher);
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    sha256_hex_with(|hasher| hasher.update(bytes))
}

/// Hashes each part with a separator so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn sha256_hex_parts<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    sha256_hex_with(|hasher| {
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_input_matches_known_digest() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn parts_are_separated() {
        assert_ne!(sha256_hex_parts(["ab", "c"]), sha256_hex_parts(["a", "bc"]));
        assert_eq!(sha256_hex_parts(["a", "b"]), sha256_hex_parts(["a", "b"]));
    }
}
