use md5::{Digest, Md5};

/// 128-bit MD5 of the UTF-8 bytes of `input`, as 32 lowercase hex characters.
///
/// Cache keys, dedup keys and index content hashes all use this; changing
/// it orphans every existing cache entry.
pub fn fingerprint(input: &str) -> String {
    let digest = Md5::digest(input.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        assert_eq!(fingerprint(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(fingerprint("hello"), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn test_utf8_input() {
        let hash = fingerprint("Zürich");
        assert_eq!(hash.len(), 32);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(hash, fingerprint("Zurich"));
    }
}
