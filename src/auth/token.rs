use sha2::{Digest, Sha256};

/// Generate an API token. Returns `(raw_token, sha256_hash)`.
/// Format: `vw_` + 32 random bytes as hex (67 chars total).
pub fn generate_api_token() -> (String, String) {
    let mut bytes = [0u8; 32];
    rand::fill(&mut bytes);
    let raw = format!("vw_{}", hex::encode(bytes));
    let hash = hash_token(&raw);
    (raw, hash)
}

/// SHA-256 hash of a token string, returned as lowercase hex.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_token_format() {
        let (raw, hash) = generate_api_token();
        assert!(raw.starts_with("vw_"));
        assert_eq!(raw.len(), 3 + 64);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_token(&raw));
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash_token("vw_abc123"), hash_token("vw_abc123"));
    }

    #[test]
    fn different_tokens_different_hashes() {
        let (raw1, hash1) = generate_api_token();
        let (raw2, hash2) = generate_api_token();
        assert_ne!(raw1, raw2);
        assert_ne!(hash1, hash2);
    }
}
