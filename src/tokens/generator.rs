use rand::Rng;
use sha2::{Digest, Sha256};

/// Generate `len` random bytes, hex encoded
pub fn generate_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
    hex::encode(bytes)
}

/// Generate a public session identifier (doubles as the refresh token `jti`)
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// SHA-256 fingerprint of a token value, hex encoded.
///
/// The session ledger keys records by this so raw refresh tokens never
/// reach storage.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_hex() {
        let token = generate_hex(32);
        assert_eq!(token.len(), 64);
        assert_ne!(token, generate_hex(32));
    }

    #[test]
    fn test_generate_session_id_is_uuid() {
        let id = generate_session_id();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_hash_token() {
        let hash = hash_token("refresh");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_token("refresh"));
        assert_ne!(hash, hash_token("refresh2"));
    }
}
