use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use sha2::{Digest, Sha256};

const SALT_LEN: usize = 20;

fn salted_digest(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Stored form: 20-char alphanumeric salt followed by base64(SHA-256(password || salt)).
pub fn hash_password(password: &str) -> String {
    let salt: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LEN)
        .map(char::from)
        .collect();
    let digest = salted_digest(password, &salt);
    format!("{}{}", salt, digest)
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    if stored.len() <= SALT_LEN || !stored.is_char_boundary(SALT_LEN) {
        return false;
    }
    let (salt, digest) = stored.split_at(SALT_LEN);
    salted_digest(password, salt) == digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let stored = hash_password("hunter22");
        // salt + 44 chars of base64 SHA-256
        assert_eq!(stored.len(), SALT_LEN + 44);
        assert!(verify_password("hunter22", &stored));
        assert!(!verify_password("hunter23", &stored));
    }

    #[test]
    fn salts_differ() {
        assert_ne!(hash_password("same"), hash_password("same"));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("anything", ""));
        assert!(!verify_password("anything", "tooshort"));
    }
}
