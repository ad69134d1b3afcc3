//! Password verifiers
//!
//! Passwords are never stored or cached in the clear. Both the internal
//! user table and the credential cache keep Argon2id hashes in PHC string
//! format, each with its own random salt.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;

/// Hash a password using Argon2id
///
/// # Example
///
/// ```
/// use authproxy::auth::password::{hash_password, verify_password};
///
/// let hash = hash_password("correct horse").unwrap();
/// assert!(hash.starts_with("$argon2id$"));
/// assert!(verify_password("correct horse", &hash));
/// ```
pub fn hash_password(password: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| HashError::HashFailed(e.to_string()))
}

/// Verify a password against a stored PHC hash
///
/// Malformed hashes never verify.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Check that `hash` parses as a PHC string
pub fn is_valid_verifier(hash: &str) -> bool {
    PasswordHash::new(hash).is_ok()
}

/// Error type for password hashing operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HashError {
    /// Hashing failed
    #[error("Hash failed: {0}")]
    HashFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: hash_password produces argon2id hash
    #[test]
    fn test_hash_password_argon2id() {
        let hash = hash_password("pw").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(is_valid_verifier(&hash));
    }

    // Test 2: same password hashes differently (salted)
    #[test]
    fn test_hash_password_unique_salts() {
        let hash1 = hash_password("pw").unwrap();
        let hash2 = hash_password("pw").unwrap();

        assert_ne!(hash1, hash2);
    }

    // Test 3: verify_password accepts the right password only
    #[test]
    fn test_verify_password() {
        let hash = hash_password("right").unwrap();

        assert!(verify_password("right", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("", &hash));
    }

    // Test 4: malformed hashes never verify
    #[test]
    fn test_verify_password_invalid_hash() {
        assert!(!verify_password("pw", "not_a_valid_hash"));
        assert!(!is_valid_verifier("pw"));
    }
}
