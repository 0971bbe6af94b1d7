use crate::api::errors::ApiError;

/// Passwords are stored as bcrypt hashes; the work factor follows the
/// library default (currently 12).
pub fn hash_password(plain: &str) -> Result<String, ApiError> {
    bcrypt::hash(plain, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::Internal(format!("failed to hash password: {e}")))
}

/// Verification against a stored hash. A malformed hash counts as a failed
/// login, not a 500.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    bcrypt::verify(plain, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_roundtrip() {
        let hash = hash_password("correct-horse-battery").unwrap();
        assert_ne!(hash, "correct-horse-battery");
        assert!(verify_password("correct-horse-battery", &hash));
        assert!(!verify_password("wrong-password", &hash));
    }

    #[test]
    fn test_same_password_hashes_differently() {
        let first = hash_password("hunter22222").unwrap();
        let second = hash_password("hunter22222").unwrap();
        assert_ne!(first, second); // salted
    }

    #[test]
    fn test_malformed_hash_fails_closed() {
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }
}
