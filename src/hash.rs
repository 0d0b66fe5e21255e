//! Correlation token generation.

use crate::store::SentEmailStore;

/// Generates correlation tokens that are unique among currently active
/// records. Uniqueness is enforced at creation time by regenerating until
/// a store lookup misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenGenerator;

impl TokenGenerator {
    /// A candidate token: 32 random hex characters.
    pub fn candidate() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    /// Generate a token not currently used by any record in `store`.
    pub fn generate(store: &dyn SentEmailStore) -> String {
        loop {
            let token = Self::candidate();
            if !store.token_in_use(&token) {
                return token;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SentRecord;
    use crate::store::MemoryStore;

    #[test]
    fn test_candidate_shape() {
        let token = TokenGenerator::candidate();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_avoids_active_tokens() {
        let store = MemoryStore::new();
        store.insert(SentRecord::new("taken"));

        let token = TokenGenerator::generate(&store);
        assert_ne!(token, "taken");
        assert!(!store.token_in_use(&token));
    }
}
