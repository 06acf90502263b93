//! Registry Match - resolves map-service business listings to registered legal entities
//!
//! A listing name is normalized and searched against the corporate registry
//! through a rate-limited scraping proxy. Candidates are narrowed by fuzzy
//! similarity and a ranking assistant, resolved to full registry records and
//! scored with location bonuses.

pub mod config;
pub mod core;
pub mod models;
pub mod services;
pub mod testing;

// Re-export commonly used types
pub use crate::core::{name_similarity, normalize_name, MatchError, Matcher, NameMatcher, ScoringPolicy};
pub use crate::models::{LegalEntityRecord, ListingRecord, MatchResult, MatchTier, MatchingConfig};
pub use crate::services::{GatewayError, ProxyGateway, RegistrySearchResolver};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        assert_eq!(normalize_name("Condal Inc."), normalize_name("Condal"));
        assert_eq!(name_similarity("Condal", "CONDAL LLC"), 100.0);
    }
}
