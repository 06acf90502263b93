use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{LegalEntityRecord, ListingRecord, MatchTier, MatchingConfig};

static POSTAL_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{5})\b").expect("postal code pattern is valid"));
static TRAILING_ZIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{5}$").expect("zip pattern is valid"));
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("digits pattern is valid"));

/// Outcome of scoring one entity against one listing
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub final_score: f64,
    pub reason: String,
    pub postal_code_match: bool,
    pub city_match: bool,
}

/// Location bonuses, tiers and acceptance on top of a name score
#[derive(Debug, Clone, Copy)]
pub struct ScoringPolicy {
    config: MatchingConfig,
}

impl ScoringPolicy {
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Score an entity against a listing.
    ///
    /// Final score = name score + postal bonus + city bonus, uncapped. The
    /// reason lists each applied factor in evaluation order.
    pub fn score(&self, listing: &ListingRecord, entity: &LegalEntityRecord, name_score: f64) -> ScoreBreakdown {
        let mut reason = vec![format!("Name match: {:.1}%", name_score)];
        let mut final_score = name_score;
        let address = entity.business_address.as_str();

        let listing_postal = listing.postal_code.trim();
        let postal_code_match = !listing_postal.is_empty()
            && extract_postal_code(address).is_some_and(|code| code == listing_postal);
        if postal_code_match {
            final_score += self.config.postal_code_bonus;
            reason.push(format!("Postal code bonus: +{}", self.config.postal_code_bonus));
        }

        let listing_city = listing.city.trim();
        let city_match = !listing_city.is_empty()
            && extract_city(address).is_some_and(|city| city.to_lowercase() == listing_city.to_lowercase());
        if city_match {
            final_score += self.config.city_bonus;
            reason.push(format!("City bonus: +{}", self.config.city_bonus));
        }

        ScoreBreakdown {
            final_score,
            reason: reason.join("; "),
            postal_code_match,
            city_match,
        }
    }

    pub fn classify(&self, final_score: f64) -> MatchTier {
        if final_score >= self.config.high_threshold {
            MatchTier::High
        } else if final_score >= self.config.medium_threshold {
            MatchTier::Medium
        } else {
            MatchTier::Low
        }
    }

    pub fn is_accepted(&self, final_score: f64) -> bool {
        final_score >= self.config.accept_threshold
    }
}

/// First standalone 5-digit run in an address
pub fn extract_postal_code(address: &str) -> Option<&str> {
    POSTAL_CODE.captures(address).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// City segment of a comma-separated address.
///
/// Takes the last segment, or the one before it when the last ends in a ZIP,
/// then drops digits.
pub fn extract_city(address: &str) -> Option<String> {
    let parts: Vec<&str> = address.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
    let last = parts.last()?;

    let segment = if parts.len() >= 2 && TRAILING_ZIP.is_match(last) {
        parts[parts.len() - 2]
    } else {
        last
    };

    let city = DIGITS.replace_all(segment, "").trim().to_string();
    (!city.is_empty()).then_some(city)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(address: &str) -> LegalEntityRecord {
        LegalEntityRecord {
            legal_name: "CONDAL TAPAS RESTAURANT LLC".to_string(),
            registration_number: "1".to_string(),
            registration_index: "1-1".to_string(),
            status: "ACTIVE".to_string(),
            business_address: address.to_string(),
            resident_agent_name: String::new(),
            resident_agent_address: String::new(),
        }
    }

    fn policy() -> ScoringPolicy {
        ScoringPolicy::new(MatchingConfig::default())
    }

    #[test]
    fn test_extract_postal_code() {
        assert_eq!(extract_postal_code("1 Calle Loiza, San Juan, 00908"), Some("00908"));
        assert_eq!(extract_postal_code("Suite 123456, San Juan"), None);
        assert_eq!(extract_postal_code(""), None);
    }

    #[test]
    fn test_extract_city() {
        assert_eq!(extract_city("1 Calle Loiza, San Juan, 00908").as_deref(), Some("San Juan"));
        assert_eq!(extract_city("1 Calle Loiza, Carolina").as_deref(), Some("Carolina"));
        assert_eq!(extract_city("Bayamon 00956").as_deref(), Some("Bayamon"));
        assert_eq!(extract_city(" , ").as_deref(), None);
    }

    #[test]
    fn test_score_with_both_bonuses() {
        let listing = ListingRecord::new("Condal", "san juan", "00908");
        let breakdown = policy().score(&listing, &entity("1 Calle Loiza, San Juan, 00908"), 90.0);

        assert_eq!(breakdown.final_score, 105.0);
        assert!(breakdown.postal_code_match);
        assert!(breakdown.city_match);
        assert_eq!(breakdown.reason, "Name match: 90.0%; Postal code bonus: +10; City bonus: +5");
    }

    #[test]
    fn test_score_without_address() {
        let listing = ListingRecord::new("Condal", "San Juan", "00908");
        let breakdown = policy().score(&listing, &entity(""), 72.5);

        assert_eq!(breakdown.final_score, 72.5);
        assert!(!breakdown.postal_code_match);
        assert!(!breakdown.city_match);
        assert_eq!(breakdown.reason, "Name match: 72.5%");
    }

    #[test]
    fn test_postal_bonus_is_exact_increment() {
        let listing = ListingRecord::new("Condal", "", "00908");
        let with = policy().score(&listing, &entity("1 Calle Loiza, 00908"), 80.0);
        let without = policy().score(&listing, &entity("1 Calle Loiza, 00901"), 80.0);

        assert_eq!(with.final_score - without.final_score, MatchingConfig::default().postal_code_bonus);
    }

    #[test]
    fn test_classify_and_accept() {
        let policy = policy();
        assert_eq!(policy.classify(95.0), MatchTier::High);
        assert_eq!(policy.classify(94.9), MatchTier::Medium);
        assert_eq!(policy.classify(80.0), MatchTier::Medium);
        assert_eq!(policy.classify(79.9), MatchTier::Low);
        assert!(policy.is_accepted(85.0));
        assert!(!policy.is_accepted(84.9));
    }
}
