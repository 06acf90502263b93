use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// A map-service listing to be resolved against the registry
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ListingRecord {
    #[serde(rename = "googleId", alias = "google_id", default)]
    pub external_id: String,
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub city: String,
    #[serde(rename = "postalCode", alias = "postal_code", default)]
    pub postal_code: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub rating: f64,
    #[serde(rename = "reviewsCount", alias = "reviews_count", default)]
    pub reviews_count: u32,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(rename = "mainType", alias = "main_type", default)]
    pub main_type: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl ListingRecord {
    /// Minimal listing with only the fields the matcher reads
    pub fn new(name: impl Into<String>, city: impl Into<String>, postal_code: impl Into<String>) -> Self {
        Self {
            external_id: String::new(),
            name: name.into(),
            address: String::new(),
            phone: String::new(),
            city: city.into(),
            postal_code: postal_code.into(),
            latitude: 0.0,
            longitude: 0.0,
            rating: 0.0,
            reviews_count: 0,
            website: None,
            main_type: None,
            categories: vec![],
        }
    }
}

/// Summary entity returned by a registry name search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateEntity {
    #[serde(default)]
    pub business_entity_id: Option<i64>,
    #[serde(default)]
    pub registration_number: Option<i64>,
    #[serde(default)]
    pub registration_index: Option<String>,
    #[serde(default)]
    pub corp_name: Option<String>,
    #[serde(default)]
    pub class_es: Option<String>,
    #[serde(default)]
    pub class_en: Option<String>,
    #[serde(default)]
    pub profit_type_es: Option<String>,
    #[serde(default)]
    pub profit_type_en: Option<String>,
    #[serde(default)]
    pub status_id: Option<i64>,
    #[serde(default)]
    pub status_es: Option<String>,
    #[serde(default)]
    pub status_en: Option<String>,
}

impl CandidateEntity {
    pub fn name(&self) -> &str {
        self.corp_name.as_deref().unwrap_or("")
    }

    pub fn index(&self) -> &str {
        self.registration_index.as_deref().unwrap_or("")
    }
}

/// Registry legal entity, resolved from a detail lookup or from search summary data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegalEntityRecord {
    #[serde(rename = "legalName")]
    pub legal_name: String,
    #[serde(rename = "registrationNumber")]
    pub registration_number: String,
    #[serde(rename = "registrationIndex")]
    pub registration_index: String,
    pub status: String,
    #[serde(rename = "businessAddress")]
    pub business_address: String,
    #[serde(rename = "residentAgentName")]
    pub resident_agent_name: String,
    #[serde(rename = "residentAgentAddress")]
    pub resident_agent_address: String,
}

impl LegalEntityRecord {
    /// Build a record from search summary fields only.
    ///
    /// Returns `None` when the candidate has no registration index, since the
    /// index is the join key back to the registry.
    pub fn from_candidate(candidate: &CandidateEntity) -> Option<Self> {
        let registration_index = candidate.index().trim();
        if registration_index.is_empty() {
            return None;
        }

        Some(Self {
            legal_name: candidate.name().to_string(),
            registration_number: candidate
                .registration_number
                .map(|n| n.to_string())
                .unwrap_or_default(),
            registration_index: registration_index.to_string(),
            status: candidate.status_en.clone().unwrap_or_default(),
            business_address: String::new(),
            resident_agent_name: String::new(),
            resident_agent_address: String::new(),
        })
    }
}

/// Confidence tier of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTier {
    High,
    Medium,
    Low,
    None,
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchTier::High => "high",
            MatchTier::Medium => "medium",
            MatchTier::Low => "low",
            MatchTier::None => "none",
        };
        f.write_str(s)
    }
}

/// One evaluated candidate for a listing, or a sentinel when nothing could be evaluated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub listing: ListingRecord,
    pub business: Option<LegalEntityRecord>,
    #[serde(rename = "confidenceScore")]
    pub confidence_score: f64,
    #[serde(rename = "matchType")]
    pub match_tier: MatchTier,
    #[serde(rename = "isAccepted")]
    pub is_accepted: bool,
    #[serde(rename = "nameScore")]
    pub name_score: f64,
    #[serde(rename = "postalCodeMatch")]
    pub postal_code_match: bool,
    #[serde(rename = "cityMatch")]
    pub city_match: bool,
    #[serde(rename = "matchReason")]
    pub match_reason: String,
}

impl MatchResult {
    /// Zero-score result with tier `none`
    pub fn sentinel(listing: ListingRecord, reason: impl Into<String>) -> Self {
        Self {
            listing,
            business: None,
            confidence_score: 0.0,
            match_tier: MatchTier::None,
            is_accepted: false,
            name_score: 0.0,
            postal_code_match: false,
            city_match: false,
            match_reason: reason.into(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.business.is_none() && self.match_tier == MatchTier::None
    }
}

/// Process-wide matching constants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchingConfig {
    pub accept_threshold: f64,
    pub high_threshold: f64,
    pub medium_threshold: f64,
    pub postal_code_bonus: f64,
    pub city_bonus: f64,
    pub prefilter_size: usize,
    pub top_k: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 85.0,
            high_threshold: 95.0,
            medium_threshold: 80.0,
            postal_code_bonus: 10.0,
            city_bonus: 5.0,
            prefilter_size: 10,
            top_k: 3,
        }
    }
}
