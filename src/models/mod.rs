// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{CandidateEntity, LegalEntityRecord, ListingRecord, MatchResult, MatchTier, MatchingConfig};
pub use requests::{CorporationSearchRequest, ProxyExtractRequest, ProxyHeader};
pub use responses::{
    CorporationDetailData, CorporationDetailResponse, CorporationSearchResponse, EnvelopeError, ResponseEnvelope,
};
