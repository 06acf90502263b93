// Core algorithm exports
pub mod matcher;
pub mod normalize;
pub mod ranking;
pub mod scoring;

pub use matcher::{MatchError, Matcher, NO_CANDIDATES, NO_VALID_MATCHES};
pub use normalize::{name_similarity, normalize_name};
pub use ranking::{parse_reply, strip_code_fence, NameMatcher, ScoredCandidate};
pub use scoring::{extract_city, extract_postal_code, ScoreBreakdown, ScoringPolicy};
