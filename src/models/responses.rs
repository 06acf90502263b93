use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::domain::CandidateEntity;

/// Errors unwrapping the proxy's base64 JSON envelope
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("httpResponseBody is missing or empty")]
    MissingBody,

    #[error("failed to decode base64 response body: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("decoded response body is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("failed to parse JSON from decoded body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Response envelope returned by the scraping proxy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "httpResponseBody", default)]
    pub http_response_body: Option<String>,
}

impl ResponseEnvelope {
    /// Wrap a JSON value the way the proxy does
    pub fn from_json(value: &serde_json::Value) -> Self {
        Self {
            http_response_body: Some(STANDARD.encode(value.to_string())),
        }
    }

    /// Decode the base64 body and parse it as JSON into `T`
    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<T, EnvelopeError> {
        let encoded = self
            .http_response_body
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or(EnvelopeError::MissingBody)?;

        let bytes = STANDARD.decode(encoded)?;
        let text = String::from_utf8(bytes)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Common registry response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryResponse<T> {
    #[serde(default = "Option::default")]
    pub response: Option<T>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub info: Option<serde_json::Value>,
    #[serde(default)]
    pub success: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponseData {
    #[serde(default)]
    pub total_records: Option<i64>,
    #[serde(default)]
    pub records: Vec<CandidateEntity>,
}

pub type CorporationSearchResponse = RegistryResponse<SearchResponseData>;
pub type CorporationDetailResponse = RegistryResponse<CorporationDetailData>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreetAddress {
    #[serde(default)]
    pub address1: Option<String>,
    #[serde(default)]
    pub address2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndividualName {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub middle_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub sur_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizationName {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorporationDetail {
    #[serde(default)]
    pub corp_name: Option<String>,
    #[serde(default)]
    pub corp_register_number: Option<i64>,
    #[serde(default)]
    pub corp_register_index: Option<String>,
    #[serde(default)]
    pub status_en: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainLocation {
    #[serde(default)]
    pub street_address: Option<StreetAddress>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResidentAgent {
    #[serde(default)]
    pub is_individual: Option<bool>,
    #[serde(default)]
    pub individual_name: Option<IndividualName>,
    #[serde(default)]
    pub organization_name: Option<OrganizationName>,
    #[serde(default)]
    pub street_address: Option<StreetAddress>,
}

/// Detail block for one registered corporation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorporationDetailData {
    #[serde(default)]
    pub corporation: Option<CorporationDetail>,
    #[serde(default)]
    pub main_location: Option<MainLocation>,
    #[serde(default)]
    pub resident_agent: Option<ResidentAgent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_decodes_search_response() {
        let envelope = ResponseEnvelope::from_json(&json!({
            "response": {
                "totalRecords": 1,
                "records": [{"businessEntityId": 1, "registrationIndex": "1-1", "corpName": "CONDAL LLC"}]
            },
            "code": 1,
            "success": true
        }));

        let decoded: CorporationSearchResponse = envelope.decode_body().unwrap();
        let data = decoded.response.unwrap();
        assert_eq!(data.total_records, Some(1));
        assert_eq!(data.records[0].name(), "CONDAL LLC");
    }

    #[test]
    fn test_envelope_missing_body() {
        let envelope = ResponseEnvelope::default();
        let err = envelope.decode_body::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, EnvelopeError::MissingBody));
    }

    #[test]
    fn test_envelope_bad_base64() {
        let envelope = ResponseEnvelope {
            http_response_body: Some("!!not base64!!".to_string()),
        };
        let err = envelope.decode_body::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, EnvelopeError::Base64(_)));
    }

    #[test]
    fn test_envelope_bad_json() {
        let envelope = ResponseEnvelope {
            http_response_body: Some(STANDARD.encode("<html>blocked</html>")),
        };
        let err = envelope.decode_body::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, EnvelopeError::Json(_)));
    }

    #[test]
    fn test_detail_response_tolerates_missing_blocks() {
        let envelope = ResponseEnvelope::from_json(&json!({"response": {"corporation": {"corpName": "X"}}}));
        let decoded: CorporationDetailResponse = envelope.decode_body().unwrap();
        let data = decoded.response.unwrap();
        assert!(data.main_location.is_none());
        assert!(data.resident_agent.is_none());
    }
}
