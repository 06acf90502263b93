use serde::{Deserialize, Serialize};

/// Registry name-search payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorporationSearchRequest {
    pub cancellation_mode: bool,
    pub comparison_type: u8,
    pub corp_name: String,
    pub is_work_flow_search: bool,
    pub limit: usize,
    pub match_type: u8,
    pub only_active: bool,
}

impl CorporationSearchRequest {
    pub fn new(corp_name: impl Into<String>, limit: usize) -> Self {
        Self {
            cancellation_mode: false,
            comparison_type: 1,
            corp_name: corp_name.into(),
            is_work_flow_search: false,
            limit,
            match_type: 4,
            only_active: true,
        }
    }
}

/// Header forwarded by the proxy to the target site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyHeader {
    pub name: String,
    pub value: String,
}

/// Body sent to the scraping proxy's extract endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyExtractRequest {
    pub url: String,
    pub http_response_body: bool,
    pub http_request_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_request_text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub custom_http_request_headers: Vec<ProxyHeader>,
}

impl ProxyExtractRequest {
    pub fn get(url: &str, headers: &[(&str, &str)]) -> Self {
        Self {
            url: url.to_string(),
            http_response_body: true,
            http_request_method: "GET".to_string(),
            http_request_text: None,
            custom_http_request_headers: to_proxy_headers(headers),
        }
    }

    pub fn post(url: &str, body: &serde_json::Value, headers: &[(&str, &str)]) -> Self {
        Self {
            url: url.to_string(),
            http_response_body: true,
            http_request_method: "POST".to_string(),
            http_request_text: Some(body.to_string()),
            custom_http_request_headers: to_proxy_headers(headers),
        }
    }
}

fn to_proxy_headers(headers: &[(&str, &str)]) -> Vec<ProxyHeader> {
    headers
        .iter()
        .map(|(name, value)| ProxyHeader {
            name: name.to_string(),
            value: value.to_string(),
        })
        .collect()
}
