use futures::future::join_all;
use std::sync::Arc;

use crate::config::RegistrySettings;
use crate::models::responses::{ResidentAgent, StreetAddress};
use crate::models::{
    CandidateEntity, CorporationDetailData, CorporationDetailResponse, CorporationSearchRequest,
    CorporationSearchResponse, LegalEntityRecord,
};
use crate::services::cache::DetailCache;
use crate::services::gateway::{GatewayError, ScrapingGateway};

const ACCEPT: &str = "application/json, text/plain, */*";
const SEARCH_CONTENT_TYPE: &str = "application/problem+json; charset=UTF-8";

/// Turns a free-text name into registry candidates and resolves candidate details.
///
/// Gateway failures degrade to empty or summary-derived results. The one
/// exception is [`GatewayError::NotReady`], which means the session was never
/// acquired and is returned to the caller.
pub struct RegistrySearchResolver {
    gateway: Arc<dyn ScrapingGateway>,
    base_url: String,
    origin: String,
    cache: Option<DetailCache>,
}

impl RegistrySearchResolver {
    pub fn new(gateway: Arc<dyn ScrapingGateway>, settings: &RegistrySettings) -> Self {
        let cache = (settings.detail_cache_size > 0)
            .then(|| DetailCache::new(settings.detail_cache_size, settings.detail_cache_ttl_secs));

        Self {
            gateway,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            origin: settings.origin.clone(),
            cache,
        }
    }

    pub fn search_url(&self) -> String {
        format!("{}/corporation/search", self.base_url)
    }

    pub fn detail_url(&self, registration_index: &str) -> String {
        format!(
            "{}/corporation/info/{}",
            self.base_url,
            urlencoding::encode(registration_index.trim())
        )
    }

    /// Search active registry entities by name.
    ///
    /// Zero records, an invalid envelope, or an exhausted gateway all yield an
    /// empty list.
    pub async fn search(&self, name: &str, limit: usize) -> Result<Vec<CandidateEntity>, GatewayError> {
        let payload = match serde_json::to_value(CorporationSearchRequest::new(name, limit)) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(name, error = %e, "Failed to build search payload");
                return Ok(vec![]);
            }
        };
        let headers = [
            ("Accept", ACCEPT),
            ("Content-Type", SEARCH_CONTENT_TYPE),
            ("Origin", self.origin.as_str()),
            ("Authorization", "null"),
        ];

        let envelope = match self.gateway.post(&self.search_url(), &payload, &headers).await {
            Ok(envelope) => envelope,
            Err(GatewayError::NotReady) => return Err(GatewayError::NotReady),
            Err(e) => {
                tracing::error!(name, error = %e, "Registry search request failed");
                return Ok(vec![]);
            }
        };

        let response: CorporationSearchResponse = match envelope.decode_body() {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(name, error = %e, "Failed to parse registry search response");
                return Ok(vec![]);
            }
        };

        let records = response.response.map(|r| r.records).unwrap_or_default();
        if records.is_empty() {
            tracing::warn!(name, "No registry records found");
        } else {
            tracing::info!(name, count = records.len(), "Found registry records");
        }

        Ok(records)
    }

    /// Resolve each candidate to a legal entity record.
    ///
    /// Candidates are fetched concurrently and independently; output order
    /// follows input order. Candidates with neither a detail record nor a
    /// registration index are dropped.
    pub async fn resolve_details(
        &self,
        candidates: &[CandidateEntity],
    ) -> Result<Vec<LegalEntityRecord>, GatewayError> {
        let resolved = join_all(candidates.iter().map(|c| self.resolve_one(c))).await;

        let mut records = Vec::with_capacity(resolved.len());
        for outcome in resolved {
            if let Some(record) = outcome? {
                tracing::debug!(legal_name = %record.legal_name, "Created legal entity record");
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn resolve_one(&self, candidate: &CandidateEntity) -> Result<Option<LegalEntityRecord>, GatewayError> {
        let index = candidate.index().trim();

        if candidate.business_entity_id.is_none() || index.is_empty() {
            tracing::debug!(corp_name = candidate.name(), "No entity id, using search summary");
            return Ok(self.from_summary(candidate));
        }

        match self.fetch_detail(index).await? {
            Some(detail) => Ok(build_from_detail(&detail, candidate)),
            None => {
                tracing::debug!(registration_index = index, "Fell back to search summary");
                Ok(self.from_summary(candidate))
            }
        }
    }

    fn from_summary(&self, candidate: &CandidateEntity) -> Option<LegalEntityRecord> {
        let record = LegalEntityRecord::from_candidate(candidate);
        if record.is_none() {
            tracing::warn!(corp_name = candidate.name(), "Candidate has no registration index, skipping");
        }
        record
    }

    /// Fetch one detail record; `Ok(None)` means "use the summary instead"
    async fn fetch_detail(&self, registration_index: &str) -> Result<Option<CorporationDetailData>, GatewayError> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(registration_index).await {
                return Ok(Some(hit));
            }
        }

        let url = self.detail_url(registration_index);
        let headers = [
            ("Accept", ACCEPT),
            ("Origin", self.origin.as_str()),
            ("Authorization", "null"),
        ];

        let envelope = match self.gateway.get(&url, &headers).await {
            Ok(envelope) => envelope,
            Err(GatewayError::NotReady) => return Err(GatewayError::NotReady),
            Err(e) => {
                tracing::warn!(registration_index, error = %e, "Registry detail request failed");
                return Ok(None);
            }
        };

        let response: CorporationDetailResponse = match envelope.decode_body() {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(registration_index, error = %e, "Failed to parse registry detail response");
                return Ok(None);
            }
        };

        match response.response {
            Some(detail) if detail.corporation.is_some() => {
                if let Some(cache) = &self.cache {
                    cache.insert(registration_index, detail.clone()).await;
                }
                Ok(Some(detail))
            }
            _ => {
                tracing::debug!(url = %url, "Detail response has no corporation block");
                Ok(None)
            }
        }
    }
}

/// Merge a detail record over its search candidate
fn build_from_detail(detail: &CorporationDetailData, candidate: &CandidateEntity) -> Option<LegalEntityRecord> {
    let corporation = detail.corporation.clone().unwrap_or_default();

    let registration_index = non_empty(corporation.corp_register_index.as_deref())
        .or_else(|| non_empty(candidate.registration_index.as_deref()))?;

    let business_address = detail
        .main_location
        .as_ref()
        .and_then(|l| l.street_address.as_ref())
        .map(format_business_address)
        .unwrap_or_default();

    let (resident_agent_name, resident_agent_address) = detail
        .resident_agent
        .as_ref()
        .map(|agent| (format_agent_name(agent), format_agent_address(agent)))
        .unwrap_or_default();

    Some(LegalEntityRecord {
        legal_name: corporation
            .corp_name
            .unwrap_or_else(|| candidate.name().to_string()),
        registration_number: corporation
            .corp_register_number
            .or(candidate.registration_number)
            .map(|n| n.to_string())
            .unwrap_or_default(),
        registration_index,
        status: corporation
            .status_en
            .or_else(|| candidate.status_en.clone())
            .unwrap_or_default(),
        business_address,
        resident_agent_name,
        resident_agent_address,
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn join_parts<'a>(parts: impl IntoIterator<Item = &'a Option<String>>, separator: &str) -> String {
    parts
        .into_iter()
        .filter_map(|p| p.as_deref())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

/// `address1, address2, city, zip`
fn format_business_address(address: &StreetAddress) -> String {
    join_parts([&address.address1, &address.address2, &address.city, &address.zip], ", ")
}

fn format_agent_name(agent: &ResidentAgent) -> String {
    if agent.is_individual.unwrap_or(false) {
        if let Some(person) = &agent.individual_name {
            return join_parts(
                [&person.first_name, &person.middle_name, &person.last_name, &person.sur_name],
                " ",
            );
        }
    }
    agent
        .organization_name
        .as_ref()
        .and_then(|o| o.name.clone())
        .unwrap_or_default()
}

fn format_agent_address(agent: &ResidentAgent) -> String {
    agent
        .street_address
        .as_ref()
        .map(|a| join_parts([&a.address1, &a.address2], " ").trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResponseEnvelope;
    use crate::testing::ScriptedGateway;
    use serde_json::json;

    fn settings() -> RegistrySettings {
        RegistrySettings {
            base_url: "https://registry.test/api/".to_string(),
            ..Default::default()
        }
    }

    fn candidate(id: i64, index: &str, name: &str) -> CandidateEntity {
        CandidateEntity {
            business_entity_id: Some(id),
            registration_number: Some(id),
            registration_index: Some(index.to_string()),
            corp_name: Some(name.to_string()),
            status_en: Some("ACTIVE".to_string()),
            ..Default::default()
        }
    }

    fn detail_envelope(name: &str, index: &str) -> ResponseEnvelope {
        ResponseEnvelope::from_json(&json!({
            "response": {
                "corporation": {"corpName": name, "corpRegisterNumber": 99, "corpRegisterIndex": index, "statusEn": "ACTIVE"},
                "mainLocation": {"streetAddress": {"address1": "1 Calle Loiza", "address2": "", "city": "San Juan", "zip": "00908"}},
                "residentAgent": {
                    "isIndividual": true,
                    "individualName": {"firstName": "Ana", "lastName": "Rivera"},
                    "streetAddress": {"address1": "PO Box 1", "address2": "San Juan"}
                }
            }
        }))
    }

    #[test]
    fn test_urls() {
        let resolver = RegistrySearchResolver::new(Arc::new(ScriptedGateway::new()), &settings());
        assert_eq!(resolver.search_url(), "https://registry.test/api/corporation/search");
        assert_eq!(resolver.detail_url("12 3"), "https://registry.test/api/corporation/info/12%203");
    }

    #[tokio::test]
    async fn test_search_returns_records_and_sends_payload() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_post(Ok(ResponseEnvelope::from_json(&json!({
            "response": {"totalRecords": 1, "records": [{"businessEntityId": 1, "registrationIndex": "1-1", "corpName": "CONDAL LLC"}]}
        }))));
        let resolver = RegistrySearchResolver::new(gateway.clone(), &settings());

        let records = resolver.search("condal", 250).await.unwrap();
        assert_eq!(records.len(), 1);

        let calls = gateway.post_calls();
        assert_eq!(calls[0].body["corpName"], "condal");
        assert_eq!(calls[0].body["onlyActive"], true);
        assert!(calls[0].headers.iter().any(|(k, v)| k == "Authorization" && v == "null"));
    }

    #[tokio::test]
    async fn test_search_swallows_failures() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_post(Err(GatewayError::Status { status: 500, url: "x".into() }));
        gateway.push_post(Ok(ResponseEnvelope { http_response_body: Some("%%%".into()) }));
        gateway.push_post(Ok(ResponseEnvelope::from_json(&json!({"response": {"totalRecords": 0, "records": []}}))));
        let resolver = RegistrySearchResolver::new(gateway, &settings());

        assert!(resolver.search("a", 10).await.unwrap().is_empty());
        assert!(resolver.search("b", 10).await.unwrap().is_empty());
        assert!(resolver.search("c", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_propagates_not_ready() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_post(Err(GatewayError::NotReady));
        let resolver = RegistrySearchResolver::new(gateway, &settings());

        assert!(matches!(resolver.search("a", 10).await, Err(GatewayError::NotReady)));
    }

    #[tokio::test]
    async fn test_resolve_details_merges_detail_record() {
        let gateway = Arc::new(ScriptedGateway::new());
        let resolver = RegistrySearchResolver::new(gateway.clone(), &settings());
        gateway.push_get(&resolver.detail_url("1-1"), Ok(detail_envelope("CONDAL TAPAS LLC", "1-1")));

        let records = resolver.resolve_details(&[candidate(1, "1-1", "CONDAL")]).await.unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.legal_name, "CONDAL TAPAS LLC");
        assert_eq!(record.registration_number, "99");
        assert_eq!(record.business_address, "1 Calle Loiza, San Juan, 00908");
        assert_eq!(record.resident_agent_name, "Ana Rivera");
        assert_eq!(record.resident_agent_address, "PO Box 1 San Juan");
    }

    #[tokio::test]
    async fn test_failed_detail_falls_back_without_affecting_siblings() {
        let gateway = Arc::new(ScriptedGateway::new());
        let resolver = RegistrySearchResolver::new(gateway.clone(), &settings());
        gateway.push_get(&resolver.detail_url("1-1"), Ok(detail_envelope("FIRST LLC", "1-1")));
        gateway.push_get(&resolver.detail_url("2-2"), Err(GatewayError::Status { status: 503, url: "x".into() }));
        gateway.push_get(&resolver.detail_url("3-3"), Ok(detail_envelope("THIRD LLC", "3-3")));

        let candidates = [candidate(1, "1-1", "FIRST"), candidate(2, "2-2", "SECOND INC"), candidate(3, "3-3", "THIRD")];
        let records = resolver.resolve_details(&candidates).await.unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].legal_name, "FIRST LLC");
        assert_eq!(records[1].legal_name, "SECOND INC");
        assert!(records[1].business_address.is_empty());
        assert!(records[1].resident_agent_name.is_empty());
        assert_eq!(records[2].legal_name, "THIRD LLC");
    }

    #[tokio::test]
    async fn test_missing_corporation_block_falls_back() {
        let gateway = Arc::new(ScriptedGateway::new());
        let resolver = RegistrySearchResolver::new(gateway.clone(), &settings());
        gateway.push_get(&resolver.detail_url("1-1"), Ok(ResponseEnvelope::from_json(&json!({"response": {"mainLocation": {}}}))));

        let records = resolver.resolve_details(&[candidate(1, "1-1", "CONDAL")]).await.unwrap();
        assert_eq!(records[0].legal_name, "CONDAL");
        assert!(records[0].business_address.is_empty());
    }

    #[tokio::test]
    async fn test_candidate_without_entity_id_skips_detail_fetch() {
        let gateway = Arc::new(ScriptedGateway::new());
        let resolver = RegistrySearchResolver::new(gateway.clone(), &settings());
        let mut c = candidate(1, "1-1", "CONDAL");
        c.business_entity_id = None;

        let records = resolver.resolve_details(&[c]).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(gateway.get_calls().is_empty());
    }

    #[tokio::test]
    async fn test_detail_records_are_cached() {
        let gateway = Arc::new(ScriptedGateway::new());
        let resolver = RegistrySearchResolver::new(gateway.clone(), &settings());
        gateway.push_get(&resolver.detail_url("1-1"), Ok(detail_envelope("CONDAL LLC", "1-1")));

        let first = resolver.resolve_details(&[candidate(1, "1-1", "CONDAL")]).await.unwrap();
        let second = resolver.resolve_details(&[candidate(1, "1-1", "CONDAL")]).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.get_calls().len(), 1);
    }

    #[test]
    fn test_organization_agent_name() {
        let agent = ResidentAgent {
            is_individual: Some(false),
            organization_name: Some(crate::models::responses::OrganizationName { name: Some("CT Corp".into()) }),
            ..Default::default()
        };
        assert_eq!(format_agent_name(&agent), "CT Corp");
    }
}
