use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::core::normalize::{name_similarity, normalize_name};
use crate::models::CandidateEntity;
use crate::services::assistant::{AssistantReply, ChatMessage, CompletionRequest, RankingAssistant, ResponseFormat};

static OPENING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```(?:json)?\s*").expect("fence pattern is valid"));
static CLOSING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*```$").expect("fence pattern is valid"));

/// Candidate with its fuzzy name score
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub score: f64,
    pub candidate: CandidateEntity,
}

/// Narrows registry candidates to a shortlist using fuzzy scores and the ranking assistant
pub struct NameMatcher {
    assistant: Arc<dyn RankingAssistant>,
    model: String,
    temperature: f32,
    timeout: Duration,
    prefilter_size: usize,
}

impl NameMatcher {
    pub fn new(
        assistant: Arc<dyn RankingAssistant>,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
        prefilter_size: usize,
    ) -> Self {
        Self {
            assistant,
            model: model.into(),
            temperature,
            timeout,
            prefilter_size,
        }
    }

    /// Top candidates by fuzzy similarity, descending.
    ///
    /// Candidates without a name are skipped. The sort is stable, so equal
    /// scores keep registry order.
    pub fn prefilter(&self, listing_name: &str, candidates: &[CandidateEntity]) -> Vec<ScoredCandidate> {
        let mut scored: Vec<ScoredCandidate> = candidates
            .iter()
            .filter(|c| !c.name().trim().is_empty())
            .map(|c| ScoredCandidate {
                score: name_similarity(listing_name, c.name()),
                candidate: c.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.prefilter_size);
        scored
    }

    /// Prefilter, then ask the assistant for up to `top_k` picks.
    ///
    /// Returns an empty list when the assistant is silent, times out, or names
    /// nothing that maps back to a candidate.
    pub async fn rerank(&self, listing_name: &str, candidates: &[CandidateEntity], top_k: usize) -> Vec<CandidateEntity> {
        let prefiltered: Vec<CandidateEntity> = self
            .prefilter(listing_name, candidates)
            .into_iter()
            .map(|s| s.candidate)
            .collect();
        self.select_with_assistant(listing_name, &prefiltered, top_k).await
    }

    /// Shortlist of at most `top_k` candidates: the assistant's picks, or the
    /// fuzzy top `top_k` when the assistant gives nothing usable
    pub async fn shortlist(&self, listing_name: &str, candidates: &[CandidateEntity], top_k: usize) -> Vec<CandidateEntity> {
        let selected = self.rerank(listing_name, candidates, top_k).await;
        if !selected.is_empty() {
            return selected;
        }

        tracing::debug!(listing = listing_name, "Using fuzzy ranking for shortlist");
        self.prefilter(listing_name, candidates)
            .into_iter()
            .take(top_k)
            .map(|s| s.candidate)
            .collect()
    }

    async fn select_with_assistant(
        &self,
        listing_name: &str,
        candidates: &[CandidateEntity],
        top_k: usize,
    ) -> Vec<CandidateEntity> {
        if candidates.is_empty() {
            return vec![];
        }

        let lookup = CandidateLookup::build(candidates);
        let normalized_listing = normalize_name(listing_name);
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(build_prompt(&normalized_listing, &lookup.names, top_k))],
            temperature: self.temperature,
            response_format: Some(ResponseFormat::json_object()),
        };

        let reply = match tokio::time::timeout(self.timeout, self.assistant.complete(request)).await {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                tracing::warn!(listing = listing_name, "Ranking assistant returned no response");
                return vec![];
            }
            Err(_) => {
                tracing::warn!(listing = listing_name, timeout_ms = self.timeout.as_millis() as u64, "Ranking assistant timed out");
                return vec![];
            }
        };

        let selected = match reply {
            AssistantReply::Structured(value) => lookup.resolve(&value, top_k),
            AssistantReply::Text(text) => match parse_reply(&text) {
                Some(value) => lookup.resolve(&value, top_k),
                None => None,
            },
        };

        match selected {
            Some(records) if !records.is_empty() => {
                let names: Vec<&str> = records.iter().map(|r| r.name()).collect();
                tracing::info!(listing = listing_name, selected = ?names, "Ranking assistant selected candidates");
                records
            }
            Some(_) => {
                tracing::warn!(listing = listing_name, "Ranking assistant named no known candidate");
                vec![]
            }
            None => {
                tracing::warn!(listing = listing_name, "Ranking assistant response not in expected format");
                vec![]
            }
        }
    }
}

/// Normalized candidate names for one rerank call.
///
/// Duplicate normalized names keep the first candidate in registry order.
struct CandidateLookup {
    names: Vec<String>,
    by_name: HashMap<String, CandidateEntity>,
}

impl CandidateLookup {
    fn build(candidates: &[CandidateEntity]) -> Self {
        let mut names = Vec::new();
        let mut by_name = HashMap::new();
        for candidate in candidates {
            let normalized = normalize_name(candidate.name());
            if normalized.is_empty() || by_name.contains_key(&normalized) {
                continue;
            }
            names.push(normalized.clone());
            by_name.insert(normalized, candidate.clone());
        }
        Self { names, by_name }
    }

    /// Map `{"matches": [...]}` back to candidates; `None` if the shape is wrong
    fn resolve(&self, value: &serde_json::Value, top_k: usize) -> Option<Vec<CandidateEntity>> {
        let matches = value.get("matches")?.as_array()?;

        let mut seen = Vec::new();
        let mut selected = Vec::new();
        for item in matches {
            let raw = match item {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let normalized = normalize_name(&raw);
            if seen.contains(&normalized) {
                continue;
            }
            if let Some(candidate) = self.by_name.get(&normalized) {
                seen.push(normalized);
                selected.push(candidate.clone());
            }
            if selected.len() >= top_k {
                break;
            }
        }
        Some(selected)
    }
}

fn build_prompt(listing_name: &str, candidate_names: &[String], top_k: usize) -> String {
    let candidates = candidate_names
        .iter()
        .map(|n| format!("- {}", n))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a business name matching expert. Given a target business name and candidate registered names, return the top {top_k} most likely matches.

Target Name: {listing_name}

Candidates:
{candidates}

Consider:
- Core business name after removing legal suffixes (Inc, LLC, Corp, S.A., etc.)
- Abbreviations: Intl <-> International, Assoc <-> Associates, Bros <-> Brothers
- Spanish/English: Compañía <-> Company, Servicios <-> Services
- Franchise/store numbers (#1234, Store 5678)
- Ignore: punctuation, capitalization, "the", common words (de, del, of, and)

Return a JSON object with a "matches" key containing an array of up to {top_k} candidate names, copied exactly from the list above:
{{"matches": ["candidate name 1", "candidate name 2", "candidate name 3"]}}"#
    )
}

/// Remove a surrounding Markdown code fence
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let start = OPENING_FENCE.find(trimmed).map(|m| m.end()).unwrap_or(0);
    let rest = &trimmed[start..];
    let end = CLOSING_FENCE.find(rest).map(|m| m.start()).unwrap_or(rest.len());
    rest[..end].trim()
}

/// Parse assistant text as strict JSON, then as a relaxed literal
pub fn parse_reply(content: &str) -> Option<serde_json::Value> {
    let cleaned = strip_code_fence(content);
    if let Ok(value) = serde_json::from_str(cleaned) {
        return Some(value);
    }
    relaxed_to_json(cleaned).and_then(|json| serde_json::from_str(&json).ok())
}

/// Rewrite literal syntax (single-quoted strings, `True`/`False`/`None`,
/// trailing commas) into JSON. Only JSON value shapes are accepted.
fn relaxed_to_json(input: &str) -> Option<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    let ch = *chars.get(i)?;
                    if ch == '\\' {
                        let escaped = *chars.get(i + 1)?;
                        i += 2;
                        match escaped {
                            'n' => value.push('\n'),
                            't' => value.push('\t'),
                            'r' => value.push('\r'),
                            'u' => {
                                let (decoded, consumed) = decode_unicode_escape(&chars[i..])?;
                                value.push(decoded);
                                i += consumed;
                            }
                            other => value.push(other),
                        }
                        continue;
                    }
                    if ch == quote {
                        i += 1;
                        break;
                    }
                    value.push(ch);
                    i += 1;
                }
                out.push_str(&serde_json::Value::String(value).to_string());
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some(']') | Some('}')) {
                    out.push(',');
                }
                i += 1;
            }
            _ if starts_number(&chars[i..]) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || matches!(chars[i], '.' | 'e' | 'E' | '+' | '-')) {
                    i += 1;
                }
                out.extend(&chars[start..i]);
            }
            c if c.is_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "True" | "true" => out.push_str("true"),
                    "False" | "false" => out.push_str("false"),
                    "None" | "null" => out.push_str("null"),
                    _ => return None,
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    Some(out)
}

fn starts_number(rest: &[char]) -> bool {
    match rest {
        [c, ..] if c.is_ascii_digit() => true,
        ['-', next, ..] => next.is_ascii_digit(),
        _ => false,
    }
}

fn hex4(digits: &[char]) -> Option<u32> {
    let text: String = digits.get(..4)?.iter().collect();
    u32::from_str_radix(&text, 16).ok()
}

/// Decode the hex part of a `\uXXXX` escape, joining surrogate pairs.
/// Returns the character and how many chars were consumed.
fn decode_unicode_escape(rest: &[char]) -> Option<(char, usize)> {
    let high = hex4(rest)?;
    if (0xD800..0xDC00).contains(&high) {
        if rest.get(4..6)? != ['\\', 'u'] {
            return None;
        }
        let low = hex4(&rest[6..])?;
        if !(0xDC00..0xE000).contains(&low) {
            return None;
        }
        let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
        return char::from_u32(code).map(|c| (c, 10));
    }
    char::from_u32(high).map(|c| (c, 4))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedAssistant;
    use serde_json::json;

    fn candidate(index: &str, name: &str) -> CandidateEntity {
        CandidateEntity {
            business_entity_id: Some(1),
            registration_index: Some(index.to_string()),
            corp_name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn matcher(assistant: Arc<ScriptedAssistant>) -> NameMatcher {
        NameMatcher::new(assistant, "gpt-4o-mini", 0.0, Duration::from_secs(5), 10)
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"matches\": []}\n```"), "{\"matches\": []}");
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_reply_relaxed_literal() {
        let value = parse_reply("{'matches': ['condal tapas', 'casa pepe',], 'ok': True, 'x': None}").unwrap();
        assert_eq!(value, json!({"matches": ["condal tapas", "casa pepe"], "ok": true, "x": null}));
    }

    #[test]
    fn test_parse_reply_relaxed_numbers_and_escapes() {
        let value = parse_reply("{'matches': ['caf\\u00e9 condal', 'pi\\ud83c\\udf55'], 'score': 1e5, 'delta': -0.5,}").unwrap();
        assert_eq!(value["matches"][0], "café condal");
        assert_eq!(value["matches"][1], "pi\u{1F355}");
        assert_eq!(value["score"], 100000.0);
        assert_eq!(value["delta"], -0.5);
    }

    #[test]
    fn test_parse_reply_rejects_prose() {
        assert!(parse_reply("I think the best match is condal").is_none());
        assert!(parse_reply("{'matches': ['unterminated]").is_none());
    }

    #[test]
    fn test_prefilter_is_stable_and_bounded() {
        let assistant = Arc::new(ScriptedAssistant::new());
        let matcher = NameMatcher::new(assistant, "m", 0.0, Duration::from_secs(1), 2);
        let candidates = vec![
            candidate("1", "Condal Tapas LLC"),
            candidate("2", "Zebra Holdings"),
            candidate("3", "CONDAL TAPAS INC"),
            candidate("4", ""),
        ];

        let ranked = matcher.prefilter("Condal Tapas", &candidates);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].candidate.index(), "1");
        assert_eq!(ranked[1].candidate.index(), "3");
        assert_eq!(ranked[0].score, 100.0);
    }

    #[tokio::test]
    async fn test_rerank_maps_names_back() {
        let assistant = Arc::new(ScriptedAssistant::new());
        assistant.push_reply(Some(AssistantReply::Text(
            "```json\n{\"matches\": [\"Casa Pepe S.A.\", \"unknown name\", \"condal tapas\"]}\n```".into(),
        )));
        let matcher = matcher(assistant.clone());
        let candidates = vec![candidate("1", "Condal Tapas LLC"), candidate("2", "La Casa de Pepe")];

        let selected = matcher.rerank("Condal Tapas", &candidates, 3).await;
        let indices: Vec<&str> = selected.iter().map(|c| c.index()).collect();
        assert_eq!(indices, vec!["2", "1"]);

        let requests = assistant.requests();
        assert_eq!(requests.len(), 1);
        let prompt = &requests[0].messages[0].content;
        assert!(prompt.contains("Target Name: condal tapas"));
        assert!(prompt.contains("- casa pepe"));
    }

    #[tokio::test]
    async fn test_rerank_structured_reply() {
        let assistant = Arc::new(ScriptedAssistant::new());
        assistant.push_reply(Some(AssistantReply::Structured(json!({"matches": ["condal tapas"]}))));
        let matcher = matcher(assistant);

        let selected = matcher.rerank("Condal", &[candidate("1", "Condal Tapas LLC")], 3).await;
        assert_eq!(selected.len(), 1);
    }

    #[tokio::test]
    async fn test_rerank_empty_on_garbage() {
        let assistant = Arc::new(ScriptedAssistant::new());
        assistant.push_reply(Some(AssistantReply::Text("no idea, sorry".into())));
        let matcher = matcher(assistant);

        assert!(matcher.rerank("Condal", &[candidate("1", "Condal LLC")], 3).await.is_empty());
    }

    #[tokio::test]
    async fn test_shortlist_falls_back_to_fuzzy_order() {
        let candidates = vec![
            candidate("1", "Zebra Holdings"),
            candidate("2", "Condal Tapas Bar"),
            candidate("3", "Condal Tapas LLC"),
            candidate("4", "Condal"),
            candidate("5", "Tapas Condal Restaurant"),
        ];

        let mut orders = Vec::new();
        for _ in 0..2 {
            let assistant = Arc::new(ScriptedAssistant::new());
            assistant.push_reply(Some(AssistantReply::Text("not json".into())));
            let matcher = matcher(assistant);
            let shortlist = matcher.shortlist("Condal Tapas", &candidates, 3).await;
            orders.push(shortlist.iter().map(|c| c.index().to_string()).collect::<Vec<_>>());
        }

        assert_eq!(orders[0].len(), 3);
        assert_eq!(orders[0][0], "3");
        assert_eq!(orders[0], orders[1]);
    }

    #[tokio::test]
    async fn test_shortlist_falls_back_on_timeout() {
        let assistant = Arc::new(ScriptedAssistant::new().with_delay(Duration::from_secs(5)));
        assistant.push_reply(Some(AssistantReply::Text("{\"matches\": [\"condal\"]}".into())));
        let matcher = NameMatcher::new(assistant, "m", 0.0, Duration::from_millis(20), 10);

        let shortlist = matcher.shortlist("Condal", &[candidate("1", "Condal LLC"), candidate("2", "Other")], 1).await;
        assert_eq!(shortlist.len(), 1);
        assert_eq!(shortlist[0].index(), "1");
    }

    #[tokio::test]
    async fn test_assistant_picks_capped_at_top_k() {
        let assistant = Arc::new(ScriptedAssistant::new());
        assistant.push_reply(Some(AssistantReply::Text(
            "{\"matches\": [\"alpha\", \"beta\", \"gamma\", \"delta\"]}".into(),
        )));
        let matcher = matcher(assistant);
        let candidates: Vec<CandidateEntity> = ["Alpha", "Beta", "Gamma", "Delta"]
            .iter()
            .enumerate()
            .map(|(i, n)| candidate(&i.to_string(), n))
            .collect();

        assert_eq!(matcher.shortlist("alpha", &candidates, 3).await.len(), 3);
    }
}
