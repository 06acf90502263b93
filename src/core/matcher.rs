use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use validator::Validate;

use crate::core::normalize::{name_similarity, normalize_name};
use crate::core::ranking::NameMatcher;
use crate::core::scoring::ScoringPolicy;
use crate::models::{ListingRecord, MatchResult};
use crate::services::gateway::GatewayError;
use crate::services::registry::RegistrySearchResolver;

pub const NO_CANDIDATES: &str = "No candidates found";
pub const NO_VALID_MATCHES: &str = "No valid matches found";

/// Failures that escape a single matching call
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// Main matching orchestrator
///
/// # Pipeline Stages
/// 1. Registry search on the normalized listing name
/// 2. Fuzzy prefilter and assistant rerank, with fuzzy fallback
/// 3. Detail resolution for the shortlist
/// 4. Scoring and ranking
pub struct Matcher {
    resolver: RegistrySearchResolver,
    names: NameMatcher,
    policy: ScoringPolicy,
    search_limit: usize,
}

impl Matcher {
    pub fn new(resolver: RegistrySearchResolver, names: NameMatcher, policy: ScoringPolicy, search_limit: usize) -> Self {
        Self {
            resolver,
            names,
            policy,
            search_limit,
        }
    }

    /// Ranked match results for one listing.
    ///
    /// Never returns an empty list: when nothing is found or nothing can be
    /// scored, a single sentinel result carries the reason.
    pub async fn find_best_matches(&self, listing: &ListingRecord) -> Result<Vec<MatchResult>, MatchError> {
        let normalized = normalize_name(&listing.name);
        let candidates = self.resolver.search(&normalized, self.search_limit).await?;

        if candidates.is_empty() {
            tracing::info!(listing = %listing.name, "No candidates found");
            return Ok(vec![MatchResult::sentinel(listing.clone(), NO_CANDIDATES)]);
        }

        let top_k = self.policy.config().top_k;
        let shortlist = self.names.shortlist(&listing.name, &candidates, top_k).await;
        let entities = self.resolver.resolve_details(&shortlist).await?;

        let mut results: Vec<MatchResult> = entities
            .into_iter()
            .map(|entity| {
                let name_score = name_similarity(&listing.name, &entity.legal_name);
                let breakdown = self.policy.score(listing, &entity, name_score);

                MatchResult {
                    listing: listing.clone(),
                    match_tier: self.policy.classify(breakdown.final_score),
                    is_accepted: self.policy.is_accepted(breakdown.final_score),
                    confidence_score: breakdown.final_score,
                    name_score,
                    postal_code_match: breakdown.postal_code_match,
                    city_match: breakdown.city_match,
                    match_reason: breakdown.reason,
                    business: Some(entity),
                }
            })
            .collect();

        if results.is_empty() {
            tracing::info!(listing = %listing.name, candidates = candidates.len(), "No valid matches found");
            return Ok(vec![MatchResult::sentinel(listing.clone(), NO_VALID_MATCHES)]);
        }

        // Stable: equal scores keep resolver order
        results.sort_by(|a, b| {
            b.confidence_score
                .partial_cmp(&a.confidence_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let best = &results[0];
        tracing::info!(
            listing = %listing.name,
            best = best.business.as_ref().map(|b| b.legal_name.as_str()).unwrap_or(""),
            score = best.confidence_score,
            tier = %best.match_tier,
            accepted = best.is_accepted,
            "Matched listing"
        );

        Ok(results)
    }

    /// Match many listings with at most `concurrency` in flight.
    ///
    /// Output order equals input order. Each listing fails alone: validation
    /// errors, match errors and panics all become a sentinel result for that
    /// listing only.
    pub async fn match_batch(self: &Arc<Self>, listings: Vec<ListingRecord>, concurrency: usize) -> Vec<Vec<MatchResult>> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut pending = Vec::with_capacity(listings.len());

        for listing in listings {
            if let Err(e) = listing.validate() {
                tracing::warn!(listing = %listing.name, error = %e, "Skipping invalid listing");
                pending.push(Pending::Done(vec![MatchResult::sentinel(listing, format!("Invalid listing: {}", e))]));
                continue;
            }

            let matcher = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let task_listing = listing.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                matcher.find_best_matches(&task_listing).await
            });
            pending.push(Pending::Running(listing, handle));
        }

        let mut results = Vec::with_capacity(pending.len());
        for item in pending {
            let outcome = match item {
                Pending::Done(sentinel) => sentinel,
                Pending::Running(listing, handle) => match handle.await {
                    Ok(Ok(matches)) => matches,
                    Ok(Err(e)) => {
                        tracing::error!(listing = %listing.name, error = %e, "Matching failed");
                        vec![MatchResult::sentinel(listing, format!("Matching failed: {}", e))]
                    }
                    Err(e) => {
                        tracing::error!(listing = %listing.name, error = %e, "Matching task aborted");
                        vec![MatchResult::sentinel(listing, format!("Matching failed: {}", e))]
                    }
                },
            };
            results.push(outcome);
        }

        results
    }
}

enum Pending {
    Done(Vec<MatchResult>),
    Running(ListingRecord, tokio::task::JoinHandle<Result<Vec<MatchResult>, MatchError>>),
}
