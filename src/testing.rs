//! Scripted stand-ins for the scraping gateway and the ranking assistant.
//!
//! Both replay canned responses in order and record every call so tests can
//! assert on what was sent.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::models::ResponseEnvelope;
use crate::services::assistant::{AssistantReply, CompletionRequest, RankingAssistant};
use crate::services::gateway::{GatewayError, ScrapingGateway};

type Scripted = Result<ResponseEnvelope, GatewayError>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone)]
pub struct PostCall {
    pub url: String,
    pub body: serde_json::Value,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct GetCall {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

/// Gateway double.
///
/// POST responses replay from a single queue. GET responses are queued per
/// URL so concurrent detail fetches stay deterministic. An exhausted queue
/// answers with a transport error.
#[derive(Default)]
pub struct ScriptedGateway {
    posts: Mutex<VecDeque<Scripted>>,
    gets: Mutex<HashMap<String, VecDeque<Scripted>>>,
    post_calls: Mutex<Vec<PostCall>>,
    get_calls: Mutex<Vec<GetCall>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_post(&self, response: Scripted) {
        lock(&self.posts).push_back(response);
    }

    pub fn push_get(&self, url: &str, response: Scripted) {
        lock(&self.gets).entry(url.to_string()).or_default().push_back(response);
    }

    pub fn post_calls(&self) -> Vec<PostCall> {
        lock(&self.post_calls).clone()
    }

    pub fn get_calls(&self) -> Vec<GetCall> {
        lock(&self.get_calls).clone()
    }
}

fn owned_headers(headers: &[(&str, &str)]) -> Vec<(String, String)> {
    headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn unscripted(url: &str) -> GatewayError {
    GatewayError::Transport(format!("no scripted response for {}", url))
}

#[async_trait]
impl ScrapingGateway for ScriptedGateway {
    async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
        headers: &[(&str, &str)],
    ) -> Result<ResponseEnvelope, GatewayError> {
        lock(&self.post_calls).push(PostCall {
            url: url.to_string(),
            body: body.clone(),
            headers: owned_headers(headers),
        });
        lock(&self.posts).pop_front().unwrap_or_else(|| Err(unscripted(url)))
    }

    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<ResponseEnvelope, GatewayError> {
        lock(&self.get_calls).push(GetCall {
            url: url.to_string(),
            headers: owned_headers(headers),
        });
        lock(&self.gets)
            .get_mut(url)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Err(unscripted(url)))
    }
}

/// Assistant double; an empty queue answers with silence
#[derive(Default)]
pub struct ScriptedAssistant {
    replies: Mutex<VecDeque<Option<AssistantReply>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl ScriptedAssistant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_reply(&self, reply: Option<AssistantReply>) {
        lock(&self.replies).push_back(reply);
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl RankingAssistant for ScriptedAssistant {
    async fn complete(&self, request: CompletionRequest) -> Option<AssistantReply> {
        lock(&self.requests).push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.replies).pop_front().flatten()
    }
}
