// Service exports
pub mod assistant;
pub mod cache;
pub mod gateway;
pub mod registry;

pub use assistant::{AssistantError, AssistantReply, ChatMessage, CompletionRequest, OpenAiAssistant, RankingAssistant, ResponseFormat};
pub use cache::{CacheKey, DetailCache};
pub use gateway::{GatewayError, ProxyGateway, ScrapingGateway, SessionGuard};
pub use registry::RegistrySearchResolver;
