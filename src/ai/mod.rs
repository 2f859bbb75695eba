use async_trait::async_trait;

pub mod agent;
pub mod normalize;
pub mod types;
pub use agent::AgentClient;
pub use normalize::normalize;
pub use types::*;

use crate::encode::EncodedPayload;

/// Trait for image-analysis backends.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Send the encoded image with `instruction` and return the raw response
    /// body of a successful (2xx) reply.
    async fn submit(
        &self,
        payload: &EncodedPayload,
        instruction: &str,
    ) -> Result<String, AnalysisError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}
