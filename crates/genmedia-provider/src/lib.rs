pub mod retry;
pub mod vertex;

use genmedia_core::config::ProviderConfig;
use genmedia_core::error::Result;

pub use retry::{RetryDecision, RetryPolicy};
pub use vertex::VertexClient;

/// Build the generation provider described by the config.
pub fn create_provider(config: &ProviderConfig) -> Result<VertexClient> {
    VertexClient::new(config.clone())
}
