//! Builds the configured reasoning client.

use std::sync::Arc;

use anyhow::Result;

use crate::gemini_client::GeminiClient;
use crate::reasoning::ReasoningClient;

/// Gemini client with the API key and model taken from the environment.
pub fn reasoning_client_from_env() -> Result<Arc<dyn ReasoningClient>> {
    let client: Arc<dyn ReasoningClient> = Arc::new(GeminiClient::from_env()?);
    tracing::info!(
        provider = client.provider_name(),
        model = client.model_name(),
        "Reasoning client ready"
    );
    Ok(client)
}
