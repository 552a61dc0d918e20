//! Reasoning Client Trait
//!
//! Capability interface for the external generative reasoning service. The
//! core owns retry, backoff, timeout and schema validation around `reason`;
//! implementations only move text over the wire.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which kind of round a prompt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptPurpose {
    /// Full room description, asks for named variations.
    Proposal,
    /// Violation list and current candidate only.
    Repair,
}

/// Everything the reasoning service sees for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptContext {
    pub purpose: PromptPurpose,
    pub system: String,
    pub user: String,
}

impl PromptContext {
    pub fn new(purpose: PromptPurpose, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            purpose,
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Unified client interface for reasoning providers
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Send the prompt and return the raw text response. Implementations
    /// should ask the provider for JSON output where it supports that.
    async fn reason(&self, context: &PromptContext) -> Result<String>;

    /// Get the model name for logging
    fn model_name(&self) -> &str;

    /// Get the provider name for logging
    fn provider_name(&self) -> &str;
}
