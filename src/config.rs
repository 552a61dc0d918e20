//! Pipeline configuration
//!
//! Defaults for every budget and threshold, with `LAYOUT_*` environment
//! overrides. Values that fail to parse fall back to the default with a
//! warning.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::geometry::GeometryRules;

pub const DEFAULT_THEMES: [&str; 3] = ["Work Focused", "Cozy", "Creative/Aesthetic"];

/// Retry budget for one generator operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on each further attempt.
    pub backoff_base: Duration,
    /// Per-attempt timeout around the external call.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1u32 << exponent)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub rules: GeometryRules,
    pub retry: RetryPolicy,
    /// Repair rounds per candidate.
    pub max_repair_rounds: usize,
    /// Candidates generated concurrently in GENERATING.
    pub desired_candidates: usize,
    pub min_variations: usize,
    pub max_variations: usize,
    /// Cap on concurrent calls to the reasoning service.
    pub max_concurrency: usize,
    /// Attach preview images to surviving variations.
    pub render_previews: bool,
    /// Seeds cycled across candidates.
    pub themes: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rules: GeometryRules::default(),
            retry: RetryPolicy::default(),
            max_repair_rounds: 2,
            desired_candidates: 3,
            min_variations: 2,
            max_variations: 3,
            max_concurrency: 3,
            render_previews: false,
            themes: DEFAULT_THEMES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl PipelineConfig {
    /// Load from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let rules = GeometryRules {
            min_clearance_ft: parse_or(&lookup, "LAYOUT_MIN_CLEARANCE_FT", defaults.rules.min_clearance_ft),
            door_clearance_ft: parse_or(&lookup, "LAYOUT_DOOR_CLEARANCE_FT", defaults.rules.door_clearance_ft),
        };
        let retry = RetryPolicy {
            max_attempts: parse_or(&lookup, "LAYOUT_MAX_ATTEMPTS", defaults.retry.max_attempts),
            backoff_base: Duration::from_millis(parse_or(
                &lookup,
                "LAYOUT_BACKOFF_MS",
                defaults.retry.backoff_base.as_millis() as u64,
            )),
            timeout: Duration::from_secs(parse_or(
                &lookup,
                "LAYOUT_TIMEOUT_SECS",
                defaults.retry.timeout.as_secs(),
            )),
        };
        let themes = lookup("LAYOUT_THEMES")
            .map(|raw| {
                raw.split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|themes| !themes.is_empty())
            .unwrap_or(defaults.themes);

        Self {
            rules,
            retry,
            max_repair_rounds: parse_or(&lookup, "LAYOUT_REPAIR_ROUNDS", defaults.max_repair_rounds),
            desired_candidates: parse_or(&lookup, "LAYOUT_CANDIDATES", defaults.desired_candidates),
            min_variations: parse_or(&lookup, "LAYOUT_MIN_VARIATIONS", defaults.min_variations),
            max_variations: parse_or(&lookup, "LAYOUT_MAX_VARIATIONS", defaults.max_variations),
            max_concurrency: parse_or(&lookup, "LAYOUT_MAX_CONCURRENCY", defaults.max_concurrency),
            render_previews: lookup("LAYOUT_RENDER_PREVIEWS")
                .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
                .unwrap_or(defaults.render_previews),
            themes,
        }
        .normalized()
    }

    /// Clamp values that would make the pipeline unable to run.
    pub fn normalized(mut self) -> Self {
        self.retry.max_attempts = self.retry.max_attempts.max(1);
        self.desired_candidates = self.desired_candidates.max(1);
        self.max_concurrency = self.max_concurrency.max(1);
        self.max_variations = self.max_variations.max(self.min_variations);
        if self.themes.is_empty() {
            self.themes = Self::default().themes;
        }
        self
    }

    /// Theme for candidate `index`, cycling through the list.
    pub fn theme_for(&self, index: usize) -> Option<&str> {
        if self.themes.is_empty() {
            return None;
        }
        self.themes.get(index % self.themes.len()).map(String::as_str)
    }

    /// Zero backoff between attempts, for tests and dry runs.
    pub fn without_backoff(mut self) -> Self {
        self.retry.backoff_base = Duration::ZERO;
        self
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Unparseable config value, using default");
                default
            }
        },
        None => default,
    }
}
