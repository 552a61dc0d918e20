//! Variation Generator
//!
//! Adapter around the reasoning service. Owns retry, exponential backoff,
//! per-attempt timeouts and schema validation. It never applies the updates
//! it returns; that is Layout Merge's job.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::RetryPolicy;
use crate::constraints::Violation;
use crate::error::{GenerationError, TransientFailure};
use crate::geometry::GeometryRules;
use crate::model::{Layout, UpdateSet};
use crate::prompt;
use crate::reasoning::{PromptContext, ReasoningClient};
use crate::schema::{self, ProposedVariation};

/// A successful result with the number of attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated<T> {
    pub value: T,
    pub attempts: u32,
}

/// Generator using an injected reasoning client
#[derive(Clone)]
pub struct VariationGenerator {
    client: Arc<dyn ReasoningClient>,
    policy: RetryPolicy,
    rules: GeometryRules,
    permits: Option<Arc<Semaphore>>,
}

impl VariationGenerator {
    pub fn new(client: Arc<dyn ReasoningClient>, policy: RetryPolicy, rules: GeometryRules) -> Self {
        Self {
            client,
            policy,
            rules,
            permits: None,
        }
    }

    /// Cap concurrent calls across every clone of this generator.
    pub fn with_max_concurrency(mut self, max_concurrent: usize) -> Self {
        self.permits = Some(Arc::new(Semaphore::new(max_concurrent.max(1))));
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Ask for `desired_count` named variations of `layout`.
    ///
    /// `locked_ids` are presented as fixed; ids missing from the layout are
    /// logged and ignored.
    pub async fn propose(
        &self,
        layout: &Layout,
        locked_ids: &[String],
        desired_count: usize,
        theme: Option<&str>,
    ) -> Result<Generated<Vec<ProposedVariation>>, GenerationError> {
        let (locked, unknown) = layout.with_locked(locked_ids);
        if !unknown.is_empty() {
            tracing::warn!(unknown = ?unknown, "Ignoring locked ids not present in the layout");
        }
        let context = prompt::proposal_prompt(&locked, desired_count, theme, &self.rules);

        let mut generated = self
            .with_retries(&context, |raw| schema::parse_proposals(raw, &locked))
            .await?;
        generated.value.truncate(desired_count.max(1));

        tracing::info!(
            provider = self.client.provider_name(),
            model = self.client.model_name(),
            theme = theme.unwrap_or("-"),
            variations = generated.value.len(),
            attempts = generated.attempts,
            "Generated layout proposals"
        );
        Ok(generated)
    }

    /// Ask for updates fixing `violations` on `candidate`. Only ids in
    /// `scope` may be touched.
    pub async fn repair(
        &self,
        candidate: &Layout,
        violations: &[Violation],
        scope: &[String],
    ) -> Result<Generated<UpdateSet>, GenerationError> {
        let context = prompt::repair_prompt(candidate, violations, scope, &self.rules);
        self.with_retries(&context, |raw| schema::parse_repair(raw, candidate, scope))
            .await
    }

    async fn with_retries<T>(
        &self,
        context: &PromptContext,
        parse: impl Fn(&str) -> Result<T, TransientFailure>,
    ) -> Result<Generated<T>, GenerationError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let failure = match self.call_once(context).await {
                Ok(raw) => match parse(&raw) {
                    Ok(value) => {
                        return Ok(Generated {
                            value,
                            attempts: attempt,
                        })
                    }
                    Err(failure) => failure,
                },
                Err(failure) => failure,
            };

            if attempt >= self.policy.max_attempts {
                tracing::error!(
                    purpose = ?context.purpose,
                    attempts = attempt,
                    error = %failure,
                    "Generation retry budget exhausted"
                );
                return Err(GenerationError::GenerationExhausted {
                    attempts: attempt,
                    last_failure: failure,
                });
            }

            let backoff = self.policy.backoff_for(attempt);
            tracing::warn!(
                purpose = ?context.purpose,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %failure,
                "Generation attempt failed, retrying"
            );
            tokio::time::sleep(backoff).await;
        }
    }

    /// One external call. The timeout starts once a permit is held.
    async fn call_once(&self, context: &PromptContext) -> Result<String, TransientFailure> {
        let _permit = match &self.permits {
            Some(permits) => Some(
                permits
                    .acquire()
                    .await
                    .map_err(|_| TransientFailure::Transport("Failed to acquire rate limit permit".into()))?,
            ),
            None => None,
        };
        let timeout = self.policy.timeout;
        match tokio::time::timeout(timeout, self.client.reason(context)).await {
            Err(_) => Err(TransientFailure::Timeout(timeout.as_millis() as u64)),
            Ok(Err(e)) => Err(TransientFailure::Transport(format!("{e:#}"))),
            Ok(Ok(raw)) => Ok(raw),
        }
    }
}

/// Movable, unlocked objects named by `violations`: the only ids a repair
/// round may touch.
pub fn repair_scope(candidate: &Layout, violations: &[Violation]) -> Vec<String> {
    let mut scope: Vec<String> = violations
        .iter()
        .flat_map(|v| v.object_ids.iter())
        .filter(|id| {
            candidate
                .get(id)
                .is_some_and(|o| o.is_movable() && !o.locked)
        })
        .cloned()
        .collect();
    scope.sort();
    scope.dedup();
    scope
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoundingBox, LayoutUnit, RoomDimensions, RoomObject};
    use crate::reasoning::PromptPurpose;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted responses; `None` is a transport failure.
    struct ScriptedClient {
        script: Mutex<Vec<Option<String>>>,
        prompts: Mutex<Vec<PromptContext>>,
    }

    impl ScriptedClient {
        fn new(script: Vec<Option<&str>>) -> Self {
            let mut script: Vec<_> = script.into_iter().map(|s| s.map(String::from)).collect();
            script.reverse();
            Self {
                script: Mutex::new(script),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ReasoningClient for ScriptedClient {
        async fn reason(&self, context: &PromptContext) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(context.clone());
            match self.script.lock().unwrap().pop() {
                Some(Some(raw)) => Ok(raw),
                _ => Err(anyhow!("connection reset")),
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }

        fn provider_name(&self) -> &str {
            "test"
        }
    }

    struct SlowClient;

    #[async_trait]
    impl ReasoningClient for SlowClient {
        async fn reason(&self, _context: &PromptContext) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("[]".into())
        }

        fn model_name(&self) -> &str {
            "slow"
        }

        fn provider_name(&self) -> &str {
            "test"
        }
    }

    /// Takes `delay` per call and records the highest overlap seen.
    struct GaugedClient {
        delay: Duration,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl GaugedClient {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ReasoningClient for GaugedClient {
        async fn reason(&self, _context: &PromptContext) -> anyhow::Result<String> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(GOOD.into())
        }

        fn model_name(&self) -> &str {
            "gauged"
        }

        fn provider_name(&self) -> &str {
            "test"
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::ZERO,
            timeout: Duration::from_secs(5),
        }
    }

    fn layout() -> Layout {
        Layout::new(
            RoomDimensions::new(12.0, 10.0).unwrap(),
            LayoutUnit::Percent,
            vec![
                RoomObject::movable("bed_1", "bed", BoundingBox::new(5.0, 5.0, 40.0, 50.0)),
                RoomObject::structural("door_1", "door", BoundingBox::new(80.0, 0.0, 15.0, 3.0)),
            ],
        )
        .unwrap()
    }

    const GOOD: &str = r#"{"variations": [{"name": "Cozy", "description": "Corner bed",
        "objects": [{"id": "bed_1", "bbox": [0, 50, 40, 50]}]}]}"#;

    #[tokio::test]
    async fn test_retries_until_success() {
        let client = Arc::new(ScriptedClient::new(vec![None, Some("not json"), Some(GOOD)]));
        let generator = VariationGenerator::new(client.clone(), policy(), GeometryRules::default());

        let generated = generator.propose(&layout(), &[], 1, Some("Cozy")).await.unwrap();
        assert_eq!(generated.attempts, 3);
        assert_eq!(generated.value[0].name, "Cozy");
        assert_eq!(client.prompts.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_failure() {
        let client = Arc::new(ScriptedClient::new(vec![None, None, Some("{}")]));
        let generator = VariationGenerator::new(client, policy(), GeometryRules::default());

        let err = generator.propose(&layout(), &[], 1, None).await.unwrap_err();
        assert_eq!(
            err,
            GenerationError::GenerationExhausted {
                attempts: 3,
                last_failure: TransientFailure::Schema(crate::error::SchemaViolation::EmptyVariations),
            }
        );
    }

    #[tokio::test]
    async fn test_timeout_counts_as_attempt() {
        let generator = VariationGenerator::new(
            Arc::new(SlowClient),
            RetryPolicy {
                max_attempts: 2,
                backoff_base: Duration::ZERO,
                timeout: Duration::from_millis(20),
            },
            GeometryRules::default(),
        );
        let err = generator.propose(&layout(), &[], 1, None).await.unwrap_err();
        assert!(matches!(
            err,
            GenerationError::GenerationExhausted {
                attempts: 2,
                last_failure: TransientFailure::Timeout(20)
            }
        ));
    }

    #[tokio::test]
    async fn test_max_concurrency_caps_overlapping_calls() {
        let client = Arc::new(GaugedClient::new(Duration::from_millis(20)));
        let generator = VariationGenerator::new(client.clone(), policy(), GeometryRules::default())
            .with_max_concurrency(2);
        let base = layout();

        let calls = (0..6).map(|_| generator.propose(&base, &[], 1, None));
        for result in futures::future::join_all(calls).await {
            assert_eq!(result.unwrap().attempts, 1);
        }
        assert_eq!(client.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_queued_calls_do_not_spend_the_timeout() {
        // each call fits the timeout, four queued calls together do not
        let client = Arc::new(GaugedClient::new(Duration::from_millis(80)));
        let generator = VariationGenerator::new(
            client.clone(),
            RetryPolicy {
                max_attempts: 1,
                backoff_base: Duration::ZERO,
                timeout: Duration::from_millis(100),
            },
            GeometryRules::default(),
        )
        .with_max_concurrency(1);
        let base = layout();

        let calls = (0..4).map(|_| generator.propose(&base, &[], 1, None));
        for result in futures::future::join_all(calls).await {
            assert_eq!(result.unwrap().attempts, 1);
        }
        assert_eq!(client.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repair_uses_targeted_prompt() {
        let client = Arc::new(ScriptedClient::new(vec![Some(
            r#"[{"id": "bed_1", "bbox": [0, 40, 40, 50]}]"#,
        )]));
        let generator = VariationGenerator::new(client.clone(), policy(), GeometryRules::default());
        let scope = vec!["bed_1".to_string()];

        let generated = generator.repair(&layout(), &[], &scope).await.unwrap();
        assert_eq!(generated.attempts, 1);
        assert!(generated.value.contains_key("bed_1"));
        assert_eq!(
            client.prompts.lock().unwrap()[0].purpose,
            PromptPurpose::Repair
        );
    }

    #[test]
    fn test_repair_scope_excludes_fixed_objects() {
        let l = layout();
        let violations = vec![Violation {
            kind: crate::constraints::ViolationKind::DoorClearance,
            object_ids: vec!["bed_1".into(), "door_1".into()],
            description: String::new(),
            correction: None,
        }];
        assert_eq!(repair_scope(&l, &violations), vec!["bed_1".to_string()]);
    }
}
