use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, warn};

use super::failure::{FailureKind, RetryClass};
use super::interface::ChatMessage;
use super::upstream::CompletionBackend;

/// Suspends the current task between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Real-time sleeper backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Attempt ceiling plus the per-kind delay schedules.
///
/// Each schedule holds one delay per allowed retry, so its length is also the
/// kind's retry budget. Rate limits take their delay from the upstream and only
/// carry a count.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub empty_response: Vec<Duration>,
    pub payment_required: Vec<Duration>,
    pub rate_limited_retries: u32,
    pub transient_connection: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        let secs = |values: &[u64]| -> Vec<Duration> {
            values.iter().map(|s| Duration::from_secs(*s)).collect()
        };
        Self {
            max_attempts: 6,
            empty_response: secs(&[1, 2, 4, 8, 16]),
            payment_required: secs(&[5, 5, 5]),
            rate_limited_retries: 3,
            transient_connection: secs(&[0, 0, 0]),
        }
    }
}

impl RetryPolicy {
    pub fn max_retries(&self, class: RetryClass) -> u32 {
        match class {
            RetryClass::EmptyResponse => self.empty_response.len() as u32,
            RetryClass::PaymentRequired => self.payment_required.len() as u32,
            RetryClass::RateLimited => self.rate_limited_retries,
            RetryClass::TransientConnection => self.transient_connection.len() as u32,
        }
    }

    fn scheduled_delay(&self, failure: &FailureKind, class: RetryClass, used: u32) -> Duration {
        let schedule = match class {
            RetryClass::EmptyResponse => &self.empty_response,
            RetryClass::PaymentRequired => &self.payment_required,
            RetryClass::TransientConnection => &self.transient_connection,
            RetryClass::RateLimited => {
                return match failure {
                    FailureKind::RateLimited { retry_after } => *retry_after,
                    _ => Duration::ZERO,
                };
            }
        };
        schedule.get(used as usize).copied().unwrap_or_default()
    }
}

/// Per-kind retry counters for one orchestration
#[derive(Debug)]
pub struct RetryBudget<'a> {
    policy: &'a RetryPolicy,
    used: [u32; 4],
}

/// A granted retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryGrant {
    pub class: RetryClass,
    /// 1-based count of retries consumed for this class, this one included
    pub number: u32,
    pub max: u32,
    pub delay: Duration,
}

impl<'a> RetryBudget<'a> {
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self { policy, used: [0; 4] }
    }

    /// Consume one retry for the failure's kind, or `None` when the kind is
    /// fatal or its budget is spent. Other kinds' counters are untouched.
    pub fn try_consume(&mut self, failure: &FailureKind) -> Option<RetryGrant> {
        let class = failure.retry_class()?;
        let max = self.policy.max_retries(class);
        let used = self.used[class.index()];
        if used >= max {
            return None;
        }
        let delay = self.policy.scheduled_delay(failure, class, used);
        self.used[class.index()] = used + 1;
        Some(RetryGrant {
            class,
            number: used + 1,
            max,
            delay,
        })
    }
}

/// Terminal state of one orchestration
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    Success {
        text: String,
        attempts: u32,
        retries: u32,
    },
    Exhausted {
        last_failure: FailureKind,
        attempts: u32,
        retries: u32,
    },
}

impl RetryOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Success { attempts, .. }
            | RetryOutcome::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn retries(&self) -> u32 {
        match self {
            RetryOutcome::Success { retries, .. }
            | RetryOutcome::Exhausted { retries, .. } => *retries,
        }
    }
}

/// Drives repeated upstream calls until success or exhaustion
pub struct RetryOrchestrator {
    backend: Arc<dyn CompletionBackend>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl RetryOrchestrator {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        sleeper: Arc<dyn Sleeper>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            sleeper,
            policy,
        }
    }

    pub async fn run(&self, messages: &[ChatMessage]) -> RetryOutcome {
        let mut budget = RetryBudget::new(&self.policy);
        let mut retries = 0;
        let mut attempts = 0;
        let mut last_failure = None;

        while attempts < self.policy.max_attempts {
            attempts += 1;
            let failure = match self.backend.complete(messages).await {
                Ok(text) => {
                    return RetryOutcome::Success {
                        text,
                        attempts,
                        retries,
                    }
                }
                Err(failure) => failure,
            };

            if !failure.is_retryable() {
                error!("Upstream error (no retry): {}", failure);
                last_failure = Some(failure);
                break;
            }

            match budget.try_consume(&failure) {
                Some(grant) => {
                    retries += 1;
                    warn!(
                        "{}, retry {}/{} after {}s: {}",
                        grant.class.label(),
                        grant.number,
                        grant.max,
                        grant.delay.as_secs_f64(),
                        failure
                    );
                    if !grant.delay.is_zero() {
                        self.sleeper.sleep(grant.delay).await;
                    }
                    last_failure = Some(failure);
                }
                None => {
                    warn!("Retry budget spent: {}", failure);
                    last_failure = Some(failure);
                    break;
                }
            }
        }

        RetryOutcome::Exhausted {
            last_failure: last_failure
                .unwrap_or_else(|| FailureKind::Unexpected("no attempts allowed".to_string())),
            attempts,
            retries,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{RecordingSleeper, ScriptedBackend};
    use super::*;

    fn empty() -> Result<String, FailureKind> {
        Err(FailureKind::EmptyResponse("empty".to_string()))
    }

    fn payment() -> Result<String, FailureKind> {
        Err(FailureKind::PaymentRequired("credits".to_string()))
    }

    fn limited(secs: f64) -> Result<String, FailureKind> {
        Err(FailureKind::rate_limited_secs(secs))
    }

    fn transient() -> Result<String, FailureKind> {
        Err(FailureKind::TransientConnection("reset".to_string()))
    }

    fn ok(text: &str) -> Result<String, FailureKind> {
        Ok(text.to_string())
    }

    fn secs(values: &[f64]) -> Vec<Duration> {
        values.iter().map(|s| Duration::from_secs_f64(*s)).collect()
    }

    async fn run(
        backend: ScriptedBackend,
    ) -> (RetryOutcome, Arc<ScriptedBackend>, Arc<RecordingSleeper>) {
        let backend = Arc::new(backend);
        let sleeper = Arc::new(RecordingSleeper::default());
        let orchestrator =
            RetryOrchestrator::new(backend.clone(), sleeper.clone(), RetryPolicy::default());
        let outcome = orchestrator.run(&[ChatMessage::user("hi")]).await;
        (outcome, backend, sleeper)
    }

    #[tokio::test]
    async fn first_attempt_success() {
        let (outcome, backend, sleeper) = run(ScriptedBackend::new(vec![ok("Hello")])).await;
        assert_eq!(
            outcome,
            RetryOutcome::Success {
                text: "Hello".to_string(),
                attempts: 1,
                retries: 0
            }
        );
        assert_eq!(backend.calls(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn empty_responses_back_off_exponentially_and_exhaust_at_six() {
        let (outcome, backend, sleeper) = run(ScriptedBackend::always(empty())).await;
        assert!(matches!(
            outcome,
            RetryOutcome::Exhausted {
                last_failure: FailureKind::EmptyResponse(_),
                attempts: 6,
                retries: 5
            }
        ));
        assert_eq!(backend.calls(), 6);
        assert_eq!(sleeper.delays(), secs(&[1.0, 2.0, 4.0, 8.0, 16.0]));
    }

    #[tokio::test]
    async fn payment_required_retries_three_times_flat() {
        let (outcome, backend, sleeper) = run(ScriptedBackend::always(payment())).await;
        assert!(matches!(
            outcome,
            RetryOutcome::Exhausted {
                last_failure: FailureKind::PaymentRequired(_),
                attempts: 4,
                retries: 3
            }
        ));
        assert_eq!(backend.calls(), 4);
        assert_eq!(sleeper.delays(), secs(&[5.0, 5.0, 5.0]));
    }

    #[tokio::test]
    async fn transient_errors_retry_without_sleeping() {
        let (outcome, backend, sleeper) = run(ScriptedBackend::always(transient())).await;
        assert_eq!(outcome.attempts(), 4);
        assert_eq!(outcome.retries(), 3);
        assert_eq!(backend.calls(), 4);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn rate_limit_honors_retry_after_then_succeeds() {
        let script = vec![limited(2.0), limited(2.0), limited(2.0), ok("Hi")];
        let (outcome, backend, sleeper) = run(ScriptedBackend::new(script)).await;
        assert_eq!(
            outcome,
            RetryOutcome::Success {
                text: "Hi".to_string(),
                attempts: 4,
                retries: 3
            }
        );
        assert_eq!(backend.calls(), 4);
        assert_eq!(sleeper.delays(), secs(&[2.0, 2.0, 2.0]));
    }

    #[tokio::test]
    async fn rate_limit_delay_is_dynamic_per_occurrence() {
        let script = vec![limited(0.5), limited(3.0), ok("Hi")];
        let (_, _, sleeper) = run(ScriptedBackend::new(script)).await;
        assert_eq!(sleeper.delays(), secs(&[0.5, 3.0]));
    }

    #[tokio::test]
    async fn fourth_rate_limit_exhausts() {
        let (outcome, backend, _) = run(ScriptedBackend::always(limited(1.0))).await;
        assert_eq!(outcome.attempts(), 4);
        assert_eq!(backend.calls(), 4);
        assert!(matches!(outcome, RetryOutcome::Exhausted { .. }));
    }

    #[tokio::test]
    async fn fatal_failures_stop_after_one_attempt_without_delay() {
        let fatal = [
            FailureKind::NonRetryableUpstream {
                status: Some(400),
                message: "bad request".to_string(),
            },
            FailureKind::Unexpected("parse".to_string()),
        ];
        for failure in fatal {
            let (outcome, backend, sleeper) =
                run(ScriptedBackend::always(Err(failure.clone()))).await;
            assert_eq!(
                outcome,
                RetryOutcome::Exhausted {
                    last_failure: failure,
                    attempts: 1,
                    retries: 0
                }
            );
            assert_eq!(backend.calls(), 1);
            assert!(sleeper.delays().is_empty());
        }
    }

    #[tokio::test]
    async fn mixed_kinds_use_independent_budgets() {
        let script = vec![empty(), limited(1.0), empty(), ok("done")];
        let (outcome, _, sleeper) = run(ScriptedBackend::new(script)).await;
        assert_eq!(outcome.attempts(), 4);
        assert_eq!(outcome.retries(), 3);
        assert!(matches!(outcome, RetryOutcome::Success { .. }));
        // second empty response takes the second slot of its own schedule
        assert_eq!(sleeper.delays(), secs(&[1.0, 1.0, 2.0]));
    }

    #[tokio::test]
    async fn three_rate_limits_then_two_empties_then_success() {
        let script = vec![
            limited(1.0),
            limited(1.0),
            limited(1.0),
            empty(),
            empty(),
            ok("finally"),
        ];
        let (outcome, backend, _) = run(ScriptedBackend::new(script)).await;
        assert_eq!(
            outcome,
            RetryOutcome::Success {
                text: "finally".to_string(),
                attempts: 6,
                retries: 5
            }
        );
        assert_eq!(backend.calls(), 6);
    }

    #[tokio::test]
    async fn attempt_ceiling_truncates_mixed_budgets() {
        let script = vec![transient(), transient(), transient(), empty(), empty(), empty()];
        let (outcome, backend, sleeper) =
            run(ScriptedBackend::with_fallback(script, ok("never"))).await;
        // the sixth failure still has budget, so it counts a retry and waits
        assert!(matches!(
            outcome,
            RetryOutcome::Exhausted {
                last_failure: FailureKind::EmptyResponse(_),
                attempts: 6,
                retries: 6
            }
        ));
        assert_eq!(backend.calls(), 6);
        assert_eq!(sleeper.delays(), secs(&[1.0, 2.0, 4.0]));
    }

    #[tokio::test]
    async fn rate_limit_on_last_attempt_still_waits() {
        let script = vec![empty(), empty(), empty(), empty(), empty(), limited(3.0)];
        let (outcome, backend, sleeper) =
            run(ScriptedBackend::with_fallback(script, ok("never"))).await;
        assert_eq!(outcome.attempts(), 6);
        assert_eq!(outcome.retries(), 6);
        assert_eq!(backend.calls(), 6);
        assert_eq!(sleeper.delays(), secs(&[1.0, 2.0, 4.0, 8.0, 16.0, 3.0]));
    }

    #[tokio::test]
    async fn never_exceeds_attempt_ceiling_for_any_mix() {
        let kinds = [empty(), payment(), limited(0.0), transient()];
        for offset in 0..kinds.len() {
            let script: Vec<_> = (0..12)
                .map(|i| kinds[(i + offset) % kinds.len()].clone())
                .collect();
            let (outcome, backend, _) = run(ScriptedBackend::with_fallback(script, empty())).await;
            assert!(backend.calls() <= 6);
            assert_eq!(outcome.attempts(), backend.calls());
            assert!(matches!(outcome, RetryOutcome::Exhausted { .. }));
        }
    }

    #[tokio::test]
    async fn same_script_gives_same_outcome() {
        let script = || vec![empty(), payment(), transient(), limited(1.0), ok("stable")];
        let (first, first_backend, first_sleeper) = run(ScriptedBackend::new(script())).await;
        let (second, second_backend, second_sleeper) = run(ScriptedBackend::new(script())).await;
        assert_eq!(first, second);
        assert_eq!(first_backend.calls(), second_backend.calls());
        assert_eq!(first_sleeper.delays(), second_sleeper.delays());
    }

    #[test]
    fn budget_counts_each_class_separately() {
        let policy = RetryPolicy::default();
        let mut budget = RetryBudget::new(&policy);
        let empty = FailureKind::EmptyResponse(String::new());
        let limited = FailureKind::rate_limited_secs(7.0);

        let grant = budget.try_consume(&limited).unwrap();
        assert_eq!(grant.delay, Duration::from_secs(7));
        assert_eq!((grant.number, grant.max), (1, 3));

        for expected in [1, 2, 4, 8, 16] {
            let grant = budget.try_consume(&empty).unwrap();
            assert_eq!(grant.delay, Duration::from_secs(expected));
        }
        assert!(budget.try_consume(&empty).is_none());

        let grant = budget.try_consume(&limited).unwrap();
        assert_eq!((grant.class, grant.number), (RetryClass::RateLimited, 2));
        let grant = budget
            .try_consume(&FailureKind::PaymentRequired(String::new()))
            .unwrap();
        assert_eq!((grant.number, grant.delay), (1, Duration::from_secs(5)));
    }
}
