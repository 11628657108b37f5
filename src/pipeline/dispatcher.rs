use crate::config::TimeoutPolicy;
use crate::error::ProviderErrorKind;
use crate::models::{AnalysisResult, ProviderId, ProviderResult, Query};
use crate::providers::ProviderAdapter;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressPhase {
    Started,
    Succeeded,
    Failed,
}

/// Progress observer. Must not block; a panic inside it is logged and ignored.
pub type ProgressFn = Arc<dyn Fn(ProviderId, ProgressPhase) + Send + Sync>;

/// Fans one query out to every configured adapter and waits for all of them.
pub struct Dispatcher {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    timeouts: TimeoutPolicy,
}

impl Dispatcher {
    pub fn new(adapters: Vec<Arc<dyn ProviderAdapter>>, timeouts: TimeoutPolicy) -> Self {
        Self { adapters, timeouts }
    }

    pub fn providers(&self) -> Vec<ProviderId> {
        self.adapters.iter().map(|a| a.id()).collect()
    }

    /// Returns once every adapter has answered, failed, timed out or been
    /// cancelled. Never fails as a whole; with no adapters the result is empty.
    #[instrument(skip_all, fields(providers = self.adapters.len()))]
    pub async fn dispatch(
        &self,
        query: &Query,
        cancel: &CancellationToken,
        on_progress: Option<ProgressFn>,
    ) -> AnalysisResult {
        let start = Instant::now();
        info!(query = %query.text(), "Dispatching query");

        let runs = self
            .adapters
            .iter()
            .map(|adapter| self.run_one(adapter.clone(), query, cancel, on_progress.as_ref()));

        let result: AnalysisResult = join_all(runs).await.into_iter().collect();

        info!(
            succeeded = result.successful().count(),
            configured = result.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Dispatch completed"
        );
        result
    }

    async fn run_one(
        &self,
        adapter: Arc<dyn ProviderAdapter>,
        query: &Query,
        cancel: &CancellationToken,
        on_progress: Option<&ProgressFn>,
    ) -> ProviderResult {
        let provider = adapter.id();
        let model = adapter.model_name().to_string();
        let limit = self.timeouts.for_provider(provider);
        notify(on_progress, provider, ProgressPhase::Started);

        let start = Instant::now();
        // Each call runs as its own task so a panicking adapter only fails
        // its own entry. The task is aborted once this future finishes or is
        // dropped, whichever way the race below ends.
        let task = {
            let query = query.clone();
            tokio::spawn(async move { adapter.call(&query).await })
        };
        let _abort = AbortOnDrop(task.abort_handle());

        let result = tokio::select! {
            outcome = tokio::time::timeout(limit, task) => match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(err)) => {
                    let elapsed_ms = start.elapsed().as_millis() as u64;
                    warn!(provider = %provider, error = %err, "Provider task failed");
                    ProviderResult::failed(
                        provider,
                        model,
                        ProviderErrorKind::Parse,
                        "adapter panicked",
                        elapsed_ms,
                    )
                }
                Err(_) => {
                    let elapsed_ms = start.elapsed().as_millis() as u64;
                    warn!(provider = %provider, timeout_ms = limit.as_millis() as u64, "Provider timed out");
                    ProviderResult::timed_out(provider, model, elapsed_ms)
                }
            },
            _ = cancel.cancelled() => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                warn!(provider = %provider, elapsed_ms, "Provider call cancelled");
                ProviderResult::timed_out(provider, model, elapsed_ms)
            }
        };

        let phase = if result.success {
            ProgressPhase::Succeeded
        } else {
            ProgressPhase::Failed
        };
        notify(on_progress, provider, phase);
        result
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn notify(on_progress: Option<&ProgressFn>, provider: ProviderId, phase: ProgressPhase) {
    let Some(callback) = on_progress else {
        return;
    };
    if panic::catch_unwind(AssertUnwindSafe(|| callback(provider, phase))).is_err() {
        warn!(provider = %provider, ?phase, "Progress callback panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Stub {
        id: ProviderId,
        delay: Duration,
    }

    #[async_trait]
    impl ProviderAdapter for Stub {
        fn id(&self) -> ProviderId {
            self.id
        }

        fn model_name(&self) -> &str {
            "stub"
        }

        async fn call(&self, _query: &Query) -> ProviderResult {
            tokio::time::sleep(self.delay).await;
            ProviderResult {
                success: true,
                provider_id: self.id,
                model_name: "stub".to_string(),
                answer_text: "ok".to_string(),
                citations: vec![],
                response_time_ms: self.delay.as_millis() as u64,
                error: None,
                error_kind: None,
            }
        }
    }

    fn stub(id: ProviderId, delay_ms: u64) -> Arc<dyn ProviderAdapter> {
        Arc::new(Stub {
            id,
            delay: Duration::from_millis(delay_ms),
        })
    }

    #[tokio::test]
    async fn no_adapters_yield_empty_result() {
        let dispatcher = Dispatcher::new(vec![], TimeoutPolicy::default());
        let query = Query::new("anything").unwrap();
        let result = dispatcher
            .dispatch(&query, &CancellationToken::new(), None)
            .await;
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn progress_reports_each_phase() {
        let seen: Arc<Mutex<Vec<(ProviderId, ProgressPhase)>>> = Arc::default();
        let sink = seen.clone();
        let on_progress: ProgressFn = Arc::new(move |id: ProviderId, phase: ProgressPhase| {
            sink.lock().unwrap().push((id, phase));
        });

        let dispatcher = Dispatcher::new(
            vec![stub(ProviderId::OpenAi, 1), stub(ProviderId::Gemini, 500)],
            TimeoutPolicy::uniform(Duration::from_millis(50)),
        );
        let query = Query::new("q").unwrap();
        dispatcher
            .dispatch(&query, &CancellationToken::new(), Some(on_progress))
            .await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert!(seen.contains(&(ProviderId::OpenAi, ProgressPhase::Succeeded)));
        assert!(seen.contains(&(ProviderId::Gemini, ProgressPhase::Failed)));
        assert_eq!(
            seen.iter()
                .filter(|(_, p)| *p == ProgressPhase::Started)
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn panicking_progress_does_not_affect_result() {
        let on_progress: ProgressFn = Arc::new(|_: ProviderId, _: ProgressPhase| panic!("observer failure"));
        let dispatcher = Dispatcher::new(
            vec![stub(ProviderId::Claude, 1)],
            TimeoutPolicy::default(),
        );
        let query = Query::new("q").unwrap();
        let result = dispatcher
            .dispatch(&query, &CancellationToken::new(), Some(on_progress))
            .await;
        assert!(result.get(ProviderId::Claude).unwrap().success);
    }

    struct Panicking;

    #[async_trait]
    impl ProviderAdapter for Panicking {
        fn id(&self) -> ProviderId {
            ProviderId::OpenAi
        }

        fn model_name(&self) -> &str {
            "broken"
        }

        async fn call(&self, _query: &Query) -> ProviderResult {
            panic!("adapter bug")
        }
    }

    #[tokio::test]
    async fn panicking_adapter_fails_only_its_own_entry() {
        let broken: Arc<dyn ProviderAdapter> = Arc::new(Panicking);
        let dispatcher = Dispatcher::new(
            vec![broken, stub(ProviderId::Gemini, 1)],
            TimeoutPolicy::default(),
        );
        let query = Query::new("q").unwrap();
        let result = dispatcher
            .dispatch(&query, &CancellationToken::new(), None)
            .await;

        let openai = result.get(ProviderId::OpenAi).unwrap();
        assert!(!openai.success);
        assert_eq!(openai.model_name, "broken");
        assert_eq!(openai.error_kind, Some(ProviderErrorKind::Parse));
        assert!(openai.citations.is_empty());
        assert!(result.get(ProviderId::Gemini).unwrap().success);
    }

    #[tokio::test]
    async fn cancellation_reports_timeout() {
        let dispatcher = Dispatcher::new(
            vec![stub(ProviderId::Perplexity, 5_000)],
            TimeoutPolicy::default(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let query = Query::new("q").unwrap();
        let result = dispatcher.dispatch(&query, &cancel, None).await;

        let perplexity = result.get(ProviderId::Perplexity).unwrap();
        assert!(!perplexity.success);
        assert_eq!(perplexity.error.as_deref(), Some("timeout"));
    }
}
