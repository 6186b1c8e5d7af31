//! ModelResourceCache — process-wide, single-flight model loading.
//!
//! State machine: `Unloaded -> Loading -> {Ready, Failed}`, and
//! `Ready -> Loading` again on explicit reload. At most one load is in
//! flight per cache; every caller that arrives while a load is running
//! suspends on a shared watch channel and observes the same outcome —
//! never an independent retry.
//!
//! A failed load is terminal until someone calls [`reload`]: retrying
//! silently on every request would be worse than a fast, visible
//! failure a caller-level policy can act on.
//!
//! The load itself runs in a detached task, so a waiter that gets
//! cancelled simply stops waiting — the load keeps going for everyone
//! else.

use pitchpal_core::ModelError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{error, info};

use crate::generator::{Generator, ModelLoader};

type LoadResult = Result<Arc<dyn Generator>, ModelError>;

/// Externally visible cache state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Unloaded => "unloaded",
            ModelStatus::Loading => "loading",
            ModelStatus::Ready => "ready",
            ModelStatus::Failed => "failed",
        }
    }
}

enum CacheState {
    Unloaded,
    Loading {
        rx: watch::Receiver<Option<LoadResult>>,
        /// The handle being replaced during a reload. Served to
        /// callers until the new one is ready, so a reload never
        /// opens a window with no usable handle.
        previous: Option<Arc<dyn Generator>>,
    },
    Ready(Arc<dyn Generator>),
    Failed(ModelError),
}

struct Inner {
    loader: Arc<dyn ModelLoader>,
    model_name: String,
    state: Mutex<CacheState>,
}

/// Shared holder of the loaded model/tokenizer/pipeline.
pub struct ModelResourceCache {
    inner: Arc<Inner>,
}

impl ModelResourceCache {
    /// Create a cache in the `Unloaded` state. Nothing is loaded
    /// until the first [`get_pipeline`](Self::get_pipeline) call.
    pub fn new(model_name: impl Into<String>, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            inner: Arc::new(Inner {
                loader,
                model_name: model_name.into(),
                state: Mutex::new(CacheState::Unloaded),
            }),
        }
    }

    /// The model this cache serves.
    pub fn model_name(&self) -> &str {
        &self.inner.model_name
    }

    /// Current state, for diagnostics.
    pub async fn status(&self) -> ModelStatus {
        match &*self.inner.state.lock().await {
            CacheState::Unloaded => ModelStatus::Unloaded,
            CacheState::Loading { .. } => ModelStatus::Loading,
            CacheState::Ready(_) => ModelStatus::Ready,
            CacheState::Failed(_) => ModelStatus::Failed,
        }
    }

    /// Get the generation pipeline, loading it on first use.
    ///
    /// - `Ready`: returns the shared handle immediately.
    /// - `Loading`: suspends (no polling) until the in-flight load
    ///   resolves, then returns whatever every other waiter got. A
    ///   reload in progress keeps serving the previous handle.
    /// - `Unloaded`: this caller becomes the loader.
    /// - `Failed`: returns the original load error until a reload.
    pub async fn get_pipeline(&self) -> LoadResult {
        let rx = {
            let mut state = self.inner.state.lock().await;
            match &*state {
                CacheState::Ready(generator) => return Ok(generator.clone()),
                CacheState::Failed(err) => return Err(err.clone()),
                CacheState::Loading { rx, previous } => {
                    if let Some(prev) = previous {
                        return Ok(prev.clone());
                    }
                    rx.clone()
                }
                CacheState::Unloaded => Self::begin_load(&self.inner, &mut state, None),
            }
        };

        Self::await_load(rx).await
    }

    /// Like [`get_pipeline`](Self::get_pipeline) but gives up after
    /// `timeout`. The load itself keeps running for other waiters.
    pub async fn get_pipeline_timeout(&self, timeout: Duration) -> LoadResult {
        tokio::time::timeout(timeout, self.get_pipeline())
            .await
            .map_err(|_| ModelError::Timeout(timeout.as_secs()))?
    }

    /// Force a new load attempt, even from `Ready` or `Failed`.
    ///
    /// From `Ready`, callers keep getting the existing handle until
    /// the replacement resolves. A no-op while a load is already in
    /// flight (single-flight applies to reloads too).
    pub async fn reload(&self) {
        let mut state = self.inner.state.lock().await;
        let previous = match &*state {
            CacheState::Loading { .. } => return,
            CacheState::Ready(generator) => Some(generator.clone()),
            _ => None,
        };
        Self::begin_load(&self.inner, &mut state, previous);
    }

    /// Transition to `Loading` and kick off the load in a detached
    /// task. Must be called with the state lock held.
    fn begin_load(
        inner: &Arc<Inner>,
        state: &mut CacheState,
        previous: Option<Arc<dyn Generator>>,
    ) -> watch::Receiver<Option<LoadResult>> {
        let (tx, rx) = watch::channel(None);
        *state = CacheState::Loading {
            rx: rx.clone(),
            previous,
        };

        let inner = inner.clone();
        tokio::spawn(async move {
            info!(model = %inner.model_name, "Loading model");
            let result = inner.loader.load(&inner.model_name).await;

            let mut state = inner.state.lock().await;
            match &result {
                Ok(generator) => {
                    info!(model = %generator.model_name(), "Model ready");
                    *state = CacheState::Ready(generator.clone());
                }
                Err(err) => {
                    error!(model = %inner.model_name, error = %err, "Model load failed");
                    *state = CacheState::Failed(err.clone());
                }
            }
            drop(state);

            // Release every waiter with the same outcome.
            let _ = tx.send(Some(result));
        });

        rx
    }

    async fn await_load(mut rx: watch::Receiver<Option<LoadResult>>) -> LoadResult {
        loop {
            if let Some(result) = rx.borrow().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                return Err(ModelError::TaskFailed(
                    "model load task dropped without a result".into(),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{GenerationOutput, GenerationParams};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokenizers::Tokenizer;

    struct StubGenerator {
        name: String,
    }

    impl Generator for StubGenerator {
        fn model_name(&self) -> &str {
            &self.name
        }

        fn tokenizer(&self) -> Option<Arc<Tokenizer>> {
            None
        }

        fn generate(
            &self,
            _prompt: &str,
            _params: &GenerationParams,
        ) -> Result<GenerationOutput, ModelError> {
            Ok(GenerationOutput {
                text: "stub reply".into(),
                prompt_tokens: 1,
                completion_tokens: 2,
            })
        }
    }

    /// Counts load attempts; optionally fails the first `fail_first` of
    /// them; sleeps `delay_ms` to widen the race window.
    struct StubLoader {
        calls: AtomicUsize,
        fail_first: usize,
        delay_ms: u64,
    }

    impl StubLoader {
        fn new(delay_ms: u64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first: 0,
                delay_ms,
            }
        }

        fn failing_first(fail_first: usize, delay_ms: u64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first,
                delay_ms,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelLoader for StubLoader {
        async fn load(&self, model_name: &str) -> Result<Arc<dyn Generator>, ModelError> {
            let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            if attempt < self.fail_first {
                return Err(ModelError::LoadFailed {
                    model: model_name.into(),
                    reason: "stubbed failure".into(),
                });
            }
            Ok(Arc::new(StubGenerator {
                name: model_name.into(),
            }))
        }
    }

    #[tokio::test]
    async fn starts_unloaded_and_becomes_ready() {
        let loader = Arc::new(StubLoader::new(0));
        let cache = ModelResourceCache::new("tinyllama", loader.clone());

        assert_eq!(cache.status().await, ModelStatus::Unloaded);
        let handle = cache.get_pipeline().await.unwrap();
        assert_eq!(handle.model_name(), "tinyllama");
        assert_eq!(cache.status().await, ModelStatus::Ready);
        assert_eq!(loader.calls(), 1);
    }

    #[tokio::test]
    async fn single_flight_under_concurrent_callers() {
        let loader = Arc::new(StubLoader::new(50));
        let cache = Arc::new(ModelResourceCache::new("tinyllama", loader.clone()));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move { cache.get_pipeline().await }));
        }

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap().unwrap());
        }

        assert_eq!(loader.calls(), 1, "exactly one load must execute");
        for handle in &handles[1..] {
            assert!(
                Arc::ptr_eq(&handles[0], handle),
                "all waiters share one handle"
            );
        }
    }

    #[tokio::test]
    async fn failure_is_broadcast_and_terminal() {
        let loader = Arc::new(StubLoader::failing_first(usize::MAX, 20));
        let cache = Arc::new(ModelResourceCache::new("tinyllama", loader.clone()));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move { cache.get_pipeline().await }));
        }
        for task in tasks {
            let result = task.await.unwrap();
            assert!(matches!(result, Err(ModelError::LoadFailed { .. })));
        }
        assert_eq!(loader.calls(), 1);
        assert_eq!(cache.status().await, ModelStatus::Failed);

        // No silent retry on the next request.
        let result = cache.get_pipeline().await;
        assert!(result.is_err());
        assert_eq!(loader.calls(), 1);
    }

    #[tokio::test]
    async fn explicit_reload_retries_after_failure() {
        let loader = Arc::new(StubLoader::failing_first(1, 0));
        let cache = ModelResourceCache::new("tinyllama", loader.clone());

        assert!(cache.get_pipeline().await.is_err());
        assert_eq!(cache.status().await, ModelStatus::Failed);

        cache.reload().await;
        let handle = cache.get_pipeline().await.unwrap();
        assert_eq!(handle.model_name(), "tinyllama");
        assert_eq!(loader.calls(), 2);
    }

    #[tokio::test]
    async fn reload_serves_previous_handle_until_replacement_is_ready() {
        let loader = Arc::new(StubLoader::new(100));
        let cache = ModelResourceCache::new("tinyllama", loader.clone());

        let first = cache.get_pipeline().await.unwrap();

        cache.reload().await;
        assert_eq!(cache.status().await, ModelStatus::Loading);

        // Mid-reload: callers still get the old handle, without waiting.
        let during = cache.get_pipeline().await.unwrap();
        assert!(Arc::ptr_eq(&first, &during));

        tokio::time::sleep(Duration::from_millis(200)).await;
        let after = cache.get_pipeline().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &after), "new handle after reload");
        assert_eq!(loader.calls(), 2);
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_cancel_the_load() {
        let loader = Arc::new(StubLoader::new(80));
        let cache = Arc::new(ModelResourceCache::new("tinyllama", loader.clone()));

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_pipeline().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        waiter.abort();

        // The detached load finishes anyway and serves later callers.
        let handle = cache.get_pipeline().await.unwrap();
        assert_eq!(handle.model_name(), "tinyllama");
        assert_eq!(loader.calls(), 1);
    }

    #[tokio::test]
    async fn timeout_waiter_gets_timeout_error_not_load_error() {
        let loader = Arc::new(StubLoader::new(200));
        let cache = Arc::new(ModelResourceCache::new("tinyllama", loader.clone()));

        let result = cache.get_pipeline_timeout(Duration::from_millis(10)).await;
        assert!(matches!(result, Err(ModelError::Timeout(_))));

        // The load is unaffected: it completes and the cache is usable.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(cache.status().await, ModelStatus::Ready);
        assert_eq!(loader.calls(), 1);
    }

    #[tokio::test]
    async fn reload_is_a_noop_while_loading() {
        let loader = Arc::new(StubLoader::new(80));
        let cache = Arc::new(ModelResourceCache::new("tinyllama", loader.clone()));

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_pipeline().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.reload().await;

        waiter.await.unwrap().unwrap();
        assert_eq!(loader.calls(), 1);
    }
}
