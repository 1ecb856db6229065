//! Service Worker
//!
//! One worker version: ties the fetch router, strategy engine, generation
//! manager and lifecycle controller together behind the install, activate,
//! message and fetch entry points.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheStorage, ResponseSnapshot, SharedStorage};
use crate::config::Config;
use crate::error::Result;
use crate::generation::{ActivationReport, GenerationManager, GenerationSet};
use crate::lifecycle::{LifecycleController, LifecycleState};
use crate::models::{StoreStatus, WorkerMessage, WorkerStatusResponse};
use crate::net::{FetchRequest, Network};
use crate::router::{FetchRouter, RouteClassification};
use crate::strategy::{ResponseStrategyEngine, StrategyOutcome};

/// What the worker does with an intercepted request.
#[derive(Debug)]
pub enum FetchDecision {
    /// Not intercepted; default network handling applies
    PassThrough,
    Respond(StrategyOutcome),
}

#[derive(Debug)]
struct WorkerState {
    lifecycle: LifecycleController,
    generations: GenerationManager,
}

// == Service Worker ==
pub struct ServiceWorker {
    public_origin: Url,
    manifest: Vec<String>,
    router: FetchRouter,
    engine: ResponseStrategyEngine,
    storage: SharedStorage,
    network: Arc<dyn Network>,
    state: RwLock<WorkerState>,
}

impl ServiceWorker {
    pub fn new(config: &Config, storage: SharedStorage, network: Arc<dyn Network>) -> Self {
        let engine = ResponseStrategyEngine::new(
            storage.clone(),
            network.clone(),
            config.public_origin.clone(),
            config.navigation_fallback.clone(),
        );

        Self {
            public_origin: config.public_origin.clone(),
            manifest: config.precache_manifest.clone(),
            router: FetchRouter::new(
                &config.public_origin,
                &config.api_prefixes,
                &config.precache_manifest,
            ),
            engine,
            storage,
            network,
            state: RwLock::new(WorkerState {
                lifecycle: LifecycleController::new(config.skip_waiting_on_install),
                generations: GenerationManager::new(config.generations()),
            }),
        }
    }

    /// Creates a worker over storage that may hold generations from an
    /// earlier run. The pair recorded at the last activation keeps serving
    /// until this version activates, and is purged then if it differs.
    pub fn from_storage(config: &Config, storage: CacheStorage, network: Arc<dyn Network>) -> Self {
        let previous = storage.active().cloned();
        let worker = Self::new(config, storage.into_shared(), network);

        match previous {
            Some(previous) => {
                info!(
                    "Resuming with previously active generations {} / {}",
                    previous.static_gen, previous.dynamic_gen
                );
                worker.with_previous(previous)
            }
            None => worker,
        }
    }

    /// Declares the generations of the version currently serving, which keep
    /// serving until this version activates.
    pub fn with_previous(mut self, previous: GenerationSet) -> Self {
        let state = self.state.get_mut();
        state.generations = state.generations.clone().with_previous(previous);
        self
    }

    pub fn public_origin(&self) -> &Url {
        &self.public_origin
    }

    pub async fn state(&self) -> LifecycleState {
        self.state.read().await.lifecycle.state()
    }

    // == Install ==
    /// Precaches the shell. On failure this version becomes redundant and the
    /// previous generations stay untouched. On success the version waits, or
    /// activates straight away when nothing holds it back.
    pub async fn install(&self) -> Result<()> {
        let static_gen = {
            let mut state = self.state.write().await;
            state.lifecycle.begin_install()?;
            state.generations.declared().static_gen.clone()
        };
        info!(
            "Installing: precaching {} assets into {}",
            self.manifest.len(),
            static_gen
        );

        let result = self.engine.precache(&self.manifest, &static_gen).await;

        let mut state = self.state.write().await;
        if let Err(e) = result {
            state.lifecycle.install_failed()?;
            warn!("Install aborted, previous generation stays active: {}", e);
            return Err(e);
        }
        state.lifecycle.install_succeeded()?;

        self.activate_if_ready(&mut state).await?;
        Ok(())
    }

    // == Activate ==
    /// Activates a waiting version regardless of open clients.
    pub async fn activate(&self) -> Result<ActivationReport> {
        let mut state = self.state.write().await;
        self.activate_locked(&mut state).await
    }

    async fn activate_if_ready(&self, state: &mut WorkerState) -> Result<Option<ActivationReport>> {
        if !state.lifecycle.should_activate() {
            if state.lifecycle.state() == LifecycleState::Waiting {
                info!(
                    "Installed, waiting for {} open clients to close",
                    state.lifecycle.open_clients()
                );
            }
            return Ok(None);
        }
        self.activate_locked(state).await.map(Some)
    }

    async fn activate_locked(&self, state: &mut WorkerState) -> Result<ActivationReport> {
        state.lifecycle.begin_activation()?;
        info!("Activating {:?}", state.generations.declared());

        let report = {
            let mut storage = self.storage.write().await;
            state.generations.activate(&mut storage)
        };
        state.lifecycle.activation_complete()?;

        info!(
            "Activated: purged {} stale generations, claiming {} open clients",
            report.deleted.len(),
            state.lifecycle.open_clients()
        );
        Ok(report)
    }

    // == Messages ==
    /// Handles a message from a page. Unrecognized messages are ignored.
    pub async fn handle_message(&self, message: WorkerMessage) -> Result<LifecycleState> {
        let mut state = self.state.write().await;
        match message {
            WorkerMessage::SkipWaiting => {
                info!("Received skip-waiting, adopting new version");
                state.lifecycle.skip_waiting();
                self.activate_if_ready(&mut state).await?;
            }
            WorkerMessage::Unrecognized => debug!("Ignoring unrecognized message"),
        }
        Ok(state.lifecycle.state())
    }

    // == Clients ==
    pub async fn client_opened(&self) -> usize {
        self.state.write().await.lifecycle.client_opened()
    }

    /// Records a closed client; the last one closing lets a waiting version activate.
    pub async fn client_closed(&self) -> Result<usize> {
        let mut state = self.state.write().await;
        let open = state.lifecycle.client_closed();
        self.activate_if_ready(&mut state).await?;
        Ok(open)
    }

    // == Fetch ==
    /// Routes an intercepted request. Bypassed requests, and every request
    /// while no generation is serving, pass through untouched.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> FetchDecision {
        let route = self.router.classify(request);
        if route == RouteClassification::Bypass {
            debug!("Bypass {} {}", request.method, request.url);
            return FetchDecision::PassThrough;
        }

        let serving = self.state.read().await.generations.serving().cloned();
        match serving {
            Some(generations) => FetchDecision::Respond(
                self.engine
                    .network_first(request, route, &generations)
                    .await,
            ),
            None => {
                debug!("No serving generation, passing {} through", request.url);
                FetchDecision::PassThrough
            }
        }
    }

    /// Default network handling for requests the worker does not intercept.
    pub async fn pass_through(&self, request: &FetchRequest) -> Result<ResponseSnapshot> {
        self.network.fetch(request).await
    }

    // == Status ==
    pub async fn status(&self) -> WorkerStatusResponse {
        let state = self.state.read().await;
        let storage = self.storage.read().await;
        let (static_state, dynamic_state) = state.generations.states();

        WorkerStatusResponse {
            state: state.lifecycle.state(),
            declared: state.generations.declared().clone(),
            static_state,
            dynamic_state,
            serving: state.generations.serving().cloned(),
            open_clients: state.lifecycle.open_clients(),
            stores: storage
                .stats()
                .into_iter()
                .map(|(name, stats)| StoreStatus::new(name, stats))
                .collect(),
            used_bytes: storage.used_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RequestKey;
    use crate::error::ShellError;
    use crate::generation::CacheGeneration;
    use crate::strategy::testing::ScriptedNetwork;
    use crate::strategy::ResponseSource;
    use async_trait::async_trait;
    use axum::http::{HeaderMap, StatusCode};
    use tempfile::TempDir;
    use tokio::sync::{Notify, Semaphore};

    /// Holds fetches of `/slow` until a permit is added to the gate.
    struct GatedNetwork {
        inner: ScriptedNetwork,
        started: Notify,
        gate: Semaphore,
    }

    impl GatedNetwork {
        fn new(inner: ScriptedNetwork) -> Self {
            Self {
                inner,
                started: Notify::new(),
                gate: Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl Network for GatedNetwork {
        async fn fetch(&self, request: &FetchRequest) -> Result<ResponseSnapshot> {
            if request.url.path() == "/slow" {
                self.started.notify_one();
                let _permit = self
                    .gate
                    .acquire()
                    .await
                    .map_err(|e| ShellError::Network(e.to_string()))?;
            }
            self.inner.fetch(request).await
        }
    }

    fn config(static_gen: &str, dynamic_gen: &str, skip_waiting: bool) -> Config {
        Config {
            static_generation: static_gen.to_string(),
            dynamic_generation: dynamic_gen.to_string(),
            precache_manifest: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
            ],
            skip_waiting_on_install: skip_waiting,
            ..Config::default()
        }
    }

    fn shell_network() -> ScriptedNetwork {
        ScriptedNetwork::new()
            .route("/", StatusCode::OK, "root")
            .route("/index.html", StatusCode::OK, "<div id=root>")
            .route("/manifest.json", StatusCode::OK, "{}")
            .route("/api/data", StatusCode::OK, "[]")
            .route("/jobs", StatusCode::OK, "jobs page")
    }

    fn url(path: &str) -> Url {
        Config::default().public_origin.join(path).unwrap()
    }

    fn v1() -> GenerationSet {
        GenerationSet::new(CacheGeneration::new("v1"), CacheGeneration::new("dyn-v1"))
    }

    #[tokio::test]
    async fn test_install_with_skip_waiting_activates() {
        let storage = CacheStorage::shared(None);
        let worker = ServiceWorker::new(
            &config("v1", "dyn-v1", true),
            storage.clone(),
            Arc::new(shell_network()),
        );

        worker.install().await.unwrap();

        assert_eq!(worker.state().await, LifecycleState::Active);
        assert_eq!(storage.read().await.get("v1").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_install_failure_keeps_previous_generation() {
        let storage = CacheStorage::shared(None);
        let cached = ResponseSnapshot::new(StatusCode::OK, HeaderMap::new(), "old jobs", url("/jobs"));
        storage
            .write()
            .await
            .put("dyn-v1", RequestKey::get(&url("/jobs")), cached)
            .unwrap();

        let network = Arc::new(
            ScriptedNetwork::new()
                .route("/", StatusCode::OK, "root")
                .route("/index.html", StatusCode::OK, "index"),
        );
        let worker = ServiceWorker::new(&config("v2", "dyn-v2", true), storage.clone(), network.clone())
            .with_previous(v1());

        let result = worker.install().await;

        assert!(matches!(result, Err(ShellError::InstallFailed { .. })));
        assert_eq!(worker.state().await, LifecycleState::Redundant);
        assert!(!storage.read().await.has("v2"));
        assert!(storage.read().await.has("dyn-v1"));

        // The previous generation still answers offline requests
        network.set_offline(true);
        match worker.handle_fetch(&FetchRequest::get(url("/jobs"))).await {
            FetchDecision::Respond(outcome) => {
                assert_eq!(outcome.source, ResponseSource::Cache);
                assert_eq!(outcome.response.body, "old jobs");
            }
            FetchDecision::PassThrough => panic!("expected a cached response"),
        }
    }

    #[tokio::test]
    async fn test_activation_purges_previous_generation() {
        let storage = CacheStorage::shared(None);
        let old = ServiceWorker::new(&config("v1", "dyn-v1", true), storage.clone(), Arc::new(shell_network()));
        old.install().await.unwrap();

        let new = ServiceWorker::new(&config("v2", "dyn-v2", true), storage.clone(), Arc::new(shell_network()))
            .with_previous(v1());
        new.install().await.unwrap();

        let storage = storage.read().await;
        assert!(!storage.has("v1"));
        assert!(!storage.has("dyn-v1"));
        assert_eq!(storage.keys(), vec!["v2".to_string(), "dyn-v2".to_string()]);
        assert_eq!(new.state().await, LifecycleState::Active);
    }

    #[tokio::test]
    async fn test_skip_waiting_message_adopts_with_open_client() {
        let worker = ServiceWorker::new(
            &config("v1", "dyn-v1", false),
            CacheStorage::shared(None),
            Arc::new(shell_network()),
        );
        worker.client_opened().await;

        worker.install().await.unwrap();
        assert_eq!(worker.state().await, LifecycleState::Waiting);

        let state = worker.handle_message(WorkerMessage::SkipWaiting).await.unwrap();
        assert_eq!(state, LifecycleState::Active);
        assert_eq!(worker.status().await.open_clients, 1);
    }

    #[tokio::test]
    async fn test_last_client_closing_activates() {
        let worker = ServiceWorker::new(
            &config("v1", "dyn-v1", false),
            CacheStorage::shared(None),
            Arc::new(shell_network()),
        );
        worker.client_opened().await;
        worker.client_opened().await;
        worker.install().await.unwrap();

        assert_eq!(worker.client_closed().await.unwrap(), 1);
        assert_eq!(worker.state().await, LifecycleState::Waiting);
        assert_eq!(worker.client_closed().await.unwrap(), 0);
        assert_eq!(worker.state().await, LifecycleState::Active);
    }

    #[tokio::test]
    async fn test_unrecognized_message_is_ignored() {
        let worker = ServiceWorker::new(
            &config("v1", "dyn-v1", false),
            CacheStorage::shared(None),
            Arc::new(shell_network()),
        );
        worker.client_opened().await;
        worker.install().await.unwrap();

        let state = worker.handle_message(WorkerMessage::Unrecognized).await.unwrap();
        assert_eq!(state, LifecycleState::Waiting);
    }

    #[tokio::test]
    async fn test_fetch_before_install_passes_through() {
        let worker = ServiceWorker::new(
            &config("v1", "dyn-v1", true),
            CacheStorage::shared(None),
            Arc::new(shell_network()),
        );

        let decision = worker.handle_fetch(&FetchRequest::get(url("/jobs"))).await;
        assert!(matches!(decision, FetchDecision::PassThrough));
    }

    #[tokio::test]
    async fn test_same_origin_get_populates_dynamic_store() {
        let storage = CacheStorage::shared(None);
        let worker = ServiceWorker::new(&config("v1", "dyn-v1", true), storage.clone(), Arc::new(shell_network()));
        worker.install().await.unwrap();

        let request = FetchRequest::get(url("/jobs"));
        let FetchDecision::Respond(outcome) = worker.handle_fetch(&request).await else {
            panic!("expected the worker to respond");
        };
        outcome.pending_write.unwrap().await.unwrap();

        assert!(storage.read().await.get("dyn-v1").unwrap().contains(&request.key()));
    }

    #[tokio::test]
    async fn test_concurrent_api_requests_never_cached() {
        let storage = CacheStorage::shared(None);
        let worker = Arc::new(ServiceWorker::new(
            &config("v1", "dyn-v1", true),
            storage.clone(),
            Arc::new(shell_network()),
        ));
        worker.install().await.unwrap();

        let request = FetchRequest::get(url("/api/data"));
        let (a, b) = tokio::join!(worker.handle_fetch(&request), worker.handle_fetch(&request));

        assert!(matches!(a, FetchDecision::PassThrough));
        assert!(matches!(b, FetchDecision::PassThrough));
        let response = worker.pass_through(&request).await.unwrap();
        assert_eq!(response.body, "[]");
        assert!(storage.read().await.get("dyn-v1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_reports_generations() {
        let worker = ServiceWorker::new(
            &config("v1", "dyn-v1", true),
            CacheStorage::shared(None),
            Arc::new(shell_network()),
        );
        worker.install().await.unwrap();

        let status = worker.status().await;
        assert_eq!(status.state, LifecycleState::Active);
        assert_eq!(status.serving, Some(v1()));
        assert_eq!(status.stores.len(), 2);
        assert_eq!(status.stores[0].name, "v1");
        assert_eq!(status.stores[0].stats.total_entries, 3);
        assert_eq!(status.stores[1].name, "dyn-v1");
        assert_eq!(status.stores[1].stats.total_entries, 0);
    }

    #[tokio::test]
    async fn test_in_flight_write_for_purged_generation_is_dropped() {
        let storage = CacheStorage::shared(None);
        let old = ServiceWorker::new(&config("v1", "dyn-v1", true), storage.clone(), Arc::new(shell_network()));
        old.install().await.unwrap();

        let network = Arc::new(GatedNetwork::new(
            shell_network().route("/slow", StatusCode::OK, "slow page"),
        ));
        let new = Arc::new(
            ServiceWorker::new(&config("v2", "dyn-v2", false), storage.clone(), network.clone())
                .with_previous(v1()),
        );
        new.client_opened().await;
        new.install().await.unwrap();
        assert_eq!(new.state().await, LifecycleState::Waiting);

        // Served from the previous generation, which activation purges mid-fetch
        let fetch = tokio::spawn({
            let new = new.clone();
            async move { new.handle_fetch(&FetchRequest::get(url("/slow"))).await }
        });
        network.started.notified().await;

        let state = new.handle_message(WorkerMessage::SkipWaiting).await.unwrap();
        assert_eq!(state, LifecycleState::Active);
        network.gate.add_permits(1);

        let FetchDecision::Respond(outcome) = fetch.await.unwrap() else {
            panic!("expected the worker to respond");
        };
        assert_eq!(outcome.response.body, "slow page");
        outcome.pending_write.unwrap().await.unwrap();

        let storage = storage.read().await;
        assert_eq!(storage.keys(), vec!["v2".to_string(), "dyn-v2".to_string()]);
        assert!(!storage.has("dyn-v1"));
    }

    #[tokio::test]
    async fn test_restart_resumes_persisted_generations() {
        let dir = TempDir::new().unwrap();
        let jobs = FetchRequest::get(url("/jobs"));

        // First run: install v1 and cache a page at runtime
        {
            let storage = CacheStorage::persistent(dir.path(), None).unwrap();
            let worker = ServiceWorker::from_storage(&config("v1", "dyn-v1", true), storage, Arc::new(shell_network()));
            worker.install().await.unwrap();
            let FetchDecision::Respond(outcome) = worker.handle_fetch(&jobs).await else {
                panic!("expected the worker to respond");
            };
            outcome.pending_write.unwrap().await.unwrap();
        }

        // Restart of the same version with the upstream down
        {
            let network = shell_network();
            network.set_offline(true);
            let storage = CacheStorage::persistent(dir.path(), None).unwrap();
            let worker = ServiceWorker::from_storage(&config("v1", "dyn-v1", true), storage, Arc::new(network));

            assert!(worker.install().await.is_err());
            assert_eq!(worker.state().await, LifecycleState::Redundant);

            let FetchDecision::Respond(cached) = worker.handle_fetch(&jobs).await else {
                panic!("expected the previous generation to serve");
            };
            assert_eq!(cached.source, ResponseSource::Cache);
            assert_eq!(cached.response.body, "jobs page");

            let FetchDecision::Respond(shell) =
                worker.handle_fetch(&FetchRequest::navigate(url("/applications/7"))).await
            else {
                panic!("expected the previous generation to serve");
            };
            assert_eq!(shell.source, ResponseSource::ShellFallback);
            assert_eq!(shell.response.body, "<div id=root>");
        }

        // Restart with a new version purges v1 from disk
        {
            let storage = CacheStorage::persistent(dir.path(), None).unwrap();
            let worker = ServiceWorker::from_storage(&config("v2", "dyn-v2", true), storage, Arc::new(shell_network()));
            assert_eq!(worker.status().await.serving, Some(v1()));

            worker.install().await.unwrap();
            assert_eq!(worker.state().await, LifecycleState::Active);
        }

        let storage = CacheStorage::persistent(dir.path(), None).unwrap();
        assert_eq!(storage.keys(), vec!["v2".to_string(), "dyn-v2".to_string()]);
        assert_eq!(
            storage.active(),
            Some(&GenerationSet::new(CacheGeneration::new("v2"), CacheGeneration::new("dyn-v2")))
        );
    }
}
