//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI commands
//! and REST handlers. Core services are generic over repository traits;
//! AppState pins them to the SQLite implementations.

use std::sync::Arc;

use apiflow_core::assertion::AssertionEvaluator;
use apiflow_core::event::EventBus;
use apiflow_core::flow::{FlowRunner, RuntimeServices};
use apiflow_core::service::{ExampleService, FlowService, WorkspaceService};
use apiflow_infra::config::ServerConfig;
use apiflow_infra::http::ReqwestExecutor;
use apiflow_infra::resolver::{SqliteExampleResolver, SqliteExecutionRecorder};
use apiflow_infra::script::BoaScriptEngine;
use apiflow_infra::sqlite::{
    DatabasePool, SqliteAssertOverlay, SqliteCollectionRepository, SqliteExampleRepository,
    SqliteFlowRepository, SqliteKeyValueOverlay, SqliteOwnership, SqliteResponseRepository,
    SqliteSnapshotStore, SqliteWorkspaceRepository,
};
use apiflow_types::event::{LogEvent, SyncEvent};
use apiflow_types::overlay::OverlayKind;

use crate::http::extractors::auth::TokenSigner;

pub type ConcreteFlowService = FlowService<SqliteFlowRepository, SqliteWorkspaceRepository>;
pub type ConcreteWorkspaceService = WorkspaceService<SqliteWorkspaceRepository>;
pub type ConcreteExampleService = ExampleService<SqliteExampleRepository>;

/// One store per overlayed field family.
pub struct Overlays {
    pub headers: SqliteKeyValueOverlay,
    pub queries: SqliteKeyValueOverlay,
    pub url_encoded: SqliteKeyValueOverlay,
    pub asserts: SqliteAssertOverlay,
}

impl Overlays {
    fn new(pool: &DatabasePool, sync: &EventBus<SyncEvent>) -> Self {
        Self {
            headers: SqliteKeyValueOverlay::headers(pool.clone()).with_sync(sync.clone()),
            queries: SqliteKeyValueOverlay::queries(pool.clone()).with_sync(sync.clone()),
            url_encoded: SqliteKeyValueOverlay::url_encoded(pool.clone()).with_sync(sync.clone()),
            asserts: SqliteAssertOverlay::new(pool.clone()).with_sync(sync.clone()),
        }
    }

    /// The key/value store for `kind`; `None` for assertions.
    pub fn key_value(&self, kind: OverlayKind) -> Option<&SqliteKeyValueOverlay> {
        match kind {
            OverlayKind::Header => Some(&self.headers),
            OverlayKind::Query => Some(&self.queries),
            OverlayKind::UrlEncoded => Some(&self.url_encoded),
            OverlayKind::Assert => None,
        }
    }
}

/// Shared application state holding all services.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DatabasePool,
    pub workspace_service: Arc<ConcreteWorkspaceService>,
    pub example_service: Arc<ConcreteExampleService>,
    pub flow_service: Arc<ConcreteFlowService>,
    pub collections: Arc<SqliteCollectionRepository>,
    pub examples: Arc<SqliteExampleRepository>,
    pub responses: Arc<SqliteResponseRepository>,
    pub overlays: Arc<Overlays>,
    pub snapshots: Arc<SqliteSnapshotStore>,
    pub resolver: Arc<SqliteExampleResolver>,
    pub ownership: SqliteOwnership,
    pub sync: EventBus<SyncEvent>,
    pub logs: EventBus<LogEvent>,
    pub tokens: Arc<TokenSigner>,
}

impl AppState {
    /// Open the database named by `config` and wire every service.
    pub async fn init(config: &ServerConfig) -> anyhow::Result<Self> {
        if let Some(parent) = config.database.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let db_pool = DatabasePool::new(&config.database.url()).await?;
        Self::from_pool(db_pool, config)
    }

    /// Wire services over an already opened pool.
    pub fn from_pool(db_pool: DatabasePool, config: &ServerConfig) -> anyhow::Result<Self> {
        let sync = EventBus::new(config.event_buffer.max(16) * 4);
        let logs = EventBus::new(config.event_buffer.max(16) * 4);

        let http = ReqwestExecutor::new().map_err(|e| anyhow::anyhow!("http client: {e}"))?;
        let resolver = Arc::new(SqliteExampleResolver::new(db_pool.clone()));
        let services = RuntimeServices {
            resolver: resolver.clone(),
            http: Arc::new(http),
            scripts: Arc::new(BoaScriptEngine::new()),
            recorder: Arc::new(SqliteExecutionRecorder::new(db_pool.clone())),
            assertions: AssertionEvaluator::new(),
            logs: Some(logs.clone()),
        };
        let runner = FlowRunner::new(Arc::new(services))
            .with_request_timeout(config.request_timeout)
            .with_event_buffer(config.event_buffer);

        let flow_service = FlowService::new(
            SqliteFlowRepository::new(db_pool.clone()).with_sync(sync.clone()),
            SqliteWorkspaceRepository::new(db_pool.clone()).with_sync(sync.clone()),
            runner,
            config.flow_timeout,
        );
        let workspace_service =
            WorkspaceService::new(SqliteWorkspaceRepository::new(db_pool.clone()).with_sync(sync.clone()));
        let example_service =
            ExampleService::new(SqliteExampleRepository::new(db_pool.clone()).with_sync(sync.clone()));

        Ok(Self {
            workspace_service: Arc::new(workspace_service),
            example_service: Arc::new(example_service),
            flow_service: Arc::new(flow_service),
            collections: Arc::new(SqliteCollectionRepository::new(db_pool.clone()).with_sync(sync.clone())),
            examples: Arc::new(SqliteExampleRepository::new(db_pool.clone()).with_sync(sync.clone())),
            responses: Arc::new(SqliteResponseRepository::new(db_pool.clone())),
            overlays: Arc::new(Overlays::new(&db_pool, &sync)),
            snapshots: Arc::new(SqliteSnapshotStore::new(db_pool.clone()).with_sync(sync.clone())),
            resolver,
            ownership: SqliteOwnership::new(db_pool.clone()),
            tokens: Arc::new(
                TokenSigner::new(&config.hmac_secret).map_err(|e| anyhow::anyhow!("token signer: {e}"))?,
            ),
            sync,
            logs,
            db_pool,
        })
    }

    /// Cancel in-flight runs and close the pools.
    pub async fn shutdown(&self) {
        let active = self.flow_service.runner().active_runs().len();
        if active > 0 {
            tracing::info!(active, "canceling in-flight flow runs");
        }
        self.flow_service.runner().cancel_all();
        self.db_pool.close().await;
    }
}
