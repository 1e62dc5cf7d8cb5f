//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (recurring trigger,
//! filesystem, connector factory, clock) and an [`EngineConfig`] into the
//! sync engine. Every service is constructed once here and shared through
//! `Arc`; [`CoreService::shutdown`] tears the trigger down again.
//!
//! Long-running hosts typically enable the `desktop-shims` feature (which
//! depends on `bridge-desktop`) and call [`CoreService::start`].

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{
    background::RecurringTrigger, connector::ConnectorFactory, storage::FileSystemAccess,
    time::Clock,
};
use core_runtime::config::EngineConfig;
use core_sync::{
    create_pool, DatabaseConfig, SqliteCatalogRepository, SqliteJobRepository, SyncDependencies,
    SyncJobService, SyncOrchestrator,
};
use tracing::info;

#[cfg(feature = "desktop-shims")]
use bridge_desktop::{TokioFileSystem, TokioJobTrigger};
#[cfg(feature = "desktop-shims")]
use bridge_traits::time::SystemClock;
#[cfg(feature = "desktop-shims")]
use provider_s3::S3ConnectorFactory;

/// Aggregated handle to all bridge dependencies the core requires.
#[derive(Clone)]
pub struct CoreDependencies {
    pub trigger: Arc<dyn RecurringTrigger>,
    pub filesystem: Arc<dyn FileSystemAccess>,
    pub connectors: Arc<dyn ConnectorFactory>,
    pub clock: Arc<dyn Clock>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        trigger: Arc<dyn RecurringTrigger>,
        filesystem: Arc<dyn FileSystemAccess>,
        connectors: Arc<dyn ConnectorFactory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            trigger,
            filesystem,
            connectors,
            clock,
        }
    }

    /// Tokio trigger and filesystem, S3 connectors and the system clock.
    #[cfg(feature = "desktop-shims")]
    pub fn desktop(config: &EngineConfig) -> Self {
        Self::new(
            Arc::new(TokioJobTrigger::with_pool_size(config.worker_pool_size)),
            Arc::new(TokioFileSystem::new()),
            Arc::new(S3ConnectorFactory::from_config(config)),
            Arc::new(SystemClock),
        )
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<EngineConfig>,
    trigger: Arc<dyn RecurringTrigger>,
    orchestrator: Arc<SyncOrchestrator>,
    jobs: Arc<SyncJobService>,
}

impl CoreService {
    /// Open the catalog, build the sync services and restore every stored
    /// job's schedule.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, the catalog database cannot be
    /// opened or migrated, or stored jobs cannot be read.
    pub async fn bootstrap(config: EngineConfig, deps: CoreDependencies) -> Result<Self> {
        config.validate()?;

        let pool = create_pool(DatabaseConfig::new(config.database_url.clone())).await?;

        let sync_deps = SyncDependencies {
            jobs: Arc::new(SqliteJobRepository::new(pool.clone())),
            catalog: Arc::new(SqliteCatalogRepository::new(pool)),
            connectors: deps.connectors,
            fs: deps.filesystem,
            clock: deps.clock,
        };

        let orchestrator = Arc::new(SyncOrchestrator::new(sync_deps.clone(), &config));
        let jobs = Arc::new(SyncJobService::new(
            sync_deps,
            Arc::clone(&deps.trigger),
            Arc::clone(&orchestrator),
        ));

        let restored = jobs.restore_schedules().await?;
        info!(
            restored,
            json_root = %config.json_root.display(),
            download_root = %config.download_root.display(),
            "Sync engine started"
        );

        Ok(Self {
            config: Arc::new(config),
            trigger: deps.trigger,
            orchestrator,
            jobs,
        })
    }

    /// Bootstrap with the desktop bridges.
    #[cfg(feature = "desktop-shims")]
    pub async fn start(config: EngineConfig) -> Result<Self> {
        let deps = CoreDependencies::desktop(&config);
        Self::bootstrap(config, deps).await
    }

    /// Job management surface.
    pub fn jobs(&self) -> Arc<SyncJobService> {
        Arc::clone(&self.jobs)
    }

    pub fn orchestrator(&self) -> Arc<SyncOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Cancel every recurring trigger. Runs already in progress finish.
    pub async fn shutdown(&self) {
        self.trigger.shutdown().await;
        info!("Sync engine stopped");
    }
}
