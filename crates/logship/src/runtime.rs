//! LogShip runtime
//!
//! Wires the whole pipeline from a [`Config`]:
//! - Opens the SQLite store and resolves the install id
//! - Builds the HTTP sender (or uses one supplied by the caller)
//! - Builds the channel group and the crashes module
//! - Registers modules with the lifecycle coordinator
//!
//! # Lifecycle
//!
//! `build` → `add_module`* → `start` → … → `shutdown`. Starting runs the
//! channel workers and then every module in initialization order, so the
//! crash handler is armed before any producer can emit. Shutdown flushes,
//! waits briefly for the channels to drain and then cancels the workers;
//! whatever is still in flight stays persisted for the next start.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use logship_cache::{DatabasePool, SqliteLogStore, SqliteSettings};
use logship_core::config::Config;
use logship_core::diagnostics::{self, LogLevel};
use logship_core::domain::{
    IngestionError, InitializationPriority, Log, PersistencePolicy, Priority, SessionId,
};
use logship_core::ports::{Enable, Enqueued, ISender, IModule};
use logship_crashes::CrashesModule;
use logship_pipeline::{ChannelGroup, MetricsRegistry};
use logship_transport::{HttpSender, HttpSenderConfig};

use crate::coordinator::ModuleCoordinator;
use crate::producer::ProducerModule;

/// How long `shutdown` waits for pending records to be sent
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`LogShip`]
pub struct LogShipBuilder {
    config: Config,
    sender: Option<Arc<dyn ISender>>,
    install_panic_hook: bool,
    cancel: Option<CancellationToken>,
}

impl LogShipBuilder {
    /// Uses `sender` instead of the HTTP sender built from `transport`
    pub fn sender(mut self, sender: Arc<dyn ISender>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Leaves the process panic hook alone
    pub fn without_panic_hook(mut self) -> Self {
        self.install_panic_hook = false;
        self
    }

    /// Ties the runtime to an outer shutdown token
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Opens the store and wires every component. Nothing is started.
    pub async fn build(self) -> Result<LogShip> {
        let config = self.config;

        let level = LogLevel::from_str(&config.logging.diagnostics_level)?;
        diagnostics::set_log_level(level);

        let db_path = &config.storage.database_path;
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let db_pool = DatabasePool::new(db_path)
            .await
            .context("Failed to open database")?;
        let store = Arc::new(
            SqliteLogStore::new(db_pool.pool().clone(), config.storage.capacity_bytes)
                .await
                .context("Failed to open log store")?,
        );
        info!(path = %db_path.display(), "Opened log store");

        let sender = match self.sender {
            Some(sender) => sender,
            None => {
                let install_id = resolve_install_id(&config, &db_pool).await?;
                let http = HttpSender::new(HttpSenderConfig::from_config(
                    &config.transport,
                    install_id,
                )?)?;
                info!(url = http.url(), "HTTP sender ready");
                Arc::new(http) as Arc<dyn ISender>
            }
        };

        let metrics = Arc::new(MetricsRegistry::new()?);
        let shutdown = self.cancel.unwrap_or_else(CancellationToken::new);
        let group = ChannelGroup::builder(store.clone(), sender)
            .config(&config)
            .metrics(Arc::clone(&metrics))
            .cancel_token(shutdown.clone())
            .build();

        let mut crashes = CrashesModule::new(group.clone(), &config.crashes);
        if !self.install_panic_hook {
            crashes = crashes.without_panic_hook();
        }
        let crashes = Arc::new(crashes);

        let coordinator = ModuleCoordinator::new();
        coordinator.register(crashes.clone())?;

        Ok(LogShip {
            config,
            session: SessionId::new(),
            db_pool,
            store,
            group,
            metrics,
            crashes,
            modules: DashMap::new(),
            coordinator,
            shutdown,
        })
    }
}

/// The configured install id, or the one stored next to the pending records
async fn resolve_install_id(config: &Config, pool: &DatabasePool) -> Result<Uuid> {
    if let Some(configured) = &config.transport.install_id {
        return Uuid::parse_str(configured).context("transport.install_id is not a UUID");
    }
    let install_id = SqliteSettings::new(pool.pool().clone())
        .install_id()
        .await
        .context("Failed to load install id")?;
    Ok(install_id)
}

// ============================================================================
// LogShip
// ============================================================================

/// A running telemetry pipeline
pub struct LogShip {
    config: Config,
    session: SessionId,
    db_pool: DatabasePool,
    store: Arc<SqliteLogStore>,
    group: Arc<ChannelGroup>,
    metrics: Arc<MetricsRegistry>,
    crashes: Arc<CrashesModule>,
    /// Strong references to producer modules; the coordinator only holds weak ones
    modules: DashMap<String, Arc<ProducerModule>>,
    coordinator: ModuleCoordinator,
    shutdown: CancellationToken,
}

impl LogShip {
    pub fn builder(config: Config) -> LogShipBuilder {
        LogShipBuilder {
            config,
            sender: None,
            install_panic_hook: true,
            cancel: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Session id stamped on every record submitted in this process
    pub fn session_id(&self) -> SessionId {
        self.session
    }

    pub fn store(&self) -> &Arc<SqliteLogStore> {
        &self.store
    }

    pub fn group(&self) -> &Arc<ChannelGroup> {
        &self.group
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn crashes(&self) -> &Arc<CrashesModule> {
        &self.crashes
    }

    pub fn coordinator(&self) -> &ModuleCoordinator {
        &self.coordinator
    }

    /// Registers a producer module. Must happen before `start`.
    pub fn add_module(
        &self,
        name: &str,
        priority: InitializationPriority,
    ) -> Result<Arc<ProducerModule>> {
        if self.coordinator.is_started() {
            anyhow::bail!("cannot add module '{name}' after start");
        }
        let module = Arc::new(
            ProducerModule::new(name, self.group.clone(), self.session)
                .with_initialization_priority(priority),
        );
        self.coordinator.register(module.clone())?;
        self.modules.insert(name.to_string(), Arc::clone(&module));
        Ok(module)
    }

    pub fn module(&self, name: &str) -> Option<Arc<ProducerModule>> {
        self.modules.get(name).map(|m| Arc::clone(m.value()))
    }

    /// Starts the channel workers, then every module in initialization order
    pub async fn start(&self) -> Result<()> {
        self.coordinator.validate()?;
        self.group
            .start()
            .await
            .context("Failed to start channels")?;
        let started = self.coordinator.start_all().await?;
        info!(session = %self.session, modules = ?started, "LogShip started");
        Ok(())
    }

    /// Submits `log` on behalf of `module`
    pub async fn submit(
        &self,
        module: &str,
        log: Log,
        priority: Priority,
        policy: PersistencePolicy,
    ) -> Result<Enqueued, IngestionError> {
        let producer = self.module(module).ok_or_else(|| {
            IngestionError::Configuration(format!("unknown module '{module}'"))
        })?;
        producer.track(log, priority, policy).await
    }

    /// Enables or disables the whole pipeline. Disabling visits the modules
    /// first and the channels last; enabling goes the other way round.
    pub async fn set_enabled(&self, enabled: bool, delete_data: bool) -> Result<()> {
        if enabled {
            self.group.set_enabled(true, false).await?;
            self.coordinator.set_enabled(true, false).await?;
        } else {
            self.coordinator.set_enabled(false, delete_data).await?;
            self.group.set_enabled(false, delete_data).await?;
        }
        info!(enabled, delete_data, "LogShip switched");
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.group.is_enabled()
    }

    /// Enables or disables one module by name
    pub async fn set_module_enabled(
        &self,
        module: &str,
        enabled: bool,
        delete_data: bool,
    ) -> Result<()> {
        let target = self
            .coordinator
            .modules()
            .into_iter()
            .find(|m| m.name() == module)
            .with_context(|| format!("unknown module '{module}'"))?;
        target.set_enabled(enabled, delete_data).await
    }

    /// Sends everything pending regardless of batch thresholds
    pub fn flush(&self) {
        self.group.flush_all();
    }

    /// Flushes, waits up to `drain_timeout` for the channels to empty, then
    /// stops the workers and closes the database
    pub async fn shutdown(&self, drain_timeout: Duration) {
        self.group.flush_all();
        if !self.group.drain(drain_timeout).await {
            warn!(timeout_ms = drain_timeout.as_millis() as u64, "Pending records left for next start");
        }
        self.shutdown.cancel();
        self.group.shutdown().await;
        self.db_pool.close().await;
        info!("LogShip shut down");
    }
}
