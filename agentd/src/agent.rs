//! Component construction and lifecycle.
//!
//! The agent builds the managers and registry, attaches the configured
//! sources to one filesystem watcher, and owns the notification server and
//! the OVSDB connection. Start order is managers → sources → servers; stop
//! reverses it. A periodic task reclaims erased ids.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use id_registry::IdGenerator;
use notif_server::{NotifServer, NotifServerConfig};
use ovsdb_client::OvsdbConnection;
use policy_model::endpoint_manager::EndpointManager;
use policy_model::extra_config::ExtraConfigManager;
use policy_model::learning_bridge::LearningBridgeManager;
use policy_model::registry::{PolicyRegistry, PolicyUpdateObserver};
use policy_model::service_manager::ServiceManager;
use policy_sources::{
    FsDropLogConfigSource, FsEndpointSource, FsExternalEndpointSource, FsServiceSource, FsWatcher,
    LocalInventory, ModelEndpointSource,
};

use crate::config::AgentConfig;
use crate::error::AgentResult;

/// Interval of the background id reclamation tick.
const ID_CLEANUP_TICK: Duration = Duration::from_secs(10);

/// The assembled agent.
pub struct Agent {
    registry: Arc<PolicyRegistry>,
    endpoint_manager: Arc<EndpointManager>,
    service_manager: Arc<ServiceManager>,
    learning_bridge_manager: Arc<LearningBridgeManager>,
    extra_config_manager: Arc<ExtraConfigManager>,
    inventory: Arc<LocalInventory>,
    id_generator: Arc<IdGenerator>,
    watcher: FsWatcher,
    notif_server: Option<Arc<NotifServer>>,
    ovsdb: Option<Arc<OvsdbConnection>>,
    ovsdb_socket: Option<std::path::PathBuf>,
    /// The inventory holds only weak observer references; keep the model
    /// sources alive here.
    _model_sources: Vec<Arc<ModelEndpointSource>>,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl Agent {
    pub fn new(config: &AgentConfig) -> Self {
        let registry = PolicyRegistry::new();
        let endpoint_manager = EndpointManager::new(registry.clone());
        let observer: Arc<dyn PolicyUpdateObserver> = endpoint_manager.clone();
        registry.register_observer(&observer);
        let service_manager = ServiceManager::new();
        let learning_bridge_manager = LearningBridgeManager::new();
        let extra_config_manager = ExtraConfigManager::new();
        let inventory = LocalInventory::new();

        let mut id_generator = match config.id_registry.cleanup_interval_secs {
            Some(secs) => IdGenerator::with_cleanup_interval(Duration::from_secs(secs)),
            None => IdGenerator::new(),
        };
        if let Some(dir) = &config.id_registry.directory {
            id_generator.set_persist_location(dir);
        }
        let id_generator = Arc::new(id_generator);

        let watcher = FsWatcher::new();
        for dir in &config.endpoint_sources.filesystem {
            let source = FsEndpointSource::new(endpoint_manager.clone());
            watcher.add_watch(dir, source);
            let ext_source = FsExternalEndpointSource::new(endpoint_manager.clone());
            watcher.add_watch(dir, ext_source);
        }
        for dir in &config.service_sources.filesystem {
            let source = FsServiceSource::new(service_manager.clone());
            watcher.add_watch(dir, source);
        }
        for dir in &config.drop_log_config_sources.filesystem {
            let source = FsDropLogConfigSource::new(extra_config_manager.clone());
            watcher.add_watch(dir, source);
        }

        let mut model_sources = Vec::new();
        for name in &config.endpoint_sources.model_local {
            info!(inventory = name.as_str(), "consuming local inventory");
            model_sources.push(ModelEndpointSource::new(
                endpoint_manager.clone(),
                inventory.clone(),
            ));
        }

        let notif_server = config
            .opflex
            .notif
            .as_ref()
            .filter(|notif| notif.enabled)
            .and_then(|notif| notif.socket_name.as_ref().map(|path| (notif, path)))
            .map(|(notif, path)| {
                NotifServer::new(NotifServerConfig {
                    socket_path: path.clone(),
                    socket_owner: notif.socket_owner.clone(),
                    socket_group: notif.socket_group.clone(),
                    socket_permissions: notif.socket_permissions.clone(),
                })
            });

        let ovsdb_socket = config.ovsdb.socket.clone();
        let ovsdb = ovsdb_socket
            .is_some()
            .then(|| Arc::new(OvsdbConnection::new()));

        Self {
            registry,
            endpoint_manager,
            service_manager,
            learning_bridge_manager,
            extra_config_manager,
            inventory,
            id_generator,
            watcher,
            notif_server,
            ovsdb,
            ovsdb_socket,
            _model_sources: model_sources,
            cleanup_task: Mutex::new(None),
        }
    }

    /// Start sources, servers and background tasks.
    pub async fn start(&self) -> AgentResult<()> {
        self.watcher.start()?;
        if let Some(notif) = &self.notif_server {
            notif.start()?;
        }
        if let (Some(ovsdb), Some(socket)) = (&self.ovsdb, &self.ovsdb_socket) {
            // the switch may come up after us; callers reconnect on demand
            if let Err(err) = ovsdb.connect_unix(socket).await {
                warn!(socket = %socket.display(), %err, "OVSDB not reachable yet");
            }
        }

        let id_generator = self.id_generator.clone();
        let task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(ID_CLEANUP_TICK);
            loop {
                tick.tick().await;
                id_generator.cleanup();
            }
        });
        if let Ok(mut slot) = self.cleanup_task.lock() {
            if let Some(old) = slot.replace(task) {
                old.abort();
            }
        }
        info!("agent started");
        Ok(())
    }

    /// Stop everything started by [`start`](Agent::start).
    pub async fn stop(&self) {
        if let Ok(mut slot) = self.cleanup_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
        if let Some(ovsdb) = &self.ovsdb {
            ovsdb.disconnect().await;
        }
        if let Some(notif) = &self.notif_server {
            notif.stop();
        }
        self.watcher.stop();
        info!("agent stopped");
    }

    pub fn policy_registry(&self) -> &Arc<PolicyRegistry> {
        &self.registry
    }

    pub fn endpoint_manager(&self) -> &Arc<EndpointManager> {
        &self.endpoint_manager
    }

    pub fn service_manager(&self) -> &Arc<ServiceManager> {
        &self.service_manager
    }

    pub fn learning_bridge_manager(&self) -> &Arc<LearningBridgeManager> {
        &self.learning_bridge_manager
    }

    pub fn extra_config_manager(&self) -> &Arc<ExtraConfigManager> {
        &self.extra_config_manager
    }

    pub fn local_inventory(&self) -> &Arc<LocalInventory> {
        &self.inventory
    }

    pub fn id_generator(&self) -> &Arc<IdGenerator> {
        &self.id_generator
    }

    pub fn notif_server(&self) -> Option<&Arc<NotifServer>> {
        self.notif_server.as_ref()
    }

    pub fn ovsdb(&self) -> Option<&Arc<OvsdbConnection>> {
        self.ovsdb.as_ref()
    }
}
