//! Packet drop-log configuration.
//!
//! Drop logging is switched and filtered through operator-dropped config
//! files; the manager holds the current state and fans updates out to the
//! dataplane listeners.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use mac_address::MacAddress;

/// Drop-log capture mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DropLogMode {
    /// Log every dropped packet.
    #[default]
    Unfiltered,
    /// Log only packets matching configured drop-flow specs.
    FlowBased,
}

/// Global drop-log switch and mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketDropLogConfig {
    pub enabled: bool,
    pub mode: DropLogMode,
    /// Path of the file owning the current config, empty when unset.
    pub file_path: Option<PathBuf>,
}

/// One drop-flow match specification. Outer addresses are the tunnel
/// header and must be IPv4; inner addresses may be either family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketDropFlowConfig {
    pub uuid: String,
    pub outer_src: Option<IpAddr>,
    pub outer_dst: Option<IpAddr>,
    pub inner_src: Option<IpAddr>,
    pub inner_dst: Option<IpAddr>,
    pub inner_src_mac: Option<MacAddress>,
    pub inner_dst_mac: Option<MacAddress>,
    pub eth_type: Option<u16>,
    pub ip_proto: Option<u8>,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub tunnel_id: Option<u32>,
}

/// Notified when drop-log or drop-flow configuration changes.
pub trait ExtraConfigListener: Send + Sync {
    fn drop_log_config_updated(&self, config: &PacketDropLogConfig);
    fn drop_flow_config_updated(&self, uuid: &str);
}

#[derive(Default)]
struct ManagerState {
    drop_log: PacketDropLogConfig,
    drop_flows: HashMap<String, PacketDropFlowConfig>,
}

/// Holds drop-log state outside the main endpoint model.
#[derive(Default)]
pub struct ExtraConfigManager {
    state: Mutex<ManagerState>,
    listeners: Mutex<Vec<Arc<dyn ExtraConfigListener>>>,
}

impl ExtraConfigManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register_listener(&self, listener: Arc<dyn ExtraConfigListener>) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(listener);
        }
    }

    pub fn update_drop_log_config(&self, config: PacketDropLogConfig) {
        let snapshot = {
            match self.state.lock() {
                Ok(mut state) => {
                    state.drop_log = config;
                    state.drop_log.clone()
                }
                Err(_) => return,
            }
        };
        let listeners = match self.listeners.lock() {
            Ok(listeners) => listeners.clone(),
            Err(_) => return,
        };
        for listener in listeners {
            listener.drop_log_config_updated(&snapshot);
        }
    }

    pub fn update_drop_flow_config(&self, config: PacketDropFlowConfig) {
        let uuid = config.uuid.clone();
        if let Ok(mut state) = self.state.lock() {
            state.drop_flows.insert(uuid.clone(), config);
        }
        self.notify_drop_flow(&uuid);
    }

    pub fn remove_drop_flow_config(&self, uuid: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.drop_flows.remove(uuid);
        }
        self.notify_drop_flow(uuid);
    }

    fn notify_drop_flow(&self, uuid: &str) {
        let listeners = match self.listeners.lock() {
            Ok(listeners) => listeners.clone(),
            Err(_) => return,
        };
        for listener in listeners {
            listener.drop_flow_config_updated(uuid);
        }
    }

    pub fn drop_log_config(&self) -> PacketDropLogConfig {
        self.state
            .lock()
            .map(|s| s.drop_log.clone())
            .unwrap_or_default()
    }

    pub fn drop_flow_config(&self, uuid: &str) -> Option<PacketDropFlowConfig> {
        self.state.lock().ok()?.drop_flows.get(uuid).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_log_config_round_trip() {
        let manager = ExtraConfigManager::new();
        manager.update_drop_log_config(PacketDropLogConfig {
            enabled: true,
            mode: DropLogMode::FlowBased,
            file_path: Some(PathBuf::from("/var/lib/agent/current.droplogcfg")),
        });
        let config = manager.drop_log_config();
        assert!(config.enabled);
        assert_eq!(config.mode, DropLogMode::FlowBased);
    }

    #[test]
    fn drop_flow_update_and_remove() {
        let manager = ExtraConfigManager::new();
        let mut flow = PacketDropFlowConfig {
            uuid: "f1".into(),
            ..PacketDropFlowConfig::default()
        };
        flow.outer_src = Some("1.2.3.4".parse().unwrap());
        manager.update_drop_flow_config(flow);
        assert!(manager.drop_flow_config("f1").is_some());
        manager.remove_drop_flow_config("f1");
        assert!(manager.drop_flow_config("f1").is_none());
    }
}
