//! Filesystem drop-log configuration source.
//!
//! `.droplogcfg` files switch packet drop logging on and off; the first
//! such file owns the configuration until it is deleted. `.dropflowcfg`
//! files each declare one drop-flow filter spec. Both live in the same
//! watched directory.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use mac_address::MacAddress;
use serde::Deserialize;
use tracing::{error, info};

use policy_model::extra_config::{
    DropLogMode, ExtraConfigManager, PacketDropFlowConfig, PacketDropLogConfig,
};

use crate::SourceError;
use crate::fs_watcher::DirectoryHandler;

fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(suffix) && !n.starts_with('.'))
}

fn parse_ip(
    field: &'static str,
    value: Option<String>,
    require_v4: bool,
) -> Result<Option<IpAddr>, SourceError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let ip: IpAddr = value.parse().map_err(|_| SourceError::Validation {
        field,
        reason: format!("bad IP address {value:?}"),
    })?;
    if require_v4 && !ip.is_ipv4() {
        return Err(SourceError::Validation {
            field,
            reason: format!("{ip} should be an IPv4 address"),
        });
    }
    Ok(Some(ip))
}

fn parse_mac(field: &'static str, value: Option<String>) -> Result<Option<MacAddress>, SourceError> {
    let Some(value) = value else {
        return Ok(None);
    };
    value
        .parse()
        .map(Some)
        .map_err(|_| SourceError::Validation {
            field,
            reason: format!("bad MAC address {value:?}"),
        })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DropLogFile {
    #[serde(default)]
    drop_log_enable: bool,
    drop_log_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DropFlowFile {
    uuid: String,
    outer_src_ip_address: Option<String>,
    outer_dst_ip_address: Option<String>,
    inner_src_ip_address: Option<String>,
    inner_dst_ip_address: Option<String>,
    inner_src_mac: Option<String>,
    inner_dst_mac: Option<String>,
    inner_eth_type: Option<u16>,
    inner_ip_proto: Option<u8>,
    inner_src_port: Option<u16>,
    inner_dst_port: Option<u16>,
    tunnel_id: Option<u32>,
}

impl DropFlowFile {
    fn into_config(self) -> Result<PacketDropFlowConfig, SourceError> {
        Ok(PacketDropFlowConfig {
            uuid: self.uuid,
            outer_src: parse_ip("outer-src-ip-address", self.outer_src_ip_address, true)?,
            outer_dst: parse_ip("outer-dst-ip-address", self.outer_dst_ip_address, true)?,
            inner_src: parse_ip("inner-src-ip-address", self.inner_src_ip_address, false)?,
            inner_dst: parse_ip("inner-dst-ip-address", self.inner_dst_ip_address, false)?,
            inner_src_mac: parse_mac("inner-src-mac", self.inner_src_mac)?,
            inner_dst_mac: parse_mac("inner-dst-mac", self.inner_dst_mac)?,
            eth_type: self.inner_eth_type,
            ip_proto: self.inner_ip_proto,
            src_port: self.inner_src_port,
            dst_port: self.inner_dst_port,
            tunnel_id: self.tunnel_id,
        })
    }
}

/// Watches a directory for drop-log and drop-flow configuration.
pub struct FsDropLogConfigSource {
    manager: Arc<ExtraConfigManager>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    /// Path of the file currently owning the drop-log config.
    drop_log_path: Option<PathBuf>,
    /// Drop-flow file path → uuid it declared.
    drop_flows: HashMap<PathBuf, String>,
}

impl FsDropLogConfigSource {
    pub fn new(manager: Arc<ExtraConfigManager>) -> Arc<Self> {
        Arc::new(Self {
            manager,
            state: Mutex::new(State::default()),
        })
    }

    fn drop_log_updated(&self, path: &Path) -> Result<(), SourceError> {
        {
            let Ok(mut state) = self.state.lock() else {
                return Ok(());
            };
            // another file already owns the configuration
            if state
                .drop_log_path
                .as_ref()
                .is_some_and(|owner| owner != path)
            {
                return Ok(());
            }
            state.drop_log_path = Some(path.to_path_buf());
        }

        let data = std::fs::read(path)?;
        let file: DropLogFile = serde_json::from_slice(&data)?;
        let mode = match file.drop_log_mode.as_deref() {
            None | Some("unfiltered") => DropLogMode::Unfiltered,
            Some("flow-based") => DropLogMode::FlowBased,
            Some(other) => {
                return Err(SourceError::Validation {
                    field: "drop-log-mode",
                    reason: format!("unknown mode {other:?}"),
                });
            }
        };
        self.manager.update_drop_log_config(PacketDropLogConfig {
            enabled: file.drop_log_enable,
            mode,
            file_path: Some(path.to_path_buf()),
        });
        info!(path = %path.display(), "updated packet drop log config");
        Ok(())
    }

    fn drop_flow_updated(&self, path: &Path) -> Result<(), SourceError> {
        let data = std::fs::read(path)?;
        let file: DropFlowFile = serde_json::from_slice(&data)?;
        let config = file.into_config()?;
        if let Ok(mut state) = self.state.lock() {
            state
                .drop_flows
                .insert(path.to_path_buf(), config.uuid.clone());
        }
        info!(path = %path.display(), uuid = config.uuid.as_str(), "updated packet drop flow config");
        self.manager.update_drop_flow_config(config);
        Ok(())
    }
}

impl DirectoryHandler for FsDropLogConfigSource {
    fn updated(&self, path: &Path) {
        let result = if has_suffix(path, ".droplogcfg") {
            self.drop_log_updated(path)
        } else if has_suffix(path, ".dropflowcfg") {
            self.drop_flow_updated(path)
        } else {
            return;
        };
        if let Err(err) = result {
            error!(path = %path.display(), %err, "could not load packet drop config");
        }
    }

    fn deleted(&self, path: &Path) {
        if has_suffix(path, ".droplogcfg") {
            let owned = {
                let Ok(mut state) = self.state.lock() else {
                    return;
                };
                if state.drop_log_path.as_deref() != Some(path) {
                    return;
                }
                state.drop_log_path = None;
                true
            };
            if owned {
                self.manager
                    .update_drop_log_config(PacketDropLogConfig::default());
                info!(path = %path.display(), "removed packet drop log config");
            }
        } else if has_suffix(path, ".dropflowcfg") {
            let removed = self
                .state
                .lock()
                .ok()
                .and_then(|mut state| state.drop_flows.remove(path));
            if let Some(uuid) = removed {
                info!(path = %path.display(), uuid = uuid.as_str(), "removed packet drop flow config");
                self.manager.remove_drop_flow_config(&uuid);
            }
        }
    }
}
