//! Filesystem service source (`.as` / `.service` files).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tracing::{error, info};

use policy_model::attributes::Attributes;
use policy_model::service::{Service, ServiceMapping, ServiceMode, ServiceType};
use policy_model::service_manager::ServiceManager;
use policy_model::uri::{self, Uri};

use crate::SourceError;
use crate::fs_watcher::DirectoryHandler;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ServiceMappingEntry {
    service_ip: Option<String>,
    service_proto: Option<String>,
    service_port: Option<u16>,
    gateway_ip: Option<String>,
    next_hop_ip: Option<String>,
    #[serde(default)]
    next_hop_ips: Vec<String>,
    next_hop_port: Option<u16>,
    node_port: Option<u16>,
    conntrack_enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ServiceFile {
    uuid: String,
    service_mac: Option<String>,
    interface_name: Option<String>,
    interface_vlan: Option<u16>,
    interface_ip: Option<String>,
    service_mode: Option<String>,
    service_type: Option<String>,
    domain: Option<String>,
    domain_name: Option<String>,
    domain_policy_space: Option<String>,
    attributes: Option<Attributes>,
    #[serde(default)]
    service_mapping: Vec<ServiceMappingEntry>,
}

impl ServiceFile {
    fn into_service(self) -> Result<Service, SourceError> {
        let mut service = Service::new(self.uuid);

        service.service_mode = match self.service_mode.as_deref() {
            Some("loadbalancer") => ServiceMode::Loadbalancer,
            _ => ServiceMode::LocalAnycast,
        };
        service.service_type = match self.service_type.as_deref() {
            Some("nodePort") => ServiceType::NodePort,
            Some("loadBalancer") => ServiceType::LoadBalancer,
            _ => ServiceType::ClusterIp,
        };

        if let Some(mac) = &self.service_mac {
            service.service_mac = Some(mac.parse().map_err(|_| SourceError::Validation {
                field: "service-mac",
                reason: format!("bad MAC address {mac:?}"),
            })?);
        }
        service.interface_name = self.interface_name;
        service.iface_vlan = self.interface_vlan;
        service.iface_ip = self.interface_ip;

        service.domain = match (self.domain, self.domain_name, self.domain_policy_space) {
            (Some(domain), _, _) => Some(Uri::from(domain)),
            (None, Some(name), Some(space)) => Some(uri::routing_domain_uri(&space, &name)),
            _ => None,
        };

        match self.attributes {
            Some(attributes) => service.attributes = attributes,
            None => {
                // Keep stats attribution uniform across orchestrators: when
                // no attribute map is declared, name the service after its
                // interface.
                if let Some(iface) = &service.interface_name {
                    service.add_attribute("name", iface.clone());
                }
            }
        }

        // An external load-balancer service is declared as a second file
        // whose uuid carries an `-external` suffix; tag it so its metrics
        // stay distinct. The internal twin reverts to a cluster service.
        if service.service_type == ServiceType::LoadBalancer {
            if service.uuid.len() > "-external".len() && service.uuid.ends_with("-external") {
                service.add_attribute("scope", "ext");
            } else {
                service.service_type = ServiceType::ClusterIp;
                service.add_attribute("scope", "cluster");
            }
        } else {
            service.add_attribute("scope", "cluster");
        }

        for entry in self.service_mapping {
            let mut sm = ServiceMapping {
                service_ip: entry.service_ip,
                service_proto: entry.service_proto,
                service_port: entry.service_port,
                gateway_ip: entry.gateway_ip,
                next_hop_ips: Vec::new(),
                next_hop_port: entry.next_hop_port,
                node_port: entry.node_port,
                conntrack_enabled: entry.conntrack_enabled.unwrap_or(false),
            };
            if let Some(ip) = entry.next_hop_ip {
                sm.add_next_hop_ip(ip);
            }
            for ip in entry.next_hop_ips {
                sm.add_next_hop_ip(ip);
            }
            service.add_service_mapping(sm);
        }

        Ok(service)
    }
}

fn is_service_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| (n.ends_with(".as") || n.ends_with(".service")) && !n.starts_with('.'))
}

/// Watches a directory for service declarations.
pub struct FsServiceSource {
    manager: Arc<ServiceManager>,
    known: Mutex<HashMap<PathBuf, String>>,
}

impl FsServiceSource {
    pub fn new(manager: Arc<ServiceManager>) -> Arc<Self> {
        Arc::new(Self {
            manager,
            known: Mutex::new(HashMap::new()),
        })
    }

    fn load(path: &Path) -> Result<Service, SourceError> {
        let data = std::fs::read(path)?;
        let file: ServiceFile = serde_json::from_slice(&data)?;
        file.into_service()
    }
}

impl DirectoryHandler for FsServiceSource {
    fn updated(&self, path: &Path) {
        if !is_service_file(path) {
            return;
        }
        let service = match Self::load(path) {
            Ok(service) => service,
            Err(err) => {
                error!(path = %path.display(), %err, "could not load service");
                return;
            }
        };
        let uuid = service.uuid.clone();
        let stale = {
            let Ok(mut known) = self.known.lock() else {
                return;
            };
            let stale = known.get(path).filter(|old| **old != uuid).cloned();
            known.insert(path.to_path_buf(), uuid.clone());
            stale
        };
        if let Some(stale) = stale {
            self.manager.remove_service(&stale);
        }
        self.manager.update_service(service);
        info!(uuid = uuid.as_str(), path = %path.display(), "updated service");
    }

    fn deleted(&self, path: &Path) {
        let removed = self
            .known
            .lock()
            .ok()
            .and_then(|mut known| known.remove(path));
        if let Some(uuid) = removed {
            info!(uuid = uuid.as_str(), path = %path.display(), "removed service");
            self.manager.remove_service(&uuid);
        }
    }
}
