//! The service model.

use mac_address::MacAddress;

use crate::attributes::Attributes;
use crate::uri::Uri;

/// How traffic reaching a service address is forwarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServiceMode {
    /// Answered locally on every node holding the service interface.
    #[default]
    LocalAnycast,
    /// Load-balanced across the mapping's next hops.
    Loadbalancer,
}

/// Kubernetes-style service exposure type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServiceType {
    #[default]
    ClusterIp,
    NodePort,
    LoadBalancer,
}

/// One virtual-IP/port to next-hop translation owned by a service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceMapping {
    pub service_ip: Option<String>,
    pub service_proto: Option<String>,
    pub service_port: Option<u16>,
    pub gateway_ip: Option<String>,
    pub next_hop_ips: Vec<String>,
    pub next_hop_port: Option<u16>,
    pub node_port: Option<u16>,
    pub conntrack_enabled: bool,
}

impl ServiceMapping {
    pub fn add_next_hop_ip(&mut self, ip: impl Into<String>) {
        let ip = ip.into();
        if !self.next_hop_ips.contains(&ip) {
            self.next_hop_ips.push(ip);
        }
    }
}

/// A service instance anchored on a local interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Service {
    pub uuid: String,
    pub service_mac: Option<MacAddress>,
    pub interface_name: Option<String>,
    pub iface_vlan: Option<u16>,
    pub iface_ip: Option<String>,
    pub domain: Option<Uri>,
    pub service_mode: ServiceMode,
    pub service_type: ServiceType,
    pub attributes: Attributes,
    pub service_mappings: Vec<ServiceMapping>,
}

impl Service {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            ..Self::default()
        }
    }

    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key, value);
    }

    pub fn add_service_mapping(&mut self, sm: ServiceMapping) {
        self.service_mappings.push(sm);
    }
}
