//! Local inventory endpoint source.
//!
//! Besides the file-based sources, endpoints can be declared through a
//! replicated inventory of managed objects keyed by URI. The
//! [`ModelEndpointSource`] observes a [`LocalInventory`] and translates its
//! typed records into the same model the filesystem sources feed; the
//! endpoint manager cannot tell the two apart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use mac_address::MacAddress;
use tracing::{error, info};

use policy_model::attributes::Attributes;
use policy_model::endpoint::{DhcpV4Config, DhcpV6Config, Endpoint, IpAddressMapping};
use policy_model::endpoint_manager::EndpointManager;
use policy_model::uri::Uri;

/// Role of one IP record on an inventory endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InventoryIpKind {
    #[default]
    Default,
    Virtual,
    AnycastReturn,
}

/// One IP record.
#[derive(Debug, Clone, Default)]
pub struct InventoryIp {
    pub kind: InventoryIpKind,
    pub ip: String,
    /// Virtual IPs may carry their own MAC; defaults to the endpoint's.
    pub mac: Option<MacAddress>,
}

/// Role of one interface record on an inventory endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InventoryIfaceKind {
    #[default]
    Integration,
    Access,
    AccessUplink,
}

/// One interface record.
#[derive(Debug, Clone, Default)]
pub struct InventoryIface {
    pub kind: InventoryIfaceKind,
    pub name: String,
}

/// A replicated inventory endpoint record.
#[derive(Debug, Clone, Default)]
pub struct InventoryEp {
    /// Records without a uuid are incomplete and treated as removals.
    pub uuid: Option<String>,
    pub mac: Option<MacAddress>,
    pub egroup: Option<Uri>,
    pub eg_mapping_alias: Option<String>,
    pub access_vlan: Option<u16>,
    pub promiscuous: bool,
    pub discovery_proxy: bool,
    pub ips: Vec<InventoryIp>,
    pub interfaces: Vec<InventoryIface>,
    pub security_groups: Vec<Uri>,
    pub attributes: Attributes,
    pub dhcp_v4: Option<DhcpV4Config>,
    pub dhcp_v6: Option<DhcpV6Config>,
    pub ip_mappings: Vec<IpAddressMapping>,
}

/// Observer of inventory record changes.
pub trait InventoryObserver: Send + Sync {
    fn inventory_updated(&self, uri: &str);
}

/// URI-keyed store of inventory endpoint records.
#[derive(Default)]
pub struct LocalInventory {
    records: Mutex<HashMap<String, InventoryEp>>,
    observers: Mutex<Vec<Weak<dyn InventoryObserver>>>,
}

impl LocalInventory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register_observer(&self, observer: &Arc<dyn InventoryObserver>) {
        if let Ok(mut observers) = self.observers.lock() {
            observers.push(Arc::downgrade(observer));
        }
    }

    fn notify(&self, uri: &str) {
        let observers: Vec<Arc<dyn InventoryObserver>> = match self.observers.lock() {
            Ok(mut observers) => {
                observers.retain(|w| w.strong_count() > 0);
                observers.iter().filter_map(Weak::upgrade).collect()
            }
            Err(_) => return,
        };
        for observer in observers {
            observer.inventory_updated(uri);
        }
    }

    pub fn update(&self, uri: impl Into<String>, record: InventoryEp) {
        let uri = uri.into();
        if let Ok(mut records) = self.records.lock() {
            records.insert(uri.clone(), record);
        }
        self.notify(&uri);
    }

    pub fn remove(&self, uri: &str) {
        if let Ok(mut records) = self.records.lock() {
            records.remove(uri);
        }
        self.notify(uri);
    }

    pub fn get(&self, uri: &str) -> Option<InventoryEp> {
        self.records.lock().ok()?.get(uri).cloned()
    }
}

/// Feeds inventory records into the endpoint manager.
pub struct ModelEndpointSource {
    manager: Arc<EndpointManager>,
    inventory: Arc<LocalInventory>,
    known: Mutex<HashMap<String, String>>,
}

impl ModelEndpointSource {
    pub fn new(
        manager: Arc<EndpointManager>,
        inventory: Arc<LocalInventory>,
    ) -> Arc<Self> {
        info!("watching local inventory for endpoint data");
        let source = Arc::new(Self {
            manager,
            inventory: inventory.clone(),
            known: Mutex::new(HashMap::new()),
        });
        let observer: Arc<dyn InventoryObserver> = source.clone();
        inventory.register_observer(&observer);
        source
    }

    fn remove_known(&self, uri: &str) {
        let removed = self
            .known
            .lock()
            .ok()
            .and_then(|mut known| known.remove(uri));
        if let Some(uuid) = removed {
            info!(uuid = uuid.as_str(), uri, "removed inventory endpoint");
            self.manager.remove_endpoint(&uuid);
        }
    }
}

fn translate(record: InventoryEp, uuid: String) -> Endpoint {
    let mut ep = Endpoint::new(uuid);
    ep.mac = record.mac;
    ep.egroup = record.egroup;
    ep.eg_mapping_alias = record.eg_mapping_alias;
    ep.access_iface_vlan = record.access_vlan;
    ep.promiscuous_mode = record.promiscuous;
    ep.discovery_proxy_mode = record.discovery_proxy;
    ep.attributes = record.attributes;
    ep.dhcp_v4 = record.dhcp_v4;
    ep.dhcp_v6 = record.dhcp_v6;

    for ip in record.ips {
        match ip.kind {
            InventoryIpKind::Default => ep.add_ip(ip.ip),
            InventoryIpKind::AnycastReturn => ep.add_anycast_return_ip(ip.ip),
            InventoryIpKind::Virtual => match ip.mac.or(ep.mac) {
                Some(mac) => ep.add_virtual_ip(mac, ip.ip),
                None => error!(ip = ip.ip.as_str(), "virtual IP without a MAC, skipping"),
            },
        }
    }
    for iface in record.interfaces {
        match iface.kind {
            InventoryIfaceKind::Integration => ep.interface_name = Some(iface.name),
            InventoryIfaceKind::Access => ep.access_interface = Some(iface.name),
            InventoryIfaceKind::AccessUplink => ep.access_uplink_interface = Some(iface.name),
        }
    }
    for group in record.security_groups {
        ep.add_security_group(group);
    }
    for ipm in record.ip_mappings {
        ep.add_ip_address_mapping(ipm);
    }
    ep
}

impl InventoryObserver for ModelEndpointSource {
    fn inventory_updated(&self, uri: &str) {
        let record = self.inventory.get(uri);
        let Some(record) = record else {
            self.remove_known(uri);
            return;
        };
        let Some(uuid) = record.uuid.clone() else {
            self.remove_known(uri);
            return;
        };

        let stale = {
            let Ok(mut known) = self.known.lock() else {
                return;
            };
            let stale = known.get(uri).filter(|old| **old != uuid).cloned();
            known.insert(uri.to_string(), uuid.clone());
            stale
        };
        if let Some(stale) = stale {
            self.manager.remove_endpoint(&stale);
        }
        self.manager.update_endpoint(translate(record, uuid.clone()));
        info!(uuid = uuid.as_str(), uri, "updated inventory endpoint");
    }
}
