//! On-disk endpoint declaration formats and their conversion into the
//! model. Shared by the local (`.ep`) and external (`.extep`) sources.

use mac_address::MacAddress;
use serde::Deserialize;

use policy_model::attributes::Attributes;
use policy_model::endpoint::{
    DhcpV4Config, DhcpV6Config, Endpoint, IpAddressMapping, StaticRoute,
};
use policy_model::uri::{self, Uri};

use crate::SourceError;

fn parse_mac(field: &'static str, mac: &str) -> Result<MacAddress, SourceError> {
    mac.parse().map_err(|_| SourceError::Validation {
        field,
        reason: format!("bad MAC address {mac:?}"),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct VirtualIpEntry {
    mac: Option<String>,
    ip: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SecGroupEntry {
    policy_space: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct StaticRouteEntry {
    dest: Option<String>,
    #[serde(default = "default_prefix_len")]
    dest_prefix: u8,
    next_hop: Option<String>,
}

fn default_prefix_len() -> u8 {
    32
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Dhcp4Entry {
    ip: Option<String>,
    prefix_len: Option<u8>,
    server_ip: Option<String>,
    server_mac: Option<String>,
    #[serde(default)]
    routers: Vec<String>,
    #[serde(default)]
    dns_servers: Vec<String>,
    domain: Option<String>,
    #[serde(default)]
    static_routes: Vec<StaticRouteEntry>,
    interface_mtu: Option<u16>,
    lease_time: Option<u32>,
}

impl Dhcp4Entry {
    fn into_config(self) -> Result<DhcpV4Config, SourceError> {
        let server_mac = match self.server_mac {
            Some(mac) => Some(parse_mac("server-mac", &mac)?),
            None => None,
        };
        let static_routes = self
            .static_routes
            .into_iter()
            .filter_map(|route| match (route.dest, route.next_hop) {
                (Some(dest), Some(next_hop)) => Some(StaticRoute {
                    dest,
                    prefix_len: route.dest_prefix,
                    next_hop,
                }),
                _ => None,
            })
            .collect();
        Ok(DhcpV4Config {
            ip: self.ip,
            prefix_len: self.prefix_len,
            server_ip: self.server_ip,
            server_mac,
            routers: self.routers,
            dns_servers: self.dns_servers,
            domain: self.domain,
            static_routes,
            interface_mtu: self.interface_mtu,
            lease_time: self.lease_time,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Dhcp6Entry {
    #[serde(default)]
    dns_servers: Vec<String>,
    #[serde(default)]
    search_list: Vec<String>,
    t1: Option<u32>,
    t2: Option<u32>,
    preferred_lifetime: Option<u32>,
    valid_lifetime: Option<u32>,
}

impl Dhcp6Entry {
    fn into_config(self) -> DhcpV6Config {
        DhcpV6Config {
            dns_servers: self.dns_servers,
            search_list: self.search_list,
            t1: self.t1,
            t2: self.t2,
            preferred_lifetime: self.preferred_lifetime,
            valid_lifetime: self.valid_lifetime,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct IpMappingEntry {
    uuid: Option<String>,
    mapped_ip: Option<String>,
    floating_ip: Option<String>,
    endpoint_group: Option<String>,
    policy_space_name: Option<String>,
    endpoint_group_name: Option<String>,
    next_hop_if: Option<String>,
    next_hop_mac: Option<String>,
}

/// A local endpoint declaration (`.ep`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EpFile {
    uuid: String,
    mac: Option<String>,
    #[serde(default)]
    ip: Vec<String>,
    #[serde(default)]
    anycast_return_ip: Vec<String>,
    #[serde(default)]
    virtual_ip: Vec<VirtualIpEntry>,
    endpoint_group: Option<String>,
    eg_policy_space: Option<String>,
    policy_space_name: Option<String>,
    endpoint_group_name: Option<String>,
    eg_mapping_alias: Option<String>,
    #[serde(default)]
    security_group: Vec<SecGroupEntry>,
    interface_name: Option<String>,
    access_interface: Option<String>,
    access_interface_vlan: Option<u16>,
    access_uplink_interface: Option<String>,
    promiscuous_mode: Option<bool>,
    discovery_proxy_mode: Option<bool>,
    nat_mode: Option<bool>,
    attributes: Option<Attributes>,
    dhcp4: Option<Dhcp4Entry>,
    dhcp6: Option<Dhcp6Entry>,
    #[serde(default)]
    ip_address_mapping: Vec<IpMappingEntry>,
    snat_ip: Option<String>,
}

impl EpFile {
    pub fn into_endpoint(self) -> Result<Endpoint, SourceError> {
        let mut ep = Endpoint::new(self.uuid);
        if let Some(mac) = &self.mac {
            ep.mac = Some(parse_mac("mac", mac)?);
        }
        for ip in self.ip {
            ep.add_ip(ip);
        }
        for ip in self.anycast_return_ip {
            ep.add_anycast_return_ip(ip);
        }
        for vip in self.virtual_ip {
            let Some(ip) = vip.ip else {
                continue;
            };
            let mac = match (&vip.mac, ep.mac) {
                (Some(mac), _) => parse_mac("virtual-ip mac", mac)?,
                (None, Some(mac)) => mac,
                (None, None) => continue,
            };
            ep.add_virtual_ip(mac, ip);
        }

        if let Some(group) = self.endpoint_group {
            ep.egroup = Some(Uri::from(group));
        } else {
            let space = self.eg_policy_space.or(self.policy_space_name);
            match (self.endpoint_group_name, space) {
                (Some(name), Some(space)) => ep.egroup = Some(uri::epg_uri(&space, &name)),
                _ => ep.eg_mapping_alias = self.eg_mapping_alias,
            }
        }

        for group in self.security_group {
            if let (Some(space), Some(name)) = (group.policy_space, group.name) {
                ep.add_security_group(uri::sec_group_uri(&space, &name));
            }
        }

        ep.interface_name = self.interface_name;
        ep.access_interface = self.access_interface;
        ep.access_iface_vlan = self.access_interface_vlan;
        ep.access_uplink_interface = self.access_uplink_interface;
        ep.promiscuous_mode = self.promiscuous_mode.unwrap_or(false);
        ep.discovery_proxy_mode = self.discovery_proxy_mode.unwrap_or(false);
        ep.nat_mode = self.nat_mode.unwrap_or(false);

        if let Some(attributes) = self.attributes {
            // an orchestrator-assigned snat vm-name implies NAT mode
            if attributes
                .get("vm-name")
                .is_some_and(|name| name.starts_with("snat|"))
            {
                ep.nat_mode = true;
            }
            ep.attributes = attributes;
        }

        if let Some(dhcp4) = self.dhcp4 {
            ep.dhcp_v4 = Some(dhcp4.into_config()?);
        }
        if let Some(dhcp6) = self.dhcp6 {
            ep.dhcp_v6 = Some(dhcp6.into_config());
        }

        for entry in self.ip_address_mapping {
            let Some(uuid) = entry.uuid else {
                continue;
            };
            let mut ipm = IpAddressMapping::new(uuid);
            ipm.mapped_ip = entry.mapped_ip;
            ipm.floating_ip = entry.floating_ip;
            ipm.egroup = match (entry.endpoint_group, entry.endpoint_group_name) {
                (Some(group), _) => Some(Uri::from(group)),
                (None, Some(name)) => entry
                    .policy_space_name
                    .map(|space| uri::epg_uri(&space, &name)),
                _ => None,
            };
            ipm.next_hop_if = entry.next_hop_if;
            if let Some(mac) = &entry.next_hop_mac {
                ipm.next_hop_mac = Some(parse_mac("next-hop-mac", mac)?);
            }
            ep.add_ip_address_mapping(ipm);
        }

        ep.snat_ip = self.snat_ip;
        Ok(ep)
    }
}

/// An external endpoint declaration (`.extep`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExtEpFile {
    uuid: String,
    mac: Option<String>,
    #[serde(default)]
    ip: Vec<String>,
    policy_space_name: Option<String>,
    path_attachment: Option<String>,
    node_attachment: Option<String>,
    #[serde(default)]
    security_group: Vec<SecGroupEntry>,
    interface_name: Option<String>,
    access_interface: Option<String>,
    access_interface_vlan: Option<u16>,
    access_uplink_interface: Option<String>,
    promiscuous_mode: Option<bool>,
    discovery_proxy_mode: Option<bool>,
    attributes: Option<Attributes>,
    dhcp4: Option<Dhcp4Entry>,
    dhcp6: Option<Dhcp6Entry>,
}

impl ExtEpFile {
    pub fn into_endpoint(self) -> Result<Endpoint, SourceError> {
        let mut ep = Endpoint::new(self.uuid);
        if let Some(mac) = &self.mac {
            ep.mac = Some(parse_mac("mac", mac)?);
        }
        for ip in self.ip {
            ep.add_ip(ip);
        }

        if let (Some(space), Some(path)) = (&self.policy_space_name, &self.path_attachment) {
            let iface = uri::ext_interface_uri(space, path);
            ep.egroup = Some(iface.clone());
            ep.ext_interface = Some(iface);
        }
        if let (Some(space), Some(node)) = (&self.policy_space_name, &self.node_attachment) {
            ep.ext_node = Some(uri::ext_node_uri(space, node));
        }

        for group in self.security_group {
            if let (Some(space), Some(name)) = (group.policy_space, group.name) {
                ep.add_security_group(uri::sec_group_uri(&space, &name));
            }
        }

        ep.interface_name = self.interface_name;
        ep.access_interface = self.access_interface;
        ep.access_iface_vlan = self.access_interface_vlan;
        ep.access_uplink_interface = self.access_uplink_interface;
        ep.promiscuous_mode = self.promiscuous_mode.unwrap_or(false);
        ep.discovery_proxy_mode = self.discovery_proxy_mode.unwrap_or(false);
        if let Some(attributes) = self.attributes {
            ep.attributes = attributes;
        }
        if let Some(dhcp4) = self.dhcp4 {
            ep.dhcp_v4 = Some(dhcp4.into_config()?);
        }
        if let Some(dhcp6) = self.dhcp6 {
            ep.dhcp_v6 = Some(dhcp6.into_config());
        }
        Ok(ep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_endpoint_parses() {
        let file: EpFile = serde_json::from_str(
            r#"{
                "uuid": "83f18f0b-80f7-46e2-b06c-4d9487b0c754",
                "mac": "10:ff:00:a3:01:00",
                "ip": ["10.0.0.1", "10.0.0.2"],
                "virtual-ip": [{"ip": "10.0.0.50"}, {"mac": "10:ff:00:a3:01:02", "ip": "10.0.0.51"}],
                "interface-name": "veth0",
                "endpoint-group": "/PolicyUniverse/PolicySpace/test/GbpEpGroup/epg/",
                "security-group": [{"policy-space": "test", "name": "sg1"}],
                "attributes": {"attr1": "value1"},
                "dhcp4": {
                    "ip": "10.0.0.1",
                    "routers": ["10.0.0.254"],
                    "static-routes": [
                        {"dest": "10.20.0.0", "dest-prefix": 16, "next-hop": "10.0.0.253"},
                        {"dest": "10.30.44.10", "next-hop": "10.0.0.253"},
                        {"next-hop": "10.0.0.1"}
                    ]
                },
                "ip-address-mapping": [
                    {"uuid": "91c5b217", "mapped-ip": "10.0.0.1", "floating-ip": "5.5.5.5",
                     "policy-space-name": "test", "endpoint-group-name": "nat-epg"},
                    {"uuid": "no-mapped-ip", "floating-ip": "6.6.6.6"}
                ],
                "unknown-key": {"is": "ignored"}
            }"#,
        )
        .unwrap();
        let ep = file.into_endpoint().unwrap();

        assert_eq!(ep.uuid, "83f18f0b-80f7-46e2-b06c-4d9487b0c754");
        assert_eq!(ep.ips.len(), 2);
        assert_eq!(ep.virtual_ips.len(), 2);
        // the first virtual ip defaults to the endpoint's own mac
        assert!(
            ep.virtual_ips
                .iter()
                .any(|(mac, ip)| *mac == ep.mac.unwrap() && ip == "10.0.0.50")
        );
        assert_eq!(
            ep.egroup.as_ref().unwrap().as_str(),
            "/PolicyUniverse/PolicySpace/test/GbpEpGroup/epg/"
        );
        assert_eq!(ep.security_groups.len(), 1);
        let dhcp = ep.dhcp_v4.unwrap();
        // the route without a dest is dropped; the default prefix is 32
        assert_eq!(dhcp.static_routes.len(), 2);
        assert_eq!(dhcp.static_routes[1].prefix_len, 32);
        // the mapping without a mapped-ip is dropped
        assert_eq!(ep.ip_address_mappings.len(), 1);
        assert_eq!(
            ep.ip_address_mappings[0].egroup.as_ref().unwrap().as_str(),
            "/PolicyUniverse/PolicySpace/test/GbpEpGroup/nat-epg/"
        );
    }

    #[test]
    fn group_built_from_policy_space_and_name() {
        let file: EpFile = serde_json::from_str(
            r#"{"uuid": "u1", "policy-space-name": "common", "endpoint-group-name": "web"}"#,
        )
        .unwrap();
        let ep = file.into_endpoint().unwrap();
        assert_eq!(
            ep.egroup.unwrap().as_str(),
            "/PolicyUniverse/PolicySpace/common/GbpEpGroup/web/"
        );
    }

    #[test]
    fn mapping_alias_used_without_group() {
        let file: EpFile =
            serde_json::from_str(r#"{"uuid": "u1", "eg-mapping-alias": "vmware"}"#).unwrap();
        let ep = file.into_endpoint().unwrap();
        assert!(ep.egroup.is_none());
        assert_eq!(ep.eg_mapping_alias.as_deref(), Some("vmware"));
    }

    #[test]
    fn snat_vm_name_sets_nat_mode() {
        let file: EpFile = serde_json::from_str(
            r#"{"uuid": "u1", "attributes": {"vm-name": "snat|node-1|uplink"}}"#,
        )
        .unwrap();
        let ep = file.into_endpoint().unwrap();
        assert!(ep.nat_mode);
    }

    #[test]
    fn bad_mac_is_a_validation_error() {
        let file: EpFile =
            serde_json::from_str(r#"{"uuid": "u1", "mac": "not-a-mac"}"#).unwrap();
        assert!(matches!(
            file.into_endpoint().unwrap_err(),
            SourceError::Validation { field: "mac", .. }
        ));
    }

    #[test]
    fn external_endpoint_group_is_its_interface() {
        let file: ExtEpFile = serde_json::from_str(
            r#"{
                "uuid": "x1",
                "mac": "10:ff:00:a3:01:05",
                "ip": ["10.100.0.4"],
                "policy-space-name": "test",
                "path-attachment": "ext-int",
                "node-attachment": "ext-node"
            }"#,
        )
        .unwrap();
        let ep = file.into_endpoint().unwrap();
        assert_eq!(
            ep.ext_interface.as_ref().unwrap().as_str(),
            "/PolicyUniverse/PolicySpace/test/GbpExternalInterface/ext-int/"
        );
        assert_eq!(ep.egroup, ep.ext_interface);
        assert_eq!(
            ep.ext_node.as_ref().unwrap().as_str(),
            "/PolicyUniverse/PolicySpace/test/GbpExternalNode/ext-node/"
        );
        assert!(ep.is_external());
    }
}
