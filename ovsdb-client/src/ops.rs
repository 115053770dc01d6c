//! Idempotent higher-level OVSDB operations.
//!
//! Mirror, ERSPAN, NetFlow and IPFIX configuration is expressed as small
//! multi-operation transactions: an insert of the new row under a symbolic
//! `uuid-name` plus a Bridge update referencing it. Deletions write the
//! relevant Bridge column back to the empty set, so replaying an operation
//! converges instead of erroring.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::connection::OvsdbConnection;
use crate::error::{OvsdbError, Result};
use crate::message::{Condition, OvsdbOperation, OvsdbTable, OvsdbValue, TransactMessage};

/// Name prefix of the ERSPAN output port backing a mirror session.
pub const ERSPAN_PORT_PREFIX: &str = "erspan";

/// Parameters of an ERSPAN tunnel port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErspanParams {
    pub port_name: String,
    /// ERSPAN header version, 1 or 2.
    pub version: u8,
    pub remote_ip: String,
}

/// A bridge row's uuid together with its current port set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgePorts {
    pub bridge_uuid: String,
    pub port_uuids: BTreeSet<String>,
}

/// The current mirror configuration, with port uuids substituted back to
/// port names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MirrorConfig {
    pub uuid: String,
    pub name: Option<String>,
    pub src_ports: BTreeSet<String>,
    pub dst_ports: BTreeSet<String>,
    pub out_port: Option<String>,
}

/// Walk a JSON value by path segments; numeric segments index arrays.
pub fn walk<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for segment in path {
        current = match segment.parse::<usize>() {
            Ok(index) => current.get(index)?,
            Err(_) => current.get(*segment)?,
        };
    }
    Some(current)
}

/// Collect row uuids from a uuid-typed column value, which is either a
/// single `["uuid", u]` atom or `["set", [["uuid", u], ...]]`.
fn parse_uuid_set(value: &Value) -> BTreeSet<String> {
    let mut uuids = BTreeSet::new();
    let Some(kind) = value.get(0).and_then(Value::as_str) else {
        return uuids;
    };
    match kind {
        "uuid" => {
            if let Some(uuid) = value.get(1).and_then(Value::as_str) {
                uuids.insert(uuid.to_string());
            }
        }
        "set" => {
            if let Some(atoms) = value.get(1).and_then(Value::as_array) {
                for atom in atoms {
                    if atom.get(0).and_then(Value::as_str) == Some("uuid") {
                        if let Some(uuid) = atom.get(1).and_then(Value::as_str) {
                            uuids.insert(uuid.to_string());
                        }
                    }
                }
            }
        }
        _ => {}
    }
    uuids
}

/// Fail if any per-operation result carries an error object.
fn check_results(results: &Value) -> Result<()> {
    if let Some(rows) = results.as_array() {
        for result in rows {
            if let Some(err) = result.get("error").filter(|e| !e.is_null()) {
                return Err(OvsdbError::Server(err.to_string()));
            }
        }
    }
    Ok(())
}

/// High-level client over one OVSDB connection.
pub struct OvsdbClient {
    conn: Arc<OvsdbConnection>,
}

impl OvsdbClient {
    pub fn new(conn: Arc<OvsdbConnection>) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Arc<OvsdbConnection> {
        &self.conn
    }

    /// Uuid of the bridge row named `name`.
    pub async fn get_bridge_uuid(&self, name: &str) -> Result<String> {
        let msg = TransactMessage::new(OvsdbOperation::Select, OvsdbTable::Bridge)
            .condition(Condition::is("name", name))
            .column("_uuid");
        let results = self.conn.transact(&[msg]).await?;
        walk(&results, &["0", "rows", "0", "_uuid", "1"])
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| OvsdbError::NotFound(format!("bridge {name}")))
    }

    /// Uuid of the port row named `name`.
    pub async fn get_port_uuid(&self, name: &str) -> Result<String> {
        let msg = TransactMessage::new(OvsdbOperation::Select, OvsdbTable::Port)
            .condition(Condition::is("name", name))
            .column("_uuid");
        let results = self.conn.transact(&[msg]).await?;
        walk(&results, &["0", "rows", "0", "_uuid", "1"])
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| OvsdbError::NotFound(format!("port {name}")))
    }

    /// All port rows as a uuid→name map, from one select.
    async fn port_map(&self) -> Result<BTreeMap<String, String>> {
        let msg = TransactMessage::new(OvsdbOperation::Select, OvsdbTable::Port)
            .column("name")
            .column("_uuid");
        let results = self.conn.transact(&[msg]).await?;
        let rows = walk(&results, &["0", "rows"])
            .and_then(Value::as_array)
            .ok_or_else(|| OvsdbError::UnexpectedResponse("port rows missing".into()))?;
        let mut ports = BTreeMap::new();
        for row in rows {
            let name = row.get("name").and_then(Value::as_str);
            let uuid = walk(row, &["_uuid", "1"]).and_then(Value::as_str);
            if let (Some(name), Some(uuid)) = (name, uuid) {
                ports.insert(uuid.to_string(), name.to_string());
            }
        }
        Ok(ports)
    }

    /// The bridge uuid and current port uuids of `bridge`.
    pub async fn get_bridge_ports(&self, bridge: &str) -> Result<BridgePorts> {
        let msg = TransactMessage::new(OvsdbOperation::Select, OvsdbTable::Bridge)
            .condition(Condition::is("name", bridge))
            .column("ports")
            .column("_uuid");
        let results = self.conn.transact(&[msg]).await?;
        let bridge_uuid = walk(&results, &["0", "rows", "0", "_uuid", "1"])
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| OvsdbError::NotFound(format!("bridge {bridge}")))?;
        let port_uuids = walk(&results, &["0", "rows", "0", "ports"])
            .map(parse_uuid_set)
            .unwrap_or_default();
        Ok(BridgePorts {
            bridge_uuid,
            port_uuids,
        })
    }

    /// Create a mirror named `name` on the bridge with uuid `bridge_uuid`,
    /// selecting the given source and destination ports by name. The
    /// session's ERSPAN port, when already present, becomes the output
    /// port. Returns the new mirror's uuid.
    pub async fn create_mirror(
        &self,
        bridge_uuid: &str,
        name: &str,
        src_ports: &BTreeSet<String>,
        dst_ports: &BTreeSet<String>,
    ) -> Result<String> {
        let ports = self.port_map().await?;
        let by_name: BTreeMap<&str, &str> = ports
            .iter()
            .map(|(uuid, port)| (port.as_str(), uuid.as_str()))
            .collect();
        let resolve = |names: &BTreeSet<String>| -> Vec<OvsdbValue> {
            names
                .iter()
                .filter_map(|n| by_name.get(n.as_str()))
                .map(|uuid| OvsdbValue::Uuid((*uuid).to_string()))
                .collect()
        };

        let mut insert = TransactMessage::new(OvsdbOperation::Insert, OvsdbTable::Mirror)
            .row_value("select_src_port", OvsdbValue::Set(resolve(src_ports)))
            .row_value("select_dst_port", OvsdbValue::Set(resolve(dst_ports)))
            .row_value("name", OvsdbValue::str(name))
            .uuid_name("mirror1");
        let erspan_port = format!("{ERSPAN_PORT_PREFIX}{name}");
        if let Some(out_uuid) = by_name.get(erspan_port.as_str()) {
            insert = insert.row_value("output_port", OvsdbValue::Uuid((*out_uuid).to_string()));
        }

        let update = TransactMessage::new(OvsdbOperation::Update, OvsdbTable::Bridge)
            .condition(Condition::uuid_is("_uuid", bridge_uuid))
            .row_value("mirrors", OvsdbValue::NamedUuid("mirror1".into()));

        let results = self.conn.transact(&[insert, update]).await?;
        check_results(&results)?;
        walk(&results, &["0", "uuid", "1"])
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| OvsdbError::UnexpectedResponse("mirror uuid missing".into()))
    }

    /// Remove every mirror from `bridge`.
    pub async fn delete_mirror(&self, bridge: &str) -> Result<()> {
        let msg = TransactMessage::new(OvsdbOperation::Update, OvsdbTable::Bridge)
            .condition(Condition::is("name", bridge))
            .row_value("mirrors", OvsdbValue::empty_set());
        let results = self.conn.transact(&[msg]).await?;
        check_results(&results)
    }

    /// Add an ERSPAN tunnel port to `bridge`: insert the Interface and the
    /// Port referencing it, then extend the bridge's port set.
    pub async fn add_erspan_port(&self, bridge: &str, params: &ErspanParams) -> Result<()> {
        let current = self.get_bridge_ports(bridge).await?;

        let port_insert = TransactMessage::new(OvsdbOperation::Insert, OvsdbTable::Port)
            .row_value("name", OvsdbValue::str(params.port_name.as_str()))
            .row_value("interfaces", OvsdbValue::NamedUuid("interface1".into()))
            .uuid_name("port1");

        let iface_insert = TransactMessage::new(OvsdbOperation::Insert, OvsdbTable::Interface)
            .row_value("name", OvsdbValue::str(params.port_name.as_str()))
            .row_value("type", OvsdbValue::str("erspan"))
            .row_value(
                "options",
                OvsdbValue::Map(vec![
                    (
                        "erspan_ver".into(),
                        OvsdbValue::str(params.version.to_string()),
                    ),
                    ("remote_ip".into(), OvsdbValue::str(params.remote_ip.as_str())),
                ]),
            )
            .uuid_name("interface1");

        let mut port_set: Vec<OvsdbValue> = current
            .port_uuids
            .iter()
            .map(|uuid| OvsdbValue::Uuid(uuid.clone()))
            .collect();
        port_set.push(OvsdbValue::NamedUuid("port1".into()));
        let bridge_update = TransactMessage::new(OvsdbOperation::Update, OvsdbTable::Bridge)
            .condition(Condition::uuid_is("_uuid", current.bridge_uuid.as_str()))
            .row_value("ports", OvsdbValue::Set(port_set));

        let results = self
            .conn
            .transact(&[port_insert, iface_insert, bridge_update])
            .await?;
        check_results(&results)?;
        debug!(bridge, port = params.port_name.as_str(), "added ERSPAN port");
        Ok(())
    }

    /// Create a NetFlow exporter on the bridge with uuid `bridge_uuid`.
    pub async fn create_netflow(
        &self,
        bridge_uuid: &str,
        target: &str,
        active_timeout: i64,
        add_id_to_interface: bool,
    ) -> Result<()> {
        let insert = TransactMessage::new(OvsdbOperation::Insert, OvsdbTable::NetFlow)
            .row_value("targets", OvsdbValue::str(target))
            .row_value("active_timeout", OvsdbValue::Int(active_timeout))
            .row_value("add_id_to_interface", OvsdbValue::Bool(add_id_to_interface))
            .uuid_name("netflow1");
        let update = TransactMessage::new(OvsdbOperation::Update, OvsdbTable::Bridge)
            .condition(Condition::uuid_is("_uuid", bridge_uuid))
            .row_value("netflow", OvsdbValue::NamedUuid("netflow1".into()));
        let results = self.conn.transact(&[insert, update]).await?;
        check_results(&results)
    }

    /// Remove the NetFlow exporter from `bridge`.
    pub async fn delete_netflow(&self, bridge: &str) -> Result<()> {
        let msg = TransactMessage::new(OvsdbOperation::Update, OvsdbTable::Bridge)
            .condition(Condition::is("name", bridge))
            .row_value("netflow", OvsdbValue::empty_set());
        let results = self.conn.transact(&[msg]).await?;
        check_results(&results)
    }

    /// Create an IPFIX exporter on the bridge with uuid `bridge_uuid`.
    pub async fn create_ipfix(
        &self,
        bridge_uuid: &str,
        target: &str,
        sampling: Option<i64>,
    ) -> Result<()> {
        let mut insert = TransactMessage::new(OvsdbOperation::Insert, OvsdbTable::Ipfix)
            .row_value("targets", OvsdbValue::str(target))
            .uuid_name("ipfix1");
        if let Some(sampling) = sampling {
            insert = insert.row_value("sampling", OvsdbValue::Int(sampling));
        }
        let update = TransactMessage::new(OvsdbOperation::Update, OvsdbTable::Bridge)
            .condition(Condition::uuid_is("_uuid", bridge_uuid))
            .row_value("ipfix", OvsdbValue::NamedUuid("ipfix1".into()));
        let results = self.conn.transact(&[insert, update]).await?;
        check_results(&results)
    }

    /// Remove the IPFIX exporter from `bridge`.
    pub async fn delete_ipfix(&self, bridge: &str) -> Result<()> {
        let msg = TransactMessage::new(OvsdbOperation::Update, OvsdbTable::Bridge)
            .condition(Condition::is("name", bridge))
            .row_value("ipfix", OvsdbValue::empty_set());
        let results = self.conn.transact(&[msg]).await?;
        check_results(&results)
    }

    /// Read the current mirror configuration, substituting port names for
    /// the uuids in its port sets.
    pub async fn get_mirror_config(&self) -> Result<MirrorConfig> {
        let msg = TransactMessage::new(OvsdbOperation::Select, OvsdbTable::Mirror);
        let results = self.conn.transact(&[msg]).await?;
        let uuid = walk(&results, &["0", "rows", "0", "_uuid", "1"])
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| OvsdbError::NotFound("mirror".into()))?;
        let name = walk(&results, &["0", "rows", "0", "name"])
            .and_then(Value::as_str)
            .map(str::to_string);
        let src_uuids = walk(&results, &["0", "rows", "0", "select_src_port"])
            .map(parse_uuid_set)
            .unwrap_or_default();
        let dst_uuids = walk(&results, &["0", "rows", "0", "select_dst_port"])
            .map(parse_uuid_set)
            .unwrap_or_default();
        let out_uuid = walk(&results, &["0", "rows", "0", "output_port"])
            .map(parse_uuid_set)
            .unwrap_or_default()
            .into_iter()
            .next();

        let ports = self.port_map().await?;
        let substitute = |uuids: BTreeSet<String>| -> BTreeSet<String> {
            uuids
                .into_iter()
                .filter_map(|uuid| ports.get(&uuid).cloned())
                .collect()
        };

        Ok(MirrorConfig {
            uuid,
            name,
            src_ports: substitute(src_uuids),
            dst_ports: substitute(dst_uuids),
            out_port: out_uuid.and_then(|uuid| ports.get(&uuid).cloned()),
        })
    }

    /// Read the ERSPAN options currently configured on `port_name`.
    pub async fn get_current_erspan_params(&self, port_name: &str) -> Result<ErspanParams> {
        let msg = TransactMessage::new(OvsdbOperation::Select, OvsdbTable::Interface)
            .condition(Condition::is("name", port_name))
            .column("options");
        let results = self.conn.transact(&[msg]).await?;
        let options = walk(&results, &["0", "rows", "0", "options", "1"])
            .and_then(Value::as_array)
            .ok_or_else(|| OvsdbError::NotFound(format!("interface {port_name}")))?;

        let mut version = 0u8;
        let mut remote_ip = String::new();
        for pair in options {
            let key = pair.get(0).and_then(Value::as_str);
            let value = pair.get(1).and_then(Value::as_str);
            match (key, value) {
                (Some("erspan_ver"), Some(v)) => version = v.parse().unwrap_or(0),
                (Some("remote_ip"), Some(v)) => remote_ip = v.to_string(),
                _ => {}
            }
        }
        if version == 0 {
            return Err(OvsdbError::UnexpectedResponse(
                "no ERSPAN version configured".into(),
            ));
        }
        Ok(ErspanParams {
            port_name: port_name.to_string(),
            version,
            remote_ip,
        })
    }
}
