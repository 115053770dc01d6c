//! OVSDB JSON-RPC client.
//!
//! Drives a connection to the local OVSDB server over newline-delimited
//! JSON-RPC 2.0: transactions are built from typed [`TransactMessage`]s,
//! request ids route each reply back to its caller, and symbolic
//! `uuid-name` references let one transaction insert a row and link it
//! from a sibling operation. On top of the connection,
//! [`OvsdbClient`] exposes idempotent create/read/delete operations for
//! mirrors, ERSPAN ports and the NetFlow/IPFIX exporters.

mod connection;
mod error;
mod message;
mod ops;

pub use connection::{ConnectionState, OVSDB_DATABASE, OvsdbConnection};
pub use error::{OvsdbError, Result};
pub use message::{
    Condition, ConditionOp, OvsdbOperation, OvsdbTable, OvsdbValue, TransactMessage,
    transact_params,
};
pub use ops::{
    BridgePorts, ERSPAN_PORT_PREFIX, ErspanParams, MirrorConfig, OvsdbClient, walk,
};
