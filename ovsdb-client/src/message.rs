//! OVSDB transact operations and their JSON wire form.
//!
//! A transaction is an ordered list of [`TransactMessage`]s, each targeting
//! one table. Rows inserted earlier in the transaction can be referenced by
//! sibling operations through a `uuid-name` symbolic uuid, which the server
//! resolves to a concrete uuid in its reply.

use serde_json::{Value, json};

/// OVSDB operation kinds used by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OvsdbOperation {
    Select,
    Insert,
    Update,
    Mutate,
    Delete,
}

impl OvsdbOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Mutate => "mutate",
            Self::Delete => "delete",
        }
    }
}

/// Tables the agent touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OvsdbTable {
    Bridge,
    Port,
    Interface,
    Mirror,
    NetFlow,
    Ipfix,
}

impl OvsdbTable {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bridge => "Bridge",
            Self::Port => "Port",
            Self::Interface => "Interface",
            Self::Mirror => "Mirror",
            Self::NetFlow => "NetFlow",
            Self::Ipfix => "IPFIX",
        }
    }
}

/// Comparison operators usable in a `where` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOp {
    Eq,
    Ne,
    Includes,
    Excludes,
}

impl ConditionOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Includes => "includes",
            Self::Excludes => "excludes",
        }
    }
}

/// A column value: a typed scalar, a uuid reference, or a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OvsdbValue {
    String(String),
    Int(i64),
    Bool(bool),
    /// A concrete row uuid, serialized as `["uuid", v]`.
    Uuid(String),
    /// A symbolic uuid valid within one transaction, `["named-uuid", v]`.
    NamedUuid(String),
    /// A set column, `["set", [...]]`.
    Set(Vec<OvsdbValue>),
    /// A map column, `["map", [[k, v], ...]]`.
    Map(Vec<(String, OvsdbValue)>),
}

impl OvsdbValue {
    pub fn str(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// An empty set, used to clear a column.
    pub fn empty_set() -> Self {
        Self::Set(Vec::new())
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => json!(s),
            Self::Int(i) => json!(i),
            Self::Bool(b) => json!(b),
            Self::Uuid(u) => json!(["uuid", u]),
            Self::NamedUuid(u) => json!(["named-uuid", u]),
            Self::Set(values) => {
                let atoms: Vec<Value> = values.iter().map(OvsdbValue::to_json).collect();
                json!(["set", atoms])
            }
            Self::Map(pairs) => {
                let atoms: Vec<Value> = pairs
                    .iter()
                    .map(|(k, v)| json!([k, v.to_json()]))
                    .collect();
                json!(["map", atoms])
            }
        }
    }
}

/// One `(column, op, value)` row filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub column: String,
    pub op: ConditionOp,
    pub value: OvsdbValue,
}

impl Condition {
    /// Equality against a string column.
    pub fn is(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: ConditionOp::Eq,
            value: OvsdbValue::String(value.into()),
        }
    }

    /// Equality against a uuid-typed column (`_uuid`, `mirrors`, ...).
    pub fn uuid_is(column: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: ConditionOp::Eq,
            value: OvsdbValue::Uuid(uuid.into()),
        }
    }

    fn to_json(&self) -> Value {
        json!([self.column, self.op.as_str(), self.value.to_json()])
    }
}

/// One operation within a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactMessage {
    pub operation: OvsdbOperation,
    pub table: OvsdbTable,
    pub conditions: Vec<Condition>,
    pub columns: Vec<String>,
    pub row: Vec<(String, OvsdbValue)>,
    /// `(column, mutator, value)` triples for mutate operations.
    pub mutations: Vec<(String, String, OvsdbValue)>,
    pub uuid_name: Option<String>,
}

impl TransactMessage {
    pub fn new(operation: OvsdbOperation, table: OvsdbTable) -> Self {
        Self {
            operation,
            table,
            conditions: Vec::new(),
            columns: Vec::new(),
            row: Vec::new(),
            mutations: Vec::new(),
            uuid_name: None,
        }
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    pub fn row_value(mut self, column: impl Into<String>, value: OvsdbValue) -> Self {
        self.row.push((column.into(), value));
        self
    }

    pub fn uuid_name(mut self, name: impl Into<String>) -> Self {
        self.uuid_name = Some(name.into());
        self
    }

    /// The operation object as sent inside the `transact` params.
    pub fn to_json(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("op".into(), json!(self.operation.as_str()));
        obj.insert("table".into(), json!(self.table.as_str()));
        if self.operation != OvsdbOperation::Insert {
            let conds: Vec<Value> = self.conditions.iter().map(Condition::to_json).collect();
            obj.insert("where".into(), Value::Array(conds));
        }
        if !self.columns.is_empty() {
            obj.insert("columns".into(), json!(self.columns));
        }
        if !self.row.is_empty() {
            let mut row = serde_json::Map::new();
            for (column, value) in &self.row {
                row.insert(column.clone(), value.to_json());
            }
            obj.insert("row".into(), Value::Object(row));
        }
        if !self.mutations.is_empty() {
            let muts: Vec<Value> = self
                .mutations
                .iter()
                .map(|(column, mutator, value)| json!([column, mutator, value.to_json()]))
                .collect();
            obj.insert("mutations".into(), Value::Array(muts));
        }
        if let Some(name) = &self.uuid_name {
            obj.insert("uuid-name".into(), json!(name));
        }
        Value::Object(obj)
    }
}

/// Params for one `transact` call against `database`.
pub fn transact_params(database: &str, requests: &[TransactMessage]) -> Vec<Value> {
    let mut params = Vec::with_capacity(requests.len() + 1);
    params.push(json!(database));
    params.extend(requests.iter().map(TransactMessage::to_json));
    params
}
