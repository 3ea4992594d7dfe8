//! Tagged dictionary values exchanged with the wire codec.
//!
//! The transport's bencoder hands the router a [`Message`]: a top-level
//! dictionary mapping byte-string keys to [`Value`]s. The router reads
//! and writes fields through typed accessors and never touches the byte
//! encoding itself.

use std::collections::BTreeMap;
use std::fmt;

use weft_types::{NetAddress, NodeId};

/// One decoded bencode value.
#[derive(Clone, PartialEq, Eq)]
pub enum Value {
    /// A byte string.
    Bytes(Vec<u8>),
    /// A signed integer.
    Int(i64),
    /// A list of values.
    List(Vec<Value>),
    /// A dictionary of byte-string keys to values.
    Dict(BTreeMap<Vec<u8>, Value>),
}

impl Value {
    /// The byte string, if this value is one.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The integer, if this value is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The list, if this value is one.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// The dictionary, if this value is one.
    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bytes(b) => write!(f, "Bytes({})", hex::encode(b)),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::List(l) => f.debug_list().entries(l).finish(),
            Value::Dict(d) => {
                let mut m = f.debug_map();
                for (k, v) in d {
                    m.entry(&hex::encode(k), v);
                }
                m.finish()
            }
        }
    }
}

/// A decoded top-level message dictionary.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    fields: BTreeMap<Vec<u8>, Value>,
}

impl Message {
    /// An empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a message from raw dictionary fields.
    pub fn from_fields(fields: BTreeMap<Vec<u8>, Value>) -> Self {
        Self { fields }
    }

    /// Set a field, replacing any previous value under the key.
    pub fn set(&mut self, key: &[u8], value: Value) -> &mut Self {
        self.fields.insert(key.to_vec(), value);
        self
    }

    /// Set a byte-string field.
    pub fn set_bytes(&mut self, key: &[u8], bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.set(key, Value::Bytes(bytes.into()))
    }

    /// Read a field.
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Read a byte-string field.
    pub fn bytes(&self, key: &[u8]) -> Option<&[u8]> {
        self.get(key).and_then(Value::as_bytes)
    }

    /// Read a field as a 160-bit node id.
    ///
    /// Returns `None` if the field is absent, not a byte string, or not
    /// exactly 20 bytes.
    pub fn node_id(&self, key: &[u8]) -> Option<NodeId> {
        self.bytes(key).and_then(NodeId::from_slice)
    }

    /// Read a field as a 6-byte endpoint handle.
    pub fn net_address(&self, key: &[u8]) -> Option<NetAddress> {
        self.bytes(key).and_then(NetAddress::from_slice)
    }

    /// Whether the message carries no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Borrow the underlying dictionary (for the codec).
    pub fn fields(&self) -> &BTreeMap<Vec<u8>, Value> {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys;

    #[test]
    fn test_set_and_get_bytes() {
        let mut msg = Message::new();
        msg.set_bytes(keys::QUERY_VERB, keys::VERB_FIND_NODE);
        assert_eq!(msg.bytes(keys::QUERY_VERB), Some(&b"find_node"[..]));
        assert!(msg.bytes(keys::NODES).is_none());
    }

    #[test]
    fn test_node_id_length_checked() {
        let mut msg = Message::new();
        msg.set_bytes(keys::QUERYING_ID, vec![7u8; 20]);
        assert!(msg.node_id(keys::QUERYING_ID).is_some());

        msg.set_bytes(keys::QUERYING_ID, vec![7u8; 19]);
        assert!(msg.node_id(keys::QUERYING_ID).is_none());

        msg.set(keys::QUERYING_ID, Value::Int(7));
        assert!(msg.node_id(keys::QUERYING_ID).is_none());
    }

    #[test]
    fn test_set_replaces_previous_value() {
        let mut msg = Message::new();
        msg.set_bytes(keys::TRANSACTION_ID, vec![1u8]);
        msg.set_bytes(keys::TRANSACTION_ID, vec![2u8]);
        assert_eq!(msg.bytes(keys::TRANSACTION_ID), Some(&[2u8][..]));
    }

    #[test]
    fn test_value_accessors_reject_wrong_variant() {
        let v = Value::Int(42);
        assert!(v.as_bytes().is_none());
        assert_eq!(v.as_int(), Some(42));

        let l = Value::List(vec![Value::Int(1)]);
        assert_eq!(l.as_list().map(<[Value]>::len), Some(1));
        assert!(l.as_dict().is_none());
    }
}
