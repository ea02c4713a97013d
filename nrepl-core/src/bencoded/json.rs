//! Bridge between JSON text (tunnel input lines, argument literals) and bencode values.
//!
//! The JSON to bencode direction is fallible: bencode has no floats or nulls.
//! The opposite direction goes through `Entry`'s `Serialize` impl.
use serde_json::Value;

use super::{BDictionary, BList, Entry};
use crate::error::{Error, ErrorKind, Result};

impl TryFrom<Value> for Entry {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(Entry::from(b)),
            Value::Number(n) => n
                .as_i64()
                .map(Entry::Integer)
                .ok_or_else(|| {
                    let kind = if n.is_f64() { "float" } else { "u64" };
                    ErrorKind::Encoding(kind).into()
                }),
            Value::String(s) => Ok(Entry::String(s)),
            Value::Array(items) => items
                .into_iter()
                .map(Entry::try_from)
                .collect::<Result<BList>>()
                .map(Entry::List),
            Value::Object(map) => map
                .into_iter()
                .map(|(key, value)| Ok::<_, Error>((key, Entry::try_from(value)?)))
                .collect::<Result<BDictionary>>()
                .map(Entry::Dictionary),
            Value::Null => Err(ErrorKind::Encoding("null").into()),
        }
    }
}

impl Entry {
    /// Parses one JSON document into a bencode value.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str::<Value>(text)?.try_into()
    }

    pub fn to_json(&self) -> String {
        //Every entry is representable in JSON, so serialization can't fail
        serde_json::to_string(self).unwrap()
    }
}
