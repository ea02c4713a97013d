mod encoding;
mod json;

use std::collections::BTreeMap;

use serde_derive::Serialize;

pub use encoding::{delimiters, utils, BDecode, BEncode, MAX_DEPTH};

///Bencoded int type.
pub type BInt = i64;
pub type BList = Vec<Entry>;
///Keys are kept sorted, which is exactly the order bencode requires on the wire.
pub type BDictionary = BTreeMap<String, Entry>;

/// A protocol message: requests and responses are both string-keyed dictionaries.
pub type Message = BDictionary;

/// Any bencoded value.
///
/// Serialises to JSON untagged: integers as numbers, strings as strings,
/// lists as arrays, dictionaries as objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Entry {
    Integer(BInt),
    String(String),
    List(BList),
    Dictionary(BDictionary),
}

impl Entry {
    pub fn parse_or_err<T, E>(self, err: E) -> std::result::Result<T, E>
    where
        T: TryFrom<Self>,
    {
        self.try_into().map_err(|_| err)
    }

    pub fn parse<T>(self) -> Option<T>
    where
        Self: TryInto<T>,
    {
        self.try_into().ok()
    }

    /// Name of the variant, as used in encoding error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Entry::Integer(_) => "int",
            Entry::String(_) => "str",
            Entry::List(_) => "list",
            Entry::Dictionary(_) => "dict",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Entry::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&BSlice> {
        match self {
            Entry::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&BDictionary> {
        match self {
            Entry::Dictionary(d) => Some(d),
            _ => None,
        }
    }
}

pub type BSlice = [Entry];

macro_rules! entry_conversions {
    {$($kind:ident($from:ty)),+} => {
        $(
            impl From<$from> for Entry {
                fn from(val: $from) -> Self {
                    Self::$kind(val.into())
                }
            }
        )*
    };
}

entry_conversions! {
    Integer(BInt),
    Integer(bool),
    String(String),
    String(&str),
    List(BList),
    Dictionary(BDictionary)
}

impl TryFrom<Entry> for BDictionary {
    type Error = Entry;

    fn try_from(value: Entry) -> std::result::Result<Self, Self::Error> {
        if let Entry::Dictionary(val) = value {
            Ok(val)
        } else {
            Err(value)
        }
    }
}

impl TryFrom<Entry> for BList {
    type Error = Entry;

    fn try_from(value: Entry) -> std::result::Result<Self, Self::Error> {
        if let Entry::List(val) = value {
            Ok(val)
        } else {
            Err(value)
        }
    }
}

impl TryFrom<Entry> for String {
    type Error = Entry;

    fn try_from(value: Entry) -> std::result::Result<Self, Self::Error> {
        if let Entry::String(val) = value {
            Ok(val)
        } else {
            Err(value)
        }
    }
}

impl TryFrom<Entry> for BInt {
    type Error = Entry;

    fn try_from(value: Entry) -> std::result::Result<Self, Self::Error> {
        if let Entry::Integer(val) = value {
            Ok(val)
        } else {
            Err(value)
        }
    }
}
