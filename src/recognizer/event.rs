//! Recognizer events
//!
//! The output contract of the recognizer: one [`Event`] per recognized
//! sequence, carrying the rule's action name and any captured parameters.

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

/// An interned action name. Cloning is a reference-count increment.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Action(Arc<str>);

impl Action {
    /// The action name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        Action(Arc::from(name))
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Action {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for Action {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// A value captured while recognizing a sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Param {
    /// A byte matched by a class or wildcard edge
    Byte(u8),
    /// A decimal CSI parameter
    Int(u32),
    /// A CSI field that is not a plain decimal number (empty, `1:2`, ...),
    /// or an OSC payload
    Text(String),
    /// Raw bytes: Telnet subnegotiation payloads, unrecognized sequences
    Bytes(Vec<u8>),
}

impl Param {
    /// The value of an [`Param::Int`]
    pub fn as_int(&self) -> Option<u32> {
        match self {
            Param::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The byte of a [`Param::Byte`]
    pub fn as_byte(&self) -> Option<u8> {
        match self {
            Param::Byte(b) => Some(*b),
            _ => None,
        }
    }

    /// The string of a [`Param::Text`]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Param::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The payload of a [`Param::Bytes`]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Param::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }
}

/// A recognized sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub action: Action,
    pub params: Vec<Param>,
}

impl Event {
    /// Create an event
    pub fn new(action: Action, params: Vec<Param>) -> Self {
        Self { action, params }
    }

    /// Check the action name
    pub fn is(&self, action: &str) -> bool {
        self.action == action
    }

    /// Get a parameter by position
    pub fn param(&self, index: usize) -> Option<&Param> {
        self.params.get(index)
    }

    /// Get an integer parameter, or `default` when absent or not numeric
    pub fn int(&self, index: usize, default: u32) -> u32 {
        self.param(index).and_then(Param::as_int).unwrap_or(default)
    }

    /// Get an integer parameter, treating 0 as default (ECMA-48 convention)
    pub fn int_or_default(&self, index: usize, default: u32) -> u32 {
        match self.int(index, 0) {
            0 => default,
            v => v,
        }
    }

    /// All integer parameters, skipping fields that are not numeric
    pub fn ints(&self) -> Vec<u32> {
        self.params.iter().filter_map(Param::as_int).collect()
    }
}
