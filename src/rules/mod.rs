//! Rule tree model
//!
//! A rule tree is the declarative description of which byte sequences map to
//! which named actions. It is plain data with no behavior: the compiler in
//! [`crate::automaton`] turns it into an immutable trie.
//!
//! Rule trees are usually written in the rule DSL (see [`dsl`]); the bundled
//! ANSI/xterm/Telnet rule set lives in [`DEFAULT_RULES`].

pub mod dsl;

use std::fmt;

use serde::Serialize;

/// The bundled ANSI / VT100 / xterm / Telnet rule set
pub const DEFAULT_RULES: &str = include_str!("default.rules");

/// Named bytes accepted by the DSL and used when rendering byte paths.
///
/// Telnet command names share their numeric range with high printable bytes,
/// so they only mean "Telnet" by position in the rule tree.
pub(crate) const BYTE_NAMES: &[(&str, u8)] = &[
    ("NUL", 0x00),
    ("SOH", 0x01),
    ("STX", 0x02),
    ("ETX", 0x03),
    ("EOT", 0x04),
    ("ENQ", 0x05),
    ("ACK", 0x06),
    ("BEL", 0x07),
    ("BS", 0x08),
    ("HT", 0x09),
    ("LF", 0x0A),
    ("VT", 0x0B),
    ("FF", 0x0C),
    ("CR", 0x0D),
    ("SO", 0x0E),
    ("SI", 0x0F),
    ("DLE", 0x10),
    ("DC1", 0x11),
    ("DC2", 0x12),
    ("DC3", 0x13),
    ("DC4", 0x14),
    ("NAK", 0x15),
    ("SYN", 0x16),
    ("ETB", 0x17),
    ("CAN", 0x18),
    ("EM", 0x19),
    ("SUB", 0x1A),
    ("ESC", 0x1B),
    ("FS", 0x1C),
    ("GS", 0x1D),
    ("RS", 0x1E),
    ("US", 0x1F),
    ("SP", 0x20),
    ("DEL", 0x7F),
    // Telnet commands (RFC 854, RFC 885)
    ("EOR", 0xEF),
    ("SE", 0xF0),
    ("NOP", 0xF1),
    ("DM", 0xF2),
    ("BRK", 0xF3),
    ("IP", 0xF4),
    ("AO", 0xF5),
    ("AYT", 0xF6),
    ("EC", 0xF7),
    ("EL", 0xF8),
    ("GA", 0xF9),
    ("SB", 0xFA),
    ("WILL", 0xFB),
    ("WONT", 0xFC),
    ("DO", 0xFD),
    ("DONT", 0xFE),
    ("IAC", 0xFF),
];

/// Look up a named byte (`ESC`, `IAC`, ...)
pub fn named_byte(name: &str) -> Option<u8> {
    BYTE_NAMES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|&(_, b)| b)
}

/// Render a byte for diagnostics: control names, printable ASCII, or hex
pub fn describe_byte(byte: u8) -> String {
    match byte {
        0x00..=0x1F | 0x7F => BYTE_NAMES
            .iter()
            .find(|&&(_, b)| b == byte)
            .map(|&(n, _)| n.to_string())
            .unwrap_or_else(|| format!("0x{:02X}", byte)),
        0x20 => "SP".to_string(),
        0x21..=0x7E => (byte as char).to_string(),
        0xFF => "IAC".to_string(),
        _ => format!("0x{:02X}", byte),
    }
}

/// Render a byte path like `ESC [ ?`
pub fn describe_path(path: &[u8]) -> String {
    if path.is_empty() {
        return "<root>".to_string();
    }
    path.iter()
        .map(|&b| describe_byte(b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// The grammar a submode branch switches the recognizer into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Submode {
    /// ECMA-48 control sequence: parameters, intermediates, one final byte
    Csi,
    /// Operating system command string, terminated by BEL or ESC `\`
    Osc,
    /// Telnet subnegotiation payload, terminated by IAC SE
    TelnetSubnegotiation,
}

impl Submode {
    /// Parse the DSL spelling of a submode (`csi`, `osc`, `telnet_sb`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "csi" => Some(Submode::Csi),
            "osc" => Some(Submode::Osc),
            "telnet_sb" => Some(Submode::TelnetSubnegotiation),
            _ => None,
        }
    }

    /// DSL spelling of this submode
    pub fn name(self) -> &'static str {
        match self {
            Submode::Csi => "csi",
            Submode::Osc => "osc",
            Submode::TelnetSubnegotiation => "telnet_sb",
        }
    }
}

impl fmt::Display for Submode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of byte values, stored as a 256-bit bitmap
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ByteSet([u64; 4]);

impl ByteSet {
    /// The empty set
    pub const fn new() -> Self {
        Self([0; 4])
    }

    /// Every byte value
    pub const fn full() -> Self {
        Self([u64::MAX; 4])
    }

    /// The inclusive range `lo..=hi`
    pub fn range(lo: u8, hi: u8) -> Self {
        let mut set = Self::new();
        set.insert_range(lo, hi);
        set
    }

    /// Build a set from individual bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut set = Self::new();
        for &b in bytes {
            set.insert(b);
        }
        set
    }

    /// Add one byte
    pub fn insert(&mut self, byte: u8) {
        self.0[(byte >> 6) as usize] |= 1 << (byte & 63);
    }

    /// Insert `lo..=hi`; an inverted range inserts nothing
    pub fn insert_range(&mut self, lo: u8, hi: u8) {
        if lo > hi {
            return;
        }
        for b in lo..=hi {
            self.insert(b);
        }
    }

    /// Membership test
    pub fn contains(&self, byte: u8) -> bool {
        self.0[(byte >> 6) as usize] & (1 << (byte & 63)) != 0
    }

    /// True if no byte is in the set
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&w| w == 0)
    }

    /// Number of bytes in the set
    pub fn len(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Bytes in either set
    pub fn union(&self, other: &ByteSet) -> ByteSet {
        let mut out = *self;
        for (a, b) in out.0.iter_mut().zip(other.0.iter()) {
            *a |= b;
        }
        out
    }

    /// True if the sets share at least one byte
    pub fn intersects(&self, other: &ByteSet) -> bool {
        self.0.iter().zip(other.0.iter()).any(|(a, b)| a & b != 0)
    }

    /// True when every byte of `self` is also in `other`
    pub fn is_subset(&self, other: &ByteSet) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a & !b == 0)
    }

    /// Iterate over the member bytes in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=255u8).filter(move |&b| self.contains(b))
    }

    /// Collapse the set into inclusive ranges
    pub fn ranges(&self) -> Vec<(u8, u8)> {
        let mut ranges: Vec<(u8, u8)> = Vec::new();
        for b in self.iter() {
            match ranges.last_mut() {
                Some((_, hi)) if *hi as u16 + 1 == b as u16 => *hi = b,
                _ => ranges.push((b, b)),
            }
        }
        ranges
    }
}

impl fmt::Debug for ByteSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, (lo, hi)) in self.ranges().into_iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            if lo == hi {
                write!(f, "0x{:02X}", lo)?;
            } else {
                write!(f, "0x{:02X}-0x{:02X}", lo, hi)?;
            }
        }
        f.write_str("]")
    }
}

/// The key of one rule-tree entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BytePattern {
    /// One or more bytes matched exactly, in order
    Literal(Vec<u8>),
    /// Any single byte in the set; the matched byte is captured
    Class(ByteSet),
    /// Any byte not matched by a sibling literal or class; captured
    Wildcard,
}

impl BytePattern {
    /// A literal byte sequence
    pub fn literal(bytes: impl Into<Vec<u8>>) -> Self {
        BytePattern::Literal(bytes.into())
    }
}

/// Action attached to a branch: entering the node switches the recognizer
/// into `submode`, and `action` names the event produced when the submode
/// completes without a more specific dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmodeEntry {
    pub action: String,
    pub submode: Submode,
}

/// A node of the declarative rule tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleNode {
    /// Terminal node: reaching it emits `action`
    Leaf { action: String },
    /// Interior node with ordered pattern → child entries
    Branch {
        edges: Vec<(BytePattern, RuleNode)>,
        action: Option<SubmodeEntry>,
    },
}

impl RuleNode {
    /// A terminal node emitting `action`
    pub fn leaf(action: impl Into<String>) -> Self {
        RuleNode::Leaf {
            action: action.into(),
        }
    }

    /// An action-free branch
    pub fn branch(edges: Vec<(BytePattern, RuleNode)>) -> Self {
        RuleNode::Branch {
            edges,
            action: None,
        }
    }

    /// A branch that enters `submode`; `edges` form its final-byte dispatch table
    pub fn submode(
        action: impl Into<String>,
        submode: Submode,
        edges: Vec<(BytePattern, RuleNode)>,
    ) -> Self {
        RuleNode::Branch {
            edges,
            action: Some(SubmodeEntry {
                action: action.into(),
                submode,
            }),
        }
    }
}
