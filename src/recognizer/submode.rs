//! Submode accumulators
//!
//! Variable-length scanners entered from a submode branch of the trie.
//! Each consumes one byte at a time and reports when its grammar's
//! terminator has been seen, so they resume cleanly across chunk boundaries.

use super::event::Param;

const BEL: u8 = 0x07;
const CAN: u8 = 0x18;
const SUB: u8 = 0x1A;
const ESC: u8 = 0x1B;
const IAC: u8 = 0xFF;
const SE: u8 = 0xF0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Progress {
    Pending,
    Complete,
    /// A C0 control that acts on its own; the sequence stays open
    Execute,
    /// The sequence is cancelled and the byte is retried from the root
    Abort,
}

/// ECMA-48 control sequence body: `[marker] params intermediates final`
#[derive(Debug, Default)]
pub(crate) struct CsiAccumulator {
    marker: Option<u8>,
    params: Vec<u8>,
    intermediates: Vec<u8>,
    final_byte: Option<u8>,
    /// A parameter byte arrived after an intermediate
    malformed: bool,
    /// Any parameter or intermediate byte seen; a marker must come first
    started: bool,
}

impl CsiAccumulator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn advance(&mut self, byte: u8) -> Progress {
        match byte {
            CAN | SUB | ESC => return Progress::Abort,
            0x00..=0x1F => return Progress::Execute,
            b'<'..=b'?' if !self.started => {
                self.marker = Some(byte);
                self.started = true;
            }
            0x30..=0x3F => {
                if !self.intermediates.is_empty() {
                    self.malformed = true;
                }
                self.params.push(byte);
                self.started = true;
            }
            0x20..=0x2F => {
                self.intermediates.push(byte);
                self.started = true;
            }
            0x40..=0x7E => {
                self.final_byte = Some(byte);
                return Progress::Complete;
            }
            // DEL and high bytes do not belong to the sequence and leave the
            // accumulation untouched
            _ => {}
        }
        Progress::Pending
    }

    pub(crate) fn is_malformed(&self) -> bool {
        self.malformed
    }

    /// Bytes to walk through the dispatch table: marker, intermediates, final
    pub(crate) fn dispatch_key(&self) -> Vec<u8> {
        self.marker
            .into_iter()
            .chain(self.intermediates.iter().copied())
            .chain(self.final_byte)
            .collect()
    }

    pub(crate) fn params(&self) -> Vec<Param> {
        parse_fields(&self.params)
    }
}

/// Split raw parameter bytes on `;`. Plain decimal fields become
/// [`Param::Int`]; anything else, including empty fields and values that
/// overflow `u32`, is passed through as [`Param::Text`].
pub(crate) fn parse_fields(raw: &[u8]) -> Vec<Param> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(|&b| b == b';').map(parse_field).collect()
}

fn parse_field(field: &[u8]) -> Param {
    let numeric = !field.is_empty() && field.iter().all(u8::is_ascii_digit);
    let value = if numeric {
        field.iter().try_fold(0u32, |acc, &b| {
            acc.checked_mul(10)?.checked_add((b - b'0') as u32)
        })
    } else {
        None
    };
    match value {
        Some(v) => Param::Int(v),
        None => Param::Text(String::from_utf8_lossy(field).into_owned()),
    }
}

/// Operating system command payload, terminated by BEL or ESC `\`
#[derive(Debug, Default)]
pub(crate) struct OscAccumulator {
    data: Vec<u8>,
    saw_esc: bool,
}

impl OscAccumulator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn advance(&mut self, byte: u8) -> Progress {
        if self.saw_esc {
            self.saw_esc = false;
            if byte == b'\\' {
                return Progress::Complete;
            }
            // Not a string terminator; the ESC is payload
            self.data.push(ESC);
        }

        match byte {
            BEL => return Progress::Complete,
            ESC => self.saw_esc = true,
            _ => self.data.push(byte),
        }
        Progress::Pending
    }

    pub(crate) fn into_param(self) -> Param {
        Param::Text(String::from_utf8_lossy(&self.data).into_owned())
    }
}

/// Telnet subnegotiation payload, terminated by IAC SE
#[derive(Debug, Default)]
pub(crate) struct TelnetSbAccumulator {
    data: Vec<u8>,
    saw_iac: bool,
}

impl TelnetSbAccumulator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn advance(&mut self, byte: u8) -> Progress {
        if self.saw_iac {
            self.saw_iac = false;
            match byte {
                SE => return Progress::Complete,
                IAC => self.data.push(IAC),
                other => self.data.extend_from_slice(&[IAC, other]),
            }
        } else if byte == IAC {
            self.saw_iac = true;
        } else {
            self.data.push(byte);
        }
        Progress::Pending
    }

    pub(crate) fn into_param(self) -> Param {
        Param::Bytes(self.data)
    }
}
