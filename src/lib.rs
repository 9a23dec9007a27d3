//! Termproxy control-sequence recognition
//!
//! Recognizes ANSI/VT100/xterm escape sequences, ECMA-48 CSI and OSC
//! strings, ISO 2022 designations and Telnet IAC negotiation multiplexed on
//! one raw byte stream, resuming cleanly across arbitrary chunk boundaries.
//!
//! - `rules`: declarative rule tree and the rule-definition language
//! - `automaton`: rule compiler and the immutable trie it produces
//! - `recognizer`: the streaming recognizer and its events
//! - `diagnostics`: bounded log of unknown sequences
//! - `app`: configuration and logging setup
//!
//! ```
//! use std::sync::Arc;
//! use termproxy::{compile_default, Param, Recognizer};
//!
//! let automaton = Arc::new(compile_default().unwrap());
//! let mut recognizer = Recognizer::new(automaton);
//!
//! let events = recognizer.feed(b"\x1b[1;2H");
//! assert!(events[0].is("t_cursor_position"));
//! assert_eq!(events[0].params, vec![Param::Int(1), Param::Int(2)]);
//! ```

pub mod app;
pub mod automaton;
pub mod diagnostics;
pub mod error;
pub mod recognizer;
pub mod rules;

pub use automaton::{compile, compile_default, compile_rules, Automaton};
pub use diagnostics::{DiagnosticLog, SharedDiagnosticLog, UnknownSequence};
pub use error::CompileError;
pub use recognizer::{Action, Event, Param, ParserMode, Recognizer};
