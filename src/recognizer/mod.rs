//! Streaming control-sequence recognizer
//!
//! A [`Recognizer`] consumes arbitrary byte chunks and produces [`Event`]s
//! by walking a shared [`Automaton`](crate::automaton::Automaton). Splitting
//! the input differently never changes the events produced.

mod event;
mod state;
mod submode;

pub use event::{Action, Event, Param};
pub use state::{ParserMode, Recognizer};
