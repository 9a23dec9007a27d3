//! Recognizer state machine
//!
//! Walks the compiled trie one byte at a time and hands control to a
//! submode accumulator when a submode branch is reached. All state lives in
//! the recognizer, so input may be split at any byte boundary.
//!
//! # Modes
//!
//! - Normal: descending the trie from the root
//! - Csi: collecting parameters until a final byte, then dispatching on the
//!   entry node's children. C0 controls inside the sequence act on their own;
//!   ESC, CAN and SUB abandon it.
//! - Osc: collecting a string until BEL or ESC `\`
//! - TelnetSubnegotiation: collecting bytes until IAC SE

use std::convert::Infallible;
use std::fmt;
use std::mem;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace};

use super::event::{Action, Event, Param};
use super::submode::{CsiAccumulator, OscAccumulator, Progress, TelnetSbAccumulator};
use crate::automaton::{Automaton, NodeId, NodeKind};
use crate::rules::{describe_path, Submode};

/// Which grammar the recognizer is currently scanning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParserMode {
    Normal,
    Csi,
    Osc,
    TelnetSubnegotiation,
}

enum Mode {
    Normal {
        node: NodeId,
    },
    Csi {
        entry: NodeId,
        action: Action,
        acc: CsiAccumulator,
    },
    Osc {
        action: Action,
        acc: OscAccumulator,
    },
    TelnetSb {
        action: Action,
        acc: TelnetSbAccumulator,
    },
}

type UnknownHook = Box<dyn FnMut(&[u8]) + Send>;

/// Incremental recognizer for one byte stream.
///
/// Owned by exactly one connection; the compiled [`Automaton`] is shared.
pub struct Recognizer {
    automaton: Arc<Automaton>,
    mode: Mode,
    /// Raw bytes not yet resolved into an event, including bytes consumed
    /// by an open submode
    pending: Vec<u8>,
    /// Bytes captured by class or wildcard edges on the current path
    captures: Vec<u8>,
    unknown_hooks: Vec<UnknownHook>,
}

impl fmt::Debug for Recognizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recognizer")
            .field("mode", &self.mode())
            .field("pending", &self.pending)
            .field("captures", &self.captures)
            .field("unknown_hooks", &self.unknown_hooks.len())
            .finish()
    }
}

impl Recognizer {
    /// Create a recognizer positioned at the root of `automaton`
    pub fn new(automaton: Arc<Automaton>) -> Self {
        let root = automaton.root();
        Self {
            automaton,
            mode: Mode::Normal { node: root },
            pending: Vec::with_capacity(16),
            captures: Vec::with_capacity(4),
            unknown_hooks: Vec::new(),
        }
    }

    /// The shared automaton this recognizer walks
    pub fn automaton(&self) -> &Arc<Automaton> {
        &self.automaton
    }

    /// Register a hook for bytes that match no rule. Hooks run synchronously
    /// in registration order, once per offending byte.
    pub fn on_unknown_sequence<F>(&mut self, hook: F)
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        self.unknown_hooks.push(Box::new(hook));
    }

    /// The grammar currently being scanned
    pub fn mode(&self) -> ParserMode {
        match self.mode {
            Mode::Normal { .. } => ParserMode::Normal,
            Mode::Csi { .. } => ParserMode::Csi,
            Mode::Osc { .. } => ParserMode::Osc,
            Mode::TelnetSb { .. } => ParserMode::TelnetSubnegotiation,
        }
    }

    /// Bytes buffered but not yet resolved. Submodes have no length cap, so
    /// callers bound memory by checking this and calling [`reset`](Self::reset).
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// The unresolved bytes themselves, oldest first
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Drop any partial match or open submode and return to the root
    pub fn reset(&mut self) {
        self.mode = Mode::Normal {
            node: self.automaton.root(),
        };
        self.pending.clear();
        self.captures.clear();
    }

    /// End of stream: report every pending byte through the unknown hooks,
    /// one byte at a time, then reset
    pub fn flush(&mut self) {
        self.report_pending();
        self.reset();
    }

    /// Process a chunk of bytes, returning the events it completes
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Event> {
        let mut events = Vec::new();
        self.feed_with(bytes, |event| events.push(event));
        events
    }

    /// Process a chunk of bytes, handing each event to `sink` as it completes
    pub fn feed_with<F>(&mut self, bytes: &[u8], mut sink: F)
    where
        F: FnMut(Event),
    {
        let result = self.try_feed_with(bytes, |event| {
            sink(event);
            Ok::<(), Infallible>(())
        });
        match result {
            Ok(()) => {}
            Err((_, never)) => match never {},
        }
    }

    /// Like [`feed_with`](Self::feed_with), but stops at the first sink
    /// error.
    ///
    /// The error comes back with the number of bytes consumed, up to and
    /// including the byte that completed the rejected event. The recognizer
    /// is left at that point, so feeding `&bytes[consumed..]` resumes the
    /// stream.
    pub fn try_feed_with<E, F>(&mut self, bytes: &[u8], mut sink: F) -> Result<(), (usize, E)>
    where
        F: FnMut(Event) -> Result<(), E>,
    {
        for (i, &byte) in bytes.iter().enumerate() {
            if let Some(event) = self.advance(byte) {
                sink(event).map_err(|e| (i + 1, e))?;
            }
        }
        Ok(())
    }

    /// Process a single byte
    fn advance(&mut self, byte: u8) -> Option<Event> {
        if let Mode::Normal { node } = self.mode {
            return self.advance_normal(node, byte);
        }

        let progress = match &mut self.mode {
            Mode::Normal { .. } => return None,
            Mode::Csi { acc, .. } => acc.advance(byte),
            Mode::Osc { acc, .. } => acc.advance(byte),
            Mode::TelnetSb { acc, .. } => acc.advance(byte),
        };

        match progress {
            Progress::Pending => {
                self.pending.push(byte);
                None
            }
            Progress::Complete => {
                self.pending.push(byte);
                self.complete_submode()
            }
            Progress::Execute => self.execute_control(byte),
            Progress::Abort => {
                // The abandoned sequence is reported like a stuck prefix
                debug!(sequence = %describe_path(&self.pending), "control sequence cancelled");
                self.report_pending();
                self.reset();
                let root = self.automaton.root();
                self.advance_normal(root, byte)
            }
        }
    }

    /// Run a control byte found inside an open sequence as a one-byte match
    /// from the root. Anything other than a root leaf is reported.
    fn execute_control(&mut self, byte: u8) -> Option<Event> {
        let root = self.automaton.root();
        let matched = self.automaton.step(root, byte).and_then(|step| {
            match self.automaton.node(step.target).kind() {
                NodeKind::Leaf(action) => Some((action.clone(), step.captured)),
                _ => None,
            }
        });

        match matched {
            Some((action, captured)) => {
                Some(Event::new(action, captured.into_iter().map(Param::Byte).collect()))
            }
            None => {
                self.report_unknown(&[byte]);
                None
            }
        }
    }

    /// Descend the trie from `node`
    fn advance_normal(&mut self, node: NodeId, byte: u8) -> Option<Event> {
        let root = self.automaton.root();

        let step = match self.automaton.step(node, byte) {
            Some(step) => step,
            None if self.pending.is_empty() => {
                self.report_unknown(&[byte]);
                return None;
            }
            None => {
                // The buffered prefix is reported byte by byte, then the
                // byte that broke it is tried again from the root
                self.report_pending();
                self.pending.clear();
                self.captures.clear();
                self.mode = Mode::Normal { node: root };
                return self.advance_normal(root, byte);
            }
        };

        self.pending.push(byte);
        self.captures.extend(step.captured);

        match self.automaton.node(step.target).kind() {
            NodeKind::Branch => {
                self.mode = Mode::Normal { node: step.target };
                None
            }
            NodeKind::Leaf(action) => {
                let params = self.captures.drain(..).map(Param::Byte).collect();
                let event = Event::new(action.clone(), params);
                self.pending.clear();
                self.mode = Mode::Normal { node: root };
                Some(event)
            }
            NodeKind::Submode { action, submode } => {
                trace!(sequence = %describe_path(&self.pending), mode = %submode, "entering submode");
                self.captures.clear();
                let action = action.clone();
                self.mode = match submode {
                    Submode::Csi => Mode::Csi {
                        entry: step.target,
                        action,
                        acc: CsiAccumulator::new(),
                    },
                    Submode::Osc => Mode::Osc {
                        action,
                        acc: OscAccumulator::new(),
                    },
                    Submode::TelnetSubnegotiation => Mode::TelnetSb {
                        action,
                        acc: TelnetSbAccumulator::new(),
                    },
                };
                None
            }
        }
    }

    /// The open submode saw its terminator: build its event and return to
    /// the root
    fn complete_submode(&mut self) -> Option<Event> {
        let root = self.automaton.root();
        let mode = mem::replace(&mut self.mode, Mode::Normal { node: root });

        let event = match mode {
            Mode::Normal { .. } => None,
            Mode::Csi { entry, action, acc } => Some(self.dispatch_csi(entry, action, &acc)),
            Mode::Osc { action, acc } => Some(Event::new(action, vec![acc.into_param()])),
            Mode::TelnetSb { action, acc } => Some(Event::new(action, vec![acc.into_param()])),
        };
        self.pending.clear();
        event
    }

    /// Walk the CSI entry's children along `[marker] intermediates final`.
    /// Anything that does not land on a leaf becomes the entry's own
    /// action carrying the raw sequence.
    fn dispatch_csi(&self, entry: NodeId, action: Action, acc: &CsiAccumulator) -> Event {
        if !acc.is_malformed() {
            let mut captured = Vec::new();
            let target = self.automaton.walk(entry, &acc.dispatch_key(), &mut captured);
            if let Some(NodeKind::Leaf(leaf)) = target.map(|t| self.automaton.node(t).kind()) {
                let mut params = acc.params();
                params.extend(captured.into_iter().map(Param::Byte));
                return Event::new(leaf.clone(), params);
            }
        }

        debug!(sequence = %describe_path(&self.pending), "unrecognized control sequence");
        Event::new(action, vec![Param::Bytes(self.pending.clone())])
    }

    fn report_pending(&mut self) {
        let pending = mem::take(&mut self.pending);
        for &byte in &pending {
            self.report_unknown(&[byte]);
        }
        self.pending = pending;
    }

    fn report_unknown(&mut self, bytes: &[u8]) {
        debug!(sequence = %describe_path(bytes), "unknown byte sequence");
        for hook in self.unknown_hooks.iter_mut() {
            hook(bytes);
        }
    }
}
