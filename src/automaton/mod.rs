//! Compiled recognition automaton
//!
//! An [`Automaton`] is the immutable trie produced by the rule compiler.
//! Every edge priority decision (literal > class > wildcard) is settled at
//! compile time; walking the trie is a lookup per byte. One automaton is
//! normally built at start-up and shared as `Arc<Automaton>` by every
//! [`Recognizer`](crate::recognizer::Recognizer).

mod compiler;

pub use compiler::{compile, compile_default, compile_rules};

use std::collections::BTreeSet;

use crate::recognizer::Action;
use crate::rules::{ByteSet, Submode};

/// Index of a node inside its [`Automaton`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Position in the automaton's node arena
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What reaching a node means
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Interior node; more bytes are needed
    Branch,
    /// Reaching this node emits an event
    Leaf(Action),
    /// Reaching this node switches into `submode`. The node's edges form the
    /// dispatch table consulted when the submode completes.
    Submode { action: Action, submode: Submode },
}

/// The result of following one byte from a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub target: NodeId,
    /// Set when the byte matched a class or wildcard edge
    pub captured: Option<u8>,
}

/// One trie node with its outgoing edges
#[derive(Debug, Clone)]
pub struct Node {
    kind: NodeKind,
    /// Sorted by byte
    literals: Box<[(u8, NodeId)]>,
    /// Pairwise disjoint
    classes: Box<[(ByteSet, NodeId)]>,
    wildcard: Option<NodeId>,
}

impl Node {
    /// What reaching this node does
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Follow `byte`: literal edges first, then classes, then the wildcard
    pub fn step(&self, byte: u8) -> Option<Step> {
        if let Ok(i) = self.literals.binary_search_by_key(&byte, |&(b, _)| b) {
            return Some(Step {
                target: self.literals[i].1,
                captured: None,
            });
        }

        if let Some(&(_, target)) = self.classes.iter().find(|(set, _)| set.contains(byte)) {
            return Some(Step {
                target,
                captured: Some(byte),
            });
        }

        self.wildcard.map(|target| Step {
            target,
            captured: Some(byte),
        })
    }

    /// True if any byte leads somewhere from here
    pub fn has_edges(&self) -> bool {
        !self.literals.is_empty() || !self.classes.is_empty() || self.wildcard.is_some()
    }
}

/// Immutable compiled trie
#[derive(Debug, Clone)]
pub struct Automaton {
    nodes: Vec<Node>,
    max_literal_depth: usize,
}

impl Automaton {
    /// The node every match starts from
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Look up a node by id.
    ///
    /// # Panics
    ///
    /// Ids are only meaningful for the automaton that produced them; an id
    /// from a larger automaton panics here.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Follow `byte` out of `from`, see [`Node::step`]
    pub fn step(&self, from: NodeId, byte: u8) -> Option<Step> {
        self.node(from).step(byte)
    }

    /// Walk `keys` from `from`, collecting bytes captured on the way
    pub fn walk(&self, from: NodeId, keys: &[u8], captured: &mut Vec<u8>) -> Option<NodeId> {
        let mut current = from;
        for &byte in keys {
            let step = self.step(current, byte)?;
            captured.extend(step.captured);
            current = step.target;
        }
        Some(current)
    }

    /// Total nodes, root included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Longest byte path from the root to a leaf or submode entry
    pub fn max_literal_depth(&self) -> usize {
        self.max_literal_depth
    }

    /// Every action name the automaton can emit, sorted and deduplicated
    pub fn action_names(&self) -> BTreeSet<&str> {
        self.nodes
            .iter()
            .filter_map(|node| match &node.kind {
                NodeKind::Branch => None,
                NodeKind::Leaf(action) => Some(action.as_str()),
                NodeKind::Submode { action, .. } => Some(action.as_str()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn automaton(src: &str) -> Automaton {
        compile(src).expect("rules should compile")
    }

    #[test]
    fn test_step_prefers_literal_over_class() {
        let a = automaton("'A' => t_letter_a\n['A'-'Z'] => t_upper\n* => t_other");

        let lit = a.step(a.root(), b'A').unwrap();
        assert_eq!(lit.captured, None);
        assert_eq!(a.node(lit.target).kind(), &NodeKind::Leaf(Action::from("t_letter_a")));

        let class = a.step(a.root(), b'B').unwrap();
        assert_eq!(class.captured, Some(b'B'));
        assert_eq!(a.node(class.target).kind(), &NodeKind::Leaf(Action::from("t_upper")));

        let wild = a.step(a.root(), b'1').unwrap();
        assert_eq!(wild.captured, Some(b'1'));
        assert_eq!(a.node(wild.target).kind(), &NodeKind::Leaf(Action::from("t_other")));
    }

    #[test]
    fn test_step_without_edge() {
        let a = automaton("'A' => t_a");
        assert!(a.step(a.root(), b'B').is_none());
    }

    #[test]
    fn test_walk_collects_captures() {
        let a = automaton("IAC => { WILL => { * => t_will } }");
        let mut captured = Vec::new();
        let end = a.walk(a.root(), &[0xFF, 0xFB, 0x01], &mut captured).unwrap();
        assert_eq!(a.node(end).kind(), &NodeKind::Leaf(Action::from("t_will")));
        assert_eq!(captured, vec![0x01]);
    }

    #[test]
    #[should_panic]
    fn test_node_from_other_automaton_panics() {
        let big = compile_default().unwrap();
        let small = automaton("'A' => t_a");
        let last = NodeId(big.node_count() as u32 - 1);
        assert!(last.index() >= small.node_count());
        let _ = small.node(last);
    }

    #[test]
    fn test_action_names_and_depth() {
        let a = automaton("'\\e7' => t_save\n'\\e#8' => t_align\n'\\e[' => t_csi @csi => { 'H' => t_cup }");
        let names: Vec<_> = a.action_names().into_iter().collect();
        assert_eq!(names, vec!["t_align", "t_csi", "t_cup", "t_save"]);
        assert_eq!(a.max_literal_depth(), 3);
    }
}
