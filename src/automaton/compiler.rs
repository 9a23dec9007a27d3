//! Rule compiler
//!
//! Builds an [`Automaton`] from a [`RuleNode`] tree in three passes:
//!
//! 1. **Insert**: every multi-byte literal becomes a chain of single-byte
//!    edges; entries sharing a prefix merge into the same nodes. Class and
//!    wildcard entries become capture edges.
//! 2. **Validate**: reject rules that can never fire and CSI dispatch tables
//!    the recognizer cannot walk.
//! 3. **Freeze**: intern action names and pack edges into sorted slices.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::{Automaton, Node, NodeId, NodeKind};
use crate::error::CompileError;
use crate::recognizer::Action;
use crate::rules::{describe_byte, dsl, BytePattern, ByteSet, RuleNode, Submode, DEFAULT_RULES};

/// Compile rule DSL text
pub fn compile(source: &str) -> Result<Automaton, CompileError> {
    let tree = dsl::parse(source)?;
    compile_rules(&tree)
}

/// Compile the bundled ANSI/xterm/Telnet rule set
pub fn compile_default() -> Result<Automaton, CompileError> {
    compile(DEFAULT_RULES)
}

/// Compile an already-built rule tree. The root must be an action-free branch.
pub fn compile_rules(root: &RuleNode) -> Result<Automaton, CompileError> {
    match root {
        RuleNode::Branch { action: None, .. } => {}
        RuleNode::Branch { action: Some(_), .. } => {
            return Err(CompileError::InvalidDispatch {
                path: ROOT.to_string(),
                detail: "the root cannot enter a submode".to_string(),
            })
        }
        RuleNode::Leaf { action } => {
            return Err(CompileError::InvalidDispatch {
                path: ROOT.to_string(),
                detail: format!("the root must be a branch, found leaf `{}`", action),
            })
        }
    }

    let mut builder = Builder::new();
    builder.merge(0, root)?;
    let max_literal_depth = builder.validate(0, 0, false)?;
    let automaton = builder.freeze(max_literal_depth);

    debug!(
        nodes = automaton.node_count(),
        depth = max_literal_depth,
        "compiled recognition rules"
    );
    Ok(automaton)
}

const ROOT: &str = "<root>";

#[derive(Debug, Clone, PartialEq, Eq)]
enum BuildKind {
    Branch,
    Leaf(String),
    Submode { action: String, submode: Submode },
}

#[derive(Debug)]
struct BuildNode {
    kind: BuildKind,
    literals: BTreeMap<u8, usize>,
    classes: Vec<(ByteSet, usize)>,
    wildcard: Option<usize>,
    /// Human-readable path from the root, for diagnostics
    path: String,
}

impl BuildNode {
    fn new(path: String) -> Self {
        Self {
            kind: BuildKind::Branch,
            literals: BTreeMap::new(),
            classes: Vec::new(),
            wildcard: None,
            path,
        }
    }

    fn has_edges(&self) -> bool {
        !self.literals.is_empty() || !self.classes.is_empty() || self.wildcard.is_some()
    }

    fn is_vacant(&self) -> bool {
        self.kind == BuildKind::Branch && !self.has_edges()
    }

    /// Every outgoing edge as (bytes matched, child), wildcard excluded
    fn keyed_edges(&self) -> Vec<(ByteSet, usize)> {
        let mut edges: Vec<(ByteSet, usize)> = self
            .literals
            .iter()
            .map(|(&b, &child)| (ByteSet::from_bytes(&[b]), child))
            .collect();
        edges.extend(self.classes.iter().copied());
        edges
    }
}

struct Builder {
    nodes: Vec<BuildNode>,
}

impl Builder {
    fn new() -> Self {
        Self {
            nodes: vec![BuildNode::new(ROOT.to_string())],
        }
    }

    fn child_path(&self, parent: usize, label: &str) -> String {
        if parent == 0 {
            label.to_string()
        } else {
            format!("{} {}", self.nodes[parent].path, label)
        }
    }

    fn add_node(&mut self, path: String) -> usize {
        self.nodes.push(BuildNode::new(path));
        self.nodes.len() - 1
    }

    fn conflict(&self, at: usize, detail: impl Into<String>) -> CompileError {
        CompileError::Conflict {
            path: self.nodes[at].path.clone(),
            detail: detail.into(),
        }
    }

    /// Attach `rule` to the node `at`
    fn merge(&mut self, at: usize, rule: &RuleNode) -> Result<(), CompileError> {
        match rule {
            RuleNode::Leaf { action } => {
                let node = &self.nodes[at];
                if !node.is_vacant() {
                    let detail = match &node.kind {
                        BuildKind::Leaf(existing) => {
                            format!("`{}` duplicates leaf `{}`", action, existing)
                        }
                        _ => format!("leaf `{}` would shadow longer patterns", action),
                    };
                    return Err(self.conflict(at, detail));
                }
                self.nodes[at].kind = BuildKind::Leaf(action.clone());
                Ok(())
            }
            RuleNode::Branch { edges, action } => {
                let current = self.nodes[at].kind.clone();
                match (&current, action) {
                    (BuildKind::Leaf(existing), _) => {
                        let detail = format!("pattern extends leaf `{}`", existing);
                        return Err(self.conflict(at, detail));
                    }
                    (BuildKind::Submode { action: existing, .. }, Some(entry)) => {
                        let detail = format!(
                            "`{}` and `{}` both claim this node",
                            existing, entry.action
                        );
                        return Err(self.conflict(at, detail));
                    }
                    (BuildKind::Branch, Some(entry)) => {
                        self.nodes[at].kind = BuildKind::Submode {
                            action: entry.action.clone(),
                            submode: entry.submode,
                        };
                    }
                    (_, None) => {}
                }
                for (pattern, child) in edges {
                    self.insert(at, pattern, child)?;
                }
                Ok(())
            }
        }
    }

    /// Add the edge `pattern => child` below the node `at`
    fn insert(&mut self, at: usize, pattern: &BytePattern, child: &RuleNode) -> Result<(), CompileError> {
        if let BuildKind::Leaf(existing) = &self.nodes[at].kind {
            let detail = format!("pattern extends leaf `{}`", existing);
            return Err(self.conflict(at, detail));
        }

        match pattern {
            BytePattern::Literal(bytes) => {
                if bytes.is_empty() {
                    return Err(self.conflict(at, "empty literal pattern"));
                }
                let mut current = at;
                for (i, &byte) in bytes.iter().enumerate() {
                    if i > 0 {
                        match &self.nodes[current].kind {
                            BuildKind::Leaf(existing) => {
                                let detail = format!("pattern extends leaf `{}`", existing);
                                return Err(self.conflict(current, detail));
                            }
                            BuildKind::Submode { action, .. } => {
                                let detail =
                                    format!("pattern continues past submode entry `{}`", action);
                                return Err(self.conflict(current, detail));
                            }
                            BuildKind::Branch => {}
                        }
                    }
                    current = match self.nodes[current].literals.get(&byte).copied() {
                        Some(next) => next,
                        None => {
                            let path = self.child_path(current, &describe_byte(byte));
                            let next = self.add_node(path);
                            self.nodes[current].literals.insert(byte, next);
                            next
                        }
                    };
                }
                self.merge(current, child)
            }
            BytePattern::Class(set) => {
                if set.is_empty() {
                    return Err(self.conflict(at, "empty byte class"));
                }
                let existing = self.nodes[at].classes.iter().find(|(s, _)| s == set).copied();
                if let Some((_, next)) = existing {
                    return self.merge(next, child);
                }
                if let Some((other, _)) = self.nodes[at].classes.iter().find(|(s, _)| s.intersects(set)) {
                    let detail = format!("class {:?} overlaps class {:?}", set, other);
                    return Err(self.conflict(at, detail));
                }
                let path = self.child_path(at, &format!("{:?}", set));
                let next = self.add_node(path);
                self.nodes[at].classes.push((*set, next));
                self.merge(next, child)
            }
            BytePattern::Wildcard => {
                let existing = self.nodes[at].wildcard;
                let next = match existing {
                    Some(next) => next,
                    None => {
                        let path = self.child_path(at, "*");
                        let next = self.add_node(path);
                        self.nodes[at].wildcard = Some(next);
                        next
                    }
                };
                self.merge(next, child)
            }
        }
    }

    fn unreachable(&self, at: usize, detail: impl Into<String>) -> CompileError {
        CompileError::Unreachable {
            path: self.nodes[at].path.clone(),
            detail: detail.into(),
        }
    }

    fn invalid_dispatch(&self, at: usize, detail: impl Into<String>) -> CompileError {
        CompileError::InvalidDispatch {
            path: self.nodes[at].path.clone(),
            detail: detail.into(),
        }
    }

    /// Check shadowing at `at`, then recurse. Returns the deepest byte path
    /// to a leaf or submode entry below `at`. `captured` is set once the
    /// path has crossed a class or wildcard edge.
    fn validate(&self, at: usize, depth: usize, captured: bool) -> Result<usize, CompileError> {
        let node = &self.nodes[at];
        self.check_shadowing(at)?;

        match &node.kind {
            BuildKind::Leaf(_) => Ok(depth),
            BuildKind::Submode { submode, action } => {
                // Submode events have no slot for captured bytes
                if captured {
                    let detail = format!(
                        "submode entry `{}` is reached through a class or wildcard edge",
                        action
                    );
                    return Err(self.invalid_dispatch(at, detail));
                }
                match submode {
                    Submode::Csi => self.validate_dispatch(at, 0)?,
                    Submode::Osc | Submode::TelnetSubnegotiation if node.has_edges() => {
                        let detail = format!(
                            "`{}` enters @{} which never consults its children",
                            action, submode
                        );
                        return Err(self.unreachable(at, detail));
                    }
                    _ => {}
                }
                Ok(depth)
            }
            BuildKind::Branch => {
                if !node.has_edges() && at != 0 {
                    return Err(self.unreachable(at, "branch has no rules"));
                }
                let mut deepest = depth;
                for &child in node.literals.values() {
                    deepest = deepest.max(self.validate(child, depth + 1, captured)?);
                }
                let capturing = node.classes.iter().map(|(_, c)| c).chain(node.wildcard.iter());
                for &child in capturing {
                    deepest = deepest.max(self.validate(child, depth + 1, true)?);
                }
                Ok(deepest)
            }
        }
    }

    fn check_shadowing(&self, at: usize) -> Result<(), CompileError> {
        let node = &self.nodes[at];
        let literal_keys: Vec<u8> = node.literals.keys().copied().collect();
        let literal_set = ByteSet::from_bytes(&literal_keys);

        for (set, _) in &node.classes {
            if set.is_subset(&literal_set) {
                let detail = format!("class {:?} is fully covered by literal edges", set);
                return Err(self.unreachable(at, detail));
            }
        }

        if node.wildcard.is_some() {
            let covered = node
                .classes
                .iter()
                .fold(literal_set, |acc, (set, _)| acc.union(set));
            if covered == ByteSet::full() {
                return Err(self.unreachable(at, "wildcard follows edges covering every byte"));
            }
        }
        Ok(())
    }

    /// Validate the children of a CSI branch. The recognizer walks them along
    /// `[marker] intermediates* final`, so only those byte ranges are reachable
    /// and the walk must end on a leaf.
    fn validate_dispatch(&self, at: usize, depth: usize) -> Result<(), CompileError> {
        let node = &self.nodes[at];
        if depth > 0 {
            self.check_shadowing(at)?;
            match &node.kind {
                BuildKind::Submode { action, .. } => {
                    let detail = format!("submode entry `{}` inside a CSI dispatch table", action);
                    return Err(self.invalid_dispatch(at, detail));
                }
                BuildKind::Leaf(_) => return Ok(()),
                BuildKind::Branch if !node.has_edges() => {
                    return Err(self.unreachable(at, "branch has no rules"));
                }
                BuildKind::Branch => {}
            }
        }

        for (set, child) in node.keyed_edges() {
            let child_is_leaf = matches!(self.nodes[child].kind, BuildKind::Leaf(_));
            for byte in set.iter() {
                let reachable = match byte {
                    0x40..=0x7E => child_is_leaf,
                    0x20..=0x2F => !child_is_leaf,
                    0x3C..=0x3F if depth == 0 => !child_is_leaf,
                    _ => false,
                };
                if !reachable {
                    let detail = format!(
                        "dispatch byte {} cannot lead to {}",
                        describe_byte(byte),
                        if child_is_leaf { "a leaf" } else { "a branch" }
                    );
                    return Err(self.unreachable(child, detail));
                }
            }
            self.validate_dispatch(child, depth + 1)?;
        }

        if let Some(child) = node.wildcard {
            if !matches!(self.nodes[child].kind, BuildKind::Leaf(_)) {
                return Err(self.invalid_dispatch(child, "a dispatch wildcard must be a leaf"));
            }
        }
        Ok(())
    }

    fn freeze(self, max_literal_depth: usize) -> Automaton {
        let mut interned: HashMap<String, Action> = HashMap::new();
        let mut intern = |name: &str| {
            interned
                .entry(name.to_string())
                .or_insert_with(|| Action::from(name))
                .clone()
        };

        let nodes = self
            .nodes
            .into_iter()
            .map(|node| {
                let kind = match node.kind {
                    BuildKind::Branch => NodeKind::Branch,
                    BuildKind::Leaf(action) => NodeKind::Leaf(intern(&action)),
                    BuildKind::Submode { action, submode } => NodeKind::Submode {
                        action: intern(&action),
                        submode,
                    },
                };
                Node {
                    kind,
                    literals: node
                        .literals
                        .into_iter()
                        .map(|(b, child)| (b, NodeId(child as u32)))
                        .collect(),
                    classes: node
                        .classes
                        .into_iter()
                        .map(|(set, child)| (set, NodeId(child as u32)))
                        .collect(),
                    wildcard: node.wildcard.map(|child| NodeId(child as u32)),
                }
            })
            .collect();

        Automaton {
            nodes,
            max_literal_depth,
        }
    }
}
