//! Pipeline stages. A node holds attributes and combines their output
//! according to its kind.
use std::collections::HashSet;
use std::fmt;
use std::iter;

use serde::{Deserialize, Serialize};

use crate::attribute::{Attribute, Role, Word, WordStream};
use crate::error::ChainError;

/// Node type tag as it appears in chain documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    #[serde(rename = "base")]
    Base,
    Case,
    Substitution,
    Append,
    Prepend,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeType::Base => "Base words",
            NodeType::Case => "Case",
            NodeType::Substitution => "Substitution",
            NodeType::Append => "Append",
            NodeType::Prepend => "Prepend",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Root of the chain: the union of its attributes' words.
    Base,
    Mutate { is_case: bool },
    Add { prepend: bool },
}

impl From<NodeType> for NodeKind {
    fn from(node_type: NodeType) -> Self {
        match node_type {
            NodeType::Base => NodeKind::Base,
            NodeType::Case => NodeKind::Mutate { is_case: true },
            NodeType::Substitution => NodeKind::Mutate { is_case: false },
            NodeType::Append => NodeKind::Add { prepend: false },
            NodeType::Prepend => NodeKind::Add { prepend: true },
        }
    }
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Base => NodeType::Base,
            NodeKind::Mutate { is_case: true } => NodeType::Case,
            NodeKind::Mutate { is_case: false } => NodeType::Substitution,
            NodeKind::Add { prepend: false } => NodeType::Append,
            NodeKind::Add { prepend: true } => NodeType::Prepend,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Base => "base",
            NodeKind::Mutate { is_case: true } => "case",
            NodeKind::Mutate { is_case: false } => "substitution",
            NodeKind::Add { prepend: false } => "append",
            NodeKind::Add { prepend: true } => "prepend",
        }
    }

    pub fn accepts(&self, role: Role) -> bool {
        match self {
            NodeKind::Base | NodeKind::Add { .. } => matches!(role, Role::Source | Role::NoAddition),
            NodeKind::Mutate { is_case: true } => matches!(role, Role::Case | Role::NoMutation),
            NodeKind::Mutate { is_case: false } => matches!(role, Role::Substitution | Role::NoMutation),
        }
    }
}

#[derive(Debug)]
pub struct Node {
    kind: NodeKind,
    attributes: Vec<Attribute>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            attributes: Vec::new(),
        }
    }

    pub fn base() -> Self {
        Self::new(NodeKind::Base)
    }

    pub fn case() -> Self {
        Self::new(NodeKind::Mutate { is_case: true })
    }

    pub fn substitution() -> Self {
        Self::new(NodeKind::Mutate { is_case: false })
    }

    pub fn append() -> Self {
        Self::new(NodeKind::Add { prepend: false })
    }

    pub fn prepend() -> Self {
        Self::new(NodeKind::Add { prepend: true })
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_root(&self) -> bool {
        self.kind == NodeKind::Base
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut [Attribute] {
        &mut self.attributes
    }

    /// Append `attr`, rejecting roles this kind cannot hold and attributes
    /// equal to one already present.
    pub fn add_attribute(&mut self, attr: Attribute) -> Result<(), ChainError> {
        if !self.kind.accepts(attr.role()) {
            return Err(ChainError::IncompatibleAttribute {
                node: self.kind.name(),
                attribute: attr.kind().name(),
            });
        }
        if self.attributes.contains(&attr) {
            return Err(ChainError::DuplicateAttribute(attr.label().to_string()));
        }
        self.attributes.push(attr);
        Ok(())
    }

    /// Remove and return the attribute at `idx` after stopping its
    /// background count.
    pub fn remove_attribute(&mut self, idx: usize) -> Option<Attribute> {
        if idx >= self.attributes.len() {
            return None;
        }
        let mut attr = self.attributes.remove(idx);
        attr.stop();
        Some(attr)
    }

    pub fn stop(&mut self) {
        for attr in &mut self.attributes {
            attr.stop();
        }
    }

    pub fn wait(&mut self) {
        for attr in &mut self.attributes {
            attr.wait();
        }
    }

    pub fn is_calculating(&self) -> bool {
        self.attributes.iter().any(Attribute::is_calculating)
    }

    pub fn is_rule_compatible(&self) -> bool {
        self.attributes.iter().all(Attribute::is_rule_compatible)
    }

    pub fn produce<'a>(&'a self, upstream: WordStream<'a>) -> WordStream<'a> {
        match self.kind {
            NodeKind::Base => Box::new(
                upstream.chain(
                    self.attributes
                        .iter()
                        .flat_map(|attr| attr.produce(Box::new(iter::empty()))),
                ),
            ),
            NodeKind::Mutate { .. } if self.attributes.is_empty() => upstream,
            NodeKind::Mutate { .. } => Box::new(upstream.flat_map(move |word| self.mutate(word))),
            NodeKind::Add { .. } if self.attributes.is_empty() => upstream,
            NodeKind::Add { prepend } => Box::new(upstream.flat_map(move |word| -> WordStream<'a> {
                let word = match word {
                    Ok(word) => word,
                    Err(e) => return Box::new(iter::once(Err(e))),
                };
                Box::new(
                    self.attributes
                        .iter()
                        .flat_map(|attr| attr.produce(Box::new(iter::empty())))
                        .map(move |piece| {
                            piece.map(|piece| {
                                if prepend {
                                    piece + &word
                                } else {
                                    format!("{word}{piece}")
                                }
                            })
                        }),
                )
            })),
        }
    }

    /// All attribute outputs for one upstream word. With several attributes
    /// repeats are dropped, keeping first-seen order.
    fn mutate(&self, word: Word) -> Vec<Word> {
        let word = match word {
            Ok(word) => word,
            Err(e) => return vec![Err(e)],
        };
        if let [attr] = self.attributes.as_slice() {
            return mutate_one(attr, &word).collect();
        }
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for attr in &self.attributes {
            for mutated in mutate_one(attr, &word) {
                match mutated {
                    Ok(w) if seen.insert(w.clone()) => out.push(Ok(w)),
                    Ok(_) => {}
                    Err(e) => out.push(Err(e)),
                }
            }
        }
        out
    }

    pub fn count_words(&self, prev_word_count: u64) -> u64 {
        if self.attributes.is_empty() {
            return prev_word_count;
        }
        match self.kind {
            NodeKind::Base | NodeKind::Mutate { is_case: true } => self
                .attributes
                .iter()
                .fold(0u64, |acc, attr| acc.saturating_add(attr.count_words(prev_word_count))),
            NodeKind::Mutate { is_case: false } => self.substitution_estimate(prev_word_count),
            NodeKind::Add { .. } => self.added_words().saturating_mul(prev_word_count),
        }
    }

    pub fn count_bytes(&self, prev_byte_count: u64, prev_word_count: u64) -> u64 {
        if self.attributes.is_empty() {
            return prev_byte_count;
        }
        match self.kind {
            NodeKind::Base => self.attributes.iter().fold(prev_byte_count, |acc, attr| {
                acc.saturating_add(attr.count_bytes(prev_byte_count, prev_word_count))
            }),
            NodeKind::Mutate { is_case: true } => self.attributes.iter().fold(0u64, |acc, attr| {
                acc.saturating_add(attr.count_bytes(prev_byte_count, prev_word_count))
            }),
            NodeKind::Mutate { is_case: false } => self.substitution_estimate(prev_byte_count),
            NodeKind::Add { .. } => {
                let added_bytes = self
                    .attributes
                    .iter()
                    .fold(0u64, |acc, attr| acc.saturating_add(attr.count_bytes(0, 0)));
                self.added_words()
                    .saturating_mul(prev_byte_count)
                    .saturating_add(prev_word_count.saturating_mul(added_bytes))
            }
        }
    }

    fn added_words(&self) -> u64 {
        self.attributes
            .iter()
            .fold(0u64, |acc, attr| acc.saturating_add(attr.count_words(0)))
    }

    /// Frequency-weighted estimate for substitution nodes. The first
    /// substitution pair seeds the total with `prev` unless a no-mutation
    /// attribute already has; each later pair adds `prev * frequency`.
    fn substitution_estimate(&self, prev: u64) -> u64 {
        let mut count = if self.attributes.iter().any(|a| a.role() == Role::NoMutation) {
            prev
        } else {
            0
        };
        for freqs in self.attributes.iter().filter_map(Attribute::substitution_frequencies) {
            for f in freqs {
                if count == 0 {
                    count = prev;
                } else {
                    count = count.saturating_add((f * prev as f64) as u64);
                }
            }
        }
        count
    }

    /// File errors of this node's attributes.
    pub fn file_errors(&self) -> Vec<ChainError> {
        self.attributes.iter().filter_map(Attribute::file_error).collect()
    }
}

fn mutate_one<'a>(attr: &'a Attribute, word: &str) -> WordStream<'a> {
    attr.produce(Box::new(iter::once(Ok(word.to_string()))))
}
