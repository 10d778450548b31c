//! Statistics snapshots of a chain and their human formatting.
//!
//! `ChainStats` is what a front end shows next to the chain: the estimated
//! word total (or "Calculating..." while background counts run), the size
//! estimate, hashcat compatibility, file errors, and per-node/per-attribute
//! counts.
use std::fmt;

use crate::attribute::Role;
use crate::chain::Chain;
use crate::node::NodeType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordCount {
    Calculating,
    Known(u64),
}

impl fmt::Display for WordCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WordCount::Calculating => f.write_str("Calculating..."),
            WordCount::Known(n) => f.write_str(&group_digits(*n)),
        }
    }
}

/// `1234567` -> `1,234,567`.
pub fn group_digits(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Binary-prefixed size, e.g. `512.0B`, `12.3KB`, `1.5GB`.
pub fn size_string(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in ["", "K", "M", "G", "T", "P", "E", "Z"] {
        if value < 1024.0 {
            return format!("{:3.1}{}B", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1}YB", value)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeStats {
    pub label: String,
    /// Own word count; `None` for rules that only transform words.
    pub words: Option<WordCount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStats {
    pub node_type: NodeType,
    /// Estimated chain output after this node.
    pub words: WordCount,
    pub attributes: Vec<AttributeStats>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStats {
    pub words: WordCount,
    /// Estimated output size; `None` while background counts run.
    pub bytes: Option<u64>,
    pub hashcat_compatible: bool,
    pub file_errors: Vec<String>,
    /// Whether full processing may start now.
    pub can_process: bool,
    pub nodes: Vec<NodeStats>,
}

impl ChainStats {
    pub fn size(&self) -> String {
        match self.bytes {
            Some(bytes) => size_string(bytes),
            None => WordCount::Calculating.to_string(),
        }
    }
}

pub fn chain_stats(chain: &Chain) -> ChainStats {
    let calculating = chain.is_calculating();
    let file_errors: Vec<String> = chain.file_errors().iter().map(ToString::to_string).collect();

    let mut nodes = Vec::with_capacity(chain.len());
    let mut running = 0u64;
    let mut upstream_calculating = false;
    for node in chain.nodes() {
        running = node.count_words(running);
        upstream_calculating |= node.is_calculating();
        let attributes = node
            .attributes()
            .iter()
            .map(|attr| AttributeStats {
                label: attr.label().to_string(),
                words: (attr.role() == Role::Source).then(|| {
                    if attr.is_calculating() {
                        WordCount::Calculating
                    } else {
                        WordCount::Known(attr.count_words(0))
                    }
                }),
            })
            .collect();
        nodes.push(NodeStats {
            node_type: node.kind().node_type(),
            words: if upstream_calculating {
                WordCount::Calculating
            } else {
                WordCount::Known(running)
            },
            attributes,
        });
    }

    let has_basewords = chain.node(0).is_some_and(|root| !root.attributes().is_empty());
    ChainStats {
        words: if calculating {
            WordCount::Calculating
        } else {
            WordCount::Known(chain.count_words())
        },
        bytes: (!calculating).then(|| chain.count_bytes()),
        hashcat_compatible: chain.check_hashcat_compatible(),
        can_process: !calculating && file_errors.is_empty() && has_basewords,
        file_errors,
        nodes,
    }
}
