//! Chain documents: the JSON form of a chain.
//!
//! ```json
//! {"version": "0.1.0", "nodes": [
//!   {"type_": "base", "attributes": [
//!     {"class_name": "FileAttr",
//!      "kwargs": {"label": "English Dictionary", "path": "$DATA_DIR/English_Dict.txt"}}]},
//!   {"type_": "Case", "attributes": [
//!     {"class_name": "CaseAttr",
//!      "kwargs": {"label": "", "type_": "First", "case": "Uppercase", "idx": null}}]}
//! ]}
//! ```
//!
//! `kwargs` holds the label and exactly the constructor parameters, so a
//! saved chain rebuilds to an equal one. Entries that put the parameters
//! beside `class_name` instead of under `kwargs` are read too.
use std::fs;
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::attribute::{Attribute, AttributeContext, AttributeKind};
use crate::chain::Chain;
use crate::error::ChainError;
use crate::node::{Node, NodeType};

pub const CHAIN_FORMAT_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DEFAULT_DICTIONARY: &str = "$DATA_DIR/English_Dict.txt";
pub const DEFAULT_DICTIONARY_LABEL: &str = "English Dictionary";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AttributeEntry", into = "AttributeEntry")]
pub struct AttributeConfig {
    pub label: String,
    pub kind: AttributeKind,
}

/// An attribute as written in the document.
#[derive(Debug, Serialize, Deserialize)]
struct AttributeEntry {
    class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kwargs: Option<Map<String, Value>>,
    #[serde(flatten)]
    inline: Map<String, Value>,
}

impl TryFrom<AttributeEntry> for AttributeConfig {
    type Error = serde_json::Error;

    fn try_from(entry: AttributeEntry) -> Result<Self, Self::Error> {
        let mut params = entry.kwargs.unwrap_or(entry.inline);
        let label = match params.remove("label") {
            Some(Value::String(label)) => label,
            _ => String::new(),
        };
        params.insert("class_name".to_string(), Value::String(entry.class_name));
        let kind = serde_json::from_value(Value::Object(params))?;
        Ok(Self { label, kind })
    }
}

impl From<AttributeConfig> for AttributeEntry {
    fn from(config: AttributeConfig) -> Self {
        let mut kwargs = match serde_json::to_value(&config.kind) {
            Ok(Value::Object(params)) => params,
            _ => Map::new(),
        };
        let class_name = match kwargs.remove("class_name") {
            Some(Value::String(name)) => name,
            _ => String::new(),
        };
        kwargs.insert("label".to_string(), Value::String(config.label));
        Self {
            class_name,
            kwargs: Some(kwargs),
            inline: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(rename = "type_")]
    pub node_type: NodeType,
    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default)]
    pub version: String,
    pub nodes: Vec<NodeConfig>,
}

impl ChainConfig {
    /// A base node holding the English dictionary.
    pub fn default_chain() -> Self {
        Self {
            version: CHAIN_FORMAT_VERSION.to_string(),
            nodes: vec![NodeConfig {
                node_type: NodeType::Base,
                attributes: vec![AttributeConfig {
                    label: DEFAULT_DICTIONARY_LABEL.to_string(),
                    kind: AttributeKind::File {
                        path: DEFAULT_DICTIONARY.to_string(),
                    },
                }],
            }],
        }
    }

    pub fn from_chain(chain: &Chain) -> Self {
        let nodes = chain
            .nodes()
            .iter()
            .map(|node| NodeConfig {
                node_type: node.kind().node_type(),
                attributes: node
                    .attributes()
                    .iter()
                    .map(|attr| AttributeConfig {
                        label: attr.label().to_string(),
                        kind: attr.kind().clone(),
                    })
                    .collect(),
            })
            .collect();
        Self {
            version: CHAIN_FORMAT_VERSION.to_string(),
            nodes,
        }
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        match self.nodes.first() {
            None => Err(ChainError::InvalidPersistedChain("the chain has no nodes".to_string())),
            Some(first) if first.node_type != NodeType::Base => Err(ChainError::InvalidPersistedChain(
                format!("the chain must start with a base node, found {:?}", first.node_type),
            )),
            Some(_) => Ok(()),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ChainError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ChainError::InvalidPersistedChain(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ChainError> {
        serde_json::to_string_pretty(self).map_err(|e| ChainError::io("serialize chain", e))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ChainError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| ChainError::io(format!("read {}", path.display()), e))?;
        Self::from_json(&json)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ChainError> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?)
            .map_err(|e| ChainError::io(format!("write {}", path.display()), e))
    }

    /// Build a live chain. Attributes that duplicate an earlier one in the
    /// same node are skipped; any other problem rejects the document.
    pub fn build(&self, ctx: &AttributeContext) -> Result<Chain, ChainError> {
        self.validate()?;
        let invalid = |e: ChainError| ChainError::InvalidPersistedChain(e.to_string());
        let mut chain = Chain::new();
        for (idx, node_config) in self.nodes.iter().enumerate() {
            chain
                .add_node(Node::new(node_config.node_type.into()))
                .map_err(invalid)?;
            for attr_config in &node_config.attributes {
                let attr = Attribute::build(attr_config.label.clone(), attr_config.kind.clone(), ctx)
                    .map_err(invalid)?;
                match chain.add_attribute(idx, attr) {
                    Ok(()) => {}
                    Err(ChainError::DuplicateAttribute(label)) => {
                        warn!("skipping duplicate attribute in node {}: {}", idx + 1, label);
                    }
                    Err(e) => return Err(invalid(e)),
                }
            }
        }
        debug!("built chain with {} nodes", chain.len());
        Ok(chain)
    }
}
