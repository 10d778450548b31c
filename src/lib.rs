pub mod attribute;
pub mod background;
pub mod chain;
pub mod config;
pub mod dates;
pub mod engine;
pub mod error;
pub mod export;
pub mod io;
pub mod mutation;
pub mod node;
pub mod report;
pub mod rules;
pub mod stats;
pub mod tables;

#[cfg(test)]
pub(crate) mod test_utils;

pub mod prelude {
    pub use crate::attribute::{Attribute, AttributeKind};
    pub use crate::chain::Chain;
    pub use crate::engine::Engine;
    pub use crate::error::ChainError;
    pub use crate::node::{Node, NodeType};
    pub use crate::tables::ReferenceTables;
}
