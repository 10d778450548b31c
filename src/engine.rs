//! Engine: owns the chain together with the reference tables and background
//! count tally its attributes share. Handles chain editing, persistence,
//! wordlist processing, and rule file output.
//!
//! Typical usage:
//!
//! ```no_run
//! use mentalist::engine::Engine;
//! # fn main() -> anyhow::Result<()> {
//! let mut engine = Engine::load_tables("/usr/share/mentalist")?;
//! engine.load_default_chain()?;
//! engine.wait_for_counts();
//! println!("{}", mentalist::report::render_summary(&engine.stats()));
//! engine.process("wordlist.txt", false, |pct| println!("{pct}%"))?;
//! # Ok(())
//! # }
//! ```
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Instant;

use log::{info, warn};

use crate::attribute::{Attribute, AttributeContext, AttributeKind};
use crate::background::{CancelToken, CountsChanged};
use crate::chain::{Chain, Direction};
use crate::config::ChainConfig;
use crate::error::ChainError;
use crate::export::{WriteOutcome, save_rules, write_wordlist};
use crate::node::{Node, NodeType};
use crate::stats::{ChainStats, chain_stats, group_digits, size_string};
use crate::tables::{ReferenceTables, TableError};

#[derive(Debug)]
pub struct Engine {
    chain: Chain,
    ctx: AttributeContext,
    stop: CancelToken,
}

impl Engine {
    /// An engine with an empty chain.
    pub fn new(tables: ReferenceTables, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            chain: Chain::new(),
            ctx: AttributeContext::new(Arc::new(tables), data_dir),
            stop: CancelToken::new(),
        }
    }

    /// Load the reference tables from `data_dir` and start with an empty
    /// chain.
    pub fn load_tables<P: AsRef<Path>>(data_dir: P) -> Result<Self, TableError> {
        let dir = data_dir.as_ref();
        Ok(Self::new(ReferenceTables::load(dir)?, dir))
    }

    /// Files at least this large are read through a memory map. Applies to
    /// attributes built afterwards.
    pub fn set_mmap_threshold(&mut self, bytes: u64) {
        self.ctx.mmap_threshold = bytes;
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn context(&self) -> &AttributeContext {
        &self.ctx
    }

    /// Append an empty node of `node_type`; returns its position.
    pub fn add_node(&mut self, node_type: NodeType) -> Result<usize, ChainError> {
        self.chain.add_node(Node::new(node_type.into()))?;
        Ok(self.chain.len() - 1)
    }

    pub fn add_attribute(
        &mut self,
        node_idx: usize,
        label: impl Into<String>,
        kind: AttributeKind,
    ) -> Result<(), ChainError> {
        let attr = Attribute::build(label, kind, &self.ctx)?;
        self.chain.add_attribute(node_idx, attr)
    }

    pub fn remove_node(&mut self, idx: usize) -> Result<(), ChainError> {
        self.chain.remove_node(idx).map(drop)
    }

    pub fn remove_attribute(&mut self, node_idx: usize, attr_idx: usize) -> Result<(), ChainError> {
        self.chain.remove_attribute(node_idx, attr_idx).map(drop)
    }

    pub fn move_node(&mut self, idx: usize, direction: Direction) -> Result<usize, ChainError> {
        self.chain.move_node(idx, direction)
    }

    pub fn clear(&mut self) {
        self.chain.clear();
    }

    fn replace_chain(&mut self, chain: Chain) {
        self.chain.clear();
        self.chain = chain;
    }

    pub fn load_default_chain(&mut self) -> Result<(), ChainError> {
        let chain = ChainConfig::default_chain().build(&self.ctx)?;
        self.replace_chain(chain);
        Ok(())
    }

    /// Replace the chain with the document at `path`. When the document
    /// cannot be used the default chain is loaded instead and the error is
    /// still returned.
    pub fn load_chain<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ChainError> {
        let path = path.as_ref();
        match ChainConfig::load(path).and_then(|config| config.build(&self.ctx)) {
            Ok(chain) => {
                info!("loaded chain from {} ({} nodes)", path.display(), chain.len());
                self.replace_chain(chain);
                Ok(())
            }
            Err(e) => {
                warn!("could not load {}: {}; using the default chain", path.display(), e);
                self.load_default_chain()?;
                Err(e)
            }
        }
    }

    pub fn save_chain<P: AsRef<Path>>(&self, path: P) -> Result<(), ChainError> {
        ChainConfig::from_chain(&self.chain).save(path)
    }

    pub fn stats(&self) -> ChainStats {
        chain_stats(&self.chain)
    }

    /// Receive a message each time a background count finishes. Replaces any
    /// previous subscription.
    pub fn events(&self) -> Receiver<CountsChanged> {
        self.ctx.tracker.subscribe()
    }

    pub fn wait_for_counts(&mut self) {
        self.chain.wait_for_counts();
    }

    /// Ask a running [`Engine::process`] to stop at its next check.
    pub fn stop_processing(&self) {
        self.stop.cancel();
    }

    /// A token that stops processing from another thread.
    pub fn stop_handle(&self) -> CancelToken {
        self.stop.clone()
    }

    /// Stream the chain's words (or only the base words) into `path`.
    /// `progress` receives the integer percent of base words consumed each
    /// time it changes. A cancelled run removes the partial file, and a stop
    /// requested before the run starts cancels it without writing anything.
    ///
    /// Refuses with [`ChainError::StillCalculating`] while any count the
    /// output depends on is pending: the whole chain, or the base node alone
    /// for `basewords_only`.
    pub fn process<P, F>(
        &self,
        path: P,
        basewords_only: bool,
        mut progress: F,
    ) -> Result<WriteOutcome, ChainError>
    where
        P: AsRef<Path>,
        F: FnMut(u8),
    {
        let path = path.as_ref();
        if let Some(e) = self.chain.check_files().into_iter().next() {
            return Err(e);
        }
        let pending = if basewords_only {
            self.chain.node(0).is_some_and(Node::is_calculating)
        } else {
            self.chain.is_calculating()
        };
        if pending {
            return Err(ChainError::StillCalculating);
        }
        if self.chain.node(0).is_none_or(|root| root.attributes().is_empty()) {
            return Err(ChainError::MisplacedNode(
                "the base node has no words to process".to_string(),
            ));
        }

        let (words, bytes) = if basewords_only {
            self.chain.count_basewords()
        } else {
            (self.chain.count_words(), self.chain.count_bytes())
        };
        info!(
            "writing {} words ({}) to {}",
            group_digits(words),
            size_string(bytes),
            path.display()
        );

        if self.stop.is_cancelled() {
            self.stop.reset();
            info!("processing stopped before writing {}", path.display());
            return Ok(WriteOutcome::Cancelled);
        }
        let started = Instant::now();
        let mut last_percent = 0u8;
        let written = write_wordlist(self.chain.get_words(basewords_only), path, &self.stop, |_| {
            let percent = self.chain.get_progress_percent();
            if percent != last_percent {
                last_percent = percent;
                progress(percent);
            }
        });
        self.stop.reset();
        let outcome = written?;
        match outcome {
            WriteOutcome::Completed { words } => {
                if last_percent != 100 {
                    progress(100);
                }
                info!(
                    "wrote {} words to {} in {:.2?}",
                    group_digits(words),
                    path.display(),
                    started.elapsed()
                );
            }
            WriteOutcome::Cancelled => info!("processing cancelled; removed {}", path.display()),
        }
        Ok(outcome)
    }

    /// Write the chain as a hashcat rule file. Returns the number of rules.
    /// Fails with [`ChainError::StillCalculating`] while an attribute after
    /// the base node is still counting.
    pub fn to_hashcat<P: AsRef<Path>>(&self, path: P, comments: &[String]) -> Result<usize, ChainError> {
        if let Some(attr) = self
            .chain
            .nodes()
            .iter()
            .flat_map(|node| node.attributes())
            .find(|attr| !attr.is_rule_compatible())
        {
            return Err(ChainError::InvalidAttribute(format!(
                "{} cannot be expressed as a hashcat rule",
                attr.label()
            )));
        }
        let rules = self.chain.get_rules()?;
        save_rules(&rules, comments, path.as_ref())?;
        info!(
            "wrote {} rules to {}",
            group_digits(rules.len() as u64),
            path.as_ref().display()
        );
        Ok(rules.len())
    }
}
