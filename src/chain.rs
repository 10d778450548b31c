//! The chain: an ordered pipeline of nodes rooted at a base node.
use std::sync::OnceLock;

use log::debug;

use crate::attribute::{empty_stream, Attribute, WordStream};
use crate::error::ChainError;
use crate::node::Node;
use crate::rules::{self, RuleSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Default)]
pub struct Chain {
    nodes: Vec<Node>,
    /// Root word count used for progress, cached until the chain changes.
    baseline: OnceLock<u64>,
}

/// Word and byte estimates for a run of nodes. Bytes include one newline
/// per word once there is any output.
fn estimate(nodes: &[Node]) -> (u64, u64) {
    let (mut words, mut bytes) = (0u64, 0u64);
    for node in nodes {
        bytes = node.count_bytes(bytes, words);
        words = node.count_words(words);
    }
    if bytes > 0 {
        bytes = bytes.saturating_add(words);
    }
    (words, bytes)
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, idx: usize) -> Option<&Node> {
        self.nodes.get(idx)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn invalidate(&mut self) {
        self.baseline = OnceLock::new();
    }

    fn node_mut(&mut self, idx: usize) -> Result<&mut Node, ChainError> {
        self.nodes
            .get_mut(idx)
            .ok_or_else(|| ChainError::MisplacedNode(format!("no node at position {idx}")))
    }

    /// Append a node. The first node must be the base node and no other
    /// node may be one.
    pub fn add_node(&mut self, node: Node) -> Result<(), ChainError> {
        match (self.nodes.is_empty(), node.is_root()) {
            (true, false) => {
                return Err(ChainError::MisplacedNode(
                    "the chain must start with a base node".to_string(),
                ));
            }
            (false, true) => {
                return Err(ChainError::MisplacedNode(
                    "only the first node may be a base node".to_string(),
                ));
            }
            _ => {}
        }
        debug!("adding {} node at position {}", node.kind().name(), self.nodes.len());
        self.nodes.push(node);
        self.invalidate();
        Ok(())
    }

    /// Remove the node at `idx`, stopping its background counts first. The
    /// base node can only go once it is the last node left.
    pub fn remove_node(&mut self, idx: usize) -> Result<Node, ChainError> {
        if idx == 0 && self.nodes.len() > 1 {
            return Err(ChainError::MisplacedNode(
                "the base node cannot be removed while other nodes follow it".to_string(),
            ));
        }
        self.node_mut(idx)?.stop();
        let node = self.nodes.remove(idx);
        self.invalidate();
        Ok(node)
    }

    pub fn clear(&mut self) {
        for node in &mut self.nodes {
            node.stop();
        }
        self.nodes.clear();
        self.invalidate();
    }

    /// Swap a non-root node with its neighbour. Returns the new position.
    pub fn move_node(&mut self, idx: usize, direction: Direction) -> Result<usize, ChainError> {
        let target = match direction {
            Direction::Up => idx.checked_sub(1),
            Direction::Down => idx.checked_add(1),
        };
        match target {
            Some(target) if idx > 0 && target > 0 && target < self.nodes.len() => {
                self.nodes.swap(idx, target);
                self.invalidate();
                Ok(target)
            }
            _ => Err(ChainError::MisplacedNode(format!(
                "node {idx} cannot move {direction:?}"
            ))),
        }
    }

    pub fn add_attribute(&mut self, node_idx: usize, attr: Attribute) -> Result<(), ChainError> {
        self.node_mut(node_idx)?.add_attribute(attr)?;
        self.invalidate();
        Ok(())
    }

    pub fn remove_attribute(&mut self, node_idx: usize, attr_idx: usize) -> Result<Attribute, ChainError> {
        let attr = self
            .node_mut(node_idx)?
            .remove_attribute(attr_idx)
            .ok_or_else(|| ChainError::InvalidAttribute(format!("no attribute at position {attr_idx}")))?;
        self.invalidate();
        Ok(attr)
    }

    fn root_attributes(&self) -> &[Attribute] {
        self.nodes.first().map_or(&[], |root| root.attributes())
    }

    /// Lazily stream the chain's words, or only the base words. Resets the
    /// progress counters.
    pub fn get_words(&self, basewords_only: bool) -> WordStream<'_> {
        for attr in self.root_attributes() {
            attr.reset_progress();
        }
        if basewords_only {
            return match self.nodes.first() {
                Some(root) => root.produce(empty_stream()),
                None => empty_stream(),
            };
        }
        self.nodes
            .iter()
            .fold(empty_stream(), |words, node| node.produce(words))
    }

    pub fn count_words(&self) -> u64 {
        estimate(&self.nodes).0
    }

    pub fn count_bytes(&self) -> u64 {
        estimate(&self.nodes).1
    }

    /// Estimates for the base words alone.
    pub fn count_basewords(&self) -> (u64, u64) {
        estimate(&self.nodes[..self.nodes.len().min(1)])
    }

    pub fn is_calculating(&self) -> bool {
        self.nodes.iter().any(Node::is_calculating)
    }

    pub fn check_hashcat_compatible(&self) -> bool {
        self.nodes.iter().all(Node::is_rule_compatible)
    }

    pub fn get_rules(&self) -> Result<RuleSet, ChainError> {
        rules::compile(&self.nodes)
    }

    /// Integer percent of base words read by the current stream, capped at
    /// 100. Reads 0 until every root count is known.
    pub fn get_progress_percent(&self) -> u8 {
        let root = self.root_attributes();
        let baseline = match self.baseline.get() {
            Some(b) => *b,
            None if root.iter().any(Attribute::is_calculating) => return 0,
            None => *self
                .baseline
                .get_or_init(|| root.iter().fold(0u64, |acc, a| acc.saturating_add(a.count_words(0)))),
        };
        if baseline == 0 {
            return 0;
        }
        let read: u64 = root.iter().map(Attribute::words_read).sum();
        (read.saturating_mul(100) / baseline).min(100) as u8
    }

    pub fn file_errors(&self) -> Vec<ChainError> {
        self.nodes.iter().flat_map(Node::file_errors).collect()
    }

    /// Re-check every file-backed attribute and return the errors found.
    pub fn check_files(&self) -> Vec<ChainError> {
        self.nodes
            .iter()
            .flat_map(|node| node.attributes().iter().filter_map(Attribute::check_file))
            .collect()
    }

    /// Block until every background count has finished.
    pub fn wait_for_counts(&mut self) {
        for node in &mut self.nodes {
            node.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::attribute::AttributeKind;
    use crate::mutation::{CaseTarget, LetterCase, MatchPosition};
    use crate::test_utils::{built, collect, context, strings, write_words, TEST_WORDS};
    use crate::attribute::AttributeContext;

    struct Fixture {
        ctx: AttributeContext,
        _dir: tempfile::TempDir,
        words_path: String,
    }

    fn fixture() -> Fixture {
        let (dir, path) = write_words(&TEST_WORDS);
        Fixture {
            ctx: context(),
            _dir: dir,
            words_path: path.to_string_lossy().into_owned(),
        }
    }

    impl Fixture {
        fn file(&self) -> AttributeKind {
            AttributeKind::File { path: self.words_path.clone() }
        }

        fn chain(&self, nodes: Vec<(Node, Vec<AttributeKind>)>) -> Chain {
            let mut chain = Chain::new();
            for (mut node, kinds) in nodes {
                for kind in kinds {
                    node.add_attribute(built(&self.ctx, kind)).unwrap();
                }
                chain.add_node(node).unwrap();
            }
            chain
        }
    }

    fn first_upper() -> AttributeKind {
        AttributeKind::Case {
            target: CaseTarget::First,
            case: Some(LetterCase::Uppercase),
            idx: None,
        }
    }

    fn toggle(idx: usize) -> AttributeKind {
        AttributeKind::Case {
            target: CaseTarget::Toggle,
            case: None,
            idx: Some(idx),
        }
    }

    fn subst(position: MatchPosition, vals: &[&str], all_together: bool) -> AttributeKind {
        AttributeKind::Substitution {
            position,
            checked_vals: vals.iter().map(|v| v.to_string()).collect(),
            all_together,
        }
    }

    fn words(chain: &Chain) -> Vec<String> {
        collect(chain.get_words(false))
    }

    fn sorted(mut v: Vec<String>) -> Vec<String> {
        v.sort();
        v
    }

    /// Estimates match the materialised output exactly.
    fn assert_exact(chain: &Chain, result: &[String]) {
        assert_eq!(chain.count_words(), result.len() as u64);
        let text_len = result.iter().map(|w| w.len() as u64 + 1).sum::<u64>();
        assert_eq!(chain.count_bytes(), text_len);
    }

    #[test]
    fn file_chain() {
        let f = fixture();
        let chain = f.chain(vec![(Node::base(), vec![f.file()])]);
        let result = words(&chain);
        assert_eq!(result, TEST_WORDS);
        assert_exact(&chain, &result);
        assert_eq!(chain.count_bytes(), 32);
        assert!(chain.check_hashcat_compatible());
    }

    #[test]
    fn serial_mutator_chain() {
        let f = fixture();
        let chain = f.chain(vec![
            (Node::base(), vec![f.file()]),
            (Node::case(), vec![first_upper()]),
            (Node::case(), vec![toggle(3)]),
        ]);
        let result = words(&chain);
        assert_eq!(result, ["TesT1", "TesT word 2", "ThiRdtestword"]);
        assert_exact(&chain, &result);
        assert!(chain.check_hashcat_compatible());
    }

    #[test]
    fn parallel_mutator_chain() {
        let f = fixture();
        let chain = f.chain(vec![
            (Node::base(), vec![f.file()]),
            (Node::case(), vec![first_upper(), toggle(3)]),
        ]);
        assert_eq!(
            sorted(words(&chain)),
            sorted(
                ["Test1", "tesT1", "Test word 2", "tesT word 2", "THIrDTESTWORD", "Thirdtestword"]
                    .map(String::from)
                    .to_vec()
            )
        );
        assert_eq!(chain.count_words(), 6);
        assert_eq!(chain.count_bytes(), 64);
        assert!(chain.check_hashcat_compatible());
    }

    #[test]
    fn nothing_mutator_chain() {
        let f = fixture();
        let chain = f.chain(vec![
            (Node::base(), vec![f.file()]),
            (Node::case(), vec![first_upper(), AttributeKind::NothingMutator]),
        ]);
        let result = words(&chain);
        assert_eq!(
            result,
            ["Test1", "test1", "Test word 2", "test word 2", "Thirdtestword", "THIRDTESTWORD"]
        );
        assert_eq!(chain.count_words(), 6);
        assert_eq!(chain.count_bytes(), 64);
        assert_eq!(chain.get_rules().unwrap().to_string(), "c\n:\n");
    }

    #[test]
    fn long_hashcat_chain_words() {
        let f = fixture();
        let chain = f.chain(vec![
            (Node::base(), vec![strings(&["heLlo", "worLd"])]),
            (
                Node::case(),
                vec![
                    first_upper(),
                    AttributeKind::Case {
                        target: CaseTarget::All,
                        case: Some(LetterCase::Lowercase),
                        idx: None,
                    },
                    AttributeKind::NothingMutator,
                ],
            ),
            (
                Node::substitution(),
                vec![subst(MatchPosition::All, &["l -> i", "l -> 1", "d -> b"], false)],
            ),
            (Node::append(), vec![AttributeKind::Range { start: 0, end: 3, zfill: 0 }]),
        ]);
        let truth: BTreeSet<&str> = [
            "Heiio0", "heiio0", "Heiio1", "heiio1", "Heiio2", "heiio2", "He11o0", "he11o0", "He11o1",
            "he11o1", "He11o2", "he11o2", "Worid0", "worid0", "Worid1", "worid1", "Worid2", "worid2",
            "Wor1d0", "wor1d0", "Wor1d1", "wor1d1", "Wor1d2", "wor1d2", "Worlb0", "worLb0", "Worlb1",
            "worLb1", "Worlb2", "worLb2", "worlb0", "worlb1", "worlb2",
        ]
        .into_iter()
        .collect();
        let result = words(&chain);
        let distinct: BTreeSet<&str> = result.iter().map(String::as_str).collect();
        assert_eq!(distinct, truth);
        assert!(chain.check_hashcat_compatible());
    }

    #[test]
    fn add_chain() {
        let f = fixture();
        let chain = f.chain(vec![
            (Node::base(), vec![strings(&["heLlo", "worLd"])]),
            (Node::append(), vec![f.file()]),
            (Node::append(), vec![strings(&["A", "B"]), AttributeKind::NothingAdder]),
        ]);
        let result = words(&chain);
        assert_eq!(result.len(), 18);
        assert_eq!(result[..3], ["heLlotest1A", "heLlotest1B", "heLlotest1"]);
        assert_eq!(result[17], "worLdTHIRDTESTWORD");
        assert_exact(&chain, &result);
    }

    #[test]
    fn append_nothing_chain() {
        let f = fixture();
        let chain = f.chain(vec![
            (Node::base(), vec![strings(&["heLlo", "worLd"])]),
            (Node::append(), vec![strings(&["A", "B"]), AttributeKind::NothingAdder]),
        ]);
        let result = words(&chain);
        assert_eq!(result, ["heLloA", "heLloB", "heLlo", "worLdA", "worLdB", "worLd"]);
        assert_exact(&chain, &result);
    }

    #[test]
    fn substitution_estimates_are_heuristic() {
        let f = fixture();
        let chain = f.chain(vec![
            (Node::base(), vec![strings(&["hello", "world"])]),
            (Node::substitution(), vec![subst(MatchPosition::First, &["l -> i", "l -> 1"], false)]),
        ]);
        assert_eq!(sorted(words(&chain)), ["he1lo", "heilo", "wor1d", "worid"]);
        assert_eq!(chain.count_words(), 2);
        assert_eq!(chain.count_bytes(), 16);
        assert!(!chain.check_hashcat_compatible());

        let chain = f.chain(vec![
            (Node::base(), vec![strings(&["hello", "world"])]),
            (Node::substitution(), vec![subst(MatchPosition::All, &["l -> i", "o -> 0"], true)]),
        ]);
        assert_eq!(sorted(words(&chain)), ["heii0", "w0rid"]);
        assert_eq!(chain.count_words(), 2);
        assert_eq!(chain.count_bytes(), 12);
        assert!(chain.check_hashcat_compatible());
    }

    #[test]
    fn empty_stages_are_identity() {
        let f = fixture();
        for empty in [Node::substitution(), Node::append()] {
            let chain = f.chain(vec![
                (Node::base(), vec![strings(&["hello", "world"])]),
                (empty, vec![]),
                (Node::case(), vec![first_upper()]),
            ]);
            let result = words(&chain);
            assert_eq!(result, ["Hello", "World"]);
            assert_exact(&chain, &result);
            assert_eq!(chain.get_rules().unwrap().to_string(), ":c\n");
        }
    }

    #[test]
    fn nothing_in_base_node() {
        let f = fixture();
        let chain = f.chain(vec![
            (Node::base(), vec![AttributeKind::NothingAdder]),
            (Node::prepend(), vec![AttributeKind::Range { start: 5, end: 10, zfill: 0 }]),
        ]);
        let result = words(&chain);
        assert_eq!(result, ["5", "6", "7", "8", "9"]);
        assert_exact(&chain, &result);
        assert!(chain.check_hashcat_compatible());
    }

    #[test]
    fn basewords_only_streams_the_root() {
        let f = fixture();
        let chain = f.chain(vec![
            (Node::base(), vec![strings(&["hello", "world"])]),
            (Node::case(), vec![first_upper()]),
        ]);
        assert_eq!(collect(chain.get_words(true)), ["hello", "world"]);
        assert_eq!(chain.count_basewords(), (2, 12));
    }

    #[test]
    fn root_invariants() {
        let mut chain = Chain::new();
        assert!(matches!(chain.add_node(Node::case()), Err(ChainError::MisplacedNode(_))));
        chain.add_node(Node::base()).unwrap();
        assert!(matches!(chain.add_node(Node::base()), Err(ChainError::MisplacedNode(_))));
        chain.add_node(Node::case()).unwrap();
        assert!(chain.remove_node(0).is_err());
        assert!(chain.remove_node(1).is_ok());
        assert!(chain.remove_node(0).is_ok());
        assert!(chain.is_empty());
        assert!(chain.remove_node(0).is_err());
    }

    #[test]
    fn move_node_keeps_root_in_place() {
        let mut chain = Chain::new();
        chain.add_node(Node::base()).unwrap();
        chain.add_node(Node::case()).unwrap();
        chain.add_node(Node::append()).unwrap();
        assert!(chain.move_node(0, Direction::Down).is_err());
        assert!(chain.move_node(1, Direction::Up).is_err());
        assert!(chain.move_node(2, Direction::Down).is_err());
        assert_eq!(chain.move_node(1, Direction::Down).unwrap(), 2);
        assert_eq!(chain.nodes()[1].kind(), Node::append().kind());
        assert_eq!(chain.nodes()[2].kind(), Node::case().kind());
    }

    #[test]
    fn progress_tracks_root_reads() {
        let f = fixture();
        let chain = f.chain(vec![
            (Node::base(), vec![strings(&["a", "b", "c", "d"])]),
            (Node::append(), vec![strings(&["1", "2"])]),
        ]);
        let mut stream = chain.get_words(false);
        assert_eq!(chain.get_progress_percent(), 0);
        stream.next();
        assert_eq!(chain.get_progress_percent(), 25);
        let rest = stream.count();
        assert_eq!(rest, 7);
        assert_eq!(chain.get_progress_percent(), 100);
    }

    #[test]
    fn attribute_edits_go_through_the_chain() {
        let f = fixture();
        let mut chain = f.chain(vec![(Node::base(), vec![strings(&["a"])])]);
        chain.add_attribute(0, built(&f.ctx, strings(&["b"]))).unwrap();
        assert!(matches!(
            chain.add_attribute(0, built(&f.ctx, strings(&["b"]))),
            Err(ChainError::DuplicateAttribute(_))
        ));
        assert_eq!(chain.count_words(), 2);
        chain.remove_attribute(0, 0).unwrap();
        assert_eq!(words(&chain), ["b"]);
        assert!(chain.remove_attribute(0, 5).is_err());
        assert!(chain.add_attribute(4, built(&f.ctx, strings(&["c"]))).is_err());
    }

    #[test]
    fn missing_file_blocks_processing() {
        let f = fixture();
        let chain = f.chain(vec![(
            Node::base(),
            vec![AttributeKind::File { path: "/no/such/dictionary.txt".into() }],
        )]);
        assert_eq!(chain.file_errors().len(), 1);
        assert_eq!(chain.check_files().len(), 1);
        let mut stream = chain.get_words(false);
        assert!(matches!(stream.next(), Some(Err(ChainError::StreamInterrupted { .. }))));
    }
}
