//! Compile a chain into hashcat rule lines.
//!
//! Each line is one path through the chain: a token per mutate attribute,
//! and one `$c` (append) or `^c` (prepend) token per character of every word
//! an add attribute produces. Lines multiply node by node, so applying the
//! whole rule file to the base words reproduces the chain's output.
use std::fmt;

use crate::attribute::Role;
use crate::error::ChainError;
use crate::node::{Node, NodeKind};

const NOOP: &str = ":";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    lines: Vec<String>,
}

impl RuleSet {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// One rule per line, newline-terminated.
impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

type Lines = Vec<Vec<String>>;

fn extended(lines: &Lines, tokens: &[String]) -> impl Iterator<Item = Vec<String>> {
    lines.iter().map(move |line| {
        let mut line = line.clone();
        line.extend_from_slice(tokens);
        line
    })
}

/// Walk `nodes` in order. The root contributes no tokens. Any later node
/// with a pending count is refused as [`ChainError::StillCalculating`].
pub fn compile(nodes: &[Node]) -> Result<RuleSet, ChainError> {
    let mut lines: Lines = vec![Vec::new()];
    let noop = [NOOP.to_string()];
    for node in nodes {
        if !matches!(node.kind(), NodeKind::Base) && node.is_calculating() {
            return Err(ChainError::StillCalculating);
        }
        let attrs = node.attributes();
        lines = match node.kind() {
            NodeKind::Base => vec![Vec::new()],
            _ if attrs.is_empty() => extended(&lines, &noop).collect(),
            NodeKind::Mutate { .. } => {
                let mut next = Vec::new();
                for attr in attrs {
                    for token in attr.rule_tokens() {
                        next.extend(extended(&lines, std::slice::from_ref(&token)));
                    }
                }
                next
            }
            NodeKind::Add { prepend } => {
                let mut next = Vec::new();
                for attr in attrs {
                    if attr.role() == Role::NoAddition {
                        next.extend(extended(&lines, &noop));
                        continue;
                    }
                    for word in attr.produce(Box::new(std::iter::empty())) {
                        let tokens = add_tokens(&word?, prepend);
                        next.extend(extended(&lines, &tokens));
                    }
                }
                next
            }
        };
    }
    Ok(RuleSet {
        lines: lines.into_iter().map(|line| line.concat()).collect(),
    })
}

/// `^` inserts at the front, so prepended words are spelled back to front.
fn add_tokens(word: &str, prepend: bool) -> Vec<String> {
    if prepend {
        word.chars().rev().map(|c| format!("^{c}")).collect()
    } else {
        word.chars().map(|c| format!("${c}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::attribute::{Attribute, AttributeKind};
    use crate::chain::Chain;
    use crate::mutation::{CaseTarget, LetterCase, MatchPosition};
    use crate::test_utils::{built, collect, context, strings, write_words, TEST_WORDS};

    fn node_with(mut node: Node, kinds: Vec<AttributeKind>) -> Node {
        let ctx = context();
        for kind in kinds {
            node.add_attribute(built(&ctx, kind)).unwrap();
        }
        node
    }

    fn case(target: CaseTarget, case: Option<LetterCase>, idx: Option<usize>) -> AttributeKind {
        AttributeKind::Case { target, case, idx }
    }

    fn subst(position: MatchPosition, vals: &[&str], all_together: bool) -> AttributeKind {
        AttributeKind::Substitution {
            position,
            checked_vals: vals.iter().map(|v| v.to_string()).collect(),
            all_together,
        }
    }

    #[test]
    fn long_chain_multiplies_lines() {
        let nodes = vec![
            node_with(Node::base(), vec![strings(&["heLlo", "worLd"])]),
            node_with(
                Node::case(),
                vec![
                    case(CaseTarget::First, Some(LetterCase::Uppercase), None),
                    case(CaseTarget::All, Some(LetterCase::Lowercase), None),
                    AttributeKind::NothingMutator,
                ],
            ),
            node_with(
                Node::substitution(),
                vec![subst(MatchPosition::All, &["l -> i", "l -> 1", "d -> b"], false)],
            ),
            node_with(Node::append(), vec![AttributeKind::Range { start: 0, end: 3, zfill: 0 }]),
        ];
        let rules = compile(&nodes).unwrap();
        assert_eq!(rules.len(), 27);
        insta::assert_snapshot!(rules.to_string().trim_end(), @r"
csli$0
lsli$0
:sli$0
csl1$0
lsl1$0
:sl1$0
csdb$0
lsdb$0
:sdb$0
csli$1
lsli$1
:sli$1
csl1$1
lsl1$1
:sl1$1
csdb$1
lsdb$1
:sdb$1
csli$2
lsli$2
:sli$2
csl1$2
lsl1$2
:sl1$2
csdb$2
lsdb$2
:sdb$2
");
    }

    #[test]
    fn add_chain_spells_out_words() {
        let (_dir, path) = write_words(&TEST_WORDS);
        let nodes = vec![
            node_with(Node::base(), vec![strings(&["heLlo", "worLd"])]),
            node_with(
                Node::append(),
                vec![AttributeKind::File { path: path.to_string_lossy().into() }],
            ),
            node_with(
                Node::append(),
                vec![strings(&["A", "B"]), AttributeKind::NothingAdder],
            ),
        ];
        let rules = compile(&nodes).unwrap();
        insta::assert_snapshot!(rules.to_string().trim_end(), @r"
$t$e$s$t$1$A
$t$e$s$t$ $w$o$r$d$ $2$A
$T$H$I$R$D$T$E$S$T$W$O$R$D$A
$t$e$s$t$1$B
$t$e$s$t$ $w$o$r$d$ $2$B
$T$H$I$R$D$T$E$S$T$W$O$R$D$B
$t$e$s$t$1:
$t$e$s$t$ $w$o$r$d$ $2:
$T$H$I$R$D$T$E$S$T$W$O$R$D:
");
    }

    #[test]
    fn short_chains() {
        let base = || node_with(Node::base(), vec![strings(&["hello", "world"])]);

        let nodes = vec![
            base(),
            node_with(Node::substitution(), vec![subst(MatchPosition::All, &["l -> i", "o -> 0"], true)]),
        ];
        assert_eq!(compile(&nodes).unwrap().to_string(), "sliso0\n");

        let nodes = vec![base(), node_with(Node::case(), vec![case(CaseTarget::Toggle, None, Some(3))])];
        assert_eq!(compile(&nodes).unwrap().to_string(), "T3\n");

        let nodes = vec![base(), Node::substitution()];
        assert_eq!(compile(&nodes).unwrap().to_string(), ":\n");

        let nodes = vec![
            base(),
            Node::append(),
            node_with(Node::case(), vec![case(CaseTarget::First, Some(LetterCase::Uppercase), None)]),
        ];
        assert_eq!(compile(&nodes).unwrap().to_string(), ":c\n");

        let nodes = vec![
            base(),
            node_with(Node::append(), vec![strings(&["A", "B"]), AttributeKind::NothingAdder]),
        ];
        assert_eq!(compile(&nodes).unwrap().to_string(), "$A\n$B\n:\n");
    }

    #[test]
    fn prepend_tokens_run_back_to_front() {
        let nodes = vec![
            node_with(Node::base(), vec![strings(&["x"])]),
            node_with(Node::prepend(), vec![strings(&["ab"])]),
        ];
        assert_eq!(compile(&nodes).unwrap().to_string(), "^b^a\n");
    }

    #[test]
    fn root_only_chain_is_a_single_empty_rule() {
        let nodes = vec![node_with(Node::base(), vec![strings(&["x"])])];
        let rules = compile(&nodes).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.to_string(), "\n");
    }

    #[test]
    fn missing_add_file_is_an_error() {
        let nodes = vec![
            node_with(Node::base(), vec![strings(&["x"])]),
            node_with(
                Node::append(),
                vec![AttributeKind::File { path: "/no/such/words.txt".into() }],
            ),
        ];
        assert!(matches!(compile(&nodes), Err(ChainError::StreamInterrupted { .. })));
    }

    #[test]
    fn pending_counts_are_refused() {
        let ctx = context();
        let mut append = Node::append();
        append
            .add_attribute(
                Attribute::build(
                    "",
                    AttributeKind::DateRange {
                        start_year: -200_000,
                        end_year: 200_000,
                        format: "yyyymmdd".into(),
                        zero_padding: true,
                    },
                    &ctx,
                )
                .unwrap(),
            )
            .unwrap();
        let nodes = vec![node_with(Node::base(), vec![strings(&["x"])]), append];
        assert!(matches!(compile(&nodes), Err(ChainError::StillCalculating)));
    }

    /// Apply one compiled rule line to `word` the way hashcat does, for the
    /// tokens `compile` emits.
    fn apply_rule(rule: &str, word: &str) -> String {
        let mut chars: Vec<char> = word.chars().collect();
        let mut tokens = rule.chars();
        while let Some(op) = tokens.next() {
            let mut operand = || tokens.next().expect("rule token is missing its operand");
            match op {
                ':' => {}
                'c' | 'C' => {
                    let first_upper = op == 'c';
                    for (i, c) in chars.iter_mut().enumerate() {
                        *c = if (i == 0) == first_upper {
                            c.to_ascii_uppercase()
                        } else {
                            c.to_ascii_lowercase()
                        };
                    }
                }
                'u' => chars.iter_mut().for_each(|c| *c = c.to_ascii_uppercase()),
                'l' => chars.iter_mut().for_each(|c| *c = c.to_ascii_lowercase()),
                'T' => {
                    let pos = operand().to_digit(36).expect("toggle position") as usize;
                    if let Some(c) = chars.get_mut(pos) {
                        *c = if c.is_ascii_uppercase() {
                            c.to_ascii_lowercase()
                        } else {
                            c.to_ascii_uppercase()
                        };
                    }
                }
                's' => {
                    let (from, to) = (operand(), operand());
                    chars.iter_mut().filter(|c| **c == from).for_each(|c| *c = to);
                }
                '$' => chars.push(operand()),
                '^' => chars.insert(0, operand()),
                other => panic!("unexpected rule token {other:?} in {rule:?}"),
            }
        }
        chars.into_iter().collect()
    }

    fn chain_of(nodes: Vec<Node>) -> Chain {
        let mut chain = Chain::new();
        for node in nodes {
            chain.add_node(node).unwrap();
        }
        chain
    }

    /// Every word the chain streams is some rule applied to some base word.
    fn assert_rules_reproduce_words(chain: &Chain) {
        let basewords = collect(chain.get_words(true));
        let rules = chain.get_rules().unwrap();
        let replayed: BTreeSet<String> = rules
            .lines()
            .iter()
            .flat_map(|rule| basewords.iter().map(move |word| apply_rule(rule, word)))
            .collect();
        for word in collect(chain.get_words(false)) {
            assert!(replayed.contains(&word), "{word:?} is not reproduced by the rules");
        }
    }

    #[test]
    fn rules_reproduce_the_chain_output() {
        let (_dir, path) = write_words(&TEST_WORDS);
        let file = || AttributeKind::File { path: path.to_string_lossy().into() };
        let base = || node_with(Node::base(), vec![strings(&["heLlo", "worLd"])]);

        assert_rules_reproduce_words(&chain_of(vec![
            base(),
            node_with(
                Node::case(),
                vec![
                    case(CaseTarget::First, Some(LetterCase::Uppercase), None),
                    case(CaseTarget::All, Some(LetterCase::Lowercase), None),
                    AttributeKind::NothingMutator,
                ],
            ),
            node_with(
                Node::substitution(),
                vec![subst(MatchPosition::All, &["l -> i", "l -> 1", "d -> b"], false)],
            ),
            node_with(Node::append(), vec![AttributeKind::Range { start: 0, end: 3, zfill: 0 }]),
        ]));

        assert_rules_reproduce_words(&chain_of(vec![
            base(),
            node_with(Node::append(), vec![file()]),
            node_with(Node::append(), vec![strings(&["A", "B"]), AttributeKind::NothingAdder]),
        ]));

        assert_rules_reproduce_words(&chain_of(vec![
            base(),
            node_with(Node::append(), vec![strings(&["A", "B"]), AttributeKind::NothingAdder]),
        ]));

        assert_rules_reproduce_words(&chain_of(vec![
            node_with(Node::base(), vec![file()]),
            node_with(
                Node::case(),
                vec![case(CaseTarget::First, Some(LetterCase::Uppercase), None)],
            ),
            node_with(Node::case(), vec![case(CaseTarget::Toggle, None, Some(3))]),
            node_with(Node::prepend(), vec![strings(&["ab", "7"])]),
        ]));
    }
}
