//! Character-level word transforms used by mutate nodes, and the rule tokens
//! that express them in hashcat's rule grammar.
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::ChainError;
use crate::tables::CharFrequencyTable;

/// Which letters a case rule touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseTarget {
    First,
    All,
    Toggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LetterCase {
    Uppercase,
    Lowercase,
}

/// Highest position expressible in a rule (`0-9`, then `A-Z`).
pub const MAX_RULE_POSITION: usize = 35;

/// Encode a character position the way hashcat's positional rules expect.
pub fn rule_position(idx: usize) -> Option<char> {
    match idx {
        0..=9 => char::from_digit(idx as u32, 10),
        10..=MAX_RULE_POSITION => char::from_u32('A' as u32 + (idx - 10) as u32),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseRule {
    /// First letter to `case`, the rest to the opposite case.
    First(LetterCase),
    All(LetterCase),
    /// Flip the case of the character at this index.
    Toggle(usize),
}

impl CaseRule {
    pub fn new(
        target: CaseTarget,
        case: Option<LetterCase>,
        idx: Option<usize>,
    ) -> Result<Self, ChainError> {
        let case = case.unwrap_or(LetterCase::Uppercase);
        match target {
            CaseTarget::First => Ok(CaseRule::First(case)),
            CaseTarget::All => Ok(CaseRule::All(case)),
            CaseTarget::Toggle => idx.map(CaseRule::Toggle).ok_or_else(|| {
                ChainError::InvalidAttribute("toggle case rule needs an index".to_string())
            }),
        }
    }

    pub fn apply(&self, word: &str) -> String {
        if word.is_empty() {
            return String::new();
        }
        match self {
            CaseRule::First(case) => {
                let mut chars = word.chars();
                let (head, tail) = match (chars.next(), case) {
                    (Some(c), LetterCase::Uppercase) => (
                        c.to_uppercase().collect::<String>(),
                        chars.as_str().to_lowercase(),
                    ),
                    (Some(c), LetterCase::Lowercase) => (
                        c.to_lowercase().collect::<String>(),
                        chars.as_str().to_uppercase(),
                    ),
                    (None, _) => return String::new(),
                };
                head + &tail
            }
            CaseRule::All(LetterCase::Uppercase) => word.to_uppercase(),
            CaseRule::All(LetterCase::Lowercase) => word.to_lowercase(),
            CaseRule::Toggle(idx) => word
                .chars()
                .enumerate()
                .map(|(i, c)| {
                    if i != *idx {
                        c.to_string()
                    } else if c.is_uppercase() {
                        c.to_lowercase().collect()
                    } else {
                        c.to_uppercase().collect()
                    }
                })
                .collect(),
        }
    }

    pub fn rule_token(&self) -> Option<String> {
        match self {
            CaseRule::First(LetterCase::Uppercase) => Some("c".to_string()),
            CaseRule::First(LetterCase::Lowercase) => Some("C".to_string()),
            CaseRule::All(LetterCase::Uppercase) => Some("u".to_string()),
            CaseRule::All(LetterCase::Lowercase) => Some("l".to_string()),
            CaseRule::Toggle(idx) => rule_position(*idx).map(|p| format!("T{p}")),
        }
    }
}

/// Where a substitution looks for its character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchPosition {
    /// First occurrence, scanning left to right.
    First,
    /// First occurrence, scanning right to left.
    Last,
    /// Every occurrence.
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubstitutionRule {
    position: MatchPosition,
    pairs: Vec<(String, String)>,
    all_together: bool,
    frequencies: Vec<f64>,
}

/// Split `old -> new` (spaces around the arrow optional).
pub fn parse_substitution(spec: &str) -> Result<(String, String), ChainError> {
    spec.split_once(" -> ")
        .or_else(|| spec.split_once("->"))
        .filter(|(original, _)| !original.is_empty())
        .map(|(o, r)| (o.to_string(), r.to_string()))
        .ok_or_else(|| ChainError::InvalidAttribute(format!("malformed substitution: {spec:?}")))
}

impl SubstitutionRule {
    pub fn new(
        position: MatchPosition,
        checked_vals: &[String],
        all_together: bool,
        char_freq: &CharFrequencyTable,
    ) -> Result<Self, ChainError> {
        let pairs = checked_vals
            .iter()
            .map(|s| parse_substitution(s))
            .collect::<Result<Vec<_>, _>>()?;
        // Together: probability that at least one of the characters occurs.
        let frequencies = if all_together {
            let combined = pairs.iter().fold(0.0, |acc, (original, _)| {
                acc + (1.0 - acc) * char_freq.frequency(original)
            });
            vec![combined]
        } else {
            pairs
                .iter()
                .map(|(original, _)| char_freq.frequency(original))
                .collect()
        };
        Ok(Self {
            position,
            pairs,
            all_together,
            frequencies,
        })
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    pub fn is_rule_compatible(&self) -> bool {
        self.position == MatchPosition::All
    }

    /// Transform one word. Matching is case-insensitive on the original
    /// character; replacements may be longer than one character.
    pub fn apply(&self, word: &str) -> Vec<String> {
        if word.is_empty() {
            return vec![String::new()];
        }
        let original: Vec<String> = word.chars().map(String::from).collect();
        let order: Vec<usize> = match self.position {
            MatchPosition::Last => (0..original.len()).rev().collect(),
            _ => (0..original.len()).collect(),
        };
        let mut cells = original.clone();
        let mut out = Vec::new();
        let mut found_any = false;

        for (from, to) in &self.pairs {
            let mut found = false;
            for &i in &order {
                if cells[i].to_lowercase() != *from {
                    continue;
                }
                cells[i] = to.clone();
                found = true;
                found_any = true;
                if self.position != MatchPosition::All {
                    if !self.all_together {
                        out.push(cells.concat());
                        cells = original.clone();
                    }
                    break;
                }
            }
            if self.position == MatchPosition::All && found && !self.all_together {
                out.push(cells.concat());
                cells = original.clone();
            }
        }

        if self.all_together {
            out.push(cells.concat());
        } else if !found_any {
            out.push(word.to_string());
        }
        out
    }

    /// `s<old><new>` per pair. Pairs that are not single characters on both
    /// sides are left out; together-mode joins the rest into one token.
    pub fn rule_tokens(&self) -> Vec<String> {
        let mut rules = Vec::new();
        for (from, to) in &self.pairs {
            if from.chars().count() != 1 || to.chars().count() != 1 {
                warn!(
                    "excluding multi-character substitution from hashcat rules: {:?} -> {:?}",
                    from, to
                );
                continue;
            }
            rules.push(format!("s{from}{to}"));
        }
        if self.all_together {
            vec![rules.concat()]
        } else {
            rules
        }
    }
}
