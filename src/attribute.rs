//! Attributes: the leaves of a chain that produce or transform words.
//!
//! [`AttributeKind`] holds an attribute's constructor parameters. It is what
//! gets persisted and what duplicate detection compares. [`Attribute`] is the
//! live object built from a kind: it owns precomputed data, the background
//! count for file and date sources, and a progress counter.
//!
//! Every attribute exposes the same capability set:
//!
//! - [`Attribute::produce`] lazily streams words given an upstream stream;
//! - [`Attribute::count_words`] / [`Attribute::count_bytes`] estimate output;
//! - [`Attribute::is_rule_compatible`] / [`Attribute::rule_tokens`] describe
//!   the attribute in hashcat's rule grammar.
use std::fmt;
use std::fs;
use std::iter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::background::{BackgroundCount, CountTracker};
use crate::dates::{DateFormat, DateList};
use crate::error::ChainError;
use crate::io::{self, DEFAULT_MMAP_THRESHOLD_BYTES};
use crate::mutation::{CaseRule, CaseTarget, LetterCase, MatchPosition, SubstitutionRule};
use crate::tables::{CodeType, LocationType, ReferenceTables};

/// Placeholder in file paths that expands to the data directory.
pub const DATA_DIR_VAR: &str = "$DATA_DIR";

pub type Word = Result<String, ChainError>;
pub type WordStream<'a> = Box<dyn Iterator<Item = Word> + 'a>;

pub fn empty_stream<'a>() -> WordStream<'a> {
    Box::new(iter::empty())
}

/// Constructor parameters of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "class_name")]
pub enum AttributeKind {
    /// One word per line of a file.
    #[serde(rename = "FileAttr")]
    File { path: String },
    #[serde(rename = "StringListAttr")]
    StringList { strings: Vec<String> },
    /// Integers in `[start, end)`, left-padded with zeros to `zfill` digits.
    #[serde(rename = "RangeAttr")]
    Range {
        start: i64,
        end: i64,
        #[serde(default)]
        zfill: usize,
    },
    /// Dates in `[start_year, end_year)` rendered with `format`.
    #[serde(rename = "DateRangeAttr")]
    DateRange {
        start_year: i32,
        end_year: i32,
        format: String,
        zero_padding: bool,
    },
    #[serde(rename = "LocationCodeAttr")]
    LocationCode {
        code_type: CodeType,
        location: String,
        location_type: LocationType,
    },
    #[serde(rename = "NothingMutatorAttr")]
    NothingMutator,
    #[serde(rename = "NothingAdderAttr")]
    NothingAdder,
    #[serde(rename = "CaseAttr")]
    Case {
        #[serde(rename = "type_")]
        target: CaseTarget,
        #[serde(default)]
        case: Option<LetterCase>,
        #[serde(default)]
        idx: Option<usize>,
    },
    #[serde(rename = "SubstitutionAttr")]
    Substitution {
        #[serde(rename = "type_")]
        position: MatchPosition,
        checked_vals: Vec<String>,
        all_together: bool,
    },
}

/// What part an attribute can play inside a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Produces words of its own.
    Source,
    NoAddition,
    NoMutation,
    Case,
    Substitution,
}

impl AttributeKind {
    pub fn role(&self) -> Role {
        match self {
            AttributeKind::File { .. }
            | AttributeKind::StringList { .. }
            | AttributeKind::Range { .. }
            | AttributeKind::DateRange { .. }
            | AttributeKind::LocationCode { .. } => Role::Source,
            AttributeKind::NothingAdder => Role::NoAddition,
            AttributeKind::NothingMutator => Role::NoMutation,
            AttributeKind::Case { .. } => Role::Case,
            AttributeKind::Substitution { .. } => Role::Substitution,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AttributeKind::File { .. } => "file",
            AttributeKind::StringList { .. } => "string list",
            AttributeKind::Range { .. } => "range",
            AttributeKind::DateRange { .. } => "date range",
            AttributeKind::LocationCode { .. } => "location code",
            AttributeKind::NothingMutator => "no mutation",
            AttributeKind::NothingAdder => "no addition",
            AttributeKind::Case { .. } => "case",
            AttributeKind::Substitution { .. } => "substitution",
        }
    }

    /// Display label used when none is given.
    pub fn describe(&self) -> String {
        match self {
            AttributeKind::File { path } => Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.clone()),
            AttributeKind::StringList { strings } => format!("{} custom words", strings.len()),
            AttributeKind::Range { start, end, zfill } if *zfill > 0 => {
                format!("Numbers {start}-{} (zero-filled to {zfill})", end.saturating_sub(1))
            }
            AttributeKind::Range { start, end, .. } => format!("Numbers {start}-{}", end.saturating_sub(1)),
            AttributeKind::DateRange {
                start_year,
                end_year,
                format,
                ..
            } => format!("Dates {start_year}-{} ({format})", end_year.saturating_sub(1)),
            AttributeKind::LocationCode {
                code_type,
                location,
                ..
            } => format!("{code_type} codes: {location}"),
            AttributeKind::NothingMutator => "No Mutation".to_string(),
            AttributeKind::NothingAdder => "Nothing".to_string(),
            AttributeKind::Case { target, case, idx } => match (target, case, idx) {
                (CaseTarget::Toggle, _, Some(i)) => format!("Toggle: index {i}"),
                (_, Some(LetterCase::Lowercase), _) => format!("{target:?}: Lowercase"),
                _ => format!("{target:?}: Uppercase"),
            },
            AttributeKind::Substitution {
                position,
                checked_vals,
                ..
            } => format!("{position:?}: {}", checked_vals.join(", ")),
        }
    }
}

/// Shared services an attribute needs at construction time.
#[derive(Debug, Clone)]
pub struct AttributeContext {
    pub tables: Arc<ReferenceTables>,
    pub tracker: Arc<CountTracker>,
    pub data_dir: PathBuf,
    pub mmap_threshold: u64,
}

impl AttributeContext {
    pub fn new(tables: Arc<ReferenceTables>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            tables,
            tracker: CountTracker::new(),
            data_dir: data_dir.into(),
            mmap_threshold: DEFAULT_MMAP_THRESHOLD_BYTES,
        }
    }

    pub fn expand_path(&self, path: &str) -> PathBuf {
        PathBuf::from(path.replace(DATA_DIR_VAR, &self.data_dir.to_string_lossy()))
    }
}

type LineCount = Result<u64, String>;

#[derive(Debug)]
struct FileSource {
    path: PathBuf,
    size: u64,
    mmap_threshold: u64,
    lines: Option<BackgroundCount<LineCount>>,
    error: OnceLock<String>,
}

impl FileSource {
    fn open(path: PathBuf, ctx: &AttributeContext) -> Self {
        let threshold = ctx.mmap_threshold;
        match fs::metadata(&path) {
            Ok(meta) => {
                let worker_path = path.clone();
                let lines = BackgroundCount::spawn(
                    &ctx.tracker,
                    format!("line count {}", path.display()),
                    move |cancel| match io::count_lines(&worker_path, threshold, cancel) {
                        Ok(Some(n)) => Some(Ok(n)),
                        Ok(None) => None,
                        Err(e) => Some(Err(format!("{e:#}"))),
                    },
                );
                Self {
                    path,
                    size: meta.len(),
                    mmap_threshold: threshold,
                    lines: Some(lines),
                    error: OnceLock::new(),
                }
            }
            Err(e) => {
                let error = OnceLock::new();
                let _ = error.set(e.to_string());
                Self {
                    path,
                    size: 0,
                    mmap_threshold: threshold,
                    lines: None,
                    error,
                }
            }
        }
    }

    fn line_count(&self) -> Option<u64> {
        match self.lines.as_ref().and_then(|l| l.result()) {
            Some(Ok(n)) => Some(*n),
            _ => None,
        }
    }

    fn error(&self) -> Option<&str> {
        if let Some(e) = self.error.get() {
            return Some(e);
        }
        match self.lines.as_ref().and_then(|l| l.result()) {
            Some(Err(e)) => Some(e),
            _ => None,
        }
    }

    /// File size minus the newlines between lines. Until the lines are
    /// counted this is the raw file size.
    fn bytes(&self) -> u64 {
        if self.error().is_some() {
            return 0;
        }
        match self.line_count() {
            Some(lines) => self.size.saturating_sub(lines.saturating_sub(1)),
            None => self.size,
        }
    }

    fn interrupted(&self, reason: impl fmt::Display) -> ChainError {
        let reason = reason.to_string();
        let _ = self.error.set(reason.clone());
        ChainError::StreamInterrupted {
            path: self.path.clone(),
            reason,
        }
    }
}

#[derive(Debug)]
enum Runtime {
    File(FileSource),
    Words { words: Vec<String>, bytes: u64 },
    Range {
        start: i64,
        end: i64,
        zfill: usize,
        bytes: u64,
    },
    Dates(BackgroundCount<DateList>),
    NoMutation,
    NoAddition,
    Case(CaseRule),
    Substitution(SubstitutionRule),
}

/// A live attribute inside a node.
#[derive(Debug)]
pub struct Attribute {
    label: String,
    kind: AttributeKind,
    runtime: Runtime,
    words_read: AtomicU64,
}

/// Attributes are equal when their constructor parameters are.
impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Attribute {
    /// Build an attribute. File and date sources start their background
    /// count here.
    pub fn build(
        label: impl Into<String>,
        kind: AttributeKind,
        ctx: &AttributeContext,
    ) -> Result<Self, ChainError> {
        let runtime = match &kind {
            AttributeKind::File { path } => Runtime::File(FileSource::open(ctx.expand_path(path), ctx)),
            AttributeKind::StringList { strings } => Runtime::Words {
                words: strings.clone(),
                bytes: strings.iter().map(|s| s.len() as u64).sum(),
            },
            AttributeKind::Range { start, end, zfill } => Runtime::Range {
                start: *start,
                end: *end,
                zfill: *zfill,
                bytes: range_bytes(*start, *end, *zfill),
            },
            AttributeKind::DateRange {
                start_year,
                end_year,
                format,
                zero_padding,
            } => {
                let date_format = DateFormat::parse(format, *zero_padding)?;
                let (start, end) = (*start_year, *end_year);
                Runtime::Dates(BackgroundCount::spawn(
                    &ctx.tracker,
                    format!("dates {start}-{end} {format}"),
                    move |cancel| date_format.enumerate(start, end, cancel),
                ))
            }
            AttributeKind::LocationCode {
                code_type,
                location,
                location_type,
            } => {
                let codes = ctx
                    .tables
                    .locations
                    .codes(*location_type, *code_type, location)
                    .ok_or_else(|| {
                        ChainError::InvalidAttribute(format!(
                            "no {code_type} codes for {location_type} {location:?}"
                        ))
                    })?;
                Runtime::Words {
                    words: codes.to_vec(),
                    bytes: codes.iter().map(|c| c.len() as u64).sum(),
                }
            }
            AttributeKind::NothingMutator => Runtime::NoMutation,
            AttributeKind::NothingAdder => Runtime::NoAddition,
            AttributeKind::Case { target, case, idx } => {
                Runtime::Case(CaseRule::new(*target, *case, *idx)?)
            }
            AttributeKind::Substitution {
                position,
                checked_vals,
                all_together,
            } => Runtime::Substitution(SubstitutionRule::new(
                *position,
                checked_vals,
                *all_together,
                &ctx.tables.char_freq,
            )?),
        };
        let label = label.into();
        let label = if label.is_empty() {
            kind.describe()
        } else {
            label
        };
        Ok(Self {
            label,
            kind,
            runtime,
            words_read: AtomicU64::new(0),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> &AttributeKind {
        &self.kind
    }

    pub fn role(&self) -> Role {
        self.kind.role()
    }

    /// Stream this attribute's words. Sources yield `upstream` unchanged and
    /// then their own words; rules transform each upstream word.
    pub fn produce<'a>(&'a self, upstream: WordStream<'a>) -> WordStream<'a> {
        match &self.runtime {
            Runtime::File(file) => Box::new(upstream.chain(self.file_words(file))),
            Runtime::Words { words, .. } => {
                Box::new(upstream.chain(words.iter().map(move |w| self.read(w.clone()))))
            }
            Runtime::Range {
                start, end, zfill, ..
            } => {
                let width = *zfill;
                Box::new(upstream.chain((*start..*end).map(move |i| self.read(format!("{i:0width$}")))))
            }
            Runtime::Dates(dates) => Box::new(
                upstream.chain(
                    dates
                        .result()
                        .into_iter()
                        .flat_map(|list| list.words.iter())
                        .map(move |w| self.read(w.clone())),
                ),
            ),
            Runtime::NoMutation => upstream,
            Runtime::NoAddition => Box::new(iter::once(Ok(String::new()))),
            Runtime::Case(rule) => Box::new(upstream.map(move |w| w.map(|w| rule.apply(&w)))),
            Runtime::Substitution(rule) => Box::new(upstream.flat_map(move |w| -> Vec<Word> {
                match w {
                    Ok(w) => rule.apply(&w).into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                }
            })),
        }
    }

    fn read(&self, word: String) -> Word {
        self.words_read.fetch_add(1, Ordering::Relaxed);
        Ok(word)
    }

    /// Lines of the file; a read failure is yielded once and ends the stream.
    fn file_words<'a>(&'a self, file: &'a FileSource) -> WordStream<'a> {
        match io::iter_lines_auto(&file.path, file.mmap_threshold) {
            Ok(lines) => Box::new(
                lines
                    .scan(false, move |failed, line| {
                        if *failed {
                            return None;
                        }
                        Some(match line {
                            Ok(line) => self.read(line),
                            Err(e) => {
                                *failed = true;
                                Err(file.interrupted(e))
                            }
                        })
                    }),
            ),
            Err(e) => Box::new(iter::once(Err(file.interrupted(format!("{e:#}"))))),
        }
    }

    /// Estimated number of words, given `prev_word_count` upstream words.
    pub fn count_words(&self, prev_word_count: u64) -> u64 {
        let own = match &self.runtime {
            Runtime::File(file) => file.line_count().unwrap_or(0),
            Runtime::Words { words, .. } => words.len() as u64,
            Runtime::Range { start, end, .. } => (i128::from(*end) - i128::from(*start)).max(0) as u64,
            Runtime::Dates(dates) => dates.result().map_or(0, |d| d.words.len() as u64),
            Runtime::NoAddition => 1,
            Runtime::NoMutation | Runtime::Case(_) | Runtime::Substitution(_) => 0,
        };
        prev_word_count.saturating_add(own)
    }

    /// Estimated output size in bytes, excluding newlines.
    pub fn count_bytes(&self, prev_byte_count: u64, _prev_word_count: u64) -> u64 {
        match &self.runtime {
            Runtime::File(file) => file.bytes(),
            Runtime::Words { bytes, .. } | Runtime::Range { bytes, .. } => *bytes,
            Runtime::Dates(dates) => dates.result().map_or(0, |d| d.bytes),
            Runtime::NoMutation | Runtime::NoAddition | Runtime::Case(_) | Runtime::Substitution(_) => {
                prev_byte_count
            }
        }
    }

    pub fn is_rule_compatible(&self) -> bool {
        match &self.runtime {
            Runtime::Case(rule) => rule.rule_token().is_some(),
            Runtime::Substitution(rule) => rule.is_rule_compatible(),
            _ => true,
        }
    }

    /// Rule tokens for mutate-node attributes and the no-op identities.
    /// Sources have none; the rule compiler expands their words instead.
    pub fn rule_tokens(&self) -> Vec<String> {
        match &self.runtime {
            Runtime::NoMutation | Runtime::NoAddition => vec![":".to_string()],
            Runtime::Case(rule) => rule.rule_token().into_iter().collect(),
            Runtime::Substitution(rule) => rule.rule_tokens(),
            _ => Vec::new(),
        }
    }

    /// Substitution frequencies feeding the mutate-node estimate.
    pub fn substitution_frequencies(&self) -> Option<&[f64]> {
        match &self.runtime {
            Runtime::Substitution(rule) => Some(rule.frequencies()),
            _ => None,
        }
    }

    /// True while a background count has not produced its result.
    pub fn is_calculating(&self) -> bool {
        match &self.runtime {
            Runtime::File(file) => file.error().is_none() && file.lines.as_ref().is_some_and(|l| l.is_pending()),
            Runtime::Dates(dates) => dates.is_pending(),
            _ => false,
        }
    }

    pub fn file_error(&self) -> Option<ChainError> {
        match &self.runtime {
            Runtime::File(file) => file.error().map(|reason| ChainError::FileUnavailable {
                path: file.path.clone(),
                reason: reason.to_string(),
            }),
            _ => None,
        }
    }

    /// Re-check that a file source is still present. Errors stick until the
    /// attribute is replaced.
    pub fn check_file(&self) -> Option<ChainError> {
        if let Runtime::File(file) = &self.runtime {
            if let Err(e) = fs::metadata(&file.path) {
                let _ = file.error.set(e.to_string());
            }
        }
        self.file_error()
    }

    pub fn words_read(&self) -> u64 {
        self.words_read.load(Ordering::Relaxed)
    }

    pub fn reset_progress(&self) {
        self.words_read.store(0, Ordering::Relaxed);
    }

    /// Block until any background count finishes.
    pub fn wait(&mut self) {
        match &mut self.runtime {
            Runtime::File(FileSource { lines: Some(l), .. }) => l.wait(),
            Runtime::Dates(dates) => dates.wait(),
            _ => {}
        }
    }

    /// Cancel and join any background count.
    pub fn stop(&mut self) {
        match &mut self.runtime {
            Runtime::File(FileSource { lines: Some(l), .. }) => l.stop(),
            Runtime::Dates(dates) => dates.stop(),
            _ => {}
        }
    }
}

/// Total length of `{i:0zfill$}` over `[start, end)`, without iterating.
fn range_bytes(start: i64, end: i64, zfill: usize) -> u64 {
    let (start, end) = (i128::from(start), i128::from(end));
    let width = zfill as i128;
    let mut total: i128 = 0;
    // Magnitudes in [lo, hi) rendered with `extra` sign characters.
    let mut add_span = |lo: i128, hi: i128, extra: i128| {
        let mut bucket_lo = 0i128;
        for digits in 1..=20i128 {
            let bucket_hi = 10i128.pow(digits as u32);
            let from = lo.max(bucket_lo);
            let to = hi.min(bucket_hi);
            if from < to {
                total += (to - from) * (digits + extra).max(width);
            }
            bucket_lo = bucket_hi;
        }
    };
    if end > 0 && start < end {
        add_span(start.max(0), end, 0);
    }
    if start < 0 && start < end {
        let neg_end = end.min(0);
        add_span(1 - neg_end, 1 - start, 1);
    }
    total.max(0) as u64
}
