//! Static reference data consumed by attributes and estimators.
//!
//! Tables are built once by [`ReferenceTables::load`] and shared read-only
//! behind an `Arc` afterwards.
//!
//! - `Letter_Stats.txt`: `letter,percent%` rows, the share of dictionary words
//!   containing the letter at least once.
//! - `{City,State}-{Area,Zip}.psv`: `location|code,code,...` rows. A location
//!   listed on several rows accumulates all of their codes.
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

pub const LETTER_STATS_FILE: &str = "Letter_Stats.txt";

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse {name}: {source}")]
    Csv { name: String, source: csv::Error },
    #[error("malformed row {row} in {name}: {reason}")]
    MalformedRow {
        name: String,
        row: usize,
        reason: String,
    },
}

/// Letter -> probability that a dictionary word contains it.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CharFrequencyTable {
    freqs: HashMap<String, f64>,
}

impl CharFrequencyTable {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            freqs: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn parse(name: &str, contents: &str) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_reader(contents.as_bytes());
        let mut freqs = HashMap::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|source| TableError::Csv {
                name: name.to_string(),
                source,
            })?;
            let malformed = |reason: &str| TableError::MalformedRow {
                name: name.to_string(),
                row: row + 1,
                reason: reason.to_string(),
            };
            if record.len() != 2 {
                return Err(malformed("expected `letter,percent%`"));
            }
            let percent = record[1]
                .strip_suffix('%')
                .ok_or_else(|| malformed("percentage must end with %"))?
                .parse::<f64>()
                .map_err(|_| malformed("percentage is not a number"))?;
            freqs.insert(record[0].to_string(), percent / 100.0);
        }
        Ok(Self { freqs })
    }

    /// Frequency of `letter`, or 0 for letters missing from the table.
    pub fn frequency(&self, letter: &str) -> f64 {
        self.freqs.get(letter).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.freqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.freqs.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocationType {
    City,
    State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeType {
    Area,
    Zip,
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationType::City => write!(f, "City"),
            LocationType::State => write!(f, "State"),
        }
    }
}

impl fmt::Display for CodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeType::Area => write!(f, "Area"),
            CodeType::Zip => write!(f, "Zip"),
        }
    }
}

pub fn location_file_name(location_type: LocationType, code_type: CodeType) -> String {
    format!("{}-{}.psv", location_type, code_type)
}

type CodeMap = HashMap<String, Vec<String>>;

/// Area and ZIP codes keyed by city (`Boston, MA`) or state (`MA`).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LocationCodeTable {
    tables: HashMap<(LocationType, CodeType), CodeMap>,
}

impl LocationCodeTable {
    pub fn parse_codes(name: &str, contents: &str) -> Result<CodeMap, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(b'|')
            .quoting(false)
            .flexible(true)
            .from_reader(contents.as_bytes());
        let mut codes: CodeMap = HashMap::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|source| TableError::Csv {
                name: name.to_string(),
                source,
            })?;
            if record.len() != 2 {
                return Err(TableError::MalformedRow {
                    name: name.to_string(),
                    row: row + 1,
                    reason: "expected `location|code,code,...`".to_string(),
                });
            }
            codes
                .entry(record[0].to_string())
                .or_default()
                .extend(record[1].split(',').map(str::to_string));
        }
        Ok(codes)
    }

    pub fn insert(&mut self, location_type: LocationType, code_type: CodeType, codes: CodeMap) {
        self.tables.insert((location_type, code_type), codes);
    }

    /// Codes for `location`, in file order.
    pub fn codes(
        &self,
        location_type: LocationType,
        code_type: CodeType,
        location: &str,
    ) -> Option<&[String]> {
        self.tables
            .get(&(location_type, code_type))
            .and_then(|m| m.get(location))
            .map(Vec::as_slice)
    }

    /// Sorted location keys for one table, for menus and validation messages.
    pub fn locations(&self, location_type: LocationType, code_type: CodeType) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .tables
            .get(&(location_type, code_type))
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default();
        keys.sort_unstable();
        keys
    }
}

/// All reference data, loaded once at startup.
#[derive(Debug, Default, Clone)]
pub struct ReferenceTables {
    pub char_freq: CharFrequencyTable,
    pub locations: LocationCodeTable,
}

const LOCATION_TABLES: [(LocationType, CodeType); 4] = [
    (LocationType::City, CodeType::Area),
    (LocationType::City, CodeType::Zip),
    (LocationType::State, CodeType::Area),
    (LocationType::State, CodeType::Zip),
];

/// Read a table file, treating a missing file as empty.
fn read_optional(path: &Path) -> Result<Option<String>, TableError> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("reference table not found: {} (using empty table)", path.display());
            Ok(None)
        }
        Err(source) => Err(TableError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

impl ReferenceTables {
    /// Load every table under `data_dir`. The letter statistics and the four
    /// location tables are read in parallel.
    pub fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self, TableError> {
        let dir = data_dir.as_ref();
        let (char_freq, locations) = rayon::join(
            || -> Result<CharFrequencyTable, TableError> {
                match read_optional(&dir.join(LETTER_STATS_FILE))? {
                    Some(contents) => CharFrequencyTable::parse(LETTER_STATS_FILE, &contents),
                    None => Ok(CharFrequencyTable::default()),
                }
            },
            || -> Result<LocationCodeTable, TableError> {
                use rayon::prelude::*;
                let loaded: Vec<((LocationType, CodeType), CodeMap)> = LOCATION_TABLES
                    .par_iter()
                    .map(|&(lt, ct)| -> Result<_, TableError> {
                        let name = location_file_name(lt, ct);
                        let codes = match read_optional(&dir.join(&name))? {
                            Some(contents) => LocationCodeTable::parse_codes(&name, &contents)?,
                            None => CodeMap::new(),
                        };
                        Ok(((lt, ct), codes))
                    })
                    .collect::<Result<_, TableError>>()?;
                let mut table = LocationCodeTable::default();
                for ((lt, ct), codes) in loaded {
                    table.insert(lt, ct, codes);
                }
                Ok(table)
            },
        );
        let tables = Self {
            char_freq: char_freq?,
            locations: locations?,
        };
        debug!(
            "reference tables loaded from {} ({} letter frequencies)",
            dir.display(),
            tables.char_freq.len()
        );
        Ok(tables)
    }
}
