//! Calendar enumeration for date-range attributes.
//!
//! A format is two or three of the tokens `mm`, `dd`, `yy`, `yyyy`, e.g.
//! `mmddyyyy`, `yymmdd`, `mmyy`. Years always render with two digits at
//! least; months and days are zero-padded only on request. Formats that map
//! distinct dates to the same text (`mmdd` across several years, or
//! `1/11` and `11/1` without padding) keep only the first occurrence.
use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::background::CancelToken;
use crate::error::ChainError;

static FORMAT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:mm|dd|yyyy|yy){2,3}$").expect("valid date format regex"));
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"mm|dd|yyyy|yy").expect("valid date token regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Month,
    Day,
    Year,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFormat {
    parts: Vec<Part>,
    four_digit_year: bool,
    zero_padding: bool,
}

/// Precomputed, de-duplicated date strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateList {
    pub words: Vec<String>,
    pub bytes: u64,
}

impl DateFormat {
    pub fn parse(format: &str, zero_padding: bool) -> Result<Self, ChainError> {
        let invalid = || ChainError::InvalidAttribute(format!("unsupported date format: {format:?}"));
        if !FORMAT_RE.is_match(format) {
            return Err(invalid());
        }
        let mut parts = Vec::new();
        let mut four_digit_year = false;
        for token in TOKEN_RE.find_iter(format) {
            let part = match token.as_str() {
                "mm" => Part::Month,
                "dd" => Part::Day,
                "yyyy" => {
                    four_digit_year = true;
                    Part::Year
                }
                _ => Part::Year,
            };
            if parts.contains(&part) {
                return Err(invalid());
            }
            parts.push(part);
        }
        if !parts.contains(&Part::Month) {
            return Err(invalid());
        }
        Ok(Self {
            parts,
            four_digit_year,
            zero_padding,
        })
    }

    fn has(&self, part: Part) -> bool {
        self.parts.contains(&part)
    }

    fn render(&self, year: i32, month: u32, day: u32) -> String {
        let mut out = String::with_capacity(8);
        for part in &self.parts {
            let piece = match part {
                Part::Year => format!("{:02}", year),
                Part::Month if self.zero_padding => format!("{:02}", month),
                Part::Month => month.to_string(),
                Part::Day if self.zero_padding => format!("{:02}", day),
                Part::Day => day.to_string(),
            };
            out.push_str(&piece);
        }
        out
    }

    /// Enumerate every date in `[start_year, end_year)`, polling `cancel`
    /// once per calendar day. Returns `None` when cancelled.
    pub fn enumerate(&self, start_year: i32, end_year: i32, cancel: &CancelToken) -> Option<DateList> {
        let has_day = self.has(Part::Day);
        let mut seen = HashSet::new();
        let mut list = DateList::default();
        let mut push = |date: String| {
            if seen.insert(date.clone()) {
                list.bytes += date.len() as u64;
                list.words.push(date);
            }
        };
        for year in start_year..end_year {
            if cancel.is_cancelled() {
                return None;
            }
            let display_year = if self.four_digit_year {
                year
            } else {
                year.rem_euclid(100)
            };
            for month in 1..=12 {
                if !has_day {
                    push(self.render(display_year, month, 1));
                    continue;
                }
                for day in 1..=31 {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    if NaiveDate::from_ymd_opt(year, month, day).is_none() {
                        break;
                    }
                    push(self.render(display_year, month, day));
                }
            }
        }
        Some(list)
    }
}
