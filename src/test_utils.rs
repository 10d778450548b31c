use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use crate::attribute::{Attribute, AttributeContext, AttributeKind, WordStream};
use crate::tables::{CharFrequencyTable, CodeType, LocationCodeTable, LocationType, ReferenceTables};

pub const TEST_WORDS: [&str; 3] = ["test1", "test word 2", "THIRDTESTWORD"];

/// Small in-memory tables: a few letter frequencies and the DC codes.
pub fn tables() -> ReferenceTables {
    let char_freq = CharFrequencyTable::from_pairs([("e", 0.6), ("l", 0.45), ("o", 0.4), ("d", 0.3)]);
    let mut locations = LocationCodeTable::default();
    let zips = LocationCodeTable::parse_codes("zip", "DC|20001,20002,20003\n")
        .expect("valid zip fixture");
    locations.insert(LocationType::State, CodeType::Zip, zips);
    let cities = LocationCodeTable::parse_codes("city zip", "Washington, DC|20001,20002\n")
        .expect("valid city fixture");
    locations.insert(LocationType::City, CodeType::Zip, cities);
    let areas = LocationCodeTable::parse_codes("area", "DC|202\n").expect("valid area fixture");
    locations.insert(LocationType::State, CodeType::Area, areas);
    ReferenceTables {
        char_freq,
        locations,
    }
}

pub fn context() -> AttributeContext {
    AttributeContext::new(Arc::new(tables()), std::env::temp_dir())
}

/// Build an attribute and wait for its background count.
pub fn built(ctx: &AttributeContext, kind: AttributeKind) -> Attribute {
    let mut attr = Attribute::build("", kind, ctx).expect("attribute builds");
    attr.wait();
    attr
}

pub fn strings(words: &[&str]) -> AttributeKind {
    AttributeKind::StringList {
        strings: words.iter().map(|w| w.to_string()).collect(),
    }
}

pub fn collect(stream: WordStream<'_>) -> Vec<String> {
    stream.map(|w| w.expect("word streams cleanly")).collect()
}

/// `words.txt` in a fresh directory, newline-separated with no trailing
/// newline.
pub fn write_words(words: &[&str]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("words.txt");
    std::fs::write(&path, words.join("\n")).expect("failed to write words");
    (dir, path)
}
