//! Export helpers for writing wordlists and hashcat rule files.
//!
//! - `write_wordlist` drains a word stream into a file, one word per line,
//!   and never leaves a partial file behind.
//! - `save_rules` writes a comment block, the rule total, then the rules.
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{debug, warn};

use crate::attribute::WordStream;
use crate::background::CancelToken;
use crate::error::ChainError;
use crate::rules::RuleSet;
use crate::stats::group_digits;

/// How often the stop flag and progress callback are consulted.
pub const PROGRESS_INTERVAL: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Completed { words: u64 },
    Cancelled,
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("could not remove partial file {}: {}", path.display(), e);
    }
}

/// Write every word followed by `\n`. `progress` receives the running word
/// count every [`PROGRESS_INTERVAL`] words. On cancellation or a stream error
/// the file is removed.
pub fn write_wordlist<P, F>(
    words: WordStream<'_>,
    path: P,
    stop: &CancelToken,
    mut progress: F,
) -> Result<WriteOutcome, ChainError>
where
    P: AsRef<Path>,
    F: FnMut(u64),
{
    let path = path.as_ref();
    let context = || format!("write {}", path.display());
    let file = File::create(path).map_err(|e| ChainError::io(context(), e))?;
    let mut out = BufWriter::new(file);

    let mut written = 0u64;
    let result = (|| -> Result<bool, ChainError> {
        for word in words {
            let word = word?;
            out.write_all(word.as_bytes())
                .and_then(|_| out.write_all(b"\n"))
                .map_err(|e| ChainError::io(context(), e))?;
            written += 1;
            if written % PROGRESS_INTERVAL == 0 {
                if stop.is_cancelled() {
                    return Ok(false);
                }
                progress(written);
            }
        }
        out.flush().map_err(|e| ChainError::io(context(), e))?;
        Ok(true)
    })();

    match result {
        Ok(true) => {
            debug!("wrote {} words to {}", written, path.display());
            Ok(WriteOutcome::Completed { words: written })
        }
        Ok(false) => {
            drop(out);
            discard(path);
            Ok(WriteOutcome::Cancelled)
        }
        Err(e) => {
            drop(out);
            discard(path);
            Err(e)
        }
    }
}

/// Comment lines are prefixed with `# ` unless they already start with `#`.
pub fn save_rules<P: AsRef<Path>>(
    rules: &RuleSet,
    comments: &[String],
    path: P,
) -> Result<(), ChainError> {
    let path = path.as_ref();
    let context = || format!("write {}", path.display());
    let file = File::create(path).map_err(|e| ChainError::io(context(), e))?;
    let mut out = BufWriter::new(file);
    let mut body = String::new();
    for comment in comments {
        if !comment.starts_with('#') {
            body.push_str("# ");
        }
        body.push_str(comment);
        body.push('\n');
    }
    body.push_str(&format!("#\n# Total Rules: {}\n", group_digits(rules.len() as u64)));
    body.push_str(&rules.to_string());
    out.write_all(body.as_bytes())
        .and_then(|_| out.flush())
        .map_err(|e| ChainError::io(context(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Word;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn stream(words: Vec<Word>) -> WordStream<'static> {
        Box::new(words.into_iter())
    }

    fn numbered(n: usize) -> Vec<Word> {
        (0..n).map(|i| Ok(format!("w{i}"))).collect()
    }

    #[test]
    fn writes_one_word_per_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let mut seen = Vec::new();
        let outcome = write_wordlist(stream(numbered(250)), &path, &CancelToken::new(), |n| {
            seen.push(n)
        })
        .unwrap();
        assert_eq!(outcome, WriteOutcome::Completed { words: 250 });
        assert_eq!(seen, vec![100, 200]);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 250);
        assert!(content.starts_with("w0\nw1\n"));
        assert!(content.ends_with("w249\n"));
    }

    #[test]
    fn cancellation_removes_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let stop = CancelToken::new();
        stop.cancel();
        let outcome = write_wordlist(stream(numbered(500)), &path, &stop, |_| {}).unwrap();
        assert_eq!(outcome, WriteOutcome::Cancelled);
        assert!(!path.exists());
    }

    #[test]
    fn stream_errors_remove_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let mut words = numbered(10);
        words.push(Err(ChainError::StreamInterrupted {
            path: PathBuf::from("words.txt"),
            reason: "gone".into(),
        }));
        let result = write_wordlist(stream(words), &path, &CancelToken::new(), |_| {});
        assert!(matches!(result, Err(ChainError::StreamInterrupted { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn rule_file_has_comments_and_total() {
        use crate::attribute::AttributeKind;
        use crate::node::Node;
        use crate::test_utils::{built, context, strings};

        let ctx = context();
        let mut base = Node::base();
        base.add_attribute(built(&ctx, strings(&["x"]))).unwrap();
        let mut append = Node::append();
        append
            .add_attribute(built(&ctx, AttributeKind::Range { start: 0, end: 2, zfill: 0 }))
            .unwrap();
        let rules = crate::rules::compile(&[base, append]).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("out.rule");
        save_rules(&rules, &["made for tests".to_string(), "# kept".to_string()], &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "# made for tests\n# kept\n#\n# Total Rules: 2\n$0\n$1\n"
        );
    }
}
