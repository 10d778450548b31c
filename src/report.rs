//! Human-readable report rendering for terminal output.
//!
//! Produces a colored summary of a chain: overall estimates, hashcat
//! compatibility, file problems, and each node with its attributes.
use colored::*;

use crate::stats::{ChainStats, WordCount};

fn visible_len(s: &str) -> usize {
    // Strip ANSI escape sequences (\x1b[ ... m) to compute printable width
    let mut len = 0;
    let mut iter = s.chars().peekable();
    while let Some(ch) = iter.next() {
        if ch == '\u{1b}' {
            if let Some('[') = iter.peek().cloned() {
                let _ = iter.next();
            }
            for c in iter.by_ref() {
                if c == 'm' {
                    break;
                }
            }
        } else {
            len += 1;
        }
    }
    len
}

fn section_header(title: &str) -> String {
    let len = visible_len(title);
    let mut s = String::new();
    s.push('\n');
    s.push_str(title);
    s.push('\n');
    s.push_str(&"─".repeat(len));
    s.push_str("\n\n");
    s
}

fn push_lines(out: &mut String, lines: Vec<String>) {
    for line in lines {
        out.push_str(&line);
        out.push('\n');
    }
}

pub fn render_summary(stats: &ChainStats) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}\n",
        "Mentalist: Wordlist Chain Summary".bold().cyan()
    ));

    let mut totals = Vec::new();
    totals.push(format!("Est. Words: {}", stats.words));
    totals.push(format!("Est. Size: {}", stats.size()));
    totals.push(format!(
        "Hashcat Compatible: {}",
        if stats.hashcat_compatible {
            "Yes".green()
        } else {
            "No".red()
        }
    ));
    totals.push(format!(
        "Ready to Process: {}",
        if stats.can_process {
            "Yes".green()
        } else {
            "No".yellow()
        }
    ));
    out.push_str(&section_header(&"Chain Estimates".bold().yellow().to_string()));
    push_lines(&mut out, totals);

    let mut node_lines = Vec::new();
    for (idx, node) in stats.nodes.iter().enumerate() {
        node_lines.push(format!(
            "{} {} ({} words)",
            format!("{}.", idx + 1).bold(),
            node.node_type.to_string().bold().blue(),
            node.words
        ));
        if node.attributes.is_empty() {
            node_lines.push(format!("  {}", "(No attributes)".dimmed()));
        }
        for attr in &node.attributes {
            match &attr.words {
                Some(WordCount::Calculating) => {
                    node_lines.push(format!("  {}: {}", attr.label, "Calculating...".dimmed()))
                }
                Some(words) => node_lines.push(format!("  {}: {}", attr.label, words)),
                None => node_lines.push(format!("  {}", attr.label)),
            }
        }
    }
    if node_lines.is_empty() {
        node_lines.push("(Empty chain)".to_string());
    }
    out.push_str(&section_header(&"Nodes".bold().cyan().to_string()));
    push_lines(&mut out, node_lines);

    if !stats.file_errors.is_empty() {
        let lines = stats
            .file_errors
            .iter()
            .map(|e| format!("  {}", e.red()))
            .collect();
        out.push_str(&section_header(&"File Errors".bold().red().to_string()));
        push_lines(&mut out, lines);
    }

    out
}
