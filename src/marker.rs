//! Output annotation.
//!
//! Two kinds of marks end up in the printed text:
//!
//! - `// TOLOOK` lines ahead of statements a human should review:
//!   `debugger`, timer calls, and hits on the caller's keyword list;
//! - `/* decrypt failed: ... */` ahead of decoder calls the sandbox could
//!   not resolve.
//!
//! Marking happens on the emitted text because the printer owns comments;
//! the passes themselves never fabricate trivia. Marking is idempotent: an
//! already-marked line is left alone.

use crate::decoder::DecodeFailure;

const MARK: &str = "// TOLOOK";

fn line_indent(line: &str) -> &str {
    let end = line.len() - line.trim_start().len();
    &line[..end]
}

fn is_suspicious(line: &str, keywords: &[String]) -> bool {
    let trimmed = line.trim();
    // A debugger statement, not the word inside a string.
    if trimmed == "debugger" || trimmed == "debugger;" {
        return true;
    }
    let lower = line.to_lowercase();
    if lower.contains("settimeout(") || lower.contains("setinterval(") {
        return true;
    }
    keywords
        .iter()
        .any(|k| !k.is_empty() && lower.contains(&k.to_lowercase()))
}

/// Insert `// TOLOOK` ahead of suspicious lines. Returns the marked text and
/// the number of marks added.
pub fn mark_output(code: &str, keywords: &[String]) -> (String, usize) {
    let mut out = Vec::new();
    let mut marks = 0;
    let mut previous_was_mark = false;

    for line in code.lines() {
        let trimmed = line.trim();
        if trimmed == MARK {
            previous_was_mark = true;
            out.push(line.to_string());
            continue;
        }
        if !previous_was_mark && !trimmed.starts_with("//") && is_suspicious(line, keywords) {
            out.push(format!("{}{}", line_indent(line), MARK));
            marks += 1;
        }
        previous_was_mark = false;
        out.push(line.to_string());
    }

    let mut joined = out.join("\n");
    if code.ends_with('\n') {
        joined.push('\n');
    }
    (joined, marks)
}

/// Prefix unresolved decoder calls with a `decrypt failed` comment. Calls
/// that cannot be found in the printed text (the printer re-rendered them
/// differently) are reported in a trailing comment instead.
pub fn annotate_failures(code: &str, failures: &[DecodeFailure]) -> String {
    let mut out = code.to_string();
    let mut unlocated = Vec::new();

    for failure in failures {
        let note = format!("/* decrypt failed: {} */ ", failure.message);
        match out.find(&failure.call) {
            Some(pos) if !out[..pos].ends_with("*/ ") => {
                out.insert_str(pos, &note);
            }
            Some(_) => {}
            None => unlocated.push(failure),
        }
    }

    for failure in unlocated {
        out.push_str(&format!(
            "// decrypt failed: {}: {}\n",
            failure.call, failure.message
        ));
    }
    out
}
