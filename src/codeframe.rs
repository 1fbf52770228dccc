//! Code-frame rendering for parse errors.
//!
//! Produces the classic three-line excerpt with a caret under the offending
//! column:
//!
//! ```text
//!   3 | var x = ;
//!     |         ^
//! ```

const CONTEXT_LINES: usize = 2;

/// Render a code frame around `offset` (a byte offset into `source`).
pub fn render(source: &str, offset: usize) -> String {
    let offset = offset.min(source.len());

    let mut line_start = 0usize;
    let mut line_no = 1usize;
    for (i, b) in source.bytes().enumerate() {
        if i >= offset {
            break;
        }
        if b == b'\n' {
            line_start = i + 1;
            line_no += 1;
        }
    }
    let column = source[line_start..offset].chars().count();

    let lines: Vec<&str> = source.lines().collect();
    let first = line_no.saturating_sub(CONTEXT_LINES + 1);
    let last = (line_no + CONTEXT_LINES).min(lines.len());
    let width = last.to_string().len();

    let mut out = String::new();
    for (idx, line) in lines.iter().enumerate().take(last).skip(first) {
        let n = idx + 1;
        out.push_str(&format!("{:>width$} | {}\n", n, line, width = width));
        if n == line_no {
            out.push_str(&format!(
                "{:>width$} | {}^\n",
                "",
                " ".repeat(column),
                width = width
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_points_at_column() {
        let source = "var a = 1;\nvar b = ;\nvar c = 3;\n";
        let offset = source.find("= ;").unwrap() + 2;
        let frame = render(source, offset);
        assert!(frame.contains("2 | var b = ;"), "got:\n{}", frame);
        assert!(frame.contains("^"), "got:\n{}", frame);
        let caret_line = frame
            .lines()
            .find(|l| l.contains('^'))
            .expect("caret line present");
        assert_eq!(caret_line.find('^'), Some(caret_line.find('|').unwrap() + 2 + 8));
    }

    #[test]
    fn test_frame_clamps_offset() {
        let frame = render("x", 999);
        assert!(frame.contains("1 | x"));
    }

    #[test]
    fn test_frame_limits_context() {
        let source = (1..=9).map(|n| format!("line{};\n", n)).collect::<String>();
        let offset = source.find("line5").unwrap();
        let frame = render(&source, offset);
        assert!(frame.contains("line3;"));
        assert!(frame.contains("line7;"));
        assert!(!frame.contains("line1;"));
        assert!(!frame.contains("line9;"));
    }
}
