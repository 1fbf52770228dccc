//! Decoder call-site collection and source splicing.
//!
//! Call sites of located decoders whose arguments are all constant are
//! captured with their original spans. After the sandbox reports what each
//! call produces, the results are spliced straight over the call text
//! (right to left so earlier offsets stay valid) and the patched source goes
//! on to the rewrite pipeline.

use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use rustc_hash::FxHashSet;

/// One decoder call with constant arguments.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub start: u32,
    pub end: u32,
    /// Original call text, evaluated verbatim inside the sandbox.
    pub text: String,
    /// Printer-normalized rendering, used to find the call again in emitted
    /// output when annotating failures.
    pub rendered: String,
}

pub struct CallSiteCollector<'s> {
    decoders: &'s FxHashSet<String>,
    source: &'s str,
    pub sites: Vec<CallSite>,
}

impl<'s> CallSiteCollector<'s> {
    pub fn new(decoders: &'s FxHashSet<String>, source: &'s str) -> Self {
        Self {
            decoders,
            source,
            sites: Vec::new(),
        }
    }

    fn constant_argument(expr: &Expression<'_>) -> Option<String> {
        match expr {
            Expression::NumericLiteral(lit) => Some(render_number(lit.value)),
            Expression::StringLiteral(lit) => {
                Some(format!("\"{}\"", escape_js_string(lit.value.as_str())))
            }
            Expression::BooleanLiteral(lit) => Some(lit.value.to_string()),
            Expression::UnaryExpression(unary)
                if unary.operator == UnaryOperator::UnaryNegation =>
            {
                match &unary.argument {
                    Expression::NumericLiteral(lit) => Some(format!("-{}", render_number(lit.value))),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

impl<'a, 's> Visit<'a> for CallSiteCollector<'s> {
    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if let Expression::Identifier(callee) = &call.callee {
            if self.decoders.contains(callee.name.as_str()) && !call.arguments.is_empty() {
                let mut rendered_args = Vec::with_capacity(call.arguments.len());
                let all_constant = call.arguments.iter().all(|arg| {
                    arg.as_expression()
                        .and_then(Self::constant_argument)
                        .map(|r| rendered_args.push(r))
                        .is_some()
                });
                if all_constant {
                    let start = call.span.start;
                    let end = call.span.end;
                    self.sites.push(CallSite {
                        start,
                        end,
                        text: self.source[start as usize..end as usize].to_string(),
                        rendered: format!("{}({})", callee.name, rendered_args.join(", ")),
                    });
                    // Arguments are constant, nothing inside to collect.
                    return;
                }
            }
        }
        walk::walk_call_expression(self, call);
    }
}

/// Result of substituting one batch of call sites.
pub struct SpliceOutcome {
    pub source: String,
    pub substituted: usize,
    pub failures: Vec<DecodeFailure>,
}

#[derive(Debug, Clone)]
pub struct DecodeFailure {
    /// Printer-normalized call text (`dec(481)`).
    pub call: String,
    pub message: String,
}

/// Splice per-call results over their spans. `results` pairs up with
/// `sites`; a `Ok` replaces the call, an `Err` leaves it and records the
/// failure for output annotation.
pub fn splice(
    source: &str,
    sites: &[CallSite],
    results: &[Result<serde_json::Value, String>],
) -> SpliceOutcome {
    let mut patched = source.to_string();
    let mut substituted = 0;
    let mut failures = Vec::new();

    let mut order: Vec<usize> = (0..sites.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(sites[i].start));

    for i in order {
        let site = &sites[i];
        match &results[i] {
            Ok(value) => {
                let Some(literal) = render_value(value) else {
                    failures.push(DecodeFailure {
                        call: site.rendered.clone(),
                        message: format!("unrepresentable result {}", value),
                    });
                    continue;
                };
                eprintln!("[DECODE] {} => {}", site.rendered, literal);
                patched.replace_range(site.start as usize..site.end as usize, &literal);
                substituted += 1;
            }
            Err(message) => {
                eprintln!("[DECODE] {} failed: {}", site.rendered, message);
                failures.push(DecodeFailure {
                    call: site.rendered.clone(),
                    message: message.clone(),
                });
            }
        }
    }

    SpliceOutcome {
        source: patched,
        substituted,
        failures,
    }
}

fn render_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(format!("\"{}\"", escape_js_string(s))),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Null => Some("null".to_string()),
        _ => None,
    }
}

fn render_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Escape a string for a double-quoted JS literal.
pub fn escape_js_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_allocator::Allocator;
    use oxc_parser::Parser;
    use oxc_span::SourceType;
    use serde_json::json;

    fn collect(source: &str, decoders: &[&str]) -> Vec<CallSite> {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, source, SourceType::mjs()).parse();
        let set: FxHashSet<String> = decoders.iter().map(|s| s.to_string()).collect();
        let mut collector = CallSiteCollector::new(&set, source);
        collector.visit_program(&ret.program);
        collector.sites
    }

    #[test]
    fn test_collect_constant_calls() {
        let sites = collect("f(dec(1), dec(0x1e5), g(dec(2)));", &["dec"]);
        assert_eq!(sites.len(), 3);
        assert_eq!(sites[0].text, "dec(1)");
        assert_eq!(sites[1].text, "dec(0x1e5)");
        assert_eq!(sites[1].rendered, "dec(485)");
        assert_eq!(sites[2].text, "dec(2)");
    }

    #[test]
    fn test_skip_non_constant_args() {
        let sites = collect("dec(i); dec(1 + x); dec(3);", &["dec"]);
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].text, "dec(3)");
    }

    #[test]
    fn test_collect_string_and_negative_args() {
        let sites = collect(r#"dec(-5, "k");"#, &["dec"]);
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].rendered, r#"dec(-5, "k")"#);
    }

    #[test]
    fn test_splice_replaces_right_to_left() {
        let source = "f(dec(1), dec(2));";
        let sites = collect(source, &["dec"]);
        let results = vec![Ok(json!("one")), Ok(json!("two"))];
        let outcome = splice(source, &sites, &results);
        assert_eq!(outcome.substituted, 2);
        assert_eq!(outcome.source, r#"f("one", "two");"#);
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn test_splice_keeps_failed_calls() {
        let source = "f(dec(1), dec(2));";
        let sites = collect(source, &["dec"]);
        let results = vec![
            Ok(json!("one")),
            Err("index out of range".to_string()),
        ];
        let outcome = splice(source, &sites, &results);
        assert_eq!(outcome.substituted, 1);
        assert!(outcome.source.contains("dec(2)"), "got: {}", outcome.source);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].call, "dec(2)");
    }

    #[test]
    fn test_escape_js_string() {
        assert_eq!(escape_js_string(r#"a"b"#), r#"a\"b"#);
        assert_eq!(escape_js_string("a\\b"), r"a\\b");
        assert_eq!(escape_js_string("line\nbreak"), r"line\nbreak");
        assert_eq!(escape_js_string("\u{1}"), r"\u0001");
        assert_eq!(escape_js_string("plain"), "plain");
    }
}
