//! String-array decoder subsystem.
//!
//! Locates the obfuscator's string table and decoder functions, executes the
//! setup code against every constant call site inside the sandbox, and
//! splices the resulting literals back over the call text before the rewrite
//! pipeline parses the program:
//!
//! 1. locate the decoders ([`locate`]), slicing their setup out of the
//!    original source by span;
//! 2. collect call sites with constant arguments ([`splice`]);
//! 3. evaluate one wrapper that runs the setup once and returns every call's
//!    result, each individually try/caught so one bad index cannot poison
//!    the batch;
//! 4. splice successes over their spans; keep failures in place and report
//!    them for output annotation.

pub mod locate;
pub mod sandbox;
pub mod splice;

pub use locate::{locate, DecoderLayout};
pub use sandbox::{BoaSandbox, Sandbox, SandboxError};
pub use splice::{escape_js_string, CallSite, CallSiteCollector, DecodeFailure};

use oxc_allocator::Allocator;
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::SourceType;
use rustc_hash::FxHashSet;

use crate::options::Options;
use crate::{DeobfuscateError, Result};

/// What the subsystem did to the input.
pub struct DecodeOutcome {
    /// Source text with successful call sites replaced by literals.
    pub source: String,
    /// Every located or user-forced decoder name.
    pub decoders: FxHashSet<String>,
    /// Number of substituted call sites.
    pub changes: usize,
    /// Call sites the sandbox could not resolve.
    pub failures: Vec<DecodeFailure>,
}

/// Build the evaluation program: run the setup once, then produce every
/// call's result. Each call is individually guarded so a throwing decoder
/// reports per-site instead of failing the batch.
fn build_eval_program(setup: &str, sites: &[CallSite]) -> String {
    let mut code = String::with_capacity(setup.len() + sites.len() * 64);
    code.push_str("(() => {\n");
    code.push_str(setup);
    code.push_str("\nreturn [\n");
    for site in sites {
        code.push_str("(() => { try { return { v: ");
        code.push_str(&site.text);
        code.push_str(" }; } catch (e) { return { e: String(e) }; } })(),\n");
    }
    code.push_str("];\n})()");
    code
}

/// Run the decoder subsystem over `source`. Returns `None` when the input
/// has no string-array machinery; user-forced decoder names are still
/// reported through the outcome in that case so the alias pass can use
/// them.
pub fn run(
    source: &str,
    options: &Options,
    sandbox: Option<&dyn Sandbox>,
) -> Result<Option<DecodeOutcome>> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, SourceType::mjs()).parse();
    let program = parsed.program;

    let forced: FxHashSet<String> = options.decoders.iter().cloned().collect();

    let Some(layout) = locate(&program, source, options) else {
        if forced.is_empty() {
            return Ok(None);
        }
        eprintln!(
            "[DECODE] No string-array machinery located; keeping {} forced decoder name(s)",
            forced.len()
        );
        return Ok(Some(DecodeOutcome {
            source: source.to_string(),
            decoders: forced,
            changes: 0,
            failures: Vec::new(),
        }));
    };

    let mut decoders = layout.decoders.clone();
    decoders.extend(forced);

    let mut collector = CallSiteCollector::new(&layout.decoders, source);
    collector.visit_program(&program);
    let sites = collector.sites;
    eprintln!(
        "[DECODE] {} decoder(s), {} constant call site(s)",
        decoders.len(),
        sites.len()
    );

    if sites.is_empty() {
        return Ok(Some(DecodeOutcome {
            source: source.to_string(),
            decoders,
            changes: 0,
            failures: Vec::new(),
        }));
    }

    let Some(sandbox) = sandbox else {
        return Err(DeobfuscateError::SandboxRequired);
    };

    let eval_program = build_eval_program(&layout.setup, &sites);
    let value = sandbox.evaluate(&eval_program).map_err(DeobfuscateError::Decode)?;

    let serde_json::Value::Array(entries) = value else {
        return Err(DeobfuscateError::Decode(SandboxError::Marshal(format!(
            "expected an array of call results, got {}",
            value
        ))));
    };
    if entries.len() != sites.len() {
        return Err(DeobfuscateError::Decode(SandboxError::Marshal(format!(
            "expected {} call results, got {}",
            sites.len(),
            entries.len()
        ))));
    }

    let results: Vec<std::result::Result<serde_json::Value, String>> = entries
        .into_iter()
        .map(|entry| {
            let serde_json::Value::Object(mut map) = entry else {
                return Err("malformed call result".to_string());
            };
            if let Some(err) = map.remove("e") {
                return Err(err.as_str().unwrap_or("unknown error").to_string());
            }
            // JSON.stringify drops `v` entirely when the call returned
            // undefined.
            Ok(map.remove("v").unwrap_or(serde_json::Value::Null))
        })
        .collect();

    let outcome = splice::splice(source, &sites, &results);
    eprintln!(
        "[DECODE] Substituted {}/{} call site(s)",
        outcome.substituted,
        sites.len()
    );

    Ok(Some(DecodeOutcome {
        source: outcome.source,
        decoders,
        changes: outcome.substituted,
        failures: outcome.failures,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_options() -> Options {
        Options {
            call_count_threshold: 3,
            array_size_threshold: 3,
            ..Options::default()
        }
    }

    #[test]
    fn test_decode_simple_table() {
        let source = r#"var _t = ["alpha", "beta", "gamma", "delta"];
function dec(i) { return _t[i]; }
console.log(dec(0));
console.log(dec(1));
console.log(dec(3));
"#;
        let sandbox = BoaSandbox::new();
        let outcome = run(source, &small_options(), Some(&sandbox))
            .expect("runs")
            .expect("machinery located");

        assert!(outcome.decoders.contains("dec"));
        assert_eq!(outcome.changes, 3);
        assert!(outcome.failures.is_empty());
        assert!(outcome.source.contains(r#"console.log("alpha")"#), "got: {}", outcome.source);
        assert!(outcome.source.contains(r#"console.log("beta")"#), "got: {}", outcome.source);
        assert!(outcome.source.contains(r#"console.log("delta")"#), "got: {}", outcome.source);
    }

    #[test]
    fn test_decode_with_rotator() {
        let source = r#"var _t = ["a", "b", "c", "d"];
(function (arr, n) { for (var i = 0; i < n; i++) { arr.push(arr.shift()); } })(_t, 2);
function dec(i) { return _t[i]; }
log(dec(0));
log(dec(1));
log(dec(2));
"#;
        let sandbox = BoaSandbox::new();
        let outcome = run(source, &small_options(), Some(&sandbox))
            .expect("runs")
            .expect("machinery located");

        // ["a","b","c","d"] rotated twice is ["c","d","a","b"].
        assert!(outcome.source.contains(r#"log("c")"#), "got: {}", outcome.source);
        assert!(outcome.source.contains(r#"log("d")"#), "got: {}", outcome.source);
        assert!(outcome.source.contains(r#"log("a")"#), "got: {}", outcome.source);
    }

    #[test]
    fn test_decode_failure_is_local() {
        let source = r#"var _t = ["only", "two", "items"];
function dec(i) { return _t[i].toUpperCase(); }
log(dec(0));
log(dec(9));
log(dec(1));
"#;
        let sandbox = BoaSandbox::new();
        let outcome = run(source, &small_options(), Some(&sandbox))
            .expect("runs")
            .expect("machinery located");

        assert_eq!(outcome.changes, 2, "two good sites substituted");
        assert_eq!(outcome.failures.len(), 1, "one site failed");
        assert_eq!(outcome.failures[0].call, "dec(9)");
        assert!(outcome.source.contains("dec(9)"), "failed call left in place");
        assert!(outcome.source.contains(r#"log("ONLY")"#), "got: {}", outcome.source);
    }

    #[test]
    fn test_plain_code_is_untouched() {
        let outcome = run("f(1);", &small_options(), None).expect("runs");
        assert!(outcome.is_none());
    }

    #[test]
    fn test_sandbox_required_when_decoders_present() {
        let source = r#"var _t = ["x", "y", "z"];
function dec(i) { return _t[i]; }
log(dec(0));
"#;
        let err = run(source, &small_options(), None).expect_err("needs a sandbox");
        assert!(matches!(err, DeobfuscateError::SandboxRequired));
    }

    #[test]
    fn test_forced_decoders_survive_without_machinery() {
        let mut options = small_options();
        options.decoders.push("decode".to_string());
        let outcome = run("var a = decode; a(1);", &options, None)
            .expect("runs")
            .expect("forced decoders reported");
        assert!(outcome.decoders.contains("decode"));
        assert_eq!(outcome.changes, 0);
    }
}
