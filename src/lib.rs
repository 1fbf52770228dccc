//! # js-deobfuscate-rs
//!
//! An AST-based JavaScript deobfuscator built on the Oxc toolchain. The
//! engine parses the input once, runs the string-array decoder subsystem
//! against a sandboxed evaluator, then drives a library of
//! semantics-preserving rewrites to a fixed point and prints the result.
//!
//! ## Example
//!
//! ```rust
//! use js_deobfuscate_rs::{deobfuscate, Options};
//!
//! let result = deobfuscate(r#"console.log("hi", !0);"#, &Options::default())
//!     .expect("deobfuscation failed");
//! assert!(result.code.contains("true"));
//! ```

pub mod codeframe;
pub mod decoder;
pub mod marker;
pub mod matchers;
pub mod transforms;

mod options;

pub use decoder::{BoaSandbox, Sandbox, SandboxError};
pub use options::Options;
pub use transforms::{apply_transform, apply_transforms, default_transforms, EngineState, Transform};

use std::path::PathBuf;

use oxc_allocator::Allocator;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_span::SourceType;

#[derive(Debug, thiserror::Error)]
pub enum DeobfuscateError {
    #[error("input is not valid JavaScript: {message}\n{frame}")]
    Parse { message: String, frame: String },

    #[error("rewritten program no longer parses: {message}\n{frame}(intermediate dumped to {path})")]
    Reparse {
        message: String,
        frame: String,
        path: PathBuf,
    },

    #[error("decoding failed: {0}")]
    Decode(#[from] SandboxError),

    #[error("this input uses string-array decoding but no sandbox was provided")]
    SandboxRequired,

    #[error("transform pipeline did not converge within {iterations} iteration(s)")]
    DidNotConverge { iterations: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DeobfuscateError>;

/// The deobfuscated program plus the total number of edits that produced it.
#[derive(Debug)]
pub struct Deobfuscated {
    pub code: String,
    pub changes: usize,
}

fn parse_error_details(source: &str, errors: &[oxc_diagnostics::OxcDiagnostic]) -> (String, String) {
    let Some(first) = errors.first() else {
        return ("unknown parse error".to_string(), String::new());
    };
    let offset = first
        .labels
        .as_ref()
        .and_then(|labels| labels.first())
        .map(|label| label.offset())
        .unwrap_or(0);
    (first.message.to_string(), codeframe::render(source, offset))
}

/// Check that `source` parses; used on the raw input and again on the
/// engine's own output.
fn ensure_parses(source: &str) -> std::result::Result<(), (String, String)> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, SourceType::mjs()).parse();
    if parsed.errors.is_empty() {
        Ok(())
    } else {
        Err(parse_error_details(source, &parsed.errors))
    }
}

fn dump_failed_intermediate(source: &str) -> PathBuf {
    let path = std::env::temp_dir().join("jsdeob-failed-intermediate.js");
    if let Err(err) = std::fs::write(&path, source) {
        eprintln!("[PIPELINE] Could not dump intermediate to {:?}: {}", path, err);
    }
    path
}

/// Deobfuscate `code` with the bundled [`BoaSandbox`].
pub fn deobfuscate(code: &str, options: &Options) -> Result<Deobfuscated> {
    let sandbox = BoaSandbox::with_timeout(options.sandbox_timeout);
    deobfuscate_with(code, options, Some(&sandbox))
}

/// Deobfuscate `code` with a caller-supplied sandbox (or none). Decoding is
/// skipped when the input has no string-array machinery; if it does and
/// `sandbox` is `None`, the run fails with [`DeobfuscateError::SandboxRequired`].
pub fn deobfuscate_with(
    code: &str,
    options: &Options,
    sandbox: Option<&dyn Sandbox>,
) -> Result<Deobfuscated> {
    if let Err((message, frame)) = ensure_parses(code) {
        return Err(DeobfuscateError::Parse { message, frame });
    }

    // Decoder subsystem first: it needs original spans to slice setup code
    // and call sites out of the text.
    let (source, decoders, mut changes, failures) =
        match decoder::run(code, options, sandbox)? {
            Some(outcome) => (
                outcome.source,
                outcome.decoders,
                outcome.changes,
                outcome.failures,
            ),
            None => (
                code.to_string(),
                rustc_hash::FxHashSet::default(),
                0,
                Vec::new(),
            ),
        };

    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, &source, SourceType::mjs()).parse();
    if !parsed.errors.is_empty() {
        let (message, frame) = parse_error_details(&source, &parsed.errors);
        let path = dump_failed_intermediate(&source);
        return Err(DeobfuscateError::Reparse {
            message,
            frame,
            path,
        });
    }
    let mut program = parsed.program;

    let mut state = EngineState::new();
    state.decoders = decoders;
    state.keep_program_scope_vars = options.keep_program_scope_vars;
    state.proxy_depth = options.proxy_depth;

    changes += apply_transforms(
        &mut program,
        &default_transforms(),
        &mut state,
        &allocator,
        options.iteration_cap,
    )?;

    if options.rename_vars {
        changes += transforms::variable_rename::run(&mut program, &mut state, &allocator);
    }

    let output = Codegen::new().build(&program).code;
    if let Err((message, frame)) = ensure_parses(&output) {
        let path = dump_failed_intermediate(&output);
        return Err(DeobfuscateError::Reparse {
            message,
            frame,
            path,
        });
    }

    let output = marker::annotate_failures(&output, &failures);
    let (output, marks) = marker::mark_output(&output, &options.mark_keywords);
    changes += marks;

    Ok(Deobfuscated {
        code: output,
        changes,
    })
}
