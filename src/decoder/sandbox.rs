//! Sandboxed JavaScript evaluation.
//!
//! The decoder subsystem needs to actually run the obfuscator's setup code
//! (string table, rotator, decoder functions) to learn what each call site
//! produces. That execution happens behind the [`Sandbox`] trait: an
//! isolated evaluator with a wall-clock timeout and no host access, which
//! hands results back by value as JSON.
//!
//! [`BoaSandbox`] is the bundled implementation: a fresh `boa_engine`
//! context per evaluation with runtime limits on loop iterations, recursion,
//! and stack, run on a worker thread so a hostile payload that out-runs the
//! interpreter limits still hits the wall-clock bound. No host globals are
//! registered; the script sees ECMAScript builtins only.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use boa_engine::vm::RuntimeLimits;
use boa_engine::{Context, Source};

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("sandbox evaluation timed out after {0:?}")]
    Timeout(Duration),

    #[error("sandbox evaluation failed: {0}")]
    Eval(String),

    #[error("sandbox result could not be marshalled: {0}")]
    Marshal(String),

    #[error("sandbox worker terminated unexpectedly")]
    Worker,
}

/// An isolated JavaScript evaluator. `evaluate` runs `code` (an expression)
/// and returns its value marshalled to JSON: a deep copy, never a live
/// handle into the evaluator.
pub trait Sandbox {
    fn evaluate(&self, code: &str) -> Result<serde_json::Value, SandboxError>;
}

pub struct BoaSandbox {
    timeout: Duration,
    loop_iteration_limit: u64,
}

impl BoaSandbox {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(10))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            loop_iteration_limit: 2_000_000,
        }
    }
}

impl Default for BoaSandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Sandbox for BoaSandbox {
    fn evaluate(&self, code: &str) -> Result<serde_json::Value, SandboxError> {
        // Marshal inside the isolate: the result crosses the boundary as a
        // JSON string, so object graphs and live handles cannot leak out.
        let wrapped = format!("JSON.stringify(({}))", code);
        let loop_limit = self.loop_iteration_limit;

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut context = Context::default();
            let mut limits = RuntimeLimits::default();
            limits.set_loop_iteration_limit(loop_limit);
            limits.set_recursion_limit(512);
            limits.set_stack_size_limit(1024 * 1024);
            context.set_runtime_limits(limits);

            let result = match context.eval(Source::from_bytes(wrapped.as_bytes())) {
                Ok(value) => {
                    if value.is_undefined() {
                        Ok("null".to_string())
                    } else {
                        match value.as_string() {
                            Some(s) => Ok(s.to_std_string_lossy()),
                            None => Err("JSON.stringify produced a non-string".to_string()),
                        }
                    }
                }
                Err(err) => Err(format!("{}", err)),
            };
            let _ = tx.send(result);
        });

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(json)) => {
                serde_json::from_str(&json).map_err(|e| SandboxError::Marshal(e.to_string()))
            }
            Ok(Err(message)) => Err(SandboxError::Eval(message)),
            Err(RecvTimeoutError::Timeout) => {
                eprintln!("[SANDBOX] Evaluation timed out after {:?}", self.timeout);
                Err(SandboxError::Timeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(SandboxError::Worker),
        }
    }
}
