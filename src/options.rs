use std::default::Default;
use std::time::Duration;

/// Engine options for [`crate::deobfuscate`].
#[derive(Debug, Clone)]
pub struct Options {
    /// Function names to force into the decoder set, in addition to the
    /// automatically located ones.
    pub decoders: Vec<String>,
    /// Reference-count threshold for the call-count decoder locator.
    pub call_count_threshold: usize,
    /// Minimum element count for the big-array decoder locator.
    pub array_size_threshold: usize,
    /// Maximum number of full pipeline iterations before giving up.
    pub iteration_cap: usize,
    /// Identifier / string substrings that get a `TOLOOK` mark in the output
    /// (matched case-insensitively).
    pub mark_keywords: Vec<String>,
    /// Keep unused declarations at program scope instead of removing them.
    pub keep_program_scope_vars: bool,
    /// How many collect/inline rounds the wrapper-call collapser runs.
    pub proxy_depth: usize,
    /// Rename residual `_0x...` identifiers to readable `var_N` / `func_N`
    /// names after the pipeline converges.
    pub rename_vars: bool,
    /// Wall-clock limit for a single sandbox evaluation.
    pub sandbox_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            decoders: Vec::new(),
            call_count_threshold: 100,
            array_size_threshold: 100,
            iteration_cap: 20,
            mark_keywords: Vec::new(),
            keep_program_scope_vars: false,
            proxy_depth: 2,
            rename_vars: false,
            sandbox_timeout: Duration::from_secs(10),
        }
    }
}
