//! String canonicalisation pass
//!
//! Obfuscators emit strings as hex/unicode escape soup (`"\x68\x69"`). The
//! parser already decoded the value; dropping the raw source representation
//! makes the printer emit the decoded form:
//!
//! ```js
//! console.log("\x68\x65\x6c\x6c\x6f");   // => console.log("hello");
//! ```

use oxc_ast::ast::*;
use oxc_traverse::{Traverse, TraverseCtx};

use crate::transforms::state::EngineState;

pub type Ctx<'a> = TraverseCtx<'a, EngineState>;

#[derive(Default)]
pub struct StringNormalizer {
    changes: usize,
}

impl StringNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> usize {
        self.changes
    }

    /// True when the raw text is already the plain double-quoted value.
    fn raw_is_canonical(raw: &str, value: &str) -> bool {
        let Some(stripped) = raw
            .strip_prefix('"')
            .and_then(|r| r.strip_suffix('"'))
        else {
            return false;
        };
        stripped == value && !value.contains('\\') && !value.contains('"')
    }
}

impl<'a> Traverse<'a, EngineState> for StringNormalizer {
    fn enter_string_literal(&mut self, lit: &mut StringLiteral<'a>, _ctx: &mut Ctx<'a>) {
        if let Some(raw) = &lit.raw {
            if !Self::raw_is_canonical(raw.as_str(), lit.value.as_str()) {
                lit.raw = None;
                self.changes += 1;
            }
        }
    }
}

pub fn run<'a>(
    program: &mut Program<'a>,
    state: &mut EngineState,
    allocator: &'a oxc_allocator::Allocator,
) -> usize {
    crate::transforms::run_pass(program, state, allocator, |pass: &mut StringNormalizer| {
        pass.changes()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::state::EngineState;
    use oxc_allocator::Allocator;
    use oxc_codegen::Codegen;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn run_normalize(code: &str) -> (String, usize) {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, code, SourceType::mjs()).parse();
        let mut program = ret.program;
        let mut state = EngineState::new();
        let changes = run(&mut program, &mut state, &allocator);
        (Codegen::new().build(&program).code, changes)
    }

    #[test]
    fn test_decode_hex_escapes() {
        let (output, changes) = run_normalize(r#"f("\x68\x65\x6c\x6c\x6f");"#);
        assert!(changes >= 1);
        assert!(output.contains(r#""hello""#), "got: {}", output);
    }

    #[test]
    fn test_decode_unicode_escapes() {
        let (output, changes) = run_normalize(r#"f("\u0061\u0062");"#);
        assert!(changes >= 1);
        assert!(output.contains(r#""ab""#), "got: {}", output);
    }

    #[test]
    fn test_canonical_string_untouched() {
        let (_, changes) = run_normalize(r#"f("plain");"#);
        assert_eq!(changes, 0, "already canonical");
    }

    #[test]
    fn test_idempotent() {
        let (once, _) = run_normalize(r#"f("\x68\x69");"#);
        let (twice, changes) = run_normalize(&once);
        assert_eq!(changes, 0, "second run is a no-op");
        assert_eq!(once, twice);
    }
}
