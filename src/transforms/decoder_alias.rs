//! Decoder alias removal pass
//!
//! Obfuscated code rebinds decoder functions through aliases so their call
//! sites are harder to find:
//!
//! ```js
//! var alias = decode;
//! alias(481);          // => decode(481);
//! ```
//!
//! Declarators of shape `alias = <decoder>` are removed and the alias's
//! references renamed to the decoder. Applies to names in the engine's
//! decoder set, which the decoder subsystem and the `decoders` option
//! populate.

use oxc_allocator::CloneIn;
use oxc_ast::ast::*;
use oxc_span::SPAN;
use oxc_traverse::{Traverse, TraverseCtx};
use rustc_hash::FxHashMap;

use crate::transforms::state::EngineState;

pub type Ctx<'a> = TraverseCtx<'a, EngineState>;

#[derive(Default)]
pub struct DecoderAliasRemover {
    aliases: FxHashMap<String, String>,
    changes: usize,
}

impl DecoderAliasRemover {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> usize {
        self.changes
    }

    fn alias_target(decl: &VariableDeclarator<'_>, state: &EngineState) -> Option<String> {
        let Some(Expression::Identifier(init)) = &decl.init else {
            return None;
        };
        if state.decoders.contains(init.name.as_str()) {
            Some(init.name.to_string())
        } else {
            None
        }
    }
}

impl<'a> Traverse<'a, EngineState> for DecoderAliasRemover {
    fn exit_statement(&mut self, stmt: &mut Statement<'a>, ctx: &mut Ctx<'a>) {
        let Statement::VariableDeclaration(decl) = stmt else {
            return;
        };
        let has_alias = decl
            .declarations
            .iter()
            .any(|d| Self::alias_target(d, &ctx.state).is_some());
        if !has_alias {
            return;
        }

        let mut kept = ctx.ast.vec();
        for d in decl.declarations.iter() {
            if let Some(target) = Self::alias_target(d, &ctx.state) {
                if let BindingPatternKind::BindingIdentifier(ident) = &d.id.kind {
                    eprintln!(
                        "[DECODE] Removing alias {} of decoder {}",
                        ident.name, target
                    );
                    self.aliases.insert(ident.name.to_string(), target);
                    self.changes += 1;
                    continue;
                }
            }
            kept.push(d.clone_in(ctx.ast.allocator));
        }

        if kept.is_empty() {
            *stmt = Statement::EmptyStatement(ctx.ast.alloc(EmptyStatement { span: SPAN }));
        } else {
            *stmt = Statement::VariableDeclaration(ctx.ast.alloc(VariableDeclaration {
                span: SPAN,
                kind: decl.kind,
                declarations: kept,
                declare: decl.declare,
            }));
        }
    }

    fn exit_program(&mut self, program: &mut Program<'a>, ctx: &mut Ctx<'a>) {
        // All alias declarators are gone by now; retarget their references
        // at the decoder binding that already exists.
        for (alias, target) in std::mem::take(&mut self.aliases) {
            let renamed = crate::transforms::rename::rename_all(
                program,
                &alias,
                &target,
                ctx.ast.allocator,
            );
            eprintln!(
                "[DECODE] Renamed {} reference(s) of {} to {}",
                renamed, alias, target
            );
            self.changes += renamed;
        }
    }
}

pub fn run<'a>(
    program: &mut Program<'a>,
    state: &mut EngineState,
    allocator: &'a oxc_allocator::Allocator,
) -> usize {
    if state.decoders.is_empty() {
        return 0;
    }
    crate::transforms::run_pass(program, state, allocator, |pass: &mut DecoderAliasRemover| {
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

    fn run_alias(code: &str, decoders: &[&str]) -> (String, usize) {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, code, SourceType::mjs()).parse();
        let mut program = ret.program;
        let mut state = EngineState::new();
        for name in decoders {
            state.decoders.insert((*name).to_string());
        }
        let changes = run(&mut program, &mut state, &allocator);
        (Codegen::new().build(&program).code, changes)
    }

    #[test]
    fn test_remove_alias_and_rename_calls() {
        let (output, changes) = run_alias("var a = decode; f(a(481));", &["decode"]);
        assert!(changes >= 1);
        assert!(!output.contains("var a"), "alias declarator removed: {}", output);
        assert!(output.contains("f(decode(481))"), "got: {}", output);
    }

    #[test]
    fn test_let_alias_removed() {
        let (output, _) = run_alias("let b = decode; b(1); b(2);", &["decode"]);
        assert!(output.contains("decode(1)"), "got: {}", output);
        assert!(output.contains("decode(2)"), "got: {}", output);
        assert!(!output.contains("let b"), "got: {}", output);
    }

    #[test]
    fn test_non_decoder_alias_untouched() {
        let (output, changes) = run_alias("var a = helper; a(1);", &["decode"]);
        assert_eq!(changes, 0);
        assert!(output.contains("var a = helper"), "got: {}", output);
    }

    #[test]
    fn test_no_decoders_no_work() {
        let (output, changes) = run_alias("var a = decode; a(1);", &[]);
        assert_eq!(changes, 0);
        assert!(output.contains("var a = decode"), "got: {}", output);
    }
}
