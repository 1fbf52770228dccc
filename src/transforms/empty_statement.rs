//! Empty statement cleanup pass
//!
//! Removes the `EmptyStatement` placeholders that the removal passes leave
//! behind when they replace a statement in place.

use oxc_allocator::CloneIn;
use oxc_ast::ast::*;
use oxc_traverse::{Traverse, TraverseCtx};

use crate::transforms::state::EngineState;

pub type Ctx<'a> = TraverseCtx<'a, EngineState>;

#[derive(Default)]
pub struct EmptyStatementCleanup {
    removed: usize,
}

impl EmptyStatementCleanup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn removed(&self) -> usize {
        self.removed
    }

    fn sweep<'a>(
        &mut self,
        body: &mut oxc_allocator::Vec<'a, Statement<'a>>,
        ctx: &mut Ctx<'a>,
    ) {
        if !body.iter().any(|s| matches!(s, Statement::EmptyStatement(_))) {
            return;
        }
        let mut kept = ctx.ast.vec();
        for stmt in body.iter() {
            if matches!(stmt, Statement::EmptyStatement(_)) {
                self.removed += 1;
            } else {
                kept.push(stmt.clone_in(ctx.ast.allocator));
            }
        }
        *body = kept;
    }
}

impl<'a> Traverse<'a, EngineState> for EmptyStatementCleanup {
    fn exit_program(&mut self, program: &mut Program<'a>, ctx: &mut Ctx<'a>) {
        let mut body = std::mem::replace(&mut program.body, ctx.ast.vec());
        self.sweep(&mut body, ctx);
        program.body = body;
    }

    fn exit_block_statement(&mut self, block: &mut BlockStatement<'a>, ctx: &mut Ctx<'a>) {
        let mut body = std::mem::replace(&mut block.body, ctx.ast.vec());
        self.sweep(&mut body, ctx);
        block.body = body;
    }

    fn exit_function_body(&mut self, body: &mut FunctionBody<'a>, ctx: &mut Ctx<'a>) {
        let mut statements = std::mem::replace(&mut body.statements, ctx.ast.vec());
        self.sweep(&mut statements, ctx);
        body.statements = statements;
    }
}

pub fn run<'a>(
    program: &mut Program<'a>,
    state: &mut EngineState,
    allocator: &'a oxc_allocator::Allocator,
) -> usize {
    crate::transforms::run_pass(program, state, allocator, |pass: &mut EmptyStatementCleanup| {
        pass.removed()
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

    fn run_cleanup(code: &str) -> (String, usize) {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, code, SourceType::mjs()).parse();
        let mut program = ret.program;
        let mut state = EngineState::new();
        let changes = run(&mut program, &mut state, &allocator);
        (Codegen::new().build(&program).code, changes)
    }

    #[test]
    fn test_remove_stray_semicolons() {
        let (output, removed) = run_cleanup("a();;; b();");
        assert_eq!(removed, 2);
        assert!(output.contains("a()"), "got: {}", output);
        assert!(output.contains("b()"), "got: {}", output);
    }

    #[test]
    fn test_remove_inside_function() {
        let (output, removed) = run_cleanup("function f() { ; return 1; }");
        assert_eq!(removed, 1);
        assert!(!output.contains(";;"), "got: {}", output);
    }

    #[test]
    fn test_nothing_to_remove() {
        let (_, removed) = run_cleanup("a();");
        assert_eq!(removed, 0);
    }
}
