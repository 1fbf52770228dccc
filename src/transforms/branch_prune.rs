//! Unreachable branch pruning pass
//!
//! Collapses conditionals whose test is a constant literal:
//!
//! ```js
//! if (false) { x(); } else { y(); }   // => y();
//! true ? a : b                        // => a
//! ```
//!
//! Block branches are spliced into the surrounding statement list. A
//! `let`/`const`/`class` the branch declares that collides with a name bound
//! elsewhere is alpha-renamed to a fresh identifier first; `var`s hoist in
//! the original program exactly as they do after splicing, so they move
//! as-is.

use oxc_allocator::{CloneIn, Vec as OxcVec};
use oxc_ast::ast::*;
use oxc_traverse::{Traverse, TraverseCtx};
use rustc_hash::FxHashMap;

use crate::transforms::rename::rename_in_statements;
use crate::transforms::state::EngineState;

pub type Ctx<'a> = TraverseCtx<'a, EngineState>;

/// Counts how many distinct binding sites use each name; names bound more
/// than once are collision candidates when a branch is hoisted.
#[derive(Default)]
pub struct BindingCounter {
    counts: FxHashMap<String, usize>,
}

impl<'a> Traverse<'a, EngineState> for BindingCounter {
    fn enter_binding_identifier(&mut self, ident: &mut BindingIdentifier<'a>, _ctx: &mut Ctx<'a>) {
        *self.counts.entry(ident.name.to_string()).or_insert(0) += 1;
    }
}

pub struct BranchPruner {
    binding_counts: FxHashMap<String, usize>,
    changes: usize,
}

impl BranchPruner {
    pub fn new(binding_counts: FxHashMap<String, usize>) -> Self {
        Self {
            binding_counts,
            changes: 0,
        }
    }

    pub fn changes(&self) -> usize {
        self.changes
    }

    fn literal_truthiness(expr: &Expression<'_>) -> Option<bool> {
        match expr {
            Expression::BooleanLiteral(lit) => Some(lit.value),
            Expression::NumericLiteral(lit) => Some(lit.value != 0.0 && !lit.value.is_nan()),
            Expression::StringLiteral(lit) => Some(!lit.value.is_empty()),
            Expression::NullLiteral(_) => Some(false),
            _ => None,
        }
    }

    /// Lexical names the branch declares at its top level.
    fn lexical_names(statements: &[Statement<'_>]) -> Vec<String> {
        let mut names = Vec::new();
        for stmt in statements {
            match stmt {
                Statement::VariableDeclaration(decl)
                    if decl.kind != VariableDeclarationKind::Var =>
                {
                    for d in &decl.declarations {
                        if let BindingPatternKind::BindingIdentifier(ident) = &d.id.kind {
                            names.push(ident.name.to_string());
                        }
                    }
                }
                Statement::ClassDeclaration(class) => {
                    if let Some(id) = &class.id {
                        names.push(id.name.to_string());
                    }
                }
                _ => {}
            }
        }
        names
    }

    /// Splice the statements of `branch` into `out`, alpha-renaming lexical
    /// declarations whose names are bound elsewhere in the program.
    fn splice_branch<'a>(
        &mut self,
        branch: &Statement<'a>,
        out: &mut OxcVec<'a, Statement<'a>>,
        ctx: &mut Ctx<'a>,
    ) {
        let Statement::BlockStatement(block) = branch else {
            out.push(branch.clone_in(ctx.ast.allocator));
            return;
        };

        let mut spliced = ctx.ast.vec();
        for stmt in &block.body {
            spliced.push(stmt.clone_in(ctx.ast.allocator));
        }

        for name in Self::lexical_names(&spliced) {
            let bound_elsewhere = self.binding_counts.get(&name).copied().unwrap_or(0) > 1;
            if bound_elsewhere {
                let fresh = ctx.state.fresh_name(&name);
                eprintln!(
                    "[PRUNE] Hoisted declaration {} collides, renaming to {}",
                    name, fresh
                );
                rename_in_statements(&mut spliced, &name, &fresh, ctx.ast.allocator);
            }
        }

        for stmt in spliced {
            out.push(stmt);
        }
    }

    fn rebuild_list<'a>(&mut self, body: &mut OxcVec<'a, Statement<'a>>, ctx: &mut Ctx<'a>) {
        let has_constant_if = body.iter().any(|s| {
            matches!(s, Statement::IfStatement(if_stmt)
                if Self::literal_truthiness(&if_stmt.test).is_some())
        });
        if !has_constant_if {
            return;
        }

        let mut new_body = ctx.ast.vec();
        for stmt in body.iter() {
            let Statement::IfStatement(if_stmt) = stmt else {
                new_body.push(stmt.clone_in(ctx.ast.allocator));
                continue;
            };
            let Some(truthy) = Self::literal_truthiness(&if_stmt.test) else {
                new_body.push(stmt.clone_in(ctx.ast.allocator));
                continue;
            };

            eprintln!("[PRUNE] if ({}) collapses to its {} branch", truthy, if truthy { "then" } else { "else" });
            self.changes += 1;
            if truthy {
                self.splice_branch(&if_stmt.consequent, &mut new_body, ctx);
            } else if let Some(alternate) = &if_stmt.alternate {
                self.splice_branch(alternate, &mut new_body, ctx);
            }
        }
        *body = new_body;
    }
}

impl<'a> Traverse<'a, EngineState> for BranchPruner {
    fn exit_expression(&mut self, expr: &mut Expression<'a>, ctx: &mut Ctx<'a>) {
        let Expression::ConditionalExpression(cond) = expr else {
            return;
        };
        let Some(truthy) = Self::literal_truthiness(&cond.test) else {
            return;
        };
        let taken = if truthy { &cond.consequent } else { &cond.alternate };
        *expr = taken.clone_in(ctx.ast.allocator);
        self.changes += 1;
    }

    fn exit_program(&mut self, program: &mut Program<'a>, ctx: &mut Ctx<'a>) {
        let mut body = std::mem::replace(&mut program.body, ctx.ast.vec());
        self.rebuild_list(&mut body, ctx);
        program.body = body;
    }

    fn exit_block_statement(&mut self, block: &mut BlockStatement<'a>, ctx: &mut Ctx<'a>) {
        let mut body = std::mem::replace(&mut block.body, ctx.ast.vec());
        self.rebuild_list(&mut body, ctx);
        block.body = body;
    }

    fn exit_function_body(&mut self, body: &mut FunctionBody<'a>, ctx: &mut Ctx<'a>) {
        let mut statements = std::mem::replace(&mut body.statements, ctx.ast.vec());
        self.rebuild_list(&mut statements, ctx);
        body.statements = statements;
    }
}

pub fn run<'a>(
    program: &mut Program<'a>,
    state: &mut EngineState,
    allocator: &'a oxc_allocator::Allocator,
) -> usize {
    let counts = {
        let mut counter = BindingCounter::default();
        crate::transforms::run_collector(program, state, allocator, &mut counter);
        counter.counts
    };
    state.declared_names.extend(counts.keys().cloned());

    let mut pruner = BranchPruner::new(counts);
    crate::transforms::run_collector(program, state, allocator, &mut pruner);
    pruner.changes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::state::EngineState;
    use oxc_allocator::Allocator;
    use oxc_codegen::Codegen;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn run_prune(code: &str) -> (String, usize) {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, code, SourceType::mjs()).parse();
        let mut program = ret.program;
        let mut state = EngineState::new();
        let changes = run(&mut program, &mut state, &allocator);
        (Codegen::new().build(&program).code, changes)
    }

    #[test]
    fn test_prune_false_branch() {
        let (output, changes) = run_prune("if (false) { x(); } else { y(); }");
        assert_eq!(changes, 1);
        assert!(output.contains("y()"), "got: {}", output);
        assert!(!output.contains("x()"), "got: {}", output);
        assert!(!output.contains("if"), "got: {}", output);
    }

    #[test]
    fn test_prune_true_branch() {
        let (output, _) = run_prune("if (1) { x(); }");
        assert!(output.contains("x()"), "got: {}", output);
        assert!(!output.contains("if"), "got: {}", output);
    }

    #[test]
    fn test_prune_false_without_else() {
        let (output, changes) = run_prune("if (0) { x(); } y();");
        assert_eq!(changes, 1);
        assert!(!output.contains("x()"), "got: {}", output);
        assert!(output.contains("y()"), "got: {}", output);
    }

    #[test]
    fn test_prune_ternary() {
        let (output, _) = run_prune("f(true ? a : b);");
        assert!(output.contains("f(a)"), "got: {}", output);
    }

    #[test]
    fn test_keep_dynamic_condition() {
        let (output, changes) = run_prune("if (cond) { x(); } else { y(); }");
        assert_eq!(changes, 0, "dynamic test stays");
        assert!(output.contains("if (cond)"), "got: {}", output);
    }

    #[test]
    fn test_hoisted_let_renamed_on_collision() {
        let (output, _) = run_prune(
            "let q = 1; if (true) { let q = 2; use(q); } f(q);",
        );
        assert!(output.contains("let q = 1"), "outer binding intact: {}", output);
        assert!(output.contains("let _q = 2"), "hoisted binding renamed: {}", output);
        assert!(output.contains("use(_q)"), "reference follows rename: {}", output);
        assert!(output.contains("f(q)"), "outer reference untouched: {}", output);
    }

    #[test]
    fn test_hoisted_let_kept_when_unique() {
        let (output, _) = run_prune("if (true) { let only = 2; use(only); }");
        assert!(output.contains("let only = 2"), "got: {}", output);
        assert!(!output.contains("_only"), "no rename needed: {}", output);
    }
}
