//! Sequence expression splitting pass
//!
//! Obfuscators join unrelated statements with the comma operator. This pass
//! splits them back out wherever the trailing value's role can be preserved:
//!
//! ```js
//! a = 1, b = 2, c();           // => a = 1; b = 2; c();
//! return a = 1, b;             // => a = 1; return b;
//! if ((f(), x)) { ... }        // => f(); if (x) { ... }
//! var v = (f(), g());          // => f(); var v = g();
//! ```
//!
//! A `for` whose init is a sequence of assignments to `var`s hoisted inside
//! the body gets those assignments lifted into `var name = expr;` statements
//! before the loop, and the now-dead bare `var name;` declarators inside the
//! body are dropped:
//!
//! ```js
//! for (a = 1, w = x.split("|"), void 0;;) { var a; var w; break; }
//! // => var a = 1; var w = x.split("|"); for (void 0;;) { break; }
//! ```

use oxc_allocator::{CloneIn, Vec as OxcVec};
use oxc_ast::ast::*;
use oxc_span::SPAN;
use oxc_traverse::{Traverse, TraverseCtx};
use rustc_hash::FxHashSet;

use crate::transforms::state::EngineState;

pub type Ctx<'a> = TraverseCtx<'a, EngineState>;

pub struct SequenceSplitter {
    split_count: usize,
}

impl SequenceSplitter {
    pub fn new() -> Self {
        Self { split_count: 0 }
    }

    pub fn split_count(&self) -> usize {
        self.split_count
    }

    fn needs_split(stmt: &Statement<'_>) -> bool {
        match stmt {
            Statement::ExpressionStatement(expr_stmt) => {
                matches!(expr_stmt.expression, Expression::SequenceExpression(_))
            }
            Statement::ReturnStatement(ret) => {
                matches!(ret.argument, Some(Expression::SequenceExpression(_)))
            }
            Statement::ThrowStatement(throw) => {
                matches!(throw.argument, Expression::SequenceExpression(_))
            }
            Statement::IfStatement(if_stmt) => {
                matches!(if_stmt.test, Expression::SequenceExpression(_))
            }
            Statement::SwitchStatement(switch) => {
                matches!(switch.discriminant, Expression::SequenceExpression(_))
            }
            Statement::ForInStatement(for_in) => {
                matches!(for_in.right, Expression::SequenceExpression(_))
            }
            Statement::VariableDeclaration(decl) => {
                decl.declarations.len() == 1
                    && matches!(
                        decl.declarations[0].init,
                        Some(Expression::SequenceExpression(_))
                    )
            }
            Statement::ForStatement(for_stmt) => {
                matches!(for_stmt.init, Some(ForStatementInit::SequenceExpression(_)))
                    || (Self::body_is_empty(&for_stmt.body)
                        && matches!(for_stmt.update, Some(Expression::SequenceExpression(_))))
            }
            _ => false,
        }
    }

    fn body_is_empty(body: &Statement<'_>) -> bool {
        match body {
            Statement::EmptyStatement(_) => true,
            Statement::BlockStatement(block) => block.body.is_empty(),
            _ => false,
        }
    }

    /// Emit every expression but the last as its own statement; return the
    /// final expression for its original role.
    fn peel<'a>(
        seq: &SequenceExpression<'a>,
        out: &mut OxcVec<'a, Statement<'a>>,
        ctx: &mut Ctx<'a>,
    ) -> Expression<'a> {
        let last = seq.expressions.len() - 1;
        for expr in seq.expressions.iter().take(last) {
            let cloned = expr.clone_in(ctx.ast.allocator);
            out.push(ctx.ast.statement_expression(SPAN, cloned));
        }
        seq.expressions[last].clone_in(ctx.ast.allocator)
    }

    fn var_statement<'a>(name: &str, init: Expression<'a>, ctx: &mut Ctx<'a>) -> Statement<'a> {
        let id = BindingPatternKind::BindingIdentifier(ctx.ast.alloc(BindingIdentifier {
            span: SPAN,
            name: ctx.ast.atom(name),
            symbol_id: None.into(),
        }));
        let mut declarations = ctx.ast.vec();
        declarations.push(VariableDeclarator {
            span: SPAN,
            kind: VariableDeclarationKind::Var,
            id,
            type_annotation: None,
            init: Some(init),
            definite: false,
        });
        Statement::VariableDeclaration(ctx.ast.alloc(VariableDeclaration {
            span: SPAN,
            kind: VariableDeclarationKind::Var,
            declarations,
            declare: false,
        }))
    }

    /// Names declared by bare `var name;` declarators anywhere directly in
    /// the loop body.
    fn bare_var_names(body: &Statement<'_>) -> FxHashSet<String> {
        let mut names = FxHashSet::default();
        let stmts: &[Statement<'_>] = match body {
            Statement::BlockStatement(block) => &block.body,
            _ => return names,
        };
        for stmt in stmts {
            if let Statement::VariableDeclaration(decl) = stmt {
                if decl.kind != VariableDeclarationKind::Var {
                    continue;
                }
                for d in &decl.declarations {
                    if d.init.is_some() {
                        continue;
                    }
                    if let BindingPatternKind::BindingIdentifier(ident) = &d.id.kind {
                        names.insert(ident.name.to_string());
                    }
                }
            }
        }
        names
    }

    /// Rebuild the loop body without the bare `var name;` declarators whose
    /// names were hoisted before the loop.
    fn strip_bare_vars<'a>(
        body: &Statement<'a>,
        hoisted: &FxHashSet<String>,
        ctx: &mut Ctx<'a>,
    ) -> Statement<'a> {
        let Statement::BlockStatement(block) = body else {
            return body.clone_in(ctx.ast.allocator);
        };

        let mut new_body = ctx.ast.vec();
        for stmt in &block.body {
            if let Statement::VariableDeclaration(decl) = stmt {
                if decl.kind == VariableDeclarationKind::Var {
                    let mut kept = ctx.ast.vec();
                    for d in &decl.declarations {
                        let dead = d.init.is_none()
                            && matches!(
                                &d.id,
                                BindingPatternKind::BindingIdentifier(ident)
                                    if hoisted.contains(ident.name.as_str())
                            );
                        if !dead {
                            kept.push(d.clone_in(ctx.ast.allocator));
                        }
                    }
                    if kept.is_empty() {
                        continue;
                    }
                    new_body.push(Statement::VariableDeclaration(ctx.ast.alloc(
                        VariableDeclaration {
                            span: SPAN,
                            kind: decl.kind,
                            declarations: kept,
                            declare: decl.declare,
                        },
                    )));
                    continue;
                }
            }
            new_body.push(stmt.clone_in(ctx.ast.allocator));
        }
        Statement::BlockStatement(ctx.ast.alloc(BlockStatement {
            span: SPAN,
            body: new_body,
            scope_id: None.into(),
        }))
    }

    /// Expand one statement into `out`. Returns true when a split happened.
    fn expand_statement<'a>(
        &mut self,
        stmt: &Statement<'a>,
        out: &mut OxcVec<'a, Statement<'a>>,
        ctx: &mut Ctx<'a>,
    ) -> bool {
        match stmt {
            Statement::ExpressionStatement(expr_stmt) => {
                let Expression::SequenceExpression(seq) = &expr_stmt.expression else {
                    return false;
                };
                eprintln!(
                    "[SEQ_SPLIT] Splitting statement sequence with {} expressions",
                    seq.expressions.len()
                );
                for expr in seq.expressions.iter() {
                    let cloned = expr.clone_in(ctx.ast.allocator);
                    out.push(ctx.ast.statement_expression(SPAN, cloned));
                }
                true
            }
            Statement::ReturnStatement(ret) => {
                let Some(Expression::SequenceExpression(seq)) = &ret.argument else {
                    return false;
                };
                let last = Self::peel(seq, out, ctx);
                out.push(Statement::ReturnStatement(ctx.ast.alloc(ReturnStatement {
                    span: SPAN,
                    argument: Some(last),
                })));
                true
            }
            Statement::ThrowStatement(throw) => {
                let Expression::SequenceExpression(seq) = &throw.argument else {
                    return false;
                };
                let last = Self::peel(seq, out, ctx);
                out.push(Statement::ThrowStatement(ctx.ast.alloc(ThrowStatement {
                    span: SPAN,
                    argument: last,
                })));
                true
            }
            Statement::IfStatement(if_stmt) => {
                let Expression::SequenceExpression(seq) = &if_stmt.test else {
                    return false;
                };
                let test = Self::peel(seq, out, ctx);
                out.push(Statement::IfStatement(ctx.ast.alloc(IfStatement {
                    span: SPAN,
                    test,
                    consequent: if_stmt.consequent.clone_in(ctx.ast.allocator),
                    alternate: if_stmt.alternate.clone_in(ctx.ast.allocator),
                })));
                true
            }
            Statement::SwitchStatement(switch) => {
                let Expression::SequenceExpression(seq) = &switch.discriminant else {
                    return false;
                };
                let discriminant = Self::peel(seq, out, ctx);
                let mut cases = ctx.ast.vec();
                for case in &switch.cases {
                    cases.push(case.clone_in(ctx.ast.allocator));
                }
                out.push(Statement::SwitchStatement(ctx.ast.alloc(SwitchStatement {
                    span: SPAN,
                    discriminant,
                    cases,
                    scope_id: None.into(),
                })));
                true
            }
            Statement::ForInStatement(for_in) => {
                let Expression::SequenceExpression(seq) = &for_in.right else {
                    return false;
                };
                let right = Self::peel(seq, out, ctx);
                out.push(Statement::ForInStatement(ctx.ast.alloc(ForInStatement {
                    span: SPAN,
                    left: for_in.left.clone_in(ctx.ast.allocator),
                    right,
                    body: for_in.body.clone_in(ctx.ast.allocator),
                    scope_id: None.into(),
                })));
                true
            }
            Statement::VariableDeclaration(decl) => {
                if decl.declarations.len() != 1 {
                    return false;
                }
                let declarator = &decl.declarations[0];
                let Some(Expression::SequenceExpression(seq)) = &declarator.init else {
                    return false;
                };
                let init = Self::peel(seq, out, ctx);
                let mut declarations = ctx.ast.vec();
                declarations.push(VariableDeclarator {
                    span: SPAN,
                    kind: decl.kind,
                    id: declarator.id.clone_in(ctx.ast.allocator),
                    type_annotation: None,
                    init: Some(init),
                    definite: false,
                });
                out.push(Statement::VariableDeclaration(ctx.ast.alloc(
                    VariableDeclaration {
                        span: SPAN,
                        kind: decl.kind,
                        declarations,
                        declare: decl.declare,
                    },
                )));
                true
            }
            Statement::ForStatement(for_stmt) => self.expand_for(for_stmt, out, ctx),
            _ => false,
        }
    }

    /// `for (...; ...; a++, b++) ;` with nothing in the body becomes
    /// `for (...; ...;) { a++; b++; }`; per-iteration order is unchanged
    /// when there is no body to interleave with.
    fn expand_for_update<'a>(
        for_stmt: &ForStatement<'a>,
        out: &mut OxcVec<'a, Statement<'a>>,
        ctx: &mut Ctx<'a>,
    ) -> bool {
        if !Self::body_is_empty(&for_stmt.body) {
            return false;
        }
        let Some(Expression::SequenceExpression(seq)) = &for_stmt.update else {
            return false;
        };

        let mut body_stmts = ctx.ast.vec();
        for expr in seq.expressions.iter() {
            let cloned = expr.clone_in(ctx.ast.allocator);
            body_stmts.push(ctx.ast.statement_expression(SPAN, cloned));
        }
        let body = Statement::BlockStatement(ctx.ast.alloc(BlockStatement {
            span: SPAN,
            body: body_stmts,
            scope_id: None.into(),
        }));
        out.push(Statement::ForStatement(ctx.ast.alloc(ForStatement {
            span: SPAN,
            init: for_stmt.init.clone_in(ctx.ast.allocator),
            test: for_stmt.test.clone_in(ctx.ast.allocator),
            update: None,
            body,
            scope_id: None.into(),
        })));
        true
    }

    fn expand_for<'a>(
        &mut self,
        for_stmt: &ForStatement<'a>,
        out: &mut OxcVec<'a, Statement<'a>>,
        ctx: &mut Ctx<'a>,
    ) -> bool {
        let Some(ForStatementInit::SequenceExpression(seq)) = &for_stmt.init else {
            return Self::expand_for_update(for_stmt, out, ctx);
        };

        let hoistable = Self::bare_var_names(&for_stmt.body);
        let mut hoisted = FxHashSet::default();
        let mut remaining: Vec<&Expression<'a>> = Vec::new();

        for expr in seq.expressions.iter() {
            if remaining.is_empty() {
                if let Expression::AssignmentExpression(assign) = expr {
                    if assign.operator == AssignmentOperator::Assign {
                        if let AssignmentTarget::AssignmentTargetIdentifier(target) = &assign.left {
                            let name = target.name.as_str();
                            if hoistable.contains(name) && !hoisted.contains(name) {
                                eprintln!("[SEQ_SPLIT] Hoisting var {} out of for-init", name);
                                let init = assign.right.clone_in(ctx.ast.allocator);
                                out.push(Self::var_statement(name, init, ctx));
                                hoisted.insert(name.to_string());
                                continue;
                            }
                        }
                    }
                }
            }
            remaining.push(expr);
        }

        if hoisted.is_empty() {
            return false;
        }

        let init = match remaining.len() {
            0 => None,
            1 => Some(ForStatementInit::from(
                remaining[0].clone_in(ctx.ast.allocator),
            )),
            _ => {
                let mut exprs = ctx.ast.vec();
                for expr in &remaining {
                    exprs.push(expr.clone_in(ctx.ast.allocator));
                }
                Some(ForStatementInit::SequenceExpression(ctx.ast.alloc(
                    SequenceExpression {
                        span: SPAN,
                        expressions: exprs,
                    },
                )))
            }
        };

        let body = Self::strip_bare_vars(&for_stmt.body, &hoisted, ctx);
        out.push(Statement::ForStatement(ctx.ast.alloc(ForStatement {
            span: SPAN,
            init,
            test: for_stmt.test.clone_in(ctx.ast.allocator),
            update: for_stmt.update.clone_in(ctx.ast.allocator),
            body,
            scope_id: None.into(),
        })));
        true
    }

    fn rebuild_list<'a>(&mut self, body: &mut OxcVec<'a, Statement<'a>>, ctx: &mut Ctx<'a>) {
        if !body.iter().any(Self::needs_split) {
            return;
        }

        let mut new_body = ctx.ast.vec();
        for stmt in body.iter() {
            if self.expand_statement(stmt, &mut new_body, ctx) {
                self.split_count += 1;
            } else {
                new_body.push(stmt.clone_in(ctx.ast.allocator));
            }
        }
        *body = new_body;
    }
}

impl Default for SequenceSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Traverse<'a, EngineState> for SequenceSplitter {
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
    crate::transforms::run_pass(program, state, allocator, |pass: &mut SequenceSplitter| {
        pass.split_count()
    })
}
