//! Self-invoking function unwrapping pass
//!
//! ```js
//! (function () { a(); b(); })();   // => { a(); b(); }
//! !function () { a(); }();         // => { a(); }
//! (() => { a(); })();              // => { a(); }
//! ```
//!
//! The hoisted body stays a block so any lexical declarations keep their
//! scope. A parameterised double IIFE is beta-reduced one level:
//!
//! ```js
//! (function (a) { return g(a); })("X")
//! // => g("X")
//! ```

use oxc_allocator::CloneIn;
use oxc_ast::ast::*;
use oxc_span::SPAN;
use oxc_traverse::{Traverse, TraverseCtx};

use crate::transforms::state::{EngineState, ReturnExpr};

pub type Ctx<'a> = TraverseCtx<'a, EngineState>;

#[derive(Default)]
pub struct IifeUnwrapper {
    changes: usize,
}

impl IifeUnwrapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> usize {
        self.changes
    }

    /// A discarded-result IIFE call: the call itself, possibly behind `!`,
    /// `void`, or parentheses.
    fn discarded_call<'a, 'b>(expr: &'b Expression<'a>) -> Option<&'b CallExpression<'a>> {
        match expr {
            Expression::CallExpression(call) => Some(call),
            Expression::UnaryExpression(unary)
                if matches!(
                    unary.operator,
                    UnaryOperator::LogicalNot | UnaryOperator::Void
                ) =>
            {
                Self::discarded_call(&unary.argument)
            }
            Expression::ParenthesizedExpression(paren) => Self::discarded_call(&paren.expression),
            _ => None,
        }
    }

    /// Body statements of a zero-parameter function/arrow callee.
    fn nullary_body<'a, 'b>(call: &'b CallExpression<'a>) -> Option<&'b FunctionBody<'a>> {
        if !call.arguments.is_empty() {
            return None;
        }
        let mut callee = &call.callee;
        while let Expression::ParenthesizedExpression(paren) = callee {
            callee = &paren.expression;
        }
        match callee {
            Expression::FunctionExpression(func) => {
                if func.r#async || func.generator || !func.params.items.is_empty() {
                    return None;
                }
                func.body.as_deref()
            }
            Expression::ArrowFunctionExpression(arrow) => {
                if arrow.r#async || arrow.expression || !arrow.params.items.is_empty() {
                    return None;
                }
                Some(&arrow.body)
            }
            _ => None,
        }
    }

    /// One level of beta reduction for a parameterised IIFE whose body is a
    /// single return of a substitutable expression.
    fn try_beta_reduce<'a>(
        call: &CallExpression<'a>,
        ctx: &mut Ctx<'a>,
    ) -> Option<Expression<'a>> {
        let mut callee = &call.callee;
        while let Expression::ParenthesizedExpression(paren) = callee {
            callee = &paren.expression;
        }
        let Expression::FunctionExpression(func) = callee else {
            return None;
        };
        if func.r#async || func.generator || func.params.items.is_empty() {
            return None;
        }

        let body = func.body.as_ref()?;
        if body.statements.len() != 1 {
            return None;
        }
        let Statement::ReturnStatement(ret) = &body.statements[0] else {
            return None;
        };
        let argument = ret.argument.as_ref()?;

        let mut params = Vec::with_capacity(func.params.items.len());
        for item in &func.params.items {
            let BindingPatternKind::BindingIdentifier(ident) = &item.pattern.kind else {
                return None;
            };
            params.push(ident.name.to_string());
        }

        let template = ReturnExpr::lift(argument, &params)?;
        let mut actuals = Vec::with_capacity(call.arguments.len());
        for arg in &call.arguments {
            actuals.push(arg.as_expression()?.clone_in(ctx.ast.allocator));
        }
        if let Some(max) = template.max_param() {
            if max >= actuals.len() {
                return None;
            }
        }

        crate::transforms::state::instantiate_template(&template, &actuals, ctx)
    }
}

impl<'a> Traverse<'a, EngineState> for IifeUnwrapper {
    fn exit_statement(&mut self, stmt: &mut Statement<'a>, ctx: &mut Ctx<'a>) {
        let Statement::ExpressionStatement(expr_stmt) = stmt else {
            return;
        };
        let Some(call) = Self::discarded_call(&expr_stmt.expression) else {
            return;
        };
        let Some(body) = Self::nullary_body(call) else {
            return;
        };

        eprintln!(
            "[IIFE] Hoisting self-invoking function body ({} statements)",
            body.statements.len()
        );
        let mut hoisted = ctx.ast.vec();
        for inner in &body.statements {
            hoisted.push(inner.clone_in(ctx.ast.allocator));
        }
        *stmt = Statement::BlockStatement(ctx.ast.alloc(BlockStatement {
            span: SPAN,
            body: hoisted,
            scope_id: None.into(),
        }));
        self.changes += 1;
    }

    fn exit_expression(&mut self, expr: &mut Expression<'a>, ctx: &mut Ctx<'a>) {
        let Expression::CallExpression(call) = expr else {
            return;
        };
        if let Some(reduced) = Self::try_beta_reduce(call, ctx) {
            eprintln!("[IIFE] Beta-reducing parameterised self-call");
            *expr = reduced;
            self.changes += 1;
        }
    }
}

pub fn run<'a>(
    program: &mut Program<'a>,
    state: &mut EngineState,
    allocator: &'a oxc_allocator::Allocator,
) -> usize {
    crate::transforms::run_pass(program, state, allocator, |pass: &mut IifeUnwrapper| {
        pass.changes()
    })
}
