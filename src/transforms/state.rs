//! Shared state threaded through every transform via `TraverseCtx`.
//!
//! The two long-lived structures the pipeline shares are the object index
//! (snapshots of literal objects used as indirection tables, keyed by
//! declaration start offset + name so shadowed names stay distinct) and the
//! decoder set (function names the decoder subsystem classified, read-only
//! once populated). Everything else is pass-local.

use oxc_ast::ast::*;
use oxc_span::SPAN;
use oxc_syntax::number::NumberBase;
use oxc_traverse::TraverseCtx;
use rustc_hash::{FxHashMap, FxHashSet};

pub type ObjectKey = (u32, String);

#[derive(Default)]
pub struct EngineState {
    /// `(decl_start, name)` -> snapshot of a literal object used as an
    /// indirection table.
    pub object_index: FxHashMap<ObjectKey, ObjectSnapshot>,
    /// Name -> index key, for member-site lookup. Names declared more than
    /// once are evicted rather than guessed at.
    pub objects_by_name: FxHashMap<String, ObjectKey>,
    /// Decoder function names (located + user-forced).
    pub decoders: FxHashSet<String>,
    /// Every name declared anywhere in the program; used to mint fresh
    /// identifiers that cannot collide.
    pub declared_names: FxHashSet<String>,
    /// Relayed configuration (see `Options`).
    pub keep_program_scope_vars: bool,
    pub proxy_depth: usize,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint an identifier not declared anywhere in the program, by
    /// underscore-prefixing until the name is unused.
    pub fn fresh_name(&mut self, base: &str) -> String {
        let mut candidate = format!("_{}", base);
        while self.declared_names.contains(&candidate) {
            candidate.insert(0, '_');
        }
        self.declared_names.insert(candidate.clone());
        candidate
    }
}

/// A literal value lifted out of the tree so it can outlive the pass that
/// found it.
#[derive(Debug, Clone, PartialEq)]
pub enum LitValue {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
    Identifier(String),
}

impl LitValue {
    pub fn from_expression(expr: &Expression<'_>) -> Option<LitValue> {
        match expr {
            Expression::NumericLiteral(lit) => Some(LitValue::Number(lit.value)),
            Expression::StringLiteral(lit) => Some(LitValue::String(lit.value.to_string())),
            Expression::BooleanLiteral(lit) => Some(LitValue::Bool(lit.value)),
            Expression::NullLiteral(_) => Some(LitValue::Null),
            Expression::Identifier(ident) => Some(LitValue::Identifier(ident.name.to_string())),
            _ => None,
        }
    }

    pub fn into_expression<'a, S>(&self, ctx: &mut TraverseCtx<'a, S>) -> Expression<'a> {
        match self {
            LitValue::Number(n) => Expression::NumericLiteral(ctx.ast.alloc(NumericLiteral {
                span: SPAN,
                value: *n,
                raw: None,
                base: NumberBase::Decimal,
            })),
            LitValue::String(s) => Expression::StringLiteral(ctx.ast.alloc(StringLiteral {
                span: SPAN,
                value: ctx.ast.atom(s.as_str()),
                raw: None,
                lone_surrogates: false,
            })),
            LitValue::Bool(b) => Expression::BooleanLiteral(ctx.ast.alloc(BooleanLiteral {
                span: SPAN,
                value: *b,
            })),
            LitValue::Null => Expression::NullLiteral(ctx.ast.alloc(NullLiteral { span: SPAN })),
            LitValue::Identifier(name) => {
                Expression::Identifier(ctx.ast.alloc(IdentifierReference {
                    span: SPAN,
                    name: ctx.ast.atom(name.as_str()),
                    reference_id: None.into(),
                }))
            }
        }
    }
}

/// Snapshot of an object literal that acts as an indirection table.
#[derive(Debug, Clone, Default)]
pub struct ObjectSnapshot {
    pub props: FxHashMap<String, MemberValue>,
}

#[derive(Debug, Clone)]
pub enum MemberValue {
    Lit(LitValue),
    Template(FnTemplate),
}

/// A single-return function body reduced to a substitutable template.
/// Shared by the object-member inliner (function-table entries) and the
/// wrapper-call collapser (`function W(a) { return F(a + 1); }`).
#[derive(Debug, Clone)]
pub struct FnTemplate {
    pub param_count: usize,
    pub ret: ReturnExpr,
}

#[derive(Debug, Clone)]
pub enum ReturnExpr {
    Param(usize),
    Value(LitValue),
    Binary {
        op: BinaryOperator,
        left: Box<ReturnExpr>,
        right: Box<ReturnExpr>,
    },
    Logical {
        op: LogicalOperator,
        left: Box<ReturnExpr>,
        right: Box<ReturnExpr>,
    },
    Unary {
        op: UnaryOperator,
        arg: Box<ReturnExpr>,
    },
    Call {
        callee: Box<ReturnExpr>,
        args: Vec<ReturnExpr>,
    },
}

impl ReturnExpr {
    /// Lift an expression into a template, mapping reads of `params` to
    /// positional slots. Returns `None` for any shape that cannot be
    /// substituted without re-evaluating effects.
    pub fn lift(expr: &Expression<'_>, params: &[String]) -> Option<ReturnExpr> {
        match expr {
            Expression::Identifier(ident) => {
                let name = ident.name.as_str();
                if let Some(idx) = params.iter().position(|p| p == name) {
                    Some(ReturnExpr::Param(idx))
                } else {
                    Some(ReturnExpr::Value(LitValue::Identifier(name.to_string())))
                }
            }
            Expression::NumericLiteral(_)
            | Expression::StringLiteral(_)
            | Expression::BooleanLiteral(_)
            | Expression::NullLiteral(_) => {
                LitValue::from_expression(expr).map(ReturnExpr::Value)
            }
            Expression::BinaryExpression(bin) => Some(ReturnExpr::Binary {
                op: bin.operator,
                left: Box::new(Self::lift(&bin.left, params)?),
                right: Box::new(Self::lift(&bin.right, params)?),
            }),
            Expression::LogicalExpression(logical) => Some(ReturnExpr::Logical {
                op: logical.operator,
                left: Box::new(Self::lift(&logical.left, params)?),
                right: Box::new(Self::lift(&logical.right, params)?),
            }),
            Expression::UnaryExpression(unary) => Some(ReturnExpr::Unary {
                op: unary.operator,
                arg: Box::new(Self::lift(&unary.argument, params)?),
            }),
            Expression::CallExpression(call) => {
                let callee = Self::lift(&call.callee, params)?;
                let mut args = Vec::with_capacity(call.arguments.len());
                for arg in &call.arguments {
                    args.push(Self::lift(arg.as_expression()?, params)?);
                }
                Some(ReturnExpr::Call {
                    callee: Box::new(callee),
                    args,
                })
            }
            Expression::ParenthesizedExpression(paren) => Self::lift(&paren.expression, params),
            _ => None,
        }
    }

    /// Highest parameter slot this template reads, if any.
    pub fn max_param(&self) -> Option<usize> {
        match self {
            ReturnExpr::Param(i) => Some(*i),
            ReturnExpr::Value(_) => None,
            ReturnExpr::Binary { left, right, .. } | ReturnExpr::Logical { left, right, .. } => {
                match (left.max_param(), right.max_param()) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                }
            }
            ReturnExpr::Unary { arg, .. } => arg.max_param(),
            ReturnExpr::Call { callee, args } => args
                .iter()
                .chain(std::iter::once(callee.as_ref()))
                .filter_map(ReturnExpr::max_param)
                .max(),
        }
    }
}

/// Instantiate a template against the actual arguments of a call site.
/// Arguments are substituted in parameter order; the callee is never
/// reordered relative to its arguments, so evaluation order is preserved.
pub fn instantiate_template<'a, S>(
    template: &ReturnExpr,
    actuals: &[Expression<'a>],
    ctx: &mut TraverseCtx<'a, S>,
) -> Option<Expression<'a>> {
    use oxc_allocator::CloneIn;

    match template {
        ReturnExpr::Param(i) => {
            let actual = actuals.get(*i)?;
            Some(actual.clone_in(ctx.ast.allocator))
        }
        ReturnExpr::Value(value) => Some(value.into_expression(ctx)),
        ReturnExpr::Binary { op, left, right } => {
            let left = instantiate_template(left, actuals, ctx)?;
            let right = instantiate_template(right, actuals, ctx)?;
            Some(Expression::BinaryExpression(ctx.ast.alloc(
                BinaryExpression {
                    span: SPAN,
                    operator: *op,
                    left,
                    right,
                },
            )))
        }
        ReturnExpr::Logical { op, left, right } => {
            let left = instantiate_template(left, actuals, ctx)?;
            let right = instantiate_template(right, actuals, ctx)?;
            Some(Expression::LogicalExpression(ctx.ast.alloc(
                LogicalExpression {
                    span: SPAN,
                    operator: *op,
                    left,
                    right,
                },
            )))
        }
        ReturnExpr::Unary { op, arg } => {
            let argument = instantiate_template(arg, actuals, ctx)?;
            Some(Expression::UnaryExpression(ctx.ast.alloc(
                UnaryExpression {
                    span: SPAN,
                    operator: *op,
                    argument,
                },
            )))
        }
        ReturnExpr::Call { callee, args } => {
            let callee = instantiate_template(callee, actuals, ctx)?;
            let mut arguments = ctx.ast.vec();
            for arg in args {
                let expr = instantiate_template(arg, actuals, ctx)?;
                arguments.push(Argument::from(expr));
            }
            Some(Expression::CallExpression(ctx.ast.alloc(CallExpression {
                span: SPAN,
                callee,
                type_arguments: None,
                arguments,
                optional: false,
                pure: false,
            })))
        }
    }
}
