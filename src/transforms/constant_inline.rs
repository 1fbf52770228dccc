//! Constant propagation pass
//!
//! Bindings declared exactly once, never reassigned, and initialized with a
//! string or numeric literal are inlined at every read and their
//! declarations dropped:
//!
//! ```js
//! let a = "debugger"; f(a);   // => f("debugger");
//! ```

use oxc_allocator::CloneIn;
use oxc_ast::ast::*;
use oxc_span::SPAN;
use oxc_traverse::{Traverse, TraverseCtx};
use rustc_hash::FxHashMap;

use crate::transforms::state::{EngineState, LitValue};

pub type Ctx<'a> = TraverseCtx<'a, EngineState>;

#[derive(Default)]
struct BindingFacts {
    declarations: usize,
    writes: usize,
    literal: Option<LitValue>,
}

/// First phase: gather declaration/write counts and literal initializers by
/// name. Names bound more than once anywhere (including as parameters or
/// catch bindings) are disqualified rather than scope-resolved; obfuscated
/// input gives bindings unique names, and a shadowed name just stays put.
#[derive(Default)]
pub struct ConstBindingCollector {
    facts: FxHashMap<String, BindingFacts>,
}

impl ConstBindingCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inlinable(&self) -> FxHashMap<String, LitValue> {
        self.facts
            .iter()
            .filter(|(_, f)| f.declarations == 1 && f.writes == 0)
            .filter_map(|(name, f)| f.literal.clone().map(|lit| (name.clone(), lit)))
            .collect()
    }

    fn entry(&mut self, name: &str) -> &mut BindingFacts {
        self.facts.entry(name.to_string()).or_default()
    }
}

impl<'a> Traverse<'a, EngineState> for ConstBindingCollector {
    fn enter_binding_identifier(&mut self, ident: &mut BindingIdentifier<'a>, _ctx: &mut Ctx<'a>) {
        self.entry(ident.name.as_str()).declarations += 1;
    }

    fn enter_variable_declarator(&mut self, decl: &mut VariableDeclarator<'a>, _ctx: &mut Ctx<'a>) {
        let BindingPatternKind::BindingIdentifier(ident) = &decl.id.kind else {
            return;
        };
        let literal = match &decl.init {
            Some(Expression::StringLiteral(lit)) => Some(LitValue::String(lit.value.to_string())),
            Some(Expression::NumericLiteral(lit)) => Some(LitValue::Number(lit.value)),
            _ => None,
        };
        if literal.is_some() {
            self.entry(ident.name.as_str()).literal = literal;
        }
    }

    fn enter_assignment_expression(
        &mut self,
        expr: &mut AssignmentExpression<'a>,
        _ctx: &mut Ctx<'a>,
    ) {
        if let AssignmentTarget::AssignmentTargetIdentifier(ident) = &expr.left {
            self.entry(ident.name.as_str()).writes += 1;
        }
    }

    fn enter_update_expression(&mut self, expr: &mut UpdateExpression<'a>, _ctx: &mut Ctx<'a>) {
        if let SimpleAssignmentTarget::AssignmentTargetIdentifier(ident) = &expr.argument {
            self.entry(ident.name.as_str()).writes += 1;
        }
    }
}

/// Second phase: replace reads and drop the declarations.
pub struct ConstInliner {
    constants: FxHashMap<String, LitValue>,
    changes: usize,
}

impl ConstInliner {
    pub fn new(constants: FxHashMap<String, LitValue>) -> Self {
        Self {
            constants,
            changes: 0,
        }
    }

    pub fn changes(&self) -> usize {
        self.changes
    }
}

impl<'a> Traverse<'a, EngineState> for ConstInliner {
    fn enter_expression(&mut self, expr: &mut Expression<'a>, ctx: &mut Ctx<'a>) {
        let Expression::Identifier(ident) = expr else {
            return;
        };
        let Some(value) = self.constants.get(ident.name.as_str()) else {
            return;
        };
        eprintln!("[INLINE] {} => {:?}", ident.name, value);
        let replacement = value.clone();
        *expr = replacement.into_expression(ctx);
        self.changes += 1;
    }

    fn exit_statement(&mut self, stmt: &mut Statement<'a>, ctx: &mut Ctx<'a>) {
        let Statement::VariableDeclaration(decl) = stmt else {
            return;
        };
        let is_constant = |d: &VariableDeclarator<'a>| {
            matches!(
                &d.id.kind,
                BindingPatternKind::BindingIdentifier(ident)
                    if self.constants.contains_key(ident.name.as_str())
            )
        };
        if !decl.declarations.iter().any(is_constant) {
            return;
        }

        let mut kept = ctx.ast.vec();
        for d in decl.declarations.iter() {
            if is_constant(d) {
                self.changes += 1;
            } else {
                kept.push(d.clone_in(ctx.ast.allocator));
            }
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
}

pub fn run<'a>(
    program: &mut Program<'a>,
    state: &mut EngineState,
    allocator: &'a oxc_allocator::Allocator,
) -> usize {
    let constants = {
        let mut collector = ConstBindingCollector::new();
        crate::transforms::run_collector(program, state, allocator, &mut collector);
        collector.inlinable()
    };
    if constants.is_empty() {
        return 0;
    }
    let mut inliner = ConstInliner::new(constants);
    crate::transforms::run_collector(program, state, allocator, &mut inliner);
    inliner.changes()
}
