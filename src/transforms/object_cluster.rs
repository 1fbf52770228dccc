//! Object indirection-table indexing pass
//!
//! Obfuscators route values and operations through literal objects:
//!
//! ```js
//! var t = { "ab": "value" };
//! t["cd"] = function (a, b) { return a + b; };
//! use(t["ab"], t["cd"](1, 2));
//! ```
//!
//! This pass snapshots every `var name = { ... }` object literal into the
//! engine's object index, keyed by `(decl_start, name)` so shadowed names
//! stay apart, then folds later `name.key = value` assignments into the
//! snapshot and drops them from the tree (also when they sit inside a comma
//! expression). Only constant bindings participate: one declaration, no
//! reassignment of the object name itself.
//!
//! The snapshot values feed the member inliner, which does the actual
//! call-site rewriting.

use oxc_allocator::{CloneIn, Vec as OxcVec};
use oxc_ast::ast::*;
use oxc_traverse::{Traverse, TraverseCtx};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::transforms::state::{
    EngineState, FnTemplate, LitValue, MemberValue, ObjectKey, ObjectSnapshot, ReturnExpr,
};

pub type Ctx<'a> = TraverseCtx<'a, EngineState>;

/// Phase one: find object-literal declarations and disqualify names that are
/// redeclared or reassigned.
#[derive(Default)]
pub struct ClusterCollector {
    pub declarations: FxHashMap<String, usize>,
    pub writes: FxHashMap<String, usize>,
    pub objects: Vec<(ObjectKey, ObjectSnapshot)>,
}

impl ClusterCollector {
    fn lift_member_value(expr: &Expression<'_>) -> Option<MemberValue> {
        if let Expression::FunctionExpression(func) = expr {
            return Self::lift_function(func);
        }
        let lifted = ReturnExpr::lift(expr, &[])?;
        match lifted {
            ReturnExpr::Value(value) => Some(MemberValue::Lit(value)),
            other => Some(MemberValue::Template(FnTemplate {
                param_count: 0,
                ret: other,
            })),
        }
    }

    fn lift_function(func: &Function<'_>) -> Option<MemberValue> {
        if func.r#async || func.generator {
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

        let lifted = ReturnExpr::lift(argument, &params)?;
        Some(MemberValue::Template(FnTemplate {
            param_count: params.len(),
            ret: lifted,
        }))
    }

    fn property_key(key: &PropertyKey<'_>) -> Option<String> {
        match key {
            PropertyKey::StringLiteral(lit) => Some(lit.value.to_string()),
            PropertyKey::Identifier(ident) => Some(ident.name.to_string()),
            _ => None,
        }
    }

    fn snapshot_object(obj: &ObjectExpression<'_>) -> ObjectSnapshot {
        let mut snapshot = ObjectSnapshot::default();
        for prop in &obj.properties {
            let ObjectPropertyKind::ObjectProperty(p) = prop else {
                continue;
            };
            let Some(key) = Self::property_key(&p.key) else {
                continue;
            };
            if let Some(value) = Self::lift_member_value(&p.value) {
                snapshot.props.insert(key, value);
            }
        }
        snapshot
    }
}

impl<'a> Traverse<'a, EngineState> for ClusterCollector {
    fn enter_binding_identifier(&mut self, ident: &mut BindingIdentifier<'a>, _ctx: &mut Ctx<'a>) {
        *self
            .declarations
            .entry(ident.name.to_string())
            .or_insert(0) += 1;
    }

    fn enter_variable_declarator(&mut self, decl: &mut VariableDeclarator<'a>, _ctx: &mut Ctx<'a>) {
        let BindingPatternKind::BindingIdentifier(ident) = &decl.id.kind else {
            return;
        };
        let Some(Expression::ObjectExpression(obj)) = &decl.init else {
            return;
        };
        let snapshot = Self::snapshot_object(obj);
        eprintln!(
            "[CLUSTER] Indexed object {} with {} usable properties",
            ident.name,
            snapshot.props.len()
        );
        self.objects
            .push(((decl.span.start, ident.name.to_string()), snapshot));
    }

    fn enter_assignment_expression(
        &mut self,
        expr: &mut AssignmentExpression<'a>,
        _ctx: &mut Ctx<'a>,
    ) {
        if let AssignmentTarget::AssignmentTargetIdentifier(ident) = &expr.left {
            *self.writes.entry(ident.name.to_string()).or_insert(0) += 1;
        }
    }
}

/// Phase two: fold `name.key = value` assignments into the index and remove
/// them from the tree.
pub struct ClusterFolder {
    changes: usize,
}

impl ClusterFolder {
    pub fn new() -> Self {
        Self { changes: 0 }
    }

    pub fn changes(&self) -> usize {
        self.changes
    }

    /// `(object_key, property, value)` for a foldable member assignment.
    fn foldable_assignment(
        expr: &Expression<'_>,
        state: &EngineState,
    ) -> Option<(ObjectKey, String, MemberValue)> {
        let Expression::AssignmentExpression(assign) = expr else {
            return None;
        };
        if assign.operator != AssignmentOperator::Assign {
            return None;
        }

        let (object_name, prop) = match &assign.left {
            AssignmentTarget::StaticMemberExpression(member) => {
                let Expression::Identifier(obj) = &member.object else {
                    return None;
                };
                (obj.name.to_string(), member.property.name.to_string())
            }
            AssignmentTarget::ComputedMemberExpression(member) => {
                let Expression::Identifier(obj) = &member.object else {
                    return None;
                };
                let Expression::StringLiteral(key) = &member.expression else {
                    return None;
                };
                (obj.name.to_string(), key.value.to_string())
            }
            _ => return None,
        };

        let key = state.objects_by_name.get(&object_name)?.clone();
        let value = ClusterCollector::lift_member_value(&assign.right)?;
        Some((key, prop, value))
    }

    fn rebuild_list<'a>(&mut self, body: &mut OxcVec<'a, Statement<'a>>, ctx: &mut Ctx<'a>) {
        let has_foldable = body.iter().any(|s| {
            matches!(s, Statement::ExpressionStatement(stmt)
                if Self::foldable_assignment(&stmt.expression, &ctx.state).is_some())
        });
        if !has_foldable {
            return;
        }

        let mut new_body = ctx.ast.vec();
        for stmt in body.iter() {
            if let Statement::ExpressionStatement(expr_stmt) = stmt {
                if let Some((key, prop, value)) =
                    Self::foldable_assignment(&expr_stmt.expression, &ctx.state)
                {
                    eprintln!("[CLUSTER] Folding {}.{} into index", key.1, prop);
                    if let Some(snapshot) = ctx.state.object_index.get_mut(&key) {
                        snapshot.props.insert(prop, value);
                    }
                    self.changes += 1;
                    continue;
                }
            }
            new_body.push(stmt.clone_in(ctx.ast.allocator));
        }
        *body = new_body;
    }
}

impl Default for ClusterFolder {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Traverse<'a, EngineState> for ClusterFolder {
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

    fn exit_expression(&mut self, expr: &mut Expression<'a>, ctx: &mut Ctx<'a>) {
        let Expression::SequenceExpression(seq) = expr else {
            return;
        };
        let last = seq.expressions.len().saturating_sub(1);
        let foldable: Vec<usize> = seq
            .expressions
            .iter()
            .enumerate()
            // The final expression is the sequence's value; it stays.
            .filter(|(i, e)| *i < last && Self::foldable_assignment(e, &ctx.state).is_some())
            .map(|(i, _)| i)
            .collect();
        if foldable.is_empty() {
            return;
        }

        let mut kept = ctx.ast.vec();
        for (i, e) in seq.expressions.iter().enumerate() {
            if foldable.contains(&i) {
                if let Some((key, prop, value)) = Self::foldable_assignment(e, &ctx.state) {
                    if let Some(snapshot) = ctx.state.object_index.get_mut(&key) {
                        snapshot.props.insert(prop, value);
                    }
                    self.changes += 1;
                    continue;
                }
            }
            kept.push(e.clone_in(ctx.ast.allocator));
        }

        if kept.len() == 1 {
            let only = kept.pop().unwrap();
            *expr = only;
        } else {
            *expr = Expression::SequenceExpression(ctx.ast.alloc(SequenceExpression {
                span: oxc_span::SPAN,
                expressions: kept,
            }));
        }
    }
}

pub fn run<'a>(
    program: &mut Program<'a>,
    state: &mut EngineState,
    allocator: &'a oxc_allocator::Allocator,
) -> usize {
    let mut collector = ClusterCollector::default();
    crate::transforms::run_collector(program, state, allocator, &mut collector);

    state.object_index.clear();
    state.objects_by_name.clear();

    let mut ambiguous: FxHashSet<String> = FxHashSet::default();
    for (key, snapshot) in collector.objects {
        let name = key.1.clone();
        let constant = collector.declarations.get(&name).copied().unwrap_or(0) == 1
            && collector.writes.get(&name).copied().unwrap_or(0) == 0;
        if !constant || ambiguous.contains(&name) {
            continue;
        }
        if state.objects_by_name.contains_key(&name) {
            // Same name declared twice; drop both rather than guess.
            ambiguous.insert(name.clone());
            let stale = state.objects_by_name.remove(&name);
            if let Some(stale_key) = stale {
                state.object_index.remove(&stale_key);
            }
            continue;
        }
        state.objects_by_name.insert(name, key.clone());
        state.object_index.insert(key, snapshot);
    }

    let mut folder = ClusterFolder::new();
    crate::transforms::run_collector(program, state, allocator, &mut folder);
    folder.changes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::state::EngineState;
    use oxc_allocator::Allocator;
    use oxc_codegen::Codegen;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn run_cluster(code: &str) -> (String, usize, EngineState) {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, code, SourceType::mjs()).parse();
        let mut program = ret.program;
        let mut state = EngineState::new();
        let changes = run(&mut program, &mut state, &allocator);
        (Codegen::new().build(&program).code, changes, state)
    }

    #[test]
    fn test_index_object_literal() {
        let (_, _, state) = run_cluster(r#"var t = { "ab": "value", "cd": 7 };"#);
        assert_eq!(state.object_index.len(), 1);
        let key = state.objects_by_name.get("t").expect("t indexed");
        let snapshot = &state.object_index[key];
        assert!(matches!(
            snapshot.props.get("ab"),
            Some(MemberValue::Lit(LitValue::String(s))) if s == "value"
        ));
        assert!(matches!(
            snapshot.props.get("cd"),
            Some(MemberValue::Lit(LitValue::Number(n))) if *n == 7.0
        ));
    }

    #[test]
    fn test_fold_member_assignment() {
        let (output, changes, state) = run_cluster(
            r#"var t = {}; t["k"] = "late"; use(t);"#,
        );
        assert_eq!(changes, 1);
        assert!(!output.contains(r#"t["k"] ="#), "assignment removed: {}", output);
        let key = state.objects_by_name.get("t").expect("t indexed");
        assert!(matches!(
            state.object_index[key].props.get("k"),
            Some(MemberValue::Lit(LitValue::String(s))) if s == "late"
        ));
    }

    #[test]
    fn test_fold_function_assignment() {
        let (output, changes, state) = run_cluster(
            r#"var t = {}; t.sum = function (a, b) { return a + b; };"#,
        );
        assert_eq!(changes, 1);
        assert!(!output.contains("t.sum"), "assignment removed: {}", output);
        let key = state.objects_by_name.get("t").expect("t indexed");
        assert!(matches!(
            state.object_index[key].props.get("sum"),
            Some(MemberValue::Template(t)) if t.param_count == 2
        ));
    }

    #[test]
    fn test_fold_assignment_inside_sequence() {
        let (output, changes, _) = run_cluster(
            r#"var t = {}; f((t["k"] = 1, other()));"#,
        );
        assert_eq!(changes, 1);
        assert!(output.contains("f(other())"), "got: {}", output);
    }

    #[test]
    fn test_reassigned_object_not_indexed() {
        let (output, changes, state) = run_cluster(
            r#"var t = { "k": 1 }; t = other; t["k"] = 2;"#,
        );
        assert_eq!(changes, 0, "reassigned object must not fold");
        assert!(state.objects_by_name.get("t").is_none());
        assert!(output.contains(r#"t["k"] = 2"#), "got: {}", output);
    }

    #[test]
    fn test_duplicate_names_dropped() {
        let (_, _, state) = run_cluster(
            "function f() { var t = { a: 1 }; } function g() { var t = { b: 2 }; }",
        );
        assert!(state.objects_by_name.get("t").is_none(), "ambiguous name dropped");
    }
}
