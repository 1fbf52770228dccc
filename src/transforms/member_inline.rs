//! Object member inlining pass
//!
//! Consumes the object index built by the cluster pass:
//!
//! ```js
//! var t = { "ab": "value", "op": function (a, b) { return a + b; } };
//! use(t["ab"]);      // => use("value");
//! use(t["op"](x, y)); // => use(x + y);
//! ```
//!
//! Member reads of literal-valued properties become value clones; calls
//! through function-valued properties are rewritten by the shape of the
//! single `return` (operator application or call templating, arguments
//! substituted in parameter order). Consumed properties are deleted from the
//! object literal afterwards, leaving the empty table for the dead-variable
//! sweep.
//!
//! Assignment targets and update operands are not expressions in the oxc
//! AST, so write positions like `t["ab"] = v` or `t["ab"]++` are never
//! rewritten here by construction.

use oxc_allocator::CloneIn;
use oxc_ast::ast::*;
use oxc_traverse::{Traverse, TraverseCtx};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::transforms::state::{instantiate_template, EngineState, MemberValue, ObjectKey};

pub type Ctx<'a> = TraverseCtx<'a, EngineState>;

#[derive(Default)]
pub struct MemberInliner {
    consumed: FxHashMap<ObjectKey, FxHashSet<String>>,
    changes: usize,
}

impl MemberInliner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> usize {
        self.changes
    }

    pub fn consumed(self) -> FxHashMap<ObjectKey, FxHashSet<String>> {
        self.consumed
    }

    /// Resolve `obj.key` / `obj["key"]` against the index.
    fn resolve_member(
        expr: &Expression<'_>,
        state: &EngineState,
    ) -> Option<(ObjectKey, String, MemberValue)> {
        let (object_name, prop) = match expr {
            Expression::StaticMemberExpression(member) => {
                let Expression::Identifier(obj) = &member.object else {
                    return None;
                };
                (obj.name.as_str(), member.property.name.to_string())
            }
            Expression::ComputedMemberExpression(member) => {
                let Expression::Identifier(obj) = &member.object else {
                    return None;
                };
                let Expression::StringLiteral(key) = &member.expression else {
                    return None;
                };
                (obj.name.as_str(), key.value.to_string())
            }
            _ => return None,
        };

        let key = state.objects_by_name.get(object_name)?.clone();
        let value = state.object_index.get(&key)?.props.get(&prop)?.clone();
        Some((key, prop, value))
    }

    fn mark_consumed(&mut self, key: ObjectKey, prop: String) {
        self.consumed.entry(key).or_default().insert(prop);
    }

    fn try_inline_read<'a>(
        &mut self,
        expr: &Expression<'a>,
        ctx: &mut Ctx<'a>,
    ) -> Option<Expression<'a>> {
        let (key, prop, value) = Self::resolve_member(expr, &ctx.state)?;
        let replacement = match value {
            MemberValue::Lit(lit) => lit.into_expression(ctx),
            MemberValue::Template(template) if template.param_count == 0 => {
                // Pure value expression saved through an assignment.
                instantiate_template(&template.ret, &[], ctx)?
            }
            MemberValue::Template(_) => return None,
        };
        eprintln!("[MEMBER] Inlining read {}[\"{}\"]", key.1, prop);
        self.mark_consumed(key, prop);
        Some(replacement)
    }

    fn try_inline_call<'a>(
        &mut self,
        call: &CallExpression<'a>,
        ctx: &mut Ctx<'a>,
    ) -> Option<Expression<'a>> {
        let (key, prop, value) = Self::resolve_member(&call.callee, &ctx.state)?;
        let MemberValue::Template(template) = value else {
            return None;
        };

        let mut actuals = Vec::with_capacity(call.arguments.len());
        for arg in &call.arguments {
            actuals.push(arg.as_expression()?.clone_in(ctx.ast.allocator));
        }
        if let Some(max) = template.ret.max_param() {
            if max >= actuals.len() {
                eprintln!(
                    "[MEMBER] {}[\"{}\"] needs {} args, call has {}",
                    key.1,
                    prop,
                    max + 1,
                    actuals.len()
                );
                return None;
            }
        }

        let replacement = instantiate_template(&template.ret, &actuals, ctx)?;
        eprintln!("[MEMBER] Rewriting call through {}[\"{}\"]", key.1, prop);
        self.mark_consumed(key, prop);
        Some(replacement)
    }
}

impl<'a> Traverse<'a, EngineState> for MemberInliner {
    fn enter_expression(&mut self, expr: &mut Expression<'a>, ctx: &mut Ctx<'a>) {
        let replacement = match expr {
            Expression::CallExpression(call) => self.try_inline_call(call, ctx),
            Expression::StaticMemberExpression(_) | Expression::ComputedMemberExpression(_) => {
                self.try_inline_read(expr, ctx)
            }
            _ => None,
        };
        if let Some(new_expr) = replacement {
            *expr = new_expr;
            self.changes += 1;
        }
    }
}

/// Deletes consumed properties from the indexed object literals.
pub struct ConsumedPropCleanup {
    consumed: FxHashMap<ObjectKey, FxHashSet<String>>,
    removed: usize,
}

impl ConsumedPropCleanup {
    pub fn new(consumed: FxHashMap<ObjectKey, FxHashSet<String>>) -> Self {
        Self {
            consumed,
            removed: 0,
        }
    }

    pub fn removed(&self) -> usize {
        self.removed
    }
}

impl<'a> Traverse<'a, EngineState> for ConsumedPropCleanup {
    fn enter_variable_declarator(&mut self, decl: &mut VariableDeclarator<'a>, ctx: &mut Ctx<'a>) {
        let BindingPatternKind::BindingIdentifier(ident) = &decl.id.kind else {
            return;
        };
        let key = (decl.span.start, ident.name.to_string());
        let Some(consumed) = self.consumed.get(&key) else {
            return;
        };
        let Some(Expression::ObjectExpression(obj)) = &mut decl.init else {
            return;
        };

        let mut kept = ctx.ast.vec();
        for prop in obj.properties.iter() {
            let consumed_prop = match prop {
                ObjectPropertyKind::ObjectProperty(p) => match &p.key {
                    PropertyKey::StringLiteral(lit) => consumed.contains(lit.value.as_str()),
                    PropertyKey::Identifier(id) => consumed.contains(id.name.as_str()),
                    _ => false,
                },
                ObjectPropertyKind::SpreadProperty(_) => false,
            };
            if consumed_prop {
                self.removed += 1;
            } else {
                kept.push(prop.clone_in(ctx.ast.allocator));
            }
        }
        obj.properties = kept;
    }
}

pub fn run<'a>(
    program: &mut Program<'a>,
    state: &mut EngineState,
    allocator: &'a oxc_allocator::Allocator,
) -> usize {
    let mut inliner = MemberInliner::new();
    crate::transforms::run_collector(program, state, allocator, &mut inliner);
    let changes = inliner.changes();
    let consumed = inliner.consumed();

    if !consumed.is_empty() {
        let mut cleanup = ConsumedPropCleanup::new(consumed);
        crate::transforms::run_collector(program, state, allocator, &mut cleanup);
        // Drop the snapshots too so later iterations re-derive from the tree.
        state.object_index.clear();
        state.objects_by_name.clear();
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::state::EngineState;
    use oxc_allocator::Allocator;
    use oxc_codegen::Codegen;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn run_member_inline(code: &str) -> (String, usize) {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, code, SourceType::mjs()).parse();
        let mut program = ret.program;
        let mut state = EngineState::new();
        crate::transforms::object_cluster::run(&mut program, &mut state, &allocator);
        let changes = run(&mut program, &mut state, &allocator);
        (Codegen::new().build(&program).code, changes)
    }

    #[test]
    fn test_inline_literal_member() {
        let (output, changes) =
            run_member_inline(r#"var r = { k: "hello" }; console.log(r["k"]);"#);
        assert!(changes >= 1);
        assert!(output.contains(r#"console.log("hello")"#), "got: {}", output);
        assert!(!output.contains(r#"r["k"]"#), "got: {}", output);
    }

    #[test]
    fn test_consumed_property_deleted() {
        let (output, _) = run_member_inline(r#"var r = { k: "hello" }; console.log(r["k"]);"#);
        assert!(
            output.contains("var r = {}"),
            "consumed property removed from table: {}",
            output
        );
    }

    #[test]
    fn test_rewrite_binary_call() {
        let (output, changes) = run_member_inline(
            r#"var t = { op: function (a, b) { return a + b; } }; use(t["op"](x, y));"#,
        );
        assert!(changes >= 1);
        assert!(output.contains("use(x + y)"), "got: {}", output);
    }

    #[test]
    fn test_rewrite_unary_call() {
        let (output, _) = run_member_inline(
            r#"var t = { not: function (a) { return !a; } }; use(t["not"](flag));"#,
        );
        assert!(output.contains("use(!flag)"), "got: {}", output);
    }

    #[test]
    fn test_rewrite_call_template() {
        let (output, _) = run_member_inline(
            r#"var t = { go: function (f, x) { return f(x, 1); } }; use(t["go"](h, v));"#,
        );
        assert!(output.contains("use(h(v, 1))"), "got: {}", output);
    }

    #[test]
    fn test_static_member_read() {
        let (output, _) = run_member_inline(r#"var t = { k: 3 }; use(t.k);"#);
        assert!(output.contains("use(3)"), "got: {}", output);
    }

    #[test]
    fn test_skip_dynamic_key() {
        let (output, changes) = run_member_inline(r#"var t = { k: 3 }; use(t[i]);"#);
        assert_eq!(changes, 0, "dynamic key untouched");
        assert!(output.contains("t[i]"), "got: {}", output);
    }

    #[test]
    fn test_skip_call_with_too_few_args() {
        let (output, changes) = run_member_inline(
            r#"var t = { op: function (a, b) { return a + b; } }; use(t["op"](x));"#,
        );
        assert_eq!(changes, 0, "missing arg keeps the call");
        assert!(output.contains(r#"t["op"](x)"#), "got: {}", output);
    }

    #[test]
    fn test_write_position_untouched() {
        let (output, _) = run_member_inline(r#"var t = { k: 3 }; t["k"] = 4; use(t["k"]);"#);
        // The write folds into the index upstream; the read then sees 4.
        assert!(output.contains("use(4)"), "got: {}", output);
    }
}
