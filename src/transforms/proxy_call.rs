//! Wrapper function collapsing pass
//!
//! Obfuscators route calls through layers of trivial wrappers:
//!
//! ```js
//! function w(a, b) { return d(a + 1, b); }
//! use(w(10, k));   // => use(d(10 + 1, k));
//! ```
//!
//! Every call site of a single-return wrapper is rewritten with the actual
//! arguments substituted in parameter order. The pass runs its
//! collect/inline cycle a configurable number of rounds (wrappers often wrap
//! wrappers); functions in the decoder set are never collapsed, their call
//! sites belong to the decoder subsystem.

use oxc_allocator::CloneIn;
use oxc_ast::ast::*;
use oxc_traverse::{Traverse, TraverseCtx};
use rustc_hash::FxHashMap;

use crate::transforms::state::{instantiate_template, EngineState, FnTemplate, ReturnExpr};

pub type Ctx<'a> = TraverseCtx<'a, EngineState>;

const MAX_PARAMS: usize = 10;

/// Finds `function name(p...) { return <expr>; }` declarations whose return
/// lifts to a substitutable template.
#[derive(Default)]
pub struct WrapperCollector {
    wrappers: FxHashMap<String, FnTemplate>,
    redeclared: rustc_hash::FxHashSet<String>,
}

impl WrapperCollector {
    pub fn wrappers(mut self) -> FxHashMap<String, FnTemplate> {
        for name in &self.redeclared {
            self.wrappers.remove(name);
        }
        self.wrappers
    }

    fn try_collect(&mut self, func: &Function<'_>, decoders: &rustc_hash::FxHashSet<String>) {
        let Some(id) = &func.id else {
            return;
        };
        let name = id.name.to_string();
        if decoders.contains(&name) {
            eprintln!("[PROXY] {} is a decoder, leaving it alone", name);
            return;
        }
        if self.wrappers.contains_key(&name) {
            self.redeclared.insert(name);
            return;
        }
        if func.r#async || func.generator {
            return;
        }
        let Some(body) = &func.body else {
            return;
        };
        if body.statements.len() != 1 || func.params.items.len() > MAX_PARAMS {
            return;
        }
        let Statement::ReturnStatement(ret) = &body.statements[0] else {
            return;
        };
        let Some(argument) = &ret.argument else {
            return;
        };

        let mut params = Vec::with_capacity(func.params.items.len());
        for item in &func.params.items {
            let BindingPatternKind::BindingIdentifier(ident) = &item.pattern.kind else {
                return;
            };
            params.push(ident.name.to_string());
        }

        if let Some(template) = ReturnExpr::lift(argument, &params) {
            // A bare param or constant forwarder is handled fine; a template
            // that calls the wrapper itself would loop forever.
            if Self::mentions(&template, &name) {
                return;
            }
            eprintln!(
                "[PROXY] Collected wrapper {} ({} params)",
                name,
                params.len()
            );
            self.wrappers.insert(
                name,
                FnTemplate {
                    param_count: params.len(),
                    ret: template,
                },
            );
        }
    }

    fn mentions(template: &ReturnExpr, name: &str) -> bool {
        match template {
            ReturnExpr::Value(crate::transforms::state::LitValue::Identifier(id)) => id == name,
            ReturnExpr::Value(_) | ReturnExpr::Param(_) => false,
            ReturnExpr::Binary { left, right, .. } | ReturnExpr::Logical { left, right, .. } => {
                Self::mentions(left, name) || Self::mentions(right, name)
            }
            ReturnExpr::Unary { arg, .. } => Self::mentions(arg, name),
            ReturnExpr::Call { callee, args } => {
                Self::mentions(callee, name) || args.iter().any(|a| Self::mentions(a, name))
            }
        }
    }
}

impl<'a> Traverse<'a, EngineState> for WrapperCollector {
    fn enter_statement(&mut self, stmt: &mut Statement<'a>, ctx: &mut Ctx<'a>) {
        if let Statement::FunctionDeclaration(func) = stmt {
            self.try_collect(func, &ctx.state.decoders);
        }
    }
}

pub struct WrapperInliner {
    wrappers: FxHashMap<String, FnTemplate>,
    changes: usize,
}

impl WrapperInliner {
    pub fn new(wrappers: FxHashMap<String, FnTemplate>) -> Self {
        Self {
            wrappers,
            changes: 0,
        }
    }

    pub fn changes(&self) -> usize {
        self.changes
    }
}

impl<'a> Traverse<'a, EngineState> for WrapperInliner {
    fn exit_expression(&mut self, expr: &mut Expression<'a>, ctx: &mut Ctx<'a>) {
        let Expression::CallExpression(call) = expr else {
            return;
        };
        let Expression::Identifier(callee) = &call.callee else {
            return;
        };
        let Some(template) = self.wrappers.get(callee.name.as_str()) else {
            return;
        };

        let mut actuals = Vec::with_capacity(call.arguments.len());
        for arg in &call.arguments {
            let Some(arg_expr) = arg.as_expression() else {
                return;
            };
            actuals.push(arg_expr.clone_in(ctx.ast.allocator));
        }
        if let Some(max) = template.ret.max_param() {
            if max >= actuals.len() {
                return;
            }
        }

        let template = template.ret.clone();
        if let Some(replacement) = instantiate_template(&template, &actuals, ctx) {
            eprintln!("[PROXY] Collapsing call through {}", callee.name);
            *expr = replacement;
            self.changes += 1;
        }
    }
}

pub fn run<'a>(
    program: &mut Program<'a>,
    state: &mut EngineState,
    allocator: &'a oxc_allocator::Allocator,
) -> usize {
    let depth = state.proxy_depth.max(1);
    let mut total = 0;

    for round in 0..depth {
        let mut collector = WrapperCollector::default();
        crate::transforms::run_collector(program, state, allocator, &mut collector);
        let wrappers = collector.wrappers();
        if wrappers.is_empty() {
            break;
        }

        let mut inliner = WrapperInliner::new(wrappers);
        crate::transforms::run_collector(program, state, allocator, &mut inliner);
        if inliner.changes() == 0 {
            break;
        }
        eprintln!(
            "[PROXY] Round {}: collapsed {} call sites",
            round + 1,
            inliner.changes()
        );
        total += inliner.changes();
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::state::EngineState;
    use oxc_allocator::Allocator;
    use oxc_codegen::Codegen;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn run_proxy(code: &str) -> (String, usize) {
        run_proxy_with(code, EngineState::new())
    }

    fn run_proxy_with(code: &str, mut state: EngineState) -> (String, usize) {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, code, SourceType::mjs()).parse();
        let mut program = ret.program;
        state.proxy_depth = 2;
        let changes = run(&mut program, &mut state, &allocator);
        (Codegen::new().build(&program).code, changes)
    }

    #[test]
    fn test_collapse_simple_wrapper() {
        let (output, changes) = run_proxy(
            "function w(a, b) { return d(a + 1, b); } use(w(10, k));",
        );
        assert!(changes >= 1);
        assert!(output.contains("use(d(10 + 1, k))"), "got: {}", output);
    }

    #[test]
    fn test_collapse_every_call_site() {
        let (output, changes) = run_proxy(
            "function w(a) { return d(a); } use(w(1)); use(w(2));",
        );
        assert_eq!(changes, 2, "both call sites collapse");
        assert!(output.contains("use(d(1))"), "got: {}", output);
        assert!(output.contains("use(d(2))"), "got: {}", output);
    }

    #[test]
    fn test_collapse_nested_wrappers_within_depth() {
        let (output, _) = run_proxy(
            "function inner(a) { return d(a); } function outer(a) { return inner(a + 1); } use(outer(5));",
        );
        assert!(output.contains("use(d(5 + 1))"), "two layers collapse: {}", output);
    }

    #[test]
    fn test_skip_decoder_functions() {
        let mut state = EngineState::new();
        state.decoders.insert("dec".to_string());
        let (output, changes) = run_proxy_with(
            "function dec(a) { return table(a); } use(dec(1));",
            state,
        );
        assert_eq!(changes, 0, "decoder wrapper untouched");
        assert!(output.contains("dec(1)"), "got: {}", output);
    }

    #[test]
    fn test_skip_effectful_body() {
        let (output, changes) = run_proxy(
            "function w(a) { log(); return d(a); } use(w(1));",
        );
        assert_eq!(changes, 0, "multi-statement wrapper stays");
        assert!(output.contains("w(1)"), "got: {}", output);
    }

    #[test]
    fn test_skip_recursive_wrapper() {
        let (output, changes) = run_proxy("function w(a) { return w(a); } use(w(1));");
        assert_eq!(changes, 0, "self-call must not collapse");
        assert!(output.contains("w(1)"), "got: {}", output);
    }

    #[test]
    fn test_redeclared_wrapper_skipped() {
        let (output, changes) = run_proxy(
            "function w(a) { return d(a); } function w(a) { return e(a); } use(w(1));",
        );
        assert_eq!(changes, 0, "conflicting declarations disqualify the name");
        assert!(output.contains("w(1)"), "got: {}", output);
    }
}
