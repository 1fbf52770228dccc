//! Unused declaration removal pass
//!
//! Declarations with literal/object/function initializers, zero reads, and
//! no reassignments are dropped, as are function declarations nothing
//! references. Initializers with side effects always survive.
//!
//! Removal at program scope is the default; `keep_program_scope_vars` turns
//! it off for inputs that are loaded as scripts and read from outside.

use oxc_allocator::CloneIn;
use oxc_ast::ast::*;
use oxc_span::SPAN;
use oxc_traverse::{Traverse, TraverseCtx};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::transforms::state::EngineState;

pub type Ctx<'a> = TraverseCtx<'a, EngineState>;

#[derive(Debug, Default)]
struct VarInfo {
    declarations: usize,
    reads: usize,
    writes: usize,
    is_param: bool,
    is_exported: bool,
    at_program_scope: bool,
}

impl VarInfo {
    fn is_dead(&self, keep_program_scope: bool) -> bool {
        self.declarations > 0
            && self.reads == 0
            && self.writes == 0
            && !self.is_param
            && !self.is_exported
            && !(keep_program_scope && self.at_program_scope)
    }
}

#[derive(Default)]
pub struct DeadVarCollector {
    variables: FxHashMap<String, VarInfo>,
    function_depth: usize,
    current_declaration: Option<String>,
}

impl DeadVarCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dead_vars(&self, keep_program_scope: bool) -> FxHashSet<String> {
        self.variables
            .iter()
            .filter(|(_, info)| info.is_dead(keep_program_scope))
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn entry(&mut self, name: &str) -> &mut VarInfo {
        self.variables.entry(name.to_string()).or_default()
    }

    fn record_declaration(&mut self, name: &str) {
        let at_program_scope = self.function_depth == 0;
        let entry = self.entry(name);
        entry.declarations += 1;
        entry.at_program_scope |= at_program_scope;
    }
}

impl<'a> Traverse<'a, EngineState> for DeadVarCollector {
    fn enter_function(&mut self, func: &mut Function<'a>, _ctx: &mut Ctx<'a>) {
        if let Some(id) = &func.id {
            self.record_declaration(id.name.as_str());
        }
        self.function_depth += 1;
    }

    fn exit_function(&mut self, _func: &mut Function<'a>, _ctx: &mut Ctx<'a>) {
        self.function_depth -= 1;
    }

    fn enter_arrow_function_expression(
        &mut self,
        _arrow: &mut ArrowFunctionExpression<'a>,
        _ctx: &mut Ctx<'a>,
    ) {
        self.function_depth += 1;
    }

    fn exit_arrow_function_expression(
        &mut self,
        _arrow: &mut ArrowFunctionExpression<'a>,
        _ctx: &mut Ctx<'a>,
    ) {
        self.function_depth -= 1;
    }

    fn enter_variable_declarator(&mut self, decl: &mut VariableDeclarator<'a>, _ctx: &mut Ctx<'a>) {
        if let BindingPatternKind::BindingIdentifier(ident) = &decl.id.kind {
            self.record_declaration(ident.name.as_str());
            self.current_declaration = Some(ident.name.to_string());
        }
    }

    fn exit_variable_declarator(&mut self, _decl: &mut VariableDeclarator<'a>, _ctx: &mut Ctx<'a>) {
        self.current_declaration = None;
    }

    fn enter_formal_parameter(&mut self, param: &mut FormalParameter<'a>, _ctx: &mut Ctx<'a>) {
        if let BindingPatternKind::BindingIdentifier(ident) = &param.pattern.kind {
            self.entry(ident.name.as_str()).is_param = true;
        }
    }

    fn exit_assignment_expression(
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
            let entry = self.entry(ident.name.as_str());
            entry.reads += 1;
            entry.writes += 1;
        }
    }

    fn enter_identifier_reference(
        &mut self,
        ident: &mut IdentifierReference<'a>,
        _ctx: &mut Ctx<'a>,
    ) {
        let name = ident.name.as_str();
        if self.current_declaration.as_deref() == Some(name) {
            return;
        }
        self.entry(name).reads += 1;
    }

    fn enter_export_named_declaration(
        &mut self,
        decl: &mut ExportNamedDeclaration<'a>,
        _ctx: &mut Ctx<'a>,
    ) {
        for specifier in &decl.specifiers {
            match &specifier.local {
                ModuleExportName::IdentifierName(ident) => {
                    self.entry(ident.name.as_str()).is_exported = true;
                }
                ModuleExportName::IdentifierReference(ident) => {
                    self.entry(ident.name.as_str()).is_exported = true;
                }
                _ => {}
            }
        }
    }
}

pub struct DeadVarEliminator {
    dead_vars: FxHashSet<String>,
    changes: usize,
}

impl DeadVarEliminator {
    pub fn new(dead_vars: FxHashSet<String>) -> Self {
        Self {
            dead_vars,
            changes: 0,
        }
    }

    pub fn changes(&self) -> usize {
        self.changes
    }

    fn should_remove_declarator(&self, decl: &VariableDeclarator<'_>) -> bool {
        let BindingPatternKind::BindingIdentifier(ident) = &decl.id.kind else {
            return false;
        };
        if !self.dead_vars.contains(ident.name.as_str()) {
            return false;
        }
        match &decl.init {
            None => true,
            Some(init) => !Self::has_side_effects(init),
        }
    }

    fn has_side_effects(expr: &Expression<'_>) -> bool {
        match expr {
            Expression::NumericLiteral(_)
            | Expression::StringLiteral(_)
            | Expression::BooleanLiteral(_)
            | Expression::NullLiteral(_)
            | Expression::Identifier(_)
            | Expression::ThisExpression(_)
            | Expression::ArrowFunctionExpression(_)
            | Expression::FunctionExpression(_) => false,

            Expression::ArrayExpression(arr) => arr.elements.iter().any(|el| match el {
                ArrayExpressionElement::SpreadElement(spread) => {
                    Self::has_side_effects(&spread.argument)
                }
                ArrayExpressionElement::Elision(_) => false,
                _ => el
                    .as_expression()
                    .map_or(true, Self::has_side_effects),
            }),

            Expression::ObjectExpression(obj) => obj.properties.iter().any(|prop| match prop {
                ObjectPropertyKind::ObjectProperty(p) => {
                    let computed_key = p.computed
                        && p.key.as_expression().map_or(false, Self::has_side_effects);
                    Self::has_side_effects(&p.value) || computed_key
                }
                ObjectPropertyKind::SpreadProperty(spread) => {
                    Self::has_side_effects(&spread.argument)
                }
            }),

            Expression::UnaryExpression(unary) => {
                matches!(unary.operator, UnaryOperator::Delete)
                    || Self::has_side_effects(&unary.argument)
            }
            Expression::BinaryExpression(binary) => {
                Self::has_side_effects(&binary.left) || Self::has_side_effects(&binary.right)
            }
            Expression::LogicalExpression(logical) => {
                Self::has_side_effects(&logical.left) || Self::has_side_effects(&logical.right)
            }
            Expression::ConditionalExpression(cond) => {
                Self::has_side_effects(&cond.test)
                    || Self::has_side_effects(&cond.consequent)
                    || Self::has_side_effects(&cond.alternate)
            }
            Expression::SequenceExpression(seq) => {
                seq.expressions.iter().any(Self::has_side_effects)
            }
            Expression::ParenthesizedExpression(paren) => Self::has_side_effects(&paren.expression),
            Expression::TemplateLiteral(template) => {
                template.expressions.iter().any(Self::has_side_effects)
            }

            _ => true,
        }
    }
}

impl<'a> Traverse<'a, EngineState> for DeadVarEliminator {
    fn exit_statement(&mut self, stmt: &mut Statement<'a>, ctx: &mut Ctx<'a>) {
        match stmt {
            Statement::FunctionDeclaration(func) => {
                let Some(id) = &func.id else { return };
                if self.dead_vars.contains(id.name.as_str()) {
                    eprintln!("[DEADVAR] Removing unused function {}", id.name);
                    self.changes += 1;
                    *stmt =
                        Statement::EmptyStatement(ctx.ast.alloc(EmptyStatement { span: SPAN }));
                }
            }
            Statement::VariableDeclaration(decl) => {
                if !decl
                    .declarations
                    .iter()
                    .any(|d| self.should_remove_declarator(d))
                {
                    return;
                }

                let mut kept = ctx.ast.vec();
                for d in decl.declarations.iter() {
                    if self.should_remove_declarator(d) {
                        if let BindingPatternKind::BindingIdentifier(ident) = &d.id.kind {
                            eprintln!("[DEADVAR] Removing unused variable {}", ident.name);
                        }
                        self.changes += 1;
                    } else {
                        kept.push(d.clone_in(ctx.ast.allocator));
                    }
                }

                if kept.is_empty() {
                    *stmt =
                        Statement::EmptyStatement(ctx.ast.alloc(EmptyStatement { span: SPAN }));
                } else {
                    *stmt = Statement::VariableDeclaration(ctx.ast.alloc(VariableDeclaration {
                        span: SPAN,
                        kind: decl.kind,
                        declarations: kept,
                        declare: decl.declare,
                    }));
                }
            }
            _ => {}
        }
    }
}

pub fn run<'a>(
    program: &mut Program<'a>,
    state: &mut EngineState,
    allocator: &'a oxc_allocator::Allocator,
) -> usize {
    let dead_vars = {
        let mut collector = DeadVarCollector::new();
        crate::transforms::run_collector(program, state, allocator, &mut collector);
        collector.dead_vars(state.keep_program_scope_vars)
    };
    if dead_vars.is_empty() {
        return 0;
    }
    eprintln!("[DEADVAR] Dead: {:?}", dead_vars);
    let mut eliminator = DeadVarEliminator::new(dead_vars);
    crate::transforms::run_collector(program, state, allocator, &mut eliminator);
    eliminator.changes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::state::EngineState;
    use oxc_allocator::Allocator;
    use oxc_codegen::Codegen;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn run_dead(code: &str) -> (String, usize) {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, code, SourceType::mjs()).parse();
        let mut program = ret.program;
        let mut state = EngineState::new();
        let changes = run(&mut program, &mut state, &allocator);
        (Codegen::new().build(&program).code, changes)
    }

    #[test]
    fn test_remove_unused_literal_var() {
        let (output, changes) = run_dead("var unused = 5; live();");
        assert_eq!(changes, 1);
        assert!(!output.contains("unused"), "got: {}", output);
        assert!(output.contains("live()"), "got: {}", output);
    }

    #[test]
    fn test_remove_unused_object_var() {
        let (output, _) = run_dead("var r = {}; live();");
        assert!(!output.contains("var r"), "got: {}", output);
    }

    #[test]
    fn test_remove_unused_function_declaration() {
        let (output, changes) = run_dead("function helper() { return 1; } live();");
        assert_eq!(changes, 1);
        assert!(!output.contains("helper"), "got: {}", output);
    }

    #[test]
    fn test_keep_used_var() {
        let (output, changes) = run_dead("var used = 5; f(used);");
        assert_eq!(changes, 0);
        assert!(output.contains("var used"), "got: {}", output);
    }

    #[test]
    fn test_keep_side_effect_initializer() {
        let (output, changes) = run_dead("var x = compute();");
        assert_eq!(changes, 0, "call initializer has effects");
        assert!(output.contains("compute()"), "got: {}", output);
    }

    #[test]
    fn test_written_only_var_removed() {
        let (output, changes) = run_dead("var x = 1; x = 2;");
        assert_eq!(changes, 0, "write counts as a use for safety");
        assert!(output.contains("var x"), "got: {}", output);
    }

    #[test]
    fn test_keep_program_scope_when_configured() {
        let allocator = Allocator::default();
        let code = "var top = 1; function f() { var inner = 2; } f();";
        let ret = Parser::new(&allocator, code, SourceType::mjs()).parse();
        let mut program = ret.program;
        let mut state = EngineState::new();
        state.keep_program_scope_vars = true;
        run(&mut program, &mut state, &allocator);
        let output = Codegen::new().build(&program).code;
        assert!(output.contains("var top"), "program-scope var kept: {}", output);
        assert!(!output.contains("var inner"), "function-scope var removed: {}", output);
    }

    #[test]
    fn test_keep_function_param() {
        let (output, _) = run_dead("function f(p) { return 1; } f(0);");
        assert!(output.contains("f(p)") || output.contains("(p)"), "got: {}", output);
    }
}
