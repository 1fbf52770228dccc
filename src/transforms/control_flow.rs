//! Control flow unflattening pass
//!
//! Restores flattened switch dispatch to straight-line code:
//!
//! ```js
//! var o = "1|3|2|0".split("|"), i = 0;
//! while (true) {
//!     switch (o[i++]) {
//!         case "0": return x;
//!         case "1": step1(); continue;
//!         case "2": step2(); continue;
//!         case "3": var x = d(n); continue;
//!     }
//!     break;
//! }
//! ```
//!
//! The cases are re-emitted in alphabet order ("1", "3", "2", "0"), the
//! per-case `continue` and terminal `break` scaffolding dropped, and the
//! alphabet/counter declarators deleted. Detection and rewrite stay within
//! one statement list, so flattened program bodies and flattened function
//! bodies both unflatten.

use oxc_allocator::{CloneIn, Vec as OxcVec};
use oxc_ast::ast::*;
use oxc_traverse::{Traverse, TraverseCtx};
use rustc_hash::FxHashMap;

use crate::matchers::{call_expression, capture, exact_string, member_expression, string_literal};
use crate::transforms::state::EngineState;

pub type Ctx<'a> = TraverseCtx<'a, EngineState>;

pub struct ControlFlowUnflattener {
    changes: usize,
}

#[derive(Debug)]
struct FlattenScaffold {
    sequence_var: String,
    index_var: String,
    alphabet: Vec<String>,
}

impl ControlFlowUnflattener {
    pub fn new() -> Self {
        Self { changes: 0 }
    }

    pub fn changes(&self) -> usize {
        self.changes
    }

    /// Match `"A|B|C".split("|")` and return the alphabet.
    fn extract_split_alphabet(expr: &Expression<'_>) -> Option<Vec<String>> {
        let (alphabet, inner) = capture(string_literal());
        let pattern = call_expression(
            member_expression(inner, Some("split"), Some(false)),
            Some(vec![exact_string("|")]),
        );
        if !pattern.matches_expression(expr) {
            return None;
        }
        let raw = alphabet.current_string()?;
        Some(raw.split('|').map(String::from).collect())
    }

    /// Scan a statement list for `name = "...".split("|")` declarators and
    /// zero-initialized counters.
    fn collect_scaffolds(
        statements: &[Statement<'_>],
    ) -> (FxHashMap<String, Vec<String>>, Vec<String>) {
        let mut sequences: FxHashMap<String, Vec<String>> = FxHashMap::default();
        let mut counters: Vec<String> = Vec::new();

        for stmt in statements {
            let Statement::VariableDeclaration(decl) = stmt else {
                continue;
            };
            for d in &decl.declarations {
                let BindingPatternKind::BindingIdentifier(ident) = &d.id.kind else {
                    continue;
                };
                let Some(init) = &d.init else {
                    continue;
                };
                if let Some(alphabet) = Self::extract_split_alphabet(init) {
                    eprintln!(
                        "[CFG] Found dispatch alphabet {} = {:?}",
                        ident.name, alphabet
                    );
                    sequences.insert(ident.name.to_string(), alphabet);
                } else if matches!(init, Expression::NumericLiteral(lit) if lit.value == 0.0) {
                    counters.push(ident.name.to_string());
                }
            }
        }

        (sequences, counters)
    }

    /// `order[i++]` -> `(order, i)`.
    fn dispatch_access(expr: &Expression<'_>) -> Option<(String, String)> {
        let Expression::ComputedMemberExpression(member) = expr else {
            return None;
        };
        let Expression::Identifier(sequence) = &member.object else {
            return None;
        };
        let Expression::UpdateExpression(update) = &member.expression else {
            return None;
        };
        if update.operator != UpdateOperator::Increment || update.prefix {
            return None;
        }
        let SimpleAssignmentTarget::AssignmentTargetIdentifier(index) = &update.argument else {
            return None;
        };
        Some((sequence.name.to_string(), index.name.to_string()))
    }

    fn switch_in_loop<'a, 'b>(stmt: &'b Statement<'a>) -> Option<&'b SwitchStatement<'a>> {
        let body = match stmt {
            Statement::WhileStatement(while_stmt) => {
                match &while_stmt.test {
                    Expression::BooleanLiteral(lit) if lit.value => {}
                    _ => return None,
                }
                &while_stmt.body
            }
            Statement::ForStatement(for_stmt) => {
                if for_stmt.init.is_some() || for_stmt.test.is_some() || for_stmt.update.is_some() {
                    return None;
                }
                &for_stmt.body
            }
            _ => return None,
        };
        let Statement::BlockStatement(block) = body else {
            return None;
        };
        block.body.iter().find_map(|s| match s {
            Statement::SwitchStatement(switch) => Some(&**switch),
            _ => None,
        })
    }

    /// Emit the case bodies in alphabet order, dropping the loop scaffolding.
    fn unflatten<'a>(
        switch: &SwitchStatement<'a>,
        alphabet: &[String],
        ctx: &mut Ctx<'a>,
    ) -> Option<OxcVec<'a, Statement<'a>>> {
        let mut cases: FxHashMap<String, &SwitchCase<'a>> = FxHashMap::default();
        for case in &switch.cases {
            let test = case.test.as_ref()?;
            let Expression::StringLiteral(lit) = test else {
                return None;
            };
            cases.insert(lit.value.to_string(), case);
        }

        let mut result = ctx.ast.vec();
        for step in alphabet {
            let Some(case) = cases.get(step) else {
                eprintln!("[CFG] Alphabet step {} has no case, keeping the loop", step);
                return None;
            };
            for stmt in &case.consequent {
                match stmt {
                    Statement::ContinueStatement(_) | Statement::BreakStatement(_) => {}
                    _ => result.push(stmt.clone_in(ctx.ast.allocator)),
                }
            }
        }

        if result.is_empty() {
            return None;
        }
        Some(result)
    }

    /// Drop the alphabet/counter declarators from a declaration, returning
    /// `None` when nothing is left of it.
    fn strip_scaffold_declarators<'a>(
        decl: &VariableDeclaration<'a>,
        scaffold: &FlattenScaffold,
        ctx: &mut Ctx<'a>,
    ) -> Option<Statement<'a>> {
        let is_scaffold = |d: &VariableDeclarator<'a>| {
            matches!(
                &d.id,
                BindingPatternKind::BindingIdentifier(ident)
                    if ident.name.as_str() == scaffold.sequence_var
                        || ident.name.as_str() == scaffold.index_var
            )
        };
        if !decl.declarations.iter().any(is_scaffold) {
            return Some(Statement::VariableDeclaration(
                ctx.ast.alloc(decl.clone_in(ctx.ast.allocator)),
            ));
        }

        let mut kept = ctx.ast.vec();
        for d in decl.declarations.iter() {
            if !is_scaffold(d) {
                kept.push(d.clone_in(ctx.ast.allocator));
            }
        }
        if kept.is_empty() {
            return None;
        }
        Some(Statement::VariableDeclaration(ctx.ast.alloc(
            VariableDeclaration {
                span: oxc_span::SPAN,
                kind: decl.kind,
                declarations: kept,
                declare: decl.declare,
            },
        )))
    }

    fn rebuild_list<'a>(&mut self, body: &mut OxcVec<'a, Statement<'a>>, ctx: &mut Ctx<'a>) {
        let (sequences, counters) = Self::collect_scaffolds(body);
        if sequences.is_empty() || counters.is_empty() {
            return;
        }

        // Find the dispatch loop whose discriminant reads one of the
        // collected alphabets through a zero-initialized counter.
        let mut matched: Option<(usize, FlattenScaffold, OxcVec<'a, Statement<'a>>)> = None;
        for (idx, stmt) in body.iter().enumerate() {
            let Some(switch) = Self::switch_in_loop(stmt) else {
                continue;
            };
            let Some((seq_name, idx_name)) = Self::dispatch_access(&switch.discriminant) else {
                continue;
            };
            let Some(alphabet) = sequences.get(&seq_name) else {
                continue;
            };
            if !counters.contains(&idx_name) {
                continue;
            }
            let scaffold = FlattenScaffold {
                sequence_var: seq_name,
                index_var: idx_name,
                alphabet: alphabet.clone(),
            };
            if let Some(stmts) = Self::unflatten(switch, &scaffold.alphabet, ctx) {
                eprintln!(
                    "[CFG] Unflattening {} cases dispatched through {}",
                    scaffold.alphabet.len(),
                    scaffold.sequence_var
                );
                matched = Some((idx, scaffold, stmts));
                break;
            }
        }

        let Some((loop_idx, scaffold, unflattened)) = matched else {
            return;
        };

        let mut new_body = ctx.ast.vec();
        for (idx, stmt) in body.iter().enumerate() {
            if idx == loop_idx {
                for s in unflattened.iter() {
                    new_body.push(s.clone_in(ctx.ast.allocator));
                }
                continue;
            }
            if let Statement::VariableDeclaration(decl) = stmt {
                if let Some(kept) = Self::strip_scaffold_declarators(decl, &scaffold, ctx) {
                    new_body.push(kept);
                }
                continue;
            }
            new_body.push(stmt.clone_in(ctx.ast.allocator));
        }
        *body = new_body;
        self.changes += 1;
    }
}

impl Default for ControlFlowUnflattener {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Traverse<'a, EngineState> for ControlFlowUnflattener {
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
    crate::transforms::run_pass(program, state, allocator, |pass: &mut ControlFlowUnflattener| {
        pass.changes()
    })
}
