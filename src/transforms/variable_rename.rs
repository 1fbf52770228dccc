//! Readability rename pass
//!
//! Maps residual obfuscator-generated names (`_0x4d8f`, `_a3f`) to
//! sequential readable ones. Runs once after the pipeline converges; the
//! mapping is stable within a run, and already-readable names are left
//! alone.

use oxc_ast::ast::*;
use oxc_traverse::{Traverse, TraverseCtx};
use rustc_hash::FxHashMap;

use crate::transforms::state::EngineState;

pub type Ctx<'a> = TraverseCtx<'a, EngineState>;

#[derive(Default)]
pub struct VariableRenamer {
    rename_map: FxHashMap<String, String>,
    var_counter: usize,
    func_counter: usize,
    changes: usize,
}

impl VariableRenamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> usize {
        self.changes
    }

    fn is_mangled(name: &str) -> bool {
        let Some(rest) = name.strip_prefix('_') else {
            return false;
        };
        if rest.is_empty() {
            return false;
        }
        if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
            return !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit());
        }
        rest.chars().all(|c| c.is_ascii_hexdigit())
    }

    fn rename_for(&mut self, old: &str, is_function: bool) -> String {
        if let Some(new) = self.rename_map.get(old) {
            return new.clone();
        }
        let new = if is_function {
            self.func_counter += 1;
            format!("func_{}", self.func_counter)
        } else {
            self.var_counter += 1;
            format!("var_{}", self.var_counter)
        };
        self.rename_map.insert(old.to_string(), new.clone());
        new
    }
}

impl<'a> Traverse<'a, EngineState> for VariableRenamer {
    fn enter_function(&mut self, func: &mut Function<'a>, ctx: &mut Ctx<'a>) {
        if let Some(id) = &mut func.id {
            let old = id.name.as_str();
            if Self::is_mangled(old) {
                let new = self.rename_for(old, true);
                eprintln!("[RENAME] function {} => {}", old, new);
                id.name = ctx.ast.atom(&new);
                self.changes += 1;
            }
        }
    }

    fn enter_binding_identifier(&mut self, ident: &mut BindingIdentifier<'a>, ctx: &mut Ctx<'a>) {
        let old = ident.name.as_str();
        if Self::is_mangled(old) {
            let new = self.rename_for(old, false);
            ident.name = ctx.ast.atom(&new);
            self.changes += 1;
        }
    }

    fn enter_identifier_reference(
        &mut self,
        ident: &mut IdentifierReference<'a>,
        ctx: &mut Ctx<'a>,
    ) {
        let old = ident.name.as_str();
        if let Some(new) = self.rename_map.get(old) {
            ident.name = ctx.ast.atom(new);
            self.changes += 1;
        } else if Self::is_mangled(old) {
            // Reference seen before its (hoisted) declaration.
            let new = self.rename_for(old, false);
            ident.name = ctx.ast.atom(&new);
            self.changes += 1;
        }
    }
}

pub fn run<'a>(
    program: &mut Program<'a>,
    state: &mut EngineState,
    allocator: &'a oxc_allocator::Allocator,
) -> usize {
    crate::transforms::run_pass(program, state, allocator, |pass: &mut VariableRenamer| {
        pass.changes()
    })
}
