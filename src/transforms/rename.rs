//! Binding rename utilities.
//!
//! `rename_fast` renames a binding and every reference to it, first moving
//! any pre-existing binding with the target name out of the way (fresh
//! underscore-prefixed name, repeated until unused). `rename_parameters`
//! applies the same machinery to the leading parameters of a function.
//!
//! Renames are name-based over a subtree: obfuscator output gives every
//! binding a unique `_0x` name, and the conflict pre-pass keeps the renamed
//! name unique program-wide, so a consistent subtree-wide rewrite cannot
//! change what any identifier resolves to.

use oxc_allocator::{Allocator, Vec as OxcVec};
use oxc_ast::ast::*;
use oxc_ast::AstBuilder;
use oxc_ast_visit::{walk_mut, VisitMut};

/// Rewrites every binding identifier, reference, and label-free identifier
/// occurrence of `old` to `new` within the visited subtree.
struct IdentRenamer<'a> {
    old: String,
    new_atom: oxc_span::Atom<'a>,
    renamed: usize,
}

impl<'a> VisitMut<'a> for IdentRenamer<'a> {
    fn visit_binding_identifier(&mut self, ident: &mut BindingIdentifier<'a>) {
        if ident.name.as_str() == self.old {
            ident.name = self.new_atom;
            self.renamed += 1;
        }
    }

    fn visit_identifier_reference(&mut self, ident: &mut IdentifierReference<'a>) {
        if ident.name.as_str() == self.old {
            ident.name = self.new_atom;
            self.renamed += 1;
        }
    }
}

/// Collects every declared name in the subtree (declarators, functions,
/// classes, params, catch bindings all introduce binding identifiers).
#[derive(Default)]
pub struct DeclaredNames {
    pub names: rustc_hash::FxHashSet<String>,
}

impl<'a> VisitMut<'a> for DeclaredNames {
    fn visit_binding_identifier(&mut self, ident: &mut BindingIdentifier<'a>) {
        self.names.insert(ident.name.to_string());
    }
}

pub fn collect_declared_names(program: &mut Program<'_>) -> rustc_hash::FxHashSet<String> {
    let mut collector = DeclaredNames::default();
    collector.visit_program(program);
    collector.names
}

/// Rename `old` to `new` across the program. If `new` is already declared,
/// the pre-existing binding is first renamed to a fresh `_new` (prefixing
/// repeated on conflict). Returns the number of rewritten identifiers.
pub fn rename_fast<'a>(
    program: &mut Program<'a>,
    old: &str,
    new: &str,
    allocator: &'a Allocator,
) -> usize {
    if old == new {
        return 0;
    }

    let declared = collect_declared_names(program);
    let ast = AstBuilder::new(allocator);
    let mut total = 0;

    if declared.contains(new) {
        let mut evicted = format!("_{}", new);
        while declared.contains(&evicted) || evicted == old {
            evicted.insert(0, '_');
        }
        eprintln!("[RENAME] {} already bound, moving it to {}", new, evicted);
        let mut mover = IdentRenamer {
            old: new.to_string(),
            new_atom: ast.atom(&evicted),
            renamed: 0,
        };
        mover.visit_program(program);
        total += mover.renamed;
    }

    let mut renamer = IdentRenamer {
        old: old.to_string(),
        new_atom: ast.atom(new),
        renamed: 0,
    };
    renamer.visit_program(program);
    total + renamer.renamed
}

/// Rename every occurrence of `old` to `new` with no conflict handling.
/// For retargeting an alias at a binding that already exists (the decoder
/// alias pass); `rename_fast` is the conflict-avoiding variant.
pub fn rename_all<'a>(
    program: &mut Program<'a>,
    old: &str,
    new: &str,
    allocator: &'a Allocator,
) -> usize {
    if old == new {
        return 0;
    }
    let ast = AstBuilder::new(allocator);
    let mut renamer = IdentRenamer {
        old: old.to_string(),
        new_atom: ast.atom(new),
        renamed: 0,
    };
    renamer.visit_program(program);
    renamer.renamed
}

/// Rename occurrences within a detached statement list (used when a pruned
/// branch is spliced into an enclosing scope and a `let`/`const` it declares
/// collides with an outer name).
pub fn rename_in_statements<'a>(
    statements: &mut OxcVec<'a, Statement<'a>>,
    old: &str,
    new: &str,
    allocator: &'a Allocator,
) -> usize {
    let ast = AstBuilder::new(allocator);
    let mut renamer = IdentRenamer {
        old: old.to_string(),
        new_atom: ast.atom(new),
        renamed: 0,
    };
    for stmt in statements.iter_mut() {
        walk_mut::walk_statement(&mut renamer, stmt);
    }
    renamer.renamed
}

/// Rename the first `min(params, names)` parameters of `function` using
/// `rename_fast` semantics scoped to the function subtree.
pub fn rename_parameters<'a>(
    function: &mut Function<'a>,
    names: &[&str],
    allocator: &'a Allocator,
) -> usize {
    let ast = AstBuilder::new(allocator);
    let mut total = 0;

    let count = function.params.items.len().min(names.len());
    for i in 0..count {
        let old = match &function.params.items[i].pattern.kind {
            BindingPatternKind::BindingIdentifier(ident) => ident.name.to_string(),
            _ => continue,
        };
        if old == names[i] {
            continue;
        }
        let mut renamer = IdentRenamer {
            old,
            new_atom: ast.atom(names[i]),
            renamed: 0,
        };
        walk_mut::walk_function(&mut renamer, function, oxc_semantic::ScopeFlags::Function);
        total += renamer.renamed;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_allocator::Allocator;
    use oxc_codegen::Codegen;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn parse<'a>(allocator: &'a Allocator, code: &'a str) -> Program<'a> {
        Parser::new(allocator, code, SourceType::mjs()).parse().program
    }

    #[test]
    fn test_rename_fast_simple() {
        let allocator = Allocator::default();
        let mut program = parse(&allocator, "var a = 1; console.log(a);");

        let renamed = rename_fast(&mut program, "a", "count", &allocator);
        let output = Codegen::new().build(&program).code;

        assert_eq!(renamed, 2, "binding + one reference");
        assert!(output.contains("var count = 1"), "got: {}", output);
        assert!(output.contains("console.log(count)"), "got: {}", output);
    }

    #[test]
    fn test_rename_fast_evicts_conflict() {
        let allocator = Allocator::default();
        let mut program = parse(&allocator, "var a = 1; var b = 2; f(a, b);");

        rename_fast(&mut program, "a", "b", &allocator);
        let output = Codegen::new().build(&program).code;

        assert!(output.contains("var b = 1"), "got: {}", output);
        assert!(output.contains("var _b = 2"), "got: {}", output);
        assert!(output.contains("f(b, _b)"), "got: {}", output);
    }

    #[test]
    fn test_rename_fast_noop_on_same_name() {
        let allocator = Allocator::default();
        let mut program = parse(&allocator, "var a = 1;");
        assert_eq!(rename_fast(&mut program, "a", "a", &allocator), 0);
    }

    #[test]
    fn test_rename_parameters() {
        let allocator = Allocator::default();
        let mut program = parse(&allocator, "function f(x, y) { return x + y; }");

        if let Statement::FunctionDeclaration(func) = &mut program.body[0] {
            let renamed = rename_parameters(func, &["left", "right"], &allocator);
            assert_eq!(renamed, 4, "two bindings + two reads");
        } else {
            panic!("expected function declaration");
        }

        let output = Codegen::new().build(&program).code;
        assert!(output.contains("function f(left, right)"), "got: {}", output);
        assert!(output.contains("left + right"), "got: {}", output);
    }

    #[test]
    fn test_rename_parameters_truncates_to_shorter() {
        let allocator = Allocator::default();
        let mut program = parse(&allocator, "function f(x, y) { return x; }");

        if let Statement::FunctionDeclaration(func) = &mut program.body[0] {
            rename_parameters(func, &["a"], &allocator);
        } else {
            panic!("expected function declaration");
        }

        let output = Codegen::new().build(&program).code;
        assert!(output.contains("function f(a, y)"), "got: {}", output);
    }
}
