//! Decoder location strategies.
//!
//! Two ways to find the string-table machinery, tried in order:
//!
//! 1. **Call count**: obfuscated bundles call their decoders hundreds of
//!    times. Any program-level function whose name is referenced at least
//!    `call_count_threshold` times is a decoder, and everything up to the
//!    last such declaration is the setup code.
//! 2. **Big array**: find array literals with `array_size_threshold`+
//!    elements. A rarely-referenced big array is the string table: a
//!    reference used as a member object marks the enclosing function as a
//!    decoder, a reference passed as a call argument marks that expression
//!    statement as the load-time rotator.
//!
//! Both strategies work on the freshly parsed tree, where every span still
//! points into the original source, so the setup code is sliced straight
//! out of the input text.

use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_semantic::ScopeFlags;
use oxc_span::{GetSpan, Span};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::options::Options;

#[derive(Debug)]
pub struct DecoderLayout {
    pub decoders: FxHashSet<String>,
    pub setup: String,
}

/// Counts identifier references by name across the whole program.
#[derive(Default)]
struct RefCounter {
    counts: FxHashMap<String, usize>,
}

impl<'a> Visit<'a> for RefCounter {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        *self.counts.entry(ident.name.to_string()).or_insert(0) += 1;
    }
}

fn count_references(program: &Program<'_>) -> FxHashMap<String, usize> {
    let mut counter = RefCounter::default();
    counter.visit_program(program);
    counter.counts
}

/// Strategy 1: classify heavily-referenced program-level functions.
fn locate_by_call_count(
    program: &Program<'_>,
    source: &str,
    options: &Options,
) -> Option<DecoderLayout> {
    let refs = count_references(program);
    let mut decoders = FxHashSet::default();
    let mut setup_end = 0u32;

    for stmt in &program.body {
        let (name, span) = match stmt {
            Statement::FunctionDeclaration(func) => {
                let Some(id) = &func.id else { continue };
                (id.name.to_string(), func.span)
            }
            Statement::VariableDeclaration(decl) => {
                let mut found = None;
                for d in &decl.declarations {
                    let BindingPatternKind::BindingIdentifier(ident) = &d.id.kind else {
                        continue;
                    };
                    if matches!(
                        d.init,
                        Some(Expression::FunctionExpression(_))
                            | Some(Expression::ArrowFunctionExpression(_))
                    ) {
                        found = Some((ident.name.to_string(), decl.span));
                    }
                }
                let Some(found) = found else { continue };
                found
            }
            _ => continue,
        };

        let count = refs.get(&name).copied().unwrap_or(0);
        if count >= options.call_count_threshold {
            eprintln!(
                "[DECODE] {} referenced {} time(s), classifying as decoder",
                name, count
            );
            decoders.insert(name);
            setup_end = setup_end.max(span.end);
        }
    }

    if decoders.is_empty() {
        return None;
    }
    Some(DecoderLayout {
        decoders,
        setup: source[..setup_end as usize].to_string(),
    })
}

#[derive(Debug, Clone)]
struct BigArray {
    name: String,
    decl_span: Span,
    containing_fn: Option<(String, Span)>,
}

/// Finds array literals with at least `threshold` elements and records the
/// declaration they initialize.
struct BigArrayFinder {
    threshold: usize,
    function_stack: Vec<(Option<String>, Span)>,
    current_decl_span: Option<Span>,
    found: Vec<BigArray>,
}

impl BigArrayFinder {
    fn new(threshold: usize) -> Self {
        Self {
            threshold,
            function_stack: Vec::new(),
            current_decl_span: None,
            found: Vec::new(),
        }
    }

    fn enclosing_named_fn(&self) -> Option<(String, Span)> {
        self.function_stack
            .iter()
            .rev()
            .find_map(|(name, span)| name.clone().map(|n| (n, *span)))
    }
}

impl<'a> Visit<'a> for BigArrayFinder {
    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        let name = func.id.as_ref().map(|id| id.name.to_string());
        self.function_stack.push((name, func.span));
        walk::walk_function(self, func, flags);
        self.function_stack.pop();
    }

    fn visit_arrow_function_expression(&mut self, arrow: &ArrowFunctionExpression<'a>) {
        self.function_stack.push((None, arrow.span));
        walk::walk_arrow_function_expression(self, arrow);
        self.function_stack.pop();
    }

    fn visit_variable_declaration(&mut self, decl: &VariableDeclaration<'a>) {
        let previous = self.current_decl_span.replace(decl.span);
        walk::walk_variable_declaration(self, decl);
        self.current_decl_span = previous;
    }

    fn visit_variable_declarator(&mut self, decl: &VariableDeclarator<'a>) {
        if let BindingPatternKind::BindingIdentifier(ident) = &decl.id.kind {
            if let Some(Expression::ArrayExpression(arr)) = &decl.init {
                if arr.elements.len() >= self.threshold {
                    eprintln!(
                        "[DECODE] Big array {} with {} elements",
                        ident.name,
                        arr.elements.len()
                    );
                    self.found.push(BigArray {
                        name: ident.name.to_string(),
                        decl_span: self.current_decl_span.unwrap_or_else(|| decl.span()),
                        containing_fn: self.enclosing_named_fn(),
                    });
                }
            }
        }
        walk::walk_variable_declarator(self, decl);
    }
}

/// Walks the references of one name, classifying member-object uses
/// (decoder) and call-argument uses (rotator).
struct UsageScanner<'t> {
    target: &'t str,
    function_stack: Vec<(Option<String>, Span)>,
    statement_span: Option<Span>,
    decoder_fns: Vec<(String, Span)>,
    rotator_spans: Vec<Span>,
    orphan_member_use: bool,
}

impl<'t> UsageScanner<'t> {
    fn new(target: &'t str) -> Self {
        Self {
            target,
            function_stack: Vec::new(),
            statement_span: None,
            decoder_fns: Vec::new(),
            rotator_spans: Vec::new(),
            orphan_member_use: false,
        }
    }

    fn enclosing_named_fn(&self) -> Option<(String, Span)> {
        self.function_stack
            .iter()
            .rev()
            .find_map(|(name, span)| name.clone().map(|n| (n, *span)))
    }

    fn is_target(&self, expr: &Expression<'_>) -> bool {
        matches!(expr, Expression::Identifier(ident) if ident.name.as_str() == self.target)
    }
}

impl<'a, 't> Visit<'a> for UsageScanner<'t> {
    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        let name = func.id.as_ref().map(|id| id.name.to_string());
        self.function_stack.push((name, func.span));
        walk::walk_function(self, func, flags);
        self.function_stack.pop();
    }

    fn visit_arrow_function_expression(&mut self, arrow: &ArrowFunctionExpression<'a>) {
        self.function_stack.push((None, arrow.span));
        walk::walk_arrow_function_expression(self, arrow);
        self.function_stack.pop();
    }

    fn visit_expression_statement(&mut self, stmt: &ExpressionStatement<'a>) {
        let outermost = self.statement_span.is_none();
        if outermost {
            self.statement_span = Some(stmt.span);
        }
        walk::walk_expression_statement(self, stmt);
        if outermost {
            self.statement_span = None;
        }
    }

    fn visit_computed_member_expression(&mut self, member: &ComputedMemberExpression<'a>) {
        if self.is_target(&member.object) {
            match self.enclosing_named_fn() {
                Some(decoder) => {
                    eprintln!(
                        "[DECODE] {} indexed inside {}, marking decoder",
                        self.target, decoder.0
                    );
                    self.decoder_fns.push(decoder);
                }
                None => self.orphan_member_use = true,
            }
        }
        walk::walk_computed_member_expression(self, member);
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        let feeds_target = call.arguments.iter().any(|arg| {
            arg.as_expression().is_some_and(|e| self.is_target(e))
        });
        if feeds_target {
            if let Some(span) = self.statement_span {
                eprintln!(
                    "[DECODE] {} passed to a call, marking rotator statement",
                    self.target
                );
                self.rotator_spans.push(span);
            }
        }
        walk::walk_call_expression(self, call);
    }
}

/// Strategy 2: big string tables and whatever touches them.
fn locate_by_big_array(
    program: &Program<'_>,
    source: &str,
    options: &Options,
) -> Option<DecoderLayout> {
    let mut finder = BigArrayFinder::new(options.array_size_threshold);
    finder.visit_program(program);
    if finder.found.is_empty() {
        return None;
    }

    let refs = count_references(program);
    let mut decoders = FxHashSet::default();
    let mut setup_spans: Vec<Span> = Vec::new();

    for array in &finder.found {
        let ref_count = refs.get(&array.name).copied().unwrap_or(0);
        if ref_count >= 10 {
            eprintln!(
                "[DECODE] {} referenced {} time(s), too hot for a string table",
                array.name, ref_count
            );
            continue;
        }

        let mut targets: Vec<&str> = vec![array.name.as_str()];
        if let Some((fn_name, fn_span)) = &array.containing_fn {
            // The table hides inside a function; its references behave like
            // references to the table itself.
            targets.push(fn_name.as_str());
            setup_spans.push(*fn_span);
        }

        let mut found_any = false;
        for target in targets {
            let mut scanner = UsageScanner::new(target);
            scanner.visit_program(program);
            if scanner.orphan_member_use {
                eprintln!(
                    "[DECODE] {} is indexed outside any function; skipping (cannot slice setup)",
                    target
                );
            }
            for (name, span) in scanner.decoder_fns {
                decoders.insert(name);
                setup_spans.push(span);
                found_any = true;
            }
            for span in scanner.rotator_spans {
                setup_spans.push(span);
                found_any = true;
            }
        }

        if found_any {
            setup_spans.push(array.decl_span);
        }
    }

    if decoders.is_empty() {
        return None;
    }

    Some(DecoderLayout {
        decoders,
        setup: slice_spans(source, setup_spans),
    })
}

/// Concatenate source slices in order, dropping spans contained in an
/// already-kept one.
fn slice_spans(source: &str, mut spans: Vec<Span>) -> String {
    spans.sort_by_key(|s| (s.start, std::cmp::Reverse(s.end)));
    let mut kept: Vec<Span> = Vec::new();
    for span in spans {
        if kept
            .iter()
            .any(|k| k.start <= span.start && span.end <= k.end)
        {
            continue;
        }
        kept.push(span);
    }
    kept.iter()
        .map(|s| &source[s.start as usize..s.end as usize])
        .collect::<Vec<_>>()
        .join("\n")
}

/// Try the strategies in order; the first that finds decoders wins.
pub fn locate(program: &Program<'_>, source: &str, options: &Options) -> Option<DecoderLayout> {
    if let Some(layout) = locate_by_call_count(program, source, options) {
        eprintln!(
            "[DECODE] Call-count strategy found {} decoder(s)",
            layout.decoders.len()
        );
        return Some(layout);
    }
    if let Some(layout) = locate_by_big_array(program, source, options) {
        eprintln!(
            "[DECODE] Big-array strategy found {} decoder(s)",
            layout.decoders.len()
        );
        return Some(layout);
    }
    None
}
