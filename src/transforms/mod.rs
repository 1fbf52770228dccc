//! The rewrite library and its fixpoint runner.
//!
//! Every pass is a struct implementing `oxc_traverse::Traverse` over the
//! shared [`EngineState`], exposed through a uniform `run` function that
//! rebuilds semantic scoping, traverses, and reports an edit count. The
//! runner applies the ordered transform list repeatedly until a full pass
//! makes no edits, or fails after the configured iteration cap.
//!
//! Ordering discipline: producers precede consumers. Control flow is
//! restored before sequences split, object tables are indexed before member
//! sites are inlined, and the dead-code sweeps run last.

pub mod branch_prune;
pub mod constant_fold;
pub mod constant_inline;
pub mod control_flow;
pub mod dead_var;
pub mod decoder_alias;
pub mod empty_statement;
pub mod iife_unwrap;
pub mod member_inline;
pub mod object_cluster;
pub mod proxy_call;
pub mod rename;
pub mod sequence_split;
pub mod state;
pub mod string_normalize;
pub mod variable_rename;

pub use state::EngineState;

use oxc_allocator::Allocator;
use oxc_ast::ast::Program;
use oxc_semantic::SemanticBuilder;
use oxc_traverse::{traverse_mut_with_ctx, ReusableTraverseCtx, Traverse};

use crate::{DeobfuscateError, Result};

/// One unit of the rewrite library: a name, its classification tags, and the
/// pass entry point.
pub struct Transform {
    pub name: &'static str,
    pub tags: &'static [&'static str],
    pub run: for<'a, 'b> fn(&'b mut Program<'a>, &'b mut EngineState, &'a Allocator) -> usize,
}

/// The default pipeline, in dependency order.
pub fn default_transforms() -> Vec<Transform> {
    vec![
        Transform {
            name: "control-flow-unflatten",
            tags: &["control-flow"],
            run: control_flow::run,
        },
        Transform {
            name: "sequence-split",
            tags: &["normalize"],
            run: sequence_split::run,
        },
        Transform {
            name: "object-cluster",
            tags: &["objects"],
            run: object_cluster::run,
        },
        Transform {
            name: "member-inline",
            tags: &["objects", "inline"],
            run: member_inline::run,
        },
        Transform {
            name: "proxy-call",
            tags: &["inline"],
            run: proxy_call::run,
        },
        Transform {
            name: "iife-unwrap",
            tags: &["normalize"],
            run: iife_unwrap::run,
        },
        Transform {
            name: "constant-fold",
            tags: &["fold"],
            run: constant_fold::run,
        },
        Transform {
            name: "branch-prune",
            tags: &["fold", "dead-code"],
            run: branch_prune::run,
        },
        Transform {
            name: "constant-inline",
            tags: &["inline"],
            run: constant_inline::run,
        },
        Transform {
            name: "decoder-alias",
            tags: &["decoder"],
            run: decoder_alias::run,
        },
        Transform {
            name: "dead-var",
            tags: &["dead-code"],
            run: dead_var::run,
        },
        Transform {
            name: "empty-statement",
            tags: &["cleanup"],
            run: empty_statement::run,
        },
        Transform {
            name: "string-normalize",
            tags: &["cleanup"],
            run: string_normalize::run,
        },
    ]
}

/// Apply a single transform once.
pub fn apply_transform<'a>(
    program: &mut Program<'a>,
    transform: &Transform,
    state: &mut EngineState,
    allocator: &'a Allocator,
) -> usize {
    let changes = (transform.run)(program, state, allocator);
    if changes > 0 {
        eprintln!("[PIPELINE] {}: {} edit(s)", transform.name, changes);
    }
    changes
}

/// Apply the transform list in order, repeating until a full pass makes no
/// edits. Errors with `DidNotConverge` when the cap is exhausted.
pub fn apply_transforms<'a>(
    program: &mut Program<'a>,
    transforms: &[Transform],
    state: &mut EngineState,
    allocator: &'a Allocator,
    iteration_cap: usize,
) -> Result<usize> {
    let mut total = 0;
    for iteration in 1..=iteration_cap {
        let mut pass_changes = 0;
        for transform in transforms {
            pass_changes += apply_transform(program, transform, state, allocator);
        }
        total += pass_changes;
        eprintln!(
            "[PIPELINE] Iteration {}: {} edit(s)",
            iteration, pass_changes
        );
        if pass_changes == 0 {
            return Ok(total);
        }
    }
    Err(DeobfuscateError::DidNotConverge {
        iterations: iteration_cap,
    })
}

/// Run an existing pass instance over the program with fresh scoping,
/// threading the engine state through the traverse context.
pub(crate) fn run_collector<'a, P>(
    program: &mut Program<'a>,
    state: &mut EngineState,
    allocator: &'a Allocator,
    pass: &mut P,
) where
    P: for<'b> Traverse<'b, EngineState>,
{
    let scoping = SemanticBuilder::new()
        .build(program)
        .semantic
        .into_scoping();
    let taken = std::mem::take(state);
    let mut ctx = ReusableTraverseCtx::new(taken, scoping, allocator);
    traverse_mut_with_ctx(pass, program, &mut ctx);
    *state = ctx.into_state();
}

/// Construct a pass, run it, and extract its edit count.
pub(crate) fn run_pass<'a, P, F>(
    program: &mut Program<'a>,
    state: &mut EngineState,
    allocator: &'a Allocator,
    finish: F,
) -> usize
where
    P: Default + for<'b> Traverse<'b, EngineState>,
    F: FnOnce(&mut P) -> usize,
{
    let mut pass = P::default();
    run_collector(program, state, allocator, &mut pass);
    finish(&mut pass)
}
