//! The reduction engine.
//!
//! A set of unconditional pattern descriptions is rewritten into a smaller
//! set matching at least the same values. One [`reduce`] pass applies three
//! rules in order:
//!
//! 1. **Record merging.** Deconstructions of one record type that agree on
//!    every component but `i` are grouped; the component-`i` patterns of a
//!    group are reduced recursively against the component type and the group
//!    is replaced by deconstructions carrying the reduced patterns.
//! 2. **Deconstruction to type test.** `R(T1 t1, ..., Tn tn)` where every
//!    `Ti` covers the i-th component type of `R` becomes `R r`.
//! 3. **Sealed classes.** Type tests that together cover every permitted
//!    subclass of a sealed class are joined by a test of that class (or of
//!    the selector), and the tests it dominates are dropped. Patterns a
//!    type test of the set already dominates are dropped as well.
//!
//! [`reduce_in_loop`] repeats passes until nothing changes or a stop
//! predicate holds. When a loop stalls with several patterns left it may
//! unwrap sealed component types once (see [`unwrap_sealed_types`]) to give
//! rule 1 more material.

use crate::cache::{lookup, remember};
use crate::context::CoverageContext;
use crate::coverage::{covers, dominates};
use crate::error::{CoverageError, CoverageResult};
use crate::missing::{add_new_classes, find_missed_classes_data};
use crate::sealed::is_direct_sealed_path;
use crate::{Deconstruction, FxIndexMap, FxIndexSet, NominalType, PatternDescription, PatternSet};
use covera_types::Type;
use rustc_hash::FxHashSet;
use tracing::{trace, warn};

/// Output of one rewrite step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceResult {
    pub patterns: PatternSet,
    pub changed: bool,
}

impl ReduceResult {
    fn unchanged(patterns: &PatternSet) -> Self {
        Self {
            patterns: patterns.clone(),
            changed: false,
        }
    }

    fn compared_to(original: &PatternSet, patterns: PatternSet) -> Self {
        let changed = patterns != *original;
        Self { patterns, changed }
    }
}

/// Output of [`reduce_in_loop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopReduceResult {
    pub patterns: PatternSet,
    pub changed: bool,
    /// The stop predicate held
    pub stopped: bool,
}

/// One reduction pass over `patterns` for a value of type `selector`.
///
/// Never grows the set: `changed` implies the result differs from the input
/// and has at most as many patterns.
pub fn reduce(
    ctx: &CoverageContext<'_>,
    selector: &Type,
    patterns: &PatternSet,
) -> CoverageResult<ReduceResult> {
    let key = (NominalType::new(ctx.universe, selector.clone()), patterns.clone());
    if let Some(hit) = lookup(&ctx.cache.reduce, &key) {
        return Ok(hit);
    }
    let patterns = &patterns.sorted();

    let merged = reduce_record_patterns(ctx, patterns)?;
    let flattened = reduce_deconstructions_to_type_tests(ctx, &merged.patterns);
    let joined = reduce_classes(ctx, selector, &flattened.patterns)?;

    let result = if joined.patterns.len() <= patterns.len() {
        ReduceResult::compared_to(patterns, joined.patterns)
    } else {
        ReduceResult::unchanged(patterns)
    };
    trace!(
        selector = %ctx.universe.display(selector),
        before = patterns.len(),
        after = result.patterns.len(),
        changed = result.changed,
        "Reduction pass"
    );
    Ok(remember(&ctx.cache.reduce, key, result))
}

/// Run [`reduce`] until it stops changing the set or `stop_at` holds.
///
/// With `try_to_expand` (and [`unwrap_sealed_types`] enabled in the
/// configuration) the first stalled pass is followed by one sealed
/// unwrapping step.
pub fn reduce_in_loop(
    ctx: &CoverageContext<'_>,
    selector: &Type,
    patterns: &PatternSet,
    stop_at: &dyn Fn(&PatternSet) -> bool,
    try_to_expand: bool,
) -> CoverageResult<LoopReduceResult> {
    let mut current = patterns.clone();
    let mut changed = false;
    let mut expand = try_to_expand && ctx.config.unwrap_sealed_types;

    for _ in 0..ctx.config.max_iterations {
        ctx.check_cancelled()?;
        if stop_at(&current) {
            return Ok(LoopReduceResult {
                patterns: current,
                changed: true,
                stopped: true,
            });
        }
        let mut result = reduce(ctx, selector, &current)?;
        if expand && !result.changed && result.patterns.len() > 1 {
            result = unwrap_sealed_types(ctx, &result.patterns);
            expand = false;
        }
        changed |= result.changed;
        current = result.patterns;
        if !result.changed {
            return Ok(LoopReduceResult {
                patterns: current,
                changed,
                stopped: false,
            });
        }
    }

    let widest = patterns
        .deconstructions()
        .map(Deconstruction::arity)
        .max()
        .unwrap_or(0);
    warn!(
        patterns = patterns.len(),
        widest_deconstruction = widest,
        limit = ctx.config.max_iterations,
        "Pattern reduction did not converge"
    );
    Err(CoverageError::IterationLimit {
        limit: ctx.config.max_iterations,
        patterns: patterns.len(),
    })
}

/// Rule 1.
fn reduce_record_patterns(
    ctx: &CoverageContext<'_>,
    patterns: &PatternSet,
) -> CoverageResult<ReduceResult> {
    let mut by_type: FxIndexMap<&NominalType, Vec<&Deconstruction>> = FxIndexMap::default();
    for deconstruction in patterns.deconstructions() {
        by_type
            .entry(deconstruction.ty())
            .or_default()
            .push(deconstruction);
    }

    let mut to_remove: FxIndexSet<PatternDescription> = FxIndexSet::default();
    let mut to_add: FxIndexSet<PatternDescription> = FxIndexSet::default();
    for (record, group) in &by_type {
        let Some(component_types) = ctx.universe.record_component_types(record.ty()) else {
            continue;
        };
        for (index, component_ty) in component_types.iter().enumerate() {
            let remaining = group.iter().copied().filter(|deconstruction| {
                !to_remove.contains(&PatternDescription::Deconstruction((*deconstruction).clone()))
            });
            let buckets = group_without_component(remaining, index);

            for bucket in buckets.values() {
                let Some(sample) = bucket.first() else {
                    continue;
                };
                let nested: PatternSet = bucket
                    .iter()
                    .map(|deconstruction| deconstruction.components()[index].clone())
                    .collect();
                let result = {
                    let _depth = ctx.descend()?;
                    reduce_in_loop(ctx, component_ty, &nested, &|_| false, true)?
                };
                if !result.changed || result.patterns.len() > nested.len() {
                    continue;
                }
                to_remove.extend(bucket.iter().map(|deconstruction| {
                    PatternDescription::Deconstruction((*deconstruction).clone())
                }));
                to_add.extend(create_patterns_from(index, &result.patterns, sample));
            }
        }
    }

    if to_remove.is_empty() {
        return Ok(ReduceResult::unchanged(patterns));
    }
    let mut result = patterns.clone();
    result.retain(|pattern| !to_remove.contains(pattern));
    result.extend(to_add);
    Ok(ReduceResult::compared_to(patterns, result))
}

/// Rule 2.
fn reduce_deconstructions_to_type_tests(
    ctx: &CoverageContext<'_>,
    patterns: &PatternSet,
) -> ReduceResult {
    let mut by_type: FxIndexMap<&NominalType, Vec<&Deconstruction>> = FxIndexMap::default();
    for deconstruction in patterns.deconstructions() {
        by_type
            .entry(deconstruction.ty())
            .or_default()
            .push(deconstruction);
    }

    let mut replaced: Vec<NominalType> = Vec::new();
    for (record, group) in &by_type {
        let Some(component_types) = ctx.universe.record_component_types(record.ty()) else {
            continue;
        };
        let total = group.iter().any(|deconstruction| {
            deconstruction.is_flat()
                && deconstruction.arity() == component_types.len()
                && deconstruction
                    .components()
                    .iter()
                    .zip(&component_types)
                    .all(|(component, component_ty)| covers(ctx, component.ty(), component_ty))
        });
        if total {
            replaced.push((*record).clone());
        }
    }

    if replaced.is_empty() {
        return ReduceResult::unchanged(patterns);
    }
    let mut result = patterns.clone();
    result.retain(|pattern| match pattern {
        PatternDescription::Deconstruction(deconstruction) => {
            !replaced.contains(deconstruction.ty())
        }
        PatternDescription::TypeTest(_) => true,
    });
    result.extend(replaced.into_iter().map(PatternDescription::TypeTest));
    ReduceResult::compared_to(patterns, result)
}

/// Rule 3. Only the type tests of the set take part in the sealed walk.
fn reduce_classes(
    ctx: &CoverageContext<'_>,
    selector: &Type,
    patterns: &PatternSet,
) -> CoverageResult<ReduceResult> {
    if !patterns.has_type_tests() {
        return Ok(ReduceResult::unchanged(patterns));
    }
    let key = (NominalType::new(ctx.universe, selector.clone()), patterns.clone());
    if let Some(hit) = lookup(&ctx.cache.reduce_classes, &key) {
        return Ok(hit);
    }
    let patterns = &patterns.sorted();

    let type_tests: Vec<PatternDescription> = patterns
        .type_tests()
        .cloned()
        .map(PatternDescription::TypeTest)
        .collect();
    let existing: FxHashSet<NominalType> = patterns.type_tests().cloned().collect();
    let covered = find_missed_classes_data(ctx, selector, &type_tests, &[])?.covered;

    let mut candidates = FxIndexSet::default();
    add_new_classes(ctx, selector, &covered, &existing, &mut candidates);
    candidates.retain(|candidate| {
        !existing
            .iter()
            .any(|present| covers(ctx, present.ty(), candidate.ty()))
    });
    let maximal: Vec<PatternDescription> = candidates
        .iter()
        .filter(|candidate| {
            !candidates
                .iter()
                .any(|other| strictly_dominates(ctx, other, candidate))
        })
        .cloned()
        .collect();

    let mut result = patterns.clone();
    result.retain(|pattern| {
        !type_tests
            .iter()
            .any(|test| strictly_dominates(ctx, test, pattern))
            && !maximal.iter().any(|added| dominates(ctx, added, pattern))
    });
    result.extend(maximal);
    let result = if result.len() > patterns.len() {
        ReduceResult::unchanged(patterns)
    } else {
        ReduceResult::compared_to(patterns, result)
    };
    Ok(remember(&ctx.cache.reduce_classes, key, result))
}

fn strictly_dominates(
    ctx: &CoverageContext<'_>,
    dominant: &PatternDescription,
    dominated: &PatternDescription,
) -> bool {
    dominant != dominated
        && dominates(ctx, dominant, dominated)
        && !dominates(ctx, dominated, dominant)
}

/// Rule 4: widen deconstructions along direct sealed paths.
///
/// For two deconstructions of the same record that hold an abstract sealed
/// `S` and a class `C` directly permitted below `S` at the same position,
/// the first one is copied with `C` in place of `S`. Patterns are only ever
/// added.
pub fn unwrap_sealed_types(ctx: &CoverageContext<'_>, patterns: &PatternSet) -> ReduceResult {
    let deconstructions: PatternSet = patterns
        .deconstructions()
        .cloned()
        .map(PatternDescription::Deconstruction)
        .collect();
    if deconstructions.is_empty() {
        return ReduceResult::unchanged(patterns);
    }

    let expanded = match lookup(&ctx.cache.unwrap, &deconstructions) {
        Some(hit) => hit,
        None => {
            let expanded = expand_sealed_components(ctx, &deconstructions);
            // The expanded set is only its own expansion at a fixpoint.
            if expanded != deconstructions
                && expand_sealed_components(ctx, &expanded) == expanded
            {
                remember(&ctx.cache.unwrap, expanded.clone(), expanded.clone());
            }
            remember(&ctx.cache.unwrap, deconstructions, expanded)
        }
    };

    let mut result = patterns.clone();
    result.extend(expanded);
    let changed = result.len() != patterns.len();
    ReduceResult {
        patterns: result,
        changed,
    }
}

fn expand_sealed_components(ctx: &CoverageContext<'_>, deconstructions: &PatternSet) -> PatternSet {
    let universe = ctx.universe;
    let mut by_type: FxIndexMap<&NominalType, Vec<&Deconstruction>> = FxIndexMap::default();
    for deconstruction in deconstructions.deconstructions() {
        by_type
            .entry(deconstruction.ty())
            .or_default()
            .push(deconstruction);
    }

    let mut result = deconstructions.clone();
    for group in by_type.values() {
        for base in group {
            for (index, base_component) in base.components().iter().enumerate() {
                let PatternDescription::TypeTest(base_ty) = base_component else {
                    continue;
                };
                let Some(base_class) = base_ty.class() else {
                    continue;
                };
                if !universe.is_abstract_sealed(base_class) {
                    continue;
                }
                for compared in group {
                    if compared == base || compared.arity() != base.arity() {
                        continue;
                    }
                    let compared_component = &compared.components()[index];
                    let PatternDescription::TypeTest(compared_ty) = compared_component else {
                        continue;
                    };
                    let Some(compared_class) = compared_ty.class() else {
                        continue;
                    };
                    if compared_class == base_class
                        || !universe.is_assignable(base_ty.ty(), compared_ty.ty())
                        || !is_direct_sealed_path(ctx, compared_class, base_class)
                    {
                        continue;
                    }
                    result.insert(base.create_for(index, compared_component.clone()).into());
                }
            }
        }
    }
    result
}

/// Bucket deconstructions by all their components except `index`.
pub(crate) fn group_without_component<'a>(
    deconstructions: impl IntoIterator<Item = &'a Deconstruction>,
    index: usize,
) -> FxIndexMap<Vec<PatternDescription>, Vec<&'a Deconstruction>> {
    let mut groups: FxIndexMap<Vec<PatternDescription>, Vec<&'a Deconstruction>> =
        FxIndexMap::default();
    for deconstruction in deconstructions {
        if deconstruction.arity() <= index {
            continue;
        }
        groups
            .entry(deconstruction.without_component(index))
            .or_default()
            .push(deconstruction);
    }
    groups
}

/// One copy of `sample` per nested pattern, placed at `index`.
pub(crate) fn create_patterns_from<'a>(
    index: usize,
    nested: impl IntoIterator<Item = &'a PatternDescription>,
    sample: &Deconstruction,
) -> Vec<PatternDescription> {
    nested
        .into_iter()
        .map(|pattern| sample.create_for(index, pattern.clone()).into())
        .collect()
}

/// Whether the set holds a type test covering `selector`.
pub(crate) fn cover_selector_type(
    ctx: &CoverageContext<'_>,
    patterns: &PatternSet,
    selector: &Type,
) -> bool {
    patterns
        .type_tests()
        .any(|pattern| covers(ctx, pattern.ty(), selector))
}
