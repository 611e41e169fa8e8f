//! Missing-branch discovery.
//!
//! Two searches live here. [`find_missed_classes_data`] walks a sealed
//! hierarchy from the selector downwards and reports the highest classes no
//! pattern covers. [`record_exhaustiveness`] decides a record selector and,
//! when the deconstructions fall short, synthesizes the flat record patterns
//! that would complete them.
//!
//! The reduction engine may stop short of a proof depending on the order its
//! rewrites fire in. A record set it cannot reduce to the selector is
//! therefore also checked with the usefulness search, and synthesized
//! branches are only reported once they are shown to complete the switch.

use crate::cache::{lookup, remember};
use crate::context::CoverageContext;
use crate::coverage::covers;
use crate::error::CoverageResult;
use crate::reduce::{
    cover_selector_type, create_patterns_from, group_without_component, reduce_in_loop,
};
use crate::sealed::{all_permitted_subclasses, find_sealed_upper_classes, permitted_subclasses};
use crate::usefulness::{covers_selector, uncovered};
use crate::{Deconstruction, FxIndexMap, FxIndexSet, NominalType, PatternDescription, PatternSet};
use covera_types::{ClassId, Type};
use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use std::collections::VecDeque;
use std::slice;
use tracing::trace;

/// Outcome of the record-selector check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordVerdict {
    Exhaustive,
    /// The listed flat record patterns would make the switch exhaustive
    Incomplete(Vec<PatternDescription>),
    /// Not exhaustive, and no finite list of record patterns was found
    CannotAdd,
}

impl RecordVerdict {
    pub fn is_exhaustive(&self) -> bool {
        matches!(self, RecordVerdict::Exhaustive)
    }
}

/// Classes found by the sealed hierarchy walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SealedResult {
    /// Highest classes reachable from the selector that nothing covers
    pub missed: FxIndexSet<ClassId>,
    /// Sealed classes whose whole relevant subtree is covered
    pub covered: FxIndexSet<ClassId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Visit {
    class: ClassId,
    path: Vec<ClassId>,
}

/// Walk the sealed hierarchy below `selector`.
///
/// `elements` are unconditional descriptions; deconstructions count when
/// their record check is exhaustive. `enum_constants` lists the enum
/// constant labels of the switch; an enum counts as covered when every one
/// of its constants is present.
pub fn find_missed_classes_data(
    ctx: &CoverageContext<'_>,
    selector: &Type,
    elements: &[PatternDescription],
    enum_constants: &[(ClassId, SmolStr)],
) -> CoverageResult<SealedResult> {
    let universe = ctx.universe;
    let mut pattern_types = reduce_to_type_tests(ctx, elements)?;
    pattern_types.extend(reduce_enum_constants_to_type_tests(ctx, enum_constants));

    let mut permitted_pattern_classes: FxIndexMap<ClassId, Vec<&Type>> = FxIndexMap::default();
    for ty in &pattern_types {
        let Some(class) = universe.resolve_class(ty) else {
            continue;
        };
        permitted_pattern_classes.entry(class).or_default().push(ty);
        for sub in all_permitted_subclasses(ctx, class).iter().copied() {
            permitted_pattern_classes.entry(sub).or_default().push(ty);
        }
    }
    let sealed_upper =
        find_sealed_upper_classes(ctx, permitted_pattern_classes.keys().copied());

    let type_tests: Vec<&Type> = elements
        .iter()
        .filter(|element| element.is_type_test())
        .map(PatternDescription::ty)
        .collect();
    let selector_classes: FxIndexSet<ClassId> = selector
        .conjuncts()
        .into_iter()
        .filter_map(|conjunct| universe.resolve_class(conjunct))
        .collect();

    let mut result = SealedResult::default();
    let mut not_covered: FxHashSet<ClassId> = FxHashSet::default();
    let mut visited: FxHashSet<Visit> = FxHashSet::default();
    let mut queue: VecDeque<Visit> = selector_classes
        .iter()
        .map(|class| Visit {
            class: *class,
            path: vec![*class],
        })
        .collect();

    while let Some(visit) = queue.pop_front() {
        if !visited.insert(visit.clone()) {
            continue;
        }
        let expand = sealed_upper.contains(&visit.class)
            || (selector_classes.contains(&visit.class) && elements.is_empty());
        if expand {
            for permitted in permitted_subclasses(ctx, visit.class).iter().copied() {
                let permitted_ty = Type::class(permitted);
                let matching = permitted_pattern_classes
                    .get(&permitted)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let descend = if matching.is_empty() {
                    universe.is_convertible(selector, &permitted_ty)
                } else {
                    !matching.iter().any(|ty| covers(ctx, ty, &permitted_ty))
                };
                if descend {
                    let mut path = visit.path.clone();
                    path.push(permitted);
                    queue.push_back(Visit {
                        class: permitted,
                        path,
                    });
                } else if !matching.is_empty() {
                    result.covered.extend(visit.path.iter().copied());
                }
            }
            continue;
        }

        let target = Type::class(visit.class);
        if universe.is_convertible(&target, selector) || covers(ctx, &target, selector) {
            if type_tests.iter().any(|ty| covers(ctx, ty, &target)) {
                result.covered.extend(visit.path.iter().copied());
            } else {
                result.missed.insert(visit.class);
                not_covered.extend(visit.path.iter().copied());
            }
        }
    }

    result.covered.retain(|class| !not_covered.contains(class));
    if selector_classes
        .iter()
        .any(|class| result.covered.contains(class))
    {
        result.missed.clear();
    }
    trace!(
        selector = %universe.display(selector),
        missed = result.missed.len(),
        covered = result.covered.len(),
        "Sealed hierarchy walk"
    );
    Ok(result)
}

/// Type tests plus the record types whose deconstructions are exhaustive.
fn reduce_to_type_tests(
    ctx: &CoverageContext<'_>,
    elements: &[PatternDescription],
) -> CoverageResult<Vec<Type>> {
    let mut reduced = Vec::new();
    let mut records: FxIndexMap<&NominalType, Vec<PatternDescription>> = FxIndexMap::default();
    for element in elements {
        match element {
            PatternDescription::TypeTest(ty) => reduced.push(ty.ty().clone()),
            PatternDescription::Deconstruction(deconstruction) => records
                .entry(deconstruction.ty())
                .or_default()
                .push(element.clone()),
        }
    }
    for (record, group) in records {
        if record_exhaustiveness(ctx, record.ty(), &group)?.is_exhaustive() {
            reduced.push(record.ty().clone());
        }
    }
    Ok(reduced)
}

/// Enum types all of whose constants appear among the labels.
pub(crate) fn reduce_enum_constants_to_type_tests(
    ctx: &CoverageContext<'_>,
    enum_constants: &[(ClassId, SmolStr)],
) -> Vec<Type> {
    let mut by_enum: FxIndexMap<ClassId, FxHashSet<&SmolStr>> = FxIndexMap::default();
    for (class, name) in enum_constants {
        by_enum.entry(*class).or_default().insert(name);
    }
    by_enum
        .into_iter()
        .filter(|(class, present)| {
            let all = ctx.universe.enum_constants(*class);
            !all.is_empty() && all.iter().all(|name| present.contains(name))
        })
        .map(|(class, _)| Type::class(class))
        .collect()
}

/// Add a type test for each class of `classes` not already in `existing`.
///
/// Classes below `selector` contribute a test of themselves; the first
/// class above it contributes a test of `selector` and ends the scan.
pub(crate) fn add_new_classes(
    ctx: &CoverageContext<'_>,
    selector: &Type,
    classes: &FxIndexSet<ClassId>,
    existing: &FxHashSet<NominalType>,
    out: &mut FxIndexSet<PatternDescription>,
) {
    let universe = ctx.universe;
    for class in classes {
        let class_ty = Type::class(*class);
        let class_test = PatternDescription::type_test(universe, class_ty.clone());
        if existing.contains(class_test.nominal()) {
            continue;
        }
        if covers(ctx, selector, &class_ty) {
            out.insert(class_test);
        }
        if covers(ctx, &class_ty, selector) {
            out.insert(PatternDescription::type_test(universe, selector.clone()));
            break;
        }
    }
}

/// Decide a record selector from the deconstructions among `elements`.
pub fn record_exhaustiveness(
    ctx: &CoverageContext<'_>,
    selector: &Type,
    elements: &[PatternDescription],
) -> CoverageResult<RecordVerdict> {
    let universe = ctx.universe;
    let deconstructions: PatternSet = elements
        .iter()
        .filter(|element| {
            !element.is_type_test() && universe.is_convertible(element.ty(), selector)
        })
        .cloned()
        .collect();
    if deconstructions.is_empty() {
        return Ok(RecordVerdict::CannotAdd);
    }
    let key = (NominalType::new(universe, selector.clone()), deconstructions.sorted());
    if let Some(hit) = lookup(&ctx.cache.records, &key) {
        return Ok(hit);
    }

    let _depth = ctx.descend()?;
    let reduced = reduce_in_loop(
        ctx,
        selector,
        &key.1,
        &|set| cover_selector_type(ctx, set, selector),
        true,
    )?;
    let verdict = if reduced.stopped || covers_selector(ctx, selector, &key.1)? {
        RecordVerdict::Exhaustive
    } else {
        complete_record_switch(ctx, selector, &key.1, &reduced.patterns)?
    };
    trace!(
        selector = %universe.display(selector),
        patterns = key.1.len(),
        ?verdict,
        "Record exhaustiveness"
    );
    Ok(remember(&ctx.cache.records, key, verdict))
}

/// Branches completing `deconstructions`, which are known to fall short.
///
/// The synthesizer works on the `reduced` set; its answer is kept only when
/// the original deconstructions plus the branches cover the selector.
/// Otherwise the uncovered shapes of the selector are offered. Either list
/// loses every branch the others already make unnecessary.
fn complete_record_switch(
    ctx: &CoverageContext<'_>,
    selector: &Type,
    deconstructions: &PatternSet,
    reduced: &PatternSet,
) -> CoverageResult<RecordVerdict> {
    let max = ctx.config.max_generated_branches;
    let synthesized = find_missed_record_patterns(ctx, selector, reduced)?;
    let mut missing = match synthesized {
        Some(missing)
            if !missing.is_empty()
                && covers_selector(ctx, selector, deconstructions.iter().chain(&missing))? =>
        {
            missing
        }
        _ => {
            let rows = deconstructions
                .iter()
                .map(|pattern| vec![pattern.clone()])
                .collect();
            let witnesses = uncovered(ctx, rows, slice::from_ref(selector), max + 1)?;
            if witnesses.len() > max {
                return Ok(RecordVerdict::CannotAdd);
            }
            let witnesses: Vec<PatternDescription> =
                witnesses.into_iter().flatten().collect();
            if witnesses.iter().any(mentions_type_variable) {
                return Ok(RecordVerdict::CannotAdd);
            }
            witnesses
        }
    };

    let mut index = 0;
    while index < missing.len() {
        let others = missing
            .iter()
            .enumerate()
            .filter(|(position, _)| *position != index)
            .map(|(_, pattern)| pattern);
        if covers_selector(ctx, selector, deconstructions.iter().chain(others))? {
            missing.remove(index);
        } else {
            index += 1;
        }
    }
    Ok(match missing.len() {
        0 => RecordVerdict::Exhaustive,
        len if len > max => RecordVerdict::CannotAdd,
        _ => RecordVerdict::Incomplete(missing),
    })
}

fn mentions_type_variable(pattern: &PatternDescription) -> bool {
    pattern.ty().mentions_type_variable()
        || pattern.as_deconstruction().is_some_and(|deconstruction| {
            deconstruction
                .components()
                .iter()
                .any(mentions_type_variable)
        })
}

/// Synthesize flat record patterns that complete `patterns`.
///
/// `None` when the set is outside what the synthesizer handles (type
/// tests present, nested deconstructions only, generic components, mixed
/// record types) or when it would have to produce too many branches.
fn find_missed_record_patterns(
    ctx: &CoverageContext<'_>,
    selector: &Type,
    patterns: &PatternSet,
) -> CoverageResult<Option<Vec<PatternDescription>>> {
    let universe = ctx.universe;
    if universe.resolve_class(selector).is_none()
        || patterns.len() > ctx.config.max_record_patterns
    {
        return Ok(None);
    }
    let Some(component_types) = universe.record_component_types(selector) else {
        return Ok(None);
    };
    let supported = component_types.iter().all(|ty| {
        ty.is_primitive()
            || ty
                .class_id()
                .is_some_and(|class| !universe.has_type_parameters(class))
    });
    if !supported || patterns.has_type_tests() {
        return Ok(None);
    }

    let mut by_type: FxIndexMap<&NominalType, Vec<&Deconstruction>> = FxIndexMap::default();
    for deconstruction in patterns.deconstructions() {
        by_type
            .entry(deconstruction.ty())
            .or_default()
            .push(deconstruction);
    }
    if by_type.len() != 1 {
        return Ok(None);
    }
    let Some((record, descriptions)) = by_type.first() else {
        return Ok(None);
    };
    if **record != NominalType::new(universe, selector.clone()) {
        return Ok(None);
    }

    let filtered: Vec<&Deconstruction> = descriptions
        .iter()
        .copied()
        .filter(|deconstruction| deconstruction.is_flat())
        .collect();
    let Some(first) = filtered.first() else {
        let components = component_types
            .iter()
            .map(|ty| PatternDescription::type_test(universe, ty.clone()))
            .collect();
        let whole = PatternDescription::deconstruction(universe, selector.clone(), components);
        return Ok(whole.ok().map(|whole| vec![whole]));
    };
    let arity = first.arity();

    let mut combined: PatternSet = filtered
        .iter()
        .map(|deconstruction| PatternDescription::Deconstruction((*deconstruction).clone()))
        .collect();
    let mut missing: FxIndexSet<PatternDescription> = FxIndexSet::default();

    for index in 0..arity {
        if missing.len() > ctx.config.max_generated_branches {
            return Ok(None);
        }
        let Some(component_ty) = component_types.get(index) else {
            return Ok(None);
        };

        let snapshot = combined.clone();
        let buckets = group_without_component(snapshot.deconstructions(), index);
        let mut this_round: Vec<PatternDescription> = Vec::new();
        for bucket in buckets.values() {
            let Some(sample) = bucket.first() else {
                continue;
            };
            let nested: Vec<PatternDescription> = bucket
                .iter()
                .map(|deconstruction| deconstruction.components()[index].clone())
                .filter(PatternDescription::is_type_test)
                .collect();

            let mut missed_components: FxIndexSet<PatternDescription> = FxIndexSet::default();
            if nested.is_empty() {
                let whole = PatternDescription::type_test(universe, component_ty.clone());
                missed_components.insert(whole);
            } else {
                let existing: FxHashSet<NominalType> =
                    nested.iter().map(|pattern| pattern.nominal().clone()).collect();
                let sealed = find_missed_classes_data(ctx, component_ty, &nested, &[])?;
                if sealed.missed.is_empty() {
                    for deconstruction in bucket {
                        combined.remove(&PatternDescription::from((*deconstruction).clone()));
                    }
                    let whole = PatternDescription::type_test(universe, component_ty.clone());
                    combined.extend(create_patterns_from(index, [&whole], sample));
                } else {
                    add_new_classes(
                        ctx,
                        component_ty,
                        &sealed.missed,
                        &existing,
                        &mut missed_components,
                    );
                }
            }

            for candidate in create_patterns_from(index, &missed_components, sample) {
                let Some(candidate_deconstruction) = candidate.as_deconstruction() else {
                    continue;
                };
                let already = filtered
                    .iter()
                    .any(|existing| one_of_unconditional(ctx, existing, candidate_deconstruction));
                if !already {
                    this_round.push(candidate);
                }
            }
            missing.extend(this_round.iter().cloned());
        }

        combined.extend(this_round);
        let reduced = reduce_in_loop(ctx, selector, &combined, &|_| false, false)?;
        if reduced.changed {
            let mut fresh = reduced.patterns;
            fresh.retain(|pattern| !combined.contains(pattern));
            combined = fresh;
        }
    }

    let reduced = reduce_in_loop(ctx, selector, &combined, &|_| false, false)?;
    if cover_selector_type(ctx, &reduced.patterns, selector) {
        Ok(Some(missing.into_iter().collect()))
    } else {
        Ok(None)
    }
}

/// Whether `who` already matches everything `over` would.
fn one_of_unconditional(
    ctx: &CoverageContext<'_>,
    who: &Deconstruction,
    over: &Deconstruction,
) -> bool {
    who.ty() == over.ty()
        && who.arity() == over.arity()
        && who
            .components()
            .iter()
            .zip(over.components())
            .all(|(mine, theirs)| covers(ctx, mine.ty(), theirs.ty()))
}
