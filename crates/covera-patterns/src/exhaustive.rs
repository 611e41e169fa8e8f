//! The completeness decision procedure.
//!
//! [`check_exhaustiveness`] classifies the selector with [`SelectorKind`]
//! and applies the matching test:
//!
//! - numeric, `String` and unclassified selectors need a `default`,
//! - `boolean` needs both constants,
//! - enums need every constant,
//! - abstract sealed classes go through the sealed walk, then the
//!   reduction engine and the usefulness search,
//! - records go through the record reduction and synthesizer.
//!
//! A `default` label or an unguarded unconditional pattern short-circuits
//! all of the above.

use crate::context::CoverageContext;
use crate::coverage::is_unconditional;
use crate::error::CoverageResult;
use crate::missing::{
    find_missed_classes_data, record_exhaustiveness, reduce_enum_constants_to_type_tests,
    RecordVerdict,
};
use crate::reduce::{cover_selector_type, reduce_in_loop};
use crate::selector::SelectorKind;
use crate::usefulness::covers_selector;
use crate::witness::MissingBranch;
use crate::{CaseLabel, ConstantValue, PatternDescription, PatternSet};
use covera_types::{ClassId, Type};
use smol_str::SmolStr;
use tracing::{debug, instrument, warn};

/// Outcome of an exhaustiveness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Exhaustive,
    /// Not exhaustive; adding the listed branches would fix it
    Incomplete(Vec<MissingBranch>),
    /// Not provably exhaustive, and no fix can be offered
    CannotDetermine,
}

impl Verdict {
    pub fn is_exhaustive(&self) -> bool {
        matches!(self, Verdict::Exhaustive)
    }

    /// Missing branches of an incomplete switch; empty otherwise.
    pub fn missing(&self) -> &[MissingBranch] {
        match self {
            Verdict::Incomplete(branches) => branches,
            Verdict::Exhaustive | Verdict::CannotDetermine => &[],
        }
    }
}

/// Decide whether `labels` cover every value of `selector`.
///
/// Errors inside the engine (iteration or depth limits, cancellation) are
/// logged and reported as [`Verdict::CannotDetermine`].
#[instrument(
    level = "debug",
    skip_all,
    fields(selector = %ctx.universe.display(selector), labels = labels.len())
)]
pub fn check_exhaustiveness(
    ctx: &CoverageContext<'_>,
    selector: &Type,
    labels: &[CaseLabel],
) -> Verdict {
    let verdict = match decide(ctx, selector, labels) {
        Ok(verdict) => verdict,
        Err(error) => {
            warn!(%error, "Exhaustiveness check abandoned");
            Verdict::CannotDetermine
        }
    };
    debug!(?verdict, "Exhaustiveness verdict");
    verdict
}

fn decide(
    ctx: &CoverageContext<'_>,
    selector: &Type,
    labels: &[CaseLabel],
) -> CoverageResult<Verdict> {
    if labels.iter().any(CaseLabel::is_default) {
        return Ok(Verdict::Exhaustive);
    }
    let patterns: Vec<PatternDescription> = labels
        .iter()
        .filter_map(CaseLabel::unguarded_pattern)
        .cloned()
        .collect();
    if patterns
        .iter()
        .any(|pattern| is_unconditional(ctx, pattern, selector))
    {
        return Ok(Verdict::Exhaustive);
    }

    let kind = SelectorKind::of(ctx.universe, selector);
    if kind.needs_default() {
        return Ok(Verdict::Incomplete(vec![MissingBranch::Default]));
    }
    match kind {
        SelectorKind::Boolean => Ok(check_boolean(labels)),
        SelectorKind::Enum => Ok(check_enum(ctx, selector, labels)),
        _ => check_class(ctx, selector, labels, &patterns),
    }
}

fn check_boolean(labels: &[CaseLabel]) -> Verdict {
    let present = |wanted: bool| {
        labels.iter().any(|label| {
            matches!(label, CaseLabel::Constant(ConstantValue::Bool(value)) if *value == wanted)
        })
    };
    let missing: Vec<MissingBranch> = [true, false]
        .into_iter()
        .filter(|value| !present(*value))
        .map(MissingBranch::BoolConstant)
        .collect();
    if missing.is_empty() {
        Verdict::Exhaustive
    } else {
        Verdict::Incomplete(missing)
    }
}

fn check_enum(ctx: &CoverageContext<'_>, selector: &Type, labels: &[CaseLabel]) -> Verdict {
    let Some(class) = selector.class_id() else {
        return Verdict::Incomplete(vec![MissingBranch::Default]);
    };
    let constants = ctx.universe.enum_constants(class);
    if constants.is_empty() {
        return Verdict::Incomplete(vec![MissingBranch::Default]);
    }
    let missing: Vec<MissingBranch> = constants
        .iter()
        .filter(|name| {
            !labels.iter().any(|label| {
                matches!(label, CaseLabel::EnumConstant { class: labelled, name: present }
                    if *labelled == class && present == *name)
            })
        })
        .map(|name| MissingBranch::EnumConstant {
            class,
            name: name.clone(),
        })
        .collect();
    if missing.is_empty() {
        Verdict::Exhaustive
    } else {
        Verdict::Incomplete(missing)
    }
}

fn check_class(
    ctx: &CoverageContext<'_>,
    selector: &Type,
    labels: &[CaseLabel],
    patterns: &[PatternDescription],
) -> CoverageResult<Verdict> {
    let universe = ctx.universe;
    let sealed = selector
        .conjuncts()
        .into_iter()
        .filter_map(|conjunct| universe.resolve_class(conjunct))
        .any(|class| universe.is_abstract_sealed(class));
    if sealed {
        return check_sealed(ctx, selector, labels, patterns);
    }
    match selector {
        Type::Class { class, .. } if universe.class(*class).is_record() => {
            check_record(ctx, selector, patterns)
        }
        _ => Ok(Verdict::Incomplete(vec![MissingBranch::Default])),
    }
}

fn check_sealed(
    ctx: &CoverageContext<'_>,
    selector: &Type,
    labels: &[CaseLabel],
    patterns: &[PatternDescription],
) -> CoverageResult<Verdict> {
    let universe = ctx.universe;
    let enum_constants: Vec<(ClassId, SmolStr)> = labels
        .iter()
        .filter_map(|label| match label {
            CaseLabel::EnumConstant { class, name } => Some((*class, name.clone())),
            _ => None,
        })
        .collect();

    let walk = find_missed_classes_data(ctx, selector, patterns, &enum_constants)?;
    if walk.missed.is_empty() {
        return Ok(Verdict::Exhaustive);
    }

    let mut seeded: PatternSet = patterns.iter().cloned().collect();
    seeded.extend(
        reduce_enum_constants_to_type_tests(ctx, &enum_constants)
            .into_iter()
            .map(|ty| PatternDescription::type_test(universe, ty)),
    );
    let reduced = reduce_in_loop(
        ctx,
        selector,
        &seeded,
        &|set| cover_selector_type(ctx, set, selector),
        true,
    )?;
    if reduced.stopped
        || cover_selector_type(ctx, &reduced.patterns, selector)
        || covers_selector(ctx, selector, &seeded)?
    {
        return Ok(Verdict::Exhaustive);
    }

    let branches = walk
        .missed
        .iter()
        .take(ctx.config.max_generated_branches)
        .map(|class| {
            MissingBranch::Pattern(PatternDescription::type_test(universe, Type::class(*class)))
        })
        .collect();
    Ok(Verdict::Incomplete(branches))
}

fn check_record(
    ctx: &CoverageContext<'_>,
    selector: &Type,
    patterns: &[PatternDescription],
) -> CoverageResult<Verdict> {
    let universe = ctx.universe;
    let deconstructs = patterns
        .iter()
        .any(|pattern| !pattern.is_type_test() && universe.is_convertible(pattern.ty(), selector));
    if !deconstructs {
        return Ok(whole_record_branch(ctx, selector)
            .map_or(Verdict::CannotDetermine, |branch| Verdict::Incomplete(vec![branch])));
    }

    match record_exhaustiveness(ctx, selector, patterns)? {
        RecordVerdict::Exhaustive => Ok(Verdict::Exhaustive),
        RecordVerdict::CannotAdd => Ok(Verdict::CannotDetermine),
        RecordVerdict::Incomplete(mut missing) => {
            missing.sort_by_key(PatternDescription::sort_key);
            missing.truncate(ctx.config.max_generated_branches);
            Ok(Verdict::Incomplete(
                missing.into_iter().map(MissingBranch::Pattern).collect(),
            ))
        }
    }
}

/// `R(C1 c1, ..., Cn cn)` for a record selector, when no component type
/// mentions a type variable.
fn whole_record_branch(ctx: &CoverageContext<'_>, selector: &Type) -> Option<MissingBranch> {
    let universe = ctx.universe;
    let component_types = universe.record_component_types(selector)?;
    if component_types.iter().any(Type::mentions_type_variable) {
        return None;
    }
    let components = component_types
        .into_iter()
        .map(|ty| PatternDescription::type_test(universe, ty))
        .collect();
    PatternDescription::deconstruction(universe, selector.clone(), components)
        .ok()
        .map(MissingBranch::Pattern)
}
