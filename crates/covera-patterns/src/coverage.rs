//! Coverage and domination primitives.
//!
//! These relations are shared by the reduction engine and the dominance
//! checker. They must agree with each other: whenever `dominates(a, b)`
//! holds, `a` is unconditional for every type `b` is unconditional for.

use crate::context::CoverageContext;
use crate::{ConstantValue, PatternDescription};
use covera_types::Type;

/// Whether a type test of `pattern_ty` matches every value of `ty`.
///
/// An intersection `ty` is covered only when each of its conjuncts is.
pub fn covers(ctx: &CoverageContext<'_>, pattern_ty: &Type, ty: &Type) -> bool {
    if pattern_ty == ty {
        return true;
    }
    if let Type::Intersection(parts) = ty {
        return parts.iter().all(|part| covers(ctx, pattern_ty, part));
    }
    let universe = ctx.universe;
    match (pattern_ty, ty) {
        (Type::Primitive(expected), Type::Primitive(actual)) => expected == actual,
        (Type::Primitive(expected), reference) => {
            ctx.config.primitive_patterns && universe.unboxed(reference) == Some(*expected)
        }
        (reference, Type::Primitive(actual)) => {
            ctx.config.primitive_patterns
                && universe.is_assignable(reference, &universe.boxed_type(*actual))
        }
        _ => universe.is_assignable(pattern_ty, ty),
    }
}

/// Whether `pattern` matches every value of `ty`.
pub fn is_unconditional(
    ctx: &CoverageContext<'_>,
    pattern: &PatternDescription,
    ty: &Type,
) -> bool {
    match pattern {
        PatternDescription::TypeTest(nominal) => covers(ctx, nominal.ty(), ty),
        PatternDescription::Deconstruction(deconstruction) => {
            if !covers(ctx, deconstruction.ty().ty(), ty) {
                return false;
            }
            let record = deconstruction.ty().ty();
            let Some(component_types) = ctx.universe.record_component_types(record) else {
                return false;
            };
            component_types.len() == deconstruction.arity()
                && deconstruction
                    .components()
                    .iter()
                    .zip(&component_types)
                    .all(|(component, component_ty)| is_unconditional(ctx, component, component_ty))
        }
    }
}

/// Whether every value matched by `dominated` is matched by `dominant`.
pub fn dominates(
    ctx: &CoverageContext<'_>,
    dominant: &PatternDescription,
    dominated: &PatternDescription,
) -> bool {
    match (dominant, dominated) {
        (PatternDescription::TypeTest(outer), _) => covers(ctx, outer.ty(), dominated.ty()),
        (PatternDescription::Deconstruction(outer), PatternDescription::Deconstruction(inner)) => {
            outer.ty() == inner.ty()
                && outer.arity() == inner.arity()
                && outer
                    .components()
                    .iter()
                    .zip(inner.components())
                    .all(|(a, b)| dominates(ctx, a, b))
        }
        (PatternDescription::Deconstruction(outer), PatternDescription::TypeTest(inner)) => {
            outer.ty() == inner && is_unconditional(ctx, dominant, inner.ty())
        }
    }
}

/// Whether `pattern` makes a later `case constant` unreachable.
///
/// A primitive constant is compared against its box unless the pattern
/// itself tests a primitive.
pub fn dominates_constant(
    ctx: &CoverageContext<'_>,
    pattern: &PatternDescription,
    constant: &ConstantValue,
) -> bool {
    let PatternDescription::TypeTest(nominal) = pattern else {
        return false;
    };
    let constant_ty = constant.ty(ctx.universe);
    match constant_ty.as_primitive() {
        Some(kind) if !nominal.ty().is_primitive() => {
            ctx.universe
                .is_assignable(nominal.ty(), &ctx.universe.boxed_type(kind))
        }
        _ => covers(ctx, nominal.ty(), &constant_ty),
    }
}

/// Whether `pattern` makes a later enum constant label of `enum_ty`
/// unreachable.
pub fn dominates_enum_constant(
    ctx: &CoverageContext<'_>,
    pattern: &PatternDescription,
    enum_ty: &Type,
) -> bool {
    pattern.is_type_test() && covers(ctx, pattern.ty(), enum_ty)
}
