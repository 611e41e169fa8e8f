//! Sealed hierarchy navigation.
//!
//! Only abstract sealed classes (sealed interfaces included) have a closed
//! set of subclasses: a sealed concrete class can still be instantiated
//! itself, so for the purposes of exhaustiveness it is a leaf.

use crate::cache::{lookup, remember};
use crate::context::CoverageContext;
use crate::FxIndexSet;
use covera_types::ClassId;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::sync::Arc;

/// Direct permitted subclasses of an abstract sealed class.
///
/// The explicit `permits` list when declared, otherwise every direct
/// non-local subclass in the universe. Empty for any other class.
pub fn permitted_subclasses(ctx: &CoverageContext<'_>, class: ClassId) -> Arc<[ClassId]> {
    if !ctx.universe.is_abstract_sealed(class) {
        return Arc::from([]);
    }
    if let Some(hit) = lookup(&ctx.cache.permitted, &class) {
        return hit;
    }
    let def = ctx.universe.class(class);
    let permitted: Arc<[ClassId]> = match &def.permits {
        Some(list) => list.iter().copied().collect(),
        None => ctx
            .universe
            .direct_subclasses(class)
            .iter()
            .copied()
            .filter(|sub| !ctx.universe.class(*sub).is_local)
            .collect(),
    };
    remember(&ctx.cache.permitted, class, permitted)
}

/// Every class reachable through permitted subclasses that is not itself
/// abstract sealed.
pub fn transitive_permitted_leaves(ctx: &CoverageContext<'_>, class: ClassId) -> Arc<[ClassId]> {
    if !ctx.universe.is_abstract_sealed(class) {
        return Arc::from([]);
    }
    if let Some(hit) = lookup(&ctx.cache.leaves, &class) {
        return hit;
    }
    let mut leaves = FxIndexSet::default();
    let mut seen = FxHashSet::default();
    let mut queue = VecDeque::from([class]);
    while let Some(current) = queue.pop_front() {
        if !seen.insert(current) {
            continue;
        }
        for sub in permitted_subclasses(ctx, current).iter().copied() {
            if ctx.universe.is_abstract_sealed(sub) {
                queue.push_back(sub);
            } else {
                leaves.insert(sub);
            }
        }
    }
    remember(&ctx.cache.leaves, class, leaves.into_iter().collect())
}

/// Every class reachable through permitted subclasses, inner nodes included.
pub fn all_permitted_subclasses(ctx: &CoverageContext<'_>, class: ClassId) -> Arc<[ClassId]> {
    if !ctx.universe.is_abstract_sealed(class) {
        return Arc::from([]);
    }
    if let Some(hit) = lookup(&ctx.cache.all_permitted, &class) {
        return hit;
    }
    let mut reached = FxIndexSet::default();
    let mut queue = VecDeque::from([class]);
    while let Some(current) = queue.pop_front() {
        for sub in permitted_subclasses(ctx, current).iter().copied() {
            if reached.insert(sub) {
                queue.push_back(sub);
            }
        }
    }
    let reached: Arc<[ClassId]> = reached.into_iter().collect();
    remember(&ctx.cache.all_permitted, class, reached)
}

/// Abstract sealed classes reachable upwards from `classes` by stepping to a
/// supertype that permits the current class. Abstract sealed classes among
/// `classes` are included.
pub fn find_sealed_upper_classes(
    ctx: &CoverageContext<'_>,
    classes: impl IntoIterator<Item = ClassId>,
) -> FxIndexSet<ClassId> {
    let universe = ctx.universe;
    let mut upper = FxIndexSet::default();
    let mut seen = FxHashSet::default();
    let mut queue: VecDeque<ClassId> = classes.into_iter().collect();
    while let Some(current) = queue.pop_front() {
        if !seen.insert(current) {
            continue;
        }
        if universe.is_abstract_sealed(current) {
            upper.insert(current);
        }
        for sup in universe.supers(current).iter().copied() {
            if universe.is_abstract_sealed(sup)
                && permitted_subclasses(ctx, sup).contains(&current)
            {
                queue.push_back(sup);
            }
        }
    }
    upper
}

/// Whether `from` reaches `to` through abstract sealed supertypes only.
pub fn is_direct_sealed_path(ctx: &CoverageContext<'_>, from: ClassId, to: ClassId) -> bool {
    direct_sealed_path(ctx, from, to, &mut FxHashSet::default())
}

fn direct_sealed_path(
    ctx: &CoverageContext<'_>,
    from: ClassId,
    to: ClassId,
    visited: &mut FxHashSet<ClassId>,
) -> bool {
    if let Some(hit) = lookup(&ctx.cache.sealed_path, &(from, to)) {
        return hit;
    }
    if !visited.insert(from) {
        return false;
    }
    let universe = ctx.universe;
    let result = if from == to {
        universe.is_abstract_sealed(to)
    } else if !universe.is_inheritor(from, to) {
        false
    } else {
        universe.supers(from).iter().any(|sup| {
            universe.is_abstract_sealed(*sup) && direct_sealed_path(ctx, *sup, to, visited)
        })
    };
    remember(&ctx.cache.sealed_path, (from, to), result)
}
