//! Missing branches and how they are spelled.

use crate::{FxIndexMap, NominalType, PatternDescription};
use covera_types::{ClassId, Type, TypeUniverse};
use smol_str::SmolStr;
use std::fmt;

/// A case a switch would need to become exhaustive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingBranch {
    Pattern(PatternDescription),
    EnumConstant { class: ClassId, name: SmolStr },
    BoolConstant(bool),
    /// Only a `default` can complete the switch
    Default,
}

impl MissingBranch {
    /// Source-like spelling: `Square`, `Pair(Circle, Square)`, `RED`,
    /// `true` or `default`.
    pub fn to_pattern_string(&self, universe: &TypeUniverse) -> String {
        self.display(universe).to_string()
    }

    pub fn display<'a>(&'a self, universe: &'a TypeUniverse) -> MissingBranchDisplay<'a> {
        MissingBranchDisplay {
            branch: self,
            universe,
        }
    }
}

pub struct MissingBranchDisplay<'a> {
    branch: &'a MissingBranch,
    universe: &'a TypeUniverse,
}

impl fmt::Display for MissingBranchDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.branch {
            MissingBranch::Pattern(pattern) => write_pattern(f, self.universe, pattern),
            MissingBranch::EnumConstant { name, .. } => f.write_str(name),
            MissingBranch::BoolConstant(value) => write!(f, "{value}"),
            MissingBranch::Default => f.write_str("default"),
        }
    }
}

fn write_pattern(
    f: &mut fmt::Formatter<'_>,
    universe: &TypeUniverse,
    pattern: &PatternDescription,
) -> fmt::Result {
    write!(f, "{}", universe.display(pattern.ty()))?;
    if let PatternDescription::Deconstruction(deconstruction) = pattern {
        f.write_str("(")?;
        for (index, component) in deconstruction.components().iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write_pattern(f, universe, component)?;
        }
        f.write_str(")")?;
    }
    Ok(())
}

/// Flat record branches grouped by record type, as component type lists.
///
/// Other branches are skipped.
pub fn missing_branches_by_type(
    branches: &[MissingBranch],
) -> FxIndexMap<NominalType, Vec<Vec<Type>>> {
    let mut grouped: FxIndexMap<NominalType, Vec<Vec<Type>>> = FxIndexMap::default();
    for branch in branches {
        let MissingBranch::Pattern(PatternDescription::Deconstruction(deconstruction)) = branch
        else {
            continue;
        };
        if !deconstruction.is_flat() {
            continue;
        }
        let components: Vec<Type> = deconstruction
            .components()
            .iter()
            .map(|component| component.ty().clone())
            .collect();
        let lists = grouped.entry(deconstruction.ty().clone()).or_default();
        if !lists.contains(&components) {
            lists.push(components);
        }
    }
    grouped
}
