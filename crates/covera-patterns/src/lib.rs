//! Pattern Switch Exhaustiveness Checking
//!
//! This crate decides whether the case labels of a `switch` cover every value
//! of the selector type and, when they do not, synthesizes the missing
//! branches. It works on an already-parsed model: patterns are reduced to
//! [`PatternDescription`] trees and labels to [`CaseLabel`]s.
//!
//! The engine is a rewriting system over *sets* of descriptions:
//! - record deconstructions that differ in one component are merged,
//! - deconstructions whose components are all unconditional become a plain
//!   type test,
//! - type tests covering every permitted subclass of a sealed class are
//!   replaced by a test of the sealed class itself.
//!
//! The set is rewritten until a test covering the selector appears or nothing
//! changes any more. See [`reduce`] for the rules and [`exhaustive`] for the
//! dispatch on the selector kind.
//!
//! ```
//! use covera_types::{ClassDecl, UniverseBuilder};
//! use covera_patterns::{
//!     check_exhaustiveness, CaseLabel, CoverageContext, ExhaustivenessCache,
//!     ExhaustivenessConfig, PatternDescription,
//! };
//!
//! let universe = UniverseBuilder::new()
//!     .declare(ClassDecl::interface("Shape").sealed())
//!     .declare(ClassDecl::record("Circle").implements(["Shape"]))
//!     .declare(ClassDecl::record("Square").implements(["Shape"]))
//!     .build()
//!     .unwrap();
//! let config = ExhaustivenessConfig::default();
//! let cache = ExhaustivenessCache::new();
//! let ctx = CoverageContext::new(&universe, &config, &cache);
//!
//! let shape = universe.class_type("Shape").unwrap();
//! let circle = PatternDescription::type_test(&universe, universe.class_type("Circle").unwrap());
//! let verdict = check_exhaustiveness(&ctx, &shape, &[CaseLabel::pattern(circle)]);
//!
//! assert_eq!(verdict.missing()[0].to_pattern_string(&universe), "Square");
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod coverage;
pub mod dominance;
pub mod error;
pub mod exhaustive;
pub mod missing;
pub mod reduce;
pub mod sealed;
pub mod selector;
mod usefulness;
pub mod witness;

pub use cache::{CancellationToken, ExhaustivenessCache};
pub use config::ExhaustivenessConfig;
pub use context::CoverageContext;
pub use coverage::{covers, dominates, dominates_constant, is_unconditional};
pub use dominance::{check_dominance, LabelStatus};
pub use error::{CoverageError, CoverageResult, DescriptionError};
pub use exhaustive::{check_exhaustiveness, Verdict};
pub use missing::RecordVerdict;
pub use reduce::{reduce, reduce_in_loop, LoopReduceResult, ReduceResult};
pub use selector::SelectorKind;
pub use witness::{missing_branches_by_type, MissingBranch};

use covera_types::{ClassId, PrimitiveKind, Type, TypeUniverse};
use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHasher;
use smol_str::SmolStr;
use std::cmp::Ordering;
use std::hash::{BuildHasherDefault, Hash, Hasher};
use std::sync::Arc;

pub type FxIndexSet<T> = IndexSet<T, BuildHasherDefault<FxHasher>>;
pub type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// A type together with its pre-resolved class.
///
/// Two nominal types naming the same class without type parameters are equal
/// regardless of type arguments; everything else compares structurally. This
/// keeps memoization keys stable across raw and parameterized spellings of
/// the same class.
#[derive(Debug, Clone)]
pub struct NominalType {
    ty: Type,
    class: Option<ClassId>,
    erased: bool,
}

impl NominalType {
    pub fn new(universe: &TypeUniverse, ty: Type) -> Self {
        let class = universe.resolve_class(&ty);
        let erased = class.is_some_and(|class| !universe.has_type_parameters(class));
        Self { ty, class, erased }
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn class(&self) -> Option<ClassId> {
        self.class
    }
}

impl PartialEq for NominalType {
    fn eq(&self, other: &Self) -> bool {
        if self.erased && other.erased {
            return self.class == other.class;
        }
        self.ty == other.ty
    }
}

impl Eq for NominalType {}

impl PartialOrd for NominalType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NominalType {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.erased, other.erased) {
            (true, true) => self.class.cmp(&other.class),
            (false, false) => self.ty.cmp(&other.ty),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
        }
    }
}

impl Hash for NominalType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if self.erased {
            0u8.hash(state);
            self.class.hash(state);
        } else {
            1u8.hash(state);
            self.ty.hash(state);
        }
    }
}

/// What a pattern requires of a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PatternDescription {
    /// The value is an instance of the type
    TypeTest(NominalType),
    /// The value is an instance of a record type whose components match
    Deconstruction(Deconstruction),
}

/// A record deconstruction `R(p1, ..., pn)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Deconstruction {
    ty: NominalType,
    components: Arc<[PatternDescription]>,
}

impl Deconstruction {
    pub fn ty(&self) -> &NominalType {
        &self.ty
    }

    pub fn components(&self) -> &[PatternDescription] {
        &self.components
    }

    pub fn arity(&self) -> usize {
        self.components.len()
    }

    /// Copy of this deconstruction with component `index` replaced.
    pub fn create_for(&self, index: usize, pattern: PatternDescription) -> Deconstruction {
        let mut components = self.components.to_vec();
        components[index] = pattern;
        Deconstruction {
            ty: self.ty.clone(),
            components: components.into(),
        }
    }

    /// All components except the one at `index`.
    pub fn without_component(&self, index: usize) -> Vec<PatternDescription> {
        self.components
            .iter()
            .enumerate()
            .filter(|(position, _)| *position != index)
            .map(|(_, component)| component.clone())
            .collect()
    }

    /// Whether every component is a plain type test.
    pub fn is_flat(&self) -> bool {
        self.components
            .iter()
            .all(|component| matches!(component, PatternDescription::TypeTest(_)))
    }
}

impl PatternDescription {
    pub fn type_test(universe: &TypeUniverse, ty: Type) -> Self {
        PatternDescription::TypeTest(NominalType::new(universe, ty))
    }

    /// Build `ty(components...)`, checking that `ty` is a record with as many
    /// components as given.
    pub fn deconstruction(
        universe: &TypeUniverse,
        ty: Type,
        components: Vec<PatternDescription>,
    ) -> Result<Self, DescriptionError> {
        let Some(expected) = universe.record_component_types(&ty) else {
            return Err(DescriptionError::NotARecord(
                universe.display(&ty).to_string().into(),
            ));
        };
        if expected.len() != components.len() {
            return Err(DescriptionError::ArityMismatch {
                record: universe.display(&ty).to_string().into(),
                expected: expected.len(),
                found: components.len(),
            });
        }
        Ok(PatternDescription::Deconstruction(Deconstruction {
            ty: NominalType::new(universe, ty),
            components: components.into(),
        }))
    }

    pub fn nominal(&self) -> &NominalType {
        match self {
            PatternDescription::TypeTest(ty) => ty,
            PatternDescription::Deconstruction(deconstruction) => &deconstruction.ty,
        }
    }

    pub fn ty(&self) -> &Type {
        self.nominal().ty()
    }

    pub fn is_type_test(&self) -> bool {
        matches!(self, PatternDescription::TypeTest(_))
    }

    pub fn as_deconstruction(&self) -> Option<&Deconstruction> {
        match self {
            PatternDescription::Deconstruction(deconstruction) => Some(deconstruction),
            PatternDescription::TypeTest(_) => None,
        }
    }

    /// Declaration indices of the classes mentioned, in pre-order.
    pub fn sort_key(&self) -> Vec<usize> {
        let mut key = Vec::new();
        self.collect_sort_key(&mut key);
        key
    }

    fn collect_sort_key(&self, key: &mut Vec<usize>) {
        key.push(self.nominal().class().map_or(usize::MAX, ClassId::index));
        if let PatternDescription::Deconstruction(deconstruction) = self {
            for component in deconstruction.components() {
                component.collect_sort_key(key);
            }
        }
    }
}

impl From<Deconstruction> for PatternDescription {
    fn from(deconstruction: Deconstruction) -> Self {
        PatternDescription::Deconstruction(deconstruction)
    }
}

/// An unordered set of pattern descriptions.
///
/// Iteration follows insertion order so results are deterministic, but
/// equality and hashing ignore it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternSet(FxIndexSet<PatternDescription>);

impl PatternSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, pattern: &PatternDescription) -> bool {
        self.0.contains(pattern)
    }

    pub fn insert(&mut self, pattern: PatternDescription) -> bool {
        self.0.insert(pattern)
    }

    pub fn remove(&mut self, pattern: &PatternDescription) -> bool {
        self.0.shift_remove(pattern)
    }

    pub fn retain(&mut self, keep: impl FnMut(&PatternDescription) -> bool) {
        self.0.retain(keep)
    }

    pub fn iter(&self) -> indexmap::set::Iter<'_, PatternDescription> {
        self.0.iter()
    }

    pub fn type_tests(&self) -> impl Iterator<Item = &NominalType> {
        self.0.iter().filter_map(|pattern| match pattern {
            PatternDescription::TypeTest(ty) => Some(ty),
            PatternDescription::Deconstruction(_) => None,
        })
    }

    pub fn deconstructions(&self) -> impl Iterator<Item = &Deconstruction> {
        self.0
            .iter()
            .filter_map(PatternDescription::as_deconstruction)
    }

    pub fn has_type_tests(&self) -> bool {
        self.type_tests().next().is_some()
    }

    /// The same set in canonical iteration order.
    ///
    /// Rewrites that consume patterns while iterating depend on the order, so
    /// every memoized computation runs on the canonical order of its key.
    pub fn sorted(&self) -> PatternSet {
        let mut sorted = self.0.clone();
        sorted.sort();
        PatternSet(sorted)
    }
}

impl Hash for PatternSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Order-independent: combine per-element hashes commutatively.
        let mut sum = 0u64;
        for pattern in &self.0 {
            let mut hasher = FxHasher::default();
            pattern.hash(&mut hasher);
            sum = sum.wrapping_add(hasher.finish());
        }
        state.write_usize(self.0.len());
        state.write_u64(sum);
    }
}

impl FromIterator<PatternDescription> for PatternSet {
    fn from_iter<I: IntoIterator<Item = PatternDescription>>(iter: I) -> Self {
        PatternSet(iter.into_iter().collect())
    }
}

impl Extend<PatternDescription> for PatternSet {
    fn extend<I: IntoIterator<Item = PatternDescription>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

impl IntoIterator for PatternSet {
    type Item = PatternDescription;
    type IntoIter = indexmap::set::IntoIter<PatternDescription>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a PatternSet {
    type Item = &'a PatternDescription;
    type IntoIter = indexmap::set::Iter<'a, PatternDescription>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A constant case label value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Bool(bool),
    Int(i32),
    Char(char),
    Long(i64),
    Float(f32),
    Double(f64),
    String(SmolStr),
}

impl ConstantValue {
    /// Exact type of the constant.
    pub fn ty(&self, universe: &TypeUniverse) -> Type {
        let primitive = match self {
            ConstantValue::Bool(_) => PrimitiveKind::Boolean,
            ConstantValue::Int(_) => PrimitiveKind::Int,
            ConstantValue::Char(_) => PrimitiveKind::Char,
            ConstantValue::Long(_) => PrimitiveKind::Long,
            ConstantValue::Float(_) => PrimitiveKind::Float,
            ConstantValue::Double(_) => PrimitiveKind::Double,
            ConstantValue::String(_) => return Type::class(universe.string()),
        };
        Type::Primitive(primitive)
    }
}

/// One label of a switch, pre-classified by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseLabel {
    /// `default`
    Default,
    /// `case null, default`
    NullDefault,
    /// `case null`
    Null,
    Constant(ConstantValue),
    EnumConstant { class: ClassId, name: SmolStr },
    Pattern {
        description: PatternDescription,
        /// Has a `when` guard that is not a constant `true`
        guarded: bool,
    },
}

impl CaseLabel {
    pub fn pattern(description: PatternDescription) -> Self {
        CaseLabel::Pattern {
            description,
            guarded: false,
        }
    }

    pub fn guarded(description: PatternDescription) -> Self {
        CaseLabel::Pattern {
            description,
            guarded: true,
        }
    }

    pub fn enum_constant(class: ClassId, name: impl Into<SmolStr>) -> Self {
        CaseLabel::EnumConstant {
            class,
            name: name.into(),
        }
    }

    /// The description of an unguarded pattern label.
    pub fn unguarded_pattern(&self) -> Option<&PatternDescription> {
        match self {
            CaseLabel::Pattern {
                description,
                guarded: false,
            } => Some(description),
            _ => None,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, CaseLabel::Default | CaseLabel::NullDefault)
    }
}
