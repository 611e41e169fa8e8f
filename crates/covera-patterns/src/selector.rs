//! Selector classification.
//!
//! The kind of a selector decides which completeness test applies.

use covera_types::{PrimitiveKind, Type, TypeUniverse};

/// Coarse classification of a switch selector type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorKind {
    /// `byte`, `short`, `char`, `int` and their boxes
    IntLike,
    Long,
    Float,
    Double,
    Boolean,
    Enum,
    String,
    /// Any other class, interface, record, array or type variable
    ClassOrArray,
    None,
}

impl SelectorKind {
    pub fn of(universe: &TypeUniverse, ty: &Type) -> Self {
        if let Some(kind) = ty.as_primitive().or_else(|| universe.unboxed(ty)) {
            return Self::of_primitive(kind);
        }
        match ty {
            Type::Class { class, .. } => {
                if *class == universe.string() {
                    SelectorKind::String
                } else if universe.class(*class).is_enum() {
                    SelectorKind::Enum
                } else {
                    SelectorKind::ClassOrArray
                }
            }
            Type::Array(_) | Type::Variable(_) => SelectorKind::ClassOrArray,
            Type::Intersection(parts) if parts.iter().all(|part| !part.is_primitive()) => {
                SelectorKind::ClassOrArray
            }
            _ => SelectorKind::None,
        }
    }

    fn of_primitive(kind: PrimitiveKind) -> Self {
        match kind {
            PrimitiveKind::Boolean => SelectorKind::Boolean,
            PrimitiveKind::Byte
            | PrimitiveKind::Short
            | PrimitiveKind::Char
            | PrimitiveKind::Int => SelectorKind::IntLike,
            PrimitiveKind::Long => SelectorKind::Long,
            PrimitiveKind::Float => SelectorKind::Float,
            PrimitiveKind::Double => SelectorKind::Double,
        }
    }

    /// Kinds whose value space is too large to enumerate with constants.
    pub fn needs_default(self) -> bool {
        matches!(
            self,
            SelectorKind::IntLike
                | SelectorKind::Long
                | SelectorKind::Float
                | SelectorKind::Double
                | SelectorKind::String
                | SelectorKind::None
        )
    }
}
