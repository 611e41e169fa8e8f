//! Covera Type Model
//!
//! Nominal type descriptors used by the exhaustiveness engine in
//! `covera-patterns`. The model is intentionally small:
//!
//! - **Classes** live in a [`TypeUniverse`] and are referenced by [`ClassId`].
//!   A class may be a plain class, an interface, a record (product type with
//!   ordered components) or an enum (closed set of named constants).
//! - **Types** are [`Type`] values: primitives, class types with optional type
//!   arguments, arrays, type variables and intersections.
//! - **Sealed hierarchies** are described by the `sealed` modifier plus an
//!   optional explicit `permits` list. Without a list, every non-local direct
//!   subclass declared in the same universe is permitted.
//!
//! Universes are immutable once built. Every build gets a fresh
//! [`TypeUniverse::id`], which downstream caches use to detect that the type
//! information they were filled from has been replaced.
//!
//! ```
//! use covera_types::{ClassDecl, UniverseBuilder};
//!
//! let universe = UniverseBuilder::new()
//!     .declare(ClassDecl::interface("Shape").sealed())
//!     .declare(ClassDecl::record("Circle").implements(["Shape"]))
//!     .declare(ClassDecl::record("Square").implements(["Shape"]))
//!     .build()
//!     .unwrap();
//!
//! let shape = universe.lookup("Shape").unwrap();
//! assert!(universe.is_abstract_sealed(shape));
//! ```

pub mod universe;

pub use universe::{
    ClassDecl, ClassDef, ClassKind, Modifier, TypeDisplay, TypeUniverse, UniverseBuilder,
    UniverseError,
};

use smol_str::SmolStr;
use std::fmt;

/// Index of a class inside its [`TypeUniverse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    pub(crate) fn new(index: usize) -> Self {
        ClassId(index as u32)
    }

    /// Position of the class in declaration order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Primitive (unboxed) scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 8] = [
        PrimitiveKind::Boolean,
        PrimitiveKind::Byte,
        PrimitiveKind::Short,
        PrimitiveKind::Char,
        PrimitiveKind::Int,
        PrimitiveKind::Long,
        PrimitiveKind::Float,
        PrimitiveKind::Double,
    ];

    /// Keyword spelling of the primitive.
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
        }
    }

    /// Name of the wrapper class registered for this primitive.
    pub fn boxed_name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "Boolean",
            PrimitiveKind::Byte => "Byte",
            PrimitiveKind::Short => "Short",
            PrimitiveKind::Char => "Character",
            PrimitiveKind::Int => "Integer",
            PrimitiveKind::Long => "Long",
            PrimitiveKind::Float => "Float",
            PrimitiveKind::Double => "Double",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        PrimitiveKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == name)
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A resolved type.
///
/// Equality and hashing are structural. Whether two class types with
/// different type arguments should be treated as the same nominal type is a
/// decision left to the consumer (see `NominalType` in `covera-patterns`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    /// Unboxed primitive scalar
    Primitive(PrimitiveKind),
    /// Class, interface, record or enum type, with type arguments if any
    Class { class: ClassId, args: Vec<Type> },
    /// Array of the element type
    Array(Box<Type>),
    /// Unresolved type parameter
    Variable(SmolStr),
    /// Intersection of several reference types (`A & B`)
    Intersection(Vec<Type>),
}

impl Type {
    /// Raw (argument-free) type of a class.
    pub fn class(class: ClassId) -> Self {
        Type::Class {
            class,
            args: Vec::new(),
        }
    }

    pub fn generic(class: ClassId, args: Vec<Type>) -> Self {
        Type::Class { class, args }
    }

    pub fn array(element: Type) -> Self {
        Type::Array(Box::new(element))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Primitive(_))
    }

    pub fn as_primitive(&self) -> Option<PrimitiveKind> {
        match self {
            Type::Primitive(kind) => Some(*kind),
            _ => None,
        }
    }

    /// The class this type names directly, ignoring type arguments.
    ///
    /// Primitives, arrays, variables and intersections have none.
    pub fn class_id(&self) -> Option<ClassId> {
        match self {
            Type::Class { class, .. } => Some(*class),
            _ => None,
        }
    }

    /// The conjuncts of an intersection, or the type itself.
    pub fn conjuncts(&self) -> Vec<&Type> {
        match self {
            Type::Intersection(parts) => parts.iter().collect(),
            other => vec![other],
        }
    }

    /// Whether a type variable occurs anywhere inside this type.
    pub fn mentions_type_variable(&self) -> bool {
        match self {
            Type::Primitive(_) => false,
            Type::Variable(_) => true,
            Type::Class { args, .. } => args.iter().any(Type::mentions_type_variable),
            Type::Array(element) => element.mentions_type_variable(),
            Type::Intersection(parts) => parts.iter().any(Type::mentions_type_variable),
        }
    }

    /// Replace type variables using `lookup`; unknown variables are kept.
    pub fn substitute(&self, lookup: &dyn Fn(&str) -> Option<Type>) -> Type {
        match self {
            Type::Primitive(_) => self.clone(),
            Type::Variable(name) => lookup(name).unwrap_or_else(|| self.clone()),
            Type::Class { class, args } => Type::Class {
                class: *class,
                args: args.iter().map(|arg| arg.substitute(lookup)).collect(),
            },
            Type::Array(element) => Type::Array(Box::new(element.substitute(lookup))),
            Type::Intersection(parts) => {
                Type::Intersection(parts.iter().map(|part| part.substitute(lookup)).collect())
            }
        }
    }
}

/// An unresolved type reference used while declaring classes.
///
/// Names are resolved when the universe is built: a name matching one of the
/// declaring class's type parameters becomes a [`Type::Variable`], a
/// primitive keyword becomes [`Type::Primitive`], anything else must name a
/// declared or built-in class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Named { name: SmolStr, args: Vec<TypeExpr> },
    Array(Box<TypeExpr>),
    Intersection(Vec<TypeExpr>),
}

impl TypeExpr {
    pub fn named(name: impl Into<SmolStr>) -> Self {
        TypeExpr::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn generic<I, T>(name: impl Into<SmolStr>, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TypeExpr>,
    {
        TypeExpr::Named {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn array(element: impl Into<TypeExpr>) -> Self {
        TypeExpr::Array(Box::new(element.into()))
    }
}

impl From<&str> for TypeExpr {
    /// `"Shape"`, `"int"` and `"Shape[]"` are accepted.
    fn from(text: &str) -> Self {
        match text.strip_suffix("[]") {
            Some(element) => TypeExpr::array(TypeExpr::from(element)),
            None => TypeExpr::named(text),
        }
    }
}

impl From<PrimitiveKind> for TypeExpr {
    fn from(kind: PrimitiveKind) -> Self {
        TypeExpr::named(kind.name())
    }
}
