//! Class table and type queries.
//!
//! A [`TypeUniverse`] plays the role of one compilation context: every class
//! the exhaustiveness engine may reason about is declared here, and the
//! implicit `permits` set of a sealed class is computed from the classes of
//! the same universe.

use crate::{ClassId, PrimitiveKind, Type, TypeExpr};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

static NEXT_UNIVERSE_ID: AtomicU64 = AtomicU64::new(1);

/// What sort of nominal type a class declaration introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    Class,
    Interface,
    /// Product type with fixed, ordered components
    Record,
    /// Closed set of named constants
    Enum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Abstract,
    Sealed,
    Final,
    /// Local or anonymous class; never part of an implicit permits set
    Local,
}

/// A class declaration before name resolution.
#[derive(Debug, Clone)]
pub struct ClassDecl {
    name: SmolStr,
    kind: ClassKind,
    modifiers: Vec<Modifier>,
    type_params: Vec<SmolStr>,
    supers: Vec<SmolStr>,
    permits: Option<Vec<SmolStr>>,
    components: Vec<TypeExpr>,
    constants: Vec<SmolStr>,
}

impl ClassDecl {
    fn new(name: impl Into<SmolStr>, kind: ClassKind) -> Self {
        Self {
            name: name.into(),
            kind,
            modifiers: Vec::new(),
            type_params: Vec::new(),
            supers: Vec::new(),
            permits: None,
            components: Vec::new(),
            constants: Vec::new(),
        }
    }

    pub fn class(name: impl Into<SmolStr>) -> Self {
        Self::new(name, ClassKind::Class)
    }

    pub fn interface(name: impl Into<SmolStr>) -> Self {
        Self::new(name, ClassKind::Interface)
    }

    pub fn record(name: impl Into<SmolStr>) -> Self {
        Self::new(name, ClassKind::Record)
    }

    pub fn enumeration(name: impl Into<SmolStr>) -> Self {
        Self::new(name, ClassKind::Enum)
    }

    pub fn modifier(mut self, modifier: Modifier) -> Self {
        if !self.modifiers.contains(&modifier) {
            self.modifiers.push(modifier);
        }
        self
    }

    pub fn sealed(self) -> Self {
        self.modifier(Modifier::Sealed)
    }

    pub fn local(self) -> Self {
        self.modifier(Modifier::Local)
    }

    pub fn type_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        self.type_params.extend(params.into_iter().map(Into::into));
        self
    }

    pub fn extends(mut self, name: impl Into<SmolStr>) -> Self {
        self.supers.push(name.into());
        self
    }

    pub fn implements<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        self.supers.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn permits<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        self.permits = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn component(mut self, ty: impl Into<TypeExpr>) -> Self {
        self.components.push(ty.into());
        self
    }

    pub fn components<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TypeExpr>,
    {
        self.components.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn constants<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        self.constants.extend(names.into_iter().map(Into::into));
        self
    }

    fn has(&self, modifier: Modifier) -> bool {
        self.modifiers.contains(&modifier)
    }
}

/// A resolved class.
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: SmolStr,
    pub kind: ClassKind,
    pub is_abstract: bool,
    pub is_sealed: bool,
    pub is_final: bool,
    pub is_local: bool,
    pub type_params: Vec<SmolStr>,
    /// Direct supertypes in declaration order (`Object` is implicit)
    pub supers: Vec<ClassId>,
    /// Explicit permits list, if the declaration had one
    pub permits: Option<Vec<ClassId>>,
    /// Record components, possibly mentioning `type_params`
    pub components: Vec<Type>,
    pub enum_constants: Vec<SmolStr>,
    /// Primitive this class is the wrapper of
    pub boxes: Option<PrimitiveKind>,
}

impl ClassDef {
    pub fn is_interface(&self) -> bool {
        self.kind == ClassKind::Interface
    }

    pub fn is_record(&self) -> bool {
        self.kind == ClassKind::Record
    }

    pub fn is_enum(&self) -> bool {
        self.kind == ClassKind::Enum
    }
}

/// Errors detected while building a universe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UniverseError {
    #[error("Class `{0}` is declared more than once")]
    DuplicateClass(SmolStr),

    #[error("Unknown type `{name}` referenced from `{context}`")]
    UnknownType { name: SmolStr, context: SmolStr },

    #[error("`{0}` declares record components but is not a record")]
    ComponentsOnNonRecord(SmolStr),

    #[error("`{0}` declares enum constants but is not an enum")]
    ConstantsOnNonEnum(SmolStr),

    #[error("`{sealed}` permits `{permitted}`, which does not extend it")]
    InvalidPermits { sealed: SmolStr, permitted: SmolStr },

    #[error("`{0}` declares a permits list but is not sealed")]
    PermitsWithoutSealed(SmolStr),

    #[error("Inheritance cycle through `{0}`")]
    InheritanceCycle(SmolStr),
}

/// Collects class declarations and resolves them into a [`TypeUniverse`].
#[derive(Debug, Clone, Default)]
pub struct UniverseBuilder {
    decls: Vec<ClassDecl>,
}

impl UniverseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(mut self, decl: ClassDecl) -> Self {
        self.decls.push(decl);
        self
    }

    pub fn add(&mut self, decl: ClassDecl) -> &mut Self {
        self.decls.push(decl);
        self
    }

    pub fn build(self) -> Result<TypeUniverse, UniverseError> {
        let mut decls = builtin_decls();
        decls.extend(self.decls);

        let mut names: IndexMap<SmolStr, ClassId> = IndexMap::with_capacity(decls.len());
        for (index, decl) in decls.iter().enumerate() {
            if names.insert(decl.name.clone(), ClassId::new(index)).is_some() {
                return Err(UniverseError::DuplicateClass(decl.name.clone()));
            }
        }

        let mut classes = IndexMap::with_capacity(decls.len());
        for decl in &decls {
            let def = resolve_decl(decl, &names)?;
            classes.insert(decl.name.clone(), def);
        }

        let mut universe = TypeUniverse {
            id: NEXT_UNIVERSE_ID.fetch_add(1, Ordering::Relaxed),
            classes,
            subclasses: Vec::new(),
            ancestors: Vec::new(),
            object: lookup_builtin(&names, "Object"),
            string: lookup_builtin(&names, "String"),
            boxes: PrimitiveKind::ALL.map(|kind| lookup_builtin(&names, kind.boxed_name())),
        };
        universe.link()?;
        Ok(universe)
    }
}

fn builtin_decls() -> Vec<ClassDecl> {
    let mut decls = vec![
        ClassDecl::class("Object"),
        ClassDecl::class("String").modifier(Modifier::Final),
        ClassDecl::class("Number").modifier(Modifier::Abstract),
    ];
    for kind in PrimitiveKind::ALL {
        let decl = ClassDecl::class(kind.boxed_name()).modifier(Modifier::Final);
        let decl = match kind {
            PrimitiveKind::Boolean | PrimitiveKind::Char => decl,
            _ => decl.extends("Number"),
        };
        decls.push(decl);
    }
    decls
}

fn lookup_builtin(names: &IndexMap<SmolStr, ClassId>, name: &str) -> ClassId {
    // Builtins are always declared first, in `builtin_decls` order.
    names
        .get(name)
        .copied()
        .unwrap_or_else(|| ClassId::new(0))
}

fn resolve_decl(
    decl: &ClassDecl,
    names: &IndexMap<SmolStr, ClassId>,
) -> Result<ClassDef, UniverseError> {
    let lookup = |name: &SmolStr| {
        names
            .get(name)
            .copied()
            .ok_or_else(|| UniverseError::UnknownType {
                name: name.clone(),
                context: decl.name.clone(),
            })
    };

    if !decl.components.is_empty() && decl.kind != ClassKind::Record {
        return Err(UniverseError::ComponentsOnNonRecord(decl.name.clone()));
    }
    if !decl.constants.is_empty() && decl.kind != ClassKind::Enum {
        return Err(UniverseError::ConstantsOnNonEnum(decl.name.clone()));
    }
    if decl.permits.is_some() && !decl.has(Modifier::Sealed) {
        return Err(UniverseError::PermitsWithoutSealed(decl.name.clone()));
    }

    let supers = decl.supers.iter().map(lookup).collect::<Result<Vec<_>, _>>()?;
    let permits = match &decl.permits {
        Some(list) => Some(list.iter().map(lookup).collect::<Result<Vec<_>, _>>()?),
        None => None,
    };
    let components = decl
        .components
        .iter()
        .map(|expr| resolve_expr(expr, &decl.type_params, names, &decl.name))
        .collect::<Result<Vec<_>, _>>()?;

    let implicitly_final = matches!(decl.kind, ClassKind::Record | ClassKind::Enum);
    Ok(ClassDef {
        name: decl.name.clone(),
        kind: decl.kind,
        is_abstract: decl.kind == ClassKind::Interface || decl.has(Modifier::Abstract),
        is_sealed: decl.has(Modifier::Sealed),
        is_final: implicitly_final || decl.has(Modifier::Final),
        is_local: decl.has(Modifier::Local),
        type_params: decl.type_params.clone(),
        supers,
        permits,
        components,
        enum_constants: decl.constants.clone(),
        boxes: PrimitiveKind::ALL
            .into_iter()
            .find(|kind| kind.boxed_name() == decl.name),
    })
}

fn resolve_expr(
    expr: &TypeExpr,
    type_params: &[SmolStr],
    names: &IndexMap<SmolStr, ClassId>,
    context: &SmolStr,
) -> Result<Type, UniverseError> {
    match expr {
        TypeExpr::Named { name, args } if args.is_empty() && type_params.contains(name) => {
            Ok(Type::Variable(name.clone()))
        }
        TypeExpr::Named { name, args } => {
            if args.is_empty() {
                if let Some(kind) = PrimitiveKind::from_name(name) {
                    return Ok(Type::Primitive(kind));
                }
            }
            let class = names
                .get(name)
                .copied()
                .ok_or_else(|| UniverseError::UnknownType {
                    name: name.clone(),
                    context: context.clone(),
                })?;
            let args = args
                .iter()
                .map(|arg| resolve_expr(arg, type_params, names, context))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Type::Class { class, args })
        }
        TypeExpr::Array(element) => Ok(Type::array(resolve_expr(
            element,
            type_params,
            names,
            context,
        )?)),
        TypeExpr::Intersection(parts) => Ok(Type::Intersection(
            parts
                .iter()
                .map(|part| resolve_expr(part, type_params, names, context))
                .collect::<Result<Vec<_>, _>>()?,
        )),
    }
}

/// An immutable table of classes plus the subtype queries the exhaustiveness
/// engine relies on.
#[derive(Debug)]
pub struct TypeUniverse {
    id: u64,
    classes: IndexMap<SmolStr, ClassDef>,
    /// Direct subclasses of each class, in declaration order
    subclasses: Vec<Vec<ClassId>>,
    /// Reflexive transitive supertypes of each class
    ancestors: Vec<FxHashSet<ClassId>>,
    object: ClassId,
    string: ClassId,
    boxes: [ClassId; 8],
}

impl TypeUniverse {
    fn link(&mut self) -> Result<(), UniverseError> {
        let count = self.classes.len();
        let mut subclasses = vec![Vec::new(); count];
        for (index, def) in self.classes.values().enumerate() {
            for sup in &def.supers {
                subclasses[sup.index()].push(ClassId::new(index));
            }
        }

        let mut ancestors = Vec::with_capacity(count);
        for index in 0..count {
            ancestors.push(self.collect_ancestors(ClassId::new(index))?);
        }

        for (index, def) in self.classes.values().enumerate() {
            let Some(permits) = &def.permits else { continue };
            for permitted in permits {
                if !ancestors[permitted.index()].contains(&ClassId::new(index)) {
                    return Err(UniverseError::InvalidPermits {
                        sealed: def.name.clone(),
                        permitted: self.class(*permitted).name.clone(),
                    });
                }
            }
        }

        self.subclasses = subclasses;
        self.ancestors = ancestors;
        Ok(())
    }

    fn collect_ancestors(&self, start: ClassId) -> Result<FxHashSet<ClassId>, UniverseError> {
        let mut seen = FxHashSet::default();
        let mut stack = vec![(start, 0usize)];
        seen.insert(start);
        while let Some((class, depth)) = stack.pop() {
            if depth > self.classes.len() {
                return Err(UniverseError::InheritanceCycle(self.class(start).name.clone()));
            }
            for sup in &self.class(class).supers {
                if *sup == start {
                    return Err(UniverseError::InheritanceCycle(self.class(start).name.clone()));
                }
                if seen.insert(*sup) {
                    stack.push((*sup, depth + 1));
                }
            }
        }
        Ok(seen)
    }

    /// Process-unique identity of this universe, fresh for every build.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn class(&self, id: ClassId) -> &ClassDef {
        &self.classes[id.index()]
    }

    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &ClassDef)> {
        self.classes
            .values()
            .enumerate()
            .map(|(index, def)| (ClassId::new(index), def))
    }

    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.classes.get_index_of(name).map(ClassId::new)
    }

    /// Raw type of the class called `name`.
    pub fn class_type(&self, name: &str) -> Option<Type> {
        self.lookup(name).map(Type::class)
    }

    /// Resolve a type expression with no type parameters in scope.
    pub fn resolve(&self, expr: impl Into<TypeExpr>) -> Result<Type, UniverseError> {
        let names: IndexMap<SmolStr, ClassId> = self
            .classes
            .keys()
            .enumerate()
            .map(|(index, name)| (name.clone(), ClassId::new(index)))
            .collect();
        resolve_expr(&expr.into(), &[], &names, &SmolStr::new_inline("<query>"))
    }

    pub fn object(&self) -> ClassId {
        self.object
    }

    pub fn object_type(&self) -> Type {
        Type::class(self.object)
    }

    pub fn string(&self) -> ClassId {
        self.string
    }

    pub fn boxed_class(&self, kind: PrimitiveKind) -> ClassId {
        let slot = PrimitiveKind::ALL
            .iter()
            .position(|candidate| *candidate == kind)
            .unwrap_or(0);
        self.boxes[slot]
    }

    pub fn boxed_type(&self, kind: PrimitiveKind) -> Type {
        Type::class(self.boxed_class(kind))
    }

    /// The primitive a wrapper class type unboxes to.
    pub fn unboxed(&self, ty: &Type) -> Option<PrimitiveKind> {
        ty.class_id().and_then(|class| self.class(class).boxes)
    }

    /// The class of a class type; `None` for primitives, arrays, variables
    /// and intersections.
    pub fn resolve_class(&self, ty: &Type) -> Option<ClassId> {
        ty.class_id()
    }

    pub fn has_type_parameters(&self, class: ClassId) -> bool {
        !self.class(class).type_params.is_empty()
    }

    /// Abstract (interfaces included) and sealed.
    pub fn is_abstract_sealed(&self, class: ClassId) -> bool {
        let def = self.class(class);
        def.is_sealed && def.is_abstract
    }

    pub fn is_final(&self, class: ClassId) -> bool {
        self.class(class).is_final
    }

    pub fn supers(&self, class: ClassId) -> &[ClassId] {
        &self.class(class).supers
    }

    pub fn direct_subclasses(&self, class: ClassId) -> &[ClassId] {
        &self.subclasses[class.index()]
    }

    /// Reflexive, transitive subclass test. Every class extends `Object`.
    pub fn is_subclass(&self, sub: ClassId, sup: ClassId) -> bool {
        sup == self.object || self.ancestors[sub.index()].contains(&sup)
    }

    /// Strict variant of [`is_subclass`](Self::is_subclass).
    pub fn is_inheritor(&self, sub: ClassId, sup: ClassId) -> bool {
        sub != sup && self.is_subclass(sub, sup)
    }

    pub fn enum_constants(&self, class: ClassId) -> &[SmolStr] {
        &self.class(class).enum_constants
    }

    /// Component types of a record type, with the record's type parameters
    /// replaced by `ty`'s arguments when the arity matches.
    pub fn record_component_types(&self, ty: &Type) -> Option<Vec<Type>> {
        let Type::Class { class, args } = ty else {
            return None;
        };
        let def = self.class(*class);
        if !def.is_record() {
            return None;
        }
        if args.is_empty() || args.len() != def.type_params.len() {
            return Some(def.components.clone());
        }
        let lookup = |name: &str| {
            def.type_params
                .iter()
                .position(|param| param == name)
                .map(|index| args[index].clone())
        };
        Some(
            def.components
                .iter()
                .map(|component| component.substitute(&lookup))
                .collect(),
        )
    }

    /// Whether a value of type `from` can be stored in `to` without boxing.
    ///
    /// Type arguments are only compared when both sides name the same class.
    pub fn is_assignable(&self, to: &Type, from: &Type) -> bool {
        if to == from {
            return true;
        }
        match (to, from) {
            (Type::Intersection(parts), _) => {
                parts.iter().all(|part| self.is_assignable(part, from))
            }
            (_, Type::Intersection(parts)) => parts.iter().any(|part| self.is_assignable(to, part)),
            (Type::Primitive(_), _) | (_, Type::Primitive(_)) => false,
            (Type::Class { class, .. }, _) if *class == self.object => true,
            (
                Type::Class {
                    class: to_class,
                    args: to_args,
                },
                Type::Class {
                    class: from_class,
                    args: from_args,
                },
            ) => {
                self.is_subclass(*from_class, *to_class)
                    && (to_class != from_class
                        || to_args.is_empty()
                        || from_args.is_empty()
                        || to_args == from_args)
            }
            (Type::Array(to_element), Type::Array(from_element)) => {
                match (to_element.as_ref(), from_element.as_ref()) {
                    (Type::Primitive(a), Type::Primitive(b)) => a == b,
                    (Type::Primitive(_), _) | (_, Type::Primitive(_)) => false,
                    (to_element, from_element) => self.is_assignable(to_element, from_element),
                }
            }
            _ => false,
        }
    }

    /// Cast convertibility: could a value of static type `a` be of type `b`?
    pub fn is_convertible(&self, a: &Type, b: &Type) -> bool {
        if a == b {
            return true;
        }
        match (a, b) {
            (Type::Intersection(parts), other) | (other, Type::Intersection(parts)) => {
                parts.iter().all(|part| self.is_convertible(part, other))
            }
            (Type::Variable(_), _) | (_, Type::Variable(_)) => true,
            (Type::Primitive(x), Type::Primitive(y)) => {
                (*x == PrimitiveKind::Boolean) == (*y == PrimitiveKind::Boolean)
            }
            (Type::Primitive(kind), reference) | (reference, Type::Primitive(kind)) => {
                self.unboxed(reference) == Some(*kind)
                    || self.is_assignable(reference, &self.boxed_type(*kind))
            }
            (Type::Class { class: x, .. }, Type::Class { class: y, .. }) => {
                if self.is_subclass(*x, *y) || self.is_subclass(*y, *x) {
                    return true;
                }
                let (dx, dy) = (self.class(*x), self.class(*y));
                (dx.is_interface() && !dy.is_final) || (dy.is_interface() && !dx.is_final)
            }
            (Type::Array(x), Type::Array(y)) => match (x.as_ref(), y.as_ref()) {
                (Type::Primitive(p), Type::Primitive(q)) => p == q,
                (Type::Primitive(_), _) | (_, Type::Primitive(_)) => false,
                (x, y) => self.is_convertible(x, y),
            },
            (Type::Class { class, .. }, Type::Array(_))
            | (Type::Array(_), Type::Class { class, .. }) => *class == self.object,
        }
    }

    /// Render a type using this universe's class names.
    pub fn display<'a>(&'a self, ty: &'a Type) -> TypeDisplay<'a> {
        TypeDisplay { universe: self, ty }
    }
}

/// [`fmt::Display`] adapter returned by [`TypeUniverse::display`].
pub struct TypeDisplay<'a> {
    universe: &'a TypeUniverse,
    ty: &'a Type,
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty {
            Type::Primitive(kind) => write!(f, "{}", kind),
            Type::Variable(name) => f.write_str(name),
            Type::Array(element) => write!(f, "{}[]", self.universe.display(element)),
            Type::Class { class, args } => {
                f.write_str(&self.universe.class(*class).name)?;
                if !args.is_empty() {
                    f.write_str("<")?;
                    for (index, arg) in args.iter().enumerate() {
                        if index > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{}", self.universe.display(arg))?;
                    }
                    f.write_str(">")?;
                }
                Ok(())
            }
            Type::Intersection(parts) => {
                for (index, part) in parts.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" & ")?;
                    }
                    write!(f, "{}", self.universe.display(part))?;
                }
                Ok(())
            }
        }
    }
}
