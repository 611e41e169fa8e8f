//! Usefulness of a wildcard against a pattern matrix.
//!
//! Rows are case patterns split into columns, and each column carries the
//! static type of the values it inspects. [`uncovered`] looks for value
//! shapes no row matches:
//!
//! - a record column some row deconstructs is specialized by its single
//!   constructor, the components becoming new columns,
//! - an abstract sealed column is split by its permitted subclasses,
//! - any other column is open, and only rows whose head covers the whole
//!   column type survive into the default matrix.
//!
//! The search only looks at which rows are present. Adding a row never
//! produces a new witness, whatever order the rows come in.

use crate::context::CoverageContext;
use crate::coverage::is_unconditional;
use crate::error::{CoverageError, CoverageResult};
use crate::sealed::permitted_subclasses;
use crate::PatternDescription;
use covera_types::{ClassId, Type};
use std::slice;
use tracing::trace;

/// One description per column.
pub(crate) type Row = Vec<PatternDescription>;

/// Value shapes of `types` that no row of `rows` matches.
///
/// Every row must have one description per column. Together with `rows`,
/// the returned witnesses match every value. The search stops once `limit`
/// witnesses are found.
pub(crate) fn uncovered(
    ctx: &CoverageContext<'_>,
    rows: Vec<Row>,
    types: &[Type],
    limit: usize,
) -> CoverageResult<Vec<Row>> {
    let mut search = Search {
        ctx,
        steps: 0,
        limit: limit.max(1),
    };
    let patterns = rows.len();
    let witnesses = search.run(rows, types)?;
    trace!(
        patterns,
        columns = types.len(),
        steps = search.steps,
        witnesses = witnesses.len(),
        "Usefulness search"
    );
    Ok(witnesses)
}

/// Whether `patterns` together match every value of `selector`.
pub(crate) fn covers_selector<'p>(
    ctx: &CoverageContext<'_>,
    selector: &Type,
    patterns: impl IntoIterator<Item = &'p PatternDescription>,
) -> CoverageResult<bool> {
    let rows = patterns
        .into_iter()
        .map(|pattern| vec![pattern.clone()])
        .collect();
    Ok(uncovered(ctx, rows, slice::from_ref(selector), 1)?.is_empty())
}

struct Search<'c, 'a> {
    ctx: &'c CoverageContext<'a>,
    steps: usize,
    limit: usize,
}

impl Search<'_, '_> {
    fn run(&mut self, rows: Vec<Row>, types: &[Type]) -> CoverageResult<Vec<Row>> {
        self.tick(rows.len())?;
        let universe = self.ctx.universe;
        let Some((head_ty, rest)) = types.split_first() else {
            return Ok(if rows.is_empty() { vec![Vec::new()] } else { Vec::new() });
        };
        if rows.is_empty() {
            let wildcard = types
                .iter()
                .map(|ty| PatternDescription::type_test(universe, ty.clone()))
                .collect();
            return Ok(vec![wildcard]);
        }
        if rows.iter().any(|row| self.matches_everything(row, types)) {
            return Ok(Vec::new());
        }

        let all_cover = rows
            .iter()
            .all(|row| is_unconditional(self.ctx, &row[0], head_ty));
        if !all_cover {
            if let Some(fields) = self.deconstructed_fields(head_ty, &rows) {
                return self.split_record(rows, head_ty, fields, rest);
            }
            let sealed = universe
                .resolve_class(head_ty)
                .filter(|class| universe.is_abstract_sealed(*class));
            if let Some(class) = sealed {
                return self.split_sealed(rows, class, rest);
            }
        }
        self.default_matrix(rows, head_ty, rest)
    }

    fn tick(&mut self, patterns: usize) -> CoverageResult<()> {
        self.ctx.check_cancelled()?;
        self.steps += 1;
        let limit = self.ctx.config.max_usefulness_steps;
        if self.steps > limit {
            return Err(CoverageError::IterationLimit { limit, patterns });
        }
        Ok(())
    }

    fn matches_everything(&self, row: &Row, types: &[Type]) -> bool {
        row.iter()
            .zip(types)
            .all(|(pattern, ty)| is_unconditional(self.ctx, pattern, ty))
    }

    /// Component types of a record column that some row deconstructs.
    fn deconstructed_fields(&self, ty: &Type, rows: &[Row]) -> Option<Vec<Type>> {
        let universe = self.ctx.universe;
        let class = universe.resolve_class(ty)?;
        if !universe.class(class).is_record() {
            return None;
        }
        let deconstructed = rows.iter().any(|row| {
            row[0]
                .as_deconstruction()
                .is_some_and(|deconstruction| deconstruction.ty().class() == Some(class))
        });
        if !deconstructed {
            return None;
        }
        universe.record_component_types(ty)
    }

    fn split_record(
        &mut self,
        rows: Vec<Row>,
        ty: &Type,
        fields: Vec<Type>,
        rest: &[Type],
    ) -> CoverageResult<Vec<Row>> {
        let universe = self.ctx.universe;
        let class = universe.resolve_class(ty);
        let arity = fields.len();

        let mut specialized = Vec::with_capacity(rows.len());
        for row in rows {
            let mut row = row.into_iter();
            let Some(head) = row.next() else {
                continue;
            };
            let mut expanded: Row = match &head {
                PatternDescription::Deconstruction(deconstruction)
                    if deconstruction.ty().class() == class && deconstruction.arity() == arity =>
                {
                    deconstruction.components().to_vec()
                }
                _ if is_unconditional(self.ctx, &head, ty) => fields
                    .iter()
                    .map(|field| PatternDescription::type_test(universe, field.clone()))
                    .collect(),
                _ => continue,
            };
            expanded.extend(row);
            specialized.push(expanded);
        }

        let mut types = fields;
        types.extend_from_slice(rest);
        let witnesses = self.run(specialized, &types)?;
        Ok(witnesses
            .into_iter()
            .map(|mut witness| {
                let tail = witness.split_off(arity.min(witness.len()));
                let head = PatternDescription::deconstruction(universe, ty.clone(), witness)
                    .unwrap_or_else(|_| PatternDescription::type_test(universe, ty.clone()));
                let mut rebuilt = Vec::with_capacity(tail.len() + 1);
                rebuilt.push(head);
                rebuilt.extend(tail);
                rebuilt
            })
            .collect())
    }

    fn split_sealed(
        &mut self,
        rows: Vec<Row>,
        class: ClassId,
        rest: &[Type],
    ) -> CoverageResult<Vec<Row>> {
        let universe = self.ctx.universe;
        let mut witnesses = Vec::new();
        for permitted in permitted_subclasses(self.ctx, class).iter().copied() {
            let permitted_ty = Type::class(permitted);
            let narrowed: Vec<Row> = rows
                .iter()
                .filter(|row| universe.is_convertible(row[0].ty(), &permitted_ty))
                .cloned()
                .collect();
            let mut types = Vec::with_capacity(rest.len() + 1);
            types.push(permitted_ty);
            types.extend_from_slice(rest);
            witnesses.extend(self.run(narrowed, &types)?);
            if witnesses.len() >= self.limit {
                witnesses.truncate(self.limit);
                break;
            }
        }
        Ok(witnesses)
    }

    fn default_matrix(
        &mut self,
        rows: Vec<Row>,
        ty: &Type,
        rest: &[Type],
    ) -> CoverageResult<Vec<Row>> {
        let tails = rows
            .into_iter()
            .filter(|row| is_unconditional(self.ctx, &row[0], ty))
            .map(|mut row| {
                row.remove(0);
                row
            })
            .collect();
        let witnesses = self.run(tails, rest)?;
        let head = PatternDescription::type_test(self.ctx.universe, ty.clone());
        Ok(witnesses
            .into_iter()
            .map(|witness| {
                let mut full = Vec::with_capacity(witness.len() + 1);
                full.push(head.clone());
                full.extend(witness);
                full
            })
            .collect())
    }
}
