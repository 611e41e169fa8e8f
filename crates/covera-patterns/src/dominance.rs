//! Label dominance.
//!
//! A label is dominated when some earlier label matches everything it
//! would, which makes it unreachable.

use crate::context::CoverageContext;
use crate::coverage::{dominates, dominates_constant, dominates_enum_constant};
use crate::CaseLabel;
use covera_types::Type;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelStatus {
    Live,
    /// Unreachable because of the label at index `by`
    Dominated { by: usize },
}

impl LabelStatus {
    pub fn is_dominated(self) -> bool {
        matches!(self, LabelStatus::Dominated { .. })
    }
}

/// Status of each label, in order. A dominated label reports the first
/// earlier label that dominates it.
#[instrument(level = "debug", skip_all, fields(labels = labels.len()))]
pub fn check_dominance(ctx: &CoverageContext<'_>, labels: &[CaseLabel]) -> Vec<LabelStatus> {
    labels
        .iter()
        .enumerate()
        .map(|(index, label)| {
            let dominator = labels[..index]
                .iter()
                .position(|earlier| label_dominates(ctx, earlier, label));
            match dominator {
                Some(by) => {
                    debug!(label = index, by, "Label is dominated");
                    LabelStatus::Dominated { by }
                }
                None => LabelStatus::Live,
            }
        })
        .collect()
}

fn label_dominates(ctx: &CoverageContext<'_>, earlier: &CaseLabel, later: &CaseLabel) -> bool {
    match (earlier, later) {
        (_, CaseLabel::Default | CaseLabel::NullDefault) => false,
        (CaseLabel::NullDefault, _) => true,
        (CaseLabel::Default, CaseLabel::Pattern { .. } | CaseLabel::Null) => true,
        (CaseLabel::Null, CaseLabel::Null) => true,
        (CaseLabel::Constant(a), CaseLabel::Constant(b)) => a == b,
        (
            CaseLabel::EnumConstant { class, name },
            CaseLabel::EnumConstant {
                class: later_class,
                name: later_name,
            },
        ) => class == later_class && name == later_name,
        (
            CaseLabel::Pattern {
                description,
                guarded: false,
            },
            CaseLabel::Pattern {
                description: later, ..
            },
        ) => dominates(ctx, description, later),
        // Guards do not protect against constant labels.
        (CaseLabel::Pattern { description, .. }, CaseLabel::Constant(constant)) => {
            dominates_constant(ctx, description, constant)
        }
        (CaseLabel::Pattern { description, .. }, CaseLabel::EnumConstant { class, .. }) => {
            dominates_enum_constant(ctx, description, &Type::class(*class))
        }
        _ => false,
    }
}
