use std::collections::{BTreeMap, BTreeSet};

use crate::model::ids::ModuleIndex;
use crate::model::module::CourseModules;
use crate::model::progress::ProgressRecord;

/// Derived, never persisted: which modules are complete and how far along
/// the course is as a whole.
///
/// Recomputed whenever the per-module record map changes; holding onto a
/// stale copy is the caller's bug, not a supported mode.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CourseProgressState {
    completed_modules: BTreeSet<ModuleIndex>,
    percent_of_course: u8,
}

impl CourseProgressState {
    /// Derive the state from the authoritative record map.
    ///
    /// Modules with no record count as 0% and incomplete.
    #[must_use]
    pub fn derive(
        modules: &CourseModules,
        records: &BTreeMap<ModuleIndex, ProgressRecord>,
    ) -> Self {
        let mut completed = BTreeSet::new();
        for (index, descriptor) in modules.iter() {
            if let Some(record) = records.get(&index) {
                if record.is_complete_for(descriptor.kind()) {
                    completed.insert(index);
                }
            }
        }
        let percent_of_course = course_percent(completed.len(), modules.len());
        Self {
            completed_modules: completed,
            percent_of_course,
        }
    }

    #[must_use]
    pub fn completed_modules(&self) -> &BTreeSet<ModuleIndex> {
        &self.completed_modules
    }

    #[must_use]
    pub fn percent_of_course(&self) -> u8 {
        self.percent_of_course
    }

    #[must_use]
    pub fn is_complete(&self, index: ModuleIndex) -> bool {
        self.completed_modules.contains(&index)
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn course_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (100.0 * completed as f64 / total as f64).round() as u8
}

// ─── Tests ─────────────────────────────────────────────────────────────────────
