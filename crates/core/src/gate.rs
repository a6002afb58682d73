//! The unlock gate: modules form a strictly linear prerequisite chain.

use std::collections::BTreeSet;

use crate::model::ModuleIndex;

/// Whether a module may currently be entered.
///
/// Module 0 is always accessible. Any later module is accessible iff its
/// immediate predecessor is complete. Only the predecessor is consulted:
/// a corrupted completed set with gaps or stray high indices cannot unlock
/// anything further than the chain allows.
#[must_use]
pub fn can_access(index: ModuleIndex, completed: &BTreeSet<ModuleIndex>) -> bool {
    match index.previous() {
        None => true,
        Some(prev) => completed.contains(&prev),
    }
}

/// The module that must be completed before `index` opens, if any.
#[must_use]
pub fn required_predecessor(index: ModuleIndex) -> Option<ModuleIndex> {
    index.previous()
}

// ─── Tests ─────────────────────────────────────────────────────────────────────
