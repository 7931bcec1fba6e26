//! sync::sanitize
//!
//! Index sanitizer selection rule.
//!
//! Before a merge may touch the working directory, every staged record
//! holding content not yet committed must be reset to mirror HEAD -
//! otherwise the merge's checkout would silently discard staged work. The
//! selection rule is pure over a [`StatusEntry`]; the engine applies the
//! resets behind the index locks.

use crate::git::{HeadState, StageState, StatusEntry, WorkdirState};

/// Whether a path's staged record must be reset before a merge.
///
/// Selects:
/// - staged content differing from HEAD in either modification form
///   (matching the on-disk edit, or matching neither snapshot), and
/// - the degenerate stale record: absent from HEAD and from disk while the
///   stage still claims the committed content.
pub(crate) fn needs_reset(entry: &StatusEntry) -> bool {
    if entry.stage.is_staged_modification() {
        return true;
    }
    entry.head == HeadState::Absent
        && entry.workdir == WorkdirState::Absent
        && entry.stage == StageState::Unchanged
}

/// The paths a status matrix selects for reset, in matrix (sorted) order.
pub(crate) fn select(matrix: &[StatusEntry]) -> Vec<String> {
    matrix
        .iter()
        .filter(|entry| needs_reset(entry))
        .map(|entry| entry.path.clone())
        .collect()
}
