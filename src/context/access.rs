//! Access mode resolution.

use crate::driver::AccessMode;

/// Default access mode for a context's sessions.
///
/// `readonly` dominates: it forces read mode even when `write` is also set. `write` alone
/// forces write mode. With neither flag set the backend picks (`None`).
pub fn resolve_access_mode(write: bool, readonly: bool) -> Option<AccessMode> {
    if readonly {
        Some(AccessMode::Read)
    } else if write {
        Some(AccessMode::Write)
    } else {
        None
    }
}
