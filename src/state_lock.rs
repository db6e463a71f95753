//! Lock-scope interpretation for stateful outputs.
//!
//! Nothing here takes a lock. The derivation only declares what an external
//! lock manager must hold before mutating an output's state; this module
//! turns that declaration into a concrete set of paths.

use crate::derivation::{Derivation, Synchronization};

/// The paths an external lock manager must hold exclusively before mutating
/// the state of one output.
///
/// Caller contract: acquire in the order given (root first, then substate
/// dirs ascending by path) and release in the reverse order. Acquiring in
/// any other order against another holder of the same scope can deadlock.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum LockScope<'a> {
    /// No locking required.
    None,
    /// Exclusive lock on the output's state directory only.
    OwnStateDir(&'a str),
    /// Exclusive locks on the state directory and every declared substate
    /// directory under it, ascending by path.
    AllSubstateDirs { root: &'a str, dirs: Vec<String> },
}

fn join_under(root: &str, sub: &str) -> String {
    let sub = sub.trim_start_matches('/');
    if root.ends_with('/') {
        format!("{}{}", root, sub)
    } else {
        format!("{}/{}", root, sub)
    }
}

impl Derivation {
    /// The lock scope of one stateful output, or `None` when the derivation
    /// has no such output. Disabled outputs still report their declared
    /// scope; whether state handling is active is the caller's concern, as
    /// is the `shared` policy, which never influences locking.
    pub fn lock_scope(&self, output_id: &str) -> Option<LockScope<'_>> {
        let state_output = self.state_outputs().get(output_id)?;
        let scope = match state_output.synchronization() {
            Synchronization::None => LockScope::None,
            Synchronization::ExclusiveOwnStateDir => {
                LockScope::OwnStateDir(state_output.state_path())
            }
            Synchronization::ExclusiveAllSubstateDirs => {
                let root = state_output.state_path();
                // BTreeSet iteration is already ascending by path
                let dirs = self
                    .state_output_dirs()
                    .iter()
                    .map(|dir| join_under(root, dir.path()))
                    .collect();
                LockScope::AllSubstateDirs { root, dirs }
            }
        };
        Some(scope)
    }
}
