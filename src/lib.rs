//! Content-addressed derivations with stateful outputs.
//!
//! A [`derivation::Derivation`] describes one build step: its inputs, the
//! builder invocation, and the outputs it produces, including mutable state
//! directories and the locking policy an external lock manager should apply
//! to them. Derivations serialize to a canonical term form ([`term::Term`])
//! whose SHA-256 digest names the `.drv` file in the store, so equal
//! derivations always land on the same store path.

pub mod base32;
pub mod derivation;
pub mod hash;
pub mod state_lock;
pub mod store_path;
pub mod term;
