use std::io;
use std::{fs, fmt};

use thiserror::Error;
use tracing::debug;

use crate::hash::Sha256;
use crate::store_path::{
    StoreDir, StorePath, StorePathError, StorePathHash, DRV_EXTENSION,
};
use crate::term::Term;

use super::{
    output_path_name, parse_derivation, serialize_derivation, unparse_derivation, Derivation,
    ParseDerivationError,
};

/// SHA-256 over the canonical byte form of a term.
pub fn hash_term(term: &Term) -> Sha256 {
    Sha256::digest(term.to_bytes())
}

#[derive(Error, Debug)]
pub enum WriteDerivationError {
    #[error("invalid store path: {0}")]
    StorePath(
        #[from]
        #[source]
        StorePathError,
    ),
    #[error("failed to write '{path}': {error}")]
    Io {
        path: String,
        #[source]
        error: io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ReadDerivationError {
    #[error("{0}")]
    Parse(
        #[from]
        #[source]
        ParseDerivationError,
    ),
    #[error("failed to read '{path}': {error}")]
    Io {
        path: String,
        #[source]
        error: io::Error,
    },
    #[error("'{path}' hashes to {computed}, path claims {claimed}")]
    HashMismatch {
        path: String,
        claimed: StorePathHash,
        computed: StorePathHash,
    },
}

/// Fills in the store paths of unresolved floating outputs.
///
/// The derivation is first hashed with the unresolved paths left empty; each
/// floating output then gets a store path derived from that pre-digest, its
/// own id and the derivation name. Resolution is a fixpoint: a derivation
/// with no unresolved outputs comes back unchanged.
fn resolve_output_paths(
    store_dir: &StoreDir,
    drv: &Derivation,
    name: &str,
) -> Result<Derivation, StorePathError> {
    let unresolved: Vec<String> = drv
        .outputs()
        .iter()
        .filter(|(_, output)| output.path().is_none())
        .map(|(id, _)| id.clone())
        .collect();
    if unresolved.is_empty() {
        return Ok(drv.clone());
    }
    let pre_digest = hash_term(&unparse_derivation(drv));
    let mut resolved = drv.clone();
    for id in unresolved {
        let output_name = output_path_name(name, &id).to_string();
        let path = store_dir.make_store_path(
            &format!("output:{}", id),
            &pre_digest,
            &output_name,
        )?;
        resolved = resolved.with_output_path(&id, store_dir.print_path(&path));
    }
    Ok(resolved)
}

struct DrvName<'b>(&'b str);

impl fmt::Display for DrvName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.0, DRV_EXTENSION)
    }
}

/// Persists a derivation under `name` in the store.
///
/// Unresolved floating outputs are resolved first, so the bytes on disk
/// always carry final paths. The file name is a pure function of those
/// bytes; an existing file holding exactly those bytes is an earlier write
/// of the same derivation and is left alone, anything else at that name
/// (a truncated leftover, say) is replaced. Nothing is written if `name`
/// does not make a valid store path name.
///
/// Returns the derivation's store path together with the resolved value.
pub fn write_derivation(
    store_dir: &StoreDir,
    drv: &Derivation,
    name: &str,
) -> Result<(StorePath, Derivation), WriteDerivationError> {
    let resolved = resolve_output_paths(store_dir, drv, name)?;
    let bytes = serialize_derivation(&resolved);
    let drv_path = StorePath::from_hash(&Sha256::digest(&bytes), &DrvName(name).to_string())?;
    let full = store_dir.print_path(&drv_path);
    if let Ok(existing) = fs::read(&full) {
        if existing == bytes {
            debug!(path = %full, "derivation already present");
            return Ok((drv_path, resolved));
        }
    }
    // stage under a temporary name and rename into place; the digest-named
    // file never holds partial bytes
    let staging = format!("{}.tmp{}", full, std::process::id());
    fs::write(&staging, &bytes).map_err(|error| WriteDerivationError::Io {
        path: staging.clone(),
        error,
    })?;
    fs::rename(&staging, &full).map_err(|error| WriteDerivationError::Io {
        path: full.clone(),
        error,
    })?;
    debug!(path = %full, size = bytes.len(), "wrote derivation");
    Ok((drv_path, resolved))
}

/// Reads a derivation back from the store.
///
/// The bytes are re-hashed and checked against the hash component of the
/// requested path before any parse result is trusted; a mismatch fails
/// closed with [`ReadDerivationError::HashMismatch`].
pub fn read_derivation(
    store_dir: &StoreDir,
    path: &StorePath,
) -> Result<Derivation, ReadDerivationError> {
    let full = store_dir.print_path(path);
    let bytes = fs::read(&full).map_err(|error| ReadDerivationError::Io {
        path: full.clone(),
        error,
    })?;
    let computed = StorePathHash::from_sha256(&Sha256::digest(&bytes));
    if computed != *path.hash() {
        return Err(ReadDerivationError::HashMismatch {
            path: full,
            claimed: *path.hash(),
            computed,
        });
    }
    debug!(path = %full, "read derivation");
    Ok(parse_derivation(&bytes)?)
}
