use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::base32;
use crate::hash::Sha256;

/// Extension of derivation files in the store.
pub const DRV_EXTENSION: &str = ".drv";

/// True iff `file_name` names a derivation file. Suffix match only; store
/// traversal uses this to tell derivations apart from other entries.
///
/// ```
/// # use statedrv::store_path::is_derivation;
/// assert!(is_derivation("foo.drv"));
/// assert!(!is_derivation("foo"));
/// ```
pub fn is_derivation(file_name: &str) -> bool {
    file_name.ends_with(DRV_EXTENSION)
}

const STORE_PATH_HASH_SIZE: usize = 20;
const STORE_PATH_HASH_ENCODED_SIZE: usize = base32::encode_len(STORE_PATH_HASH_SIZE);

pub(crate) const MAX_NAME_LEN: usize = 211;

const NAME_LOOKUP: [bool; 256] = {
    let mut ret = [false; 256];
    let mut idx = 0usize;
    while idx < u8::MAX as usize {
        let ch = idx as u8;
        ret[idx] = matches!(ch, b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'+' | b'-' | b'_' | b'?' | b'=' | b'.');
        idx += 1;
    }
    ret
};

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum StorePathError {
    #[error("non-absolute store path {0:?}")]
    NonAbsolute(PathBuf),
    #[error("path {0:?} is not in store")]
    NotInStore(PathBuf),
    #[error("invalid store path hash part")]
    HashPart,
    #[error("invalid store path name length")]
    NameLength,
    #[error("invalid symbol {1:?} at position {0} in store path name")]
    NameSymbol(usize, char),
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("cannot parse '{path}': {error}")]
pub struct ParseStorePathError {
    pub path: String,
    pub error: StorePathError,
}

impl ParseStorePathError {
    pub fn new(path: &str, error: StorePathError) -> ParseStorePathError {
        ParseStorePathError {
            path: path.to_owned(),
            error,
        }
    }
}

fn validate_name(s: &str) -> Result<(), StorePathError> {
    if s.is_empty() || s.len() > MAX_NAME_LEN {
        return Err(StorePathError::NameLength);
    }
    for (idx, ch) in s.bytes().enumerate() {
        if !NAME_LOOKUP[ch as usize] {
            return Err(StorePathError::NameSymbol(idx, ch as char));
        }
    }
    Ok(())
}

/// The folded digest part of a store path: a SHA-256 digest XOR-folded down
/// to 20 bytes and rendered in the path-naming base-32 alphabet.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorePathHash([u8; STORE_PATH_HASH_SIZE]);

impl StorePathHash {
    pub fn from_sha256(hash: &Sha256) -> StorePathHash {
        let mut folded = [0u8; STORE_PATH_HASH_SIZE];
        for (i, b) in hash.as_ref().iter().enumerate() {
            folded[i % STORE_PATH_HASH_SIZE] ^= b;
        }
        StorePathHash(folded)
    }
}

impl fmt::Display for StorePathHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&base32::encode(&self.0))
    }
}

impl fmt::Debug for StorePathHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorePathHash({})", self)
    }
}

impl AsRef<[u8]> for StorePathHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for StorePathHash {
    type Err = StorePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != STORE_PATH_HASH_ENCODED_SIZE {
            return Err(StorePathError::HashPart);
        }
        let bytes = base32::decode(s.as_bytes()).map_err(|_| StorePathError::HashPart)?;
        let mut out = [0u8; STORE_PATH_HASH_SIZE];
        out.copy_from_slice(&bytes);
        Ok(StorePathHash(out))
    }
}

/// A store path base name, `<base32 digest>-<name>`. Pairing it with a
/// [`StoreDir`] gives the full filesystem path.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorePath {
    hash: StorePathHash,
    name: String,
}

impl StorePath {
    /// Derives a store path from a content digest and a name.
    pub fn from_hash(hash: &Sha256, name: &str) -> Result<StorePath, StorePathError> {
        validate_name(name)?;
        Ok(StorePath {
            hash: StorePathHash::from_sha256(hash),
            name: name.to_owned(),
        })
    }

    pub fn hash(&self) -> &StorePathHash {
        &self.hash
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.hash, self.name)
    }
}

impl fmt::Debug for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StorePath")
            .field(&format_args!("{}", self))
            .finish()
    }
}

impl FromStr for StorePath {
    type Err = ParseStorePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let to_err = |error| ParseStorePathError::new(s, error);
        if s.len() < STORE_PATH_HASH_ENCODED_SIZE + 1 {
            return Err(to_err(StorePathError::HashPart));
        }
        let (hash_part, rest) = s.split_at(STORE_PATH_HASH_ENCODED_SIZE);
        let hash = hash_part.parse::<StorePathHash>().map_err(to_err)?;
        let name = rest
            .strip_prefix('-')
            .ok_or_else(|| to_err(StorePathError::HashPart))?;
        validate_name(name).map_err(to_err)?;
        Ok(StorePath {
            hash,
            name: name.to_owned(),
        })
    }
}

/// The store directory. [`StorePath`] values are only a digest and a name;
/// this turns them into full paths and back.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreDir(String);

impl StoreDir {
    /// Creates a store dir from an absolute path. Fails on relative or
    /// non-UTF-8 paths.
    pub fn new<P: Into<PathBuf>>(path: P) -> Result<StoreDir, ParseStorePathError> {
        let path = path.into();
        let s = path
            .to_str()
            .ok_or_else(|| {
                ParseStorePathError::new(
                    &path.to_string_lossy(),
                    StorePathError::NonAbsolute(path.clone()),
                )
            })?
            .to_owned();
        if !path.is_absolute() {
            return Err(ParseStorePathError::new(
                &s,
                StorePathError::NonAbsolute(path),
            ));
        }
        Ok(StoreDir(s.trim_end_matches('/').to_owned()))
    }

    pub fn to_str(&self) -> &str {
        &self.0
    }

    /// Full path string for `path` in this store.
    pub fn print_path(&self, path: &StorePath) -> String {
        format!("{}/{}", self.0, path)
    }

    /// Parses a full path in this store back to a [`StorePath`].
    pub fn parse_path(&self, s: &str) -> Result<StorePath, ParseStorePathError> {
        if !Path::new(s).is_absolute() {
            return Err(ParseStorePathError::new(
                s,
                StorePathError::NonAbsolute(s.into()),
            ));
        }
        let base = s
            .strip_prefix(&self.0)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| ParseStorePathError::new(s, StorePathError::NotInStore(s.into())))?;
        base.parse()
            .map_err(|e: ParseStorePathError| ParseStorePathError::new(s, e.error))
    }

    /// Builds a store path of the given type from a content digest:
    /// the digest of `"{path_type}:{hex digest}:{store_dir}:{name}"`.
    pub fn make_store_path(
        &self,
        path_type: &str,
        hash: &Sha256,
        name: &str,
    ) -> Result<StorePath, StorePathError> {
        let fingerprint = format!("{}:{:x}:{}:{}", path_type, hash, self.0, name);
        StorePath::from_hash(&Sha256::digest(fingerprint), name)
    }
}

impl Default for StoreDir {
    fn default() -> Self {
        StoreDir("/nix/store".to_owned())
    }
}

impl fmt::Display for StoreDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for StoreDir {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

#[cfg(test)]
pub(crate) mod proptest {
    use ::proptest::prelude::*;

    use super::*;

    pub fn arb_store_path_name() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9+\\-_?=][a-zA-Z0-9+\\-_?=.]{0,28}"
    }

    impl Arbitrary for StorePathHash {
        type Parameters = ();
        type Strategy = BoxedStrategy<StorePathHash>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            any::<[u8; STORE_PATH_HASH_SIZE]>()
                .prop_map(StorePathHash)
                .boxed()
        }
    }

    impl Arbitrary for StorePath {
        type Parameters = ();
        type Strategy = BoxedStrategy<StorePath>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            (any::<StorePathHash>(), arb_store_path_name())
                .prop_map(|(hash, name)| StorePath { hash, name })
                .boxed()
        }
    }
}
