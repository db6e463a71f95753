use std::fmt;

use crate::hash::{Algorithm, Hash};

use super::InvalidDerivation;

/// Raw output triple as the evaluator supplies it and as it appears on the
/// wire.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct OutputData {
    pub path: String,
    pub hash_algo: String,
    pub hash: String,
}

/// One declared output of a derivation.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub enum DerivationOutput {
    /// Fixed-output: the hash is pinned up front and the path is supplied by
    /// the evaluator, never recomputed. Used for non-deterministic builders
    /// such as network fetchers.
    Fixed { path: String, hash: Hash },
    /// Floating: the final path is a function of the derivation's own
    /// content hash. `path` is empty until [`write_derivation`] resolves it;
    /// a declared algorithm is carried through unchanged.
    ///
    /// [`write_derivation`]: crate::derivation::write_derivation
    Floating {
        path: String,
        algorithm: Option<Algorithm>,
    },
}

impl DerivationOutput {
    /// The output's path, if known. Empty (unresolved floating) paths read
    /// as `None`.
    pub fn path(&self) -> Option<&str> {
        match self {
            DerivationOutput::Fixed { path, .. } => Some(path),
            DerivationOutput::Floating { path, .. } if path.is_empty() => None,
            DerivationOutput::Floating { path, .. } => Some(path),
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, DerivationOutput::Fixed { .. })
    }

    /// The pinned hash of a fixed output.
    pub fn fixed_hash(&self) -> Option<&Hash> {
        match self {
            DerivationOutput::Fixed { hash, .. } => Some(hash),
            DerivationOutput::Floating { .. } => None,
        }
    }

    pub(crate) fn validate(id: &str, data: OutputData) -> Result<Self, InvalidDerivation> {
        if !data.hash.is_empty() {
            if data.hash_algo.is_empty() {
                return Err(InvalidDerivation::HashWithoutAlgorithm { id: id.to_owned() });
            }
            let algorithm = data
                .hash_algo
                .parse::<Algorithm>()
                .map_err(|e| InvalidDerivation::UnknownHashAlgorithm {
                    id: id.to_owned(),
                    algo: e.0,
                })?;
            let hash = Hash::parse_hex(&data.hash, algorithm).map_err(|error| {
                InvalidDerivation::InvalidOutputHash {
                    id: id.to_owned(),
                    error,
                }
            })?;
            if data.path.is_empty() {
                return Err(InvalidDerivation::MissingField("path"));
            }
            Ok(DerivationOutput::Fixed {
                path: data.path,
                hash,
            })
        } else {
            let algorithm = if data.hash_algo.is_empty() {
                None
            } else {
                Some(data.hash_algo.parse::<Algorithm>().map_err(|e| {
                    InvalidDerivation::UnknownHashAlgorithm {
                        id: id.to_owned(),
                        algo: e.0,
                    }
                })?)
            };
            Ok(DerivationOutput::Floating {
                path: data.path,
                algorithm,
            })
        }
    }

    pub(crate) fn to_data(&self) -> OutputData {
        match self {
            DerivationOutput::Fixed { path, hash } => OutputData {
                path: path.clone(),
                hash_algo: hash.algorithm().to_string(),
                hash: format!("{:x}", hash),
            },
            DerivationOutput::Floating { path, algorithm } => OutputData {
                path: path.clone(),
                hash_algo: algorithm.map(|a| a.to_string()).unwrap_or_default(),
                hash: String::new(),
            },
        }
    }
}

struct OutputPathName<'b> {
    drv_name: &'b str,
    output_id: &'b str,
}

impl fmt::Display for OutputPathName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.output_id != "out" {
            write!(f, "{}-{}", self.drv_name, self.output_id)
        } else {
            write!(f, "{}", self.drv_name)
        }
    }
}

/// The store name of an output: the derivation name, suffixed with the
/// output id unless that id is the default `out`.
pub(crate) fn output_path_name<'s>(drv_name: &'s str, output_id: &'s str) -> impl fmt::Display + 's {
    OutputPathName {
        drv_name,
        output_id,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    const SHA256_HEX: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn fixed_output_roundtrips_exactly() {
        let data = OutputData {
            path: "/store/abc-foo".into(),
            hash_algo: "sha256".into(),
            hash: SHA256_HEX.into(),
        };
        let out = DerivationOutput::validate("out", data.clone()).unwrap();
        assert!(out.is_fixed());
        assert_eq!(out.path(), Some("/store/abc-foo"));
        let hash = out.fixed_hash().unwrap();
        assert_eq!(hash.algorithm(), Algorithm::Sha256);
        assert_eq!(format!("{:x}", hash), SHA256_HEX);
        assert_eq!(out.to_data(), data);
    }

    #[test]
    fn floating_without_algorithm() {
        let out = DerivationOutput::validate("out", OutputData::default()).unwrap();
        assert_eq!(out.path(), None);
        assert!(!out.is_fixed());
        assert_eq!(out.fixed_hash(), None);
        assert_eq!(out.to_data(), OutputData::default());
    }

    #[test]
    fn floating_with_declared_algorithm() {
        let data = OutputData {
            path: String::new(),
            hash_algo: "sha256".into(),
            hash: String::new(),
        };
        let out = DerivationOutput::validate("out", data.clone()).unwrap();
        assert_eq!(
            out,
            DerivationOutput::Floating {
                path: String::new(),
                algorithm: Some(Algorithm::Sha256)
            }
        );
        assert_eq!(out.to_data(), data);
    }

    #[test]
    fn hash_without_algorithm_rejected() {
        let data = OutputData {
            path: "/store/abc-foo".into(),
            hash_algo: String::new(),
            hash: SHA256_HEX.into(),
        };
        assert_eq!(
            DerivationOutput::validate("out", data).unwrap_err(),
            InvalidDerivation::HashWithoutAlgorithm { id: "out".into() }
        );
    }

    #[test]
    fn fixed_without_path_rejected() {
        let data = OutputData {
            path: String::new(),
            hash_algo: "sha256".into(),
            hash: SHA256_HEX.into(),
        };
        assert_eq!(
            DerivationOutput::validate("out", data).unwrap_err(),
            InvalidDerivation::MissingField("path")
        );
    }

    #[rstest]
    #[case::fixed("sha999", SHA256_HEX)]
    #[case::floating("sha999", "")]
    fn unknown_algorithm_rejected(#[case] algo: &str, #[case] hash: &str) {
        let data = OutputData {
            path: "/store/abc-foo".into(),
            hash_algo: algo.into(),
            hash: hash.into(),
        };
        assert_eq!(
            DerivationOutput::validate("out", data).unwrap_err(),
            InvalidDerivation::UnknownHashAlgorithm {
                id: "out".into(),
                algo: algo.into()
            }
        );
    }

    #[rstest]
    #[case("pkg-1.0", "out", "pkg-1.0")]
    #[case("pkg-1.0", "dev", "pkg-1.0-dev")]
    #[case("pkg-1.0", "doc", "pkg-1.0-doc")]
    fn output_path_names(#[case] drv: &str, #[case] id: &str, #[case] expected: &str) {
        assert_eq!(output_path_name(drv, id).to_string(), expected);
    }
}
