use thiserror::Error;

use crate::term::{MalformedTerm, Term};

use super::{
    Derivation, DerivationData, InvalidDerivation, OutputData, StateOutputData, StateOutputDirData,
};

const CONSTRUCTOR: &str = "Derive";
const FIELD_COUNT: usize = 9;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ParseDerivationError {
    #[error("malformed derivation term: {0}")]
    Malformed(
        #[from]
        #[source]
        MalformedTerm,
    ),
    #[error("invalid derivation: {0}")]
    Invalid(
        #[from]
        #[source]
        InvalidDerivation,
    ),
}

fn atom(s: &str) -> Term {
    Term::atom(s)
}

/// Emits the canonical term of a derivation.
///
/// Maps and sets are iterated in their BTree order (lexicographic ids and
/// keys, dirs by ascending path); `args` keeps its declared order. Equal
/// derivations therefore always print to byte-identical canonical forms.
pub fn unparse_derivation(drv: &Derivation) -> Term {
    let outputs = drv
        .outputs()
        .iter()
        .map(|(id, output)| {
            let data = output.to_data();
            Term::tuple(vec![
                atom(id),
                atom(&data.path),
                atom(&data.hash_algo),
                atom(&data.hash),
            ])
        })
        .collect();
    let state_outputs = drv
        .state_outputs()
        .iter()
        .map(|(id, output)| {
            let data = output.to_data();
            Term::tuple(vec![
                atom(id),
                atom(&data.state_path),
                atom(&data.hash_algo),
                atom(&data.hash),
                atom(&data.state_identifier),
                atom(&data.enabled),
                atom(&data.shared),
                atom(&data.synchronization),
                atom(&data.commit_references),
                atom(&data.commit_binaries),
                atom(&data.create_dirs_before_install),
                atom(&data.runtime_state_parameters),
            ])
        })
        .collect();
    let state_output_dirs = drv
        .state_output_dirs()
        .iter()
        .map(|dir| {
            let data = dir.to_data();
            Term::tuple(vec![
                atom(&data.path),
                atom(&data.kind),
                atom(&data.interval),
            ])
        })
        .collect();
    let input_drvs = drv
        .input_drvs()
        .iter()
        .map(|(path, ids)| {
            Term::tuple(vec![
                atom(path),
                Term::List(ids.iter().map(|id| atom(id)).collect()),
            ])
        })
        .collect();
    let input_srcs = drv.input_srcs().iter().map(|src| atom(src)).collect();
    let args = drv.args().iter().map(|arg| atom(arg)).collect();
    let env = drv
        .env()
        .iter()
        .map(|(name, value)| Term::tuple(vec![atom(name), atom(value)]))
        .collect();
    Term::App(
        CONSTRUCTOR.into(),
        vec![
            Term::List(outputs),
            Term::List(state_outputs),
            Term::List(state_output_dirs),
            Term::List(input_drvs),
            Term::List(input_srcs),
            atom(drv.platform()),
            atom(drv.builder()),
            Term::List(args),
            Term::List(env),
        ],
    )
}

/// The canonical byte form of a derivation: what gets hashed and persisted.
pub fn serialize_derivation(drv: &Derivation) -> Vec<u8> {
    unparse_derivation(drv).to_bytes()
}

fn output_entry(term: &Term) -> Result<(String, OutputData), MalformedTerm> {
    let fields = term.as_tuple(4)?;
    Ok((
        fields[0].as_atom()?.to_owned(),
        OutputData {
            path: fields[1].as_atom()?.to_owned(),
            hash_algo: fields[2].as_atom()?.to_owned(),
            hash: fields[3].as_atom()?.to_owned(),
        },
    ))
}

fn state_output_entry(term: &Term) -> Result<(String, StateOutputData), MalformedTerm> {
    let fields = term.as_tuple(12)?;
    Ok((
        fields[0].as_atom()?.to_owned(),
        StateOutputData {
            state_path: fields[1].as_atom()?.to_owned(),
            hash_algo: fields[2].as_atom()?.to_owned(),
            hash: fields[3].as_atom()?.to_owned(),
            state_identifier: fields[4].as_atom()?.to_owned(),
            enabled: fields[5].as_atom()?.to_owned(),
            shared: fields[6].as_atom()?.to_owned(),
            synchronization: fields[7].as_atom()?.to_owned(),
            commit_references: fields[8].as_atom()?.to_owned(),
            commit_binaries: fields[9].as_atom()?.to_owned(),
            create_dirs_before_install: fields[10].as_atom()?.to_owned(),
            runtime_state_parameters: fields[11].as_atom()?.to_owned(),
        },
    ))
}

fn state_output_dir_entry(term: &Term) -> Result<StateOutputDirData, MalformedTerm> {
    let fields = term.as_tuple(3)?;
    Ok(StateOutputDirData {
        path: fields[0].as_atom()?.to_owned(),
        kind: fields[1].as_atom()?.to_owned(),
        interval: fields[2].as_atom()?.to_owned(),
    })
}

fn input_drv_entry(term: &Term) -> Result<(String, Vec<String>), MalformedTerm> {
    let fields = term.as_tuple(2)?;
    let ids = fields[1]
        .as_list()?
        .iter()
        .map(|id| id.as_atom().map(str::to_owned))
        .collect::<Result<_, _>>()?;
    Ok((fields[0].as_atom()?.to_owned(), ids))
}

fn env_entry(term: &Term) -> Result<(String, String), MalformedTerm> {
    let fields = term.as_tuple(2)?;
    Ok((
        fields[0].as_atom()?.to_owned(),
        fields[1].as_atom()?.to_owned(),
    ))
}

fn atoms(term: &Term) -> Result<Vec<String>, MalformedTerm> {
    term.as_list()?
        .iter()
        .map(|t| t.as_atom().map(str::to_owned))
        .collect()
}

/// Decodes a term into a [`Derivation`]. Structural mismatches (wrong
/// constructor, arity or nesting) fail with [`MalformedTerm`]; the decoded
/// values then go through normal construction, so every construction-time
/// check applies here too.
pub fn parse_derivation_term(term: &Term) -> Result<Derivation, ParseDerivationError> {
    let fields = match term {
        Term::App(name, fields) if name == CONSTRUCTOR => {
            if fields.len() != FIELD_COUNT {
                return Err(MalformedTerm::Arity {
                    expected: FIELD_COUNT,
                    found: fields.len(),
                }
                .into());
            }
            fields
        }
        Term::App(name, _) => {
            return Err(MalformedTerm::UnknownConstructor(name.clone()).into());
        }
        other => {
            return Err(MalformedTerm::Unexpected {
                expected: "a Derive application",
                found: other.kind(),
            }
            .into());
        }
    };
    let data = DerivationData {
        outputs: fields[0]
            .as_list()?
            .iter()
            .map(output_entry)
            .collect::<Result<_, _>>()?,
        state_outputs: fields[1]
            .as_list()?
            .iter()
            .map(state_output_entry)
            .collect::<Result<_, _>>()?,
        state_output_dirs: fields[2]
            .as_list()?
            .iter()
            .map(state_output_dir_entry)
            .collect::<Result<_, _>>()?,
        input_drvs: fields[3]
            .as_list()?
            .iter()
            .map(input_drv_entry)
            .collect::<Result<_, _>>()?,
        input_srcs: atoms(&fields[4])?,
        platform: fields[5].as_atom()?.to_owned(),
        builder: fields[6].as_atom()?.to_owned(),
        args: atoms(&fields[7])?,
        env: fields[8]
            .as_list()?
            .iter()
            .map(env_entry)
            .collect::<Result<_, _>>()?,
    };
    Ok(Derivation::try_from(data)?)
}

/// Parses canonical bytes into a [`Derivation`].
pub fn parse_derivation(bytes: &[u8]) -> Result<Derivation, ParseDerivationError> {
    let term = Term::parse_bytes(bytes)?;
    parse_derivation_term(&term)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use crate::derivation::proptest::arb_derivation;
    use crate::derivation::{DerivationData, OutputData, StateOutputData, StateOutputDirData};

    use super::*;

    fn sample_data() -> DerivationData {
        DerivationData {
            outputs: vec![
                (
                    "out".into(),
                    OutputData {
                        path: "/store/abc-foo".into(),
                        hash_algo: "sha256".into(),
                        hash: "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
                            .into(),
                    },
                ),
                ("dev".into(), OutputData::default()),
            ],
            state_outputs: vec![(
                "out".into(),
                StateOutputData {
                    state_path: "/var/state/foo".into(),
                    state_identifier: "primary".into(),
                    enabled: "true".into(),
                    shared: "group".into(),
                    synchronization: "exclusive-lock-on-all-substates-dir".into(),
                    commit_references: "reserved".into(),
                    create_dirs_before_install: "false".into(),
                    runtime_state_parameters: "--state $statepath".into(),
                    ..StateOutputData::default()
                },
            )],
            state_output_dirs: vec![
                StateOutputDirData {
                    path: "logs".into(),
                    kind: "interval".into(),
                    interval: "3600".into(),
                },
                StateOutputDirData {
                    path: "cache".into(),
                    kind: "manual".into(),
                    interval: String::new(),
                },
            ],
            input_drvs: vec![(
                "/store/xyz-dep.drv".into(),
                vec!["out".into(), "lib".into()],
            )],
            input_srcs: vec!["/store/src-build.sh".into()],
            platform: "x86_64-linux".into(),
            builder: "/bin/sh".into(),
            args: vec!["-e".into(), "build.sh".into()],
            env: vec![
                ("out".into(), "/store/abc-foo".into()),
                ("PATH".into(), "/bin".into()),
            ],
        }
    }

    #[test]
    fn roundtrip_sample() {
        let drv = Derivation::try_from(sample_data()).unwrap();
        let bytes = serialize_derivation(&drv);
        let parsed = parse_derivation(&bytes).unwrap();
        assert_eq!(parsed, drv);
    }

    #[test]
    fn serialization_is_field_order_independent() {
        let mut shuffled = sample_data();
        shuffled.outputs.reverse();
        shuffled.env.reverse();
        shuffled.state_output_dirs.reverse();
        shuffled.input_srcs.reverse();
        let a = Derivation::try_from(sample_data()).unwrap();
        let b = Derivation::try_from(shuffled).unwrap();
        assert_eq!(a, b);
        assert_eq!(serialize_derivation(&a), serialize_derivation(&b));
    }

    #[test]
    fn args_order_is_semantic() {
        let mut reordered = sample_data();
        reordered.args.reverse();
        let a = Derivation::try_from(sample_data()).unwrap();
        let b = Derivation::try_from(reordered).unwrap();
        assert_ne!(serialize_derivation(&a), serialize_derivation(&b));
    }

    #[test]
    fn canonical_form_is_stable() {
        let drv = Derivation::try_from(sample_data()).unwrap();
        assert_eq!(serialize_derivation(&drv), serialize_derivation(&drv));
        let printed = String::from_utf8(serialize_derivation(&drv)).unwrap();
        assert!(printed.starts_with("Derive(["));
        // maps sort by key: "dev" precedes "out", "PATH" precedes "out"
        let dev = printed.find("\"dev\"").unwrap();
        let out = printed.find("\"out\"").unwrap();
        assert!(dev < out);
        // dirs sort by path
        let cache = printed.find("\"cache\"").unwrap();
        let logs = printed.find("\"logs\"").unwrap();
        assert!(cache < logs);
    }

    #[test]
    fn wrong_constructor_rejected() {
        let term = Term::App("Build".into(), vec![]);
        assert_eq!(
            parse_derivation_term(&term).unwrap_err(),
            ParseDerivationError::Malformed(MalformedTerm::UnknownConstructor("Build".into()))
        );
    }

    #[test]
    fn wrong_arity_rejected() {
        let term = Term::App(CONSTRUCTOR.into(), vec![Term::List(vec![])]);
        assert_eq!(
            parse_derivation_term(&term).unwrap_err(),
            ParseDerivationError::Malformed(MalformedTerm::Arity {
                expected: FIELD_COUNT,
                found: 1
            })
        );
    }

    #[test]
    fn wrong_nesting_rejected() {
        let drv = Derivation::try_from(sample_data()).unwrap();
        let mut term = unparse_derivation(&drv);
        if let Term::App(_, fields) = &mut term {
            fields[5] = Term::List(vec![]); // platform must be an atom
        }
        assert_eq!(
            parse_derivation_term(&term).unwrap_err(),
            ParseDerivationError::Malformed(MalformedTerm::Unexpected {
                expected: "an atom",
                found: "a list"
            })
        );
    }

    #[test]
    fn parse_routes_through_construction() {
        let drv = Derivation::try_from(sample_data()).unwrap();
        let printed = String::from_utf8(serialize_derivation(&drv)).unwrap();
        let tampered = printed.replace(
            "\"exclusive-lock-on-all-substates-dir\"",
            "\"exclusive-lock-on-everything\"",
        );
        assert_eq!(
            parse_derivation(tampered.as_bytes()).unwrap_err(),
            ParseDerivationError::Invalid(InvalidDerivation::InvalidEnumValue {
                field: "synchronization",
                value: "exclusive-lock-on-everything".into()
            })
        );
        let tampered = printed.replace("\"true\"", "\"yes\"");
        assert_eq!(
            parse_derivation(tampered.as_bytes()).unwrap_err(),
            ParseDerivationError::Invalid(InvalidDerivation::InvalidBoolean {
                field: "enabled",
                value: "yes".into()
            })
        );
    }

    #[test]
    fn fixed_output_path_preserved_exactly() {
        let drv = Derivation::try_from(sample_data()).unwrap();
        let parsed = parse_derivation(&serialize_derivation(&drv)).unwrap();
        assert_eq!(parsed.outputs()["out"].path(), Some("/store/abc-foo"));
    }

    proptest! {
        #[test]
        fn proptest_roundtrip(drv in arb_derivation()) {
            let bytes = serialize_derivation(&drv);
            let parsed = parse_derivation(&bytes).unwrap();
            prop_assert_eq!(parsed, drv);
        }

        #[test]
        fn proptest_determinism(drv in arb_derivation()) {
            prop_assert_eq!(serialize_derivation(&drv), serialize_derivation(&drv));
        }
    }
}
