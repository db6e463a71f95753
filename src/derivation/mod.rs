use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::hash::ParseHashError;

mod output;
mod parse;
mod state_output;
mod write;

pub use output::{DerivationOutput, OutputData};
pub(crate) use output::output_path_name;
pub use parse::{
    parse_derivation, parse_derivation_term, serialize_derivation, unparse_derivation,
    ParseDerivationError,
};
pub use state_output::{
    DerivationStateOutput, DerivationStateOutputDir, SharedState, StateDirKind, StateOutputData,
    StateOutputDirData, Synchronization,
};
pub use write::{
    read_derivation, write_derivation, hash_term, ReadDerivationError, WriteDerivationError,
};

/// A construction-time field violation. Construction is the single
/// validation boundary: parsing routes through it and never bypasses it.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum InvalidDerivation {
    #[error("derivation output id may not be empty")]
    EmptyOutputId,
    #[error("duplicate output id '{0}'")]
    DuplicateOutputId(String),
    #[error("output '{id}' declares a hash but no hash algorithm")]
    HashWithoutAlgorithm { id: String },
    #[error("output '{id}' declares unknown hash algorithm '{algo}'")]
    UnknownHashAlgorithm { id: String, algo: String },
    #[error("output '{id}' has an invalid hash: {error}")]
    InvalidOutputHash {
        id: String,
        #[source]
        error: ParseHashError,
    },
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("field '{field}' has invalid value '{value}'")]
    InvalidEnumValue {
        field: &'static str,
        value: String,
    },
    #[error("field '{field}' must be 'true' or 'false', not '{value}'")]
    InvalidBoolean {
        field: &'static str,
        value: String,
    },
}

/// An unvalidated candidate derivation: the raw field values handed over by
/// the evaluator. Collection fields are plain sequences; canonical ordering
/// is applied during construction, so the order they were filled in never
/// shows through.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct DerivationData {
    pub outputs: Vec<(String, OutputData)>,
    pub state_outputs: Vec<(String, StateOutputData)>,
    pub state_output_dirs: Vec<StateOutputDirData>,
    pub input_drvs: Vec<(String, Vec<String>)>,
    pub input_srcs: Vec<String>,
    pub platform: String,
    pub builder: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

/// An immutable description of one build step: inputs, builder, environment
/// and declared outputs, plus any stateful outputs and their directories.
///
/// Constructed once (via [`TryFrom<DerivationData>`]), then never mutated;
/// its store path is a pure function of its content. Safe for unrestricted
/// concurrent read-only use.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Derivation {
    outputs: BTreeMap<String, DerivationOutput>,
    state_outputs: BTreeMap<String, DerivationStateOutput>,
    state_output_dirs: BTreeSet<DerivationStateOutputDir>,
    input_drvs: BTreeMap<String, BTreeSet<String>>,
    input_srcs: BTreeSet<String>,
    platform: String,
    builder: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl Derivation {
    /// Outputs keyed on symbolic id, in id order.
    pub fn outputs(&self) -> &BTreeMap<String, DerivationOutput> {
        &self.outputs
    }

    /// Stateful outputs keyed on symbolic id, in id order.
    pub fn state_outputs(&self) -> &BTreeMap<String, DerivationStateOutput> {
        &self.state_outputs
    }

    /// State directories, in ascending path order.
    pub fn state_output_dirs(&self) -> &BTreeSet<DerivationStateOutputDir> {
        &self.state_output_dirs
    }

    /// Input derivation path to the output ids consumed from it.
    pub fn input_drvs(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.input_drvs
    }

    pub fn input_srcs(&self) -> &BTreeSet<String> {
        &self.input_srcs
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn builder(&self) -> &str {
        &self.builder
    }

    /// Builder argv, in declared order.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Copy of this derivation with one output's path replaced. Used by
    /// floating-path resolution; not exposed, so values stay immutable to
    /// callers.
    pub(crate) fn with_output_path(&self, id: &str, path: String) -> Derivation {
        let mut drv = self.clone();
        if let Some(DerivationOutput::Floating { path: p, .. }) = drv.outputs.get_mut(id) {
            *p = path;
        }
        drv
    }
}

impl TryFrom<DerivationData> for Derivation {
    type Error = InvalidDerivation;

    fn try_from(value: DerivationData) -> Result<Self, Self::Error> {
        let mut outputs = BTreeMap::new();
        for (id, data) in value.outputs {
            if id.is_empty() {
                return Err(InvalidDerivation::EmptyOutputId);
            }
            let output = DerivationOutput::validate(&id, data)?;
            if outputs.insert(id.clone(), output).is_some() {
                return Err(InvalidDerivation::DuplicateOutputId(id));
            }
        }
        let mut state_outputs = BTreeMap::new();
        for (id, data) in value.state_outputs {
            if id.is_empty() {
                return Err(InvalidDerivation::EmptyOutputId);
            }
            let output = DerivationStateOutput::try_from(data)?;
            if state_outputs.insert(id.clone(), output).is_some() {
                return Err(InvalidDerivation::DuplicateOutputId(id));
            }
        }
        let state_output_dirs = value
            .state_output_dirs
            .into_iter()
            .map(DerivationStateOutputDir::try_from)
            .collect::<Result<BTreeSet<_>, _>>()?;
        let input_drvs = value
            .input_drvs
            .into_iter()
            .map(|(path, ids)| (path, ids.into_iter().collect()))
            .collect();
        Ok(Derivation {
            outputs,
            state_outputs,
            state_output_dirs,
            input_drvs,
            input_srcs: value.input_srcs.into_iter().collect(),
            platform: value.platform,
            builder: value.builder,
            args: value.args,
            env: value.env.into_iter().collect(),
        })
    }
}
