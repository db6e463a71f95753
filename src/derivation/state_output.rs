use std::str::FromStr;

use derive_more::Display;

use super::InvalidDerivation;

/// How a state directory is provisioned across package instances.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Display, Default)]
pub enum SharedState {
    /// Dedicated, unshared state directory.
    #[default]
    #[display("none")]
    None,
    /// One directory shared by every instance of the package.
    #[display("full")]
    Full,
    /// Shared only within an externally defined group identity.
    #[display("group")]
    Group,
}

impl SharedState {
    fn parse(s: &str) -> Option<SharedState> {
        match s {
            "none" => Some(SharedState::None),
            "full" => Some(SharedState::Full),
            "group" => Some(SharedState::Group),
            _ => None,
        }
    }
}

/// What an external lock manager must acquire before mutating the state of
/// an output. Interpreted by [`Derivation::lock_scope`].
///
/// [`Derivation::lock_scope`]: crate::derivation::Derivation::lock_scope
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Display, Default)]
pub enum Synchronization {
    /// No coordination; concurrent mutation is the caller's problem.
    #[default]
    #[display("none")]
    None,
    /// Exclusive lock on this output's own state directory.
    #[display("exclusive-lock-on-own-state-dir")]
    ExclusiveOwnStateDir,
    /// Exclusive locks on the state directory and every substate directory
    /// under it, in ascending path order.
    #[display("exclusive-lock-on-all-substates-dir")]
    ExclusiveAllSubstateDirs,
}

impl Synchronization {
    fn parse(s: &str) -> Option<Synchronization> {
        match s {
            "none" => Some(Synchronization::None),
            "exclusive-lock-on-own-state-dir" => Some(Synchronization::ExclusiveOwnStateDir),
            "exclusive-lock-on-all-substates-dir" => Some(Synchronization::ExclusiveAllSubstateDirs),
            _ => None,
        }
    }
}

/// Commit discipline of a state directory.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Display, Default)]
pub enum StateDirKind {
    #[default]
    #[display("none")]
    None,
    #[display("manual")]
    Manual,
    #[display("interval")]
    Interval,
    #[display("full")]
    Full,
}

impl StateDirKind {
    fn parse(s: &str) -> Option<StateDirKind> {
        match s {
            "none" => Some(StateDirKind::None),
            "manual" => Some(StateDirKind::Manual),
            "interval" => Some(StateDirKind::Interval),
            "full" => Some(StateDirKind::Full),
            _ => None,
        }
    }
}

macro_rules! closed_set_from_str {
    ($ty:ty, $field:literal) => {
        impl FromStr for $ty {
            type Err = InvalidDerivation;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$ty>::parse(s).ok_or_else(|| InvalidDerivation::InvalidEnumValue {
                    field: $field,
                    value: s.to_owned(),
                })
            }
        }
    };
}
closed_set_from_str!(SharedState, "shared");
closed_set_from_str!(Synchronization, "synchronization");
closed_set_from_str!(StateDirKind, "type");

fn parse_bool(field: &'static str, s: &str) -> Result<bool, InvalidDerivation> {
    match s {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(InvalidDerivation::InvalidBoolean {
            field,
            value: s.to_owned(),
        }),
    }
}

/// Raw stateful-output fields as the evaluator supplies them and as they
/// appear on the wire.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct StateOutputData {
    pub state_path: String,
    pub hash_algo: String,
    pub hash: String,
    pub state_identifier: String,
    pub enabled: String,
    pub shared: String,
    pub synchronization: String,
    pub commit_references: String,
    pub commit_binaries: String,
    pub create_dirs_before_install: String,
    pub runtime_state_parameters: String,
}

/// A mutable runtime-state directory attached to a derivation output.
///
/// Booleans and closed-set fields are decoded exactly once, at construction;
/// nothing downstream re-inspects the raw tokens. The reserved fields
/// (`hash_algo`, `hash`, `commit_references`, `commit_binaries`) carry no
/// semantics here and pass through unchanged.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct DerivationStateOutput {
    state_path: String,
    hash_algo: String,
    hash: String,
    state_identifier: String,
    enabled: bool,
    shared: SharedState,
    synchronization: Synchronization,
    commit_references: String,
    commit_binaries: String,
    create_dirs_before_install: bool,
    runtime_state_parameters: String,
}

impl DerivationStateOutput {
    pub fn state_path(&self) -> &str {
        &self.state_path
    }

    pub fn state_identifier(&self) -> &str {
        &self.state_identifier
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn shared(&self) -> SharedState {
        self.shared
    }

    pub fn synchronization(&self) -> Synchronization {
        self.synchronization
    }

    pub fn create_dirs_before_install(&self) -> bool {
        self.create_dirs_before_install
    }

    pub fn runtime_state_parameters(&self) -> &str {
        &self.runtime_state_parameters
    }

    /// Reserved field, passed through verbatim.
    pub fn hash_algo(&self) -> &str {
        &self.hash_algo
    }

    /// Reserved field, passed through verbatim.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Reserved field, passed through verbatim.
    pub fn commit_references(&self) -> &str {
        &self.commit_references
    }

    /// Reserved field, passed through verbatim.
    pub fn commit_binaries(&self) -> &str {
        &self.commit_binaries
    }

    pub(crate) fn to_data(&self) -> StateOutputData {
        StateOutputData {
            state_path: self.state_path.clone(),
            hash_algo: self.hash_algo.clone(),
            hash: self.hash.clone(),
            state_identifier: self.state_identifier.clone(),
            enabled: self.enabled.to_string(),
            shared: self.shared.to_string(),
            synchronization: self.synchronization.to_string(),
            commit_references: self.commit_references.clone(),
            commit_binaries: self.commit_binaries.clone(),
            create_dirs_before_install: self.create_dirs_before_install.to_string(),
            runtime_state_parameters: self.runtime_state_parameters.clone(),
        }
    }
}

impl TryFrom<StateOutputData> for DerivationStateOutput {
    type Error = InvalidDerivation;

    fn try_from(value: StateOutputData) -> Result<Self, Self::Error> {
        let enabled = parse_bool("enabled", &value.enabled)?;
        let create_dirs_before_install =
            parse_bool("createDirsBeforeInstall", &value.create_dirs_before_install)?;
        let shared = value.shared.parse()?;
        let synchronization = value.synchronization.parse()?;
        Ok(DerivationStateOutput {
            state_path: value.state_path,
            hash_algo: value.hash_algo,
            hash: value.hash,
            state_identifier: value.state_identifier,
            enabled,
            shared,
            synchronization,
            commit_references: value.commit_references,
            commit_binaries: value.commit_binaries,
            create_dirs_before_install,
            runtime_state_parameters: value.runtime_state_parameters,
        })
    }
}

/// Raw state-directory fields.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct StateOutputDirData {
    pub path: String,
    pub kind: String,
    pub interval: String,
}

/// One directory inside an output's state path.
///
/// `path` is the leading field so the derived ordering sorts by path first:
/// collections of dirs always iterate, serialize and lock in ascending path
/// order.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct DerivationStateOutputDir {
    path: String,
    kind: StateDirKind,
    interval: String,
}

impl DerivationStateOutputDir {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> StateDirKind {
        self.kind
    }

    /// The raw interval token. Stored verbatim; no component reads a period
    /// out of it until interval commit semantics exist.
    pub fn interval(&self) -> &str {
        &self.interval
    }

    pub(crate) fn to_data(&self) -> StateOutputDirData {
        StateOutputDirData {
            path: self.path.clone(),
            kind: self.kind.to_string(),
            interval: self.interval.clone(),
        }
    }
}

impl TryFrom<StateOutputDirData> for DerivationStateOutputDir {
    type Error = InvalidDerivation;

    fn try_from(value: StateOutputDirData) -> Result<Self, Self::Error> {
        let kind = value.kind.parse()?;
        Ok(DerivationStateOutputDir {
            path: value.path,
            kind,
            interval: value.interval,
        })
    }
}
