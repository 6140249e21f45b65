use thiserror::Error;

/// Top-level error type for the topomesh session.
#[derive(Debug, Error)]
pub enum TopomeshError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Feasibility(#[from] FeasibilityError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Coarse classification of a [`TopomeshError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input: unknown id, wrong dimension, parameter out of domain.
    Validation,
    /// Structurally legal request that the current topology cannot honour.
    Feasibility,
    /// The geometry or mesh oracle failed.
    Oracle,
    /// An internal invariant is broken.
    Integrity,
    /// Undo/redo misuse.
    Command,
    /// Unreadable session configuration.
    Config,
}

impl TopomeshError {
    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Feasibility(_) => ErrorKind::Feasibility,
            Self::Oracle(_) => ErrorKind::Oracle,
            Self::Integrity(_) => ErrorKind::Integrity,
            Self::Command(_) => ErrorKind::Command,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

/// Errors caused by malformed requests.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("{entity} has dimension {found}, expected {expected}")]
    DimensionMismatch {
        entity: String,
        expected: u8,
        found: u8,
    },

    #[error("parameter {parameter} = {value} is out of range [{min}, {max}]")]
    ParameterOutOfRange {
        parameter: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("beta must be in (1, 1.01], got {0}")]
    BetaOutOfRange(f64),

    #[error("{0} is a default group and cannot be modified explicitly")]
    DefaultGroup(String),

    #[error("group {0} already exists")]
    GroupExists(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Errors raised when a request is well-formed but topologically infeasible.
#[derive(Debug, Error)]
pub enum FeasibilityError {
    #[error("direction {direction} is not on {target}")]
    DirectionNotFound { direction: String, target: String },

    #[error("O-grid is not feasible on {entities}: {reason}")]
    OgridInfeasible { entities: String, reason: String },

    #[error(
        "cannot snap {removed} onto {kept}: {common} common edges between them, \
         only a single common edge is supported"
    )]
    AmbiguousSnap {
        kept: String,
        removed: String,
        common: usize,
    },

    #[error(
        "discretizations differ: {first} has {first_count} mesh edges, \
         {second} has {second_count}"
    )]
    DiscretizationMismatch {
        first: String,
        first_count: usize,
        second: String,
        second_count: usize,
    },

    #[error("{entity} is still referenced by {by}")]
    StillReferenced { entity: String, by: String },

    #[error("association of {topo} to {geom} rejected: group {group} already holds both")]
    GroupConflict {
        group: String,
        topo: String,
        geom: String,
    },

    #[error("no geometric counterpart for {topo} on {geom}")]
    NoCounterpart { topo: String, geom: String },

    #[error("{entity} is not structured")]
    NotStructured { entity: String },

    #[error("{0}")]
    Unsupported(String),
}

/// Errors reported by a geometry or mesh oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("{operation} failed on {targets}: {message}")]
    Failed {
        operation: &'static str,
        targets: String,
        message: String,
    },
}

/// Broken internal invariants. These point at defects, not user mistakes.
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("{entity} references destroyed entity {target}")]
    DanglingReference { entity: String, target: String },

    #[error("{0}")]
    Inconsistent(String),
}

/// Errors from the undo/redo machinery.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,
}

/// Errors loading a session configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Convenience type alias for results using [`TopomeshError`].
pub type Result<T, E = TopomeshError> = std::result::Result<T, E>;
