use thiserror::Error;

use crate::types::{Gid, Time};

pub type Result<T> = std::result::Result<T, SimulationError>;

/// Failure taxonomy of the engine. Validation variants are raised during
/// construction and abort it; runtime variants are fatal to the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("bad topology on cell {gid}: {what}")]
    BadTopology { gid: Gid, what: String },

    #[error("bad discretization on cell {gid}: {what}")]
    BadDiscretization { gid: Gid, what: String },

    #[error("no source or target labeled \"{label}\" on cell {gid}")]
    NoSuchLabel { gid: Gid, label: String },

    #[error("label \"{label}\" on cell {gid} resolves to {count} items, expected exactly one")]
    AmbiguousLabel {
        gid: Gid,
        label: String,
        count: usize,
    },

    #[error("gap junction connects cells {gid} and {peer} of different kinds")]
    MismatchedCellKinds { gid: Gid, peer: Gid },

    #[error("connection to cell {gid} has delay {delay} ms, below the minimum {min_delay} ms")]
    ConnectionDelayViolation {
        gid: Gid,
        delay: Time,
        min_delay: Time,
    },

    #[error("distributed context operation failed: {0}")]
    CollectiveFailure(String),

    #[error("non-finite {quantity} in CV {cv} at t = {time} ms")]
    NumericFailure {
        quantity: &'static str,
        cv: usize,
        time: Time,
    },

    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}
