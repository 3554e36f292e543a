//! Errors that can occur while setting up a session or evaluating kernels.

use crate::{channel, ring::Field};

/// The errors raised by kernels, the state and the session driver.
///
/// Errors fall into three classes: precondition violations are detected locally before any
/// message is sent ([`Error::is_precondition`]), communication failures are fatal to the session
/// ([`Error::is_session_failure`]), and configuration errors are raised while bootstrapping.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The operands of `op` live in different rings.
    #[error("{op}: operands have different ring widths ({lhs} vs {rhs})")]
    FieldMismatch {
        /// The operation that was called.
        op: String,
        /// The ring of the first operand.
        lhs: Field,
        /// The ring of the offending operand.
        rhs: Field,
    },
    /// The operands of `op` have different element counts.
    #[error("{op}: operands have different lengths ({lhs} vs {rhs})")]
    LengthMismatch {
        /// The operation that was called.
        op: String,
        /// The length of the first operand.
        lhs: usize,
        /// The length of the offending operand.
        rhs: usize,
    },
    /// A kernel was called with the wrong number of operands.
    #[error("{kernel}: expected {expected} operands, got {actual}")]
    Arity {
        /// The kernel name.
        kernel: String,
        /// The number of operands the kernel takes.
        expected: String,
        /// The number of operands it was given.
        actual: usize,
    },
    /// An operand is malformed in a way not covered by the other variants.
    #[error("{op}: {reason}")]
    InvalidOperand {
        /// The operation that was called.
        op: String,
        /// What is wrong with the operand.
        reason: String,
    },
    /// No kernel with the name is registered for the protocol.
    #[error("no kernel '{0}' is registered")]
    UnknownKernel(String),
    /// The value id is not (or no longer) defined in the value arena.
    #[error("value {0} is not defined")]
    UnknownValue(usize),
    /// The value id has already been written.
    #[error("value {0} is already defined and cannot be overwritten")]
    ValueAlreadyDefined(usize),
    /// The Beaver source cannot hand out as many triples as requested.
    #[error("{tag}: beaver source exhausted, requested {requested} but only {remaining} left")]
    BeaverExhausted {
        /// The tag of the request.
        tag: String,
        /// The number of correlations requested.
        requested: usize,
        /// The number of correlations still available.
        remaining: usize,
    },
    /// Correlated randomness was requested twice under the same tag.
    #[error("{0}: correlated randomness for this tag has already been issued")]
    TripleReuse(String),
    /// The zero-cost B2A conversion was called without enough precomputed random bits.
    #[error("{kernel}: needs {required} precomputed random bits of {field}, only {available} left")]
    MissingConversionMaterial {
        /// The kernel name.
        kernel: String,
        /// The ring of the operand.
        field: Field,
        /// The number of random bits the call needs.
        required: usize,
        /// The number of random bits in the pool.
        available: usize,
    },
    /// A message could not be sent, received or decoded.
    #[error(transparent)]
    Channel(#[from] channel::Error),
    /// The session failed earlier and can no longer be used.
    #[error("the session has been aborted after a previous failure")]
    SessionAborted,
    /// The session has been closed.
    #[error("the session has been closed")]
    SessionClosed,
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Whether the error is a local precondition violation raised before any communication.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::FieldMismatch { .. }
                | Error::LengthMismatch { .. }
                | Error::Arity { .. }
                | Error::InvalidOperand { .. }
                | Error::UnknownKernel(_)
                | Error::UnknownValue(_)
                | Error::ValueAlreadyDefined(_)
                | Error::BeaverExhausted { .. }
                | Error::TripleReuse(_)
                | Error::MissingConversionMaterial { .. }
        )
    }

    /// Whether the error leaves the parties' shares inconsistent, so the session must be rebuilt.
    pub fn is_session_failure(&self) -> bool {
        matches!(self, Error::Channel(_) | Error::SessionAborted)
    }
}

/// Errors in a [`crate::config::SessionConfig`] or the session setup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A session needs at least two parties.
    #[error("a session needs at least 2 parties, got {0}")]
    TooFewParties(usize),
    /// The own rank must be one of the parties.
    #[error("rank {rank} is out of range for {world_size} parties")]
    InvalidRank {
        /// The own rank.
        rank: usize,
        /// The number of parties.
        world_size: usize,
    },
    /// The worker pool cannot be empty.
    #[error("the number of threads must be at least 1")]
    ZeroThreads,
    /// An environment variable holds a value that cannot be parsed.
    #[error("invalid value '{value}' for {var}")]
    InvalidEnvVar {
        /// The variable name.
        var: &'static str,
        /// The value that was found.
        value: String,
    },
    /// The runtime for a simulation could not be started.
    #[error("could not start the runtime: {0}")]
    Runtime(String),
}
