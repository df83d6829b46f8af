use thiserror::Error;

/// Mismatch between declared metadata and what the generator or runtime
/// can actually work with. Recorded as a failure for the affected test
/// case or function; never aborts a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error("unsupported parameter type `{0}`")]
    UnsupportedType(String),
    #[error("operation `{0}` not found on contract")]
    OperationNotFound(String),
}

/// Errors surfaced by a contract runtime backend. Reverts are not errors
/// at this level; they come back as `CallOutcome::Reverted`.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("operation `{0}` is not known to the runtime")]
    MissingOperation(String),
    #[error("state accessor `{0}` is not available on the contract")]
    MissingAccessor(String),
    #[error("no contract registered under `{0}`")]
    UnknownContract(String),
    #[error("cannot encode value of type `{0}` for a call")]
    UnsupportedValue(String),
    #[error("failed to decode return data: {0}")]
    Decode(String),
}
