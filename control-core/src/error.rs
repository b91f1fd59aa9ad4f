//! Error taxonomy for the control core.
//!
//! Each subsystem gets its own `thiserror`-derived enum rather than a single
//! god-enum; `ControlCoreError` aggregates them via `#[from]` for call sites
//! that cross subsystem boundaries.

use thiserror::Error;

/// Errors raised by the alarm engine and alarm configuration loader.
#[derive(Debug, Error)]
pub enum AlarmError {
    #[error("unknown alarm code: {0}")]
    UnknownCode(String),

    #[error("alarm not found: {0}")]
    NotFound(String),

    #[error("invalid state transition for alarm {alarm_id}: {reason}")]
    InvalidTransition { alarm_id: String, reason: String },

    #[error("malformed alarm config: {0}")]
    Config(String),

    #[error("duplicate alarm code in config: {0}")]
    DuplicateCode(String),

    #[error("I/O error loading alarm config: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error in alarm config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl AlarmError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        AlarmError::Config(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AlarmError::NotFound(_))
    }
}

/// Errors raised by the behavior arbiter and priority queues.
#[derive(Debug, Error)]
pub enum ArbiterError {
    #[error("invalid mode transition: {from:?} -> {to:?}")]
    InvalidTransition { from: String, to: String },

    #[error("behavior queue full at priority {0:?}")]
    QueueFull(crate::priority::Priority),

    #[error("malformed behavior request: {0}")]
    MalformedRequest(String),

    #[error("behavior not found: {0}")]
    NotFound(String),

    #[error("behavior {0} is not cancellable")]
    NotCancellable(String),
}

impl ArbiterError {
    pub fn is_queue_full(&self) -> bool {
        matches!(self, ArbiterError::QueueFull(_))
    }
}

/// Errors raised by the sequence engine.
#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("sequence step {step_index} failed after retries: {message}")]
    Failed { step_index: usize, message: String },

    #[error("sequence {0} cancelled")]
    Cancelled(String),

    #[error("sequence execution not found: {0}")]
    NotFound(String),

    #[error("invalid condition expression: {0}")]
    InvalidCondition(String),

    #[error("missing required template parameter: {0}")]
    MissingParameter(String),

    #[error("unknown action type: {0}")]
    UnknownActionType(String),

    #[error("template not found: {0}")]
    TemplateNotFound(String),
}

impl SequenceError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SequenceError::Cancelled(_))
    }
}

/// Errors raised by the bag logger (writer, reader, replayer).
#[derive(Debug, Error)]
pub enum BagError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt footer: {0}")]
    CorruptFooter(String),

    #[error("unsupported bag version: {0}")]
    UnsupportedVersion(u32),

    #[error("checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch { expected: u32, computed: u32 },

    #[error("bag file not open")]
    NotOpen,

    #[error("write queue full, message dropped")]
    QueueFull,
}

impl BagError {
    pub fn is_queue_full(&self) -> bool {
        matches!(self, BagError::QueueFull)
    }
}

/// Errors raised by the tracing core.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("invalid traceparent header: {0}")]
    InvalidTraceparent(String),

    #[error("invalid trace id")]
    InvalidTraceId,

    #[error("invalid span id")]
    InvalidSpanId,
}

/// Crate-wide aggregate error for call sites spanning subsystem boundaries.
#[derive(Debug, Error)]
pub enum ControlCoreError {
    #[error("alarm engine error: {0}")]
    Alarm(#[from] AlarmError),

    #[error("arbiter error: {0}")]
    Arbiter(#[from] ArbiterError),

    #[error("sequence engine error: {0}")]
    Sequence(#[from] SequenceError),

    #[error("bag logger error: {0}")]
    Bag(#[from] BagError),

    #[error("tracing error: {0}")]
    Trace(#[from] TraceError),
}

pub type ControlCoreResult<T> = Result<T, ControlCoreError>;
