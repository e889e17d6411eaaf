use carta_core_types::{RequestId, TraceId};
use serde::{Deserialize, Serialize};

/// Result type alias using CartaError
pub type Result<T> = std::result::Result<T, CartaError>;

/// Canonical error kind taxonomy
///
/// This taxonomy provides a stable, structured classification of all errors
/// in the carta access layer. Each kind maps to a stable error code that can
/// be used for programmatic error handling, testing, and external API
/// responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartaErrorKind {
    // Contract/Validation
    InvalidInput,
    NotFound,
    /// ByUuid resolution attempted against a descriptor with no UUID column
    MissingUuidColumn,
    /// A scope name was requested that the registry does not know
    UnknownScope,

    // Transactional
    /// An operation inside a coordinator-managed transaction failed and no
    /// recovery handler was supplied
    TransactionFailure,

    // Engine passthrough
    ConstraintViolation,
    TypeMismatch,
    Serialization,
    Persistence,
    Timeout,
    Concurrency,

    // Internal
    Internal,
}

impl CartaErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            CartaErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            CartaErrorKind::NotFound => "ERR_NOT_FOUND",
            CartaErrorKind::MissingUuidColumn => "ERR_MISSING_UUID_COLUMN",
            CartaErrorKind::UnknownScope => "ERR_UNKNOWN_SCOPE",
            CartaErrorKind::TransactionFailure => "ERR_TRANSACTION_FAILURE",
            CartaErrorKind::ConstraintViolation => "ERR_CONSTRAINT_VIOLATION",
            CartaErrorKind::TypeMismatch => "ERR_TYPE_MISMATCH",
            CartaErrorKind::Serialization => "ERR_SERIALIZATION",
            CartaErrorKind::Persistence => "ERR_PERSISTENCE",
            CartaErrorKind::Timeout => "ERR_TIMEOUT",
            CartaErrorKind::Concurrency => "ERR_CONCURRENCY",
            CartaErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Structured, caller-visible failure body
///
/// Errors raised out of a coordinator-managed transaction are normalized to
/// carry exactly one of these. An error that already holds a body keeps it;
/// anything else gets [`ErrorBody::generic_failure`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    /// Create a body with the given code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Attach free-form detail payload
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// The synthesized body used when a failing error carries no body of
    /// its own
    pub fn generic_failure() -> Self {
        Self::new(
            CartaErrorKind::TransactionFailure.code(),
            "Transactional operation failed",
        )
    }
}

/// Canonical structured error type
///
/// Provides a structured representation of errors with classification fields
/// for programmatic handling and rich context for debugging.
#[derive(Debug, Clone)]
pub struct CartaError {
    kind: CartaErrorKind,
    op: Option<String>,
    table: Option<String>,
    entity_ref: Option<String>,
    request_id: Option<RequestId>,
    trace_id: Option<TraceId>,
    message: String,
    body: Option<ErrorBody>,
    source: Option<Box<CartaError>>,
}

impl CartaError {
    /// Create a new error with the specified kind
    pub fn new(kind: CartaErrorKind) -> Self {
        Self {
            kind,
            op: None,
            table: None,
            entity_ref: None,
            request_id: None,
            trace_id: None,
            message: String::new(),
            body: None,
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add table context
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Add the identifier of the entity the operation was addressing
    pub fn with_entity_ref(mut self, entity_ref: impl Into<String>) -> Self {
        self.entity_ref = Some(entity_ref.into());
        self
    }

    /// Add request ID context
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Add trace ID context
    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Attach a structured caller-visible body
    pub fn with_body(mut self, body: ErrorBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: CartaError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> CartaErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the table context, if any
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Get the entity reference context, if any
    pub fn entity_ref(&self) -> Option<&str> {
        self.entity_ref.as_deref()
    }

    /// Get the request ID context, if any
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Get the trace ID context, if any
    pub fn trace_id(&self) -> Option<&TraceId> {
        self.trace_id.as_ref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the structured body, if any
    pub fn body(&self) -> Option<&ErrorBody> {
        self.body.as_ref()
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&CartaError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for CartaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(table) = &self.table {
            write!(f, " (table: {})", table)?;
        }
        if let Some(entity_ref) = &self.entity_ref {
            write!(f, " (entity_ref: {})", entity_ref)?;
        }
        Ok(())
    }
}

impl std::error::Error for CartaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Conversion from serde_json::Error to CartaError
impl From<serde_json::Error> for CartaError {
    fn from(err: serde_json::Error) -> Self {
        CartaError::new(CartaErrorKind::Serialization).with_message(err.to_string())
    }
}
