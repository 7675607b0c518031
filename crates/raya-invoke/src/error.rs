//! Error types for the invocation engine

use std::fmt;

use thiserror::Error;

/// Kind of a managed exception thrown by a method body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExceptionKind {
    /// An argument is outside its allowed range
    ArgumentOutOfRange,
    /// An argument is invalid
    Argument,
    /// A null reference was dereferenced
    NullReference,
    /// The operation is invalid in the current state
    InvalidOperation,
    /// A value was read or written as the wrong type
    InvalidCast,
    /// User-defined exception type
    Custom(String),
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExceptionKind::ArgumentOutOfRange => f.write_str("ArgumentOutOfRangeError"),
            ExceptionKind::Argument => f.write_str("ArgumentError"),
            ExceptionKind::NullReference => f.write_str("NullReferenceError"),
            ExceptionKind::InvalidOperation => f.write_str("InvalidOperationError"),
            ExceptionKind::InvalidCast => f.write_str("InvalidCastError"),
            ExceptionKind::Custom(name) => f.write_str(name),
        }
    }
}

/// A managed exception raised by an invoked method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    kind: ExceptionKind,
    message: String,
    inner: Option<Box<Exception>>,
}

impl Exception {
    /// Create an exception of the given kind
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            inner: None,
        }
    }

    /// `ArgumentOutOfRangeError`
    pub fn argument_out_of_range(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::ArgumentOutOfRange, message)
    }

    /// `ArgumentError`
    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::Argument, message)
    }

    /// `NullReferenceError`
    pub fn null_reference(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::NullReference, message)
    }

    /// `InvalidOperationError`
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::InvalidOperation, message)
    }

    /// `InvalidCastError`
    pub fn invalid_cast(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::InvalidCast, message)
    }

    /// Attach an inner exception
    pub fn with_inner(mut self, inner: Exception) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    /// Exception kind
    pub fn kind(&self) -> &ExceptionKind {
        &self.kind
    }

    /// Exception message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Inner exception, if any
    pub fn inner(&self) -> Option<&Exception> {
        self.inner.as_deref()
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Exception {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Broad classification of [`InvokeError`]s
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The call does not match the method's shape
    Shape,
    /// The target is missing or of the wrong type
    Target,
    /// An argument could not be bound to its parameter
    Binding,
    /// The invoked method raised an exception
    TargetInvocation,
    /// The context or API was misused
    Usage,
    /// The heap could not satisfy an allocation
    Resource,
}

/// Invocation errors
#[derive(Debug, Error)]
pub enum InvokeError {
    /// Argument count differs from the method's parameter count
    #[error("Parameter count mismatch: expected {expected}, got {actual}")]
    ParameterCountMismatch {
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        actual: usize,
    },

    /// An explicitly typed return slot does not match the method's return type
    #[error("Return type mismatch: method returns {expected}, context expects {actual}")]
    ReturnTypeMismatch {
        /// Method return type
        expected: String,
        /// Type the caller prepared
        actual: String,
    },

    /// Instance method invoked without a target
    #[error("Non-static method '{method}' requires a target")]
    TargetRequired {
        /// Method name
        method: String,
    },

    /// Target is not an instance of the declaring type
    #[error("Target of type {actual} does not match declaring type {expected}")]
    TargetMismatch {
        /// Declaring type
        expected: String,
        /// Target runtime type
        actual: String,
    },

    /// Argument cannot be converted to its parameter type
    #[error("Argument {index}: {actual} cannot be converted to {expected}")]
    ArgumentTypeMismatch {
        /// Parameter index
        index: usize,
        /// Parameter type
        expected: String,
        /// Argument runtime type
        actual: String,
    },

    /// An omitted argument has no declared default value
    #[error("Argument {index} ('{name}') was omitted and has no default value")]
    MissingArgument {
        /// Parameter index
        index: usize,
        /// Parameter name
        name: String,
    },

    /// A method with a by-ref return produced a null reference
    #[error("Method '{method}' returned a null reference")]
    NullRefReturned {
        /// Method name
        method: String,
    },

    /// The invoked method threw; the original exception is the source
    #[error("Exception has been thrown by the target of an invocation")]
    TargetInvocation(#[source] Exception),

    /// The invoked method threw and wrapping was disabled
    #[error(transparent)]
    Thrown(Exception),

    /// The context has been disposed
    #[error("Invocation context has been disposed")]
    ContextDisposed,

    /// Slot index outside the context's argument range
    #[error("Argument index {index} out of range (argument count {count})")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Argument count
        count: usize,
    },

    /// The return value of a void method was requested
    #[error("Method has a void return type")]
    VoidReturn,

    /// The return slot was never populated
    #[error("Return value has not been set")]
    ReturnNotSet,

    /// The argument slot was never populated
    #[error("Argument {index} has not been set")]
    ArgumentNotSet {
        /// Parameter index
        index: usize,
    },

    /// A typed read used the wrong Rust type for the slot
    #[error("Slot holds {actual}, not the requested {requested}")]
    SlotTypeMismatch {
        /// Requested Rust type
        requested: &'static str,
        /// Runtime type in the slot
        actual: String,
    },

    /// Heap allocation failed
    #[error(transparent)]
    Heap(#[from] HeapError),
}

impl InvokeError {
    /// Error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            InvokeError::ParameterCountMismatch { .. } | InvokeError::ReturnTypeMismatch { .. } => {
                ErrorCategory::Shape
            }
            InvokeError::TargetRequired { .. } | InvokeError::TargetMismatch { .. } => ErrorCategory::Target,
            InvokeError::ArgumentTypeMismatch { .. } | InvokeError::MissingArgument { .. } => {
                ErrorCategory::Binding
            }
            InvokeError::NullRefReturned { .. }
            | InvokeError::TargetInvocation(_)
            | InvokeError::Thrown(_) => ErrorCategory::TargetInvocation,
            InvokeError::ContextDisposed
            | InvokeError::IndexOutOfRange { .. }
            | InvokeError::VoidReturn
            | InvokeError::ReturnNotSet
            | InvokeError::ArgumentNotSet { .. }
            | InvokeError::SlotTypeMismatch { .. } => ErrorCategory::Usage,
            InvokeError::Heap(_) => ErrorCategory::Resource,
        }
    }

    /// The exception raised by the target, wrapped or not
    pub fn exception(&self) -> Option<&Exception> {
        match self {
            InvokeError::TargetInvocation(e) | InvokeError::Thrown(e) => Some(e),
            _ => None,
        }
    }
}

/// Invocation result
pub type InvokeResult<T> = Result<T, InvokeError>;

/// Heap allocation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HeapError {
    /// The configured heap limit would be exceeded
    #[error("Heap limit exceeded: {requested} bytes requested, {limit} byte limit")]
    LimitExceeded {
        /// Bytes requested (including header)
        requested: usize,
        /// Configured limit
        limit: usize,
    },

    /// The type cannot be instantiated on the heap
    #[error("Type '{0}' cannot be allocated")]
    NotAllocatable(String),

    /// No runtime type is registered for a Rust type
    #[error("No runtime type registered for Rust type {0}")]
    UnregisteredType(&'static str),

    /// Layout computation overflowed
    #[error("Allocation layout overflow for {0} bytes")]
    LayoutOverflow(usize),
}

/// Type and method definition errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    /// A type with this name already exists
    #[error("Type '{0}' is already registered")]
    DuplicateName(String),

    /// The Rust type is already registered under another name
    #[error("Rust type {0} is already registered")]
    DuplicateRustType(&'static str),

    /// Value type alignment exceeds what heap payloads guarantee
    #[error("Type '{name}' has unsupported alignment {align}")]
    UnsupportedAlignment {
        /// Type name
        name: String,
        /// Requested alignment
        align: usize,
    },

    /// Base type is not a class
    #[error("Type '{name}' cannot derive from non-class '{base}'")]
    InvalidBaseType {
        /// Type name
        name: String,
        /// Base type name
        base: String,
    },

    /// Field type cannot be stored in an instance
    #[error("Field '{field}' cannot have type '{type_name}'")]
    InvalidFieldType {
        /// Field name
        field: String,
        /// Field type name
        type_name: String,
    },

    /// Element type not valid for a derived type
    #[error("Cannot create {derived} type over '{type_name}'")]
    InvalidElementType {
        /// Derived type kind
        derived: &'static str,
        /// Element type name
        type_name: String,
    },

    /// Method definition is inconsistent
    #[error("Invalid method '{name}': {reason}")]
    InvalidMethod {
        /// Method name
        name: String,
        /// What is wrong
        reason: String,
    },
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document failed to parse
    #[error("Invalid invoke configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// An environment variable holds an unrecognized value
    #[error("Invalid value '{value}' for {key}: expected 1, 0, true or false")]
    InvalidEnvValue {
        /// Variable name
        key: String,
        /// Offending value
        value: String,
    },
}
