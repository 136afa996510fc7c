//! Error types and diagnostics for irbind
//!
//! Every failure the safety layer detects is reported through one of three
//! families, each carrying stable `miette` diagnostic codes:
//!
//! - [`MemoryError`]: a handle was used after it, or one of its ancestors,
//!   was freed (use-after-free).
//! - [`ScopeError`]: a manager was driven through an illegal state
//!   transition (invalid operation).
//! - [`GuardError`]: an accessor was called on a handle of the wrong kind or
//!   with arguments the native library would abort on (precondition
//!   violation).
//!
//! None of these ever reach the native library.

use crate::handle::ObjectKind;
use crate::manager::ScopeState;
use miette::Diagnostic;
use thiserror::Error;

/// Alias for Result type with irbind errors
pub type BindResult<T> = std::result::Result<T, BindError>;

/// Top-level error for every fallible irbind operation
#[derive(Error, Debug)]
pub enum BindError {
    /// Use-after-free family
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// Manager misuse family
    #[error(transparent)]
    Scope(#[from] ScopeError),

    /// Type-confusion and argument guard family
    #[error(transparent)]
    Guard(#[from] GuardError),
}

// Manual implementation of Diagnostic for BindError to properly delegate
impl Diagnostic for BindError {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        match self {
            BindError::Memory(e) => e.code(),
            BindError::Scope(e) => e.code(),
            BindError::Guard(e) => e.code(),
        }
    }

    fn severity(&self) -> Option<miette::Severity> {
        match self {
            BindError::Memory(e) => e.severity(),
            BindError::Scope(e) => e.severity(),
            BindError::Guard(e) => e.severity(),
        }
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        match self {
            BindError::Memory(e) => e.help(),
            BindError::Scope(e) => e.help(),
            BindError::Guard(e) => e.help(),
        }
    }

    fn url<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        match self {
            BindError::Memory(e) => e.url(),
            BindError::Scope(e) => e.url(),
            BindError::Guard(e) => e.url(),
        }
    }
}

impl BindError {
    /// True for errors raised by a validity check.
    pub fn is_use_after_free(&self) -> bool {
        matches!(self, BindError::Memory(_))
    }

    /// True for errors raised by an illegal manager transition.
    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, BindError::Scope(_))
    }

    /// True for errors raised by a kind or argument guard.
    pub fn is_precondition_violation(&self) -> bool {
        matches!(self, BindError::Guard(_))
    }
}

// ============================================================================
// Memory Errors (E0001-E0099)
// ============================================================================

/// Use of a handle whose native object is gone
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The native library handed back a null pointer
    #[error("null {kind} handle")]
    #[diagnostic(
        code(irbind_mem_E0001),
        help("The native call that produced this {kind} returned nothing")
    )]
    NullHandle { kind: ObjectKind },

    /// The handle itself was disposed
    #[error("{kind} used after it was disposed")]
    #[diagnostic(
        code(irbind_mem_E0002),
        help("Keep the {kind} alive (inside its scope) for as long as it is used")
    )]
    Disposed { kind: ObjectKind },

    /// An owner up the chain was disposed, which freed this object with it
    #[error("{kind} used after its {ancestor} was disposed")]
    #[diagnostic(
        code(irbind_mem_E0003),
        help("Disposing a {ancestor} frees everything created inside it")
    )]
    AncestorDisposed {
        kind: ObjectKind,
        ancestor: ObjectKind,
    },
}

// ============================================================================
// Scope Errors (E0101-E0199)
// ============================================================================

/// Illegal transition of a resource manager
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// `enter` on a manager that is already entered
    #[error("{kind} manager already entered")]
    #[diagnostic(
        code(irbind_scope_E0101),
        help("Each manager hands out its {kind} exactly once; create a new manager")
    )]
    AlreadyEntered { kind: ObjectKind },

    /// `exit` on a manager that was never entered
    #[error("{kind} manager not entered")]
    #[diagnostic(code(irbind_scope_E0102), help("Call enter() before exit()"))]
    NotEntered { kind: ObjectKind },

    /// Any transition out of the disposed state
    #[error("{kind} manager already disposed (attempted {attempted})")]
    #[diagnostic(
        code(irbind_scope_E0103),
        help("A disposed manager has no further transitions")
    )]
    AlreadyDisposed {
        kind: ObjectKind,
        attempted: &'static str,
    },

    /// `dispose` while a scope is still open
    #[error("cannot dispose {kind} manager while entered (state: {state})")]
    #[diagnostic(
        code(irbind_scope_E0104),
        help("Leave the scope with exit() instead")
    )]
    DisposeWhileEntered { kind: ObjectKind, state: ScopeState },

    /// Disposal of the process-wide context was rejected
    #[error("the global context cannot be disposed")]
    #[diagnostic(
        code(irbind_scope_E0105),
        help("Set `global_dispose` to `ignore` to turn this into a no-op")
    )]
    GlobalContext,
}

// ============================================================================
// Guard Errors (E0201-E0299)
// ============================================================================

/// A precondition the native library would abort on
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    /// Accessor called on the wrong kind of value
    #[error("{op} requires {expected}, but the value is {actual}")]
    #[diagnostic(code(irbind_guard_E0201))]
    WrongValueKind {
        op: &'static str,
        expected: String,
        actual: String,
    },

    /// Accessor called on the wrong kind of type
    #[error("{op} requires {expected} type, but the type is {actual}")]
    #[diagnostic(code(irbind_guard_E0202))]
    WrongTypeKind {
        op: &'static str,
        expected: String,
        actual: String,
    },

    /// Index past the end of an operand/parameter/element list
    #[error("{op}: index {index} out of range (length {len})")]
    #[diagnostic(code(irbind_guard_E0203))]
    IndexOutOfRange {
        op: &'static str,
        index: u32,
        len: u32,
    },

    /// Instruction construction without an insertion point
    #[error("{op}: builder is not positioned at a basic block")]
    #[diagnostic(
        code(irbind_guard_E0204),
        help("Call position_at_end() first")
    )]
    NotPositioned { op: &'static str },

    /// Operands that do not fit together
    #[error("{op}: {detail}")]
    #[diagnostic(code(irbind_guard_E0205))]
    Mismatch { op: &'static str, detail: String },

    /// Integer width outside what the library supports
    #[error("invalid integer bit width {bits}")]
    #[diagnostic(
        code(irbind_guard_E0206),
        help("Integer widths must be between 1 and 8388608 bits")
    )]
    InvalidWidth { bits: u32 },
}

impl GuardError {
    pub(crate) fn mismatch(op: &'static str, detail: impl Into<String>) -> Self {
        GuardError::Mismatch {
            op,
            detail: detail.into(),
        }
    }
}
