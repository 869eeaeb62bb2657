//! Error types for the Quarry system.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.

use std::fmt;

use thiserror::Error;

use crate::entity::EntityId;

/// The main error type for Quarry operations.
#[derive(Debug, Error)]
#[error("{kind}{}", fmt_context(.context.as_ref()))]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Records the index of the term being compiled when the error was raised.
    #[must_use]
    pub fn at_term(self, term: usize) -> Self {
        let context = self.context.clone().unwrap_or_default().with_term(term);
        self.with_context(context)
    }

    /// Creates an entity not found error.
    #[must_use]
    pub fn entity_not_found(id: EntityId) -> Self {
        Self::new(ErrorKind::EntityNotFound(id))
    }

    /// Creates a stale entity reference error.
    #[must_use]
    pub fn stale_entity(id: EntityId) -> Self {
        Self::new(ErrorKind::StaleEntity(id))
    }

    /// Creates an unknown variable error (compile time).
    #[must_use]
    pub fn unknown_variable(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownVariable(name.into()))
    }

    /// Creates a variable not found error (iterator setup).
    #[must_use]
    pub fn variable_not_found(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::VariableNotFound(name.into()))
    }

    /// Creates an unwritten operand error.
    #[must_use]
    pub fn unwritten_operand(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnwrittenOperand(name.into()))
    }

    /// Creates an invalid term error.
    #[must_use]
    pub fn invalid_term(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidTerm(reason.into()))
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(message.into()))
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    /// Entity was not found in storage.
    #[error("entity not found: {0:?}")]
    EntityNotFound(EntityId),

    /// Entity reference is stale (generation mismatch).
    #[error("stale entity reference: {0:?}")]
    StaleEntity(EntityId),

    /// A name is already taken in the given scope.
    #[error("duplicate name in scope: {0}")]
    DuplicateName(String),

    /// A term requires a variable that no term ever introduces.
    #[error("unknown variable: ${0}")]
    UnknownVariable(String),

    /// A variable looked up on a compiled rule or iterator does not exist.
    #[error("variable not found: {0}")]
    VariableNotFound(String),

    /// The right-hand side of an equality predicate is never written before it is read.
    #[error("operand ${0} is not written before it is compared")]
    UnwrittenOperand(String),

    /// An inequality or name predicate compares a variable nothing binds.
    #[error("predicate on ${0} has no prior term constraining it")]
    UnconstrainedPredicate(String),

    /// A relationship used for traversal does not carry the traversable property.
    #[error("relationship {0:?} cannot be used for traversal")]
    NotTraversable(EntityId),

    /// A lookup variable's base variable is never written.
    #[error("lookup variable ${0} depends on an unwritten base")]
    UnresolvedLookup(String),

    /// More variables than a rule can track.
    #[error("too many variables: limit is {limit}")]
    TooManyVariables {
        /// The configured limit.
        limit: usize,
    },

    /// A term whose shape cannot be compiled.
    #[error("invalid term: {0}")]
    InvalidTerm(String),

    /// Operators that cannot be combined in one chain.
    #[error("invalid operator: {0}")]
    InvalidOperator(String),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Index of the offending term.
    pub term: Option<usize>,
    /// Free-form note, such as the rule being compiled.
    pub note: Option<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the term index.
    #[must_use]
    pub fn with_term(mut self, term: usize) -> Self {
        self.term = Some(term);
        self
    }

    /// Sets the note.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.term, &self.note) {
            (Some(t), Some(n)) => write!(f, "term {t}: {n}"),
            (Some(t), None) => write!(f, "term {t}"),
            (None, Some(n)) => write!(f, "{n}"),
            (None, None) => Ok(()),
        }
    }
}

fn fmt_context(context: Option<&ErrorContext>) -> String {
    context.map(|c| format!(" ({c})")).unwrap_or_default()
}

/// Result type alias using the Quarry error.
pub type Result<T> = std::result::Result<T, Error>;
