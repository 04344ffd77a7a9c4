//! Error types for role policy decoding.
//!
//! Every rule of the policy grammar has its own variant so callers can match on
//! the exact reason a document was rejected. Errors raised inside a nested
//! layer are wrapped by the enclosing layer ([`PolicyParseError::StatementError`],
//! [`PolicyParseError::Policy`]); [`PolicyParseError::root_cause`] unwraps them.

use thiserror::Error;

/// Errors that can occur while decoding a role policy, a policy document or a statement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum PolicyParseError {
    /// The input bytes are not valid JSON.
    #[error("{0}")]
    MalformedInput(String),

    /// A JSON object was expected at this position.
    #[error("expected a JSON object, found {found}")]
    ExpectedObject { found: &'static str },

    /// An object carries a key outside the set allowed at its level.
    #[error("unknown key: {0}")]
    UnknownKey(String),

    /// A field holds a JSON value of the wrong type.
    #[error("cannot unmarshal {found} into field {field} of type {expected}")]
    InvalidFieldType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("sid is a non-string")]
    InvalidSid,

    #[error("effect is absent or a non-string")]
    MissingOrInvalidEffect,

    #[error("effect should be either \"Allow\" or \"Deny\", got \"{0}\"")]
    InvalidEffectValue(String),

    #[error("principal and not-principal value shouldn't exist within a single statement block")]
    ConflictingPrincipalKeys,

    #[error("principal value should be '*' or a map")]
    InvalidPrincipalValue,

    #[error("key in principal map should be one of the following: \"AWS\", \"Federated\", \"Service\", \"CanonicalUser\", got \"{0}\"")]
    InvalidPrincipalMapKey(String),

    #[error("value in principal map should be an array (key \"{0}\")")]
    InvalidPrincipalMapValue(String),

    #[error("value in principal map should be a []string (key \"{0}\")")]
    InvalidPrincipalMapElement(String),

    #[error("action and not-action shouldn't exist within a single statement block")]
    ConflictingActionKeys,

    #[error("action or not-action has to exist in a statement block")]
    MissingAction,

    #[error("action value should either be a string or a []string")]
    InvalidActionValue,

    #[error("action value should be a []string")]
    InvalidActionElement,

    #[error("resource and not-resource shouldn't exist within a single statement block")]
    ConflictingResourceKeys,

    #[error("resource or not-resource has to exist in a statement block")]
    MissingResource,

    #[error("resource value should either be a string or a []string")]
    InvalidResourceValue,

    #[error("resource value should be a []string")]
    InvalidResourceElement,

    /// `Version` is present but is not one of the two grammar versions.
    #[error("Version must be 2012-10-17 or 2008-10-17, got \"{0}\"")]
    InvalidVersion(String),

    #[error("Statements array is required")]
    MissingStatements,

    /// A statement of the `Statement` array failed validation.
    #[error("error unmarshalling a statement at index {index}: {source}")]
    StatementError {
        index: usize,
        #[source]
        source: Box<PolicyParseError>,
    },

    /// The `PolicyDocument` or `PolicyName` field of a role policy failed to decode.
    #[error("error unmarshalling a policy: {0}")]
    Policy(#[source] Box<PolicyParseError>),

    #[error("PolicyDocument is required")]
    MissingPolicyDocument,

    #[error("PolicyName is required")]
    MissingPolicyName,
}

impl PolicyParseError {
    pub(crate) fn statement(index: usize, source: Self) -> Self {
        Self::StatementError {
            index,
            source: Box::new(source),
        }
    }

    pub(crate) fn policy(source: Self) -> Self {
        Self::Policy(Box::new(source))
    }

    /// Innermost error, with all layer context stripped.
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::StatementError { source, .. } | Self::Policy(source) => source.root_cause(),
            other => other,
        }
    }

    /// Index of the failing statement, if the error originated inside one.
    pub fn statement_index(&self) -> Option<usize> {
        match self {
            Self::StatementError { index, .. } => Some(*index),
            Self::Policy(source) => source.statement_index(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for PolicyParseError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedInput(err.to_string())
    }
}

/// Result type for policy decoding.
pub type PolicyParseResult<T> = Result<T, PolicyParseError>;
