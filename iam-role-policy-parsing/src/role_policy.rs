//! Role policy decoding (the root of the grammar) and the wildcard query.

use std::fmt;

use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::error::{PolicyParseError, PolicyParseResult};
use crate::json::{expect_object, optional_string, present, reject_unknown_keys, JsonDecode};
use crate::policy_document::PolicyDocument;

const ROLE_POLICY_KEYS: &[&str] = &["PolicyDocument", "PolicyName"];

/// An inline policy attached to an IAM role.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RolePolicy {
    #[serde(rename = "PolicyDocument", skip_serializing_if = "Option::is_none")]
    policy_document: Option<PolicyDocument>,
    #[serde(rename = "PolicyName", skip_serializing_if = "Option::is_none")]
    policy_name: Option<String>,
}

impl RolePolicy {
    pub fn new(policy_name: impl Into<String>, policy_document: PolicyDocument) -> Self {
        Self {
            policy_document: Some(policy_document),
            policy_name: Some(policy_name.into()),
        }
    }

    pub fn policy_document(&self) -> Option<&PolicyDocument> {
        self.policy_document.as_ref()
    }

    pub fn policy_name(&self) -> Option<&str> {
        self.policy_name.as_deref()
    }

    /// Returns whether any statement of the document has `"Resource": "*"`.
    ///
    /// See [`crate::Statement::is_resource_wildcard`]. A policy without
    /// statements answers `false`.
    pub fn has_wildcard_resource_statement(&self) -> bool {
        self.policy_document
            .as_ref()
            .and_then(PolicyDocument::statements)
            .is_some_and(|statements| statements.iter().any(|s| s.is_resource_wildcard()))
    }

    /// Compare policy names by value and documents with [`PolicyDocument::equals`].
    pub fn equals(&self, other: &Self) -> bool {
        self.policy_name == other.policy_name
            && match (&self.policy_document, &other.policy_document) {
                (Some(ours), Some(theirs)) => ours.equals(theirs),
                (None, None) => true,
                _ => false,
            }
    }
}

impl JsonDecode for RolePolicy {
    fn from_json_value(value: &Value) -> PolicyParseResult<Self> {
        let object = expect_object(value)?;
        reject_unknown_keys(object, ROLE_POLICY_KEYS)?;

        let policy_document = present(object, "PolicyDocument")
            .map(PolicyDocument::from_json_value)
            .transpose()
            .map_err(PolicyParseError::policy)?;
        let policy_name =
            optional_string(object, "PolicyName").map_err(PolicyParseError::policy)?;

        let Some(policy_document) = policy_document else {
            return Err(PolicyParseError::MissingPolicyDocument);
        };
        let Some(policy_name) = policy_name else {
            return Err(PolicyParseError::MissingPolicyName);
        };

        debug!("Decoded role policy '{}'", policy_name);
        Ok(Self {
            policy_document: Some(policy_document),
            policy_name: Some(policy_name),
        })
    }
}

impl fmt::Display for RolePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RolePolicy{PolicyDocument: ")?;
        match &self.policy_document {
            Some(document) => write!(f, "{}", document)?,
            None => f.write_str("nil")?,
        }
        write!(
            f,
            ", PolicyName: {}}}",
            self.policy_name.as_deref().unwrap_or("nil")
        )
    }
}

/// Decode and validate a role policy from raw JSON bytes.
pub fn parse_role_policy(data: &[u8]) -> PolicyParseResult<RolePolicy> {
    let policy = RolePolicy::from_json_slice(data);
    if let Err(e) = &policy {
        debug!("Role policy rejected: {}", e);
    }
    policy
}
