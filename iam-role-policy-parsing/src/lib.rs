//! This crate provides strict decoding of IAM role policies:
//! - Statement validation (unknown keys, exclusive `Not…` pairs, value shapes)
//! - Policy document validation (version, statement list)
//! - Role policy validation and the wildcard-resource query
//!
//! ```
//! use iam_role_policy_parsing::parse_role_policy;
//!
//! let policy = parse_role_policy(br#"{
//!     "PolicyName": "read-everything",
//!     "PolicyDocument": {
//!         "Version": "2012-10-17",
//!         "Statement": [{"Effect": "Allow", "Action": "s3:GetObject", "Resource": "*"}]
//!     }
//! }"#).expect("valid policy");
//! assert!(policy.has_wildcard_resource_statement());
//! ```

mod error;
mod json;
mod policy_document;
mod role_policy;
mod statement;

// Re-exports for a small, focused public API
pub use error::{PolicyParseError, PolicyParseResult};
pub use json::JsonDecode;
pub use policy_document::{PolicyDocument, PolicyVersion};
pub use role_policy::{parse_role_policy, RolePolicy};
pub use statement::{Effect, Polarized, PrincipalKind, PrincipalValue, Statement, StringOrList};
