//! Policy document decoding and validation.

use std::fmt;
use std::str::FromStr;

use log::{debug, trace};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{PolicyParseError, PolicyParseResult};
use crate::json::{
    expect_object, json_type_name, optional_string, present, reject_unknown_keys, JsonDecode,
};
use crate::statement::Statement;

const DOCUMENT_KEYS: &[&str] = &["Version", "Id", "Statement"];

/// Policy grammar versions accepted in the `Version` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PolicyVersion {
    #[serde(rename = "2012-10-17")]
    V2012_10_17,
    #[serde(rename = "2008-10-17")]
    V2008_10_17,
}

impl PolicyVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V2012_10_17 => "2012-10-17",
            Self::V2008_10_17 => "2008-10-17",
        }
    }
}

impl FromStr for PolicyVersion {
    type Err = PolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "2012-10-17" => Ok(Self::V2012_10_17),
            "2008-10-17" => Ok(Self::V2008_10_17),
            other => Err(PolicyParseError::InvalidVersion(other.to_string())),
        }
    }
}

impl fmt::Display for PolicyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The document of a role policy: an optional version and id plus an ordered
/// list of statements.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PolicyDocument {
    #[serde(rename = "Version", skip_serializing_if = "Option::is_none")]
    version: Option<PolicyVersion>,
    #[serde(rename = "Id", skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(rename = "Statement", skip_serializing_if = "Option::is_none")]
    statements: Option<Vec<Statement>>,
}

impl PolicyDocument {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self {
            statements: Some(statements),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_version(self, version: PolicyVersion) -> Self {
        Self {
            version: Some(version),
            ..self
        }
    }

    #[must_use]
    pub fn with_id(self, id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..self
        }
    }

    pub fn version(&self) -> Option<PolicyVersion> {
        self.version
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The statements, or `None` for a document that was never decoded.
    pub fn statements(&self) -> Option<&[Statement]> {
        self.statements.as_deref()
    }

    /// Compare version, id and statements in order.
    ///
    /// An unset statement list only equals another unset list; it is not the
    /// same as an empty one. Statements are compared with [`Statement::equals`].
    pub fn equals(&self, other: &Self) -> bool {
        if self.version != other.version || self.id != other.id {
            return false;
        }
        match (&self.statements, &other.statements) {
            (Some(ours), Some(theirs)) => {
                ours.len() == theirs.len()
                    && ours.iter().zip(theirs).all(|(a, b)| a.equals(b))
            }
            (None, None) => true,
            _ => false,
        }
    }
}

impl JsonDecode for PolicyDocument {
    fn from_json_value(value: &Value) -> PolicyParseResult<Self> {
        let object = expect_object(value)?;
        reject_unknown_keys(object, DOCUMENT_KEYS)?;

        let statements = parse_statements(object)?;
        let version = optional_string(object, "Version")?;
        let id = optional_string(object, "Id")?;

        let version = version
            .as_deref()
            .map(str::parse::<PolicyVersion>)
            .transpose()?;
        let Some(statements) = statements else {
            return Err(PolicyParseError::MissingStatements);
        };

        debug!(
            "Decoded policy document (version={:?}, {} statements)",
            version.map(|v| v.as_str()),
            statements.len()
        );
        Ok(Self {
            version,
            id,
            statements: Some(statements),
        })
    }
}

fn parse_statements(object: &Map<String, Value>) -> PolicyParseResult<Option<Vec<Statement>>> {
    let Some(value) = present(object, "Statement") else {
        return Ok(None);
    };
    let Value::Array(items) = value else {
        return Err(PolicyParseError::InvalidFieldType {
            field: "Statement",
            expected: "array",
            found: json_type_name(value),
        });
    };

    let mut statements = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        trace!("Decoding statement {}", index);
        let statement = if item.is_null() {
            Statement::default()
        } else {
            Statement::from_json_value(item).map_err(|e| {
                debug!("Statement {} rejected: {}", index, e);
                PolicyParseError::statement(index, e)
            })?
        };
        statements.push(statement);
    }
    Ok(Some(statements))
}

impl fmt::Display for PolicyDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PolicyDocument{Version: ")?;
        match self.version {
            Some(version) => write!(f, "{}", version)?,
            None => f.write_str("nil")?,
        }
        write!(f, ", Id: {}, Statements: ", self.id.as_deref().unwrap_or("nil"))?;
        match &self.statements {
            None => f.write_str("nil}"),
            Some(statements) => {
                f.write_str("[")?;
                for (i, statement) in statements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", statement)?;
                }
                f.write_str("]}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::{Effect, Polarized, StringOrList};
    use rstest::rstest;

    const ONE_STATEMENT: &str = r#"[{"Effect":"Allow","NotPrincipal":{"AWS":["arn:aws:iam::123456789012:user/JohnDoe"]},"NotAction":"s3:ListBucket","Resource":["arn:aws:s3:::example-bucket"]}]"#;

    fn decode(data: &str) -> PolicyParseResult<PolicyDocument> {
        PolicyDocument::from_json_slice(data.as_bytes())
    }

    fn list_bucket(resource: &str) -> Statement {
        Statement::new(
            Effect::Allow,
            Polarized::Positive(StringOrList::Single("s3:ListBucket".to_string())),
            Polarized::Positive(StringOrList::Single(resource.to_string())),
        )
    }

    #[test]
    fn test_decode_statement_only() {
        let pd = decode(&format!(r#"{{"Statement":{ONE_STATEMENT}}}"#))
            .expect("document should decode");
        assert!(pd.version().is_none());
        assert!(pd.id().is_none());
        let statements = pd.statements().expect("statements are set");
        assert_eq!(statements.len(), 1);
        assert!(!statements[0].action().is_positive());
        assert!(statements[0].resource().is_positive());
    }

    #[test]
    fn test_decode_with_version_and_id() {
        let pd = decode(&format!(
            r#"{{"Version": "2008-10-17", "Id": "i2d", "Statement":{ONE_STATEMENT}}}"#
        ))
        .expect("document should decode");
        assert_eq!(pd.version(), Some(PolicyVersion::V2008_10_17));
        assert_eq!(pd.id(), Some("i2d"));
    }

    #[test]
    fn test_decode_empty_statement_list() {
        let pd = decode(r#"{"Version": "2012-10-17", "Id": "i2d", "Statement":[]}"#)
            .expect("document should decode");
        assert_eq!(pd.statements().map(<[Statement]>::len), Some(0));
        assert!(pd.equals(&PolicyDocument::new(vec![])
            .with_version(PolicyVersion::V2012_10_17)
            .with_id("i2d")));
    }

    #[test]
    fn test_null_statement_element_is_unset_statement() {
        let pd = decode(r#"{"Statement":[null]}"#).expect("document should decode");
        let statements = pd.statements().expect("statements are set");
        assert_eq!(statements.len(), 1);
        assert!(statements[0].effect().is_none());
        assert!(!statements[0].is_resource_wildcard());
    }

    #[rstest]
    #[case::no_statement_block(r#"{"Version":"2012-10-17","Id":"id"}"#, PolicyParseError::MissingStatements)]
    #[case::null_statement_block(r#"{"Statement":null}"#, PolicyParseError::MissingStatements)]
    #[case::wrong_version(
        r#"{"Version": "2012-10-18", "Id": "i2d", "Statement":[]}"#,
        PolicyParseError::InvalidVersion("2012-10-18".to_string())
    )]
    #[case::wrong_version_beats_missing_statements(
        r#"{"Version": "2004-10-17"}"#,
        PolicyParseError::InvalidVersion("2004-10-17".to_string())
    )]
    #[case::invalid_key(r#"{"invalid_key": "value"}"#, PolicyParseError::UnknownKey("invalid_key".to_string()))]
    #[case::lowercase_key(r#"{"statement": []}"#, PolicyParseError::UnknownKey("statement".to_string()))]
    #[case::version_not_string(
        r#"{"Version": 2012, "Statement":[]}"#,
        PolicyParseError::InvalidFieldType { field: "Version", expected: "string", found: "number" }
    )]
    #[case::id_not_string(
        r#"{"Id": {}, "Statement":[]}"#,
        PolicyParseError::InvalidFieldType { field: "Id", expected: "string", found: "object" }
    )]
    #[case::statement_not_array(
        r#"{"Statement":{"Effect":"Allow","Action":"s3:*","Resource":"*"}}"#,
        PolicyParseError::InvalidFieldType { field: "Statement", expected: "array", found: "object" }
    )]
    #[case::statement_error_beats_version_type(
        r#"{"Version": 1, "Statement":[{"Effect":"Allow"}]}"#,
        PolicyParseError::statement(0, PolicyParseError::MissingAction)
    )]
    #[case::not_an_object(r#""2012-10-17""#, PolicyParseError::ExpectedObject { found: "string" })]
    fn test_rejected_documents(#[case] data: &str, #[case] expected: PolicyParseError) {
        assert_eq!(decode(data).expect_err("document should be rejected"), expected);
    }

    #[test]
    fn test_first_failing_statement_is_reported() {
        let err = decode(
            r#"{"Version":"2012-10-17","Id":"id","Statement":[{"Effect":"Allow","Action":"s3:ListBucket","Resource":"*"},{"Action":"s3:ListBucket","Resource":"*"},{"Unwanted":1}]}"#,
        )
        .expect_err("document should be rejected");
        assert_eq!(err.statement_index(), Some(1));
        assert_eq!(err.root_cause(), &PolicyParseError::MissingOrInvalidEffect);
        assert_eq!(
            err.to_string(),
            "error unmarshalling a statement at index 1: effect is absent or a non-string"
        );
    }

    #[test]
    fn test_statement_element_not_object() {
        let err = decode(r#"{"Statement":[5]}"#).expect_err("document should be rejected");
        assert_eq!(
            err,
            PolicyParseError::statement(0, PolicyParseError::ExpectedObject { found: "number" })
        );
    }

    #[test]
    fn test_unmarshal_null_is_noop() {
        let original = PolicyDocument::new(vec![list_bucket("*")]).with_id("keep");
        let mut pd = original.clone();
        pd.unmarshal_json(b"null").expect("null should not fail");
        assert!(pd.equals(&original));
        assert_eq!(pd.id(), Some("keep"));
    }

    #[test]
    fn test_equals() {
        let a = PolicyDocument::new(vec![list_bucket("a"), list_bucket("b")])
            .with_version(PolicyVersion::V2012_10_17);
        assert!(a.equals(&a.clone()));

        let fewer = PolicyDocument::new(vec![list_bucket("a")]).with_version(PolicyVersion::V2012_10_17);
        assert!(!a.equals(&fewer));

        let different = PolicyDocument::new(vec![list_bucket("a"), list_bucket("c")])
            .with_version(PolicyVersion::V2012_10_17);
        assert!(!a.equals(&different));

        let other_version = PolicyDocument::new(vec![list_bucket("a"), list_bucket("b")])
            .with_version(PolicyVersion::V2008_10_17);
        assert!(!a.equals(&other_version));
    }

    #[test]
    fn test_equals_unset_statements_differ_from_empty() {
        let unset = PolicyDocument::default();
        let empty = PolicyDocument::new(vec![]);
        assert!(unset.equals(&PolicyDocument::default()));
        assert!(!unset.equals(&empty));
        assert!(!empty.equals(&unset));
    }

    #[test]
    fn test_display() {
        let pd = PolicyDocument::new(vec![]).with_version(PolicyVersion::V2012_10_17).with_id("id");
        assert_eq!(pd.to_string(), "PolicyDocument{Version: 2012-10-17, Id: id, Statements: []}");
        assert_eq!(
            PolicyDocument::default().to_string(),
            "PolicyDocument{Version: nil, Id: nil, Statements: nil}"
        );
    }

    #[test]
    fn test_serialize() {
        let pd = decode(r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Action":"s3:*","Resource":"*"}]}"#)
            .expect("document should decode");
        assert_eq!(
            serde_json::to_value(&pd).expect("serializes"),
            serde_json::json!({
                "Version": "2012-10-17",
                "Statement": [{"Effect": "Allow", "Action": "s3:*", "Resource": "*"}]
            })
        );
    }
}
