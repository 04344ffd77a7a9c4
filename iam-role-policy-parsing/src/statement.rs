//! Statement decoding and validation.
//!
//! A statement is one allow/deny rule of a policy document. Its principal,
//! action and resource fields can each be written in an affirmative form
//! (`Action`) or a negated form (`NotAction`); both forms in one statement is
//! an error. See the IAM grammar reference:
//! <https://docs.aws.amazon.com/IAM/latest/UserGuide/reference_policies_grammar.html>

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use log::trace;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{PolicyParseError, PolicyParseResult};
use crate::json::{expect_object, present, reject_unknown_keys, JsonDecode};

const STATEMENT_KEYS: &[&str] = &[
    "Sid",
    "Principal",
    "NotPrincipal",
    "Action",
    "NotAction",
    "Resource",
    "NotResource",
    "Effect",
    "Condition",
];

/// Whether a statement allows or denies what it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "Allow",
            Self::Deny => "Deny",
        }
    }
}

impl FromStr for Effect {
    type Err = PolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Allow" => Ok(Self::Allow),
            "Deny" => Ok(Self::Deny),
            other => Err(PolicyParseError::InvalidEffectValue(other.to_string())),
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keys allowed in a principal map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PrincipalKind {
    #[serde(rename = "AWS")]
    Aws,
    Federated,
    Service,
    CanonicalUser,
}

impl PrincipalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aws => "AWS",
            Self::Federated => "Federated",
            Self::Service => "Service",
            Self::CanonicalUser => "CanonicalUser",
        }
    }
}

impl FromStr for PrincipalKind {
    type Err = PolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AWS" => Ok(Self::Aws),
            "Federated" => Ok(Self::Federated),
            "Service" => Ok(Self::Service),
            "CanonicalUser" => Ok(Self::CanonicalUser),
            other => Err(PolicyParseError::InvalidPrincipalMapKey(other.to_string())),
        }
    }
}

/// Value of a `Principal` / `NotPrincipal` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrincipalValue {
    /// The literal `"*"`.
    Wildcard,
    /// Principal identifiers grouped by kind, e.g. `{"AWS": ["arn:aws:iam::123456789012:root"]}`.
    Map(BTreeMap<PrincipalKind, Vec<String>>),
}

impl Serialize for PrincipalValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Wildcard => serializer.serialize_str("*"),
            Self::Map(map) => map.serialize(serializer),
        }
    }
}

impl fmt::Display for PrincipalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard => f.write_str("*"),
            Self::Map(map) => {
                f.write_str("{")?;
                for (i, (kind, ids)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: [{}]", kind.as_str(), ids.join(", "))?;
                }
                f.write_str("}")
            }
        }
    }
}

/// A field that accepts either a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StringOrList {
    Single(String),
    List(Vec<String>),
}

impl StringOrList {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let items: &[String] = match self {
            Self::Single(s) => std::slice::from_ref(s),
            Self::List(list) => list,
        };
        items.iter().map(String::as_str)
    }
}

impl fmt::Display for StringOrList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(s) => f.write_str(s),
            Self::List(list) => write!(f, "[{}]", list.join(", ")),
        }
    }
}

/// A field that can appear in affirmative or negated form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Polarized<T> {
    /// Neither form was given.
    Unset,
    /// Built from the affirmative key (`Principal`, `Action`, `Resource`).
    Positive(T),
    /// Built from the negated key (`NotPrincipal`, `NotAction`, `NotResource`).
    Negative(T),
}

impl<T> Default for Polarized<T> {
    fn default() -> Self {
        Self::Unset
    }
}

impl<T> Polarized<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Unset => None,
            Self::Positive(value) | Self::Negative(value) => Some(value),
        }
    }

    pub fn is_set(&self) -> bool {
        !matches!(self, Self::Unset)
    }

    /// `true` only for the affirmative form; an unset slot reports `false`.
    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Positive(_))
    }

    fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Polarized<U>, E> {
        Ok(match self {
            Self::Unset => Polarized::Unset,
            Self::Positive(value) => Polarized::Positive(f(value)?),
            Self::Negative(value) => Polarized::Negative(f(value)?),
        })
    }
}

/// Key names and error kinds of a required string-or-list slot.
struct SlotRules {
    positive: &'static str,
    negative: &'static str,
    conflicting: PolicyParseError,
    missing: PolicyParseError,
    invalid_value: PolicyParseError,
    invalid_element: PolicyParseError,
}

const ACTION_RULES: SlotRules = SlotRules {
    positive: "Action",
    negative: "NotAction",
    conflicting: PolicyParseError::ConflictingActionKeys,
    missing: PolicyParseError::MissingAction,
    invalid_value: PolicyParseError::InvalidActionValue,
    invalid_element: PolicyParseError::InvalidActionElement,
};

const RESOURCE_RULES: SlotRules = SlotRules {
    positive: "Resource",
    negative: "NotResource",
    conflicting: PolicyParseError::ConflictingResourceKeys,
    missing: PolicyParseError::MissingResource,
    invalid_value: PolicyParseError::InvalidResourceValue,
    invalid_element: PolicyParseError::InvalidResourceElement,
};

/// A single statement of a policy document.
#[derive(Debug, Clone, Default)]
pub struct Statement {
    sid: Option<String>,
    effect: Option<Effect>,
    principal: Polarized<PrincipalValue>,
    action: Polarized<StringOrList>,
    resource: Polarized<StringOrList>,
    condition: Option<Value>,
}

impl Statement {
    /// Create a statement with the two required slots.
    pub fn new(
        effect: Effect,
        action: Polarized<StringOrList>,
        resource: Polarized<StringOrList>,
    ) -> Self {
        Self {
            effect: Some(effect),
            action,
            resource,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_sid(self, sid: impl Into<String>) -> Self {
        Self {
            sid: Some(sid.into()),
            ..self
        }
    }

    #[must_use]
    pub fn with_principal(self, principal: Polarized<PrincipalValue>) -> Self {
        Self { principal, ..self }
    }

    #[must_use]
    pub fn with_condition(self, condition: Value) -> Self {
        Self {
            condition: Some(condition),
            ..self
        }
    }

    pub fn sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    pub fn effect(&self) -> Option<Effect> {
        self.effect
    }

    pub fn principal(&self) -> &Polarized<PrincipalValue> {
        &self.principal
    }

    pub fn action(&self) -> &Polarized<StringOrList> {
        &self.action
    }

    pub fn resource(&self) -> &Polarized<StringOrList> {
        &self.resource
    }

    /// The raw `Condition` block, never validated.
    pub fn condition(&self) -> Option<&Value> {
        self.condition.as_ref()
    }

    /// Whether this statement targets every resource: `"Resource": "*"`.
    ///
    /// `["*"]` and `"NotResource": "*"` do not count.
    pub fn is_resource_wildcard(&self) -> bool {
        matches!(&self.resource, Polarized::Positive(StringOrList::Single(resource)) if resource == "*")
    }

    fn is_unset(&self) -> bool {
        self.sid.is_none()
            && self.effect.is_none()
            && !self.principal.is_set()
            && !self.action.is_set()
            && !self.resource.is_set()
            && self.condition.is_none()
    }

    /// Compare two statements, driven by which fields are set on `self`.
    ///
    /// Action, resource and condition values must be equal. `sid` and
    /// `effect` are only compared when set on `self`, and the polarity of each
    /// slot only when that slot is set on `self`. Principal values are not
    /// compared at all. The relation is therefore not symmetric.
    pub fn equals(&self, other: &Self) -> bool {
        self.action.value() == other.action.value()
            && self.resource.value() == other.resource.value()
            && self.condition == other.condition
            && self
                .sid
                .as_ref()
                .map_or(true, |sid| other.sid.as_ref() == Some(sid))
            && self.effect.map_or(true, |effect| other.effect == Some(effect))
            && (!self.resource.is_set() || self.resource.is_positive() == other.resource.is_positive())
            && (!self.action.is_set() || self.action.is_positive() == other.action.is_positive())
            && (!self.principal.is_set()
                || self.principal.is_positive() == other.principal.is_positive())
    }
}

impl JsonDecode for Statement {
    fn from_json_value(value: &Value) -> PolicyParseResult<Self> {
        let object = expect_object(value)?;
        reject_unknown_keys(object, STATEMENT_KEYS)?;

        let sid = parse_sid(object)?;
        let effect = parse_effect(object)?;
        let principal = parse_principal(object)?;
        let action = parse_string_or_list_slot(object, &ACTION_RULES)?;
        let resource = parse_string_or_list_slot(object, &RESOURCE_RULES)?;
        let condition = present(object, "Condition").cloned();

        let statement = Self {
            sid,
            effect: Some(effect),
            principal,
            action,
            resource,
            condition,
        };
        trace!(
            "Decoded statement sid={:?} effect={} resource_wildcard={}",
            statement.sid,
            effect,
            statement.is_resource_wildcard()
        );
        Ok(statement)
    }
}

fn parse_sid(object: &Map<String, Value>) -> PolicyParseResult<Option<String>> {
    match present(object, "Sid") {
        None => Ok(None),
        Some(Value::String(sid)) => Ok(Some(sid.clone())),
        Some(_) => Err(PolicyParseError::InvalidSid),
    }
}

fn parse_effect(object: &Map<String, Value>) -> PolicyParseResult<Effect> {
    match present(object, "Effect") {
        Some(Value::String(effect)) => effect.parse(),
        _ => Err(PolicyParseError::MissingOrInvalidEffect),
    }
}

/// Pick the affirmative or negated form of a slot, rejecting both at once.
fn resolve_slot<'a>(
    object: &'a Map<String, Value>,
    positive: &str,
    negative: &str,
    conflicting: &PolicyParseError,
) -> PolicyParseResult<Polarized<&'a Value>> {
    match (present(object, positive), present(object, negative)) {
        (Some(_), Some(_)) => Err(conflicting.clone()),
        (Some(value), None) => Ok(Polarized::Positive(value)),
        (None, Some(value)) => Ok(Polarized::Negative(value)),
        (None, None) => Ok(Polarized::Unset),
    }
}

fn parse_principal(object: &Map<String, Value>) -> PolicyParseResult<Polarized<PrincipalValue>> {
    resolve_slot(
        object,
        "Principal",
        "NotPrincipal",
        &PolicyParseError::ConflictingPrincipalKeys,
    )?
    .try_map(parse_principal_value)
}

fn parse_principal_value(value: &Value) -> PolicyParseResult<PrincipalValue> {
    match value {
        Value::String(s) if s == "*" => Ok(PrincipalValue::Wildcard),
        Value::Object(map) => {
            let mut principals = BTreeMap::new();
            for (key, ids) in map {
                let kind: PrincipalKind = key.parse()?;
                let Value::Array(items) = ids else {
                    return Err(PolicyParseError::InvalidPrincipalMapValue(key.clone()));
                };
                let ids = items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| PolicyParseError::InvalidPrincipalMapElement(key.clone()))
                    })
                    .collect::<PolicyParseResult<Vec<_>>>()?;
                principals.insert(kind, ids);
            }
            Ok(PrincipalValue::Map(principals))
        }
        _ => Err(PolicyParseError::InvalidPrincipalValue),
    }
}

fn parse_string_or_list_slot(
    object: &Map<String, Value>,
    rules: &SlotRules,
) -> PolicyParseResult<Polarized<StringOrList>> {
    let slot = resolve_slot(object, rules.positive, rules.negative, &rules.conflicting)?;
    if !slot.is_set() {
        return Err(rules.missing.clone());
    }
    let slot = slot.try_map(|value| parse_string_or_list(value, rules))?;
    trace!(
        "Resolved {} slot (positive={})",
        rules.positive,
        slot.is_positive()
    );
    Ok(slot)
}

fn parse_string_or_list(value: &Value, rules: &SlotRules) -> PolicyParseResult<StringOrList> {
    match value {
        Value::String(s) => Ok(StringOrList::Single(s.clone())),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| rules.invalid_element.clone())
            })
            .collect::<PolicyParseResult<Vec<_>>>()
            .map(StringOrList::List),
        _ => Err(rules.invalid_value.clone()),
    }
}

fn serialize_slot<M: SerializeMap, T: Serialize>(
    map: &mut M,
    slot: &Polarized<T>,
    positive: &str,
    negative: &str,
) -> Result<(), M::Error> {
    match slot {
        Polarized::Unset => Ok(()),
        Polarized::Positive(value) => map.serialize_entry(positive, value),
        Polarized::Negative(value) => map.serialize_entry(negative, value),
    }
}

impl Serialize for Statement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // An unset statement comes from a `null` array element; write it back as `null`.
        if self.is_unset() {
            return serializer.serialize_none();
        }
        let mut map = serializer.serialize_map(None)?;
        if let Some(sid) = &self.sid {
            map.serialize_entry("Sid", sid)?;
        }
        if let Some(effect) = &self.effect {
            map.serialize_entry("Effect", effect)?;
        }
        serialize_slot(&mut map, &self.principal, "Principal", "NotPrincipal")?;
        serialize_slot(&mut map, &self.action, "Action", "NotAction")?;
        serialize_slot(&mut map, &self.resource, "Resource", "NotResource")?;
        if let Some(condition) = &self.condition {
            map.serialize_entry("Condition", condition)?;
        }
        map.end()
    }
}

fn fmt_slot<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    slot: &Polarized<T>,
    positive: &str,
    negative: &str,
) -> fmt::Result {
    match slot {
        Polarized::Unset => write!(f, "{}: nil", positive),
        Polarized::Positive(value) => write!(f, "{}: {}", positive, value),
        Polarized::Negative(value) => write!(f, "{}: {}", negative, value),
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Statement{{Sid: {}, ", self.sid.as_deref().unwrap_or("nil"))?;
        match self.effect {
            Some(effect) => write!(f, "Effect: {}, ", effect)?,
            None => f.write_str("Effect: nil, ")?,
        }
        fmt_slot(f, &self.principal, "Principal", "NotPrincipal")?;
        f.write_str(", ")?;
        fmt_slot(f, &self.action, "Action", "NotAction")?;
        f.write_str(", ")?;
        fmt_slot(f, &self.resource, "Resource", "NotResource")?;
        match &self.condition {
            Some(condition) => write!(f, ", Condition: {}}}", condition),
            None => f.write_str(", Condition: nil}"),
        }
    }
}
