use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_yaml::Value as YamlValue;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::warn;

use super::date::DateCondition;
use crate::document::PropType;

/// One clause of a smart view, combined with everything before it by `rule`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawCondition")]
pub struct Condition {
    pub filter: Filter,
    pub rule: Rule,
}

impl Condition {
    pub fn is_placeholder(&self) -> bool {
        matches!(self.filter, Filter::Placeholder)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Label(BTreeSet<String>),
    CreationDate(DateCondition),
    UpdateDate(DateCondition),
    Prop(PropCondition),
    /// Nested query. Kept verbatim and never matches.
    Query(YamlValue),
    /// A known condition type whose value could not be read. Never matches.
    Malformed { kind: &'static str, value: YamlValue },
    /// Empty row of a query being edited.
    Placeholder,
}

impl Filter {
    pub fn type_name(&self) -> Option<&'static str> {
        match self {
            Filter::Label(_) => Some("label"),
            Filter::CreationDate(_) => Some("creation_date"),
            Filter::UpdateDate(_) => Some("update_date"),
            Filter::Prop(_) => Some("prop"),
            Filter::Query(_) => Some("query"),
            Filter::Malformed { kind, .. } => Some(*kind),
            Filter::Placeholder => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Rule {
    #[default]
    And,
    Or,
}

impl Rule {
    fn from_raw(raw: Option<&str>) -> Self {
        match raw {
            Some("or") => Rule::Or,
            _ => Rule::And,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropCondition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PropType,
    #[serde(rename = "subType", default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub value: YamlValue,
}

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("unknown condition type '{0}'")]
    UnknownType(String),
}

#[derive(Deserialize)]
struct RawCondition {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    value: YamlValue,
    #[serde(default)]
    rule: Option<String>,
}

impl TryFrom<RawCondition> for Condition {
    type Error = ConditionError;

    fn try_from(raw: RawCondition) -> Result<Self, Self::Error> {
        let rule = Rule::from_raw(raw.rule.as_deref());
        let value = raw.value;

        let filter = match raw.kind.as_deref() {
            None | Some("null") => Filter::Placeholder,
            Some("label") => typed_filter("label", value, Filter::Label),
            Some("creation_date") => typed_filter("creation_date", value, Filter::CreationDate),
            Some("update_date") => typed_filter("update_date", value, Filter::UpdateDate),
            Some("prop") => typed_filter("prop", value, Filter::Prop),
            Some("query") => Filter::Query(value),
            Some(other) => return Err(ConditionError::UnknownType(other.to_string())),
        };

        Ok(Condition { filter, rule })
    }
}

fn typed_filter<T>(kind: &'static str, value: YamlValue, wrap: impl FnOnce(T) -> Filter) -> Filter
where
    T: serde::de::DeserializeOwned,
{
    match serde_yaml::from_value(value.clone()) {
        Ok(typed) => wrap(typed),
        Err(e) => {
            warn!(kind, error = %e, "unreadable condition value, the condition will never match");
            Filter::Malformed { kind, value }
        }
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Condition", 3)?;
        state.serialize_field("type", &self.filter.type_name())?;
        match &self.filter {
            Filter::Label(tags) => state.serialize_field("value", tags)?,
            Filter::CreationDate(date) | Filter::UpdateDate(date) => {
                state.serialize_field("value", date)?
            }
            Filter::Prop(prop) => state.serialize_field("value", prop)?,
            Filter::Query(query) | Filter::Malformed { value: query, .. } => {
                state.serialize_field("value", query)?
            }
            Filter::Placeholder => state.serialize_field("value", &YamlValue::Null)?,
        }
        state.serialize_field("rule", &self.rule)?;
        state.end()
    }
}
