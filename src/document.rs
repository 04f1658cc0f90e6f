use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use std::collections::{BTreeSet, HashMap};

use crate::query::date::{deserialize_optional_timestamp, deserialize_timestamp};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub props: Option<HashMap<String, PropValue>>,
}

impl Document {
    pub fn prop(&self, name: &str) -> Option<&PropValue> {
        self.props.as_ref()?.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PropValue {
    #[serde(rename = "type")]
    pub kind: PropType,
    #[serde(rename = "subType", default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub data: YamlValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropType {
    Date,
    User,
    Number,
    String,
    Status,
    Json,
    #[serde(other)]
    Unknown,
}

/// The usable part of a property's `data`: a scalar, or an array with nulls removed.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand<'a> {
    Scalar(&'a YamlValue),
    List(Vec<&'a YamlValue>),
}

impl<'a> Operand<'a> {
    /// `None` for a null scalar or an array that is empty once nulls are dropped.
    pub fn from_data(data: &'a YamlValue) -> Option<Self> {
        match data {
            YamlValue::Null => None,
            YamlValue::Sequence(items) => {
                let items: Vec<&YamlValue> = items.iter().filter(|v| !v.is_null()).collect();
                if items.is_empty() {
                    None
                } else {
                    Some(Operand::List(items))
                }
            }
            other => Some(Operand::Scalar(other)),
        }
    }

    pub fn first(&self) -> Option<&'a YamlValue> {
        self.iter().next()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a YamlValue> + '_ {
        let items: &[&'a YamlValue] = match self {
            Operand::Scalar(v) => std::slice::from_ref(v),
            Operand::List(items) => items,
        };
        items.iter().copied()
    }
}
