use chrono::{DateTime, TimeZone};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value as YamlValue;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::LoadError;
use crate::query::{Condition, QueryMatcher};

/// A saved, named condition list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmartView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "conditions_or_empty")]
    pub conditions: Vec<Condition>,
}

impl SmartView {
    /// The view as it is stored: placeholder rows left over from editing are dropped.
    pub fn persisted(&self) -> SmartView {
        SmartView {
            id: self.id.clone(),
            name: self.name.clone(),
            conditions: self
                .conditions
                .iter()
                .filter(|c| !c.is_placeholder())
                .cloned()
                .collect(),
        }
    }

    pub fn matcher<Tz: TimeZone>(&self, now: DateTime<Tz>) -> QueryMatcher<Tz> {
        QueryMatcher::new(self.conditions.clone(), now)
    }
}

// Anything but a list is a view that matches nothing.
fn conditions_or_empty<'de, D>(deserializer: D) -> Result<Vec<Condition>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = YamlValue::deserialize(deserializer)?;
    if !value.is_sequence() {
        return Ok(Vec::new());
    }
    serde_yaml::from_value(value).map_err(D::Error::custom)
}

/// Parses a view file: either a view object or a bare condition list.
pub fn parse_view(content: &str) -> Result<SmartView, serde_yaml::Error> {
    let value: YamlValue = serde_yaml::from_str(content)?;
    if value.is_sequence() {
        return Ok(SmartView {
            conditions: serde_yaml::from_value(value)?,
            ..SmartView::default()
        });
    }
    serde_yaml::from_value(value)
}

pub fn load_view(path: &Path) -> Result<SmartView, LoadError> {
    let content = fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
    let view = parse_view(&content).map_err(|e| LoadError::parse(path, e))?;
    debug!(
        path = %path.display(),
        name = %view.name,
        conditions = view.conditions.len(),
        "loaded smart view"
    );
    Ok(view)
}
