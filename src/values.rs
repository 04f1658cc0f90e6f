use serde_yaml::Value as YamlValue;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::document::{Document, Operand, PropType};
use crate::query::date::parse_timestamp;

/// Occurrences of each value of `property`, keyed by its display form.
pub fn collect_values(documents: &[Document], property: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();

    for prop in documents.iter().filter_map(|doc| doc.prop(property)) {
        let Some(operand) = Operand::from_data(&prop.data) else {
            continue;
        };
        for key in operand.iter().filter_map(|v| display_key(prop.kind, v)) {
            *counts.entry(key).or_insert(0) += 1;
        }
    }

    counts
}

/// Value order, or most frequent first with ties in value order.
pub fn format_values(counts: BTreeMap<String, usize>, show_count: bool) -> Vec<String> {
    if !show_count {
        return counts.into_keys().collect();
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by_key(|(_, count)| Reverse(*count));
    ranked
        .into_iter()
        .map(|(value, count)| format!("{value}: {count}"))
        .collect()
}

// dates collapse to their UTC day so one day's entries share a line
fn display_key(kind: PropType, v: &YamlValue) -> Option<String> {
    if kind == PropType::Date {
        return parse_timestamp(v).map(|t| t.format("%Y-%m-%d").to_string());
    }
    match v {
        YamlValue::String(s) if !s.is_empty() => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
