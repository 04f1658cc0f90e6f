use chrono::{DateTime, Local, TimeZone};
use serde_yaml::Value as YamlValue;
use std::collections::BTreeSet;

use super::ast::{Condition, Filter, PropCondition, Rule};
use super::date::{parse_timestamp, DateCondition};
use crate::document::{Document, Operand, PropType};

/// Evaluates an ordered condition list against documents.
///
/// `now` fixes both the reference instant for relative dates and the time zone
/// used to localize every date, so a matcher gives the same verdict for the
/// same document no matter how often it is called.
#[derive(Debug, Clone)]
pub struct QueryMatcher<Tz: TimeZone> {
    conditions: Vec<Condition>,
    now: DateTime<Tz>,
}

impl<Tz: TimeZone> QueryMatcher<Tz> {
    pub fn new(conditions: Vec<Condition>, now: DateTime<Tz>) -> Self {
        Self { conditions, now }
    }

    /// Left-to-right fold; the first evaluated verdict seeds the accumulator.
    /// A list with nothing to evaluate matches no document.
    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions
            .iter()
            .filter(|c| !c.is_placeholder())
            .fold(None, |acc, condition| {
                let verdict = self.validate(doc, &condition.filter);
                Some(match (acc, condition.rule) {
                    (None, _) => verdict,
                    (Some(prev), Rule::Or) => prev || verdict,
                    (Some(prev), Rule::And) => prev && verdict,
                })
            })
            .unwrap_or(false)
    }

    fn validate(&self, doc: &Document, filter: &Filter) -> bool {
        match filter {
            Filter::Label(tags) => match_label(doc, tags),
            Filter::CreationDate(cond) => cond.matches(&doc.created_at, &self.now),
            Filter::UpdateDate(cond) => match &doc.updated_at {
                Some(updated) => cond.matches(updated, &self.now),
                None => false,
            },
            Filter::Prop(cond) => self.match_prop(doc, cond),
            Filter::Query(_) => false,
            Filter::Malformed { .. } | Filter::Placeholder => false,
        }
    }

    fn match_prop(&self, doc: &Document, cond: &PropCondition) -> bool {
        let Some(prop) = doc.prop(&cond.name) else {
            return false;
        };
        if prop.kind != cond.kind {
            return false;
        }
        let Some(operand) = Operand::from_data(&prop.data) else {
            return false;
        };

        match cond.kind {
            PropType::Date => {
                let Ok(date_cond) = serde_yaml::from_value::<DateCondition>(cond.value.clone())
                else {
                    return false;
                };
                operand
                    .first()
                    .and_then(parse_timestamp)
                    .map_or(false, |target| date_cond.matches(&target, &self.now))
            }
            PropType::User => match &cond.value {
                YamlValue::Sequence(wanted) => wanted
                    .iter()
                    .any(|id| equals_or_contains(&operand, id, same_id)),
                id => equals_or_contains(&operand, id, same_id),
            },
            PropType::Number => {
                let Some(wanted) = yaml_to_number(&cond.value) else {
                    return false;
                };
                equals_or_contains(&operand, &wanted, |v, n| v.as_f64() == Some(*n))
            }
            PropType::String => {
                let Some(wanted) = yaml_to_string(&cond.value) else {
                    return false;
                };
                equals_or_contains(&operand, wanted.as_str(), |v, s| v.as_str() == Some(s))
            }
            // time periods are stored as json and are not evaluated yet
            PropType::Json => false,
            PropType::Status | PropType::Unknown => false,
        }
    }
}

/// Builds a predicate localized to the system time zone, with "now" taken once here.
pub fn build_query_matcher(conditions: Vec<Condition>) -> impl Fn(&Document) -> bool + Send + Sync {
    let matcher = QueryMatcher::new(conditions, Local::now());
    move |doc: &Document| matcher.matches(doc)
}

fn match_label(doc: &Document, tags: &BTreeSet<String>) -> bool {
    if doc.tags.is_empty() {
        return false;
    }
    doc.tags.iter().any(|tag| tags.contains(tag))
}

/// True if `cmp(left, right)` holds for the scalar, or for any element of the list.
pub fn equals_or_contains<R: ?Sized>(
    left: &Operand<'_>,
    right: &R,
    cmp: impl Fn(&YamlValue, &R) -> bool,
) -> bool {
    match left {
        Operand::Scalar(v) => cmp(v, right),
        Operand::List(items) => items.iter().any(|v| cmp(v, right)),
    }
}

// ids are strings; `1` and `"1"` are different users
fn same_id(stored: &YamlValue, wanted: &YamlValue) -> bool {
    match (stored.as_str(), wanted.as_str()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn yaml_to_string(v: &YamlValue) -> Option<String> {
    match v {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn yaml_to_number(v: &YamlValue) -> Option<f64> {
    match v {
        YamlValue::Number(n) => n.as_f64(),
        YamlValue::String(s) => s.trim().parse().ok(),
        YamlValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::date::parse_timestamp_str;
    use chrono::{Duration, Utc};
    use serde_yaml::from_str;

    fn now() -> DateTime<Utc> {
        parse_timestamp_str("2024-03-10T12:00:00Z").unwrap()
    }

    fn doc(yaml: &str) -> Document {
        from_str(yaml).unwrap()
    }

    fn conditions(yaml: &str) -> Vec<Condition> {
        from_str(yaml).unwrap()
    }

    fn matches(conds: &str, document: &Document) -> bool {
        QueryMatcher::new(conditions(conds), now()).matches(document)
    }

    fn tagged(tags: &str, created: &str) -> Document {
        doc(&format!("id: d\ncreatedAt: {}\ntags: {}", created, tags))
    }

    #[test]
    fn test_label_intersection() {
        let d = tagged("[t1, t2]", "2024-01-01");
        assert!(matches("- {type: label, value: [t2, t3]}", &d));
        assert!(!matches("- {type: label, value: [t4]}", &d));
    }

    #[test]
    fn test_label_without_tags() {
        let d = tagged("[]", "2024-01-01");
        assert!(!matches("- {type: label, value: [t1]}", &d));
    }

    #[test]
    fn test_creation_date_relative() {
        let conds = "- {type: creation_date, value: {type: relative, period: 86400}}";
        let created_now = tagged("[]", "2024-03-10T12:00:00Z");
        let created_later = tagged("[]", "2024-03-12T12:00:00Z");
        assert!(!matches(conds, &created_now));
        assert!(matches(conds, &created_later));
    }

    #[test]
    fn test_creation_date_between() {
        let conds = "- {type: creation_date, value: {type: between, from: 2024-01-01, to: 2024-01-31}}";
        assert!(matches(conds, &tagged("[]", "2024-01-15")));
        assert!(!matches(conds, &tagged("[]", "2024-02-01")));
    }

    #[test]
    fn test_update_date_missing() {
        let conds = "- {type: update_date, value: {type: after, date: 2000-01-01}}";
        let never_updated = doc("id: d\ncreatedAt: 2024-01-01\nupdatedAt: null");
        let updated = doc("id: d\ncreatedAt: 2024-01-01\nupdatedAt: 2024-02-01");
        assert!(!matches(conds, &never_updated));
        assert!(matches(conds, &updated));
    }

    #[test]
    fn test_fold_or_then_and() {
        let d = tagged("[t1]", "2024-03-09T08:00:00Z");
        let or = r#"
- {type: label, value: [t1], rule: and}
- {type: creation_date, value: {type: relative, period: 0}, rule: or}
"#;
        let and = r#"
- {type: label, value: [t1], rule: and}
- {type: creation_date, value: {type: relative, period: 0}, rule: and}
"#;
        assert!(matches(or, &d));
        assert!(!matches(and, &d));
    }

    #[test]
    fn test_first_rule_is_ignored() {
        let d = tagged("[t1]", "2024-01-01");
        // an `or` on the first clause has nothing to combine with
        assert!(!matches(
            "- {type: label, value: [t9], rule: or}\n- {type: label, value: [t1], rule: and}",
            &d
        ));
    }

    #[test]
    fn test_fold_is_strictly_left_to_right() {
        let d = tagged("[t1]", "2024-01-01");
        // (true OR false) AND false, no AND precedence
        let conds = r#"
- {type: label, value: [t1]}
- {type: label, value: [t2], rule: or}
- {type: label, value: [t3], rule: and}
"#;
        assert!(!matches(conds, &d));
    }

    #[test]
    fn test_empty_conditions_match_nothing() {
        let matcher = QueryMatcher::new(Vec::new(), now());
        let d = tagged("[t1]", "2024-01-01");
        assert!(!matcher.matches(&d));
        assert!(!matcher.matches(&d));
    }

    #[test]
    fn test_placeholders_are_skipped() {
        let d = tagged("[t1]", "2024-01-01");
        assert!(matches(
            "- {type: null}\n- {type: label, value: [t1], rule: and}",
            &d
        ));
        assert!(!matches("- {type: null}\n- {type: \"null\"}", &d));
    }

    #[test]
    fn test_query_condition_never_matches() {
        let d = tagged("[t1]", "2024-01-01");
        assert!(!matches("- {type: query, value: [{type: label, value: [t1]}]}", &d));
        assert!(matches(
            "- {type: query, value: anything}\n- {type: label, value: [t1], rule: or}",
            &d
        ));
    }

    fn with_prop(kind: &str, data: &str) -> Document {
        doc(&format!(
            "id: d\ncreatedAt: 2024-01-01\nprops:\n  field:\n    type: {}\n    data: {}",
            kind, data
        ))
    }

    fn prop_condition(kind: &str, value: &str) -> String {
        format!("- {{type: prop, value: {{name: field, type: {}, value: {}}}}}", kind, value)
    }

    #[test]
    fn test_user_prop_array_and_scalar() {
        let d = with_prop("user", "[u1, u2]");
        assert!(matches(&prop_condition("user", "u2"), &d));
        assert!(matches(&prop_condition("user", "[u3, u2]"), &d));
        assert!(!matches(&prop_condition("user", "[u3, u4]"), &d));

        let single = with_prop("user", "u1");
        assert!(matches(&prop_condition("user", "[u1]"), &single));
        assert!(!matches(&prop_condition("user", "u2"), &single));
    }

    #[test]
    fn test_prop_nulls_are_filtered() {
        let d = with_prop("user", "[u1, null, u2]");
        assert!(matches(&prop_condition("user", "u2"), &d));

        let empty = with_prop("user", "[null]");
        assert!(!matches(&prop_condition("user", "null"), &empty));
        assert!(!matches(&prop_condition("user", "[u1]"), &empty));
    }

    #[test]
    fn test_prop_type_mismatch() {
        let d = with_prop("string", "u1");
        assert!(!matches(&prop_condition("user", "u1"), &d));
    }

    #[test]
    fn test_prop_missing() {
        let d = tagged("[]", "2024-01-01");
        assert!(!matches(&prop_condition("string", "x"), &d));

        let other = doc("id: d\ncreatedAt: 2024-01-01\nprops: {}");
        assert!(!matches(&prop_condition("string", "x"), &other));
    }

    #[test]
    fn test_number_prop_coerces_condition() {
        let d = with_prop("number", "[1, 2.5]");
        assert!(matches(&prop_condition("number", "\"2.5\""), &d));
        assert!(matches(&prop_condition("number", "1"), &d));
        assert!(!matches(&prop_condition("number", "3"), &d));
        assert!(!matches(&prop_condition("number", "abc"), &d));
    }

    #[test]
    fn test_string_prop() {
        let d = with_prop("string", "draft");
        assert!(matches(&prop_condition("string", "draft"), &d));
        assert!(!matches(&prop_condition("string", "Draft"), &d));
    }

    #[test]
    fn test_date_prop() {
        let d = with_prop("date", "[null, \"2024-01-15T10:00:00Z\"]");
        assert!(matches(
            &prop_condition("date", "{type: specific, date: 2024-01-15}"),
            &d
        ));
        assert!(!matches(
            &prop_condition("date", "{type: before, date: 2024-01-15}"),
            &d
        ));
        assert!(!matches(&prop_condition("date", "not-a-condition"), &d));
    }

    #[test]
    fn test_number_prop_data_is_not_coerced() {
        assert!(!matches(&prop_condition("number", "1"), &with_prop("number", "\"1\"")));
        assert!(!matches(&prop_condition("number", "1"), &with_prop("number", "true")));
        assert!(matches(&prop_condition("number", "1"), &with_prop("number", "1.0")));
    }

    #[test]
    fn test_user_ids_compare_as_strings() {
        assert!(!matches(&prop_condition("user", "\"1\""), &with_prop("user", "1")));
        assert!(!matches(&prop_condition("user", "1"), &with_prop("user", "\"1\"")));
        assert!(matches(&prop_condition("user", "\"1\""), &with_prop("user", "\"1\"")));
    }

    #[test]
    fn test_string_prop_data_is_not_coerced() {
        assert!(!matches(&prop_condition("string", "\"42\""), &with_prop("string", "42")));
    }

    #[test]
    fn test_unreadable_condition_only_fails_itself() {
        let d = tagged("[t1]", "2024-01-01");
        let conds = "- {type: label, value: [t1]}\n- {type: creation_date, value: {type: after, date: soon}, rule: or}";
        assert!(matches(conds, &d));

        assert!(!matches("- {type: creation_date, value: {type: after, date: soon}}", &d));
        assert!(!matches("- {type: update_date, value: {type: someday}}", &d));
        assert!(!matches("- {type: label, value: t1}", &d));
        assert!(!matches("- {type: prop, value: {type: string, value: x}}", &d));
    }

    #[test]
    fn test_conditions_built_in_code() {
        let d = tagged("[t1]", "2024-01-20");
        let conditions = vec![
            Condition {
                filter: Filter::Label(BTreeSet::from(["t2".to_string()])),
                rule: Rule::And,
            },
            Condition {
                filter: Filter::CreationDate(DateCondition::Specific {
                    date: parse_timestamp_str("2024-01-20").unwrap(),
                }),
                rule: Rule::Or,
            },
        ];
        assert!(QueryMatcher::new(conditions, now()).matches(&d));
    }

    #[test]
    fn test_json_and_status_props_never_match() {
        let d = with_prop("json", "{days: 3}");
        assert!(!matches(&prop_condition("json", "{days: 3}"), &d));

        let s = with_prop("status", "done");
        assert!(!matches(&prop_condition("status", "done"), &s));
    }

    #[test]
    fn test_structurally_identical_matchers_agree() {
        let conds = "- {type: label, value: [t1]}\n- {type: creation_date, value: {type: after, date: 2024-01-01}, rule: and}";
        let a = QueryMatcher::new(conditions(conds), now());
        let b = QueryMatcher::new(conditions(conds), now());
        let d = tagged("[t1]", "2024-02-01");
        assert_eq!(a.matches(&d), b.matches(&d));
        assert_eq!(a.matches(&d), a.matches(&d));
        assert!(a.matches(&d));
    }

    #[test]
    fn test_build_query_matcher_local_clock() {
        let matcher = build_query_matcher(conditions(
            "- {type: creation_date, value: {type: relative, period: -86400}}",
        ));
        let recent = Document {
            created_at: Utc::now() + Duration::days(2),
            ..tagged("[]", "2024-01-01")
        };
        let old = tagged("[]", "2001-01-01");
        assert!(matcher(&recent));
        assert!(!matcher(&old));
    }

    #[test]
    fn test_matcher_is_shareable_across_threads() {
        let matcher = std::sync::Arc::new(build_query_matcher(conditions(
            "- {type: label, value: [t1]}",
        )));
        let docs = vec![tagged("[t1]", "2024-01-01"), tagged("[t2]", "2024-01-01")];

        let handles: Vec<_> = docs
            .into_iter()
            .map(|d| {
                let matcher = matcher.clone();
                std::thread::spawn(move || (*matcher)(&d))
            })
            .collect();
        let verdicts: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(verdicts, vec![true, false]);
    }

    #[test]
    fn test_equals_or_contains() {
        let list: YamlValue = from_str("[a, b]").unwrap();
        let scalar: YamlValue = from_str("a").unwrap();
        let eq = |v: &YamlValue, s: &str| v.as_str() == Some(s);

        let list = Operand::from_data(&list).unwrap();
        let scalar = Operand::from_data(&scalar).unwrap();
        assert!(equals_or_contains(&list, "b", eq));
        assert!(!equals_or_contains(&scalar, "b", eq));
        assert!(equals_or_contains(&scalar, "a", eq));
    }
}
