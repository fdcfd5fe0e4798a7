//! Ordered label sets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::MetricError;

/// An ordered set of `name="value"` pairs identifying one series of a metric.
///
/// Ordering is by label name, so two label sets built in different orders
/// hash and compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels(BTreeMap<String, String>);

impl Labels {
    /// The empty label set.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True if every label in `filter` is present here with the same value.
    ///
    /// The empty filter matches every label set.
    pub fn matches(&self, filter: &Labels) -> bool {
        filter
            .0
            .iter()
            .all(|(k, v)| self.0.get(k).is_some_and(|own| own == v))
    }

    /// Check every label name against the Prometheus label grammar.
    pub fn validate(&self) -> Result<(), MetricError> {
        match self.0.keys().find(|name| !is_valid_label_name(name)) {
            Some(bad) => Err(MetricError::InvalidLabel(bad.clone())),
            None => Ok(()),
        }
    }

    /// Render with an extra trailing pair, used for histogram `le` labels.
    pub(crate) fn render_with(&self, extra: Option<(&str, &str)>) -> String {
        let mut pairs: Vec<String> = self
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
            .collect();
        if let Some((k, v)) = extra {
            pairs.push(format!("{}=\"{}\"", k, escape_label_value(v)));
        }
        if pairs.is_empty() {
            String::new()
        } else {
            format!("{{{}}}", pairs.join(","))
        }
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_with(None))
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Labels
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl FromIterator<(String, String)> for Labels {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// `[a-zA-Z_:][a-zA-Z0-9_:]*`
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// `[a-zA-Z_][a-zA-Z0-9_]*`, with the `__` prefix reserved.
pub fn is_valid_label_name(name: &str) -> bool {
    if name.starts_with("__") {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn escape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_order_independent() {
        let a = Labels::new().with("route", "/x").with("method", "GET");
        let b = Labels::from([("method", "GET"), ("route", "/x")]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), r#"{method="GET",route="/x"}"#);
    }

    #[test]
    fn test_subset_match() {
        let series = Labels::from([("method", "GET"), ("status", "500")]);
        assert!(series.matches(&Labels::new()));
        assert!(series.matches(&Labels::from([("status", "500")])));
        assert!(!series.matches(&Labels::from([("status", "200")])));
        assert!(!series.matches(&Labels::from([("tenant", "a")])));
    }

    #[test]
    fn test_escaping() {
        let labels = Labels::from([("msg", "say \"hi\"\\\n")]);
        assert_eq!(labels.to_string(), r#"{msg="say \"hi\"\\\n"}"#);
    }

    #[test]
    fn test_name_grammar() {
        assert!(is_valid_metric_name("http_requests_total"));
        assert!(is_valid_metric_name("job:errors:rate5m"));
        assert!(!is_valid_metric_name("5xx_total"));
        assert!(!is_valid_metric_name("bad-name"));
        assert!(!is_valid_metric_name(""));

        assert!(is_valid_label_name("status"));
        assert!(!is_valid_label_name("__reserved"));
        assert!(!is_valid_label_name("a:b"));
        assert!(Labels::from([("ok", "1"), ("bad label", "2")]).validate().is_err());
    }
}
