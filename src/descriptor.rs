// Metric descriptors
// Description, tags and labels applied once, when a key's timer/counter
// pair is first created. Later descriptors for the same key are ignored
//
// Numan Thabit 2025 Nov

use crate::key::MetricKey;
use std::collections::BTreeMap;

pub const TAG_METHOD: &str = "method";
pub const TAG_CLASS: &str = "class";
pub const TAG_SIGNATURE: &str = "signature";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricDescriptor {
    /// Human description for the timer; generated when absent
    pub description: Option<String>,
    /// Extra tags; a later insert for the same name replaces the earlier one
    pub tags: BTreeMap<String, String>,
    /// Overrides for the labels otherwise split from the key
    pub owner_label: Option<String>,
    pub operation_label: Option<String>,
    /// Parameter type names, used to build the `signature` tag
    pub parameter_types: Option<Vec<String>>,
}

impl MetricDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = if description.is_empty() {
            None
        } else {
            Some(description)
        };
        self
    }

    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }

    /// Add tags written as `key=value`; malformed entries are skipped.
    pub fn with_extra_tags<S: AsRef<str>>(mut self, raw: &[S]) -> Self {
        self.tags.extend(parse_tags(raw));
        self
    }

    pub fn with_labels(mut self, owner: impl Into<String>, operation: impl Into<String>) -> Self {
        self.owner_label = Some(owner.into());
        self.operation_label = Some(operation.into());
        self
    }

    pub fn with_parameter_types<S: AsRef<str>>(mut self, types: &[S]) -> Self {
        self.parameter_types = Some(types.iter().map(|t| t.as_ref().to_string()).collect());
        self
    }

    pub fn owner_for<'a>(&'a self, key: &'a MetricKey) -> &'a str {
        self.owner_label
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| key.owner_label())
    }

    pub fn operation_for<'a>(&'a self, key: &'a MetricKey) -> &'a str {
        self.operation_label
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| key.operation_label())
    }

    /// `operation(T1,T2,...)` when parameter types are known.
    pub fn signature_for(&self, key: &MetricKey) -> Option<String> {
        self.parameter_types
            .as_ref()
            .map(|types| format!("{}({})", self.operation_for(key), types.join(",")))
    }

    pub fn timer_description(&self, key: &MetricKey) -> String {
        match &self.description {
            Some(description) => description.clone(),
            None => format!(
                "Execution time of operation {} in {}",
                self.operation_for(key),
                self.owner_for(key)
            ),
        }
    }

    pub fn counter_description(&self, key: &MetricKey) -> String {
        format!("Number of calls for operation: {}", self.operation_for(key))
    }

    /// Descriptor tags plus `method`, `class` and (when known) `signature`.
    pub fn resolved_tags(&self, key: &MetricKey) -> BTreeMap<String, String> {
        let mut tags = self.tags.clone();
        tags.insert(TAG_METHOD.to_string(), self.operation_for(key).to_string());
        tags.insert(TAG_CLASS.to_string(), self.owner_for(key).to_string());
        if let Some(signature) = self.signature_for(key) {
            tags.insert(TAG_SIGNATURE.to_string(), signature);
        }
        tags
    }
}

/// Parse `key=value` strings into a tag map.
///
/// Entries need exactly one `=`; both sides are trimmed. Anything else is
/// dropped without error. A repeated name keeps the last value.
pub fn parse_tags<S: AsRef<str>>(raw: &[S]) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    for entry in raw {
        let entry = entry.as_ref();
        if entry.matches('=').count() != 1 {
            continue;
        }
        if let Some((name, value)) = entry.split_once('=') {
            tags.insert(name.trim().to_string(), value.trim().to_string());
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(raw: &str) -> MetricKey {
        MetricKey::new(raw).unwrap()
    }

    #[test]
    fn parses_valid_tags() {
        let tags = parse_tags(&["env=prod", "service=user-service", "version=1.0"]);
        assert_eq!(tags.len(), 3);
        assert_eq!(tags["env"], "prod");
        assert_eq!(tags["service"], "user-service");
        assert_eq!(tags["version"], "1.0");
    }

    #[test]
    fn skips_malformed_tags() {
        let tags = parse_tags(&["env=prod", "invalid", "key=value=extra"]);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags["env"], "prod");
    }

    #[test]
    fn trims_whitespace_and_last_duplicate_wins() {
        let tags = parse_tags(&[" env = prod ", "service = user-service", "env=stage"]);
        assert_eq!(tags.len(), 2);
        assert_eq!(tags["env"], "stage");
        assert_eq!(tags["service"], "user-service");
    }

    #[test]
    fn empty_input_yields_no_tags() {
        let none: [&str; 0] = [];
        assert!(parse_tags(&none).is_empty());
    }

    #[test]
    fn generated_descriptions_use_key_labels() {
        let d = MetricDescriptor::new();
        let k = key("InvoiceService.create");
        assert_eq!(
            d.timer_description(&k),
            "Execution time of operation create in InvoiceService"
        );
        assert_eq!(d.counter_description(&k), "Number of calls for operation: create");
    }

    #[test]
    fn explicit_description_and_labels_win() {
        let d = MetricDescriptor::new()
            .with_description("Creates invoices")
            .with_labels("PgInvoiceService", "create_invoice");
        let k = key("billing.create");
        assert_eq!(d.timer_description(&k), "Creates invoices");
        assert_eq!(d.owner_for(&k), "PgInvoiceService");
        assert_eq!(d.operation_for(&k), "create_invoice");
    }

    #[test]
    fn resolved_tags_include_standard_labels() {
        let d = MetricDescriptor::new()
            .with_extra_tags(&["env=prod", "method=overridden"])
            .with_parameter_types(&["String", "i32"]);
        let tags = d.resolved_tags(&key("UserService.get_user"));
        assert_eq!(tags["env"], "prod");
        assert_eq!(tags["method"], "get_user");
        assert_eq!(tags["class"], "UserService");
        assert_eq!(tags["signature"], "get_user(String,i32)");
    }

    #[test]
    fn no_signature_without_parameter_types() {
        let tags = MetricDescriptor::new().resolved_tags(&key("A.b"));
        assert!(!tags.contains_key(TAG_SIGNATURE));

        let tags = MetricDescriptor::new()
            .with_parameter_types::<&str>(&[])
            .resolved_tags(&key("A.b"));
        assert_eq!(tags[TAG_SIGNATURE], "b()");
    }

    proptest! {
        #[test]
        fn well_formed_pairs_always_parse(name in "[a-z]{1,8}", value in "[a-z0-9-]{0,8}") {
            let tags = parse_tags(&[format!(" {name} = {value} ")]);
            prop_assert_eq!(tags.get(&name), Some(&value));
        }
    }
}
