use std::collections::BTreeMap;
use std::ops::Deref;

use serde::{Deserialize, Deserializer};

use crate::environment::Scalar;

/// User-defined container labels, as a mapping or a `["key=value"]` list.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Labels(BTreeMap<String, String>);

impl Deref for Labels {
    type Target = BTreeMap<String, String>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Labels> for BTreeMap<String, String> {
    fn from(value: Labels) -> Self {
        value.0
    }
}

impl<'de> Deserialize<'de> for Labels {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawLabels {
            List(Vec<String>),
            Map(BTreeMap<String, Option<Scalar>>),
        }

        let labels = match RawLabels::deserialize(deserializer)? {
            RawLabels::List(labels) => labels
                .into_iter()
                .map(|label| match label.split_once('=') {
                    Some((key, value)) => (key.to_owned(), value.to_owned()),
                    // a bare key is a label with an empty value
                    None => (label, String::new()),
                })
                .collect(),
            RawLabels::Map(labels) => labels
                .into_iter()
                .map(|(k, v)| (k, v.map(String::from).unwrap_or_default()))
                .collect(),
        };

        Ok(Self(labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn labels_from_map_with_scalars() {
        let labels: Labels =
            serde_json::from_value(json!({"tier": "cache", "replicas": 1, "empty": null}))
                .unwrap();

        assert_eq!(labels.get("tier"), Some(&"cache".to_string()));
        assert_eq!(labels.get("replicas"), Some(&"1".to_string()));
        assert_eq!(labels.get("empty"), Some(&String::new()));
    }

    #[test]
    fn labels_from_list() {
        let labels: Labels =
            serde_json::from_value(json!(["tier=cache", "flag", "expr=a=b"])).unwrap();

        assert_eq!(labels.get("tier"), Some(&"cache".to_string()));
        assert_eq!(labels.get("flag"), Some(&String::new()));
        assert_eq!(labels.get("expr"), Some(&"a=b".to_string()));
    }
}
