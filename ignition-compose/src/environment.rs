use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer};

/// A YAML scalar accepted where the engine expects a string.
///
/// Descriptors loaded from a file reach this as text already, numbers only
/// show up when deserializing from another source.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub(crate) enum Scalar {
    Bool(bool),
    Number(serde_yaml::Number),
    String(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => b.fmt(f),
            Scalar::Number(n) => n.fmt(f),
            Scalar::String(s) => s.fmt(f),
        }
    }
}

impl From<Scalar> for String {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::String(s) => s,
            other => other.to_string(),
        }
    }
}

/// Declared container environment.
///
/// A variable without a value (`KEY:` in the mapping form, `KEY` in the list
/// form) is passed through from the launcher's own environment when loading.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Environment(BTreeMap<String, Option<String>>);

impl Environment {
    /// Resolve pass-through variables with `lookup`, dropping the ones that
    /// are not set.
    pub fn resolve<F>(self, lookup: F) -> BTreeMap<String, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.0
            .into_iter()
            .filter_map(|(key, value)| match value {
                Some(value) => Some((key, value)),
                None => lookup(&key).map(|value| (key, value)),
            })
            .collect()
    }
}

impl<'de> Deserialize<'de> for Environment {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawEnvironment {
            List(Vec<String>),
            Map(BTreeMap<String, Option<Scalar>>),
        }

        let vars: BTreeMap<String, Option<String>> = match RawEnvironment::deserialize(deserializer)? {
            RawEnvironment::List(vars) => vars
                .into_iter()
                .map(|var| match var.split_once('=') {
                    Some((key, value)) => (key.to_owned(), Some(value.to_owned())),
                    None => (var, None),
                })
                .collect(),
            RawEnvironment::Map(vars) => vars
                .into_iter()
                .map(|(key, value)| (key, value.map(String::from)))
                .collect(),
        };

        if let Some(key) = vars.keys().find(|k| k.is_empty() || k.contains('=')) {
            return Err(serde::de::Error::custom(format!(
                "invalid environment variable name '{key}'"
            )));
        }

        Ok(Self(vars))
    }
}
