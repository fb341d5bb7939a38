use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use serde_yaml::Value;

/// Service keys whose mapping values are handed to the engine as text
const TEXT_KEYS: [&str; 2] = ["environment", "labels"];

/// Scalar text exactly as written in the descriptor
struct Literal(String);

impl<'de> Deserialize<'de> for Literal {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct LiteralVisitor;

        impl Visitor<'_> for LiteralVisitor {
            type Value = Literal;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a scalar")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Literal, E> {
                Ok(Literal(v.to_owned()))
            }
        }

        // the YAML deserializer yields the source text of any plain scalar here
        deserializer.deserialize_str(LiteralVisitor)
    }
}

/// Literal values of one environment or labels mapping, empty for the list form
#[derive(Default)]
struct LiteralMap(BTreeMap<String, String>);

impl<'de> Deserialize<'de> for LiteralMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MapVisitor;

        impl<'de> Visitor<'de> for MapVisitor {
            type Value = LiteralMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping or a list")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<LiteralMap, A::Error> {
                let mut values = BTreeMap::new();
                while let Some(key) = map.next_key::<String>()? {
                    if let Some(Literal(value)) = map.next_value::<Option<Literal>>()? {
                        values.insert(key, value);
                    }
                }
                Ok(LiteralMap(values))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<LiteralMap, A::Error> {
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(LiteralMap::default())
            }

            fn visit_unit<E: de::Error>(self) -> Result<LiteralMap, E> {
                Ok(LiteralMap::default())
            }
        }

        deserializer.deserialize_any(MapVisitor)
    }
}

#[derive(Deserialize, Default)]
struct LiteralService {
    #[serde(default)]
    environment: LiteralMap,

    #[serde(default)]
    labels: LiteralMap,
}

#[derive(Deserialize, Default)]
struct LiteralDescriptor {
    #[serde(default)]
    services: Option<BTreeMap<String, LiteralService>>,
}

/// Replace the numbers and booleans of service environment and label
/// mappings in `value` with their text in `contents`.
///
/// YAML resolves `1.0` or `0x1F` to typed scalars, the container must
/// receive them as written. Documents the literal pass cannot read are left
/// for the typed pass to report.
pub(crate) fn restore_literal_text(value: &mut Value, contents: &str) {
    let Ok(literal) = serde_yaml::from_str::<LiteralDescriptor>(contents) else {
        return;
    };
    let Some(literal_services) = literal.services else {
        return;
    };
    let Some(services) = value.get_mut("services").and_then(Value::as_mapping_mut) else {
        return;
    };

    for (name, service) in services.iter_mut() {
        let Some(texts) = name.as_str().and_then(|n| literal_services.get(n)) else {
            continue;
        };
        for key in TEXT_KEYS {
            let literals = if key == "environment" {
                &texts.environment
            } else {
                &texts.labels
            };
            let Some(entries) = service.get_mut(key).and_then(Value::as_mapping_mut) else {
                continue;
            };
            for (entry, scalar) in entries.iter_mut() {
                if !matches!(scalar, Value::Number(_) | Value::Bool(_)) {
                    continue;
                }
                if let Some(text) = entry.as_str().and_then(|e| literals.0.get(e)) {
                    *scalar = Value::String(text.clone());
                }
            }
        }
    }
}
