use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Value of a single model input. Enumerated parameters carry text,
/// slider-bound parameters carry numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(v) => Some(*v),
            ParamValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            ParamValue::Number(_) => None,
        }
    }
}

/// Query-string form: text passes through verbatim, numbers use the shortest
/// round-trip representation (`1` not `1.0`).
impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(v) => write!(f, "{}", v),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Number(v)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(rename = "name")]
    pub display_name: String,
    pub value: ParamValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    /// Closed choice set. Older catalog records call this `dropdown` and
    /// list numbers; those are normalised to their string form.
    #[serde(
        default,
        alias = "dropdown",
        deserialize_with = "deserialize_options",
        skip_serializing_if = "Option::is_none"
    )]
    pub options: Option<Vec<String>>,
}

impl Parameter {
    pub fn numeric(display_name: &str, value: f64, unit: &str, min: f64, max: f64, step: f64) -> Self {
        Self {
            display_name: display_name.to_string(),
            value: ParamValue::Number(value),
            unit: (!unit.is_empty()).then(|| unit.to_string()),
            min: Some(min),
            max: Some(max),
            step: Some(step),
            options: None,
        }
    }

    pub fn enumerated(display_name: &str, value: &str, options: &[&str]) -> Self {
        Self {
            display_name: display_name.to_string(),
            value: ParamValue::Text(value.to_string()),
            unit: None,
            min: None,
            max: None,
            step: None,
            options: Some(options.iter().map(|s| s.to_string()).collect()),
        }
    }

    /// Slider bounds, falling back to the current value when the record
    /// leaves them out.
    pub fn range(&self) -> (f64, f64) {
        let v = self.value.as_f64().unwrap_or(0.0);
        let lo = self.min.unwrap_or(v.min(0.0));
        let hi = self.max.unwrap_or(v.max(lo + 1.0));
        (lo, hi)
    }
}

fn deserialize_options<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<ParamValue>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|values| values.iter().map(ToString::to_string).collect()))
}

/// Ordered key → parameter mapping bound to one model.
///
/// Keys are fixed once the set is built from a model default: user edits only
/// ever replace `value`, so every key in the default stays present.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterSet {
    entries: Vec<(String, Parameter)>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder used by catalog seeds and tests.
    pub fn with(mut self, key: &str, param: Parameter) -> Self {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = param,
            None => self.entries.push((key.to_string(), param)),
        }
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&Parameter> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, p)| p)
    }

    pub fn value(&self, key: &str) -> Option<&ParamValue> {
        self.get(key).map(|p| &p.value)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.value(key).and_then(ParamValue::as_f64)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.value(key).and_then(ParamValue::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.entries.iter().map(|(k, p)| (k.as_str(), p))
    }

    /// Replace only the value of `key`. Returns `false` and leaves the set
    /// untouched when the key is not part of this set; this is what keeps a
    /// stale slider update from leaking into a freshly switched model.
    pub fn set_value(&mut self, key: &str, value: impl Into<ParamValue>) -> bool {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, param)) => {
                param.value = value.into();
                true
            }
            None => false,
        }
    }

    /// `(key, value-string)` pairs in declaration order, ready for a query string.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(k, p)| (k.clone(), p.value.to_string()))
            .collect()
    }

    /// Stable textual fingerprint of the values, used as a cache key.
    pub fn fingerprint(&self) -> String {
        self.query_pairs()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// True when both sets expose exactly the same keys in the same order.
    pub fn same_schema(&self, other: &ParameterSet) -> bool {
        self.keys().eq(other.keys())
    }
}

impl Serialize for ParameterSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, p) in &self.entries {
            map.serialize_entry(k, p)?;
        }
        map.end()
    }
}

struct ParameterSetVisitor;

impl<'de> Visitor<'de> for ParameterSetVisitor {
    type Value = ParameterSet;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of parameter key to parameter definition")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ParameterSet, A::Error> {
        let mut entries: Vec<(String, Parameter)> = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, param)) = access.next_entry::<String, Parameter>()? {
            if entries.iter().any(|(k, _)| *k == key) {
                return Err(de::Error::custom(format!("duplicate parameter `{}`", key)));
            }
            entries.push((key, param));
        }
        Ok(ParameterSet { entries })
    }
}

impl<'de> Deserialize<'de> for ParameterSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ParameterSetVisitor)
    }
}
