use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// One training or validation instance: a set of named fields, some of which
/// are designated as inputs. The remaining fields are labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Example {
    fields: BTreeMap<String, Value>,
    input_keys: BTreeSet<String>,
}

/// Module outputs share the example representation.
pub type Prediction = Example;

impl Example {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an example from `(name, value)` pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            input_keys: BTreeSet::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Mark the given keys as inputs. Keys not present are still recorded so
    /// that `inputs()` stays stable if the field is set later.
    pub fn with_inputs<S: AsRef<str>>(mut self, keys: &[S]) -> Self {
        self.input_keys = keys.iter().map(|k| k.as_ref().to_string()).collect();
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn input_keys(&self) -> &BTreeSet<String> {
        &self.input_keys
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Projection onto the input fields.
    pub fn inputs(&self) -> Example {
        Example {
            fields: self
                .fields
                .iter()
                .filter(|(k, _)| self.input_keys.contains(*k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            input_keys: self.input_keys.clone(),
        }
    }

    /// Projection onto the label (non-input) fields.
    pub fn labels(&self) -> Example {
        Example {
            fields: self
                .fields
                .iter()
                .filter(|(k, _)| !self.input_keys.contains(*k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            input_keys: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn qa_example() -> Example {
        Example::new()
            .with("question", "What is the capital of France?")
            .with("answer", "Paris")
            .with_inputs(&["question"])
    }

    #[test]
    fn test_inputs_and_labels_partition_fields() {
        let example = qa_example();
        let inputs = example.inputs();
        let labels = example.labels();

        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs.get_str("question"), Some("What is the capital of France?"));
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get_str("answer"), Some("Paris"));
        assert!(!labels.contains("question"));
    }

    #[test]
    fn test_from_pairs_and_accessors() {
        let example = Example::from_pairs([("score", json!(0.5)), ("label", json!("yes"))]);
        assert_eq!(example.get_f64("score"), Some(0.5));
        assert_eq!(example.get_str("label"), Some("yes"));
        assert_eq!(example.keys().collect::<Vec<_>>(), vec!["label", "score"]);
        assert!(example.input_keys().is_empty());
    }

    #[test]
    fn test_serialization_keeps_input_keys() {
        let example = qa_example();
        let json = serde_json::to_string(&example).unwrap();
        let back: Example = serde_json::from_str(&json).unwrap();
        assert_eq!(example, back);
        assert!(back.input_keys().contains("question"));
    }
}
