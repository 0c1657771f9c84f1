//! JSON codec backed by serde_json.

use anyhow::Result;
use serde_json::{Map, Value};

use crate::refs::{Reference, Store};

use super::Codec;

/// Codec translating between JSON documents and the references of a single
/// resource
pub struct JsonCodec {
    resource: String,
}

impl JsonCodec {
    /// Construct a JSON codec bound to the given resource
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
        }
    }

    fn assemble(&self, store: &Store, prefix: &str) -> Value {
        let mut root = Map::new();

        for (path, reference) in store.resource(&self.resource) {
            let relative = match relative_path(&path, prefix) {
                Some(relative) => relative,
                None => continue,
            };

            let value = self.reference_value(&path, &reference);

            if relative.is_empty() {
                // A repeated scalar element: the sub-store holds a single
                // reference at the repeated path itself.
                return value;
            }

            insert(&mut root, relative, value);
        }

        Value::Object(root)
    }

    fn reference_value(&self, path: &str, reference: &Reference) -> Value {
        if reference.repeated.is_empty() {
            return reference.value.clone().unwrap_or(Value::Null);
        }

        Value::Array(
            reference
                .repeated
                .iter()
                .map(|element| self.assemble(element, path))
                .collect(),
        )
    }
}

impl Codec for JsonCodec {
    fn marshal(&self, store: &Store) -> Result<Vec<u8>> {
        let document = self.assemble(store, "");
        Ok(serde_json::to_vec(&document)?)
    }

    fn unmarshal(&self, data: &[u8], store: &Store) -> Result<()> {
        let document: Value = serde_json::from_slice(data)?;

        match document {
            Value::Object(values) => {
                store.store_values(&self.resource, "", values);
                Ok(())
            }
            other => anyhow::bail!(
                "expected a JSON object for resource '{}', got {}",
                self.resource,
                other
            ),
        }
    }
}

/// Strip the given prefix from a dot-joined path. Returns `None` when the
/// path does not belong under the prefix.
fn relative_path<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(path);
    }

    if path == prefix {
        return Some("");
    }

    path.strip_prefix(prefix)?.strip_prefix('.')
}

/// Insert a value into the nested object at the given dot-joined path
fn insert(root: &mut Map<String, Value>, path: &str, value: Value) {
    let mut target = root;
    let mut segments = path.split('.').peekable();

    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            target.insert(segment.to_string(), value);
            return;
        }

        target = match target
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()))
        {
            Value::Object(nested) => nested,
            occupied => {
                *occupied = Value::Object(Map::new());
                match occupied {
                    Value::Object(nested) => nested,
                    _ => unreachable!(),
                }
            }
        };
    }
}
