//! Concurrent reference store used to exchange values between flow steps.
//!
//! A store is created fresh for every flow invocation and discarded once the
//! response has been produced. Values are addressed by a `(resource, path)`
//! pair, where the resource typically names the step that produced the value
//! and the path is a dot-joined property path inside its message.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

/// Join two dot-separated property paths
pub fn join_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        return key.to_string();
    }

    format!("{}.{}", path, key)
}

/// A single resolved value addressed by `(resource, path)`.
///
/// Holds either a scalar `value` or, for repeating fields, an ordered sequence
/// of sub-stores (one per repetition), never both.
#[derive(Debug, Clone, Default)]
pub struct Reference {
    /// Property path inside the owning resource
    pub path: String,

    /// Scalar value, if this reference is not repeating
    pub value: Option<Value>,

    /// Sub-stores for repeating fields, one per repetition
    pub repeated: Vec<Arc<Store>>,
}

impl Reference {
    /// Create a new empty reference for the given path
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value: None,
            repeated: Vec::new(),
        }
    }

    /// Set the scalar value of this reference
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }
}

/// Concurrent container mapping `(resource, path)` to references.
///
/// Every operation is individually atomic under the store's lock. Sequences of
/// operations are not transactional: safety across steps relies on the flow
/// dependency gate, which guarantees a step only reads values written by
/// already-completed predecessors.
#[derive(Debug, Default)]
pub struct Store {
    values: Mutex<HashMap<String, Arc<Reference>>>,
}

impl Store {
    /// Construct a new store preallocated for the given number of references
    pub fn new(size_hint: usize) -> Self {
        Self {
            values: Mutex::new(HashMap::with_capacity(size_hint)),
        }
    }

    fn key(resource: &str, path: &str) -> String {
        format!("{}:{}", resource, path)
    }

    /// Insert or overwrite the reference for its `(resource, path)` address
    pub fn store(&self, resource: &str, reference: Reference) {
        let key = Self::key(resource, &reference.path);
        let mut values = self.values.lock().unwrap();
        values.insert(key, Arc::new(reference));
    }

    /// Store a single scalar value for the given resource and path
    pub fn store_value(&self, resource: &str, path: &str, value: Value) {
        self.store(resource, Reference::new(path).with_value(value));
    }

    /// Recursively store the given map of values.
    ///
    /// Nested maps are decomposed into dot-joined paths. Slices become
    /// repeating references whose elements are stored as independent
    /// sub-stores, whether the elements are maps or scalars.
    pub fn store_values(&self, resource: &str, path: &str, values: serde_json::Map<String, Value>) {
        for (key, value) in values {
            let path = join_path(path, &key);

            match value {
                Value::Object(nested) => self.store_values(resource, &path, nested),
                Value::Array(items) => {
                    let reference = self.new_repeating(resource, &path, items);
                    self.store(resource, reference);
                }
                value => self.store_value(resource, &path, value),
            }
        }
    }

    /// Build a repeating reference from the given elements, each element
    /// stored inside its own sub-store under the same resource and path
    fn new_repeating(&self, resource: &str, path: &str, items: Vec<Value>) -> Reference {
        let mut reference = Reference::new(path);
        reference.repeated = Vec::with_capacity(items.len());

        for item in items {
            let store = Store::new(1);

            match item {
                Value::Object(nested) => store.store_values(resource, path, nested),
                value => store.store_value(resource, path, value),
            }

            reference.repeated.push(Arc::new(store));
        }

        reference
    }

    /// Load the reference stored for the given resource and path.
    /// Absence is not an error.
    pub fn load(&self, resource: &str, path: &str) -> Option<Arc<Reference>> {
        let key = Self::key(resource, path);
        let values = self.values.lock().unwrap();
        values.get(&key).cloned()
    }

    /// Snapshot all references stored under the given resource, returned as
    /// `(path, reference)` pairs. Used by codecs to re-assemble a resource.
    pub fn resource(&self, resource: &str) -> Vec<(String, Arc<Reference>)> {
        let prefix = Self::key(resource, "");
        let values = self.values.lock().unwrap();

        values
            .iter()
            .filter_map(|(key, reference)| {
                key.strip_prefix(&prefix)
                    .map(|path| (path.to_string(), reference.clone()))
            })
            .collect()
    }

    /// Number of references currently held
    pub fn len(&self) -> usize {
        self.values.lock().unwrap().len()
    }

    /// Whether the store holds no references
    pub fn is_empty(&self) -> bool {
        self.values.lock().unwrap().is_empty()
    }
}
