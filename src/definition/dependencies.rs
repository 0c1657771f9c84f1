//! Dependency resolution and circular-dependency detection.
//!
//! The resolver converts declared dependency names into concrete item indices
//! and fails on cycles. The same algorithm applies at the whole-manifest level
//! (flow-to-flow ordering) and at the per-step level, parameterized only by
//! "named item with a dependency-name set".

use std::collections::{HashMap, HashSet};

use thiserror::Error;

/// Errors raised while constructing a flow manager from its definition
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Two items transitively depend on each other
    #[error("circular dependency detected: {owner}.{from} <-> {owner}.{to}")]
    CircularDependency {
        /// Flow or manifest owning the items
        owner: String,
        /// Item whose resolution uncovered the cycle
        from: String,
        /// Dependency closing the cycle
        to: String,
    },

    /// A declared dependency name does not match any item
    #[error("'{from}' depends on unknown '{dependency}' inside '{owner}'")]
    UnresolvedDependency {
        /// Flow or manifest owning the item
        owner: String,
        /// Item declaring the dependency
        from: String,
        /// Name that could not be resolved
        dependency: String,
    },

    /// The definition itself is malformed
    #[error("{message}")]
    Invalid {
        /// Description of the problem
        message: String,
    },
}

/// A named item carrying a set of dependency names
pub trait Dependent {
    /// Unique name of this item
    fn name(&self) -> &str;

    /// Names of the items this one depends on
    fn depends_on(&self) -> &[String];
}

/// Resolve every dependency name to a concrete item index.
///
/// Returns, for each item, the indices of its direct dependencies. A
/// dependency name already on the depth-first resolution path is reported as a
/// circular dependency naming both endpoints. Resolution performs no graph
/// construction; it only replaces name placeholders with indices.
pub fn resolve<T: Dependent>(owner: &str, items: &[T]) -> Result<Vec<Vec<usize>>, ConfigError> {
    let lookup: HashMap<&str, usize> = items
        .iter()
        .enumerate()
        .map(|(index, item)| (item.name(), index))
        .collect();

    let mut resolved: Vec<Option<Vec<usize>>> = vec![None; items.len()];

    for index in 0..items.len() {
        let mut in_progress = HashSet::new();
        resolve_item(owner, items, &lookup, index, &mut in_progress, &mut resolved)?;
    }

    Ok(resolved.into_iter().map(Option::unwrap_or_default).collect())
}

fn resolve_item<T: Dependent>(
    owner: &str,
    items: &[T],
    lookup: &HashMap<&str, usize>,
    index: usize,
    in_progress: &mut HashSet<usize>,
    resolved: &mut Vec<Option<Vec<usize>>>,
) -> Result<(), ConfigError> {
    if resolved[index].is_some() {
        return Ok(());
    }

    in_progress.insert(index);

    let item = &items[index];
    let mut dependencies = Vec::with_capacity(item.depends_on().len());

    for name in item.depends_on() {
        let target = *lookup
            .get(name.as_str())
            .ok_or_else(|| ConfigError::UnresolvedDependency {
                owner: owner.to_string(),
                from: item.name().to_string(),
                dependency: name.clone(),
            })?;

        if in_progress.contains(&target) {
            return Err(ConfigError::CircularDependency {
                owner: owner.to_string(),
                from: item.name().to_string(),
                to: name.clone(),
            });
        }

        resolve_item(owner, items, lookup, target, in_progress, resolved)?;
        dependencies.push(target);
    }

    in_progress.remove(&index);
    resolved[index] = Some(dependencies);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item {
        name: String,
        depends_on: Vec<String>,
    }

    impl Item {
        fn new(name: &str, depends_on: &[&str]) -> Self {
            Self {
                name: name.to_string(),
                depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    impl Dependent for Item {
        fn name(&self) -> &str {
            &self.name
        }

        fn depends_on(&self) -> &[String] {
            &self.depends_on
        }
    }

    #[test]
    fn test_resolve_chain() {
        let items = vec![
            Item::new("first", &[]),
            Item::new("second", &["first"]),
            Item::new("third", &["second", "first"]),
        ];

        let resolved = resolve("test", &items).unwrap();
        assert_eq!(resolved[0], Vec::<usize>::new());
        assert_eq!(resolved[1], vec![0]);
        assert_eq!(resolved[2], vec![1, 0]);
    }

    #[test]
    fn test_circular_dependency() {
        let items = vec![
            Item::new("first", &["second"]),
            Item::new("second", &["first"]),
        ];

        let err = resolve("test", &items).unwrap_err();
        assert!(matches!(err, ConfigError::CircularDependency { .. }));
    }

    #[test]
    fn test_self_dependency() {
        let items = vec![Item::new("first", &["first"])];

        let err = resolve("test", &items).unwrap_err();
        assert!(matches!(err, ConfigError::CircularDependency { .. }));
    }

    #[test]
    fn test_unresolved_dependency() {
        let items = vec![Item::new("first", &["missing"])];

        let err = resolve("test", &items).unwrap_err();
        assert!(matches!(err, ConfigError::UnresolvedDependency { .. }));
    }
}
