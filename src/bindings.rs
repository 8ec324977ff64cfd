//! Named variables visible to a script as `$name`.

use serde::Serialize;

use crate::jq::{Map, Value};
use crate::marshal::{to_value, MarshalError};

/// An ordered set of `$name` bindings.
///
/// Names are given without the `$` sigil. Inserting a name twice replaces
/// the earlier value.
///
/// ```
/// use jqhost::Bindings;
///
/// let mut vars = Bindings::new();
/// vars.insert("limit", &10).unwrap();
/// vars.insert("tags", &["a", "b"]).unwrap();
/// assert_eq!(vars.get("limit").and_then(|v| v.as_f64()), Some(10.0));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    vars: Map,
}

impl Bindings {
    pub fn new() -> Self {
        Bindings::default()
    }

    /// Marshal `value` and bind it to `$name`.
    ///
    /// A value that cannot be marshalled reports a path rooted at the
    /// variable, e.g. `$name.field`.
    pub fn insert<T: Serialize + ?Sized>(
        &mut self,
        name: impl Into<String>,
        value: &T,
    ) -> Result<(), MarshalError> {
        let name = name.into();
        let value = to_value(value).map_err(|err| err.rooted_at(&format!("${}", name)))?;
        self.vars.insert(name, value);
        Ok(())
    }

    /// Bind an already converted value.
    pub fn insert_value(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with<T: Serialize + ?Sized>(
        mut self,
        name: impl Into<String>,
        value: &T,
    ) -> Result<Self, MarshalError> {
        self.insert(name, value)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Bound names, in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Copy every binding of `other` into `self`, replacing clashes.
    pub fn extend(&mut self, other: Bindings) {
        self.vars.extend(other.vars);
    }

    pub(crate) fn as_map(&self) -> &Map {
        &self.vars
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Bindings {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_insert_and_replace() {
        let mut vars = Bindings::new();
        vars.insert("a", &1).unwrap();
        vars.insert("b", "two").unwrap();
        vars.insert("a", &3).unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(vars.get("a"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn test_unsupported_value_rooted_at_name() {
        let mut bad = HashMap::new();
        bad.insert(1u8, "x");
        let err = Bindings::new().with("foo", &bad).unwrap_err();
        assert_eq!(
            err,
            MarshalError::UnsupportedType {
                type_name: "map key of type u8".to_string(),
                path: "$foo".to_string(),
            }
        );
    }

    #[test]
    fn test_from_iter_and_extend() {
        let mut vars: Bindings = [("x", Value::Null)].into_iter().collect();
        vars.extend(Bindings::new().with("y", &true).unwrap());
        assert_eq!(vars.names().collect::<Vec<_>>(), vec!["x", "y"]);
        assert!(!vars.is_empty());
    }
}
