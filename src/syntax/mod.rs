use serde::{Deserialize, Deserializer};

use crate::value::{Raw, ValueError};

pub mod build;

/// A parsed program in nested-list form, as handed over by an external
/// parser: interior nodes are pairs, leaves are atoms.
#[derive(Debug, Clone, PartialEq)]
pub enum SyntaxTree {
    Atom(Raw),
    Pair(Box<SyntaxTree>, Box<SyntaxTree>),
}

impl SyntaxTree {
    pub fn atom(raw: impl Into<Raw>) -> Self {
        SyntaxTree::Atom(raw.into())
    }

    pub fn null() -> Self {
        SyntaxTree::Atom(Raw::Null)
    }

    pub fn pair(head: SyntaxTree, tail: SyntaxTree) -> Self {
        SyntaxTree::Pair(Box::new(head), Box::new(tail))
    }

    /// Builds a proper list terminated by `null`.
    pub fn list(items: impl IntoIterator<Item = SyntaxTree>) -> Self {
        let items: Vec<SyntaxTree> = items.into_iter().collect();
        items
            .into_iter()
            .rev()
            .fold(SyntaxTree::null(), |tail, head| SyntaxTree::pair(head, tail))
    }

    /// Reads the JSON form of a tree.
    ///
    /// - an array is a proper list of its elements (`[]` is the empty list)
    /// - `{"pair": [head, tail]}` is a single, possibly improper, pair
    /// - any scalar, or `{"undefined": true}`, is an atom
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ValueError> {
        match value {
            serde_json::Value::Array(items) => items
                .iter()
                .map(SyntaxTree::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(SyntaxTree::list),
            serde_json::Value::Object(fields) => match (fields.len(), fields.get("pair")) {
                (1, Some(serde_json::Value::Array(parts))) if parts.len() == 2 => Ok(SyntaxTree::pair(
                    SyntaxTree::from_json(&parts[0])?,
                    SyntaxTree::from_json(&parts[1])?,
                )),
                _ => Raw::try_from(value).map(SyntaxTree::Atom),
            },
            scalar => Raw::try_from(scalar).map(SyntaxTree::Atom),
        }
    }

    pub fn from_json_str(source: &str) -> Result<Self, crate::Error> {
        let value: serde_json::Value =
            serde_json::from_str(source).map_err(|e| ValueError::InvalidValue(e.to_string()))?;
        Ok(SyntaxTree::from_json(&value)?)
    }

    pub fn is_pair(&self) -> bool {
        matches!(self, SyntaxTree::Pair(..))
    }
}

// Programs are long right-leaning lists; dropping them node by node keeps
// the native stack flat.
impl Drop for SyntaxTree {
    fn drop(&mut self) {
        fn detach(node: &mut SyntaxTree, pending: &mut Vec<SyntaxTree>) {
            if let SyntaxTree::Pair(head, tail) = node {
                for child in [head, tail] {
                    if child.is_pair() {
                        pending.push(std::mem::replace(&mut **child, SyntaxTree::null()));
                    }
                }
            }
        }

        let mut pending = Vec::new();
        detach(self, &mut pending);
        while let Some(mut node) = pending.pop() {
            detach(&mut node, &mut pending);
        }
    }
}

impl<'de> Deserialize<'de> for SyntaxTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        SyntaxTree::from_json(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrays_become_proper_lists() {
        let tree = SyntaxTree::from_json(&serde_json::json!(["name", "x"])).unwrap();
        assert_eq!(
            tree,
            SyntaxTree::pair(
                SyntaxTree::atom("name"),
                SyntaxTree::pair(SyntaxTree::atom("x"), SyntaxTree::null())
            )
        );
    }

    #[test]
    fn empty_array_is_null() {
        let tree = SyntaxTree::from_json(&serde_json::json!([])).unwrap();
        assert_eq!(tree, SyntaxTree::null());
    }

    #[test]
    fn explicit_pair_object() {
        let tree = SyntaxTree::from_json(&serde_json::json!({"pair": [1, 2]})).unwrap();
        assert_eq!(tree, SyntaxTree::pair(SyntaxTree::atom(1), SyntaxTree::atom(2)));
    }

    #[test]
    fn undefined_object_is_an_atom() {
        let tree = SyntaxTree::from_json(&serde_json::json!(["return_statement", {"undefined": true}])).unwrap();
        assert_eq!(
            tree,
            SyntaxTree::list([SyntaxTree::atom("return_statement"), SyntaxTree::Atom(Raw::Undefined)])
        );
    }

    #[test]
    fn other_objects_are_invalid() {
        let err = SyntaxTree::from_json(&serde_json::json!({"kind": "name"})).unwrap_err();
        assert!(matches!(err, ValueError::InvalidValue(_)));
    }

    #[test]
    fn deep_trees_drop_without_recursing() {
        let spine = SyntaxTree::list((0..1_000_000i32).map(SyntaxTree::atom));
        drop(spine);

        let mut nested = SyntaxTree::null();
        for i in 0..1_000_000i32 {
            nested = SyntaxTree::pair(nested, SyntaxTree::atom(i));
        }
        drop(nested);
    }

    #[test]
    fn deserializes_through_serde() {
        let tree: SyntaxTree = serde_json::from_str(r#"["application", ["name", "+"], [1, 1]]"#).unwrap();
        assert!(tree.is_pair());
    }
}
