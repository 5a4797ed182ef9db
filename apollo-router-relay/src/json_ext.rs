//! JSON helpers shared by the relay layer.
//!
//! Domain values flowing through resolvers are [`serde_json::Value`]s, the same
//! representation used for response data.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
pub use serde_json::Value;

/// A JSON object.
pub type Object = serde_json::Map<String, Value>;

/// One segment of a response [`Path`].
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    /// A list index.
    Index(usize),

    /// A response key: the field alias if there is one, the field name otherwise.
    Key(String),
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::Index(index) => write!(f, "{index}"),
            PathElement::Key(key) => f.write_str(key),
        }
    }
}

/// The position of a field in the response tree of one operation execution,
/// e.g. `/createUser/user/name` or `/nodes/3`.
///
/// Aliased fields have distinct paths even when they select the same field name.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    pub fn empty() -> Path {
        Path(Vec::new())
    }

    /// Creates a path from a list of response keys.
    pub fn from_keys<I, K>(keys: I) -> Path
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Path(
            keys.into_iter()
                .map(|key| PathElement::Key(key.into()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&PathElement> {
        self.0.last()
    }

    /// Returns a new path with `key` appended.
    pub fn join_key(&self, key: impl Into<String>) -> Path {
        let mut elements = self.0.clone();
        elements.push(PathElement::Key(key.into()));
        Path(elements)
    }

    /// Returns a new path with `index` appended.
    pub fn join_index(&self, index: usize) -> Path {
        let mut elements = self.0.clone();
        elements.push(PathElement::Index(index));
        Path(elements)
    }

    /// The path of the enclosing field, or `None` at the root.
    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            None
        } else {
            Some(Path(self.0[..self.0.len() - 1].to_vec()))
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in &self.0 {
            write!(f, "/{element}")?;
        }
        Ok(())
    }
}

impl<T: Into<String>> FromIterator<T> for Path {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Path::from_keys(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_response_keys_and_indices() {
        let path = Path::from_keys(["nodes"]).join_index(2).join_key("name");
        assert_eq!(path.to_string(), "/nodes/2/name");
        assert_eq!(Path::empty().to_string(), "");
    }

    #[test]
    fn parent_drops_last_segment() {
        let path = Path::from_keys(["first", "clientMutationId"]);
        assert_eq!(path.parent(), Some(Path::from_keys(["first"])));
        assert_eq!(Path::from_keys(["first"]).parent(), Some(Path::empty()));
        assert_eq!(Path::empty().parent(), None);
    }

    #[test]
    fn serializes_as_graphql_error_path() {
        let path = Path::from_keys(["nodes"]).join_index(1);
        assert_eq!(
            serde_json::to_string(&path).unwrap(),
            r#"["nodes",1]"#.to_string()
        );
        let parsed: Path = serde_json::from_str(r#"["hero",0,"name"]"#).unwrap();
        assert_eq!(parsed, Path::from_keys(["hero"]).join_index(0).join_key("name"));
    }
}
