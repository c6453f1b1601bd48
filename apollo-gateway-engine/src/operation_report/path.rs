use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de;

/// A path into the response document.
///
/// Serializes as a JSON array mixing bare strings (field names) and bare
/// integers (list indexes), the shape used by the `path` entry of a GraphQL
/// error.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathItem>);

/// One component of a [`Path`].
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum PathItem {
    /// A field name. The empty name denotes the document root.
    FieldName(String),
    /// A list index.
    ArrayIndex(usize),
}

impl Path {
    pub fn empty() -> Path {
        Path(Vec::new())
    }

    pub fn from_field_names<I, S>(names: I) -> Path
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .map(|name| PathItem::FieldName(name.into()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathItem> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&PathItem> {
        self.0.last()
    }

    pub fn push(&mut self, item: PathItem) {
        self.0.push(item)
    }

    /// Appends `other` to this path, returning a new path.
    pub fn join(&self, other: impl AsRef<Self>) -> Self {
        let other = other.as_ref();
        let mut items = Vec::with_capacity(self.len() + other.len());
        items.extend(self.0.iter().cloned());
        items.extend(other.0.iter().cloned());
        Path(items)
    }

    pub fn with_field(&self, name: impl Into<String>) -> Self {
        let mut path = self.clone();
        path.push(PathItem::FieldName(name.into()));
        path
    }

    pub fn with_index(&self, index: usize) -> Self {
        let mut path = self.clone();
        path.push(PathItem::ArrayIndex(index));
        path
    }
}

impl AsRef<Path> for Path {
    fn as_ref(&self) -> &Path {
        self
    }
}

impl FromIterator<PathItem> for Path {
    fn from_iter<T: IntoIterator<Item = PathItem>>(iter: T) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl From<&str> for PathItem {
    fn from(name: &str) -> Self {
        PathItem::FieldName(name.to_string())
    }
}

impl From<usize> for PathItem {
    fn from(index: usize) -> Self {
        PathItem::ArrayIndex(index)
    }
}

impl fmt::Display for PathItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathItem::FieldName(name) if name.is_empty() => f.write_str("query"),
            PathItem::FieldName(name) => f.write_str(name),
            PathItem::ArrayIndex(index) => write!(f, "{index}"),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, item) in self.0.iter().enumerate() {
            if i != 0 {
                f.write_str(",")?;
            }
            write!(f, "{item}")?;
        }
        f.write_str("]")
    }
}

impl Serialize for PathItem {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            PathItem::FieldName(name) => serializer.serialize_str(name),
            PathItem::ArrayIndex(index) => serializer.serialize_u64(*index as u64),
        }
    }
}

impl<'de> Deserialize<'de> for PathItem {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(PathItemVisitor)
    }
}

struct PathItemVisitor;

impl de::Visitor<'_> for PathItemVisitor {
    type Value = PathItem;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a field name or a list index")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(PathItem::FieldName(v.to_string()))
    }

    fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(PathItem::FieldName(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        usize::try_from(v)
            .map(PathItem::ArrayIndex)
            .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        usize::try_from(v)
            .map(PathItem::ArrayIndex)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
    }
}
