//! Performance oriented JSON helpers built on [`serde_json_bytes`].

use apollo_compiler::ast;
pub use serde_json_bytes::ByteString;
pub use serde_json_bytes::Map;
pub use serde_json_bytes::Value;

/// A JSON object.
pub type Object = Map<ByteString, Value>;

/// Extension trait for [`serde_json_bytes::Value`].
pub(crate) trait ValueExt {
    /// Follows `path` through nested objects. An empty path returns `self`.
    fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value>;

    /// The JSON kind of this value, for error messages.
    fn kind(&self) -> &'static str;
}

impl ValueExt for Value {
    fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let mut current = self;
        for key in path {
            current = current.as_object()?.get(key.as_ref())?;
        }
        Some(current)
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

/// Follows `path` through an object of variables.
pub(crate) fn object_get_path<'a, S: AsRef<str>>(
    object: &'a Object,
    path: &[S],
) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    object.get(first.as_ref())?.get_path(rest)
}

/// Converts a constant GraphQL value to JSON.
///
/// Returns `None` when the value references a variable.
pub(crate) fn const_value_to_json(value: &ast::Value) -> Option<Value> {
    Some(match value {
        ast::Value::Null => Value::Null,
        ast::Value::Boolean(b) => Value::Bool(*b),
        ast::Value::String(s) => Value::String(s.as_str().into()),
        ast::Value::Enum(name) => Value::String(name.as_str().into()),
        ast::Value::Int(i) => Value::Number(serde_json::from_str(i.as_str()).ok()?),
        ast::Value::Float(f) => Value::Number(serde_json::from_str(f.as_str()).ok()?),
        ast::Value::List(items) => Value::Array(
            items
                .iter()
                .map(|item| const_value_to_json(item))
                .collect::<Option<Vec<_>>>()?,
        ),
        ast::Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| {
                    const_value_to_json(value).map(|v| (ByteString::from(name.as_str()), v))
                })
                .collect::<Option<Object>>()?,
        ),
        ast::Value::Variable(_) => return None,
    })
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn get_path_follows_objects() {
        let value = json!({"droid": {"name": "R2-D2", "friends": [{"name": "Luke"}]}});
        assert_eq!(value.get_path(&["droid", "name"]), Some(&json!("R2-D2")));
        assert_eq!(value.get_path::<&str>(&[]), Some(&value));
        assert_eq!(value.get_path(&["droid", "friends", "name"]), None);
        assert_eq!(value.get_path(&["hero"]), None);
    }

    #[test]
    fn variables_lookup() {
        let variables = json!({"input": {"id": 1}});
        let variables = variables.as_object().unwrap();
        assert_eq!(object_get_path(variables, &["input", "id"]), Some(&json!(1)));
        assert_eq!(object_get_path::<&str>(variables, &[]), None);
    }
}
