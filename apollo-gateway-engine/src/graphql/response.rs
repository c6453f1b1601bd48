use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;

use crate::graphql::Error;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// A graphql response, as produced by the resolver.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Response {
    /// The response data. `null` when an error propagated to the root.
    #[serde(default)]
    pub data: Option<Value>,

    /// The optional graphql errors encountered.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<Error>,

    /// The optional graphql extensions.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Response {
    /// Constructor
    #[builder(visibility = "pub")]
    fn new(data: Option<Value>, errors: Vec<Error>, extensions: Map<ByteString, Value>) -> Self {
        Self {
            data,
            errors,
            extensions,
        }
    }

    /// append_errors moves `errors` to the end of the response errors.
    pub fn append_errors(&mut self, errors: &mut Vec<Error>) {
        self.errors.append(errors)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;
    use crate::graphql::Path;

    #[test]
    fn errors_are_omitted_when_empty() {
        let response = Response::builder()
            .data(json!({"droid": {"name": "R2-D2"}}))
            .build();
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"data":{"droid":{"name":"R2-D2"}}}"#
        );
    }

    #[test]
    fn null_data_is_kept() {
        let mut response = Response::builder().data(Value::Null).build();
        response.append_errors(&mut vec![
            Error::builder()
                .message("Cannot return null for non-nullable field Query.droid")
                .path(Path::from_field_names(["droid"]))
                .build(),
        ]);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({
                "data": null,
                "errors": [{
                    "message": "Cannot return null for non-nullable field Query.droid",
                    "path": ["droid"]
                }]
            })
        );
    }
}
