//! Types related to GraphQL requests, responses, etc.

mod response;

use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;

pub use self::response::Response;
use crate::json_ext::Object;
use crate::json_ext::Value;
pub use crate::operation_report::Location;
pub use crate::operation_report::Path;

/// A [GraphQL error](https://spec.graphql.org/October2021/#sec-Errors)
/// as may be found in the `errors` field of a GraphQL [`Response`].
///
/// Converted to (or from) JSON with serde.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[non_exhaustive]
pub struct Error {
    /// The error message.
    pub message: String,

    /// The locations of the error in the GraphQL document of the originating request.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,

    /// If this is a field error, the JSON path to that field in [`Response::data`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Path>,

    /// The optional GraphQL extensions for this error.
    #[serde(skip_serializing_if = "Object::is_empty")]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Error {
    /// Returns a builder that builds a GraphQL [`Error`] from its components.
    ///
    /// Builder methods:
    ///
    /// * `.message(impl Into<`[`String`]`>)`
    ///   Required.
    ///   Sets [`Error::message`].
    ///
    /// * `.locations(impl Into<`[`Vec`]`<`[`Location`]`>>)`
    ///   Optional.
    ///   Sets the entire `Vec` of [`Error::locations`], which defaults to the empty.
    ///
    /// * `.path(impl Into<`[`Path`]`>)`
    ///   Optional.
    ///   Sets [`Error::path`].
    ///
    /// * `.extensions(impl Into<`[`serde_json_bytes::Map`]`<`[`ByteString`]`, `[`Value`]`>>)`
    ///   Optional.
    ///   Sets the entire [`Error::extensions`] map, which defaults to empty.
    ///
    /// * `.extension_code(impl Into<`[`String`]`>)`
    ///   Optional.
    ///   Sets the "code" in the extension map. Will be ignored if extension already has this key
    ///   set.
    ///
    /// * `.build()`
    ///   Finishes the builder and returns a GraphQL [`Error`].
    #[builder(visibility = "pub")]
    fn new(
        message: String,
        locations: Vec<Location>,
        path: Option<Path>,
        extension_code: Option<String>,
        // Skip the `Object` type alias in order to use buildstructor's map special-casing
        mut extensions: JsonMap<ByteString, Value>,
    ) -> Self {
        if let Some(code) = extension_code {
            extensions
                .entry("code")
                .or_insert(Value::String(ByteString::from(code)));
        }
        Self {
            message,
            locations,
            path,
            extensions,
        }
    }

    /// Rebases the error path onto `base`.
    ///
    /// Errors reported by a data source are relative to the data of the fetch
    /// that produced them; errors without a path are attributed to `base`.
    pub(crate) fn rebased(mut self, base: &Path) -> Self {
        self.path = match self.path.take() {
            Some(path) => Some(base.join(path)),
            None if base.is_empty() => None,
            None => Some(base.clone()),
        };
        self
    }
}

/// Trait used to get extension type from an error
pub(crate) trait ErrorExtension
where
    Self: Sized,
{
    fn extension_code(&self) -> String;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn error_builder_sets_code_once() {
        let error = Error::builder()
            .message("boom")
            .extension("code", "ALREADY_SET")
            .extension_code("IGNORED")
            .build();
        assert_eq!(error.extensions.get("code"), Some(&json!("ALREADY_SET")));
    }

    #[test]
    fn upstream_error_is_rebased() {
        let error: Error = serde_json::from_str(
            r#"{"message":"not found","path":["reviews",0,"stars"],"extensions":{"code":"NOT_FOUND"}}"#,
        )
        .unwrap();
        let rebased = error.rebased(&Path::from_field_names(["droid"]));
        assert_eq!(
            serde_json::to_value(&rebased).unwrap(),
            serde_json::json!({
                "message": "not found",
                "path": ["droid", "reviews", 0, "stars"],
                "extensions": {"code": "NOT_FOUND"}
            })
        );
    }

    #[test]
    fn error_without_path_is_attributed_to_base() {
        let error = Error::builder().message("oops").build();
        assert_eq!(error.clone().rebased(&Path::empty()).path, None);
        assert_eq!(
            error.rebased(&Path::from_field_names(["droid"])).path,
            Some(Path::from_field_names(["droid"]))
        );
    }
}
