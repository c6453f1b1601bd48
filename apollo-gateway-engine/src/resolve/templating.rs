//! Placeholder substitution for fetch inputs.
//!
//! A placeholder is `$$` followed by a decimal index and `$$`. Anything else
//! starting with `$$` is copied as is.

use memchr::memmem;

use super::Variable;
use crate::error::FetchError;
use crate::json_ext::Object;
use crate::json_ext::Value;

const MARKER: &[u8] = b"$$";

/// Renders `template`, replacing placeholder `i` with the JSON encoding of
/// `variables[i]`.
pub(crate) fn render(
    template: &[u8],
    variables: &[Variable],
    operation_variables: &Object,
    data: &Value,
) -> Result<Vec<u8>, FetchError> {
    let mut out = Vec::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = memmem::find(rest, MARKER) {
        out.extend_from_slice(&rest[..start]);
        let after = &rest[start + MARKER.len()..];
        let digits = after.iter().take_while(|b| b.is_ascii_digit()).count();

        let index = if digits > 0 && after[digits..].starts_with(MARKER) {
            std::str::from_utf8(&after[..digits])
                .ok()
                .and_then(|digits| digits.parse::<usize>().ok())
        } else {
            None
        };

        match index {
            Some(index) => {
                let variable = variables
                    .get(index)
                    .ok_or(FetchError::UnknownPlaceholder { index })?;
                let value = variable.resolve(operation_variables, data).ok_or_else(|| {
                    FetchError::MissingVariable {
                        path: variable.path().join("."),
                    }
                })?;
                serde_json::to_writer(&mut out, value).map_err(|error| {
                    FetchError::MalformedInput {
                        reason: error.to_string(),
                    }
                })?;
                rest = &after[digits + MARKER.len()..];
            }
            None => {
                out.extend_from_slice(MARKER);
                rest = after;
            }
        }
    }
    out.extend_from_slice(rest);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;

    fn context(path: &[&str]) -> Variable {
        Variable::Context {
            path: path.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn render_str(template: &str, variables: &[Variable], vars: Value, data: Value) -> String {
        let rendered = render(
            template.as_bytes(),
            variables,
            vars.as_object().unwrap(),
            &data,
        )
        .unwrap();
        String::from_utf8(rendered).unwrap()
    }

    #[test]
    fn placeholders_are_replaced_by_json() {
        let rendered = render_str(
            r#"{"variables":{"id":$$0$$,"filter":$$1$$}}"#,
            &[context(&["id"]), context(&["input", "filter"])],
            json!({"id": "2001", "input": {"filter": {"first": 3}}}),
            json!({}),
        );
        assert_eq!(
            rendered,
            r#"{"variables":{"id":"2001","filter":{"first":3}}}"#
        );
    }

    #[test]
    fn object_variables_read_enclosing_data() {
        let rendered = render_str(
            r#"{"name":$$0$$}"#,
            &[Variable::Object {
                path: vec!["name".to_string()],
            }],
            json!({}),
            json!({"name": "R2-D2"}),
        );
        assert_eq!(rendered, r#"{"name":"R2-D2"}"#);
    }

    #[test]
    fn malformed_markers_are_copied() {
        let rendered = render_str(
            r#"{"a":"$$","b":"$$x$$","c":"$$12","d":$$0$$}"#,
            &[context(&["id"])],
            json!({"id": 1}),
            json!({}),
        );
        assert_eq!(rendered, r#"{"a":"$$","b":"$$x$$","c":"$$12","d":1}"#);
    }

    #[test]
    fn missing_variable_fails_the_fetch() {
        let error = render(
            b"$$0$$",
            &[context(&["input", "id"])],
            json!({"input": {}}).as_object().unwrap(),
            &json!({}),
        )
        .unwrap_err();
        assert_eq!(
            error,
            FetchError::MissingVariable {
                path: "input.id".to_string()
            }
        );
    }

    #[test]
    fn placeholder_without_variable_fails_the_fetch() {
        let error = render(b"$$3$$", &[], &Object::new(), &json!({})).unwrap_err();
        assert_eq!(error, FetchError::UnknownPlaceholder { index: 3 });
    }

    #[test]
    fn placeholder_index_overflow_is_copied() {
        let rendered = render_str("$$99999999999999999999999$$", &[], json!({}), json!({}));
        assert_eq!(rendered, "$$99999999999999999999999$$");
    }
}
