//! Execution of a [`Plan`].

use std::collections::HashMap;
use std::time::Duration;

use futures::future;
use futures::future::BoxFuture;
use tokio::time::Instant;
use tracing::Instrument;

use super::BufPair;
use super::Field;
use super::Node;
use super::Object;
use super::SingleFetch;
use super::templating;
use crate::context::Context;
use crate::error::Error;
use crate::error::FetchError;
use crate::error::ResolveError;
use crate::graphql::Response;
use crate::json_ext::ByteString;
use crate::json_ext::Object as JsonObject;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::operation_report::Path;
use crate::operation_report::PathItem;
use crate::query_planner::Plan;

pub(crate) const FETCH_SPAN_NAME: &str = "fetch";

/// Marks a value that must be replaced by null in the nearest nullable
/// ancestor. The error explaining why has already been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InvalidValue;

type Resolved = (Result<Value, InvalidValue>, Vec<Error>);

/// Executes plans.
///
/// The resolver holds no state: one instance can serve any number of
/// concurrent requests.
#[derive(Clone, Debug, Default)]
pub struct Resolver;

impl Resolver {
    pub fn new() -> Self {
        Resolver
    }

    /// Executes the fetches of `plan` and assembles the response.
    ///
    /// Fetch failures and invalid values end up in the response errors.
    /// Only cancellation aborts resolution.
    pub async fn resolve(&self, plan: &Plan, context: &Context) -> Result<Response, ResolveError> {
        let context = context.with_variable_defaults(&plan.variable_defaults);
        let parameters = ExecutionParameters {
            context: &context,
            deadline: context
                .timeout()
                .and_then(|timeout| Instant::now().checked_add(timeout)),
        };
        let root = Value::Object(JsonObject::new());

        let (data, errors) = tokio::select! {
            biased;
            _ = context.cancellation().cancelled() => return Err(ResolveError::Cancelled),
            resolved = parameters.resolve_object(&plan.root, &root, Path::empty()) => resolved,
        };
        if context.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }

        tracing::debug!(errors = errors.len(), "operation resolved");
        Ok(Response::builder()
            .data(data.unwrap_or_default())
            .errors(errors)
            .build())
    }
}

struct ExecutionParameters<'a> {
    context: &'a Context,
    deadline: Option<Instant>,
}

impl<'a> ExecutionParameters<'a> {
    /// Runs the fetches of `object`, then projects its fields.
    ///
    /// `data` is the value the object was projected to in its parent.
    fn resolve_object<'b>(
        &'b self,
        object: &'b Object,
        data: &'b Value,
        path: Path,
    ) -> BoxFuture<'b, Resolved> {
        Box::pin(async move {
            let mut errors = Vec::new();
            let mut buffers = HashMap::new();

            if let Some(fetch) = &object.fetch {
                let fetched = future::join_all(
                    fetch
                        .fetches()
                        .iter()
                        .map(|fetch| self.fetch(object, fetch, data, &path)),
                )
                .await;
                for (buffer_id, result, fetch_errors) in fetched {
                    errors.extend(fetch_errors);
                    buffers.insert(buffer_id, result);
                }
            }

            let null = Value::Null;
            let variables = self.context.variables();
            let included: Vec<(Option<usize>, &Field)> = object
                .field_sets
                .iter()
                .flat_map(|field_set| {
                    field_set
                        .fields
                        .iter()
                        .map(move |field| (field_set.buffer_id, field))
                })
                .filter(|(_, field)| field.is_included(variables))
                .collect();

            let resolved = future::join_all(included.iter().map(|(buffer_id, field)| {
                let field_path = path.with_field(field.name.as_str());
                let buffers = &buffers;
                let null = &null;
                async move {
                    let source = match buffer_id {
                        None => data,
                        Some(id) => match buffers.get(id) {
                            Some(Ok(value)) => value,
                            Some(Err(error)) => {
                                let error = error.to_graphql_error(Some(field_path));
                                let value = if field.value.nullable() {
                                    Ok(Value::Null)
                                } else {
                                    Err(InvalidValue)
                                };
                                return (value, vec![error]);
                            }
                            None => null,
                        },
                    };
                    self.resolve_node(
                        &field.value,
                        source,
                        field_path,
                        &object.type_name,
                        &field.name,
                    )
                    .await
                }
            }))
            .await;

            let mut output = JsonObject::new();
            let mut invalid = false;
            for ((_, field), (value, field_errors)) in included.iter().zip(resolved) {
                errors.extend(field_errors);
                match value {
                    Ok(value) => {
                        output.insert(ByteString::from(field.name.as_str()), value);
                    }
                    Err(InvalidValue) => invalid = true,
                }
            }

            if invalid {
                (Err(InvalidValue), errors)
            } else {
                (Ok(Value::Object(output)), errors)
            }
        })
    }

    /// Projects `node` out of `source` and writes it at `path`.
    fn resolve_node<'b>(
        &'b self,
        node: &'b Node,
        source: &'b Value,
        path: Path,
        parent_type: &'b str,
        field_name: &'b str,
    ) -> BoxFuture<'b, Resolved> {
        Box::pin(async move {
            let value = match source.get_path(node.path()) {
                None | Some(Value::Null) => return null_value(node, path, parent_type, field_name),
                Some(value) => value,
            };

            match node {
                Node::Scalar(scalar) => {
                    if scalar.kind.accepts(value) {
                        (Ok(value.clone()), Vec::new())
                    } else {
                        invalid_value(node, path, parent_type, field_name, value)
                    }
                }
                Node::Object(object) => {
                    if !value.is_object() {
                        return invalid_value(node, path, parent_type, field_name, value);
                    }
                    let (resolved, errors) = self.resolve_object(object, value, path).await;
                    match resolved {
                        Err(InvalidValue) if object.nullable => (Ok(Value::Null), errors),
                        resolved => (resolved, errors),
                    }
                }
                Node::Array(array) => {
                    let Some(items) = value.as_array() else {
                        return invalid_value(node, path, parent_type, field_name, value);
                    };
                    let resolved = future::join_all(items.iter().enumerate().map(|(index, item)| {
                        self.resolve_item(
                            &array.item,
                            item,
                            path.with_index(index),
                            parent_type,
                            field_name,
                        )
                    }))
                    .await;

                    let mut errors = Vec::new();
                    let mut output = Vec::with_capacity(resolved.len());
                    let mut invalid = false;
                    for (value, item_errors) in resolved {
                        errors.extend(item_errors);
                        match value {
                            Ok(value) => output.push(value),
                            Err(InvalidValue) => invalid = true,
                        }
                    }
                    match (invalid, array.nullable) {
                        (false, _) => (Ok(Value::Array(output)), errors),
                        (true, true) => (Ok(Value::Null), errors),
                        (true, false) => (Err(InvalidValue), errors),
                    }
                }
            }
        })
    }

    /// Resolves one element of a list. Null elements are reported against
    /// their index.
    fn resolve_item<'b>(
        &'b self,
        item: &'b Node,
        value: &'b Value,
        path: Path,
        parent_type: &'b str,
        field_name: &'b str,
    ) -> BoxFuture<'b, Resolved> {
        Box::pin(async move {
            if value.is_null() && !item.nullable() {
                let index = match path.last() {
                    Some(PathItem::ArrayIndex(index)) => *index,
                    _ => 0,
                };
                let error = Error::builder()
                    .message(format!(
                        "Cannot return null for non-nullable array element of type {} at index {index}",
                        item.type_name()
                    ))
                    .path(path)
                    .build();
                return (Err(InvalidValue), vec![error]);
            }
            self.resolve_node(item, value, path, parent_type, field_name)
                .await
        })
    }

    /// Runs one fetch. Returns its buffer id with the parsed data, or the
    /// error that voids the buffer, and the errors reported upstream.
    async fn fetch(
        &self,
        object: &Object,
        fetch: &SingleFetch,
        data: &Value,
        path: &Path,
    ) -> (usize, Result<Value, FetchError>, Vec<Error>) {
        let buffer_id = fetch.buffer_id;
        let result = self
            .load(fetch, data)
            .instrument(tracing::info_span!(
                FETCH_SPAN_NAME,
                "graphql.path" = %path,
                buffer_id,
                "otel.kind" = "INTERNAL"
            ))
            .await;

        match result.and_then(|buf| parse_buffers(buffer_id, buf)) {
            Ok((value, errors)) => {
                let errors = errors
                    .into_iter()
                    .map(|mut error| {
                        error.path = error
                            .path
                            .map(|upstream| object.response_path(buffer_id, &upstream));
                        error.rebased(path)
                    })
                    .collect();
                (buffer_id, Ok(value), errors)
            }
            Err(error) => {
                if let FetchError::MalformedOutput { .. } = error {
                    failfast_error!(
                        "data source of fetch {} broke its contract: {}",
                        buffer_id,
                        error
                    );
                } else {
                    failfast_debug!("fetch {} at {} failed: {}", buffer_id, path, error);
                }
                (buffer_id, Err(error), Vec::new())
            }
        }
    }

    async fn load(&self, fetch: &SingleFetch, data: &Value) -> Result<BufPair, FetchError> {
        let input = templating::render(
            &fetch.input,
            &fetch.variables,
            self.context.variables(),
            data,
        )?;
        tracing::trace!(input = %String::from_utf8_lossy(&input), "fetch input rendered");

        let mut buf = BufPair::new();
        let load = fetch.data_source.load(self.context, &input, &mut buf);
        let loaded = tokio::select! {
            biased;
            _ = self.context.cancellation().cancelled() => Err(FetchError::Cancelled),
            loaded = with_deadline(self.deadline, self.context, load) => loaded,
        };
        loaded?;
        Ok(buf)
    }
}

async fn with_deadline(
    deadline: Option<Instant>,
    context: &Context,
    load: impl std::future::Future<Output = Result<(), FetchError>>,
) -> Result<(), FetchError> {
    match deadline {
        None => load.await,
        Some(deadline) => tokio::time::timeout_at(deadline, load)
            .await
            .map_err(|_| FetchError::Timeout {
                timeout_ms: context.timeout().map(timeout_ms).unwrap_or_default(),
            })?,
    }
}

fn timeout_ms(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

/// Reads the output of a data source.
fn parse_buffers(buffer_id: usize, buf: BufPair) -> Result<(Value, Vec<Error>), FetchError> {
    let malformed = |reason: String| FetchError::MalformedOutput { buffer_id, reason };

    let errors = if buf.has_errors() {
        serde_json::from_slice::<Vec<Error>>(&buf.errors)
            .map_err(|error| malformed(format!("errors: {error}")))?
    } else {
        Vec::new()
    };
    let value = if buf.has_data() {
        Value::from_bytes(buf.data.freeze()).map_err(|error| malformed(format!("data: {error}")))?
    } else {
        Value::Null
    };
    Ok((value, errors))
}

fn null_value(node: &Node, path: Path, parent_type: &str, field_name: &str) -> Resolved {
    if node.nullable() {
        return (Ok(Value::Null), Vec::new());
    }
    let error = Error::builder()
        .message(format!(
            "Cannot return null for non-nullable field {parent_type}.{field_name}"
        ))
        .path(path)
        .build();
    (Err(InvalidValue), vec![error])
}

fn invalid_value(
    node: &Node,
    path: Path,
    parent_type: &str,
    field_name: &str,
    value: &Value,
) -> Resolved {
    let error = Error::builder()
        .message(format!(
            "Invalid value found for field {parent_type}.{field_name}: expected {}, got {}",
            node.type_name(),
            value.kind()
        ))
        .path(path)
        .build();
    let value = if node.nullable() {
        Ok(Value::Null)
    } else {
        Err(InvalidValue)
    };
    (value, vec![error])
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;
    use crate::datasource::DataSource;
    use crate::resolve::Array;
    use crate::resolve::Condition;
    use crate::resolve::Fetch;
    use crate::resolve::FieldSet;
    use crate::resolve::Scalar;
    use crate::resolve::ScalarKind;
    use crate::resolve::Variable;

    /// Answers every load with a fixed payload. `$input` in `data` is
    /// replaced by the rendered input.
    #[derive(Debug, Default)]
    struct Static {
        data: &'static str,
        errors: &'static str,
        delay: Option<Duration>,
        fail: Option<FetchError>,
    }

    #[async_trait]
    impl DataSource for Static {
        async fn load(
            &self,
            _context: &Context,
            input: &[u8],
            buf: &mut BufPair,
        ) -> Result<(), FetchError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(error) = &self.fail {
                return Err(error.clone());
            }
            buf.data
                .extend_from_slice(self.data.replace("$input", std::str::from_utf8(input).unwrap()).as_bytes());
            buf.errors.extend_from_slice(self.errors.as_bytes());
            Ok(())
        }
    }

    fn scalar(path: &str, nullable: bool, kind: ScalarKind) -> Node {
        Node::Scalar(Scalar {
            path: vec![path.to_string()],
            nullable,
            type_name: format!("{kind:?}"),
            kind,
        })
    }

    fn field(name: &str, value: Node) -> Field {
        Field {
            name: name.to_string(),
            value,
            conditions: Vec::new(),
        }
    }

    fn fetch(buffer_id: usize, source: Static) -> SingleFetch {
        SingleFetch {
            buffer_id,
            input: Bytes::from_static(b"{}"),
            variables: Vec::new(),
            data_source: Arc::new(source),
        }
    }

    fn root(fetches: Vec<SingleFetch>, field_sets: Vec<FieldSet>) -> Plan {
        Plan {
            root: Object {
                path: Vec::new(),
                type_name: "Query".to_string(),
                nullable: true,
                fetch: Fetch::from_fetches(fetches),
                field_sets,
            },
            variable_defaults: JsonObject::new(),
        }
    }

    fn droid(buffer_id: usize, fields: Vec<Field>, nullable: bool) -> FieldSet {
        FieldSet {
            buffer_id: Some(buffer_id),
            fields: vec![field(
                "droid",
                Node::Object(Object {
                    path: vec!["droid".to_string()],
                    type_name: "Droid".to_string(),
                    nullable,
                    fetch: None,
                    field_sets: vec![FieldSet {
                        buffer_id: None,
                        fields,
                    }],
                }),
            )],
        }
    }

    async fn resolve(plan: &Plan, context: &Context) -> serde_json::Value {
        let response = Resolver::new().resolve(plan, context).await.unwrap();
        serde_json::to_value(response).unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn projects_upstream_keys_under_client_names() {
        let plan = root(
            vec![fetch(
                0,
                Static {
                    data: r#"{"droid":{"name":"R2-D2","primaryFunction":"Astromech"}}"#,
                    ..Default::default()
                },
            )],
            vec![droid(
                0,
                vec![
                    field("name", scalar("name", false, ScalarKind::String)),
                    field("aliased", scalar("name", false, ScalarKind::String)),
                    field("primaryFunction", scalar("primaryFunction", true, ScalarKind::String)),
                ],
                true,
            )],
        );

        assert_eq!(
            resolve(&plan, &Context::default()).await,
            serde_json::json!({
                "data": {"droid": {"name": "R2-D2", "aliased": "R2-D2", "primaryFunction": "Astromech"}}
            })
        );
    }

    #[tokio::test]
    async fn null_propagates_to_nearest_nullable_ancestor() {
        let plan = root(
            vec![fetch(
                0,
                Static {
                    data: r#"{"droid":{"name":null,"primaryFunction":"Astromech"}}"#,
                    ..Default::default()
                },
            )],
            vec![droid(
                0,
                vec![
                    field("name", scalar("name", false, ScalarKind::String)),
                    field("primaryFunction", scalar("primaryFunction", true, ScalarKind::String)),
                ],
                true,
            )],
        );

        assert_eq!(
            resolve(&plan, &Context::default()).await,
            serde_json::json!({
                "data": {"droid": null},
                "errors": [{
                    "message": "Cannot return null for non-nullable field Droid.name",
                    "path": ["droid", "name"]
                }]
            })
        );
    }

    #[tokio::test]
    async fn null_propagates_to_data() {
        let plan = root(
            vec![fetch(
                0,
                Static {
                    data: r#"{"droid":{}}"#,
                    ..Default::default()
                },
            )],
            vec![droid(0, vec![field("name", scalar("name", false, ScalarKind::String))], false)],
        );

        assert_eq!(
            resolve(&plan, &Context::default()).await,
            serde_json::json!({
                "data": null,
                "errors": [{
                    "message": "Cannot return null for non-nullable field Droid.name",
                    "path": ["droid", "name"]
                }]
            })
        );
    }

    #[tokio::test]
    async fn scalar_mismatch_is_a_field_error() {
        let plan = root(
            vec![fetch(
                0,
                Static {
                    data: r#"{"droid":{"name":"R2-D2","age":"old"}}"#,
                    ..Default::default()
                },
            )],
            vec![droid(
                0,
                vec![
                    field("name", scalar("name", false, ScalarKind::String)),
                    field("age", scalar("age", true, ScalarKind::Int)),
                ],
                true,
            )],
        );

        assert_eq!(
            resolve(&plan, &Context::default()).await,
            serde_json::json!({
                "data": {"droid": {"name": "R2-D2", "age": null}},
                "errors": [{
                    "message": "Invalid value found for field Droid.age: expected Int, got string",
                    "path": ["droid", "age"]
                }]
            })
        );
    }

    #[tokio::test]
    async fn transport_failure_nulls_the_fields_of_its_buffer() {
        let plan = root(
            vec![
                fetch(
                    0,
                    Static {
                        fail: Some(FetchError::SubrequestHttpError {
                            status_code: Some(500),
                            url: "http://droids".to_string(),
                            reason: "internal server error".to_string(),
                        }),
                        ..Default::default()
                    },
                ),
                fetch(
                    1,
                    Static {
                        data: r#"{"hero":{"name":"Luke"}}"#,
                        ..Default::default()
                    },
                ),
            ],
            vec![
                droid(0, vec![field("name", scalar("name", false, ScalarKind::String))], true),
                FieldSet {
                    buffer_id: Some(1),
                    fields: vec![field(
                        "hero",
                        Node::Object(Object {
                            path: vec!["hero".to_string()],
                            type_name: "Character".to_string(),
                            nullable: true,
                            fetch: None,
                            field_sets: vec![FieldSet {
                                buffer_id: None,
                                fields: vec![field("name", scalar("name", false, ScalarKind::String))],
                            }],
                        }),
                    )],
                },
            ],
        );

        let response = resolve(&plan, &Context::default()).await;
        assert_eq!(
            response["data"],
            serde_json::json!({"droid": null, "hero": {"name": "Luke"}})
        );
        assert_eq!(
            response["errors"],
            serde_json::json!([{
                "message": "HTTP fetch failed from 'http://droids': internal server error",
                "path": ["droid"],
                "extensions": {
                    "url": "http://droids",
                    "reason": "internal server error",
                    "code": "SUBREQUEST_HTTP_ERROR",
                    "http": {"status": 500}
                }
            }])
        );
    }

    #[tokio::test]
    async fn upstream_errors_are_rebased() {
        let plan = root(
            vec![fetch(
                0,
                Static {
                    data: r#"{"droid":{"name":"R2-D2"}}"#,
                    errors: r#"[{"message":"partial","path":["droid","friends"]}]"#,
                    ..Default::default()
                },
            )],
            vec![droid(0, vec![field("name", scalar("name", false, ScalarKind::String))], true)],
        );

        assert_eq!(
            resolve(&plan, &Context::default()).await,
            serde_json::json!({
                "data": {"droid": {"name": "R2-D2"}},
                "errors": [{"message": "partial", "path": ["droid", "friends"]}]
            })
        );
    }

    #[tokio::test]
    async fn upstream_error_paths_use_response_keys() {
        let friends = Node::Array(Array {
            path: vec!["friends".to_string()],
            nullable: true,
            item: Box::new(Node::Object(Object {
                path: Vec::new(),
                type_name: "Character".to_string(),
                nullable: true,
                fetch: None,
                field_sets: vec![FieldSet {
                    buffer_id: None,
                    fields: vec![field("alias", scalar("name", true, ScalarKind::String))],
                }],
            })),
        });
        let luke = Node::Object(Object {
            path: vec!["hero".to_string()],
            type_name: "Character".to_string(),
            nullable: true,
            fetch: None,
            field_sets: vec![FieldSet {
                buffer_id: None,
                fields: vec![
                    field("callsign", scalar("name", true, ScalarKind::String)),
                    field("friends", friends),
                ],
            }],
        });
        let plan = root(
            vec![fetch(
                0,
                Static {
                    data: r#"{"hero":{"name":null,"friends":[{"name":"Han"},{"name":null}]}}"#,
                    errors: r#"[
                        {"message":"no name","path":["hero","name"]},
                        {"message":"no friend name","path":["hero","friends",1,"name"]},
                        {"message":"no ships","path":["hero","starships"]}
                    ]"#,
                    ..Default::default()
                },
            )],
            vec![FieldSet {
                buffer_id: Some(0),
                fields: vec![field("luke", luke)],
            }],
        );

        assert_eq!(
            resolve(&plan, &Context::default()).await,
            serde_json::json!({
                "data": {
                    "luke": {"callsign": null, "friends": [{"alias": "Han"}, {"alias": null}]}
                },
                "errors": [
                    {"message": "no name", "path": ["luke", "callsign"]},
                    {"message": "no friend name", "path": ["luke", "friends", 1, "alias"]},
                    {"message": "no ships", "path": ["luke", "starships"]}
                ]
            })
        );
    }

    #[tokio::test]
    async fn array_elements() {
        let friends = Node::Array(Array {
            path: vec!["friends".to_string()],
            nullable: true,
            item: Box::new(Node::Object(Object {
                path: Vec::new(),
                type_name: "Character".to_string(),
                nullable: false,
                fetch: None,
                field_sets: vec![FieldSet {
                    buffer_id: None,
                    fields: vec![field("name", scalar("name", false, ScalarKind::String))],
                }],
            })),
        });
        let plan = root(
            vec![fetch(
                0,
                Static {
                    data: r#"{"droid":{"friends":[{"name":"Luke"},null]}}"#,
                    ..Default::default()
                },
            )],
            vec![droid(0, vec![field("friends", friends)], true)],
        );

        assert_eq!(
            resolve(&plan, &Context::default()).await,
            serde_json::json!({
                "data": {"droid": {"friends": null}},
                "errors": [{
                    "message": "Cannot return null for non-nullable array element of type Character! at index 1",
                    "path": ["droid", "friends", 1]
                }]
            })
        );
    }

    #[tokio::test]
    async fn conditions_use_variable_defaults() {
        let mut plan = root(
            vec![fetch(
                0,
                Static {
                    data: r#"{"droid":{"name":"R2-D2","primaryFunction":"Astromech"}}"#,
                    ..Default::default()
                },
            )],
            vec![droid(
                0,
                vec![
                    field("name", scalar("name", false, ScalarKind::String)),
                    Field {
                        conditions: vec![Condition::Include("verbose".to_string())],
                        ..field("primaryFunction", scalar("primaryFunction", true, ScalarKind::String))
                    },
                ],
                true,
            )],
        );

        assert_eq!(
            resolve(&plan, &Context::default()).await,
            serde_json::json!({"data": {"droid": {"name": "R2-D2"}}})
        );

        plan.variable_defaults = json!({"verbose": true}).as_object().unwrap().clone();
        assert_eq!(
            resolve(&plan, &Context::default()).await,
            serde_json::json!({"data": {"droid": {"name": "R2-D2", "primaryFunction": "Astromech"}}})
        );

        let context = Context::builder().variable("verbose", false).build();
        assert_eq!(
            resolve(&plan, &context).await,
            serde_json::json!({"data": {"droid": {"name": "R2-D2"}}})
        );
    }

    #[tokio::test]
    async fn nested_fetch_reads_enclosing_object() {
        let reviews = FieldSet {
            buffer_id: Some(1),
            fields: vec![field(
                "reviews",
                Node::Array(Array {
                    path: vec!["reviews".to_string()],
                    nullable: true,
                    item: Box::new(Node::Object(Object {
                        path: Vec::new(),
                        type_name: "Review".to_string(),
                        nullable: false,
                        fetch: None,
                        field_sets: vec![FieldSet {
                            buffer_id: None,
                            fields: vec![field("stars", scalar("stars", false, ScalarKind::Int))],
                        }],
                    })),
                }),
            )],
        };
        let nested = SingleFetch {
            buffer_id: 1,
            input: Bytes::from_static(br#"{"droid":$$0$$}"#),
            variables: vec![Variable::Object {
                path: vec!["name".to_string()],
            }],
            data_source: Arc::new(Static {
                data: r#"{"input":$input,"reviews":[{"stars":5}]}"#,
                ..Default::default()
            }),
        };
        let plan = root(
            vec![fetch(
                0,
                Static {
                    data: r#"{"droid":{"name":"R2-D2"}}"#,
                    ..Default::default()
                },
            )],
            vec![FieldSet {
                buffer_id: Some(0),
                fields: vec![field(
                    "droid",
                    Node::Object(Object {
                        path: vec!["droid".to_string()],
                        type_name: "Droid".to_string(),
                        nullable: true,
                        fetch: Some(Fetch::Single(nested)),
                        field_sets: vec![
                            FieldSet {
                                buffer_id: None,
                                fields: vec![field("name", scalar("name", false, ScalarKind::String))],
                            },
                            reviews,
                        ],
                    }),
                )],
            }],
        );

        assert_eq!(
            resolve(&plan, &Context::default()).await,
            serde_json::json!({
                "data": {"droid": {"name": "R2-D2", "reviews": [{"stars": 5}]}}
            })
        );
    }

    #[tokio::test]
    async fn missing_variable_fails_only_its_fetch() {
        let mut failing = fetch(
            0,
            Static {
                data: r#"{"droid":{"name":"R2-D2"}}"#,
                ..Default::default()
            },
        );
        failing.input = Bytes::from_static(br#"{"id":$$0$$}"#);
        failing.variables = vec![Variable::Context {
            path: vec!["id".to_string()],
        }];
        let plan = root(
            vec![
                failing,
                fetch(
                    1,
                    Static {
                        data: r#"{"hero":"Luke"}"#,
                        ..Default::default()
                    },
                ),
            ],
            vec![
                droid(0, vec![field("name", scalar("name", false, ScalarKind::String))], true),
                FieldSet {
                    buffer_id: Some(1),
                    fields: vec![field("hero", scalar("hero", true, ScalarKind::String))],
                },
            ],
        );

        let response = resolve(&plan, &Context::default()).await;
        assert_eq!(response["data"], serde_json::json!({"droid": null, "hero": "Luke"}));
        assert_eq!(
            response["errors"][0]["message"],
            "fetch requires variable 'id', but it was not provided"
        );
        assert_eq!(response["errors"][0]["path"], serde_json::json!(["droid"]));
    }

    #[tokio::test(start_paused = true)]
    async fn sibling_fetches_run_concurrently() {
        let slow = |data| Static {
            data,
            delay: Some(Duration::from_millis(100)),
            ..Default::default()
        };
        let plan = root(
            vec![
                fetch(0, slow(r#"{"a":"a"}"#)),
                fetch(1, slow(r#"{"b":"b"}"#)),
                fetch(2, slow(r#"{"c":"c"}"#)),
            ],
            ["a", "b", "c"]
                .into_iter()
                .enumerate()
                .map(|(buffer_id, name)| FieldSet {
                    buffer_id: Some(buffer_id),
                    fields: vec![field(name, scalar(name, true, ScalarKind::String))],
                })
                .collect(),
        );

        let start = Instant::now();
        let response = resolve(&plan, &Context::default()).await;
        assert!(start.elapsed() < Duration::from_millis(150));
        assert_eq!(response, serde_json::json!({"data": {"a": "a", "b": "b", "c": "c"}}));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_turns_hangs_into_timeouts() {
        let plan = root(
            vec![fetch(
                0,
                Static {
                    data: r#"{"a":"a"}"#,
                    delay: Some(Duration::from_secs(60)),
                    ..Default::default()
                },
            )],
            vec![FieldSet {
                buffer_id: Some(0),
                fields: vec![field("a", scalar("a", true, ScalarKind::String))],
            }],
        );
        let context = Context::builder().timeout(Duration::from_millis(50)).build();

        let response = resolve(&plan, &context).await;
        assert_eq!(
            response,
            serde_json::json!({
                "data": {"a": null},
                "errors": [{
                    "message": "fetch did not complete within 50ms",
                    "path": ["a"],
                    "extensions": {"timeout_ms": 50, "code": "SUBREQUEST_TIMEOUT"}
                }]
            })
        );
    }

    #[tokio::test]
    async fn unbounded_timeouts_do_not_overflow() {
        assert_eq!(timeout_ms(Duration::from_millis(50)), 50);
        assert_eq!(timeout_ms(Duration::MAX), u64::MAX);

        let plan = root(
            vec![fetch(
                0,
                Static {
                    data: r#"{"a":"a"}"#,
                    ..Default::default()
                },
            )],
            vec![FieldSet {
                buffer_id: Some(0),
                fields: vec![field("a", scalar("a", true, ScalarKind::String))],
            }],
        );
        let context = Context::builder().timeout(Duration::MAX).build();
        assert_eq!(
            resolve(&plan, &context).await,
            serde_json::json!({"data": {"a": "a"}})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_discards_the_response() {
        let plan = root(
            vec![fetch(
                0,
                Static {
                    data: r#"{"a":"a"}"#,
                    delay: Some(Duration::from_secs(60)),
                    ..Default::default()
                },
            )],
            vec![FieldSet {
                buffer_id: Some(0),
                fields: vec![field("a", scalar("a", true, ScalarKind::String))],
            }],
        );
        let context = Context::default();
        let cancel = context.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });

        assert_eq!(
            Resolver::new().resolve(&plan, &context).await,
            Err(ResolveError::Cancelled)
        );
    }
}
