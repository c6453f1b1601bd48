//! The response tree produced by the planner and executed by the [`Resolver`].
//!
//! Every node carries the path of upstream response keys used to project the
//! raw data of a fetch. Objects may embed a [`Fetch`] whose result populates
//! the field sets naming its buffer.

use std::sync::Arc;

use bytes::Bytes;
use bytes::BytesMut;
use derivative::Derivative;
use serde::Serialize;
use serde::Serializer;

use crate::datasource::DataSource;
use crate::json_ext::Object as JsonObject;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::json_ext::object_get_path;
use crate::operation_report::Path;
use crate::operation_report::PathItem;

mod resolver;
pub(crate) mod templating;

pub use resolver::Resolver;

/// A node of the response tree.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum Node {
    Object(Object),
    Array(Array),
    Scalar(Scalar),
}

impl Node {
    pub fn path(&self) -> &[String] {
        match self {
            Node::Object(object) => &object.path,
            Node::Array(array) => &array.path,
            Node::Scalar(scalar) => &scalar.path,
        }
    }

    pub fn nullable(&self) -> bool {
        match self {
            Node::Object(object) => object.nullable,
            Node::Array(array) => array.nullable,
            Node::Scalar(scalar) => scalar.nullable,
        }
    }

    pub(crate) fn set_path(&mut self, path: Vec<String>) {
        match self {
            Node::Object(object) => object.path = path,
            Node::Array(array) => array.path = path,
            Node::Scalar(scalar) => scalar.path = path,
        }
    }

    pub(crate) fn set_nullable(&mut self, nullable: bool) {
        match self {
            Node::Object(object) => object.nullable = nullable,
            Node::Array(array) => array.nullable = nullable,
            Node::Scalar(scalar) => scalar.nullable = nullable,
        }
    }

    /// The GraphQL type of the values this node produces, list wrappers
    /// included.
    pub fn type_name(&self) -> String {
        let (name, nullable) = match self {
            Node::Object(object) => (object.type_name.clone(), object.nullable),
            Node::Scalar(scalar) => (scalar.type_name.clone(), scalar.nullable),
            Node::Array(array) => (format!("[{}]", array.item.type_name()), array.nullable),
        };
        if nullable { name } else { format!("{name}!") }
    }
}

/// An object in the response.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Object {
    pub path: Vec<String>,
    pub type_name: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch: Option<Fetch>,
    pub field_sets: Vec<FieldSet>,
}

impl Object {
    /// Translates `upstream`, a path into the data of the fetch `buffer_id`,
    /// into the response keys of this object's fields.
    ///
    /// Components no field is projected from are kept as they are.
    pub(crate) fn response_path(&self, buffer_id: usize, upstream: &Path) -> Path {
        let mut path = Vec::with_capacity(upstream.len());
        response_path_in_fields(self, Some(buffer_id), &upstream.0, &mut path);
        Path(path)
    }
}

fn response_path_in_fields(
    object: &Object,
    buffer_id: Option<usize>,
    upstream: &[PathItem],
    path: &mut Vec<PathItem>,
) {
    let Some((PathItem::FieldName(key), rest)) = upstream.split_first() else {
        path.extend_from_slice(upstream);
        return;
    };
    let field = object
        .field_sets
        .iter()
        .filter(|field_set| field_set.buffer_id == buffer_id)
        .flat_map(|field_set| &field_set.fields)
        .find(|field| field.value.path().first() == Some(key));
    match field {
        Some(field) => {
            path.push(PathItem::FieldName(field.name.clone()));
            response_path_in_node(&field.value, rest, path);
        }
        None => path.extend_from_slice(upstream),
    }
}

fn response_path_in_node(node: &Node, upstream: &[PathItem], path: &mut Vec<PathItem>) {
    match (node, upstream.split_first()) {
        (Node::Array(array), Some((PathItem::ArrayIndex(index), rest))) => {
            path.push(PathItem::ArrayIndex(*index));
            response_path_in_node(&array.item, rest, path);
        }
        (Node::Object(object), Some(_)) => response_path_in_fields(object, None, upstream, path),
        _ => path.extend_from_slice(upstream),
    }
}

/// A list in the response. `item` is applied to every element.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Array {
    pub path: Vec<String>,
    pub nullable: bool,
    pub item: Box<Node>,
}

/// A leaf value.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Scalar {
    pub path: Vec<String>,
    pub nullable: bool,
    pub type_name: String,
    #[serde(rename = "scalar")]
    pub kind: ScalarKind,
}

/// How a leaf value is checked before it is written to the response.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum ScalarKind {
    String,
    Int,
    Float,
    Boolean,
    Id,
    /// Custom scalars and enums, written as received.
    PassThrough,
}

impl ScalarKind {
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "String" => ScalarKind::String,
            "Int" => ScalarKind::Int,
            "Float" => ScalarKind::Float,
            "Boolean" => ScalarKind::Boolean,
            "ID" => ScalarKind::Id,
            _ => ScalarKind::PassThrough,
        }
    }

    /// Whether a non-null value can be written for this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ScalarKind::String => value.is_string(),
            ScalarKind::Int => value
                .as_i64()
                .is_some_and(|i| i32::try_from(i).is_ok()),
            ScalarKind::Float => value.is_number(),
            ScalarKind::Boolean => value.is_boolean(),
            ScalarKind::Id => value.is_string() || value.is_i64() || value.is_u64(),
            ScalarKind::PassThrough => true,
        }
    }
}

/// Fields projected from the same source.
///
/// With a `buffer_id` the fields read from the buffer of the fetch with that
/// id, otherwise from the data of the enclosing object.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FieldSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_id: Option<usize>,
    pub fields: Vec<Field>,
}

/// A field of the response, named as the client asked for it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub value: Node,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl Field {
    /// Evaluates `@skip` and `@include` conditions against the operation variables.
    pub fn is_included(&self, variables: &JsonObject) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::Skip(variable) => {
                variables.get(variable.as_str()) != Some(&Value::Bool(true))
            }
            Condition::Include(variable) => {
                variables.get(variable.as_str()) == Some(&Value::Bool(true))
            }
        })
    }
}

/// A `@skip` or `@include` directive whose `if` argument is a variable.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", content = "variable")]
pub enum Condition {
    Skip(String),
    Include(String),
}

/// The fetches of one object.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "fetches")]
pub enum Fetch {
    Single(SingleFetch),
    /// Fetches without dependencies between each other, executed concurrently.
    Parallel(Vec<SingleFetch>),
}

impl Fetch {
    pub(crate) fn from_fetches(mut fetches: Vec<SingleFetch>) -> Option<Fetch> {
        match fetches.len() {
            0 => None,
            1 => fetches.pop().map(Fetch::Single),
            _ => Some(Fetch::Parallel(fetches)),
        }
    }

    pub fn fetches(&self) -> &[SingleFetch] {
        match self {
            Fetch::Single(fetch) => std::slice::from_ref(fetch),
            Fetch::Parallel(fetches) => fetches,
        }
    }

    pub(crate) fn fetches_mut(&mut self) -> &mut [SingleFetch] {
        match self {
            Fetch::Single(fetch) => std::slice::from_mut(fetch),
            Fetch::Parallel(fetches) => fetches,
        }
    }
}

/// One request to a data source.
///
/// `input` is a template: placeholder `$$i$$` is replaced by the JSON value of
/// `variables[i]` before the request is sent.
#[derive(Clone, Derivative, Serialize)]
#[derivative(Debug, PartialEq)]
pub struct SingleFetch {
    pub buffer_id: usize,
    #[serde(serialize_with = "serialize_input")]
    pub input: Bytes,
    pub variables: Vec<Variable>,
    #[serde(skip)]
    #[derivative(Debug = "ignore", PartialEq = "ignore")]
    pub data_source: Arc<dyn DataSource>,
}

fn serialize_input<S: Serializer>(input: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(input))
}

/// Where the value of a placeholder comes from.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum Variable {
    /// The operation variables.
    Context { path: Vec<String> },
    /// The data of the object embedding the fetch.
    Object { path: Vec<String> },
}

impl Variable {
    pub fn path(&self) -> &[String] {
        match self {
            Variable::Context { path } | Variable::Object { path } => path,
        }
    }

    pub(crate) fn resolve<'a>(
        &self,
        variables: &'a JsonObject,
        data: &'a Value,
    ) -> Option<&'a Value> {
        match self {
            Variable::Context { path } => object_get_path(variables, path),
            Variable::Object { path } => data.get_path(path),
        }
    }
}

/// The raw output of one fetch.
#[derive(Debug, Default)]
pub struct BufPair {
    pub data: BytesMut,
    pub errors: BytesMut,
}

impl BufPair {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;

    fn scalar(name: &str, nullable: bool) -> Node {
        Node::Scalar(Scalar {
            path: vec![name.to_string()],
            nullable,
            type_name: "String".to_string(),
            kind: ScalarKind::String,
        })
    }

    #[test]
    fn scalar_kinds() {
        assert!(ScalarKind::Int.accepts(&json!(42)));
        assert!(!ScalarKind::Int.accepts(&json!(4_000_000_000i64)));
        assert!(!ScalarKind::Int.accepts(&json!("42")));
        assert!(ScalarKind::Id.accepts(&json!("2001")));
        assert!(ScalarKind::Id.accepts(&json!(2001)));
        assert!(!ScalarKind::Id.accepts(&json!(true)));
        assert!(ScalarKind::Float.accepts(&json!(1)));
        assert!(ScalarKind::PassThrough.accepts(&json!({"lat": 1.0})));
        assert_eq!(ScalarKind::from_type_name("Episode"), ScalarKind::PassThrough);
    }

    #[test]
    fn conditions() {
        let field = Field {
            name: "name".to_string(),
            value: scalar("name", true),
            conditions: vec![
                Condition::Skip("hide".to_string()),
                Condition::Include("show".to_string()),
            ],
        };
        let variables = json!({"hide": false, "show": true});
        assert!(field.is_included(variables.as_object().unwrap()));
        let variables = json!({"hide": true, "show": true});
        assert!(!field.is_included(variables.as_object().unwrap()));
        let variables = json!({"hide": false});
        assert!(!field.is_included(variables.as_object().unwrap()));
    }

    #[test]
    fn type_names() {
        let array = Node::Array(Array {
            path: vec!["friends".to_string()],
            nullable: true,
            item: Box::new(Node::Object(Object {
                type_name: "Character".to_string(),
                ..Default::default()
            })),
        });
        assert_eq!(array.type_name(), "[Character!]");
        assert_eq!(scalar("name", false).type_name(), "String!");
    }

    #[test]
    fn variables_resolve_from_their_source() {
        let variables = json!({"id": "2001"});
        let data = json!({"name": "R2-D2"});
        let context = Variable::Context {
            path: vec!["id".to_string()],
        };
        let object = Variable::Object {
            path: vec!["name".to_string()],
        };
        assert_eq!(
            context.resolve(variables.as_object().unwrap(), &data),
            Some(&json!("2001"))
        );
        assert_eq!(
            object.resolve(variables.as_object().unwrap(), &data),
            Some(&json!("R2-D2"))
        );
    }
}
