//! Builds the response tree of an operation.
//!
//! Every root field starts a fetch on the data source configured for it.
//! Nested fields join the fetch in flight unless a different data source is
//! configured for them, in which case they start a fetch embedded in their
//! enclosing object.

use std::sync::Arc;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::ast::OperationType;
use apollo_compiler::ast::Type;
use apollo_compiler::executable::Operation;
use apollo_compiler::executable::SelectionSet;
use serde::Serialize;
use serde_json_bytes::ByteString;

use crate::datasource::FetchRequest;
use crate::datasource::UpstreamField;
use crate::error::PlanningError;
use crate::json_ext::Object as JsonObject;
use crate::json_ext::const_value_to_json;
use crate::operation_report::ExternalError;
use crate::operation_report::Path;
use crate::operation_report::PathItem;
use crate::operation_report::Report;
use crate::resolve::Array;
use crate::resolve::Fetch;
use crate::resolve::Field;
use crate::resolve::FieldSet;
use crate::resolve::Node;
use crate::resolve::Object;
use crate::resolve::Scalar;
use crate::resolve::ScalarKind;
use crate::resolve::SingleFetch;
use crate::resolve::Variable;

mod configuration;
mod selection;

pub use self::configuration::Argument;
pub use self::configuration::ArgumentSource;
pub use self::configuration::ArgumentsConfig;
pub use self::configuration::DataSourceAttribute;
pub use self::configuration::DataSourceConfiguration;
pub use self::configuration::FieldConfig;
use self::selection::CollectedField;
use self::selection::FieldCollector;

/// The response tree of one operation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Plan {
    pub root: Object,
    /// Default values of the operation variables.
    #[serde(skip_serializing_if = "JsonObject::is_empty")]
    pub variable_defaults: JsonObject,
}

/// Plans operations against a registry of data sources.
///
/// The first configuration serving a `(type, field)` pair wins.
#[derive(Clone, Debug)]
pub struct Planner {
    data_sources: Arc<Vec<DataSourceConfiguration>>,
}

impl Planner {
    pub fn new(data_sources: Vec<DataSourceConfiguration>) -> Self {
        Planner {
            data_sources: Arc::new(data_sources),
        }
    }

    pub fn data_sources(&self) -> &[DataSourceConfiguration] {
        &self.data_sources
    }

    /// Plans the operation named `operation_name`, or the only operation of
    /// `document`.
    ///
    /// Planning does not look at variable values: the same plan can be
    /// resolved with any set of variables.
    pub fn plan(
        &self,
        document: &ExecutableDocument,
        operation_name: Option<&str>,
    ) -> Result<Plan, PlanningError> {
        let operation =
            document
                .operations
                .get(operation_name)
                .map_err(|_| PlanningError::UnknownOperation {
                    name: operation_name.unwrap_or("<anonymous>").to_string(),
                })?;

        let mut walker = PlanningWalker {
            data_sources: &self.data_sources,
            document,
            operation,
            report: Report::default(),
            next_buffer_id: 0,
        };
        let root = walker.plan_root()?;
        if walker.report.has_errors() {
            return Err(PlanningError::Diagnostics(walker.report));
        }

        let variable_defaults = operation
            .variables
            .iter()
            .filter_map(|definition| {
                let default = definition.default_value.as_ref()?;
                Some((
                    ByteString::from(definition.name.as_str()),
                    const_value_to_json(default)?,
                ))
            })
            .collect();

        tracing::debug!(
            operation = operation_name.unwrap_or_default(),
            fetches = walker.next_buffer_id,
            "operation planned"
        );
        Ok(Plan {
            root,
            variable_defaults,
        })
    }
}

struct PlanningWalker<'a> {
    data_sources: &'a [DataSourceConfiguration],
    document: &'a ExecutableDocument,
    operation: &'a Operation,
    report: Report,
    next_buffer_id: usize,
}

impl<'a> PlanningWalker<'a> {
    fn plan_root(&mut self) -> Result<Object, PlanningError> {
        let operation = self.operation;
        let path = Path(vec![PathItem::FieldName(String::new())]);
        let (mut root, _) = self.plan_object(
            operation.selection_set.ty.as_str(),
            &[&operation.selection_set],
            None,
            &path,
        )?;
        root.nullable = true;
        Ok(root)
    }

    fn configuration_for(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> Option<&'a DataSourceConfiguration> {
        self.data_sources
            .iter()
            .find(|configuration| configuration.serves(type_name, field_name))
    }

    /// Plans the object selected by `selection_sets`.
    ///
    /// `in_flight` is the configuration of the fetch the object's data comes
    /// from; only the root object has none. Returns the object and what it
    /// needs selected upstream in that fetch.
    fn plan_object(
        &mut self,
        type_name: &str,
        selection_sets: &[&'a SelectionSet],
        in_flight: Option<&'a DataSourceConfiguration>,
        path: &Path,
    ) -> Result<(Object, Vec<UpstreamField>), PlanningError> {
        let collected =
            FieldCollector::new(self.document, &mut self.report).collect(selection_sets, path);

        let mut upstream = Vec::new();
        let mut field_sets: Vec<FieldSet> = Vec::new();
        let mut fetches = Vec::new();

        for (response_key, collected) in collected {
            let field = collected.first();
            let field_path = path.with_field(response_key.as_str());
            let configuration = self.configuration_for(type_name, field.name.as_str());

            let boundary = match (in_flight, configuration) {
                (None, None) => {
                    self.report.add_external_error(
                        ExternalError::field_undefined_on_type(&field.name, type_name)
                            .with_path(field_path),
                    );
                    continue;
                }
                (None, Some(next)) => Some(next),
                (Some(_), None) => None,
                (Some(current), Some(next)) => {
                    (!next.planner.can_extend(current, next)).then_some(next)
                }
            };

            match boundary {
                Some(configuration) => {
                    let operation_type = match in_flight {
                        None => self.operation.operation_type,
                        Some(_) => OperationType::Query,
                    };
                    let Some((value, fetch)) = self.plan_fetch(
                        type_name,
                        &collected,
                        configuration,
                        operation_type,
                        &field_path,
                    )?
                    else {
                        continue;
                    };
                    field_sets.push(FieldSet {
                        buffer_id: Some(fetch.buffer_id),
                        fields: vec![Field {
                            name: response_key,
                            value,
                            conditions: collected.conditions,
                        }],
                    });
                    fetches.push(fetch);
                }
                None => {
                    let Some(in_flight) = in_flight else {
                        continue;
                    };
                    let (mut value, selections) =
                        self.plan_value(&collected, in_flight, &field_path)?;
                    let upstream_key = merge_upstream_field(
                        &mut upstream,
                        UpstreamField {
                            alias: None,
                            name: field.name.to_string(),
                            arguments: field.arguments.clone(),
                            selections,
                        },
                        &response_key,
                    );
                    rekey(&mut value, &upstream_key.rekeyed);
                    value.set_path(vec![upstream_key.key]);
                    let field = Field {
                        name: response_key,
                        value,
                        conditions: collected.conditions,
                    };
                    match field_sets.last_mut() {
                        Some(field_set) if field_set.buffer_id.is_none() => {
                            field_set.fields.push(field)
                        }
                        _ => field_sets.push(FieldSet {
                            buffer_id: None,
                            fields: vec![field],
                        }),
                    }
                }
            }
        }

        // Fields the nested fetches read from this object are selected too.
        for fetch in &mut fetches {
            for variable in &mut fetch.variables {
                let Variable::Object { path } = variable else {
                    continue;
                };
                let Some(name) = path.first_mut() else {
                    continue;
                };
                let planned = name.clone();
                let field = UpstreamField::new(planned.as_str());
                *name = merge_upstream_field(&mut upstream, field, &planned).key;
            }
        }

        let object = Object {
            path: Vec::new(),
            type_name: type_name.to_string(),
            nullable: true,
            fetch: Fetch::from_fetches(fetches),
            field_sets,
        };
        Ok((object, upstream))
    }

    /// Plans the value of a field served by `in_flight`, with an empty path.
    fn plan_value(
        &mut self,
        collected: &CollectedField<'a>,
        in_flight: &'a DataSourceConfiguration,
        path: &Path,
    ) -> Result<(Node, Vec<UpstreamField>), PlanningError> {
        let field = collected.first();
        let ty = field.ty();
        let type_name = ty.inner_named_type().as_str();

        let (leaf, selections) = if field.selection_set.selections.is_empty() {
            let scalar = Scalar {
                path: Vec::new(),
                nullable: true,
                type_name: type_name.to_string(),
                kind: ScalarKind::from_type_name(type_name),
            };
            (Node::Scalar(scalar), Vec::new())
        } else {
            let (object, selections) = self.plan_object(
                type_name,
                &collected.selection_sets(),
                Some(in_flight),
                path,
            )?;
            (Node::Object(object), selections)
        };

        Ok((wrap_type(ty, leaf), selections))
    }

    /// Plans a fetch rooted at the field `collected`.
    ///
    /// Returns `None` when the data source reported diagnostics, which are
    /// added to the report.
    fn plan_fetch(
        &mut self,
        type_name: &str,
        collected: &CollectedField<'a>,
        configuration: &'a DataSourceConfiguration,
        operation_type: OperationType,
        path: &Path,
    ) -> Result<Option<(Node, SingleFetch)>, PlanningError> {
        let buffer_id = self.next_buffer_id;
        self.next_buffer_id += 1;

        let field = collected.first();
        let (mut value, selections) = self.plan_value(collected, configuration, path)?;
        value.set_path(vec![field.name.to_string()]);

        let upstream = UpstreamField {
            alias: None,
            name: field.name.to_string(),
            arguments: field.arguments.clone(),
            selections,
        };
        let request = FetchRequest {
            operation_type,
            type_name,
            field: &upstream,
            definition: &field.definition,
            variable_definitions: &self.operation.variables,
            operation_name: self.operation.name.as_ref().map(|name| name.as_str()),
        };

        match configuration.planner.plan(configuration, &request) {
            Ok(planned) => {
                tracing::trace!(
                    buffer_id,
                    input = %String::from_utf8_lossy(&planned.input),
                    "fetch planned"
                );
                let fetch = SingleFetch {
                    buffer_id,
                    input: planned.input,
                    variables: planned.variables,
                    data_source: planned.data_source,
                };
                Ok(Some((value, fetch)))
            }
            Err(PlanningError::Diagnostics(report)) => {
                for error in report.external_errors {
                    let error = if error.path.is_empty() {
                        error.with_path(path.clone())
                    } else {
                        error
                    };
                    self.report.add_external_error(error);
                }
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}

/// Where a selection landed in the upstream response.
#[derive(Debug)]
struct UpstreamKey {
    key: String,
    /// Children merged under another key than the one they were planned with.
    rekeyed: Vec<(String, UpstreamKey)>,
}

/// Adds `field` to `selections`, merging it with an identical selection.
///
/// The field is aliased when its name is already a key of `selections`,
/// preferably with `response_key`, otherwise with the first free suffixed
/// variant of it.
fn merge_upstream_field(
    selections: &mut Vec<UpstreamField>,
    mut field: UpstreamField,
    response_key: &str,
) -> UpstreamKey {
    let arguments = field.arguments_key();
    if let Some(existing) = selections
        .iter_mut()
        .find(|existing| existing.name == field.name && existing.arguments_key() == arguments)
    {
        let mut rekeyed = Vec::new();
        for selection in field.selections {
            let planned = selection.response_key().to_string();
            let merged = merge_upstream_field(&mut existing.selections, selection, &planned);
            if merged.key != planned || !merged.rekeyed.is_empty() {
                rekeyed.push((planned, merged));
            }
        }
        return UpstreamKey {
            key: existing.response_key().to_string(),
            rekeyed,
        };
    }

    let taken = |key: &str| {
        selections
            .iter()
            .any(|existing| existing.response_key() == key)
    };
    if taken(field.name.as_str()) {
        let mut alias = response_key.to_string();
        let mut suffix = 1;
        while taken(alias.as_str()) {
            alias = format!("{response_key}_{suffix}");
            suffix += 1;
        }
        field.alias = Some(alias);
    }
    let key = field.response_key().to_string();
    selections.push(field);
    UpstreamKey {
        key,
        rekeyed: Vec::new(),
    }
}

fn rekeyed_as<'r>(rekeyed: &'r [(String, UpstreamKey)], key: &str) -> Option<&'r UpstreamKey> {
    rekeyed
        .iter()
        .find(|(planned, _)| planned == key)
        .map(|(_, merged)| merged)
}

/// Points the fields of `node` that read the enclosing data at the keys their
/// selections were merged under.
fn rekey(node: &mut Node, rekeyed: &[(String, UpstreamKey)]) {
    if rekeyed.is_empty() {
        return;
    }
    match node {
        Node::Scalar(_) => {}
        Node::Array(array) => rekey(&mut array.item, rekeyed),
        Node::Object(object) => {
            let fields = object
                .field_sets
                .iter_mut()
                .filter(|field_set| field_set.buffer_id.is_none())
                .flat_map(|field_set| field_set.fields.iter_mut());
            for field in fields {
                let Some(merged) = field
                    .value
                    .path()
                    .first()
                    .and_then(|key| rekeyed_as(rekeyed, key))
                else {
                    continue;
                };
                rekey(&mut field.value, &merged.rekeyed);
                field.value.set_path(vec![merged.key.clone()]);
            }
            for fetch in object.fetch.iter_mut().flat_map(Fetch::fetches_mut) {
                for variable in &mut fetch.variables {
                    let Variable::Object { path } = variable else {
                        continue;
                    };
                    let Some(merged) = path.first().and_then(|key| rekeyed_as(rekeyed, key)) else {
                        continue;
                    };
                    path[0] = merged.key.clone();
                }
            }
        }
    }
}

/// Wraps `leaf` in the list and nullability wrappers of `ty`.
fn wrap_type(ty: &Type, mut leaf: Node) -> Node {
    match ty {
        Type::Named(_) | Type::NonNullNamed(_) => {
            leaf.set_nullable(!ty.is_non_null());
            leaf
        }
        Type::List(inner) | Type::NonNullList(inner) => Node::Array(Array {
            path: Vec::new(),
            nullable: !ty.is_non_null(),
            item: Box::new(wrap_type(inner, leaf)),
        }),
    }
}
