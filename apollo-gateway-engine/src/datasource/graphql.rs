//! GraphQL over HTTP data source.
//!
//! The input of a fetch is `{"url": ..., "headers": {...}, "body": {"query":
//! ..., "variables": {...}}}`; `body` is posted as is to `url`.

use std::collections::BTreeMap;
use std::sync::Arc;

use apollo_compiler::Node;
use apollo_compiler::ast;
use apollo_compiler::ast::OperationType;
use async_trait::async_trait;
use bytes::Bytes;
use indexmap::IndexMap;
use reqwest::header::ACCEPT;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde::de::Error as _;
use serde_json::value::RawValue;

use super::DataSource;
use super::DataSourcePlanner;
use super::FetchRequest;
use super::PlannedFetch;
use super::UpstreamField;
use crate::context::Context;
use crate::error::FetchError;
use crate::error::PlanningError;
use crate::operation_report::ExternalError;
use crate::operation_report::Report;
use crate::query_planner::Argument;
use crate::query_planner::ArgumentSource;
use crate::query_planner::ArgumentsConfig;
use crate::query_planner::DataSourceConfiguration;
use crate::resolve::BufPair;
use crate::resolve::Variable;

/// Attribute holding the endpoint url.
pub const URL_ATTRIBUTE: &str = "url";
/// Attribute holding an [`ArgumentsConfig`] as JSON.
pub const ARGUMENTS_ATTRIBUTE: &str = "arguments";
/// Attribute holding static request headers as a JSON object.
pub const HEADERS_ATTRIBUTE: &str = "headers";

/// Plans fetches against GraphQL endpoints.
///
/// Every fetch planned by one planner shares its HTTP client.
#[derive(Clone, Debug)]
pub struct GraphQLDataSourcePlanner {
    source: Arc<GraphQLDataSource>,
}

impl GraphQLDataSourcePlanner {
    pub fn new(client: reqwest::Client) -> Self {
        GraphQLDataSourcePlanner {
            source: Arc::new(GraphQLDataSource::new(client)),
        }
    }
}

impl DataSourcePlanner for GraphQLDataSourcePlanner {
    fn plan(
        &self,
        configuration: &DataSourceConfiguration,
        request: &FetchRequest<'_>,
    ) -> Result<PlannedFetch, PlanningError> {
        let url = configuration
            .attribute(URL_ATTRIBUTE)
            .ok_or_else(|| PlanningError::InvalidAttribute {
                key: URL_ATTRIBUTE.to_string(),
                reason: "missing".to_string(),
            })
            .and_then(|url| {
                std::str::from_utf8(url).map_err(|error| PlanningError::InvalidAttribute {
                    key: URL_ATTRIBUTE.to_string(),
                    reason: error.to_string(),
                })
            })?;
        let headers: BTreeMap<String, String> =
            json_attribute(configuration, HEADERS_ATTRIBUTE)?.unwrap_or_default();
        let arguments: ArgumentsConfig =
            json_attribute(configuration, ARGUMENTS_ATTRIBUTE)?.unwrap_or_default();

        let mut operation = UpstreamOperation::new(request);
        let root = operation.print_root(arguments.for_field(&request.field.name));
        if operation.report.has_errors() {
            return Err(PlanningError::Diagnostics(operation.report));
        }
        let query = operation.render_query(&root);
        let (variables_template, variables) = operation.render_variables();

        let mut input = String::from("{\"url\":");
        input.push_str(&json_string(url));
        if !headers.is_empty() {
            input.push_str(",\"headers\":");
            input.push_str(&serde_json::to_string(&headers).map_err(|error| {
                PlanningError::InvalidAttribute {
                    key: HEADERS_ATTRIBUTE.to_string(),
                    reason: error.to_string(),
                }
            })?);
        }
        input.push_str(",\"body\":{\"query\":");
        input.push_str(&json_string(&query));
        input.push_str(",\"variables\":");
        input.push_str(&variables_template);
        input.push_str("}}");

        Ok(PlannedFetch {
            input: Bytes::from(input),
            variables,
            data_source: self.source.clone(),
        })
    }

    fn can_extend(
        &self,
        current: &DataSourceConfiguration,
        next: &DataSourceConfiguration,
    ) -> bool {
        current.attribute(URL_ATTRIBUTE) == next.attribute(URL_ATTRIBUTE)
            && current.attribute(HEADERS_ATTRIBUTE) == next.attribute(HEADERS_ATTRIBUTE)
    }
}

fn json_attribute<T: DeserializeOwned>(
    configuration: &DataSourceConfiguration,
    key: &str,
) -> Result<Option<T>, PlanningError> {
    configuration
        .attribute(key)
        .map(|value| {
            serde_json::from_slice(value).map_err(|error| PlanningError::InvalidAttribute {
                key: key.to_string(),
                reason: error.to_string(),
            })
        })
        .transpose()
}

fn json_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

/// A variable of the upstream operation.
#[derive(Clone, Debug, PartialEq)]
struct UpstreamVariable {
    ty: String,
    value: UpstreamValue,
}

#[derive(Clone, Debug, PartialEq)]
enum UpstreamValue {
    /// Read at execution time.
    Extract(Variable),
    /// Written in the input, variable references inside it are read at
    /// execution time.
    Literal(Node<ast::Value>),
}

/// Prints the upstream operation of one fetch.
struct UpstreamOperation<'r> {
    request: &'r FetchRequest<'r>,
    variables: IndexMap<String, UpstreamVariable>,
    report: Report,
}

impl<'r> UpstreamOperation<'r> {
    fn new(request: &'r FetchRequest<'r>) -> Self {
        UpstreamOperation {
            request,
            variables: IndexMap::new(),
            report: Report::default(),
        }
    }

    /// Declares an upstream variable, renaming it if `name` is taken by a
    /// different value. Returns the declared name.
    fn declare(&mut self, name: &str, variable: UpstreamVariable) -> String {
        let mut candidate = name.to_string();
        let mut suffix = 1;
        loop {
            match self.variables.get(&candidate) {
                None => {
                    self.variables.insert(candidate.clone(), variable);
                    return candidate;
                }
                Some(existing) if *existing == variable => return candidate,
                Some(_) => {
                    suffix += 1;
                    candidate = format!("{name}{suffix}");
                }
            }
        }
    }

    fn print_root(&mut self, bindings: &[Argument]) -> String {
        let field = self.request.field;

        // forwarded arguments and selections declare the operation variables
        // they use under their own name, before any bound argument
        let mut bound: Vec<&str> = Vec::new();
        for binding in bindings {
            bound.push(&binding.name);
            if binding.source == ArgumentSource::Field {
                bound.push(binding.source_path.first().unwrap_or(&binding.name));
            }
        }
        let forwarded: Vec<String> = field
            .arguments
            .iter()
            .filter(|argument| !bound.contains(&argument.name.as_str()))
            .map(|argument| self.print_argument(argument))
            .collect();
        let selections = self.print_selections(&field.selections);

        let mut arguments = Vec::new();
        for binding in bindings {
            if let Some(argument) = self.bind_argument(binding) {
                arguments.push(argument);
            }
        }
        arguments.extend(forwarded);

        let mut out = field.name.clone();
        finish_field(&mut out, &arguments, selections);
        out
    }

    /// Declares the upstream variable of a bound argument and returns the
    /// printed argument, or `None` when it has no value.
    fn bind_argument(&mut self, binding: &Argument) -> Option<String> {
        let field = self.request.field;
        let definition = self
            .request
            .definition
            .arguments
            .iter()
            .find(|definition| definition.name.as_str() == binding.name);
        let required = definition.is_some_and(|definition| {
            definition.ty.is_non_null() && definition.default_value.is_none()
        });

        let value = match binding.source {
            ArgumentSource::Field => {
                let source = binding.source_path.first().unwrap_or(&binding.name);
                field
                    .arguments
                    .iter()
                    .find(|argument| argument.name.as_str() == source)
                    .map(|argument| match &*argument.value {
                        ast::Value::Variable(variable) => UpstreamValue::Extract(Variable::Context {
                            path: std::iter::once(variable.to_string())
                                .chain(binding.source_path.iter().skip(1).cloned())
                                .collect(),
                        }),
                        _ => UpstreamValue::Literal(argument.value.clone()),
                    })
            }
            ArgumentSource::Variable => {
                let path = if binding.source_path.is_empty() {
                    vec![binding.name.clone()]
                } else {
                    binding.source_path.clone()
                };
                self.variable_definition(&path[0])
                    .map(|_| UpstreamValue::Extract(Variable::Context { path }))
            }
            ArgumentSource::Object => {
                let path = if binding.source_path.is_empty() {
                    vec![binding.name.clone()]
                } else {
                    binding.source_path.clone()
                };
                Some(UpstreamValue::Extract(Variable::Object { path }))
            }
        };

        let Some(value) = value else {
            if required {
                self.report.add_external_error(ExternalError::argument_required_on_field(
                    &binding.name,
                    &field.name,
                ));
            }
            return None;
        };

        let ty = match (definition, &value) {
            (Some(definition), _) => definition.ty.to_string(),
            (None, UpstreamValue::Extract(Variable::Context { path })) if path.len() == 1 => {
                match self.variable_definition(&path[0]) {
                    Some(definition) => definition.ty.to_string(),
                    None => return None,
                }
            }
            (None, _) => {
                self.report.add_external_error(ExternalError::argument_not_defined_on_node(
                    &binding.name,
                    &field.name,
                ));
                return None;
            }
        };

        let name = self.declare(&binding.name, UpstreamVariable { ty, value });
        Some(format!("{}: ${name}", binding.name))
    }

    fn variable_definition(&self, name: &str) -> Option<&'r Node<ast::VariableDefinition>> {
        self.request
            .variable_definitions
            .iter()
            .find(|definition| definition.name.as_str() == name)
    }

    fn print_selections(&mut self, selections: &[UpstreamField]) -> Vec<String> {
        selections
            .iter()
            .map(|selection| self.print_selection(selection))
            .collect()
    }

    fn print_selection(&mut self, field: &UpstreamField) -> String {
        let mut out = String::new();
        if let Some(alias) = &field.alias {
            out.push_str(alias);
            out.push_str(": ");
        }
        out.push_str(&field.name);
        let arguments: Vec<String> = field
            .arguments
            .iter()
            .map(|argument| self.print_argument(argument))
            .collect();
        let selections = self.print_selections(&field.selections);
        finish_field(&mut out, &arguments, selections);
        out
    }

    /// Prints an argument of the client operation as is, declaring the
    /// variables it references.
    fn print_argument(&mut self, argument: &Node<ast::Argument>) -> String {
        self.declare_variables_of(&argument.value);
        format!("{}: {}", argument.name, argument.value)
    }

    fn declare_variables_of(&mut self, value: &ast::Value) {
        match value {
            ast::Value::Variable(variable) => match self.variable_definition(variable.as_str()) {
                Some(definition) => {
                    self.declare(
                        variable.as_str(),
                        UpstreamVariable {
                            ty: definition.ty.to_string(),
                            value: UpstreamValue::Extract(Variable::Context {
                                path: vec![variable.to_string()],
                            }),
                        },
                    );
                }
                None => self.report.add_external_error(
                    ExternalError::variable_not_defined_on_operation(
                        variable,
                        self.request.operation_name.unwrap_or_default(),
                    ),
                ),
            },
            ast::Value::List(items) => {
                for item in items {
                    self.declare_variables_of(item);
                }
            }
            ast::Value::Object(fields) => {
                for (_, value) in fields {
                    self.declare_variables_of(value);
                }
            }
            _ => {}
        }
    }

    fn render_query(&self, root: &str) -> String {
        let keyword = match self.request.operation_type {
            OperationType::Query => "query",
            OperationType::Mutation => "mutation",
            OperationType::Subscription => "subscription",
        };
        let mut query = String::from(keyword);
        if !self.variables.is_empty() {
            let definitions: Vec<String> = self
                .variables
                .iter()
                .map(|(name, variable)| format!("${name}: {}", variable.ty))
                .collect();
            query.push('(');
            query.push_str(&definitions.join(", "));
            query.push(')');
        }
        query.push('{');
        query.push_str(root);
        query.push('}');
        query
    }

    /// Renders the `variables` object of the request body, with one
    /// placeholder per value read at execution time.
    fn render_variables(&self) -> (String, Vec<Variable>) {
        let mut out = String::from("{");
        let mut variables = Vec::new();
        for (i, (name, variable)) in self.variables.iter().enumerate() {
            if i != 0 {
                out.push(',');
            }
            out.push_str(&json_string(name));
            out.push(':');
            match &variable.value {
                UpstreamValue::Extract(extract) => {
                    push_placeholder(&mut out, &mut variables, extract.clone())
                }
                UpstreamValue::Literal(value) => write_literal(&mut out, &mut variables, value),
            }
        }
        out.push('}');
        (out, variables)
    }
}

/// Appends the arguments and sub-selections of a field.
fn finish_field(out: &mut String, arguments: &[String], selections: Vec<String>) {
    if !arguments.is_empty() {
        out.push('(');
        out.push_str(&arguments.join(", "));
        out.push(')');
    }
    if !selections.is_empty() {
        if arguments.is_empty() {
            out.push(' ');
        }
        out.push('{');
        out.push_str(&selections.join(" "));
        out.push('}');
    }
}

fn push_placeholder(out: &mut String, variables: &mut Vec<Variable>, variable: Variable) {
    out.push_str(&format!("$${}$$", variables.len()));
    variables.push(variable);
}

/// Writes a GraphQL literal as JSON.
fn write_literal(out: &mut String, variables: &mut Vec<Variable>, value: &ast::Value) {
    match value {
        ast::Value::Null => out.push_str("null"),
        ast::Value::Boolean(value) => out.push_str(if *value { "true" } else { "false" }),
        ast::Value::Int(value) => out.push_str(value.as_str()),
        ast::Value::Float(value) => out.push_str(value.as_str()),
        ast::Value::String(value) => out.push_str(&json_string(value.as_str())),
        ast::Value::Enum(value) => out.push_str(&json_string(value.as_str())),
        ast::Value::Variable(variable) => push_placeholder(
            out,
            variables,
            Variable::Context {
                path: vec![variable.to_string()],
            },
        ),
        ast::Value::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i != 0 {
                    out.push(',');
                }
                write_literal(out, variables, item);
            }
            out.push(']');
        }
        ast::Value::Object(fields) => {
            out.push('{');
            for (i, (name, value)) in fields.iter().enumerate() {
                if i != 0 {
                    out.push(',');
                }
                out.push_str(&json_string(name.as_str()));
                out.push(':');
                write_literal(out, variables, value);
            }
            out.push('}');
        }
    }
}

/// Sends fetch inputs to GraphQL endpoints.
#[derive(Clone, Debug)]
pub struct GraphQLDataSource {
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct SourceInput<'a> {
    url: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(borrow)]
    body: &'a RawValue,
}

/// The members of a GraphQL response the engine reads.
#[derive(Debug, Default)]
struct UpstreamResponse<'a> {
    data: Option<&'a RawValue>,
    errors: Option<&'a RawValue>,
}

impl<'a> UpstreamResponse<'a> {
    /// Reads the response object member by member.
    ///
    /// Reading stops at the closing brace or at the first byte after a
    /// complete member that neither closes the object nor separates members;
    /// whatever follows is ignored.
    fn parse(body: &'a [u8]) -> Result<Self, serde_json::Error> {
        let mut response = UpstreamResponse::default();
        let mut position = skip_whitespace(body, 0);
        match body.get(position) {
            Some(b'{') => position += 1,
            Some(_) => return Err(serde_json::Error::custom("expected a JSON object")),
            None => return Err(serde_json::Error::custom("empty response body")),
        }

        loop {
            position = skip_whitespace(body, position);
            if body.get(position) == Some(&b'}') {
                break;
            }
            let (key, read) = next_value::<String>(&body[position..])?;
            position = skip_whitespace(body, position + read);
            if body.get(position) != Some(&b':') {
                return Err(serde_json::Error::custom(format!(
                    "expected `:` after member {key:?}"
                )));
            }
            let (value, read) = next_value::<&RawValue>(&body[position + 1..])?;
            position += 1 + read;

            let value = (value.get() != "null").then_some(value);
            match key.as_str() {
                "data" => response.data = value,
                "errors" => response.errors = value,
                _ => {}
            }

            position = skip_whitespace(body, position);
            if body.get(position) != Some(&b',') {
                break;
            }
            position += 1;
        }
        Ok(response)
    }
}

fn skip_whitespace(body: &[u8], mut position: usize) -> usize {
    while body
        .get(position)
        .is_some_and(|byte| byte.is_ascii_whitespace())
    {
        position += 1;
    }
    position
}

/// Deserializes the JSON value at the start of `input`, returning it with
/// the number of bytes read.
fn next_value<'de, T: Deserialize<'de>>(input: &'de [u8]) -> Result<(T, usize), serde_json::Error> {
    let mut stream = serde_json::Deserializer::from_slice(input).into_iter::<T>();
    match stream.next() {
        Some(Ok(value)) => Ok((value, stream.byte_offset())),
        Some(Err(error)) => Err(error),
        None => Err(serde_json::Error::custom("unexpected end of response body")),
    }
}

impl GraphQLDataSource {
    pub fn new(client: reqwest::Client) -> Self {
        GraphQLDataSource { client }
    }
}

#[async_trait]
impl DataSource for GraphQLDataSource {
    async fn load(
        &self,
        context: &Context,
        input: &[u8],
        buf: &mut BufPair,
    ) -> Result<(), FetchError> {
        if context.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let input: SourceInput = serde_json::from_slice(input).map_err(|error| {
            FetchError::MalformedInput {
                reason: error.to_string(),
            }
        })?;

        let mut request = self
            .client
            .post(&input.url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(input.body.get().to_owned());
        for (name, value) in &input.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        tracing::debug!(url = %input.url, "sending request to data source");
        let response = request
            .send()
            .await
            .map_err(|error| FetchError::SubrequestHttpError {
                status_code: error.status().map(|status| status.as_u16()),
                url: input.url.clone(),
                reason: error.to_string(),
            })?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|error| FetchError::SubrequestHttpError {
                status_code: Some(status.as_u16()),
                url: input.url.clone(),
                reason: error.to_string(),
            })?;
        tracing::trace!(%status, body = %String::from_utf8_lossy(&body), "data source responded");

        if !status.is_success() {
            return Err(FetchError::SubrequestHttpError {
                status_code: Some(status.as_u16()),
                url: input.url,
                reason: format!("unexpected status {status}"),
            });
        }

        let response = UpstreamResponse::parse(&body).map_err(|error| {
            FetchError::SubrequestMalformedResponse {
                url: input.url.clone(),
                reason: error.to_string(),
            }
        })?;

        if let Some(data) = response.data {
            buf.data.extend_from_slice(data.get().as_bytes());
        }
        if let Some(errors) = response.errors {
            buf.errors.extend_from_slice(errors.get().as_bytes());
        }
        Ok(())
    }
}
