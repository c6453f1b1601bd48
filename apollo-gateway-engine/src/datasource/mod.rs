//! Data source capabilities.
//!
//! A data source is used twice: at planning time its [`DataSourcePlanner`]
//! turns a [`FetchRequest`] into an input template, and at execution time the
//! [`DataSource`] it returned sends the rendered input to the backend.

use std::fmt::Debug;
use std::sync::Arc;

use apollo_compiler::Node;
use apollo_compiler::ast;
use apollo_compiler::ast::FieldDefinition;
use apollo_compiler::ast::OperationType;
use apollo_compiler::ast::VariableDefinition;
use async_trait::async_trait;
use bytes::Bytes;

use crate::context::Context;
use crate::error::FetchError;
use crate::error::PlanningError;
use crate::query_planner::DataSourceConfiguration;
use crate::resolve::BufPair;
use crate::resolve::Variable;

pub mod graphql;

/// Executes rendered fetch inputs.
#[async_trait]
pub trait DataSource: Send + Sync + Debug {
    /// Sends `input` to the backend, writing its data and errors to `buf`.
    ///
    /// Backend-reported errors are not failures: only transport problems
    /// (connection, timeout, status, unreadable response) return an error.
    async fn load(
        &self,
        context: &Context,
        input: &[u8],
        buf: &mut BufPair,
    ) -> Result<(), FetchError>;
}

/// Plans fetches for the fields of a [`DataSourceConfiguration`].
pub trait DataSourcePlanner: Send + Sync + Debug {
    fn plan(
        &self,
        configuration: &DataSourceConfiguration,
        request: &FetchRequest<'_>,
    ) -> Result<PlannedFetch, PlanningError>;

    /// Whether a field configured by `next` can be added to a fetch already
    /// planned for `current`.
    fn can_extend(
        &self,
        current: &DataSourceConfiguration,
        next: &DataSourceConfiguration,
    ) -> bool;
}

/// What a data source needs to know to plan one fetch.
#[derive(Debug)]
pub struct FetchRequest<'a> {
    pub operation_type: OperationType,
    /// The type the root field is selected on.
    pub type_name: &'a str,
    pub field: &'a UpstreamField,
    pub definition: &'a FieldDefinition,
    pub variable_definitions: &'a [Node<VariableDefinition>],
    pub operation_name: Option<&'a str>,
}

/// A field of the upstream selection.
///
/// Aliases of the client operation are dropped unless two selections of the
/// same field have different arguments; boundary fields served by other
/// fetches are not part of the tree.
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamField {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<Node<ast::Argument>>,
    pub selections: Vec<UpstreamField>,
}

impl UpstreamField {
    pub fn new(name: impl Into<String>) -> Self {
        UpstreamField {
            alias: None,
            name: name.into(),
            arguments: Vec::new(),
            selections: Vec::new(),
        }
    }

    /// The key of this field in the upstream response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Identifies selections that can be merged.
    pub(crate) fn arguments_key(&self) -> String {
        self.arguments
            .iter()
            .map(|argument| format!("{}: {}", argument.name, argument.value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// The result of planning one fetch.
#[derive(Clone, Debug)]
pub struct PlannedFetch {
    pub input: Bytes,
    pub variables: Vec<Variable>,
    pub data_source: Arc<dyn DataSource>,
}
