//! Logic for loading configuration in to an object model
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use displaydoc::Display;
use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use schemars::schema::RootSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::datasource::DataSourcePlanner;
use crate::datasource::graphql::ARGUMENTS_ATTRIBUTE;
use crate::datasource::graphql::GraphQLDataSourcePlanner;
use crate::datasource::graphql::HEADERS_ATTRIBUTE;
use crate::datasource::graphql::URL_ATTRIBUTE;
use crate::query_planner::ArgumentsConfig;
use crate::query_planner::DataSourceAttribute;
use crate::query_planner::DataSourceConfiguration;
use crate::query_planner::FieldConfig;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not read configuration file {path}: {error}
    CannotReadFile {
        path: String,
        error: std::io::Error,
    },
    /// could not deserialize configuration: {0}
    DeserializeConfigError(serde_yaml::Error),
    /// could not build the http client: {0}
    HttpClient(reqwest::Error),
    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
}

/// The registry of data sources and the limits applied to every fetch.
///
/// Can be created through `serde::Deserialize` from various formats, or from
/// YAML with [`Configuration::from_str`].
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Timeout of every upstream request, in human-readable format; defaults
    /// to 10s
    #[serde(with = "humantime_serde", default = "default_timeout")]
    #[schemars(with = "String", default = "default_timeout")]
    pub timeout: Duration,

    /// Data sources, in lookup order: the first one serving a field wins.
    #[serde(default)]
    pub data_sources: Vec<DataSourceDefinition>,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            timeout: DEFAULT_TIMEOUT,
            data_sources: Vec::new(),
        }
    }
}

/// A data source, tagged by its `kind`.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSourceDefinition {
    /// A GraphQL endpoint.
    Graphql(GraphQLDefinition),
}

/// Fields served by a GraphQL endpoint.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct GraphQLDefinition {
    /// The type the fields belong to.
    pub type_name: String,

    /// The fields served.
    pub field_names: Vec<String>,

    /// The endpoint.
    pub url: Url,

    /// Headers sent with every request.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// How the arguments of backend fields are populated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<FieldConfig>,
}

impl DataSourceDefinition {
    fn type_name(&self) -> &str {
        match self {
            DataSourceDefinition::Graphql(definition) => &definition.type_name,
        }
    }

    fn field_names(&self) -> &[String] {
        match self {
            DataSourceDefinition::Graphql(definition) => &definition.field_names,
        }
    }
}

impl Configuration {
    /// Reads a YAML configuration file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|error| ConfigurationError::CannotReadFile {
                path: path.display().to_string(),
                error,
            })?;
        content.parse()
    }

    /// Builds the data source registry.
    ///
    /// Every GraphQL data source shares one HTTP client, whose request
    /// timeout is [`Configuration::timeout`].
    pub fn data_sources(&self) -> Result<Vec<DataSourceConfiguration>, ConfigurationError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(ConfigurationError::HttpClient)?;
        let planner: Arc<dyn DataSourcePlanner> = Arc::new(GraphQLDataSourcePlanner::new(client));

        let mut served = HashSet::new();
        let mut configurations = Vec::with_capacity(self.data_sources.len());
        for definition in &self.data_sources {
            for field_name in definition.field_names() {
                if !served.insert((definition.type_name(), field_name.as_str())) {
                    tracing::warn!(
                        type_name = definition.type_name(),
                        field_name = field_name.as_str(),
                        "field is served by an earlier data source, this definition is ignored for it"
                    );
                }
            }

            let configuration = match definition {
                DataSourceDefinition::Graphql(definition) => DataSourceConfiguration::new(
                    definition.type_name.clone(),
                    definition.field_names.iter().cloned(),
                    definition.attributes()?,
                    planner.clone(),
                ),
            };
            configurations.push(configuration);
        }
        tracing::debug!(data_sources = configurations.len(), "data source registry built");
        Ok(configurations)
    }

    /// The JSON schema of the configuration file.
    pub fn schema() -> RootSchema {
        let settings = SchemaSettings::draft07().with(|s| {
            s.option_nullable = true;
            s.option_add_null_type = false;
            s.inline_subschemas = true;
        });
        settings.into_generator().into_root_schema_for::<Configuration>()
    }
}

impl GraphQLDefinition {
    fn attributes(&self) -> Result<Vec<DataSourceAttribute>, ConfigurationError> {
        let mut attributes = vec![DataSourceAttribute::new(
            URL_ATTRIBUTE,
            self.url.as_str().to_string(),
        )];
        if !self.headers.is_empty() {
            let headers = serde_json::to_vec(&self.headers).map_err(|error| {
                ConfigurationError::InvalidConfiguration {
                    message: "headers",
                    error: error.to_string(),
                }
            })?;
            attributes.push(DataSourceAttribute::new(HEADERS_ATTRIBUTE, headers));
        }
        if !self.arguments.is_empty() {
            let arguments = ArgumentsConfig {
                fields: self.arguments.clone(),
            };
            attributes.push(DataSourceAttribute::new(
                ARGUMENTS_ATTRIBUTE,
                arguments.to_bytes(),
            ));
        }
        Ok(attributes)
    }
}

/// Parse configuration from a string in YAML syntax
impl FromStr for Configuration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_yaml::from_str(s).map_err(ConfigurationError::DeserializeConfigError)
    }
}

impl fmt::Display for DataSourceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceDefinition::Graphql(definition) => write!(
                f,
                "{}.{{{}}} -> {}",
                definition.type_name,
                definition.field_names.join(", "),
                definition.url
            ),
        }
    }
}
