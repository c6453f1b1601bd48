//! The registry telling the planner which data source serves which field.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::datasource::DataSourcePlanner;

/// Declares that `field_names` of `type_name` are served by a data source.
///
/// Attributes are opaque to the planner and interpreted by `planner`.
#[derive(Clone)]
pub struct DataSourceConfiguration {
    pub type_name: String,
    pub field_names: Vec<String>,
    pub attributes: Vec<DataSourceAttribute>,
    pub planner: Arc<dyn DataSourcePlanner>,
}

impl DataSourceConfiguration {
    pub fn new(
        type_name: impl Into<String>,
        field_names: impl IntoIterator<Item = impl Into<String>>,
        attributes: Vec<DataSourceAttribute>,
        planner: Arc<dyn DataSourcePlanner>,
    ) -> Self {
        let mut names: Vec<String> = Vec::new();
        for name in field_names {
            let name = name.into();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        DataSourceConfiguration {
            type_name: type_name.into(),
            field_names: names,
            attributes,
            planner,
        }
    }

    pub fn serves(&self, type_name: &str, field_name: &str) -> bool {
        self.type_name == type_name && self.field_names.iter().any(|name| name == field_name)
    }

    /// The value of the first attribute named `key`.
    pub fn attribute(&self, key: &str) -> Option<&Bytes> {
        self.attributes
            .iter()
            .find(|attribute| attribute.key == key)
            .map(|attribute| &attribute.value)
    }
}

impl fmt::Debug for DataSourceConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceConfiguration")
            .field("type_name", &self.type_name)
            .field("field_names", &self.field_names)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

/// A backend-defined key/value pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataSourceAttribute {
    pub key: String,
    pub value: Bytes,
}

impl DataSourceAttribute {
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        DataSourceAttribute {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// How a backend argument gets its value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Argument {
    /// Name of the argument on the backend field.
    pub name: String,
    pub source: ArgumentSource,
    #[serde(default)]
    pub source_path: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentSource {
    /// An argument of the planned field, named `source_path[0]`.
    Field,
    /// The operation variables at `source_path`.
    Variable,
    /// The data of the enclosing object at `source_path`.
    Object,
}

/// The arguments of the fields of one data source, stored as the `arguments`
/// attribute.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ArgumentsConfig {
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FieldConfig {
    pub field_name: String,
    #[serde(default)]
    pub arguments: Vec<Argument>,
}

impl ArgumentsConfig {
    pub fn for_field(&self, field_name: &str) -> &[Argument] {
        self.fields
            .iter()
            .find(|field| field.field_name == field_name)
            .map(|field| field.arguments.as_slice())
            .unwrap_or_default()
    }

    pub fn to_bytes(&self) -> Bytes {
        serde_json::to_vec(self).map(Bytes::from).unwrap_or_default()
    }
}
