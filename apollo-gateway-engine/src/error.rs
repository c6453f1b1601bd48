//! Engine errors.
use displaydoc::Display;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

pub use crate::configuration::ConfigurationError;
pub use crate::graphql::Error;
use crate::graphql::ErrorExtension;
use crate::json_ext::Value;
use crate::operation_report::Path;
use crate::operation_report::Report;

/// Error types for fetches.
///
/// A fetch error is scoped to the fetch that raised it: the fields populated
/// by that fetch are nulled and the error is reported once, at their path.
#[derive(Error, Display, Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
#[ignore_extra_doc_attributes]
pub enum FetchError {
    /// HTTP fetch failed from '{url}': {reason}
    ///
    /// note that this relates to a transport error and not a GraphQL error
    SubrequestHttpError {
        status_code: Option<u16>,

        /// The url of the data source.
        url: String,

        /// The reason the fetch failed.
        reason: String,
    },

    /// data source '{url}' response was malformed: {reason}
    SubrequestMalformedResponse {
        /// The url of the data source.
        url: String,

        /// The reason the serialization failed.
        reason: String,
    },

    /// fetch input was malformed: {reason}
    MalformedInput {
        /// The reason the input could not be read.
        reason: String,
    },

    /// fetch requires variable '{path}', but it was not provided
    MissingVariable {
        /// Dotted path of the variable.
        path: String,
    },

    /// fetch input references placeholder {index} which has no variable
    UnknownPlaceholder {
        /// Index of the placeholder.
        index: usize,
    },

    /// fetch {buffer_id} produced malformed output: {reason}
    MalformedOutput {
        /// The buffer the data source wrote to.
        buffer_id: usize,

        /// The reason the buffer could not be read.
        reason: String,
    },

    /// fetch did not complete within {timeout_ms}ms
    Timeout {
        /// The deadline, in milliseconds.
        timeout_ms: u64,
    },

    /// fetch was cancelled
    Cancelled,
}

impl FetchError {
    /// Convert the fetch error to a GraphQL error.
    pub fn to_graphql_error(&self, path: Option<Path>) -> Error {
        let mut value: Value = serde_json_bytes::to_value(self).unwrap_or_default();
        let mut extensions = value.as_object_mut().map(std::mem::take).unwrap_or_default();
        extensions
            .entry("code")
            .or_insert_with(|| self.extension_code().into());
        if let FetchError::SubrequestHttpError { status_code, .. } = self {
            extensions.remove("status_code");
            if let Some(status_code) = status_code {
                extensions.insert("http", serde_json_bytes::json!({ "status": status_code }));
            }
        }

        Error::builder()
            .message(self.to_string())
            .and_path(path)
            .extensions(extensions)
            .build()
    }
}

impl ErrorExtension for FetchError {
    fn extension_code(&self) -> String {
        match self {
            FetchError::SubrequestHttpError { .. } => "SUBREQUEST_HTTP_ERROR",
            FetchError::SubrequestMalformedResponse { .. } => "SUBREQUEST_MALFORMED_RESPONSE",
            FetchError::MalformedInput { .. } => "MALFORMED_INPUT",
            FetchError::MissingVariable { .. } => "VALIDATION_MISSING_VARIABLE",
            FetchError::UnknownPlaceholder { .. } => "UNKNOWN_PLACEHOLDER",
            FetchError::MalformedOutput { .. } => "MALFORMED_FETCH_OUTPUT",
            FetchError::Timeout { .. } => "SUBREQUEST_TIMEOUT",
            FetchError::Cancelled => "SUBREQUEST_CANCELLED",
        }
        .to_string()
    }
}

/// Errors that prevent an operation from being planned.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum PlanningError {
    /// operation could not be planned: {0}
    Diagnostics(Report),

    /// operation '{name}' not found in document
    UnknownOperation {
        /// The requested operation, `<anonymous>` when none was named.
        name: String,
    },

    /// data source attribute '{key}' is invalid: {reason}
    InvalidAttribute {
        /// The attribute key.
        key: String,

        /// Why the value could not be used.
        reason: String,
    },
}

impl From<Report> for PlanningError {
    fn from(report: Report) -> Self {
        PlanningError::Diagnostics(report)
    }
}

impl ErrorExtension for PlanningError {
    fn extension_code(&self) -> String {
        match self {
            PlanningError::Diagnostics(_) => "GRAPHQL_VALIDATION_FAILED",
            PlanningError::UnknownOperation { .. } => "GRAPHQL_UNKNOWN_OPERATION_NAME",
            PlanningError::InvalidAttribute { .. } => "INVALID_DATA_SOURCE_ATTRIBUTE",
        }
        .to_string()
    }
}

impl PlanningError {
    /// Convert the planning error to GraphQL errors, one per diagnostic.
    pub fn to_graphql_errors(&self) -> Vec<Error> {
        match self {
            PlanningError::Diagnostics(report) => report
                .external_errors
                .iter()
                .map(|error| {
                    Error::builder()
                        .message(error.message.clone())
                        .locations(error.locations.clone())
                        .and_path((!error.path.is_empty()).then(|| error.path.clone()))
                        .extension_code(self.extension_code())
                        .build()
                })
                .collect(),
            _ => vec![
                Error::builder()
                    .message(self.to_string())
                    .extension_code(self.extension_code())
                    .build(),
            ],
        }
    }
}

/// Errors that abort resolution without producing a response.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// request was cancelled before completion
    Cancelled,
}
