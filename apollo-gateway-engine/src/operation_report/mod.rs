//! Diagnostics produced while planning an operation, and the [`Path`] type
//! used to locate values and errors in a response document.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

mod catalog;
mod path;

pub use path::Path;
pub use path::PathItem;

/// A location in a GraphQL document.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// The line number
    pub line: u32,
    /// The column number
    pub column: u32,
}

/// An error attributable to the client's operation.
///
/// The catalog constructors (see `ExternalError::field_undefined_on_type` and
/// friends) produce the message; callers attach the path and locations.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ExternalError {
    pub message: String,
    #[serde(default)]
    pub path: Path,
    #[serde(default)]
    pub locations: Vec<Location>,
}

impl ExternalError {
    pub(crate) fn from_message(message: String) -> Self {
        ExternalError {
            message,
            ..Default::default()
        }
    }

    pub fn with_path(mut self, path: Path) -> Self {
        self.path = path;
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.locations.push(location);
        self
    }
}

impl fmt::Display for ExternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Every diagnostic found while processing one operation.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Report {
    pub external_errors: Vec<ExternalError>,
}

impl Report {
    pub fn add_external_error(&mut self, error: ExternalError) {
        self.external_errors.push(error);
    }

    pub fn extend(&mut self, other: Report) {
        self.external_errors.extend(other.external_errors);
    }

    pub fn has_errors(&self) -> bool {
        !self.external_errors.is_empty()
    }
}

impl From<ExternalError> for Report {
    fn from(error: ExternalError) -> Self {
        Report {
            external_errors: vec![error],
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.external_errors.iter().enumerate() {
            if i != 0 {
                f.write_str(", ")?;
            }
            if error.path.is_empty() {
                write!(f, "{error}")?;
            } else {
                write!(f, "{error} at {}", error.path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn external_error_serializes_with_path_and_locations() {
        let error = ExternalError::field_undefined_on_type("hero", "Query")
            .with_path(Path::from_field_names(["", "hero"]))
            .with_location(Location { line: 1, column: 3 });
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            serde_json::json!({
                "message": "field: hero not defined on type: Query",
                "path": ["", "hero"],
                "locations": [{"line": 1, "column": 3}]
            })
        );
    }

    #[test]
    fn report_display_lists_every_error() {
        let mut report = Report::default();
        report.add_external_error(ExternalError::fragment_undefined("Details"));
        report.add_external_error(
            ExternalError::fragment_spread_forms_cycle("A")
                .with_path(Path::from_field_names(["", "droid"])),
        );
        assert!(report.has_errors());
        assert_eq!(
            report.to_string(),
            "fragment: Details undefined, fragment spread: A forms fragment cycle at [query,droid]"
        );
    }
}
