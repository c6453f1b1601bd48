//! Per-request execution context.

use std::time::Duration;

use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use tokio_util::sync::CancellationToken;

use crate::json_ext::Object;
use crate::json_ext::Value;

/// Everything the resolver and data sources need to know about one request.
///
/// Cloning a context is cheap and clones share the same cancellation token.
#[derive(Clone, Debug, Default)]
pub struct Context {
    variables: Object,
    cancellation: CancellationToken,
    timeout: Option<Duration>,
}

#[buildstructor::buildstructor]
impl Context {
    /// Builder methods:
    ///
    /// * `.variables(map)` / `.variable(name, value)`: the operation variables.
    /// * `.cancellation(token)`: cancelling the token aborts every in-flight fetch.
    /// * `.timeout(duration)`: deadline for the whole request, measured from the
    ///   start of resolution.
    #[builder(visibility = "pub")]
    fn new(
        variables: JsonMap<ByteString, Value>,
        cancellation: Option<CancellationToken>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            variables,
            cancellation: cancellation.unwrap_or_default(),
            timeout,
        }
    }

    pub fn variables(&self) -> &Object {
        &self.variables
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn cancel(&self) {
        self.cancellation.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Returns a context whose variables are `defaults` overridden by the
    /// variables of this context.
    pub(crate) fn with_variable_defaults(&self, defaults: &Object) -> Context {
        if defaults.is_empty() {
            return self.clone();
        }
        let mut variables = defaults.clone();
        for (name, value) in self.variables.iter() {
            variables.insert(name.clone(), value.clone());
        }
        Context {
            variables,
            cancellation: self.cancellation.clone(),
            timeout: self.timeout,
        }
    }
}
