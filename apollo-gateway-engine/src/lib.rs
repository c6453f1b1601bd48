//! Plans GraphQL operations over a registry of data sources and resolves the
//! plans into a single response.

#![cfg_attr(feature = "failfast", allow(unreachable_code))]
#![warn(unreachable_pub)]
#![recursion_limit = "256"]

macro_rules! failfast_debug {
    ($($tokens:tt)+) => {{
        tracing::debug!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

macro_rules! failfast_error {
    ($($tokens:tt)+) => {{
        tracing::error!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

pub mod json_ext;

pub mod configuration;
mod context;
pub mod datasource;
pub mod error;
pub mod graphql;
pub mod operation_report;
pub mod query_planner;
pub mod resolve;

pub use configuration::Configuration;
pub use context::Context;
pub use query_planner::Plan;
pub use query_planner::Planner;
pub use resolve::Resolver;
