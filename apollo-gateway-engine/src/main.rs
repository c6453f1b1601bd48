//! Plans, and optionally resolves, one operation against a data source
//! registry.

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use anyhow::Result;
use anyhow::anyhow;
use apollo_compiler::ExecutableDocument;
use apollo_compiler::Schema;
use apollo_gateway_engine::Configuration;
use apollo_gateway_engine::Context;
use apollo_gateway_engine::Planner;
use apollo_gateway_engine::Resolver;
use apollo_gateway_engine::graphql::Response;
use apollo_gateway_engine::json_ext::Object;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Options for the engine
#[derive(Parser, Debug)]
#[command(name = "router-engine", about = "GraphQL data source planner")]
struct Opt {
    /// Log level (off|error|warn|info|debug|trace).
    #[arg(long = "log", default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Emits logs as JSON.
    #[arg(long)]
    json_logs: bool,

    /// Prints the configuration schema and exits.
    #[arg(long)]
    config_schema: bool,

    /// Data source registry.
    #[arg(short, long = "config", env = "ROUTER_ENGINE_CONFIG_PATH")]
    config_path: Option<PathBuf>,

    /// GraphQL schema the operation is validated against.
    #[arg(short, long = "schema", env = "ROUTER_ENGINE_SCHEMA_PATH")]
    schema_path: Option<PathBuf>,

    /// File containing the operation.
    #[arg(short, long = "query")]
    query_path: Option<PathBuf>,

    /// Operation to plan when the document has several.
    #[arg(long)]
    operation_name: Option<String>,

    /// Operation variables, as a JSON object.
    #[arg(long, default_value = "{}")]
    variables: String,

    /// Resolves the plan and prints the response instead of the plan.
    #[arg(long)]
    execute: bool,

    /// Deadline of the whole resolution.
    #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
    timeout: Option<Duration>,
}

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(start(Opt::parse()))
}

async fn start(opt: Opt) -> Result<()> {
    if opt.config_schema {
        println!("{}", serde_json::to_string_pretty(&Configuration::schema())?);
        return Ok(());
    }

    let builder = tracing_subscriber::fmt::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_new(&opt.log_level).context("could not parse log configuration")?,
        );
    if opt.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }

    let config_path = opt
        .config_path
        .as_deref()
        .ok_or_else(|| anyhow!("a data source configuration is required, use --config"))?;
    let configuration = Configuration::from_file(config_path)?;
    tracing::info!(
        "loaded {} data source(s) from {}",
        configuration.data_sources.len(),
        config_path.display()
    );

    let schema_path = opt
        .schema_path
        .as_deref()
        .ok_or_else(|| anyhow!("a GraphQL schema is required, use --schema"))?;
    let schema = Schema::parse_and_validate(read(schema_path)?, schema_path)
        .map_err(|invalid| anyhow!("invalid schema:\n{}", invalid.errors))?;

    let query_path = opt
        .query_path
        .as_deref()
        .ok_or_else(|| anyhow!("an operation is required, use --query"))?;
    let document = ExecutableDocument::parse_and_validate(&schema, read(query_path)?, query_path)
        .map_err(|invalid| anyhow!("invalid operation:\n{}", invalid.errors))?;

    let planner = Planner::new(configuration.data_sources()?);
    let plan = match planner.plan(&document, opt.operation_name.as_deref()) {
        Ok(plan) => plan,
        Err(error) => {
            let response = Response::builder()
                .errors(error.to_graphql_errors())
                .build();
            println!("{}", serde_json::to_string_pretty(&response)?);
            return Err(error.into());
        }
    };

    if !opt.execute {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let variables: Object =
        serde_json::from_str(&opt.variables).context("variables must be a JSON object")?;
    let context = Context::builder()
        .variables(variables)
        .and_timeout(opt.timeout)
        .build();

    let cancel = context.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received ctrl-c, cancelling");
            cancel.cancel();
        }
    });

    let response = Resolver::new().resolve(&plan, &context).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("could not read {}", path.display()))
}
