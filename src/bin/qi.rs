//! qi command line entry point.
//!
//! ```text
//! qi query -c <client> -q <query> -v <vars> [-h] [-r] [-t] [-o file]
//! qi schema -c <client> [-o file]
//! ```
//!
//! Results go to stdout, logs to stderr. Set `RUST_LOG=qi_client=debug` for
//! details.

use anyhow::{bail, Context};
use clap::{ArgAction, Args, Parser, Subcommand};
use qi_client::graphql::GraphQLResponse;
use qi_client::manager::{QueryPlan, QuerySelection, Session};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "qi", version, about = "Stateful GraphQL query client")]
struct Cli {
    /// Project directory holding `.qi/settings.json` (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query with a configured client
    Query(QueryArgs),
    /// Get the schema from the server
    Schema(SchemaArgs),
}

#[derive(Args, Debug)]
#[command(disable_help_flag = true)]
struct QueryArgs {
    /// Configured client to make the query with
    #[arg(short, long)]
    client: Option<String>,

    /// Query to call (its name)
    #[arg(short, long)]
    query: Option<String>,

    /// Variables to be used (their name)
    #[arg(short, long)]
    vars: Option<String>,

    /// Print response headers
    #[arg(short = 'h', long)]
    print_headers: bool,

    /// Print request content
    #[arg(short = 'r', long)]
    print_request: bool,

    /// Print timings info
    #[arg(short = 't', long)]
    print_timings: bool,

    /// Write the successful result to a file
    #[arg(short, long)]
    output_file: Option<PathBuf>,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

#[derive(Args, Debug)]
struct SchemaArgs {
    /// Configured client to make the introspection query with
    #[arg(short, long)]
    client: Option<String>,

    /// Write the schema to a file
    #[arg(short, long)]
    output_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    setup_tracing();
    let cli = Cli::parse();

    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir().context("cannot determine the current directory")?,
    };
    let session = Session::init(&root)
        .await
        .with_context(|| format!("cannot initialize project in {}", root.display()))?;

    match cli.command {
        Command::Query(args) => query(&session, args).await,
        Command::Schema(args) => schema(&session, args).await,
    }
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

async fn query(session: &Session, args: QueryArgs) -> anyhow::Result<ExitCode> {
    let selection = QuerySelection {
        client: args.client,
        query: args.query,
        vars: args.vars,
    };
    let plan = session.query_params(&selection).await?;
    if let Some(code) = report_plan(&plan)? {
        return Ok(code);
    }
    let Some((client, params)) = plan.params.to_query_params() else {
        bail!("Something is wrong with gathering the input data");
    };

    let response = match session.query(&client, &params).await {
        Ok(response) => response,
        Err(failure) => {
            println!("ERROR: {}", failure);
            if let Some(body) = failure.body() {
                println!("{}", pretty(body)?);
            }
            if args.print_request {
                if let Some(req) = &failure.req {
                    println!("------------ REQUEST CONTENT -----------\n{}", pretty(req)?);
                }
            }
            return Ok(ExitCode::FAILURE);
        }
    };

    if let Some(path) = &args.output_file {
        write_output(path, &pretty(&response.body)?).await;
    }

    println!("================ RESULT ================\n{}", pretty(&response.body)?);
    if let Ok(body) = serde_json::from_value::<GraphQLResponse>(response.body.clone()) {
        if body.has_errors() {
            eprint!("{}", body.format_errors());
        }
    }
    if args.print_timings {
        println!("---------------- TIMINGS ----------------\n{}", pretty(&response.timings)?);
    }
    if args.print_request {
        println!("------------ REQUEST CONTENT -----------\n{}", pretty(&response.req)?);
    }
    if args.print_headers {
        println!("------------ RESPONSE HEADERS -----------\n{}", pretty(&response.headers)?);
    }
    Ok(ExitCode::SUCCESS)
}

async fn schema(session: &Session, args: SchemaArgs) -> anyhow::Result<ExitCode> {
    let selection = QuerySelection {
        client: args.client,
        ..QuerySelection::default()
    };
    let plan = session.query_params(&selection).await?;
    let client = match (&plan.errors.client, &plan.select.client, &plan.params.client) {
        (None, None, Some(client)) => client.clone(),
        _ => {
            let mut plan = plan;
            plan.select.query = None;
            return Ok(report_plan(&plan)?.unwrap_or(ExitCode::FAILURE));
        }
    };

    let response = match session.get_schema(&client).await {
        Ok(response) => response,
        Err(failure) => {
            println!("ERROR: {}", failure);
            return Ok(ExitCode::FAILURE);
        }
    };

    let data = response.body.get("data").cloned().unwrap_or_default();
    if let Some(path) = &args.output_file {
        write_output(path, &pretty(&data)?).await;
    }
    println!("================ RESULT ================\n{}", pretty(&data)?);
    if let Some(errors) = response.errors() {
        println!("============ RESULT ERRORS ============\n{}", pretty(errors)?);
    }
    Ok(ExitCode::SUCCESS)
}

/// Prints warnings, errors and pending choices. Returns an exit code when
/// the plan cannot run.
fn report_plan(plan: &QueryPlan) -> anyhow::Result<Option<ExitCode>> {
    if !plan.warnings.is_empty() {
        eprintln!("Warnings: {}", pretty(&plan.warnings)?);
    }
    if !plan.errors.is_empty() {
        eprintln!("Errors: {}", pretty(&plan.errors)?);
        if !plan.select.is_empty() {
            eprintln!("Choose one of: {}", pretty(&plan.select)?);
        }
        return Ok(Some(ExitCode::FAILURE));
    }
    if !plan.select.is_empty() {
        eprintln!("Choose one of: {}", pretty(&plan.select)?);
        return Ok(Some(ExitCode::from(2)));
    }
    Ok(None)
}

async fn write_output(path: &Path, content: &str) {
    if let Err(e) = tokio::fs::write(path, content).await {
        eprintln!("Write result failed: {}", e);
    }
}

fn pretty<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
