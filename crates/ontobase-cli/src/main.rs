//! Ontobase CLI
//!
//! Exercises the engine over JSON fixtures:
//! - resolving and flattening template structures
//! - compiling and executing criteria against a document fixture
//! - enumeration drill-down and distinct-value reports
//!
//! Results are printed as pretty JSON on stdout; logs go to stderr
//! (`RUST_LOG`, default `warn`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use ontobase_engine::{EngineConfig, EnumerationRequest, MatchRequest, OntologyService};
use ontobase_ontology::{Depth, FlattenMode};
use ontobase_storage::{JsonOntologyStore, MemoryDocumentStore, Paging};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

mod args;

#[derive(Parser)]
#[command(name = "ontobase")]
#[command(author, version, about = "Ontology-driven structure resolution and document matching")]
struct Cli {
    /// Ontology bundle (`{tags, nodes, edges}`) as JSON
    #[arg(long, global = true, default_value = "ontology.json")]
    ontology: PathBuf,

    /// Document fixture (`{collection: [docs]}`) as JSON
    #[arg(long, global = true)]
    documents: Option<PathBuf>,

    /// Engine configuration JSON
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the structure below a node.
    Resolve {
        pid: String,
        /// Edge levels to expand (`unbounded` for no limit)
        #[arg(long, default_value = "unbounded")]
        depth: Depth,
    },

    /// Flatten a node's structure into storage offsets.
    Flatten {
        pid: String,
        #[arg(long, default_value = "flat")]
        mode: FlattenMode,
        #[arg(long, default_value = "unbounded")]
        depth: Depth,
    },

    /// List the offset path of every field below a node.
    Paths { pid: String },

    /// Compile criteria and run them against the document fixture.
    Match {
        #[arg(long)]
        collection: Option<String>,
        /// tag=..,pattern=..,ops=a+b[,path=x.y] (repeatable)
        #[arg(long = "criterion", value_parser = args::parse_criterion)]
        criteria: Vec<ontobase_engine::Criterion>,
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long)]
        limit: Option<usize>,
        /// Dotted path to sort by
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        desc: bool,
        #[arg(long)]
        language: Option<String>,
        /// Template whose structure supplies nested field paths
        #[arg(long)]
        template: Option<String>,
        /// Print the compiled query instead of executing it
        #[arg(long)]
        explain: bool,
    },

    /// Root enumeration values of a tag, or the children of `--value`.
    Enums {
        tag: String,
        #[arg(long)]
        value: Option<String>,
        #[arg(long)]
        collection: Option<String>,
        /// Sibling selections (same syntax as `match`)
        #[arg(long = "criterion", value_parser = args::parse_criterion)]
        criteria: Vec<ontobase_engine::Criterion>,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        template: Option<String>,
    },

    /// Distinct stored values of a tag, with document counts.
    Distinct {
        tag: String,
        #[arg(long)]
        collection: Option<String>,
        /// Dotted document path (defaults to the tag offset)
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        language: Option<String>,
    },

    /// List the tag dictionary.
    Tags {
        #[arg(long)]
        language: Option<String>,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn build_service(cli: &Cli) -> Result<OntologyService> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let documents = match &cli.documents {
        Some(path) => MemoryDocumentStore::load_json_file(path).await?,
        None => MemoryDocumentStore::new(),
    };
    let ontology = JsonOntologyStore::new(&cli.ontology);
    OntologyService::bootstrap(Arc::new(ontology), Arc::new(documents), config)
        .await
        .with_context(|| format!("loading ontology from {}", cli.ontology.display()))
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let service = build_service(&cli).await?;

    match cli.command {
        Commands::Resolve { pid, depth } => {
            print_json(&*service.resolve(&pid, depth)?)?;
        }
        Commands::Flatten { pid, mode, depth } => {
            print_json(&*service.flatten(&pid, depth, mode)?)?;
        }
        Commands::Paths { pid } => {
            let paths: Vec<String> = service
                .offset_paths(&pid)?
                .iter()
                .map(|p| format!("{p}  ({})", p.predicate_trail()))
                .collect();
            print_json(&paths)?;
        }
        Commands::Match {
            collection,
            criteria,
            skip,
            limit,
            sort,
            desc,
            language,
            template,
            explain,
        } => {
            let mut paging = Paging {
                skip,
                limit,
                sort: None,
            };
            if let Some(sort) = sort {
                paging = paging.sorted_by(args::parse_path(&sort), desc);
            }
            let request = MatchRequest {
                collection,
                criteria,
                paging,
                language,
                template,
            };
            if explain {
                print_json(&service.compile(&request)?)?;
            } else {
                print_json(&service.match_criteria(&request, &cancel).await?)?;
            }
        }
        Commands::Enums {
            tag,
            value,
            collection,
            criteria,
            language,
            template,
        } => {
            let request = EnumerationRequest {
                tag: args::parse_tag(&tag),
                collection,
                criteria,
                language,
                template,
            };
            let entries = match value {
                Some(parent) => service.child_enumerations(&request, &parent, &cancel).await?,
                None => service.root_enumerations(&request, &cancel).await?,
            };
            print_json(&entries)?;
        }
        Commands::Distinct {
            tag,
            collection,
            path,
            language,
        } => {
            let values = service
                .distinct_values(
                    &args::parse_tag(&tag),
                    collection.as_deref(),
                    path.as_deref().map(args::parse_path),
                    language.as_deref(),
                    &cancel,
                )
                .await?;
            print_json(&values)?;
        }
        Commands::Tags { language } => {
            print_json(&service.tags(language.as_deref())?)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; cancelling in-flight requests");
            on_interrupt.cancel();
        }
    });

    if let Err(err) = run(cli, cancel).await {
        eprintln!("{} {err:#}", "error:".red().bold());
        std::process::exit(1);
    }
}
