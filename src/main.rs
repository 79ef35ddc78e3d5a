//! Tristore CLI - inspect and load a relational RDF triple store

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tristore::config::{self, StoreConfig};
use tristore::table::{rows_table, stats_table};
use tristore::{Adapter, CachedAdapter, InsertQueryHandler, InsertRequest, RelationalAdapter, RelationalStore, Triple};

#[derive(Parser)]
#[command(name = "tristore")]
#[command(version = "0.0.1")]
#[command(about = "SQL middleware for a relational RDF triple store")]
#[command(long_about = r#"
Tristore loads RDF triples into relational tables, skipping triples the
target graph already holds, and runs reads through an optional result cache.

Example usage:
  tristore init
  tristore setup
  tristore insert --graph urn:people --file people.nt
  tristore sql "SELECT COUNT(*) AS n FROM arc_triple"
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the store config
    #[arg(short, long, global = true, default_value = "tristore.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config pointing at a local SQLite file
    Init {
        /// SQLite database path
        #[arg(short, long, default_value = "tristore.db")]
        database: String,

        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Create the triple store tables
    Setup,

    /// Insert N-Triples into a graph, skipping triples already present
    Insert {
        /// Target graph IRI
        #[arg(short, long)]
        graph: String,

        /// N-Triples file, one triple per line
        #[arg(short, long)]
        file: PathBuf,

        /// Store blank node labels as written instead of relabelling them
        #[arg(long)]
        keep_bnode_ids: bool,
    },

    /// Run a read query and print the rows
    Sql {
        /// SQL to run
        query: String,

        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Commands::Init { database, force } = &cli.command {
        let store_config = StoreConfig::sqlite(database.clone());
        config::write_config(&cli.config, &store_config, *force)?;
        println!("Wrote {}", cli.config.display());
        return Ok(());
    }

    let store_config = config::load_config(Some(&cli.config))?
        .with_context(|| format!("no config at {} (run `tristore init` first)", cli.config.display()))?;

    if store_config.cache_enabled {
        run(CachedAdapter::new(RelationalAdapter::new(store_config)), cli.command)
    } else {
        run(RelationalAdapter::new(store_config), cli.command)
    }
}

fn run<A: Adapter>(db: A, command: Commands) -> anyhow::Result<()> {
    let mut store = RelationalStore::new(db);

    match command {
        Commands::Init { .. } => anyhow::bail!("init does not open a store"),
        Commands::Setup => {
            store.setup()?;
            let prefix = store.adapter().config().table_prefix();
            println!("Tables ready with prefix {}", prefix);
        }
        Commands::Insert { graph, file, keep_bnode_ids } => {
            let triples = read_ntriples(&file)?;
            tracing::info!("Read {} triples from {}", triples.len(), file.display());

            let mut request = InsertRequest::triples(graph.clone(), triples);
            request.keep_bnode_ids = keep_bnode_ids;
            let outcome = InsertQueryHandler::new(&mut store).run_query(&request)?;
            let total = store.count_triples(Some(&graph))?;

            println!(
                "{}",
                stats_table(&[
                    ("Graph", graph),
                    ("Inserted", outcome.triples_inserted.to_string()),
                    ("Triples in graph", total.to_string()),
                    ("Elapsed", format!("{:?}", outcome.elapsed)),
                ])
            );
        }
        Commands::Sql { query, json } => {
            let mut db = store.into_inner();
            let rows = db.fetch_list(&query)?;
            if json {
                let values: Vec<_> = rows.iter().map(|row| row.to_json()).collect();
                println!("{}", serde_json::to_string_pretty(&values)?);
            } else if rows.is_empty() {
                println!("(no rows)");
            } else {
                println!("{}", rows_table(&rows));
                println!("{} row(s)", rows.len());
            }
        }
    }

    Ok(())
}

/// Parse an N-Triples file, skipping blank lines and `#` comments
fn read_ntriples(path: &Path) -> anyhow::Result<Vec<Triple>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(i, line)| {
            Triple::parse_ntriple(line).with_context(|| format!("{}:{}", path.display(), i + 1))
        })
        .collect()
}
