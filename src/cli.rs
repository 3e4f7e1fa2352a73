use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::analysis::Analysis;

#[derive(Debug, Parser)]
#[command(
    name = "rdftext",
    about = "Full-text indexes of RDF entities",
    version
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Define a named index
    Define(DefineArgs),
    /// Remove an index definition and its data
    Drop {
        /// Name of the index
        name: String,
    },
    /// List defined indexes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Load JSON-lines entity records into an index
    Load(LoadArgs),
    /// Run a text query against an index
    Query(QueryArgs),
    /// Show the stored values of one entity
    Lookup(LookupArgs),
    /// Show data directory and index statistics
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Define --

/// An indexed field given as `name` or `name=analysis`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldArg {
    pub name: String,
    pub analysis: Option<Analysis>,
}

fn parse_field_arg(s: &str) -> Result<FieldArg, String> {
    let (name, analysis) = match s.split_once('=') {
        Some((name, analysis)) => {
            let analysis =
                analysis.parse::<Analysis>().map_err(|e| e.to_string())?;
            (name, Some(analysis))
        }
        None => (s, None),
    };
    if name.is_empty() {
        return Err("field name is empty".to_string());
    }
    Ok(FieldArg {
        name: name.to_string(),
        analysis,
    })
}

#[derive(Debug, Parser)]
pub struct DefineArgs {
    /// Name of the index
    pub name: String,

    /// Field holding the entity URI or blank node
    #[arg(long, default_value = "uri")]
    pub entity_field: String,

    /// Field queried when a query names no field
    #[arg(long)]
    pub primary_field: String,

    /// Field holding the named graph, for graph-scoped indexes
    #[arg(long)]
    pub graph_field: Option<String>,

    /// Indexed field, as NAME or NAME=ANALYSIS (exact, standard,
    /// whitespace, english). Can be repeated.
    #[arg(long = "field", value_parser = parse_field_arg, required = true)]
    pub fields: Vec<FieldArg>,

    /// Store values as typed nodes so lookups keep datatypes and languages
    #[arg(long)]
    pub typed: bool,

    /// Make every add replace earlier documents of the same entity
    #[arg(long)]
    pub replace_duplicates: bool,

    /// Combine query clauses with AND instead of OR
    #[arg(long)]
    pub and: bool,
}

// -- Load --

#[derive(Debug, Parser)]
pub struct LoadArgs {
    /// Name of the index
    pub name: String,

    /// JSON-lines file, or `-` for stdin
    pub input: PathBuf,

    /// Replace existing documents of each entity instead of appending
    #[arg(long)]
    pub update: bool,
}

// -- Query --

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// Name of the index
    pub name: String,

    /// The query, in classic query syntax
    pub query: String,

    /// Maximum number of results (0 for the index's cap)
    #[arg(short = 'n', long, default_value = "10")]
    pub count: usize,

    /// Only return entities of this graph
    #[arg(short = 'g', long)]
    pub graph: Option<String>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Lookup --

#[derive(Debug, Parser)]
pub struct LookupArgs {
    /// Name of the index
    pub name: String,

    /// Entity URI, or `_:label` for a blank node
    pub id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "rdftext",
            &mut std::io::stdout(),
        );
    }
}
