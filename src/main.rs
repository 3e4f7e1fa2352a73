use std::{
    io::{BufRead, BufReader},
    path::Path,
};

use clap::Parser;
use rdftext::{
    cli::{Cli, Command, DefineArgs, LoadArgs, LookupArgs, QueryArgs},
    config_db::{ConfigDb, IndexSpec},
    data_dir::DataDir,
    definition::EntityDefinition,
    error::{self, Error},
    loader::{self, LoadMode},
    query_parser::Operator,
    registry::SystemInfo,
    text_index::{DuplicatePolicy, NodeDecoding, TextIndex, TextIndexConfig},
};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("RDFTEXT_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;

    match cli.command {
        Command::Define(args) => cmd_define(&config_db, &data_dir, &args)?,
        Command::Drop { name } => cmd_drop(&config_db, &data_dir, &name)?,
        Command::List { json } => cmd_list(&config_db, json)?,
        Command::Load(args) => cmd_load(&config_db, &data_dir, &args)?,
        Command::Query(args) => cmd_query(&config_db, &data_dir, &args)?,
        Command::Lookup(args) => cmd_lookup(&config_db, &data_dir, &args)?,
        Command::Status(args) => cmd_status(&config_db, &data_dir, args.json)?,
        Command::Completions(_) => {}
    }

    Ok(())
}

fn open_index(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    name: &str,
    read_only: bool,
) -> error::Result<TextIndex> {
    let dir = data_dir.index_dir(name)?;
    let spec = config_db.get_index(name)?.ok_or_else(|| Error::NotFound {
        kind: "index",
        name: name.to_string(),
    })?;
    if read_only {
        TextIndex::open_read_only(&dir, spec.definition, spec.config)
    } else {
        TextIndex::open_in_dir(&dir, spec.definition, spec.config)
    }
}

fn cmd_define(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    args: &DefineArgs,
) -> error::Result<()> {
    let dir = data_dir.index_dir(&args.name)?;
    if config_db.get_index(&args.name)?.is_some() {
        return Err(Error::Config(format!(
            "index '{}' already exists",
            args.name
        )));
    }

    let mut builder =
        EntityDefinition::builder(&args.entity_field, &args.primary_field);
    if let Some(graph) = &args.graph_field {
        builder = builder.graph_field(graph);
    }
    for field in &args.fields {
        builder = match field.analysis {
            Some(analysis) => builder.field_with(&field.name, analysis),
            None => builder.field(&field.name),
        };
    }
    let definition = builder.build()?;

    let config = TextIndexConfig {
        node_decoding: if args.typed {
            NodeDecoding::Typed
        } else {
            NodeDecoding::Lexical
        },
        duplicate_policy: if args.replace_duplicates {
            DuplicatePolicy::Replace
        } else {
            DuplicatePolicy::Allow
        },
        default_operator: if args.and { Operator::And } else { Operator::Or },
        ..Default::default()
    };

    // Creating the index up front surfaces schema errors before the
    // definition is stored.
    let index =
        TextIndex::open_in_dir(&dir, definition.clone(), config.clone())?;
    index.close()?;

    config_db.set_index(&args.name, &IndexSpec { definition, config })?;
    println!("Defined index '{}'", args.name);
    Ok(())
}

fn cmd_drop(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    name: &str,
) -> error::Result<()> {
    let dir = data_dir.index_dir(name)?;
    if !config_db.remove_index(name)? {
        return Err(Error::NotFound {
            kind: "index",
            name: name.to_string(),
        });
    }
    if dir.exists() {
        std::fs::remove_dir_all(&dir)?;
    }
    println!("Dropped index '{name}'");
    Ok(())
}

fn cmd_list(config_db: &ConfigDb, json: bool) -> error::Result<()> {
    let indexes = config_db.list_indexes()?;

    if json {
        let entries: Vec<_> = indexes
            .iter()
            .map(|(name, spec)| {
                serde_json::json!({
                    "name": name,
                    "definition": spec.definition,
                    "config": spec.config,
                })
            })
            .collect();
        println!("{}", serde_json::to_string(&entries)?);
    } else if indexes.is_empty() {
        println!("No indexes defined.");
    } else {
        for (name, spec) in &indexes {
            println!(
                "{name}\t{}\t{}",
                spec.definition.entity_field(),
                spec.definition.fields().join(",")
            );
        }
    }
    Ok(())
}

fn cmd_load(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    args: &LoadArgs,
) -> error::Result<()> {
    let index = open_index(config_db, data_dir, &args.name, false)?;
    let mode = if args.update {
        LoadMode::Update
    } else {
        LoadMode::Add
    };

    let reader: Box<dyn BufRead> = if args.input == Path::new("-") {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        Box::new(BufReader::new(std::fs::File::open(&args.input)?))
    };

    let count = loader::load_jsonl(&index, reader, mode)?;
    index.close()?;
    println!("Loaded {count} entities into '{}'", args.name);
    Ok(())
}

fn cmd_query(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    args: &QueryArgs,
) -> error::Result<()> {
    let index = open_index(config_db, data_dir, &args.name, true)?;
    let limit = Some(args.count);
    let hits = match &args.graph {
        Some(graph) => index.query_in_graph(&args.query, graph, limit)?,
        None => index.query_hits(&args.query, limit)?,
    };

    if args.json {
        println!("{}", serde_json::to_string(&hits)?);
    } else if hits.is_empty() {
        println!("No results.");
    } else {
        for hit in &hits {
            println!("{:.4}\t{}", hit.score, hit.node);
        }
    }
    Ok(())
}

fn cmd_lookup(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    args: &LookupArgs,
) -> error::Result<()> {
    let index = open_index(config_db, data_dir, &args.name, true)?;
    let record = index.lookup(&args.id)?.ok_or_else(|| Error::NotFound {
        kind: "entity",
        name: args.id.clone(),
    })?;

    if args.json {
        println!("{}", serde_json::to_string(&record)?);
    } else {
        println!("entity: {}", record.entity);
        if let Some(graph) = &record.graph {
            println!("graph: {graph}");
        }
        for (field, values) in &record.fields {
            for value in values {
                println!("{field}: {value}");
            }
        }
    }
    Ok(())
}

fn cmd_status(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    json: bool,
) -> error::Result<()> {
    let mut documents = Vec::new();
    for (name, _) in config_db.list_indexes()? {
        let index = open_index(config_db, data_dir, &name, true)?;
        documents.push((name, index.num_docs()?));
    }

    if json {
        let indexes: Vec<_> = documents
            .iter()
            .map(|(name, count)| {
                serde_json::json!({ "name": name, "documents": count })
            })
            .collect();
        println!(
            "{}",
            serde_json::json!({
                "data_dir": data_dir.root(),
                "system": SystemInfo::current(),
                "indexes": indexes,
            })
        );
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Indexes: {}", documents.len());
        for (name, count) in &documents {
            println!("  {name}: {count} documents");
        }
    }
    Ok(())
}
