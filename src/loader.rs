use std::io::BufRead;

use rayon::prelude::*;

use crate::{
    entity::Entity,
    error::{Error, Result},
    text_index::TextIndex,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Append every record as a new document.
    #[default]
    Add,
    /// Replace existing documents of each record's id.
    Update,
}

/// Load JSON-lines entity records into `index` and commit them.
///
/// Each non-blank line is an [`Entity`] such as
/// `{"id": "http://x/1", "graph": "http://g", "values": {"label": "one"}}`.
/// Lines are parsed in parallel and written in input order. If any record
/// fails to parse nothing is written; if a write fails the index is rolled
/// back to its last commit. Returns the number of entities written.
pub fn load_jsonl(
    index: &TextIndex,
    reader: impl BufRead,
    mode: LoadMode,
) -> Result<usize> {
    let lines = reader
        .lines()
        .enumerate()
        .map(|(n, line)| line.map(|l| (n + 1, l)))
        .collect::<std::io::Result<Vec<_>>>()?;

    let entities = lines
        .par_iter()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str::<Entity>(line).map_err(|e| {
                Error::InvalidEntityValue(format!("line {n}: {e}"))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if let Err(e) = write_all(index, &entities, mode) {
        tracing::warn!(error = %e, "load failed, rolling back");
        index.rollback()?;
        return Err(e);
    }

    index.commit()?;
    tracing::info!(count = entities.len(), "loaded entities");
    Ok(entities.len())
}

fn write_all(
    index: &TextIndex,
    entities: &[Entity],
    mode: LoadMode,
) -> Result<()> {
    for entity in entities {
        match mode {
            LoadMode::Add => index.add_entity(entity)?,
            LoadMode::Update => index.update_entity(entity)?,
        }
    }
    Ok(())
}
