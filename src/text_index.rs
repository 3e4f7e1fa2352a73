use std::{
    path::Path,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use serde::{Deserialize, Serialize};
use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    ReloadPolicy,
    TantivyDocument,
    TantivyError,
    Term,
    collector::TopDocs,
    directory::{Directory, MmapDirectory},
    indexer::UserOperation,
    query::{BooleanQuery, Occur, Query, TermQuery},
    schema::{
        Field,
        IndexRecordOption,
        STORED,
        Schema,
        TextFieldIndexing,
        TextOptions,
    },
};
use tracing::{debug, info};

use crate::{
    analysis::{Analysis, register_tokenizers},
    definition::EntityDefinition,
    entity::Entity,
    error::{Error, Result},
    node::Node,
    projector::{Hit, LookupRecord, Projector},
    query_parser::{self, Operator, QueryParser},
    registry::IndexStats,
};

/// Suffix of the stored-only field holding a value's node encoding when
/// the index uses [`NodeDecoding::Typed`].
pub const NODE_FIELD_SUFFIX: &str = "#node";

/// Writer heap budget in bytes. Tantivy refuses less than 15 MB per
/// indexing thread.
pub const DEFAULT_WRITER_MEMORY: usize = 15_000_000;

/// Result cap applied when a query gives no limit.
pub const DEFAULT_MAX_RESULTS: usize = 10_000;

/// What `add_entity` does when the entity id is already indexed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Keep every document; a lookup returns whichever ranks first.
    #[default]
    Allow,
    /// Treat every add as an update.
    Replace,
}

/// How stored values are turned back into nodes by [`TextIndex::lookup`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NodeDecoding {
    /// Values are indexed verbatim and come back as plain literals.
    #[default]
    Lexical,
    /// Values are node encodings; the lexical form is indexed and the
    /// full node, datatype and language included, is restored on lookup.
    Typed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextIndexConfig {
    pub writer_memory_budget: usize,
    pub max_results: usize,
    pub default_operator: Operator,
    pub duplicate_policy: DuplicatePolicy,
    pub node_decoding: NodeDecoding,
    /// Analysis used for query text on tokenized fields. `None` uses each
    /// field's index-time analysis.
    pub query_analysis: Option<Analysis>,
}

impl Default for TextIndexConfig {
    fn default() -> Self {
        Self {
            writer_memory_budget: DEFAULT_WRITER_MEMORY,
            max_results: DEFAULT_MAX_RESULTS,
            default_operator: Operator::default(),
            duplicate_policy: DuplicatePolicy::default(),
            node_decoding: NodeDecoding::default(),
            query_analysis: None,
        }
    }
}

impl TextIndexConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_results == 0 {
            return Err(Error::Config("max_results must be positive".into()));
        }
        if self.writer_memory_budget < DEFAULT_WRITER_MEMORY {
            return Err(Error::Config(format!(
                "writer_memory_budget must be at least {DEFAULT_WRITER_MEMORY} bytes"
            )));
        }
        if self.query_analysis == Some(Analysis::Exact) {
            return Err(Error::Config(
                "query_analysis cannot be exact; mark the field exact instead"
                    .into(),
            ));
        }
        Ok(())
    }
}

/// Resolved field handles for an index built from an [`EntityDefinition`].
#[derive(Debug, Clone)]
pub(crate) struct DocFields {
    pub(crate) entity: Field,
    pub(crate) graph: Option<Field>,
    pub(crate) values: Vec<ValueField>,
}

#[derive(Debug, Clone)]
pub(crate) struct ValueField {
    pub(crate) name: String,
    pub(crate) text: Field,
    /// Companion field holding the node encoding, typed decoding only.
    pub(crate) node: Option<Field>,
}

impl DocFields {
    fn value(&self, name: &str) -> Option<&ValueField> {
        self.values.iter().find(|v| v.name == name)
    }
}

fn text_options(analysis: Analysis) -> TextOptions {
    let record = if analysis.is_exact() {
        IndexRecordOption::Basic
    } else {
        IndexRecordOption::WithFreqsAndPositions
    };
    TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(analysis.tokenizer_name())
                .set_index_option(record),
        )
        .set_stored()
}

fn build_schema(
    def: &EntityDefinition,
    decoding: NodeDecoding,
) -> Result<(Schema, DocFields)> {
    let mut builder = Schema::builder();

    let exact = text_options(Analysis::Exact);
    let entity = builder.add_text_field(def.entity_field(), exact.clone());
    let graph = def
        .graph_field()
        .map(|name| builder.add_text_field(name, exact.clone()));

    let mut values = Vec::with_capacity(def.fields().len());
    for name in def.fields() {
        let text =
            builder.add_text_field(name, text_options(def.analysis_for(name)));
        let node = match decoding {
            NodeDecoding::Lexical => None,
            NodeDecoding::Typed => {
                let companion = format!("{name}{NODE_FIELD_SUFFIX}");
                if def.is_indexed(&companion)
                    || companion == def.entity_field()
                    || def.graph_field() == Some(companion.as_str())
                {
                    return Err(Error::Definition(format!(
                        "field '{companion}' clashes with the node field of '{name}'"
                    )));
                }
                Some(builder.add_text_field(&companion, STORED))
            }
        };
        values.push(ValueField {
            name: name.clone(),
            text,
            node,
        });
    }

    Ok((
        builder.build(),
        DocFields {
            entity,
            graph,
            values,
        },
    ))
}

/// A full-text index of entities with a single writer.
///
/// Writes become visible to [`query`](Self::query) and
/// [`lookup`](Self::lookup) only after [`commit`](Self::commit).
pub struct TextIndex {
    reader: IndexReader,
    fields: DocFields,
    def: EntityDefinition,
    config: TextIndexConfig,
    parser: QueryParser,
    writer: Mutex<Option<IndexWriter>>,
    read_only: bool,
    closed: AtomicBool,
    generation: AtomicU64,
    stats: Arc<IndexStats>,
}

impl TextIndex {
    /// Open the index stored in `directory`, creating it if the directory
    /// is empty. Fails if an existing index has a different schema.
    pub fn create(
        directory: impl Into<Box<dyn Directory>>,
        def: EntityDefinition,
        config: TextIndexConfig,
    ) -> Result<Self> {
        def.validate()?;
        config.validate()?;
        let (schema, fields) = build_schema(&def, config.node_decoding)?;
        let index = Index::open_or_create(directory, schema)?;
        Self::from_index(index, fields, def, config, true)
    }

    /// Open or create an index on disk at `dir`.
    pub fn open_in_dir(
        dir: &Path,
        def: EntityDefinition,
        config: TextIndexConfig,
    ) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let mmap_dir = MmapDirectory::open(dir)
            .map_err(|e| TantivyError::SystemError(e.to_string()))?;
        Self::create(mmap_dir, def, config)
    }

    /// Open an existing on-disk index without a writer. Commits made by
    /// a writer elsewhere become visible on the next read; writes fail
    /// with [`Error::ReadOnly`].
    pub fn open_read_only(
        dir: &Path,
        def: EntityDefinition,
        config: TextIndexConfig,
    ) -> Result<Self> {
        def.validate()?;
        config.validate()?;
        let (schema, fields) = build_schema(&def, config.node_decoding)?;
        let mmap_dir = MmapDirectory::open(dir)
            .map_err(|e| TantivyError::SystemError(e.to_string()))?;
        let index = Index::open(mmap_dir)?;
        if index.schema() != schema {
            return Err(Error::Index(TantivyError::SchemaError(
                "stored schema does not match the entity definition".into(),
            )));
        }
        Self::from_index(index, fields, def, config, false)
    }

    /// Create an in-memory index.
    pub fn open_in_ram(
        def: EntityDefinition,
        config: TextIndexConfig,
    ) -> Result<Self> {
        def.validate()?;
        config.validate()?;
        let (schema, fields) = build_schema(&def, config.node_decoding)?;
        let index = Index::create_in_ram(schema);
        Self::from_index(index, fields, def, config, true)
    }

    fn from_index(
        index: Index,
        fields: DocFields,
        def: EntityDefinition,
        config: TextIndexConfig,
        writable: bool,
    ) -> Result<Self> {
        register_tokenizers(&index);
        let parser = QueryParser::new(
            &index.schema(),
            &def,
            config.default_operator,
            config.query_analysis,
        )?;
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer: Option<IndexWriter> = if writable {
            Some(index.writer(config.writer_memory_budget)?)
        } else {
            None
        };

        Ok(Self {
            reader,
            fields,
            def,
            config,
            parser,
            writer: Mutex::new(writer),
            read_only: !writable,
            closed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            stats: IndexStats::new(),
        })
    }

    pub fn doc_def(&self) -> &EntityDefinition {
        &self.def
    }

    pub fn config(&self) -> &TextIndexConfig {
        &self.config
    }

    /// Number of times the writer has been replaced by a rollback.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> &Arc<IndexStats> {
        &self.stats
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of committed documents.
    pub fn num_docs(&self) -> Result<u64> {
        self.ensure_open()?;
        self.reader.reload()?;
        Ok(self.reader.searcher().num_docs())
    }

    /// Index `entity` as a new document.
    pub fn add_entity(&self, entity: &Entity) -> Result<()> {
        if self.config.duplicate_policy == DuplicatePolicy::Replace {
            return self.update_entity(entity);
        }
        let doc = self.build_document(entity)?;
        let guard = self.lock_writer()?;
        let writer = guard.as_ref().ok_or(Error::Closed)?;
        writer.add_document(doc)?;
        self.stats.record_add();
        debug!(id = entity.id(), "added entity");
        Ok(())
    }

    /// Replace every document of `entity`'s id with a single new one.
    pub fn update_entity(&self, entity: &Entity) -> Result<()> {
        let doc = self.build_document(entity)?;
        let term = Term::from_field_text(self.fields.entity, entity.id());
        let guard = self.lock_writer()?;
        let writer = guard.as_ref().ok_or(Error::Closed)?;
        writer.run(vec![UserOperation::Delete(term), UserOperation::Add(doc)])?;
        self.stats.record_update();
        debug!(id = entity.id(), "updated entity");
        Ok(())
    }

    /// Flush pending writes to the directory without publishing them.
    /// A later [`commit`](Self::commit) publishes them and a
    /// [`rollback`](Self::rollback) discards them.
    pub fn prepare_commit(&self) -> Result<()> {
        let mut guard = self.lock_writer()?;
        let writer = guard.as_mut().ok_or(Error::Closed)?;
        let prepared = writer.prepare_commit()?;
        let opstamp = prepared.opstamp();
        drop(prepared);
        self.stats.record_prepare();
        debug!(opstamp, "prepared commit");
        Ok(())
    }

    /// Publish pending writes and make them visible to reads.
    pub fn commit(&self) -> Result<()> {
        let opstamp = {
            let mut guard = self.lock_writer()?;
            let writer = guard.as_mut().ok_or(Error::Closed)?;
            writer.commit()?
        };
        self.reader.reload()?;
        self.stats.record_commit();
        info!(opstamp, "committed text index");
        Ok(())
    }

    /// Discard everything written since the last commit. The writer is
    /// reset to the last commit and stays usable.
    pub fn rollback(&self) -> Result<()> {
        let mut guard = self.lock_writer()?;
        let writer = guard.as_mut().ok_or(Error::Closed)?;
        writer.rollback()?;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.stats.record_rollback();
        info!(generation, "rolled back text index");
        Ok(())
    }

    /// Commit pending work, wait for merges and release the writer. Every
    /// later operation fails with [`Error::Closed`].
    pub fn close(&self) -> Result<()> {
        if self.read_only {
            self.ensure_open()?;
            self.closed.store(true, Ordering::Release);
            return Ok(());
        }
        let writer = {
            let mut guard = self.lock_writer()?;
            self.closed.store(true, Ordering::Release);
            guard.take()
        };
        let Some(mut writer) = writer else {
            return Err(Error::Closed);
        };
        writer.commit()?;
        writer.wait_merging_threads()?;
        info!("closed text index");
        Ok(())
    }

    /// Find the committed document of entity `id`.
    pub fn lookup(&self, id: &str) -> Result<Option<LookupRecord>> {
        self.ensure_open()?;
        self.stats.record_lookup();
        if id.is_empty() {
            return Ok(None);
        }
        let query = self.parser.parse(&format!(
            "{}:{}",
            query_parser::escape(self.def.entity_field()),
            query_parser::escape(id)
        ))?;

        self.reader.reload()?;
        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&*query, &TopDocs::with_limit(1))?;
        let Some((_, address)) = top_docs.into_iter().next() else {
            return Ok(None);
        };
        let doc: TantivyDocument = searcher.doc(address)?;
        let projector = Projector::new(&self.fields, self.config.node_decoding);
        projector.record(&doc).map(Some)
    }

    /// Entities matching `query_str`, best first. `limit` of `None` or zero
    /// falls back to the configured result cap.
    pub fn query(
        &self,
        query_str: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Node>> {
        Ok(self
            .query_hits(query_str, limit)?
            .into_iter()
            .map(|hit| hit.node)
            .collect())
    }

    /// Like [`query`](Self::query), keeping the scores.
    pub fn query_hits(
        &self,
        query_str: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Hit>> {
        self.ensure_open()?;
        let query = self.parser.parse(query_str)?;
        self.stats.record_query();
        self.search(&*query, limit)
    }

    /// Like [`query_hits`](Self::query_hits), restricted to one graph.
    pub fn query_in_graph(
        &self,
        query_str: &str,
        graph: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Hit>> {
        self.ensure_open()?;
        let Some(graph_field) = self.fields.graph else {
            return Err(Error::Definition(
                "index has no graph field".into(),
            ));
        };
        let user_query = self.parser.parse(query_str)?;
        let graph_query = TermQuery::new(
            Term::from_field_text(graph_field, graph),
            IndexRecordOption::Basic,
        );
        let combined = BooleanQuery::new(vec![
            (Occur::Must, user_query),
            (Occur::Must, Box::new(graph_query)),
        ]);
        self.stats.record_query();
        self.search(&combined, limit)
    }

    fn search(
        &self,
        query: &dyn Query,
        limit: Option<usize>,
    ) -> Result<Vec<Hit>> {
        self.reader.reload()?;
        let searcher = self.reader.searcher();
        // Never ask the collector for more hits than there are documents.
        let num_docs =
            usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX);
        let limit = limit
            .filter(|&n| n > 0)
            .unwrap_or(self.config.max_results)
            .min(num_docs.max(1));
        let top_docs = searcher.search(query, &TopDocs::with_limit(limit))?;

        let projector = Projector::new(&self.fields, self.config.node_decoding);
        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            hits.push(projector.hit(&doc, score)?);
        }
        Ok(hits)
    }

    /// Validate `entity` and turn it into a document. Nothing touches the
    /// writer until this succeeds.
    fn build_document(&self, entity: &Entity) -> Result<TantivyDocument> {
        self.ensure_open()?;
        entity.validate(&self.def)?;

        let mut doc = TantivyDocument::default();
        doc.add_text(self.fields.entity, entity.id());
        if let (Some(field), Some(graph)) =
            (self.fields.graph, entity.graph())
        {
            doc.add_text(field, graph);
        }

        for (name, value) in entity.values() {
            let Some(field) = self.fields.value(name) else {
                return Err(Error::InvalidEntityValue(format!(
                    "'{name}' is not an indexed field"
                )));
            };
            match (self.config.node_decoding, field.node) {
                (NodeDecoding::Typed, Some(node_field)) => {
                    let node = Node::decode(value)?;
                    doc.add_text(field.text, node.literal_text()?);
                    doc.add_text(node_field, node.encode());
                }
                _ => doc.add_text(field.text, value),
            }
        }
        Ok(doc)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, Option<IndexWriter>>> {
        self.ensure_open()?;
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        self.writer
            .lock()
            .map_err(|_| Error::Index(TantivyError::Poisoned))
    }
}

impl std::fmt::Debug for TextIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextIndex")
            .field("entity_field", &self.def.entity_field())
            .field("generation", &self.generation())
            .field("read_only", &self.read_only)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def() -> EntityDefinition {
        EntityDefinition::builder("uri", "text")
            .graph_field("graph")
            .field("text")
            .field_with("label", Analysis::Exact)
            .build()
            .unwrap()
    }

    fn ram_index(config: TextIndexConfig) -> TextIndex {
        let def = EntityDefinition::builder("uri", "text")
            .field("text")
            .field_with("label", Analysis::Exact)
            .build()
            .unwrap();
        TextIndex::open_in_ram(def, config).unwrap()
    }

    #[test]
    fn schema_has_companion_fields_only_when_typed() {
        let (lexical, _) = build_schema(&def(), NodeDecoding::Lexical).unwrap();
        assert!(lexical.get_field("text#node").is_err());

        let (typed, fields) =
            build_schema(&def(), NodeDecoding::Typed).unwrap();
        assert!(typed.get_field("text#node").is_ok());
        assert!(fields.value("label").unwrap().node.is_some());
        assert!(fields.graph.is_some());
    }

    #[test]
    fn companion_name_clash_is_rejected() {
        let def = EntityDefinition::builder("uri", "text")
            .field("text")
            .field("text#node")
            .build()
            .unwrap();
        let err = build_schema(&def, NodeDecoding::Typed).unwrap_err();
        assert!(matches!(err, Error::Definition(_)));
    }

    #[test]
    fn config_validation() {
        TextIndexConfig::default().validate().unwrap();
        let zero = TextIndexConfig {
            max_results: 0,
            ..Default::default()
        };
        assert!(matches!(zero.validate(), Err(Error::Config(_))));
        let small = TextIndexConfig {
            writer_memory_budget: 1_000,
            ..Default::default()
        };
        assert!(matches!(small.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn config_fills_defaults_from_partial_json() {
        let config: TextIndexConfig =
            serde_json::from_str(r#"{"node_decoding":"typed"}"#).unwrap();
        assert_eq!(config.node_decoding, NodeDecoding::Typed);
        assert_eq!(config.max_results, DEFAULT_MAX_RESULTS);
    }

    #[test]
    fn add_commit_and_query() {
        let index = ram_index(TextIndexConfig::default());
        index
            .add_entity(&Entity::new("http://x/1").with("text", "Hello world"))
            .unwrap();
        index.commit().unwrap();

        let nodes = index.query("hello", None).unwrap();
        assert_eq!(nodes, vec![Node::uri("http://x/1")]);
        assert_eq!(index.num_docs().unwrap(), 1);
    }

    #[test]
    fn huge_limits_are_capped_by_document_count() {
        let index = ram_index(TextIndexConfig::default());
        assert!(index.query("hello", Some(usize::MAX)).unwrap().is_empty());

        index
            .add_entity(&Entity::new("http://x/1").with("text", "hello"))
            .unwrap();
        index
            .add_entity(&Entity::new("http://x/2").with("text", "hello"))
            .unwrap();
        index.commit().unwrap();

        assert_eq!(index.query("hello", Some(usize::MAX)).unwrap().len(), 2);
        assert_eq!(index.query("hello", Some(1 << 40)).unwrap().len(), 2);
        assert_eq!(index.query("hello", Some(1)).unwrap().len(), 1);
    }

    #[test]
    fn invalid_entity_is_rejected_before_write() {
        let index = ram_index(TextIndexConfig::default());
        let err = index
            .add_entity(&Entity::new("http://x/1").with("nope", "v"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidEntityValue(_)));
        index.commit().unwrap();
        assert_eq!(index.num_docs().unwrap(), 0);
    }

    #[test]
    fn stats_count_operations() {
        let index = ram_index(TextIndexConfig::default());
        let e = Entity::new("http://x/1").with("text", "a");
        index.add_entity(&e).unwrap();
        index.update_entity(&e).unwrap();
        index.prepare_commit().unwrap();
        index.commit().unwrap();
        index.query("a", None).unwrap();
        index.lookup("http://x/1").unwrap();
        index.rollback().unwrap();

        let s = index.stats().snapshot();
        assert_eq!(
            (
                s.adds,
                s.updates,
                s.prepares,
                s.commits,
                s.queries,
                s.lookups,
                s.rollbacks
            ),
            (1, 1, 1, 1, 1, 1, 1)
        );
    }

    #[test]
    fn lookup_of_empty_id_is_none() {
        let index = ram_index(TextIndexConfig::default());
        assert!(index.lookup("").unwrap().is_none());
    }

    #[test]
    fn query_in_graph_needs_graph_field() {
        let index = ram_index(TextIndexConfig::default());
        let err = index.query_in_graph("a", "http://g", None).unwrap_err();
        assert!(matches!(err, Error::Definition(_)));
    }

    #[test]
    fn debug_output_is_compact() {
        let index = ram_index(TextIndexConfig::default());
        let debug = format!("{index:?}");
        assert!(debug.starts_with("TextIndex"));
        assert!(debug.contains("generation: 0"));
    }
}
