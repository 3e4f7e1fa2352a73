//! rdftext - a transactional full-text index of RDF entities.
//!
//! Literal values attached to graph entities are indexed with
//! [Tantivy](https://github.com/quickwit-oss/tantivy) so that text
//! queries can be answered with the URIs and blank nodes that carry them.
//! Writes follow the store's transactions: nothing is visible to queries
//! until [`TextIndex::commit`], and [`TextIndex::rollback`] discards
//! everything since the last commit.
//!
//! # Quick start
//!
//! ```
//! use rdftext::{Entity, EntityDefinition, Node, TextIndex, TextIndexConfig};
//!
//! let def = EntityDefinition::builder("uri", "label")
//!     .field("label")
//!     .build()
//!     .unwrap();
//! let index = TextIndex::open_in_ram(def, TextIndexConfig::default()).unwrap();
//!
//! index
//!     .add_entity(&Entity::new("http://example.org/rome").with("label", "Roma"))
//!     .unwrap();
//! index.commit().unwrap();
//!
//! let found = index.query("rom*", None).unwrap();
//! assert_eq!(found, vec![Node::uri("http://example.org/rome")]);
//!
//! let record = index.lookup("http://example.org/rome").unwrap().unwrap();
//! assert_eq!(record.first("label"), Some(&Node::literal("Roma")));
//! ```

pub mod analysis;
pub mod cli;
pub mod config_db;
pub mod data_dir;
pub mod definition;
pub mod entity;
pub mod error;
pub mod loader;
pub mod node;
pub mod projector;
pub mod query_parser;
pub mod registry;
pub mod text_index;

pub use analysis::Analysis;
pub use config_db::{ConfigDb, IndexSpec};
pub use data_dir::DataDir;
pub use definition::EntityDefinition;
pub use entity::Entity;
pub use error::{Error, Result};
pub use node::Node;
pub use projector::{Hit, LookupRecord};
pub use registry::{IndexRegistry, IndexStats};
pub use text_index::{
    DuplicatePolicy,
    NodeDecoding,
    TextIndex,
    TextIndexConfig,
};
