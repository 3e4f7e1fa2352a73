//! Turning index hits back into graph values.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tantivy::{
    TantivyDocument,
    schema::{Field, Value},
};

use crate::{
    definition::EntityDefinition,
    error::{Error, Result},
    node::Node,
    text_index::{DocFields, NodeDecoding},
};

/// One query hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    pub node: Node,
    pub score: f32,
}

/// The stored content of an entity's document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupRecord {
    pub entity: Node,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<String>,
    /// Values per field in the order they were stored. Fields the
    /// document has no value for are absent.
    pub fields: BTreeMap<String, Vec<Node>>,
}

impl LookupRecord {
    /// The first value of `field`.
    pub fn first(&self, field: &str) -> Option<&Node> {
        self.fields.get(field).and_then(|v| v.first())
    }

    /// Flatten into a single node per field: the entity under its field
    /// name, and the last stored value of every other field.
    pub fn collapse(&self, def: &EntityDefinition) -> HashMap<String, Node> {
        let mut out: HashMap<String, Node> = self
            .fields
            .iter()
            .filter_map(|(field, values)| {
                values.last().map(|v| (field.clone(), v.clone()))
            })
            .collect();
        out.insert(def.entity_field().to_string(), self.entity.clone());
        out
    }
}

/// Reads stored fields of a document according to the index layout.
pub(crate) struct Projector<'a> {
    fields: &'a DocFields,
    decoding: NodeDecoding,
}

impl<'a> Projector<'a> {
    pub(crate) fn new(fields: &'a DocFields, decoding: NodeDecoding) -> Self {
        Self { fields, decoding }
    }

    pub(crate) fn hit(&self, doc: &TantivyDocument, score: f32) -> Result<Hit> {
        Ok(Hit {
            node: self.entity(doc)?,
            score,
        })
    }

    pub(crate) fn record(&self, doc: &TantivyDocument) -> Result<LookupRecord> {
        let entity = self.entity(doc)?;
        let graph = self
            .fields
            .graph
            .and_then(|field| first_text(doc, field))
            .map(str::to_string);

        let mut fields = BTreeMap::new();
        for value_field in &self.fields.values {
            let nodes = match (self.decoding, value_field.node) {
                (NodeDecoding::Typed, Some(node_field)) => doc
                    .get_all(node_field)
                    .filter_map(|v| v.as_str())
                    .map(Node::decode)
                    .collect::<Result<Vec<_>>>()?,
                _ => doc
                    .get_all(value_field.text)
                    .filter_map(|v| v.as_str())
                    .map(Node::literal)
                    .collect(),
            };
            if !nodes.is_empty() {
                fields.insert(value_field.name.clone(), nodes);
            }
        }

        Ok(LookupRecord {
            entity,
            graph,
            fields,
        })
    }

    fn entity(&self, doc: &TantivyDocument) -> Result<Node> {
        first_text(doc, self.fields.entity)
            .map(Node::from_entity_id)
            .ok_or_else(|| {
                Error::InvalidEntityValue(
                    "indexed document has no entity value".into(),
                )
            })
    }
}

fn first_text(doc: &TantivyDocument, field: Field) -> Option<&str> {
    doc.get_first(field).and_then(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> LookupRecord {
        let mut fields = BTreeMap::new();
        fields.insert(
            "label".to_string(),
            vec![Node::literal("first"), Node::literal("last")],
        );
        LookupRecord {
            entity: Node::uri("http://example.org/a"),
            graph: None,
            fields,
        }
    }

    #[test]
    fn collapse_keeps_last_value_and_entity() {
        let def = EntityDefinition::builder("uri", "label")
            .field("label")
            .build()
            .unwrap();
        let flat = record().collapse(&def);
        assert_eq!(flat["label"], Node::literal("last"));
        assert_eq!(flat["uri"], Node::uri("http://example.org/a"));
        assert_eq!(flat.len(), 2);
    }

    #[test]
    fn first_returns_encounter_order() {
        assert_eq!(record().first("label"), Some(&Node::literal("first")));
        assert_eq!(record().first("missing"), None);
    }
}
