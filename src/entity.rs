use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    definition::EntityDefinition,
    error::{Error, Result},
    node::Node,
};

/// One record handed to the index: an entity id, an optional graph scope
/// and the text to index per field.
///
/// Values are already serialized to text. With lexical node decoding the
/// text is the literal's lexical form; with typed decoding it is the
/// N-Triples encoding produced by [`Node::encode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    graph: Option<String>,
    #[serde(default)]
    values: BTreeMap<String, String>,
}

impl Entity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            graph: None,
            values: BTreeMap::new(),
        }
    }

    /// Entity for a graph node. Literals cannot identify entities.
    pub fn for_node(node: &Node) -> Result<Self> {
        Ok(Self::new(node.entity_id()?))
    }

    pub fn in_graph(mut self, graph: impl Into<String>) -> Self {
        self.graph = Some(graph.into());
        self
    }

    pub fn with(
        mut self,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.put(field, value);
        self
    }

    pub fn put(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.values.insert(field.into(), value.into());
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn graph(&self) -> Option<&str> {
        self.graph.as_deref()
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    /// Check the entity against `def`. Runs before anything is written so a
    /// rejected entity never leaves a partial document behind.
    pub fn validate(&self, def: &EntityDefinition) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::InvalidEntityValue("entity id is empty".into()));
        }

        match (def.graph_field(), &self.graph) {
            (Some(field), None) => {
                return Err(Error::InvalidEntityValue(format!(
                    "entity {} has no graph but the index is scoped by '{field}'",
                    self.id
                )));
            }
            (None, Some(graph)) => {
                return Err(Error::InvalidEntityValue(format!(
                    "entity {} names graph {graph} but the index has no graph field",
                    self.id
                )));
            }
            _ => {}
        }

        if let Some(field) = self.values.keys().find(|f| !def.is_indexed(f)) {
            return Err(Error::InvalidEntityValue(format!(
                "'{field}' is not an indexed field"
            )));
        }

        Ok(())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity[{}", self.id)?;
        if let Some(graph) = &self.graph {
            write!(f, " in {graph}")?;
        }
        for (field, value) in &self.values {
            write!(f, " {field}={value:?}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(graph: bool) -> EntityDefinition {
        let builder = EntityDefinition::builder("uri", "text").field("text");
        let builder = if graph {
            builder.graph_field("graph")
        } else {
            builder
        };
        builder.build().unwrap()
    }

    #[test]
    fn valid_entity_passes() {
        let e = Entity::new("http://x").with("text", "hello");
        e.validate(&def(false)).unwrap();
        assert_eq!(e.get("text"), Some("hello"));
    }

    #[test]
    fn empty_id_rejected() {
        let e = Entity::new("").with("text", "hello");
        assert!(matches!(
            e.validate(&def(false)),
            Err(Error::InvalidEntityValue(_))
        ));
    }

    #[test]
    fn unknown_field_rejected() {
        let e = Entity::new("http://x").with("nope", "hello");
        assert!(matches!(
            e.validate(&def(false)),
            Err(Error::InvalidEntityValue(_))
        ));
    }

    #[test]
    fn graph_must_match_definition() {
        let scoped = def(true);
        let unscoped = def(false);

        assert!(Entity::new("http://x").validate(&scoped).is_err());
        assert!(
            Entity::new("http://x")
                .in_graph("http://g")
                .validate(&unscoped)
                .is_err()
        );
        Entity::new("http://x")
            .in_graph("http://g")
            .validate(&scoped)
            .unwrap();
    }

    #[test]
    fn for_node_uses_entity_id_form() {
        let e = Entity::for_node(&Node::blank("b1")).unwrap();
        assert_eq!(e.id(), "_:b1");
        assert!(Entity::for_node(&Node::literal("x")).is_err());
    }

    #[test]
    fn display_lists_values() {
        let e = Entity::new("http://x").with("text", "hi");
        assert_eq!(e.to_string(), "Entity[http://x text=\"hi\"]");
    }
}
