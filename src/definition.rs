use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    analysis::Analysis,
    error::{Error, Result},
};

/// Schema describing how entities map onto index documents.
///
/// Built once when the store is set up and never mutated afterwards.
///
/// # Examples
///
/// ```
/// use rdftext::{Analysis, EntityDefinition};
///
/// let def = EntityDefinition::builder("uri", "text")
///     .graph_field("graph")
///     .field("text")
///     .field_with("label", Analysis::Exact)
///     .build()
///     .unwrap();
///
/// assert_eq!(def.primary_field(), "text");
/// assert_eq!(def.analysis_for("uri"), Analysis::Exact);
/// assert_eq!(def.analysis_for("text"), Analysis::Standard);
/// assert_eq!(def.analyzer("label"), Some(Analysis::Exact));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDefinition {
    entity_field: String,
    graph_field: Option<String>,
    primary_field: String,
    fields: Vec<String>,
    analyzers: BTreeMap<String, Analysis>,
}

impl EntityDefinition {
    pub fn builder(
        entity_field: impl Into<String>,
        primary_field: impl Into<String>,
    ) -> EntityDefinitionBuilder {
        EntityDefinitionBuilder {
            entity_field: entity_field.into(),
            graph_field: None,
            primary_field: primary_field.into(),
            fields: Vec::new(),
            analyzers: BTreeMap::new(),
        }
    }

    pub fn entity_field(&self) -> &str {
        &self.entity_field
    }

    pub fn graph_field(&self) -> Option<&str> {
        self.graph_field.as_deref()
    }

    pub fn primary_field(&self) -> &str {
        &self.primary_field
    }

    /// Indexable fields, in definition order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn is_indexed(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    /// The analysis override for `field`, or `None` if it uses the default.
    pub fn analyzer(&self, field: &str) -> Option<Analysis> {
        self.analyzers.get(field).copied()
    }

    /// The analysis actually applied to `field`.
    pub fn analysis_for(&self, field: &str) -> Analysis {
        if field == self.entity_field || self.graph_field() == Some(field) {
            return Analysis::Exact;
        }
        self.analyzer(field).unwrap_or_default()
    }

    /// Check the invariants a deserialized definition must satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.entity_field.is_empty() {
            return Err(Error::Definition("entity field name is empty".into()));
        }
        if let Some(graph) = &self.graph_field {
            if graph.is_empty() {
                return Err(Error::Definition(
                    "graph field name is empty".into(),
                ));
            }
            if *graph == self.entity_field {
                return Err(Error::Definition(format!(
                    "graph field '{graph}' is also the entity field"
                )));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if field.is_empty() {
                return Err(Error::Definition("field name is empty".into()));
            }
            if *field == self.entity_field
                || self.graph_field.as_deref() == Some(field.as_str())
            {
                return Err(Error::Definition(format!(
                    "'{field}' is reserved for the entity or graph"
                )));
            }
            if !seen.insert(field.as_str()) {
                return Err(Error::Definition(format!(
                    "field '{field}' is listed twice"
                )));
            }
        }

        if self.primary_field != self.entity_field
            && !self.is_indexed(&self.primary_field)
        {
            return Err(Error::Definition(format!(
                "primary field '{}' is neither an indexed field nor the entity field",
                self.primary_field
            )));
        }

        if let Some(field) =
            self.analyzers.keys().find(|f| !self.is_indexed(f))
        {
            return Err(Error::Definition(format!(
                "analysis override for unknown field '{field}'"
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct EntityDefinitionBuilder {
    entity_field: String,
    graph_field: Option<String>,
    primary_field: String,
    fields: Vec<String>,
    analyzers: BTreeMap<String, Analysis>,
}

impl EntityDefinitionBuilder {
    pub fn graph_field(mut self, name: impl Into<String>) -> Self {
        self.graph_field = Some(name.into());
        self
    }

    /// Add a field using the default tokenized analysis.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(name.into());
        self
    }

    /// Add a field with an explicit analysis mode.
    pub fn field_with(
        mut self,
        name: impl Into<String>,
        analysis: Analysis,
    ) -> Self {
        let name = name.into();
        self.analyzers.insert(name.clone(), analysis);
        self.fields.push(name);
        self
    }

    pub fn build(self) -> Result<EntityDefinition> {
        let def = EntityDefinition {
            entity_field: self.entity_field,
            graph_field: self.graph_field,
            primary_field: self.primary_field,
            fields: self.fields,
            analyzers: self.analyzers,
        };
        def.validate()?;
        Ok(def)
    }
}
