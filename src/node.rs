//! Graph nodes and their string encoding.
//!
//! Entity identifiers come back from the index as URIs or blank nodes.
//! Field values come back as literals. [`Node::encode`] and
//! [`Node::decode`] convert a node to and from an N-Triples style term so
//! that typed literals can be stored losslessly when the index is built
//! with [`NodeDecoding::Typed`](crate::text_index::NodeDecoding::Typed).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const BLANK_PREFIX: &str = "_:";

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Uri {
        value: String,
    },
    Blank {
        label: String,
    },
    Literal {
        lexical: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lang: Option<String>,
    },
}

impl Node {
    pub fn uri(value: impl Into<String>) -> Self {
        Node::Uri {
            value: value.into(),
        }
    }

    pub fn blank(label: impl Into<String>) -> Self {
        Node::Blank {
            label: label.into(),
        }
    }

    /// A plain literal with no datatype or language tag.
    pub fn literal(lexical: impl Into<String>) -> Self {
        Node::Literal {
            lexical: lexical.into(),
            datatype: None,
            lang: None,
        }
    }

    pub fn typed_literal(
        lexical: impl Into<String>,
        datatype: impl Into<String>,
    ) -> Self {
        Node::Literal {
            lexical: lexical.into(),
            datatype: Some(datatype.into()),
            lang: None,
        }
    }

    pub fn lang_literal(
        lexical: impl Into<String>,
        lang: impl Into<String>,
    ) -> Self {
        Node::Literal {
            lexical: lexical.into(),
            datatype: None,
            lang: Some(lang.into()),
        }
    }

    /// Interpret a stored entity identifier: `_:label` is a blank node,
    /// anything else a URI.
    pub fn from_entity_id(id: &str) -> Self {
        match id.strip_prefix(BLANK_PREFIX) {
            Some(label) => Node::blank(label),
            None => Node::uri(id),
        }
    }

    /// The identifier form used in the entity field.
    pub fn entity_id(&self) -> Result<String> {
        match self {
            Node::Uri { value } => Ok(value.clone()),
            Node::Blank { label } => Ok(format!("{BLANK_PREFIX}{label}")),
            Node::Literal { .. } => Err(Error::InvalidEntityValue(format!(
                "literal {self} cannot identify an entity"
            ))),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Node::Literal { .. })
    }

    /// Lexical form of a literal. URIs and blank nodes have no indexable
    /// text and are rejected.
    pub fn literal_text(&self) -> Result<&str> {
        match self {
            Node::Literal { lexical, .. } => Ok(lexical),
            other => Err(Error::InvalidEntityValue(format!(
                "{other} is not a literal"
            ))),
        }
    }

    /// Encode as an N-Triples term.
    pub fn encode(&self) -> String {
        match self {
            Node::Uri { value } => format!("<{value}>"),
            Node::Blank { label } => format!("{BLANK_PREFIX}{label}"),
            Node::Literal {
                lexical,
                datatype,
                lang,
            } => {
                let mut out = String::with_capacity(lexical.len() + 2);
                out.push('"');
                escape_lexical(lexical, &mut out);
                out.push('"');
                if let Some(lang) = lang {
                    out.push('@');
                    out.push_str(lang);
                } else if let Some(datatype) = datatype {
                    out.push_str("^^<");
                    out.push_str(datatype);
                    out.push('>');
                }
                out
            }
        }
    }

    /// Decode an N-Triples term produced by [`Node::encode`].
    pub fn decode(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix('<') {
            let value = rest
                .strip_suffix('>')
                .ok_or_else(|| invalid(s, "unterminated URI"))?;
            return Ok(Node::uri(value));
        }
        if let Some(label) = s.strip_prefix(BLANK_PREFIX) {
            if label.is_empty() {
                return Err(invalid(s, "empty blank node label"));
            }
            return Ok(Node::blank(label));
        }
        let body = s
            .strip_prefix('"')
            .ok_or_else(|| invalid(s, "expected '<', '_:' or '\"'"))?;

        let mut lexical = String::with_capacity(body.len());
        let mut chars = body.char_indices();
        let mut end = None;
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    end = Some(i + 1);
                    break;
                }
                '\\' => {
                    let (_, escaped) = chars
                        .next()
                        .ok_or_else(|| invalid(s, "dangling escape"))?;
                    lexical.push(match escaped {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        '"' => '"',
                        '\\' => '\\',
                        other => {
                            return Err(invalid(
                                s,
                                &format!("unknown escape '\\{other}'"),
                            ));
                        }
                    });
                }
                c => lexical.push(c),
            }
        }
        let end = end.ok_or_else(|| invalid(s, "unterminated literal"))?;
        let suffix = &body[end..];

        if suffix.is_empty() {
            Ok(Node::literal(lexical))
        } else if let Some(lang) = suffix.strip_prefix('@') {
            if lang.is_empty() {
                return Err(invalid(s, "empty language tag"));
            }
            Ok(Node::lang_literal(lexical, lang))
        } else if let Some(dt) = suffix.strip_prefix("^^<") {
            let dt = dt
                .strip_suffix('>')
                .ok_or_else(|| invalid(s, "unterminated datatype"))?;
            Ok(Node::typed_literal(lexical, dt))
        } else {
            Err(invalid(s, "trailing characters after literal"))
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn escape_lexical(lexical: &str, out: &mut String) {
    for c in lexical.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
}

fn invalid(input: &str, reason: &str) -> Error {
    Error::InvalidEntityValue(format!("cannot decode node {input:?}: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const XSD_INT: &str = "http://www.w3.org/2001/XMLSchema#integer";

    #[test]
    fn entity_ids_resolve_to_uri_or_blank() {
        assert_eq!(
            Node::from_entity_id("http://example.org/a"),
            Node::uri("http://example.org/a")
        );
        assert_eq!(Node::from_entity_id("_:b0"), Node::blank("b0"));
        assert_eq!(Node::blank("b0").entity_id().unwrap(), "_:b0");
    }

    #[test]
    fn literal_cannot_be_an_entity_id() {
        assert!(matches!(
            Node::literal("x").entity_id(),
            Err(Error::InvalidEntityValue(_))
        ));
    }

    #[test]
    fn encode_forms() {
        assert_eq!(Node::uri("http://x").encode(), "<http://x>");
        assert_eq!(Node::literal("hi").encode(), "\"hi\"");
        assert_eq!(Node::lang_literal("chat", "fr").encode(), "\"chat\"@fr");
        assert_eq!(
            Node::typed_literal("42", XSD_INT).encode(),
            format!("\"42\"^^<{XSD_INT}>")
        );
    }

    #[test]
    fn decode_restores_typed_literal() {
        let node = Node::typed_literal("42", XSD_INT);
        assert_eq!(Node::decode(&node.encode()).unwrap(), node);
    }

    #[test]
    fn decode_handles_escapes() {
        let node = Node::literal("say \"hi\"\n\tback\\slash");
        let encoded = node.encode();
        assert!(!encoded.contains('\n'));
        assert_eq!(Node::decode(&encoded).unwrap(), node);
    }

    #[test]
    fn decode_rejects_garbage() {
        for bad in ["plain", "\"open", "<http://x", "\"x\"@", "\"x\"junk", "_:"]
        {
            assert!(
                matches!(Node::decode(bad), Err(Error::InvalidEntityValue(_))),
                "{bad} should not decode"
            );
        }
    }

    #[test]
    fn literal_text_rejects_resources() {
        assert_eq!(Node::literal("abc").literal_text().unwrap(), "abc");
        assert!(Node::uri("http://x").literal_text().is_err());
        assert!(Node::blank("b").literal_text().is_err());
    }
}
