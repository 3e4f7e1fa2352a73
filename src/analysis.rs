//! Per-field text analysis.
//!
//! Every [`Analysis`] mode is registered with the tantivy index under its
//! own tokenizer name, so the schema only has to record which name a field
//! uses. The same analyzers are reused by the query compiler to turn query
//! text into terms.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tantivy::{
    Index,
    tokenizer::{
        Language,
        LowerCaser,
        RawTokenizer,
        RemoveLongFilter,
        SimpleTokenizer,
        Stemmer,
        StopWordFilter,
        TextAnalyzer,
        TokenStream,
        WhitespaceTokenizer,
    },
};

use crate::error::{Error, Result};

/// Longest token (in bytes) kept by the tokenizing analyzers.
const MAX_TOKEN_LEN: usize = 255;

/// English stop words removed by [`Analysis::English`].
const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in",
    "into", "is", "it", "no", "not", "of", "on", "or", "such", "that", "the",
    "their", "then", "there", "these", "they", "this", "to", "was", "will",
    "with",
];

/// How the text of a field is turned into index terms.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Analysis {
    /// The whole value is one case-preserved term.
    Exact,
    /// Split on non-alphanumeric characters and lowercase.
    #[default]
    Standard,
    /// Split on whitespace only and lowercase.
    Whitespace,
    /// `Standard` plus English stop word removal and stemming.
    English,
}

impl Analysis {
    pub const ALL: [Analysis; 4] = [
        Analysis::Exact,
        Analysis::Standard,
        Analysis::Whitespace,
        Analysis::English,
    ];

    /// Name under which the analyzer is registered with the index.
    pub fn tokenizer_name(self) -> &'static str {
        match self {
            Analysis::Exact => "rdftext_exact",
            Analysis::Standard => "rdftext_standard",
            Analysis::Whitespace => "rdftext_whitespace",
            Analysis::English => "rdftext_english",
        }
    }

    pub fn is_exact(self) -> bool {
        self == Analysis::Exact
    }

    /// Whether terms produced by this mode are lowercase, which decides
    /// whether expanded query terms (wildcard, fuzzy, range) are lowercased
    /// before matching.
    pub fn lowercases(self) -> bool {
        !self.is_exact()
    }

    pub fn analyzer(self) -> TextAnalyzer {
        match self {
            Analysis::Exact => TextAnalyzer::from(RawTokenizer::default()),
            Analysis::Standard => {
                TextAnalyzer::builder(SimpleTokenizer::default())
                    .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
                    .filter(LowerCaser)
                    .build()
            }
            Analysis::Whitespace => {
                TextAnalyzer::builder(WhitespaceTokenizer::default())
                    .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
                    .filter(LowerCaser)
                    .build()
            }
            Analysis::English => {
                TextAnalyzer::builder(SimpleTokenizer::default())
                    .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
                    .filter(LowerCaser)
                    .filter(StopWordFilter::remove(
                        ENGLISH_STOP_WORDS.iter().map(|w| w.to_string()),
                    ))
                    .filter(Stemmer::new(Language::English))
                    .build()
            }
        }
    }

    /// Run the analyzer over `text`, returning `(position, term)` pairs.
    pub fn tokens(self, text: &str) -> Vec<(usize, String)> {
        let mut analyzer = self.analyzer();
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        while stream.advance() {
            let token = stream.token();
            tokens.push((token.position, token.text.clone()));
        }
        tokens
    }
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Analysis::Exact => "exact",
            Analysis::Standard => "standard",
            Analysis::Whitespace => "whitespace",
            Analysis::English => "english",
        };
        f.write_str(name)
    }
}

impl FromStr for Analysis {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "exact" | "keyword" | "raw" => Ok(Analysis::Exact),
            "standard" | "text" | "default" => Ok(Analysis::Standard),
            "whitespace" => Ok(Analysis::Whitespace),
            "english" | "en" | "en_stem" => Ok(Analysis::English),
            other => Err(Error::Definition(format!(
                "unknown analysis mode '{other}'"
            ))),
        }
    }
}

/// Register every analysis mode with the index's tokenizer manager.
pub fn register_tokenizers(index: &Index) {
    for analysis in Analysis::ALL {
        index
            .tokenizers()
            .register(analysis.tokenizer_name(), analysis.analyzer());
    }
}
