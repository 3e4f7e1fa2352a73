//! Classic query-string syntax compiled to tantivy queries.
//!
//! Supported syntax:
//!
//! - `term`, `field:term`, `field:(sub query)`, `field:"a phrase"`
//! - `AND` / `OR` / `NOT`, `&&` / `||` / `!`, and `+` / `-` prefixes;
//!   clauses combine with the configured default operator
//! - phrase slop: `"big dog"~2`
//! - wildcards `*` and `?` anywhere in a term, leading position included
//! - fuzzy terms: `term~`, `term~1`, `term~0.8`
//! - ranges: `[a TO b]`, `{a TO b}`, mixed brackets, `*` for an open end
//! - boosts: `term^2`, `(a b)^0.5`
//! - `*:*` matches every document
//! - backslash escapes any of the syntax characters
//!
//! Terms are run through the analyzer of the field they target, so an
//! exact field matches its value verbatim while a tokenized field matches
//! any of its lowercased tokens.

use std::{collections::HashMap, ops::Bound};

use serde::{Deserialize, Serialize};
use tantivy::{
    Term,
    query::{
        AllQuery,
        BooleanQuery,
        BoostQuery,
        EmptyQuery,
        FuzzyTermQuery,
        Occur,
        PhraseQuery,
        Query,
        RangeQuery,
        RegexQuery,
        TermQuery,
    },
    schema::{Field, IndexRecordOption, Schema},
};

use crate::{
    analysis::Analysis,
    definition::EntityDefinition,
    error::{Error, Result},
};

/// Characters with a meaning in the query syntax.
const SYNTAX_CHARS: &[char] = &[
    '\\', '+', '-', '!', '(', ')', ':', '^', '[', ']', '"', '{', '}', '~',
    '*', '?', '|', '&', '/',
];

/// Characters that may appear in `tantivy_fst` regexes only when escaped.
const REGEX_META: &[char] = &[
    '\\', '.', '+', '*', '?', '(', ')', '|', '[', ']', '{', '}', '^', '$',
    '#', '&', '-', '~',
];

/// Edit distance used by a bare `term~`.
const DEFAULT_FUZZY: f32 = 2.0;
const MAX_EDITS: u8 = 2;

/// How clauses without an explicit operator combine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    #[default]
    Or,
    And,
}

/// Escape every syntax character so `s` is matched literally.
///
/// ```
/// assert_eq!(
///     rdftext::query_parser::escape("http://x.org/a"),
///     "http\\:\\/\\/x.org\\/a"
/// );
/// ```
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        if SYNTAX_CHARS.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, Copy)]
struct FieldInfo {
    field: Field,
    analysis: Analysis,
    record: IndexRecordOption,
}

/// Compiles query strings against one index schema.
#[derive(Debug, Clone)]
pub struct QueryParser {
    default_field: String,
    default_operator: Operator,
    fields: HashMap<String, FieldInfo>,
}

impl QueryParser {
    /// Build a parser for the fields of `def`.
    ///
    /// `query_analysis`, when set, replaces the index-time analysis of
    /// every tokenized field. Exact fields always stay exact.
    pub fn new(
        schema: &Schema,
        def: &EntityDefinition,
        default_operator: Operator,
        query_analysis: Option<Analysis>,
    ) -> Result<Self> {
        let names = std::iter::once(def.entity_field())
            .chain(def.graph_field())
            .chain(def.fields().iter().map(String::as_str));

        let mut fields = HashMap::new();
        for name in names {
            let field = schema.get_field(name).map_err(|_| {
                Error::Definition(format!("field '{name}' missing from schema"))
            })?;
            let indexed = def.analysis_for(name);
            let analysis = match query_analysis {
                Some(over) if !indexed.is_exact() => over,
                _ => indexed,
            };
            let record = if indexed.is_exact() {
                IndexRecordOption::Basic
            } else {
                IndexRecordOption::WithFreqs
            };
            fields.insert(
                name.to_string(),
                FieldInfo {
                    field,
                    analysis,
                    record,
                },
            );
        }

        Ok(Self {
            default_field: def.primary_field().to_string(),
            default_operator,
            fields,
        })
    }

    pub fn default_field(&self) -> &str {
        &self.default_field
    }

    /// Parse and compile `query`.
    pub fn parse(&self, query: &str) -> Result<Box<dyn Query>> {
        let ast = parse_ast(query, &self.default_field, self.default_operator)?;
        Ok(self
            .compile(&ast)?
            .unwrap_or_else(|| Box::new(EmptyQuery)))
    }

    fn compile(&self, ast: &Ast) -> Result<Option<Box<dyn Query>>> {
        match ast {
            Ast::MatchAll => Ok(Some(Box::new(AllQuery))),
            Ast::Boost(inner, boost) => Ok(self.compile(inner)?.map(|q| {
                Box::new(BoostQuery::new(q, *boost)) as Box<dyn Query>
            })),
            Ast::Bool(clauses) => {
                let mut compiled = Vec::with_capacity(clauses.len());
                for (occur, clause) in clauses {
                    if let Some(query) = self.compile(clause)? {
                        compiled.push((*occur, query));
                    }
                }
                if compiled.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(Box::new(BooleanQuery::new(compiled))))
                }
            }
            Ast::Term { field, text, fuzzy } => {
                let Some(info) = self.resolve(field) else {
                    return Ok(Some(Box::new(EmptyQuery)));
                };
                self.compile_term(info, text, *fuzzy)
            }
            Ast::Phrase { field, text, slop } => {
                let Some(info) = self.resolve(field) else {
                    return Ok(Some(Box::new(EmptyQuery)));
                };
                let tokens = info.analysis.tokens(text);
                match tokens.len() {
                    0 => Ok(None),
                    1 => Ok(Some(term_query(info, &tokens[0].1))),
                    _ => {
                        let terms = tokens
                            .into_iter()
                            .map(|(pos, t)| {
                                (pos, Term::from_field_text(info.field, &t))
                            })
                            .collect();
                        let mut phrase = PhraseQuery::new_with_offset(terms);
                        phrase.set_slop(*slop);
                        Ok(Some(Box::new(phrase)))
                    }
                }
            }
            Ast::Range {
                field,
                lower,
                upper,
            } => {
                let Some(info) = self.resolve(field) else {
                    return Ok(Some(Box::new(EmptyQuery)));
                };
                if matches!(
                    (lower, upper),
                    (Bound::Unbounded, Bound::Unbounded)
                ) {
                    return Ok(Some(Box::new(regex_query(info, ".*")?)));
                }
                let to_term = |bound: &Bound<String>| -> Bound<Term> {
                    match bound {
                        Bound::Included(v) => {
                            Bound::Included(expanded_term(info, v))
                        }
                        Bound::Excluded(v) => {
                            Bound::Excluded(expanded_term(info, v))
                        }
                        Bound::Unbounded => Bound::Unbounded,
                    }
                };
                Ok(Some(Box::new(RangeQuery::new(
                    to_term(lower),
                    to_term(upper),
                ))))
            }
        }
    }

    fn compile_term(
        &self,
        info: FieldInfo,
        text: &RawText,
        fuzzy: Option<f32>,
    ) -> Result<Option<Box<dyn Query>>> {
        if text.has_wildcard() {
            let pattern = text.to_regex(info.analysis.lowercases());
            return Ok(Some(Box::new(regex_query(info, &pattern)?)));
        }

        let plain = text.text();
        if let Some(similarity) = fuzzy {
            let term = expanded_term(info, &plain);
            let edits = edit_distance(similarity, plain.chars().count());
            return Ok(Some(Box::new(FuzzyTermQuery::new(term, edits, true))));
        }

        let tokens = info.analysis.tokens(&plain);
        match tokens.len() {
            0 => Ok(None),
            1 => Ok(Some(term_query(info, &tokens[0].1))),
            _ => {
                let occur = match self.default_operator {
                    Operator::Or => Occur::Should,
                    Operator::And => Occur::Must,
                };
                let clauses = tokens
                    .iter()
                    .map(|(_, t)| (occur, term_query(info, t)))
                    .collect();
                Ok(Some(Box::new(BooleanQuery::new(clauses))))
            }
        }
    }

    fn resolve(&self, field: &str) -> Option<FieldInfo> {
        let info = self.fields.get(field).copied();
        if info.is_none() {
            tracing::debug!(field, "query names an unknown field");
        }
        info
    }
}

fn term_query(info: FieldInfo, text: &str) -> Box<dyn Query> {
    Box::new(TermQuery::new(
        Term::from_field_text(info.field, text),
        info.record,
    ))
}

/// Term for an expanded query (fuzzy, range) which bypasses analysis and
/// only mirrors its case folding.
fn expanded_term(info: FieldInfo, text: &str) -> Term {
    if info.analysis.lowercases() {
        Term::from_field_text(info.field, &text.to_lowercase())
    } else {
        Term::from_field_text(info.field, text)
    }
}

fn regex_query(info: FieldInfo, pattern: &str) -> Result<RegexQuery> {
    RegexQuery::from_pattern(pattern, info.field).map_err(|e| {
        Error::syntax(format!("cannot compile wildcard '{pattern}': {e}"))
    })
}

/// Translate a fuzzy similarity into an edit distance. Values of one or
/// more are edit counts; values below one are a similarity ratio relative
/// to the term length.
fn edit_distance(similarity: f32, term_len: usize) -> u8 {
    if similarity >= 1.0 {
        (similarity as u8).min(MAX_EDITS)
    } else if similarity == 0.0 {
        0
    } else {
        (((1.0 - similarity) * term_len as f32) as u8).min(MAX_EDITS)
    }
}

/// A term as written, remembering which characters were escaped.
#[derive(Debug, Clone, PartialEq, Default)]
struct RawText(Vec<(char, bool)>);

impl RawText {
    fn push(&mut self, c: char, escaped: bool) {
        self.0.push((c, escaped));
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The term with escapes resolved.
    fn text(&self) -> String {
        self.0.iter().map(|(c, _)| c).collect()
    }

    /// True if the term is exactly the unescaped `word`.
    fn is_word(&self, word: &str) -> bool {
        self.0.iter().all(|(_, escaped)| !escaped)
            && self.0.iter().map(|(c, _)| *c).eq(word.chars())
    }

    fn has_wildcard(&self) -> bool {
        self.0
            .iter()
            .any(|(c, escaped)| !escaped && matches!(c, '*' | '?'))
    }

    fn to_regex(&self, lowercase: bool) -> String {
        let mut pattern = String::with_capacity(self.0.len() + 4);
        for &(c, escaped) in &self.0 {
            match c {
                '*' if !escaped => pattern.push_str(".*"),
                '?' if !escaped => pattern.push('.'),
                c => {
                    let folded: Vec<char> = if lowercase {
                        c.to_lowercase().collect()
                    } else {
                        vec![c]
                    };
                    for c in folded {
                        if REGEX_META.contains(&c) {
                            pattern.push('\\');
                        }
                        pattern.push(c);
                    }
                }
            }
        }
        pattern
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Ast {
    Bool(Vec<(Occur, Ast)>),
    Term {
        field: String,
        text: RawText,
        fuzzy: Option<f32>,
    },
    Phrase {
        field: String,
        text: String,
        slop: u32,
    },
    Range {
        field: String,
        lower: Bound<String>,
        upper: Bound<String>,
    },
    MatchAll,
    Boost(Box<Ast>, f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conjunction {
    None,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier {
    None,
    Required,
    Prohibited,
}

fn parse_ast(
    query: &str,
    default_field: &str,
    operator: Operator,
) -> Result<Ast> {
    let mut parser = Parser {
        chars: query.chars().collect(),
        pos: 0,
        depth: 0,
        operator,
    };
    let ast = parser.parse_query(default_field)?;
    parser.skip_ws();
    match parser.peek() {
        None => Ok(ast),
        Some(c) => Err(parser.error(&format!("unexpected '{c}'"))),
    }
}

/// Deepest parenthesised group the parser accepts.
const MAX_NESTING: usize = 256;

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
    operator: Operator,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn at_clause_end(&self) -> bool {
        matches!(self.peek(), None | Some(')'))
    }

    fn error(&self, message: &str) -> Error {
        let query: String = self.chars.iter().collect();
        Error::syntax(format!(
            "cannot parse '{query}' at offset {}: {message}",
            self.pos
        ))
    }

    fn is_term_char(c: char) -> bool {
        !c.is_whitespace()
            && !matches!(
                c,
                '(' | ')' | ':' | '^' | '[' | ']' | '"' | '{' | '}' | '~'
            )
    }

    fn read_term(&mut self) -> Result<Option<RawText>> {
        let mut text = RawText::default();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.pos += 1;
                let escaped = self
                    .bump()
                    .ok_or_else(|| self.error("dangling escape character"))?;
                text.push(escaped, true);
            } else if Self::is_term_char(c) {
                self.pos += 1;
                text.push(c, false);
            } else {
                break;
            }
        }
        Ok((!text.is_empty()).then_some(text))
    }

    /// Consume the next word if it is one of `words`.
    fn eat_word(&mut self, words: &[&str]) -> bool {
        let start = self.pos;
        let mut end = start;
        while end < self.chars.len()
            && self.chars[end] != '\\'
            && Self::is_term_char(self.chars[end])
        {
            end += 1;
        }
        let word: String = self.chars[start..end].iter().collect();
        if words.contains(&word.as_str()) {
            self.pos = end;
            true
        } else {
            false
        }
    }

    fn read_number(&mut self) -> Result<f32> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c == '.')
        {
            self.pos += 1;
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        digits
            .parse()
            .map_err(|_| self.error(&format!("invalid number '{digits}'")))
    }

    fn parse_query(&mut self, field: &str) -> Result<Ast> {
        let mut clauses: Vec<(Occur, Ast)> = Vec::new();
        loop {
            self.skip_ws();
            if self.at_clause_end() {
                break;
            }

            let conjunction = if self.eat_word(&["AND", "&&"]) {
                Conjunction::And
            } else if self.eat_word(&["OR", "||"]) {
                Conjunction::Or
            } else {
                Conjunction::None
            };
            if conjunction != Conjunction::None && clauses.is_empty() {
                return Err(self.error("operator without a preceding clause"));
            }

            self.skip_ws();
            let modifier = if self.peek() == Some('+') {
                self.pos += 1;
                Modifier::Required
            } else if matches!(self.peek(), Some('-' | '!')) {
                self.pos += 1;
                Modifier::Prohibited
            } else if self.eat_word(&["NOT"]) {
                Modifier::Prohibited
            } else {
                Modifier::None
            };

            self.skip_ws();
            if self.at_clause_end() {
                return Err(self.error("expected a clause"));
            }
            let clause = self.parse_clause(field)?;
            add_clause(
                &mut clauses,
                conjunction,
                modifier,
                clause,
                self.operator,
            );
        }

        if clauses.is_empty() {
            return Err(self.error("empty query"));
        }
        if clauses.len() == 1 && clauses[0].0 != Occur::MustNot {
            let (_, ast) = clauses.remove(0);
            return Ok(ast);
        }
        Ok(Ast::Bool(clauses))
    }

    fn parse_clause(&mut self, default_field: &str) -> Result<Ast> {
        let mut field = default_field.to_string();

        if let Some(term) = self.read_term()? {
            if self.peek() != Some(':') {
                return self.finish_term(field, term);
            }
            self.pos += 1;
            self.skip_ws();
            if term.is_word("*") {
                let mark = self.pos;
                if let Some(value) = self.read_term()? {
                    if value.is_word("*") {
                        return self.parse_boost(Ast::MatchAll);
                    }
                }
                self.pos = mark;
            }
            field = term.text();
        }

        match self.peek() {
            Some('(') => {
                if self.depth >= MAX_NESTING {
                    return Err(self.error("query nested too deeply"));
                }
                self.pos += 1;
                self.depth += 1;
                let inner = self.parse_query(&field)?;
                self.depth -= 1;
                self.skip_ws();
                if self.bump() != Some(')') {
                    return Err(self.error("missing ')'"));
                }
                self.parse_boost(inner)
            }
            Some('"') => self.parse_phrase(field),
            Some('[' | '{') => self.parse_range(field),
            _ => match self.read_term()? {
                Some(term) => self.finish_term(field, term),
                None => Err(self.error("expected a term")),
            },
        }
    }

    fn finish_term(&mut self, field: String, text: RawText) -> Result<Ast> {
        let mut fuzzy = None;
        let mut boost = None;
        loop {
            match self.peek() {
                Some('~') if fuzzy.is_none() => {
                    self.pos += 1;
                    let similarity = if self
                        .peek()
                        .is_some_and(|c| c.is_ascii_digit() || c == '.')
                    {
                        self.read_number()?
                    } else {
                        DEFAULT_FUZZY
                    };
                    if similarity >= 1.0 && similarity.fract() != 0.0 {
                        return Err(self.error(
                            "fractional edit distances are not allowed",
                        ));
                    }
                    fuzzy = Some(similarity);
                }
                Some('^') if boost.is_none() => {
                    self.pos += 1;
                    boost = Some(self.read_number()?);
                }
                _ => break,
            }
        }
        let term = Ast::Term { field, text, fuzzy };
        Ok(match boost {
            Some(boost) => Ast::Boost(Box::new(term), boost),
            None => term,
        })
    }

    fn parse_phrase(&mut self, field: String) -> Result<Ast> {
        let text = self.read_quoted()?;
        let mut slop = 0;
        if self.peek() == Some('~') {
            self.pos += 1;
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                slop = self.read_number()? as u32;
            }
        }
        self.parse_boost(Ast::Phrase { field, text, slop })
    }

    fn read_quoted(&mut self) -> Result<String> {
        // Opening quote.
        self.pos += 1;
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(text),
                Some('\\') => {
                    let c = self.bump().ok_or_else(|| {
                        self.error("dangling escape character")
                    })?;
                    text.push(c);
                }
                Some(c) => text.push(c),
                None => return Err(self.error("unterminated phrase")),
            }
        }
    }

    fn parse_range(&mut self, field: String) -> Result<Ast> {
        let lower_inclusive = self.bump() == Some('[');
        self.skip_ws();
        let lower = self.read_range_value()?;
        self.skip_ws();
        if !self.eat_word(&["TO"]) {
            return Err(self.error("expected 'TO' in range"));
        }
        self.skip_ws();
        let upper = self.read_range_value()?;
        self.skip_ws();
        let upper_inclusive = match self.bump() {
            Some(']') => true,
            Some('}') => false,
            _ => return Err(self.error("unterminated range")),
        };

        let bound = |value: Option<String>, inclusive: bool| match value {
            None => Bound::Unbounded,
            Some(v) if inclusive => Bound::Included(v),
            Some(v) => Bound::Excluded(v),
        };
        self.parse_boost(Ast::Range {
            field,
            lower: bound(lower, lower_inclusive),
            upper: bound(upper, upper_inclusive),
        })
    }

    /// A range endpoint, or `None` for an open `*` end.
    fn read_range_value(&mut self) -> Result<Option<String>> {
        if self.peek() == Some('"') {
            return self.read_quoted().map(Some);
        }
        match self.read_term()? {
            Some(term) if term.is_word("*") => Ok(None),
            Some(term) => Ok(Some(term.text())),
            None => Err(self.error("expected a range endpoint")),
        }
    }

    fn parse_boost(&mut self, ast: Ast) -> Result<Ast> {
        if self.peek() == Some('^') {
            self.pos += 1;
            let boost = self.read_number()?;
            return Ok(Ast::Boost(Box::new(ast), boost));
        }
        Ok(ast)
    }
}

/// Fold a clause into the list following classic combination rules: `AND`
/// makes both neighbours required, `NOT`/`-` prohibits, `+` requires, and
/// everything else follows the default operator.
fn add_clause(
    clauses: &mut Vec<(Occur, Ast)>,
    conjunction: Conjunction,
    modifier: Modifier,
    ast: Ast,
    operator: Operator,
) {
    if let Some(last) = clauses.last_mut()
        && last.0 != Occur::MustNot
    {
        if conjunction == Conjunction::And {
            last.0 = Occur::Must;
        } else if operator == Operator::And && conjunction == Conjunction::Or
        {
            last.0 = Occur::Should;
        }
    }

    let prohibited = modifier == Modifier::Prohibited;
    let required = match operator {
        Operator::Or => {
            modifier == Modifier::Required
                || (conjunction == Conjunction::And && !prohibited)
        }
        Operator::And => !prohibited && conjunction != Conjunction::Or,
    };

    let occur = if prohibited {
        Occur::MustNot
    } else if required {
        Occur::Must
    } else {
        Occur::Should
    };
    clauses.push((occur, ast));
}
