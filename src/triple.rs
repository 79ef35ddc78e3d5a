//! Triple types - RDF statements as handed to the store
//!
//! A triple carries lexical values plus term types. For deduplication a
//! triple is identified by `(s, p, o, graph)` compared as exact strings.
//!
//! Examples:
//! - `<urn:1> <urn:2> <urn:3> .`
//! - `_:b1 <http://xmlns.com/foaf/0.1/name> "Alice"@en .`

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of an RDF term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermType {
    Uri,
    Bnode,
    Literal,
}

impl TermType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TermType::Uri => "uri",
            TermType::Bnode => "bnode",
            TermType::Literal => "literal",
        }
    }

    /// Guess the type of a subject/predicate value from its lexical form
    pub fn of_resource(value: &str) -> Self {
        if value.starts_with("_:") {
            TermType::Bnode
        } else {
            TermType::Uri
        }
    }
}

impl FromStr for TermType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "uri" | "iri" => Ok(TermType::Uri),
            "bnode" => Ok(TermType::Bnode),
            "literal" => Ok(TermType::Literal),
            _ => Err(Error::Parse(format!("Unknown term type: {}", s))),
        }
    }
}

impl fmt::Display for TermType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An RDF statement with typed components
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub s: String,
    pub p: String,
    pub o: String,
    pub s_type: TermType,
    pub p_type: TermType,
    pub o_type: TermType,
    /// Only meaningful for literal objects; exclusive with `o_lang`
    pub o_datatype: Option<String>,
    /// Only meaningful for literal objects; exclusive with `o_datatype`
    pub o_lang: Option<String>,
    pub graph: Option<String>,
}

impl Triple {
    /// Triple whose object is a resource; bnode labels (`_:x`) are detected
    pub fn new(s: impl Into<String>, p: impl Into<String>, o: impl Into<String>) -> Self {
        let (s, p, o) = (s.into(), p.into(), o.into());
        Self {
            s_type: TermType::of_resource(&s),
            p_type: TermType::Uri,
            o_type: TermType::of_resource(&o),
            s,
            p,
            o,
            o_datatype: None,
            o_lang: None,
            graph: None,
        }
    }

    /// Triple with a plain literal object
    pub fn literal(s: impl Into<String>, p: impl Into<String>, value: impl Into<String>) -> Self {
        let mut triple = Self::new(s, p, value);
        triple.o_type = TermType::Literal;
        triple
    }

    pub fn with_datatype(mut self, datatype: impl Into<String>) -> Self {
        self.o_type = TermType::Literal;
        self.o_datatype = Some(datatype.into());
        self.o_lang = None;
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.o_type = TermType::Literal;
        self.o_lang = Some(lang.into());
        self.o_datatype = None;
        self
    }

    pub fn in_graph(mut self, graph: impl Into<String>) -> Self {
        self.graph = Some(graph.into());
        self
    }

    /// `(s, p, o)` part of the dedup identity
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.s, &self.p, &self.o)
    }

    /// Bnode labels used by this triple, subject first
    pub fn bnodes(&self) -> impl Iterator<Item = &str> {
        let s = (self.s_type == TermType::Bnode).then_some(self.s.as_str());
        let o = (self.o_type == TermType::Bnode).then_some(self.o.as_str());
        s.into_iter().chain(o)
    }

    /// Parse one N-Triples style line: `<s> <p> <o> .`
    ///
    /// Supports IRIs, `_:label` bnodes and literals with `@lang` or
    /// `^^<datatype>`. The trailing dot is optional.
    pub fn parse_ntriple(line: &str) -> Result<Self> {
        let mut rest = line.trim();
        let (s, s_type) = next_resource(&mut rest)?;
        let (p, p_type) = next_resource(&mut rest)?;
        if p_type != TermType::Uri {
            return Err(Error::Parse(format!("Predicate must be an IRI: {}", line)));
        }

        rest = rest.trim_start();
        let mut triple = if rest.starts_with('"') {
            let (value, after) = read_literal(rest)?;
            rest = after;
            let mut triple = Triple::literal(s, p, value);
            if let Some(after) = rest.strip_prefix('@') {
                let end = after.find(|c: char| c.is_whitespace() || c == '.').unwrap_or(after.len());
                triple = triple.with_lang(&after[..end]);
                rest = &after[end..];
            } else if let Some(after) = rest.strip_prefix("^^") {
                rest = after;
                let (datatype, _) = next_resource(&mut rest)?;
                triple = triple.with_datatype(datatype);
            }
            triple
        } else {
            let (o, _) = next_resource(&mut rest)?;
            Triple::new(s, p, o)
        };
        triple.s_type = s_type;

        let rest = rest.trim();
        if !(rest.is_empty() || rest == ".") {
            return Err(Error::Parse(format!("Unexpected trailing input: {}", rest)));
        }
        Ok(triple)
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resource = |value: &str, kind: TermType| match kind {
            TermType::Bnode => value.to_string(),
            _ => format!("<{}>", value),
        };
        write!(f, "{} {} ", resource(&self.s, self.s_type), resource(&self.p, self.p_type))?;
        match self.o_type {
            TermType::Literal => {
                write!(f, "\"{}\"", escape_literal(&self.o))?;
                if let Some(lang) = &self.o_lang {
                    write!(f, "@{}", lang)?;
                } else if let Some(datatype) = &self.o_datatype {
                    write!(f, "^^<{}>", datatype)?;
                }
            }
            kind => write!(f, "{}", resource(&self.o, kind))?,
        }
        write!(f, " .")
    }
}

impl FromStr for Triple {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_ntriple(s)
    }
}

/// Read `<iri>` or `_:label` from the front of `rest`
fn next_resource(rest: &mut &str) -> Result<(String, TermType)> {
    let input = rest.trim_start();
    if let Some(after) = input.strip_prefix('<') {
        let end = after
            .find('>')
            .ok_or_else(|| Error::Parse(format!("Unterminated IRI: {}", input)))?;
        *rest = &after[end + 1..];
        Ok((after[..end].to_string(), TermType::Uri))
    } else if input.starts_with("_:") {
        let mut end = input.find(char::is_whitespace).unwrap_or(input.len());
        // `_:o.` ends the statement rather than the label
        if end > 2 && input[..end].ends_with('.') && input[end..].trim().is_empty() {
            end -= 1;
        }
        *rest = &input[end..];
        Ok((input[..end].to_string(), TermType::Bnode))
    } else {
        Err(Error::Parse(format!("Expected <iri> or _:bnode at: {}", input)))
    }
}

/// Read a double-quoted literal, returning the unescaped value and the remainder
fn read_literal(input: &str) -> Result<(String, &str)> {
    let mut value = String::new();
    let mut chars = input.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((value, &input[i + 1..])),
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, 'r')) => value.push('\r'),
                Some((_, other)) => value.push(other),
                None => break,
            },
            other => value.push(other),
        }
    }
    Err(Error::Parse(format!("Unterminated literal: {}", input)))
}

fn escape_literal(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}
