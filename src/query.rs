// mongodb_stream/src/query.rs
// Query documents: relaxed JSON parsing and the find specification used by the source.

use mongodb::bson::{Bson, Document};
use serde_json::Value;

use crate::error::{Result, StreamError};

/// The default literal query, matching every document.
pub const MATCH_ALL_QUERY: &str = "{}";

/// A find request: filter plus the optional modifiers a query expression can attach.
#[derive(Debug, Clone, Default, PartialEq,)]
pub struct QuerySpec {
    pub filter:     Document,
    pub sort:       Option<Document,>,
    pub limit:      Option<i64,>,
    pub skip:       Option<u64,>,
    pub projection: Option<Document,>,
}

impl QuerySpec {
    /// Builds a spec from literal query text such as `{ 'greeting': 'hola' }`.
    pub fn parse(text: &str,) -> Result<Self,> {
        Ok(Self {
            filter: parse_document(text,)?,
            ..Self::default()
        },)
    }

    pub fn match_all() -> Self {
        Self::default()
    }

    pub fn with_sort(mut self, sort: Document,) -> Self {
        self.sort = Some(sort,);
        self
    }

    pub fn with_limit(mut self, limit: i64,) -> Self {
        self.limit = Some(limit,);
        self
    }

    pub fn with_skip(mut self, skip: u64,) -> Self {
        self.skip = Some(skip,);
        self
    }

    pub fn with_projection(mut self, projection: Document,) -> Self {
        self.projection = Some(projection,);
        self
    }
}

/// Parses a JSON object into a BSON document.
///
/// Accepts the relaxed shell syntax that configuration files tend to use:
/// single-quoted strings and unquoted keys. MongoDB extended JSON
/// (`{"$oid": ...}`, `{"$date": ...}`) is converted to the matching BSON types.
/// Blank text is the empty document.
pub fn parse_document(text: &str,) -> Result<Document,> {
    if text.trim().is_empty() {
        return Ok(Document::new(),);
    }

    let normalized = normalize_relaxed_json(text,)?;
    let value: Value = serde_json::from_str(&normalized,).map_err(|e| {
        StreamError::ConversionError(format!("Invalid JSON document '{}': {}", text, e),)
    },)?;

    if !value.is_object() {
        return Err(StreamError::ConversionError(format!(
            "Expected a JSON object but got '{}'",
            text
        ),),);
    }

    match Bson::try_from(value,) {
        Ok(Bson::Document(doc,),) => Ok(doc,),
        Ok(other,) => Err(StreamError::ConversionError(format!(
            "Expected a document but extended JSON produced {:?}",
            other.element_type()
        ),),),
        Err(e,) => Err(StreamError::ConversionError(format!(
            "Invalid extended JSON '{}': {}",
            text, e
        ),),),
    }
}

/// Rewrites single-quoted strings and bare keys into strict JSON.
fn normalize_relaxed_json(text: &str,) -> Result<String,> {
    let chars: Vec<char,> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8,);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                out.push('"',);
                i += 1;
                loop {
                    let Some(&ch,) = chars.get(i,) else {
                        return Err(unterminated(text,),);
                    };
                    out.push(ch,);
                    i += 1;
                    if ch == '\\' {
                        if let Some(&next,) = chars.get(i,) {
                            out.push(next,);
                            i += 1;
                        }
                    } else if ch == '"' {
                        break;
                    }
                }
            },
            '\'' => {
                out.push('"',);
                i += 1;
                loop {
                    let Some(&ch,) = chars.get(i,) else {
                        return Err(unterminated(text,),);
                    };
                    i += 1;
                    match ch {
                        '\'' => {
                            out.push('"',);
                            break;
                        },
                        '"' => out.push_str("\\\"",),
                        '\\' => match chars.get(i,) {
                            Some('\'',) => {
                                out.push('\'',);
                                i += 1;
                            },
                            Some(&next,) => {
                                out.push('\\',);
                                out.push(next,);
                                i += 1;
                            },
                            None => return Err(unterminated(text,),),
                        },
                        other => out.push(other,),
                    }
                }
            },
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '_' | '$' | '.'))
                {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                let mut j = i;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                if chars.get(j,) == Some(&':',) {
                    out.push('"',);
                    out.push_str(&ident,);
                    out.push('"',);
                } else {
                    out.push_str(&ident,);
                }
            },
            other => {
                out.push(other,);
                i += 1;
            },
        }
    }

    Ok(out,)
}

fn unterminated(text: &str,) -> StreamError {
    StreamError::ConversionError(format!("Unterminated string in '{}'", text),)
}
