// mongodb_stream/src/expression.rs
// A small, trusted expression language for collection names and source queries.
//
// Expressions are parsed once when the configuration is bound and evaluated per
// message (sink collection) or per poll (source query). Supported forms:
//
//   headers.collection            header lookup
//   headers['x-tenant'] + '_log'  bracket access and string concatenation
//   payload.customer.region       walk into a map payload
//   query('{ greeting: "hola" }').sort('{ greeting: 1 }').limit(10)

use std::fmt;

use serde_json::Value;

use crate::error::{Result, StreamError};
use crate::message::Message;
use crate::query::{QuerySpec, parse_document};

#[derive(Debug, Clone, PartialEq,)]
enum Token {
    Ident(String,),
    Str(String,),
    Int(i64,),
    Dot,
    Comma,
    Plus,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_,>,) -> fmt::Result {
        match self {
            Token::Ident(s,) => write!(f, "{}", s),
            Token::Str(s,) => write!(f, "'{}'", s),
            Token::Int(n,) => write!(f, "{}", n),
            Token::Dot => f.write_str(".",),
            Token::Comma => f.write_str(",",),
            Token::Plus => f.write_str("+",),
            Token::LParen => f.write_str("(",),
            Token::RParen => f.write_str(")",),
            Token::LBracket => f.write_str("[",),
            Token::RBracket => f.write_str("]",),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq,)]
enum Root {
    Headers,
    Payload,
}

#[derive(Debug, Clone, PartialEq,)]
enum Node {
    Literal(Value,),
    Path { root: Root, segments: Vec<String,>, },
    Concat(Box<Node,>, Box<Node,>,),
    Call { target: Option<Box<Node,>,>, name: String, args: Vec<Node,>, },
}

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq,)]
pub enum Evaluated {
    Value(Value,),
    Query(QuerySpec,),
}

/// A parsed expression together with its source text.
#[derive(Debug, Clone, PartialEq,)]
pub struct Expression {
    source: String,
    root:   Node,
}

impl Expression {
    pub fn parse(source: &str,) -> Result<Self,> {
        let tokens = tokenize(source,)?;
        if tokens.is_empty() {
            return Err(StreamError::ExpressionError("Expression is empty".to_string(),),);
        }
        let mut parser = Parser { tokens, pos: 0, source, };
        let root = parser.parse_concat()?;
        if let Some(tok,) = parser.peek() {
            return Err(parser.error(format!("unexpected token '{}'", tok),),);
        }
        Ok(Self {
            source: source.to_string(),
            root,
        },)
    }

    pub fn source(&self,) -> &str {
        &self.source
    }

    /// Evaluates against a message; `None` means no message is in scope (source polls).
    pub fn evaluate(&self, message: Option<&Message,>,) -> Result<Evaluated,> {
        eval(&self.root, message,).map_err(|e| match e {
            StreamError::ExpressionError(msg,) => {
                StreamError::ExpressionError(format!("{} (in '{}')", msg, self.source),)
            },
            other => other,
        },)
    }

    /// Evaluates to a non-empty string, as required for collection names.
    pub fn evaluate_string(&self, message: &Message,) -> Result<String,> {
        let value = match self.evaluate(Some(message,),)? {
            Evaluated::Value(v,) => v,
            Evaluated::Query(_,) => {
                return Err(StreamError::ExpressionError(format!(
                    "'{}' produced a query where a string was expected",
                    self.source
                ),),);
            },
        };
        let s = match value {
            Value::String(s,) => s,
            Value::Number(n,) => n.to_string(),
            Value::Bool(b,) => b.to_string(),
            Value::Null => {
                return Err(StreamError::ExpressionError(format!(
                    "'{}' evaluated to null",
                    self.source
                ),),);
            },
            other => {
                return Err(StreamError::ExpressionError(format!(
                    "'{}' evaluated to a non-scalar value: {}",
                    self.source, other
                ),),);
            },
        };
        if s.is_empty() {
            return Err(StreamError::ExpressionError(format!(
                "'{}' evaluated to an empty string",
                self.source
            ),),);
        }
        Ok(s,)
    }

    /// Evaluates without a message and coerces the result into a query.
    /// A string result is read as literal query text.
    pub fn evaluate_query(&self,) -> Result<QuerySpec,> {
        match self.evaluate(None,)? {
            Evaluated::Query(q,) => Ok(q,),
            Evaluated::Value(Value::String(s,),) => QuerySpec::parse(&s,),
            Evaluated::Value(other,) => Err(StreamError::ExpressionError(format!(
                "'{}' evaluated to {} which is not a query",
                self.source, other
            ),),),
        }
    }
}

fn tokenize(source: &str,) -> Result<Vec<Token,>,> {
    let chars: Vec<char,> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '.' => {
                tokens.push(Token::Dot,);
                i += 1;
            },
            ',' => {
                tokens.push(Token::Comma,);
                i += 1;
            },
            '+' => {
                tokens.push(Token::Plus,);
                i += 1;
            },
            '(' => {
                tokens.push(Token::LParen,);
                i += 1;
            },
            ')' => {
                tokens.push(Token::RParen,);
                i += 1;
            },
            '[' => {
                tokens.push(Token::LBracket,);
                i += 1;
            },
            ']' => {
                tokens.push(Token::RBracket,);
                i += 1;
            },
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    let Some(&ch,) = chars.get(i,) else {
                        return Err(StreamError::ExpressionError(format!(
                            "Unterminated string literal in '{}'",
                            source
                        ),),);
                    };
                    i += 1;
                    if ch == '\\' {
                        if let Some(&next,) = chars.get(i,) {
                            if next == quote || next == '\\' {
                                s.push(next,);
                            } else {
                                s.push('\\',);
                                s.push(next,);
                            }
                            i += 1;
                        }
                    } else if ch == quote {
                        // A doubled quote is an escaped quote.
                        if chars.get(i,) == Some(&quote,) {
                            s.push(quote,);
                            i += 1;
                        } else {
                            break;
                        }
                    } else {
                        s.push(ch,);
                    }
                }
                tokens.push(Token::Str(s,),);
            },
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1,).is_some_and(char::is_ascii_digit,)) => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text.parse::<i64>().map_err(|e| {
                    StreamError::ExpressionError(format!("Invalid integer '{}': {}", text, e),)
                },)?;
                tokens.push(Token::Int(n,),);
            },
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '_' | '$' | '-'))
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect(),),);
            },
            other => {
                return Err(StreamError::ExpressionError(format!(
                    "Unexpected character '{}' in '{}'",
                    other, source
                ),),);
            },
        }
    }

    Ok(tokens,)
}

struct Parser<'a,> {
    tokens: Vec<Token,>,
    pos:    usize,
    source: &'a str,
}

impl Parser<'_,> {
    fn peek(&self,) -> Option<&Token,> {
        self.tokens.get(self.pos,)
    }

    fn next(&mut self,) -> Option<Token,> {
        let tok = self.tokens.get(self.pos,).cloned();
        self.pos += 1;
        tok
    }

    fn error(&self, msg: String,) -> StreamError {
        StreamError::ExpressionError(format!("{} in '{}'", msg, self.source),)
    }

    fn expect(&mut self, want: Token,) -> Result<(),> {
        match self.next() {
            Some(tok,) if tok == want => Ok((),),
            Some(tok,) => Err(self.error(format!("expected '{}' but found '{}'", want, tok),),),
            None => Err(self.error(format!("expected '{}' at end of input", want),),),
        }
    }

    fn parse_concat(&mut self,) -> Result<Node,> {
        let mut left = self.parse_postfix()?;
        while self.peek() == Some(&Token::Plus,) {
            self.pos += 1;
            let right = self.parse_postfix()?;
            left = Node::Concat(Box::new(left,), Box::new(right,),);
        }
        Ok(left,)
    }

    fn parse_postfix(&mut self,) -> Result<Node,> {
        let mut node = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot,) => {
                    self.pos += 1;
                    let name = match self.next() {
                        Some(Token::Ident(name,),) => name,
                        Some(tok,) => {
                            return Err(self.error(format!("expected a name after '.', found '{}'", tok),),);
                        },
                        None => return Err(self.error("expected a name after '.'".to_string(),),),
                    };
                    if self.peek() == Some(&Token::LParen,) {
                        let args = self.parse_args()?;
                        node = Node::Call {
                            target: Some(Box::new(node,),),
                            name,
                            args,
                        };
                    } else {
                        node = self.push_segment(node, name,)?;
                    }
                },
                Some(Token::LBracket,) => {
                    self.pos += 1;
                    let key = match self.next() {
                        Some(Token::Str(s,),) => s,
                        Some(Token::Int(n,),) => n.to_string(),
                        Some(tok,) => {
                            return Err(self.error(format!("expected a literal index, found '{}'", tok),),);
                        },
                        None => return Err(self.error("expected a literal index".to_string(),),),
                    };
                    self.expect(Token::RBracket,)?;
                    node = self.push_segment(node, key,)?;
                },
                _ => return Ok(node,),
            }
        }
    }

    fn push_segment(&self, node: Node, segment: String,) -> Result<Node,> {
        match node {
            Node::Path { root, mut segments, } => {
                segments.push(segment,);
                Ok(Node::Path { root, segments, },)
            },
            _ => Err(self.error(format!("property '{}' can only follow headers or payload", segment),),),
        }
    }

    fn parse_args(&mut self,) -> Result<Vec<Node,>,> {
        self.expect(Token::LParen,)?;
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen,) {
            self.pos += 1;
            return Ok(args,);
        }
        loop {
            args.push(self.parse_concat()?,);
            match self.next() {
                Some(Token::Comma,) => continue,
                Some(Token::RParen,) => return Ok(args,),
                Some(tok,) => return Err(self.error(format!("expected ',' or ')' but found '{}'", tok),),),
                None => return Err(self.error("unclosed argument list".to_string(),),),
            }
        }
    }

    fn parse_primary(&mut self,) -> Result<Node,> {
        match self.next() {
            Some(Token::Str(s,),) => Ok(Node::Literal(Value::String(s,),),),
            Some(Token::Int(n,),) => Ok(Node::Literal(Value::from(n,),),),
            Some(Token::LParen,) => {
                let inner = self.parse_concat()?;
                self.expect(Token::RParen,)?;
                Ok(inner,)
            },
            Some(Token::Ident(name,),) => match name.as_str() {
                "true" => Ok(Node::Literal(Value::Bool(true,),),),
                "false" => Ok(Node::Literal(Value::Bool(false,),),),
                "null" => Ok(Node::Literal(Value::Null,),),
                "headers" => Ok(Node::Path {
                    root:     Root::Headers,
                    segments: Vec::new(),
                },),
                "payload" => Ok(Node::Path {
                    root:     Root::Payload,
                    segments: Vec::new(),
                },),
                _ if self.peek() == Some(&Token::LParen,) => {
                    let args = self.parse_args()?;
                    Ok(Node::Call {
                        target: None,
                        name,
                        args,
                    },)
                },
                _ => Err(self.error(format!("unknown identifier '{}'", name),),),
            },
            Some(tok,) => Err(self.error(format!("unexpected token '{}'", tok),),),
            None => Err(self.error("unexpected end of expression".to_string(),),),
        }
    }
}

fn eval(node: &Node, message: Option<&Message,>,) -> Result<Evaluated,> {
    match node {
        Node::Literal(v,) => Ok(Evaluated::Value(v.clone(),),),
        Node::Path { root, segments, } => {
            let message = message.ok_or_else(|| {
                StreamError::ExpressionError("no message is available to evaluate against".to_string(),)
            },)?;
            let mut current = match root {
                Root::Headers => Value::Object(
                    message
                        .headers
                        .iter()
                        .map(|(k, v,)| (k.clone(), v.clone(),),)
                        .collect(),
                ),
                Root::Payload => message.payload.to_value(),
            };
            for segment in segments {
                current = match current {
                    Value::Object(mut map,) => map.remove(segment,).unwrap_or(Value::Null,),
                    Value::Array(mut items,) => match segment.parse::<usize>() {
                        Ok(idx,) if idx < items.len() => items.swap_remove(idx,),
                        _ => Value::Null,
                    },
                    Value::Null => Value::Null,
                    other => {
                        return Err(StreamError::ExpressionError(format!(
                            "cannot read property '{}' of {}",
                            segment, other
                        ),),);
                    },
                };
            }
            Ok(Evaluated::Value(current,),)
        },
        Node::Concat(left, right,) => {
            let l = expect_value(eval(left, message,)?, "+",)?;
            let r = expect_value(eval(right, message,)?, "+",)?;
            match (&l, &r,) {
                (Value::Number(a,), Value::Number(b,),) if a.is_i64() && b.is_i64() => {
                    let sum = a
                        .as_i64()
                        .zip(b.as_i64(),)
                        .and_then(|(a, b,)| a.checked_add(b,),)
                        .ok_or_else(|| StreamError::ExpressionError("integer overflow".to_string(),),)?;
                    Ok(Evaluated::Value(Value::from(sum,),),)
                },
                (Value::String(_,), _,) | (_, Value::String(_,),) => Ok(Evaluated::Value(Value::String(
                    format!("{}{}", display(&l,), display(&r,)),
                ),),),
                _ => Err(StreamError::ExpressionError(format!("cannot add {} and {}", l, r),),),
            }
        },
        Node::Call { target, name, args, } => {
            let args = args
                .iter()
                .map(|a| eval(a, message,),)
                .collect::<Result<Vec<_,>,>>()?;
            match target {
                None => call_function(name, args,),
                Some(target,) => match eval(target, message,)? {
                    Evaluated::Query(q,) => call_query_method(q, name, args,),
                    Evaluated::Value(_,) => Err(StreamError::ExpressionError(format!(
                        "method '{}' can only be called on a query",
                        name
                    ),),),
                },
            }
        },
    }
}

fn call_function(name: &str, args: Vec<Evaluated,>,) -> Result<Evaluated,> {
    match name {
        "query" => match args.as_slice() {
            [] => Ok(Evaluated::Query(QuerySpec::match_all(),),),
            [Evaluated::Value(Value::String(text,),),] => Ok(Evaluated::Query(QuerySpec::parse(text,)?,),),
            _ => Err(StreamError::ExpressionError(
                "query() takes a single JSON string argument".to_string(),
            ),),
        },
        other => Err(StreamError::ExpressionError(format!("unknown function '{}'", other),),),
    }
}

fn call_query_method(query: QuerySpec, name: &str, args: Vec<Evaluated,>,) -> Result<Evaluated,> {
    let query = match (name, args.as_slice(),) {
        ("sort", [Evaluated::Value(Value::String(text,),),],) => query.with_sort(parse_document(text,)?,),
        ("fields", [Evaluated::Value(Value::String(text,),),],) => {
            query.with_projection(parse_document(text,)?,)
        },
        ("limit", [Evaluated::Value(v,),],) => {
            let n = v.as_i64().filter(|n| *n >= 0,).ok_or_else(|| {
                StreamError::ExpressionError(format!("limit() expects a non-negative integer, got {}", v),)
            },)?;
            query.with_limit(n,)
        },
        ("skip", [Evaluated::Value(v,),],) => {
            let n = v.as_u64().ok_or_else(|| {
                StreamError::ExpressionError(format!("skip() expects a non-negative integer, got {}", v),)
            },)?;
            query.with_skip(n,)
        },
        ("sort" | "fields" | "limit" | "skip", _,) => {
            return Err(StreamError::ExpressionError(format!(
                "wrong arguments for query method '{}'",
                name
            ),),);
        },
        _ => {
            return Err(StreamError::ExpressionError(format!("unknown query method '{}'", name),),);
        },
    };
    Ok(Evaluated::Query(query,),)
}

fn expect_value(e: Evaluated, op: &str,) -> Result<Value,> {
    match e {
        Evaluated::Value(v,) => Ok(v,),
        Evaluated::Query(_,) => Err(StreamError::ExpressionError(format!(
            "a query cannot be used as an operand of '{}'",
            op
        ),),),
    }
}

fn display(v: &Value,) -> String {
    match v {
        Value::String(s,) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
