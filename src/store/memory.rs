// mongodb_stream/src/store/memory.rs
// In-memory document store for tests and dry runs.
//
// Supports the query subset the source relies on: equality on (dotted) fields,
// the comparison operators `$eq $ne $gt $gte $lt $lte $in $nin $exists`,
// `$and`/`$or`, plus sort, skip, limit and projection.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document};
use tokio::sync::RwLock;

use crate::error::{Result, StreamError};
use crate::query::QuerySpec;
use crate::store::DocumentStore;

#[derive(Debug, Clone, Default,)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<String, Vec<Document,>,>,>,>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All documents of a collection in insertion order.
    pub async fn documents(&self, collection: &str,) -> Vec<Document,> {
        self.collections
            .read()
            .await
            .get(collection,)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn collection_names(&self,) -> Vec<String,> {
        let mut names: Vec<String,> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_one(&self, collection: &str, mut document: Document,) -> Result<Bson,> {
        let id = match document.get("_id",).cloned() {
            Some(id,) => id,
            None => {
                let id = Bson::ObjectId(ObjectId::new(),);
                let mut with_id = Document::new();
                with_id.insert("_id", id.clone(),);
                for (key, value,) in document {
                    with_id.insert(key, value,);
                }
                document = with_id;
                id
            },
        };

        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string(),).or_default();
        if docs.iter().any(|d| d.get("_id",) == Some(&id,),) {
            return Err(StreamError::DatabaseError(format!(
                "Duplicate key error: _id {} already exists in '{}'",
                id, collection
            ),),);
        }
        docs.push(document,);
        Ok(id,)
    }

    async fn find(&self, collection: &str, query: &QuerySpec,) -> Result<Vec<Document,>,> {
        let mut matched = Vec::new();
        for doc in self.documents(collection,).await {
            if matches(&doc, &query.filter,)? {
                matched.push(doc,);
            }
        }

        if let Some(sort,) = &query.sort {
            let keys = sort
                .iter()
                .map(|(k, v,)| direction(v,).map(|d| (k.clone(), d,),),)
                .collect::<Result<Vec<_,>,>>()?;
            matched.sort_by(|a, b| {
                for (key, dir,) in &keys {
                    let ord = compare_missing_first(lookup(a, key,), lookup(b, key,),);
                    let ord = if *dir < 0 { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            },);
        }

        let skip = usize::try_from(query.skip.unwrap_or(0,),).unwrap_or(usize::MAX,);
        let mut results: Vec<Document,> = matched.into_iter().skip(skip,).collect();
        if let Some(limit,) = query.limit.map(i64::unsigned_abs,).filter(|l| *l > 0,) {
            results.truncate(usize::try_from(limit,).unwrap_or(usize::MAX,),);
        }

        if let Some(projection,) = &query.projection {
            results = results.into_iter().map(|d| project(d, projection,),).collect();
        }

        Ok(results,)
    }
}

fn direction(v: &Bson,) -> Result<i64,> {
    let dir = match v {
        Bson::Int32(n,) => Some(*n as i64,),
        Bson::Int64(n,) => Some(*n,),
        Bson::Double(n,) if *n == 1.0 || *n == -1.0 => Some(*n as i64,),
        _ => None,
    };
    match dir {
        Some(d @ (1 | -1),) => Ok(d,),
        _ => Err(StreamError::DatabaseError(format!(
            "Invalid sort direction {}: expected 1 or -1",
            v
        ),),),
    }
}

fn lookup<'a,>(doc: &'a Document, path: &str,) -> Option<&'a Bson,> {
    let mut parts = path.split('.',);
    let mut current = doc.get(parts.next()?,)?;
    for part in parts {
        current = match current {
            Bson::Document(d,) => d.get(part,)?,
            Bson::Array(items,) => items.get(part.parse::<usize>().ok()?,)?,
            _ => return None,
        };
    }
    Some(current,)
}

fn matches(doc: &Document, filter: &Document,) -> Result<bool,> {
    for (key, cond,) in filter {
        let ok = match key.as_str() {
            "$and" => logical(doc, cond,)?.iter().all(|b| *b,),
            "$or" => logical(doc, cond,)?.iter().any(|b| *b,),
            k if k.starts_with('$',) => {
                return Err(StreamError::DatabaseError(format!(
                    "Unsupported top-level operator '{}'",
                    k
                ),),);
            },
            _ => field_matches(lookup(doc, key,), cond,)?,
        };
        if !ok {
            return Ok(false,);
        }
    }
    Ok(true,)
}

fn logical(doc: &Document, cond: &Bson,) -> Result<Vec<bool,>,> {
    let Bson::Array(clauses,) = cond else {
        return Err(StreamError::DatabaseError("$and/$or expect an array".to_string(),),);
    };
    clauses
        .iter()
        .map(|c| match c {
            Bson::Document(d,) => matches(doc, d,),
            _ => Err(StreamError::DatabaseError("$and/$or clauses must be documents".to_string(),),),
        },)
        .collect()
}

fn is_operator_doc(cond: &Bson,) -> Option<&Document,> {
    match cond {
        Bson::Document(d,) if !d.is_empty() && d.keys().all(|k| k.starts_with('$',),) => Some(d,),
        _ => None,
    }
}

fn field_matches(value: Option<&Bson,>, cond: &Bson,) -> Result<bool,> {
    let Some(ops,) = is_operator_doc(cond,) else {
        return Ok(equals(value, cond,),);
    };

    for (op, arg,) in ops {
        let ok = match op.as_str() {
            "$eq" => equals(value, arg,),
            "$ne" => !equals(value, arg,),
            "$gt" => compare(value, arg,) == Some(Ordering::Greater,),
            "$gte" => matches!(compare(value, arg), Some(Ordering::Greater | Ordering::Equal)),
            "$lt" => compare(value, arg,) == Some(Ordering::Less,),
            "$lte" => matches!(compare(value, arg), Some(Ordering::Less | Ordering::Equal)),
            "$in" | "$nin" => {
                let Bson::Array(candidates,) = arg else {
                    return Err(StreamError::DatabaseError(format!("{} expects an array", op),),);
                };
                let found = candidates.iter().any(|c| equals(value, c,),);
                if op == "$in" { found } else { !found }
            },
            "$exists" => {
                let want = !matches!(arg, Bson::Boolean(false) | Bson::Int32(0) | Bson::Int64(0));
                value.is_some() == want
            },
            other => {
                return Err(StreamError::DatabaseError(format!(
                    "Unsupported query operator '{}'",
                    other
                ),),);
            },
        };
        if !ok {
            return Ok(false,);
        }
    }
    Ok(true,)
}

fn equals(value: Option<&Bson,>, expected: &Bson,) -> bool {
    match value {
        None => matches!(expected, Bson::Null),
        Some(Bson::Array(items,),) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| equals(Some(item,), expected,),)
        },
        Some(v,) => compare(Some(v,), expected,) == Some(Ordering::Equal,) || v == expected,
    }
}

fn as_f64(v: &Bson,) -> Option<f64,> {
    match v {
        Bson::Int32(n,) => Some(*n as f64,),
        Bson::Int64(n,) => Some(*n as f64,),
        Bson::Double(n,) => Some(*n,),
        _ => None,
    }
}

fn compare(value: Option<&Bson,>, other: &Bson,) -> Option<Ordering,> {
    let value = value?;
    if let (Some(a,), Some(b,),) = (as_f64(value,), as_f64(other,),) {
        return a.partial_cmp(&b,);
    }
    match (value, other,) {
        (Bson::String(a,), Bson::String(b,),) => Some(a.cmp(b,),),
        (Bson::Boolean(a,), Bson::Boolean(b,),) => Some(a.cmp(b,),),
        (Bson::ObjectId(a,), Bson::ObjectId(b,),) => Some(a.bytes().cmp(&b.bytes(),),),
        (Bson::DateTime(a,), Bson::DateTime(b,),) => Some(a.cmp(b,),),
        (Bson::Null, Bson::Null,) => Some(Ordering::Equal,),
        _ => None,
    }
}

fn compare_missing_first(a: Option<&Bson,>, b: Option<&Bson,>,) -> Ordering {
    match (a, b,) {
        (None, None,) => Ordering::Equal,
        (None, Some(_,),) => Ordering::Less,
        (Some(_,), None,) => Ordering::Greater,
        (Some(x,), Some(y,),) => compare(Some(x,), y,).unwrap_or(Ordering::Equal,),
    }
}

fn truthy(v: &Bson,) -> bool {
    !matches!(v, Bson::Boolean(false) | Bson::Int32(0) | Bson::Int64(0) | Bson::Null)
        && as_f64(v,) != Some(0.0,)
}

fn project(doc: Document, projection: &Document,) -> Document {
    let include_id = projection.get("_id",).is_none_or(truthy,);
    let inclusive = projection
        .iter()
        .any(|(k, v,)| k != "_id" && truthy(v,),);

    doc.into_iter()
        .filter(|(k, _,)| {
            if k == "_id" {
                include_id
            } else if inclusive {
                projection.get(k,).is_some_and(truthy,)
            } else {
                projection.get(k,).is_none()
            }
        },)
        .collect()
}
