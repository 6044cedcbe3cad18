// mongodb_stream/tests/expression_tests.rs

use mongodb::bson::{Bson, doc};
use mongodb_stream::error::StreamError;
use mongodb_stream::expression::{Evaluated, Expression};
use mongodb_stream::message::{Message, Payload};
use serde_json::json;

fn order_message() -> Message {
    let payload = json!({"customer": {"region": "emea", "tags": ["a", "b"]}, "id": 7});
    Message::new(Payload::Map(payload.as_object().unwrap().clone(),),)
        .with_header("collection", "orders",)
        .with_header("x-tenant", "acme",)
        .with_header("shard", 3,)
}

#[test]
fn test_header_lookups() {
    let message = order_message();
    let dotted = Expression::parse("headers.collection",).unwrap();
    assert_eq!(dotted.evaluate_string(&message,).unwrap(), "orders");

    let bracket = Expression::parse("headers['x-tenant'] + '_events'",).unwrap();
    assert_eq!(bracket.evaluate_string(&message,).unwrap(), "acme_events");

    let numeric = Expression::parse("'shard_' + headers.shard",).unwrap();
    assert_eq!(numeric.evaluate_string(&message,).unwrap(), "shard_3");
}

#[test]
fn test_payload_paths() {
    let message = order_message();
    let region = Expression::parse("payload.customer.region",).unwrap();
    assert_eq!(region.evaluate_string(&message,).unwrap(), "emea");

    let tag = Expression::parse("payload.customer.tags[1]",).unwrap();
    assert_eq!(tag.evaluate_string(&message,).unwrap(), "b");

    let missing = Expression::parse("payload.customer.country",).unwrap();
    assert_eq!(
        missing.evaluate(Some(&message),).unwrap(),
        Evaluated::Value(serde_json::Value::Null)
    );
    assert!(matches!(
        missing.evaluate_string(&message,),
        Err(StreamError::ExpressionError(_))
    ));

    let through_scalar = Expression::parse("payload.id.value",).unwrap();
    assert!(through_scalar.evaluate(Some(&message),).is_err());
}

#[test]
fn test_literals_and_arithmetic() {
    let sum = Expression::parse("1 + 2 + 39",).unwrap();
    assert_eq!(sum.evaluate(None,).unwrap(), Evaluated::Value(json!(42)));

    let quoted = Expression::parse(r#"'it''s' + "-" + 'done'"#,).unwrap();
    assert_eq!(quoted.evaluate(None,).unwrap(), Evaluated::Value(json!("it's-done")));

    let flag = Expression::parse("true",).unwrap();
    assert_eq!(flag.evaluate(None,).unwrap(), Evaluated::Value(json!(true)));
}

#[test]
fn test_parse_errors() {
    for source in [
        "",
        "headers.",
        "collection",
        "'unterminated",
        "headers.collection )",
        "query('{}').limit(",
        "headers[collection]",
        "'a' ? 'b'",
    ] {
        let err = Expression::parse(source,).unwrap_err();
        assert!(
            matches!(err, StreamError::ExpressionError(_)),
            "expected an expression error for {:?}",
            source
        );
    }
}

#[test]
fn test_query_builder() {
    let expr = Expression::parse(
        "query('{ greeting: \"hola\" }').sort('{ greeting: -1 }').limit(5).skip(1).fields('{ greeting: 1 }')",
    )
    .unwrap();
    let spec = expr.evaluate_query().unwrap();
    assert_eq!(spec.filter, doc! {"greeting": "hola"});
    assert_eq!(spec.sort, Some(doc! {"greeting": -1}));
    assert_eq!(spec.limit, Some(5));
    assert_eq!(spec.skip, Some(1));
    assert_eq!(spec.projection, Some(doc! {"greeting": 1}));
}

#[test]
fn test_query_from_string_result() {
    let expr = Expression::parse("'{ \"n\": { \"$gte\": 2 } }'",).unwrap();
    let spec = expr.evaluate_query().unwrap();
    let n = spec.filter.get_document("n",).unwrap();
    assert!(matches!(n.get("$gte"), Some(Bson::Int32(2) | Bson::Int64(2))));
    assert!(spec.limit.is_none());

    let empty = Expression::parse("query()",).unwrap();
    assert!(empty.evaluate_query().unwrap().filter.is_empty());
}

#[test]
fn test_query_evaluation_errors() {
    let negative = Expression::parse("query('{}').limit(-1)",).unwrap();
    assert!(matches!(
        negative.evaluate_query(),
        Err(StreamError::ExpressionError(_))
    ));

    let not_a_query = Expression::parse("headers.a.limit(1)",).unwrap();
    assert!(not_a_query.evaluate(Some(&order_message()),).is_err());

    let needs_message = Expression::parse("payload.filter",).unwrap();
    assert!(needs_message.evaluate_query().is_err());

    let number = Expression::parse("42",).unwrap();
    assert!(number.evaluate_query().is_err());

    let unknown = Expression::parse("lookup('x')",).unwrap();
    assert!(unknown.evaluate_query().is_err());

    let collection_from_query = Expression::parse("query('{}')",).unwrap();
    assert!(collection_from_query.evaluate_string(&order_message(),).is_err());
}
