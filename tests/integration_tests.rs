// mongodb_stream/tests/integration_tests.rs

use std::sync::Arc;

use mongodb::bson::{Bson, Document, doc};
use mongodb_stream::channel::InputChannel;
use mongodb_stream::error::StreamError;
use mongodb_stream::message::{
    CONTENT_TYPE_HEADER, CORRELATION_ID_HEADER, Message, Payload, SEQUENCE_NUMBER_HEADER,
    SEQUENCE_SIZE_HEADER,
};
use mongodb_stream::query::QuerySpec;
use mongodb_stream::sink::{CollectionName, MongoSink, SinkConfig, TYPE_HINT_KEY};
use mongodb_stream::source::{MongoSource, SourceConfig};
use clap::Parser;
use mongodb_stream::cli::{Cli, Commands};
use mongodb_stream::store::{self, DocumentStore, MemoryStore, MongoConfig, MongoStore};
use serde_json::{Value, json};

fn map_payload(value: Value,) -> Payload {
    Payload::Map(value.as_object().expect("object literal",).clone(),)
}

fn sink_with(store: &MemoryStore, config: SinkConfig,) -> InputChannel {
    let sink = MongoSink::new(&config, Arc::new(store.clone(),),).expect("valid sink config",);
    InputChannel::new(Arc::new(sink,),)
}

async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .insert_one("testing", doc! {"greeting": "hello"},)
        .await
        .expect("seed hello",);
    store
        .insert_one("testing", doc! {"greeting": "hola"},)
        .await
        .expect("seed hola",);
    store
}

fn source_with(store: &MemoryStore, config: SourceConfig,) -> MongoSource {
    MongoSource::new(&config, Arc::new(store.clone(),),).expect("valid source config",)
}

fn int(doc: &Document, key: &str,) -> i64 {
    match doc.get(key,) {
        Some(Bson::Int32(n,),) => *n as i64,
        Some(Bson::Int64(n,),) => *n,
        other => panic!("expected an integer at '{}', got {:?}", key, other),
    }
}

fn text(message: &Message,) -> &str {
    match &message.payload {
        Payload::Text(s,) => s,
        other => panic!("expected a text payload, got {:?}", other),
    }
}

#[tokio::test]
async fn test_sink_writes_into_configured_collection() {
    let store = MemoryStore::new();
    let input = sink_with(
        &store,
        SinkConfig {
            collection:            Some("testing".to_string(),),
            collection_expression: None,
        },
    );

    input
        .send(Message::new(map_payload(json!({"foo": "bar"}),),),)
        .await
        .expect("map payload stored",);
    input
        .send(Message::new(map_payload(json!({"firstName": "Foo", "lastName": "Bar"}),),),)
        .await
        .expect("second map payload stored",);
    input
        .send(Message::new("{\"my_data\": \"THE DATA\"}",),)
        .await
        .expect("json text stored",);

    let docs = store.documents("testing",).await;
    assert_eq!(docs.len(), 3);

    assert!(matches!(docs[0].get("_id"), Some(Bson::ObjectId(_))));
    assert_eq!(docs[0].get_str("foo",).unwrap(), "bar");
    assert!(docs[0].get(TYPE_HINT_KEY).is_some());

    assert_eq!(docs[1].get_str("firstName",).unwrap(), "Foo");
    assert_eq!(docs[1].get_str("lastName",).unwrap(), "Bar");

    assert!(docs[2].get(TYPE_HINT_KEY).is_none());
    assert_eq!(docs[2].get_str("my_data",).unwrap(), "THE DATA");

    assert_eq!(store.collection_names().await, vec!["testing".to_string()]);
}

#[tokio::test]
async fn test_sink_stores_map_keys_literally() {
    let store = MemoryStore::new();
    let input = sink_with(
        &store,
        SinkConfig {
            collection:            Some("testing".to_string(),),
            collection_expression: None,
        },
    );

    input
        .send(Message::new(map_payload(json!({"ref": {"$oid": "x"}, "$note": "kept"}),),),)
        .await
        .expect("map with dollar keys stored",);

    let docs = store.documents("testing",).await;
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].get_document("ref",).unwrap(), &doc! {"$oid": "x"});
    assert_eq!(docs[0].get_str("$note",).unwrap(), "kept");
    assert_eq!(docs[0].get_str(TYPE_HINT_KEY,).unwrap(), "map");
}

#[tokio::test]
async fn test_sink_collection_expression_routes_by_header() {
    let store = MemoryStore::new();
    let input = sink_with(
        &store,
        SinkConfig {
            collection:            Some("ignored".to_string(),),
            collection_expression: Some("headers.collection".to_string(),),
        },
    );

    input
        .send(Message::new("{ 'n': 1 }",).with_header("collection", "testing2",),)
        .await
        .unwrap();
    input
        .send(Message::new(map_payload(json!({"n": 2}),),).with_header("collection", "testing3",),)
        .await
        .unwrap();

    let two = store.documents("testing2",).await;
    let three = store.documents("testing3",).await;
    assert_eq!(two.len(), 1);
    assert_eq!(three.len(), 1);
    assert_eq!(int(&two[0], "n",), 1);
    assert_eq!(int(&three[0], "n",), 2);
    assert!(store.documents("ignored",).await.is_empty());
}

#[tokio::test]
async fn test_sink_fails_when_expression_has_no_value() {
    let store = MemoryStore::new();
    let input = sink_with(
        &store,
        SinkConfig {
            collection:            None,
            collection_expression: Some("headers.collection".to_string(),),
        },
    );

    let err = input.send(Message::new("{}",),).await.unwrap_err();
    assert!(matches!(err, StreamError::ExpressionError(_)));
    assert!(store.collection_names().await.is_empty());
}

#[tokio::test]
async fn test_sink_decodes_json_bytes_before_storing() {
    let store = MemoryStore::new();
    let input = sink_with(
        &store,
        SinkConfig {
            collection:            Some("bytes".to_string(),),
            collection_expression: None,
        },
    );

    input
        .send(
            Message::new(br#"{"kind": "decoded"}"#.to_vec(),)
                .with_header(CONTENT_TYPE_HEADER, "application/json",),
        )
        .await
        .unwrap();
    input
        .send(Message::new(vec![0u8, 159, 146, 150],).with_header(CONTENT_TYPE_HEADER, "image/png",),)
        .await
        .unwrap();

    let docs = store.documents("bytes",).await;
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].get_str("kind",).unwrap(), "decoded");
    assert!(docs[0].get(TYPE_HINT_KEY).is_none());

    assert_eq!(docs[1].get_str(TYPE_HINT_KEY,).unwrap(), "bytes");
    match docs[1].get("payload",) {
        Some(Bson::Binary(bin,),) => assert_eq!(bin.bytes, vec![0u8, 159, 146, 150]),
        other => panic!("expected binary payload, got {:?}", other),
    }
}

#[tokio::test]
async fn test_sink_rejects_text_that_is_not_a_document() {
    let store = MemoryStore::new();
    let input = sink_with(
        &store,
        SinkConfig {
            collection:            Some("testing".to_string(),),
            collection_expression: None,
        },
    );

    let err = input.send(Message::new("just words",),).await.unwrap_err();
    assert!(matches!(err, StreamError::ConversionError(_)));
    assert!(store.documents("testing",).await.is_empty());
}

#[test]
fn test_sink_config_validation() {
    let missing = SinkConfig::default().collection_name().unwrap_err();
    assert!(matches!(missing, StreamError::ConfigurationError(_)));

    let blank = SinkConfig {
        collection:            Some("  ".to_string(),),
        collection_expression: Some(String::new(),),
    };
    assert!(blank.collection_name().is_err());

    let both = SinkConfig {
        collection:            Some("literal".to_string(),),
        collection_expression: Some("headers.target".to_string(),),
    };
    assert!(matches!(
        both.collection_name().unwrap(),
        CollectionName::Expression(_)
    ));

    let malformed = SinkConfig {
        collection:            None,
        collection_expression: Some("headers.".to_string(),),
    };
    assert!(matches!(
        malformed.collection_name().unwrap_err(),
        StreamError::ExpressionError(_)
    ));
}

#[tokio::test]
async fn test_source_emits_each_document_when_split() {
    let store = seeded_store().await;
    let source = source_with(
        &store,
        SourceConfig {
            collection: "testing".to_string(),
            ..SourceConfig::default()
        },
    );

    let messages = source.poll().await.unwrap();
    assert_eq!(messages.len(), 2);
    assert!(text(&messages[0],).contains("hello"));
    assert!(text(&messages[1],).contains("hola"));

    let correlation = messages[0].header(CORRELATION_ID_HEADER,).cloned();
    assert!(correlation.is_some());
    for (idx, message,) in messages.iter().enumerate() {
        assert_eq!(message.header(CORRELATION_ID_HEADER,).cloned(), correlation);
        assert_eq!(message.header(SEQUENCE_NUMBER_HEADER,), Some(&json!(idx + 1)));
        assert_eq!(message.header(SEQUENCE_SIZE_HEADER,), Some(&json!(2)));
        assert_eq!(message.content_type(), Some("application/json"));
    }
}

#[tokio::test]
async fn test_source_applies_literal_query() {
    let store = seeded_store().await;
    let source = source_with(
        &store,
        SourceConfig {
            collection: "testing".to_string(),
            query: "{ 'greeting': 'hola' }".to_string(),
            ..SourceConfig::default()
        },
    );

    for _ in 0..3 {
        let messages = source.poll().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert!(text(&messages[0],).contains("hola"));
        assert!(!text(&messages[0],).contains("hello"));
    }
}

#[tokio::test]
async fn test_source_is_silent_when_nothing_matches() {
    let store = seeded_store().await;
    let source = source_with(
        &store,
        SourceConfig {
            collection: "testing".to_string(),
            query: "{ 'greeting': 'bogus' }".to_string(),
            ..SourceConfig::default()
        },
    );

    assert!(source.poll().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_source_emits_whole_list_without_split() {
    let store = seeded_store().await;
    let source = source_with(
        &store,
        SourceConfig {
            collection: "testing".to_string(),
            split: false,
            ..SourceConfig::default()
        },
    );

    let messages = source.poll().await.unwrap();
    assert_eq!(messages.len(), 1);
    let list: Vec<Value,> = serde_json::from_str(text(&messages[0],),).unwrap();
    let greetings: Vec<&str,> = list
        .iter()
        .filter_map(|d| d.get("greeting",).and_then(Value::as_str,),)
        .collect();
    assert_eq!(greetings, vec!["hello", "hola"]);
}

#[tokio::test]
async fn test_source_query_expression_sorts_and_limits() {
    let store = seeded_store().await;
    let source = source_with(
        &store,
        SourceConfig {
            collection: "testing".to_string(),
            query: "{ 'greeting': 'bogus' }".to_string(),
            query_expression: Some(
                "query('{}').sort('{ greeting: -1 }').limit(1).fields('{ _id: 0, greeting: 1 }')"
                    .to_string(),
            ),
            split: true,
        },
    );

    let messages = source.poll().await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(text(&messages[0],), r#"{"greeting":"hola"}"#);
    assert_eq!(messages[0].header(SEQUENCE_SIZE_HEADER,), Some(&json!(1)));
}

#[tokio::test]
async fn test_source_rejects_bad_configuration() {
    let store = MemoryStore::new();
    let no_collection = MongoSource::new(&SourceConfig::default(), Arc::new(store.clone(),),);
    assert!(matches!(
        no_collection.err(),
        Some(StreamError::ConfigurationError(_))
    ));

    let bad_query = MongoSource::new(
        &SourceConfig {
            collection: "testing".to_string(),
            query: "{ 'greeting': ".to_string(),
            ..SourceConfig::default()
        },
        Arc::new(store,),
    );
    assert!(matches!(
        bad_query.err(),
        Some(StreamError::ConfigurationError(_))
    ));
}

#[tokio::test]
async fn test_dry_run_uses_memory_store() {
    let cli = Cli::try_parse_from(["mongodb-stream", "source", "--collection", "testing", "--dry-run",],)
        .expect("valid command line",);
    let Commands::Source(args,) = cli.command else {
        panic!("expected the source subcommand");
    };
    assert!(args.mongo.dry_run);

    // Nothing listens on this port; a dry run must not try to connect.
    let config = MongoConfig {
        uri: "mongodb://127.0.0.1:1".to_string(),
        ..args.mongo.config()
    };
    let store = store::open(&config,).await.expect("dry run store",);
    store.insert_one("testing", doc! {"greeting": "hola"},).await.unwrap();

    let source = MongoSource::new(&args.config(), store,).unwrap();
    let messages = source.poll().await.unwrap();
    assert_eq!(messages.len(), 1);
    assert!(text(&messages[0],).contains("hola"));

    let defaults = Cli::try_parse_from(["mongodb-stream", "sink", "--collection", "testing",],).unwrap();
    let Commands::Sink(args,) = defaults.command else {
        panic!("expected the sink subcommand");
    };
    assert!(!args.mongo.dry_run);
}

#[tokio::test]
async fn test_mongodb_sink_and_source() {
    // This test assumes a local MongoDB instance is running at the default port.
    if std::env::var("RUN_MONGO_TESTS",).is_err() {
        println!("Skipping MongoDB test: RUN_MONGO_TESTS environment variable not set.");
        return;
    }
    let config = MongoConfig {
        uri:      "mongodb://localhost:27017".to_string(),
        database: "mongodb_stream_test".to_string(),
        dry_run:  false,
    };
    let store = MongoStore::connect(&config,)
        .await
        .expect("Failed to connect to MongoDB",);
    let collection = store.database().collection::<Document>("greetings",);
    collection.drop(None,).await.ok();

    let sink = MongoSink::new(
        &SinkConfig {
            collection:            Some("greetings".to_string(),),
            collection_expression: None,
        },
        Arc::new(store.clone(),),
    )
    .unwrap();
    let input = InputChannel::new(Arc::new(sink,),);
    input
        .send(Message::new(map_payload(json!({"greeting": "hello"}),),),)
        .await
        .expect("Failed to store map payload",);
    input
        .send(Message::new("{ 'greeting': 'hola' }",),)
        .await
        .expect("Failed to store text payload",);

    let stored = store
        .find("greetings", &QuerySpec::match_all(),)
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored[0].get(TYPE_HINT_KEY).is_some());
    assert!(stored[1].get(TYPE_HINT_KEY).is_none());

    let source = MongoSource::new(
        &SourceConfig {
            collection: "greetings".to_string(),
            query: "{ 'greeting': 'hola' }".to_string(),
            ..SourceConfig::default()
        },
        Arc::new(store.clone(),),
    )
    .unwrap();
    let messages = source.poll().await.unwrap();
    assert_eq!(messages.len(), 1);
    assert!(text(&messages[0],).contains("hola"));

    // Clean up
    collection.drop(None,).await.unwrap();
}
