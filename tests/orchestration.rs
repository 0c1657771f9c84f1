//! Orchestration Integration Tests
//!
//! Exercises forward execution: concurrent fan-out/fan-in, at-most-once
//! guarantees, dependency ordering and error propagation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use braid::{Action, Manager, Node, PropertyReference, Store};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Test action recording every execution in a shared journal
struct Recorder {
    name: String,
    journal: Arc<Mutex<Vec<String>>>,
    hits: Arc<AtomicUsize>,
    fail: bool,
    delay: Option<Duration>,
}

impl Recorder {
    fn new(name: &str, journal: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            journal: journal.clone(),
            hits: Arc::new(AtomicUsize::new(0)),
            fail: false,
            delay: None,
        })
    }

    fn failing(name: &str, journal: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            journal: journal.clone(),
            hits: Arc::new(AtomicUsize::new(0)),
            fail: true,
            delay: None,
        })
    }

    fn slow(name: &str, journal: &Arc<Mutex<Vec<String>>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            journal: journal.clone(),
            hits: Arc::new(AtomicUsize::new(0)),
            fail: false,
            delay: Some(delay),
        })
    }
}

#[async_trait]
impl Action for Recorder {
    async fn call(&self, _ctx: CancellationToken, store: &Store) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.hits.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().unwrap().push(self.name.clone());
        store.store_value(&self.name, "done", json!(true));

        if self.fail {
            anyhow::bail!("action '{}' failed", self.name);
        }

        Ok(())
    }
}

fn diamond(journal: &Arc<Mutex<Vec<String>>>, third: Arc<Recorder>) -> Vec<Node> {
    vec![
        Node::new("first").with_action(Recorder::new("first", journal)),
        Node::new("second")
            .with_action(Recorder::new("second", journal))
            .with_dependency("first"),
        Node::new("third").with_action(third).with_dependency("first"),
        Node::new("fourth")
            .with_action(Recorder::new("fourth", journal))
            .with_dependency("second")
            .with_dependency("third"),
    ]
}

#[tokio::test]
async fn test_diamond_executes_every_node_once() {
    init_tracing();
    let journal = Arc::new(Mutex::new(Vec::new()));
    let third = Recorder::new("third", &journal);
    let manager = Manager::new("diamond", diamond(&journal, third)).unwrap();

    let store = manager.new_store();
    manager
        .call(CancellationToken::new(), store)
        .await
        .unwrap();
    manager.wait().await;

    let mut seen = journal.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec!["first", "fourth", "second", "third"]);
}

#[tokio::test]
async fn test_diamond_failure_returns_first_error() {
    init_tracing();
    let journal = Arc::new(Mutex::new(Vec::new()));
    let third = Recorder::failing("third", &journal);
    let manager = Manager::new("diamond", diamond(&journal, third)).unwrap();

    let store = manager.new_store();
    let err = manager
        .call(CancellationToken::new(), store)
        .await
        .unwrap_err();
    manager.wait().await;

    assert_eq!(err.to_string(), "action 'third' failed");

    let seen = journal.lock().unwrap().clone();
    assert!(!seen.contains(&"fourth".to_string()));
}

#[tokio::test]
async fn test_fan_in_executes_at_most_once() {
    // Five parallel branches all feeding one sink; every branch schedules the
    // sink independently, but its action must still run exactly once.
    let journal = Arc::new(Mutex::new(Vec::new()));
    let sink = Recorder::new("sink", &journal);

    let mut nodes = Vec::new();
    let mut sink_node = Node::new("sink").with_action(sink.clone());

    for index in 0..5 {
        let name = format!("branch{}", index);
        nodes.push(Node::new(&name).with_action(Recorder::new(&name, &journal)));
        sink_node = sink_node.with_dependency(&name);
    }

    nodes.push(sink_node);
    let manager = Manager::new("fan-in", nodes).unwrap();

    for _ in 0..20 {
        journal.lock().unwrap().clear();
        let store = manager.new_store();
        manager
            .call(CancellationToken::new(), store)
            .await
            .unwrap();
    }

    manager.wait().await;
    assert_eq!(sink.hits.load(Ordering::SeqCst), 20);
}

#[tokio::test]
async fn test_dependency_ordering_holds_under_concurrency() {
    // A slow predecessor must always finish before its dependent starts,
    // even when a fast sibling branch races ahead.
    let journal = Arc::new(Mutex::new(Vec::new()));

    let nodes = vec![
        Node::new("slow").with_action(Recorder::slow(
            "slow",
            &journal,
            Duration::from_millis(50),
        )),
        Node::new("fast").with_action(Recorder::new("fast", &journal)),
        Node::new("dependent")
            .with_action(Recorder::new("dependent", &journal))
            .with_dependency("slow")
            .with_dependency("fast"),
    ];

    let manager = Manager::new("ordering", nodes).unwrap();
    let store = manager.new_store();
    manager
        .call(CancellationToken::new(), store)
        .await
        .unwrap();
    manager.wait().await;

    let seen = journal.lock().unwrap().clone();
    let slow = seen.iter().position(|name| name == "slow").unwrap();
    let dependent = seen.iter().position(|name| name == "dependent").unwrap();
    assert!(slow < dependent);
}

#[tokio::test]
async fn test_inferred_dependency_from_reference() {
    // No declared dependency: the edge is inferred from the property
    // reference naming the producing step's resource.
    let journal = Arc::new(Mutex::new(Vec::new()));

    let nodes = vec![
        Node::new("producer").with_action(Recorder::new("producer", &journal)),
        Node::new("consumer")
            .with_action(Recorder::new("consumer", &journal))
            .with_reference(PropertyReference::new("producer.response", "done")),
    ];

    let manager = Manager::new("inferred", nodes).unwrap();
    let store = manager.new_store();
    manager
        .call(CancellationToken::new(), store)
        .await
        .unwrap();
    manager.wait().await;

    let seen = journal.lock().unwrap().clone();
    assert_eq!(seen, vec!["producer", "consumer"]);
}

#[tokio::test]
async fn test_store_passes_values_between_steps() {
    struct Producer;

    #[async_trait]
    impl Action for Producer {
        async fn call(&self, _ctx: CancellationToken, store: &Store) -> Result<()> {
            store.store_value("producer", "message", json!("hello"));
            Ok(())
        }
    }

    struct Consumer {
        observed: Arc<Mutex<Option<serde_json::Value>>>,
    }

    #[async_trait]
    impl Action for Consumer {
        async fn call(&self, _ctx: CancellationToken, store: &Store) -> Result<()> {
            let reference = store.load("producer", "message");
            *self.observed.lock().unwrap() =
                reference.and_then(|reference| reference.value.clone());
            Ok(())
        }
    }

    let observed = Arc::new(Mutex::new(None));

    let nodes = vec![
        Node::new("producer").with_action(Arc::new(Producer)),
        Node::new("consumer")
            .with_action(Arc::new(Consumer {
                observed: observed.clone(),
            }))
            .with_dependency("producer"),
    ];

    let manager = Manager::new("exchange", nodes).unwrap();
    let store = manager.new_store();
    manager
        .call(CancellationToken::new(), store)
        .await
        .unwrap();
    manager.wait().await;

    assert_eq!(observed.lock().unwrap().clone(), Some(json!("hello")));
}

#[tokio::test]
async fn test_node_without_action_passes_through() {
    let journal = Arc::new(Mutex::new(Vec::new()));

    let nodes = vec![
        Node::new("first").with_action(Recorder::new("first", &journal)),
        Node::new("gate").with_dependency("first"),
        Node::new("last")
            .with_action(Recorder::new("last", &journal))
            .with_dependency("gate"),
    ];

    let manager = Manager::new("pass-through", nodes).unwrap();
    let store = manager.new_store();
    manager
        .call(CancellationToken::new(), store)
        .await
        .unwrap();
    manager.wait().await;

    let seen = journal.lock().unwrap().clone();
    assert_eq!(seen, vec!["first", "last"]);
}
