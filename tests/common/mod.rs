//! Pipeline simulation harness shared by the integration tests.
//!
//! Drives the builder's lifecycle handlers in the order a reactive runtime
//! would call them. Closures passed to `subscribe`/`next`/`complete` run
//! "inside" that callback, so nesting in the test body mirrors nesting in a
//! real pipeline.

#![allow(dead_code)]

use rxgraph::{
    GraphBuilder, GraphConfig, GraphRecord, ObservableId, Reference, SubscriberId,
    SubscriptionRegistry,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

pub struct Pipeline {
    pub registry: SubscriptionRegistry,
    pub builder: GraphBuilder,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        init_tracing();
        Self {
            registry: SubscriptionRegistry::new(),
            builder: GraphBuilder::new(config),
        }
    }

    pub fn get(&self, observable: u64, subscriber: u64) -> Reference {
        self.registry
            .get(ObservableId(observable), SubscriberId(subscriber))
    }

    /// Subscribe `subscriber` to `observable`; `body` runs during setup.
    pub fn subscribe(&self, observable: u64, subscriber: u64, body: impl FnOnce(&Self)) -> Reference {
        let reference = self.get(observable, subscriber);
        self.builder.on_before_subscribe(&reference).unwrap();
        body(self);
        self.builder.on_after_subscribe(&reference).unwrap();
        reference
    }

    /// Deliver `value` through `reference`; `body` runs during delivery.
    pub fn next(&self, reference: &Reference, value: i64, body: impl FnOnce(&Self)) {
        self.builder.on_before_next(reference, &value).unwrap();
        body(self);
        self.builder.on_after_next(reference, &value).unwrap();
    }

    pub fn complete(&self, reference: &Reference, body: impl FnOnce(&Self)) {
        self.builder.on_before_complete(reference).unwrap();
        body(self);
        self.builder.on_after_complete(reference).unwrap();
    }

    pub fn error(&self, reference: &Reference, message: &str) {
        self.builder.on_before_error(reference, message).unwrap();
        self.builder.on_after_error(reference, message).unwrap();
    }

    pub fn unsubscribe(&self, reference: &Reference) {
        self.builder.on_after_unsubscribe(reference).unwrap();
    }

    pub fn record(&self, reference: &Reference) -> GraphRecord {
        self.builder.store().lookup(reference.id).unwrap()
    }
}

/// Does nothing inside a callback.
pub fn noop(_: &Pipeline) {}
