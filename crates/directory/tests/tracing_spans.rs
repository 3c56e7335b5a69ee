//! Integration test verifying that `#[instrument]` annotations produce
//! the expected spans on `MemoryDirectory` operations.

#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex};

use credbroker_directory::{
    DirectoryConnector, Entry, MemoryDirectory, ModifyRequest, SearchFilter, SearchRequest,
};
use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};

// ---------------------------------------------------------------------------
// Collecting layer: records span names as they are created
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct SpanCollector {
    spans: Arc<Mutex<Vec<String>>>,
}

impl<S> tracing_subscriber::Layer<S> for SpanCollector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        _attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            self.spans.lock().expect("lock poisoned").push(span.name().to_owned());
        }
    }
}

fn directory() -> MemoryDirectory {
    MemoryDirectory::with_entries([Entry::new("cn=alice,dc=example,dc=com")
        .with_attribute("objectClass", ["groupOfNames"])
        .with_attribute("cn", ["alice"])])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn memory_directory_search_creates_span() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);

    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let request = SearchRequest::builder()
        .base_dn("dc=example,dc=com")
        .filter(SearchFilter::ObjectClass("groupOfNames".into()))
        .build();
    directory().search(&request).await.expect("search should succeed");

    let recorded = spans.lock().expect("lock poisoned");
    assert!(recorded.iter().any(|s| s == "search"), "expected a 'search' span, got: {recorded:?}");
}

#[tokio::test]
async fn memory_directory_modify_creates_span() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);

    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    directory()
        .modify(&ModifyRequest::new("cn=alice,dc=example,dc=com").add("mail", vec!["a@x".into()]))
        .await
        .expect("modify should succeed");

    let recorded = spans.lock().expect("lock poisoned");
    assert!(recorded.iter().any(|s| s == "modify"), "expected a 'modify' span, got: {recorded:?}");
}
