use super::*;
use crate::test_support::TestBackend;

#[tokio::test]
async fn blank_queries_are_dropped_without_a_request() {
    let backend = Arc::new(TestBackend::ok(0, "unused"));
    let exchange = QueryExchange::new(Arc::clone(&backend) as Arc<dyn RagBackend>);

    assert!(exchange.ask("   \n\t", &SessionToken::from("t1")).await.is_none());
    assert!(exchange.ask("", &SessionToken::from("t1")).await.is_none());
    assert!(backend.queries.lock().await.is_empty());
}

#[tokio::test]
async fn query_is_sent_once_with_session_and_trimmed_text() {
    let backend = Arc::new(TestBackend::ok(0, "Refunds are accepted within 30 days."));
    let exchange = QueryExchange::new(Arc::clone(&backend) as Arc<dyn RagBackend>);

    let answer = exchange
        .ask("  What is the refund policy?  ", &SessionToken::from("t1"))
        .await
        .expect("answer");

    assert_eq!(answer.text, "Refunds are accepted within 30 days.");
    assert!(!answer.fallback);
    assert_eq!(answer.sources.len(), 1);
    let queries = backend.queries.lock().await;
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].query, "What is the refund policy?");
    assert_eq!(queries[0].session_id, SessionToken::from("t1"));
}

#[tokio::test]
async fn transport_failure_recovers_with_fallback_answer() {
    let backend = Arc::new(TestBackend::ok(0, "unused").unreachable_queries());
    let exchange = QueryExchange::new(Arc::clone(&backend) as Arc<dyn RagBackend>);

    let answer = exchange
        .ask("hello?", &SessionToken::from("t1"))
        .await
        .expect("fallback answer");

    assert!(answer.fallback);
    assert_eq!(answer.text, FALLBACK_ANSWER);
    assert!(answer.sources.is_empty());
    assert_eq!(backend.queries.lock().await.len(), 1, "no retries");
}
