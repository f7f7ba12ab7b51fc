mod support;

use std::{sync::Arc, time::Duration};

use messenger_core::{Action, ErrorCategory, TransportError};
use serde_json::Value;
use tokio::time::timeout;

use support::{ScriptedPort, Step, session};

fn action_page(nodes: &[(&str, u64)]) -> Vec<u8> {
    let nodes: Vec<Value> = nodes
        .iter()
        .map(|(id, ts)| {
            serde_json::json!({
                "__typename": "UserMessage",
                "message_id": id,
                "timestamp_precise": ts.to_string(),
                "message_sender": {"id": "7"},
                "message": {"text": format!("body of {id}")}
            })
        })
        .collect();
    let body = serde_json::json!({
        "o0": {"data": {"message_thread": {"messages": {"nodes": nodes}}}}
    });
    format!("for (;;);{body}\n{{\"successful_results\":1}}").into_bytes()
}

fn ids(actions: &[Action]) -> Vec<&str> {
    actions.iter().map(Action::message_id).collect()
}

fn sent_before(port: &ScriptedPort) -> Vec<Value> {
    port.posts
        .lock()
        .expect("posts")
        .iter()
        .map(|(_, form)| {
            let queries = form
                .iter()
                .find(|(key, _)| key == "queries")
                .map(|(_, value)| value.as_str())
                .expect("queries field");
            let queries: Value = serde_json::from_str(queries).expect("queries json");
            queries["o0"]["query_params"]["before"].clone()
        })
        .collect()
}

#[tokio::test]
async fn pages_backwards_without_duplicates() {
    let port = Arc::new(ScriptedPort::default());
    port.push_graphql(Step::body(action_page(&[("b", 200), ("c", 300)])));
    port.push_graphql(Step::body(action_page(&[("a", 100), ("b", 200)])));
    port.push_graphql(Step::body(action_page(&[])));
    let session = session(Arc::clone(&port));

    let log = session.action_log_with_page_size("888", 2);
    let mut newest_first = Vec::new();
    while let Some(action) = timeout(Duration::from_secs(2), log.next())
        .await
        .expect("paginator should not stall")
    {
        newest_first.push(action);
    }

    assert_eq!(ids(&newest_first), vec!["c", "b", "a"]);
    assert!(log.error().is_none());
    match &newest_first[0] {
        Action::Message(message) => {
            assert_eq!(message.body, "body of c");
            assert_eq!(message.header.author_id, "7");
        }
        other => panic!("unexpected action: {other:?}"),
    }

    assert_eq!(
        sent_before(&port),
        vec![Value::Null, Value::from(200_u64), Value::from(100_u64)]
    );
    let posts = port.posts.lock().expect("posts");
    let (url, form) = &posts[0];
    assert_eq!(url.as_str(), "https://www.messenger.com/api/graphqlbatch");
    assert!(form.iter().any(|(key, value)| key == "fb_dtsg" && value == "dtsg-token"));
}

#[tokio::test]
async fn collects_chronologically() {
    let port = Arc::new(ScriptedPort::default());
    port.push_graphql(Step::body(action_page(&[("b", 200), ("c", 300)])));
    port.push_graphql(Step::body(action_page(&[("a", 100), ("b", 200)])));
    port.push_graphql(Step::body(action_page(&[("a", 100)])));
    let session = session(Arc::clone(&port));

    let log = session.action_log_with_page_size("888", 2);
    let actions = timeout(Duration::from_secs(2), log.collect_oldest_first())
        .await
        .expect("collection should finish");
    assert_eq!(ids(&actions), vec!["a", "b", "c"]);
    assert_eq!(port.posts.lock().expect("posts").len(), 3);
}

#[tokio::test]
async fn transport_failure_stops_the_log_with_an_error() {
    let port = Arc::new(ScriptedPort::default());
    port.push_graphql(Step::body(action_page(&[("b", 200), ("c", 300)])));
    port.push_graphql(Step::fail(TransportError::Status { status: 429 }));
    let session = session(Arc::clone(&port));

    let log = session.action_log_with_page_size("888", 2);
    let actions = timeout(Duration::from_secs(2), log.collect_oldest_first())
        .await
        .expect("collection should finish");
    assert_eq!(ids(&actions), vec!["b", "c"]);

    let err = log.error().expect("fetch error should be recorded");
    assert_eq!(err.category, ErrorCategory::RateLimited);
    assert_eq!(err.code, "http_status");
}

#[tokio::test]
async fn close_releases_a_blocked_fetch() {
    let port = Arc::new(ScriptedPort::default());
    port.push_graphql(Step::Hang);
    let session = session(Arc::clone(&port));

    let log = session.action_log("888");
    log.close();
    let next = timeout(Duration::from_secs(2), log.next())
        .await
        .expect("closed log should end");
    assert!(next.is_none());
    assert!(log.error().is_none());
}
