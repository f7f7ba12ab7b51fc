mod support;

use std::{sync::Arc, time::Duration};

use messenger_core::{ErrorCategory, ThreadInfo, TransportError};
use serde_json::{Value, json};
use tokio::time::timeout;

use support::{ScriptedPort, Step, USER_ID, form_value, session};

const THREAD_LIST_PATH: &str = "/ajax/mercury/threadlist_info.php";

fn thread_list_body(threads: &[(&str, u64)]) -> Vec<u8> {
    let threads: Vec<Value> = threads
        .iter()
        .map(|(fbid, ts)| {
            json!({
                "thread_id": format!("t.{fbid}"),
                "thread_fbid": format!("fbid:{fbid}"),
                "participants": [format!("fbid:{USER_ID}"), "fbid:7"],
                "timestamp": ts
            })
        })
        .collect();
    let body = json!({
        "payload": {
            "threads": threads,
            "participants": [{"id": "fbid:7", "fbid": "fbid:7", "name": "Seven", "short_name": null}]
        }
    });
    format!("for (;;);{body}").into_bytes()
}

fn fbids(threads: &[ThreadInfo]) -> Vec<&str> {
    threads
        .iter()
        .map(|thread| thread.thread_fbid.as_str())
        .collect()
}

#[tokio::test]
async fn reads_one_range_of_the_inbox() {
    let port = Arc::new(ScriptedPort::default());
    port.push_thread_list(Step::body(thread_list_body(&[("30", 300), ("20", 200)])));
    let session = session(Arc::clone(&port));

    let list = timeout(Duration::from_secs(2), session.threads(5, 2))
        .await
        .expect("thread list timeout")
        .expect("thread list");
    assert_eq!(fbids(&list.threads), vec!["30", "20"]);
    assert_eq!(list.threads[0].participants, vec![USER_ID.to_owned(), "7".to_owned()]);
    let seven = list.participant("7").expect("participant");
    assert_eq!(seven.name, "Seven");
    assert_eq!(seven.short_name, "");

    let forms = port.posts_to(THREAD_LIST_PATH);
    assert_eq!(forms.len(), 1);
    assert_eq!(form_value(&forms[0], "inbox[offset]").as_deref(), Some("5"));
    assert_eq!(form_value(&forms[0], "inbox[limit]").as_deref(), Some("2"));
    assert_eq!(form_value(&forms[0], "inbox[filter]").as_deref(), Some(""));
    assert_eq!(form_value(&forms[0], "__user").as_deref(), Some(USER_ID));
}

#[tokio::test]
async fn thread_log_pages_by_offset_without_trimming() {
    let port = Arc::new(ScriptedPort::default());
    port.push_thread_list(Step::body(thread_list_body(&[("40", 400), ("30", 300)])));
    port.push_thread_list(Step::body(thread_list_body(&[("20", 200), ("10", 100)])));
    port.push_thread_list(Step::body(thread_list_body(&[])));
    let session = session(Arc::clone(&port));

    let log = session.thread_log(2);
    let mut newest_first = Vec::new();
    while let Some(thread) = timeout(Duration::from_secs(2), log.next())
        .await
        .expect("thread log should not stall")
    {
        newest_first.push(thread);
    }
    assert_eq!(fbids(&newest_first), vec!["40", "30", "20", "10"]);
    assert!(log.error().is_none());

    let offsets: Vec<String> = port
        .posts_to(THREAD_LIST_PATH)
        .iter()
        .map(|form| form_value(form, "inbox[offset]").expect("offset field"))
        .collect();
    assert_eq!(offsets, vec!["0", "2", "4"]);
}

#[tokio::test]
async fn thread_list_failure_is_surfaced() {
    let port = Arc::new(ScriptedPort::default());
    port.push_thread_list(Step::fail(TransportError::Status { status: 401 }));
    let session = session(Arc::clone(&port));

    let err = timeout(Duration::from_secs(2), session.threads(0, 20))
        .await
        .expect("thread list timeout")
        .expect_err("unauthorized");
    assert_eq!(err.category, ErrorCategory::Auth);
}

#[tokio::test]
async fn profile_picture_requests_one_small_image() {
    let port = Arc::new(ScriptedPort::default());
    port.push_image_source(Step::body(
        &br#"for (;;);{"payload":[{"uri":"https://cdn.example/p50x50/7.jpg"}]}"#[..],
    ));
    let session = session(Arc::clone(&port));

    let url = timeout(Duration::from_secs(2), session.profile_picture("7"))
        .await
        .expect("profile picture timeout")
        .expect("profile picture");
    assert_eq!(url.as_str(), "https://cdn.example/p50x50/7.jpg");

    let forms = port.posts_to("/ajax/image_source.php");
    assert_eq!(forms.len(), 1);
    assert_eq!(form_value(&forms[0], "requests[0][fbid]").as_deref(), Some("7"));
    assert_eq!(
        form_value(&forms[0], "requests[0][type]").as_deref(),
        Some("profile_picture")
    );
    assert_eq!(form_value(&forms[0], "requests[0][width]").as_deref(), Some("50"));
}
