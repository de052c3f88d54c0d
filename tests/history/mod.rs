use fetchmock::{
    common::data::normalize_request,
    history::{CallHistory, CallLog, PendingTask, TaskError},
    MatcherSpec, MockConfig, NormalizedRequest, RequestOptions, Route, RouteConfig,
};
use futures_timer::Delay;
use serde_json::json;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

fn request(url: &str, options: RequestOptions) -> NormalizedRequest {
    normalize_request(url, &options, &MockConfig::default()).unwrap()
}

fn named_route(name: &str, pattern: &str) -> Route {
    Route::new(RouteConfig::new().name(name).matcher(pattern).response(200)).unwrap()
}

/// Records three matched and two unmatched calls, interleaved.
fn populated_history() -> (CallHistory, Route, Route) {
    let a = named_route("route-a", "begin:http://a.com");
    let b = named_route("route-b", "begin:http://b.com");
    let history = CallHistory::default();

    history.record_call(CallLog::new(
        request("http://a.com/1", RequestOptions::new()),
        Some(a.handle()),
    ));
    history.record_call(CallLog::new(
        request("http://c.com/1", RequestOptions::new()),
        None,
    ));
    history.record_call(CallLog::new(
        request(
            "http://b.com/1",
            RequestOptions::new()
                .method("POST")
                .json_body(&json!({ "id": 1, "tags": ["x", "y"] })),
        ),
        Some(b.handle()),
    ));
    history.record_call(CallLog::new(
        request("http://a.com/2", RequestOptions::new().method("POST")),
        Some(a.handle()),
    ));
    history.record_call(CallLog::new(
        request("http://c.com/2", RequestOptions::new()),
        None,
    ));

    (history, a, b)
}

fn urls(calls: &[Arc<CallLog>]) -> Vec<&str> {
    calls.iter().map(|c| c.url()).collect()
}

#[test]
fn all_calls_in_recording_order() {
    let (history, _, _) = populated_history();
    let calls = history.calls(None::<&str>, None).unwrap();
    assert_eq!(
        urls(&calls),
        vec![
            "http://a.com/1",
            "http://c.com/1",
            "http://b.com/1",
            "http://a.com/2",
            "http://c.com/2"
        ]
    );
}

#[test]
fn matched_and_unmatched_partition_the_history() {
    let (history, _, _) = populated_history();

    let matched = history.calls(true, None).unwrap();
    let unmatched = history.calls("unmatched", None).unwrap();
    let all = history.calls(None::<&str>, None).unwrap();

    assert_eq!(matched.len() + unmatched.len(), all.len());
    assert!(matched.iter().all(|c| c.is_matched()));
    assert!(unmatched.iter().all(|c| !c.is_matched()));
    assert!(matched
        .iter()
        .all(|m| !unmatched.iter().any(|u| Arc::ptr_eq(m, u))));
    assert_eq!(urls(&history.calls("matched", None).unwrap()), urls(&matched));
}

#[test]
fn calls_by_route_name() {
    let (history, _, _) = populated_history();
    let calls = history.calls("route-a", None).unwrap();
    assert_eq!(urls(&calls), vec!["http://a.com/1", "http://a.com/2"]);
    assert!(calls.iter().all(|c| c.route().unwrap().name() == Some("route-a")));
}

#[test]
fn calls_by_url_pattern_with_options() {
    let (history, _, _) = populated_history();

    let calls = history.calls("begin:http://a.com", None).unwrap();
    assert_eq!(calls.len(), 2);

    let calls = history
        .calls(
            "begin:http://a.com",
            Some(&MatcherSpec::new().method("POST")),
        )
        .unwrap();
    assert_eq!(urls(&calls), vec!["http://a.com/2"]);
}

#[test]
fn calls_by_partial_body() {
    let (history, _, _) = populated_history();
    let filter = MatcherSpec::new()
        .method("POST")
        .body(json!({ "tags": ["x"] }))
        .match_partial_body(true);

    let calls = history.calls(filter, None).unwrap();
    assert_eq!(urls(&calls), vec!["http://b.com/1"]);
}

#[test]
fn options_are_ignored_for_status_and_name_filters() {
    let (history, _, _) = populated_history();
    let options = MatcherSpec::new().method("PATCH");

    assert_eq!(history.calls(false, Some(&options)).unwrap().len(), 2);
    assert_eq!(history.calls("route-b", Some(&options)).unwrap().len(), 1);
}

#[test]
fn called_and_last_call() {
    let (history, _, _) = populated_history();

    assert!(history.called("route-b", None).unwrap());
    assert!(!history.called("route-z", None).unwrap());

    let last = history.last_call("route-a", None).unwrap().unwrap();
    assert_eq!(last.url(), "http://a.com/2");
    assert_eq!(last.options().method.as_deref(), Some("POST"));

    assert!(history.last_call("end:/404", None).unwrap().is_none());
}

#[test]
fn done_checks_every_route() {
    let (history, a, b) = populated_history();
    let c = named_route("route-c", "begin:http://c.com");
    let d = Route::new(
        RouteConfig::new()
            .name("route-d")
            .matcher("*")
            .response(200)
            .repeat(3),
    )
    .unwrap();

    let routes = vec![a, b, c, d];
    let unsatisfied = history.unsatisfied(&routes, None);
    let messages: Vec<String> = unsatisfied.iter().map(|u| u.to_string()).collect();
    assert_eq!(
        messages,
        vec!["route-c not called".to_string(), "route-d not called".to_string()]
    );

    assert!(!history.done(&routes, None));
    assert!(history.done(&routes, Some(&["route-a", "route-b"])));
    assert!(!history.done(&routes, Some(&["route-a", "route-c"])));
}

#[test]
fn clear_forgets_every_call() {
    let (history, _, _) = populated_history();
    assert_eq!(history.len(), 5);
    history.clear();
    assert!(history.is_empty());
    assert!(history.last_call(None::<&str>, None).unwrap().is_none());
}

/// Adds a pending task to a new call log that, once it runs, adds a second delayed task.
fn record_with_nested_tasks(history: &CallHistory) -> Arc<AtomicBool> {
    let log = history.record_call(CallLog::new(
        request("http://a.com/", RequestOptions::new()),
        None,
    ));
    let second_done = Arc::new(AtomicBool::new(false));

    let (outer_log, outer_flag) = (log.clone(), second_done.clone());
    log.add_pending(PendingTask::new(async move {
        let flag = outer_flag.clone();
        outer_log.add_pending(PendingTask::new(async move {
            Delay::new(Duration::from_millis(20)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        }));
        Ok(())
    }));

    second_done
}

#[tokio::test]
async fn flush_waits_for_one_round_of_tasks() {
    let _ = env_logger::try_init();
    let history = CallHistory::default();
    let second_done = record_with_nested_tasks(&history);

    history.flush(false).await.unwrap();

    let log = history.last_call(None::<&str>, None).unwrap().unwrap();
    assert_eq!(log.pending_count(), 2);
    assert!(!second_done.load(Ordering::SeqCst));
}

#[tokio::test]
async fn flush_with_response_bodies_waits_for_a_second_round() {
    let _ = env_logger::try_init();
    let history = CallHistory::default();
    let second_done = record_with_nested_tasks(&history);

    history.flush(true).await.unwrap();

    assert!(second_done.load(Ordering::SeqCst));
}

#[tokio::test]
async fn flush_propagates_task_failures() {
    let history = CallHistory::default();
    let log = history.record_call(CallLog::new(
        request("http://a.com/", RequestOptions::new()),
        None,
    ));
    log.add_pending(PendingTask::new(async { Ok(()) }));
    log.add_pending(PendingTask::new(async {
        Err(TaskError::Failed("body stream broken".to_string()))
    }));

    let result = history.flush(false).await;
    assert_eq!(
        result,
        Err(TaskError::Failed("body stream broken".to_string()))
    );
}

#[test]
fn flush_without_calls_completes_immediately() {
    let history = CallHistory::default();
    assert!(history.flush_blocking(true).is_ok());
}
