use bytes::Bytes;
use fetchmock::{
    common::util::Join, session::Error, AbortSignal, FetchMock, MatcherSpec, MockConfig,
    RequestOptions, RouteConfig, RouteResponse,
};
use serde_json::json;
use std::time::{Duration, Instant};

#[tokio::test]
async fn matched_call_is_answered_and_recorded() {
    let _ = env_logger::try_init();
    let fm = FetchMock::default();
    fm.route(
        RouteConfig::new()
            .name("users")
            .matcher(MatcherSpec::from("express:/users/:id").param("id", "7"))
            .response(RouteResponse::new(200).json_body(&json!({ "id": 7 }))),
    )
    .unwrap();

    let response = fm
        .handle("http://a.com/users/7", RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(response.json_body(), Some(json!({ "id": 7 })));

    let log = fm.last_call("users", None).unwrap().unwrap();
    assert!(log.is_matched());
    assert_eq!(log.response(), Some(&response));
    assert_eq!(log.pending_count(), 1);
}

#[tokio::test]
async fn route_stops_matching_after_repeat_calls() {
    let fm = FetchMock::default();
    fm.route(
        RouteConfig::new()
            .name("once")
            .matcher("*")
            .response(201)
            .repeat(1),
    )
    .unwrap();
    fm.route(RouteConfig::new().name("always").matcher("*").response(202))
        .unwrap();

    let first = fm.handle("http://a.com/", RequestOptions::new()).await.unwrap();
    let second = fm.handle("http://a.com/", RequestOptions::new()).await.unwrap();

    assert_eq!(first.status, 201);
    assert_eq!(second.status, 202);
    assert_eq!(fm.calls("once", None).unwrap().len(), 1);
    assert_eq!(fm.calls("always", None).unwrap().len(), 1);
}

#[tokio::test]
async fn fallback_answers_unmatched_calls() {
    let fm = FetchMock::new(MockConfig::builder().warn_on_fallback(true).build());
    fm.route(RouteConfig::new().matcher("begin:http://a.com").response(200))
        .unwrap();
    fm.catch(404);

    let response = fm.handle("http://b.com/", RequestOptions::new()).await.unwrap();

    assert_eq!(response.status, 404);
    let unmatched = fm.calls(false, None).unwrap();
    assert_eq!(unmatched.len(), 1);
    assert!(unmatched[0].route().is_none());
    assert_eq!(unmatched[0].response().map(|r| r.status), Some(404));
}

#[tokio::test]
async fn unmatched_call_without_fallback_fails() {
    let fm = FetchMock::default();
    let result = fm
        .handle("http://b.com/x", RequestOptions::new().method("put"))
        .await;

    match result {
        Err(Error::NoRouteMatched { method, url }) => {
            assert_eq!(method, "PUT");
            assert_eq!(url, "http://b.com/x");
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(fm.called("unmatched", None).unwrap());
}

#[tokio::test]
async fn invalid_method_is_rejected_before_recording() {
    let fm = FetchMock::default();
    fm.catch(200);

    let result = fm
        .handle("http://a.com/", RequestOptions::new().method("NOT A METHOD"))
        .await;

    assert!(matches!(result, Err(Error::Request(_))));
    assert!(fm.history().is_empty());
}

#[tokio::test]
async fn delayed_response_is_awaited_by_flush() {
    let fm = FetchMock::default();
    fm.route(
        RouteConfig::new()
            .name("slow")
            .matcher("*")
            .response(200)
            .delay(Duration::from_millis(50)),
    )
    .unwrap();

    let started = Instant::now();
    let (response, flushed) = tokio::join!(
        fm.handle("http://a.com/", RequestOptions::new()),
        fm.flush(true)
    );

    assert!(response.is_ok());
    assert!(flushed.is_ok());
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(fm.last_call("slow", None).unwrap().unwrap().response().is_some());
}

#[tokio::test]
async fn done_reports_routes_that_were_not_called_enough() {
    let _ = env_logger::try_init();
    let fm = FetchMock::default();
    fm.route(RouteConfig::new().name("a").matcher("end:/a").response(200).repeat(2))
        .unwrap();
    fm.route(RouteConfig::new().name("b").matcher("end:/b").response(200))
        .unwrap();

    fm.handle("http://x.com/a", RequestOptions::new()).await.unwrap();

    let unsatisfied = fm.history().unsatisfied(&fm.routes(), None);
    let messages: Vec<String> = unsatisfied.iter().map(|u| u.to_string()).collect();
    assert_eq!(
        messages,
        vec![
            "a only called 1 times, but 2 expected".to_string(),
            "b not called".to_string()
        ]
    );
    assert!(!fm.done(None));

    fm.handle("http://x.com/a", RequestOptions::new()).await.unwrap();
    assert!(fm.done(Some(&["a"])));
    assert!(!fm.done(None));
}

#[tokio::test]
async fn aborted_call_is_recorded_but_fails() {
    let fm = FetchMock::default();
    fm.route(RouteConfig::new().matcher("*").response(200)).unwrap();

    let signal = AbortSignal::new();
    signal.abort();
    let result = fm
        .handle("http://a.com/", RequestOptions::new().signal(signal))
        .await;

    assert!(matches!(result, Err(Error::Aborted(_))));
    assert_eq!(fm.history().len(), 1);
}

#[tokio::test]
async fn reset_removes_routes_and_history() {
    let fm = FetchMock::default();
    fm.route(RouteConfig::new().name("a").matcher("*").response(200))
        .unwrap();
    fm.handle("http://a.com/", RequestOptions::new()).await.unwrap();

    fm.clear_history();
    assert!(fm.history().is_empty());
    assert_eq!(fm.routes().len(), 1);

    fm.reset();
    assert!(fm.routes().is_empty());
    assert!(fm.handle("http://a.com/", RequestOptions::new()).await.is_err());
}

#[tokio::test]
async fn clearing_history_makes_used_up_routes_available_again() {
    let fm = FetchMock::default();
    fm.route(
        RouteConfig::new()
            .name("once")
            .matcher("*")
            .response(200)
            .repeat(1),
    )
    .unwrap();

    fm.handle("http://a.com/", RequestOptions::new()).await.unwrap();
    assert!(fm.done(None));
    assert!(fm.handle("http://a.com/", RequestOptions::new()).await.is_err());

    fm.clear_history();
    assert!(!fm.done(None));

    let response = fm.handle("http://a.com/", RequestOptions::new()).await.unwrap();
    assert_eq!(response.status, 200);
    assert!(fm.done(None));
    assert_eq!(fm.calls("once", None).unwrap().len(), 1);
}

#[tokio::test]
async fn raw_request_is_answered_and_kept_on_the_call_log() {
    let fm = FetchMock::new(MockConfig::builder().base_url("http://api.test").build());
    fm.route(
        RouteConfig::new()
            .name("create")
            .matcher(
                MatcherSpec::from("http://api.test/items")
                    .method("POST")
                    .header("x-token", "abc")
                    .body(json!({ "name": "x" })),
            )
            .response(RouteResponse::new(201).header("location", "/items/1")),
    )
    .unwrap();

    let raw = http::Request::builder()
        .method("POST")
        .uri("/items")
        .header("X-Token", "abc")
        .body(Bytes::from(json!({ "name": "x" }).to_string()))
        .unwrap();

    let response = fm.handle_request(raw).await.unwrap();
    assert_eq!(response.status(), 201);
    assert_eq!(response.headers()["location"], "/items/1");

    let log = fm.last_call("create", None).unwrap().unwrap();
    assert_eq!(log.url(), "http://api.test/items");
    let raw = log.raw_request().unwrap();
    assert_eq!(raw.method(), http::Method::POST);
    assert_eq!(raw.uri(), "/items");
}

#[test]
fn ledger_order_follows_route_counting_under_concurrency() {
    let fm = FetchMock::default();
    fm.route(
        RouteConfig::new()
            .name("first")
            .matcher("*")
            .response(201)
            .repeat(5),
    )
    .unwrap();
    fm.route(RouteConfig::new().name("rest").matcher("*").response(202))
        .unwrap();

    std::thread::scope(|scope| {
        for i in 0..8 {
            let fm = &fm;
            scope.spawn(move || {
                for j in 0..5 {
                    let url = format!("http://a.com/{}/{}", i, j);
                    fm.handle(&url, RequestOptions::new()).join().unwrap();
                }
            });
        }
    });

    let names: Vec<String> = fm
        .calls(None::<&str>, None)
        .unwrap()
        .iter()
        .map(|c| c.route().unwrap().to_string())
        .collect();

    assert_eq!(names.len(), 40);
    assert!(names[..5].iter().all(|n| n == "first"));
    assert!(names[5..].iter().all(|n| n == "rest"));
}

#[tokio::test]
async fn aborted_call_does_not_wait_for_delay() {
    let fm = FetchMock::default();
    fm.route(
        RouteConfig::new()
            .matcher("*")
            .response(200)
            .delay(Duration::from_secs(5)),
    )
    .unwrap();

    let signal = AbortSignal::new();
    signal.abort();

    let started = Instant::now();
    let result = fm
        .handle("http://a.com/", RequestOptions::new().signal(signal))
        .await;

    assert!(matches!(result, Err(Error::Aborted(_))));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(fm.history().len(), 1);
    assert!(fm.history().last_call(None::<&str>, None).unwrap().unwrap().response().is_none());
}
