//! Request pipeline behaviour, exercised in-process through the router.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};

use route_dispatcher::observability::LogLevel;
use route_dispatcher::routing::HandlerMethod;
use route_dispatcher::store::{Document, MemoryStore};
use route_dispatcher::{
    action, HttpMethod, Payload, Reply, RequestContext, Resource, Route, RouteError,
    RouteHandler, Routes,
};

mod common;
use common::{app, bearer, get, json as json_request, send, state, token, LogCapture};

/// An action that counts its calls and replies with `reply`.
fn counted(calls: &Arc<AtomicUsize>, reply: Value) -> HandlerMethod {
    let calls = calls.clone();
    action(move |_, _, _| {
        let calls = calls.clone();
        let reply = reply.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, RouteError>(reply)
        }
    })
}

fn person_schema() -> HashMap<HttpMethod, Value> {
    HashMap::from([(
        HttpMethod::Post,
        json!({
            "type": "object",
            "required": ["name"],
            "properties": { "name": { "type": "string" } }
        }),
    )])
}

async fn explode(_: RequestContext, _: Payload, _: Option<Resource>) -> Result<Value, RouteError> {
    panic!("kaboom")
}

async fn record_and_misreport(
    _: RequestContext,
    payload: Payload,
    resource: Option<Resource>,
) -> Result<Value, RouteError> {
    if let Some(collection) = resource {
        collection.insert(payload).await?;
    }
    Ok(json!({ "unexpected": true }))
}

#[tokio::test]
async fn test_unprotected_method_skips_authorization() {
    let calls = Arc::new(AtomicUsize::new(0));
    let routes = Routes::new().add(
        Route::new(
            "/auth/skip",
            RouteHandler::new()
                .get(counted(&calls, json!({ "ok": true })))
                .post(counted(&calls, json!({ "ok": true }))),
        )
        .require(HttpMethod::Post, ["admin"]),
    );
    let router = app(routes, state(false, None));

    let response = send(&router, bearer(get("/auth/skip"), "not-a-token")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let response = send(&router, json_request("POST", "/auth/skip", &json!({}))).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_role_check_blocks_action_and_resource() {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(MemoryStore::default());
    let routes = Routes::new().add(
        Route::new(
            "/auth/admin",
            RouteHandler::new().get(counted(&calls, json!({ "secret": 42 }))),
        )
        .collection("vault")
        .require(HttpMethod::Get, ["admin"]),
    );
    let router = app(routes, state(false, Some(store.clone())));

    let missing = send(&router, get("/auth/admin")).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);

    let forbidden = send(&router, bearer(get("/auth/admin"), &token("bob", &["user"]))).await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
    assert!(forbidden.body["message"].as_str().unwrap().contains("admin"));

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.stats().acquired(), 0);

    let allowed = send(&router, bearer(get("/auth/admin"), &token("alice", &["admin"]))).await;
    assert_eq!(allowed.status, StatusCode::OK);
    assert_eq!(allowed.body, json!({ "secret": 42 }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_identity_reaches_the_action() {
    let routes = Routes::new().add(
        Route::new(
            "/auth/whoami",
            RouteHandler::new().get(action(|ctx: RequestContext, _, _| async move {
                let subject = ctx.identity.map(|i| i.subject);
                Ok::<_, RouteError>(json!({ "subject": subject }))
            })),
        )
        .require(HttpMethod::Get, ["reader"]),
    );
    let router = app(routes, state(false, None));

    let response = send(&router, bearer(get("/auth/whoami"), &token("carol", &["reader"]))).await;
    assert_eq!(response.body, json!({ "subject": "carol" }));
}

#[tokio::test]
async fn test_missing_required_field_is_rejected_before_action() {
    let calls = Arc::new(AtomicUsize::new(0));
    let routes = Routes::new().add(
        Route::new(
            "/schema/person",
            RouteHandler::new().post(counted(&calls, json!({ "created": true }))),
        )
        .request_schema(person_schema()),
    );
    let router = app(routes, state(false, None));

    let response = send(&router, json_request("POST", "/schema/person", &json!({ "age": 5 }))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let message = response.body["message"].as_str().unwrap();
    assert!(message.starts_with("Request schema validation error on URL [/schema/person]"));
    assert!(message.contains("name"));
    assert!(response.body["data"].get("schema").is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let response = send(&router, json_request("POST", "/schema/person", &json!({ "name": "Ada" }))).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_schema_mismatch_reports_failing_field() {
    let routes = Routes::new().add(
        Route::new(
            "/schema/field",
            RouteHandler::new().post(counted(&Arc::new(AtomicUsize::new(0)), json!({}))),
        )
        .request_schema(person_schema()),
    );

    let router = app(routes.clone(), state(false, None));
    let response = send(&router, json_request("POST", "/schema/field", &json!({ "name": 7 }))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["data"]["field"], "name");
    assert!(response.body["data"].get("schema").is_none());

    let router = app(routes, state(true, None));
    let response = send(&router, json_request("POST", "/schema/field", &json!({ "name": 7 }))).await;
    assert_eq!(response.body["data"]["schema"]["required"], json!(["name"]));
}

#[tokio::test]
async fn test_schema_applies_only_to_its_method() {
    let calls = Arc::new(AtomicUsize::new(0));
    let routes = Routes::new().add(
        Route::new(
            "/schema/per-method",
            RouteHandler::new()
                .get(counted(&calls, json!({})))
                .post(counted(&calls, json!({}))),
        )
        .request_schema(person_schema()),
    );
    let router = app(routes, state(false, None));

    let response = send(&router, get("/schema/per-method?age=5")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_plain_value_is_coerced_with_one_warning() {
    let logs = LogCapture::default();
    let _guard = logs.install();

    let calls = Arc::new(AtomicUsize::new(0));
    let routes = Routes::new().add(Route::new(
        "/coerce/value",
        RouteHandler::new().get(counted(&calls, json!({ "id": 1 }))),
    ));
    let router = app(routes, state(false, None));

    let response = send(&router, get("/coerce/value")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers[header::CONTENT_TYPE], "application/json");
    assert_eq!(response.body, json!({ "id": 1 }));
    assert_eq!(logs.count("response was forced to a Response"), 1);
    assert_eq!(logs.count("WARN"), 1);
}

#[tokio::test]
async fn test_ready_response_is_not_coerced() {
    let logs = LogCapture::default();
    let _guard = logs.install();

    let routes = Routes::new().add(Route::new(
        "/coerce/response",
        RouteHandler::new().post(action(|_, payload: Payload, _| async move {
            Ok::<_, RouteError>(Reply::with_status(StatusCode::CREATED, json!(payload)))
        })),
    ));
    let router = app(routes, state(false, None));

    let response = send(&router, json_request("POST", "/coerce/response", &json!({ "a": 1 }))).await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body, json!({ "a": 1 }));
    assert_eq!(logs.count("response was forced to a Response"), 0);
}

#[tokio::test]
async fn test_response_schema_mismatch_keeps_side_effects() {
    let store = Arc::new(MemoryStore::default());
    let routes = Routes::new().add(
        Route::new(
            "/response/contract",
            RouteHandler::new().post(action(record_and_misreport)),
        )
        .collection("events")
        .response_schema(HashMap::from([(
            HttpMethod::Post,
            json!({ "type": "object", "required": ["id"] }),
        )])),
    );
    let router = app(routes, state(false, Some(store.clone())));

    let response = send(
        &router,
        json_request("POST", "/response/contract", &json!({ "kind": "signup" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["message"]
        .as_str()
        .unwrap()
        .starts_with("Response schema validation error on URL [/response/contract]"));

    use route_dispatcher::store::Collection;
    let events = store.collection("events").unwrap();
    assert_eq!(events.count().await.unwrap(), 1);
    assert_eq!(store.stats().outstanding(), 0);
}

#[tokio::test]
async fn test_non_object_response_skips_response_schema() {
    let routes = Routes::new().add(
        Route::new(
            "/response/list",
            RouteHandler::new().get(counted(&Arc::new(AtomicUsize::new(0)), json!([1, 2]))),
        )
        .response_schema(HashMap::from([(
            HttpMethod::Get,
            json!({ "type": "object", "required": ["id"] }),
        )])),
    );
    let router = app(routes, state(false, None));

    let response = send(&router, get("/response/list")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!([1, 2]));
}

/// Every exit path through a resource-bound route, with the number of
/// leases the request should take.
#[tokio::test]
async fn test_resource_lease_symmetry_per_outcome() {
    let store = Arc::new(MemoryStore::default());
    let routes = Routes::new()
        .add(
            Route::new(
                "/lease/ok",
                RouteHandler::new()
                    .get(counted(&Arc::new(AtomicUsize::new(0)), json!({ "ok": true }))),
            )
            .collection("ledger"),
        )
        .add(
            Route::new(
                "/lease/action-error",
                RouteHandler::new().get(action(|_, _, _| async {
                    Err::<Value, _>(RouteError::bad_request("refused"))
                })),
            )
            .collection("ledger"),
        )
        .add(
            Route::new("/lease/panic", RouteHandler::new().get(action(explode)))
                .collection("ledger"),
        )
        .add(
            Route::new(
                "/lease/response-schema",
                RouteHandler::new().post(action(record_and_misreport)),
            )
            .collection("ledger")
            .response_schema(HashMap::from([(
                HttpMethod::Post,
                json!({ "required": ["id"] }),
            )])),
        )
        .add(
            Route::new(
                "/lease/request-schema",
                RouteHandler::new().post(counted(&Arc::new(AtomicUsize::new(0)), json!({}))),
            )
            .collection("ledger")
            .request_schema(person_schema()),
        )
        .add(
            Route::new(
                "/lease/auth",
                RouteHandler::new().get(counted(&Arc::new(AtomicUsize::new(0)), json!({}))),
            )
            .collection("ledger")
            .require(HttpMethod::Get, ["admin"]),
        );
    let router = app(routes, state(false, Some(store.clone())));

    let malformed = Request::builder()
        .method("POST")
        .uri("/lease/request-schema")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{broken"))
        .unwrap();

    let cases: Vec<(Request<Body>, StatusCode, usize)> = vec![
        (get("/lease/ok"), StatusCode::OK, 1),
        (get("/lease/action-error"), StatusCode::BAD_REQUEST, 1),
        (get("/lease/panic"), StatusCode::INTERNAL_SERVER_ERROR, 1),
        (
            json_request("POST", "/lease/response-schema", &json!({ "n": 1 })),
            StatusCode::BAD_REQUEST,
            1,
        ),
        (
            json_request("POST", "/lease/request-schema", &json!({ "age": 1 })),
            StatusCode::BAD_REQUEST,
            0,
        ),
        (malformed, StatusCode::INTERNAL_SERVER_ERROR, 0),
        (get("/lease/auth"), StatusCode::UNAUTHORIZED, 0),
    ];

    for (request, status, leases) in cases {
        let uri = request.uri().to_string();
        let before = store.stats().acquired();
        let response = send(&router, request).await;
        assert_eq!(response.status, status, "status for {uri}");
        assert_eq!(store.stats().acquired() - before, leases, "leases for {uri}");
        assert_eq!(store.stats().outstanding(), 0, "outstanding after {uri}");
    }
    assert_eq!(store.stats().acquired(), store.stats().released());
}

#[tokio::test]
async fn test_panicking_action_is_unknown_failure() {
    let routes = Routes::new().add(Route::new("/panic/plain", RouteHandler::new().get(action(explode))));
    let router = app(routes, state(false, None));

    let response = send(&router, get("/panic/plain")).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body, json!({ "message": "Action panicked: kaboom" }));
}

#[tokio::test]
async fn test_unavailable_store_fails_before_action() {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(MemoryStore::default());
    store.set_available(false);

    let routes = Routes::new().add(
        Route::new(
            "/store/down",
            RouteHandler::new().get(counted(&calls, json!({}))),
        )
        .collection("ledger"),
    );
    let router = app(routes, state(false, Some(store.clone())));

    let response = send(&router, get("/store/down")).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.body["message"].as_str().unwrap().contains("ledger"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.stats().acquired(), 0);
}

#[tokio::test]
async fn test_debug_mode_controls_error_detail() {
    let routes = Routes::new().add(Route::new(
        "/debug/detail",
        RouteHandler::new().post(action(|_, _, _| async {
            Err::<Value, _>(RouteError::bad_request("no thanks"))
        })),
    ));
    let request = || {
        let mut request = json_request("POST", "/debug/detail", &json!({ "x": 1 }));
        request
            .headers_mut()
            .insert("x-trace-me", "yes".parse().unwrap());
        request
    };

    let quiet = app(routes.clone(), state(false, None));
    let response = send(&quiet, request()).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body, json!({ "message": "no thanks" }));

    let verbose = app(routes, state(true, None));
    let response = send(&verbose, request()).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["message"], "no thanks");
    assert_eq!(response.body["data"]["request_data"], json!({ "x": 1 }));
    let headers = response.body["data"]["request_headers"].as_array().unwrap();
    assert!(headers.contains(&json!(["x-trace-me", "yes"])));
    assert!(response.body["stack_trace"].as_str().is_some_and(|t| !t.is_empty()));
}

#[tokio::test]
async fn test_debug_mode_on_parse_failure_has_null_payload() {
    let routes = Routes::new().add(Route::new(
        "/debug/parse",
        RouteHandler::new().post(counted(&Arc::new(AtomicUsize::new(0)), json!({}))),
    ));
    let router = app(routes, state(true, None));

    let request = Request::builder()
        .method("POST")
        .uri("/debug/parse")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("[1, 2"))
        .unwrap();
    let response = send(&router, request).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body["data"]["request_data"], Value::Null);
    assert!(response.body.get("stack_trace").is_some());
}

#[tokio::test]
async fn test_payload_merges_query_and_body_and_path() {
    let routes = Routes::new().add(Route::new(
        "/merge/{id}",
        RouteHandler::new().put(action(|ctx: RequestContext, payload: Payload, _| async move {
            Ok::<_, RouteError>(json!({
                "id": ctx.path_param("id"),
                "payload": payload,
            }))
        })),
    ));
    let router = app(routes, state(false, None));

    let response = send(
        &router,
        json_request("PUT", "/merge/abc?name=query&page=2", &json!({ "name": "body" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.body,
        json!({ "id": "abc", "payload": { "name": "body", "page": "2" } })
    );
}

#[tokio::test]
async fn test_undecodable_path_param_is_bad_request() {
    let calls = Arc::new(AtomicUsize::new(0));
    let routes = Routes::new().add(Route::new(
        "/path/{id}",
        RouteHandler::new().get(counted(&calls, json!({ "ok": true }))),
    ));
    let router = app(routes, state(false, None));

    let response = send(&router, get("/path/%FF%FE")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["data"]["url"], "/path/{id}");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let response = send(&router, get("/path/plain")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_resource_is_lent_to_action() {
    let store = Arc::new(MemoryStore::default());
    let routes = Routes::new().add(
        Route::new(
            "/resource/lent",
            RouteHandler::new().post(action(|_, payload: Payload, resource: Option<Resource>| async move {
                let collection = route_dispatcher::routing::ensure_resource("/resource/lent", resource.as_ref())?;
                let id = collection.insert(payload).await?;
                let stored = collection.find(&Document::new()).await?;
                Ok::<_, RouteError>(json!({ "id": id, "count": stored.len(), "name": collection.name() }))
            })),
        )
        .collection("lent"),
    );
    let router = app(routes, state(false, Some(store.clone())));

    let response = send(&router, json_request("POST", "/resource/lent", &json!({ "v": 1 }))).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["count"], 1);
    assert_eq!(response.body["name"], "lent");
    assert!(response.body["id"]["$oid"].is_string());
}

#[tokio::test]
async fn test_route_log_level_gates_info_lines() {
    let logs = LogCapture::default();
    let _guard = logs.install();

    let routes = Routes::new()
        .add(
            Route::new(
                "/logs/info",
                RouteHandler::new().get(counted(&Arc::new(AtomicUsize::new(0)), json!({}))),
            )
            .log_level(LogLevel::Info),
        )
        .add(Route::new(
            "/logs/quiet",
            RouteHandler::new().get(counted(&Arc::new(AtomicUsize::new(0)), json!({}))),
        ));
    let router = app(routes, state(false, None));

    send(&router, get("/logs/info")).await;
    send(&router, get("/logs/quiet")).await;

    let received: Vec<String> = logs
        .contents()
        .lines()
        .filter(|l| l.contains("* Received HTTP GET request *"))
        .map(str::to_string)
        .collect();
    assert_eq!(received.len(), 1);
    assert!(received[0].contains("/logs/info"));
    assert_eq!(logs.count("* Sending HTTP GET response: (200) *"), 1);
}

#[tokio::test]
async fn test_unknown_url_and_unbound_method() {
    let routes = Routes::new().add(Route::new(
        "/bound/get-only",
        RouteHandler::new().get(counted(&Arc::new(AtomicUsize::new(0)), json!({}))),
    ));
    let router = app(routes, state(false, None));

    let response = send(&router, get("/nowhere")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.body["message"].as_str().unwrap().contains("/nowhere"));

    let response = send(&router, json_request("DELETE", "/bound/get-only", &json!({}))).await;
    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
}
