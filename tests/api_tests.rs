
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use fibpool::api::{router, validate_submission, ApiState, SubmitForm, ValidationError};
use fibpool::config::{ApiConfig, PoolConfig};
use fibpool::WorkerPool;
use test_harness::{collect_outcomes, RecordingKernel};

const HOUR: Duration = Duration::from_secs(3600);

/// Router over a pool that has not been started, so queued jobs stay put.
fn idle_app(config: PoolConfig, api: ApiConfig) -> (Router, Arc<WorkerPool>) {
    let pool = Arc::new(WorkerPool::new(config, Arc::new(RecordingKernel::new())));
    let state = ApiState {
        pool: Arc::clone(&pool),
        config: api,
    };
    (router(state), pool)
}

fn submit(body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/fib")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn form(delay: Option<&str>, value: Option<&str>, name: Option<&str>) -> SubmitForm {
    SubmitForm {
        delay: delay.map(String::from),
        value: value.map(String::from),
        name: name.map(String::from),
    }
}

#[test]
fn test_validate_submission_accepts_valid_form() {
    let job = validate_submission(&form(Some("1.5s"), Some("30"), Some(" fib ")), 93, HOUR).unwrap();
    assert_eq!(job.delay(), Duration::from_millis(1500));
    assert_eq!(job.input(), 30);
    assert_eq!(job.name(), "fib");
}

#[test]
fn test_validate_submission_checks_fields_in_order() {
    let invalid = validate_submission(&form(None, None, None), 93, HOUR);
    assert_eq!(invalid.unwrap_err(), ValidationError::InvalidDelay);

    let cases = [
        (form(Some("soon"), Some("1"), Some("a")), ValidationError::InvalidDelay),
        (form(Some("-1s"), Some("1"), Some("a")), ValidationError::InvalidDelay),
        (form(Some("61m"), Some("1"), Some("a")), ValidationError::InvalidDelay),
        (
            form(Some("100000000000000000s"), Some("1"), Some("a")),
            ValidationError::InvalidDelay,
        ),
        (form(Some("1s"), Some("x"), None), ValidationError::InvalidValue),
        (form(Some("1s"), Some("-3"), Some("a")), ValidationError::InvalidValue),
        (form(Some("1s"), Some("94"), Some("a")), ValidationError::InvalidValue),
        (form(Some("1s"), Some("5"), None), ValidationError::InvalidName),
        (form(Some("1s"), Some("5"), Some("   ")), ValidationError::InvalidName),
    ];
    for (form, expected) in cases {
        assert_eq!(validate_submission(&form, 93, HOUR).unwrap_err(), expected);
    }
}

#[tokio::test]
async fn test_submit_job_created() {
    let (app, pool) = idle_app(PoolConfig::new(2, 4), ApiConfig::default());

    let response = app
        .oneshot(submit("delay=100ms&value=12&name=first"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = json_body(response).await;
    let job_id: uuid::Uuid = json["job_id"].as_str().unwrap().parse().unwrap();

    let ledger = pool.ledger();
    let ledger = ledger.read().await;
    let record = ledger.get(&job_id).unwrap();
    assert_eq!(record.name, "first");
    assert_eq!(record.input, 12);
    assert_eq!(record.delay_ms, 100);
}

#[tokio::test]
async fn test_submit_invalid_fields() {
    let (app, pool) = idle_app(PoolConfig::new(2, 4), ApiConfig::default());

    let cases = [
        ("value=1&name=a", "Invalid Delay"),
        ("delay=abc&value=1&name=a", "Invalid Delay"),
        ("delay=1s&value=abc&name=a", "Invalid Value"),
        ("delay=1s&value=100&name=a", "Invalid Value"),
        ("delay=1s&value=5", "Invalid Name"),
        ("delay=1s&value=5&name=", "Invalid Name"),
    ];
    for (body, message) in cases {
        let response = app.clone().oneshot(submit(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(json_body(response).await["error"], message);
    }

    assert!(pool.ledger().read().await.is_empty());
}

#[tokio::test]
async fn test_submit_respects_configured_max_value() {
    let api = ApiConfig {
        max_value: 20,
        ..ApiConfig::default()
    };
    let (app, _pool) = idle_app(PoolConfig::new(1, 4), api);

    let response = app
        .clone()
        .oneshot(submit("delay=0s&value=21&name=big"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.oneshot(submit("delay=0s&value=20&name=ok")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_submit_respects_configured_max_delay() {
    let api = ApiConfig {
        max_delay: Duration::from_secs(10),
        ..ApiConfig::default()
    };
    let (app, _pool) = idle_app(PoolConfig::new(1, 4), api);

    let response = app
        .clone()
        .oneshot(submit("delay=11s&value=1&name=slow"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Invalid Delay");

    let response = app.oneshot(submit("delay=10s&value=1&name=ok")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_submit_wrong_method() {
    let (app, _pool) = idle_app(PoolConfig::new(1, 1), ApiConfig::default());

    let response = app.oneshot(get("/fib")).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_submit_queue_full() {
    let (app, _pool) = idle_app(PoolConfig::new(1, 1), ApiConfig::default());

    let response = app
        .clone()
        .oneshot(submit("delay=0s&value=1&name=a"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.oneshot(submit("delay=0s&value=1&name=b")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["error"], "Job queue is at capacity");
}

#[tokio::test]
async fn test_submit_enqueue_timeout() {
    let api = ApiConfig {
        enqueue_timeout: Some(Duration::from_millis(50)),
        ..ApiConfig::default()
    };
    let (app, _pool) = idle_app(PoolConfig::new(1, 1), api);

    app.clone()
        .oneshot(submit("delay=0s&value=1&name=a"))
        .await
        .unwrap();
    let response = app.oneshot(submit("delay=0s&value=1&name=b")).await.unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_submit_while_shutting_down() {
    let (app, pool) = idle_app(PoolConfig::new(1, 4), ApiConfig::default());
    pool.shutdown(Duration::from_millis(10)).await;

    let response = app.oneshot(submit("delay=0s&value=1&name=a")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_list_and_filter_jobs() {
    let (app, _pool) = idle_app(PoolConfig::new(1, 4), ApiConfig::default());
    for name in ["a", "b"] {
        let body = format!("delay=0s&value=3&name={name}");
        app.clone().oneshot(submit(&body)).await.unwrap();
    }

    let json = json_body(app.clone().oneshot(get("/api/jobs")).await.unwrap()).await;
    let jobs = json.as_array().unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0]["name"], "a");
    assert_eq!(jobs[0]["status"], "queued");
    assert_eq!(jobs[1]["name"], "b");

    let json = json_body(
        app.clone()
            .oneshot(get("/api/jobs?status=queued"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(json.as_array().unwrap().len(), 2);

    let json = json_body(app.oneshot(get("/api/jobs?status=completed")).await.unwrap()).await;
    assert!(json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_get_job() {
    let (app, _pool) = idle_app(PoolConfig::new(1, 4), ApiConfig::default());
    let created = json_body(
        app.clone()
            .oneshot(submit("delay=2s&value=7&name=lookup"))
            .await
            .unwrap(),
    )
    .await;
    let job_id = created["job_id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(get(&format!("/api/jobs/{job_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["id"], job_id.as_str());
    assert_eq!(json["delay_ms"], 2000);

    let missing = uuid::Uuid::new_v4();
    let response = app
        .clone()
        .oneshot(get(&format!("/api/jobs/{missing}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get("/api/jobs/not-a-uuid")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_pool_stats() {
    let (app, _pool) = idle_app(PoolConfig::new(3, 5), ApiConfig::default());
    app.clone()
        .oneshot(submit("delay=0s&value=1&name=a"))
        .await
        .unwrap();

    let response = app.oneshot(get("/api/pool")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["max_workers"], 3);
    assert_eq!(json["live_workers"], 3);
    assert_eq!(json["queued_jobs"], 1);
    assert_eq!(json["queue_capacity"], 5);
    assert_eq!(json["running"], false);
    assert_eq!(json["draining"], false);
}

#[tokio::test]
async fn test_spawn_worker_endpoint() {
    let config = PoolConfig::new(2, 4).with_initial_workers(1);
    let (app, pool) = idle_app(config, ApiConfig::default());

    let response = app
        .clone()
        .oneshot(request(Method::POST, "/api/workers"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(json_body(response).await["worker_id"], 1);
    assert_eq!(pool.worker_ids().await, vec![0, 1]);

    let response = app
        .oneshot(request(Method::POST, "/api/workers"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_worker_endpoint() {
    let pool = Arc::new(WorkerPool::new(
        PoolConfig::new(3, 4),
        Arc::new(RecordingKernel::new()),
    ));
    pool.run().await.unwrap();
    let app = router(ApiState {
        pool: Arc::clone(&pool),
        config: ApiConfig::default(),
    });

    let response = app
        .clone()
        .oneshot(request(Method::DELETE, "/api/workers/0?wait=true"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(pool.worker_ids().await, vec![1, 2]);

    let response = app
        .clone()
        .oneshot(request(Method::DELETE, "/api/workers/1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app
        .clone()
        .oneshot(request(Method::DELETE, "/api/workers/0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The surviving worker still serves submissions.
    let mut outcomes = pool.subscribe();
    let response = app.oneshot(submit("delay=0s&value=9&name=after")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let done = collect_outcomes(&mut outcomes, 1, Duration::from_secs(5)).await;
    assert_eq!(done[0].result, Ok(34));

    pool.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cleanup_finished_jobs_endpoint() {
    let pool = Arc::new(WorkerPool::new(
        PoolConfig::new(1, 4),
        Arc::new(RecordingKernel::new()),
    ));
    pool.run().await.unwrap();
    let app = router(ApiState {
        pool: Arc::clone(&pool),
        config: ApiConfig::default(),
    });
    let mut outcomes = pool.subscribe();

    app.clone()
        .oneshot(submit("delay=0s&value=4&name=quick"))
        .await
        .unwrap();
    collect_outcomes(&mut outcomes, 1, Duration::from_secs(5)).await;
    app.clone()
        .oneshot(submit("delay=5s&value=4&name=slow"))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(request(Method::DELETE, "/api/jobs"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["removed"], 1);

    let json = json_body(app.oneshot(get("/api/jobs")).await.unwrap()).await;
    let jobs = json.as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["name"], "slow");

    pool.shutdown(Duration::from_millis(10)).await;
}
