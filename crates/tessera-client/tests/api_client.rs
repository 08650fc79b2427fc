//! HTTP client tests against an in-process axum server.

#![allow(clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};

use tessera_client::{
    ApiClient, AssetFetcher, ClientConfig, EventTransport, FetchState, FilterCondition,
    FilterOperator, JobActions, JobKind, JobStatus, ProgressTracker, RegistryLoader, ServerSide,
    SortKey, SseFrame, StreamTarget, TableScope,
};
use tessera_core::{CollectionId, Error, JobId, ProviderId, ViewId};

const TOKEN: &str = "test-token";

#[derive(Clone, Default)]
struct Recorder {
    requests: Arc<Mutex<Vec<Recorded>>>,
}

#[derive(Debug, Clone)]
struct Recorded {
    route: String,
    query: Vec<(String, String)>,
    authorization: Option<String>,
    last_event_id: Option<String>,
    accept: Option<String>,
}

impl Recorder {
    fn record(&self, route: &str, headers: &HeaderMap, query: Vec<(String, String)>) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.requests.lock().expect("requests").push(Recorded {
            route: route.to_string(),
            query,
            authorization: header("authorization"),
            last_event_id: header("last-event-id"),
            accept: header("accept"),
        });
    }

    fn last(&self) -> Recorded {
        self.requests
            .lock()
            .expect("requests")
            .last()
            .cloned()
            .expect("a request was made")
    }
}

fn job_json(id: i64, status: &str, manual: bool) -> Value {
    json!({
        "id": id,
        "status": status,
        "counts": {"queued": null, "running": 1, "finished": 4},
        "message": "Nightly scan",
        "logMessage": "queued\nstarted",
        "isManual": manual
    })
}

async fn view_assets(
    State(rec): State<Recorder>,
    Path(view_id): Path<i64>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    rec.record("view_assets", &headers, query);
    if view_id == 404 {
        return (StatusCode::NOT_FOUND, "view 404 does not exist").into_response();
    }
    Json(json!({
        "items": [
            {"asset/id": 1, "asset/name": "a.jpg", "meta/tag": {"value": "cat", "count": 2}},
            {"asset/id": 2, "asset/name": "b.jpg"}
        ],
        "schema": [
            {"id": "asset/id", "title": "ID", "value_type": 1, "width": 80, "sortable": true},
            {"id": "asset/name", "title": "Name", "value_type": 0, "width": null, "searchable": true},
            {"id": "meta/tag", "title": "Tag", "value_type": 0}
        ],
        "stats": {"returned": 2, "total": null, "duration_ms": 1.25},
        "pagination": {"offset": 50, "limit": 25}
    }))
    .into_response()
}

async fn collection_assets(
    State(rec): State<Recorder>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> Json<Value> {
    rec.record("collection_assets", &headers, query);
    Json(json!({
        "items": [],
        "schema": [],
        "stats": {"returned": 0, "total": 0},
        "pagination": {"offset": 0, "limit": 25}
    }))
}

async fn providers(State(rec): State<Recorder>, headers: HeaderMap) -> Json<Value> {
    rec.record("providers", &headers, Vec::new());
    Json(json!([{"id": 1, "name": "Archive", "kind": "filesystem"}]))
}

async fn actors(State(rec): State<Recorder>, headers: HeaderMap) -> Json<Value> {
    rec.record("actors", &headers, Vec::new());
    Json(json!([{"id": 3, "name": "importer"}]))
}

async fn run_sources(
    State(rec): State<Recorder>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> Json<Value> {
    rec.record("run_sources", &headers, query);
    Json(job_json(21, "queued", false))
}

async fn run_processors(State(rec): State<Recorder>, headers: HeaderMap) -> Json<Value> {
    rec.record("run_processors", &headers, Vec::new());
    Json(job_json(22, "queued", false))
}

async fn cancel_snapshot(
    State(rec): State<Recorder>,
    Path(_id): Path<i64>,
    headers: HeaderMap,
) -> StatusCode {
    rec.record("cancel", &headers, Vec::new());
    StatusCode::ACCEPTED
}

async fn get_snapshot(
    State(rec): State<Recorder>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Json<Value> {
    rec.record("get_snapshot", &headers, Vec::new());
    Json(job_json(id, "partial", true))
}

async fn delete_snapshot(
    State(rec): State<Recorder>,
    Path(_id): Path<i64>,
    headers: HeaderMap,
) -> StatusCode {
    rec.record("delete", &headers, Vec::new());
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
struct MessageBody {
    message: String,
}

async fn update_changeset(
    State(rec): State<Recorder>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<MessageBody>,
) -> Json<Value> {
    rec.record("update", &headers, vec![("message".to_string(), body.message.clone())]);
    let mut job = job_json(id, "running", true);
    job["message"] = json!(body.message);
    Json(job)
}

async fn get_changeset(
    State(rec): State<Recorder>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Json<Value> {
    rec.record("get_changeset", &headers, Vec::new());
    Json(job_json(id, "running", true))
}

async fn finish_changeset(
    State(rec): State<Recorder>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Json<Value> {
    rec.record("finish", &headers, Vec::new());
    Json(job_json(id, "completed", true))
}

async fn snapshot_events(
    State(rec): State<Recorder>,
    Path(_id): Path<i64>,
    headers: HeaderMap,
) -> impl IntoResponse {
    rec.record("events", &headers, Vec::new());
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        concat!(
            ": connected\n\n",
            "retry: 250\n",
            "id: 7\n",
            "event: log\n",
            "data: \"scanning\"\n\n",
            "event: snapshot\r\n",
            "data: {\"id\": 5, \"status\": \"completed\"}\r\n\r\n",
        ),
    )
}

async fn start_test_server() -> (String, Recorder, tokio::task::JoinHandle<()>) {
    let recorder = Recorder::default();
    let app = Router::new()
        .route("/views/{view_id}/assets", get(view_assets))
        .route("/collections/{id}/assets", get(collection_assets))
        .route("/providers", get(providers))
        .route("/actors", get(actors))
        .route("/sources/run", post(run_sources))
        .route("/processors/run", post(run_processors))
        .route("/snapshots/{id}/cancel", post(cancel_snapshot))
        .route(
            "/snapshots/{id}",
            get(get_snapshot).delete(delete_snapshot),
        )
        .route("/snapshots/{id}/events", get(snapshot_events))
        .route(
            "/changesets/{id}",
            get(get_changeset).patch(update_changeset),
        )
        .route("/changesets/{id}/finish", post(finish_changeset))
        .with_state(recorder.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr: SocketAddr = listener.local_addr().expect("listener addr");
    let base_url = format!("http://{addr}");

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve test server");
    });

    (base_url, recorder, handle)
}

fn client(base_url: &str) -> ApiClient {
    let config = ClientConfig {
        api_token: Some(TOKEN.to_string()),
        ..ClientConfig::new(format!("{base_url}/"))
    };
    ApiClient::new(&config).expect("client")
}

fn pairs(recorded: &Recorded, key: &str) -> Vec<String> {
    recorded
        .query
        .iter()
        .filter(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
        .collect()
}

#[tokio::test]
async fn fetch_page_sends_state_and_bearer_token() {
    let (base_url, recorder, _handle) = start_test_server().await;
    let api = client(&base_url);

    let mut state = FetchState::new(25);
    state.offset = 50;
    state.sort = vec![SortKey::desc("asset/name"), SortKey::asc("asset/id")];
    state.filters.set(
        "tag",
        FilterCondition::single("meta/tag", FilterOperator::Eq, "cat"),
    );
    state.filters.set(
        "id",
        FilterCondition::new(
            "asset/id",
            FilterOperator::Between,
            vec![1_i64.into(), 9_i64.into()],
        ),
    );
    state.search = "kitten".to_string();
    let scope = TableScope::View {
        view_id: ViewId::new(3),
        provider_id: Some(ProviderId::new(1)),
    };

    let page = api
        .fetch_page(&state.to_request(&scope, ServerSide::default()))
        .await
        .expect("page");

    let recorded = recorder.last();
    assert_eq!(recorded.authorization.as_deref(), Some("Bearer test-token"));
    assert_eq!(pairs(&recorded, "offset"), vec!["50"]);
    assert_eq!(pairs(&recorded, "limit"), vec!["25"]);
    assert_eq!(pairs(&recorded, "sort"), vec!["asset/name:desc,asset/id:asc"]);
    assert_eq!(
        pairs(&recorded, "filters[]"),
        vec!["asset/id between 1,9", "meta/tag eq cat"]
    );
    assert_eq!(pairs(&recorded, "search"), vec!["kitten"]);
    assert_eq!(pairs(&recorded, "provider_id"), vec!["1"]);

    assert_eq!(page.items.len(), 2);
    assert_eq!(page.stats.total, None);
    assert_eq!(page.schema[0].width, Some(80));
    assert_eq!(
        page.items[0].get("meta/tag").and_then(tessera_client::Cell::count),
        Some(2)
    );
}

#[tokio::test]
async fn collection_scope_sends_view_id_and_omits_blank_parts() {
    let (base_url, recorder, _handle) = start_test_server().await;
    let api = client(&base_url);
    let scope = TableScope::Collection {
        collection_id: CollectionId::new(8),
        view_id: ViewId::new(3),
    };

    api.fetch_page(&FetchState::new(25).to_request(&scope, ServerSide::default()))
        .await
        .expect("page");

    let recorded = recorder.last();
    assert_eq!(recorded.route, "collection_assets");
    assert_eq!(pairs(&recorded, "view_id"), vec!["3"]);
    assert!(pairs(&recorded, "sort").is_empty());
    assert!(pairs(&recorded, "search").is_empty());
    assert!(pairs(&recorded, "filters[]").is_empty());
}

#[tokio::test]
async fn non_success_status_carries_body_text() {
    let (base_url, _recorder, _handle) = start_test_server().await;
    let api = client(&base_url);
    let scope = TableScope::View {
        view_id: ViewId::new(404),
        provider_id: None,
    };

    let err = api
        .fetch_page(&FetchState::new(10).to_request(&scope, ServerSide::default()))
        .await
        .expect_err("404");
    assert_eq!(
        err,
        Error::Api {
            status: 404,
            body: "view 404 does not exist".to_string()
        }
    );
    assert_eq!(err.display_message(), "view 404 does not exist");
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("listener addr");
    drop(listener);

    let api = client(&format!("http://{addr}"));
    let err = api.list_providers().await.expect_err("nothing listening");
    assert!(matches!(err, Error::Transport { .. }), "got {err:?}");
}

#[tokio::test]
async fn registry_loads_both_listings() {
    let (base_url, _recorder, _handle) = start_test_server().await;
    let api = client(&base_url);

    let registry = api.load_registry().await.expect("registry");
    assert_eq!(
        registry.label(tessera_client::EntityKind::Provider, 1),
        Some("Archive")
    );
    assert_eq!(
        registry.label(tessera_client::EntityKind::Actor, 3),
        Some("importer")
    );
}

#[tokio::test]
async fn launchers_return_initial_jobs() {
    let (base_url, recorder, _handle) = start_test_server().await;
    let api = client(&base_url);

    let job = api
        .run_sources(&[ProviderId::new(1), ProviderId::new(4)])
        .await
        .expect("run sources");
    assert_eq!(job.id, JobId::new(21));
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(pairs(&recorder.last(), "ids"), vec!["1,4"]);

    api.run_sources(&[]).await.expect("run all sources");
    assert!(recorder.last().query.is_empty());

    let job = api.run_processors().await.expect("run processors");
    assert_eq!(job.id, JobId::new(22));
}

#[tokio::test]
async fn job_actions_map_to_endpoints() {
    let (base_url, recorder, _handle) = start_test_server().await;
    let api = client(&base_url);

    assert_eq!(api.cancel_job(JobId::new(5)).await.expect("cancel"), None);
    assert_eq!(recorder.last().route, "cancel");

    api.delete_job(JobId::new(5)).await.expect("delete");
    assert_eq!(recorder.last().route, "delete");

    let job = api
        .update_message(JobId::new(6), "Retag holiday photos")
        .await
        .expect("update");
    assert_eq!(job.message.as_deref(), Some("Retag holiday photos"));
    assert_eq!(job.kind(), JobKind::Changeset);

    let job = api
        .finish_job(JobId::new(6))
        .await
        .expect("finish")
        .expect("finish returns the job");
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(recorder.last().route, "finish");
}

#[tokio::test]
async fn event_transport_decodes_frames() {
    let (base_url, recorder, _handle) = start_test_server().await;
    let api = client(&base_url);
    let target = StreamTarget {
        job_id: JobId::new(5),
        kind: JobKind::Snapshot,
        last_event_id: Some("6".to_string()),
    };

    let frames: Vec<SseFrame> = api
        .connect(&target)
        .await
        .expect("connect")
        .map(|frame| frame.expect("frame"))
        .collect()
        .await;

    let recorded = recorder.last();
    assert_eq!(recorded.last_event_id.as_deref(), Some("6"));
    assert_eq!(recorded.accept.as_deref(), Some("text/event-stream"));

    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0], SseFrame::Retry(std::time::Duration::from_millis(250)));
    let SseFrame::Event(log) = &frames[1] else {
        panic!("expected log event, got {:?}", frames[1]);
    };
    assert_eq!(log.event, "log");
    assert_eq!(log.id.as_deref(), Some("7"));
    let SseFrame::Event(status) = &frames[2] else {
        panic!("expected status event, got {:?}", frames[2]);
    };
    assert_eq!(status.event, "snapshot");
}

#[tokio::test]
async fn job_is_fetched_by_kind() {
    let (base_url, recorder, _handle) = start_test_server().await;
    let api = client(&base_url);

    let job = api
        .get_job(JobId::new(12), JobKind::Changeset)
        .await
        .expect("job");
    assert_eq!(recorder.last().route, "get_changeset");
    assert_eq!(job.id, JobId::new(12));
    assert!(job.is_manual);
    assert_eq!(job.log_message.as_deref(), Some("queued\nstarted"));
}

#[tokio::test]
async fn server_manual_flag_drives_cancel_to_delete() {
    let (base_url, recorder, _handle) = start_test_server().await;
    let api = Arc::new(client(&base_url));

    let job = api
        .get_job(JobId::new(9), JobKind::Snapshot)
        .await
        .expect("job");
    assert_eq!(recorder.last().route, "get_snapshot");
    assert!(job.is_manual);

    let tracker = ProgressTracker::from_config(Arc::clone(&api), &ClientConfig::default());
    tracker.start_tracking(job);
    tracker.cancel(JobId::new(9)).await.expect("cancel");

    assert_eq!(recorder.last().route, "delete");
    assert!(tracker.job(JobId::new(9)).is_none());
}
