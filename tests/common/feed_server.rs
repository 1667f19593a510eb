//! Mock bulk-data server
//!
//! Serves a dataset catalog at `/bulk-data` with these entries:
//! - `default_cards` -> `/cards.json`
//! - `sets` -> `/sets.json`
//! - `slow_cards` -> `/slow.json`, an array that never ends
//! - `broken_cards` -> `/broken.json`, always HTTP 500
//!
//! Set icons are served from `/icons/{code}.svg`.

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

struct FeedState {
    base_url: String,
    cards: Vec<Value>,
    sets: Vec<Value>,
    icon_requests: AtomicUsize,
}

pub struct FeedServer {
    pub base_url: String,
    state: Arc<FeedState>,
    shutdown: CancellationToken,
}

impl FeedServer {
    pub async fn spawn(cards: Vec<Value>, sets: Vec<Value>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener.local_addr().unwrap().port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let state = Arc::new(FeedState {
            base_url: base_url.clone(),
            cards,
            sets,
            icon_requests: AtomicUsize::new(0),
        });
        let app = Router::new()
            .route("/bulk-data", get(bulk_data))
            .route("/cards.json", get(self::cards))
            .route("/sets.json", get(self::sets))
            .route("/slow.json", get(slow))
            .route("/broken.json", get(broken))
            .route("/icons/{file}", get(icon))
            .with_state(state.clone());

        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(server_shutdown.cancelled_owned())
                .await
                .expect("Feed server failed");
        });

        Self {
            base_url,
            state,
            shutdown,
        }
    }

    pub fn catalog_url(&self) -> String {
        format!("{}/bulk-data", self.base_url)
    }

    pub fn icon_requests(&self) -> usize {
        self.state.icon_requests.load(Ordering::SeqCst)
    }
}

impl Drop for FeedServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub fn card_json(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "oracle_id": format!("oracle-{}", id),
        "name": name,
        "set": "tst",
        "collector_number": "1",
        "lang": "en",
        "rarity": "common",
        "type_line": "Creature",
        "mana_cost": "{G}",
        "released_at": "2024-01-01",
        "image_uris": { "normal": format!("https://img.example/{}.jpg", id) },
        "prices": { "usd": "0.10" }
    })
}

/// A set whose icon points back at the mock server; `base_url` is filled
/// in when the feed is served.
pub fn set_json(code: &str, name: &str) -> Value {
    json!({
        "code": code,
        "name": name,
        "set_type": "expansion",
        "released_at": "2024-01-01",
        "card_count": 10,
        "icon_svg_uri": format!("{{base}}/icons/{}.svg", code)
    })
}

async fn bulk_data(State(state): State<Arc<FeedState>>) -> Json<Value> {
    let entry = |dataset_type: &str, path: &str| {
        json!({
            "type": dataset_type,
            "download_uri": format!("{}{}", state.base_url, path),
            "updated_at": "2024-01-01T00:00:00.000+00:00",
            "size": 1024
        })
    };
    Json(json!({
        "object": "list",
        "data": [
            entry("default_cards", "/cards.json"),
            entry("sets", "/sets.json"),
            entry("slow_cards", "/slow.json"),
            entry("broken_cards", "/broken.json"),
        ]
    }))
}

async fn cards(State(state): State<Arc<FeedState>>) -> Json<Value> {
    Json(Value::Array(state.cards.clone()))
}

async fn sets(State(state): State<Arc<FeedState>>) -> impl IntoResponse {
    let body = Value::Array(state.sets.clone())
        .to_string()
        .replace("{base}", &state.base_url);
    ([("content-type", "application/json")], body)
}

/// Emits one card every 20ms, forever.
async fn slow() -> impl IntoResponse {
    let stream = futures::stream::unfold(0usize, |n| async move {
        if n > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let chunk = if n == 0 {
            "[".to_string()
        } else {
            let separator = if n == 1 { "" } else { "," };
            format!("{}{}", separator, card_json(&format!("slow-{}", n), "Slow Card"))
        };
        Some((Ok::<_, std::io::Error>(Bytes::from(chunk)), n + 1))
    });
    Body::from_stream(stream)
}

async fn broken() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded")
}

async fn icon(State(state): State<Arc<FeedState>>, Path(file): Path<String>) -> impl IntoResponse {
    state.icon_requests.fetch_add(1, Ordering::SeqCst);
    if !file.ends_with(".svg") {
        return (StatusCode::NOT_FOUND, String::new());
    }
    (
        StatusCode::OK,
        format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\"><title>{}</title></svg>",
            file
        ),
    )
}
