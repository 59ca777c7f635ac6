//! Inbound request routing
//!
//! Every method and path lands in one fallback handler. Paths under
//! `/broadcast` are replayed against all discovered instances, anything else
//! is a 404.

use crate::broadcast::{BroadcastEngine, BroadcastResult, BroadcastTemplate};
use crate::directory::InstanceDirectory;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use url::form_urlencoded;
use tracing::{debug, error, info};

pub const BROADCAST_PREFIX: &str = "/broadcast";
pub const DEFAULT_TARGET_PORT: u16 = 8080;

const PORT_PARAM: &str = "_port";
const WAIT_PARAM: &str = "_wait";

/// Shared state handed to every request
#[derive(Clone)]
pub struct AppState {
    directory: Arc<InstanceDirectory>,
    engine: BroadcastEngine,
    tasks: TaskTracker,
}

impl AppState {
    pub fn new(directory: Arc<InstanceDirectory>, engine: BroadcastEngine) -> Self {
        Self {
            directory,
            engine,
            tasks: TaskTracker::new(),
        }
    }

    /// Registry of fire-and-forget broadcasts still in flight
    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    /// Start resolving targets and broadcasting `template` on the tracker.
    ///
    /// The task runs to completion whether or not anyone awaits the handle.
    fn spawn_broadcast(&self, template: BroadcastTemplate) -> JoinHandle<()> {
        let directory = Arc::clone(&self.directory);
        let engine = self.engine.clone();

        self.tasks.spawn(async move {
            let targets = directory.resolve_targets().await;
            let results = engine.broadcast(&targets, &template).await;
            log_results(&results);
        })
    }
}

/// A request that matched the broadcast prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastRequest {
    pub template: BroadcastTemplate,
    pub wait: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new().fallback(handle_request).with_state(state)
}

/// Turn an inbound method and URI into a broadcast, or `None` when the path is
/// outside the broadcast prefix.
///
/// `_port` and `_wait` are consumed, matched after form decoding; every other
/// query pair is forwarded untouched and in order.
pub fn parse_broadcast_request(method: &Method, uri: &Uri) -> Option<BroadcastRequest> {
    let path = downstream_path(uri.path())?;

    let mut port = None;
    let mut wait = None;
    let mut forwarded = Vec::new();

    for pair in uri.query().unwrap_or_default().split('&') {
        if pair.is_empty() {
            continue;
        }

        let Some((key, value)) = form_urlencoded::parse(pair.as_bytes()).next() else {
            forwarded.push(pair);
            continue;
        };
        match key.as_ref() {
            PORT_PARAM => port = Some(value.into_owned()),
            WAIT_PARAM => wait = Some(value.into_owned()),
            _ => forwarded.push(pair),
        }
    }

    let port = port
        .and_then(|p| p.parse::<u16>().ok())
        .filter(|p| *p != 0)
        .unwrap_or(DEFAULT_TARGET_PORT);
    let query = (!forwarded.is_empty()).then(|| forwarded.join("&"));

    Some(BroadcastRequest {
        template: BroadcastTemplate::new(method.clone(), port, path, query),
        wait: wait.as_deref() == Some("true"),
    })
}

/// Whatever follows the prefix, rooted at `/` (`/broadcaster` replays to `/er`)
fn downstream_path(path: &str) -> Option<String> {
    let rest = path.strip_prefix(BROADCAST_PREFIX)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        Some(format!("/{}", rest))
    }
}

async fn handle_request(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    debug!(
        "Full request details method={} uri={} headers={:?}",
        method, uri, headers
    );

    let Some(request) = parse_broadcast_request(&method, &uri) else {
        info!("No match for {}", uri.path());
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    };

    let broadcast = state.spawn_broadcast(request.template);

    if request.wait {
        if let Err(e) = broadcast.await {
            error!("Broadcast error: {}", e);
        }
        return (StatusCode::OK, "Broadcast complete").into_response();
    }

    state.tasks.spawn(async move {
        if let Err(e) = broadcast.await {
            error!("Broadcast error (async): {}", e);
        }
    });

    (StatusCode::ACCEPTED, "Broadcast started").into_response()
}

fn log_results(results: &[BroadcastResult]) {
    if results.is_empty() {
        info!("Broadcast finished with no targets");
        return;
    }

    let succeeded = results.iter().filter(|r| r.is_success()).count();
    info!(
        "Broadcast finished: {}/{} targets returned 2xx",
        succeeded,
        results.len()
    );

    for result in results {
        match serde_json::to_string(result) {
            Ok(line) => debug!("Broadcast result {}", line),
            Err(e) => debug!("Broadcast result {:?} ({})", result, e),
        }
    }
}
