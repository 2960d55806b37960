// src/web.rs
use crate::bootstrap::Bootstrap;
use crate::hub::Hub;
use crate::interceptor::{InterceptedResponse, ResponseSink};
use anyhow::Result;
use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::stream::{self, StreamExt};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch::Receiver as WatchReceiver;
use tower_http::services::ServeDir;
use tracing::{debug, error, info};

/// Shared application state for the web server.
#[derive(Clone)]
pub struct AppState {
    /// Browsers waiting for the next reload signal.
    pub hub: Arc<Hub>,
    /// Script and tag injected into every HTML page.
    pub bootstrap: Arc<Bootstrap>,
}

impl AppState {
    pub fn new(hub: Arc<Hub>, bootstrap: Bootstrap) -> Self {
        Self {
            hub,
            bootstrap: Arc::new(bootstrap),
        }
    }
}

/// Builds the application router.
///
/// - `GET /sse`: one push connection, answered with a single reload signal.
/// - `GET /sse/init.js`: the bootstrap script.
/// - everything else: files under `root`, with the bootstrap injected into HTML.
pub fn app(root: impl AsRef<Path>, state: AppState) -> Router {
    with_reloader(
        Router::new().fallback_service(ServeDir::new(root.as_ref())),
        state,
    )
}

/// Mounts the push endpoints in front of `files`, whose HTML responses get the
/// bootstrap injected.
pub fn with_reloader(files: Router, state: AppState) -> Router {
    let files = files.layer(middleware::from_fn_with_state(state.clone(), inject_reloader));

    Router::new()
        .route("/sse", get(push_handler))
        .route("/sse/init.js", get(script_handler))
        .with_state(state)
        .fallback_service(files)
}

/// Holds a push connection open until the hub signals it.
async fn push_handler(State(state): State<AppState>) -> Response {
    let subscription = state.hub.subscribe();
    match subscription.recv().await {
        Some(message) => {
            let headers = [
                (CONTENT_TYPE, HeaderValue::from_static("text/event-stream")),
                (CACHE_CONTROL, HeaderValue::from_static("no-cache")),
                (CONTENT_LENGTH, HeaderValue::from(message.len())),
            ];
            (headers, message).into_response()
        }
        None => {
            debug!("Push connection released without a signal.");
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

/// Serves the bootstrap script.
async fn script_handler(State(state): State<AppState>) -> Response {
    let script = state.bootstrap.script().to_owned();
    let headers = [
        (CONTENT_TYPE, HeaderValue::from_static("application/javascript")),
        (CONTENT_LENGTH, HeaderValue::from(script.len())),
    ];
    (headers, script).into_response()
}

/// Response sink that collects the head and forwarded body chunks of a
/// static-file response before they are handed to hyper.
#[derive(Debug, Default)]
struct QueueSink {
    headers: HeaderMap,
    queued: Vec<Bytes>,
    ended: bool,
}

impl QueueSink {
    fn new(headers: HeaderMap) -> Self {
        Self {
            headers,
            ..Default::default()
        }
    }

    fn has_output(&self) -> bool {
        self.ended || !self.queued.is_empty()
    }
}

impl ResponseSink for QueueSink {
    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    fn header(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    fn write(&mut self, chunk: Bytes) {
        if !chunk.is_empty() {
            self.queued.push(chunk);
        }
    }

    fn end(&mut self, chunk: Bytes) {
        self.write(chunk);
        self.ended = true;
    }
}

/// `charset` parameter of a content type, if present.
fn charset(content_type: &HeaderValue) -> Option<String> {
    content_type.to_str().ok()?.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

/// Middleware that injects the bootstrap tag into HTML responses.
///
/// `HEAD` is answered from the `GET` response with the body dropped, so its
/// `content-length` matches the injected page.
async fn inject_reloader(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let head_only = request.method() == Method::HEAD;
    if head_only {
        *request.method_mut() = Method::GET;
    }
    let is_get = request.method() == Method::GET;
    let response = next.run(request).await;
    if !is_get {
        return response;
    }

    let response = rewrite_html(&state.bootstrap, response).await;
    if head_only {
        let (parts, _) = response.into_parts();
        return Response::from_parts(parts, Body::empty());
    }
    response
}

/// Body frames are pumped through an [`InterceptedResponse`] until it forwards
/// something (the head tag was found) or the body ends. The rest of the body
/// then streams through untouched.
async fn rewrite_html(bootstrap: &Bootstrap, response: Response) -> Response {
    if response.status() != StatusCode::OK || response.headers().contains_key(CONTENT_ENCODING) {
        return response;
    }

    let Some(content_type) = response.headers().get(CONTENT_TYPE).cloned() else {
        return response;
    };

    let (mut parts, body) = response.into_parts();
    let mut intercepted = InterceptedResponse::new(
        QueueSink::new(std::mem::take(&mut parts.headers)),
        bootstrap.script_tag().to_owned(),
    );
    intercepted.set_header(CONTENT_TYPE, content_type.clone());
    if !intercepted.is_html() {
        parts.headers = intercepted.into_inner().headers;
        return Response::from_parts(parts, body);
    }

    let encoding = charset(&content_type);
    let mut frames = body.into_data_stream();
    loop {
        let step = match frames.next().await {
            Some(Ok(chunk)) => intercepted.write(chunk, encoding.as_deref()),
            Some(Err(e)) => {
                error!("Failed to read static response body: {}", e);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            None => intercepted.end(None, encoding.as_deref()),
        };
        if let Err(e) = step {
            error!("Refusing to serve HTML response: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
        if intercepted.inner().has_output() {
            break;
        }
    }

    if intercepted.injection_performed() {
        debug!("Reload bootstrap injected into HTML response.");
    }
    let sink = intercepted.into_inner();
    parts.headers = sink.headers;
    let head = stream::iter(sink.queued.into_iter().map(Ok::<_, axum::Error>));
    let body = if sink.ended {
        Body::from_stream(head)
    } else {
        Body::from_stream(head.chain(frames))
    };
    Response::from_parts(parts, body)
}

/// Binds the HTTP listener. Failing here is a startup error.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    Ok(listener)
}

/// Serves `app` until the shutdown signal fires.
///
/// Pending push connections are released on shutdown so that graceful
/// shutdown does not wait on browsers that never get a signal.
pub async fn start_server(
    listener: TcpListener,
    app: Router,
    hub: Arc<Hub>,
    shutdown_signal: WatchReceiver<bool>,
) -> Result<()> {
    info!("Web server starting on http://{}", listener.local_addr()?);

    let mut shutdown = shutdown_signal;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
            let released = hub.disconnect_all();
            info!(released, "Web server shutting down gracefully.");
        })
        .await?;

    info!("Web server stopped.");
    Ok(())
}
