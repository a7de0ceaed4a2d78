use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{Mutex, broadcast};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use web_navigator::events::{EventSink, NavigatorEvent};
use web_navigator::{HistoryEntry, Settings, TaskOutcome};

/// Forwards navigator events to every connected SSE client.
pub struct BroadcastSink {
    tx: broadcast::Sender<NavigatorEvent>,
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: &NavigatorEvent) {
        // no subscribers is fine
        let _ = self.tx.send(event.clone());
    }
}

pub struct AppState {
    settings: Settings,
    event_tx: broadcast::Sender<NavigatorEvent>,
    /// One browser task at a time.
    task_lock: Mutex<()>,
}

#[derive(Deserialize)]
struct ExecuteRequest {
    prompt: String,
}

#[derive(Serialize)]
struct ExecuteResponse {
    status: &'static str,
    result: String,
    history: Vec<HistoryEntry>,
}

pub async fn serve(settings: Settings, host: &str, port: u16) -> anyhow::Result<()> {
    let (event_tx, _) = broadcast::channel::<NavigatorEvent>(256);
    let state = Arc::new(AppState {
        settings,
        event_tx,
        task_lock: Mutex::new(()),
    });

    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("could not bind {host}:{port}"))?;
    info!("[Face] Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/execute", post(execute_handler))
        .route("/events", get(sse_handler))
        .route("/health", get(health_handler))
        .route("/favicon.ico", get(|| async { StatusCode::NO_CONTENT }))
        .with_state(state)
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn execute_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExecuteRequest>,
) -> Response {
    let task = payload.prompt.trim().to_string();
    if task.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": "prompt must not be empty" })),
        )
            .into_response();
    }

    let _running = state.task_lock.lock().await;
    info!("[Face] POST /execute: {}", task);

    let settings = state.settings.clone();
    let sink: Arc<dyn EventSink> = Arc::new(BroadcastSink {
        tx: state.event_tx.clone(),
    });
    let joined =
        tokio::task::spawn_blocking(move || crate::execute_task(&settings, &task, sink)).await;

    match joined {
        Ok(Ok((TaskOutcome::Succeeded { result }, history))) => Json(ExecuteResponse {
            status: "success",
            result,
            history,
        })
        .into_response(),
        Ok(Ok((TaskOutcome::Failed(failure), _))) => failure_response(failure.to_string()),
        Ok(Err(e)) => failure_response(format!("{e:#}")),
        Err(e) => failure_response(format!("navigation task panicked: {e}")),
    }
}

fn failure_response(detail: String) -> Response {
    warn!("[Face] Task failed: {}", detail);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": detail })),
    )
        .into_response()
}

async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => Some(Ok::<_, Infallible>(to_sse_event(&event))),
        // lagged receivers skip what they missed
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse_event(event: &NavigatorEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(event.name()).data(data)
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>Web Navigator</title>
<style>
  body { background: #0a0a0f; color: #e0e0e0; font-family: system-ui, sans-serif; margin: 0; }
  main { max-width: 760px; margin: 0 auto; padding: 24px; display: flex; flex-direction: column; gap: 12px; height: 100vh; box-sizing: border-box; }
  #log { flex: 1; overflow-y: auto; display: flex; flex-direction: column; gap: 6px; }
  .entry { padding: 8px 12px; border-radius: 6px; font-size: 14px; background: #111118; border-left: 3px solid #3b82f6; white-space: pre-wrap; }
  .entry.failed { border-color: #ef4444; color: #fca5a5; }
  .entry.done { border-color: #22c55e; color: #86efac; }
  form { display: flex; gap: 8px; }
  input { flex: 1; background: #111118; border: 1px solid #222; border-radius: 6px; padding: 10px; color: #fff; }
  button { background: #6366f1; color: #fff; border: none; border-radius: 6px; padding: 10px 20px; }
  button:disabled { background: #333; }
</style>
</head>
<body>
<main>
  <h1>Web Navigator</h1>
  <div id="log"></div>
  <form id="form">
    <input id="prompt" placeholder="Describe a task..." autofocus>
    <button id="go">Run</button>
  </form>
</main>
<script>
  const log = document.getElementById('log');
  const go = document.getElementById('go');
  const add = (cls, text) => {
    const div = document.createElement('div');
    div.className = 'entry ' + cls;
    div.textContent = text;
    log.appendChild(div);
    log.scrollTop = log.scrollHeight;
  };

  document.getElementById('form').addEventListener('submit', async e => {
    e.preventDefault();
    const input = document.getElementById('prompt');
    const prompt = input.value.trim();
    if (!prompt) return;
    input.value = '';
    go.disabled = true;
    const res = await fetch('/execute', {
      method: 'POST',
      headers: {'Content-Type': 'application/json'},
      body: JSON.stringify({prompt}),
    });
    const body = await res.json();
    add(res.ok ? 'done' : 'failed', res.ok ? 'Result: ' + body.result : 'Failed: ' + body.detail);
    go.disabled = false;
  });

  const es = new EventSource('/events');
  es.addEventListener('task_started', e => add('', 'Task: ' + JSON.parse(e.data).task));
  es.addEventListener('action_executed', e => {
    const d = JSON.parse(e.data);
    add('', d.number + '. ' + d.action.action + ' ' + JSON.stringify(d.action.target));
  });
  es.addEventListener('step_failed', e => {
    const d = JSON.parse(e.data);
    add('failed', 'Retry ' + d.retries + ': ' + d.message);
  });
</script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_sink_reaches_subscribers() {
        let (tx, mut rx) = broadcast::channel(4);
        let sink = BroadcastSink { tx };
        sink.emit(&NavigatorEvent::Thinking { iteration: 3 });
        match rx.try_recv().unwrap() {
            NavigatorEvent::Thinking { iteration } => assert_eq!(iteration, 3),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn broadcast_sink_tolerates_no_subscribers() {
        let (tx, _) = broadcast::channel(4);
        let sink = BroadcastSink { tx };
        sink.emit(&NavigatorEvent::TaskComplete {
            result: "done".into(),
        });
    }
}
