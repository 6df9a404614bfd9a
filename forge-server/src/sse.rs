//! Server-Sent Events stream of one run's progress.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use forge::io::events::RunEventRecord;
use futures::stream::Stream;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::state::AppState;

/// SSE endpoint handler: events for `run_id` as they happen, ending after
/// `done`. Events emitted before the client attached are not replayed.
pub async fn events_handler(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.event_tx.subscribe();

    let stream = async_stream::stream! {
        let connected = serde_json::json!({ "run_id": run_id }).to_string();
        yield Ok(Event::default().event("connected").data(connected));

        loop {
            match rx.recv().await {
                Ok(record) => {
                    if record.run_id != run_id {
                        continue;
                    }
                    let terminal = record.event.is_terminal();
                    if let Some(event) = to_sse(&record) {
                        yield Ok(event);
                    }
                    if terminal {
                        debug!(run_id = %run_id, "run finished; closing stream");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "SSE client lagged, some events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn to_sse(record: &RunEventRecord) -> Option<Event> {
    let json = serde_json::to_string(record).ok()?;
    Some(Event::default().event(record.event.kind()).data(json))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use forge::core::ui_schema::ComponentCatalog;
    use forge::io::config::ForgeConfig;
    use forge::io::durable::LocalDurableStore;
    use forge::io::events::{EventSink, RunEvent, RunOutcome};
    use forge::io::run_log::RunPaths;
    use forge::test_support::ScriptedGenerator;
    use tower::ServiceExt;

    use crate::routes::app;
    use crate::state::{ServiceFactory, SharedService};

    use super::*;

    /// Subscribes, then emits events for two runs: only the requested run's
    /// events arrive and the stream closes after `done`.
    #[tokio::test]
    async fn stream_is_filtered_by_run_and_ends_on_done() {
        let temp = tempfile::tempdir().expect("tempdir");
        let services: ServiceFactory = Arc::new(|_: &RunPaths| -> SharedService {
            Arc::new(ScriptedGenerator::default())
        });
        let state = AppState::new(
            temp.path().to_path_buf(),
            ForgeConfig::default(),
            ComponentCatalog::builtin(),
            Arc::new(LocalDurableStore::new(temp.path().join("store"))),
            services,
        );

        let request = Request::builder()
            .uri("/events/run-1")
            .body(Body::empty())
            .expect("request");
        let response = app(state.clone()).oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let sink = state.sink();
        sink.emit("run-2", &RunEvent::info("other run"));
        sink.emit("run-1", &RunEvent::phase(Some("task-1"), "generating"));
        sink.emit(
            "run-1",
            &RunEvent::Done {
                outcome: RunOutcome::Completed,
                message: None,
            },
        );

        let bytes = tokio::time::timeout(
            Duration::from_secs(5),
            to_bytes(response.into_body(), usize::MAX),
        )
        .await
        .expect("stream closed")
        .expect("body");
        let text = String::from_utf8(bytes.to_vec()).expect("utf8");

        assert!(text.contains("connected"));
        assert!(text.contains("phase_change"));
        assert!(text.contains("generating"));
        assert!(text.contains("done"));
        assert!(!text.contains("other run"));
    }

    #[test]
    fn sse_event_carries_run_record() {
        let record = RunEventRecord::new("run-1", &RunEvent::info("hello"));
        assert!(to_sse(&record).is_some());
        let json = serde_json::to_value(&record).expect("json");
        assert_eq!(json["run_id"], "run-1");
    }
}
