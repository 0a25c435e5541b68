//! Background workers for the gateway calls.
//!
//! A worker computes a result and posts exactly one `WorkerEvent` back to
//! the controller's channel. It never touches the document or the scene.

#[cfg(test)]
#[path = "worker_test.rs"]
mod worker_test;

use std::path::PathBuf;
use std::sync::Arc;

use annosync::ErrorCode;
use annosync::doc::AnnotationRecord;
use annosync::event::{Event, EventSender, RequestId, WorkerEvent};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::gateway::AssistService;

/// Spawn an extraction for `image`. Returns a handle that resolves once the
/// completion event has been posted.
pub fn spawn_extraction(
    service: Arc<dyn AssistService>,
    events: EventSender,
    request: RequestId,
    image: PathBuf,
    model: String,
) -> JoinHandle<()> {
    info!(%request, image = %image.display(), %model, "extraction worker started");
    tokio::spawn(async move {
        let event = match service.extract(&image, &model).await {
            Ok(raw) => WorkerEvent::ExtractionFinished { request, raw },
            Err(e) => {
                warn!(%request, error = %e, code = e.error_code(), "extraction call failed");
                WorkerEvent::ExtractionFailed { request, message: e.to_string() }
            }
        };
        post(&events, event);
    })
}

/// Spawn an alignment of one record against `image`.
pub fn spawn_alignment(
    service: Arc<dyn AssistService>,
    events: EventSender,
    request: RequestId,
    image: PathBuf,
    record: AnnotationRecord,
) -> JoinHandle<()> {
    let id = record.id().unwrap_or_default().to_string();
    info!(%request, id = %id, "alignment worker started");
    tokio::spawn(async move {
        let event = match service.align(&image, &record).await {
            Ok(result) => WorkerEvent::AlignmentFinished { request, id, result },
            Err(e) => {
                warn!(%request, id = %id, error = %e, code = e.error_code(), "alignment call failed");
                WorkerEvent::AlignmentFailed { request, id, message: e.to_string() }
            }
        };
        post(&events, event);
    })
}

fn post(events: &EventSender, event: WorkerEvent) {
    if events.send(Event::Worker(event)).is_err() {
        warn!("controller channel closed; worker result dropped");
    }
}
