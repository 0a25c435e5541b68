//! Headless session: one controller over the in-memory scene and editor.
//!
//! DESIGN
//! ======
//! The session is the control thread. It owns the controller, keeps a
//! sender for workers, and turns the controller's polled debounce deadline
//! into a tokio sleep. Worker results are applied by joining the worker task
//! (which posts its event before finishing) and then draining the channel.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use annosync::ErrorCode;
use annosync::config::SyncConfig;
use annosync::controller::{Notice, SyncController, SyncError};
use annosync::doc::ImageSize;
use annosync::editor::TextBuffer;
use annosync::event::{self, Event, EventSender, WorkerEvent};
use annosync::scene::{Canvas, Scene};
use tracing::{debug, info};

use crate::services::gateway::AssistService;
use crate::services::worker;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("AI features are disabled; set PICTOSYNC_SERVICE_URL")]
    ServiceDisabled,

    #[error("worker task failed: {0}")]
    Worker(String),
}

impl ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Sync(e) => e.error_code(),
            Self::ServiceDisabled => "E_SERVICE_DISABLED",
            Self::Worker(_) => "E_WORKER",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Sync(e) => e.retryable(),
            Self::ServiceDisabled | Self::Worker(_) => false,
        }
    }
}

pub struct Session {
    controller: SyncController<Scene, TextBuffer>,
    events: EventSender,
    service: Option<Arc<dyn AssistService>>,
    model: String,
}

impl Session {
    pub fn new(config: SyncConfig, service: Option<Arc<dyn AssistService>>, model: impl Into<String>) -> Self {
        let (events, rx) = event::channel();
        let scene = Scene::with_events(events.clone());
        let editor = TextBuffer::with_events(events.clone());
        Self { controller: SyncController::new(scene, editor, rx, config), events, service, model: model.into() }
    }

    #[must_use]
    pub fn controller(&self) -> &SyncController<Scene, TextBuffer> {
        &self.controller
    }

    pub fn load_image(&mut self, size: ImageSize) {
        self.controller.load_image(size);
    }

    /// Paste `text` into the editor and link it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Doc`] if the text is not a valid draft.
    pub fn import_text(&mut self, text: &str) -> Result<(), SyncError> {
        self.controller.editor_mut().replace_all(text);
        self.controller.process_pending(Instant::now());
        self.controller.import_and_link()
    }

    /// Replace the editor text as a user would and wait for the debounced
    /// re-parse to land.
    pub async fn type_text(&mut self, text: &str) {
        self.controller.editor_mut().replace_all(text);
        self.settle().await;
    }

    /// Handle queued events, then sleep through any armed debounce.
    pub async fn settle(&mut self) {
        self.controller.process_pending(Instant::now());
        while let Some(deadline) = self.controller.next_deadline() {
            debug!("waiting for editor debounce");
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
            self.controller.tick(Instant::now());
        }
    }

    /// Run an extraction of `image` and apply the result.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ServiceDisabled`] without a gateway,
    /// [`SessionError::Sync`] if the controller refuses the request, and
    /// [`SessionError::Worker`] if the worker task dies.
    pub async fn extract(&mut self, image: &Path) -> Result<(), SessionError> {
        let service = self.service.clone().ok_or(SessionError::ServiceDisabled)?;
        let request = self.controller.begin_extraction()?;
        let task = worker::spawn_extraction(
            service,
            self.events.clone(),
            request,
            image.to_path_buf(),
            self.model.clone(),
        );
        if let Err(e) = task.await {
            let message = e.to_string();
            self.fail(WorkerEvent::ExtractionFailed { request, message: message.clone() });
            return Err(SessionError::Worker(message));
        }
        self.controller.process_pending(Instant::now());
        info!(%request, "extraction applied");
        Ok(())
    }

    /// Align the item carrying `id` against `image` and apply the result.
    ///
    /// # Errors
    ///
    /// See [`Self::extract`]; also [`SyncError::UnknownId`] if no item carries
    /// `id`.
    pub async fn align(&mut self, image: &Path, id: &str) -> Result<(), SessionError> {
        let service = self.service.clone().ok_or(SessionError::ServiceDisabled)?;
        let request = self.controller.begin_alignment(id)?;
        let record = self
            .controller
            .canvas()
            .find(id)
            .and_then(|h| self.controller.canvas().export_record(h))
            .ok_or_else(|| SyncError::UnknownId(id.to_string()))?;
        let task = worker::spawn_alignment(service, self.events.clone(), request, image.to_path_buf(), record);
        if let Err(e) = task.await {
            let message = e.to_string();
            self.fail(WorkerEvent::AlignmentFailed { request, id: id.to_string(), message: message.clone() });
            return Err(SessionError::Worker(message));
        }
        self.controller.process_pending(Instant::now());
        Ok(())
    }

    /// Stand in for a worker that died before reporting, so its request slot
    /// is released.
    fn fail(&mut self, event: WorkerEvent) {
        self.controller.process_pending(Instant::now());
        self.controller.dispatch(Event::Worker(event), Instant::now());
    }

    /// Canonical text of the linked document.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotLinked`] if nothing is linked yet.
    pub fn document_text(&self) -> Result<String, SyncError> {
        self.controller.document_text()
    }

    /// One line per mirrored item: id, kind, owner, geometry.
    #[must_use]
    pub fn scene_summary(&self) -> Vec<String> {
        self.controller
            .canvas()
            .items()
            .map(|item| {
                let id = item.id.as_deref().unwrap_or("-");
                let owner = item.owner.as_deref().unwrap_or("-");
                let geom = serde_json::Value::Object(item.geom.clone());
                format!("{id:<8} {:<12} {owner:<8} {geom}", item.kind_name)
            })
            .collect()
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.controller.take_notices()
    }
}
