//! Sync controller: keeps the document and the scene mirrored.
//!
//! DESIGN
//! ======
//! The controller owns the document, the id index and registry, the link
//! state, the guard set and the debounce deadline. The canvas and editor are
//! owned collaborators reached through the [`Canvas`] and [`Editor`] traits;
//! their notifications and worker completions arrive on one event channel
//! and are handled in order on the caller's thread.
//!
//! Two propagation paths:
//!
//! - Scene → Document: export the item, assign or reuse its id, merge into the
//!   stored record (fields the scene does not know survive), serialize, push
//!   the text into the editor under `WritingEditor`.
//! - Document → Scene: a user edit arms the debounce; when it fires the text
//!   is parsed and validated, missing ids and styles are filled, the document
//!   is replaced and the scene rebuilt under `RebuildingScene`, keeping the
//!   selection.
//!
//! REENTRANCY
//! ==========
//! Every controller write to a collaborator runs inside [`with_guard`]:
//! the guard is taken, the write happens, and the events it produced are
//! drained while the guard is still held. Handlers check their guards on
//! entry and return without side effects, so a push never feeds back into a
//! rebuild and a rebuild never feeds back into a push.
//!
//! FAILURES
//! ========
//! Bad text never reaches the scene: the last good document stays in force.
//! Handlers never print; they queue [`Notice`]s for the host.
//!
//! [`with_guard`]: SyncController::with_guard

#[cfg(test)]
#[path = "controller_test.rs"]
mod controller_test;

use std::collections::HashSet;
use std::fmt;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::ErrorCode;
use crate::config::SyncConfig;
use crate::debounce::Debouncer;
use crate::doc::{self, AnnotationRecord, DocError, Draft, Fields, ImageSize, Kind, fill_default_style};
use crate::editor::Editor;
use crate::event::{Alignment, EditorEvent, Event, EventReceiver, RequestId, SceneEvent, WorkerEvent};
use crate::geom;
use crate::guard::{Guard, GuardSet, LinkState};
use crate::ids::{IdIndex, IdRegistry};
use crate::scene::{Canvas, ItemHandle, ItemSpec};

// =============================================================================
// ERRORS & NOTICES
// =============================================================================

/// Which background operation a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Extraction,
    Alignment,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Extraction => "extraction",
            Self::Alignment => "alignment",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("unknown kind: {0}")]
    UnknownKind(String),

    #[error("no annotation with id {0}")]
    UnknownId(String),

    #[error("document and scene are not linked")]
    NotLinked,

    #[error("no image loaded")]
    NoImage,

    #[error("an {0} request is already in flight")]
    RequestInFlight(RequestKind),

    #[error("cannot group: {0}")]
    InvalidGroup(String),

    #[error(transparent)]
    Doc(#[from] DocError),
}

impl ErrorCode for SyncError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownKind(_) => "E_UNKNOWN_KIND",
            Self::UnknownId(_) => "E_UNKNOWN_ID",
            Self::NotLinked => "E_NOT_LINKED",
            Self::NoImage => "E_NO_IMAGE",
            Self::RequestInFlight(_) => "E_REQUEST_IN_FLIGHT",
            Self::InvalidGroup(_) => "E_INVALID_GROUP",
            Self::Doc(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::RequestInFlight(_))
    }
}

/// User-facing output queued by handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Status-line text.
    Status(String),
    /// Blocking failure report.
    Failure { title: String, message: String },
}

// =============================================================================
// CONTROLLER
// =============================================================================

pub struct SyncController<C: Canvas, E: Editor> {
    canvas: C,
    editor: E,
    config: SyncConfig,
    draft: Option<Draft>,
    index: IdIndex,
    ids: IdRegistry,
    link: LinkState,
    guards: GuardSet,
    debounce: Debouncer,
    events: EventReceiver,
    clock: Instant,
    notices: Vec<Notice>,
    image: Option<ImageSize>,
    import_enabled: bool,
    cursor_annotation: Option<String>,
    extraction: Option<RequestId>,
    alignment: Option<RequestId>,
}

impl<C: Canvas, E: Editor> SyncController<C, E> {
    /// Create an unlinked controller with no document.
    ///
    /// `events` must be the receiving half of the channel the canvas, the
    /// editor and any workers send on.
    pub fn new(canvas: C, editor: E, events: EventReceiver, config: SyncConfig) -> Self {
        Self {
            canvas,
            editor,
            debounce: Debouncer::new(config.debounce),
            config,
            draft: None,
            index: IdIndex::new(),
            ids: IdRegistry::new(),
            link: LinkState::Unlinked,
            guards: GuardSet::new(),
            events,
            clock: Instant::now(),
            notices: Vec::new(),
            image: None,
            import_enabled: false,
            cursor_annotation: None,
            extraction: None,
            alignment: None,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    /// Mutable canvas access, for driving user-side operations.
    pub fn canvas_mut(&mut self) -> &mut C {
        &mut self.canvas
    }

    #[must_use]
    pub fn editor(&self) -> &E {
        &self.editor
    }

    /// Mutable editor access, for driving user-side operations.
    pub fn editor_mut(&mut self) -> &mut E {
        &mut self.editor
    }

    #[must_use]
    pub fn document(&self) -> Option<&Draft> {
        self.draft.as_ref()
    }

    #[must_use]
    pub fn link_state(&self) -> LinkState {
        self.link
    }

    #[must_use]
    pub fn index(&self) -> &IdIndex {
        &self.index
    }

    #[must_use]
    pub fn guards(&self) -> GuardSet {
        self.guards
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[must_use]
    pub fn image_size(&self) -> Option<ImageSize> {
        self.image
    }

    /// Whether the current editor text would be accepted by an import.
    #[must_use]
    pub fn can_import(&self) -> bool {
        self.import_enabled
    }

    /// When the pending text re-parse is due, if one is armed.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    #[must_use]
    pub fn pending_extraction(&self) -> Option<RequestId> {
        self.extraction
    }

    #[must_use]
    pub fn pending_alignment(&self) -> Option<RequestId> {
        self.alignment
    }

    /// Drain queued notices.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Current document rendered as canonical text.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotLinked`] if there is no document.
    pub fn document_text(&self) -> Result<String, SyncError> {
        let draft = self.draft.as_ref().ok_or(SyncError::NotLinked)?;
        Ok(doc::serialize(draft, self.config.indent)?)
    }

    fn status(&mut self, text: impl Into<String>) {
        self.notices.push(Notice::Status(text.into()));
    }

    fn failure(&mut self, title: &str, message: impl Into<String>) {
        self.notices.push(Notice::Failure { title: title.to_string(), message: message.into() });
    }

    // -------------------------------------------------------------------------
    // Event loop
    // -------------------------------------------------------------------------

    /// Handle every queued event.
    pub fn process_pending(&mut self, now: Instant) {
        self.clock = now;
        self.drain();
    }

    /// Handle one event.
    pub fn dispatch(&mut self, event: Event, now: Instant) {
        self.clock = now;
        self.handle(event);
    }

    /// Fire the text re-parse if its deadline has passed. Returns `true` if
    /// it fired.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.clock = now;
        self.drain();
        if !self.debounce.poll(now) {
            return false;
        }
        self.apply_editor_text();
        true
    }

    fn drain(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle(event);
        }
    }

    /// Handle input queued before a structural change, unless a guarded
    /// section is already running.
    fn drain_user_events(&mut self) {
        if self.guards.is_empty() {
            self.drain();
        }
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Scene(SceneEvent::Created(handle)) => self.on_scene_created(handle),
            Event::Scene(SceneEvent::Changed { handle, interacting }) => self.on_scene_changed(handle, interacting),
            Event::Scene(SceneEvent::SelectionChanged) => self.on_selection_changed(),
            Event::Scene(SceneEvent::ZOrderChanged) => self.on_z_order_changed(),
            Event::Editor(EditorEvent::TextChanged) => self.on_text_changed(),
            Event::Editor(EditorEvent::CursorMoved) => self.on_cursor_moved(),
            Event::Worker(WorkerEvent::ExtractionFinished { request, raw }) => {
                self.on_extraction_finished(request, &raw);
            }
            Event::Worker(WorkerEvent::ExtractionFailed { request, message }) => {
                self.on_extraction_failed(request, &message);
            }
            Event::Worker(WorkerEvent::AlignmentFinished { request, id, result }) => {
                self.on_alignment_finished(request, &id, &result);
            }
            Event::Worker(WorkerEvent::AlignmentFailed { request, id, message }) => {
                self.on_alignment_failed(request, &id, &message);
            }
        }
    }

    /// Run `f` with `guard` held, then handle the events it produced while
    /// the guard is still held. A guard that was already held stays held.
    ///
    /// Events queued before the outermost guard is taken are user input and
    /// are handled first, unguarded.
    fn with_guard<R>(&mut self, guard: Guard, f: impl FnOnce(&mut Self) -> R) -> R {
        self.drain_user_events();
        let fresh = self.guards.insert(guard);
        let out = f(self);
        self.drain();
        if fresh {
            self.guards.remove(guard);
        }
        out
    }

    // -------------------------------------------------------------------------
    // Scene → Document
    // -------------------------------------------------------------------------

    fn ensure_linked_document(&mut self) {
        if self.draft.is_none() {
            self.draft = Some(Draft::new());
        }
        if !self.link.is_linked() {
            self.link = LinkState::Linked;
            self.rebuild_index();
            info!("linked from scene edit");
        }
    }

    fn on_scene_created(&mut self, handle: ItemHandle) {
        if self.guards.contains(Guard::RebuildingScene) {
            debug!(?handle, "item created during rebuild; ignored");
            return;
        }
        if self.canvas.item_owner(handle).is_some() {
            return;
        }
        self.ensure_linked_document();

        let Some(mut rec) = self.canvas.export_record(handle) else {
            return;
        };
        let id = match rec.id() {
            Some(id) => id.to_string(),
            None => self.canvas.item_id(handle).unwrap_or_else(|| self.ids.new_id()),
        };
        self.ids.observe(&id);
        rec.set_id(id.clone());
        self.canvas.set_item_id(handle, &id);

        let existing = self.index.get(&id);
        if let Some(draft) = self.draft.as_mut() {
            let records = draft.annotations_mut();
            match existing.and_then(|i| records.get_mut(i)) {
                Some(slot) => slot.merge_from(&rec),
                None => records.push(rec),
            }
        }
        self.rebuild_index();
        debug!(id = %id, "record added from scene");
        self.push_document("Added item from scene; draft JSON updated.", Some(&id));
    }

    fn on_scene_changed(&mut self, handle: ItemHandle, interacting: bool) {
        if self.guards.contains(Guard::RebuildingScene) {
            debug!(?handle, "item changed during rebuild; ignored");
            return;
        }
        self.ensure_linked_document();

        let Some(id) = self.canvas.item_id(handle) else {
            return;
        };
        let Some(mut fresh) = self.canvas.export_record(handle) else {
            return;
        };
        fresh.set_id(id.clone());

        if let Some(owner) = self.canvas.item_owner(handle) {
            self.merge_group_member(&owner, &id, &fresh, interacting);
            return;
        }

        let Some(i) = self.index.get(&id) else {
            self.on_scene_created(handle);
            return;
        };
        let merged = self
            .draft
            .as_mut()
            .and_then(|d| d.annotations_mut().get_mut(i))
            .map(|stored| stored.merge_from(&fresh))
            .is_some();
        if !merged {
            self.rebuild_index();
            return;
        }
        let focus = (!interacting).then_some(id.as_str());
        self.push_document("Draft JSON updated from scene change.", focus);
    }

    fn merge_group_member(&mut self, owner: &str, id: &str, fresh: &AnnotationRecord, interacting: bool) {
        let Some(i) = self.index.get(owner) else {
            debug!(owner, id, "member of unindexed group; ignored");
            return;
        };
        let merged = self
            .draft
            .as_mut()
            .and_then(|d| d.annotations_mut().get_mut(i))
            .is_some_and(|group| merge_member(group, id, fresh));
        if !merged {
            debug!(owner, id, "group member not found in record");
            return;
        }
        let focus = (!interacting).then_some(id);
        self.push_document("Draft JSON updated from scene change.", focus);
    }

    fn on_z_order_changed(&mut self) {
        if self.guards.contains(Guard::RebuildingScene) || !self.link.is_linked() {
            return;
        }
        let Some(draft) = self.draft.as_mut() else {
            return;
        };
        for handle in self.canvas.mirrored() {
            if self.canvas.item_owner(handle).is_some() {
                continue;
            }
            let Some(id) = self.canvas.item_id(handle) else {
                continue;
            };
            let (Some(i), Some(z)) = (self.index.get(&id), self.canvas.item_z(handle)) else {
                continue;
            };
            if let Some(rec) = draft.annotations_mut().get_mut(i) {
                rec.set_z(z);
            }
        }
        self.push_document("Z-order updated.", None);
    }

    fn on_selection_changed(&mut self) {
        if self.guards.contains(Guard::HandlingSelection) {
            debug!("selection changed while handling selection; ignored");
            return;
        }
        self.with_guard(Guard::HandlingSelection, |this| {
            if this.guards.contains(Guard::RebuildingScene) {
                return;
            }
            match this.canvas.selection().into_iter().next() {
                Some(id) => {
                    this.editor.set_highlight(Some(&id));
                    if this.editor.scroll_to(&id) {
                        this.status(format!("Focused id: {id}"));
                    }
                }
                None => this.editor.set_highlight(None),
            }
        });
    }

    /// Serialize the document and write it into the editor.
    fn push_document(&mut self, status: &str, focus: Option<&str>) {
        let Some(draft) = self.draft.as_ref() else {
            return;
        };
        let text = match doc::serialize(draft, self.config.indent) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "document could not be serialized");
                self.status(e.to_string());
                return;
            }
        };
        self.with_guard(Guard::WritingEditor, |this| this.editor.set_text(&text, true));
        self.import_enabled = true;
        if !status.is_empty() {
            self.status(status);
        }
        if let Some(id) = focus {
            if self.guards.contains(Guard::HandlingSelection) {
                return;
            }
            if self.editor.scroll_to(id) {
                self.status(format!("Focused id: {id}"));
            }
        }
    }

    // -------------------------------------------------------------------------
    // Document → Scene
    // -------------------------------------------------------------------------

    fn on_text_changed(&mut self) {
        if self.guards.contains(Guard::WritingEditor) {
            debug!("text change from controller write; ignored");
            return;
        }
        if self.link.is_linked() {
            self.debounce.schedule(self.clock);
            return;
        }
        match doc::parse(&self.editor.text()) {
            Ok(_) => self.import_enabled = true,
            Err(DocError::Parse(_)) => {
                self.import_enabled = false;
                self.status("Invalid JSON.");
            }
            Err(e) => {
                self.import_enabled = false;
                self.status(e.to_string());
            }
        }
    }

    fn apply_editor_text(&mut self) {
        if self.guards.contains(Guard::WritingEditor) || !self.link.is_linked() {
            debug!("text re-parse skipped");
            return;
        }
        let mut draft = match doc::parse(&self.editor.text()) {
            Ok(draft) => draft,
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "editor text rejected");
                self.status(e.to_string());
                return;
            }
        };
        let assigned = self.prepare_records(draft.annotations_mut());
        self.draft = Some(draft);
        self.rebuild_index();
        self.rebuild_scene();
        if assigned > 0 {
            self.push_document("Added missing ids; scene updated.", None);
        } else {
            self.status("Scene updated from JSON.");
        }
    }

    /// Give every record (and group member) a unique id and renderable style.
    /// Returns the number of ids assigned.
    fn prepare_records(&mut self, records: &mut [AnnotationRecord]) -> usize {
        for rec in records.iter() {
            observe_ids(&mut self.ids, rec);
        }
        let mut seen = HashSet::new();
        let mut assigned = 0;
        for rec in records.iter_mut() {
            assigned += assign_ids(&mut self.ids, rec, &mut seen);
            fill_default_style(rec);
        }
        assigned
    }

    fn rebuild_index(&mut self) {
        match self.draft.as_ref() {
            Some(draft) => self.index.rebuild(draft.annotations()),
            None => self.index.clear(),
        }
    }

    /// Replace every mirrored item with one per record, keeping the
    /// selection when its record survives.
    fn rebuild_scene(&mut self) {
        let Some(draft) = self.draft.clone() else {
            return;
        };
        let selected = self.canvas.selection().into_iter().next();

        let restored = self.with_guard(Guard::RebuildingScene, |this| {
            for handle in this.canvas.mirrored() {
                this.canvas.remove(handle);
            }
            let mut created = 0usize;
            let mut skipped = 0usize;
            for rec in draft.annotations() {
                this.instantiate(rec, None, &mut created, &mut skipped);
            }
            info!(created, skipped, "scene rebuilt from document");
            if skipped > 0 {
                this.status(format!("Skipped {skipped} record(s) of unknown kind."));
            }
            match selected {
                Some(id) if this.canvas.find(&id).is_some() => {
                    this.canvas.set_selection(std::slice::from_ref(&id));
                    Some(id)
                }
                _ => None,
            }
        });

        if let Some(id) = restored {
            self.editor.set_highlight(Some(&id));
            self.editor.scroll_to(&id);
        }
    }

    fn instantiate(&mut self, rec: &AnnotationRecord, owner: Option<&str>, created: &mut usize, skipped: &mut usize) {
        match rec.kind() {
            Some(Kind::Group) => {
                let owner = owner.or_else(|| rec.id()).map(str::to_string);
                for child in rec.children() {
                    self.instantiate(&child, owner.as_deref(), created, skipped);
                }
            }
            Some(_) => {
                if let Some(spec) = ItemSpec::from_record(rec, owner) {
                    self.canvas.create(&spec);
                    *created += 1;
                }
            }
            None => {
                let err = SyncError::UnknownKind(rec.kind_name().unwrap_or("").to_string());
                warn!(id = rec.id().unwrap_or(""), error = %err, "record skipped");
                *skipped += 1;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Cursor → Selection
    // -------------------------------------------------------------------------

    fn on_cursor_moved(&mut self) {
        if self.guards.contains(Guard::HandlingSelection) || self.guards.contains(Guard::WritingEditor) {
            return;
        }
        let id = self.editor.annotation_at_cursor();
        if id == self.cursor_annotation {
            return;
        }
        self.cursor_annotation.clone_from(&id);
        self.select_from_cursor(id);
    }

    fn select_from_cursor(&mut self, id: Option<String>) {
        let Some(id) = id else {
            self.editor.set_highlight(None);
            if self.link.is_linked() {
                self.with_guard(Guard::HandlingSelection, |this| this.canvas.set_selection(&[]));
            }
            return;
        };
        self.editor.set_highlight(Some(&id));
        if !self.link.is_linked() {
            return;
        }
        if self.canvas.find(&id).is_some() {
            self.with_guard(Guard::HandlingSelection, |this| {
                this.canvas.set_selection(std::slice::from_ref(&id));
            });
            self.status(format!("Selected from editor: {id}"));
        } else {
            self.with_guard(Guard::HandlingSelection, |this| this.canvas.set_selection(&[]));
            self.status(format!("Annotation in JSON: {id} (no canvas item)"));
        }
    }

    // -------------------------------------------------------------------------
    // Structural operations
    // -------------------------------------------------------------------------

    /// Parse the editor text and adopt it as the linked document, rescaling
    /// geometry to the loaded image.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Doc`] if the text is empty, malformed or has the
    /// wrong shape. State is unchanged and a failure notice is queued.
    pub fn import_and_link(&mut self) -> Result<(), SyncError> {
        let text = self.editor.text();
        let parsed = if text.trim().is_empty() {
            Err(DocError::Parse("draft text is empty".into()))
        } else {
            doc::parse(&text)
        };
        match parsed {
            Ok(draft) => {
                self.import_draft(draft, "Linked. Edits in JSON or scene will stay in sync.");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "import rejected");
                self.failure("Import/Link failed", e.to_string());
                Err(e.into())
            }
        }
    }

    fn import_draft(&mut self, mut draft: Draft, status: &str) {
        if let Some(actual) = self.image {
            let declared = draft.image_size();
            let max = self.config.normalized_max;
            let reconciled: Vec<AnnotationRecord> = draft
                .annotations()
                .iter()
                .filter(|r| is_importable(r))
                .map(|r| geom::reconcile(r, actual, declared, max))
                .collect();
            *draft.annotations_mut() = reconciled;
        }
        let assigned = self.prepare_records(draft.annotations_mut());
        let records = draft.len();

        self.draft = Some(draft);
        self.link = LinkState::Linked;
        self.debounce.cancel();
        self.rebuild_index();
        info!(records, assigned, "draft imported and linked");
        self.rebuild_scene();
        self.push_document(status, None);

        self.cursor_annotation = self.editor.annotation_at_cursor();
        if self.cursor_annotation.is_some() {
            self.select_from_cursor(self.cursor_annotation.clone());
        }
    }

    /// Remove the visual objects and records carrying `ids`. A group id
    /// removes all of its members' items.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownId`] if an id matches neither an item nor
    /// a record. Nothing is removed in that case.
    pub fn delete(&mut self, ids: &[String]) -> Result<usize, SyncError> {
        self.drain_user_events();
        for id in ids {
            let in_scene = self.canvas.mirrored().into_iter().any(|h| {
                self.canvas.item_id(h).as_ref() == Some(id) || self.canvas.item_owner(h).as_ref() == Some(id)
            });
            if !in_scene && !self.index.contains(id) {
                return Err(SyncError::UnknownId(id.clone()));
            }
        }

        let removed = self.with_guard(Guard::RebuildingScene, |this| {
            let mut removed = 0;
            for handle in this.canvas.mirrored() {
                let hit = this.canvas.item_id(handle).is_some_and(|i| ids.contains(&i))
                    || this.canvas.item_owner(handle).is_some_and(|o| ids.contains(&o));
                if hit && this.canvas.remove(handle) {
                    removed += 1;
                }
            }
            removed
        });

        if self.link.is_linked() {
            if let Some(draft) = self.draft.as_mut() {
                let records = draft.annotations_mut();
                records.retain(|r| !carries_any(r, ids));
                for rec in records.iter_mut() {
                    remove_members(rec, ids);
                }
            }
            self.rebuild_index();
            self.push_document(&format!("Deleted {} item(s).", ids.len()), None);
        }
        info!(requested = ids.len(), removed, "annotations deleted");
        Ok(removed)
    }

    /// Delete whatever is selected in the scene.
    ///
    /// # Errors
    ///
    /// See [`Self::delete`].
    pub fn delete_selected(&mut self) -> Result<usize, SyncError> {
        let selected = self.canvas.selection();
        if selected.is_empty() {
            return Ok(0);
        }
        self.delete(&selected)
    }

    /// Remove every mirrored item. Decorations stay. When linked, the
    /// annotation list is emptied too; the link state is kept.
    pub fn clear_overlay(&mut self) {
        self.with_guard(Guard::RebuildingScene, |this| {
            this.canvas.set_selection(&[]);
            for handle in this.canvas.mirrored() {
                this.canvas.remove(handle);
            }
        });
        if self.link.is_linked() {
            if let Some(draft) = self.draft.as_mut() {
                draft.annotations_mut().clear();
                self.rebuild_index();
                self.push_document("Overlay cleared; draft JSON updated.", None);
            }
        }
        info!("overlay cleared");
    }

    /// Move two or more top-level records into a new group record.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotLinked`] without a linked document,
    /// [`SyncError::InvalidGroup`] for fewer than two ids, and
    /// [`SyncError::UnknownId`] for an id with no top-level record.
    pub fn group(&mut self, ids: &[String]) -> Result<String, SyncError> {
        self.drain_user_events();
        if !self.link.is_linked() || self.draft.is_none() {
            return Err(SyncError::NotLinked);
        }
        let unique: HashSet<&str> = ids.iter().map(String::as_str).collect();
        if unique.len() < 2 {
            return Err(SyncError::InvalidGroup("need at least two annotations".into()));
        }
        let mut positions = Vec::with_capacity(unique.len());
        for id in &unique {
            let i = self.index.get(id).ok_or_else(|| SyncError::UnknownId((*id).to_string()))?;
            positions.push(i);
        }
        positions.sort_unstable();

        let group_id = self.ids.new_group_id();
        if let Some(draft) = self.draft.as_mut() {
            let records = draft.annotations_mut();
            let members: Vec<AnnotationRecord> = positions.iter().filter_map(|&i| records.get(i).cloned()).collect();
            let z = members.iter().map(AnnotationRecord::z).max().unwrap_or(0);
            let mut kept = Vec::with_capacity(records.len());
            for (i, rec) in records.drain(..).enumerate() {
                if positions.binary_search(&i).is_err() {
                    kept.push(rec);
                }
            }
            let mut group = AnnotationRecord::new(Kind::Group, Fields::new());
            group.set_id(group_id.clone());
            group.set_children(members);
            group.set_z(z);
            kept.push(group);
            *records = kept;
        }
        self.rebuild_index();
        self.rebuild_scene();
        info!(id = %group_id, members = positions.len(), "annotations grouped");
        self.push_document(&format!("Grouped {} items.", positions.len()), Some(&group_id));
        Ok(group_id)
    }

    /// Dissolve a group record, appending its members as top-level records.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotLinked`] without a linked document,
    /// [`SyncError::UnknownId`] if `id` has no top-level record, and
    /// [`SyncError::InvalidGroup`] if that record is not a group.
    pub fn ungroup(&mut self, id: &str) -> Result<usize, SyncError> {
        self.drain_user_events();
        if !self.link.is_linked() {
            return Err(SyncError::NotLinked);
        }
        let i = self.index.get(id).ok_or_else(|| SyncError::UnknownId(id.to_string()))?;
        let Some(draft) = self.draft.as_mut() else {
            return Err(SyncError::NotLinked);
        };
        let records = draft.annotations_mut();
        if records.get(i).and_then(AnnotationRecord::kind) != Some(Kind::Group) {
            return Err(SyncError::InvalidGroup(format!("{id} is not a group")));
        }
        let group = records.remove(i);
        let children = group.children();
        let count = children.len();
        records.extend(children);

        self.rebuild_index();
        self.rebuild_scene();
        info!(id, members = count, "group dissolved");
        self.push_document(&format!("Ungrouped {count} items."), None);
        Ok(count)
    }

    /// Install a background image of the given pixel size. Imports rescale
    /// against it from now on.
    pub fn load_image(&mut self, size: ImageSize) {
        self.image = Some(size);
        self.canvas.set_background(size);
        info!(width = size.width, height = size.height, "background image loaded");
    }

    /// Start over: empty scene, no document, no image, unlinked. Outstanding
    /// requests are forgotten so their completions are discarded.
    pub fn reset(&mut self) {
        self.with_guard(Guard::RebuildingScene, |this| this.canvas.clear());
        self.with_guard(Guard::WritingEditor, |this| this.editor.set_text("", true));
        self.draft = None;
        self.index.clear();
        self.link = LinkState::Unlinked;
        self.debounce.cancel();
        self.image = None;
        self.import_enabled = false;
        self.cursor_annotation = None;
        self.extraction = None;
        self.alignment = None;
        info!("session reset");
    }

    // -------------------------------------------------------------------------
    // Background requests
    // -------------------------------------------------------------------------

    /// Reserve the extraction slot.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RequestInFlight`] while another extraction is
    /// outstanding and [`SyncError::NoImage`] without a loaded image.
    pub fn begin_extraction(&mut self) -> Result<RequestId, SyncError> {
        if self.extraction.is_some() {
            return Err(SyncError::RequestInFlight(RequestKind::Extraction));
        }
        if self.image.is_none() {
            return Err(SyncError::NoImage);
        }
        let request = RequestId::new();
        self.extraction = Some(request);
        info!(%request, "extraction requested");
        Ok(request)
    }

    /// Reserve the alignment slot for one record.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RequestInFlight`] while another alignment is
    /// outstanding, [`SyncError::NotLinked`], [`SyncError::NoImage`], or
    /// [`SyncError::UnknownId`] if no item carries `id`.
    pub fn begin_alignment(&mut self, id: &str) -> Result<RequestId, SyncError> {
        if self.alignment.is_some() {
            return Err(SyncError::RequestInFlight(RequestKind::Alignment));
        }
        if !self.link.is_linked() {
            return Err(SyncError::NotLinked);
        }
        if self.image.is_none() {
            return Err(SyncError::NoImage);
        }
        if self.canvas.find(id).is_none() {
            return Err(SyncError::UnknownId(id.to_string()));
        }
        let request = RequestId::new();
        self.alignment = Some(request);
        info!(%request, id, "alignment requested");
        Ok(request)
    }

    fn on_extraction_finished(&mut self, request: RequestId, raw: &str) {
        if self.extraction != Some(request) {
            debug!(%request, "stale extraction result discarded");
            return;
        }
        self.extraction = None;
        let Some(value) = doc::extract_first_json_object(raw) else {
            warn!(%request, "extraction output has no JSON object");
            self.failure("Extraction failed", "Model output did not contain a JSON object.");
            return;
        };
        match Draft::from_value(value) {
            Ok(draft) => self.import_draft(draft, "Extraction complete; draft linked."),
            Err(e) => {
                warn!(%request, error = %e, "extraction output rejected");
                self.failure("Extraction failed", e.to_string());
            }
        }
    }

    fn on_extraction_failed(&mut self, request: RequestId, message: &str) {
        if self.extraction != Some(request) {
            debug!(%request, "stale extraction failure discarded");
            return;
        }
        self.extraction = None;
        warn!(%request, reason = message, "extraction failed");
        self.failure("Extraction failed", message);
    }

    fn on_alignment_finished(&mut self, request: RequestId, id: &str, result: &Alignment) {
        if self.alignment != Some(request) {
            debug!(%request, "stale alignment result discarded");
            return;
        }
        self.alignment = None;
        let Some(handle) = self.canvas.find(id) else {
            let err = SyncError::UnknownId(id.to_string());
            warn!(%request, error = %err, "alignment target gone");
            self.status(err.to_string());
            return;
        };
        self.canvas.apply_alignment(handle, result);
        self.drain();
        self.status(format!("Alignment applied to {id}."));
    }

    fn on_alignment_failed(&mut self, request: RequestId, id: &str, message: &str) {
        if self.alignment != Some(request) {
            debug!(%request, "stale alignment failure discarded");
            return;
        }
        self.alignment = None;
        warn!(%request, id, reason = message, "alignment failed");
        self.failure("Alignment failed", message);
    }
}

// =============================================================================
// RECORD HELPERS
// =============================================================================

/// Records without a kind, and non-group records without geometry, are
/// dropped on import.
fn is_importable(rec: &AnnotationRecord) -> bool {
    match rec.kind_name() {
        None => false,
        Some(_) if rec.kind() == Some(Kind::Group) => true,
        Some(_) => rec.get("geom").is_some(),
    }
}

fn observe_ids(ids: &mut IdRegistry, rec: &AnnotationRecord) {
    if let Some(id) = rec.id() {
        ids.observe(id);
    }
    for child in rec.children() {
        observe_ids(ids, &child);
    }
}

fn assign_ids(ids: &mut IdRegistry, rec: &mut AnnotationRecord, seen: &mut HashSet<String>) -> usize {
    let mut assigned = 0;
    let is_group = rec.kind() == Some(Kind::Group);
    let needs_id = rec.id().is_none_or(|id| seen.contains(id));
    if needs_id {
        let id = if is_group { ids.new_group_id() } else { ids.new_id() };
        rec.set_id(id);
        assigned += 1;
    }
    if let Some(id) = rec.id() {
        seen.insert(id.to_string());
    }
    if is_group && rec.get("children").is_some_and(Value::is_array) {
        let mut children = rec.children();
        for child in &mut children {
            assigned += assign_ids(ids, child, seen);
        }
        rec.set_children(children);
    }
    assigned
}

fn carries_any(rec: &AnnotationRecord, ids: &[String]) -> bool {
    rec.id().is_some_and(|id| ids.iter().any(|d| d == id))
}

/// Drop the members of `group` carrying any of `ids`, searching nested
/// groups. Returns how many were dropped.
fn remove_members(group: &mut AnnotationRecord, ids: &[String]) -> usize {
    if group.kind() != Some(Kind::Group) || !group.get("children").is_some_and(Value::is_array) {
        return 0;
    }
    let mut children = group.children();
    let before = children.len();
    children.retain(|c| !carries_any(c, ids));
    let mut dropped = before - children.len();
    for child in &mut children {
        dropped += remove_members(child, ids);
    }
    if dropped > 0 {
        group.set_children(children);
    }
    dropped
}

/// Merge `fresh` into the member of `group` carrying `id`, searching nested
/// groups. Returns `false` if no member carries it.
fn merge_member(group: &mut AnnotationRecord, id: &str, fresh: &AnnotationRecord) -> bool {
    let mut children = group.children();
    let mut hit = false;
    for child in &mut children {
        if child.id() == Some(id) {
            child.merge_from(fresh);
            hit = true;
            break;
        }
        if child.kind() == Some(Kind::Group) && merge_member(child, id, fresh) {
            hit = true;
            break;
        }
    }
    if hit {
        group.set_children(children);
    }
    hit
}
