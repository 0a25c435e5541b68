//! Bidirectional synchronization between an annotation document and a live scene.
//!
//! This crate keeps two representations of the same annotation set consistent:
//! a serializable draft document (ordered annotation records with stable ids)
//! and a scene of manipulable visual objects. Either side may act at any time;
//! the [`controller::SyncController`] reconciles the change without feedback
//! loops and without dropping fields the other side does not understand.
//!
//! The crate has no async runtime and no GUI dependency. The canvas and the
//! text editor are reached through the [`scene::Canvas`] and
//! [`editor::Editor`] traits; in-memory implementations of both ship here so
//! the whole protocol can be exercised headless.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`controller`] | Sync controller: link state, guards, both propagation paths |
//! | [`doc`] | Annotation records, draft documents, normalization, canonical ordering |
//! | [`geom`] | Coordinate-space detection and rescaling |
//! | [`ids`] | Annotation id generation and the id → position index |
//! | [`scene`] | Canvas collaborator contract and the in-memory [`scene::Scene`] |
//! | [`editor`] | Editor collaborator contract and the in-memory [`editor::TextBuffer`] |
//! | [`locate`] | Locating annotation spans inside serialized text |
//! | [`event`] | Events flowing from collaborators and workers to the controller |
//! | [`debounce`] | Restartable single-shot deadline for parse-on-edit |
//! | [`guard`] | Link state and reentrancy guard set |
//! | [`config`] | Environment-driven tuning knobs |
//! | [`consts`] | Shared constants (id format, defaults, key order) |

pub mod config;
pub mod consts;
pub mod controller;
pub mod debounce;
pub mod doc;
pub mod editor;
pub mod event;
pub mod geom;
pub mod guard;
pub mod ids;
pub mod locate;
pub mod scene;

/// Grepable error code and retryable flag for structured error reporting.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
