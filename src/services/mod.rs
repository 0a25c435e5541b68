//! Outbound services used by the session.
//!
//! ARCHITECTURE
//! ============
//! `gateway` talks HTTP to the extraction / alignment sidecar; `worker` runs
//! those calls on tokio tasks and reports back through the controller's
//! event channel, so the control thread is the only writer of state.

pub mod gateway;
pub mod worker;
