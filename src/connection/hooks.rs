//! Lifecycle hook table.
//!
//! One ordered function list per (event, phase) pair. Before-hooks fold
//! over their arguments; after-hooks are fire-and-forget and see the
//! original, pre-mutation arguments.

use bytes::Bytes;

/// Notification hook: open/close/connection-error phases.
pub type Hook = Box<dyn FnMut()>;

/// Transforming hook: receives the chunk batch, returns the replacement.
pub type BeforeChunkHook = Box<dyn FnMut(Vec<Bytes>) -> Vec<Bytes>>;

/// Observing hook: sees the original chunk batch.
pub type AfterChunkHook = Box<dyn FnMut(&[Bytes])>;

#[derive(Default)]
pub struct HookTable {
    pub after_open: Vec<Hook>,
    pub before_chunk: Vec<BeforeChunkHook>,
    pub after_chunk: Vec<AfterChunkHook>,
    pub before_close: Vec<Hook>,
    pub after_close: Vec<Hook>,
    pub after_connection_error: Vec<Hook>,
}
