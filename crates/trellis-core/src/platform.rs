//! Platform abstraction for scheduling reconciliation.
//!
//! The core never drives itself. When a controller becomes dirty the
//! runtime asks the host, through [`RuntimeScheduler`], to flush at the
//! next opportunity; the host later calls
//! [`Reconciler::flush`](crate::Reconciler::flush) on the thread that owns
//! the tree.

/// Schedules flushes on behalf of the runtime.
///
/// Implementations must be safe to call from multiple threads since load
/// futures may wake the scheduler from anywhere.
pub trait RuntimeScheduler: Send + Sync {
    /// Request that the host run a flush soon.
    fn request_flush(&self);
}
