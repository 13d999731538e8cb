//! Thread-safety bounds shared by the bridge traits.
//!
//! Completions run on platform worker threads, so streams, callbacks and
//! queues must be shareable across them. Pipelines are owned by a single
//! reader or writer and only need to move between threads.

/// Bound for objects shared with platform worker threads.
pub trait PlatformSendSync: Send + Sync {}

impl<T> PlatformSendSync for T where T: Send + Sync + ?Sized {}

/// Bound for objects that move to another thread but are never shared.
pub trait PlatformSend: Send {}

impl<T> PlatformSend for T where T: Send + ?Sized {}
