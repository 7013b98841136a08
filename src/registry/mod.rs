//! Session registry
//!
//! The registry owns the mapping from session ids to live outbound message
//! channels. It is the single piece of shared mutable state in the relay:
//! every connection task goes through it, protected by one `RwLock`.
//!
//! Delivery into a session's channel is always a `try_send` on a bounded
//! queue. A peer that stops draining its websocket fills its own channel
//! and starts losing messages; it never blocks the registry lock or
//! delivery to anyone else.
//!
//! Lookup of an unknown or closed id returns `None`, never an error:
//! callers treat absence as a normal, silently-dropped case.

pub mod entry;
pub mod store;

pub use entry::SessionEntry;
pub use store::SessionRegistry;
