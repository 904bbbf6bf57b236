//! In-process session storage.
//!
//! Sessions are [`crate::Context`] instances keyed by the client's
//! `sessionId` cookie, held in a [`SessionMap`] with expiry-ordered
//! eviction.

mod map;

pub use map::SessionMap;
