//! API module
//!
//! Thin HTTP boundary over the Finance Service. Authentication and
//! session handling live outside this core; the actor id is read from a
//! header at this boundary.

pub mod routes;

pub use routes::create_router;
