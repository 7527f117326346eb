//! Session subsystem.
//!
//! # Data Flow
//! ```text
//! Response::start_session(value)
//!     → SessionStore::start_session → token
//!     → Set-Cookie: <cookie_name>=<token>
//!
//! Request::session()
//!     → Cookie header → token
//!     → SessionStore::get_session (refreshes deadline)
//!
//! Sweeper task (every lifetime):
//!     → drop entries whose deadline passed
//!     → stops on shutdown broadcast
//! ```
//!
//! # Design Decisions
//! - Process-local only; tokens are random v4 UUIDs
//! - Sliding expiry: each successful read extends the session
//! - Expiry is eventual; reads also evict entries found expired

pub mod memory;
pub mod store;

use std::collections::HashMap;

pub use memory::{MemorySessionStore, DEFAULT_COOKIE_NAME, DEFAULT_LIFETIME};
pub use store::SessionStore;

/// Default session payload: string attributes.
pub type SessionData = HashMap<String, String>;
