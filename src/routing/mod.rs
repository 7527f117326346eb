//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (before serving):
//!     template string + handler
//!     → pattern.rs (compile to anchored regex, collect parameter names)
//!     → router.rs (append to ordered route table)
//!
//! Lookup (per request):
//!     request path (query stripped)
//!     → router.rs (lazy scan in registration order)
//!     → pattern.rs (match + capture parameters)
//!     → MatchedRoute stream consumed by the dispatcher
//! ```
//!
//! # Design Decisions
//! - Routes are frozen once dispatch begins (shared via Arc, no locks)
//! - Registration order is significant: first registered, first tried
//! - Lookup is lazy so the dispatcher can stop at the first route that fulfills

pub mod pattern;
pub mod router;

pub use pattern::{Params, PatternError, RoutePattern};
pub use router::{
    Handler, HandlerKind, Matches, MatchedRoute, MiddlewareFn, Route, Router, TerminalFn,
    UpgradeFn,
};
