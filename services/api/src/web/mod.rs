pub mod activity;
pub mod catalog;
pub mod fines;
pub mod loans;
pub mod members;
pub mod middleware;
pub mod notifications;
pub mod reservations;
pub mod rest;
pub mod router;
pub mod state;

// Re-export the router builder so the binary and the tests share one route table.
pub use router::build_router;
pub use middleware::{require_admin, require_member};
