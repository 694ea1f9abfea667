// Telesignal API Library
//
// HTTP signaling and presence endpoints on top of telesignal-core

pub mod http;

// Re-export commonly used types
pub use http::{create_router, AppState};
