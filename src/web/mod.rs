//! Web API: processing status, entity curation and news reprocessing.

pub mod handlers;
pub mod server;

pub use handlers::AppState;
pub use server::WebServer;
