pub mod config;
pub mod mdns;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::{Config, HttpsMode, RegistryConfig};
pub use routes::app;
pub use state::AppState;

use uuid::Uuid;

/// A grain source id that is stable for the lifetime of this process:
/// a name-based UUID over the pid and hostname.
pub fn source_id() -> Uuid {
    let host = hostname::get().map(|h| h.to_string_lossy().into_owned()).unwrap_or_else(|_| "localhost".to_string());
    let seed = format!("{}{}", std::process::id(), host);
    Uuid::new_v3(&Uuid::NAMESPACE_DNS, seed.as_bytes())
}
