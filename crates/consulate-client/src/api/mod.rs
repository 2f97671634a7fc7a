//! API endpoint implementations.

mod agent;
mod catalog;
mod events;
mod health;
mod kv;
mod sessions;
mod status;

pub use agent::AgentApi;
pub use catalog::CatalogApi;
pub use events::EventsApi;
pub use health::HealthApi;
pub use kv::KvApi;
pub use sessions::SessionsApi;
pub use status::StatusApi;
