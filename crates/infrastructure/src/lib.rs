pub mod config;
pub mod database;
pub mod http_transport;
pub mod interest_registry;
pub mod process_launcher;
pub mod service_registry;

pub use config::{ConfigurationCache, ConfigurationManager};
pub use database::*;
pub use http_transport::HttpServiceTransport;
pub use interest_registry::InterestRegistry;
pub use process_launcher::TokioProcessLauncher;
pub use service_registry::ServiceRegistry;
