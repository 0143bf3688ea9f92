pub mod configuration;
pub mod process;
pub mod repository;
pub mod transport;

pub use configuration::*;
pub use process::*;
pub use repository::*;
pub use transport::*;
