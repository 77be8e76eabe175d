pub mod cache;
pub mod error;
pub mod lock;
pub mod provider;
pub mod retry;
pub mod schema;

pub use cache::*;
pub use error::*;
pub use lock::*;
pub use provider::SqliteDataProvider;
pub use retry::*;
pub use schema::*;
