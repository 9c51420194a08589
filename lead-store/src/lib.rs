pub mod cache;
pub mod error;
pub mod fake;
pub mod gateway;
pub mod rows;

pub use cache::EligibilityCache;
pub use error::GatewayError;
pub use fake::FakeGateway;
pub use gateway::{EligibilityCandidate, PersistenceGateway, PostgresGateway, QueuedJob};
