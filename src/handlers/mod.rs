pub mod exports;
pub mod health;
pub mod payouts;
pub mod settlements;
pub mod transactions;
pub mod webhooks;

use crate::{entities::Processor, errors::ServiceError};
use std::str::FromStr;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Resolves a processor path segment; unknown names are a 404.
pub(crate) fn parse_processor(segment: &str) -> Result<Processor, ServiceError> {
    Processor::from_str(segment)
        .map_err(|_| ServiceError::NotFound(format!("Unknown processor '{}'", segment)))
}
