pub mod crypto;
pub mod errors;
pub mod ids;
pub mod time;

pub use errors::{AppError, DomainError};
pub use ids::*;
pub use time::TimeSpec;
