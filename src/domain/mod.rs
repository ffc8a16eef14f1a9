//! Domain layer - Pure business abstractions
//!
//! This layer contains no Axum code; SeaORM appears only in the error conversion.
//! Only trait definitions and domain error types.

pub mod errors;
pub mod repositories;

pub use errors::DomainError;
pub use repositories::*;
