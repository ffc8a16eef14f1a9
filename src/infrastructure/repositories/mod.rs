//! Repository implementations using SeaORM

pub mod book_repository;
pub mod relationship_repository;

pub use book_repository::SeaOrmBookRepository;
pub use relationship_repository::SeaOrmRelationshipRepository;
