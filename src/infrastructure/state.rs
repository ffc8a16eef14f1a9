//! Application state containing repositories and shared resources

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::domain::{BookRepository, RelationshipRepository};
use crate::infrastructure::config::Config;
use crate::infrastructure::{SeaOrmBookRepository, SeaOrmRelationshipRepository};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Book repository
    pub book_repo: Arc<dyn BookRepository>,
    /// Membership repository
    pub relationship_repo: Arc<dyn RelationshipRepository>,
}

impl AppState {
    /// Create a new AppState with all repositories initialized
    pub fn new(db: DatabaseConnection, config: &Config) -> Self {
        let book_repo: Arc<dyn BookRepository> = Arc::new(SeaOrmBookRepository::new(db.clone()));
        let relationship_repo = Arc::new(
            SeaOrmRelationshipRepository::new(db, book_repo.clone())
                .with_upsert_attempts(config.upsert_attempts),
        );

        Self {
            book_repo,
            relationship_repo,
        }
    }
}
