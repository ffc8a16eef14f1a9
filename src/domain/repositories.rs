//! Repository trait definitions
//!
//! These traits define the contract for data access.
//! Implementations live in the infrastructure layer.

use async_trait::async_trait;

use super::DomainError;
use crate::models::book::Book;
use crate::models::relationship::{self, Role};

/// One membership grant: a member holding a role inside a book
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Relationship {
    pub id: i32,
    pub member_id: i32,
    pub book_id: i32,
    pub role: Role,
}

impl From<relationship::Model> for Relationship {
    fn from(model: relationship::Model) -> Self {
        Self {
            id: model.id,
            member_id: model.member_id,
            book_id: model.book_id,
            role: model.role,
        }
    }
}

/// Input for creating a relationship row directly
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CreateRelationshipInput {
    pub member_id: i32,
    pub book_id: i32,
    pub role: Role,
}

/// Repository trait for Book entity.
///
/// The relationship store only needs `exists`; the rest lets callers
/// create the books that memberships point at.
#[async_trait]
pub trait BookRepository: Send + Sync {
    /// Check whether a book with this ID exists
    async fn exists(&self, id: i32) -> Result<bool, DomainError>;

    /// Find a single book by ID
    async fn find_by_id(&self, id: i32) -> Result<Option<Book>, DomainError>;

    /// Create a new book
    async fn create(&self, title: String) -> Result<Book, DomainError>;
}

/// Repository trait for membership rows
#[async_trait]
pub trait RelationshipRepository: Send + Sync {
    /// Find a row by its primary key
    async fn find_by_id(&self, id: i32) -> Result<Relationship, DomainError>;

    /// Find the row of a member inside a book
    async fn find_by_book_and_member(
        &self,
        book_id: i32,
        member_id: i32,
    ) -> Result<Relationship, DomainError>;

    /// Role of a member inside a book
    async fn find_role(&self, book_id: i32, member_id: i32) -> Result<Role, DomainError>;

    /// All members of a book, founder first
    async fn list_by_book(&self, book_id: i32) -> Result<Vec<Relationship>, DomainError>;

    /// The founder row of a book
    async fn find_founder(&self, book_id: i32) -> Result<Relationship, DomainError>;

    /// Set a member's role, creating the row on first join.
    /// The founder's role cannot be changed here.
    async fn update_role(
        &self,
        book_id: i32,
        member_id: i32,
        role: Role,
    ) -> Result<Relationship, DomainError>;

    /// Remove a member from a book. The founder cannot be removed.
    async fn delete(&self, book_id: i32, member_id: i32) -> Result<(), DomainError>;

    /// Insert a row as-is
    async fn insert(&self, input: CreateRelationshipInput) -> Result<Relationship, DomainError>;

    /// Overwrite every column of an existing row
    async fn update(&self, relationship: Relationship) -> Result<Relationship, DomainError>;

    /// Hand the founder role to another member; the old founder becomes admin
    async fn transfer(
        &self,
        book_id: i32,
        founder_id: i32,
        receiver_id: i32,
    ) -> Result<(), DomainError>;
}
