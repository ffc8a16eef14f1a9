//! SeaORM implementation of RelationshipRepository
//!
//! Founder rules enforced here:
//! - one founder row per book, created or moved only by `transfer`
//! - the founder's row is never changed by `update_role` nor removed by `delete`

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr,
    EntityTrait, QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait, Unchanged,
};

use crate::domain::{
    BookRepository, CreateRelationshipInput, DomainError, Relationship, RelationshipRepository,
};
use crate::models::relationship::{ActiveModel, Column, Entity as RelationshipEntity, Model, Role};

const PROJECT_NOT_FOUND: &str = "project not found";
const MEMBER_NOT_IN_PROJECT: &str = "member not in project";
const RELATIONSHIP_NOT_FOUND: &str = "relationship not found";
const FOUNDER_NOT_FOUND: &str = "project has no founder";
const CANNOT_CHANGE_FOUNDER: &str = "cannot change founder's role";
const FOUNDER_ONLY_BY_TRANSFER: &str = "founder can only be assigned by transfer";
const CANNOT_DELETE_FOUNDER: &str = "cannot delete founder";
const NOT_THE_FOUNDER: &str = "transferor is not the founder";
const CONCURRENT_CHANGE: &str = "membership changed concurrently";
const DELETE_FAILED: &str = "delete failed";

/// Failure inside a role write: either a rule was broken or storage refused
enum WriteError {
    Domain(DomainError),
    Db(DbErr),
}

impl From<DomainError> for WriteError {
    fn from(e: DomainError) -> Self {
        WriteError::Domain(e)
    }
}

impl From<DbErr> for WriteError {
    fn from(e: DbErr) -> Self {
        WriteError::Db(e)
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

async fn find_row<C: ConnectionTrait>(
    conn: &C,
    book_id: i32,
    member_id: i32,
) -> Result<Option<Model>, DbErr> {
    RelationshipEntity::find()
        .filter(Column::BookId.eq(book_id))
        .filter(Column::MemberId.eq(member_id))
        .one(conn)
        .await
}

/// Run `op` again while it fails on a unique-constraint race, at most `attempts` times.
/// The attempt number (starting at 1) is passed to `op`.
async fn retry_on_unique_race<T, F, Fut>(attempts: u32, mut op: F) -> Result<T, WriteError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, WriteError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op(attempt).await {
            Err(WriteError::Db(e)) if is_unique_violation(&e) && attempt < attempts => {
                tracing::warn!("Unique-constraint race on attempt {}, retrying: {}", attempt, e);
            }
            other => return other,
        }
    }
}

async fn rollback(txn: DatabaseTransaction, step: &str) {
    if let Err(e) = txn.rollback().await {
        tracing::error!("Rollback after failed {} also failed: {}", step, e);
    }
}

/// SeaORM-based implementation of RelationshipRepository
pub struct SeaOrmRelationshipRepository {
    db: DatabaseConnection,
    books: Arc<dyn BookRepository>,
    upsert_attempts: u32,
}

impl SeaOrmRelationshipRepository {
    pub fn new(db: DatabaseConnection, books: Arc<dyn BookRepository>) -> Self {
        Self {
            db,
            books,
            upsert_attempts: 3,
        }
    }

    pub fn with_upsert_attempts(mut self, attempts: u32) -> Self {
        self.upsert_attempts = attempts.max(1);
        self
    }

    /// One transactional read-then-write of a member's role.
    async fn write_role(
        &self,
        book_id: i32,
        member_id: i32,
        role: Role,
    ) -> Result<Model, WriteError> {
        let txn = self.db.begin().await?;

        let written = match find_row(&txn, book_id, member_id).await? {
            None => {
                // First join
                ActiveModel {
                    member_id: Set(member_id),
                    book_id: Set(book_id),
                    role: Set(role),
                    ..Default::default()
                }
                .insert(&txn)
                .await?
            }
            Some(existing) if existing.role.is_founder() => {
                return Err(DomainError::conflict(CANNOT_CHANGE_FOUNDER).into());
            }
            Some(existing) => {
                let mut active: ActiveModel = existing.into();
                active.role = Set(role);
                active.update(&txn).await?
            }
        };

        txn.commit().await?;
        Ok(written)
    }
}

#[async_trait]
impl RelationshipRepository for SeaOrmRelationshipRepository {
    async fn find_by_id(&self, id: i32) -> Result<Relationship, DomainError> {
        RelationshipEntity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Relationship::from)
            .ok_or_else(|| DomainError::not_found(RELATIONSHIP_NOT_FOUND))
    }

    async fn find_by_book_and_member(
        &self,
        book_id: i32,
        member_id: i32,
    ) -> Result<Relationship, DomainError> {
        find_row(&self.db, book_id, member_id)
            .await?
            .map(Relationship::from)
            .ok_or_else(|| DomainError::not_found(MEMBER_NOT_IN_PROJECT))
    }

    async fn find_role(&self, book_id: i32, member_id: i32) -> Result<Role, DomainError> {
        let row = self.find_by_book_and_member(book_id, member_id).await?;
        Ok(row.role)
    }

    async fn list_by_book(&self, book_id: i32) -> Result<Vec<Relationship>, DomainError> {
        let rows = RelationshipEntity::find()
            .filter(Column::BookId.eq(book_id))
            .order_by_asc(Column::Role)
            .order_by_asc(Column::MemberId)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(Relationship::from).collect())
    }

    async fn find_founder(&self, book_id: i32) -> Result<Relationship, DomainError> {
        RelationshipEntity::find()
            .filter(Column::BookId.eq(book_id))
            .filter(Column::Role.eq(Role::Founder))
            .one(&self.db)
            .await?
            .map(Relationship::from)
            .ok_or_else(|| DomainError::not_found(FOUNDER_NOT_FOUND))
    }

    async fn update_role(
        &self,
        book_id: i32,
        member_id: i32,
        role: Role,
    ) -> Result<Relationship, DomainError> {
        match self.books.exists(book_id).await {
            Ok(true) => {}
            Ok(false) => return Err(DomainError::not_found(PROJECT_NOT_FOUND)),
            Err(e) => {
                tracing::error!("update_role: lookup of book {} failed: {}", book_id, e);
                return Err(DomainError::not_found(PROJECT_NOT_FOUND));
            }
        }

        if role.is_founder() {
            return Err(DomainError::conflict(FOUNDER_ONLY_BY_TRANSFER));
        }

        let written = retry_on_unique_race(self.upsert_attempts, move |_| {
            self.write_role(book_id, member_id, role)
        })
        .await;

        match written {
            Ok(model) => {
                tracing::debug!(
                    "Member {} of book {} now has role {:?}",
                    member_id,
                    book_id,
                    role
                );
                Ok(model.into())
            }
            Err(WriteError::Domain(e)) => Err(e),
            Err(WriteError::Db(e)) if is_unique_violation(&e) => {
                tracing::warn!(
                    "Gave up joining member {} to book {} after {} attempts: {}",
                    member_id,
                    book_id,
                    self.upsert_attempts,
                    e
                );
                Err(DomainError::conflict(CONCURRENT_CHANGE))
            }
            Err(WriteError::Db(e)) => Err(e.into()),
        }
    }

    async fn delete(&self, book_id: i32, member_id: i32) -> Result<(), DomainError> {
        let row = find_row(&self.db, book_id, member_id)
            .await?
            .ok_or_else(|| DomainError::not_found(MEMBER_NOT_IN_PROJECT))?;

        if row.role.is_founder() {
            return Err(DomainError::conflict(CANNOT_DELETE_FOUNDER));
        }

        if let Err(e) = RelationshipEntity::delete_by_id(row.id)
            .exec(&self.db)
            .await
        {
            tracing::error!(
                "Failed to remove member {} from book {}: {}",
                member_id,
                book_id,
                e
            );
            return Err(DomainError::Database(DELETE_FAILED.to_string()));
        }

        Ok(())
    }

    async fn insert(&self, input: CreateRelationshipInput) -> Result<Relationship, DomainError> {
        let row = ActiveModel {
            member_id: Set(input.member_id),
            book_id: Set(input.book_id),
            role: Set(input.role),
            ..Default::default()
        };

        let result = row.insert(&self.db).await?;
        Ok(result.into())
    }

    async fn update(&self, relationship: Relationship) -> Result<Relationship, DomainError> {
        let row = ActiveModel {
            id: Unchanged(relationship.id),
            member_id: Set(relationship.member_id),
            book_id: Set(relationship.book_id),
            role: Set(relationship.role),
        };

        match row.update(&self.db).await {
            Ok(model) => Ok(model.into()),
            Err(DbErr::RecordNotUpdated) | Err(DbErr::RecordNotFound(_)) => {
                Err(DomainError::not_found(RELATIONSHIP_NOT_FOUND))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn transfer(
        &self,
        book_id: i32,
        founder_id: i32,
        receiver_id: i32,
    ) -> Result<(), DomainError> {
        // Reads happen inside the transaction so the receiver check and its
        // write cannot interleave with another join. Early returns drop `txn`,
        // which rolls it back.
        let txn = self.db.begin().await?;

        let founder = find_row(&txn, book_id, founder_id)
            .await?
            .ok_or_else(|| DomainError::not_found(MEMBER_NOT_IN_PROJECT))?;

        if !founder.role.is_founder() {
            return Err(DomainError::conflict(NOT_THE_FOUNDER));
        }

        if founder_id == receiver_id {
            txn.commit().await?;
            return Ok(());
        }

        let receiver = find_row(&txn, book_id, receiver_id).await?;

        let mut demoted: ActiveModel = founder.into();
        demoted.role = Set(Role::Admin);
        if let Err(e) = demoted.update(&txn).await {
            rollback(txn, "founder demotion").await;
            return Err(e.into());
        }

        let promoted = match receiver {
            Some(existing) => {
                let mut active: ActiveModel = existing.into();
                active.role = Set(Role::Founder);
                active.update(&txn).await
            }
            None => {
                ActiveModel {
                    member_id: Set(receiver_id),
                    book_id: Set(book_id),
                    role: Set(Role::Founder),
                    ..Default::default()
                }
                .insert(&txn)
                .await
            }
        };

        if let Err(e) = promoted {
            rollback(txn, "receiver promotion").await;
            if is_unique_violation(&e) {
                return Err(DomainError::conflict(CONCURRENT_CHANGE));
            }
            return Err(e.into());
        }

        txn.commit().await?;

        tracing::info!(
            "Book {} founder transferred from member {} to member {}",
            book_id,
            founder_id,
            receiver_id
        );
        Ok(())
    }
}
