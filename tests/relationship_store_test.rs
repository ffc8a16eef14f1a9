//! Membership store tests
//! Founder rules, first join, removal and ownership transfer

use std::sync::Arc;

use bookroles::db;
use bookroles::domain::{
    BookRepository, CreateRelationshipInput, DomainError, Relationship, RelationshipRepository,
};
use bookroles::infrastructure::{SeaOrmBookRepository, SeaOrmRelationshipRepository};
use bookroles::models::{Role, relationship};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Statement,
};

struct Fixture {
    db: DatabaseConnection,
    repo: SeaOrmRelationshipRepository,
    book_id: i32,
}

// Helper to create a database with one book whose founder is member 1
async fn setup() -> Fixture {
    let db = db::init_db("sqlite::memory:")
        .await
        .expect("Failed to init DB");
    let books = Arc::new(SeaOrmBookRepository::new(db.clone()));
    let book = books
        .create("Team handbook".to_string())
        .await
        .expect("Failed to create book");
    let repo = SeaOrmRelationshipRepository::new(db.clone(), books);

    repo.insert(CreateRelationshipInput {
        member_id: 1,
        book_id: book.id,
        role: Role::Founder,
    })
    .await
    .expect("Failed to create founder");

    Fixture {
        db,
        repo,
        book_id: book.id,
    }
}

async fn founder_count(db: &DatabaseConnection, book_id: i32) -> u64 {
    relationship::Entity::find()
        .filter(relationship::Column::BookId.eq(book_id))
        .filter(relationship::Column::Role.eq(Role::Founder))
        .count(db)
        .await
        .expect("DB error")
}

#[tokio::test]
async fn test_update_role_creates_row_on_first_join() {
    let f = setup().await;

    let row = f
        .repo
        .update_role(f.book_id, 5, Role::Editor)
        .await
        .expect("First join should succeed");

    assert_eq!(row.book_id, f.book_id);
    assert_eq!(row.member_id, 5);
    assert_eq!(row.role, Role::Editor);
    assert_eq!(
        f.repo.find_role(f.book_id, 5).await.unwrap(),
        Role::Editor
    );
    assert_eq!(f.repo.find_by_id(row.id).await.unwrap(), row);
}

#[tokio::test]
async fn test_update_role_unknown_book() {
    let f = setup().await;

    let err = f.repo.update_role(999, 5, Role::Viewer).await.unwrap_err();
    assert_eq!(err, DomainError::NotFound("project not found".to_string()));
}

#[tokio::test]
async fn test_update_role_on_founder_is_rejected() {
    let f = setup().await;

    for role in [Role::Admin, Role::Editor, Role::Viewer] {
        let err = f.repo.update_role(f.book_id, 1, role).await.unwrap_err();
        assert_eq!(
            err,
            DomainError::Conflict("cannot change founder's role".to_string())
        );
    }

    assert_eq!(f.repo.find_role(f.book_id, 1).await.unwrap(), Role::Founder);
}

#[tokio::test]
async fn test_delete_missing_member() {
    let f = setup().await;

    let err = f.repo.delete(f.book_id, 5).await.unwrap_err();
    assert_eq!(err, DomainError::NotFound("member not in project".to_string()));
}

#[tokio::test]
async fn test_delete_founder_is_rejected() {
    let f = setup().await;

    let err = f.repo.delete(f.book_id, 1).await.unwrap_err();
    assert_eq!(err, DomainError::Conflict("cannot delete founder".to_string()));
    assert!(f.repo.find_by_book_and_member(f.book_id, 1).await.is_ok());
}

#[tokio::test]
async fn test_delete_member() {
    let f = setup().await;
    f.repo.update_role(f.book_id, 5, Role::Viewer).await.unwrap();

    f.repo.delete(f.book_id, 5).await.expect("Delete should succeed");

    assert!(matches!(
        f.repo.find_by_book_and_member(f.book_id, 5).await,
        Err(DomainError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_transfer_to_new_member() {
    let f = setup().await;

    f.repo
        .transfer(f.book_id, 1, 2)
        .await
        .expect("Transfer should succeed");

    assert_eq!(f.repo.find_role(f.book_id, 1).await.unwrap(), Role::Admin);
    assert_eq!(f.repo.find_role(f.book_id, 2).await.unwrap(), Role::Founder);
    assert_eq!(founder_count(&f.db, f.book_id).await, 1);
    assert_eq!(f.repo.find_founder(f.book_id).await.unwrap().member_id, 2);
}

#[tokio::test]
async fn test_transfer_to_existing_member_keeps_row() {
    let f = setup().await;
    let editor = f.repo.update_role(f.book_id, 3, Role::Editor).await.unwrap();

    f.repo.transfer(f.book_id, 1, 3).await.unwrap();

    let promoted = f.repo.find_by_book_and_member(f.book_id, 3).await.unwrap();
    assert_eq!(promoted.id, editor.id);
    assert_eq!(promoted.role, Role::Founder);
    assert_eq!(founder_count(&f.db, f.book_id).await, 1);
}

#[tokio::test]
async fn test_transfer_from_non_founder_changes_nothing() {
    let f = setup().await;
    f.repo.update_role(f.book_id, 4, Role::Admin).await.unwrap();
    let before = f.repo.list_by_book(f.book_id).await.unwrap();

    let err = f.repo.transfer(f.book_id, 4, 5).await.unwrap_err();
    assert_eq!(
        err,
        DomainError::Conflict("transferor is not the founder".to_string())
    );

    assert_eq!(f.repo.list_by_book(f.book_id).await.unwrap(), before);
}

#[tokio::test]
async fn test_transfer_from_missing_member() {
    let f = setup().await;

    let err = f.repo.transfer(f.book_id, 42, 5).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));
    assert_eq!(founder_count(&f.db, f.book_id).await, 1);
}

#[tokio::test]
async fn test_transfer_to_self_is_noop() {
    let f = setup().await;

    f.repo.transfer(f.book_id, 1, 1).await.unwrap();

    assert_eq!(f.repo.find_role(f.book_id, 1).await.unwrap(), Role::Founder);
    assert_eq!(founder_count(&f.db, f.book_id).await, 1);
}

#[tokio::test]
async fn test_transfer_rolls_back_when_promotion_fails() {
    let f = setup().await;

    // Make the receiver insert fail inside the transaction
    f.db.execute(Statement::from_string(
        f.db.get_database_backend(),
        r#"
        CREATE TRIGGER block_member_99 BEFORE INSERT ON relationship
        WHEN NEW.member_id = 99
        BEGIN
            SELECT RAISE(ABORT, 'blocked');
        END
        "#
        .to_owned(),
    ))
    .await
    .expect("Failed to create trigger");

    let err = f.repo.transfer(f.book_id, 1, 99).await.unwrap_err();
    assert!(matches!(err, DomainError::Database(_)));

    assert_eq!(f.repo.find_role(f.book_id, 1).await.unwrap(), Role::Founder);
    assert!(f.repo.find_by_book_and_member(f.book_id, 99).await.is_err());
    assert_eq!(founder_count(&f.db, f.book_id).await, 1);
}

#[tokio::test]
async fn test_interleaved_first_joins_leave_one_row() {
    let f = setup().await;

    let (a, b) = tokio::join!(
        f.repo.update_role(f.book_id, 7, Role::Editor),
        f.repo.update_role(f.book_id, 7, Role::Viewer),
    );
    let a = a.expect("first join");
    let b = b.expect("second join");
    assert_eq!(a.id, b.id);

    let rows: Vec<Relationship> = f
        .repo
        .list_by_book(f.book_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.member_id == 7)
        .collect();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_insert_duplicate_pair_is_database_error() {
    let f = setup().await;

    let err = f
        .repo
        .insert(CreateRelationshipInput {
            member_id: 1,
            book_id: f.book_id,
            role: Role::Viewer,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Database(_)));
}

#[tokio::test]
async fn test_update_full_row() {
    let f = setup().await;
    let mut row = f.repo.update_role(f.book_id, 6, Role::Viewer).await.unwrap();

    row.role = Role::Admin;
    let updated = f.repo.update(row.clone()).await.unwrap();
    assert_eq!(updated, row);

    row.id = 10_000;
    assert!(matches!(
        f.repo.update(row).await,
        Err(DomainError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_list_by_book_founder_first() {
    let f = setup().await;
    f.repo.update_role(f.book_id, 9, Role::Viewer).await.unwrap();
    f.repo.update_role(f.book_id, 8, Role::Admin).await.unwrap();

    let roles: Vec<(i32, Role)> = f
        .repo
        .list_by_book(f.book_id)
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.member_id, r.role))
        .collect();

    assert_eq!(
        roles,
        vec![(1, Role::Founder), (8, Role::Admin), (9, Role::Viewer)]
    );
}

async fn create_trigger(db: &DatabaseConnection, sql: &str) {
    db.execute(Statement::from_string(
        db.get_database_backend(),
        sql.to_owned(),
    ))
    .await
    .expect("Failed to create trigger");
}

// Every insert of member 7 first slips in a competing (7, book) row,
// so the insert itself hits the (member_id, book_id) unique index.
const COMPETING_JOIN_TRIGGER: &str = r#"
    CREATE TRIGGER competing_join BEFORE INSERT ON relationship
    WHEN NEW.member_id = 7
    BEGIN
        INSERT INTO relationship (member_id, book_id, role_id) VALUES (7, NEW.book_id, 3);
    END
"#;

#[tokio::test]
async fn test_second_founder_insert_is_database_error() {
    let f = setup().await;

    let err = f
        .repo
        .insert(CreateRelationshipInput {
            member_id: 2,
            book_id: f.book_id,
            role: Role::Founder,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::Database(_)));
    assert_eq!(founder_count(&f.db, f.book_id).await, 1);
}

#[tokio::test]
async fn test_update_to_second_founder_is_database_error() {
    let f = setup().await;
    let mut row = f.repo.update_role(f.book_id, 2, Role::Admin).await.unwrap();

    row.role = Role::Founder;
    let err = f.repo.update(row).await.unwrap_err();

    assert!(matches!(err, DomainError::Database(_)));
    assert_eq!(f.repo.find_role(f.book_id, 2).await.unwrap(), Role::Admin);
    assert_eq!(founder_count(&f.db, f.book_id).await, 1);
}

#[tokio::test]
async fn test_join_race_without_retries_is_conflict() {
    let f = setup().await;
    create_trigger(&f.db, COMPETING_JOIN_TRIGGER).await;

    let books = Arc::new(SeaOrmBookRepository::new(f.db.clone()));
    let repo = SeaOrmRelationshipRepository::new(f.db.clone(), books).with_upsert_attempts(1);

    let err = repo.update_role(f.book_id, 7, Role::Editor).await.unwrap_err();
    assert_eq!(
        err,
        DomainError::Conflict("membership changed concurrently".to_string())
    );
    assert!(repo.find_by_book_and_member(f.book_id, 7).await.is_err());
}

#[tokio::test]
async fn test_join_race_that_never_settles_is_conflict() {
    let f = setup().await;
    create_trigger(&f.db, COMPETING_JOIN_TRIGGER).await;

    let err = f
        .repo
        .update_role(f.book_id, 7, Role::Editor)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DomainError::Conflict("membership changed concurrently".to_string())
    );

    // Other members still join normally
    f.repo.update_role(f.book_id, 8, Role::Editor).await.unwrap();
}

#[tokio::test]
async fn test_transfer_receiver_race_is_conflict_and_rolls_back() {
    let f = setup().await;
    create_trigger(
        &f.db,
        r#"
        CREATE TRIGGER competing_receiver BEFORE INSERT ON relationship
        WHEN NEW.member_id = 99 AND NEW.role_id = 0
        BEGIN
            INSERT INTO relationship (member_id, book_id, role_id) VALUES (99, NEW.book_id, 3);
        END
        "#,
    )
    .await;

    let err = f.repo.transfer(f.book_id, 1, 99).await.unwrap_err();
    assert_eq!(
        err,
        DomainError::Conflict("membership changed concurrently".to_string())
    );

    assert_eq!(f.repo.find_role(f.book_id, 1).await.unwrap(), Role::Founder);
    assert!(f.repo.find_by_book_and_member(f.book_id, 99).await.is_err());
    assert_eq!(founder_count(&f.db, f.book_id).await, 1);
}

#[tokio::test]
async fn test_delete_failure_is_masked() {
    let f = setup().await;
    f.repo.update_role(f.book_id, 5, Role::Viewer).await.unwrap();
    create_trigger(
        &f.db,
        r#"
        CREATE TRIGGER keep_member_5 BEFORE DELETE ON relationship
        WHEN OLD.member_id = 5
        BEGIN
            SELECT RAISE(ABORT, 'disk is on fire');
        END
        "#,
    )
    .await;

    let err = f.repo.delete(f.book_id, 5).await.unwrap_err();
    assert_eq!(err, DomainError::Database("delete failed".to_string()));
    assert!(!err.to_string().contains("disk is on fire"));
    assert_eq!(f.repo.find_role(f.book_id, 5).await.unwrap(), Role::Viewer);
}
