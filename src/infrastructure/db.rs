use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};

pub async fn init_db(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(database_url).await?;

    // Run migrations manually (simple SQL)
    run_migrations(&db).await?;

    tracing::debug!("Database ready at {}", database_url);
    Ok(db)
}

async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();

    db.execute(Statement::from_string(
        backend,
        r#"
        CREATE TABLE IF NOT EXISTS books (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#
        .to_owned(),
    ))
    .await?;

    // Membership rows. role_id: 0 founder, 1 admin, 2 editor, 3 viewer
    db.execute(Statement::from_string(
        backend,
        r#"
        CREATE TABLE IF NOT EXISTS relationship (
            relationship_id INTEGER PRIMARY KEY AUTOINCREMENT,
            member_id INTEGER NOT NULL,
            book_id INTEGER NOT NULL,
            role_id INTEGER NOT NULL CHECK (role_id BETWEEN 0 AND 3),
            FOREIGN KEY(book_id) REFERENCES books(id) ON DELETE CASCADE
        )
        "#
        .to_owned(),
    ))
    .await?;

    db.execute(Statement::from_string(
        backend,
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_relationship_member_book ON relationship(member_id, book_id)"
            .to_owned(),
    ))
    .await?;

    // At most one founder per book
    db.execute(Statement::from_string(
        backend,
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_relationship_book_founder ON relationship(book_id) WHERE role_id = 0"
            .to_owned(),
    ))
    .await?;

    db.execute(Statement::from_string(
        backend,
        "CREATE INDEX IF NOT EXISTS idx_relationship_book ON relationship(book_id)".to_owned(),
    ))
    .await?;

    Ok(())
}
