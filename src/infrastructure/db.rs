use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Schema, Statement,
};

use crate::models::{bounty, participation, reward, reward_claim, user};

pub async fn init_db(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url.to_owned());
    options.sqlx_logging(false);
    if database_url.starts_with("sqlite") {
        // One writer at a time; an in-memory database also lives in a single connection
        options.max_connections(1);
    }

    let db = Database::connect(options).await?;

    run_migrations(&db).await?;

    Ok(db)
}

async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    // Parents first so foreign keys resolve
    let mut tables = vec![
        schema.create_table_from_entity(user::Entity),
        schema.create_table_from_entity(bounty::Entity),
        schema.create_table_from_entity(reward::Entity),
        schema.create_table_from_entity(participation::Entity),
        schema.create_table_from_entity(reward_claim::Entity),
    ];
    for table in tables.iter_mut() {
        table.if_not_exists();
        db.execute(backend.build(&*table)).await?;
    }

    // At most one participation per (user, bounty) and one claim per (user, reward)
    db.execute(Statement::from_string(
        backend,
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_participations_user_bounty
        ON participations (user_id, bounty_id)
        "#
        .to_owned(),
    ))
    .await?;

    db.execute(Statement::from_string(
        backend,
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_reward_claims_user_reward
        ON reward_claims (user_id, reward_id)
        "#
        .to_owned(),
    ))
    .await?;

    db.execute(Statement::from_string(
        backend,
        "CREATE INDEX IF NOT EXISTS idx_participations_status ON participations (status)"
            .to_owned(),
    ))
    .await?;

    tracing::debug!("Ledger schema is up to date");

    Ok(())
}
