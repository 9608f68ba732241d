// Pool de connexions SQLite de SQLx et journalisation `tracing`.
use crate::error::DataResult;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

// Une migration de schéma, appliquée une seule fois et dans l'ordre.
struct Migration {
    version: i32,
    name: &'static str,
    // Le SQL est intégré au binaire à la compilation.
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_lists",
        sql: include_str!("../migrations/001_create_lists.sql"),
    },
    Migration {
        version: 2,
        name: "create_changes",
        sql: include_str!("../migrations/002_create_changes.sql"),
    },
    Migration {
        version: 3,
        name: "create_maindata",
        sql: include_str!("../migrations/003_create_maindata.sql"),
    },
];

// Ouvre (ou crée) la base puis applique les migrations manquantes.
// `:memory:` donne une base éphémère, partagée par une connexion unique.
pub async fn init_database(db_file: &str) -> DataResult<SqlitePool> {
    let in_memory = db_file == ":memory:";
    let url = if in_memory {
        "sqlite::memory:".to_string()
    } else {
        // `mode=rwc` : lecture/écriture, crée le fichier s'il n'existe pas.
        format!("sqlite:{}?mode=rwc", db_file)
    };

    let opts = SqliteConnectOptions::from_str(&url)?
        .create_if_missing(true)
        .foreign_keys(true)
        // Attend 5s si la base est verrouillée avant de retourner une erreur.
        .busy_timeout(Duration::from_secs(5));

    let pool = if in_memory {
        // Chaque connexion `:memory:` a sa propre base : une seule connexion, jamais recyclée.
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(opts)
            .await?
    };

    // --- Réglages SQLite pour la concurrence lecture/écriture ---

    // WAL : les lecteurs ne sont pas bloqués par les écritures.
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    // Moins de `fsync`, risque minime en cas de crash système.
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    // 32MB de cache de pages.
    sqlx::query("PRAGMA cache_size = -32000")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA temp_store = MEMORY")
        .execute(&pool)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at REAL NOT NULL
        )",
    )
    .execute(&pool)
    .await?;

    for migration in MIGRATIONS {
        let applied =
            sqlx::query_as::<_, (i32,)>("SELECT version FROM schema_migrations WHERE version = ?")
                .bind(migration.version)
                .fetch_optional(&pool)
                .await?
                .is_some();

        if !applied {
            info!(
                "Running migration {}: {}",
                migration.version, migration.name
            );

            // Migration et enregistrement dans la même transaction : tout ou rien.
            let mut tx = pool.begin().await?;
            sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;

            sqlx::query(
                "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)",
            )
            .bind(migration.version)
            .bind(migration.name)
            .bind(current_timestamp())
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;

            info!("Migration {} applied successfully", migration.version);
        } else {
            info!("Migration {} already applied, skipping", migration.version);
        }
    }

    info!("Database initialization complete");

    Ok(pool)
}

// Timestamp actuel en secondes (f64).
pub fn current_timestamp() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_in_memory_creates_tables() {
        let pool = init_database(":memory:").await.unwrap();
        for table in ["lists", "changes", "maindata"] {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?)",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert!(exists, "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_migrations_are_applied_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refdata.db");
        let path = path.to_str().unwrap();

        let pool = init_database(path).await.unwrap();
        pool.close().await;
        let pool = init_database(path).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }
}
