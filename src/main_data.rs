use crate::cache::SingletonCache;
use crate::codec;
use crate::error::{map_insert_error, DataError, DataResult};
use crate::models::MainDataItem;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use tracing::info;

const TABLE: &str = "maindata";

type MainDataRow = (String, String, String, String, DateTime<Utc>);

// Données principales : table `maindata`, seul l'enregistrement le plus récent est gardé en mémoire.
pub struct MainDataStore {
    db: SqlitePool,
    current: SingletonCache<MainDataItem>,
}

impl MainDataStore {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            current: SingletonCache::new(),
        }
    }

    pub fn current(&self) -> Arc<MainDataItem> {
        self.current.current()
    }

    // Avec `update_cache`, l'élément devient courant s'il est au moins aussi récent.
    pub async fn insert(&self, item: &MainDataItem, update_cache: bool) -> DataResult<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (id, change_log, known_issues, version, time) VALUES (?, ?, ?, ?, ?)",
            TABLE
        ))
        .bind(&item.id)
        .bind(codec::encode(&item.change_log)?)
        .bind(codec::encode(&item.known_issues)?)
        .bind(&item.version)
        .bind(item.time)
        .execute(&self.db)
        .await
        .map_err(|e| map_insert_error(e, format!("main data '{}'", item.id)))?;

        if update_cache {
            // Insertion réussie en base d'un identifiant déjà en cache : cache et base divergent.
            let current = self.current.current();
            if !current.is_sentinel() && current.id == item.id {
                return Err(DataError::CacheCorruption(format!(
                    "main data '{}' is already cached",
                    item.id
                )));
            }
            self.promote(item);
        }
        Ok(())
    }

    // Avec `update_cache`, remplace le courant si c'est lui, ou si l'élément est plus récent.
    pub async fn update(&self, item: &MainDataItem, update_cache: bool) -> DataResult<()> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET change_log = ?, known_issues = ?, version = ?, time = ? WHERE id = ?",
            TABLE
        ))
        .bind(codec::encode(&item.change_log)?)
        .bind(codec::encode(&item.known_issues)?)
        .bind(&item.version)
        .bind(item.time)
        .bind(&item.id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DataError::NotFound(format!("main data '{}'", item.id)));
        }

        if update_cache {
            self.promote(item);
        }
        Ok(())
    }

    // Avec `update_cache`, retour à la sentinelle si l'élément supprimé était courant.
    pub async fn delete(&self, item: &MainDataItem, update_cache: bool) -> DataResult<()> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", TABLE))
            .bind(&item.id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DataError::NotFound(format!("main data '{}'", item.id)));
        }

        if update_cache {
            self.current.swap_if(|current| {
                (current.id == item.id).then(|| Arc::new(MainDataItem::default()))
            });
        }
        Ok(())
    }

    pub async fn exists(&self, item: &MainDataItem, use_cache: bool) -> DataResult<bool> {
        if use_cache {
            let current = self.current.current();
            return Ok(!current.is_sentinel() && current.id == item.id);
        }

        let exists: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?)",
            TABLE
        ))
        .bind(&item.id)
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }

    // Charge toute la table ; avec `update_cache`, le courant devient le plus récent
    // (horodatage puis identifiant), ou la sentinelle si la table est vide.
    pub async fn load_all(&self, update_cache: bool) -> DataResult<Vec<MainDataItem>> {
        let rows = sqlx::query_as::<_, MainDataRow>(&format!(
            "SELECT id, change_log, known_issues, version, time FROM {}",
            TABLE
        ))
        .fetch_all(&self.db)
        .await?;

        let items = rows
            .into_iter()
            .map(row_to_item)
            .collect::<DataResult<Vec<_>>>()?;

        if update_cache {
            let most_recent = items
                .iter()
                .max_by(|a, b| (a.time, a.id.as_str()).cmp(&(b.time, b.id.as_str())))
                .cloned()
                .unwrap_or_default();
            info!("Main data cache reloaded, current is '{}'", most_recent.id);
            self.current.store(most_recent);
        }

        Ok(items)
    }

    pub fn release_cache(&self) {
        self.current.reset();
        info!("Main data cache released");
    }

    // Point d'entrée client. Hors cache, on lit la ligne la plus récente directement,
    // sans effet de bord sur le cache.
    pub async fn load_most_recent(&self, accept_cached: bool) -> DataResult<Arc<MainDataItem>> {
        if accept_cached {
            return Ok(self.current.current());
        }

        let row = sqlx::query_as::<_, MainDataRow>(&format!(
            "SELECT id, change_log, known_issues, version, time FROM {} ORDER BY time DESC, id DESC LIMIT 1",
            TABLE
        ))
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => Ok(Arc::new(row_to_item(row)?)),
            None => Ok(Arc::new(MainDataItem::default())),
        }
    }

    fn promote(&self, item: &MainDataItem) {
        self.current.swap_if(|current| {
            (current.id == item.id || item.is_newer_or_same(current))
                .then(|| Arc::new(item.clone()))
        });
    }
}

fn row_to_item(row: MainDataRow) -> DataResult<MainDataItem> {
    let (id, change_log, known_issues, version, time) = row;
    Ok(MainDataItem {
        id,
        change_log: codec::decode(&change_log)?,
        known_issues: codec::decode(&known_issues)?,
        version,
        time,
    })
}
