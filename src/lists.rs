use crate::cache::CollectionCache;
use crate::codec;
use crate::error::{map_insert_error, DataError, DataResult};
use crate::models::{names_match, ReferenceList};
use futures_util::future::join_all;
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use tracing::{error, info};

const TABLE: &str = "lists";

// Listes de référence : table `lists` + miroir complet en mémoire.
pub struct ListStore {
    db: SqlitePool,
    cache: CollectionCache<ReferenceList>,
}

impl ListStore {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            cache: CollectionCache::new(),
        }
    }

    // Insère une nouvelle liste ; un identifiant existant donne `Conflict`.
    pub async fn insert(&self, list: &ReferenceList, update_cache: bool) -> DataResult<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (id, name, list_values) VALUES (?, ?, ?)",
            TABLE
        ))
        .bind(&list.id)
        .bind(&list.name)
        .bind(codec::encode(&list.values)?)
        .execute(&self.db)
        .await
        .map_err(|e| map_insert_error(e, format!("list '{}'", list.id)))?;

        if update_cache {
            self.cache.insert(list.clone())?;
        }
        Ok(())
    }

    // Réécrit toutes les colonnes sauf l'identifiant, qui est immuable.
    pub async fn update(&self, list: &ReferenceList, update_cache: bool) -> DataResult<()> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET name = ?, list_values = ? WHERE id = ?",
            TABLE
        ))
        .bind(&list.name)
        .bind(codec::encode(&list.values)?)
        .bind(&list.id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DataError::NotFound(format!("list '{}'", list.id)));
        }

        if update_cache {
            self.cache.replace(list.clone())?;
        }
        Ok(())
    }

    pub async fn delete(&self, list: &ReferenceList, update_cache: bool) -> DataResult<()> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", TABLE))
            .bind(&list.id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DataError::NotFound(format!("list '{}'", list.id)));
        }

        if update_cache {
            self.cache.remove(&list.id)?;
        }
        Ok(())
    }

    // `use_cache` : réponse purement en mémoire, sinon requête scalaire sur la base.
    // Les deux modes peuvent diverger si le cache est périmé.
    pub async fn exists(&self, list: &ReferenceList, use_cache: bool) -> DataResult<bool> {
        if use_cache {
            return Ok(self.cache.contains(&list.id));
        }

        let exists: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?)",
            TABLE
        ))
        .bind(&list.id)
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }

    // Charge toute la table. Avec `update_cache`, le cache est remplacé d'un seul échange :
    // la lecture en base se fait hors de tout verrou.
    pub async fn load_all(&self, update_cache: bool) -> DataResult<Vec<ReferenceList>> {
        let rows = sqlx::query_as::<_, (String, String, String)>(&format!(
            "SELECT id, name, list_values FROM {}",
            TABLE
        ))
        .fetch_all(&self.db)
        .await?;

        let lists = rows
            .into_iter()
            .map(row_to_list)
            .collect::<DataResult<Vec<_>>>()?;

        if update_cache {
            self.cache.reload(lists.iter().cloned());
            info!("Lists cache reloaded with {} lists", lists.len());
        }

        Ok(lists)
    }

    // Libère la mémoire du cache ; la base n'est pas touchée.
    pub fn release_cache(&self) {
        self.cache.clear();
        info!("Lists cache released");
    }

    pub fn loaded_count(&self) -> usize {
        self.cache.len()
    }

    // Recherche par nom dans le cache, exacte mais insensible à la casse.
    pub fn get_list(&self, name: &str) -> Option<Arc<ReferenceList>> {
        self.cache.find(|list| names_match(&list.name, name))
    }

    // Point d'entrée client : c'est l'appelant qui choisit entre fraîcheur et latence.
    // Le chemin base de données ne met jamais le cache à jour.
    pub async fn load_lists(
        &self,
        accept_cached: bool,
        name: Option<&str>,
    ) -> DataResult<Vec<ReferenceList>> {
        let name = name.map(str::trim).filter(|n| !n.is_empty());

        if accept_cached {
            let lists = match name {
                Some(name) => self.cache.filter(|list| names_match(&list.name, name)),
                None => self.cache.snapshot(),
            };
            return Ok(lists.iter().map(|list| (**list).clone()).collect());
        }

        // Le filtrage par nom se fait ici avec la même comparaison que le cache :
        // `LIKE`/`lower()` de SQLite ne replient que l'ASCII.
        let rows = sqlx::query_as::<_, (String, String, String)>(&format!(
            "SELECT id, name, list_values FROM {}",
            TABLE
        ))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .filter(|(_, list_name, _)| name.map_or(true, |name| names_match(list_name, name)))
            .map(row_to_list)
            .collect()
    }

    // Insertion en parallèle, un futur par liste ; chaque résultat est rendu à l'appelant.
    pub async fn insert_all(&self, lists: &[ReferenceList]) -> Vec<DataResult<()>> {
        let results = join_all(lists.iter().map(|list| self.insert(list, true))).await;

        for (list, result) in lists.iter().zip(&results) {
            if let Err(e) = result {
                error!("Failed to insert list {}: {}", list.id, e);
            }
        }
        results
    }
}

fn row_to_list((id, name, values): (String, String, String)) -> DataResult<ReferenceList> {
    Ok(ReferenceList {
        id,
        name,
        values: codec::decode(&values)?,
    })
}
