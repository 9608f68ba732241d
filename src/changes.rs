use crate::codec;
use crate::error::{map_insert_error, DataError, DataResult};
use crate::models::{names_match, Change, Variance};
use crate::permissions::PermissionProvider;
use crate::validation::is_valid_guid;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use sqlx::sqlite::SqlitePool;
use tracing::{error, info};

const TABLE: &str = "changes";

type ChangeRow = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
    Option<String>,
);

// Résultat d'une insertion en lot : un résultat par modification, dans l'ordre d'entrée.
#[derive(Debug)]
pub struct BatchOutcome {
    pub results: Vec<(String, DataResult<()>)>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_ok()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &DataError)> {
        self.results
            .iter()
            .filter_map(|(id, r)| r.as_ref().err().map(|e| (id.as_str(), e)))
    }

    pub fn is_complete_success(&self) -> bool {
        self.results.iter().all(|(_, r)| r.is_ok())
    }
}

// Journal des modifications. Vu le volume, il n'y a pas de cache : tout passe par la base.
pub struct ChangeStore {
    db: SqlitePool,
}

impl ChangeStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn insert(&self, change: &Change) -> DataResult<()> {
        let old_value = change
            .variance
            .old_value
            .as_ref()
            .map(codec::encode)
            .transpose()?;
        let new_value = change
            .variance
            .new_value
            .as_ref()
            .map(codec::encode)
            .transpose()?;

        sqlx::query(&format!(
            "INSERT INTO {} (id, editor_id, object_name, object_id, property_name, old_value, new_value, time, remarks) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            TABLE
        ))
        .bind(&change.id)
        .bind(&change.editor_id)
        .bind(&change.object_name)
        .bind(&change.object_id)
        .bind(&change.variance.property_name)
        .bind(old_value)
        .bind(new_value)
        .bind(change.time)
        .bind(&change.remarks)
        .execute(&self.db)
        .await
        .map_err(|e| map_insert_error(e, format!("change '{}'", change.id)))?;

        Ok(())
    }

    pub async fn exists(&self, change: &Change) -> DataResult<bool> {
        let exists: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?)",
            TABLE
        ))
        .bind(&change.id)
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }

    // Un futur par modification, tous attendus ensemble. Les échecs sont isolés
    // par élément, journalisés, et rendus à l'appelant.
    pub async fn insert_all(&self, changes: &[Change]) -> BatchOutcome {
        let results = join_all(changes.iter().map(|change| self.insert(change))).await;

        let outcome = BatchOutcome {
            results: changes
                .iter()
                .map(|change| change.id.clone())
                .zip(results)
                .collect(),
        };

        for (id, e) in outcome.failures() {
            error!("Failed to insert change {}: {}", id, e);
        }
        info!(
            "Inserted {}/{} changes",
            outcome.succeeded(),
            outcome.results.len()
        );

        outcome
    }

    pub async fn load_all_by_object(&self, object_id: &str) -> DataResult<Vec<Change>> {
        let rows = sqlx::query_as::<_, ChangeRow>(&format!(
            "SELECT id, editor_id, object_name, object_id, property_name, old_value, new_value, time, remarks \
             FROM {} WHERE lower(object_id) = lower(?) ORDER BY time ASC, id ASC",
            TABLE
        ))
        .bind(object_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(row_to_change).collect()
    }

    // Point d'entrée client : charge les modifications d'un objet et masque les champs
    // que le demandeur n'a pas le droit de voir, avant que les données ne sortent.
    pub async fn load_changes(
        &self,
        requester: &str,
        object_id: Option<&str>,
        permissions: &dyn PermissionProvider,
    ) -> DataResult<Vec<Change>> {
        let object_id = object_id.ok_or_else(|| {
            DataError::Validation(
                "In order to load the changes belonging to an object, you must send an object's id."
                    .to_string(),
            )
        })?;

        if !is_valid_guid(object_id) {
            return Err(DataError::Validation(format!(
                "The object id '{}' is not a valid GUID.",
                object_id
            )));
        }

        // Forme canonique : espaces, accolades ou préfixe URN ne doivent pas fausser la recherche.
        let object_id = canonical_guid(object_id)?;
        let mut changes = self.load_all_by_object(&object_id).await?;

        let Some(first) = changes.first() else {
            return Ok(changes);
        };

        // Toutes les modifications d'un objet doivent porter le même nom de modèle.
        let object_name = first.object_name.clone();
        if changes
            .iter()
            .any(|c| !names_match(&c.object_name, &object_name))
        {
            return Err(DataError::Internal(format!(
                "changes for object '{}' carry multiple object names",
                object_id
            )));
        }

        // `None` : le nom ne correspond à aucun modèle, pas de masquage.
        if let Some(returnable) = permissions.returnable_fields(requester, &object_name) {
            for change in changes.iter_mut() {
                redact_unless_returnable(&mut change.variance, &returnable);
            }
        }

        Ok(changes)
    }
}

fn canonical_guid(raw: &str) -> DataResult<String> {
    uuid::Uuid::parse_str(raw.trim())
        .map(|id| id.hyphenated().to_string())
        .map_err(|e| DataError::Validation(format!("The object id '{}' is not a valid GUID: {}", raw, e)))
}

fn redact_unless_returnable(variance: &mut Variance, returnable: &std::collections::HashSet<String>) {
    let visible = returnable
        .iter()
        .any(|field| names_match(field, &variance.property_name));
    if !visible {
        variance.redact();
    }
}

fn row_to_change(row: ChangeRow) -> DataResult<Change> {
    let (id, editor_id, object_name, object_id, property_name, old_value, new_value, time, remarks) =
        row;
    Ok(Change {
        id,
        editor_id,
        object_name,
        object_id,
        variance: Variance {
            property_name,
            old_value: codec::decode_opt(old_value.as_deref())?,
            new_value: codec::decode_opt(new_value.as_deref())?,
        },
        time,
        remarks,
    })
}
