use crate::error::{DataError, DataResult};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

// Collaborateur d'autorisation externe : quels champs d'un modèle le demandeur peut-il voir ?
// `None` signifie que le nom ne correspond à aucun modèle connu.
pub trait PermissionProvider: Send + Sync {
    fn returnable_fields(&self, requester: &str, model: &str) -> Option<HashSet<String>>;
}

const ANY_REQUESTER: &str = "*";

// Table de permissions en mémoire : (demandeur, modèle) -> champs visibles.
// Le demandeur "*" s'applique à tout le monde ; les champs sont cumulés.
#[derive(Debug, Default, Clone)]
pub struct StaticPermissions {
    grants: HashMap<String, HashMap<String, HashSet<String>>>,
}

#[derive(Debug, Deserialize)]
struct GrantFile {
    grants: Vec<GrantEntry>,
}

#[derive(Debug, Deserialize)]
struct GrantEntry {
    #[serde(default = "any_requester")]
    requester: String,
    model: String,
    fields: Vec<String>,
}

fn any_requester() -> String {
    ANY_REQUESTER.to_string()
}

impl StaticPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant<I, S>(&mut self, requester: &str, model: &str, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grants
            .entry(requester.to_string())
            .or_default()
            .entry(model.to_lowercase())
            .or_default()
            .extend(fields.into_iter().map(Into::into));
    }

    pub fn grant_all<I, S>(&mut self, model: &str, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grant(ANY_REQUESTER, model, fields);
    }

    // Format attendu : {"grants": [{"requester": "...", "model": "Person", "fields": ["LastName"]}]}
    pub fn from_json_file(path: impl AsRef<Path>) -> DataResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DataError::Internal(format!(
                "cannot read permissions file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> DataResult<Self> {
        let file: GrantFile = serde_json::from_str(raw)?;
        let mut perms = Self::new();
        for entry in file.grants {
            perms.grant(&entry.requester, &entry.model, entry.fields);
        }
        Ok(perms)
    }
}

impl PermissionProvider for StaticPermissions {
    fn returnable_fields(&self, requester: &str, model: &str) -> Option<HashSet<String>> {
        let model = model.to_lowercase();
        let mut fields: Option<HashSet<String>> = None;

        for who in [ANY_REQUESTER, requester] {
            if let Some(granted) = self.grants.get(who).and_then(|m| m.get(&model)) {
                fields.get_or_insert_with(HashSet::new).extend(granted.iter().cloned());
            }
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model_is_none() {
        let perms = StaticPermissions::new();
        assert!(perms.returnable_fields("me", "Person").is_none());
    }

    #[test]
    fn test_grants_merge_wildcard_and_requester() {
        let mut perms = StaticPermissions::new();
        perms.grant_all("Person", ["FirstName"]);
        perms.grant("me", "person", ["SSN"]);

        let mine = perms.returnable_fields("me", "PERSON").unwrap();
        assert!(mine.contains("FirstName"));
        assert!(mine.contains("SSN"));

        let theirs = perms.returnable_fields("someone", "Person").unwrap();
        assert!(theirs.contains("FirstName"));
        assert!(!theirs.contains("SSN"));
    }

    #[test]
    fn test_from_json() {
        let perms = StaticPermissions::from_json(
            r#"{"grants": [
                {"model": "Person", "fields": ["LastName"]},
                {"requester": "admin", "model": "Person", "fields": ["SSN"]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(perms.returnable_fields("admin", "Person").unwrap().len(), 2);
        assert_eq!(perms.returnable_fields("bob", "Person").unwrap().len(), 1);
    }

    #[test]
    fn test_from_json_file_missing_is_error() {
        let err = StaticPermissions::from_json_file("/nonexistent/perms.json").unwrap_err();
        assert!(matches!(err, DataError::Internal(_)));
    }
}
