use crate::cache::Keyed;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// Valeur substituée aux champs que le demandeur n'a pas le droit de voir.
pub const REDACTED: &str = "REDACTED";

// Liste de référence : alimente surtout les listes déroulantes du front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceList {
    pub id: String,
    pub name: String,
    pub values: Vec<String>,
}

impl ReferenceList {
    pub fn new(id: impl Into<String>, name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            values,
        }
    }

    // Appartenance insensible à la casse.
    pub fn contains_value(&self, value: &str) -> bool {
        self.values.iter().any(|v| names_match(v, value))
    }
}

impl Keyed for ReferenceList {
    fn key(&self) -> &str {
        &self.id
    }
}

// Description d'une propriété modifiée : ancienne et nouvelle valeur.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variance {
    pub property_name: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
}

impl Variance {
    pub fn redact(&mut self) {
        self.old_value = Some(serde_json::Value::String(REDACTED.to_string()));
        self.new_value = Some(serde_json::Value::String(REDACTED.to_string()));
    }
}

// Entrée du journal des modifications apportées à un objet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub id: String,
    pub editor_id: String,
    pub object_name: String,
    pub object_id: String,
    pub variance: Variance,
    pub time: DateTime<Utc>,
    pub remarks: Option<String>,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {}",
            self.variance.property_name,
            display_value(self.variance.old_value.as_ref()),
            display_value(self.variance.new_value.as_ref())
        )
    }
}

fn display_value(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => "(none)".to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogItem {
    pub id: String,
    pub version: String,
    pub time: DateTime<Utc>,
    pub changes: Vec<String>,
}

impl Default for ChangeLogItem {
    fn default() -> Self {
        Self {
            id: String::new(),
            version: String::new(),
            time: DateTime::<Utc>::MIN_UTC,
            changes: Vec::new(),
        }
    }
}

// Données principales de l'application : journal des versions, problèmes connus, version courante.
// `Default` est l'enregistrement sentinelle vide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainDataItem {
    pub id: String,
    pub change_log: Vec<ChangeLogItem>,
    pub known_issues: Vec<String>,
    pub version: String,
    pub time: DateTime<Utc>,
}

impl MainDataItem {
    pub fn is_sentinel(&self) -> bool {
        self.id.is_empty()
    }

    // Ordre "plus récent" : horodatage puis identifiant pour départager de façon stable.
    pub fn is_newer_or_same(&self, other: &MainDataItem) -> bool {
        (self.time, self.id.as_str()) >= (other.time, other.id.as_str())
    }
}

impl Default for MainDataItem {
    fn default() -> Self {
        Self {
            id: String::new(),
            change_log: Vec::new(),
            known_issues: Vec::new(),
            version: String::new(),
            time: DateTime::<Utc>::MIN_UTC,
        }
    }
}

impl Keyed for MainDataItem {
    fn key(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub lists_loaded: usize,
    pub main_data_id: String,
}

// Comparaison de noms : égalité exacte, insensible à la casse, casse d'origine conservée.
pub fn names_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
}
