use crate::error::DataResult;
use serde::de::DeserializeOwned;
use serde::Serialize;

// Encodage des colonnes structurées (listes, objets imbriqués) en texte JSON.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> DataResult<String> {
    Ok(serde_json::to_string(value)?)
}

pub fn decode<T: DeserializeOwned>(column: &str) -> DataResult<T> {
    Ok(serde_json::from_str(column)?)
}

// Variante pour les colonnes NULL-ables.
pub fn decode_opt<T: DeserializeOwned>(column: Option<&str>) -> DataResult<Option<T>> {
    column.map(decode).transpose()
}
