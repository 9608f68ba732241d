// Surface HTTP : chaque opération client est un handler axum.
use crate::app_state::AppState;
use crate::database::current_timestamp;
use crate::error::DataError;
use crate::models::{CacheStatus, Change, HealthStatus, MainDataItem, ReferenceList};
use crate::validation::parse_boolean;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::HashMap;
use tracing::{error, info, warn};

// En-tête posé par la couche d'authentification en amont.
pub const REQUESTER_HEADER: &str = "x-requester-id";

// Erreur renvoyée au client. Seules les erreurs de validation sont des "bad request" ;
// les erreurs internes ne divulguent pas leur détail.
#[derive(Debug)]
pub struct ApiError(pub DataError);

impl From<DataError> for ApiError {
    fn from(err: DataError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DataError::Validation(_) => StatusCode::BAD_REQUEST,
            DataError::NotFound(_) => StatusCode::NOT_FOUND,
            DataError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self.0 {
            DataError::Validation(m) | DataError::NotFound(m) | DataError::Conflict(m) => {
                m.clone()
            }
            _ => "An internal error occurred.".to_string(),
        };

        let body = json!({
            "error_type": self.0.error_type(),
            "message": message,
        });
        (status, Json(body)).into_response()
    }
}

// Arguments nommés de la requête, noms insensibles à la casse.
#[derive(Debug, Default, Clone)]
pub struct RequestArgs(HashMap<String, String>);

impl From<HashMap<String, String>> for RequestArgs {
    fn from(params: HashMap<String, String>) -> Self {
        Self(
            params
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
        )
    }
}

impl RequestArgs {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_lowercase()).map(String::as_str)
    }

    // Absent : les résultats en cache sont acceptés.
    pub fn accept_cached(&self) -> Result<bool, DataError> {
        match self.get("acceptcachedresults") {
            None => Ok(true),
            Some(raw) => parse_boolean(raw).ok_or_else(|| {
                DataError::Validation(format!(
                    "The value '{}' for 'acceptcachedresults' is not a valid boolean.",
                    raw
                ))
            }),
        }
    }
}

fn requester(headers: &HeaderMap) -> Result<&str, DataError> {
    headers
        .get(REQUESTER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DataError::Validation("The requester identity is missing.".to_string()))
}

// Journalise l'échec ; les erreurs internes sont aussi signalées aux développeurs par e-mail.
fn fail(state: &AppState, operation: &'static str, err: DataError) -> ApiError {
    if err.error_type() == "internal" {
        error!("{} failed: {}", operation, err);
        if state.email.has_developers() {
            let email = state.email.clone();
            let message = err.to_string();
            tokio::spawn(async move {
                let subject = format!("Service error in {}", operation);
                if let Err(e) = email.send_generic_error(&message, &subject).await {
                    warn!("Could not notify developers: {}", e);
                }
            });
        }
    } else {
        info!("{} rejected: {}", operation, err);
    }
    ApiError(err)
}

// GET `/lists?acceptcachedresults=&name=`
pub async fn lists_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<ReferenceList>>, ApiError> {
    let args = RequestArgs::from(params);
    let accept_cached = args.accept_cached().map_err(ApiError)?;

    state
        .lists
        .load_lists(accept_cached, args.get("name"))
        .await
        .map(Json)
        .map_err(|e| fail(&state, "load_lists", e))
}

// GET `/changes?objectid=` ; le demandeur vient de l'en-tête.
pub async fn changes_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Change>>, ApiError> {
    let args = RequestArgs::from(params);
    let requester = requester(&headers).map_err(ApiError)?;

    state
        .changes
        .load_changes(requester, args.get("objectid"), state.permissions.as_ref())
        .await
        .map(Json)
        .map_err(|e| fail(&state, "load_changes", e))
}

// GET `/maindata?acceptcachedresults=`
pub async fn main_data_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<MainDataItem>, ApiError> {
    let args = RequestArgs::from(params);
    let accept_cached = args.accept_cached().map_err(ApiError)?;

    state
        .main_data
        .load_most_recent(accept_cached)
        .await
        .map(|item| Json((*item).clone()))
        .map_err(|e| fail(&state, "load_main_data", e))
}

// POST `/cache/reload` : recharge les caches depuis la base.
pub async fn reload_cache_handler(
    State(state): State<AppState>,
) -> Result<Json<CacheStatus>, ApiError> {
    load_caches(&state)
        .await
        .map_err(|e| fail(&state, "reload_cache", e))?;
    Ok(Json(cache_status(&state)))
}

// POST `/cache/release`
pub async fn release_cache_handler(State(state): State<AppState>) -> Json<CacheStatus> {
    state.lists.release_cache();
    state.main_data.release_cache();
    Json(cache_status(&state))
}

// Chargement des caches, au démarrage comme à la demande.
pub async fn load_caches(state: &AppState) -> Result<(), DataError> {
    state.lists.load_all(true).await?;
    state.main_data.load_all(true).await?;
    Ok(())
}

fn cache_status(state: &AppState) -> CacheStatus {
    CacheStatus {
        lists_loaded: state.lists.loaded_count(),
        main_data_id: state.main_data.current().id.clone(),
    }
}

// Handler pour GET `/health` : vérifie l'état de santé du service.
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthStatus>, StatusCode> {
    // Tente d'obtenir une connexion à la base de données.
    match state.db.acquire().await {
        Ok(_) => Ok(Json(HealthStatus {
            status: "healthy".to_string(),
            timestamp: current_timestamp(),
        })),
        Err(e) => {
            error!("Health check failed: DB acquire error: {}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
