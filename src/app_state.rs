use crate::changes::ChangeStore;
use crate::email::EmailHelper;
use crate::lists::ListStore;
use crate::main_data::MainDataStore;
use crate::permissions::PermissionProvider;
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub lists: Arc<ListStore>,
    pub changes: Arc<ChangeStore>,
    pub main_data: Arc<MainDataStore>,
    pub permissions: Arc<dyn PermissionProvider>,
    pub email: Arc<EmailHelper>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        permissions: Arc<dyn PermissionProvider>,
        email: Arc<EmailHelper>,
    ) -> Self {
        Self {
            lists: Arc::new(ListStore::new(db.clone())),
            changes: Arc::new(ChangeStore::new(db.clone())),
            main_data: Arc::new(MainDataStore::new(db.clone())),
            db,
            permissions,
            email,
        }
    }
}
