use std::sync::Arc;

use crate::auth::{Authenticator, LocalAuthenticator, RemoteAuthenticator};
use crate::backend::{LocalBackend, RemoteBackend, TaskBackend};
use crate::config::{AppConfig, BackendKind};
use crate::controller::{CreationOptions, DeviceServices, TaskCreationController, TaskListController};
use crate::error::{Error, Result};
use crate::remote::{ApiClient, ApiError};
use crate::session::{SessionHolder, SessionState, TokenSlot};
use crate::storage::tasks::LocalTaskStore;
use crate::storage::{FileStore, KeyValueStore};

/// Everything one running app instance shares, built once from the config.
pub struct AppContext {
    config: AppConfig,
    session: SessionHolder,
    api: Option<Arc<ApiClient>>,
    store: Arc<LocalTaskStore>,
}

impl AppContext {
    /// Device storage under the configured data directory.
    pub fn new(config: AppConfig) -> Result<Self> {
        config.ensure_dirs().map_err(crate::storage::StoreError::from)?;
        let kv = Arc::new(FileStore::new(config.storage_dir()));
        Self::with_store(config, kv)
    }

    pub fn with_store(config: AppConfig, kv: Arc<dyn KeyValueStore>) -> Result<Self> {
        let token = TokenSlot::new();
        let store = Arc::new(LocalTaskStore::new(kv.clone(), config.images_dir()));

        let (api, auth) = match config.backend {
            BackendKind::Remote => {
                let url = config.api_url.as_deref().ok_or(ApiError::NotConfigured)?;
                let api = Arc::new(ApiClient::new(url, config.request_timeout(), token.clone())?);
                let auth: Arc<dyn Authenticator> = Arc::new(RemoteAuthenticator::new(api.clone()));
                (Some(api), auth)
            }
            BackendKind::Local => {
                let auth: Arc<dyn Authenticator> = Arc::new(LocalAuthenticator);
                (None, auth)
            }
        };

        let session = SessionHolder::new(kv, auth, token);
        Ok(Self {
            config,
            session,
            api,
            store,
        })
    }

    pub async fn init(&self) -> SessionState {
        self.session.init().await
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionHolder {
        &self.session
    }

    /// The configured backend for the signed-in user.
    pub fn backend(&self) -> Result<Arc<dyn TaskBackend>> {
        let SessionState::SignedIn(session) = self.session.state() else {
            return Err(Error::NotSignedIn);
        };
        match (&self.config.backend, &self.api) {
            (BackendKind::Remote, Some(api)) => Ok(Arc::new(RemoteBackend::new(api.clone()))),
            (BackendKind::Remote, None) => Err(ApiError::NotConfigured.into()),
            (BackendKind::Local, _) => {
                let user_id = session.user_id.ok_or(Error::NotSignedIn)?;
                Ok(Arc::new(LocalBackend::new(self.store.clone(), user_id)))
            }
        }
    }

    pub fn task_list(&self) -> Result<TaskListController> {
        Ok(TaskListController::new(self.backend()?))
    }

    pub fn task_creation(&self, device: DeviceServices) -> Result<TaskCreationController> {
        Ok(TaskCreationController::new(
            self.backend()?,
            device,
            CreationOptions::from_config(&self.config),
        ))
    }
}
