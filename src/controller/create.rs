use std::sync::Arc;
use std::time::Duration;

use crate::backend::TaskBackend;
use crate::config::{AppConfig, LocationPolicy};
use crate::core::task::{Location, NewTask, Task};
use crate::device::{ImageSource, Locator};
use crate::error::{Capability, Error, Result};

/// Platform capabilities the creation flow uses.
#[derive(Clone)]
pub struct DeviceServices {
    pub camera: Arc<dyn ImageSource>,
    pub library: Arc<dyn ImageSource>,
    pub locator: Arc<dyn Locator>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreationOptions {
    pub gps_timeout: Duration,
    pub location_policy: LocationPolicy,
    pub require_photo: bool,
    pub require_location: bool,
}

impl CreationOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            gps_timeout: config.gps_timeout(),
            location_policy: config.location_policy,
            require_photo: config.require_photo,
            require_location: config.require_location,
        }
    }
}

impl Default for CreationOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Form contents while a task is being put together.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaskDraft {
    pub title: String,
    pub image_uri: Option<String>,
    pub location: Option<Location>,
}

/// How the draft's location was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationNotice {
    Current,
    /// GPS was slow or unavailable; a cached fix was used.
    LastKnown,
    /// No fix at all; the configured fallback pair was used.
    Fallback,
}

pub struct TaskCreationController {
    backend: Arc<dyn TaskBackend>,
    device: DeviceServices,
    options: CreationOptions,
    draft: TaskDraft,
}

impl TaskCreationController {
    pub fn new(backend: Arc<dyn TaskBackend>, device: DeviceServices, options: CreationOptions) -> Self {
        Self {
            backend,
            device,
            options,
            draft: TaskDraft::default(),
        }
    }

    pub fn draft(&self) -> &TaskDraft {
        &self.draft
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.draft.title = title.into();
    }

    pub fn clear_image(&mut self) {
        self.draft.image_uri = None;
    }

    pub async fn take_photo(&mut self) -> Result<()> {
        let camera = self.device.camera.clone();
        self.acquire_image(camera.as_ref(), Capability::Camera).await
    }

    pub async fn pick_image(&mut self) -> Result<()> {
        let library = self.device.library.clone();
        self.acquire_image(library.as_ref(), Capability::PhotoLibrary).await
    }

    async fn acquire_image(&mut self, source: &dyn ImageSource, capability: Capability) -> Result<()> {
        if !source.request_permission().await {
            return Err(Error::PermissionDenied(capability));
        }
        match source.acquire().await {
            Some(uri) => self.draft.image_uri = Some(uri),
            None => log::debug!("{} capture cancelled", capability),
        }
        Ok(())
    }

    /// Fill in the draft's location: fresh fix, else last known, else the policy decides.
    ///
    /// On error the draft's location is left as it was. Stopping the save is
    /// up to the caller, unless `require_location` makes `submit` refuse it.
    pub async fn acquire_location(&mut self) -> Result<LocationNotice> {
        let locator = self.device.locator.clone();

        if !locator.request_permission().await {
            return match self.options.location_policy {
                LocationPolicy::FixedFallback(fixed) => {
                    log::warn!("Location permission denied, using fallback position");
                    self.draft.location = Some(fixed);
                    Ok(LocationNotice::Fallback)
                }
                LocationPolicy::Fail => Err(Error::PermissionDenied(Capability::Location)),
            };
        }

        match tokio::time::timeout(self.options.gps_timeout, locator.current_position()).await {
            Ok(Ok(location)) => {
                self.draft.location = Some(location);
                return Ok(LocationNotice::Current);
            }
            Ok(Err(e)) => log::warn!("GPS unavailable, trying last known position: {}", e),
            Err(_) => log::warn!(
                "No GPS fix within {:?}, trying last known position",
                self.options.gps_timeout
            ),
        }

        if let Some(location) = locator.last_known_position().await {
            self.draft.location = Some(location);
            return Ok(LocationNotice::LastKnown);
        }

        match self.options.location_policy {
            LocationPolicy::FixedFallback(fixed) => {
                self.draft.location = Some(fixed);
                Ok(LocationNotice::Fallback)
            }
            LocationPolicy::Fail => {
                log::error!("No current or last known position");
                Err(Error::LocationUnavailable)
            }
        }
    }

    /// Validate and create the task. On failure the draft is left as it was.
    pub async fn submit(&mut self) -> Result<Option<Task>> {
        let title = self.draft.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::validation("Title is required"));
        }
        if (self.options.require_photo && self.draft.image_uri.is_none())
            || (self.options.require_location && self.draft.location.is_none())
        {
            return Err(Error::validation("Photo and location are required"));
        }

        let image_uri = match &self.draft.image_uri {
            Some(uri) => self.backend.store_image(uri).await?,
            None => None,
        };

        let created = self
            .backend
            .create(NewTask {
                title,
                image_uri,
                location: self.draft.location,
            })
            .await?;

        log::info!("Created task {:?}", created.as_ref().map(|t| &t.id));
        self.draft = TaskDraft::default();
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use crate::device::{FileImageSource, StaticLocator};
    use crate::storage::MemoryStore;
    use crate::storage::tasks::LocalTaskStore;
    use async_trait::async_trait;

    struct DeniedSource;

    #[async_trait]
    impl ImageSource for DeniedSource {
        async fn request_permission(&self) -> bool {
            false
        }

        async fn acquire(&self) -> Option<String> {
            panic!("acquire without permission");
        }
    }

    /// Never produces a fresh fix in time.
    struct StalledLocator {
        last_known: Option<Location>,
    }

    #[async_trait]
    impl Locator for StalledLocator {
        async fn request_permission(&self) -> bool {
            true
        }

        async fn current_position(&self) -> std::result::Result<Location, String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err("too late".into())
        }

        async fn last_known_position(&self) -> Option<Location> {
            self.last_known
        }
    }

    fn local_store() -> Arc<LocalTaskStore> {
        Arc::new(LocalTaskStore::new(Arc::new(MemoryStore::new()), "/nonexistent"))
    }

    fn devices(locator: Arc<dyn Locator>) -> DeviceServices {
        DeviceServices {
            camera: Arc::new(FileImageSource::default()),
            library: Arc::new(FileImageSource::default()),
            locator,
        }
    }

    fn options() -> CreationOptions {
        CreationOptions {
            gps_timeout: Duration::from_millis(20),
            ..CreationOptions::default()
        }
    }

    #[tokio::test]
    async fn creates_task_without_image() {
        let store = local_store();
        let backend = Arc::new(LocalBackend::new(store.clone(), "ana"));
        let here = Location::new(37.0, -122.0);
        let mut ctl = TaskCreationController::new(
            backend,
            devices(Arc::new(StaticLocator::fixed(here))),
            options(),
        );

        ctl.set_title("Buy milk");
        assert_eq!(ctl.acquire_location().await.unwrap(), LocationNotice::Current);
        let created = ctl.submit().await.unwrap().unwrap();
        assert_eq!(created.title, "Buy milk");

        let stored = store.get_tasks("ana").await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].image_uri, None);
        assert!(!stored[0].completed);
        assert_eq!(stored[0].location, Some(here));
        assert_eq!(ctl.draft(), &TaskDraft::default());
    }

    #[tokio::test]
    async fn gps_timeout_without_last_known_aborts() {
        let store = local_store();
        let backend = Arc::new(LocalBackend::new(store.clone(), "ana"));
        let mut ctl = TaskCreationController::new(
            backend,
            devices(Arc::new(StalledLocator { last_known: None })),
            options(),
        );
        ctl.set_title("Buy milk");

        let err = ctl.acquire_location().await.unwrap_err();
        assert!(matches!(err, Error::LocationUnavailable));
        assert_eq!(ctl.draft().location, None);
        assert_eq!(ctl.draft().title, "Buy milk");
        assert!(store.get_tasks("ana").await.is_empty());
    }

    #[tokio::test]
    async fn required_location_blocks_submit_after_gps_timeout() {
        let store = local_store();
        let backend = Arc::new(LocalBackend::new(store.clone(), "ana"));
        let mut ctl = TaskCreationController::new(
            backend,
            devices(Arc::new(StalledLocator { last_known: None })),
            CreationOptions {
                require_location: true,
                ..options()
            },
        );
        ctl.set_title("Buy milk");

        assert!(ctl.acquire_location().await.is_err());
        assert!(ctl.submit().await.is_err());
        assert!(store.get_tasks("ana").await.is_empty());
    }

    #[tokio::test]
    async fn gps_timeout_falls_back_to_last_known() {
        let cached = Location::new(10.0, 20.0);
        let mut ctl = TaskCreationController::new(
            Arc::new(LocalBackend::new(local_store(), "ana")),
            devices(Arc::new(StalledLocator {
                last_known: Some(cached),
            })),
            options(),
        );

        assert_eq!(ctl.acquire_location().await.unwrap(), LocationNotice::LastKnown);
        assert_eq!(ctl.draft().location, Some(cached));
    }

    #[tokio::test]
    async fn fixed_fallback_policy_substitutes_position() {
        let opts = CreationOptions {
            location_policy: LocationPolicy::default_fallback(),
            ..options()
        };
        let mut ctl = TaskCreationController::new(
            Arc::new(LocalBackend::new(local_store(), "ana")),
            devices(Arc::new(StaticLocator::denied())),
            opts,
        );

        assert_eq!(ctl.acquire_location().await.unwrap(), LocationNotice::Fallback);
        assert_eq!(ctl.draft().location, Some(Location::new(-33.4569, -70.6483)));
    }

    #[tokio::test]
    async fn denied_location_fails_by_default() {
        let mut ctl = TaskCreationController::new(
            Arc::new(LocalBackend::new(local_store(), "ana")),
            devices(Arc::new(StaticLocator::denied())),
            options(),
        );
        let err = ctl.acquire_location().await.unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(Capability::Location)));
        assert_eq!(ctl.draft().location, None);
    }

    #[tokio::test]
    async fn denied_camera_aborts() {
        let mut device = devices(Arc::new(StaticLocator::unavailable()));
        device.camera = Arc::new(DeniedSource);
        let mut ctl = TaskCreationController::new(
            Arc::new(LocalBackend::new(local_store(), "ana")),
            device,
            options(),
        );
        let err = ctl.take_photo().await.unwrap_err();
        assert_eq!(err.to_string(), "Camera access is required");
        assert_eq!(ctl.draft().image_uri, None);
    }

    #[tokio::test]
    async fn blank_title_is_rejected() {
        let store = local_store();
        let mut ctl = TaskCreationController::new(
            Arc::new(LocalBackend::new(store.clone(), "ana")),
            devices(Arc::new(StaticLocator::unavailable())),
            options(),
        );
        ctl.set_title("   ");
        let err = ctl.submit().await.unwrap_err();
        assert_eq!(err.to_string(), "Title is required");
        assert!(store.get_tasks("ana").await.is_empty());
    }

    #[tokio::test]
    async fn required_fields_are_enforced() {
        let mut ctl = TaskCreationController::new(
            Arc::new(LocalBackend::new(local_store(), "ana")),
            devices(Arc::new(StaticLocator::unavailable())),
            CreationOptions {
                require_photo: true,
                ..options()
            },
        );
        ctl.set_title("Paint fence");
        let err = ctl.submit().await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(ctl.draft().title, "Paint fence");
    }

    #[tokio::test]
    async fn picked_image_is_made_durable() {
        let dir = tempfile::tempdir().unwrap();
        let picked = dir.path().join("picked.jpg");
        std::fs::write(&picked, b"jpeg").unwrap();
        let images = dir.path().join("images");

        let store = Arc::new(LocalTaskStore::new(Arc::new(MemoryStore::new()), &images));
        let mut device = devices(Arc::new(StaticLocator::unavailable()));
        device.library = Arc::new(FileImageSource::new(Some(picked.clone())));
        let mut ctl = TaskCreationController::new(
            Arc::new(LocalBackend::new(store.clone(), "ana")),
            device,
            options(),
        );

        ctl.pick_image().await.unwrap();
        assert_eq!(ctl.draft().image_uri, Some(picked.display().to_string()));
        ctl.set_title("Fix bike");
        ctl.submit().await.unwrap();

        let stored = store.get_tasks("ana").await;
        assert_eq!(
            stored[0].image_uri,
            Some(images.join("picked.jpg").display().to_string())
        );
    }

    #[tokio::test]
    async fn backend_failure_keeps_draft() {
        let server = mockito::Server::new_async().await;
        let api = crate::remote::ApiClient::new(
            &server.url(),
            Duration::from_secs(5),
            crate::session::TokenSlot::new(),
        )
        .unwrap();
        let backend = Arc::new(crate::backend::RemoteBackend::new(Arc::new(api)));
        let mut ctl = TaskCreationController::new(
            backend,
            devices(Arc::new(StaticLocator::fixed(Location::new(1.0, 1.0)))),
            options(),
        );

        ctl.set_title("Ship it");
        ctl.acquire_location().await.unwrap();
        let before = ctl.draft().clone();
        // No mock registered, so the server answers 501
        assert!(ctl.submit().await.is_err());
        assert_eq!(ctl.draft(), &before);
    }
}
