//! Device capabilities the creation flow consumes: image capture or picking, and GPS.
//!
//! A host app implements these over its platform APIs. The adapters here back
//! the command-line front end.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::core::task::Location;

/// Camera or photo library.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn request_permission(&self) -> bool;

    /// URI of the captured or picked image, `None` if the user cancelled.
    async fn acquire(&self) -> Option<String>;
}

#[async_trait]
pub trait Locator: Send + Sync {
    async fn request_permission(&self) -> bool;

    /// A fresh fix. The caller bounds how long it waits.
    async fn current_position(&self) -> Result<Location, String>;

    async fn last_known_position(&self) -> Option<Location>;
}

/// An image that already sits on disk, e.g. passed on the command line.
#[derive(Debug, Clone, Default)]
pub struct FileImageSource {
    path: Option<PathBuf>,
}

impl FileImageSource {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ImageSource for FileImageSource {
    async fn request_permission(&self) -> bool {
        true
    }

    async fn acquire(&self) -> Option<String> {
        let path = self.path.as_ref()?;
        if tokio::fs::metadata(path).await.is_err() {
            log::warn!("Image {} does not exist", path.display());
            return None;
        }
        Some(path.display().to_string())
    }
}

/// Position source with canned answers.
#[derive(Debug, Clone, Default)]
pub struct StaticLocator {
    pub permitted: bool,
    pub current: Option<Location>,
    pub last_known: Option<Location>,
}

impl StaticLocator {
    pub fn fixed(location: Location) -> Self {
        Self {
            permitted: true,
            current: Some(location),
            last_known: None,
        }
    }

    /// Permission granted but no fix to be had.
    pub fn unavailable() -> Self {
        Self {
            permitted: true,
            current: None,
            last_known: None,
        }
    }

    pub fn denied() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Locator for StaticLocator {
    async fn request_permission(&self) -> bool {
        self.permitted
    }

    async fn current_position(&self) -> Result<Location, String> {
        self.current.ok_or_else(|| "no position fix".to_string())
    }

    async fn last_known_position(&self) -> Option<Location> {
        self.last_known
    }
}
