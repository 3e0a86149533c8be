use crate::remote::ApiError;
use crate::storage::StoreError;

/// Device capability a user action depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Camera,
    PhotoLibrary,
    Location,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Camera => write!(f, "Camera"),
            Self::PhotoLibrary => write!(f, "Photo library"),
            Self::Location => write!(f, "Location"),
        }
    }
}

/// Errors surfaced to whoever drives a user action.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} access is required")]
    PermissionDenied(Capability),

    #[error("{0}")]
    Validation(String),

    #[error("could not determine your location, make sure location services are on")]
    LocationUnavailable,

    #[error("not signed in")]
    NotSignedIn,

    #[error(transparent)]
    Remote(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
