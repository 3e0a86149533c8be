use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::remote::{ApiClient, ApiError};

/// What a successful sign-in yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub user_id: Option<String>,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Credentials>;
    async fn register(&self, email: &str, password: &str) -> Result<()>;
}

fn require_fields(email: &str, password: &str) -> Result<()> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(Error::validation("Fill in all fields"));
    }
    Ok(())
}

/// Accounts live on the todo API; the token it hands back authorizes later calls.
pub struct RemoteAuthenticator {
    api: Arc<ApiClient>,
}

impl RemoteAuthenticator {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Authenticator for RemoteAuthenticator {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Credentials> {
        require_fields(email, password)?;
        let resp = self.api.login(email.trim(), password).await?;
        let user_id = resp.user_id();
        let token = resp
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Decode("login response carried no token".into()))?;
        log::info!("Signed in as {}", email.trim());
        Ok(Credentials { token, user_id })
    }

    async fn register(&self, email: &str, password: &str) -> Result<()> {
        require_fields(email, password)?;
        self.api.register(email.trim(), password).await?;
        log::info!("Registered account {}", email.trim());
        Ok(())
    }
}

/// Device-only accounts: the account name is both the token and the task owner.
#[derive(Debug, Default)]
pub struct LocalAuthenticator;

#[async_trait]
impl Authenticator for LocalAuthenticator {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Credentials> {
        require_fields(email, password)?;
        let name = email.trim().to_string();
        Ok(Credentials {
            token: name.clone(),
            user_id: Some(name),
        })
    }

    async fn register(&self, email: &str, password: &str) -> Result<()> {
        require_fields(email, password)
    }
}
