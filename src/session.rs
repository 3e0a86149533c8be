use std::sync::{Arc, RwLock};

use tokio::sync::watch;

use crate::auth::Authenticator;
use crate::error::Result;
use crate::storage::KeyValueStore;

pub const TOKEN_KEY: &str = "userToken";
pub const USER_ID_KEY: &str = "userId";

/// The bearer token shared between the session and the API client.
#[derive(Debug, Clone, Default)]
pub struct TokenSlot(Arc<RwLock<Option<String>>>);

impl TokenSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set(&self, token: Option<String>) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = token;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Persisted credentials have not been read yet.
    Loading,
    SignedOut,
    SignedIn(Session),
}

/// Where a front end should send the user for a given session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Landing {
    Splash,
    SignIn,
    Home,
}

/// Authentication state for one running app.
///
/// Created in `Loading`, moved to a definite state by [`SessionHolder::init`].
/// Dependents watch changes through [`SessionHolder::subscribe`].
pub struct SessionHolder {
    kv: Arc<dyn KeyValueStore>,
    auth: Arc<dyn Authenticator>,
    token: TokenSlot,
    state: watch::Sender<SessionState>,
}

impl SessionHolder {
    pub fn new(kv: Arc<dyn KeyValueStore>, auth: Arc<dyn Authenticator>, token: TokenSlot) -> Self {
        let (state, _) = watch::channel(SessionState::Loading);
        Self {
            kv,
            auth,
            token,
            state,
        }
    }

    /// Restore the session from persisted credentials.
    pub async fn init(&self) -> SessionState {
        let token = match self.kv.get_item(TOKEN_KEY).await {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                log::error!("Failed to read stored session: {}", e);
                None
            }
        };
        let user_id = match self.kv.get_item(USER_ID_KEY).await {
            Ok(id) => id,
            Err(e) => {
                log::error!("Failed to read stored user id: {}", e);
                None
            }
        };

        let state = match token {
            Some(token) => SessionState::SignedIn(Session { token, user_id }),
            None => SessionState::SignedOut,
        };
        self.publish(state.clone());
        state
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let creds = self.auth.sign_in(email, password).await?;

        self.kv.set_item(TOKEN_KEY, &creds.token).await?;
        match &creds.user_id {
            Some(id) => self.kv.set_item(USER_ID_KEY, id).await?,
            None => self.kv.remove_item(USER_ID_KEY).await?,
        }

        let session = Session {
            token: creds.token,
            user_id: creds.user_id,
        };
        self.publish(SessionState::SignedIn(session.clone()));
        Ok(session)
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<()> {
        self.auth.register(email, password).await
    }

    /// Forget the credentials and tell every subscriber.
    pub async fn sign_out(&self) {
        for key in [TOKEN_KEY, USER_ID_KEY] {
            if let Err(e) = self.kv.remove_item(key).await {
                log::error!("Failed to clear {}: {}", key, e);
            }
        }
        self.publish(SessionState::SignedOut);
        log::info!("Signed out");
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn user_id(&self) -> Option<String> {
        match &*self.state.borrow() {
            SessionState::SignedIn(session) => session.user_id.clone(),
            _ => None,
        }
    }

    pub fn landing(&self) -> Landing {
        match &*self.state.borrow() {
            SessionState::Loading => Landing::Splash,
            SessionState::SignedOut => Landing::SignIn,
            SessionState::SignedIn(_) => Landing::Home,
        }
    }

    pub fn token_slot(&self) -> &TokenSlot {
        &self.token
    }

    fn publish(&self, state: SessionState) {
        let token = match &state {
            SessionState::SignedIn(session) => Some(session.token.clone()),
            _ => None,
        };
        self.token.set(token);
        self.state.send_replace(state);
    }
}
