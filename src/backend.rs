use std::sync::Arc;

use async_trait::async_trait;

use crate::core::task::{NewTask, Task};
use crate::error::Result;
use crate::remote::{ApiClient, PhotoRef};
use crate::storage::tasks::{LocalTaskStore, local_image_path};

/// Where a signed-in user's tasks live.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    async fn list(&self) -> Result<Vec<Task>>;

    /// The created task, when the backend reports it back.
    async fn create(&self, task: NewTask) -> Result<Option<Task>>;

    /// Flip completion of `id`, which is currently `current_status`.
    async fn toggle(&self, id: &str, current_status: bool) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Turn a transient image URI into a durable reference.
    async fn store_image(&self, uri: &str) -> Result<Option<String>>;
}

/// Tasks kept on the device, scoped to one user.
pub struct LocalBackend {
    store: Arc<LocalTaskStore>,
    user_id: String,
}

impl LocalBackend {
    pub fn new(store: Arc<LocalTaskStore>, user_id: impl Into<String>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
impl TaskBackend for LocalBackend {
    async fn list(&self) -> Result<Vec<Task>> {
        Ok(self.store.get_tasks(&self.user_id).await)
    }

    async fn create(&self, new: NewTask) -> Result<Option<Task>> {
        let mut task = Task::new(new.title, self.user_id.clone());
        task.image_uri = new.image_uri;
        task.location = new.location;
        let stored = self.store.create_task(task).await.map_err(|e| {
            log::error!("Failed to save task: {}", e);
            e
        })?;
        Ok(Some(stored))
    }

    async fn toggle(&self, id: &str, _current_status: bool) -> Result<()> {
        self.store.toggle_task(id).await;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete_task(id).await;
        Ok(())
    }

    async fn store_image(&self, uri: &str) -> Result<Option<String>> {
        Ok(Some(self.store.save_image(uri).await))
    }
}

/// Tasks kept by the todo API, scoped by the session token.
pub struct RemoteBackend {
    api: Arc<ApiClient>,
}

impl RemoteBackend {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl TaskBackend for RemoteBackend {
    async fn list(&self) -> Result<Vec<Task>> {
        Ok(self.api.get_all_todos().await)
    }

    async fn create(&self, new: NewTask) -> Result<Option<Task>> {
        let photo = new.image_uri.map(PhotoRef::Uri);
        Ok(self.api.create_todo(&new.title, photo, new.location).await?)
    }

    async fn toggle(&self, id: &str, current_status: bool) -> Result<()> {
        self.api.toggle_todo(id, current_status).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        Ok(self.api.delete_todo(id).await?)
    }

    /// Inline `data:` images and remote URLs are already durable and go to the API as they are.
    async fn store_image(&self, uri: &str) -> Result<Option<String>> {
        if local_image_path(uri).is_none() {
            return Ok(Some(uri.to_string()));
        }
        let photo = self.api.upload_image(uri).await?;
        Ok(photo.and_then(PhotoRef::into_uri))
    }
}
