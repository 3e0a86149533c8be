use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use super::{KeyValueStore, StoreError};
use crate::core::task::{Task, TaskStats};

/// Key holding every task on the device, for all users.
pub const TASKS_KEY: &str = "tasks";

const FALLBACK_IMAGE_NAME: &str = "temp_img.jpg";

/// Device-local task collection kept as one JSON array.
///
/// Every public operation logs and swallows storage failures: readers get an
/// empty list and writers leave the stored data as it was. Mutations run
/// under `write_lock`, so two overlapping read-modify-write cycles through
/// the same store never lose an update.
pub struct LocalTaskStore {
    kv: Arc<dyn KeyValueStore>,
    images_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalTaskStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, images_dir: impl Into<PathBuf>) -> Self {
        Self {
            kv,
            images_dir: images_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub async fn get_tasks(&self, user_id: &str) -> Vec<Task> {
        match self.load_all().await {
            Ok(all) => all.into_iter().filter(|t| t.is_owned_by(user_id)).collect(),
            Err(e) => {
                log::error!("Failed to read tasks: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn add_task(&self, task: Task) {
        let _guard = self.write_lock.lock().await;
        let result = async {
            let mut all = self.load_all().await?;
            if all.iter().any(|t| t.id == task.id) {
                log::warn!("Task {} already stored, not adding it again", task.id);
                return Ok(());
            }
            all.push(task);
            self.write_all(&all).await
        }
        .await;
        if let Err(e) = result {
            log::error!("Failed to save task: {}", e);
        }
    }

    /// Stores a freshly created task, moving its id forward until it is free.
    ///
    /// Unlike `add_task` this never drops the record: the stored task is
    /// returned, or the storage error if nothing was written.
    pub async fn create_task(&self, mut task: Task) -> Result<Task, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.load_all().await?;
        task.id = free_id(&all, task.id);
        all.push(task.clone());
        self.write_all(&all).await?;
        Ok(task)
    }

    /// Flips completion on the task with `id`. Unknown ids are ignored.
    pub async fn toggle_task(&self, id: &str) {
        let _guard = self.write_lock.lock().await;
        let result = async {
            let mut all = self.load_all().await?;
            match all.iter_mut().find(|t| t.id == id) {
                Some(task) => task.toggle(),
                None => {
                    log::debug!("Toggle for unknown task {}", id);
                    return Ok(());
                }
            }
            self.write_all(&all).await
        }
        .await;
        if let Err(e) = result {
            log::error!("Failed to toggle task {}: {}", id, e);
        }
    }

    /// Removes the task and, best effort, the image file it points at.
    pub async fn delete_task(&self, id: &str) {
        let _guard = self.write_lock.lock().await;
        let result = async {
            let mut all = self.load_all().await?;
            let Some(pos) = all.iter().position(|t| t.id == id) else {
                return Ok(());
            };
            let removed = all.remove(pos);
            if let Some(path) = removed.image_uri.as_deref().and_then(local_image_path) {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    log::debug!("Ignoring image cleanup failure for {}: {}", path.display(), e);
                }
            }
            self.write_all(&all).await
        }
        .await;
        if let Err(e) = result {
            log::error!("Failed to delete task {}: {}", id, e);
        }
    }

    /// Copies a freshly captured image into durable storage and returns its new path.
    ///
    /// Inline `data:` images and remote URLs are returned untouched. If the
    /// copy fails the original reference is returned.
    pub async fn save_image(&self, temp_uri: &str) -> String {
        let Some(source) = local_image_path(temp_uri) else {
            return temp_uri.to_string();
        };

        let file_name = source
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| FALLBACK_IMAGE_NAME.into());
        let target = self.images_dir.join(file_name);
        if target == source {
            return temp_uri.to_string();
        }

        let copied = async {
            tokio::fs::create_dir_all(&self.images_dir).await?;
            tokio::fs::copy(&source, &target).await
        }
        .await;

        match copied {
            Ok(_) => target.display().to_string(),
            Err(e) => {
                log::error!("Failed to keep image {}: {}", source.display(), e);
                temp_uri.to_string()
            }
        }
    }

    pub async fn stats(&self, user_id: &str) -> TaskStats {
        TaskStats::from_tasks(&self.get_tasks(user_id).await)
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    async fn load_all(&self) -> Result<Vec<Task>, StoreError> {
        match self.kv.get_item(TASKS_KEY).await? {
            Some(json) if !json.trim().is_empty() => Ok(serde_json::from_str(&json)?),
            _ => Ok(Vec::new()),
        }
    }

    async fn write_all(&self, tasks: &[Task]) -> Result<(), StoreError> {
        let json = serde_json::to_string(tasks)?;
        self.kv.set_item(TASKS_KEY, &json).await
    }
}

/// `wanted` if no stored task uses it. Timestamp ids are bumped by one
/// millisecond at a time, other ids get a numeric suffix.
fn free_id(tasks: &[Task], wanted: String) -> String {
    let taken = |id: &str| tasks.iter().any(|t| t.id == id);
    if !taken(&wanted) {
        return wanted;
    }
    match wanted.parse::<i64>() {
        Ok(mut millis) => loop {
            millis += 1;
            let id = millis.to_string();
            if !taken(&id) {
                return id;
            }
        },
        Err(_) => {
            let mut n = 1;
            loop {
                let id = format!("{}-{}", wanted, n);
                if !taken(&id) {
                    return id;
                }
                n += 1;
            }
        }
    }
}

/// Filesystem path behind an image reference, if it is a local file.
pub(crate) fn local_image_path(uri: &str) -> Option<PathBuf> {
    if uri.is_empty()
        || uri.starts_with("data:")
        || uri.starts_with("http://")
        || uri.starts_with("https://")
    {
        return None;
    }
    Some(PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri)))
}
