use std::sync::Arc;

use crate::backend::TaskBackend;
use crate::core::task::{Task, TaskStats, sort_pending_first};
use crate::error::Result;

const LOAD_FAILED: &str = "Could not load tasks";
const UPDATE_FAILED: &str = "Could not update the task";

/// State behind the task list screen.
///
/// Toggles are applied in memory before the backend confirms them and rolled
/// back if it refuses. Deletes need a confirmation step first.
pub struct TaskListController {
    backend: Arc<dyn TaskBackend>,
    tasks: Vec<Task>,
    loading: bool,
    error: Option<String>,
    pending_delete: Option<String>,
}

impl TaskListController {
    pub fn new(backend: Arc<dyn TaskBackend>) -> Self {
        Self {
            backend,
            tasks: Vec::new(),
            loading: false,
            error: None,
            pending_delete: None,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Last user-facing error, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn pending_delete(&self) -> Option<&str> {
        self.pending_delete.as_deref()
    }

    pub fn stats(&self) -> TaskStats {
        TaskStats::from_tasks(&self.tasks)
    }

    /// The screen became visible.
    pub async fn on_focus(&mut self) -> Result<()> {
        self.refresh().await
    }

    /// Replace the list with the backend's, pending tasks first.
    pub async fn refresh(&mut self) -> Result<()> {
        self.loading = true;
        self.error = None;
        let result = self.backend.list().await;
        self.loading = false;

        match result {
            Ok(mut tasks) => {
                sort_pending_first(&mut tasks);
                log::debug!("Loaded {} tasks", tasks.len());
                self.tasks = tasks;
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to load tasks: {}", e);
                self.error = Some(LOAD_FAILED.to_string());
                Err(e)
            }
        }
    }

    pub async fn toggle(&mut self, id: &str) -> Result<()> {
        let Some(current) = self.tasks.iter().find(|t| t.id == id).map(|t| t.completed) else {
            return Ok(());
        };

        let snapshot = self.tasks.clone();
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) {
            task.toggle();
        }

        if let Err(e) = self.backend.toggle(id, current).await {
            log::error!("Toggle of {} rejected, rolling back: {}", id, e);
            self.tasks = snapshot;
            self.error = Some(UPDATE_FAILED.to_string());
            return Err(e);
        }
        Ok(())
    }

    /// First step of a delete: remember what to delete until confirmed.
    pub fn request_delete(&mut self, id: impl Into<String>) {
        self.pending_delete = Some(id.into());
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    /// Second step of a delete. The list only changes once the backend agrees.
    pub async fn confirm_delete(&mut self) -> Result<()> {
        let Some(id) = self.pending_delete.take() else {
            return Ok(());
        };

        match self.backend.delete(&id).await {
            Ok(()) => {
                self.tasks.retain(|t| t.id != id);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to delete {}: {}", id, e);
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }
}
