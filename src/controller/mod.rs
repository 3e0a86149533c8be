pub mod create;
pub mod list;

pub use create::{CreationOptions, DeviceServices, LocationNotice, TaskCreationController, TaskDraft};
pub use list::TaskListController;
