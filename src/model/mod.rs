//! Domain model: resources, categories, tags, and automations

mod automation;
mod entity;
mod resource;

pub use automation::{
    ActionData, ActionStatus, Automation, AutomationAction, AutomationSource,
    AutomationStatus, CreatedBy,
};
pub use entity::{slugify, Category, Tag};
pub use resource::{ResourceKind, ResourceRef};
