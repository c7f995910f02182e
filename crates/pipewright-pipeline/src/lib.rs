//! Pipeline orchestration for pipewright.
//!
//! Stage managers append source, approval, build and deploy stages for one
//! repository; the pipeline manager drives them through that fixed template
//! and the notification manager derives build-status event rules from the
//! configured repositories.

pub mod manager;
pub mod middle_tier;
pub mod notifications;
pub mod stage_manager;
pub mod web;

pub use manager::PipelineManager;
pub use middle_tier::MiddleTierStageManager;
pub use notifications::NotificationManager;
pub use stage_manager::{StageManager, stage_manager_for};
pub use web::WebStageManager;
