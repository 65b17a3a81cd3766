//! Recovery execution: orchestrator, progress monitor and step dispatch

pub mod dispatch;
pub mod monitor;
pub mod orchestrator;

pub use dispatch::execute_step;
pub use monitor::{
    ExecutionMonitor, MonitorDecision, Progress, ProgressMonitor, StepAdjustment,
    MAX_EXTENDED_TIMEOUT,
};
pub use orchestrator::{AttemptState, RecoveryOrchestrator, RECOVERY_FAILED};
