//! Automation engine: batched categorization actions with an approval
//! lifecycle, exact revert, and provenance answers

mod engine;
mod provenance;
mod revert;
mod types;

#[cfg(test)]
mod tests;

pub use engine::AutomationEngine;
pub use types::{
    AutomationDetail, AutomationReceipt, EngineConfig, EngineError, EngineResult,
    ExecutionMode, FailurePolicy, NewAutomation, RevertReport, SkippedRevert,
};
