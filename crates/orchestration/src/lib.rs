//! # NOFX Orchestration
//!
//! 长循环编排：分析周期（扫描 -> 决策 -> 入队）、执行循环、
//! SL/TP 守护循环、波动率池刷新，以及带恢复与优雅停机的监督器

pub mod router;
pub mod supervisor;
pub mod workflow;

pub use router::DecisionRouter;
pub use supervisor::Supervisor;
