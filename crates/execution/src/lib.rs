//! # NOFX Execution
//!
//! 执行引擎：分布式锁 + 去重 + 下单确认 + 审计，
//! SL/TP 守护与信号队列总线

pub mod audit;
pub mod bus;
pub mod dedupe;
pub mod engine;
pub mod guard;
pub mod lock;

pub use bus::SignalBus;
pub use engine::{ExecResult, ExecutionEngine};
