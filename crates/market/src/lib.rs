//! # NOFX Market
//!
//! 市场扫描：币种池维护、多周期并发抓取、指标计算、流式输出

pub mod scanner;
pub mod stream;
pub mod symbol_pool;

pub use scanner::Scanner;
