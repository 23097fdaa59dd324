//! 组件共享上下文
//!
//! 启动时构造一次，显式传入各组件（取代包级单例）

use std::sync::Arc;

use nofx_domain::{Exchange, Store};

use crate::config::Settings;

#[derive(Clone)]
pub struct TradeContext {
    pub store: Arc<dyn Store>,
    pub exchange: Arc<dyn Exchange>,
    pub settings: Arc<Settings>,
}

impl TradeContext {
    pub fn new(store: Arc<dyn Store>, exchange: Arc<dyn Exchange>, settings: Arc<Settings>) -> Self {
        Self { store, exchange, settings }
    }
}
