//! 账户端点

use anyhow::{anyhow, Result};
use reqwest::Method;
use serde_json::Value;

use nofx_domain::Balance;

use super::{value_f64, BinanceExchange};

impl BinanceExchange {
    pub(crate) async fn fetch_balance(&self) -> Result<Balance> {
        if self.settings.dry_run {
            return Ok(Balance { total: 10000.0, free: 10000.0, used: 0.0 });
        }

        let resp = self
            .http
            .signed_request(Method::GET, "/fapi/v2/balance", &[])
            .await
            .map_err(|e| anyhow!("get balance failed: {}", e))?;

        let rows = resp.as_array().ok_or_else(|| anyhow!("invalid balance response"))?;

        for bal in rows {
            if bal.get("asset").and_then(Value::as_str) == Some("USDT") {
                let total = bal.get("balance").map(value_f64).unwrap_or(0.0);
                let free = bal.get("availableBalance").map(value_f64).unwrap_or(0.0);
                return Ok(Balance { total, free, used: total - free });
            }
        }

        Ok(Balance::default())
    }
}
