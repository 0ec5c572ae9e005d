use crate::types::*;

/// Telegram Bot API client. Persistent connection pool via reqwest.
#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    url: String,
    chat_id: String,
    symbol: String,
}

impl TelegramClient {
    pub fn new(bot_token: &str, chat_id: &str, symbol: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("https://api.telegram.org/bot{}/sendMessage", bot_token),
            chat_id: chat_id.to_string(),
            symbol: symbol.to_string(),
        }
    }

    /// Send with HTML parse mode (for formatted messages).
    async fn send_html(&self, text: &str) {
        match self
            .client
            .post(&self.url)
            .json(&serde_json::json!({
                "chat_id": &self.chat_id,
                "text": text,
                "parse_mode": "HTML",
            }))
            .send()
            .await
        {
            Ok(resp) => {
                if !resp.status().is_success() {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    eprintln!("[TG] Send failed: {} — {}", status, body);
                }
            }
            Err(e) => {
                eprintln!("[TG] Request error: {}", e);
            }
        }
    }

    /// Send plain text (no parse mode — safe for all characters).
    async fn send_plain(&self, text: &str) {
        match self
            .client
            .post(&self.url)
            .json(&serde_json::json!({
                "chat_id": &self.chat_id,
                "text": text,
            }))
            .send()
            .await
        {
            Ok(resp) => {
                if !resp.status().is_success() {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    eprintln!("[TG] Send failed: {} — {}", status, body);
                }
            }
            Err(e) => {
                eprintln!("[TG] Request error: {}", e);
            }
        }
    }

    pub async fn send_session_start(&self, s: &SessionStartRecord) {
        let text = format!(
            "🏁 Session started: <code>{}</code>\n\
             {} [{}] | Levels: {} | Qty: {}\n\
             Band: ±{:.1}%",
            s.session_id, s.symbol, s.profile, s.grid_levels, s.order_qty,
            s.grid_offset * 50.0,
        );
        self.send_html(&text).await;
    }

    pub async fn send_trade_alert(&self, t: &TradeRecord) {
        let emoji = if t.pnl >= 0.0 { "✅" } else { "❌" };
        let text = format!(
            "{} TRADE ({}): {} {:.4} → {:.4} x {}\n\
             PnL: ${:.2} | Session: ${:.2}",
            emoji, t.exit_kind, self.symbol, t.entry_price, t.exit_price, t.qty,
            t.pnl, t.session_pnl,
        );
        self.send_plain(&text).await;
    }

    pub async fn send_risk_alert(&self, r: &RiskRecord) {
        let text = format!(
            "🛑 RISK PAUSE on {}\n\
             {}\n\
             Mid: {:.4} | Long: ${:.0} | Short: ${:.0} | Equity: ${:.2}",
            self.symbol, r.trigger, r.mid, r.long_notional, r.short_notional,
            r.margin_balance,
        );
        self.send_plain(&text).await;
    }

    pub async fn send_session_summary(&self, s: &SessionEndRecord) {
        let text = format!(
            "🏆 Session ended: <code>{}</code>\n\
             Trades: {} | Wins: {} ({:.0}%)\n\
             PnL: ${:.2} | Pauses: {} | Recenters: {}",
            s.session_id, s.total_trades, s.winning_trades, s.win_rate * 100.0,
            s.total_pnl, s.pauses, s.recenters,
        );
        self.send_html(&text).await;
    }
}
