use std::time::Instant;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::types::{AggTrade, Bar, BookTicker, FeedEvent, MarkPriceUpdate};

/// Pure producer: connects to the Binance futures combined stream, parses
/// book ticker / agg trade / kline / mark price payloads, sends FeedEvents.
/// Owns no shared state — only holds a channel sender.
pub async fn binance_feed(feed_tx: mpsc::Sender<FeedEvent>, stream_url: String) {
    let mut backoff_ms: u64 = 1000;

    loop {
        eprintln!("[BINANCE] Connecting to {}", stream_url);

        let ws = match connect_async(&stream_url).await {
            Ok((ws, _)) => {
                eprintln!("[BINANCE] Connected");
                backoff_ms = 1000;
                ws
            }
            Err(e) => {
                eprintln!("[BINANCE] Connect failed: {}, retrying in {}ms", e, backoff_ms);
                tokio::time::sleep(tokio::time::Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(10_000);
                continue;
            }
        };

        let (mut _write, mut read) = ws.split();

        while let Some(msg) = read.next().await {
            let msg = match msg {
                Ok(m) => m,
                Err(e) => {
                    eprintln!("[BINANCE] WS error: {}, reconnecting", e);
                    break;
                }
            };

            if let Message::Text(text) = msg {
                let recv_at = Instant::now();
                if let Some(event) = parse_combined(&text, recv_at) {
                    if feed_tx.send(event).await.is_err() {
                        eprintln!("[BINANCE] Channel closed, exiting");
                        return;
                    }
                }
            }
        }

        eprintln!("[BINANCE] Disconnected, reconnecting in {}ms", backoff_ms);
        tokio::time::sleep(tokio::time::Duration::from_millis(backoff_ms)).await;
        backoff_ms = (backoff_ms * 2).min(10_000);
    }
}

/// Combined streams wrap every payload as {"stream": "...", "data": {...}}.
fn parse_combined(text: &str, recv_at: Instant) -> Option<FeedEvent> {
    let v: serde_json::Value = serde_json::from_str(text).ok()?;
    let stream = v["stream"].as_str()?;
    let data = &v["data"];

    if stream.ends_with("@bookTicker") {
        parse_book_ticker(data, recv_at)
    } else if stream.ends_with("@aggTrade") {
        parse_agg_trade(data, recv_at)
    } else if stream.contains("@kline") {
        parse_kline(data)
    } else if stream.contains("@markPrice") {
        parse_mark_price(data)
    } else {
        None
    }
}

fn parse_book_ticker(data: &serde_json::Value, recv_at: Instant) -> Option<FeedEvent> {
    let bid: f64 = data["b"].as_str()?.parse().ok()?;
    let ask: f64 = data["a"].as_str()?.parse().ok()?;
    if bid <= 0.0 || ask <= 0.0 {
        return None;
    }
    Some(FeedEvent::Book(BookTicker { recv_at, bid, ask }))
}

fn parse_agg_trade(data: &serde_json::Value, recv_at: Instant) -> Option<FeedEvent> {
    let price: f64 = data["p"].as_str()?.parse().ok()?;
    let qty: f64 = data["q"].as_str()?.parse().ok()?;
    let ts_ms = data["T"].as_i64()?;
    let is_buy = !data["m"].as_bool()?; // m=true means the buyer was the maker

    Some(FeedEvent::Trade(AggTrade {
        exchange_ts_ms: ts_ms,
        recv_at,
        price,
        qty,
        is_buy,
    }))
}

fn parse_kline(data: &serde_json::Value) -> Option<FeedEvent> {
    let k = &data["k"];
    Some(FeedEvent::Bar(Bar {
        close_ts_ms: k["T"].as_i64()?,
        open: k["o"].as_str()?.parse().ok()?,
        high: k["h"].as_str()?.parse().ok()?,
        low: k["l"].as_str()?.parse().ok()?,
        close: k["c"].as_str()?.parse().ok()?,
        volume: k["v"].as_str()?.parse().ok()?,
        closed: k["x"].as_bool()?,
    }))
}

fn parse_mark_price(data: &serde_json::Value) -> Option<FeedEvent> {
    Some(FeedEvent::MarkPrice(MarkPriceUpdate {
        ts_ms: data["E"].as_i64()?,
        mark_price: data["p"].as_str()?.parse().ok()?,
        funding_rate: data["r"].as_str()?.parse().ok()?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_book_ticker() {
        let raw = r#"{"stream":"solusdt@bookTicker","data":{"e":"bookTicker","u":400900217,"s":"SOLUSDT","b":"142.5100","B":"31.4","a":"142.5200","A":"40.6","T":1710000000123,"E":1710000000125}}"#;
        match parse_combined(raw, Instant::now()) {
            Some(FeedEvent::Book(bt)) => {
                assert!((bt.bid - 142.51).abs() < 1e-9);
                assert!((bt.ask - 142.52).abs() < 1e-9);
                assert!((bt.mid() - 142.515).abs() < 1e-9);
            }
            _ => panic!("expected book ticker"),
        }
    }

    #[test]
    fn test_parse_agg_trade() {
        let raw = r#"{"stream":"solusdt@aggTrade","data":{"e":"aggTrade","E":1710000000200,"s":"SOLUSDT","a":12345,"p":"142.4800","q":"2.50","f":100,"l":105,"T":1710000000198,"m":true}}"#;
        match parse_combined(raw, Instant::now()) {
            Some(FeedEvent::Trade(t)) => {
                assert!((t.price - 142.48).abs() < 1e-9);
                assert!((t.qty - 2.5).abs() < 1e-9);
                assert_eq!(t.exchange_ts_ms, 1710000000198);
                assert!(!t.is_buy, "m=true means the buyer was the maker");
            }
            _ => panic!("expected agg trade"),
        }
    }

    #[test]
    fn test_parse_closed_kline() {
        let raw = r#"{"stream":"solusdt@kline_1m","data":{"e":"kline","E":1710000060001,"s":"SOLUSDT","k":{"t":1710000000000,"T":1710000059999,"s":"SOLUSDT","i":"1m","o":"142.00","c":"142.80","h":"143.10","l":"141.90","v":"1250.5","x":true}}}"#;
        match parse_combined(raw, Instant::now()) {
            Some(FeedEvent::Bar(bar)) => {
                assert!(bar.closed);
                assert!((bar.open - 142.0).abs() < 1e-9);
                assert!((bar.high - 143.1).abs() < 1e-9);
                assert!((bar.low - 141.9).abs() < 1e-9);
                assert!((bar.close - 142.8).abs() < 1e-9);
                assert_eq!(bar.close_ts_ms, 1710000059999);
            }
            _ => panic!("expected bar"),
        }
    }

    #[test]
    fn test_parse_in_progress_kline() {
        let raw = r#"{"stream":"solusdt@kline_1m","data":{"e":"kline","E":1710000030001,"s":"SOLUSDT","k":{"t":1710000000000,"T":1710000059999,"s":"SOLUSDT","i":"1m","o":"142.00","c":"142.30","h":"142.40","l":"141.95","v":"600.0","x":false}}}"#;
        match parse_combined(raw, Instant::now()) {
            Some(FeedEvent::Bar(bar)) => assert!(!bar.closed),
            _ => panic!("expected bar"),
        }
    }

    #[test]
    fn test_parse_mark_price() {
        let raw = r#"{"stream":"solusdt@markPrice@1s","data":{"e":"markPriceUpdate","E":1710000000500,"s":"SOLUSDT","p":"142.51234567","i":"142.50000000","P":"142.60000000","r":"0.00010000","T":1710028800000}}"#;
        match parse_combined(raw, Instant::now()) {
            Some(FeedEvent::MarkPrice(m)) => {
                assert!((m.mark_price - 142.51234567).abs() < 1e-9);
                assert!((m.funding_rate - 0.0001).abs() < 1e-12);
                assert_eq!(m.ts_ms, 1710000000500);
            }
            _ => panic!("expected mark price"),
        }
    }

    #[test]
    fn test_garbage_and_unknown_streams_dropped() {
        assert!(parse_combined("not json", Instant::now()).is_none());
        assert!(parse_combined(r#"{"stream":"solusdt@depth","data":{}}"#, Instant::now()).is_none());
        // Zero bid is not a usable book
        let raw = r#"{"stream":"solusdt@bookTicker","data":{"b":"0.00","a":"142.52"}}"#;
        assert!(parse_combined(raw, Instant::now()).is_none());
    }
}
