use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::gateway::rest::BinanceRest;
use crate::types::*;

/// Order gateway: receives commands from the engine, executes against the
/// exchange, feeds order updates and account snapshots back.
/// Runs as a background task — never touches shared state.
///
/// In dry_run mode the engine simulates its own fills; the gateway only
/// acknowledges. In live mode orders go to Binance futures and resting
/// orders are polled until they resolve.
pub async fn order_gateway(
    mut gw_rx: mpsc::Receiver<GatewayCommand>,
    feed_tx: mpsc::Sender<FeedEvent>,
    config: Config,
    session_id: String,
) {
    eprintln!("[GW] Order gateway started (dry_run={})", config.dry_run);

    if config.dry_run {
        while let Some(cmd) = gw_rx.recv().await {
            if let GatewayCommand::Place(order) = cmd {
                let update = OrderUpdate {
                    order_id: order.id,
                    state: OrderState::Accepted,
                    latency_ms: 0.0,
                };
                if feed_tx.send(FeedEvent::OrderUpdate(update)).await.is_err() {
                    break;
                }
            }
        }
        eprintln!("[GW] Order gateway stopped");
        return;
    }

    let rest = match BinanceRest::from_config(&config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("[GW] Cannot start live gateway: {}", e);
            return;
        }
    };

    // order_id → clientOrderId for everything still resting on the exchange.
    // TODO: replace status polling with the user data stream (listenKey) so
    // fills arrive as pushes instead of 2s sweeps.
    let mut pending: HashMap<u64, String> = HashMap::new();
    let mut status_poll = tokio::time::interval(tokio::time::Duration::from_secs(2));
    let mut account_poll = tokio::time::interval(tokio::time::Duration::from_secs(10));

    loop {
        tokio::select! {
            cmd = gw_rx.recv() => {
                let cmd = match cmd {
                    Some(c) => c,
                    None => break,
                };
                match cmd {
                    GatewayCommand::Place(order) => {
                        let client_id = format!("axb-{}-{}", session_id, order.id);
                        let submit_at = Instant::now();

                        let update = match rest.place_order(&order, &client_id).await {
                            Ok(resp) => {
                                let latency_ms = submit_at.elapsed().as_secs_f64() * 1000.0;
                                match resp.fill() {
                                    // Market orders resolve in the response
                                    Some((price, qty)) => {
                                        eprintln!(
                                            "[GW] #{} FILLED {:.4} x {} lat={:.1}ms",
                                            order.id, price, qty, latency_ms,
                                        );
                                        OrderUpdate {
                                            order_id: order.id,
                                            state: OrderState::Filled { price, qty },
                                            latency_ms,
                                        }
                                    }
                                    None => {
                                        eprintln!(
                                            "[GW] #{} {} lat={:.1}ms",
                                            order.id, resp.status, latency_ms,
                                        );
                                        pending.insert(order.id, client_id);
                                        OrderUpdate {
                                            order_id: order.id,
                                            state: OrderState::Accepted,
                                            latency_ms,
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                let latency_ms = submit_at.elapsed().as_secs_f64() * 1000.0;
                                eprintln!("[GW] #{} REJECTED: {}", order.id, e);
                                OrderUpdate {
                                    order_id: order.id,
                                    state: OrderState::Rejected(e),
                                    latency_ms,
                                }
                            }
                        };

                        if feed_tx.send(FeedEvent::OrderUpdate(update)).await.is_err() {
                            break;
                        }
                    }

                    GatewayCommand::Cancel(order_id) => {
                        // The order stays in pending until the exchange
                        // confirms: it may have filled before the cancel.
                        let client_id = match pending.get(&order_id) {
                            Some(c) => c.clone(),
                            None => continue,
                        };
                        match rest.cancel_order(&client_id).await {
                            Ok(resp) => {
                                if let Some((price, qty)) = resp.fill() {
                                    eprintln!(
                                        "[GW] #{} filled before cancel: {:.4} x {}",
                                        order_id, price, qty,
                                    );
                                    let _ = feed_tx.send(FeedEvent::OrderUpdate(OrderUpdate {
                                        order_id,
                                        state: OrderState::Filled { price, qty },
                                        latency_ms: 0.0,
                                    })).await;
                                    pending.remove(&order_id);
                                } else if resp.status == "CANCELED" {
                                    let _ = feed_tx.send(FeedEvent::OrderUpdate(OrderUpdate {
                                        order_id,
                                        state: OrderState::Canceled,
                                        latency_ms: 0.0,
                                    })).await;
                                    pending.remove(&order_id);
                                }
                                // Anything else resolves via the status poll
                            }
                            Err(e) => {
                                eprintln!(
                                    "[GW] Cancel #{} failed: {}, leaving it to the status poll",
                                    order_id, e,
                                );
                            }
                        }
                    }

                    GatewayCommand::CancelAll => {
                        if let Err(e) = rest.cancel_all().await {
                            eprintln!("[GW] Cancel-all failed: {}", e);
                        }
                        // Orders stay in pending; the status poll reports
                        // each one's final state (CANCELED or FILLED).
                    }
                }
            }

            _ = status_poll.tick() => {
                let mut resolved: Vec<u64> = Vec::new();
                for (&order_id, client_id) in &pending {
                    match rest.query_order(client_id).await {
                        Ok(resp) => {
                            if let Some((price, qty)) = resp.fill() {
                                let _ = feed_tx.send(FeedEvent::OrderUpdate(OrderUpdate {
                                    order_id,
                                    state: OrderState::Filled { price, qty },
                                    latency_ms: 0.0,
                                })).await;
                                resolved.push(order_id);
                            } else if resp.status == "CANCELED" || resp.status == "EXPIRED" {
                                let _ = feed_tx.send(FeedEvent::OrderUpdate(OrderUpdate {
                                    order_id,
                                    state: OrderState::Canceled,
                                    latency_ms: 0.0,
                                })).await;
                                resolved.push(order_id);
                            }
                        }
                        Err(e) => {
                            eprintln!("[GW] Status poll #{} failed: {}", order_id, e);
                        }
                    }
                }
                for id in resolved {
                    pending.remove(&id);
                }
            }

            _ = account_poll.tick() => {
                match rest.account().await {
                    Ok(snap) => {
                        if feed_tx.send(FeedEvent::Account(snap)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => eprintln!("[GW] Account poll failed: {}", e),
                }
            }
        }
    }

    eprintln!("[GW] Order gateway stopped");
}
