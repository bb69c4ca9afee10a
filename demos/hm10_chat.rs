//! HM-10 chat demo
//!
//! Scans for the `sallen_hm10` module, runs the full connect and subscribe
//! sequence, then chats with the module: typed lines go out over 0xFFE1 and
//! every notification the module sends is printed, until Ctrl+C.
//!
//! Run with: cargo run --example hm10_chat

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, BufReader};

use hm10_rust_ble::stack::BtleplugStack;
use hm10_rust_ble::{ClientConfig, GattClient, Notification, NotificationSink, Result};

struct ChatPrinter;

impl NotificationSink for ChatPrinter {
    fn on_notification(&self, notification: &Notification) {
        println!("module> {}", notification.as_text().trim_end());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hm10_rust_ble=info".into()),
        )
        .init();

    println!("HM-10 Chat");
    println!("==========\n");
    println!("Scanning for sallen_hm10...");
    println!("Type a line to send it once connected. Ctrl+C to exit.\n");

    let config = ClientConfig::default();
    let (event_tx, event_rx) = GattClient::event_channel();
    let stack = Arc::new(BtleplugStack::new(event_tx.clone()).await?);
    let client = GattClient::new(stack, event_tx, event_rx, Arc::new(ChatPrinter), config);

    let mut phases = client.subscribe_phase();
    client.start().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nExiting...");
                break;
            }
            change = phases.recv() => {
                if let Ok(change) = change {
                    println!("[{} -> {}]", change.from, change.to);
                }
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let payload = Bytes::from(format!("{}\n", line).into_bytes());
                        if let Err(e) = client.write(payload) {
                            eprintln!("send failed: {}", e);
                        }
                    }
                    _ => break,
                }
            }
        }
    }

    client.shutdown().await;
    Ok(())
}
