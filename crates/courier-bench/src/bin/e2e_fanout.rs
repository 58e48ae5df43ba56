//! End-to-end fan-out benchmark for Courier.
//!
//! Measures sustained broadcast throughput through a live broker with
//! real subscriber tasks draining their mailboxes.

use courier_core::{Broker, BrokerConfig, Message};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const WARMUP_SECS: u64 = 1;
const BENCH_SECS: u64 = 5;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let num_subscribers = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(64);
    let num_producers = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(4);

    println!("Courier fan-out benchmark");
    println!("  subscribers: {num_subscribers}, producers: {num_producers}");
    println!("  warmup: {WARMUP_SECS}s, measurement: {BENCH_SECS}s");
    println!();

    let token = CancellationToken::new();
    let broker = Arc::new(Broker::with_config(
        token.clone(),
        BrokerConfig {
            queue_capacity: 1024,
            mailbox_capacity: 1024,
        },
    ));
    broker.run();

    let received = Arc::new(AtomicU64::new(0));
    for i in 0..num_subscribers {
        let mut mailbox = broker.subscribe(format!("subscriber-{i}"));
        let received = Arc::clone(&received);
        tokio::spawn(async move {
            while mailbox.recv().await.is_some() {
                received.fetch_add(1, Ordering::Relaxed);
            }
        });
    }

    for p in 0..num_producers {
        let broker = Arc::clone(&broker);
        let shutdown = token.clone();
        tokio::spawn(async move {
            let sender = format!("producer-{p}");
            let mut seq = 0u64;
            while !shutdown.is_cancelled() {
                let message = Message::broadcast(sender.clone(), format!("payload-{seq}"));
                if broker.publish(message).await.is_err() {
                    break;
                }
                seq += 1;
            }
        });
    }

    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;
    received.store(0, Ordering::SeqCst);
    let start = Instant::now();
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;
    let elapsed = start.elapsed();
    let delivered = received.load(Ordering::SeqCst);

    token.cancel();
    broker.stopped().await;

    let stats = broker.stats();
    let per_sec = delivered as f64 / elapsed.as_secs_f64();
    println!("Results");
    println!("  duration:         {:.2}s", elapsed.as_secs_f64());
    println!("  deliveries:       {delivered}");
    println!("  throughput:       {per_sec:.0} msg/s");
    println!("  dropped (full):   {}", stats.dropped_full);
    println!("  dropped (closed): {}", stats.dropped_closed);
}
