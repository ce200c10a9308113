//! Example usage of `throttle` in an async context.
//!
//! This example demonstrates how a burst of calls is coalesced into a single delivery of
//! the last call, and how a call made after the window has closed opens a new one.

use chrono::Duration;
use lastword::throttle;

const TICK: std::time::Duration = std::time::Duration::from_millis(30);

#[tokio::main]
async fn main() -> Result<(), lastword::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lastword=debug")),
        )
        .init();

    let start = tokio::time::Instant::now();
    // At most one save per 100ms, always with the most recent document.
    let save = throttle(
        move |document: String| {
            println!(
                "[{elapsed:>4}ms] Saving {document:?}",
                elapsed = start.elapsed().as_millis()
            );
        },
        Duration::milliseconds(100),
    )?;

    println!("--- Typing a burst of edits ---");
    for document in ["h", "he", "hel", "hell", "hello"] {
        println!(
            "[{elapsed:>4}ms] Edited to {document:?}",
            elapsed = start.elapsed().as_millis()
        );
        save.call(document.to_string());
        tokio::time::sleep(TICK).await;
    }

    // Let the window of the last edit close.
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;

    println!("--- A single edit after a pause ---");
    save.call("hello, world".to_string());
    println!("Throttled right after the call: {}", save.is_throttled());

    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    println!("Throttled after the window closed: {}", save.is_throttled());

    Ok(())
}
