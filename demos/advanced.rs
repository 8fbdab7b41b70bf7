//! Deferral and Re-entrant Dispatch
//!
//! State A defers on its first visit and queues an event for itself, then
//! bounces through B, whose handlers dispatch more events and transition back.
//! Expected order:
//!
//! enter A, exit A, enter B, B.test(Peter), B.test2(PETER), exit B,
//! enter A, A.test(22), A.test(57)
//!
//! Run with: cargo run --example advanced

use queued_fsm::{EventLog, MachineBuilder, MachineEvent, StateHandlers};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Deferral Example ===\n");

    let first_visit = AtomicBool::new(true);
    let log = EventLog::new();

    let mut machine = MachineBuilder::<()>::new()
        .initial("a")
        .observer(log.clone())
        .state(
            "a",
            StateHandlers::new()
                .on_enter(move |m, _| {
                    println!("Entering A...");
                    if first_visit.swap(false, Ordering::SeqCst) {
                        m.defer_events()?;
                        m.handle_in("a", "test", vec![json!(22)])?;
                        m.transition("b", vec![])?;
                    }
                    Ok(())
                })
                .on("test", |_, args| {
                    println!("(A) TEST: I can count this high: {}", args[0]);
                    Ok(())
                })
                .on_exit(|m| {
                    println!("Preparing to leave A...");
                    m.handle_in("b", "test", vec![json!("Peter")])?;
                    Ok(())
                }),
        )
        .state(
            "b",
            StateHandlers::new()
                .on_enter(|_, _| {
                    println!("Entering B...");
                    Ok(())
                })
                .on("test", |m, args| {
                    let name = args[0].as_str().unwrap_or_default().to_string();
                    println!("(B) TEST: My name is: {name}");
                    m.handle_in("b", "test2", vec![json!(name.to_uppercase())])?;
                    Ok(())
                })
                .on("test2", |m, args| {
                    println!("(B) TEST2: My serious name is: {}", args[0]);
                    m.transition("a", vec![])?;
                    m.handle_in("a", "test", vec![json!(57)])?;
                    Ok(())
                })
                .on_exit(|_| {
                    println!("Preparing to leave B...");
                    Ok(())
                }),
        )
        .build()
        .unwrap();

    machine.settle();

    let transitions = log
        .events()
        .into_iter()
        .filter(|event| matches!(event, MachineEvent::AfterTransition { .. }))
        .count();
    println!("\nTransitions completed: {transitions}");
    println!("Exceptions reported: {}", log.exceptions().len());
    println!("Snapshot:\n{}", machine.snapshot().to_json().unwrap());

    println!("\n=== Example Complete ===");
}
