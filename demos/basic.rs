//! Basic Machine
//!
//! An exit handler queues an event for the state being entered; the event
//! runs as part of that state's drain, after its `on_enter`.
//!
//! Run with: cargo run --example basic

use queued_fsm::{MachineBuilder, StateHandlers};
use serde_json::json;

fn main() {
    println!("=== Basic Machine Example ===\n");

    let mut machine = MachineBuilder::<()>::new()
        .initial("a")
        .state(
            "a",
            StateHandlers::new()
                .on_enter(|m, _| {
                    println!("Entering A...");
                    m.transition("b", vec![])?;
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
                .on("test", |_, args| {
                    println!("My name is: {}", args[0]);
                    Ok(())
                }),
        )
        .build()
        .unwrap();

    let steps = machine.settle();
    println!("\nRan {steps} steps, now in {:?}", machine.current_state());

    println!("\n=== Example Complete ===");
}
