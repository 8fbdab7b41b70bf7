//! Spawned Machine
//!
//! The machine runs in its own Tokio task; handles send it commands from
//! anywhere and wait for the states it enters.
//!
//! Run with: cargo run --example actor

use queued_fsm::{actor, MachineBuilder, MachineEvent, StateHandlers};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Spawned Machine Example ===\n");

    let machine = MachineBuilder::<Vec<u64>>::new()
        .initial("idle")
        .observer(|event: &MachineEvent| {
            if let MachineEvent::Exception { state, phase, error } = event {
                eprintln!("handler failed in {state} ({phase}): {error}");
            }
        })
        .state("idle", StateHandlers::new())
        .state(
            "working",
            StateHandlers::<Vec<u64>>::new()
                .on_enter(|m, _| {
                    m.set_queue_depth(2)?;
                    Ok(())
                })
                .on("job", |m, args| {
                    let id = args[0].as_u64().unwrap_or_default();
                    if id == 3 {
                        anyhow::bail!("job {id} is cursed");
                    }
                    m.context_mut().push(id);
                    Ok(())
                }),
        )
        .build()
        .unwrap();

    let (handle, task) = actor::spawn(machine);

    for id in 1..=4 {
        handle.handle_in("working", "job", vec![json!(id)]).unwrap();
    }
    handle.transition("working", vec![]).unwrap();
    handle.wait_for_state("working").await.unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    println!("Still queued after first visit: {:?}", snapshot.backlog());

    handle.transition("idle", vec![]).unwrap();
    handle.transition("working", vec![]).unwrap();

    handle.shutdown_graceful();
    let machine = task.await.unwrap();
    println!("Jobs completed: {:?}", machine.context());

    println!("\n=== Example Complete ===");
}
