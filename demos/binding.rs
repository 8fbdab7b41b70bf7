//! Context Payload
//!
//! Anything the embedding application wants to share with handlers lives in
//! the machine's context instead of being bolted onto the machine itself.
//!
//! Run with: cargo run --example binding

use queued_fsm::{MachineBuilder, StateHandlers};

#[derive(Default)]
struct Services {
    calls: usize,
}

impl Services {
    fn external_call(&mut self, value: bool) -> bool {
        self.calls += 1;
        println!("External function call success!");
        value
    }
}

fn main() {
    println!("=== Context Payload Example ===\n");

    let mut machine = MachineBuilder::<Services>::new()
        .initial("a")
        .state(
            "a",
            StateHandlers::new().on_enter(|_, _| {
                println!("Entering A...");
                Ok(())
            }),
        )
        .build()
        .unwrap();
    machine.settle();

    let result = machine.context_mut().external_call(true);
    println!("Result of external return: {result}");
    println!("Calls made: {}", machine.context().calls);

    println!("\n=== Example Complete ===");
}
