//! Counter application demonstrating modules, mutations and subscriptions

use serde::{Deserialize, Serialize};
use simplux::{create_module, ModuleConfig, MutationDefinitions};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct CounterState {
    count: i32,
    step: i32,
    history: Vec<i32>,
}

impl CounterState {
    fn new() -> Self {
        Self {
            count: 0,
            step: 1,
            history: vec![0],
        }
    }
}

fn main() -> simplux::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Counter Application ===\n");

    println!("1. Creating the counter module");
    let counter = create_module(ModuleConfig::new("counter", CounterState::new()))?;

    let subscription = counter.subscribe_to_state_changes(|state| {
        println!("   [State] Count: {}, Step: {}", state.count, state.step);
    });

    println!("\n2. Defining mutations");
    let mutations = counter.create_mutations(
        MutationDefinitions::new()
            .define("increment", |state: &mut CounterState, (): ()| {
                state.count += state.step;
                state.history.push(state.count);
            })
            .define("decrement", |state: &mut CounterState, (): ()| {
                state.count -= state.step;
                state.history.push(state.count);
            })
            .define("setStep", |state: &mut CounterState, (step,): (i32,)| {
                state.step = step;
            })
            .define("reset", |_: &mut CounterState, (): ()| {
                Some(CounterState::new())
            }),
    )?;

    let (Some(increment), Some(decrement), Some(set_step), Some(reset)) = (
        mutations.get::<()>("increment"),
        mutations.get::<()>("decrement"),
        mutations.get::<(i32,)>("setStep"),
        mutations.get::<()>("reset"),
    ) else {
        return Ok(());
    };

    println!("\n3. Dispatching mutations");
    increment.call(())?;
    increment.call(())?;
    set_step.call((5,))?;
    increment.call(())?;
    decrement.call(())?;

    println!("\n4. Wiring a mutation as an event handler");
    let click = serde_json::json!({
        "type": "click",
        "target": {},
        "currentTarget": {},
        "defaultPrevented": false,
    });
    increment.call_with_values(vec![click])?;

    println!("\n5. Previewing without dispatching");
    let preview = increment.with_state(counter.get_state()?)(())?;
    println!("   next count would be {}", preview.count);
    println!("   action: {}", serde_json::to_string(&increment.as_action_creator(())?).unwrap_or_default());

    println!("\n6. History: {:?}", counter.get_state()?.history);

    reset.call(())?;
    subscription.unsubscribe();
    increment.call(())?;
    println!("\n7. After unsubscribing, count is {}", counter.get_state()?.count);

    Ok(())
}
