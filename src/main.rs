//! A small end-to-end demo: submits a two-step operation to an
//! in-process engine and waits for it to finish.
//!
//! Run with `cargo run`. Swap `MemoryJournal` for `voyage_persistence::PgJournal`
//! (behind `DATABASE_URL`) to see the same steps run against Postgres.

use std::sync::Arc;
use std::time::Duration;

use voyage_core::{ApplicationContext, Error, InputParameters, NoRetry, OperationDefinition, StepSpec};
use voyage_engine::{Engine, EngineConfigBuilder};
use voyage_persistence::Journal;
use voyage_testkit::{MemoryJournal, Noop, SingleClassFactory};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber_init();

    let journal: Arc<dyn Journal> = Arc::new(MemoryJournal::new());
    let factory = Arc::new(SingleClassFactory::new(
        "demo.greeting",
        |_inputs: &InputParameters, _ctx: &ApplicationContext| {
            Ok(OperationDefinition::new(
                "demo.greeting",
                vec![
                    StepSpec::new(Arc::new(Noop), Box::new(NoRetry)),
                    StepSpec::new(Arc::new(Noop), Box::new(NoRetry)),
                ],
            ))
        },
    ));

    let engine = Engine::builder()
        .journal(journal)
        .factory(factory)
        .config(EngineConfigBuilder::new().instance_name("demo-instance").max_parallel(4))
        .build();
    engine.start(&[]).await?;

    let op_id = uuid::Uuid::new_v4().to_string();
    engine.submit(&op_id, "demo.greeting", InputParameters::new()).await?;

    let status = engine.wait(&op_id, Duration::from_secs(5)).await?;
    println!("operation {op_id} finished as {status}");

    engine.quiesce(Duration::from_secs(1)).await?;
    Ok(())
}

fn tracing_subscriber_init() {
    let _ = tracing_subscriber::fmt::try_init();
}
