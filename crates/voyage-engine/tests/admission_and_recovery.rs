//! Admission, worker pool wiring, crash recovery, and quiesce, all
//! against the in-memory journal and local work queue.

use std::sync::Arc;
use std::time::Duration;

use voyage_core::{ApplicationContext, HookList, InputParameters, NoRetry, OperationDefinition, StepSpec};
use voyage_engine::{Admission, Engine, EngineConfigBuilder, Recovery, WorkerPool};
use voyage_persistence::Journal;
use voyage_queue::LocalWorkQueue;
use voyage_testkit::{MemoryJournal, Noop, SingleClassFactory};

fn noop_factory() -> Arc<dyn voyage_core::Factory> {
    Arc::new(SingleClassFactory::new("noop", |_inputs: &InputParameters, _ctx: &ApplicationContext| {
        Ok(OperationDefinition::new("noop", vec![StepSpec::new(Arc::new(Noop), Box::new(NoRetry))]))
    }))
}

#[tokio::test]
async fn submit_runs_through_the_worker_pool_to_success() {
    let journal: Arc<dyn Journal> = Arc::new(MemoryJournal::new());
    let factory = noop_factory();
    let config = Arc::new(EngineConfigBuilder::new().instance_name("instance-a").max_parallel(2).build());
    let hooks = Arc::new(HookList::new());

    let pool = Arc::new(WorkerPool::new(journal.clone(), factory.clone(), None, config.clone(), hooks));
    pool.start().await;
    let admission = Admission::new(journal.clone(), factory, pool.clone(), None, config);

    admission.submit("op-1", "noop", InputParameters::new()).await.unwrap();
    let status = admission.wait("op-1", Duration::from_secs(2)).await.unwrap();

    assert_eq!(status, voyage_core::OperationStatus::Success);
    pool.shutdown().await;
}

#[tokio::test]
async fn submit_rejects_unknown_class() {
    let journal: Arc<dyn Journal> = Arc::new(MemoryJournal::new());
    let factory = noop_factory();
    let config = Arc::new(EngineConfigBuilder::new().instance_name("instance-a").build());
    let hooks = Arc::new(HookList::new());
    let pool = Arc::new(WorkerPool::new(journal.clone(), factory.clone(), None, config.clone(), hooks));
    let admission = Admission::new(journal, factory, pool, None, config);

    let result = admission.submit("op-x", "not-a-real-class", InputParameters::new()).await;
    assert!(matches!(result, Err(voyage_core::Error::UnknownClass(_))));
}

#[tokio::test]
async fn recovery_resumes_operations_orphaned_by_a_dead_peer() {
    let journal: Arc<dyn Journal> = Arc::new(MemoryJournal::new());
    let factory = noop_factory();
    let config = Arc::new(EngineConfigBuilder::new().instance_name("instance-b").build());
    let hooks = Arc::new(HookList::new());

    // A different, now-dead instance owns this RUNNING operation.
    journal.create("op-orphan", "noop", voyage_core::OperationStatus::Ready, &InputParameters::new(), None).await.unwrap();
    journal.claim("op-orphan", "instance-dead").await.unwrap();

    let pool = Arc::new(WorkerPool::new(journal.clone(), factory.clone(), None, config.clone(), hooks.clone()));
    pool.start().await;
    let recovery = Recovery::new(journal.clone(), factory, pool.clone(), None, config, hooks);

    let resumed = recovery.recover_and_start(&["instance-dead".to_string()]).await.unwrap();
    assert_eq!(resumed, 1);

    // Give the worker pool a moment to drain the resumed operation.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let detail = journal.get_detail("op-orphan").await.unwrap();
    assert_eq!(detail.summary.status, voyage_core::OperationStatus::Success);
    pool.shutdown().await;
}

#[tokio::test]
async fn quiesce_refuses_new_submissions_and_drains_in_flight_work() {
    let journal: Arc<dyn Journal> = Arc::new(MemoryJournal::new());
    let factory = noop_factory();
    let work_queue = Arc::new(LocalWorkQueue::new());

    let engine = Engine::builder()
        .journal(journal.clone())
        .factory(factory)
        .work_queue(work_queue)
        .config(EngineConfigBuilder::new().instance_name("instance-a"))
        .build();
    engine.start(&[]).await.unwrap();

    engine.submit("op-1", "noop", InputParameters::new()).await.unwrap();
    engine.wait("op-1", Duration::from_secs(2)).await.unwrap();

    engine.quiesce(Duration::from_secs(1)).await.unwrap();

    let result = engine.submit("op-2", "noop", InputParameters::new()).await;
    assert!(matches!(result, Err(voyage_core::Error::Shutdown)));
}
