//! Delivery-order guarantees observed from outside the runtime

use actors::{ActorSystem, CommandTable, LoopbackTransport, RouteFn};
use config::RuntimeConfig;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tokio::task::LocalSet;

fn system() -> (ActorSystem, Arc<LoopbackTransport>) {
    let transport = Arc::new(LoopbackTransport::new());
    let system = ActorSystem::new(RuntimeConfig::default(), transport.clone());
    (system, transport)
}

async fn settle() {
    for _ in 0..25 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn mailbox_delivery_is_fifo() {
    let (mut system, transport) = system();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let mut commands = CommandTable::new();
    commands.register("record", move |arguments| {
        log.borrow_mut()
            .push(arguments[0].to_string());
        Ok(())
    });
    let actor = system.register_actor("echo", commands);
    let in_topic = actor.identity().topic("in");
    let ctx = system.context().clone();

    let local = LocalSet::new();
    local
        .run_until(async move {
            let loop_task = tokio::task::spawn_local(async move { system.run().await });
            settle().await;

            for label in ["first", "second", "third", "fourth"] {
                transport.inject(&in_topic, &format!("(record {label})"));
            }
            settle().await;

            assert_eq!(
                *seen.borrow(),
                vec!["first", "second", "third", "fourth"]
            );

            ctx.terminate(0);
            assert_eq!(loop_task.await.unwrap().unwrap(), 0);
        })
        .await;
}

#[tokio::test]
async fn control_traffic_preempts_queued_input() {
    let (mut system, transport) = system();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let mut commands = CommandTable::new();
    commands.register("record", move |arguments| {
        log.borrow_mut()
            .push(arguments[0].to_string());
        Ok(())
    });
    let actor = system.register_actor("echo", commands);
    let in_topic = actor.identity().topic("in");
    let control_topic = actor.identity().topic("control");
    let ctx = system.context().clone();

    let local = LocalSet::new();
    local
        .run_until(async move {
            let loop_task = tokio::task::spawn_local(async move { system.run().await });
            settle().await;

            // Everything lands in the ingress queue before the loop gets
            // a turn, so the backlog exists when scheduling decides.
            transport.inject(&in_topic, "(record slow1)");
            transport.inject(&in_topic, "(record slow2)");
            transport.inject(&control_topic, "(record urgent)");
            settle().await;

            assert_eq!(*seen.borrow(), vec!["urgent", "slow1", "slow2"]);

            ctx.terminate(0);
            assert_eq!(loop_task.await.unwrap().unwrap(), 0);
        })
        .await;
}

#[tokio::test]
async fn duplicate_handler_registration_runs_twice_per_message() {
    let (mut system, transport) = system();
    let ctx = system.context().clone();

    let calls = Rc::new(RefCell::new(0u32));
    let counter = calls.clone();
    let handler: Rc<RouteFn> = Rc::new(move |_, _, _| {
        *counter.borrow_mut() += 1;
        Ok(false)
    });
    system.add_message_handler(handler.clone(), "ns/telemetry/#");
    system.add_message_handler(handler, "ns/telemetry/#");

    let local = LocalSet::new();
    local
        .run_until(async move {
            let loop_task = tokio::task::spawn_local(async move { system.run().await });
            settle().await;

            transport.inject("ns/telemetry/cpu", "(sample 42)");
            settle().await;
            assert_eq!(*calls.borrow(), 2);

            ctx.terminate(0);
            assert_eq!(loop_task.await.unwrap().unwrap(), 0);
        })
        .await;
}

#[tokio::test]
async fn hash_pattern_matches_zero_extra_segments_end_to_end() {
    let (mut system, transport) = system();
    let ctx = system.context().clone();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let handler: Rc<RouteFn> = Rc::new(move |_, topic, _| {
        log.borrow_mut().push(topic.to_string());
        Ok(false)
    });
    system.add_message_handler(handler, "ns/svc/#");

    let local = LocalSet::new();
    local
        .run_until(async move {
            let loop_task = tokio::task::spawn_local(async move { system.run().await });
            settle().await;

            transport.inject("ns/svc", "(a)");
            transport.inject("ns/svc/1/state", "(b)");
            transport.inject("ns/other", "(c)");
            settle().await;

            assert_eq!(
                *seen.borrow(),
                vec!["ns/svc".to_string(), "ns/svc/1/state".to_string()]
            );

            ctx.terminate(0);
            assert_eq!(loop_task.await.unwrap().unwrap(), 0);
        })
        .await;
}
