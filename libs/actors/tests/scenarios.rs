//! End-to-end runtime scenarios over the loopback transport

use actors::{
    ActorSystem, CommandTable, ConnectionState, LoopbackTransport, RouteFn,
};
use codec::Term;
use config::RuntimeConfig;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tokio::task::LocalSet;

const PROTOCOL: &str = "hive/protocol/echo:0";

fn system() -> (ActorSystem, Arc<LoopbackTransport>) {
    let transport = Arc::new(LoopbackTransport::new());
    let system = ActorSystem::new(RuntimeConfig::default(), transport.clone());
    (system, transport)
}

/// Let the event loop task catch up with injected traffic
async fn settle() {
    for _ in 0..25 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn registrar_started_triggers_announcement_and_registrar_state() {
    let (mut system, transport) = system();
    system.set_protocol(PROTOCOL);
    system.register_actor("echo", CommandTable::new());
    let ctx = system.context().clone();

    let local = LocalSet::new();
    local
        .run_until(async move {
            let loop_task = tokio::task::spawn_local(async move { system.run().await });
            settle().await;

            transport.inject("hive/service/registrar", "(primary started reg/topic 12345)");
            settle().await;

            assert_eq!(ctx.connection().state(), ConnectionState::Registrar);
            let announcements = transport.published_to("reg/topic/in");
            assert_eq!(announcements.len(), 1);
            let expected = format!(
                "(add {} {} mqtt {} ())",
                ctx.topic_path(),
                PROTOCOL,
                ctx.owner()
            );
            assert_eq!(announcements[0], expected);

            ctx.terminate(0);
            assert_eq!(loop_task.await.unwrap().unwrap(), 0);
        })
        .await;
}

#[tokio::test]
async fn registrar_stopped_downgrades_but_keeps_running() {
    let (mut system, transport) = system();
    system.set_protocol(PROTOCOL);
    system.register_actor("echo", CommandTable::new());
    let ctx = system.context().clone();

    let local = LocalSet::new();
    local
        .run_until(async move {
            let loop_task = tokio::task::spawn_local(async move { system.run().await });
            settle().await;

            transport.inject("hive/service/registrar", "(primary started reg/topic 12345)");
            settle().await;
            transport.inject("hive/service/registrar", "(primary stopped)");
            settle().await;

            assert_eq!(ctx.connection().state(), ConnectionState::Transport);
            assert!(ctx.exit_status().is_none());
            assert!(!loop_task.is_finished());

            ctx.terminate(0);
            assert_eq!(loop_task.await.unwrap().unwrap(), 0);
        })
        .await;
}

#[tokio::test]
async fn registrar_stopped_terminates_when_configured() {
    let (mut system, transport) = system();
    system.set_protocol(PROTOCOL);
    system.set_terminate_registrar_not_found(true);
    system.register_actor("echo", CommandTable::new());

    let local = LocalSet::new();
    local
        .run_until(async move {
            let loop_task = tokio::task::spawn_local(async move { system.run().await });
            settle().await;

            transport.inject("hive/service/registrar", "(primary started reg/topic 12345)");
            settle().await;
            transport.inject("hive/service/registrar", "(primary stopped)");

            assert_eq!(loop_task.await.unwrap().unwrap(), 1);
        })
        .await;
}

#[tokio::test]
async fn unknown_command_is_dropped_and_the_mailbox_keeps_going() {
    let (mut system, transport) = system();

    let pings = Rc::new(RefCell::new(0u32));
    let counter = pings.clone();
    let mut commands = CommandTable::new();
    commands.register("ping", move |_arguments| {
        *counter.borrow_mut() += 1;
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

            transport.inject(&in_topic, "(no_such_command a b)");
            transport.inject(&in_topic, "(ping)");
            settle().await;

            assert_eq!(*pings.borrow(), 1);

            ctx.terminate(0);
            assert_eq!(loop_task.await.unwrap().unwrap(), 0);
        })
        .await;
}

#[tokio::test]
async fn consuming_handler_shadows_overlapping_wildcards() {
    let (mut system, transport) = system();
    let ctx = system.context().clone();

    let reached_second = Rc::new(RefCell::new(false));
    let first: Rc<RouteFn> = Rc::new(|_, _, _| Ok(true));
    let flag = reached_second.clone();
    let second: Rc<RouteFn> = Rc::new(move |_, _, _| {
        *flag.borrow_mut() = true;
        Ok(false)
    });
    system.add_message_handler(first, "ns/#");
    system.add_message_handler(second, "ns/+/y");

    let local = LocalSet::new();
    local
        .run_until(async move {
            let loop_task = tokio::task::spawn_local(async move { system.run().await });
            settle().await;

            transport.inject("ns/x/y", "(anything)");
            settle().await;
            assert!(!*reached_second.borrow());

            ctx.terminate(0);
            assert_eq!(loop_task.await.unwrap().unwrap(), 0);
        })
        .await;
}

#[tokio::test]
async fn announcement_round_trips_through_the_codec() {
    let (mut system, transport) = system();
    system.set_protocol(PROTOCOL);
    system.add_tags(&["key=echo".to_string(), "zone=lab".to_string()]);
    system.register_actor("echo", CommandTable::new());
    let ctx = system.context().clone();

    let local = LocalSet::new();
    local
        .run_until(async move {
            let loop_task = tokio::task::spawn_local(async move { system.run().await });
            settle().await;

            transport.inject("hive/service/registrar", "(primary started reg/topic 12345)");
            settle().await;

            let announcements = transport.published_to("reg/topic/in");
            let (command, arguments) = codec::parse(&announcements[0]).unwrap();
            assert_eq!(command, "add");
            assert_eq!(arguments[0], Term::symbol(ctx.topic_path()));
            assert_eq!(arguments[1], Term::symbol(PROTOCOL));
            assert_eq!(arguments[2], Term::symbol("mqtt"));
            assert_eq!(arguments[3], Term::symbol(ctx.owner()));
            assert_eq!(
                arguments[4],
                Term::List(vec![Term::symbol("key=echo"), Term::symbol("zone=lab")])
            );

            ctx.terminate(0);
            assert_eq!(loop_task.await.unwrap().unwrap(), 0);
        })
        .await;
}

#[tokio::test]
async fn stop_command_over_the_wire_exits_cleanly() {
    let (mut system, transport) = system();
    let actor = system.register_actor("echo", CommandTable::new());
    let in_topic = actor.identity().topic("in");

    let local = LocalSet::new();
    local
        .run_until(async move {
            let loop_task = tokio::task::spawn_local(async move { system.run().await });
            settle().await;

            transport.inject(&in_topic, "(stop)");
            assert_eq!(loop_task.await.unwrap().unwrap(), 0);
        })
        .await;
}

#[tokio::test]
async fn last_will_is_set_once_a_protocol_is_configured() {
    let (mut system, transport) = system();
    system.set_protocol(PROTOCOL);
    system.register_actor("echo", CommandTable::new());
    let ctx = system.context().clone();
    let state_topic = ctx.topic_state();

    let local = LocalSet::new();
    local
        .run_until(async move {
            let loop_task = tokio::task::spawn_local(async move { system.run().await });
            settle().await;

            assert_eq!(
                transport.last_will(),
                Some((state_topic, "(stopped)".to_string()))
            );

            ctx.terminate(0);
            assert_eq!(loop_task.await.unwrap().unwrap(), 0);
        })
        .await;
}

#[tokio::test]
async fn share_deltas_reach_the_state_topic() {
    let (mut system, transport) = system();
    let actor = system.register_actor("echo", CommandTable::new());
    let in_topic = actor.identity().topic("in");
    let state_topic = actor.identity().topic("state");
    let ctx = system.context().clone();

    let local = LocalSet::new();
    local
        .run_until(async move {
            let loop_task = tokio::task::spawn_local(async move { system.run().await });
            settle().await;

            transport.inject(&in_topic, "(update speed fast)");
            settle().await;

            let deltas = transport.published_to(&state_topic);
            assert!(deltas.contains(&"(update speed fast)".to_string()));

            ctx.terminate(0);
            assert_eq!(loop_task.await.unwrap().unwrap(), 0);
        })
        .await;
}
