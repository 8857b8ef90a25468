//! Frame-level protocol checks with hand-driven clients.

mod common;

use futures::SinkExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use common::*;
use taskfarm_dispatch::{Frame, SessionOutcome, Task, WorkerClient, WorkerId};

#[tokio::test]
async fn ids_increase_in_accept_order() {
    let (addr, run) = start(squares(3)).await;

    let mut ids = Vec::new();
    let mut clients = Vec::new();
    for _ in 0..3 {
        let client = WorkerClient::<Square>::connect(addr).await.unwrap();
        ids.push(client.worker_id());
        clients.push(client);
    }
    assert_eq!(ids, vec![WorkerId(0), WorkerId(1), WorkerId(2)]);

    for client in clients {
        client.run().await.unwrap();
    }
    let report = finish(run).await;
    let reported: Vec<_> = report.sessions.iter().map(|s| s.worker_id).collect();
    assert_eq!(reported, ids);
}

#[tokio::test]
async fn sentinel_is_last_and_sent_once() {
    let (addr, run) = start(squares(3)).await;
    let mut conn = raw_connect(addr).await;

    assert_eq!(raw_recv(&mut conn).await, Some(Msg::Assign(WorkerId(0))));

    let mut tasks = Vec::new();
    let mut shutdowns = 0;
    while let Some(msg) = raw_recv(&mut conn).await {
        match msg {
            Msg::Task(task) => {
                assert_eq!(shutdowns, 0, "task sent after shutdown");
                tasks.push(task.n);
                raw_send(&mut conn, Msg::Result(task.execute())).await;
            }
            Msg::Shutdown => {
                shutdowns += 1;
                // Closing our side lets the session finish its drain, after
                // which the stream must end.
                SinkExt::<Frame>::close(&mut conn).await.unwrap();
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    assert_eq!(tasks, vec![0, 1, 2], "tasks must arrive in queue order");
    assert_eq!(shutdowns, 1);

    let report = finish(run).await;
    assert_eq!(report.session_count(), 1);
    assert_eq!(report.sessions[0].outcome, SessionOutcome::Completed);
}

#[tokio::test]
async fn wrong_reply_kind_aborts_only_that_session() {
    let (addr, run) = start(squares(4)).await;

    let mut rogue = raw_connect(addr).await;
    assert_eq!(raw_recv(&mut rogue).await, Some(Msg::Assign(WorkerId(0))));
    let Some(Msg::Task(task)) = raw_recv(&mut rogue).await else {
        panic!("expected a task");
    };
    // Echo the task back instead of a result.
    raw_send(&mut rogue, Msg::Task(task)).await;
    assert_eq!(raw_recv(&mut rogue).await, None, "session should hang up");

    let honest = WorkerClient::<Square>::connect(addr).await.unwrap();
    assert_eq!(honest.run().await.unwrap().tasks_executed, 3);

    let report = finish(run).await;
    assert_eq!(report.session_count(), 2);
    assert_eq!(report.result_count(), 3);
    match &report.sessions[0].outcome {
        SessionOutcome::Aborted { reason, lost_task } => {
            assert!(reason.contains("unexpected task frame"), "reason: {reason}");
            assert_eq!(lost_task.as_deref(), Some("square 0"));
        }
        other => panic!("expected abort, got {other:?}"),
    }
}

#[tokio::test]
async fn garbage_bytes_abort_only_that_session() {
    let (addr, run) = start(squares(2)).await;

    let mut garbage = TcpStream::connect(addr).await.unwrap();
    // Give the session time to take its task before the garbage arrives.
    tokio::time::sleep(SETTLE).await;
    garbage.write_all(&[0xff, 0, 0, 0, 1, 0]).await.unwrap();

    let honest = WorkerClient::<Square>::connect(addr).await.unwrap();
    assert_eq!(honest.run().await.unwrap().tasks_executed, 1);
    drop(garbage);

    let report = finish(run).await;
    assert_eq!(report.session_count(), 2);
    assert_eq!(report.result_count(), 1);
    assert!(!report.sessions[0].outcome.is_completed());
}
