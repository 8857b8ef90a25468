//! Shared fixtures for dispatch integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::Framed;

use taskfarm_dispatch::{
    DispatchConfig, FrameCodec, Manager, ManagerBuilder, Message, RunReport, Task,
};

pub const TIMEOUT: Duration = Duration::from_secs(5);
pub const SETTLE: Duration = Duration::from_millis(100);

/// Squares a number. Small enough to make every exchange instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Square {
    pub n: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Squared {
    pub n: u64,
    pub value: u64,
}

impl Task for Square {
    type Output = Squared;

    fn describe(&self) -> String {
        format!("square {}", self.n)
    }

    fn execute(&self) -> Squared {
        Squared {
            n: self.n,
            value: self.n * self.n,
        }
    }
}

pub fn squares(count: u64) -> Vec<Square> {
    (0..count).map(|n| Square { n }).collect()
}

pub type Msg = Message<Square, Squared>;
pub type RawConn = Framed<TcpStream, FrameCodec>;

/// Bind a manager on an ephemeral loopback port.
pub async fn bind(tasks: Vec<Square>) -> Manager<Square> {
    ManagerBuilder::new(DispatchConfig::local(0))
        .bind(tasks)
        .await
        .expect("bind manager")
}

/// Bind a manager and run it in the background.
pub async fn start(tasks: Vec<Square>) -> (SocketAddr, JoinHandle<RunReport<Squared>>) {
    let manager = bind(tasks).await;
    let addr = manager.local_addr();
    (addr, tokio::spawn(manager.run()))
}

/// Wait for a background run to finish.
pub async fn finish(handle: JoinHandle<RunReport<Squared>>) -> RunReport<Squared> {
    timeout(TIMEOUT, handle)
        .await
        .expect("manager should finish within timeout")
        .expect("manager task should not panic")
}

/// Connect a hand-driven client that speaks raw frames.
pub async fn raw_connect(addr: SocketAddr) -> RawConn {
    let stream = TcpStream::connect(addr).await.expect("connect");
    Framed::new(stream, FrameCodec::default())
}

/// Next decoded message, or `None` once the manager has closed its side.
pub async fn raw_recv(conn: &mut RawConn) -> Option<Msg> {
    let frame = timeout(TIMEOUT, conn.next())
        .await
        .expect("timed out waiting for a frame")?
        .expect("frame should decode");
    Some(Msg::from_frame(&frame).expect("message should decode"))
}

pub async fn raw_send(conn: &mut RawConn, msg: Msg) {
    conn.send(msg.to_frame().unwrap()).await.expect("send frame");
}
