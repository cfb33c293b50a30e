//! Per-poll countdown driver.
//!
//! One task per active poll, started when the gateway sees the poll
//! created and cancelled when it ends. The task never touches state:
//! it only feeds `Tick` commands into the gateway's queue, where the
//! engine computes the remaining time from the poll's creation instant.
//! A tick that arrives after the poll ended is discarded by the engine,
//! so cancellation is best-effort.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::gateway::Command;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

pub fn spawn_poll_timer(
    poll_id: Uuid,
    cmd_tx: mpsc::Sender<Command>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of a fresh interval completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if cmd_tx.send(Command::Tick { poll_id }).await.is_err() {
                        tracing::debug!(%poll_id, "gateway gone, stopping poll timer");
                        break;
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::debug!(%poll_id, "poll timer cancelled");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timer_ticks_once_per_interval() {
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let poll_id = Uuid::new_v4();
        let handle = spawn_poll_timer(poll_id, tx, cancel.clone());

        tokio::time::advance(TICK_INTERVAL).await;
        let Some(Command::Tick { poll_id: got }) = rx.recv().await else {
            panic!("expected a tick");
        };
        assert_eq!(got, poll_id);

        tokio::time::advance(TICK_INTERVAL).await;
        assert!(matches!(rx.recv().await, Some(Command::Tick { .. })));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn timer_stops_when_gateway_drops() {
        let (tx, rx) = mpsc::channel(8);
        let handle = spawn_poll_timer(Uuid::new_v4(), tx, CancellationToken::new());
        drop(rx);
        tokio::time::advance(TICK_INTERVAL).await;
        handle.await.unwrap();
    }
}
