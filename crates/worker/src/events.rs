//! Delivery of membership events off the engines' call path.
//!
//! Engines publish into a [`ChannelEventSink`] without awaiting; the
//! [`EventDispatcher`] drains the channel on its own task. The dispatcher
//! stops once every sink has been dropped and the queue is empty.

use domain::services::{EventSink, MembershipEvent};
use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Creates a connected sink and dispatcher.
pub fn channel() -> (ChannelEventSink, EventDispatcher) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelEventSink { tx }, EventDispatcher { rx })
}

/// Non-blocking sink backed by an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<MembershipEvent>,
}

impl EventSink for ChannelEventSink {
    fn publish(&self, event: MembershipEvent) {
        if let Err(err) = self.tx.send(event) {
            let event = err.0;
            warn!(
                kind = %event.kind,
                group_id = %event.group_id,
                target_user_id = %event.target_id,
                "Event dispatcher stopped, dropping membership event"
            );
        }
    }
}

pub struct EventDispatcher {
    rx: mpsc::UnboundedReceiver<MembershipEvent>,
}

impl EventDispatcher {
    /// Drains events until every sender is gone. Returns how many were handled.
    pub async fn run(mut self) -> u64 {
        let mut dispatched = 0;
        while let Some(event) = self.rx.recv().await {
            dispatch(&event);
            dispatched += 1;
        }
        info!(dispatched, "Event dispatcher stopped");
        dispatched
    }

    pub fn spawn(self) -> JoinHandle<u64> {
        tokio::spawn(self.run())
    }
}

fn dispatch(event: &MembershipEvent) {
    counter!("membership_events_total", "kind" => event.kind.as_str()).increment(1);
    info!(
        kind = %event.kind,
        group_id = %event.group_id,
        target_user_id = %event.target_id,
        actor_user_id = ?event.actor_id,
        new_role = ?event.new_role,
        occurred_at = %event.occurred_at,
        "Membership event dispatched"
    );
}
