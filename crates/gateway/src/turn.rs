//! Single-slot rendezvous between a participant's read loop and the turn
//! loop waiting on that participant.
//!
//! The turn loop only ever has one request outstanding per participant, so
//! the slot holds at most one response. A second `put` before the loop has
//! taken the first is a protocol violation and is refused rather than
//! queued.

use std::time::Duration;

use {
    roundtable_protocol::TurnResponse,
    tokio::sync::{Mutex, mpsc},
    tokio_util::sync::CancellationToken,
};

use crate::error::{DeliveryError, TurnError};

pub struct TurnSlot {
    tx: mpsc::Sender<TurnResponse>,
    rx: Mutex<mpsc::Receiver<TurnResponse>>,
    abandoned: CancellationToken,
}

impl Default for TurnSlot {
    fn default() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx: Mutex::new(rx),
            abandoned: CancellationToken::new(),
        }
    }
}

impl TurnSlot {

    /// Hand a response to whoever is (or will be) waiting in [`take`].
    ///
    /// [`take`]: Self::take
    pub fn put(&self, response: TurnResponse) -> Result<(), DeliveryError> {
        if self.abandoned.is_cancelled() {
            return Err(DeliveryError::Abandoned);
        }
        self.tx.try_send(response).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::SlotOccupied,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Abandoned,
        })
    }

    /// Wait up to `timeout` for the pending response.
    ///
    /// A response that is already in the slot wins over abandonment, so a
    /// participant that answers and then disconnects still gets its turn.
    pub async fn take(&self, timeout: Duration) -> Result<TurnResponse, TurnError> {
        let Ok(mut rx) = self.rx.try_lock() else {
            return Err(TurnError::Busy);
        };
        if let Ok(response) = rx.try_recv() {
            return Ok(response);
        }
        if self.abandoned.is_cancelled() {
            return Err(TurnError::Abandoned);
        }

        tokio::select! {
            biased;
            received = tokio::time::timeout(timeout, rx.recv()) => match received {
                Ok(Some(response)) => Ok(response),
                Ok(None) => Err(TurnError::Abandoned),
                Err(_) => Err(TurnError::TimedOut),
            },
            () = self.abandoned.cancelled() => Err(TurnError::Abandoned),
        }
    }

    /// Discard a response left over from an earlier turn. Returns whether
    /// anything was dropped.
    pub fn drain(&self) -> bool {
        match self.rx.try_lock() {
            Ok(mut rx) => rx.try_recv().is_ok(),
            Err(_) => false,
        }
    }

    /// Mark the slot dead: any current or future `take` resolves with
    /// [`TurnError::Abandoned`].
    pub fn abandon(&self) {
        self.abandoned.cancel();
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::sync::Arc, tokio::time::Instant};

    fn response(text: &str) -> TurnResponse {
        TurnResponse {
            text: text.into(),
            audio: None,
        }
    }

    #[tokio::test]
    async fn put_then_take() {
        let slot = TurnSlot::default();
        slot.put(response("hello")).unwrap();
        let got = slot.take(Duration::from_secs(1)).await.unwrap();
        assert_eq!(got.text, "hello");
    }

    #[tokio::test]
    async fn take_waits_for_put() {
        let slot = Arc::new(TurnSlot::default());
        let writer = Arc::clone(&slot);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.put(response("late")).unwrap();
        });
        let got = slot.take(Duration::from_secs(5)).await.unwrap();
        assert_eq!(got.text, "late");
    }

    #[tokio::test]
    async fn second_put_is_refused() {
        let slot = TurnSlot::default();
        slot.put(response("one")).unwrap();
        assert_eq!(slot.put(response("two")), Err(DeliveryError::SlotOccupied));
        assert_eq!(slot.take(Duration::from_secs(1)).await.unwrap().text, "one");
    }

    #[tokio::test]
    async fn take_times_out() {
        let slot = TurnSlot::default();
        assert_eq!(
            slot.take(Duration::from_millis(20)).await,
            Err(TurnError::TimedOut)
        );
    }

    #[tokio::test]
    async fn abandon_unblocks_waiting_take() {
        let slot = Arc::new(TurnSlot::default());
        let waiter = Arc::clone(&slot);
        let started = Instant::now();
        let handle = tokio::spawn(async move { waiter.take(Duration::from_secs(30)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        slot.abandon();

        let outcome = handle.await.unwrap();
        assert_eq!(outcome, Err(TurnError::Abandoned));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn abandoned_slot_refuses_put_and_take() {
        let slot = TurnSlot::default();
        slot.abandon();
        assert_eq!(slot.put(response("x")), Err(DeliveryError::Abandoned));
        assert_eq!(
            slot.take(Duration::from_secs(1)).await,
            Err(TurnError::Abandoned)
        );
    }

    #[tokio::test]
    async fn pending_response_wins_over_abandon() {
        let slot = TurnSlot::default();
        slot.put(response("last words")).unwrap();
        slot.abandon();
        assert_eq!(
            slot.take(Duration::from_secs(1)).await.unwrap().text,
            "last words"
        );
    }

    #[tokio::test]
    async fn concurrent_take_is_busy() {
        let slot = Arc::new(TurnSlot::default());
        let waiter = Arc::clone(&slot);
        let first = tokio::spawn(async move { waiter.take(Duration::from_millis(200)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(
            slot.take(Duration::from_millis(10)).await,
            Err(TurnError::Busy)
        );
        assert_eq!(first.await.unwrap(), Err(TurnError::TimedOut));
    }

    #[tokio::test]
    async fn drain_discards_stale_response() {
        let slot = TurnSlot::default();
        assert!(!slot.drain());
        slot.put(response("stale")).unwrap();
        assert!(slot.drain());
        assert_eq!(
            slot.take(Duration::from_millis(10)).await,
            Err(TurnError::TimedOut)
        );
    }
}
