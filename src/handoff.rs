//! Handoff
//!
//! Single-slot, latest-value-wins publication of estimates from the audio
//! thread to a slower consumer (UI, logger, ...). Publishing never blocks and
//! never queues: an unread estimate is replaced by the next one.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};

use crate::estimator::PitchEstimate;

/// Create a connected publisher/subscriber pair sharing one slot.
pub fn slot() -> (Publisher, Subscriber) {
    let (tx, rx) = bounded(1);
    (
        Publisher {
            tx,
            evict: rx.clone(),
        },
        Subscriber { rx },
    )
}

/// Producer side, owned by the thread driving the detector.
#[derive(Debug)]
pub struct Publisher {
    tx: Sender<PitchEstimate>,
    evict: Receiver<PitchEstimate>,
}

impl Publisher {
    /// Store `estimate`, replacing any value the subscriber has not read yet.
    pub fn publish(&self, estimate: PitchEstimate) {
        let mut value = estimate;
        loop {
            match self.tx.try_send(value) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => return,
                Err(TrySendError::Full(v)) => {
                    // the subscriber may have taken the stale value in the meantime
                    let _ = self.evict.try_recv();
                    value = v;
                }
            }
        }
    }
}

/// Consumer side.
#[derive(Debug)]
pub struct Subscriber {
    rx: Receiver<PitchEstimate>,
}

impl Subscriber {
    /// Take the most recent unread estimate, if any.
    pub fn latest(&self) -> Option<PitchEstimate> {
        match self.rx.try_recv() {
            Ok(estimate) => Some(estimate),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Take the most recent unread estimate if its confidence exceeds `floor`.
    ///
    /// A taken estimate below the floor is discarded.
    pub fn latest_confident(&self, floor: f32) -> Option<PitchEstimate> {
        self.latest().filter(|e| e.confidence > floor)
    }
}
