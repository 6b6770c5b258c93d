// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Two-phase shutdown: the process may exit once the producer has finished
//! and the shipper has observed an empty buffer after that.

use tokio::sync::watch;
use tracing::debug;

use crate::buffer::LogBuffer;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownState {
    /// Set once by the producer after its last `log` call.
    pub producer_done: bool,
    /// Recomputed by the shipper at the end of every cycle.
    pub shipper_drained: bool,
}

impl ShutdownState {
    pub fn is_terminal(&self) -> bool {
        self.producer_done && self.shipper_drained
    }
}

/// Holds the shutdown record. Cheap to clone; all clones share one state.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    tx: watch::Sender<ShutdownState>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ShutdownState::default());
        Self { tx }
    }

    pub fn state(&self) -> ShutdownState {
        *self.tx.borrow()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Declares that the producer will not append anything else. Idempotent.
    pub fn mark_producer_done(&self) {
        self.tx.send_modify(|state| {
            if !state.producer_done {
                debug!("SHUTDOWN | Producer finished");
            }
            state.producer_done = true;
        });
    }

    /// Recomputes `shipper_drained` at the end of a shipping cycle and returns
    /// the resulting state.
    ///
    /// `producer_done` is read before the buffer is inspected: once it is
    /// observed true no further appends can race with the emptiness check.
    pub fn record_cycle(&self, buffer: &LogBuffer) -> ShutdownState {
        self.tx.send_modify(|state| {
            let producer_done = state.producer_done;
            state.shipper_drained = producer_done && buffer.is_empty();
        });
        self.state()
    }

    /// Resolves once both signals are set.
    pub async fn wait_terminal(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(ShutdownState::is_terminal).await;
    }
}
