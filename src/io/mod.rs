// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Cancellable I/O primitives.
//!
//! `tokio` is already the executor; there's no separate `io_context`/`post`
//! abstraction to reimplement here the way the runtime this crate is
//! modeled on needs one; instead this module centers on the pattern actually
//! worth keeping: racing a fallible I/O future against a timer or an
//! out-of-band cancellation, with the timer/cancellation side closing the
//! socket so the I/O side can't straggle on forever.

use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Runs `fut` to completion, failing early if `io_timeout` elapses or
/// `cancel` fires first.
///
/// `label` is folded into the error message only; it exists to make
/// multiplexed logs legible when several of these race concurrently on one
/// connection.
pub async fn io_with_timeout<F, T>(
    label: &'static str,
    fut: F,
    io_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(anyhow!("{label} cancelled")),
        res = timeout(io_timeout, fut) => {
            match res {
                Ok(Ok(v)) => Ok(v),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(anyhow!("{label} timed out after {io_timeout:?}")),
            }
        }
    }
}

/// A periodic timer that can be paused and resumed without being dropped
/// and recreated, mirroring the keep-alive timer a server connection
/// suspends while a deferred response is outstanding.
pub struct PeriodTimer {
    period: Duration,
    interval: tokio::time::Interval,
    paused: bool,
}

impl PeriodTimer {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        Self { period, interval, paused: false }
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        if self.paused {
            self.interval = tokio::time::interval(self.period);
            self.interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            self.paused = false;
        }
    }

    /// Waits for the next tick. Never resolves while paused.
    pub async fn tick(&mut self) {
        if self.paused {
            std::future::pending::<()>().await;
        } else {
            self.interval.tick().await;
        }
    }
}
