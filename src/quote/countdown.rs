//! Cooperative countdown task for the active quote
//!
//! One task per accepted quote. Starting a new countdown aborts the previous
//! task, and a task whose epoch no longer matches the timer's stops without
//! touching it, so two countdowns never race to clear the same quote.

use super::expiry::QuoteExpiryTimer;
use crate::events::{DeskEvent, EventSink};
use crate::route::Quote;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

pub struct Countdown {
    timer: Arc<Mutex<QuoteExpiryTimer>>,
    tick_interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
    sink: Arc<dyn EventSink>,
}

impl Countdown {
    pub fn new(window_secs: u32, tick_interval: Duration, sink: Arc<dyn EventSink>) -> Self {
        Self {
            timer: Arc::new(Mutex::new(QuoteExpiryTimer::new(window_secs))),
            tick_interval,
            task: Mutex::new(None),
            sink,
        }
    }

    /// Shared handle to the underlying timer
    pub fn timer(&self) -> Arc<Mutex<QuoteExpiryTimer>> {
        self.timer.clone()
    }

    /// Accept `quote` and start counting down, superseding any running countdown
    pub async fn start(&self, quote: Quote) -> u64 {
        let mut task = self.task.lock().await;
        if let Some(previous) = task.take() {
            previous.abort();
        }

        let quote_id = quote.id;
        let (epoch, window) = {
            let mut timer = self.timer.lock().await;
            (timer.accept(quote), timer.window())
        };
        crate::metrics::record_quote_remaining(window);
        debug!("Countdown started for quote {} ({}s, epoch {})", quote_id, window, epoch);

        *task = Some(tokio::spawn(run_countdown(
            self.timer.clone(),
            self.sink.clone(),
            self.tick_interval,
            epoch,
        )));

        epoch
    }

    /// Stop the countdown and drop the quote
    pub async fn cancel(&self) -> Option<Quote> {
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
        let dropped = self.timer.lock().await.cancel();
        crate::metrics::record_quote_remaining(0);
        dropped
    }

    pub async fn remaining(&self) -> u32 {
        self.timer.lock().await.remaining()
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.try_lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}

async fn run_countdown(
    timer: Arc<Mutex<QuoteExpiryTimer>>,
    sink: Arc<dyn EventSink>,
    period: Duration,
    epoch: u64,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let (signal, remaining, quote_id) = {
            let mut timer = timer.lock().await;
            if timer.epoch() != epoch {
                debug!("Countdown epoch {} superseded", epoch);
                return;
            }
            let quote_id = timer.quote().map(|q| q.id);
            (timer.tick(), timer.remaining(), quote_id)
        };

        crate::metrics::record_quote_remaining(remaining);

        match (signal, quote_id) {
            (Some(expired), _) => {
                debug!("Quote {} expired", expired.quote_id);
                crate::metrics::record_quote_expired();
                sink.report(DeskEvent::QuoteExpired {
                    quote_id: expired.quote_id,
                });
                return;
            }
            (None, Some(quote_id)) => sink.report(DeskEvent::QuoteTick { quote_id, remaining }),
            (None, None) => return,
        }
    }
}
