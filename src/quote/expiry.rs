//! Quote lifetime tracking
//!
//! The timer owns the accepted quote. Each `accept` starts a new epoch so a
//! countdown started for an older quote can recognise it has been superseded.

use crate::route::Quote;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Seconds an accepted quote stays valid
pub const DEFAULT_VALIDITY_WINDOW: u32 = 30;

/// Emitted exactly once when a quote's countdown reaches zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired {
    pub quote_id: Uuid,
}

#[derive(Debug)]
pub struct QuoteExpiryTimer {
    quote: Option<Quote>,
    remaining: u32,
    window: u32,
    epoch: u64,
}

impl QuoteExpiryTimer {
    pub fn new(window: u32) -> Self {
        Self {
            quote: None,
            remaining: 0,
            window,
            epoch: 0,
        }
    }

    /// Replace any held quote and restart the countdown; returns the new epoch
    pub fn accept(&mut self, quote: Quote) -> u64 {
        self.quote = Some(quote);
        self.remaining = self.window;
        self.epoch += 1;
        self.epoch
    }

    /// Advance one second
    pub fn tick(&mut self) -> Option<Expired> {
        let quote_id = self.quote.as_ref()?.id;

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.quote = None;
            return Some(Expired { quote_id });
        }
        None
    }

    /// Drop the quote and stop the countdown
    pub fn cancel(&mut self) -> Option<Quote> {
        self.remaining = 0;
        self.epoch += 1;
        self.quote.take()
    }

    pub fn quote(&self) -> Option<&Quote> {
        self.quote.as_ref()
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_active(&self) -> bool {
        self.quote.is_some()
    }

    /// The held quote if it is still usable at `now`
    pub fn valid_quote(&self, now: DateTime<Utc>) -> Option<&Quote> {
        self.quote
            .as_ref()
            .filter(|q| self.remaining > 0 && q.is_fresh(self.window, now))
    }

    /// Whether `quote_id` is the held quote and still usable at `now`
    pub fn is_valid(&self, quote_id: Uuid, now: DateTime<Utc>) -> bool {
        self.valid_quote(now).map(|q| q.id) == Some(quote_id)
    }
}

impl Default for QuoteExpiryTimer {
    fn default() -> Self {
        Self::new(DEFAULT_VALIDITY_WINDOW)
    }
}
