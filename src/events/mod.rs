//! Desk events and the sinks that receive them
//!
//! Everything the presentation layer used to show as a toast or countdown
//! label is reported here as a typed event. Sinks decide how to render it.

use crate::lifecycle::TransactionState;

use ethers::types::H256;
use serde::Serialize;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

/// Events reported by the orchestrator, countdown and lifecycle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeskEvent {
    /// A fresh quote was accepted and its countdown started
    QuoteAccepted {
        quote_id: Uuid,
        valid_for_secs: u32,
        estimated_fees: String,
    },

    /// Countdown progress for the active quote
    QuoteTick { quote_id: Uuid, remaining: u32 },

    /// The active quote ran out its validity window
    QuoteExpired { quote_id: Uuid },

    /// The active quote, if any, was dropped by the caller
    QuoteCancelled { quote_id: Option<Uuid> },

    /// Estimate request failed
    QuoteFailed { message: String },

    /// Custody transaction moved between states
    TransactionStateChanged {
        safe_tx_hash: Option<H256>,
        from: TransactionState,
        to: TransactionState,
    },

    /// A lifecycle step was rejected; state is unchanged
    StepFailed {
        operation: String,
        message: String,
        switch_network: bool,
    },
}

impl DeskEvent {
    /// Get event name
    pub fn name(&self) -> &'static str {
        match self {
            DeskEvent::QuoteAccepted { .. } => "QuoteAccepted",
            DeskEvent::QuoteTick { .. } => "QuoteTick",
            DeskEvent::QuoteExpired { .. } => "QuoteExpired",
            DeskEvent::QuoteCancelled { .. } => "QuoteCancelled",
            DeskEvent::QuoteFailed { .. } => "QuoteFailed",
            DeskEvent::TransactionStateChanged { .. } => "TransactionStateChanged",
            DeskEvent::StepFailed { .. } => "StepFailed",
        }
    }
}

/// `report(event)` sink consumed by the presentation layer
pub trait EventSink: Send + Sync {
    fn report(&self, event: DeskEvent);
}

/// Writes events to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn report(&self, event: DeskEvent) {
        match &event {
            DeskEvent::QuoteFailed { message } => warn!("Failed to get swap estimate: {}", message),
            DeskEvent::StepFailed {
                operation,
                message,
                switch_network,
            } => {
                if *switch_network {
                    warn!("Failed to {}: wallet and transaction network mismatch ({})", operation, message);
                } else {
                    warn!("Failed to {}: {}", operation, message);
                }
            }
            DeskEvent::QuoteTick { .. } => {}
            _ => info!(event = event.name(), "{:?}", event),
        }
    }
}

/// Fans events out over a tokio broadcast channel
pub struct BroadcastSink {
    tx: broadcast::Sender<DeskEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeskEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn report(&self, event: DeskEvent) {
        // No receivers is fine; nobody is watching
        let _ = self.tx.send(event);
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DeskEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far
    pub fn events(&self) -> Vec<DeskEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, predicate: impl Fn(&DeskEvent) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }
}

impl EventSink for MemorySink {
    fn report(&self, event: DeskEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
