//! Command channel between background operations and the UI thread.
//!
//! Background work never touches the display. It sends [`Event`]s through an
//! [`EventSender`]; the render loop owns the [`CommandChannel`] and drains it
//! in bounded batches on every tick.
//!
//! # Ordering
//!
//! Events from a single sender arrive in the order they were sent. Events from
//! different senders interleave arbitrarily.
//!
//! # Failure
//!
//! Sending never fails and never blocks. The channel keeps its own sender
//! alive, so the receiving side cannot close while the channel exists; once
//! the channel itself is dropped (application shutdown) events are discarded.

use crate::metrics::Metrics;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A display intent produced by background work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// One line for the log pane
    Log(String),
    /// Progress percentage, 0..=100
    Progress(u8),
    /// Status bar text
    Status(String),
    /// Enable or disable the operation controls
    ButtonsEnabled(bool),
}

impl Event {
    pub fn log(text: impl Into<String>) -> Self {
        Event::Log(text.into())
    }

    /// Progress event; values above 100 are clamped.
    pub fn progress(percent: u32) -> Self {
        Event::Progress(percent.min(100) as u8)
    }

    pub fn status(text: impl Into<String>) -> Self {
        Event::Status(text.into())
    }

    pub fn is_log(&self) -> bool {
        matches!(self, Event::Log(_))
    }
}

/// Cloneable producer handle. Safe to use from any thread or task.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
    metrics: Arc<Metrics>,
}

impl EventSender {
    pub fn send(&self, event: Event) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Event discarded, channel has shut down");
        } else {
            self.metrics.record_event_sent();
        }
    }

    pub fn log(&self, text: impl Into<String>) {
        self.send(Event::log(text));
    }

    pub fn progress(&self, percent: u32) {
        self.send(Event::progress(percent));
    }

    pub fn status(&self, text: impl Into<String>) {
        self.send(Event::status(text));
    }

    pub fn controls_enabled(&self, enabled: bool) {
        self.send(Event::ButtonsEnabled(enabled));
    }
}

/// Single-consumer end of the channel, owned by the render loop.
#[derive(Debug)]
pub struct CommandChannel {
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
    metrics: Arc<Metrics>,
}

impl CommandChannel {
    pub fn new() -> Self {
        Self::with_metrics(Arc::new(Metrics::new()))
    }

    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx, metrics }
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Remove up to `max` pending events in arrival order without waiting.
    pub fn drain_up_to(&mut self, max: usize) -> Vec<Event> {
        let mut drained = Vec::with_capacity(max.min(64));
        while drained.len() < max {
            match self.rx.try_recv() {
                Ok(event) => drained.push(event),
                Err(_) => break,
            }
        }
        drained
    }

    /// Number of events waiting to be drained
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Default for CommandChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_drain_preserves_order() {
        let mut channel = CommandChannel::new();
        let sender = channel.sender();

        sender.log("first");
        sender.progress(10);
        sender.status("working");
        sender.controls_enabled(false);

        assert_eq!(
            channel.drain_up_to(10),
            vec![
                Event::log("first"),
                Event::Progress(10),
                Event::status("working"),
                Event::ButtonsEnabled(false),
            ]
        );
    }

    #[test]
    fn test_drain_respects_cap() {
        let mut channel = CommandChannel::new();
        let sender = channel.sender();
        for i in 0..7 {
            sender.log(format!("line {i}"));
        }

        assert_eq!(channel.drain_up_to(5).len(), 5);
        assert_eq!(channel.pending(), 2);
        assert_eq!(channel.drain_up_to(5), vec![Event::log("line 5"), Event::log("line 6")]);
    }

    #[test]
    fn test_drain_empty_returns_nothing() {
        let mut channel = CommandChannel::new();
        assert!(channel.drain_up_to(50).is_empty());
    }

    #[test]
    fn test_progress_is_clamped() {
        assert_eq!(Event::progress(250), Event::Progress(100));
        assert_eq!(Event::progress(42), Event::Progress(42));
    }

    #[test]
    fn test_send_after_channel_dropped_is_silent() {
        let channel = CommandChannel::new();
        let sender = channel.sender();
        drop(channel);

        sender.log("nobody is listening");
    }

    #[test]
    fn test_sent_events_are_counted() {
        let metrics = Arc::new(Metrics::new());
        let channel = CommandChannel::with_metrics(Arc::clone(&metrics));
        channel.sender().log("one");
        channel.sender().progress(5);

        assert_eq!(
            metrics.events_sent.load(std::sync::atomic::Ordering::Relaxed),
            2
        );
    }

    proptest! {
        #[test]
        fn prop_batched_drain_yields_every_event_once_in_order(
            count in 0usize..300,
            cap in 1usize..80,
        ) {
            let mut channel = CommandChannel::new();
            let sender = channel.sender();
            for i in 0..count {
                sender.log(i.to_string());
            }

            let mut seen = Vec::new();
            loop {
                let batch = channel.drain_up_to(cap);
                prop_assert!(batch.len() <= cap);
                if batch.is_empty() {
                    break;
                }
                seen.extend(batch);
            }

            let expected: Vec<Event> = (0..count).map(|i| Event::log(i.to_string())).collect();
            prop_assert_eq!(seen, expected);
        }
    }
}
