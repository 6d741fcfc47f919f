//! Progress reporting and user-facing notifications.
//!
//! Both sinks are closed sets of variants chosen when the nest is constructed:
//! silent, routed to the `log` facade, or forwarded over a channel to whatever drives
//! the nest (a UI thread, a CLI).

use std::sync::mpsc::Sender;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Progress information during nesting.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProgressInfo {
    /// Share of the current generation already evaluated (0.0 to 1.0).
    pub percent: f64,
    /// Completed generation turnovers.
    pub generation: u32,
    /// Chromosomes dispatched so far.
    pub population: usize,
    /// Fitness of the best retained result.
    pub best_fitness: f64,
    /// Utilization of the best retained result (0.0 to 1.0).
    pub utilization: f64,
    /// Parts placed by the best retained result.
    pub items_placed: usize,
    /// Total part instances in the nest.
    pub total_items: usize,
}

impl ProgressInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the completed share of the generation.
    pub fn with_percent(mut self, percent: f64) -> Self {
        self.percent = percent.clamp(0.0, 1.0);
        self
    }

    /// Sets the generation and population counters.
    pub fn with_generation(mut self, generation: u32, population: usize) -> Self {
        self.generation = generation;
        self.population = population;
        self
    }

    /// Sets the best fitness.
    pub fn with_fitness(mut self, fitness: f64) -> Self {
        self.best_fitness = fitness;
        self
    }

    /// Sets the utilization.
    pub fn with_utilization(mut self, utilization: f64) -> Self {
        self.utilization = utilization;
        self
    }

    /// Sets the items placed info.
    pub fn with_items(mut self, placed: usize, total: usize) -> Self {
        self.items_placed = placed;
        self.total_items = total;
        self
    }
}

/// Event delivered through [`ProgressSink::Channel`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Progress(ProgressInfo),
    /// Transient status text.
    Message(String),
}

/// Destination of progress updates.
#[derive(Debug, Clone, Default)]
pub enum ProgressSink {
    /// Drop all updates.
    #[default]
    Silent,
    /// Write updates through the `log` facade.
    Log,
    /// Forward updates to a receiver. A disconnected receiver is ignored.
    Channel(Sender<ProgressEvent>),
}

impl ProgressSink {
    /// Reports a progress update.
    pub fn report(&self, info: ProgressInfo) {
        match self {
            ProgressSink::Silent => {}
            ProgressSink::Log => log::info!(
                "Generation {} ({:.0}%): best fitness {:.3}, utilization {:.1}%, {}/{} placed",
                info.generation,
                info.percent * 100.0,
                info.best_fitness,
                info.utilization * 100.0,
                info.items_placed,
                info.total_items
            ),
            ProgressSink::Channel(tx) => {
                let _ = tx.send(ProgressEvent::Progress(info));
            }
        }
    }

    /// Shows a transient status message.
    pub fn message(&self, text: impl Into<String>) {
        match self {
            ProgressSink::Silent => {}
            ProgressSink::Log => log::info!("{}", text.into()),
            ProgressSink::Channel(tx) => {
                let _ = tx.send(ProgressEvent::Message(text.into()));
            }
        }
    }
}

/// Severity of a [`Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Severity {
    Info,
    Warning,
    /// The run cannot continue.
    Fatal,
}

/// A notification for the user.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Notice {
    pub severity: Severity,
    pub text: String,
}

/// Destination of recoverable and fatal notifications.
#[derive(Debug, Clone, Default)]
pub enum MessageSink {
    /// Write notices through the `log` facade.
    #[default]
    Log,
    /// Forward notices to a receiver. A disconnected receiver is ignored.
    Channel(Sender<Notice>),
}

impl MessageSink {
    /// Delivers a notice.
    pub fn notify(&self, severity: Severity, text: impl Into<String>) {
        let text = text.into();
        match self {
            MessageSink::Log => match severity {
                Severity::Info => log::info!("{}", text),
                Severity::Warning => log::warn!("{}", text),
                Severity::Fatal => log::error!("{}", text),
            },
            MessageSink::Channel(tx) => {
                let _ = tx.send(Notice { severity, text });
            }
        }
    }

    pub fn warn(&self, text: impl Into<String>) {
        self.notify(Severity::Warning, text);
    }

    pub fn fatal(&self, text: impl Into<String>) {
        self.notify(Severity::Fatal, text);
    }
}
