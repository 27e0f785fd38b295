use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_TICKS: usize = 5000;

/// One sampled price observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub price: f64,
    /// Server epoch seconds, when the history carried a `times` array.
    pub epoch: Option<i64>,
}

impl Tick {
    pub fn new(price: f64) -> Self {
        Self { price, epoch: None }
    }
}

/// Bounded, ordered snapshot of ticks.
///
/// Replaced wholesale on every accepted history response; never appended to.
#[derive(Debug, Clone)]
pub struct TickBuffer {
    ticks: Vec<Tick>,
    capacity: usize,
}

impl TickBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_TICKS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ticks: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Replace the contents with `ticks`, keeping the most recent `capacity`
    /// samples when the series is longer than the bound.
    pub fn replace(&mut self, mut ticks: Vec<Tick>) -> usize {
        if ticks.len() > self.capacity {
            let excess = ticks.len() - self.capacity;
            ticks.drain(..excess);
        }
        self.ticks = ticks;
        self.ticks.len()
    }

    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    pub fn prices(&self) -> impl Iterator<Item = f64> + '_ {
        self.ticks.iter().map(|t| t.price)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}

impl Default for TickBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<f64>> for TickBuffer {
    fn from(prices: Vec<f64>) -> Self {
        let mut buffer = Self::with_capacity(prices.len().max(DEFAULT_MAX_TICKS));
        buffer.replace(prices.into_iter().map(Tick::new).collect());
        buffer
    }
}
