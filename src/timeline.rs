use eyre::eyre;
use serde::{Deserialize, Serialize};

/// A uniform subdivision of a time interval into a fixed number of steps.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniformTimeLine {
    start: f64,
    end: f64,
    num_steps: usize,
    current: usize,
}

impl UniformTimeLine {
    pub fn new(start: f64, end: f64, num_steps: usize) -> eyre::Result<Self> {
        if num_steps == 0 {
            return Err(eyre!("a time line needs at least one step"));
        }
        if !(start.is_finite() && end.is_finite() && end > start) {
            return Err(eyre!("invalid time interval [{}, {}]", start, end));
        }
        Ok(Self {
            start,
            end,
            num_steps,
            current: 0,
        })
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    /// Index of the current time level, between `0` and `num_steps`.
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn current_time(&self) -> f64 {
        self.time_at(self.current)
    }

    pub fn next_time(&self) -> f64 {
        self.time_at(self.current + 1)
    }

    pub fn current_time_step_length(&self) -> f64 {
        (self.end - self.start) / self.num_steps as f64
    }

    pub fn advance(&mut self) {
        assert!(!self.stop(), "Cannot advance past the end of the time line");
        self.current += 1;
    }

    /// Whether all steps have been taken.
    pub fn stop(&self) -> bool {
        self.current >= self.num_steps
    }

    pub fn reset(&mut self) {
        self.current = 0;
    }

    fn time_at(&self, index: usize) -> f64 {
        self.start + index as f64 * self.current_time_step_length()
    }
}
