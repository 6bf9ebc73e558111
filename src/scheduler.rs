//! Coalescing of render requests.
//!
//! Interactive input produces many parameter changes per frame. Only the most
//! recent one is worth rendering, at most once per refresh tick, and never
//! while a previous render is still running.

use std::time::Duration;

use log::trace;
use web_time::Instant;

/// Parameters handed out for rendering, tagged with their generation.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest<P> {
    pub generation: u64,
    pub params: P,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The finished render matches the latest request and may be shown.
    Current,
    /// Newer parameters arrived meanwhile; discard the result.
    Superseded,
}

pub struct RenderCoalescer<P> {
    frame_interval: Duration,
    pending: Option<P>,
    generation: u64,
    in_flight: Option<u64>,
    last_dispatch: Option<Instant>,
}

impl<P> RenderCoalescer<P> {
    pub fn new(frame_interval: Duration) -> Self {
        Self {
            frame_interval,
            pending: None,
            generation: 0,
            in_flight: None,
            last_dispatch: None,
        }
    }

    /// Record new parameters, replacing any that have not been dispatched.
    pub fn request(&mut self, params: P) -> u64 {
        self.generation += 1;
        self.pending = Some(params);
        self.generation
    }

    /// Next render to start, if a tick has passed and nothing is in flight.
    pub fn poll(&mut self, now: Instant) -> Option<RenderRequest<P>> {
        if self.in_flight.is_some() {
            return None;
        }
        if let Some(last) = self.last_dispatch {
            if now.saturating_duration_since(last) < self.frame_interval {
                return None;
            }
        }

        let params = self.pending.take()?;
        self.in_flight = Some(self.generation);
        self.last_dispatch = Some(now);
        trace!("Dispatching render generation {}", self.generation);
        Some(RenderRequest {
            generation: self.generation,
            params,
        })
    }

    /// Report that the render of `generation` finished.
    pub fn complete(&mut self, generation: u64) -> Completion {
        if self.in_flight == Some(generation) {
            self.in_flight = None;
        }
        if generation == self.generation {
            Completion::Current
        } else {
            trace!(
                "Render generation {generation} superseded by {}",
                self.generation
            );
            Completion::Superseded
        }
    }

    pub fn latest_generation(&self) -> u64 {
        self.generation
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}
