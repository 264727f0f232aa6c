//! Animation Drivers
//!
//! A driver advances one animation from 0.0 to 1.0 over its duration as the
//! monitor delivers frames. Its state machine is:
//!
//! ```text
//!            start            frame reaches end
//!   Idle ───────────▶ Running ─────────────────▶ Completed
//!    ▲  │               │ │
//!    │  │    pause      │ │ cancel
//!    └──┼───────────────┘ └──────────────────────▶ Cancelled
//!       │                  cancel                     ▲
//!       └─────────────────────────────────────────────┘
//! ```
//!
//! Pausing keeps the current value; resuming continues from it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{Error, Result};

/// Driver identifier, unique per monitor
pub type DriverId = u64;

/// Frame callback receiving the current animation value
pub type FrameCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Animation driver state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl DriverState {
    /// Completed or cancelled drivers never run again
    pub fn is_finished(&self) -> bool {
        matches!(self, DriverState::Completed | DriverState::Cancelled)
    }
}

impl std::fmt::Display for DriverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DriverState::Idle => "idle",
            DriverState::Running => "running",
            DriverState::Completed => "completed",
            DriverState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct DriverInner {
    state: DriverState,
    elapsed: Duration,
    frames_delivered: u64,
    frame_rate_hz: u32,
    paused_by_lifecycle: bool,
}

/// One running animation
pub struct AnimationDriver {
    id: DriverId,
    duration: Duration,
    inner: Mutex<DriverInner>,
    on_frame: Option<FrameCallback>,
}

impl AnimationDriver {
    /// Create a new idle driver
    pub fn new(id: DriverId, duration: Duration) -> Self {
        Self {
            id,
            duration,
            inner: Mutex::new(DriverInner {
                state: DriverState::Idle,
                elapsed: Duration::ZERO,
                frames_delivered: 0,
                frame_rate_hz: 60,
                paused_by_lifecycle: false,
            }),
            on_frame: None,
        }
    }

    /// Invoke `callback` with the animation value on every delivered frame
    pub fn with_frame_callback(mut self, callback: FrameCallback) -> Self {
        self.on_frame = Some(callback);
        self
    }

    pub fn id(&self) -> DriverId {
        self.id
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn state(&self) -> DriverState {
        self.inner.lock().state
    }

    /// Progress in `[0.0, 1.0]`
    pub fn value(&self) -> f64 {
        let inner = self.inner.lock();
        self.value_at(inner.elapsed)
    }

    /// Frames delivered while running
    pub fn frames_delivered(&self) -> u64 {
        self.inner.lock().frames_delivered
    }

    /// Frame rate the current profile asks this driver to target
    pub fn frame_rate_hz(&self) -> u32 {
        self.inner.lock().frame_rate_hz
    }

    fn value_at(&self, elapsed: Duration) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    fn transition(&self, to: DriverState) -> Result<()> {
        let mut inner = self.inner.lock();
        let from = inner.state;
        let allowed = matches!(
            (from, to),
            (DriverState::Idle, DriverState::Running)
                | (DriverState::Running, DriverState::Idle)
                | (DriverState::Running, DriverState::Completed)
                | (DriverState::Running, DriverState::Cancelled)
                | (DriverState::Idle, DriverState::Cancelled)
        );
        if !allowed {
            return Err(Error::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        inner.state = to;
        inner.paused_by_lifecycle = false;
        Ok(())
    }

    /// Idle → Running
    pub fn start(&self) -> Result<()> {
        self.transition(DriverState::Running)
    }

    /// Running → Idle, keeping the current value
    pub fn pause(&self) -> Result<()> {
        self.transition(DriverState::Idle)
    }

    /// Idle or Running → Cancelled
    pub fn cancel(&self) -> Result<()> {
        self.transition(DriverState::Cancelled)
    }

    /// Pause on behalf of the host lifecycle; true if the driver was running
    pub(crate) fn pause_for_lifecycle(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != DriverState::Running {
            return false;
        }
        inner.state = DriverState::Idle;
        inner.paused_by_lifecycle = true;
        true
    }

    /// Resume a driver paused by the lifecycle; true if it resumed
    pub(crate) fn resume_after_lifecycle(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != DriverState::Idle || !inner.paused_by_lifecycle {
            return false;
        }
        inner.state = DriverState::Running;
        inner.paused_by_lifecycle = false;
        true
    }

    pub(crate) fn set_frame_rate_hz(&self, hz: u32) {
        self.inner.lock().frame_rate_hz = hz;
    }

    /// Advance by `dt` if running; returns whether a frame was delivered
    pub(crate) fn deliver_frame(&self, dt: Duration) -> bool {
        let value = {
            let mut inner = self.inner.lock();
            if inner.state != DriverState::Running {
                return false;
            }
            inner.elapsed = inner.elapsed.saturating_add(dt).min(self.duration);
            inner.frames_delivered += 1;
            if inner.elapsed >= self.duration {
                inner.state = DriverState::Completed;
            }
            self.value_at(inner.elapsed)
        };
        if let Some(callback) = &self.on_frame {
            callback(value);
        }
        true
    }
}

impl std::fmt::Debug for AnimationDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("AnimationDriver")
            .field("id", &self.id)
            .field("duration", &self.duration)
            .field("state", &inner.state)
            .field("elapsed", &inner.elapsed)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
