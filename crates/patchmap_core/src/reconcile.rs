//! Per-channel value reconciliation: smoothing plus the jump-avoidance
//! policy that decides, each tick, whether a freshly-read control value
//! may be written into the bound target and what value to write.
//!
//! All values here are normalized `[0,1]`; conversion to a target's
//! native range happens in the channel adapter, not in this component.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Gate threshold for `Toggle` mode.
const TOGGLE_THRESHOLD: f32 = 0.5;

/// How a channel's incoming values take over its target.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ReconcileMode {
    /// Write every tick.
    #[default]
    Direct,
    /// Withhold writes until the control crosses the target's current
    /// value, then write every tick. Prevents an unrelated physical
    /// control position from yanking the parameter the instant it is
    /// bound.
    Pickup,
    /// Flip a stored value between 0 and 1 on rising gate edges; writes
    /// only on the edge.
    Toggle,
    /// Write every tick. Semantically distinct from `Direct`: manual
    /// tweaks on the target are always overridden.
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PickupState {
    /// No sample seen since the binding changed.
    Unseeded,
    /// Waiting for the control to reach the target from this side.
    Waiting { below: bool },
    /// Crossed once; behaves as `Direct` until the binding changes.
    Engaged,
}

/// Smoothing and jump-avoidance state for one channel.
#[derive(Debug, Clone)]
pub struct ValueReconciler {
    mode: ReconcileMode,
    smoothing_ms: f32,
    /// Exponential filter memory. `None` until the first sample after a
    /// (re)bind, so unrelated value histories are never smoothed together.
    filter: Option<f32>,
    pickup: PickupState,
    gate_high: bool,
    toggle_on: bool,
}

impl ValueReconciler {
    pub fn new(smoothing_ms: f32) -> Self {
        ValueReconciler {
            mode: ReconcileMode::default(),
            smoothing_ms,
            filter: None,
            pickup: PickupState::Unseeded,
            gate_high: false,
            toggle_on: false,
        }
    }

    pub fn mode(&self) -> ReconcileMode {
        self.mode
    }

    pub fn smoothing_ms(&self) -> f32 {
        self.smoothing_ms
    }

    /// Switch modes. Mode-dependent state re-arms so a fresh `Pickup`
    /// waits for a crossing against the target as it is now.
    pub fn set_mode(&mut self, mode: ReconcileMode) {
        self.mode = mode;
        self.pickup = PickupState::Unseeded;
    }

    /// Seed from the target's current value. Called on the first tick
    /// after the binding changes, before any write is allowed.
    pub fn seed(&mut self, value: f32) {
        self.filter = Some(value);
        self.pickup = PickupState::Unseeded;
        self.gate_high = value >= TOGGLE_THRESHOLD;
        self.toggle_on = value >= TOGGLE_THRESHOLD;
    }

    /// Forget everything. The next tick seeds again.
    pub fn reset(&mut self) {
        self.filter = None;
        self.pickup = PickupState::Unseeded;
        self.gate_high = false;
        self.toggle_on = false;
    }

    /// Exponential low-pass over the raw control value, removing jitter
    /// (7-bit MIDI quantization, mechanical pot noise) before any
    /// mode-specific logic. The first sample after a reset seeds the
    /// filter instead of slewing from stale state.
    pub fn smooth(&mut self, raw: f32, dt: f32) -> f32 {
        let value = match self.filter {
            Some(previous) if self.smoothing_ms > 0.0 => {
                let alpha = ((dt * 1000.0) / self.smoothing_ms).clamp(0.0, 1.0);
                previous + (raw - previous) * alpha
            }
            _ => raw,
        };
        self.filter = Some(value);
        value
    }

    /// Decide whether `filtered` may be written over `current_target`,
    /// and what value to write. `None` means no write this tick.
    pub fn reconcile(&mut self, filtered: f32, current_target: f32) -> Option<f32> {
        match self.mode {
            ReconcileMode::Direct | ReconcileMode::Locked => Some(filtered),
            ReconcileMode::Pickup => self.reconcile_pickup(filtered, current_target),
            ReconcileMode::Toggle => self.reconcile_toggle(filtered),
        }
    }

    fn reconcile_pickup(&mut self, filtered: f32, current_target: f32) -> Option<f32> {
        match self.pickup {
            PickupState::Engaged => Some(filtered),
            PickupState::Unseeded => {
                if filtered == current_target {
                    self.pickup = PickupState::Engaged;
                    Some(filtered)
                } else {
                    self.pickup = PickupState::Waiting {
                        below: filtered < current_target,
                    };
                    None
                }
            }
            PickupState::Waiting { below } => {
                // The side flips exactly at the crossing, so the first
                // emitted value is the control's own, not a snap to the
                // target.
                if (filtered < current_target) != below || filtered == current_target {
                    self.pickup = PickupState::Engaged;
                    Some(filtered)
                } else {
                    None
                }
            }
        }
    }

    fn reconcile_toggle(&mut self, filtered: f32) -> Option<f32> {
        if !self.gate_high && filtered >= TOGGLE_THRESHOLD {
            self.gate_high = true;
            self.toggle_on = !self.toggle_on;
            Some(if self.toggle_on { 1.0 } else { 0.0 })
        } else {
            if filtered < TOGGLE_THRESHOLD {
                self.gate_high = false;
            }
            None
        }
    }
}
