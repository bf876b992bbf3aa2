//! Shared types and host-facing contracts for the mapping engine.
//!
//! The engine never owns the modules it drives. Everything it consumes
//! from the host is expressed here as traits (`ModuleHost`, `ParamView`)
//! over plain copyable ids, so the host adapter stays a thin shim and the
//! engine itself holds nothing that could dangle.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::learn::LearnConfig;
use crate::reconcile::ReconcileMode;

/// Host-assigned module identifier. Opaque to the engine beyond equality;
/// trivially serializable so bindings survive persistence without any
/// registration protocol.
pub type ModuleId = i64;

/// Parameter index within a module.
pub type ParamId = usize;

/// The external control identity a slot is bound to: a MIDI CC number, a
/// polyphonic lane index, a key+modifier combination. Opaque beyond
/// equality comparison; composite keys are the caller's encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SourceId(pub u32);

/// Read/write view of one live module's parameters, normalized to `[0,1]`.
/// Conversion to a parameter's native range (volts, 0..127, ...) is the
/// host adapter's job.
pub trait ParamView {
    fn param_count(&self) -> usize;
    fn normalized_param(&self, param: ParamId) -> f32;
    fn set_normalized_param(&mut self, param: ParamId, value: f32);
}

/// Fresh module lookup, performed every tick for every live slot.
/// Returning `None` is how the engine learns that a module was deleted;
/// there is no lifecycle subscription to keep in sync.
pub trait ModuleHost {
    fn resolve_module(&mut self, id: ModuleId) -> Option<&mut dyn ParamView>;
}

/// A resolved `(module, param)` pair, valid for a single borrow of the
/// host. Never cached across ticks.
pub struct ParamRef<'h> {
    module: &'h mut dyn ParamView,
    param: ParamId,
}

impl<'h> ParamRef<'h> {
    pub(crate) fn new(module: &'h mut dyn ParamView, param: ParamId) -> Self {
        ParamRef { module, param }
    }

    pub fn get(&self) -> f32 {
        self.module.normalized_param(self.param)
    }

    pub fn set(&mut self, value: f32) {
        self.module.set_normalized_param(self.param, value);
    }
}

/// Commands marshalled from the UI/event thread onto the engine thread.
/// A bounded batch is drained at the start of every `tick`, which makes
/// the single-writer contract on the channel table explicit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineCommand {
    /// A normalized value arrived from an external control. Doubles as the
    /// source half of a learn gesture while a slot is learning.
    SourceEvent { source: SourceId, value: f32 },
    /// The user touched a parameter on some module.
    TargetTouched { module: ModuleId, param: ParamId },
    EnableLearn { slot: usize },
    DisableLearn,
    ClearSlot { slot: usize },
    ClearAll,
}

/// Engine construction settings. Deserializable so the host can round-trip
/// mapper presets as plain JSON values.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Slot capacity, fixed for the lifetime of the engine (mapper
    /// specific, e.g. 32 for a CV mapper, 128 for a MIDI mapper).
    pub capacity: usize,
    /// Control smoothing time constant in milliseconds (0 = off).
    pub smoothing_ms: f32,
    pub learn: LearnConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            capacity: 32,
            smoothing_ms: 0.0,
            learn: LearnConfig::default(),
        }
    }
}

/// Flat, serializable snapshot of one slot's binding: the
/// `{source, module, param}` triple plus the per-mapper extras. This is
/// the whole persistence surface; the engine never touches files or JSON
/// framing itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct BindingState {
    pub source: Option<SourceId>,
    pub module: Option<ModuleId>,
    pub param: ParamId,
    pub mode: ReconcileMode,
    pub min: f32,
    pub max: f32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<[u8; 3]>,
}

impl Default for BindingState {
    fn default() -> Self {
        BindingState {
            source: None,
            module: None,
            param: 0,
            mode: ReconcileMode::default(),
            min: 0.0,
            max: 1.0,
            label: String::new(),
            color: None,
        }
    }
}

/// Map a value from one range to another. If the input range is
/// degenerate, returns `y0`.
pub fn map_range(x: f32, x0: f32, x1: f32, y0: f32, y1: f32) -> f32 {
    let denom = x1 - x0;
    if denom.abs() < f32::EPSILON {
        return y0;
    }
    (x - x0) * (y1 - y0) / denom + y0
}
