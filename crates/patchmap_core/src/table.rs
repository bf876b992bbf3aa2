//! The fixed-capacity channel table and its live-length accounting.
//!
//! Slots are allocated once at construction and never grown at runtime.
//! Only the first `live_len` slots matter for UI iteration and the tick
//! loop; the length is recomputed after every mutation, never
//! hand-maintained, and always keeps one empty "ready to learn" slot
//! visible while capacity allows.

use crate::handle::ParamHandle;
use crate::reconcile::{ReconcileMode, ValueReconciler};
use crate::types::{BindingState, SourceId, map_range};

/// One row of the mapping table: one external control source paired with
/// at most one target parameter.
#[derive(Debug, Clone)]
pub struct ChannelSlot {
    /// Control identity driving this slot, `None` until learned.
    pub source: Option<SourceId>,
    /// Parameter this slot controls.
    pub target: ParamHandle,
    /// Normalized output sub-range; the reconciled value is mapped into
    /// `[min, max]` before the write. `min > max` reverses the control.
    pub min: f32,
    pub max: f32,
    /// Last value written to (or seeded from) the target, in target
    /// space. `None` until the first tick after a bind.
    pub last_value: Option<f32>,
    pub(crate) reconciler: ValueReconciler,
    /// Latest raw normalized source value, `None` until the source fires.
    pub(crate) input: Option<f32>,
    /// Set on (re)bind; the next tick seeds from the target instead of
    /// writing, so a stale source value never stomps a fresh mapping.
    pub(crate) needs_seed: bool,
}

impl ChannelSlot {
    fn new(smoothing_ms: f32) -> Self {
        ChannelSlot {
            source: None,
            target: ParamHandle::default(),
            min: 0.0,
            max: 1.0,
            last_value: None,
            reconciler: ValueReconciler::new(smoothing_ms),
            input: None,
            needs_seed: false,
        }
    }

    /// A slot counts as used when either side of the binding is present.
    pub fn is_used(&self) -> bool {
        self.source.is_some() || self.target.is_bound()
    }

    pub fn mode(&self) -> ReconcileMode {
        self.reconciler.mode()
    }

    pub(crate) fn set_mode(&mut self, mode: ReconcileMode) {
        self.reconciler.set_mode(mode);
    }

    /// Forget reconciliation history; the next tick seeds from the
    /// target. Called whenever the binding itself changes.
    pub(crate) fn rearm(&mut self) {
        self.reconciler.reset();
        self.last_value = None;
        self.needs_seed = true;
    }

    /// Source space -> target space.
    pub(crate) fn apply_range(&self, value: f32) -> f32 {
        map_range(value, 0.0, 1.0, self.min, self.max)
    }

    /// Target space -> source space.
    pub(crate) fn unapply_range(&self, value: f32) -> f32 {
        map_range(value, self.min, self.max, 0.0, 1.0)
    }

    fn clear(&mut self) {
        *self = ChannelSlot::new(self.reconciler.smoothing_ms());
    }

    pub(crate) fn snapshot(&self) -> BindingState {
        BindingState {
            source: self.source,
            module: self.target.module,
            param: self.target.param,
            mode: self.mode(),
            min: self.min,
            max: self.max,
            label: self.target.label.clone(),
            color: self.target.color,
        }
    }

    pub(crate) fn restore(&mut self, state: &BindingState) {
        self.clear();
        self.source = state.source;
        if let Some(module) = state.module {
            self.target.bind(module, state.param);
        }
        self.target.label = state.label.clone();
        self.target.color = state.color;
        self.min = state.min;
        self.max = state.max;
        self.set_mode(state.mode);
        if self.target.is_bound() {
            self.rearm();
        }
    }
}

/// The ordered slot array owned by one mapping engine.
pub struct ChannelTable {
    slots: Box<[ChannelSlot]>,
    live_len: usize,
}

impl ChannelTable {
    /// Allocate every slot up front. Capacity is fixed for the table's
    /// lifetime and must be at least 1.
    pub fn new(capacity: usize, smoothing_ms: f32) -> Self {
        assert!(capacity >= 1, "channel table needs at least one slot");
        ChannelTable {
            slots: vec![ChannelSlot::new(smoothing_ms); capacity].into_boxed_slice(),
            live_len: 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots currently relevant for UI display and the tick
    /// loop: one past the last used slot when capacity allows, never
    /// less than 1.
    pub fn live_len(&self) -> usize {
        self.live_len
    }

    /// Bounds-checked slot access. Out of range is a programming error:
    /// capacity is fixed at construction and never externally influenced.
    pub fn slot_at(&self, index: usize) -> &ChannelSlot {
        &self.slots[index]
    }

    pub(crate) fn slot_at_mut(&mut self, index: usize) -> &mut ChannelSlot {
        &mut self.slots[index]
    }

    /// Recompute `live_len` from occupancy. Called after every mutation
    /// that could change which slots are used.
    pub fn recompute_live_len(&mut self) {
        let mut live = self
            .slots
            .iter()
            .rposition(ChannelSlot::is_used)
            .map_or(0, |last| last + 1);
        if live < self.slots.len() {
            // Keep one empty trailing slot visible, ready to learn.
            live += 1;
        }
        self.live_len = live.max(1);
    }

    /// Empty one slot: source, target, and reconciliation history.
    /// Idempotent.
    pub fn clear(&mut self, index: usize) {
        self.slots[index].clear();
        self.recompute_live_len();
    }

    /// Empty every slot and shrink back to the single ready slot.
    pub fn clear_all(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.clear();
        }
        self.live_len = 1;
    }

    /// Sources are exclusive: at most one slot may own a given source.
    /// Strips `source` from every slot except `keep`.
    pub(crate) fn take_source_from_others(&mut self, source: SourceId, keep: usize) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if i != keep && slot.source == Some(source) {
                slot.source = None;
                slot.input = None;
            }
        }
    }
}
