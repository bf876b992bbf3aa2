//! The mapping engine: the per-tick read/reconcile/write loop plus the
//! learn/clear/query surface the (out-of-scope) UI layer drives.
//!
//! `tick` is called once per host engine step from the engine thread.
//! Everything arriving from other threads goes through a single-producer
//! command queue drained at the start of each tick, so the table only
//! ever has one writer. The steady-state tick performs no heap
//! allocation and takes the queue lock only long enough to pull a
//! bounded batch.

use std::sync::Arc;

use arrayvec::ArrayVec;
use parking_lot::Mutex;

use crate::learn::LearnSession;
use crate::reconcile::ReconcileMode;
use crate::table::{ChannelSlot, ChannelTable};
use crate::types::{
    BindingState, EngineCommand, EngineConfig, ModuleHost, ModuleId, ParamId, SourceId,
};

/// Hard cap on buffered commands. Past it the producer drops; ticks are
/// frequent enough that a full buffer means the engine is not running.
const COMMAND_BUFFER_SIZE: usize = 1024;

/// Commands applied per tick. Anything beyond stays queued for the next
/// tick so one tick's work stays bounded.
const COMMAND_BATCH: usize = 64;

type CommandQueue = Arc<Mutex<Vec<EngineCommand>>>;

/// Cheap cloneable producer handle for the UI/event thread.
#[derive(Clone)]
pub struct CommandSender {
    queue: CommandQueue,
}

impl CommandSender {
    pub fn send(&self, command: EngineCommand) {
        let mut queue = self.queue.lock();
        if queue.len() < COMMAND_BUFFER_SIZE {
            queue.push(command);
        }
    }

    pub fn source_event(&self, source: SourceId, value: f32) {
        self.send(EngineCommand::SourceEvent { source, value });
    }

    pub fn target_touched(&self, module: ModuleId, param: ParamId) {
        self.send(EngineCommand::TargetTouched { module, param });
    }
}

/// One mapping engine per mapper module instance: exclusively owns its
/// channel table and learn session.
pub struct MappingEngine {
    table: ChannelTable,
    learn: LearnSession,
    queue: CommandQueue,
}

impl MappingEngine {
    pub fn new(config: EngineConfig) -> Self {
        MappingEngine {
            table: ChannelTable::new(config.capacity, config.smoothing_ms),
            learn: LearnSession::new(config.learn),
            queue: Arc::new(Mutex::new(Vec::with_capacity(COMMAND_BUFFER_SIZE))),
        }
    }

    /// Producer handle for the UI/event thread.
    pub fn sender(&self) -> CommandSender {
        CommandSender {
            queue: Arc::clone(&self.queue),
        }
    }

    // === Per-tick loop ===

    /// One engine step: drain queued commands, then for every live slot
    /// resolve, reconcile, and write. Slots whose target does not resolve
    /// are skipped entirely — no source read, no write — and reactivate
    /// by themselves if the host resolves the id again later.
    pub fn tick(&mut self, host: &mut dyn ModuleHost, dt: f32) {
        self.drain_commands();
        for index in 0..self.table.live_len() {
            self.tick_slot(index, host, dt);
        }
    }

    fn drain_commands(&mut self) {
        let mut batch: ArrayVec<EngineCommand, COMMAND_BATCH> = ArrayVec::new();
        {
            let mut queue = self.queue.lock();
            let take = queue.len().min(COMMAND_BATCH);
            batch.extend(queue.drain(..take));
        }
        for command in batch {
            self.apply(command);
        }
    }

    fn tick_slot(&mut self, index: usize, host: &mut dyn ModuleHost, dt: f32) {
        let slot = self.table.slot_at_mut(index);
        let Some(mut param) = slot.target.resolve(host) else {
            return;
        };
        let current = param.get();

        if slot.needs_seed {
            // First tick since the (re)bind: adopt the target's value
            // instead of writing, so a stale source value never stomps a
            // fresh mapping.
            let seeded = slot.unapply_range(current).clamp(0.0, 1.0);
            slot.reconciler.seed(seeded);
            slot.last_value = Some(current);
            slot.needs_seed = false;
            return;
        }

        let Some(raw) = slot.input else {
            return;
        };
        let filtered = slot.reconciler.smooth(raw, dt);
        let current_in = slot.unapply_range(current);
        if let Some(out) = slot.reconciler.reconcile(filtered, current_in) {
            let mapped = slot.apply_range(out);
            param.set(mapped);
            slot.last_value = Some(mapped);
        }
    }

    // === Commands ===

    /// Apply one queued command. Slot indexes arriving over the queue are
    /// validated here rather than trusted; a stale UI index must not take
    /// down the engine thread.
    fn apply(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::SourceEvent { source, value } => {
                self.handle_source_event(source, value);
            }
            EngineCommand::TargetTouched { module, param } => {
                self.handle_target_touched(module, param);
            }
            EngineCommand::EnableLearn { slot } => self.enable_learn(slot),
            EngineCommand::DisableLearn => self.disable_learn(),
            EngineCommand::ClearSlot { slot } => {
                if slot < self.table.capacity() {
                    self.clear_slot(slot);
                } else {
                    log::warn!("dropping clear for out-of-range slot {slot}");
                }
            }
            EngineCommand::ClearAll => self.clear_all(),
        }
    }

    /// A normalized value arrived from an external control. While a slot
    /// is learning this is also the source half of the gesture.
    pub fn handle_source_event(&mut self, source: SourceId, value: f32) {
        if let Some(active) = self.learn.active_slot() {
            self.learn.capture_source(active, source, &mut self.table);
        }
        let value = value.clamp(0.0, 1.0);
        for index in 0..self.table.live_len() {
            let slot = self.table.slot_at_mut(index);
            if slot.source == Some(source) {
                slot.input = Some(value);
            }
        }
    }

    /// The user touched a parameter on some module; the target half of
    /// the learn gesture. Ignored while nothing is learning.
    pub fn handle_target_touched(&mut self, module: ModuleId, param: ParamId) {
        if let Some(active) = self.learn.active_slot() {
            self.learn.capture_target(active, module, param, &mut self.table);
        }
    }

    // === Learn / clear surface ===

    pub fn enable_learn(&mut self, slot: usize) {
        self.learn.enable(slot, &self.table);
    }

    pub fn disable_learn(&mut self) {
        self.learn.disable();
    }

    pub fn learning_slot(&self) -> Option<usize> {
        self.learn.active_slot()
    }

    pub fn clear_slot(&mut self, slot: usize) {
        self.table.clear(slot);
        log::debug!("cleared slot {slot}");
    }

    /// Empty every slot and cancel any in-progress learn session.
    pub fn clear_all(&mut self) {
        self.learn.disable();
        self.table.clear_all();
        log::debug!("cleared all slots");
    }

    // === Query surface ===

    pub fn live_len(&self) -> usize {
        self.table.live_len()
    }

    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Read-only slot view for UI iteration over `0..live_len()`.
    pub fn slot(&self, index: usize) -> &ChannelSlot {
        self.table.slot_at(index)
    }

    pub fn set_mode(&mut self, slot: usize, mode: ReconcileMode) {
        self.table.slot_at_mut(slot).set_mode(mode);
    }

    /// Set the slot's normalized output sub-range. `min > max` reverses
    /// the control.
    pub fn set_range(&mut self, slot: usize, min: f32, max: f32) {
        let entry = self.table.slot_at_mut(slot);
        entry.min = min;
        entry.max = max;
    }

    pub fn set_label(&mut self, slot: usize, label: impl Into<String>) {
        self.table.slot_at_mut(slot).target.label = label.into();
    }

    pub fn set_color(&mut self, slot: usize, color: Option<[u8; 3]>) {
        self.table.slot_at_mut(slot).target.color = color;
    }

    // === Persistence (plain data) ===

    /// Snapshot every used slot, in slot order. The trailing ready slot
    /// and other empty slots are not exported.
    pub fn bindings(&self) -> Vec<BindingState> {
        (0..self.table.live_len())
            .map(|index| self.table.slot_at(index))
            .filter(|slot| slot.is_used())
            .map(ChannelSlot::snapshot)
            .collect()
    }

    /// Rebuild the table from a binding list: clears everything (ending
    /// any learn session), then restores one slot per entry in order.
    /// Entries beyond capacity are dropped.
    pub fn apply_bindings(&mut self, bindings: &[BindingState]) {
        self.clear_all();
        if bindings.len() > self.table.capacity() {
            log::warn!(
                "dropping {} bindings beyond capacity {}",
                bindings.len() - self.table.capacity(),
                self.table.capacity()
            );
        }
        for (index, state) in bindings.iter().take(self.table.capacity()).enumerate() {
            self.table.slot_at_mut(index).restore(state);
        }
        self.table.recompute_live_len();
    }
}

impl Default for MappingEngine {
    fn default() -> Self {
        MappingEngine::new(EngineConfig::default())
    }
}
