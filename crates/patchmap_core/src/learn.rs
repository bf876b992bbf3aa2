//! The learn session: two independently-arriving signals — "a source
//! control fired" and "a target parameter was touched" — become one
//! committed binding, regardless of arrival order.
//!
//! At most one slot is in learn mode at a time across the whole table.
//! Captures write into the table incrementally; commit only ends the
//! session.

use schemars::JsonSchema;
use serde::Deserialize;

use crate::table::ChannelTable;
use crate::types::{ModuleId, ParamId, SourceId};

/// What enabling the slot that is already learning means. The reference
/// mappers disagree (cancel vs. restart), so the choice is configuration,
/// not a guess.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ReselectBehavior {
    /// Re-enabling ends the session (one-click-per-slot mappers).
    #[default]
    Toggle,
    /// Re-enabling discards the partial capture and restarts it.
    Restart,
}

#[derive(Debug, Default, Clone, Copy, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct LearnConfig {
    pub reselect: ReselectBehavior,
    /// After a commit, advance to the next slot that is not fully bound
    /// (MIDI-style batch learning). Off, the session goes idle.
    pub auto_advance: bool,
}

/// State machine accumulating one source capture and one target capture
/// before a binding counts as committed.
#[derive(Debug)]
pub struct LearnSession {
    config: LearnConfig,
    active_slot: Option<usize>,
    source_captured: bool,
    target_captured: bool,
}

impl LearnSession {
    pub fn new(config: LearnConfig) -> Self {
        LearnSession {
            config,
            active_slot: None,
            source_captured: false,
            target_captured: false,
        }
    }

    pub fn active_slot(&self) -> Option<usize> {
        self.active_slot
    }

    pub fn is_learning(&self, slot: usize) -> bool {
        self.active_slot == Some(slot)
    }

    /// Open `slot` for learning. Selecting a different slot discards the
    /// previous slot's partial capture state (not committed). Selecting
    /// the active slot applies the configured reselect behavior. Past
    /// capacity this is a no-op: the caller is expected to check
    /// `live_len() < capacity` before offering "add a mapping".
    pub fn enable(&mut self, slot: usize, table: &ChannelTable) {
        if slot >= table.capacity() {
            return;
        }
        if self.active_slot == Some(slot) {
            match self.config.reselect {
                ReselectBehavior::Toggle => self.disable(),
                ReselectBehavior::Restart => {
                    self.source_captured = false;
                    self.target_captured = false;
                    log::debug!("learn restarted on slot {slot}");
                }
            }
            return;
        }
        self.active_slot = Some(slot);
        self.source_captured = false;
        self.target_captured = false;
        log::debug!("learn enabled on slot {slot}");
    }

    /// End the session without committing. Synchronous state reset; there
    /// is no in-flight work to cancel.
    pub fn disable(&mut self) {
        if self.active_slot.take().is_some() {
            log::debug!("learn disabled");
        }
        self.source_captured = false;
        self.target_captured = false;
    }

    /// Record the source half of the gesture. Only the active slot
    /// captures; late events from a just-deactivated slot are dropped
    /// silently. Sources are exclusive: another slot owning the same
    /// source loses it.
    pub fn capture_source(&mut self, slot: usize, source: SourceId, table: &mut ChannelTable) {
        if self.active_slot != Some(slot) {
            return;
        }
        table.take_source_from_others(source, slot);
        let entry = table.slot_at_mut(slot);
        entry.source = Some(source);
        entry.input = None;
        entry.rearm();
        self.source_captured = true;
        table.recompute_live_len();
        self.try_commit(table);
    }

    /// Record the target half of the gesture. Only the active slot
    /// captures. Overwrites any previous binding without notifying the
    /// old target.
    pub fn capture_target(
        &mut self,
        slot: usize,
        module: ModuleId,
        param: ParamId,
        table: &mut ChannelTable,
    ) {
        if self.active_slot != Some(slot) {
            return;
        }
        let entry = table.slot_at_mut(slot);
        entry.target.bind(module, param);
        entry.rearm();
        self.target_captured = true;
        table.recompute_live_len();
        self.try_commit(table);
    }

    /// Once both halves are captured the session returns to idle; the
    /// binding was already written incrementally by the captures. With
    /// auto-advance the session moves on to the next unfinished slot
    /// within capacity instead.
    fn try_commit(&mut self, table: &mut ChannelTable) {
        if !(self.source_captured && self.target_captured) {
            return;
        }
        let Some(committed) = self.active_slot else {
            return;
        };
        log::info!("mapping committed on slot {committed}");
        self.active_slot = None;
        self.source_captured = false;
        self.target_captured = false;
        table.recompute_live_len();

        if self.config.auto_advance {
            let next = (committed + 1..table.capacity()).find(|&i| {
                let slot = table.slot_at(i);
                !(slot.source.is_some() && slot.target.is_bound())
            });
            if let Some(next) = next {
                self.active_slot = Some(next);
                log::debug!("learn advanced to slot {next}");
            }
        }
    }
}
