//! Parameter-mapping engine for a modular-synthesis host.
//!
//! This crate provides the mapping/binding core: weak parameter handles
//! that survive module deletion, per-channel value reconciliation
//! (smoothing, pickup, toggle, lock), the fixed-capacity channel table
//! with its live-length policy, and the learn-mode state machine.
//! It is a pure library with no I/O, protocol handling, or serialization
//! framing; those responsibilities belong in the host layer.

pub mod engine;
pub mod handle;
pub mod learn;
pub mod reconcile;
pub mod table;
pub mod types;

// Re-export commonly used items
pub use engine::{CommandSender, MappingEngine};
pub use handle::ParamHandle;
pub use learn::{LearnConfig, LearnSession, ReselectBehavior};
pub use reconcile::{ReconcileMode, ValueReconciler};
pub use table::{ChannelSlot, ChannelTable};
pub use types::{
    BindingState, EngineCommand, EngineConfig, ModuleHost, ModuleId, ParamId, ParamRef, ParamView,
    SourceId,
};
