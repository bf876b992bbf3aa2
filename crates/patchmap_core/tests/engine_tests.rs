use std::collections::HashMap;

use patchmap_core::{
    BindingState, EngineCommand, EngineConfig, LearnConfig, MappingEngine, ModuleHost, ModuleId,
    ParamId, ParamView, ReconcileMode, SourceId,
};

const DT: f32 = 1.0 / 48_000.0;

#[derive(Default)]
struct DummyModule {
    params: Vec<f32>,
    writes: Vec<(ParamId, f32)>,
}

impl DummyModule {
    fn new(params: &[f32]) -> Self {
        DummyModule {
            params: params.to_vec(),
            writes: Vec::new(),
        }
    }
}

impl ParamView for DummyModule {
    fn param_count(&self) -> usize {
        self.params.len()
    }

    fn normalized_param(&self, param: ParamId) -> f32 {
        self.params[param]
    }

    fn set_normalized_param(&mut self, param: ParamId, value: f32) {
        self.params[param] = value;
        self.writes.push((param, value));
    }
}

#[derive(Default)]
struct DummyHost {
    modules: HashMap<ModuleId, DummyModule>,
}

impl DummyHost {
    fn with_module(mut self, id: ModuleId, params: &[f32]) -> Self {
        self.modules.insert(id, DummyModule::new(params));
        self
    }

    fn module(&self, id: ModuleId) -> &DummyModule {
        &self.modules[&id]
    }
}

impl ModuleHost for DummyHost {
    fn resolve_module(&mut self, id: ModuleId) -> Option<&mut dyn ParamView> {
        self.modules
            .get_mut(&id)
            .map(|module| module as &mut dyn ParamView)
    }
}

fn approx_eq(a: f32, b: f32, eps: f32) {
    assert!(
        (a - b).abs() <= eps,
        "expected {a} ~ {b} (eps {eps}), diff {}",
        (a - b).abs()
    );
}

/// Learn one binding synchronously: slot, source, target.
fn learn(engine: &mut MappingEngine, slot: usize, source: SourceId, module: ModuleId, param: ParamId) {
    engine.enable_learn(slot);
    engine.handle_source_event(source, 0.0);
    engine.handle_target_touched(module, param);
    assert_eq!(engine.learning_slot(), None, "learn did not commit");
}

#[test]
fn basic_cv_mapping_writes_the_lane_value() {
    let mut host = DummyHost::default().with_module(7, &[0.0, 0.0, 0.5]);
    let mut engine = MappingEngine::new(EngineConfig::default());
    assert_eq!(engine.capacity(), 32);

    learn(&mut engine, 0, SourceId(3), 7, 2);

    // First tick adopts the target's value; nothing is written.
    engine.tick(&mut host, DT);
    assert!(host.module(7).writes.is_empty());
    approx_eq(engine.slot(0).last_value.unwrap(), 0.5, 1e-6);

    engine.handle_source_event(SourceId(3), 0.75);
    engine.tick(&mut host, DT);
    assert_eq!(host.module(7).writes, vec![(2, 0.75)]);
    approx_eq(host.module(7).params[2], 0.75, 1e-6);
}

#[test]
fn live_length_grows_with_the_highest_used_slot() {
    let mut engine = MappingEngine::default();
    assert_eq!(engine.live_len(), 1);

    learn(&mut engine, 0, SourceId(1), 7, 0);
    assert_eq!(engine.live_len(), 2);

    learn(&mut engine, 4, SourceId(2), 7, 1);
    assert_eq!(engine.live_len(), 6);

    engine.clear_slot(4);
    assert_eq!(engine.live_len(), 2);

    engine.clear_all();
    assert_eq!(engine.live_len(), 1);
}

#[test]
fn unresolved_target_is_skipped_without_writes() {
    // Module 99 does not exist in the host.
    let mut host = DummyHost::default().with_module(7, &[0.5]);
    let mut engine = MappingEngine::default();

    learn(&mut engine, 0, SourceId(3), 99, 0);
    for _ in 0..10 {
        engine.handle_source_event(SourceId(3), 0.9);
        engine.tick(&mut host, DT);
    }
    assert!(host.module(7).writes.is_empty());
    assert!(engine.slot(0).last_value.is_none());
}

#[test]
fn deleted_target_goes_inert_and_reactivates() {
    let mut host = DummyHost::default().with_module(7, &[0.2]);
    let mut engine = MappingEngine::default();

    learn(&mut engine, 0, SourceId(3), 7, 0);
    engine.tick(&mut host, DT); // seed
    engine.handle_source_event(SourceId(3), 0.6);
    engine.tick(&mut host, DT);
    assert_eq!(host.module(7).writes.len(), 1);

    // Host deletes the module mid-session; the slot goes inert with no
    // unbind notification.
    let removed = host.modules.remove(&7).unwrap();
    engine.handle_source_event(SourceId(3), 0.9);
    engine.tick(&mut host, DT);

    // The host re-adds a module under the same id; the slot reactivates
    // by itself and keeps driving it with the latest source value.
    host.modules.insert(7, removed);
    engine.tick(&mut host, DT);
    assert_eq!(host.module(7).writes.len(), 2);
    approx_eq(host.module(7).params[0], 0.9, 1e-6);
}

#[test]
fn out_of_range_param_is_treated_as_unresolved() {
    let mut host = DummyHost::default().with_module(7, &[0.5]);
    let mut engine = MappingEngine::default();

    // Param 5 is out of range for a one-param module.
    learn(&mut engine, 0, SourceId(3), 7, 5);
    engine.handle_source_event(SourceId(3), 0.9);
    engine.tick(&mut host, DT);
    engine.tick(&mut host, DT);
    assert!(host.module(7).writes.is_empty());
}

#[test]
fn pickup_mode_waits_for_the_control_to_reach_the_target() {
    let mut host = DummyHost::default().with_module(7, &[0.5]);
    let mut engine = MappingEngine::default();

    learn(&mut engine, 0, SourceId(3), 7, 0);
    engine.set_mode(0, ReconcileMode::Pickup);
    engine.tick(&mut host, DT); // seed

    for value in [0.1, 0.3, 0.45] {
        engine.handle_source_event(SourceId(3), value);
        engine.tick(&mut host, DT);
    }
    assert!(host.module(7).writes.is_empty(), "wrote before pickup");

    engine.handle_source_event(SourceId(3), 0.55);
    engine.tick(&mut host, DT);
    assert_eq!(host.module(7).writes, vec![(0, 0.55)]);
}

#[test]
fn toggle_mode_flips_on_gate_edges() {
    let mut host = DummyHost::default().with_module(7, &[0.0]);
    let mut engine = MappingEngine::default();

    learn(&mut engine, 0, SourceId(3), 7, 0);
    engine.set_mode(0, ReconcileMode::Toggle);
    engine.tick(&mut host, DT); // seed; stored output starts at 0

    engine.handle_source_event(SourceId(3), 1.0);
    engine.tick(&mut host, DT);
    assert_eq!(host.module(7).writes, vec![(0, 1.0)]);

    // Held gate: no further writes.
    engine.tick(&mut host, DT);
    engine.tick(&mut host, DT);
    assert_eq!(host.module(7).writes.len(), 1);

    engine.handle_source_event(SourceId(3), 0.0);
    engine.tick(&mut host, DT);
    engine.handle_source_event(SourceId(3), 1.0);
    engine.tick(&mut host, DT);
    assert_eq!(host.module(7).writes, vec![(0, 1.0), (0, 0.0)]);
}

#[test]
fn output_sub_range_maps_the_written_value() {
    let mut host = DummyHost::default().with_module(7, &[0.5]);
    let mut engine = MappingEngine::default();

    learn(&mut engine, 0, SourceId(3), 7, 0);
    engine.set_range(0, 0.2, 0.8);
    engine.tick(&mut host, DT); // seed

    engine.handle_source_event(SourceId(3), 0.5);
    engine.tick(&mut host, DT);
    approx_eq(host.module(7).params[0], 0.5, 1e-6);

    engine.handle_source_event(SourceId(3), 0.0);
    engine.tick(&mut host, DT);
    approx_eq(host.module(7).params[0], 0.2, 1e-6);

    engine.handle_source_event(SourceId(3), 1.0);
    engine.tick(&mut host, DT);
    approx_eq(host.module(7).params[0], 0.8, 1e-6);
}

#[test]
fn source_exclusivity_across_slots() {
    let mut engine = MappingEngine::default();
    learn(&mut engine, 0, SourceId(7), 1, 0);
    learn(&mut engine, 1, SourceId(7), 2, 0);

    assert_eq!(engine.slot(0).source, None);
    assert_eq!(engine.slot(1).source, Some(SourceId(7)));
}

#[test]
fn commands_from_the_sender_apply_on_the_next_tick() {
    let mut host = DummyHost::default().with_module(7, &[0.5]);
    let mut engine = MappingEngine::default();
    let sender = engine.sender();

    sender.send(EngineCommand::EnableLearn { slot: 0 });
    sender.source_event(SourceId(3), 0.75);
    sender.target_touched(7, 0);

    // Nothing applied until the engine ticks.
    assert_eq!(engine.learning_slot(), None);
    assert_eq!(engine.live_len(), 1);

    engine.tick(&mut host, DT); // drains commands, then seeds
    assert_eq!(engine.live_len(), 2);
    assert_eq!(engine.slot(0).source, Some(SourceId(3)));

    engine.handle_source_event(SourceId(3), 0.75);
    engine.tick(&mut host, DT);
    assert_eq!(host.module(7).writes, vec![(0, 0.75)]);
}

#[test]
fn persistence_round_trips_bindings_and_live_len() {
    let mut engine = MappingEngine::default();
    learn(&mut engine, 0, SourceId(3), 7, 2);
    learn(&mut engine, 1, SourceId(4), 9, 0);
    engine.set_mode(1, ReconcileMode::Pickup);
    engine.set_range(1, 0.25, 0.75);
    engine.set_label(0, "cutoff");
    engine.set_color(0, Some([255, 0, 0]));

    // A source-only slot (unfinished mapping) survives the round trip.
    engine.enable_learn(2);
    engine.handle_source_event(SourceId(5), 0.0);
    engine.disable_learn();

    let exported = engine.bindings();
    assert_eq!(exported.len(), 3);
    let live_len = engine.live_len();

    engine.clear_all();
    assert!(engine.bindings().is_empty());

    engine.apply_bindings(&exported);
    assert_eq!(engine.bindings(), exported);
    assert_eq!(engine.live_len(), live_len);
}

#[test]
fn bindings_survive_json_in_between() {
    let mut engine = MappingEngine::default();
    learn(&mut engine, 0, SourceId(3), 7, 2);
    engine.set_mode(0, ReconcileMode::Locked);

    let exported = engine.bindings();
    let json = serde_json::to_string(&exported).unwrap();
    let imported: Vec<BindingState> = serde_json::from_str(&json).unwrap();

    engine.clear_all();
    engine.apply_bindings(&imported);
    assert_eq!(engine.bindings(), exported);
    assert_eq!(engine.slot(0).mode(), ReconcileMode::Locked);
}

#[test]
fn restored_bindings_seed_before_writing() {
    let mut host = DummyHost::default().with_module(7, &[0.5]);
    let mut engine = MappingEngine::default();
    learn(&mut engine, 0, SourceId(3), 7, 0);
    let exported = engine.bindings();

    let mut restored = MappingEngine::default();
    restored.apply_bindings(&exported);
    restored.tick(&mut host, DT);
    assert!(host.module(7).writes.is_empty(), "restored slot wrote before seeding");
    approx_eq(restored.slot(0).last_value.unwrap(), 0.5, 1e-6);
}

#[test]
fn clearing_a_slot_twice_matches_clearing_once() {
    let mut engine = MappingEngine::default();
    learn(&mut engine, 0, SourceId(3), 7, 2);
    learn(&mut engine, 1, SourceId(4), 7, 1);

    engine.clear_slot(1);
    let after_once = (engine.live_len(), engine.bindings());
    engine.clear_slot(1);
    assert_eq!((engine.live_len(), engine.bindings()), after_once);
}

#[test]
fn smoothing_filters_the_control_before_the_write() {
    let mut host = DummyHost::default().with_module(7, &[0.0]);
    let config: EngineConfig =
        serde_json::from_value(serde_json::json!({"capacity": 8, "smoothingMs": 5.0})).unwrap();
    let mut engine = MappingEngine::new(config);

    learn(&mut engine, 0, SourceId(3), 7, 0);
    engine.tick(&mut host, DT); // seed from 0.0

    // The filter was seeded by the bind, so a step input approaches its
    // target instead of jumping.
    engine.handle_source_event(SourceId(3), 1.0);
    engine.tick(&mut host, DT);
    let first = host.module(7).params[0];
    assert!(first > 0.0 && first < 0.1, "first write {first} not smoothed");

    for _ in 0..2_000 {
        engine.tick(&mut host, DT);
    }
    assert!(host.module(7).params[0] > 0.99);
}

#[test]
fn batch_learning_walks_the_table_with_auto_advance() {
    let config = EngineConfig {
        capacity: 8,
        smoothing_ms: 0.0,
        learn: LearnConfig {
            auto_advance: true,
            ..LearnConfig::default()
        },
    };
    let mut engine = MappingEngine::new(config);

    engine.enable_learn(0);
    engine.handle_source_event(SourceId(1), 0.0);
    engine.handle_target_touched(7, 0);
    assert_eq!(engine.learning_slot(), Some(1));

    engine.handle_source_event(SourceId(2), 0.0);
    engine.handle_target_touched(7, 1);
    assert_eq!(engine.learning_slot(), Some(2));

    engine.disable_learn();
    assert_eq!(engine.learning_slot(), None);
    assert_eq!(engine.live_len(), 3);
}
