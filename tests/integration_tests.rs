use std::any::Any;
use std::sync::{Arc, Mutex};
use std::thread;
use zzparse::event::{Ability, School};
use zzparse::modules::{CastEfficiency, CastEfficiencyConfig, Combatants, IronFur};
use zzparse::stats::{Metric, MetricCheck};
use zzparse::*;

const PLAYER: u64 = 1;
const BOSS: u64 = 99;
const BUFF: u32 = spells::IRONFUR;

fn melee(timestamp: i64, amount: i64) -> Event {
    Event::new(
        timestamp,
        EventType::Damage,
        Ability::new(1).with_school(School::PHYSICAL),
    )
    .with_source(BOSS)
    .with_target(PLAYER)
    .with_amount(amount)
}

fn buff(timestamp: i64, kind: EventType) -> Event {
    Event::new(timestamp, kind, Ability::new(BUFF)).with_target(PLAYER)
}

fn cast(timestamp: i64, ability: u32) -> Event {
    Event::new(timestamp, EventType::Cast, Ability::new(ability)).with_source(PLAYER)
}

/// Counts physical hits taken, split by whether `combatants` reports the
/// buff as up. The split seen at finalize is kept in `finalized`.
#[derive(Default)]
struct BuffedHits {
    with_buff: u64,
    without_buff: u64,
    finalized: Option<(u64, u64)>,
}

impl AnalysisModule for BuffedHits {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("buffed_hits")
            .depends_on("combatants")
            .subscribe(EventType::Damage, Relation::ToPlayer)
            .with_hook(LifecyclePhase::Finalize)
    }

    fn on_event(
        &mut self,
        event: &Event,
        deps: &Dependencies<'_>,
        _context: &AnalysisContext,
    ) -> Result<(), ModuleError> {
        let combatants = deps.get::<Combatants>("combatants")?;
        if combatants.has_buff(BUFF, event.timestamp) {
            self.with_buff += 1;
        } else {
            self.without_buff += 1;
        }
        Ok(())
    }

    fn on_finalize(
        &mut self,
        _deps: &Dependencies<'_>,
        _context: &AnalysisContext,
    ) -> Result<(), ModuleError> {
        self.finalized = Some((self.with_buff, self.without_buff));
        Ok(())
    }

    fn metrics(&self, _context: &AnalysisContext) -> Vec<Metric> {
        vec![
            Metric::new("with_buff", "Hits with buff", self.with_buff as f64),
            Metric::new("without_buff", "Hits without buff", self.without_buff as f64),
        ]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Fails on every damage event.
struct Flaky;

impl AnalysisModule for Flaky {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("flaky").subscribe(EventType::Damage, Relation::Any)
    }

    fn on_event(
        &mut self,
        _event: &Event,
        _deps: &Dependencies<'_>,
        _context: &AnalysisContext,
    ) -> Result<(), ModuleError> {
        Err(ModuleError::failed("unparseable hit"))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Fails its initialize hook.
struct BrokenSetup;

impl AnalysisModule for BrokenSetup {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("broken_setup")
            .depends_on("combatants")
            .with_hook(LifecyclePhase::Initialize)
    }

    fn on_initialize(
        &mut self,
        _deps: &Dependencies<'_>,
        _context: &AnalysisContext,
    ) -> Result<(), ModuleError> {
        Err(ModuleError::failed("no talents loaded"))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Cancels the shared token after seeing `after` events.
struct Canceller {
    token: CancellationToken,
    after: usize,
    seen: usize,
}

impl AnalysisModule for Canceller {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("canceller").subscribe(EventType::Damage, Relation::Any)
    }

    fn on_event(
        &mut self,
        _event: &Event,
        _deps: &Dependencies<'_>,
        _context: &AnalysisContext,
    ) -> Result<(), ModuleError> {
        self.seen += 1;
        if self.seen == self.after {
            self.token.cancel();
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn guardian_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register_default::<IronFur>().unwrap();
    registry
        .register(|| Box::new(CastEfficiency::new(CastEfficiencyConfig::vengeance_demon_hunter())))
        .unwrap();
    registry.register(|| Box::new(Combatants::new())).unwrap();
    registry.register_default::<BuffedHits>().unwrap();
    registry
}

fn guardian_stream() -> EventStream {
    let mut events = Vec::new();
    for second in 0..60 {
        let timestamp = second * 1_000;
        if second % 5 == 0 {
            events.push(cast(timestamp, spells::IRONFUR));
        }
        events.push(melee(timestamp + 500, 1_000 + second));
    }
    EventStream::new(events).unwrap()
}

/// Buff applied at 0, hit at 5, buff removed at 10.
#[test]
fn test_hit_inside_buff_window() {
    let mut registry = ModuleRegistry::new();
    registry.register_default::<BuffedHits>().unwrap();
    registry.register(|| Box::new(Combatants::new())).unwrap();
    let plan = registry.build().unwrap();

    let stream = EventStream::new(vec![
        buff(0, EventType::ApplyBuff),
        melee(5, 100),
        buff(10, EventType::RemoveBuff),
    ])
    .unwrap();
    let context = AnalysisContext::for_stream(PLAYER, &stream);

    let run = Dispatcher::new(&plan).run(&stream, &context).unwrap();
    let hits = run.module::<BuffedHits>("buffed_hits").unwrap();
    assert_eq!(hits.finalized, Some((1, 0)));
    let combatants = run.module::<Combatants>("combatants").unwrap();
    assert_eq!(combatants.buff_timeline(BUFF).unwrap().query(5), 1);
    assert_eq!(combatants.buff_uptime(BUFF), 10);
}

#[test]
fn test_dependencies_run_first() {
    let plan = guardian_registry().build().unwrap();
    let order: Vec<&str> = plan.order().map(ModuleId::as_str).collect();
    assert_eq!(
        order,
        vec!["combatants", "iron_fur", "cast_efficiency", "buffed_hits"]
    );
}

#[test]
fn test_guardian_report() {
    let plan = guardian_registry().build().unwrap();
    let stream = guardian_stream();
    let context = AnalysisContext::for_stream(PLAYER, &stream);

    let report = analyze(&plan, &stream, &context).unwrap();
    assert_eq!(report.events_delivered, stream.len());

    // One cast every 5s lasting 6s covers every hit.
    let iron_fur = report.module("iron_fur").unwrap();
    assert_eq!(iron_fur.metric("hits_with_ironfur"), Some(60.0));
    assert_eq!(iron_fur.metric("hits_without_ironfur"), Some(0.0));
    assert_eq!(iron_fur.metric("damage_mitigated"), Some(1.0));
    assert_eq!(
        iron_fur.evaluation("damage_mitigated").unwrap().severity,
        Severity::Ok
    );
    assert!(!iron_fur.incomplete);
    assert_eq!(
        iron_fur.snapshot.get::<Vec<u64>>("hits_per_stack"),
        Some(vec![0, 49, 11])
    );
}

#[test]
fn test_poor_ironfur_usage_is_flagged() {
    let plan = guardian_registry().build().unwrap();
    let mut events = vec![cast(0, spells::IRONFUR)];
    for second in 1..=10 {
        events.push(melee(second * 1_000, 1_000));
    }
    let stream = EventStream::new(events).unwrap();
    let context = AnalysisContext::for_stream(PLAYER, &stream);

    let report = analyze(&plan, &stream, &context).unwrap();
    let findings = report.findings();
    // Hits at 1..=5s are covered: half the damage.
    assert_eq!(
        report.module("iron_fur").unwrap().metric("damage_mitigated"),
        Some(0.5)
    );
    assert_eq!(report.worst_severity(), Severity::Major);
    assert!(findings
        .iter()
        .any(|(module, e)| module.as_str() == "iron_fur" && e.severity == Severity::Major));
}

#[test]
fn test_failing_handler_is_isolated() {
    let mut registry = ModuleRegistry::new();
    registry.register(|| Box::new(Flaky)).unwrap();
    registry.register(|| Box::new(Combatants::new())).unwrap();
    registry.register_default::<BuffedHits>().unwrap();
    let plan = registry.build().unwrap();

    let stream = EventStream::new(vec![
        buff(0, EventType::ApplyBuff),
        melee(5, 100),
        buff(10, EventType::RemoveBuff),
        melee(15, 100),
    ])
    .unwrap();
    let context = AnalysisContext::for_stream(PLAYER, &stream);

    let run = Dispatcher::new(&plan).run(&stream, &context).unwrap();
    let hits = run.module::<BuffedHits>("buffed_hits").unwrap();
    assert_eq!(hits.with_buff, 1);
    assert_eq!(hits.without_buff, 1);

    assert_eq!(run.faults().len(), 2);
    assert_eq!(run.faults()[0].module.as_str(), "flaky");
    assert_eq!(run.faults()[0].index, 1);
    assert_eq!(run.faults()[1].timestamp, 15);

    let report = run.report(&context);
    assert!(report.module("flaky").unwrap().incomplete);
    assert!(!report.module("buffed_hits").unwrap().incomplete);
    assert_eq!(report.module("buffed_hits").unwrap().metric("with_buff"), Some(1.0));
}

#[test]
fn test_initialize_failure_names_module_and_phase() {
    let mut registry = ModuleRegistry::new();
    registry.register(|| Box::new(BrokenSetup)).unwrap();
    registry.register(|| Box::new(Combatants::new())).unwrap();
    let plan = registry.build().unwrap();
    let stream = guardian_stream();
    let context = AnalysisContext::for_stream(PLAYER, &stream);

    let mut dispatcher = Dispatcher::new(&plan);
    let err = dispatcher.run(&stream, &context).err().unwrap();
    let (module, phase) = err.failed_module().unwrap();
    assert_eq!(module.as_str(), "broken_setup");
    assert_eq!(phase, LifecyclePhase::Initialize);
    assert!(err.to_string().contains("no talents loaded"));
    assert_eq!(dispatcher.state(), DispatchState::Initializing);
}

#[test]
fn test_cancellation_stops_delivery() {
    let token = CancellationToken::new();
    let shared = token.clone();
    let mut registry = ModuleRegistry::new();
    registry
        .register(move || {
            Box::new(Canceller {
                token: shared.clone(),
                after: 2,
                seen: 0,
            })
        })
        .unwrap();
    let plan = registry.build().unwrap();

    let stream = EventStream::new((0..5).map(|i| melee(i * 100, 1)).collect()).unwrap();
    let context = AnalysisContext::for_stream(PLAYER, &stream);

    let err = Dispatcher::new(&plan)
        .run_with_cancellation(&stream, &context, &token)
        .err()
        .unwrap();
    assert_eq!(
        err,
        AnalysisError::Cancelled {
            phase: LifecyclePhase::Event,
            events_delivered: 2,
        }
    );
}

#[test]
fn test_parallel_runs_match_sequential() {
    let plan = guardian_registry().build().unwrap();
    let stream = guardian_stream();
    let context = AnalysisContext::for_stream(PLAYER, &stream).with_talent(spells::RAZOR_SPIKES);

    let expected = analyze(&plan, &stream, &context).unwrap();

    let reports: Vec<AnalysisReport> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let plan = plan.clone();
                let stream = stream.clone();
                let context = &context;
                scope.spawn(move || analyze(&plan, &stream, context).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for report in reports {
        assert_eq!(report, expected);
    }
}

#[test]
fn test_repeated_runs_are_identical() {
    let stream = guardian_stream();
    let context = AnalysisContext::for_stream(PLAYER, &stream);

    let first = analyze(&guardian_registry().build().unwrap(), &stream, &context)
        .unwrap()
        .to_json()
        .unwrap();
    for _ in 0..3 {
        let again = analyze(&guardian_registry().build().unwrap(), &stream, &context)
            .unwrap()
            .to_json()
            .unwrap();
        assert_eq!(again, first);
    }
}

#[test]
fn test_mutual_dependency_is_rejected() {
    struct Node(&'static str, &'static str);

    impl AnalysisModule for Node {
        fn descriptor(&self) -> ModuleDescriptor {
            ModuleDescriptor::new(self.0).depends_on(self.1)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    let mut registry = ModuleRegistry::new();
    registry.register(|| Box::new(Node("a", "b"))).unwrap();
    registry.register(|| Box::new(Node("b", "a"))).unwrap();

    match registry.build() {
        Err(AnalysisError::CyclicDependency { path }) => {
            assert_eq!(path.first(), path.last());
            assert!(path.contains(&ModuleId::from_str("a")));
            assert!(path.contains(&ModuleId::from_str("b")));
        }
        Err(other) => panic!("Expected CyclicDependency, got {:?}", other),
        Ok(_) => panic!("Expected CyclicDependency"),
    }
}

#[test]
fn test_subset_plan_pulls_in_dependencies() {
    let plan = guardian_registry().build_for(&["iron_fur"]).unwrap();
    let order: Vec<&str> = plan.order().map(ModuleId::as_str).collect();
    assert_eq!(order, vec!["combatants", "iron_fur"]);
}

#[test]
fn test_stream_and_context_from_json() {
    let stream = EventStream::from_json(
        r#"[
            {"timestamp": 0, "type": "cast", "source": 1, "ability": {"guid": 192081}},
            {"timestamp": 1000, "type": "damage", "source": 99, "target": 1,
             "ability": {"guid": 1, "name": "Melee", "school": 1}, "amount": 800, "absorbed": 200},
            {"timestamp": 9000, "type": "damage", "source": 99, "target": 1,
             "ability": {"guid": 1, "name": "Melee", "school": 1}, "amount": 1000}
        ]"#,
    )
    .unwrap();
    let context = AnalysisContext::from_json(
        r#"{"player": {"id": 1, "traits": {"200399": 6}}, "fight": {"start": 0, "end": 10000}}"#,
    )
    .unwrap();

    let mut registry = ModuleRegistry::new();
    registry.register(|| Box::new(Combatants::new())).unwrap();
    registry.register_default::<IronFur>().unwrap();
    let run = Dispatcher::new(&registry.build().unwrap())
        .run(&stream, &context)
        .unwrap();

    // 6 ranks: 6s + 3s, so the hit at 9s just misses.
    let iron_fur = run.module::<IronFur>("iron_fur").unwrap();
    assert_eq!(iron_fur.duration(), 9_000);
    assert_eq!(iron_fur.with_ironfur().damage, 1_000);
    assert_eq!(iron_fur.without_ironfur().damage, 1_000);
}

#[test]
fn test_custom_checks_reach_report() {
    struct Gate(Arc<Mutex<u32>>);

    impl AnalysisModule for Gate {
        fn descriptor(&self) -> ModuleDescriptor {
            ModuleDescriptor::new("gate").subscribe(EventType::Death, Relation::ToPlayer)
        }

        fn on_event(
            &mut self,
            _event: &Event,
            _deps: &Dependencies<'_>,
            _context: &AnalysisContext,
        ) -> Result<(), ModuleError> {
            *self.0.lock().unwrap() += 1;
            Ok(())
        }

        fn checks(&self, _context: &AnalysisContext) -> Vec<MetricCheck> {
            let deaths = *self.0.lock().unwrap();
            vec![MetricCheck::when("deaths", f64::from(deaths))
                .is_greater_than(0.0)
                .major(0.0)]
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    let deaths = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&deaths);
    let mut registry = ModuleRegistry::new();
    registry
        .register(move || Box::new(Gate(Arc::clone(&counter))))
        .unwrap();
    let plan = registry.build().unwrap();

    let stream = EventStream::new(vec![
        Event::new(0, EventType::Death, Ability::new(0)).with_target(BOSS),
        Event::new(10, EventType::Death, Ability::new(0)).with_target(PLAYER),
    ])
    .unwrap();
    let context = AnalysisContext::for_stream(PLAYER, &stream);

    let report = analyze(&plan, &stream, &context).unwrap();
    assert_eq!(*deaths.lock().unwrap(), 1);
    assert_eq!(report.worst_severity(), Severity::Major);
}
