//! Ironfur example: analyzing a Guardian Druid tank log
//!
//! This example shows:
//! - Registering built-in modules with dependencies
//! - Replaying a synthetic event stream
//! - Reading metrics and findings from the report
//!
//! Run with `RUST_LOG=zzparse=debug` to see the dispatcher at work.

use tracing_subscriber::EnvFilter;
use zzparse::event::{Ability, School};
use zzparse::modules::{Combatants, IronFur};
use zzparse::*;

const PLAYER: u64 = 1;
const BOSS: u64 = 99;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut registry = ModuleRegistry::new();
    registry.register(|| Box::new(IronFur::default())).unwrap();
    registry.register(|| Box::new(Combatants::new())).unwrap();
    let plan = registry.build().unwrap();

    println!("=== Execution order ===\n");
    for id in plan.order() {
        println!("  {}", id);
    }

    // A 40s pull: Ironfur every 8s, a melee swing every 1.5s and
    // Guardian of Elune up for the first 10s.
    let mut events = vec![
        Event::new(0, EventType::ApplyBuff, Ability::new(spells::GUARDIAN_OF_ELUNE))
            .with_target(PLAYER),
        Event::new(10_000, EventType::RemoveBuff, Ability::new(spells::GUARDIAN_OF_ELUNE))
            .with_target(PLAYER),
    ];
    for timestamp in (0..40_000).step_by(8_000) {
        events.push(
            Event::new(timestamp, EventType::Cast, Ability::new(spells::IRONFUR))
                .with_source(PLAYER),
        );
    }
    for timestamp in (250..40_000).step_by(1_500) {
        events.push(
            Event::new(timestamp, EventType::Damage, Ability::new(1).with_school(School::PHYSICAL))
                .with_source(BOSS)
                .with_target(PLAYER)
                .with_amount(12_000)
                .with_absorbed(1_500),
        );
    }
    events.sort_by_key(|e| e.timestamp);
    let stream = EventStream::new(events).unwrap();
    let context =
        AnalysisContext::for_stream(PLAYER, &stream).with_trait(spells::URSOCS_ENDURANCE, 2);

    let report = analyze(&plan, &stream, &context).unwrap();

    println!("\n=== Ironfur ===\n");
    if let Some(iron_fur) = report.module(IronFur::ID) {
        for metric in &iron_fur.metrics {
            println!("  {:<32} {:.3}", metric.label, metric.value);
        }
    }

    println!("\n=== Findings ===\n");
    let findings = report.findings();
    if findings.is_empty() {
        println!("  ✓ Nothing to improve");
    }
    for (module, evaluation) in findings {
        println!(
            "  [{:?}] {}: {} = {:.3} (threshold {:.2})",
            evaluation.severity,
            module,
            evaluation.key,
            evaluation.value,
            evaluation.threshold.value
        );
    }
}
