//! Cycle detection example: Demonstrating error handling for circular dependencies
//!
//! This example shows:
//! - What happens when modules depend on each other in a cycle
//! - How the registry detects and reports cycles before any run

use std::any::Any;
use zzparse::*;

/// A module that only declares a dependency.
struct Linked {
    id: &'static str,
    needs: &'static str,
}

impl AnalysisModule for Linked {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new(self.id).depends_on(self.needs)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn main() {
    let mut registry = ModuleRegistry::new();

    println!("=== Setting up circular dependencies ===\n");

    for (id, needs) in [("mitigation", "buffs"), ("buffs", "casts"), ("casts", "mitigation")] {
        registry.register(move || Box::new(Linked { id, needs })).unwrap();
        println!("{} depends on {}", id, needs);
    }

    println!("\n=== Attempting to build a plan (should detect cycle) ===\n");

    match registry.build() {
        Err(AnalysisError::CyclicDependency { path }) => {
            println!("✓ Cycle detected successfully!");
            let names: Vec<&str> = path.iter().map(ModuleId::as_str).collect();
            println!("  Cycle path: {}", names.join(" -> "));
        }
        Err(e) => println!("✗ Unexpected error: {}", e),
        Ok(_) => println!("✗ Cycle was not detected!"),
    }
}
