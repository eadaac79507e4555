//! Deterministic simulation testing.
//!
//! - `SimulatedIo`: in-memory storage with seeded fault injection and
//!   crash images (only synced bytes survive)
//! - `Simulator`: seeded random workloads checked against a `BTreeMap`
//!   model and the consistency checker
//!
//! Given the same seed, a run performs exactly the same operations and
//! sees exactly the same faults.
//!
//! # Usage
//!
//! ```
//! use b3store::StoreConfig;
//! use b3store::Store;
//! use b3store::simulation::{SimulatedIo, Simulator, SimulatorConfig};
//!
//! let io = SimulatedIo::new();
//! let config = StoreConfig::new(4, 4, 8);
//! let mut store = Store::create_with_io(io.clone(), config).unwrap();
//!
//! let mut sim = Simulator::new(SimulatorConfig::new(42).with_key_space(100));
//! let result = sim.run(&mut store, &io, 200);
//! assert!(result.passed());
//! ```

mod simulator;
mod storage;

pub use simulator::{InvariantViolation, SimulationResult, Simulator, SimulatorConfig};
pub use storage::{FaultConfig, SimulatedIo, SimulatedIoStats};
