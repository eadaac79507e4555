//! Simulated in-memory storage for deterministic testing.
//!
//! `SimulatedIo` implements `PageIo` over two byte images:
//! - the volatile image, which every write and length change updates
//! - the durable image, which `sync` replaces with the volatile one
//!
//! `crash_image` builds a fresh handle over the durable image, which is
//! what a reopened process would see after power loss. Faults (read, write
//! and sync errors, bit flips on read) are injected from a seeded RNG so a
//! failing run can be replayed exactly.
//!
//! Handles are cheap clones sharing one state, so a test can keep a handle
//! to inspect or reconfigure the storage after giving another to the store.

use std::cell::RefCell;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::storage::{PageIo, StorageError};

/// Configuration for fault injection.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FaultConfig {
    /// Probability of a read error (0.0 - 1.0).
    pub read_error_rate: f64,
    /// Probability of a write error (0.0 - 1.0).
    pub write_error_rate: f64,
    /// Probability of a sync error (0.0 - 1.0).
    pub sync_error_rate: f64,
    /// Probability that a read returns data with a flipped bit (0.0 - 1.0).
    pub corruption_rate: f64,
}

impl FaultConfig {
    /// Low error rates for stress runs. No silent corruption.
    #[must_use]
    pub const fn low_faults() -> Self {
        Self {
            read_error_rate: 0.001,
            write_error_rate: 0.001,
            sync_error_rate: 0.001,
            corruption_rate: 0.0,
        }
    }

    /// High error rates.
    #[must_use]
    pub const fn high_faults() -> Self {
        Self {
            read_error_rate: 0.05,
            write_error_rate: 0.05,
            sync_error_rate: 0.05,
            corruption_rate: 0.0,
        }
    }
}

/// Counters for simulated storage operations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedIoStats {
    pub reads: u64,
    pub writes: u64,
    pub syncs: u64,
    pub injected_read_errors: u64,
    pub injected_write_errors: u64,
    pub injected_sync_errors: u64,
    pub corrupted_reads: u64,
}

#[derive(Debug)]
struct State {
    volatile: Vec<u8>,
    durable: Vec<u8>,
    fault_config: FaultConfig,
    rng: StdRng,
    stats: SimulatedIoStats,
}

impl State {
    fn should_inject_fault(&mut self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        self.rng.random::<f64>() < rate
    }
}

/// In-memory `PageIo` with crash simulation and fault injection.
#[derive(Debug, Clone)]
pub struct SimulatedIo {
    state: Rc<RefCell<State>>,
}

impl Default for SimulatedIo {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedIo {
    /// Empty storage without faults.
    #[must_use]
    pub fn new() -> Self {
        Self::with_faults(0, FaultConfig::default())
    }

    /// Empty storage injecting faults from an RNG seeded with `seed`.
    #[must_use]
    pub fn with_faults(seed: u64, fault_config: FaultConfig) -> Self {
        Self::from_image(Vec::new(), seed, fault_config)
    }

    fn from_image(image: Vec<u8>, seed: u64, fault_config: FaultConfig) -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                volatile: image.clone(),
                durable: image,
                fault_config,
                rng: StdRng::seed_from_u64(seed),
                stats: SimulatedIoStats::default(),
            })),
        }
    }

    /// Replace the fault configuration on every handle.
    pub fn set_fault_config(&self, config: FaultConfig) {
        self.state.borrow_mut().fault_config = config;
    }

    /// Operation counters.
    #[must_use]
    pub fn stats(&self) -> SimulatedIoStats {
        self.state.borrow().stats
    }

    /// Copy of the volatile image.
    #[must_use]
    pub fn image(&self) -> Vec<u8> {
        self.state.borrow().volatile.clone()
    }

    /// Independent storage holding only what was synced, without faults.
    /// Models a power loss.
    #[must_use]
    pub fn crash_image(&self) -> Self {
        let durable = self.state.borrow().durable.clone();
        Self::from_image(durable, 0, FaultConfig::default())
    }

    /// Independent storage holding every completed write, synced or not,
    /// without faults. Models a process crash: the OS keeps what it was given.
    #[must_use]
    pub fn process_crash_image(&self) -> Self {
        Self::from_image(self.image(), 0, FaultConfig::default())
    }

    /// Flip the bits in `mask` at byte `offset` of both images.
    pub fn corrupt(&self, offset: usize, mask: u8) {
        let mut state = self.state.borrow_mut();
        if let Some(byte) = state.volatile.get_mut(offset) {
            *byte ^= mask;
        }
        if let Some(byte) = state.durable.get_mut(offset) {
            *byte ^= mask;
        }
    }
}

impl PageIo for SimulatedIo {
    #[allow(clippy::cast_possible_truncation)]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        let mut state = self.state.borrow_mut();
        state.stats.reads += 1;

        let rate = state.fault_config.read_error_rate;
        if state.should_inject_fault(rate) {
            state.stats.injected_read_errors += 1;
            return Err(StorageError::InjectedFault(
                "simulated read error".to_string(),
            ));
        }

        let start = offset as usize;
        let available = state.volatile.len().saturating_sub(start);
        if available < buf.len() {
            return Err(StorageError::ShortRead {
                offset,
                expected: buf.len(),
                actual: available,
            });
        }
        buf.copy_from_slice(&state.volatile[start..start + buf.len()]);

        let rate = state.fault_config.corruption_rate;
        if !buf.is_empty() && state.should_inject_fault(rate) {
            state.stats.corrupted_reads += 1;
            let index = state.rng.random_range(0..buf.len());
            let bit = state.rng.random_range(0..8u8);
            buf[index] ^= 1 << bit;
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), StorageError> {
        let mut state = self.state.borrow_mut();
        state.stats.writes += 1;

        let rate = state.fault_config.write_error_rate;
        if state.should_inject_fault(rate) {
            state.stats.injected_write_errors += 1;
            return Err(StorageError::InjectedFault(
                "simulated write error".to_string(),
            ));
        }

        let start = offset as usize;
        let end = start + buf.len();
        if state.volatile.len() < end {
            state.volatile.resize(end, 0);
        }
        state.volatile[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn size(&self) -> Result<u64, StorageError> {
        Ok(self.state.borrow().volatile.len() as u64)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn set_len(&mut self, len: u64) -> Result<(), StorageError> {
        self.state.borrow_mut().volatile.resize(len as usize, 0);
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        let mut state = self.state.borrow_mut();
        state.stats.syncs += 1;

        let rate = state.fault_config.sync_error_rate;
        if state.should_inject_fault(rate) {
            state.stats.injected_sync_errors += 1;
            return Err(StorageError::InjectedFault(
                "simulated sync error".to_string(),
            ));
        }

        state.durable = state.volatile.clone();
        Ok(())
    }
}
