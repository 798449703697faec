use core::marker::PhantomData;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use typenum::marker_traits::Unsigned;
use types::config::Config;
use types::primitives::{Epoch, Slot, UnixSeconds};

/// The slot timer's only interaction with the outside world. Parameterized
/// so tests can drive time by hand.
pub trait WallClock: Send + Sync {
    fn now_unix(&self) -> UnixSeconds;
}

pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_unix(&self) -> UnixSeconds {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_secs())
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Default)]
pub struct ManualClock {
    now: Mutex<UnixSeconds>,
}

impl ManualClock {
    pub fn new(now: UnixSeconds) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: UnixSeconds) {
        *self.now.lock() = now;
    }
}

impl WallClock for ManualClock {
    fn now_unix(&self) -> UnixSeconds {
        *self.now.lock()
    }
}

/// Maps wall time onto slots and epochs. Before genesis the current slot
/// is 0.
pub struct SlotTimer<C: Config> {
    genesis_time: UnixSeconds,
    clock: Arc<dyn WallClock>,
    phantom: PhantomData<C>,
}

impl<C: Config> SlotTimer<C> {
    pub fn new(genesis_time: UnixSeconds, clock: Arc<dyn WallClock>) -> Self {
        Self {
            genesis_time,
            clock,
            phantom: PhantomData,
        }
    }

    pub fn is_before_genesis(&self) -> bool {
        self.clock.now_unix() < self.genesis_time
    }

    pub fn current_slot(&self) -> Slot {
        let now = self.clock.now_unix();
        if now < self.genesis_time {
            return 0;
        }
        (now - self.genesis_time) / C::seconds_per_slot()
    }

    pub fn current_epoch(&self) -> Epoch {
        self.current_slot() / C::SlotsPerEpoch::to_u64()
    }

    pub fn epoch_start_slot(epoch: Epoch) -> Slot {
        epoch * C::SlotsPerEpoch::to_u64()
    }

    pub fn is_first_slot_of_epoch(slot: Slot) -> bool {
        slot % C::SlotsPerEpoch::to_u64() == 0
    }

    pub fn slots_since_epoch_start(&self) -> Slot {
        let slot = self.current_slot();
        slot - Self::epoch_start_slot(slot / C::SlotsPerEpoch::to_u64())
    }
}
