pub use crate::primitives::{Epoch, Slot};

pub const GENESIS_SLOT: Slot = 0;
pub const GENESIS_EPOCH: Epoch = 0;
pub const FAR_FUTURE_EPOCH: Epoch = u64::max_value();

pub const JUSTIFICATION_BITS_LENGTH: usize = 4;
pub type JustificationBitsLength = typenum::U4;

// Participation flag indices. A participation byte holds at most these three
// bits; the rest must stay zero.
pub const TIMELY_SOURCE_FLAG_INDEX: u8 = 0;
pub const TIMELY_TARGET_FLAG_INDEX: u8 = 1;
pub const TIMELY_HEAD_FLAG_INDEX: u8 = 2;

pub const PARTICIPATION_FLAG_INDICES: [u8; 3] = [
    TIMELY_SOURCE_FLAG_INDEX,
    TIMELY_TARGET_FLAG_INDEX,
    TIMELY_HEAD_FLAG_INDEX,
];
