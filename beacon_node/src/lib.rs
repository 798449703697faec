//! Ties the consensus crates together: the lock-owning state machine, the
//! slot timer, the block producer, the finality checkpoint store and the
//! node facade.

pub mod checkpoint_store;
pub mod clock;
pub mod node;
pub mod producer;
pub mod state_machine;

pub use crate::checkpoint_store::CheckpointStore;
pub use crate::clock::{ManualClock, SlotTimer, SystemClock, WallClock};
pub use crate::node::Node;
pub use crate::producer::{produce_block, BlockMaterials};
pub use crate::state_machine::StateMachine;
