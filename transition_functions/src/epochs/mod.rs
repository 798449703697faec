pub mod process_epoch;
pub mod rewards_and_penalties;
