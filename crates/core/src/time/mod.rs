pub mod slot;
pub mod tw_market;

pub use slot::TimeSlot;
