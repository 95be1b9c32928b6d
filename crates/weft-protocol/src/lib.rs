pub mod frames;
pub mod methods;

pub use frames::{ErrorShape, EventFrame, InboundFrame, ReqFrame, ResFrame, StateVersion};
