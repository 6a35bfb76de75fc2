//! Run stream protocol: byte chunks → frames → typed run events.

pub mod event;
pub mod frame;

pub use event::RunEvent;
pub use frame::{Frame, FrameDecoder};
