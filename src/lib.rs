//! A bounded buffer shared by one producer and one consumer thread.
//!
//! [`BoundedBuffer`] blocks producers while it is full and consumers while
//! it is empty. Every blocking wait and every pacing sleep watches a
//! [`CancelToken`], so [`Driver::shutdown`] can stop both tasks cleanly.

pub mod buffer;
pub mod cancel;
pub mod config;
pub mod consumer;
pub mod driver;
pub mod error;
pub mod event;
pub mod locks;
pub mod producer;
pub mod trace;

pub use buffer::BoundedBuffer;
pub use cancel::CancelToken;
pub use config::Config;
pub use consumer::{Consumer, Tally, Totals};
pub use driver::{Driver, Report};
pub use error::{AddError, BufferError, DriverError};
pub use event::Event;
pub use producer::Producer;
