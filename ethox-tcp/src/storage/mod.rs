//! Storage used by the connection engine.
//!
//! The only structure here is the queue of out-of-order segments. Byte-stream buffers of the user
//! live in [`layer::tcp::io`] since they are interfaces first and storage second.
//!
//! [`layer::tcp::io`]: ../layer/tcp/io/index.html
mod reassembly;

pub use self::reassembly::{
    Reassembled,
    SegmentQueue};
