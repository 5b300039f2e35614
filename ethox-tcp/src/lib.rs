//! A user-space TCP segment processing and congestion control engine.
//!
//! ## Table of contents
//!
//! This is also a recommended reading order but feel free to skip ahead, each chapter tries to be
//! somewhat self-contained.
//!
//! 1. [Highlights](#highlights)
//! 2. [Design](#design-and-relevant-core-concepts)
//! 3. [The wire module](wire/index.html)
//!    1. [Sequence numbers and flags](wire/struct.TcpSeqNumber.html)
//!    1. [The option block](wire/struct.TcpOptions.html)
//! 4. [The tcp layer](layer/tcp/index.html)
//!    1. [The control block](layer/tcp/struct.Connection.html)
//!    1. [Congestion control](layer/tcp/congestion/index.html)
//!    1. [Timers](layer/tcp/timer/index.html)
//! 5. Internals
//!    1. [The storage module](storage/index.html)
//!    2. [Time keeping](time/index.html)
//!
//! ## Highlights
//!
//! * A complete TCP state machine with header prediction, RFC 5961 challenge ACKs and PAWS.
//! * NewReno and CUBIC congestion control, selectable per connection.
//! * SACK loss recovery with proportional rate reduction and DSACK reporting.
//! * ECN negotiation and reaction.
//! * Detection and rollback of spurious retransmission timeouts.
//!
//! ## Design and relevant core concepts
//!
//! The engine is a pure state machine over one connection control block. It never schedules
//! anything by itself, never allocates buffers for payload and never blocks. Everything that
//! reaches beyond the control block is a narrow capability trait: the timer service arms and
//! cancels named timers, the segment sink hands finished headers and payload to the wire, byte
//! stream buffers hold the user data and the reassembly service orders out-of-sequence data. All
//! of these are passed in for each call, bundled in [`Io`].
//!
//! Processing is run to completion. A call to [`Connection::input`] or [`Connection::on_timer`]
//! fully applies its effects before returning, which makes it trivial to drive many connections
//! from a single thread without any locking.
//!
//! Time is counted in ticks of one millisecond. The caller supplies the current [`Instant`] with
//! each call and the engine derives its timestamps and idle detection from it.
//!
//! [`Io`]: layer/tcp/struct.Io.html
//! [`Connection::input`]: layer/tcp/struct.Connection.html#method.input
//! [`Connection::on_timer`]: layer/tcp/struct.Connection.html#method.on_timer
//! [`Instant`]: time/struct.Instant.html
#![warn(missing_docs)]
#![warn(unreachable_pub)]

// tests should be able to use `std`
#![cfg_attr(all(
    not(feature = "std"),
    not(test)),
no_std)]

extern crate alloc;

#[macro_use] mod macros;
pub mod layer;
pub mod storage;
pub mod time;
pub mod wire;
