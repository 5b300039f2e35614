//! The TCP layer abstraction.
//!
//! Offers the segment processing of a single connection: the state machine that consumes incoming
//! segments, the output engine that decides what to send next, the timers and congestion control.
//! Demultiplexing segments onto connections is left to the user, as is moving segments to and
//! from the network.
//!
//! The main difference to other protocol engines is that many incoming events *require*
//! soliciting an answer such as an ACK for received data. These are produced immediately, in the
//! same call, and handed to the [`SegmentSink`]. A sink is allowed to drop them. Dropping outgoing
//! segments potentially starves the remote of ACKs and window updates, leading to inefficient
//! communication but not catastrophic failure; the retransmission timer recovers from it.
//!
//! ## Structure
//!
//! The [`Connection`] is the control block. It stores sequence variables, the congestion window
//! and round trip estimates, nothing else. Every service it needs is handed in with each call as
//! part of an [`Io`]:
//!
//! * a [`TimerService`] for the five named timers,
//! * a [`SegmentSink`] receiving outgoing segments,
//! * the [`SendBuffer`] and [`RecvBuffer`] byte streams of the user,
//! * a [`Reassembly`] queue for out-of-order data,
//! * and a [`Lifecycle`] observer notified of closes and accepts.
//!
//! The [`io`] module has simple in-memory implementations of all of them.
//!
//! [`Connection`]: struct.Connection.html
//! [`Io`]: io/struct.Io.html
//! [`TimerService`]: timer/trait.TimerService.html
//! [`SegmentSink`]: io/trait.SegmentSink.html
//! [`SendBuffer`]: io/trait.SendBuffer.html
//! [`RecvBuffer`]: io/trait.RecvBuffer.html
//! [`Reassembly`]: io/trait.Reassembly.html
//! [`Lifecycle`]: io/trait.Lifecycle.html
//! [`io`]: io/index.html
//!
//! Unlike standard stacks where state and user must be assumed to be in different protection
//! domains and which manage their state opaquely, it poses no problem for this library to allow
//! inspection of internal state. The accessors of `Connection` expose sequence variables, the
//! congestion window, the SACK scoreboard and the statistic counters.
//!
//! ## Creating a connection
//!
//! An active open calls [`Connection::connect`] with an initial sequence number, preferably one
//! from an [`IsnGenerator`]. A passive open calls [`Connection::listen`] and then feeds segments
//! to [`Connection::input`]. A listening connection accepts a single handshake; the handler of
//! the [`Lifecycle::on_half_open_accept`] notification is expected to reserve another one.
//!
//! [`Connection::connect`]: struct.Connection.html#method.connect
//! [`Connection::listen`]: struct.Connection.html#method.listen
//! [`Connection::input`]: struct.Connection.html#method.input
//! [`IsnGenerator`]: struct.IsnGenerator.html
//! [`Lifecycle::on_half_open_accept`]: io/trait.Lifecycle.html#tymethod.on_half_open_accept
//!
//! ## Deviations
//!
//! A segment arriving in `Closed` state is answered with a reset unless it carried one itself.
//! Resets should *never* be answered with a reset. RFC793 is clear about this [in section Reset
//! Generation](https://tools.ietf.org/html/rfc793#page-36):
//!
//! > 1.  If the connection does not exist (CLOSED) then a reset is sent in response to any
//! incoming segment except another reset.
//!
//! `TIME_WAIT` ignores resets altogether (RFC 1337) instead of closing early.
//!
//! Data sent in a SYN is not delivered before the handshake completes. It is trimmed and the peer
//! retransmits it.
mod config;
pub mod congestion;
mod connection;
mod error;
mod input;
pub mod io;
mod isn;
mod output;
mod rtt;
mod sack;
mod stats;
mod timeout;
pub mod timer;

#[cfg(test)]
mod tests;

pub use config::{
    Algorithm,
    Config,
    ConfigError,
    EcnMode};

pub use connection::{
    Connection,
    Receive,
    Send,
    State};

pub use error::{
    DropReason,
    TransmitError,
    UserError};

pub use io::{
    Events,
    InSegment,
    Io,
    Outbox,
    RecvQueue,
    SendQueue,
    Transmitted};

pub use isn::{
    Flow,
    IsnGenerator};

pub use rtt::RttEstimator;

pub use sack::{
    Hole,
    SackReport,
    Scoreboard};

pub use stats::Stats;

pub use timer::{
    Timer,
    TimerService,
    TimerTable};
