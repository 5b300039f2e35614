//! Tcp layer tests.
//!
//! Two connections are wired back to back, each with its own timer table, buffers and clock.
//! Segments only move when a test transfers them, which makes it easy to lose, hold back or
//! reorder them.
use crate::storage::SegmentQueue;
use crate::time::Instant;
use crate::wire::{TcpFlags, TcpOptions, TcpRepr, TcpSeqNumber, TcpTimestamp};

use super::config::Config;
use super::connection::{Connection, State};
use super::io::{Events, InSegment, Io, Outbox, RecvQueue, SendQueue, Transmitted};
use super::timer::{Timer, TimerService, TimerTable};

/// One side of a loopback connection together with its services.
pub(crate) struct Endpoint {
    pub(crate) conn: Connection,
    pub(crate) timers: TimerTable,
    pub(crate) outbox: Outbox,
    pub(crate) send: SendQueue,
    pub(crate) recv: RecvQueue,
    pub(crate) reassembly: SegmentQueue,
    pub(crate) events: Events,
    pub(crate) now: Instant,
}

/// A segment to port 80 with a fixed window.
pub(crate) fn segment(
    seq: TcpSeqNumber,
    ack: TcpSeqNumber,
    flags: TcpFlags,
    payload: &'static [u8],
) -> InSegment<'static> {
    InSegment {
        header: TcpRepr {
            src_port: 49152,
            dst_port: 80,
            seq_number: seq,
            ack_number: ack,
            flags,
            window_len: 8192,
            urgent_at: 0,
            options: TcpOptions::default(),
        },
        payload,
        ecn: Default::default(),
    }
}

impl Endpoint {
    pub(crate) fn new(config: Config, local_port: u16, remote_port: u16) -> Self {
        let now = Instant::from_millis(1000);
        Endpoint {
            conn: Connection::new(config, local_port, remote_port, now).unwrap(),
            timers: TimerTable::new(now),
            outbox: Outbox::default(),
            send: SendQueue::new(1 << 16),
            recv: RecvQueue::new(1 << 16),
            reassembly: SegmentQueue::new(16),
            events: Events::default(),
            now,
        }
    }

    pub(crate) fn with_recv_capacity(mut self, capacity: usize) -> Self {
        self.recv = RecvQueue::new(capacity);
        self
    }

    /// Two established connections, the client from sequence number 100, the server from 500.
    pub(crate) fn pair(config: Config) -> (Endpoint, Endpoint) {
        let mut client = Endpoint::new(config, 49152, 80);
        let mut server = Endpoint::new(config, 80, 49152);
        Endpoint::handshake(&mut client, &mut server);
        (client, server)
    }

    pub(crate) fn handshake(client: &mut Endpoint, server: &mut Endpoint) {
        server.conn.listen(TcpSeqNumber(500)).unwrap();
        client.connect(TcpSeqNumber(100));
        client.transfer_to(server);
        server.transfer_to(client);
        client.transfer_to(server);
        assert_eq!(client.conn.state(), State::Established);
        assert_eq!(server.conn.state(), State::Established);
    }

    pub(crate) fn with_io<R>(&mut self, f: impl FnOnce(&mut Connection, &mut Io<'_>) -> R) -> R {
        let Endpoint { conn, timers, outbox, send, recv, reassembly, events, now } = self;
        timers.update(*now);
        let mut io = Io {
            now: *now,
            timers,
            sink: outbox,
            send,
            recv,
            reassembly,
            events,
        };
        f(conn, &mut io)
    }

    pub(crate) fn input(&mut self, segment: InSegment<'_>) {
        self.with_io(|conn, io| conn.input(segment, io))
    }

    pub(crate) fn connect(&mut self, iss: TcpSeqNumber) {
        self.with_io(|conn, io| conn.connect(iss, io)).unwrap()
    }

    pub(crate) fn send(&mut self, data: &[u8]) -> usize {
        self.with_io(|conn, io| conn.send(data, io)).unwrap()
    }

    pub(crate) fn close(&mut self) {
        self.with_io(|conn, io| conn.close(io)).unwrap()
    }

    pub(crate) fn read_all(&mut self) -> Vec<u8> {
        let mut buffer = vec![0; self.recv.len()];
        let read = self.recv.read(&mut buffer);
        buffer.truncate(read);
        buffer
    }

    pub(crate) fn advance(&mut self, ticks: u32) {
        self.now = self.now.after_ticks(ticks);
        self.timers.update(self.now);
    }

    /// Run the handlers of all expired timers, returning them in order.
    pub(crate) fn fire(&mut self) -> Vec<Timer> {
        let mut fired = Vec::new();
        self.timers.update(self.now);
        while let Some(timer) = self.timers.pop_expired() {
            fired.push(timer);
            self.with_io(|conn, io| conn.on_timer(timer, io));
        }
        fired
    }

    /// Deliver all pending segments to the peer, returning how many there were.
    pub(crate) fn transfer_to(&mut self, peer: &mut Endpoint) -> usize {
        let mut count = 0;
        while let Some(segment) = self.outbox.pop() {
            peer.input(segment.as_input());
            count += 1;
        }
        count
    }

    /// Take the pending segments without delivering them.
    pub(crate) fn take(&mut self) -> Vec<Transmitted> {
        self.outbox.segments.drain(..).collect()
    }
}

fn plain() -> Config {
    Config {
        mss_default: 1000,
        do_rfc1323: false,
        do_sack: false,
        ..Config::default()
    }
}

#[test]
fn handshake_negotiates_options() {
    let config = Config { mss_default: 1000, ..Config::default() };
    let (client, server) = Endpoint::pair(config);
    assert_eq!(client.conn.send_state().unacked, TcpSeqNumber(101));
    assert_eq!(client.conn.recv_state().next, TcpSeqNumber(501));
    assert_eq!(server.conn.send_state().unacked, TcpSeqNumber(501));
    assert_eq!(server.conn.recv_state().next, TcpSeqNumber(101));
    assert!(client.conn.timestamps() && server.conn.timestamps());
    assert!(client.conn.sack_permitted() && server.conn.sack_permitted());
    assert_eq!(client.conn.stats().connects, 1);
    assert_eq!(server.conn.stats().accepts, 1);
    assert_eq!(server.events.accepted, 1);
    // Both took a round trip sample from the handshake.
    assert_eq!(client.conn.rtt().samples(), 1);
    assert_eq!(server.conn.rtt().samples(), 1);
}

#[test]
fn simultaneous_open() {
    let mut a = Endpoint::new(plain(), 1000, 2000);
    let mut b = Endpoint::new(plain(), 2000, 1000);
    a.connect(TcpSeqNumber(100));
    b.connect(TcpSeqNumber(500));
    let syn_a = a.take();
    let syn_b = b.take();
    for syn in &syn_a {
        b.input(syn.as_input());
    }
    for syn in &syn_b {
        a.input(syn.as_input());
    }
    assert_eq!(a.conn.state(), State::SynReceived);
    assert_eq!(b.conn.state(), State::SynReceived);

    // Each answers with a SYN-ACK.
    a.transfer_to(&mut b);
    b.transfer_to(&mut a);
    assert_eq!(a.conn.state(), State::Established);
    assert_eq!(b.conn.state(), State::Established);
    assert_eq!(a.conn.send_state().unacked, TcpSeqNumber(101));
    assert_eq!(b.conn.send_state().unacked, TcpSeqNumber(501));
}

#[test]
fn data_in_both_directions() {
    let (mut client, mut server) = Endpoint::pair(Config::default());
    assert_eq!(client.send(b"GET / HTTP/1.0\r\n\r\n"), 18);
    client.transfer_to(&mut server);
    assert_eq!(server.read_all(), b"GET / HTTP/1.0\r\n\r\n".to_vec());

    let response = [b'x'; 5000];
    assert_eq!(server.send(&response), 5000);
    // Acknowledgements and data cross until the response is through.
    for _ in 0..8 {
        server.transfer_to(&mut client);
        client.advance(100);
        client.fire();
        client.transfer_to(&mut server);
    }
    assert_eq!(client.read_all(), response.to_vec());
    assert_eq!(server.conn.send_state().unacked, server.conn.send_state().max);
    assert!(!server.timers.is_armed(Timer::Retransmit));
}

#[test]
fn fast_retransmit_after_three_duplicates() {
    let (mut client, mut server) = Endpoint::pair(plain());
    client.send(&[0; 4000]);
    let mut sent = client.take();
    assert_eq!(sent.len(), 4);
    let lost = sent.remove(0);
    assert_eq!(lost.header.seq_number, TcpSeqNumber(101));

    for segment in &sent {
        server.input(segment.as_input());
    }
    // Every out of order segment is answered at once.
    assert_eq!(server.outbox.len(), 3);
    server.transfer_to(&mut client);

    assert_eq!(client.conn.dupacks(), 3);
    assert!(client.conn.window().fast_recovery);
    assert_eq!(client.conn.window().ssthresh, 5000);
    // Inflated by the three segments that left the network.
    assert_eq!(client.conn.window().cwnd, 8000);
    assert_eq!(client.conn.recover(), TcpSeqNumber(4101));
    let retransmitted = client.outbox.pop().unwrap();
    assert_eq!(retransmitted.header.seq_number, TcpSeqNumber(101));
    assert_eq!(retransmitted.payload.len(), 1000);
    assert_eq!(client.conn.stats().sndrexmitpack, 1);

    server.input(retransmitted.as_input());
    assert_eq!(server.read_all().len(), 4000);
    server.transfer_to(&mut client);
    assert!(!client.conn.window().in_recovery());
    assert_eq!(client.conn.send_state().unacked, TcpSeqNumber(4101));
    assert_eq!(client.conn.window().cwnd, 2000);
}

#[test]
fn oversized_initial_window_is_capped() {
    let config = Config { initcwnd_segments: 5_000_000, ..plain() };
    let (mut client, _server) = Endpoint::pair(config);
    assert_eq!(client.conn.window().cwnd, 65535 << 14);
    client.send(&[0; 4000]);
    assert_eq!(client.take().len(), 4);
}

#[test]
fn sack_recovery_retransmits_hole() {
    let config = Config { do_rfc1323: false, ..Config::default() };
    let config = Config { mss_default: 1000, ..config };
    let (mut client, mut server) = Endpoint::pair(config);
    client.send(&[0; 4000]);
    let mut sent = client.take();
    sent.remove(0);

    server.input(sent[0].as_input());
    let first = server.outbox.pop().unwrap();
    let block = first.header.options.sack_blocks().next().unwrap();
    assert_eq!((block.start, block.end), (TcpSeqNumber(1101), TcpSeqNumber(2101)));
    client.input(first.as_input());
    assert_eq!(client.conn.scoreboard().sacked_bytes(), 1000);
    assert_eq!(client.conn.scoreboard().holes().len(), 1);

    for segment in &sent[1..] {
        server.input(segment.as_input());
    }
    server.transfer_to(&mut client);
    assert_eq!(client.conn.stats().sack_recovery_episode, 1);
    assert_eq!(client.conn.window().ssthresh, 5000);
    // Recovery starts from a single segment, proportional rate reduction grows it again.
    assert_eq!(client.conn.window().cwnd, 1000);
    let board = client.conn.scoreboard();
    assert_eq!(board.holes().len(), 1);
    assert_eq!(board.holes()[0].start, TcpSeqNumber(101));
    assert_eq!(board.holes()[0].end, TcpSeqNumber(1101));
    assert_eq!(board.holes()[0].rxmit, TcpSeqNumber(1101));
    assert_eq!(board.recover_fs, 4000);
    assert_eq!(board.prr_delivered, 3000);
    assert_eq!(board.prr_out, 1000);
    let retransmitted = client.outbox.pop().unwrap();
    assert_eq!(retransmitted.header.seq_number, TcpSeqNumber(101));
    assert_eq!(client.conn.stats().sack_rexmits, 1);

    server.input(retransmitted.as_input());
    server.transfer_to(&mut client);
    assert_eq!(client.conn.send_state().unacked, TcpSeqNumber(4101));
    assert!(client.conn.scoreboard().is_empty());
    assert!(!client.conn.window().in_recovery());
}

#[test]
fn single_sack_block_keeps_window() {
    let config = Config {
        mss_default: 1000,
        do_rfc1323: false,
        initcwnd_segments: 4,
        ..Config::default()
    };
    let (mut client, mut server) = Endpoint::pair(config);
    client.send(&[0; 6000]);
    let sent = client.take();
    assert_eq!(sent.len(), 4);
    assert_eq!(client.conn.window().cwnd, 4000);

    // The first segment is lost, the second selectively acknowledged.
    server.input(sent[1].as_input());
    server.transfer_to(&mut client);
    assert_eq!(client.conn.send_state().unacked, TcpSeqNumber(101));
    let board = client.conn.scoreboard();
    assert_eq!(board.holes().len(), 1);
    assert_eq!(board.holes()[0].start, TcpSeqNumber(101));
    assert_eq!(board.holes()[0].end, TcpSeqNumber(1101));
    assert_eq!(board.sacked_bytes(), 1000);
    assert_eq!(client.conn.dupacks(), 1);
    assert!(!client.conn.window().in_recovery());
    assert_eq!(client.conn.window().cwnd, 4000);

    // Limited transmit sends one new segment.
    let limited = client.take();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].header.seq_number, TcpSeqNumber(4101));
    assert_eq!(limited[0].payload.len(), 1000);
    assert_eq!(client.conn.send_state().max, TcpSeqNumber(5101));
}

#[test]
fn prr_paces_new_data_in_recovery() {
    let config = Config {
        mss_default: 1000,
        do_rfc1323: false,
        rfc3042: false,
        ..Config::default()
    };
    let (mut client, mut server) = Endpoint::pair(config);
    // Ten segments fit the initial window, two more wait in the send buffer.
    client.send(&[0; 12000]);
    let sent = client.take();
    assert_eq!(sent.len(), 10);

    for segment in &sent[1..4] {
        server.input(segment.as_input());
    }
    server.transfer_to(&mut client);
    assert!(client.conn.window().fast_recovery);
    assert_eq!(client.conn.window().ssthresh, 5000);
    assert_eq!(client.conn.window().cwnd, 1000);
    assert_eq!(client.conn.scoreboard().recover_fs, 10000);
    let retransmitted = client.take();
    assert_eq!(retransmitted.len(), 1);
    assert_eq!(retransmitted[0].header.seq_number, TcpSeqNumber(101));

    // Half of the delivered data may be sent, ssthresh over recover_fs.
    server.input(sent[4].as_input());
    server.transfer_to(&mut client);
    assert_eq!(client.conn.scoreboard().prr_delivered, 4000);
    assert_eq!(client.conn.window().cwnd, 2000);
    let fresh = client.take();
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].header.seq_number, TcpSeqNumber(10101));
    assert_eq!(client.conn.scoreboard().prr_out, 2000);

    server.input(sent[5].as_input());
    server.transfer_to(&mut client);
    assert!(client.take().is_empty());
    assert!(client.conn.window().cwnd > client.conn.mss());

    server.input(sent[6].as_input());
    server.transfer_to(&mut client);
    let fresh = client.take();
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].header.seq_number, TcpSeqNumber(11101));
    assert_eq!(client.conn.scoreboard().prr_out, 3000);
    assert!(client.conn.window().fast_recovery);
}

#[test]
fn retransmit_timeouts_back_off() {
    let (mut client, _server) = Endpoint::pair(plain());
    client.send(&[0; 500]);
    client.take();

    let first = client.conn.rtt().rto();
    client.advance(first);
    assert_eq!(client.fire(), vec![Timer::Retransmit]);
    // Half of the initial window of ten segments.
    assert_eq!(client.conn.window().ssthresh, 5000);
    let second = client.conn.rtt().rto();
    assert!(second > first);

    client.advance(second);
    assert_eq!(client.fire(), vec![Timer::Retransmit]);
    assert_eq!(client.conn.rtt().backoff_shift(), 2);
    assert_eq!(client.conn.stats().rexmttimeo, 2);
    assert!(client.conn.rtt().rto() > second);
    // Computed from the collapsed window, bounded below by two segments.
    assert_eq!(client.conn.window().ssthresh, 2000);

    let retransmissions = client.take();
    assert_eq!(retransmissions.len(), 2);
    assert!(retransmissions.iter().all(|segment| segment.header.seq_number == TcpSeqNumber(101)));
    // The window collapsed to a single segment.
    assert_eq!(client.conn.window().cwnd, client.conn.mss());
}

#[test]
fn spurious_timeout_undone() {
    let config = Config { mss_default: 1000, do_sack: false, ..Config::default() };
    let (mut client, mut server) = Endpoint::pair(config);
    client.send(&[0; 500]);
    client.transfer_to(&mut server);
    server.advance(100);
    server.fire();
    // The acknowledgement is late.
    let held = server.take();
    assert_eq!(held.len(), 1);
    let cwnd = client.conn.window().cwnd;

    let rto = client.conn.rtt().rto();
    client.advance(rto);
    assert_eq!(client.fire(), vec![Timer::Retransmit]);
    assert_eq!(client.conn.window().cwnd, client.conn.mss() - 12);

    client.input(held[0].as_input());
    assert_eq!(client.conn.stats().sndrexmitbad, 1);
    assert!(client.conn.window().cwnd >= cwnd);
    assert_eq!(client.conn.send_state().unacked, TcpSeqNumber(601));
}

#[test]
fn graceful_close() {
    let (mut client, mut server) = Endpoint::pair(plain());
    client.send(b"request");
    // Only the sending direction, the response must still be readable.
    client.with_io(|conn, io| conn.shutdown_write(io)).unwrap();
    assert_eq!(client.conn.state(), State::FinWait1);
    client.transfer_to(&mut server);
    assert_eq!(server.conn.state(), State::CloseWait);
    assert_eq!(server.read_all(), b"request".to_vec());

    server.send(b"response");
    server.close();
    assert_eq!(server.conn.state(), State::LastAck);
    server.transfer_to(&mut client);
    assert_eq!(client.conn.state(), State::TimeWait);
    assert_eq!(client.read_all(), b"response".to_vec());

    client.transfer_to(&mut server);
    assert_eq!(server.conn.state(), State::Closed);
    assert_eq!(server.events.closed, Some(None));

    // A retransmitted FIN is acknowledged again.
    let fin = segment(
        TcpSeqNumber(500 + 1 + 8),
        client.conn.send_state().max,
        TcpFlags::FIN | TcpFlags::ACK,
        b"");
    client.input(fin);
    let ack = client.outbox.pop().unwrap();
    assert_eq!(ack.header.ack_number, client.conn.recv_state().next);

    // Resets do not end the quiet time.
    client.input(segment(client.conn.recv_state().next, TcpSeqNumber(0), TcpFlags::RST, b""));
    assert_eq!(client.conn.state(), State::TimeWait);

    client.advance(60_000);
    client.fire();
    assert_eq!(client.conn.state(), State::Closed);
}

#[test]
fn close_before_established_sends_fin_later() {
    let mut client = Endpoint::new(plain(), 49152, 80);
    let mut server = Endpoint::new(plain(), 80, 49152);
    server.conn.listen(TcpSeqNumber(500)).unwrap();
    client.connect(TcpSeqNumber(100));
    client.transfer_to(&mut server);
    server.close();
    assert_eq!(server.conn.state(), State::SynReceived);

    // The FIN rides on a second SYN-ACK, which the established client does not accept.
    server.transfer_to(&mut client);
    assert_eq!(client.conn.state(), State::Established);
    assert_eq!(client.conn.recv_state().next, TcpSeqNumber(501));
    client.transfer_to(&mut server);
    assert_eq!(server.conn.state(), State::FinWait1);
    server.transfer_to(&mut client);
    assert_eq!(client.conn.state(), State::Established);

    // Only the retransmission delivers it.
    let rto = server.conn.rtt().rto();
    server.advance(rto);
    assert!(server.fire().contains(&Timer::Retransmit));
    let fin = server.outbox.pop().unwrap();
    assert!(fin.header.flags.fin() && !fin.header.flags.syn());
    assert_eq!(fin.header.seq_number, TcpSeqNumber(501));
    client.input(fin.as_input());
    assert_eq!(client.conn.state(), State::CloseWait);
    client.transfer_to(&mut server);
    assert_eq!(server.conn.state(), State::FinWait2);
}

#[test]
fn close_discards_late_data() {
    let (mut client, mut server) = Endpoint::pair(plain());
    client.close();
    client.transfer_to(&mut server);
    assert_eq!(server.conn.state(), State::CloseWait);
    server.transfer_to(&mut client);
    assert_eq!(client.conn.state(), State::FinWait2);

    // Nobody reads any more, data is answered with a reset.
    server.send(b"response");
    server.transfer_to(&mut client);
    assert_eq!(client.conn.state(), State::Closed);
    assert_eq!(client.conn.stats().rcvafterclose, 1);
    assert!(client.recv.is_empty());
    let reset = client.outbox.pop().unwrap();
    assert!(reset.header.flags.rst());
    server.input(reset.as_input());
    assert_eq!(server.conn.state(), State::Closed);
}

#[test]
fn paws_drops_old_segment() {
    let config = Config { mss_default: 1000, ..Config::default() };
    let (_client, mut server) = Endpoint::pair(config);
    let mut old = segment(
        server.conn.recv_state().next,
        server.conn.send_state().next,
        TcpFlags::ACK,
        b"old");
    old.header.options.timestamp = Some(TcpTimestamp { tsval: 1, tsecr: 0 });
    server.input(old);

    assert_eq!(server.conn.stats().pawsdrop, 1);
    assert_eq!(server.conn.stats().rcvduppack, 1);
    assert_eq!(server.conn.stats().rcvdupbyte, 3);
    assert!(server.recv.is_empty());
    // Data is acknowledged to resynchronize.
    let ack = server.outbox.pop().unwrap();
    assert_eq!(ack.header.ack_number, server.conn.recv_state().next);
}

#[test]
fn receive_window_limits_data() {
    let mut client = Endpoint::new(plain(), 49152, 80);
    let mut server = Endpoint::new(plain(), 80, 49152).with_recv_capacity(1000);
    Endpoint::handshake(&mut client, &mut server);
    assert_eq!(client.conn.send_state().window, 1000);

    client.send(&[1; 3000]);
    let sent = client.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload.len(), 1000);
    server.input(sent[0].as_input());
    server.advance(100);
    server.fire();
    server.transfer_to(&mut client);
    assert_eq!(client.conn.send_state().window, 0);
    assert!(client.timers.is_armed(Timer::Persist));

    // Reading opens the window again.
    assert_eq!(server.read_all().len(), 1000);
    server.with_io(|conn, io| conn.window_update(io));
    server.transfer_to(&mut client);
    assert_eq!(client.conn.send_state().window, 1000);
    assert!(!client.timers.is_armed(Timer::Persist));
    assert_eq!(client.outbox.len(), 1);
}

#[test]
fn sequence_space_wraps() {
    let mut client = Endpoint::new(plain(), 49152, 80);
    let mut server = Endpoint::new(plain(), 80, 49152);
    server.conn.listen(TcpSeqNumber(500)).unwrap();
    client.connect(TcpSeqNumber::from_u32(0xffff_fff0));
    client.transfer_to(&mut server);
    server.transfer_to(&mut client);
    client.transfer_to(&mut server);

    let data: Vec<u8> = (0..100).collect();
    client.send(&data);
    client.transfer_to(&mut server);
    server.advance(100);
    server.fire();
    server.transfer_to(&mut client);

    assert_eq!(server.read_all(), data);
    let send = client.conn.send_state();
    assert_eq!(send.unacked, TcpSeqNumber::from_u32(0x55));
    assert!(send.unacked > TcpSeqNumber::from_u32(0xffff_fff0));
    assert_eq!(send.unacked, send.max);
}

#[test]
fn abort_resets_peer() {
    let (mut client, mut server) = Endpoint::pair(plain());
    client.with_io(|conn, io| conn.abort(io));
    assert_eq!(client.conn.state(), State::Closed);
    client.transfer_to(&mut server);
    assert_eq!(server.conn.state(), State::Closed);
    assert_eq!(server.conn.error(), Some(super::error::DropReason::ConnectionReset));
}
