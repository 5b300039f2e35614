//! A bulk transfer over a simulated link.
//!
//! Two connections exchange segments through an in-memory link with a fixed delay that drops
//! every n-th segment. The client pushes the requested number of bytes, closes and both sides
//! print their counters once the connection is torn down.
use std::collections::VecDeque;
use structopt::StructOpt;

use ethox_tcp::layer::tcp::{
    Algorithm, Config, Connection, Events, Flow, Io, IsnGenerator, Outbox, RecvQueue, SendQueue,
    State, TimerTable, Transmitted};
use ethox_tcp::storage::SegmentQueue;
use ethox_tcp::time::Instant;

#[derive(StructOpt)]
struct Options {
    /// Number of bytes the client sends.
    #[structopt(long = "bytes", default_value = "1000000")]
    bytes: usize,
    /// One-way delay of the link in milliseconds.
    #[structopt(long = "delay", default_value = "10")]
    delay: u32,
    /// Drop every n-th segment, zero for a lossless link.
    #[structopt(long = "drop-every", default_value = "0")]
    drop_every: usize,
    /// Use CUBIC instead of NewReno.
    #[structopt(long = "cubic")]
    cubic: bool,
    /// Disable selective acknowledgements.
    #[structopt(long = "no-sack")]
    no_sack: bool,
    /// Give up after this many simulated milliseconds.
    #[structopt(long = "limit", default_value = "600000")]
    limit: u32,
}

struct Host {
    conn: Connection,
    timers: TimerTable,
    outbox: Outbox,
    send: SendQueue,
    recv: RecvQueue,
    reassembly: SegmentQueue,
    events: Events,
}

struct Link {
    delay: u32,
    drop_every: usize,
    count: usize,
    dropped: usize,
    queue: VecDeque<(Instant, Transmitted)>,
}

fn main() {
    let options = Options::from_args();
    let config = Config {
        mss_default: 1460,
        do_sack: !options.no_sack,
        congestion: if options.cubic { Algorithm::Cubic } else { Algorithm::NewReno },
        recv_buffer: 1 << 18,
        send_buffer: 1 << 18,
        ..Config::default()
    };

    let mut now = Instant::from_millis(0);
    let isn = IsnGenerator::from_std_hash();
    let mut client = Host::new(config, 49152, 80, now);
    let mut server = Host::new(config, 80, 49152, now);
    let mut uplink = Link::new(options.delay, options.drop_every);
    let mut downlink = Link::new(options.delay, options.drop_every);

    let server_isn = isn.get_isn(Flow::ipv4([10, 0, 0, 2], 80, [10, 0, 0, 1], 49152), now);
    server.conn.listen(server_isn).expect("fresh connection");
    let client_isn = isn.get_isn(Flow::ipv4([10, 0, 0, 1], 49152, [10, 0, 0, 2], 80), now);
    client.with_io(now, |conn, io| conn.connect(client_isn, io)).expect("fresh connection");

    let pattern: Vec<u8> = (0..=255).collect();
    let mut written = 0;
    let mut received = 0;
    let mut buffer = vec![0; 1 << 16];

    while now.millis() < i64::from(options.limit) {
        if written < options.bytes && client.conn.state().is_established() {
            let chunk = (options.bytes - written).min(pattern.len());
            written += client.with_io(now, |conn, io| conn.send(&pattern[..chunk], io))
                .unwrap_or(0);
            if written == options.bytes {
                client.with_io(now, |conn, io| conn.close(io)).expect("open connection");
            }
        }

        uplink.deliver(now, &mut server);
        downlink.deliver(now, &mut client);
        client.fire(now);
        server.fire(now);

        let read = server.recv.read(&mut buffer);
        if read > 0 {
            received += read;
            server.with_io(now, |conn, io| conn.window_update(io));
        }
        if server.conn.state() == State::CloseWait {
            server.with_io(now, |conn, io| conn.close(io)).expect("open connection");
        }

        uplink.accept(now, &mut client.outbox);
        downlink.accept(now, &mut server.outbox);

        if client.conn.state() == State::Closed && server.conn.state() == State::Closed {
            break;
        }
        now = now.after_ticks(1);
    }

    println!("transferred {} of {} bytes in {} ms", received, options.bytes, now.millis());
    println!("link dropped {} segments", uplink.dropped + downlink.dropped);
    client.report("client");
    server.report("server");
}

impl Host {
    fn new(config: Config, local: u16, remote: u16, now: Instant) -> Self {
        Host {
            conn: Connection::new(config, local, remote, now).expect("valid configuration"),
            timers: TimerTable::new(now),
            outbox: Outbox::default(),
            send: SendQueue::new(config.send_buffer),
            recv: RecvQueue::new(config.recv_buffer),
            reassembly: SegmentQueue::new(64),
            events: Events::default(),
        }
    }

    fn with_io<R>(&mut self, now: Instant, f: impl FnOnce(&mut Connection, &mut Io) -> R) -> R {
        let Host { conn, timers, outbox, send, recv, reassembly, events } = self;
        timers.update(now);
        let mut io = Io {
            now,
            timers,
            sink: outbox,
            send,
            recv,
            reassembly,
            events,
        };
        f(conn, &mut io)
    }

    fn fire(&mut self, now: Instant) {
        self.timers.update(now);
        while let Some(timer) = self.timers.pop_expired() {
            self.with_io(now, |conn, io| conn.on_timer(timer, io));
        }
    }

    fn report(&self, name: &str) {
        let stats = self.conn.stats();
        println!("{}: {:?}, error {:?}", name, self.conn.state(), self.conn.error());
        println!("  sent {} segments, {} bytes, {} retransmitted",
            stats.sndtotal, stats.sndbyte, stats.sndrexmitpack);
        println!("  received {} segments, {} bytes, {} duplicate acks",
            stats.rcvtotal, stats.rcvbyte, stats.rcvdupack);
        println!("  {} timeouts, {} spurious, {} sack recoveries",
            stats.rexmttimeo, stats.sndrexmitbad, stats.sack_recovery_episode);
        println!("  srtt {} rttvar {} cwnd {} ssthresh {}",
            self.conn.rtt().srtt(), self.conn.rtt().rttvar(),
            self.conn.window().cwnd, self.conn.window().ssthresh);
    }
}

impl Link {
    fn new(delay: u32, drop_every: usize) -> Self {
        Link {
            delay,
            drop_every,
            count: 0,
            dropped: 0,
            queue: VecDeque::new(),
        }
    }

    fn accept(&mut self, now: Instant, outbox: &mut Outbox) {
        while let Some(segment) = outbox.pop() {
            self.count += 1;
            if self.drop_every != 0 && self.count % self.drop_every == 0 {
                self.dropped += 1;
                continue;
            }
            self.queue.push_back((now.after_ticks(self.delay), segment));
        }
    }

    fn deliver(&mut self, now: Instant, host: &mut Host) {
        while self.queue.front().map_or(false, |(at, _)| *at <= now) {
            let (_, segment) = self.queue.pop_front().unwrap();
            host.with_io(now, |conn, io| conn.input(segment.as_input(), io));
        }
    }
}
