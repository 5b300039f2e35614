/// Event counters of a connection.
///
/// Counters only ever increase. Summing them over connections and reporting them is up to the
/// owner of the connections.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Stats {
    /// Connections initiated.
    pub connattempt: u64,
    /// Connections accepted while listening.
    pub accepts: u64,
    /// Connections established.
    pub connects: u64,
    /// Connections dropped with a reason.
    pub drops: u64,
    /// Embryonic connections dropped.
    pub conndrops: u64,
    /// Connections closed, dropped or not.
    pub closed: u64,

    /// Segments received.
    pub rcvtotal: u64,
    /// Segments received in sequence.
    pub rcvpack: u64,
    /// Bytes received in sequence.
    pub rcvbyte: u64,
    /// Segments dropped for a missing timestamp or a bad option combination.
    pub rcvbadopt: u64,
    /// Completely duplicate segments.
    pub rcvduppack: u64,
    /// Bytes of completely duplicate segments.
    pub rcvdupbyte: u64,
    /// Segments with partially duplicate data.
    pub rcvpartduppack: u64,
    /// Duplicate bytes of partially duplicate segments.
    pub rcvpartdupbyte: u64,
    /// Segments received out of order.
    pub rcvoopack: u64,
    /// Bytes received out of order.
    pub rcvoobyte: u64,
    /// Segments with data beyond the window.
    pub rcvpackafterwin: u64,
    /// Bytes beyond the window.
    pub rcvbyteafterwin: u64,
    /// Segments with data after the user closed.
    pub rcvafterclose: u64,
    /// Probes of a zero window.
    pub rcvwinprobe: u64,
    /// Duplicate acknowledgements.
    pub rcvdupack: u64,
    /// Acknowledgements of unsent data.
    pub rcvacktoomuch: u64,
    /// Acknowledgements of new data.
    pub rcvackpack: u64,
    /// Bytes acknowledged.
    pub rcvackbyte: u64,
    /// Window updates without data.
    pub rcvwinupd: u64,
    /// Segments dropped by PAWS.
    pub pawsdrop: u64,
    /// Acknowledgements handled by header prediction.
    pub predack: u64,
    /// Data segments handled by header prediction.
    pub preddat: u64,
    /// Resets ignored as out of window.
    pub badrst: u64,
    /// Resets answered with a challenge ACK.
    pub badrstwin: u64,
    /// SYNs answered with a challenge ACK.
    pub badsyn: u64,
    /// Challenge ACKs sent.
    pub challenge_ack: u64,
    /// Segments with SYN and FIN dropped.
    pub synfin_drop: u64,
    /// Data segments that got a delayed acknowledgement.
    pub delack: u64,

    /// Segments sent.
    pub sndtotal: u64,
    /// Data segments sent.
    pub sndpack: u64,
    /// Data bytes sent.
    pub sndbyte: u64,
    /// Data segments retransmitted.
    pub sndrexmitpack: u64,
    /// Data bytes retransmitted.
    pub sndrexmitbyte: u64,
    /// Pure acknowledgements sent.
    pub sndacks: u64,
    /// Window probes sent.
    pub sndprobe: u64,
    /// Window updates sent.
    pub sndwinup: u64,
    /// Control segments, SYN, FIN or RST, sent.
    pub sndctrl: u64,
    /// Segments the sink failed to take.
    pub snderr: u64,
    /// Segments timed for a round trip sample.
    pub segstimed: u64,
    /// Round trip samples taken.
    pub rttupdated: u64,

    /// Retransmit timeouts.
    pub rexmttimeo: u64,
    /// Persist timeouts.
    pub persisttimeo: u64,
    /// Keepalive timeouts.
    pub keeptimeo: u64,
    /// Keepalive probes sent.
    pub keepprobe: u64,
    /// Connections dropped by keepalive.
    pub keepdrops: u64,
    /// Connections dropped by retransmit timeouts.
    pub timeoutdrop: u64,
    /// Connections dropped by the persist timer.
    pub persistdrop: u64,
    /// Timeouts found to be spurious and undone.
    pub sndrexmitbad: u64,

    /// Recoveries entered by duplicate acknowledgements.
    pub sack_recovery_episode: u64,
    /// Segments retransmitted from the scoreboard.
    pub sack_rexmits: u64,
    /// Bytes retransmitted from the scoreboard.
    pub sack_rexmit_bytes: u64,
    /// Holes that did not fit into the scoreboard.
    pub sack_sboverflow: u64,

    /// Segments marked with congestion experienced.
    pub ecn_ce: u64,
    /// Segments marked ECT(0).
    pub ecn_ect0: u64,
    /// Segments marked ECT(1).
    pub ecn_ect1: u64,
    /// Successful ECN handshakes.
    pub ecn_shs: u64,
    /// Window reductions by ECN.
    pub ecn_rcwnd: u64,
}
