//! Initial sequence number generation, as recommended by rfc6528.
//!
//! Uses a keyed cryptographic hash function (SipHash-2-4) instead of appending the secret key to
//! the flow identity for hashing. Hash function SipHash-2-4 from:
//!
//! > SipHash: a fast short-input PRF, Jean-Philippe Aumasson and Daniel J. Bernstein
use crate::time::Instant;
use crate::wire::TcpSeqNumber;

/// The identity of a connection as far as sequence number selection is concerned.
///
/// Addresses are given in their 16 byte form, IPv4 addresses mapped into IPv6.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Flow {
    /// The local address.
    pub local: [u8; 16],
    /// The remote address.
    pub remote: [u8; 16],
    /// The local port.
    pub local_port: u16,
    /// The remote port.
    pub remote_port: u16,
}

/// An initial sequence number generator based on SipHash-2-4.
///
/// > ISN = M + SipHash-2-4(secretkey, localip, localport, remoteip, remoteport)
///
/// `M` is the 4 microsecond clock of RFC 6528, derived from the millisecond `Instant`. Distinct
/// flows get unrelated sequence spaces while consecutive incarnations of the same flow still
/// start beyond the sequence numbers of the previous one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IsnGenerator {
    keys: (u64, u64),
}

// Yes, that's the initial values, as ASCII text.
const IV: [&[u8; 8]; 4] = [
    b"somepseu",
    b"dorandom",
    b"lygenera",
    b"tedbytes"];

struct State {
    v0: u64,
    v1: u64,
    v2: u64,
    v3: u64,
}

impl Flow {
    /// The identity of an IPv4 connection.
    pub fn ipv4(local: [u8; 4], local_port: u16, remote: [u8; 4], remote_port: u16) -> Self {
        Flow {
            local: map_ipv4(local),
            remote: map_ipv4(remote),
            local_port,
            remote_port,
        }
    }
}

fn map_ipv4([a, b, c, d]: [u8; 4]) -> [u8; 16] {
    [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff, a, b, c, d]
}

impl IsnGenerator {
    /// Create a generator by deriving a key from the standard `RandomState`.
    ///
    /// This is done by individually hashing the numbers `0u64` and `1u64` each with the same
    /// hasher created from a new instance of `RandomState`. The two output tags are then used as
    /// the internal key state.
    #[cfg(feature = "std")]
    pub fn from_std_hash() -> Self {
        use std::hash::{Hasher, BuildHasher};
        use std::collections::hash_map::RandomState;

        let hash = RandomState::new().build_hasher();
        let x0 = {
            let mut hash = hash.clone();
            hash.write_u64(0);
            hash.finish()
        };
        let x1 = {
            let mut hash = hash.clone();
            hash.write_u64(1);
            hash.finish()
        };

        IsnGenerator {
            keys: (x0, x1),
        }
    }

    /// Create a generator with some pre-defined secret key.
    ///
    /// Really, create the key with some cryptographic random means or derive them from some other
    /// key with a key derivation function.
    pub fn from_secret_key_bytes(bytes: [u8; 16]) -> Self {
        let mut a = [0; 8];
        let mut b = [0; 8];
        a.copy_from_slice(&bytes[..8]);
        b.copy_from_slice(&bytes[8..]);
        IsnGenerator {
            keys: (u64::from_le_bytes(a), u64::from_le_bytes(b)),
        }
    }

    /// Get the initial sequence number for a connection.
    pub fn get_isn(&self, flow: Flow, time: Instant) -> TcpSeqNumber {
        let mut state = State::init(self.keys.0, self.keys.1);
        let (m0, m1) = to_messages(flow.local);
        let (m2, m3) = to_messages(flow.remote);
        let p = u64::from(flow.local_port)
            | u64::from(flow.remote_port) << 16
            // Message length = 36
            | 36_u64 << 56;
        state.absorb(m0);
        state.absorb(m1);
        state.absorb(m2);
        state.absorb(m3);
        state.absorb(p);
        let hash = state.finalize();

        let clock = (time.total_millis() as u64).wrapping_mul(250);
        TcpSeqNumber::from_u32(hash as u32) + clock as u32
    }
}

fn to_messages(addr: [u8; 16]) -> (u64, u64) {
    let [a, b, c, d, e, f, g, h, i, j, k, l, m, n, o, p] = addr;
    let m0 = u64::from_be_bytes([a, b, c, d, e, f, g, h]);
    let m1 = u64::from_be_bytes([i, j, k, l, m, n, o, p]);
    (m0, m1)
}

impl State {
    const SIP_C: usize = 2;
    const SIP_D: usize = 4;

    fn init(k0: u64, k1: u64) -> Self {
        State {
            v0: u64::from_be_bytes(*IV[0]) ^ k0,
            v1: u64::from_be_bytes(*IV[1]) ^ k1,
            v2: u64::from_be_bytes(*IV[2]) ^ k0,
            v3: u64::from_be_bytes(*IV[3]) ^ k1,
        }
    }

    fn round(&mut self) {
        self.v0 = self.v0.wrapping_add(self.v1);
        self.v1 = self.v1.rotate_left(13);
        self.v1 ^= self.v0;
        self.v0 = self.v0.rotate_left(32);
        self.v2 = self.v2.wrapping_add(self.v3);
        self.v3 = self.v3.rotate_left(16);
        self.v3 ^= self.v2;
        self.v0 = self.v0.wrapping_add(self.v3);
        self.v3 = self.v3.rotate_left(21);
        self.v3 ^= self.v0;
        self.v2 = self.v2.wrapping_add(self.v1);
        self.v1 = self.v1.rotate_left(17);
        self.v1 ^= self.v2;
        self.v2 = self.v2.rotate_left(32);
    }

    /// Process one 8-byte block of the message.
    ///
    /// The length block is absorbed by the caller like any other block.
    fn absorb(&mut self, m: u64) {
        self.v3 ^= m;
        (0..Self::SIP_C).for_each(|_| self.round());
        self.v0 ^= m;
    }

    fn finalize(mut self) -> u64 {
        self.v2 ^= 0xff;
        (0..Self::SIP_D).for_each(|_| self.round());
        self.v0 ^ self.v1 ^ self.v2 ^ self.v3
    }
}
