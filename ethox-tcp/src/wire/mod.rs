/*! Low-level segment access and construction.

The `wire` module deals with the segment *representation*. It provides two levels of
functionality.

 * First, the value types that the protocol engine computes with: modular sequence numbers in
   [`TcpSeqNumber`], the flag set in [`TcpFlags`] and the ECN codepoint of the IP header in
   [`EcnCodepoint`].
 * Second, a compact, high-level representation of header data that can be created from parsing
   and emitted into a sequence of octets. The header itself is a [`TcpRepr`] and its option block
   an immutable [`TcpOptions`] value, parsed once and shared by the input and output paths.

[`TcpSeqNumber`]: struct.TcpSeqNumber.html
[`TcpFlags`]: struct.TcpFlags.html
[`EcnCodepoint`]: enum.EcnCodepoint.html
[`TcpRepr`]: struct.TcpRepr.html
[`TcpOptions`]: struct.TcpOptions.html

The `TcpRepr::parse()` method never panics and the `TcpRepr::emit()` method never panics as long
as the underlying buffer is at least `TcpRepr::header_len()` octets long.

Option parsing is tolerant. A malformed option terminates the option block but never the segment:
every option decoded before it stays valid. Options that are not understood are skipped by their
length byte.

# Examples

To emit a SYN header into an octet buffer, and then parse it back:

```rust
use ethox_tcp::wire::*;
let mut options = TcpOptions::default();
options.mss = Some(1460);
options.sack_permitted = true;

let repr = TcpRepr {
    src_port: 49152,
    dst_port: 80,
    seq_number: TcpSeqNumber(100),
    ack_number: TcpSeqNumber(0),
    flags: TcpFlags::SYN,
    window_len: 65535,
    urgent_at: 0,
    options,
};

let mut buffer = vec![0; repr.header_len()];
repr.emit(&mut buffer);

let (parsed, payload) = TcpRepr::parse(&buffer).expect("malformed header");
assert_eq!(parsed, repr);
assert!(payload.is_empty());
```
*/
// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in parts from `smoltcp` originally distributed under 0-clause BSD
mod field {
    pub(crate) type Field = ::core::ops::Range<usize>;
}

mod error;
mod tcp;

pub use self::error::{
    Error,
    Result};

pub use self::tcp::{
    EcnCodepoint,
    SackBlock,
    OptionKind as TcpOptionKind,
    Timestamp as TcpTimestamp,
    SeqNumber as TcpSeqNumber,
    Flags as TcpFlags,
    TcpOption,
    Options as TcpOptions,
    Repr as TcpRepr,
    MAX_OPTION_LEN,
    MAX_SACK_BLOCKS};
