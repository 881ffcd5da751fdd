//! Wire format shared between the conductor and player binaries.
//!
//! Every datagram is exactly 36 bytes: a 4-byte little-endian kind tag
//! followed by a 32-byte payload whose layout depends on the kind. The
//! endianness mix (little-endian tag and `Caps::num_voices`, big-endian
//! `Play` fields) is historical but must be preserved bit-exact for
//! interop — see packet.rs.

pub mod packet;

pub use packet::{Caps, DecodeError, Packet, PacketKind, Play, PAYLOAD_LEN, TOTAL_LEN};

/// UDP port the conductor binds and players broadcast discovery to.
pub const CONDUCTOR_PORT: u16 = 12074;

/// Discovery beacon name a player announces itself with.
pub const PLAYER_NAME: [u8; 4] = *b"gogo";
