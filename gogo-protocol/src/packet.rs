use std::time::Duration;

/// Size of the payload following the 4-byte kind tag.
pub const PAYLOAD_LEN: usize = 32;

/// Size of a complete datagram: tag + payload.
pub const TOTAL_LEN: usize = 4 + PAYLOAD_LEN;

/// The 4-byte kind tag, always read/written little-endian regardless of
/// any given payload's own endianness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketKind(pub u32);

impl PacketKind {
    pub const KEEP_ALIVE: PacketKind = PacketKind(0);
    pub const PING: PacketKind = PacketKind(1);
    pub const QUIT: PacketKind = PacketKind(2);
    pub const PLAY: PacketKind = PacketKind(3);
    pub const CAPS: PacketKind = PacketKind(4);
    pub const UNKNOWN: PacketKind = PacketKind(0xFFFF_FFFF);
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
pub enum DecodeError {
    #[error("datagram has length {actual}, expected exactly {TOTAL_LEN}")]
    WrongLength { actual: usize },
}

/// `Play` packet payload: duration, frequency, amplitude and waveform
/// selector for one note. Fields are big-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Play {
    pub duration: Duration,
    pub frequency_hz: u32,
    pub amplitude: f32,
    pub voice_id: u32,
}

/// `Caps` packet payload: a player announcing itself during discovery.
/// `num_voices` is little-endian on the wire, unlike `Play`'s fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Caps {
    pub name: [u8; 4],
    pub num_voices: u32,
    pub identity: [u8; 24],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Packet {
    /// Filler datagram; payload is ignored.
    KeepAlive,
    /// Opaque 32-byte nonce. Receipt (not content) signals admission.
    Ping([u8; 32]),
    /// Directs a player to stop and re-enter discovery; payload ignored.
    Quit,
    Play(Play),
    Caps(Caps),
    /// Any tag outside the known set. Not an error — higher layers just
    /// ignore it.
    Unknown { kind: u32, payload: [u8; 32] },
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::KeepAlive => PacketKind::KEEP_ALIVE,
            Packet::Ping(_) => PacketKind::PING,
            Packet::Quit => PacketKind::QUIT,
            Packet::Play(_) => PacketKind::PLAY,
            Packet::Caps(_) => PacketKind::CAPS,
            Packet::Unknown { kind, .. } => PacketKind(*kind),
        }
    }

    pub fn serialize(&self) -> [u8; TOTAL_LEN] {
        let mut buf = [0u8; TOTAL_LEN];
        buf[0..4].copy_from_slice(&self.kind().0.to_le_bytes());

        let payload = &mut buf[4..];
        match self {
            Packet::KeepAlive | Packet::Quit => {
                // 32 zero bytes, already the default.
            }
            Packet::Ping(nonce) => {
                payload.copy_from_slice(nonce);
            }
            Packet::Play(play) => {
                payload[0..4].copy_from_slice(&u32::try_from(play.duration.as_secs())
                    .unwrap_or(u32::MAX)
                    .to_be_bytes());
                payload[4..8].copy_from_slice(&play.duration.subsec_nanos().to_be_bytes());
                payload[8..12].copy_from_slice(&play.frequency_hz.to_be_bytes());
                payload[12..16].copy_from_slice(&play.amplitude.to_be_bytes());
                payload[16..20].copy_from_slice(&play.voice_id.to_be_bytes());
                // [20..32] stays zero (reserved).
            }
            Packet::Caps(caps) => {
                payload[0..4].copy_from_slice(&caps.name);
                payload[4..8].copy_from_slice(&caps.num_voices.to_le_bytes());
                payload[8..32].copy_from_slice(&caps.identity);
            }
            Packet::Unknown { payload: raw, .. } => {
                payload.copy_from_slice(raw);
            }
        }

        buf
    }

    pub fn deserialize(buf: &[u8]) -> Result<Packet, DecodeError> {
        if buf.len() != TOTAL_LEN {
            return Err(DecodeError::WrongLength { actual: buf.len() });
        }

        let kind = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let payload = &buf[4..];

        let packet = match PacketKind(kind) {
            PacketKind::KEEP_ALIVE => Packet::KeepAlive,
            PacketKind::QUIT => Packet::Quit,
            PacketKind::PING => {
                let mut nonce = [0u8; 32];
                nonce.copy_from_slice(payload);
                Packet::Ping(nonce)
            }
            PacketKind::PLAY => {
                let seconds = u32::from_be_bytes(payload[0..4].try_into().unwrap());
                let nanoseconds = u32::from_be_bytes(payload[4..8].try_into().unwrap());
                let frequency_hz = u32::from_be_bytes(payload[8..12].try_into().unwrap());
                let amplitude = f32::from_be_bytes(payload[12..16].try_into().unwrap());
                let voice_id = u32::from_be_bytes(payload[16..20].try_into().unwrap());

                Packet::Play(Play {
                    duration: Duration::new(seconds as u64, nanoseconds),
                    frequency_hz,
                    amplitude,
                    voice_id,
                })
            }
            PacketKind::CAPS => {
                let mut name = [0u8; 4];
                name.copy_from_slice(&payload[0..4]);

                let num_voices = u32::from_le_bytes(payload[4..8].try_into().unwrap());

                let mut identity = [0u8; 24];
                identity.copy_from_slice(&payload[8..32]);

                Packet::Caps(Caps { name, num_voices, identity })
            }
            _ => {
                let mut raw = [0u8; 32];
                raw.copy_from_slice(payload);
                Packet::Unknown { kind, payload: raw }
            }
        };

        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(packet: Packet) {
        let buf = packet.serialize();
        assert_eq!(buf.len(), TOTAL_LEN);
        let decoded = Packet::deserialize(&buf).expect("decode");
        assert_eq!(decoded, packet);
    }

    #[test]
    fn keepalive_roundtrips() {
        roundtrip(Packet::KeepAlive);
    }

    #[test]
    fn quit_roundtrips() {
        roundtrip(Packet::Quit);
    }

    #[test]
    fn ping_roundtrips_opaque_payload() {
        let mut nonce = [0u8; 32];
        for (i, b) in nonce.iter_mut().enumerate() {
            *b = i as u8;
        }
        roundtrip(Packet::Ping(nonce));
    }

    #[test]
    fn play_roundtrips_bit_identical() {
        roundtrip(Packet::Play(Play {
            duration: Duration::new(5, 0),
            frequency_hz: 440,
            amplitude: 0.5,
            voice_id: 1,
        }));
    }

    #[test]
    fn play_preserves_nanosecond_precision() {
        roundtrip(Packet::Play(Play {
            duration: Duration::new(1, 1),
            frequency_hz: 1,
            amplitude: 0.0,
            voice_id: 0,
        }));
    }

    #[test]
    fn caps_roundtrips() {
        roundtrip(Packet::Caps(Caps {
            name: *b"gogo",
            num_voices: 1,
            identity: [7u8; 24],
        }));
    }

    #[test]
    fn unknown_kind_is_not_an_error() {
        let mut payload = [0u8; 32];
        payload[0] = 0xAB;
        let buf_kind = 0x1234_5678u32;

        let packet = Packet::Unknown { kind: buf_kind, payload };
        roundtrip(packet);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let short = [0u8; 10];
        assert!(matches!(
            Packet::deserialize(&short),
            Err(DecodeError::WrongLength { actual: 10 })
        ));

        let long = [0u8; 37];
        assert!(matches!(
            Packet::deserialize(&long),
            Err(DecodeError::WrongLength { actual: 37 })
        ));
    }

    #[test]
    fn kind_tag_is_always_little_endian() {
        let packet = Packet::Play(Play {
            duration: Duration::new(1, 0),
            frequency_hz: 200,
            amplitude: 1.0,
            voice_id: 3,
        });

        let buf = packet.serialize();
        assert_eq!(&buf[0..4], &3u32.to_le_bytes());
    }

    #[test]
    fn caps_num_voices_is_little_endian_while_play_fields_are_big_endian() {
        let caps = Packet::Caps(Caps { name: *b"test", num_voices: 1, identity: [0; 24] });
        let buf = caps.serialize();
        assert_eq!(&buf[8..12], &1u32.to_le_bytes());

        let play = Packet::Play(Play {
            duration: Duration::new(0, 0),
            frequency_hz: 256,
            amplitude: 0.0,
            voice_id: 0,
        });
        let buf = play.serialize();
        assert_eq!(&buf[12..16], &256u32.to_be_bytes());
    }
}
