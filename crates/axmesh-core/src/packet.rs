//! Observed packets and frame classification
//!
//! An [`ObservedPacket`] is what the link layer hands the engine after
//! decoding a frame: the raw address text and a [`FrameClass`] derived from
//! the control field. Address text is normalized inside the engine, so a
//! packet with a garbage address is still representable here and gets
//! rejected at ingestion rather than at construction.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Sequence identifier of a packet in the host's capture log
///
/// The engine never assigns these; the persistence collaborator uses them
/// to know where replay should resume after a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PacketId(pub u64);

impl PacketId {
    /// The id following this one
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for PacketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// AX.25 control field values for unnumbered frames, P/F bit masked out
pub mod control {
    pub const UI: u8 = 0x03;
    pub const SABM: u8 = 0x2F;
    pub const SABME: u8 = 0x6F;
    pub const UA: u8 = 0x63;
    pub const DM: u8 = 0x0F;
    pub const DISC: u8 = 0x43;
    pub const FRMR: u8 = 0x87;
    pub const XID: u8 = 0xAF;
    pub const TEST: u8 = 0xE3;
    /// Poll/final bit
    pub const PF: u8 = 0x10;
}

/// Classification of a heard frame, as far as link evidence is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameClass {
    /// Connected-mode I-frame or addressed UI frame carrying user data
    Data,
    /// Routing announcement (NET/ROM style node broadcast)
    RoutingBroadcast,
    /// Beacon or other unacknowledged UI traffic
    Beacon,
    /// Supervisory frame acknowledging the other direction (RR/RNR/REJ)
    Ack {
        /// Whether N(R) advanced past the previous acknowledgement
        progress: bool,
    },
    /// Link setup and teardown (SABM, UA, DISC, DM, FRMR, XID, TEST)
    Connection,
    /// Anything the decoder could not place
    Unknown,
}

impl FrameClass {
    /// Map an AX.25 control byte to a frame class
    ///
    /// Sequence progress and routing-broadcast detection need state the
    /// control byte does not carry, so supervisory frames map to
    /// `Ack { progress: false }` and UI frames to `Beacon`; callers that
    /// know better construct the class directly.
    pub fn from_control(control: u8) -> Self {
        // I-frame: bit 0 clear
        if control & 0x01 == 0 {
            return Self::Data;
        }

        // S-frame: low bits 01
        if control & 0x03 == 0x01 {
            return match (control >> 2) & 0x03 {
                0..=2 => Self::Ack { progress: false },
                _ => Self::Unknown,
            };
        }

        match control & !control::PF {
            control::UI => Self::Beacon,
            control::SABM
            | control::SABME
            | control::UA
            | control::DM
            | control::DISC
            | control::FRMR
            | control::XID
            | control::TEST => Self::Connection,
            _ => Self::Unknown,
        }
    }

    /// Whether this class carries a payload meant for a station
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data)
    }

    /// Whether this class only acknowledges traffic in the other direction
    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack { .. })
    }
}

impl Display for FrameClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Data => write!(f, "data"),
            Self::RoutingBroadcast => write!(f, "routing"),
            Self::Beacon => write!(f, "beacon"),
            Self::Ack { progress: true } => write!(f, "ack+"),
            Self::Ack { progress: false } => write!(f, "ack"),
            Self::Connection => write!(f, "conn"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A frame heard on the channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedPacket {
    /// Source address as decoded
    pub from: String,
    /// Destination address as decoded
    pub to: String,
    /// Digipeater path in transmission order
    pub via: Vec<String>,
    /// Frame classification from the link layer
    pub class: FrameClass,
}

impl ObservedPacket {
    /// Create a packet with an empty via path
    pub fn new(from: impl Into<String>, to: impl Into<String>, class: FrameClass) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            via: Vec::new(),
            class,
        }
    }

    /// Set the digipeater path
    pub fn with_via<S: Into<String>>(mut self, via: impl IntoIterator<Item = S>) -> Self {
        self.via = via.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the packet names any digipeaters
    pub fn is_digipeated(&self) -> bool {
        !self.via.is_empty()
    }
}

impl Display for ObservedPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}>{}", self.from, self.to)?;
        for hop in &self.via {
            write!(f, ",{}", hop)?;
        }
        write!(f, " [{}]", self.class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_control_information() {
        // N(S)=3, N(R)=5 I-frame
        assert_eq!(FrameClass::from_control(0b1010_0110), FrameClass::Data);
        assert_eq!(FrameClass::from_control(0x00), FrameClass::Data);
    }

    #[test]
    fn test_from_control_supervisory() {
        let rr = 0x01 | (2 << 5);
        let rnr = 0x05;
        let rej = 0x09;
        for c in [rr, rnr, rej] {
            assert_eq!(
                FrameClass::from_control(c),
                FrameClass::Ack { progress: false }
            );
        }
        // SREJ-style type 3 is not used on plain AX.25 2.0
        assert_eq!(FrameClass::from_control(0x0D), FrameClass::Unknown);
    }

    #[test]
    fn test_from_control_unnumbered() {
        assert_eq!(FrameClass::from_control(control::UI), FrameClass::Beacon);
        assert_eq!(
            FrameClass::from_control(control::UI | control::PF),
            FrameClass::Beacon
        );
        assert_eq!(
            FrameClass::from_control(control::SABM | control::PF),
            FrameClass::Connection
        );
        assert_eq!(FrameClass::from_control(control::UA), FrameClass::Connection);
        assert_eq!(FrameClass::from_control(control::DISC), FrameClass::Connection);
        assert_eq!(FrameClass::from_control(0xFF), FrameClass::Unknown);
    }

    #[test]
    fn test_packet_builder_and_display() {
        let packet = ObservedPacket::new("K1ABC", "N0CALL", FrameClass::Data)
            .with_via(["DIGI1", "DIGI2*"]);
        assert!(packet.is_digipeated());
        assert_eq!(packet.to_string(), "K1ABC>N0CALL,DIGI1,DIGI2* [data]");
    }

    #[test]
    fn test_packet_serialization() {
        let packet = ObservedPacket::new("K1ABC", "ID", FrameClass::Ack { progress: true });
        let bytes = postcard::to_allocvec(&packet).unwrap();
        let back: ObservedPacket = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(back, packet);
    }

    #[test]
    fn test_packet_id_next() {
        assert_eq!(PacketId(41).next(), PacketId(42));
        assert_eq!(PacketId(7).to_string(), "#7");
    }
}
