//! # Axmesh Core
//!
//! Core types and errors shared by the axmesh crates.
//!
//! The engine in `axmesh-routing` watches AX.25 traffic heard on a shared
//! channel and infers who is reachable and how. This crate holds the
//! vocabulary it speaks:
//!
//! - [`Callsign`]: Normalized station identifier (`N0CALL`, `N0CALL-7`)
//! - [`ObservedPacket`]: One heard frame, reduced to addresses and a [`FrameClass`]
//! - [`NeighborInfo`], [`RouteInfo`], [`LinkStatRecord`]: The records the engine exposes
//! - [`ObservationOutcome`]: What ingestion did with a packet
//!
//! Frame decoding happens upstream; by the time a packet reaches this crate
//! its addresses are text and its control field has been reduced to a class.

pub mod error;
pub mod event;
pub mod identity;
pub mod packet;
pub mod routing;

// Re-export main types
pub use error::*;
pub use event::*;
pub use identity::*;
pub use packet::*;
pub use routing::*;
