//! Station context for multi-station logging
//!
//! A simulation runs many engines in one process, and a deployed host may
//! run one per radio port. [`StationContextGuard`] records which station
//! the current thread is working for, so layers and spans can stamp it on
//! every line.

use std::cell::RefCell;

use axmesh_core::Callsign;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Station context stored in thread-local storage
#[derive(Debug, Clone, PartialEq)]
pub struct StationContextData {
    /// The station's callsign
    pub station: String,
    /// What the engine is doing for that station
    pub role: StationRole,
    /// Unique id of this engine session
    pub instance_id: Uuid,
    /// When the session started (wall clock, for log correlation only)
    pub started_at: DateTime<Utc>,
}

/// What an engine instance is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationRole {
    /// Listening to a real channel
    Live,
    /// Driven by the traffic generator
    Simulated,
    /// Replaying a capture log after a restore
    Replay,
}

impl std::fmt::Display for StationRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StationRole::Live => write!(f, "live"),
            StationRole::Simulated => write!(f, "simulated"),
            StationRole::Replay => write!(f, "replay"),
        }
    }
}

thread_local! {
    static STATION_CONTEXT: RefCell<Option<StationContextData>> = const { RefCell::new(None) };
}

/// RAII guard for station context
///
/// Sets the station for the current thread; dropping it restores whatever
/// was set before.
///
/// # Example
///
/// ```ignore
/// use axmesh_logging::context::{StationContextGuard, StationRole};
///
/// let _guard = StationContextGuard::new(&local, StationRole::Live);
/// tracing::info!("Engine started");
/// ```
pub struct StationContextGuard {
    previous: Option<StationContextData>,
}

impl StationContextGuard {
    /// Set the station for the current scope with a fresh instance id
    pub fn new(station: &Callsign, role: StationRole) -> Self {
        Self::with_instance_id(station, role, Uuid::new_v4())
    }

    /// Set the station with a known instance id
    ///
    /// Keeps the id stable across a snapshot restore of the same session.
    pub fn with_instance_id(station: &Callsign, role: StationRole, instance_id: Uuid) -> Self {
        let context = StationContextData {
            station: station.to_string(),
            role,
            instance_id,
            started_at: Utc::now(),
        };
        let previous = STATION_CONTEXT.with(|ctx| ctx.borrow_mut().replace(context));
        Self { previous }
    }

    /// The current station context, if any
    pub fn current() -> Option<StationContextData> {
        STATION_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    /// The current station callsign, if set
    pub fn current_station() -> Option<String> {
        Self::current().map(|ctx| ctx.station)
    }

    /// The current instance id, if set
    pub fn current_instance_id() -> Option<Uuid> {
        Self::current().map(|ctx| ctx.instance_id)
    }
}

impl Drop for StationContextGuard {
    fn drop(&mut self) {
        STATION_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Run a block with a station context set
///
/// # Example
///
/// ```ignore
/// with_station_context!(&local, StationRole::Replay, {
///     engine.replay(packets);
/// });
/// ```
#[macro_export]
macro_rules! with_station_context {
    ($station:expr, $role:expr, $body:block) => {{
        let _guard = $crate::context::StationContextGuard::new($station, $role);
        $body
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(s: &str) -> Callsign {
        Callsign::parse(s).unwrap()
    }

    #[test]
    fn test_station_context_guard() {
        assert!(StationContextGuard::current().is_none());

        {
            let _guard = StationContextGuard::new(&call("n0call-3"), StationRole::Live);
            let ctx = StationContextGuard::current().unwrap();
            assert_eq!(ctx.station, "N0CALL-3");
            assert_eq!(ctx.role, StationRole::Live);
        }

        assert!(StationContextGuard::current().is_none());
    }

    #[test]
    fn test_nested_contexts() {
        let _outer = StationContextGuard::new(&call("K1ABC"), StationRole::Simulated);
        assert_eq!(StationContextGuard::current_station(), Some("K1ABC".to_string()));

        {
            let _inner = StationContextGuard::new(&call("K2DEF"), StationRole::Replay);
            assert_eq!(StationContextGuard::current_station(), Some("K2DEF".to_string()));
        }

        assert_eq!(StationContextGuard::current_station(), Some("K1ABC".to_string()));
    }

    #[test]
    fn test_with_instance_id() {
        let id = Uuid::new_v4();
        let _guard = StationContextGuard::with_instance_id(&call("K1ABC"), StationRole::Replay, id);
        assert_eq!(StationContextGuard::current_instance_id(), Some(id));
    }

    #[test]
    fn test_macro_scopes_context() {
        let station = with_station_context!(&call("W3GHI"), StationRole::Simulated, {
            StationContextGuard::current_station()
        });
        assert_eq!(station, Some("W3GHI".to_string()));
        assert!(StationContextGuard::current().is_none());
    }
}
