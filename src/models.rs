pub mod domain {
    use std::fmt;

    use crate::address::Address;

    /// Which end of a logged connection an address was seen on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Role {
        Originator,
        Responder,
    }

    impl Role {
        /// Log field carrying this role's host address.
        pub fn field(self) -> &'static str {
            match self {
                Role::Originator => "id.orig_h",
                Role::Responder => "id.resp_h",
            }
        }
    }

    impl fmt::Display for Role {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Role::Originator => f.write_str("originator"),
                Role::Responder => f.write_str("responder"),
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ConnectionEvent {
        pub address: Address,
        pub role: Role,
    }

    impl ConnectionEvent {
        pub fn originator(address: Address) -> Self {
            Self {
                address,
                role: Role::Originator,
            }
        }

        pub fn responder(address: Address) -> Self {
            Self {
                address,
                role: Role::Responder,
            }
        }
    }
}

pub mod dto {
    use serde::Serialize;

    use crate::address::Address;
    use crate::state::Stats;

    #[derive(Debug, Serialize, Clone)]
    pub struct StatsDTO {
        pub total_events: u64,
        pub dropped_events: u64,
        pub last_address: Option<Address>,
        pub last_event_at: Option<String>,
        pub width: u32,
        pub height: u32,
    }

    impl From<Stats> for StatsDTO {
        fn from(stats: Stats) -> Self {
            StatsDTO {
                total_events: stats.total_events,
                dropped_events: stats.dropped_events,
                last_address: stats.last_address,
                last_event_at: stats.last_event_at.map(|at| at.to_rfc3339()),
                width: stats.width,
                height: stats.height,
            }
        }
    }

    #[derive(Debug, Serialize, Clone)]
    pub struct LookupDTO {
        pub x: i64,
        pub y: i64,
        pub address: Address,
    }
}
