//! Connection-log ingestion for an IPv4 Hilbert-curve visualiser.
//!
//! Log feeds connect over TCP and stream one JSON record per line. Each
//! record's originator and responder hosts become [`ConnectionEvent`]s on a
//! bounded queue; a single [`Aggregator`] places them on the curve and
//! paints the shared [`VisualizationState`], which renderers read through a
//! locked snapshot.

pub mod address;
pub mod aggregator;
pub mod config;
pub mod curve;
pub mod dashboard;
pub mod listener;
pub mod models;
pub mod parser;
pub mod state;

pub use address::{Address, AddressError};
pub use aggregator::{event_channel, Aggregator, AggregatorReport, EventSink, EventSource};
pub use config::{Config, ConfigError};
pub use curve::{AddressMapper, CurveError, CurveMapper, GridCoordinate};
pub use listener::{ConnectionListener, ConnectionSummary, ListenerSettings};
pub use models::domain::{ConnectionEvent, Role};
pub use parser::{ConnRecord, RecordError};
pub use state::{Snapshot, Stats, VisualizationState};
