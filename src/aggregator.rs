use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::curve::AddressMapper;
use crate::models::domain::ConnectionEvent;
use crate::state::VisualizationState;

pub type EventSink = mpsc::Sender<ConnectionEvent>;
pub type EventSource = mpsc::Receiver<ConnectionEvent>;

/// Bounded queue shared by every connection handler. A full queue makes
/// senders wait instead of dropping events.
pub fn event_channel(capacity: usize) -> (EventSink, EventSource) {
    mpsc::channel(capacity.max(1))
}

/// What the aggregator did over its lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorReport {
    pub applied: u64,
    pub dropped: u64,
}

/// Sole writer of the raster. Drains the event queue in dequeue order until
/// every sender is gone.
pub struct Aggregator {
    mapper: AddressMapper,
    state: Arc<VisualizationState>,
    events: EventSource,
    report: AggregatorReport,
}

impl Aggregator {
    pub fn new(mapper: AddressMapper, state: Arc<VisualizationState>, events: EventSource) -> Self {
        Self {
            mapper,
            state,
            events,
            report: AggregatorReport::default(),
        }
    }

    pub async fn run(mut self) -> AggregatorReport {
        info!(
            order = self.mapper.curve().order(),
            shift = self.mapper.shift(),
            "aggregator started"
        );
        while let Some(event) = self.events.recv().await {
            self.apply(event);
        }
        info!(
            applied = self.report.applied,
            dropped = self.report.dropped,
            "aggregator stopped, event queue closed"
        );
        self.report
    }

    fn apply(&mut self, event: ConnectionEvent) {
        match self.mapper.locate(event.address) {
            Ok(coord) => {
                self.state.record(coord, event.role, event.address);
                self.report.applied += 1;
            }
            Err(e) => {
                warn!(
                    address = %event.address,
                    role = %event.role,
                    error = %e,
                    "dropping event outside the grid"
                );
                self.state.record_drop();
                self.report.dropped += 1;
            }
        }
    }
}
