use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::curve::{AddressMapper, CurveError, CurveMapper};
use crate::listener::{ListenerSettings, DEFAULT_MAX_LINE_BYTES, DEFAULT_PORT};
use crate::state::MAX_RASTER_SIDE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Curve(#[from] CurveError),

    #[error("queue capacity must be at least 1")]
    ZeroQueueCapacity,

    #[error("maximum line size must be at least 1 byte")]
    ZeroMaxLine,

    #[error("order {order} needs a raster wider than {max} pixels", max = MAX_RASTER_SIDE)]
    RasterTooLarge { order: u32 },
}

/// Connection-log visualiser: paints IPv4 traffic onto a Hilbert curve.
#[derive(Debug, Clone, Parser)]
#[command(name = "ipviz", version, about)]
pub struct Config {
    /// Address to listen on for log feeds.
    #[arg(long, env = "IPVIZ_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// TCP port for log feeds.
    #[arg(long, env = "IPVIZ_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Side of the square raster; must be a power of two.
    #[arg(long, env = "IPVIZ_ORDER", default_value_t = 1024)]
    pub order: u32,

    /// Low address bits folded into one pixel (12 = 4096 addresses per pixel).
    #[arg(long, env = "IPVIZ_BUCKET_SHIFT", default_value_t = 12)]
    pub bucket_shift: u32,

    /// Events buffered between connections and the aggregator.
    #[arg(long, env = "IPVIZ_QUEUE_CAPACITY", default_value_t = 100)]
    pub queue_capacity: usize,

    /// Longest accepted log line, in bytes.
    #[arg(long, env = "IPVIZ_MAX_LINE_BYTES", default_value_t = DEFAULT_MAX_LINE_BYTES)]
    pub max_line_bytes: usize,

    /// Seconds of silence before a feed is disconnected (0 = never).
    #[arg(long, env = "IPVIZ_IDLE_TIMEOUT", default_value_t = 0)]
    pub idle_timeout: u64,

    /// Serve read-only stats over HTTP on this address.
    #[arg(long, env = "IPVIZ_DASHBOARD")]
    pub dashboard: Option<SocketAddr>,

    /// Logging verbosity (trace, debug, info, warn, error) or a filter directive.
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.mapper()?;
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.max_line_bytes == 0 {
            return Err(ConfigError::ZeroMaxLine);
        }
        Ok(())
    }

    /// Curve and bucketing for this run. The order is also the raster side,
    /// so it is capped well below what the curve alone supports.
    pub fn mapper(&self) -> Result<AddressMapper, ConfigError> {
        let curve = CurveMapper::new(self.order)?;
        if self.order > MAX_RASTER_SIDE {
            return Err(ConfigError::RasterTooLarge { order: self.order });
        }
        Ok(AddressMapper::new(curve, self.bucket_shift)?)
    }

    pub fn listener_settings(&self) -> ListenerSettings {
        ListenerSettings {
            max_line_bytes: self.max_line_bytes,
            idle_timeout: (self.idle_timeout > 0).then(|| Duration::from_secs(self.idle_timeout)),
        }
    }
}
