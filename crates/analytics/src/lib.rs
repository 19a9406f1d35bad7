//! Signal collectors: read-only queries that feed the attribution pipeline.

pub mod clickhouse_source;
pub mod collect;
pub mod snapshot;
pub mod source;

pub use clickhouse_source::{parse_funnel_rows, ClickHouseSource, FunnelRow};
pub use collect::{collect_signals, CollectedSignals};
pub use snapshot::{SignalSnapshot, SnapshotSource};
pub use source::SignalSource;
