// Library interface for ridelog
// This allows integration tests to access internal modules

pub mod clock;
pub mod config;
pub mod dashboard;
pub mod errors;
pub mod fuel;
pub mod geodesy;
pub mod notify;
pub mod session;
pub mod storage;
pub mod telemetry;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use dashboard::{DashboardView, LogDashboard, StatsListener};
pub use errors::RideError;
pub use fuel::FuelState;
pub use geodesy::{coverage_area_m2, distance_meters};
pub use notify::{LogNotifier, NotificationPermission, Notifier};
pub use session::{ArchivedSession, SessionController, StatsSnapshot};
pub use storage::{FileKeyValueStore, KeyValueStore, MemoryStore, PersistentState};
pub use telemetry::{FixEvent, PositionSample, RawFix, RideStats, SourceStatus};
