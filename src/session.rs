// Recording session lifecycle: start/stop/save/clear, fix intake and fuel bookkeeping

use chrono::{Local, TimeZone};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::dashboard::StatsListener;
use crate::errors::RideError;
use crate::fuel::{FuelState, PersistedFuel};
use crate::notify::{NotificationPermission, Notifier};
use crate::storage::{
    KeyValueStore, PersistentState, SAVED_SESSIONS_KEY, TEMP_POSITIONS_KEY, TEMP_STARTED_AT_KEY,
};
use crate::telemetry::aggregator::SessionStats;
use crate::telemetry::stop_detector::{StopDetector, StopNotification};
use crate::telemetry::{
    FixEvent, GeolocationPermission, PositionSample, RawFix, RideStats, SourceStatus,
};

pub const DISCARD_SESSION_PROMPT: &str =
    "You have a temporary session. Starting a new recording will clear it. Continue?";
pub const CLEAR_SESSION_PROMPT: &str =
    "Clear all currently recorded points? This cannot be undone.";

/// A saved recording. Never modified once appended to the archive.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedSession {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
    pub positions: Vec<PositionSample>,
    pub stats: SessionStats,
}

/// Everything the display layer shows about the current ride
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct StatsSnapshot {
    pub recording: bool,
    pub points: usize,
    pub distance_km: f64,
    pub last_speed_kmh: f64,
    pub avg_speed_kmh: f64,
    pub area_m2: f64,
    pub current_fuel_l: f64,
    pub tank_capacity_l: f64,
    pub fuel_percentage: f64,
    pub estimated_range_km: f64,
}

/// Display name of a session saved at `created_at_ms`, in local time
pub fn session_name(created_at_ms: i64) -> String {
    match Local.timestamp_millis_opt(created_at_ms).single() {
        Some(created_at) => format!("Session {}", created_at.format("%-m/%-d/%Y, %-I:%M:%S %p")),
        None => format!("Session {}", created_at_ms),
    }
}

/// Owns the live sample sequence, the fuel state and the stop timer.
///
/// All mutation goes through `&mut self`, so a single owner applies fixes, timer
/// polls and user commands one at a time. Every mutation is mirrored to the store.
pub struct SessionController<S: KeyValueStore, C: Clock, N: Notifier> {
    store: S,
    clock: C,
    notifier: N,
    recording: bool,
    positions: PersistentState<Vec<PositionSample>>,
    started_at: PersistentState<Option<i64>>,
    archive: PersistentState<Vec<ArchivedSession>>,
    fuel: PersistedFuel,
    last_speed_kmh: f64,
    stop_detector: StopDetector,
    listeners: Vec<Box<dyn StatsListener>>,
}

impl<S: KeyValueStore, C: Clock, N: Notifier> SessionController<S, C, N> {
    /// Restore the live session, fuel state and archive from `store`
    pub fn new(store: S, clock: C, notifier: N, config: &AppConfig) -> Self {
        let positions = PersistentState::load(&store, TEMP_POSITIONS_KEY, Vec::new());
        let started_at = PersistentState::load(&store, TEMP_STARTED_AT_KEY, None);
        let archive = PersistentState::load(&store, SAVED_SESSIONS_KEY, Vec::new());
        let fuel = PersistedFuel::load(&store, config.default_fuel());
        debug!(
            "Restored {} live samples and {} archived sessions",
            positions.get().len(),
            archive.get().len()
        );

        Self {
            store,
            clock,
            notifier,
            recording: false,
            positions,
            started_at,
            archive,
            fuel,
            last_speed_kmh: 0.,
            stop_detector: StopDetector::new(
                config.stop_speed_threshold_kmh,
                config.stop_window(),
            ),
            listeners: Vec::new(),
        }
    }

    /// Register a read-only view that is told about every stats change
    pub fn subscribe(&mut self, listener: Box<dyn StatsListener>) {
        self.listeners.push(listener);
    }

    /// Begin recording.
    ///
    /// Fails without touching any state when the source is unavailable or the
    /// permission is denied. An unsaved session left over from a previous recording
    /// is only discarded if `confirm` approves it.
    pub fn start(
        &mut self,
        status: SourceStatus,
        confirm: impl FnOnce(&str) -> bool,
    ) -> Result<(), RideError> {
        if self.recording {
            debug!("Already recording");
            return Ok(());
        }
        if !status.available {
            warn!("Geolocation is not available");
            return Err(RideError::GeolocationUnavailable);
        }
        match status.permission {
            GeolocationPermission::Denied => return Err(RideError::GeolocationPermissionDenied),
            GeolocationPermission::Unknown => warn!("Could not query geolocation permission."),
            GeolocationPermission::Granted | GeolocationPermission::Prompt => {}
        }

        if !self.positions.get().is_empty() {
            if !confirm(DISCARD_SESSION_PROMPT) {
                return Err(RideError::ConfirmationDeclined {
                    action: "start a new recording".to_string(),
                });
            }
            info!(
                "Discarding unsaved session with {} samples",
                self.positions.get().len()
            );
            self.reset_live_session();
        }

        self.recording = true;
        if self.started_at.get().is_none() {
            let now = self.clock.now_ms();
            self.started_at.set(&mut self.store, Some(now));
        }
        info!("Recording started");
        self.publish();
        Ok(())
    }

    /// Apply one event from the fix source. A fix error stops the recording and is
    /// returned so it can be shown to the user.
    pub fn handle_event(&mut self, event: FixEvent) -> Result<(), RideError> {
        match event {
            FixEvent::Fix(fix) => {
                self.on_fix(fix);
                Ok(())
            }
            FixEvent::Error(e) => {
                error!("Geolocation error: {}", e.message);
                self.stop();
                Err(RideError::FixSourceError { reason: e.message })
            }
        }
    }

    /// Append a new fix to the live session, ignored unless recording
    pub fn on_fix(&mut self, fix: RawFix) {
        if !self.recording {
            debug!("Ignoring fix received while not recording");
            return;
        }

        let now = self.clock.now_ms();
        let sample = fix.into_sample(now);
        self.last_speed_kmh = sample.speed_kmh();
        if let Some(notification) = self.stop_detector.on_speed(self.last_speed_kmh, now) {
            self.deliver(notification);
        }

        self.positions.update(&mut self.store, |p| p.push(sample));

        let positions = self.positions.get();
        if let [.., previous, last] = positions.as_slice() {
            let mut fuel = self.fuel.state();
            fuel.apply_sample_pair(previous, last);
            self.fuel.commit(&mut self.store, fuel);
        }
        debug!("Recorded sample #{}", self.positions.get().len());
        self.publish();
    }

    /// Fire the stop notification if its window elapsed. Call periodically.
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();
        if let Some(notification) = self.stop_detector.poll(now) {
            self.deliver(notification);
        }
    }

    /// Stop recording and cancel a pending stop notification. Idempotent.
    pub fn stop(&mut self) {
        self.stop_detector.cancel();
        if !self.recording {
            return;
        }
        self.recording = false;
        self.last_speed_kmh = 0.;
        info!(
            "Recording stopped with {} samples",
            self.positions.get().len()
        );
        self.publish();
    }

    /// Archive the live session with its stats and clear it
    pub fn save(&mut self) -> Result<ArchivedSession, RideError> {
        if self.positions.get().is_empty() {
            return Err(RideError::NothingToSave);
        }

        let now = self.clock.now_ms();
        let stats = RideStats::compute(self.positions.get(), *self.started_at.get(), now);
        let session = ArchivedSession {
            id: now,
            name: session_name(now),
            created_at: now,
            positions: self.positions.get().clone(),
            stats: stats.session_stats(),
        };

        let mut sessions = self.archive.get().clone();
        sessions.push(session.clone());
        self.archive
            .try_set(&mut self.store, sessions)
            .inspect_err(|e| error!("Failed to save session: {}", e))?;

        self.reset_live_session();
        info!(
            "Saved \"{}\": {:.2} km, {:.1} km/h average",
            session.name, session.stats.km, session.stats.avg_kmh
        );
        self.publish();
        Ok(session)
    }

    /// Discard the live session. Destructive, so `confirm` has to approve it.
    pub fn clear(&mut self, confirm: impl FnOnce(&str) -> bool) -> Result<(), RideError> {
        if !confirm(CLEAR_SESSION_PROMPT) {
            return Err(RideError::ConfirmationDeclined {
                action: "clear recorded points".to_string(),
            });
        }
        self.reset_live_session();
        info!("Live session cleared");
        self.publish();
        Ok(())
    }

    pub fn refuel(&mut self, liters: f64) -> Result<(), RideError> {
        self.update_fuel(|fuel| fuel.refuel(liters))
    }

    pub fn refuel_from_input(&mut self, input: &str) -> Result<(), RideError> {
        self.update_fuel(|fuel| fuel.refuel_from_input(input))
    }

    pub fn set_tank_capacity(&mut self, liters: f64) -> Result<(), RideError> {
        self.update_fuel(|fuel| fuel.set_tank_capacity(liters))
    }

    pub fn set_avg_mileage(&mut self, km_per_l: f64) -> Result<(), RideError> {
        self.update_fuel(|fuel| fuel.set_avg_mileage(km_per_l))
    }

    /// Ask for notification permission, confirming with a notification once granted
    pub fn request_notifications(&mut self) -> NotificationPermission {
        match self.notifier.permission() {
            NotificationPermission::Granted => {
                self.notifier
                    .notify("Notifications are already enabled!", "");
                NotificationPermission::Granted
            }
            NotificationPermission::Denied => NotificationPermission::Denied,
            NotificationPermission::Default => {
                let permission = self.notifier.request_permission();
                if permission == NotificationPermission::Granted {
                    self.notifier.notify("Notifications enabled!", "");
                }
                permission
            }
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        let ride = RideStats::compute(
            self.positions.get(),
            *self.started_at.get(),
            self.clock.now_ms(),
        );
        let fuel = self.fuel.state();
        StatsSnapshot {
            recording: self.recording,
            points: self.positions.get().len(),
            distance_km: ride.distance_km,
            last_speed_kmh: self.last_speed_kmh,
            avg_speed_kmh: ride.avg_speed_kmh,
            area_m2: ride.area_m2,
            current_fuel_l: fuel.current_fuel_l,
            tank_capacity_l: fuel.tank_capacity_l,
            fuel_percentage: fuel.fuel_percentage(),
            estimated_range_km: fuel.estimated_range_km(),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn positions(&self) -> &[PositionSample] {
        self.positions.get()
    }

    pub fn started_at(&self) -> Option<i64> {
        *self.started_at.get()
    }

    pub fn archived_sessions(&self) -> &[ArchivedSession] {
        self.archive.get()
    }

    pub fn fuel(&self) -> FuelState {
        self.fuel.state()
    }

    pub fn is_stop_pending(&self) -> bool {
        self.stop_detector.is_armed()
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn update_fuel(
        &mut self,
        f: impl FnOnce(&mut FuelState) -> Result<(), RideError>,
    ) -> Result<(), RideError> {
        let mut fuel = self.fuel.state();
        f(&mut fuel)?;
        self.fuel.commit(&mut self.store, fuel);
        self.publish();
        Ok(())
    }

    fn reset_live_session(&mut self) {
        self.positions.set(&mut self.store, Vec::new());
        self.started_at.set(&mut self.store, None);
    }

    fn deliver(&mut self, notification: StopNotification) {
        if self.notifier.permission() == NotificationPermission::Granted {
            self.notifier.notify(&notification.title, &notification.body);
        } else {
            debug!("Stop detected, notifications not permitted");
        }
    }

    fn publish(&mut self) {
        if self.listeners.is_empty() {
            return;
        }
        let snapshot = self.stats();
        for listener in self.listeners.iter_mut() {
            listener.stats_changed(&snapshot);
        }
    }
}
