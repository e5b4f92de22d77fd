//! Device conditions, clocks and change signals
//!
//! The restore progress machine asks these predicates to decide whether a
//! media restore can proceed, and subscribes to a [`SignalSource`] so it can
//! recompute its status when conditions change.

use std::sync::{Arc, Mutex};

use chrono::Utc;

/// Platform predicates consulted by restore status
pub trait Environment: Send + Sync {
    fn is_wifi_available(&self) -> bool;
    fn is_network_available(&self) -> bool;
    fn is_battery_ok(&self) -> bool;
    fn is_disk_space_ok(&self) -> bool;
    fn available_disk_bytes(&self) -> u64;
}

/// Fixed answers; used by the CLI, which runs on a desktop, and by tests
#[derive(Debug, Clone)]
pub struct StaticEnvironment {
    pub wifi: bool,
    pub network: bool,
    pub battery_ok: bool,
    pub disk_space_ok: bool,
    pub available_disk_bytes: u64,
}

impl Default for StaticEnvironment {
    fn default() -> Self {
        Self {
            wifi: true,
            network: true,
            battery_ok: true,
            disk_space_ok: true,
            available_disk_bytes: u64::MAX,
        }
    }
}

impl Environment for StaticEnvironment {
    fn is_wifi_available(&self) -> bool {
        self.wifi
    }

    fn is_network_available(&self) -> bool {
        self.network
    }

    fn is_battery_ok(&self) -> bool {
        self.battery_ok
    }

    fn is_disk_space_ok(&self) -> bool {
        self.disk_space_ok
    }

    fn available_disk_bytes(&self) -> u64 {
        self.available_disk_bytes
    }
}

/// Wall clock in milliseconds since the epoch
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: Mutex<i64>,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: Mutex::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        if let Ok(mut now) = self.now_ms.lock() {
            *now = now_ms;
        }
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.lock().map(|now| *now).unwrap_or_default()
    }
}

/// Callback invoked when attachment rows, connectivity or battery change
pub type SignalCallback = Arc<dyn Fn() + Send + Sync>;

/// Source of change notifications
///
/// At most one callback is attached per source; attaching replaces it.
pub trait SignalSource: Send + Sync {
    fn attach(&self, callback: SignalCallback);
    fn detach(&self);
}

/// A signal source fired by hand
#[derive(Default)]
pub struct ManualSignalSource {
    callback: Mutex<Option<SignalCallback>>,
}

impl ManualSignalSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.callback.lock().map(|c| c.is_some()).unwrap_or(false)
    }

    /// Invoke the attached callback, if any
    pub fn fire(&self) {
        let callback = self.callback.lock().ok().and_then(|c| c.clone());
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl SignalSource for ManualSignalSource {
    fn attach(&self, callback: SignalCallback) {
        if let Ok(mut slot) = self.callback.lock() {
            *slot = Some(callback);
        }
    }

    fn detach(&self) {
        if let Ok(mut slot) = self.callback.lock() {
            *slot = None;
        }
    }
}
