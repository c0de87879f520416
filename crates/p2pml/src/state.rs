use parking_lot::Mutex;
use tracing::info;

/// Whether segment fetches may currently be routed through the delivery engine.
#[derive(Debug)]
pub struct EngineStateGate {
    enabled: Mutex<bool>,
}

impl EngineStateGate {
    pub const DEFAULT_ENABLED: bool = true;

    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Mutex::new(enabled),
        }
    }

    pub fn get(&self) -> bool {
        *self.enabled.lock()
    }

    /// Sets the gate. Returns `false` when the value was already set.
    pub fn set(&self, enabled: bool) -> bool {
        let mut current = self.enabled.lock();
        if *current == enabled {
            return false;
        }
        *current = enabled;
        drop(current);

        info!(enabled, "Peer delivery state changed");
        true
    }

    pub fn reset(&self) {
        *self.enabled.lock() = Self::DEFAULT_ENABLED;
    }
}

impl Default for EngineStateGate {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ENABLED)
    }
}
