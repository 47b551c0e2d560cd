//! Callbacks the host registers with the device

use crate::layer::DisplayId;

/// Host callback table
///
/// The host owns it; the device only keeps a weak reference, so events
/// raised after the host dropped its table are discarded.
pub trait HwcProcs: Send + Sync {
    /// A vertical refresh happened on `display` at `timestamp_ns`
    /// (`CLOCK_MONOTONIC` nanoseconds)
    fn vsync(&self, display: DisplayId, timestamp_ns: i64);

    /// Ask the host to redraw the screen
    fn invalidate(&self) {}

    /// A display was connected or disconnected
    fn hotplug(&self, _display: DisplayId, _connected: bool) {}
}
