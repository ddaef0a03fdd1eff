use std::fmt;

use crate::error::ApiError;

/// an output device as reported by the player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub kind: String,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}

/// the remote player the alarm drives
pub trait PlayerApi {
    /// # Errors
    /// if the player can't be queried
    fn devices(&mut self) -> Result<Vec<Device>, ApiError>;

    /// # Errors
    /// if playback couldn't be started on `device_id`
    fn start_playback(&mut self, device_id: &str, context: &str) -> Result<(), ApiError>;

    /// # Errors
    /// if the volume couldn't be set on `device_id`
    fn set_volume(&mut self, device_id: &str, volume_percent: i32) -> Result<(), ApiError>;
}

impl<T: PlayerApi + ?Sized> PlayerApi for &mut T {
    fn devices(&mut self) -> Result<Vec<Device>, ApiError> {
        (**self).devices()
    }

    fn start_playback(&mut self, device_id: &str, context: &str) -> Result<(), ApiError> {
        (**self).start_playback(device_id, context)
    }

    fn set_volume(&mut self, device_id: &str, volume_percent: i32) -> Result<(), ApiError> {
        (**self).set_volume(device_id, volume_percent)
    }
}
