use log::debug;

use crate::{api::PlayerApi, error::AlarmError};

/// sends play and volume commands for one device
#[derive(Debug)]
pub struct PlaybackDriver<A> {
    api: A,
    device_id: String,
}

impl<A: PlayerApi> PlaybackDriver<A> {
    pub fn new(api: A, device_id: impl Into<String>) -> Self {
        Self {
            api,
            device_id: device_id.into(),
        }
    }

    /// # Errors
    /// [`AlarmError::CollaboratorRequestFailed`] if spotify rejects the request
    pub fn play(&mut self, context: &str) -> Result<(), AlarmError> {
        debug!("playing {context} on {}", self.device_id);
        self.api
            .start_playback(&self.device_id, context)
            .map_err(|source| AlarmError::CollaboratorRequestFailed {
                action: "start playback",
                source,
            })
    }

    /// `level` is passed through unchecked
    ///
    /// # Errors
    /// [`AlarmError::CollaboratorRequestFailed`] if spotify rejects the request
    pub fn set_volume(&mut self, level: i32) -> Result<(), AlarmError> {
        debug!("setting volume of {} to {level}", self.device_id);
        self.api
            .set_volume(&self.device_id, level)
            .map_err(|source| AlarmError::CollaboratorRequestFailed {
                action: "set volume",
                source,
            })
    }

    pub fn into_inner(self) -> A {
        self.api
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{Call, FakePlayer};

    #[test]
    fn commands_target_the_device() {
        let mut driver = PlaybackDriver::new(FakePlayer::default(), "dev-1");
        driver.play("spotify:playlist:abc").unwrap();
        driver.set_volume(1).unwrap();
        assert_eq!(
            driver.into_inner().calls,
            vec![
                Call::Play {
                    device: "dev-1".to_string(),
                    context: "spotify:playlist:abc".to_string()
                },
                Call::Volume {
                    device: "dev-1".to_string(),
                    level: 1
                },
            ]
        );
    }

    #[test]
    fn volume_is_not_range_checked() {
        let mut driver = PlaybackDriver::new(FakePlayer::default(), "dev-1");
        driver.set_volume(150).unwrap();
        driver.set_volume(-3).unwrap();
        assert_eq!(driver.into_inner().volumes(), vec![150, -3]);
    }

    #[test]
    fn failures_name_the_request() {
        let mut api = FakePlayer::default();
        api.fail_on_call = Some(2);
        let mut driver = PlaybackDriver::new(&mut api, "gone");
        driver.play("ctx:A").unwrap();
        assert!(matches!(
            driver.set_volume(40),
            Err(AlarmError::CollaboratorRequestFailed {
                action: "set volume",
                ..
            })
        ));
    }
}
