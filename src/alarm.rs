use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use log::{debug, info, warn};

use crate::{
    api::PlayerApi,
    error::AlarmError,
    notification::{Notification, Notifier},
    playback::PlaybackDriver,
    time::CanonicalTime,
};

/// volume held while the silence playlist plays; 0 could be treated as mute by the device
pub const SILENT_VOLUME: i32 = 1;
pub const MAX_VOLUME: i32 = 100;
pub const NOTIFICATION_TITLE: &str = "Spotify Alarm";
pub const NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(10);

/// what the user asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmConfig {
    pub playlist: String,
    pub target_time: CanonicalTime,
    /// the time exactly as typed, used in the notification
    pub raw_time: String,
    pub target_volume: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmTiming {
    pub poll_interval: Duration,
    pub ramp_delay: Duration,
    pub ramp_step: i32,
}

impl Default for AlarmTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            ramp_delay: Duration::from_millis(500),
            ramp_step: 5,
        }
    }
}

pub trait Clock {
    /// the current local time of day
    fn now(&mut self) -> CanonicalTime;

    fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&mut self) -> CanonicalTime {
        CanonicalTime::from_time(chrono::Local::now().time())
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// stops the loop at the next tick or ramp step
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// volumes set while fading in: `start + step`, `start + 2 * step`, ... capped at [`MAX_VOLUME`],
/// ending with the first value at or above `target`
#[derive(Debug, Clone)]
pub struct VolumeRamp {
    current: i32,
    step: i32,
    target: i32,
}

impl VolumeRamp {
    #[must_use]
    pub const fn new(start: i32, step: i32, target: i32) -> Self {
        Self {
            current: start,
            step,
            target,
        }
    }
}

impl Iterator for VolumeRamp {
    type Item = i32;

    fn next(&mut self) -> Option<i32> {
        // stopping at the cap keeps a target above 100 from ramping forever
        if self.current >= self.target || self.current >= MAX_VOLUME || self.step <= 0 {
            return None;
        }
        self.current = self.current.saturating_add(self.step).min(MAX_VOLUME);
        Some(self.current)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Waiting,
    Ramping,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Fired,
    Cancelled,
}

/// waits for the target time on the silence playlist, then fades the playlist in
#[derive(Debug)]
pub struct AlarmLoop<A, C, N> {
    config: AlarmConfig,
    silence_context: String,
    timing: AlarmTiming,
    driver: PlaybackDriver<A>,
    clock: C,
    notifier: N,
    cancel: CancelToken,
    phase: Phase,
}

impl<A: PlayerApi, C: Clock, N: Notifier> AlarmLoop<A, C, N> {
    pub fn new(
        config: AlarmConfig,
        silence_context: impl Into<String>,
        driver: PlaybackDriver<A>,
        clock: C,
        notifier: N,
    ) -> Self {
        Self {
            config,
            silence_context: silence_context.into(),
            timing: AlarmTiming::default(),
            driver,
            clock,
            notifier,
            cancel: CancelToken::new(),
            phase: Phase::Waiting,
        }
    }

    #[must_use]
    pub fn with_timing(mut self, timing: AlarmTiming) -> Self {
        self.timing = timing;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// # Errors
    /// the first failed spotify request ends the alarm
    pub fn run(&mut self) -> Result<Outcome, AlarmError> {
        loop {
            if self.cancel.is_cancelled() {
                info!("alarm cancelled while {:?}", self.phase);
                return Ok(Outcome::Cancelled);
            }
            match self.phase {
                Phase::Waiting => self.tick()?,
                Phase::Ramping => self.ramp()?,
                Phase::Done => {
                    self.notify();
                    return Ok(Outcome::Fired);
                }
            }
        }
    }

    fn tick(&mut self) -> Result<(), AlarmError> {
        // reissued every tick in case something else took over the device
        self.driver.play(&self.silence_context)?;
        self.driver.set_volume(SILENT_VOLUME)?;

        let now = self.clock.now();
        println!("{now} {}", self.config.target_time);
        if now == self.config.target_time {
            info!("it's {now}, starting {}", self.config.playlist);
            self.phase = Phase::Ramping;
        } else {
            debug!("{now} is not {}, waiting", self.config.target_time);
            self.clock.sleep(self.timing.poll_interval);
        }
        Ok(())
    }

    fn ramp(&mut self) -> Result<(), AlarmError> {
        self.driver.play(&self.config.playlist)?;
        let ramp = VolumeRamp::new(
            SILENT_VOLUME,
            self.timing.ramp_step,
            self.config.target_volume,
        );
        for volume in ramp {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            self.driver.set_volume(volume)?;
            self.clock.sleep(self.timing.ramp_delay);
        }
        self.phase = Phase::Done;
        Ok(())
    }

    fn notify(&mut self) {
        let notification = Notification {
            title: NOTIFICATION_TITLE.to_string(),
            message: format!("Playing your playlist at {}", self.config.raw_time),
            timeout: NOTIFICATION_TIMEOUT,
        };
        if let Err(e) = self.notifier.notify(&notification) {
            warn!("couldn't show notification: {e}");
        }
    }

    pub fn into_parts(self) -> (PlaybackDriver<A>, C, N) {
        (self.driver, self.clock, self.notifier)
    }
}
