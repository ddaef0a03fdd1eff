use std::{io, process::Command, time::Duration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    /// how long the notification stays visible
    pub timeout: Duration,
}

pub trait Notifier {
    /// # Errors
    /// if the notification couldn't be delivered
    fn notify(&mut self, notification: &Notification) -> io::Result<()>;
}

/// shows notifications through the desktop's notifier command
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopNotifier;

impl DesktopNotifier {
    fn command(notification: &Notification) -> Option<Command> {
        if cfg!(target_os = "macos") {
            let mut command = Command::new("osascript");
            command.arg("-e").arg(format!(
                "display notification {} with title {}",
                applescript_string(&notification.message),
                applescript_string(&notification.title)
            ));
            Some(command)
        } else if cfg!(unix) {
            let mut command = Command::new("notify-send");
            command
                .arg("--expire-time")
                .arg(notification.timeout.as_millis().to_string())
                .arg(&notification.title)
                .arg(&notification.message);
            Some(command)
        } else {
            None
        }
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&mut self, notification: &Notification) -> io::Result<()> {
        let Some(mut command) = Self::command(notification) else {
            log::info!("{}: {}", notification.title, notification.message);
            return Ok(());
        };
        let status = command.status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("notifier exited with {status}"),
            ))
        }
    }
}

fn applescript_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        pub sent: Vec<Notification>,
        pub fail: bool,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&mut self, notification: &Notification) -> io::Result<()> {
            self.sent.push(notification.clone());
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no notifier"));
            }
            Ok(())
        }
    }
}
