use std::io::{self, BufRead, Write};

use log::{debug, info};

use crate::{
    api::{Device, PlayerApi},
    error::AlarmError,
};

pub const CANCEL: &str = "Cancel";

/// asks the user to pick one of `choices`, returning its index
pub trait Prompt {
    /// # Errors
    /// if the answer can't be read
    fn select(&mut self, message: &str, choices: &[String]) -> io::Result<usize>;
}

/// numbered menu on a terminal, asks again until it gets a valid number
#[derive(Debug)]
pub struct ConsolePrompt<R, W> {
    input: R,
    output: W,
}

impl ConsolePrompt<io::StdinLock<'static>, io::Stdout> {
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
    pub const fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Prompt for ConsolePrompt<R, W> {
    fn select(&mut self, message: &str, choices: &[String]) -> io::Result<usize> {
        writeln!(self.output, "{message}")?;
        for (i, choice) in choices.iter().enumerate() {
            writeln!(self.output, "  {}) {choice}", i + 1)?;
        }
        loop {
            write!(self.output, "> ")?;
            self.output.flush()?;
            let mut answer = String::new();
            if self.input.read_line(&mut answer)? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "input closed before a device was chosen",
                ));
            }
            match answer.trim().parse::<usize>() {
                Ok(n) if (1..=choices.len()).contains(&n) => return Ok(n - 1),
                _ => writeln!(self.output, "pick a number from 1 to {}", choices.len())?,
            }
        }
    }
}

/// always answers with the same index, counting how often it was asked
#[derive(Debug, Clone, Default)]
pub struct FixedChoice {
    pub choice: usize,
    pub asked: usize,
    pub last_choices: Vec<String>,
}

impl FixedChoice {
    #[must_use]
    pub const fn new(choice: usize) -> Self {
        Self {
            choice,
            asked: 0,
            last_choices: Vec::new(),
        }
    }
}

impl Prompt for FixedChoice {
    fn select(&mut self, _message: &str, choices: &[String]) -> io::Result<usize> {
        self.asked += 1;
        self.last_choices = choices.to_vec();
        Ok(self.choice)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedDevice {
    pub name: String,
    pub id: String,
}

impl From<Device> for SelectedDevice {
    fn from(device: Device) -> Self {
        Self {
            name: device.name,
            id: device.id,
        }
    }
}

/// lets the user pick the device to play on
///
/// returns `Ok(None)` when the user picks "Cancel"
///
/// # Errors
/// [`AlarmError::NoDeviceAvailable`] if spotify knows no devices, without prompting,
/// or if the device list or the answer can't be read
pub fn select_device(
    api: &mut impl PlayerApi,
    prompt: &mut impl Prompt,
) -> Result<Option<SelectedDevice>, AlarmError> {
    let devices = api
        .devices()
        .map_err(|source| AlarmError::CollaboratorRequestFailed {
            action: "list devices",
            source,
        })?;
    debug!("spotify reported {} devices", devices.len());
    if devices.is_empty() {
        return Err(AlarmError::NoDeviceAvailable);
    }

    let mut choices: Vec<String> = devices.iter().map(ToString::to_string).collect();
    choices.push(CANCEL.to_string());

    let selected = prompt
        .select("Select a device to play on:", &choices)
        .map_err(AlarmError::Prompt)?;
    // anything past the devices counts as cancel
    let Some(device) = devices.into_iter().nth(selected) else {
        info!("device selection cancelled");
        return Ok(None);
    };
    info!("selected device {device}");
    Ok(Some(device.into()))
}
