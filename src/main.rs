use std::{error::Error, path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use log::{error, info};
use spotify_alarm::{
    alarm::{AlarmConfig, AlarmLoop, Outcome, SystemClock},
    config::Config,
    device::{select_device, ConsolePrompt},
    notification::DesktopNotifier,
    playback::PlaybackDriver,
    spotify::{SpotifyClient, TokenCache},
    time,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None, subcommand_negates_reqs = true)]
struct Args {
    #[clap(subcommand)]
    command: Option<Command>,
    /// Spotify playlist URI (e.g. "spotify:playlist:37i9dQZF1EJW5QYMSm7Z0Q")
    #[clap(long, required = true)]
    playlist: Option<String>,
    /// Alarm time in "HH:MM" format (24-hour)
    #[clap(long, required = true)]
    time: Option<String>,
    /// Volume to ramp up to (0-100), defaults to the config's default_volume
    #[clap(long, allow_negative_numbers = true)]
    volume: Option<i32>,
    /// Config file to use instead of the default location
    #[clap(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// write a default config file
    Init {
        #[clap(long, short)]
        force: bool,
    },
}

fn main() -> ExitCode {
    // initilize the logger
    simple_file_logger::init_logger!("spotify_alarm").expect("couldn't initialize logger");

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let chain = error_chain(e.as_ref());
            error!("{chain}");
            eprintln!("Error: {chain}");
            ExitCode::FAILURE
        }
    }
}

/// the error followed by each of its sources, `outer: inner: innermost`
fn error_chain(e: &dyn Error) -> String {
    let mut chain = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config_path = match args.config {
        Some(path) => path,
        None => Config::config_path()?,
    };

    if let Some(Command::Init { force }) = args.command {
        if force || !config_path.exists() {
            Config::new().save(&config_path)?;
            println!("wrote default config to {}", config_path.display());
        } else {
            println!(
                "config already exists at {}, use --force to overwrite it",
                config_path.display()
            );
        }
        return Ok(());
    }

    let playlist = args.playlist.ok_or("--playlist is required")?;
    let raw_time = args.time.ok_or("--time is required")?;
    // bad times fail before we touch the network
    let target_time = time::normalize(&raw_time)?;

    let config = Config::load(&config_path)?.with_env(|name| std::env::var(name).ok());
    let credentials = config.credentials()?;
    let alarm_config = AlarmConfig {
        playlist,
        target_time,
        raw_time,
        target_volume: args.volume.unwrap_or(config.default_volume),
    };

    let mut client = SpotifyClient::new(credentials, TokenCache::new(&config.cache_path));
    client.ensure_authorized(&mut std::io::stdin().lock())?;

    let Some(device) = select_device(&mut client, &mut ConsolePrompt::stdio())? else {
        println!("Device selection cancelled");
        return Ok(());
    };

    println!(
        "Alarm set for {} on device {} ({}). Keep this app running...",
        alarm_config.target_time, device.name, device.id
    );
    info!("alarm set for {} on {}", alarm_config.target_time, device.id);

    let driver = PlaybackDriver::new(client, device.id);
    let mut alarm = AlarmLoop::new(
        alarm_config,
        config.silence_context,
        driver,
        SystemClock,
        DesktopNotifier,
    );
    match alarm.run()? {
        Outcome::Fired => info!("alarm done"),
        Outcome::Cancelled => info!("alarm cancelled"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use spotify_alarm::error::{AlarmError, ApiError};

    use super::*;

    #[test]
    fn cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn alarm_flags() {
        let args = Args::try_parse_from([
            "spotify_alarm",
            "--playlist",
            "spotify:playlist:abc",
            "--time",
            "7:05",
            "--volume",
            "-5",
        ])
        .unwrap();
        assert_eq!(args.playlist.as_deref(), Some("spotify:playlist:abc"));
        assert_eq!(args.time.as_deref(), Some("7:05"));
        assert_eq!(args.volume, Some(-5));
        assert!(args.command.is_none());
    }

    #[test]
    fn playlist_and_time_are_required() {
        assert!(Args::try_parse_from(["spotify_alarm", "--time", "07:05"]).is_err());
        assert!(Args::try_parse_from(["spotify_alarm", "--playlist", "x"]).is_err());
    }

    #[test]
    fn init_needs_no_alarm_flags() {
        let args = Args::try_parse_from(["spotify_alarm", "init", "--force"]).unwrap();
        assert!(matches!(args.command, Some(Command::Init { force: true })));
    }

    #[test]
    fn error_chain_includes_sources() {
        let err = AlarmError::CollaboratorRequestFailed {
            action: "set volume",
            source: ApiError::Status {
                status: 404,
                message: "Device not found".to_string(),
            },
        };
        assert_eq!(
            error_chain(&err),
            "couldn't set volume: spotify answered 404: Device not found"
        );
        assert_eq!(
            error_chain(&AlarmError::NoDeviceAvailable),
            "no active Spotify device found"
        );
    }

    #[test]
    fn invalid_time_fails_before_config_is_read() {
        let args = Args::try_parse_from([
            "spotify_alarm",
            "--playlist",
            "x",
            "--time",
            "25:00",
            "--config",
            "/nonexistent/spotify_alarm/config.toml",
        ])
        .unwrap();
        let err = run(args).unwrap_err();
        assert!(err.to_string().starts_with("incorrect time format"));
    }
}
