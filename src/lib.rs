#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![deny(
    clippy::use_self,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::missing_panics_doc
)]
#![allow(clippy::multiple_crate_versions, clippy::module_name_repetitions)]

pub mod alarm;
pub mod api;
pub mod config;
/// picking the output device
pub mod device;
pub mod error;
pub mod notification;
pub mod playback;
pub mod spotify;
pub mod time;
