// Error types for ridelog

use crate::telemetry::FixEvent;
use snafu::Snafu;
use std::{io, sync::mpsc::SendError};

#[derive(Debug, Snafu)]
pub enum RideError {
    // Errors for the location fix source
    #[snafu(display("Geolocation is not available on this device"))]
    GeolocationUnavailable,
    #[snafu(display("Geolocation permission is denied. Please enable it in settings."))]
    GeolocationPermissionDenied,
    #[snafu(display("Geolocation error: {reason}"))]
    FixSourceError { reason: String },
    #[snafu(display("Error reading fix feed"))]
    FixFeedError { source: io::Error },

    // Errors while broadcasting fixes
    #[snafu(display("Error broadcasting location fix"))]
    FixBroadcastError { source: Box<SendError<FixEvent>> },

    // Errors for the fix writer
    #[snafu(display("Error writing fix file"))]
    WriterError { source: io::Error },

    // Storage errors
    #[snafu(display("Could not find application data directory for the store"))]
    NoDataDir,
    #[snafu(display("Error accessing store entry {key}"))]
    StorageIOError { key: String, source: io::Error },
    #[snafu(display("Error (de)serializing store entry {key}"))]
    StorageSerializeError {
        key: String,
        source: serde_json::Error,
    },

    // Config management errors
    #[snafu(display("Could not find application config directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },

    // Session errors
    #[snafu(display("No positions to save"))]
    NothingToSave,
    #[snafu(display("Action cancelled: {action}"))]
    ConfirmationDeclined { action: String },

    // User input validation errors
    #[snafu(display("Invalid user input: {field} - {reason}"))]
    InvalidUserInput { field: String, reason: String },
}

impl From<SendError<FixEvent>> for RideError {
    fn from(value: SendError<FixEvent>) -> Self {
        RideError::FixBroadcastError {
            source: Box::new(value),
        }
    }
}
