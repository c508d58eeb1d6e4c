use std::sync::mpsc::Sender;

use log::{debug, error, info};

use crate::RideError;

use super::{producer::PositionSource, FixEvent, RawFix};

/// Forward every event from `source` to `fix_sender`, and every fix to the optional
/// writer channel. Returns once the source is exhausted or reported an error.
pub fn collect_fixes(
    mut source: impl PositionSource,
    fix_sender: Sender<FixEvent>,
    fix_writer_sender: Option<Sender<RawFix>>,
) -> Result<usize, RideError> {
    source.start()?;

    let mut fix_count = 0;
    while let Some(event) = source.next_event() {
        let is_error = matches!(event, FixEvent::Error(_));
        if let (FixEvent::Fix(fix), Some(writer_sender)) = (&event, &fix_writer_sender) {
            // the writer going away must not stop the ride
            if let Err(e) = writer_sender.send(fix.clone()) {
                error!("Could not send fix to writer: {}", e);
            }
        }

        fix_sender.send(event).map_err(|e| {
            error!("Could not send location fix: {}", e);
            RideError::from(e)
        })?;

        if is_error {
            info!("Fix source reported an error, collection stopped");
            break;
        }
        fix_count += 1;
        debug!("Forwarded fix #{}", fix_count);
    }
    Ok(fix_count)
}
