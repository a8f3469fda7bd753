use std::cmp::min;
use std::fmt::Write;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use surge_core::prelude::DelegatedShutdownListener;

use crate::context::{RunnerContext, UserValuesConstraint};

/// Displays a progress bar while the stage plan is running to show the user how long is left and
/// how many virtual users are live.
pub(crate) fn start_progress<RV: UserValuesConstraint>(
    planned_runtime: Duration,
    runner_context: Arc<RunnerContext<RV>>,
    mut stop_listener: DelegatedShutdownListener,
) -> Option<JoinHandle<()>> {
    let style = match ProgressStyle::with_template(
        "{spinner:.green} [{wide_bar:.cyan/blue}] [{elapsed_precise} / {planned_runtime}] {msg}",
    ) {
        Ok(style) => style,
        Err(e) => {
            log::warn!("Failed to set progress style, not showing progress: {e:?}");
            return None;
        }
    };
    let style = style
        .with_key("planned_runtime", {
            let hours = planned_runtime.as_secs() / 3600;
            let minutes = (planned_runtime.as_secs() % 3600) / 60;
            let seconds = planned_runtime.as_secs() % 60;
            move |_state: &ProgressState, w: &mut dyn Write| {
                let _ = write!(w, "{:02}:{:02}:{:02}", hours, minutes, seconds);
            }
        })
        .progress_chars("#>-");

    let spawned = std::thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || {
            let start_time = Instant::now();
            let pb = ProgressBar::new(planned_runtime.as_millis() as u64);
            pb.set_style(style);

            loop {
                if stop_listener.should_shutdown() {
                    log::trace!("Progress thread shutting down");
                    pb.finish_and_clear();
                    break;
                }

                let new = min(
                    start_time.elapsed().as_millis() as u64,
                    planned_runtime.as_millis() as u64,
                );
                pb.set_position(new);
                pb.set_message(format!("{} VUs", runner_context.live_vus()));
                std::thread::sleep(Duration::from_millis(250));
            }
        });

    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::warn!("Failed to start progress thread: {e:?}");
            None
        }
    }
}
