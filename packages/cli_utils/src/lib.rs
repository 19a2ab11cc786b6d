#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the `wildlife_watch` binary.
//!
//! Report runs draw a chunk bar and slow loads draw a spinner; both are
//! [`ProgressCallback`] sinks the report pipeline writes to. [`init_logger`]
//! routes log output through the same [`MultiProgress`] so bars and log
//! lines share the terminal cleanly.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use wildlife_watch_report::progress::ProgressCallback;

pub use indicatif::MultiProgress;

/// Module prefix of this workspace's crates.
const CRATE_PREFIX: &str = "wildlife_watch";

/// Spinner redraw interval.
const TICK: Duration = Duration::from_millis(100);

const CHUNKS_SPINNER: &str = "{spinner:.cyan} {msg}";
const CHUNKS_COUNTED: &str = "  {msg} {wide_bar:.cyan/dim} {pos}/{len} chunks [{eta}]";
const LOAD_SPINNER: &str = "{spinner:.yellow} {msg} [{elapsed}]";

/// Chunk bar or spinner drawn in the shared [`MultiProgress`].
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Applied when the chunk total arrives.
    counted_style: ProgressStyle,
}

impl IndicatifProgress {
    /// Report run bar. Spins while metric permissions are checked, then
    /// counts chunks with an ETA once the run knows its total.
    #[must_use]
    pub fn chunks_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let counted_style = ProgressStyle::with_template(CHUNKS_COUNTED)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
        Self::spinning(multi, message, CHUNKS_SPINNER, counted_style)
    }

    /// Spinner for snapshot loading and page listing, where there is
    /// nothing to count.
    #[must_use]
    pub fn spinner(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let style = ProgressStyle::with_template(LOAD_SPINNER)
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        Self::spinning(multi, message, LOAD_SPINNER, style)
    }

    fn spinning(
        multi: &MultiProgress,
        message: &str,
        template: &str,
        counted_style: ProgressStyle,
    ) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(TICK);
        bar.set_style(
            ProgressStyle::with_template(template)
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());
        Arc::new(Self { bar, counted_style })
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_style(self.counted_style.clone());
        self.bar.set_length(total);
        self.bar.set_position(0);
    }

    fn set_position(&self, pos: u64) {
        self.bar.set_position(pos);
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, text: &str) {
        self.bar.set_message(text.to_string());
    }

    fn finish(&self, text: &str) {
        self.bar.finish_with_message(text.to_string());
    }

    fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

/// Installs the `pretty_env_logger` formatter behind
/// `indicatif-log-bridge` and returns the [`MultiProgress`] every bar
/// must join.
///
/// `RUST_LOG` is honoured when set; otherwise this workspace's crates log
/// at `info` and everything else at `warn`.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let mut builder = pretty_env_logger::formatted_builder();
    if std::env::var_os("RUST_LOG").is_some() {
        builder.parse_env("RUST_LOG");
    } else {
        builder
            .filter_level(LevelFilter::Warn)
            .filter_module(CRATE_PREFIX, LevelFilter::Info);
    }
    let logger = builder.build();
    let level = logger.filter();

    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_ok()
    {
        log::set_max_level(level);
    }

    multi
}

#[cfg(test)]
mod tests {
    use indicatif::ProgressDrawTarget;
    use wildlife_watch_report::progress::ProgressTracker;
    use wildlife_watch_report_models::RunStatus;

    use super::*;

    #[test]
    fn chunks_bar_follows_the_tracker() {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let bar = IndicatifProgress::chunks_bar(&multi, "Checking metric permissions…");

        let tracker = ProgressTracker::new(bar);
        tracker.reset(4);
        tracker.chunk_done();
        tracker.finish(RunStatus::Completed, "Fetched 1 rows");

        let state = tracker.snapshot();
        assert_eq!((state.processed, state.total), (1, 4));
        assert_eq!(state.status_text, "Fetched 1 rows");
    }

    #[test]
    fn init_logger_can_run_twice() {
        let _first = init_logger();
        let _second = init_logger();
    }
}
