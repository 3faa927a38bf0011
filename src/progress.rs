use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info};

/// Receives chunk-completion events from a player.
///
/// A successful session calls `start` once, `update` with strictly
/// increasing counts, then `finish` exactly once.
pub trait ProgressReporter {
    fn start(&mut self, total_units: usize);
    fn update(&mut self, completed_units: usize);
    fn finish(&mut self);
}

impl<P: ProgressReporter + ?Sized> ProgressReporter for Box<P> {
    fn start(&mut self, total_units: usize) {
        (**self).start(total_units)
    }

    fn update(&mut self, completed_units: usize) {
        (**self).update(completed_units)
    }

    fn finish(&mut self) {
        (**self).finish()
    }
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn start(&mut self, _total_units: usize) {}
    fn update(&mut self, _completed_units: usize) {}
    fn finish(&mut self) {}
}

/// Reports through the `log` facade.
#[derive(Default)]
pub struct LogProgress {
    total: usize,
}

impl ProgressReporter for LogProgress {
    fn start(&mut self, total_units: usize) {
        self.total = total_units;
        info!("playing {} chunks", total_units);
    }

    fn update(&mut self, completed_units: usize) {
        debug!("chunk {}/{}", completed_units, self.total);
    }

    fn finish(&mut self) {
        info!("playback finished");
    }
}

const BAR_TEMPLATE: &str = "[{bar:50}] {percent:>3}%";

/// `[=====     ]  50%` terminal bar, one tick per chunk.
pub struct TextBar {
    bar: ProgressBar,
}

impl TextBar {
    pub fn new(target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), target);
        bar.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .map(|style| style.progress_chars("= "))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        TextBar { bar }
    }

    pub fn stderr() -> Self {
        TextBar::new(ProgressDrawTarget::stderr())
    }

    /// Shares the underlying bar, e.g. to inspect its position.
    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }
}

impl ProgressReporter for TextBar {
    fn start(&mut self, total_units: usize) {
        self.bar.set_length(total_units as u64);
        self.bar.set_position(0);
    }

    fn update(&mut self, completed_units: usize) {
        self.bar.set_position(completed_units as u64);
    }

    fn finish(&mut self) {
        self.bar.finish();
    }
}
