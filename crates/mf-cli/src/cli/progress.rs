//! Progress bar used by `requests watch` to show a request's derived
//! progress (spec.md §3 "Request.status/progress derived from its
//! ProcessingItems") while polling for a terminal status.

use indicatif::{ProgressBar, ProgressStyle};

pub fn request_progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} {msg} [{bar:30.cyan/blue}] {percent}%")
            .unwrap()
            .progress_chars("█▓░"),
    );
    bar.enable_steady_tick(std::time::Duration::from_millis(120));
    bar
}
