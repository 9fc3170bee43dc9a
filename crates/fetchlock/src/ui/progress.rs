use std::collections::HashMap;
use std::sync::Arc;

use console::style;
use fetchlock_lock::{DownloadEvent, DownloadObserver, Source};
use indicatif::{ProgressBar, ProgressStyle};

const PB_STYLE: &str =
    "{spinner:.blue} [{elapsed_precise}] {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

const PB_CHARS: &str = "█▓▒░  ";

fn bar_style() -> ProgressStyle {
    match ProgressStyle::with_template(PB_STYLE) {
        Ok(style) => style.tick_chars(TICK).progress_chars(PB_CHARS),
        Err(_) => ProgressStyle::default_bar(),
    }
}

/// Byte-level status bar for a batch download.
///
/// `sizes` maps a resource's first URL to its announced length. Resources
/// already present locally move the bar by that length since no bytes flow.
#[derive(Clone)]
pub struct StatusBar {
    pb:    ProgressBar,
    sizes: Arc<HashMap<String, u64>>,
}

impl StatusBar {
    pub fn new(sizes: HashMap<String, u64>) -> Self {
        let total: u64 = sizes.values().sum();
        let pb = if total > 0 { ProgressBar::new(total) } else { ProgressBar::no_length() };
        pb.set_style(bar_style());
        Self {
            pb,
            sizes: Arc::new(sizes),
        }
    }

    /// Callback for the fetcher, ticked once per body chunk.
    pub fn on_bytes(&self) -> Arc<dyn Fn(u64) + Send + Sync> {
        let pb = self.pb.clone();
        Arc::new(move |n| pb.inc(n))
    }

    pub fn observer(&self) -> DownloadObserver {
        let bar = self.clone();
        Arc::new(move |event: &DownloadEvent| bar.handle(event))
    }

    fn handle(&self, event: &DownloadEvent) {
        match event {
            DownloadEvent::Started { .. } => {}
            DownloadEvent::Placed(placement) => {
                if placement.source == Source::Local {
                    self.pb.inc(self.sizes.get(&placement.url).copied().unwrap_or(0));
                }
                self.pb
                    .println(format!("{} {}", style("✓").green(), placement.path.display()));
            }
            DownloadEvent::Failed { url, .. } => {
                self.pb.println(format!("{} {}", style("✗").red(), url));
            }
        }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}
