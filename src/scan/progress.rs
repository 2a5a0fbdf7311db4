use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str = "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} blocks ({eta}) {msg}";

/// Progress bar over a block range; hidden when `visible` is false
pub fn block_progress(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template(TEMPLATE) {
        bar.set_style(style);
    }
    bar
}
