//! Progress feedback while a server round trip is outstanding.

use std::future::Future;
use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const TICK: Duration = Duration::from_millis(100);

fn spinner(message: String) -> ProgressBar {
    // Keep piped stderr free of spinner frames.
    if !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new_spinner().with_message(message);
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} {elapsed:.dim}") {
        bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
    }
    bar.enable_steady_tick(TICK);
    bar
}

/// Await `work` behind a spinner labelled `message`, clearing it afterwards.
pub async fn while_waiting<F: Future>(message: impl Into<String>, work: F) -> F::Output {
    let bar = spinner(message.into());
    let output = work.await;
    bar.finish_and_clear();
    output
}
