use crossterm::style::Stylize;
use indicatif::{ProgressBar, ProgressStyle};

/// Spinner shown while an external stage or a scan is running.
pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    pub fn new(message: impl Into<String>) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.dim} {msg}")
                .unwrap(),
        );
        bar.set_message(message.into());
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }

    /// Print a `✔ done` line for the stage that just finished, then keep
    /// spinning with the next stage's message.
    pub fn step(&self, done: impl Into<String>, next: impl Into<String>) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", "✔".green(), done.into());
        self.bar.reset();
        self.bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.dim} {msg}")
                .unwrap(),
        );
        self.bar.set_message(next.into());
        self.bar.enable_steady_tick(std::time::Duration::from_millis(80));
    }

    /// Clear the spinner and print a final `✔ message` line to stderr.
    pub fn finish(self, message: impl Into<String>) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", "✔".green(), message.into());
    }
}
