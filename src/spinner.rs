//! Terminal progress for the install pipeline: a spinner when attached to a TTY,
//! plain lines otherwise, nothing but warnings in quiet mode.

use std::cell::RefCell;
use std::time::Duration;

use casio_core::{Error, Progress};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

pub struct Spinner {
    /// Show notices and step messages.
    show: bool,
    /// Animate steps with a spinner (stdout is a terminal).
    animate: bool,
    current: RefCell<Option<(ProgressBar, String)>>,
}

impl Spinner {
    pub fn new(show: bool, animate: bool) -> Self {
        Self {
            show,
            animate: show && animate,
            current: RefCell::new(None),
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⠈⠐⠠⠰⠸⠹")
            .template("{spinner:.dim} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }
}

impl Progress for Spinner {
    fn log(&self, message: &str) {
        if self.show && !message.is_empty() {
            println!("{}\n", message.cyan());
        }
    }

    fn warn(&self, message: &str) {
        eprintln!("{} {}\n", "WARNING".bright_red(), message);
    }

    fn wait_on(&self, message: &str) {
        if !self.show {
            return;
        }
        if !self.animate {
            println!("{}", message.dimmed());
            return;
        }
        let bar = ProgressBar::new_spinner();
        bar.set_style(Self::style());
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        if let Some((old, _)) = self.current.replace(Some((bar, message.to_string()))) {
            old.finish_and_clear();
        }
    }

    fn succeed(&self) {
        if let Some((bar, message)) = self.current.borrow_mut().take() {
            bar.finish_and_clear();
            println!("{} {}", "✔".green(), message);
        }
    }

    fn fail(&self, _error: &Error) {
        if let Some((bar, message)) = self.current.borrow_mut().take() {
            bar.finish_and_clear();
            eprintln!("{} {}", "✖".red(), message);
        }
    }
}
