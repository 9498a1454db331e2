use std::cell::{Cell, RefCell};
use std::io::{self, Write};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use super::{Dialog, DialogKind, Location, Notice, ShellWindow, WindowLifecycle};

/// Shell host that renders into the terminal it was started from
pub struct TerminalShell {
    lifecycle: Cell<WindowLifecycle>,
    displayed: RefCell<Option<Location>>,
    spinner: RefCell<Option<ProgressBar>>,
}

impl TerminalShell {
    pub fn new() -> Self {
        Self {
            lifecycle: Cell::new(WindowLifecycle::Open),
            displayed: RefCell::new(None),
            spinner: RefCell::new(None),
        }
    }

    /// Location most recently loaded
    pub fn displayed(&self) -> Option<Location> {
        self.displayed.borrow().clone()
    }

    pub fn begin_close(&self) {
        self.lifecycle.set(WindowLifecycle::Closing);
        self.clear_spinner();
    }

    pub fn close(&self) {
        self.clear_spinner();
        self.lifecycle.set(WindowLifecycle::Closed);
    }

    fn set_status(&self, text: &str) -> Result<()> {
        let mut spinner = self.spinner.borrow_mut();
        if spinner.is_none() {
            let pb = ProgressBar::new_spinner();
            pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
            pb.enable_steady_tick(Duration::from_millis(120));
            *spinner = Some(pb);
        }
        if let Some(pb) = spinner.as_ref() {
            pb.set_message(text.replace('\n', " "));
        }
        Ok(())
    }

    fn print_line(&self, line: String) {
        match self.spinner.borrow().as_ref() {
            Some(pb) => pb.println(line),
            None => println!("{}", line),
        }
    }

    fn clear_spinner(&self) {
        if let Some(pb) = self.spinner.borrow_mut().take() {
            pb.finish_and_clear();
        }
    }
}

impl Default for TerminalShell {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl ShellWindow for TerminalShell {
    async fn notify(&self, notice: &Notice) -> Result<()> {
        if self.is_closed() {
            bail!("terminal shell is closed");
        }

        match notice {
            Notice::Status(text) => self.set_status(text)?,
            Notice::Toast { title, message } => self.print_line(format!(
                "{} {} {}",
                "●".cyan(),
                title.bold(),
                message.replace('\n', " ").dimmed()
            )),
        }
        Ok(())
    }

    async fn load(&self, location: &Location) -> Result<()> {
        if self.is_closed() {
            bail!("terminal shell is closed");
        }

        self.clear_spinner();
        println!("{} Now showing {}", "▶".green(), location.to_string().cyan());
        *self.displayed.borrow_mut() = Some(location.clone());
        Ok(())
    }

    async fn prompt(&self, dialog: &Dialog) -> Result<usize> {
        self.clear_spinner();
        let buttons = dialog.buttons();

        println!();
        match dialog.kind() {
            DialogKind::Error => println!("{} {}", "✗".red(), dialog.title().red().bold()),
            DialogKind::Info => println!("{} {}", "↑".yellow(), dialog.title().bold()),
        }
        for line in dialog.message().lines() {
            println!("  {}", line);
        }
        println!();
        for (i, label) in buttons.iter().enumerate() {
            println!("  [{}] {}", (i + 1).to_string().cyan(), label);
        }

        loop {
            print!("{} Select [1-{}]: ", "?".yellow().bold(), buttons.len());
            io::stdout().flush()?;

            let line = tokio::task::spawn_blocking(read_line).await??;
            let Some(input) = line else {
                return Err(anyhow!("no input available for '{}'", dialog.title()));
            };

            match parse_choice(&input, buttons.len()) {
                Some(index) => return Ok(index),
                None => println!(
                    "  {}",
                    format!("Invalid selection. Enter 1-{}", buttons.len()).dimmed()
                ),
            }
        }
    }

    fn lifecycle(&self) -> WindowLifecycle {
        self.lifecycle.get()
    }
}

/// `None` on end of input
fn read_line() -> io::Result<Option<String>> {
    let mut input = String::new();
    let read = io::stdin().read_line(&mut input)?;
    Ok((read > 0).then_some(input))
}

/// Map a 1-based answer onto a button index
fn parse_choice(input: &str, count: usize) -> Option<usize> {
    match input.trim().parse::<usize>() {
        Ok(n) if n >= 1 && n <= count => Some(n - 1),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("1\n", 3), Some(0));
        assert_eq!(parse_choice("  3 ", 3), Some(2));
        assert_eq!(parse_choice("4", 3), None);
        assert_eq!(parse_choice("0", 2), None);
        assert_eq!(parse_choice("yes", 2), None);
        assert_eq!(parse_choice("", 2), None);
    }

    #[tokio::test]
    async fn test_closed_shell_rejects_notices() {
        let shell = TerminalShell::new();
        shell.close();
        assert!(shell.is_closed());
        assert!(shell
            .notify(&Notice::Status("Downloading".into()))
            .await
            .is_err());
        assert!(shell
            .load(&Location::Remote("https://trimps.github.io/".into()))
            .await
            .is_err());
        assert_eq!(shell.displayed(), None);
    }

    #[tokio::test]
    async fn test_load_records_location() {
        let shell = TerminalShell::new();
        let location = Location::Remote("https://trimps.github.io/".into());
        shell.load(&location).await.unwrap();
        assert_eq!(shell.displayed(), Some(location));
        assert_eq!(shell.lifecycle(), WindowLifecycle::Open);
    }
}
