// Slint implementation of the render loop's display surface

use std::rc::Rc;

use slint::{ComponentHandle, Model, ModelRc, SharedString, VecModel};

use super::MainWindow;
use crate::render::{DisplayError, DisplaySink};

/// Status bar text longer than this is cut with an ellipsis.
pub const STATUS_MAX_CHARS: usize = 80;

/// Draws scheduler output onto the main window.
///
/// Holds a weak handle, so a closed window turns every update into
/// [`DisplayError::WindowClosed`] instead of a panic.
pub struct WindowDisplay {
    ui: slint::Weak<MainWindow>,
    lines: Rc<VecModel<SharedString>>,
    max_lines: usize,
}

impl WindowDisplay {
    /// `max_lines` bounds the pane in immediate mode, where lines are only ever appended.
    pub fn new(ui: &MainWindow, max_lines: usize) -> Self {
        let lines = Rc::new(VecModel::<SharedString>::default());
        ui.set_log_lines(ModelRc::from(Rc::clone(&lines)));
        Self {
            ui: ui.as_weak(),
            lines,
            max_lines: max_lines.max(1),
        }
    }

    fn window(&self) -> Result<MainWindow, DisplayError> {
        self.ui.upgrade().ok_or(DisplayError::WindowClosed)
    }
}

impl DisplaySink for WindowDisplay {
    fn append_log(&mut self, line: &str) -> Result<(), DisplayError> {
        let ui = self.window()?;
        while self.lines.row_count() >= self.max_lines {
            self.lines.remove(0);
        }
        self.lines.push(SharedString::from(line));
        ui.invoke_scroll_log_to_end();
        Ok(())
    }

    fn replace_log(&mut self, lines: &[&str]) -> Result<(), DisplayError> {
        let ui = self.window()?;
        self.lines
            .set_vec(lines.iter().map(|l| SharedString::from(*l)).collect::<Vec<_>>());
        ui.invoke_scroll_log_to_end();
        Ok(())
    }

    fn set_progress(&mut self, percent: u8) -> Result<(), DisplayError> {
        self.window()?
            .set_progress(f32::from(percent.min(100)) / 100.0);
        Ok(())
    }

    fn set_status(&mut self, text: &str) -> Result<(), DisplayError> {
        self.window()?
            .set_status_text(truncate_status(text).into());
        Ok(())
    }

    fn set_controls_enabled(&mut self, enabled: bool) -> Result<(), DisplayError> {
        self.window()?.set_controls_enabled(enabled);
        Ok(())
    }

    fn set_tick_rate(&mut self, rate: f64) -> Result<(), DisplayError> {
        self.window()?
            .set_tick_rate_text(format!("FPS: {rate:.1}").into());
        Ok(())
    }
}

/// First line of `text`, at most [`STATUS_MAX_CHARS`] characters.
pub fn truncate_status(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or_default().trim();
    if first_line.chars().count() <= STATUS_MAX_CHARS {
        return first_line.to_string();
    }
    let mut cut: String = first_line.chars().take(STATUS_MAX_CHARS - 3).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_status_unchanged() {
        assert_eq!(truncate_status("Ready."), "Ready.");
    }

    #[test]
    fn test_long_status_is_cut() {
        let long = "x".repeat(200);
        let cut = truncate_status(&long);
        assert_eq!(cut.chars().count(), STATUS_MAX_CHARS);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_status_uses_first_line_only() {
        assert_eq!(truncate_status("  first\nsecond"), "first");
        assert_eq!(truncate_status(""), "");
    }
}
