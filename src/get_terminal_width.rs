use terminal_size::{Width, terminal_size};

/// Width to use for wrapping `--help` output: the terminal width
/// minus `margin`, or 100 if stdout is not a terminal.
pub fn get_terminal_width(margin: usize) -> usize {
    if let Some((Width(width), _height)) = terminal_size() {
        usize::from(width).saturating_sub(margin).max(40)
    } else {
        100
    }
}
