use colored::Colorize;

use super::ProgressSink;

/// Renders the progress log on the terminal.
pub struct ConsoleSink {
    use_color: bool,
}

impl ConsoleSink {
    pub fn new(use_color: bool) -> Self {
        if !use_color {
            colored::control::set_override(false);
        }
        Self { use_color }
    }
}

impl ProgressSink for ConsoleSink {
    fn heading(&mut self, text: &str) {
        let banner = format!("****** {} ******", text);
        if self.use_color {
            println!("{}", banner.cyan().bold());
        } else {
            println!("{}", banner);
        }
        println!();
    }

    fn line(&mut self, text: &str) {
        for line in text.lines() {
            match line.strip_prefix("   -> ") {
                Some(value) => println!("   {} {}", "->".dimmed(), value),
                None => println!("{}", line),
            }
        }
    }

    fn blank(&mut self) {
        println!();
    }
}
