use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::{io::Write, thread, time::Duration};

// ── Terminal helpers ──────────────────────────────────────────────────────────

fn term_width() -> usize {
    Term::stdout().size().1.max(60) as usize
}

fn rule() -> String {
    "─".repeat(term_width().min(52))
}

// ── Banner ────────────────────────────────────────────────────────────────────

pub fn print_banner() {
    let _ = Term::stdout().clear_screen();

    let logo = [
        r"     /\     ",
        r"    /  \      archguided",
        r"   /\   \   ",
        r"  /      \  ",
        r" /   ,,   \ ",
        r"/   |  |  -\",
    ];

    println!();
    for line in &logo {
        println!("{}", style(line).cyan().bold());
    }
    println!();
    println!(
        "{}",
        style(format!(
            "   Guided Arch Linux Installer  ·  v{}",
            env!("CARGO_PKG_VERSION")
        ))
        .dim()
        .italic()
    );
    println!();
    println!("{}", style(rule()).dim());
    println!();
}

// ── Step header ───────────────────────────────────────────────────────────────

/// Prints a visually distinct numbered step header.
pub fn print_step(step: u8, total: u8, title: &str) {
    println!();
    let tag = style(format!(" {}/{} ", step, total)).black().on_cyan().bold();
    let heading = style(format!("  {}", title)).white().bold();
    println!("{}{}", tag, heading);
    println!("{}", style(rule()).dim());
}

// ── Feedback messages ─────────────────────────────────────────────────────────

/// Green ✓ for a completed operation.
pub fn print_success(msg: &str) {
    println!("  {}  {}", style("✓").green().bold(), style(msg).green());
}

/// Blue → for neutral progress notes.
pub fn print_info(msg: &str) {
    println!("  {}  {}", style("→").blue().bold(), msg);
}

/// Yellow ⚠ for non-fatal notices.
pub fn print_warning(msg: &str) {
    println!("  {}  {}", style("⚠").yellow().bold(), style(msg).yellow());
}

/// Red ✗ for errors, written to stderr.
pub fn print_error(msg: &str) {
    eprintln!("  {}  {}", style("✗").red().bold(), style(msg).red());
}

// ── Info box ──────────────────────────────────────────────────────────────────

/// Renders a bordered key→value box in the terminal.
///
/// ```text
/// ┌─ Configuration ───────────────────┐
/// │  Disk         /dev/sda            │
/// │  Filesystem   ext4                │
/// └───────────────────────────────────┘
/// ```
pub fn print_kv_box(title: &str, rows: &[(&str, &str)]) {
    const BOX_INNER: usize = 38;

    let dashes = "─".repeat(BOX_INNER.saturating_sub(title.chars().count() + 2));
    println!(
        "  ┌─ {} {}┐",
        style(title).white().bold(),
        style(&dashes).dim()
    );

    for (key, val) in rows {
        println!(
            "  │  {:<13}{}",
            style(*key).dim(),
            style(*val).white().bold()
        );
    }

    println!("  └{}┘", style("─".repeat(BOX_INNER + 2)).dim());
}

// ── Spinner ───────────────────────────────────────────────────────────────────

/// Returns a running braille spinner.
/// Call `pb.finish_and_clear()` (or the `done_spinner` helper) when done.
pub fn spinner(msg: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("  {spinner:.cyan.bold}  {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(msg.into());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Clears the spinner and prints a success message in its place.
pub fn done_spinner(pb: ProgressBar, msg: &str) {
    pb.finish_and_clear();
    print_success(msg);
}

// ── Countdown ─────────────────────────────────────────────────────────────────

/// Prints `5 4 3 2 1` on one line, one number per second, after `label`.
/// Gives the operator a last chance to hit Ctrl-C.
pub fn countdown(label: &str, seconds: u32) {
    print!("  {}  {} in ", style("!").red().bold(), style(label).red().bold());
    for n in (1..=seconds).rev() {
        print!("{} ", style(n).red().bold());
        let _ = std::io::stdout().flush();
        thread::sleep(Duration::from_secs(1));
    }
    println!();
}
