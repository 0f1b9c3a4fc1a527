use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

static QUIET: AtomicBool = AtomicBool::new(false);
static VERBOSE: AtomicBool = AtomicBool::new(false);

pub fn init(quiet: bool, verbose: bool) {
    QUIET.store(quiet, Ordering::Relaxed);
    VERBOSE.store(verbose, Ordering::Relaxed);
}

pub fn is_quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// Escreve no stdout, a menos que o modo silencioso esteja ativo.
fn say(line: std::fmt::Arguments) {
    if !is_quiet() {
        println!("{}", line);
    }
}

pub fn print_info(message: &str) {
    say(format_args!("{} {}", "ℹ".blue(), message));
}

pub fn print_success(message: &str) {
    say(format_args!("{} {}", "✓".green().bold(), message.green()));
}

/// Avisos também vão para o log, mesmo em `--quiet`.
pub fn print_warning(message: &str) {
    tracing::warn!("{}", message);
    say(format_args!("{} {}", "⚠".yellow().bold(), message.yellow()));
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message.red());
}

pub fn print_header(title: &str) {
    let rule = "─".repeat(title.chars().count());
    say(format_args!("\n{}\n{}", title.bold().cyan(), rule.cyan()));
}

pub fn print_verbose(message: &str) {
    tracing::debug!("{}", message);
    if is_verbose() {
        say(format_args!("  {}", message.dimmed()));
    }
}

pub fn print_step(step: usize, total: usize, message: &str) {
    say(format_args!("[{}/{}] {}", step, total, message.bold()));
}

/// Linha `rótulo : valor` alinhada, usada nos relatórios de consulta.
pub fn print_field(label: &str, value: &str) {
    say(format_args!("  {:<24}: {}", label.bold(), value));
}

pub fn ask_confirmation(prompt: &str, default: bool) -> io::Result<bool> {
    if is_quiet() {
        return Ok(default);
    }

    let default_str = if default { "S/n" } else { "s/N" };
    print!("{} [{}]: ", prompt.bold(), default_str);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(parse_answer(&input, default))
}

fn parse_answer(input: &str, default: bool) -> bool {
    let trimmed = input.trim().to_lowercase();
    if trimmed.is_empty() {
        default
    } else {
        matches!(trimmed.as_str(), "y" | "s" | "yes" | "sim")
    }
}

pub fn ask_confirmation_yes(prompt: &str) -> io::Result<bool> {
    ask_confirmation(prompt, true)
}

pub fn ask_confirmation_no(prompt: &str) -> io::Result<bool> {
    ask_confirmation(prompt, false)
}

pub fn print_statistics(stats: &[(&str, u64)]) {
    say(format_args!("\n{}", "Estatísticas:".bold().cyan()));
    for (label, value) in stats {
        let value = crate::utils::format_thousands(*value);
        say(format_args!("  {}: {}", label.bold(), value.green()));
    }
}

pub fn print_separator() {
    say(format_args!("{}", "=".repeat(60).dimmed()));
}

/// Barra de progresso no estilo padrão da ferramenta; oculta no modo silencioso.
pub fn progress_bar(len: u64, template: &str) -> anyhow::Result<ProgressBar> {
    if is_quiet() {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(template)?
            .progress_chars("#>-"),
    );
    Ok(pb)
}
