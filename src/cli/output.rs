//! Terminal output
//!
//! Data goes to stdout, diagnostics to stderr. Colours follow `colored`'s
//! handling of NO_COLOR and CLICOLOR_FORCE.

use std::fmt::Display;

use colored::{ColoredString, Colorize};

use crate::domain::MatrixCategory;

pub fn error(msg: &(impl Display + ?Sized)) {
    eprintln!("{}: {}", "error".red().bold(), msg);
}

/// Advisory notices and skipped fits.
pub fn warning(msg: &(impl Display + ?Sized)) {
    eprintln!("{}: {}", "warning".yellow(), msg);
}

/// One line per fit, marked by whether the fit passed.
pub fn verdict(passed: bool, msg: &(impl Display + ?Sized)) {
    if passed {
        println!("{} {}", "✓".green(), msg);
    } else {
        println!("{} {}", "✗".red(), msg);
    }
}

pub fn action(label: &str, msg: &(impl Display + ?Sized)) {
    println!("{}: {}", label.green(), msg);
}

pub fn header(msg: &(impl Display + ?Sized)) {
    println!("{}", msg.to_string().cyan().bold());
}

pub fn detail(msg: &(impl Display + ?Sized)) {
    println!("  {}", msg);
}

/// Uncoloured data, safe to pipe.
pub fn info(msg: &(impl Display + ?Sized)) {
    println!("{}", msg);
}

/// Category name padded to `width`, coloured by how it affects identifiability.
pub fn category(category: MatrixCategory, width: usize) -> ColoredString {
    let text = format!("{:<width$}", category.as_str());
    match category {
        MatrixCategory::Dlc => text.normal(),
        MatrixCategory::Identity | MatrixCategory::Limit => text.yellow(),
        MatrixCategory::Sympathetic => text.magenta(),
        MatrixCategory::Chainsaw => text.red().bold(),
    }
}
