use colored::*;

pub fn print_info(message: &str) {
    eprintln!("{} {}", "[INFO]".blue().bold(), message);
}

pub fn print_debug(message: &str, verbose: bool) {
    if verbose {
        eprintln!("{} {}", "[DEBUG]".cyan().bold(), message);
    }
}

pub fn print_success(message: &str) {
    eprintln!("{} {}", "[SUCCESS]".green().bold(), message);
}

pub fn print_warning(message: &str) {
    eprintln!("{} {}", "[WARNING]".yellow().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
}

/// Header line printed above every resource listing.
pub fn print_scope(tenancy_name: &str, compartment_name: &str) {
    println!(
        "{}",
        format!("Tenancy(Compartment): {}({})", tenancy_name, compartment_name)
            .magenta()
            .dimmed()
    );
}

pub fn print_match_count(count: usize, noun: &str) {
    println!("{}", format!("{} {}", count, noun).dimmed());
}
