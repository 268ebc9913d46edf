// src/utils/log.rs

//! Presentation helpers layered on the `log` facade.
//!
//! Banners, numbered steps and summaries for the audit run. Output goes
//! through whatever logger the binary installed.

const WIDTH: usize = 60;

/// Log a separator line
pub fn separator() {
    log::info!("{}", "─".repeat(WIDTH));
}

/// Log a header
pub fn header(title: &str) {
    let border = "═".repeat(WIDTH);
    log::info!("{border}");
    log::info!("  {title}");
    log::info!("{border}");
}

/// Log a step in a process
pub fn step(step_num: usize, total: usize, message: &str) {
    log::info!("[STEP {step_num}/{total}] {message}");
}

/// Log a sub-item (indented)
pub fn sub_item(message: &str) {
    log::info!("    {message}");
}

/// Log a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    log::info!("[SUMMARY] {title}");
    for line in summary_lines(items) {
        log::info!("{line}");
    }
}

fn summary_lines(items: &[(&str, String)]) -> Vec<String> {
    let key_width = items.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    items
        .iter()
        .map(|(key, value)| format!("    {key:<key_width$} : {value}"))
        .collect()
}
