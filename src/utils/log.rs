// src/utils/log.rs

//! Run-level log formatting on top of the `log` facade.
//!
//! Headers, step lines and summaries go through `log::info!` so they share
//! the logger configured by the binary.

/// Log a header
pub fn header(title: &str) {
    let border = "═".repeat(60);
    ::log::info!("{}", border);
    ::log::info!("  {}", title);
    ::log::info!("{}", border);
}

/// Log a step in a process
pub fn step(step_num: usize, total: usize, message: &str) {
    ::log::info!("{}", step_line(step_num, total, message));
}

/// Log a sub-item (indented)
pub fn sub_item(message: &str) {
    ::log::info!("    {}", message);
}

/// Log a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    for line in summary_lines(title, items) {
        ::log::info!("{}", line);
    }
}

fn step_line(step_num: usize, total: usize, message: &str) -> String {
    format!("[STEP {}/{}] {}", step_num, total, message)
}

fn summary_lines(title: &str, items: &[(&str, String)]) -> Vec<String> {
    let width = items.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    std::iter::once(format!("[SUMMARY] {}", title))
        .chain(
            items
                .iter()
                .map(|(key, value)| format!("    {:<width$}  {}", key, value, width = width)),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_line() {
        assert_eq!(step_line(1, 2, "Crawl"), "[STEP 1/2] Crawl");
    }

    #[test]
    fn test_summary_lines_align_keys() {
        let lines = summary_lines(
            "Crawl",
            &[("collected", "3".to_string()), ("failures", "0".to_string())],
        );
        assert_eq!(
            lines,
            vec![
                "[SUMMARY] Crawl".to_string(),
                "    collected  3".to_string(),
                "    failures   0".to_string(),
            ]
        );
    }
}
