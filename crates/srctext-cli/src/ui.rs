use owo_colors::OwoColorize;
use srctext_services::BatchSummary;

use crate::Format;

/// Print a batch summary. JSON is always printed. Text lists touched files
/// and totals only when `listing` is set, so a clean run prints nothing.
/// Failures always go to stderr.
pub fn print_summary(
    summary: &BatchSummary,
    format: Format,
    use_color: bool,
    dry_run: bool,
    listing: bool,
) -> color_eyre::Result<()> {
    if let Format::Json = format {
        serde_json::to_writer(std::io::stdout().lock(), summary)?;
        println!();
        for f in &summary.failed {
            eprintln!("[{}] {}: {}", f.category, f.path.display(), f.error);
        }
        return Ok(());
    }

    for f in &summary.failed {
        let path = f.path.display().to_string();
        if use_color {
            eprintln!("{} [{}] {}: {}", "✖".red(), f.category.yellow(), path, f.error);
        } else {
            eprintln!("✖ [{}] {}: {}", f.category, path, f.error);
        }
    }
    if !listing {
        return Ok(());
    }

    let verb = if dry_run { "would update" } else { "updated" };
    for f in summary.files.iter().filter(|f| f.changed) {
        let path = f.path.display().to_string();
        if use_color {
            println!(
                "{} {} {} ({} applied)",
                "✔".green(),
                verb,
                path.blue(),
                f.report.applied
            );
        } else {
            println!("✔ {} {} ({} applied)", verb, path, f.report.applied);
        }
    }
    println!(
        "processed {}, changed {}, applied {}, failed {}",
        summary.processed,
        summary.changed,
        summary.applied,
        summary.failed.len()
    );
    Ok(())
}
