use std::path::PathBuf;

use srctext_services::WriteOptions;

use crate::{Ctx, Format, RuleArgs};

/// Dry-run over `root` that fails when any file is out of date or broken.
pub fn run_check(
    ctx: &Ctx,
    root: PathBuf,
    format: Format,
    rule_args: &RuleArgs,
) -> color_eyre::Result<()> {
    tracing::debug!(event = "check_args", root = ?root);

    let rules = ctx.rules(rule_args)?;
    let opts = WriteOptions {
        dry_run: true,
        backup: false,
    };
    let summary = srctext_services::apply_tree(&root, &rules, opts)?;
    // list what is out of date
    let listing = ctx.verbose || summary.changed > 0;
    crate::ui::print_summary(&summary, format, ctx.use_color, true, listing)?;

    if summary.changed > 0 || !summary.failed.is_empty() {
        color_eyre::eyre::bail!(
            "{} file(s) out of date, {} failed",
            summary.changed,
            summary.failed.len()
        );
    }
    Ok(())
}
