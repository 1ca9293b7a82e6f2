use std::path::PathBuf;

use srctext_services::WriteOptions;

use crate::{Ctx, Format, RuleArgs};

pub fn run_apply(
    ctx: &Ctx,
    root: PathBuf,
    dry_run: bool,
    backup: bool,
    strict: bool,
    format: Format,
    rule_args: &RuleArgs,
) -> color_eyre::Result<()> {
    tracing::debug!(event = "apply_args", root = ?root, dry_run = dry_run, backup = backup, strict = strict);

    let rules = ctx.rules(rule_args)?;
    let opts = WriteOptions {
        dry_run,
        backup: ctx.backup(backup),
    };
    let summary = srctext_services::apply_tree(&root, &rules, opts)?;
    crate::ui::print_summary(&summary, format, ctx.use_color, dry_run, ctx.verbose)?;

    if strict && !summary.failed.is_empty() {
        color_eyre::eyre::bail!("{} file(s) failed", summary.failed.len());
    }
    Ok(())
}
