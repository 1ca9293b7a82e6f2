use std::io::Write;
use std::path::PathBuf;

use srctext_services::WriteOptions;

use crate::{Ctx, Format, RuleArgs};

#[allow(clippy::too_many_arguments)]
pub fn run_file(
    ctx: &Ctx,
    paths: Vec<PathBuf>,
    stdout: bool,
    dry_run: bool,
    backup: bool,
    strict: bool,
    format: Format,
    rule_args: &RuleArgs,
) -> color_eyre::Result<()> {
    tracing::debug!(event = "file_args", paths = ?paths, stdout = stdout, dry_run = dry_run, backup = backup);

    let rules = ctx.rules(rule_args)?;

    if stdout {
        let [path] = paths.as_slice() else {
            color_eyre::eyre::bail!("--stdout takes exactly one file");
        };
        let input = std::fs::read(path)?;
        let t = srctext_services::transform_bytes(&input, &rules)?;
        let mut out = std::io::stdout().lock();
        out.write_all(&t.output)?;
        out.flush()?;
        return Ok(());
    }

    let opts = WriteOptions {
        dry_run,
        backup: ctx.backup(backup),
    };
    let summary = srctext_services::apply_files(paths, &rules, opts);
    crate::ui::print_summary(&summary, format, ctx.use_color, dry_run, ctx.verbose)?;

    if strict && !summary.failed.is_empty() {
        color_eyre::eyre::bail!("{} file(s) failed", summary.failed.len());
    }
    Ok(())
}
