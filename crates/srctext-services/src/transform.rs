use std::path::{Path, PathBuf};

use serde::Serialize;
use srctext_core::{Rules, TransformError};

use crate::propagate::{propagate, PropagationReport};
use crate::render::render;

#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Run the whole pipeline but never touch the file.
    pub dry_run: bool,
    /// Copy the original to `<name>.xml.bak` before overwriting.
    pub backup: bool,
}

/// Result of the in-memory pipeline for one document.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub output: Vec<u8>,
    pub report: PropagationReport,
    pub recoveries: usize,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    #[serde(flatten)]
    pub report: PropagationReport,
    pub recoveries: usize,
    pub changed: bool,
    pub written: bool,
}

/// Loader, walker and serializer over raw bytes.
pub fn transform_bytes(input: &[u8], rules: &Rules) -> Result<Transformed, TransformError> {
    let doc = srctext_parsers_xml::load(input)?;
    let recoveries = doc.recoveries;
    let (doc, report) = propagate(doc, rules);
    let output = render(&doc, rules)?;
    let changed = output != input;
    Ok(Transformed {
        output,
        report,
        recoveries,
        changed,
    })
}

/// Rewrite `path` in place. Unchanged files are not written.
pub fn transform_file(
    path: &Path,
    rules: &Rules,
    opts: WriteOptions,
) -> Result<FileReport, TransformError> {
    let input = std::fs::read(path).map_err(|e| TransformError::io(path, e))?;
    let t = transform_bytes(&input, rules)?;
    if t.recoveries > 0 {
        tracing::warn!(event = "xml_recovered", path = %path.display(), repairs = t.recoveries);
    }

    let mut written = false;
    if t.changed && !opts.dry_run {
        if opts.backup {
            let bak = path.with_extension("xml.bak");
            std::fs::copy(path, &bak).map_err(|e| TransformError::io(&bak, e))?;
            tracing::debug!(event = "backup", from = %path.display(), to = %bak.display());
        }
        std::fs::write(path, &t.output).map_err(|e| TransformError::io(path, e))?;
        written = true;
    }

    tracing::debug!(
        event = "file_transformed",
        path = %path.display(),
        markers = t.report.markers,
        applied = t.report.applied,
        changed = t.changed,
        written = written,
    );

    Ok(FileReport {
        path: path.to_path_buf(),
        report: t.report,
        recoveries: t.recoveries,
        changed: t.changed,
        written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const KEYED: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<LanguageData>\n  <!-- EN: Hello -->\n  <Greeting>Привет</Greeting>\n</LanguageData>\n";

    #[test]
    fn rewrites_file_in_place() -> srctext_core::Result<()> {
        let dir = tempdir()?;
        let p = dir.path().join("Keyed.xml");
        fs::write(&p, KEYED)?;

        let rep = transform_file(&p, &Rules::default(), WriteOptions::default())?;
        assert!(rep.changed && rep.written);
        assert_eq!(rep.report.applied, 1);

        let out = fs::read(&p)?;
        assert!(out.starts_with(b"\xEF\xBB\xBF<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"));
        let text = String::from_utf8(out)?;
        assert!(text.contains("<Greeting>Hello</Greeting>"));
        assert!(text.contains("<!-- EN: Hello -->"));

        // second pass finds nothing to do
        let rep = transform_file(&p, &Rules::default(), WriteOptions::default())?;
        assert!(!rep.changed && !rep.written);
        Ok(())
    }

    #[test]
    fn dry_run_and_backup() -> srctext_core::Result<()> {
        let dir = tempdir()?;
        let p = dir.path().join("Keyed.xml");
        fs::write(&p, KEYED)?;

        let dry = WriteOptions {
            dry_run: true,
            backup: true,
        };
        let rep = transform_file(&p, &Rules::default(), dry)?;
        assert!(rep.changed && !rep.written);
        assert_eq!(fs::read_to_string(&p)?, KEYED);
        assert!(!dir.path().join("Keyed.xml.bak").exists());

        let opts = WriteOptions {
            dry_run: false,
            backup: true,
        };
        transform_file(&p, &Rules::default(), opts)?;
        assert_eq!(fs::read_to_string(dir.path().join("Keyed.xml.bak"))?, KEYED);
        Ok(())
    }

    #[test]
    fn errors_are_classified() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.xml");
        let err = transform_file(&missing, &Rules::default(), WriteOptions::default())
            .unwrap_err();
        assert_eq!(err.category(), "io");

        let bad = dir.path().join("bad.xml");
        fs::write(&bad, "not xml at all").unwrap();
        let err =
            transform_file(&bad, &Rules::default(), WriteOptions::default()).unwrap_err();
        assert_eq!(err.category(), "parse");
        assert_eq!(fs::read_to_string(&bad).unwrap(), "not xml at all");
    }

    #[test]
    fn recovered_documents_reload_cleanly() {
        let rules = Rules::default();
        let damaged = [
            ("<R><A>one<B>two</R>", "<R><A>one<B>two</B></A></R>"),
            (
                "<LanguageData><K>a</K></X></LanguageData>",
                "<LanguageData><K>a</K></LanguageData>",
            ),
            ("<R><A>1", "<R><A>1</A></R>"),
            ("<R><A>a &nbsp b</A></R>", "<R><A>a &amp;nbsp b</A></R>"),
            ("<R><K>a < b</K><L>c</L></R>", "<R><K>a &lt; b</K><L>c</L></R>"),
            ("<R><K>1 <2 >3</K></R>", "<R><K>1 &lt;2 &gt;3</K></R>"),
            ("junk<R><K a=\"1\" b>x</K></R>tail", "<R><K a=\"1\">x</K></R>"),
        ];
        for (input, expected) in damaged {
            let first = transform_bytes(input.as_bytes(), &rules)
                .unwrap_or_else(|e| panic!("{input}: {e}"));
            assert!(first.recoveries > 0, "{input}");
            let text = String::from_utf8(first.output.clone()).unwrap();
            assert!(text.ends_with(expected), "{input} -> {text}");

            let again = transform_bytes(&first.output, &rules)
                .unwrap_or_else(|e| panic!("{input} -> {text}: {e}"));
            assert_eq!(again.recoveries, 0, "{text}");
            assert!(!again.changed, "{text}");
        }
    }
}
