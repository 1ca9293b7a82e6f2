use std::path::{Path, PathBuf};

use serde::Deserialize;
use srctext_core::{CommentPolicy, EscapePolicy, Rules};

pub const CONFIG_FILE: &str = "srctext.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SrcTextConfig {
    pub marker_prefix: Option<String>,
    pub literal_markup_tags: Option<Vec<String>>,
    pub escape_restore_tags: Option<Vec<String>>,
    pub escape_restore_operators: Option<Vec<String>>,
    pub escape_policy: Option<EscapePolicy>,
    pub comment_policy: Option<CommentPolicy>,
    pub backup: Option<bool>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("marker_prefix must not be empty")]
    EmptyMarker,
    #[error("escape_restore_operators entry {0:?} contains no `&gt;` to restore")]
    Operator(String),
}

/// Search order: `./srctext.toml`, then `$CONFIG_DIR/srctext/srctext.toml`.
/// Values from the first file win field by field.
pub fn load_config() -> Result<SrcTextConfig, ConfigError> {
    let cwd = std::env::current_dir().ok();
    let home = dirs::config_dir().map(|d| d.join("srctext"));
    load_config_in(cwd.as_deref(), home.as_deref())
}

fn load_config_in(cwd: Option<&Path>, home: Option<&Path>) -> Result<SrcTextConfig, ConfigError> {
    let mut merged = SrcTextConfig::default();
    for dir in [cwd, home].into_iter().flatten() {
        let path = dir.join(CONFIG_FILE);
        if path.is_file() {
            merged = merge(merged, load_config_from(&path)?);
        }
    }
    Ok(merged)
}

pub fn load_config_from(path: &Path) -> Result<SrcTextConfig, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&s).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Fill unset fields of `a` from `b`.
pub fn merge(mut a: SrcTextConfig, b: SrcTextConfig) -> SrcTextConfig {
    if a.marker_prefix.is_none() {
        a.marker_prefix = b.marker_prefix;
    }
    if a.literal_markup_tags.is_none() {
        a.literal_markup_tags = b.literal_markup_tags;
    }
    if a.escape_restore_tags.is_none() {
        a.escape_restore_tags = b.escape_restore_tags;
    }
    if a.escape_restore_operators.is_none() {
        a.escape_restore_operators = b.escape_restore_operators;
    }
    if a.escape_policy.is_none() {
        a.escape_policy = b.escape_policy;
    }
    if a.comment_policy.is_none() {
        a.comment_policy = b.comment_policy;
    }
    if a.backup.is_none() {
        a.backup = b.backup;
    }
    a
}

impl SrcTextConfig {
    /// Resolve against the built-in defaults and validate.
    pub fn rules(&self) -> Result<Rules, ConfigError> {
        let mut rules = Rules::default();
        if let Some(p) = &self.marker_prefix {
            rules.marker_prefix = p.clone();
        }
        if let Some(tags) = &self.literal_markup_tags {
            rules.literal_markup_tags = tags.clone();
        }
        if let Some(tags) = &self.escape_restore_tags {
            rules.escape_restore_tags = tags.clone();
        }
        if let Some(ops) = &self.escape_restore_operators {
            rules.escape_restore_operators = ops.clone();
        }
        if let Some(p) = self.escape_policy {
            rules.escape_policy = p;
        }
        if let Some(p) = self.comment_policy {
            rules.comment_policy = p;
        }
        validate(&rules)?;
        Ok(rules)
    }
}

pub fn validate(rules: &Rules) -> Result<(), ConfigError> {
    if rules.marker_prefix.trim().is_empty() {
        return Err(ConfigError::EmptyMarker);
    }
    if let Some(op) = rules
        .escape_restore_operators
        .iter()
        .find(|op| !op.contains("&gt;"))
    {
        return Err(ConfigError::Operator(op.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn defaults_resolve_to_builtin_rules() {
        let rules = SrcTextConfig::default().rules().unwrap();
        assert_eq!(rules, Rules::default());
        assert_eq!(rules.marker_prefix, "EN:");
    }

    #[test]
    fn parses_policies_and_lists() {
        let cfg: SrcTextConfig = toml::from_str(
            r#"
marker_prefix = "RU:"
escape_restore_tags = ["li"]
escape_policy = "all-gt"
comment_policy = "remove"
"#,
        )
        .unwrap();
        let rules = cfg.rules().unwrap();
        assert_eq!(rules.marker_prefix, "RU:");
        assert_eq!(rules.escape_restore_tags, vec!["li".to_string()]);
        assert_eq!(rules.escape_policy, EscapePolicy::AllGt);
        assert_eq!(rules.comment_policy, CommentPolicy::Remove);
        assert_eq!(rules.literal_markup_tags, Rules::default().literal_markup_tags);
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        assert!(toml::from_str::<SrcTextConfig>("marker = \"EN:\"").is_err());
        assert!(toml::from_str::<SrcTextConfig>("escape_policy = \"some\"").is_err());

        let empty = SrcTextConfig {
            marker_prefix: Some("  ".into()),
            ..Default::default()
        };
        assert!(matches!(empty.rules(), Err(ConfigError::EmptyMarker)));

        let op = SrcTextConfig {
            escape_restore_operators: Some(vec!["&lt;=".into()]),
            ..Default::default()
        };
        assert!(matches!(op.rules(), Err(ConfigError::Operator(_))));
    }

    #[test]
    fn local_file_wins_over_home_per_field() {
        let cwd = tempdir().unwrap();
        let home = tempdir().unwrap();
        fs::write(cwd.path().join(CONFIG_FILE), "comment_policy = \"remove\"\n").unwrap();
        fs::write(
            home.path().join(CONFIG_FILE),
            "comment_policy = \"keep\"\nbackup = true\n",
        )
        .unwrap();

        let cfg = load_config_in(Some(cwd.path()), Some(home.path())).unwrap();
        assert_eq!(cfg.comment_policy, Some(CommentPolicy::Remove));
        assert_eq!(cfg.backup, Some(true));
    }

    #[test]
    fn broken_file_is_reported() {
        let cwd = tempdir().unwrap();
        fs::write(cwd.path().join(CONFIG_FILE), "backup = [").unwrap();
        let err = load_config_in(Some(cwd.path()), None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
