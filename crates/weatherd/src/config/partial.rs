use std::collections::HashMap;
use std::collections::HashSet;
use std::ops::Range;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use toml::Spanned;

use super::diagnostics::Diagnostic;
use super::diagnostics::Error;
use super::diagnostics::LoadError;
use super::diagnostics::MergeConflictLocation;
use super::diagnostics::MergeError;
use super::diagnostics::SourceInfo;
use super::diagnostics::Warning;
use super::LogLevel;
use crate::engine::FailurePolicy;

/// One config file as written, before merging and validation.
#[derive(Debug, Default, Deserialize)]
pub struct PartialConfig {
    #[serde(default)]
    pub imports: Vec<String>,

    pub logging: Option<PartialLoggingConfig>,
    pub heartbeat: Option<PartialHeartbeatConfig>,
    pub targets: Option<HashMap<String, PartialTarget>>,

    /// Source information for error reporting (not serialized)
    #[serde(skip)]
    pub source: Option<SourceInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialLoggingConfig {
    pub level: Option<Spanned<LogLevel>>,
    pub overrides: Option<HashMap<String, Spanned<LogLevel>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialHeartbeatConfig {
    pub interval_secs: Option<Spanned<i64>>,

    /// File the interval was taken from, filled in during merge
    #[serde(skip)]
    pub source: Option<SourceInfo>,
}

/// Integers are read as `i64` so out-of-range values reach validation and
/// get a proper diagnostic instead of a parse error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialTarget {
    pub host: Option<Spanned<String>>,
    pub path: Option<Spanned<String>>,
    pub suffix: Option<String>,
    pub https: Option<bool>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<Spanned<i64>>,
    pub heartrate_minutes: Option<Spanned<i64>>,
    pub hourly_forecasts: Option<Spanned<i64>>,
    pub daily_forecasts: Option<Spanned<i64>>,
    pub on_failure: Option<FailurePolicy>,
    pub wind_speed_min: Option<Spanned<f64>>,
    pub wind_speed_max: Option<Spanned<f64>>,
    pub no_leak: Option<bool>,

    /// File the target was defined in, filled in during merge
    #[serde(skip)]
    pub source: Option<SourceInfo>,

    /// Span of the `[targets.<name>]` header within `source`
    #[serde(skip)]
    pub header: Range<usize>,
}

impl PartialConfig {
    /// Load a single config file without processing imports
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            error: e,
        })?;

        let mut config: PartialConfig = toml::from_str(&content).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            error: e,
        })?;

        config.source = Some(SourceInfo {
            file_path: path.to_path_buf(),
            content,
        });

        Ok(config)
    }

    /// Load config files with import resolution
    ///
    /// Imports are resolved relative to the importing file and loaded
    /// depth-first, so the result lists every import before its parent. A
    /// file reached more than once is only loaded the first time.
    pub fn load_with_imports(paths: &[PathBuf]) -> Result<Vec<Self>, LoadError> {
        let mut visited = HashSet::new();
        let mut loaded = HashSet::new();
        let mut all_configs = Vec::new();

        for path in paths {
            Self::load_recursive(path, &mut visited, &mut loaded, &mut all_configs)?;
        }

        Ok(all_configs)
    }

    fn load_recursive(
        path: &Path,
        visited: &mut HashSet<PathBuf>,
        loaded: &mut HashSet<PathBuf>,
        configs: &mut Vec<Self>,
    ) -> Result<(), LoadError> {
        let canonical_path = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());

        if visited.contains(&canonical_path) {
            return Err(LoadError::ImportCycle {
                path: canonical_path,
                cycle: visited.iter().cloned().collect(),
            });
        }

        if loaded.contains(&canonical_path) {
            return Ok(());
        }

        visited.insert(canonical_path.clone());

        let config = Self::from_file(path)?;

        for import in &config.imports {
            let import = PathBuf::from(import);
            let resolved = if import.is_absolute() {
                import
            } else {
                path.parent().unwrap_or_else(|| Path::new(".")).join(import)
            };

            Self::load_recursive(&resolved, visited, loaded, configs)?;
        }

        configs.push(config);
        loaded.insert(canonical_path.clone());

        // Only ancestors count towards a cycle; siblings may share imports
        visited.remove(&canonical_path);

        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.logging.is_none()
            && self.heartbeat.is_none()
            && self.targets.is_none()
            && self.imports.is_empty()
    }

    /// Merge multiple partial configs together
    ///
    /// First occurrence of a field wins. A field set again in a later file
    /// is a conflict; merging carries on so that every conflict is reported
    /// in one go.
    pub fn merge<I>(configs: I) -> (Self, Vec<Diagnostic>)
    where
        I: IntoIterator<Item = Self>,
    {
        let mut result = PartialConfig::default();
        let mut diagnostics = Vec::new();
        let mut imports = Vec::new();

        let mut logging_level_loc: Option<MergeConflictLocation> = None;
        let mut logging_overrides_locs: HashMap<String, MergeConflictLocation> = HashMap::new();
        let mut interval_loc: Option<MergeConflictLocation> = None;
        let mut target_locs: HashMap<String, MergeConflictLocation> = HashMap::new();

        for config in configs {
            imports.extend(config.imports.iter().cloned());

            let source_info = config.source.clone().unwrap_or_else(|| SourceInfo {
                file_path: PathBuf::from("<unknown>"),
                content: String::new(),
            });
            let location = |span: Range<usize>| MergeConflictLocation {
                file_path: source_info.file_path.clone(),
                span,
                content: source_info.content.clone(),
            };

            if config.is_empty() {
                diagnostics.push(Diagnostic::Warning(Warning::EmptyConfig {
                    file_path: source_info.file_path.clone(),
                }));
            }

            if let Some(logging) = config.logging {
                let result_logging = result.logging.get_or_insert_with(Default::default);

                if let Some(level) = logging.level {
                    let loc = location(level.span());
                    match &logging_level_loc {
                        Some(prev) => diagnostics.push(conflict(
                            "logging.level".to_string(),
                            "Logging level defined in multiple config files".to_string(),
                            prev,
                            loc,
                        )),
                        None => {
                            result_logging.level = Some(level);
                            logging_level_loc = Some(loc);
                        }
                    }
                }

                if let Some(overrides) = logging.overrides {
                    let result_overrides =
                        result_logging.overrides.get_or_insert_with(HashMap::new);

                    for (key, level) in overrides {
                        let loc = location(level.span());
                        match logging_overrides_locs.get(&key) {
                            Some(prev) => diagnostics.push(conflict(
                                format!("logging.overrides.{}", key),
                                format!(
                                    "Logging override for '{}' defined in multiple config files",
                                    key
                                ),
                                prev,
                                loc,
                            )),
                            None => {
                                result_overrides.insert(key.clone(), level);
                                logging_overrides_locs.insert(key, loc);
                            }
                        }
                    }
                }
            }

            if let Some(heartbeat) = config.heartbeat {
                let result_heartbeat = result.heartbeat.get_or_insert_with(Default::default);

                if let Some(interval) = heartbeat.interval_secs {
                    let loc = location(interval.span());
                    match &interval_loc {
                        Some(prev) => diagnostics.push(conflict(
                            "heartbeat.interval_secs".to_string(),
                            "Heartbeat interval defined in multiple config files".to_string(),
                            prev,
                            loc,
                        )),
                        None => {
                            result_heartbeat.interval_secs = Some(interval);
                            result_heartbeat.source = Some(source_info.clone());
                            interval_loc = Some(loc);
                        }
                    }
                }
            }

            if let Some(targets) = config.targets {
                let result_targets = result.targets.get_or_insert_with(HashMap::new);

                for (name, mut target) in targets {
                    let header = target_header(&source_info.content, &name);
                    let loc = location(header.clone());

                    match target_locs.get(&name) {
                        Some(prev) => diagnostics.push(conflict(
                            format!("targets.{}", name),
                            format!("Target '{}' defined in multiple config files", name),
                            prev,
                            loc,
                        )),
                        None => {
                            target.source = Some(source_info.clone());
                            target.header = header;
                            result_targets.insert(name.clone(), target);
                            target_locs.insert(name, loc);
                        }
                    }
                }
            }
        }

        result.imports = imports;

        (result, diagnostics)
    }
}

fn conflict(
    field_path: String,
    message: String,
    first: &MergeConflictLocation,
    second: MergeConflictLocation,
) -> Diagnostic {
    Diagnostic::Error(Error::Merge(MergeError {
        field_path,
        message,
        conflicts: vec![first.clone(), second],
    }))
}

/// Span of the `[targets.<name>]` header, or an empty span when the target
/// was written some other way (inline table, dotted keys).
fn target_header(content: &str, name: &str) -> Range<usize> {
    [format!("[targets.{}]", name), format!("[targets.\"{}\"]", name)]
        .iter()
        .find_map(|header| {
            content
                .find(header.as_str())
                .map(|start| start..start + header.len())
        })
        .unwrap_or(0..0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(path: &str, content: &str) -> PartialConfig {
        let mut config: PartialConfig = toml::from_str(content).unwrap();
        config.source = Some(SourceInfo {
            file_path: PathBuf::from(path),
            content: content.to_string(),
        });
        config
    }

    #[test]
    fn test_target_header_span() {
        let content = "[logging]\nlevel = \"info\"\n\n[targets.garden]\nhost = \"h\"\n";
        let span = target_header(content, "garden");
        assert_eq!(&content[span], "[targets.garden]");
        assert_eq!(target_header(content, "roof"), 0..0);
    }

    #[test]
    fn test_merge_keeps_first_target() {
        let a = partial("a.toml", "[targets.garden]\nhost = \"first\"\n");
        let b = partial("b.toml", "[targets.garden]\nhost = \"second\"\n");

        let (merged, diagnostics) = PartialConfig::merge([a, b]);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].is_error());

        let targets = merged.targets.unwrap();
        let garden = &targets["garden"];
        assert_eq!(garden.host.as_ref().unwrap().get_ref(), "first");
        assert_eq!(
            garden.source.as_ref().unwrap().file_path,
            PathBuf::from("a.toml")
        );
    }

    #[test]
    fn test_merge_heartbeat_conflict() {
        let a = partial("a.toml", "[heartbeat]\ninterval_secs = 1\n");
        let b = partial("b.toml", "[heartbeat]\ninterval_secs = 5\n");

        let (merged, diagnostics) = PartialConfig::merge([a, b]);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            merged
                .heartbeat
                .unwrap()
                .interval_secs
                .map(|v| *v.get_ref()),
            Some(1)
        );
    }

    #[test]
    fn test_unknown_target_field_is_rejected() {
        let result: Result<PartialConfig, _> =
            toml::from_str("[targets.garden]\nhost = \"h\"\nheartrate = 10\n");
        assert!(result.is_err());
    }
}
