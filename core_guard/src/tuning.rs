//! Rewrites the server's own configuration files toward the configured
//! targets: `server.properties` line by line, the YAML files by dotted path.
//! Every rewritten file gets a timestamped backup first.

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigMode, GuardConfig, ServerFilesConfig, ServerPropertiesConfig};

pub const PROPERTIES_FILE: &str = "server.properties";
pub const SPIGOT_FILE: &str = "spigot.yml";
pub const BUKKIT_FILE: &str = "bukkit.yml";
pub const PAPER_WORLD_FILE: &str = "config/paper-world-defaults.yml";

#[derive(Debug, Error)]
pub enum TuningError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to back up {path:?}: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed yaml in {path:?}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{path:?} does not hold a yaml mapping")]
    NotMapping { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyChange {
    pub key: String,
    pub previous: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TuningReport {
    pub changes: Vec<PropertyChange>,
    pub backup: Option<PathBuf>,
}

impl TuningReport {
    pub fn restart_required(&self) -> bool {
        !self.changes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileTuning {
    /// Path relative to the server root.
    pub file: PathBuf,
    pub report: TuningReport,
}

/// Outcome of one pass over every server file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerFilesReport {
    pub tuned: Vec<FileTuning>,
    /// YAML files that do not exist under the root.
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

impl ServerFilesReport {
    pub fn restart_required(&self) -> bool {
        self.tuned.iter().any(|file| file.report.restart_required())
    }

    pub fn report_for(&self, file: &str) -> Option<&TuningReport> {
        self.tuned
            .iter()
            .find(|tuned| tuned.file == Path::new(file))
            .map(|tuned| &tuned.report)
    }
}

/// Target key/value pairs, clamped to the ranges the server accepts.
pub fn desired_properties(config: &ServerPropertiesConfig) -> Vec<(&'static str, String)> {
    vec![
        ("view-distance", config.view_distance.clamp(2, 32).to_string()),
        (
            "simulation-distance",
            config.simulation_distance.clamp(2, 32).to_string(),
        ),
        (
            "network-compression-threshold",
            config.network_compression_threshold.to_string(),
        ),
        ("max-players", config.max_players.clamp(1, 1000).to_string()),
    ]
}

pub fn spigot_targets(config: &ServerFilesConfig) -> Vec<(&'static str, Value)> {
    let range = config.tracking_range;
    vec![
        ("world-settings.default.entity-tracking-range.players", count(range.players)),
        ("world-settings.default.entity-tracking-range.animals", count(range.animals)),
        ("world-settings.default.entity-tracking-range.monsters", count(range.monsters)),
        ("world-settings.default.entity-tracking-range.misc", count(range.misc)),
        ("world-settings.default.mob-spawn-range", count(config.mob_spawn_range)),
    ]
}

pub fn bukkit_targets(config: &ServerFilesConfig) -> Vec<(&'static str, Value)> {
    let limits = config.spawn_limits;
    vec![
        ("spawn-limits.monsters", count(limits.monsters)),
        ("spawn-limits.animals", count(limits.animals)),
        ("spawn-limits.water-animals", count(limits.water_animals)),
        ("spawn-limits.ambient", count(limits.ambient)),
        ("chunk-gc.period-in-ticks", count(config.chunk_gc_period_ticks)),
    ]
}

/// Paper world defaults are only touched in advanced mode.
pub fn paper_targets(config: &ServerFilesConfig, mode: ConfigMode) -> Vec<(&'static str, Value)> {
    if !mode.is_advanced() {
        return Vec::new();
    }
    let activation = config.activation_range;
    let limits = config.spawn_limits;
    vec![
        ("entity-activation-range.animals", count(activation.animals)),
        ("entity-activation-range.monsters", count(activation.monsters)),
        ("entity-activation-range.misc", count(activation.misc)),
        (
            "entity-activation-range.tick-inactive-villagers",
            Value::Bool(activation.tick_inactive_villagers),
        ),
        ("spawn-limits.monsters", count(limits.monsters)),
        ("spawn-limits.animals", count(limits.animals)),
        ("spawn-limits.water-animals", count(limits.water_animals)),
        ("spawn-limits.ambient", count(limits.ambient)),
        ("despawn-ranges.soft", count(config.despawn_ranges.soft)),
        ("despawn-ranges.hard", count(config.despawn_ranges.hard)),
        (
            "redstone.disable-falling-dust",
            Value::Bool(config.redstone.disable_falling_dust),
        ),
        (
            "redstone.disable-item-frame-glow",
            Value::Bool(config.redstone.disable_item_frame_glow),
        ),
    ]
}

fn count(value: u32) -> Value {
    Value::from(u64::from(value))
}

/// Tune every server file under `root`. A missing or unreadable file is
/// logged and recorded; it never stops the remaining files.
pub fn tune_server_files(root: &Path, config: &GuardConfig) -> ServerFilesReport {
    let mut report = ServerFilesReport::default();

    match tune_server_properties(root, config.server_properties()) {
        Ok(tuning) => report.tuned.push(FileTuning {
            file: PathBuf::from(PROPERTIES_FILE),
            report: tuning,
        }),
        Err(err) => {
            warn!(target: "tick_guard::tuning", error = %err, "server_properties.tune_failed");
            report.failed.push(PathBuf::from(PROPERTIES_FILE));
        }
    }

    let files = config.server_files();
    let yaml_files = [
        (PAPER_WORLD_FILE, paper_targets(files, config.mode())),
        (SPIGOT_FILE, spigot_targets(files)),
        (BUKKIT_FILE, bukkit_targets(files)),
    ];
    for (file, targets) in yaml_files {
        if targets.is_empty() {
            continue;
        }
        let path = root.join(file);
        if !path.exists() {
            warn!(target: "tick_guard::tuning", file, "server_file.missing=skipped");
            report.skipped.push(PathBuf::from(file));
            continue;
        }
        match tune_yaml_file(&path, &targets) {
            Ok(tuning) => report.tuned.push(FileTuning {
                file: PathBuf::from(file),
                report: tuning,
            }),
            Err(err) => {
                warn!(target: "tick_guard::tuning", file, error = %err, "server_file.tune_failed");
                report.failed.push(PathBuf::from(file));
            }
        }
    }

    report
}

/// Apply the targets to `<root>/server.properties`. Comments, ordering and
/// unrelated keys are preserved; a timestamped backup is written before any
/// change.
pub fn tune_server_properties(
    root: &Path,
    config: &ServerPropertiesConfig,
) -> Result<TuningReport, TuningError> {
    let path = root.join(PROPERTIES_FILE);
    let original = fs::read_to_string(&path).map_err(|source| TuningError::Read {
        path: path.clone(),
        source,
    })?;

    let (rewritten, changes) = rewrite_properties(&original, &desired_properties(config));
    if changes.is_empty() {
        info!(target: "tick_guard::tuning", "server_properties.unchanged");
        return Ok(TuningReport::default());
    }

    let backup = write_with_backup(&path, rewritten)?;
    info!(
        target: "tick_guard::tuning",
        changed = changes.len(),
        backup = %backup.display(),
        "server_properties.tuned"
    );
    Ok(TuningReport {
        changes,
        backup: Some(backup),
    })
}

/// Set each dotted path in a YAML document whose current value differs,
/// creating intermediate mappings as needed. The file is only rewritten,
/// after a backup, when something changed. Comments are not preserved.
pub fn tune_yaml_file(
    path: &Path,
    targets: &[(&'static str, Value)],
) -> Result<TuningReport, TuningError> {
    let original = fs::read_to_string(path).map_err(|source| TuningError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut document: Value =
        serde_yaml::from_str(&original).map_err(|source| TuningError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
    if document.is_null() {
        document = Value::Mapping(Mapping::new());
    }
    if !document.is_mapping() {
        return Err(TuningError::NotMapping {
            path: path.to_path_buf(),
        });
    }

    let changes: Vec<PropertyChange> = targets
        .iter()
        .filter_map(|(key, value)| set_yaml_if_different(&mut document, key, value))
        .collect();
    if changes.is_empty() {
        info!(target: "tick_guard::tuning", file = %path.display(), "server_file.unchanged");
        return Ok(TuningReport::default());
    }

    let rewritten = serde_yaml::to_string(&document).map_err(|source| TuningError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    let backup = write_with_backup(path, rewritten)?;
    info!(
        target: "tick_guard::tuning",
        file = %path.display(),
        changed = changes.len(),
        backup = %backup.display(),
        "server_file.tuned"
    );
    Ok(TuningReport {
        changes,
        backup: Some(backup),
    })
}

fn set_yaml_if_different(document: &mut Value, key: &str, value: &Value) -> Option<PropertyChange> {
    let segments: Vec<&str> = key.split('.').collect();
    let previous = segments
        .iter()
        .try_fold(&*document, |node, segment| node.get(*segment))
        .filter(|current| !current.is_null())
        .cloned();
    if previous.as_ref() == Some(value) {
        return None;
    }
    set_path(document, &segments, value.clone());
    Some(PropertyChange {
        key: key.to_string(),
        previous: previous.as_ref().map(scalar_text),
        value: scalar_text(value),
    })
}

fn set_path(node: &mut Value, segments: &[&str], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if !node.is_mapping() {
        *node = Value::Mapping(Mapping::new());
    }
    if let Value::Mapping(mapping) = node {
        let child = mapping.entry(Value::from(*first)).or_insert(Value::Null);
        set_path(child, rest, value);
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        other => serde_yaml::to_string(other)
            .map(|text| text.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn write_with_backup(path: &Path, contents: String) -> Result<PathBuf, TuningError> {
    let backup = backup_path(path);
    fs::copy(path, &backup).map_err(|source| TuningError::Backup {
        path: backup.clone(),
        source,
    })?;
    fs::write(path, contents).map_err(|source| TuningError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(backup)
}

fn rewrite_properties(
    original: &str,
    desired: &[(&'static str, String)],
) -> (String, Vec<PropertyChange>) {
    let mut changes = Vec::new();
    let mut seen = vec![false; desired.len()];
    let mut lines: Vec<String> = Vec::new();

    for line in original.lines() {
        let Some((key, value)) = split_property(line) else {
            lines.push(line.to_string());
            continue;
        };
        match desired.iter().position(|(wanted, _)| *wanted == key) {
            Some(idx) => {
                seen[idx] = true;
                let target = &desired[idx].1;
                if value == target {
                    lines.push(line.to_string());
                } else {
                    changes.push(PropertyChange {
                        key: key.to_string(),
                        previous: Some(value.to_string()),
                        value: target.clone(),
                    });
                    lines.push(format!("{key}={target}"));
                }
            }
            None => lines.push(line.to_string()),
        }
    }

    for ((key, target), present) in desired.iter().zip(seen) {
        if present {
            continue;
        }
        changes.push(PropertyChange {
            key: key.to_string(),
            previous: None,
            value: target.clone(),
        });
        lines.push(format!("{key}={target}"));
    }

    let mut rewritten = lines.join("\n");
    rewritten.push('\n');
    (rewritten, changes)
}

fn split_property(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
        return None;
    }
    let split = trimmed.find(|c: char| c == '=' || c == ':')?;
    Some((trimmed[..split].trim(), trimmed[split + 1..].trim()))
}

fn backup_path(path: &Path) -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| PROPERTIES_FILE.to_string());
    path.with_file_name(format!("{name}.backup-{millis}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_only_differing_keys_and_keeps_comments() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(PROPERTIES_FILE);
        fs::write(
            &path,
            "#Minecraft server properties\nmotd=hello\nview-distance=16\nsimulation-distance=6\n",
        )
        .expect("write");

        let report =
            tune_server_properties(dir.path(), &ServerPropertiesConfig::default()).expect("tune");

        assert!(report.restart_required());
        let keys: Vec<&str> = report.changes.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["view-distance", "network-compression-threshold", "max-players"]
        );
        let rewritten = fs::read_to_string(&path).expect("read back");
        assert!(rewritten.starts_with("#Minecraft server properties\nmotd=hello\nview-distance=8\n"));
        assert!(rewritten.contains("max-players=20"));

        let backup = report.backup.expect("backup written");
        assert!(backup
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("server.properties.backup-")));
        assert!(fs::read_to_string(backup).expect("backup").contains("view-distance=16"));
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(PROPERTIES_FILE), "view-distance=3\n").expect("write");
        let config = ServerPropertiesConfig {
            view_distance: 64,
            max_players: 0,
            ..ServerPropertiesConfig::default()
        };

        let first = tune_server_properties(dir.path(), &config).expect("first");
        assert_eq!(first.changes[0].value, "32");
        let second = tune_server_properties(dir.path(), &config).expect("second");
        assert!(!second.restart_required());
        assert!(second.backup.is_none());
        let contents = fs::read_to_string(dir.path().join(PROPERTIES_FILE)).expect("read");
        assert!(contents.contains("max-players=1"));
    }

    fn server_root(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        for (name, contents) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("config dir");
            }
            fs::write(path, contents).expect("write");
        }
        dir
    }

    #[test]
    fn spigot_tuning_sets_only_differing_paths_and_backs_up() {
        let dir = server_root(&[(
            SPIGOT_FILE,
            "settings:\n  debug: false\nworld-settings:\n  default:\n    mob-spawn-range: 8\n    entity-tracking-range:\n      players: 48\n",
        )]);
        let path = dir.path().join(SPIGOT_FILE);

        let report = tune_yaml_file(&path, &spigot_targets(&ServerFilesConfig::default()))
            .expect("tune spigot");

        let keys: Vec<&str> = report.changes.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "world-settings.default.entity-tracking-range.animals",
                "world-settings.default.entity-tracking-range.monsters",
                "world-settings.default.entity-tracking-range.misc",
                "world-settings.default.mob-spawn-range",
            ]
        );
        let spawn_range = &report.changes[3];
        assert_eq!(spawn_range.previous.as_deref(), Some("8"));
        assert_eq!(spawn_range.value, "6");

        let tuned: Value =
            serde_yaml::from_str(&fs::read_to_string(&path).expect("read back")).expect("yaml");
        assert_eq!(tuned["world-settings"]["default"]["mob-spawn-range"], Value::from(6u64));
        assert_eq!(
            tuned["world-settings"]["default"]["entity-tracking-range"]["misc"],
            Value::from(16u64)
        );
        assert_eq!(tuned["settings"]["debug"], Value::Bool(false));

        let backup = report.backup.expect("backup written");
        assert!(fs::read_to_string(backup)
            .expect("backup")
            .contains("mob-spawn-range: 8"));

        let second = tune_yaml_file(&path, &spigot_targets(&ServerFilesConfig::default()))
            .expect("second pass");
        assert!(!second.restart_required());
        assert!(second.backup.is_none());
    }

    #[test]
    fn scalar_in_the_way_becomes_a_mapping() {
        let dir = server_root(&[(BUKKIT_FILE, "spawn-limits: 7\n")]);
        let path = dir.path().join(BUKKIT_FILE);

        let report = tune_yaml_file(&path, &bukkit_targets(&ServerFilesConfig::default()))
            .expect("tune bukkit");
        assert_eq!(report.changes.len(), 5);

        let tuned: Value =
            serde_yaml::from_str(&fs::read_to_string(&path).expect("read back")).expect("yaml");
        assert_eq!(tuned["spawn-limits"]["water-animals"], Value::from(5u64));
        assert_eq!(tuned["chunk-gc"]["period-in-ticks"], Value::from(600u64));
    }

    #[test]
    fn non_mapping_document_is_rejected() {
        let dir = server_root(&[(BUKKIT_FILE, "- just\n- a list\n")]);
        let err = tune_yaml_file(
            &dir.path().join(BUKKIT_FILE),
            &bukkit_targets(&ServerFilesConfig::default()),
        )
        .expect_err("list document");
        assert!(matches!(err, TuningError::NotMapping { .. }));
    }

    #[test]
    fn paper_defaults_are_only_tuned_in_advanced_mode() {
        let files = ServerFilesConfig::default();
        assert!(paper_targets(&files, ConfigMode::Simple).is_empty());
        let advanced = paper_targets(&files, ConfigMode::Advanced);
        assert_eq!(advanced.len(), 12);
        assert!(advanced
            .iter()
            .any(|(key, value)| *key == "despawn-ranges.hard" && *value == Value::from(128u64)));
    }

    #[test]
    fn server_files_pass_skips_missing_yaml_and_reports_restart() {
        let dir = server_root(&[
            (PROPERTIES_FILE, "view-distance=8\nsimulation-distance=6\nnetwork-compression-threshold=256\nmax-players=20\n"),
            (BUKKIT_FILE, "spawn-limits:\n  monsters: 70\n"),
            (PAPER_WORLD_FILE, "spawn-limits:\n  monsters: 70\n"),
        ]);
        let mut config = GuardConfig::default();

        let simple = tune_server_files(dir.path(), &config);
        assert!(simple.restart_required());
        assert_eq!(simple.skipped, vec![PathBuf::from(SPIGOT_FILE)]);
        assert!(simple.failed.is_empty());
        assert!(!simple
            .report_for(PROPERTIES_FILE)
            .expect("properties tuned")
            .restart_required());
        assert!(simple.report_for(BUKKIT_FILE).expect("bukkit tuned").restart_required());
        assert!(simple.report_for(PAPER_WORLD_FILE).is_none());

        config.set_mode(ConfigMode::Advanced);
        let advanced = tune_server_files(dir.path(), &config);
        assert!(advanced
            .report_for(PAPER_WORLD_FILE)
            .expect("paper tuned")
            .restart_required());
        assert!(!advanced.report_for(BUKKIT_FILE).expect("bukkit").restart_required());
    }

    #[test]
    fn missing_properties_file_is_recorded_as_failed() {
        let dir = server_root(&[]);
        let report = tune_server_files(dir.path(), &GuardConfig::default());
        assert_eq!(report.failed, vec![PathBuf::from(PROPERTIES_FILE)]);
        assert_eq!(report.skipped.len(), 2);
        assert!(!report.restart_required());
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = tune_server_properties(dir.path(), &ServerPropertiesConfig::default())
            .expect_err("no properties file");
        assert!(matches!(err, TuningError::Read { .. }));
    }
}
