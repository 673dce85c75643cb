//! YAML schedule manifests loaded at startup.
//!
//! The binary points at a directory of `.yaml`/`.yml` files, one schedule
//! per file. A file that fails to parse is logged and skipped so one bad
//! manifest cannot keep the rest from loading.

use std::path::Path;

use tracing::warn;

use metronome_core::{MetronomeError, Schedule};

/// Load every schedule manifest under `dir`. Non-YAML files are ignored;
/// unparseable YAML is warned about and skipped.
pub fn load_dir(dir: &Path) -> Result<Vec<Schedule>, MetronomeError> {
    let mut schedules = Vec::new();
    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("yaml" | "yml")
            )
        })
        .collect();
    entries.sort();

    for path in entries {
        let raw = std::fs::read_to_string(&path)?;
        match serde_yaml::from_str::<Schedule>(&raw) {
            Ok(schedule) => schedules.push(schedule),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unparseable manifest");
            }
        }
    }
    Ok(schedules)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    const GOOD: &str = r#"
meta:
  namespace: default
  name: nightly-backup
spec:
  cron: "0 2 * * *"
  template:
    spec:
      command: ["backup", "--full"]
"#;

    #[test]
    fn loads_schedules_from_yaml_files() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "backup.yaml", GOOD);
        write_file(dir.path(), "notes.txt", "not a manifest");

        let schedules = load_dir(dir.path()).unwrap();
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].meta.name, "nightly-backup");
        assert_eq!(schedules[0].spec.cron, "0 2 * * *");
    }

    #[test]
    fn bad_yaml_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "bad.yaml", "{{ definitely not yaml");
        write_file(dir.path(), "good.yaml", GOOD);

        let schedules = load_dir(dir.path()).unwrap();
        assert_eq!(schedules.len(), 1);
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(load_dir(Path::new("/definitely/not/here")).is_err());
    }

    #[test]
    fn empty_directory_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_dir(dir.path()).unwrap().is_empty());
    }
}
