//! Preconditions checked before the first session starts.

use std::fs;

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::io::config::{ENV_PLAN_DIR, Settings};

/// Fail unless the project plan exists (sanity mode needs none), then make
/// sure the log directory is there.
pub fn prepare(settings: &Settings) -> Result<()> {
    let plan_file = settings.plan_file();
    if !settings.sanity_check && !plan_file.is_file() {
        bail!(
            "project plan not found at {}\nCreate CLAUDE.md in the plan directory or set {ENV_PLAN_DIR}.",
            plan_file.display()
        );
    }
    fs::create_dir_all(&settings.log_dir)
        .with_context(|| format!("create log dir {}", settings.log_dir.display()))?;
    debug!(log_dir = %settings.log_dir.display(), "log dir ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::{CliOverrides, WiggumConfig};

    fn settings(root: &std::path::Path, sanity_check: bool) -> Settings {
        Settings::resolve(
            root,
            &WiggumConfig::default(),
            &CliOverrides {
                sanity_check,
                ..CliOverrides::default()
            },
        )
        .expect("resolve")
    }

    #[test]
    fn missing_plan_names_path_and_variable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = prepare(&settings(temp.path(), false)).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("harness/project/CLAUDE.md"), "{message}");
        assert!(message.contains("WIGGUM_PLAN_DIR"), "{message}");
        assert!(!temp.path().join("harness/logs").exists());
    }

    #[test]
    fn sanity_mode_needs_no_plan() {
        let temp = tempfile::tempdir().expect("tempdir");
        prepare(&settings(temp.path(), true)).expect("prepare");
        assert!(temp.path().join("harness/logs").is_dir());
    }

    #[test]
    fn existing_plan_creates_log_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plan_dir = temp.path().join("harness/project");
        fs::create_dir_all(&plan_dir).expect("mkdir");
        fs::write(plan_dir.join("CLAUDE.md"), "# plan\n").expect("write");
        prepare(&settings(temp.path(), false)).expect("prepare");
        assert!(temp.path().join("harness/logs").is_dir());
    }
}
