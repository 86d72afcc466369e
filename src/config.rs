use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, SelfCheckError};

/// Default config file looked up in the root directory.
pub const CONFIG_FILE: &str = "selfcheck.toml";

/// Fixed settings of a self-check run. Loaded once and passed to every stage.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// The only machine the self-check may run on.
    pub host_name: String,
    pub project_dir: String,
    /// Build descriptor, relative to `project_dir`.
    pub build_descriptor: String,
    pub ids_file: String,
    pub tests_dir: String,
    /// Extension (without the dot) of test-input files.
    pub test_extension: String,
    pub expected_dir: String,
    /// Appended to a test's stem to name its expected-output file.
    pub expected_suffix: String,
    pub scratch_dir: String,
    /// Executable the build must produce inside `project_dir`.
    pub artifact_name: String,
    pub build_command: String,
    /// Command prefix placed before the artifact.
    /// Example: "java -jar" when the artifact is a jar.
    pub launcher: String,
    pub simulator: String,
    pub simulator_file_flag: String,
    pub case_timeout_secs: u64,
    /// No timeout is applied to the build unless this is set.
    pub build_timeout_secs: Option<u64>,
    /// Output that is compared as-is instead of being simulated.
    pub sentinel: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host_name: "nova".into(),
            project_dir: "ex5".into(),
            build_descriptor: "Makefile".into(),
            ids_file: "ids.txt".into(),
            tests_dir: "tests".into(),
            test_extension: "txt".into(),
            expected_dir: "expected_output".into(),
            expected_suffix: "_Expected_Output.txt".into(),
            scratch_dir: "self_check_output".into(),
            artifact_name: "COMPILER".into(),
            build_command: "make".into(),
            launcher: String::new(),
            simulator: "spim".into(),
            simulator_file_flag: "-file".into(),
            case_timeout_secs: 10,
            build_timeout_secs: None,
            sentinel: "Register Allocation Failed".into(),
        }
    }
}

impl Config {
    /// Load `selfcheck.toml` from `root`, falling back to defaults if absent.
    ///
    /// An explicit `path` must exist. A present but malformed file is an error
    /// in both cases.
    pub fn load(root: &Path, path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (root.join(CONFIG_FILE), false),
        };
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => return Err(SelfCheckError::io(format!("read {}", path.display()), e)),
        };
        let config: Self = toml::from_str(&content)
            .map_err(|e| SelfCheckError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.case_timeout_secs == 0 {
            return Err(SelfCheckError::Config(
                "case_timeout_secs must be greater than zero".into(),
            ));
        }
        if split_command(&self.build_command)?.is_empty() {
            return Err(SelfCheckError::Config("build_command is empty".into()));
        }
        if split_command(&self.simulator)?.is_empty() {
            return Err(SelfCheckError::Config("simulator is empty".into()));
        }
        split_command(&self.launcher)?;
        Ok(())
    }

    pub fn case_timeout(&self) -> Duration {
        Duration::from_secs(self.case_timeout_secs)
    }

    pub fn build_timeout(&self) -> Option<Duration> {
        self.build_timeout_secs.map(Duration::from_secs)
    }
}

/// Split a configured command line into program + args.
pub fn split_command(line: &str) -> Result<Vec<String>> {
    shell_words::split(line)
        .map_err(|e| SelfCheckError::Config(format!("cannot parse command '{}': {}", line, e)))
}

/// Absolute locations of everything a run touches, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Layout {
    pub root: PathBuf,
    pub project_dir: PathBuf,
    pub build_descriptor: PathBuf,
    pub ids_file: PathBuf,
    pub tests_dir: PathBuf,
    pub expected_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub artifact: PathBuf,
}

impl Layout {
    pub fn resolve(root: &Path, config: &Config) -> Result<Self> {
        let root = std::path::absolute(root)
            .map_err(|e| SelfCheckError::io(format!("resolve {}", root.display()), e))?;
        let project_dir = root.join(&config.project_dir);
        Ok(Self {
            build_descriptor: project_dir.join(&config.build_descriptor),
            artifact: project_dir.join(&config.artifact_name),
            ids_file: root.join(&config.ids_file),
            tests_dir: root.join(&config.tests_dir),
            expected_dir: root.join(&config.expected_dir),
            scratch_dir: root.join(&config.scratch_dir),
            project_dir,
            root,
        })
    }

    pub fn expected_output(&self, stem: &str, config: &Config) -> PathBuf {
        self.expected_dir.join(format!("{}{}", stem, config.expected_suffix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path(), None).unwrap();
        assert_eq!(config.host_name, "nova");
        assert_eq!(config.case_timeout(), Duration::from_secs(10));
        assert!(config.build_timeout().is_none());
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "host_name = \"lab-1\"\nlauncher = \"java -jar\"\nbuild_timeout_secs = 120\n",
        )
        .unwrap();
        let config = Config::load(dir.path(), None).unwrap();
        assert_eq!(config.host_name, "lab-1");
        assert_eq!(split_command(&config.launcher).unwrap(), ["java", "-jar"]);
        assert_eq!(config.build_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.simulator, "spim");
    }

    #[test]
    fn malformed_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "host_nam = \"x\"\n").unwrap();
        assert!(matches!(
            Config::load(dir.path(), None),
            Err(SelfCheckError::Config(_))
        ));
    }

    #[test]
    fn explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Config::load(dir.path(), Some(&missing)),
            Err(SelfCheckError::Io { .. })
        ));
    }

    #[test]
    fn zero_case_timeout_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "case_timeout_secs = 0\n").unwrap();
        assert!(Config::load(dir.path(), None).is_err());
    }

    #[test]
    fn layout_derives_case_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let layout = Layout::resolve(dir.path(), &config).unwrap();
        assert!(layout.root.is_absolute());
        assert_eq!(layout.artifact, layout.root.join("ex5").join("COMPILER"));
        assert_eq!(layout.build_descriptor, layout.root.join("ex5/Makefile"));
        assert_eq!(layout.scratch_dir, layout.root.join("self_check_output"));
        assert_eq!(
            layout.expected_output("t1", &config),
            layout.root.join("expected_output/t1_Expected_Output.txt")
        );
    }
}
