use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::BridgeError;
use crate::jvm::JniLoader;
use crate::runtime::LibraryLoader;
use crate::stub::{StubLoader, StubProgram};

/// Install-root override for the runtime library.
pub const JAVA_HOME_ENV: &str = "JAVA_HOME";
/// Boot archive override; trusted verbatim when set.
pub const BOOT_ARCHIVE_ENV: &str = "LIBBLURAY_CP";

/// File name of the boot archive the hosted program needs on its boot classpath.
pub const BOOT_ARCHIVE_NAME: &str = "libbluray.jar";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub boot: BootConfig,
    #[serde(default)]
    pub vm: VmConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub backend: RuntimeBackend,
    /// Explicit install root; when set, no other location is searched.
    pub java_home: Option<PathBuf>,
    #[serde(default = "default_java_home")]
    pub default_java_home: PathBuf,
}

fn default_java_home() -> PathBuf {
    PathBuf::from("/usr/lib/jvm/default-java/")
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            backend: RuntimeBackend::default(),
            java_home: None,
            default_java_home: default_java_home(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum RuntimeBackend {
    #[default]
    #[serde(rename = "jni")]
    Jni,
    #[serde(rename = "stub")]
    Stub,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootConfig {
    pub classpath: Option<PathBuf>,
    #[serde(default = "default_search_paths")]
    pub search_paths: Vec<PathBuf>,
    #[serde(default = "default_fallback")]
    pub fallback: PathBuf,
}

#[cfg(windows)]
fn default_search_paths() -> Vec<PathBuf> {
    vec![PathBuf::from(BOOT_ARCHIVE_NAME)]
}

#[cfg(not(windows))]
fn default_search_paths() -> Vec<PathBuf> {
    vec![
        Path::new("/usr/lib/libbluray").join(BOOT_ARCHIVE_NAME),
        Path::new("/usr/share/libbluray").join(BOOT_ARCHIVE_NAME),
    ]
}

fn default_fallback() -> PathBuf {
    PathBuf::from(BOOT_ARCHIVE_NAME)
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            classpath: None,
            search_paths: default_search_paths(),
            fallback: default_fallback(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VmConfig {
    /// Appended after the boot classpath and VFS root options. Unrecognized
    /// options make runtime creation fail.
    #[serde(default)]
    pub extra_options: Vec<String>,
}

impl BridgeConfig {
    pub fn from_file(path: &Path) -> Result<Self, BridgeError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| BridgeError::Config(format!("Failed to parse {}: {e}", path.display())))
    }

    /// `~/.config/bdj/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bdj")
            .join("config.toml")
    }

    /// Load the config file if present, otherwise start from defaults, then
    /// overlay the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, BridgeError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        Ok(config.apply_env())
    }

    /// Overlay `JAVA_HOME` and `LIBBLURAY_CP`; environment wins over file values.
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    pub fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(home) = non_empty(JAVA_HOME_ENV) {
            self.runtime.java_home = Some(PathBuf::from(home));
        }
        if let Some(cp) = non_empty(BOOT_ARCHIVE_ENV) {
            self.boot.classpath = Some(PathBuf::from(cp));
        }
        self
    }

    pub fn build_loader(&self) -> Box<dyn LibraryLoader> {
        match self.runtime.backend {
            RuntimeBackend::Jni => Box::new(JniLoader),
            RuntimeBackend::Stub => Box::new(StubLoader::new(StubProgram::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: BridgeConfig = toml::from_str("").unwrap();
        assert_eq!(config.runtime.backend, RuntimeBackend::Jni);
        assert!(config.runtime.java_home.is_none());
        assert_eq!(
            config.runtime.default_java_home,
            PathBuf::from("/usr/lib/jvm/default-java/")
        );
        assert_eq!(config.boot.fallback, PathBuf::from("libbluray.jar"));
        assert!(!config.boot.search_paths.is_empty());
        assert!(config.vm.extra_options.is_empty());
    }

    #[test]
    fn parses_full_config() {
        let toml_str = r#"
[runtime]
backend = "stub"
java_home = "/opt/jdk8"

[boot]
classpath = "/opt/bdj/libbluray.jar"
search_paths = ["/a/libbluray.jar", "/b/libbluray.jar"]
fallback = "/c/libbluray.jar"

[vm]
extra_options = ["-Xmx64m"]
"#;
        let config: BridgeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.runtime.backend, RuntimeBackend::Stub);
        assert_eq!(config.runtime.java_home, Some(PathBuf::from("/opt/jdk8")));
        assert_eq!(config.boot.search_paths.len(), 2);
        assert_eq!(config.boot.fallback, PathBuf::from("/c/libbluray.jar"));
        assert_eq!(config.vm.extra_options, vec!["-Xmx64m".to_string()]);
    }

    #[test]
    fn rejects_unknown_backend() {
        let err = toml::from_str::<BridgeConfig>("[runtime]\nbackend = \"dalvik\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn environment_overrides_file_values() {
        let config: BridgeConfig = toml::from_str("[runtime]\njava_home = \"/from/file\"\n").unwrap();
        let config = config.apply_env_from(|key| match key {
            "JAVA_HOME" => Some("/from/env".into()),
            "LIBBLURAY_CP" => Some("/env/libbluray.jar".into()),
            _ => None,
        });
        assert_eq!(config.runtime.java_home, Some(PathBuf::from("/from/env")));
        assert_eq!(
            config.boot.classpath,
            Some(PathBuf::from("/env/libbluray.jar"))
        );
    }

    #[test]
    fn empty_environment_values_are_ignored() {
        let config = BridgeConfig::default().apply_env_from(|_| Some(String::new()));
        assert!(config.runtime.java_home.is_none());
        assert!(config.boot.classpath.is_none());
    }

    #[test]
    fn from_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[runtime\n").unwrap();
        let err = BridgeConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }
}
