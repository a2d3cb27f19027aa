//! Auxiliary file loading (test case scripts, locustfiles, access tokens)

use crate::api::Application;
use crate::error::{GenerationError, Result};
use std::path::Path;

/// Loads the contents of a file referenced by an application
pub trait FileLoader: Send + Sync {
    /// Load `path`; relative paths are resolved against the application's working directory
    fn load_file(&self, app: &Application, path: &str) -> Result<Vec<u8>>;
}

/// Loads files from the local file system
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLoader;

impl FileLoader for FsLoader {
    fn load_file(&self, app: &Application, path: &str) -> Result<Vec<u8>> {
        let path = path.strip_prefix("file://").unwrap_or(path);
        let resolved = if Path::new(path).is_absolute() {
            Path::new(path).to_path_buf()
        } else {
            // Never fall back to the process working directory
            let base = app.working_directory().ok_or_else(|| {
                GenerationError::file_load(path, "relative path without an application working directory")
            })?;
            base.join(path)
        };

        std::fs::read(&resolved).map_err(|e| GenerationError::file_load(resolved.display().to_string(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PATH_ANNOTATION;
    use std::collections::BTreeMap;

    fn app_in(dir: &Path) -> Application {
        let mut app = Application::default();
        app.metadata.annotations = Some(BTreeMap::from([(
            PATH_ANNOTATION.to_string(),
            dir.join("app.yaml").display().to_string(),
        )]));
        app
    }

    #[test]
    fn test_relative_path_uses_application_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("locustfile.py"), "from locust import HttpUser\n").unwrap();

        let data = FsLoader.load_file(&app_in(dir.path()), "locustfile.py").unwrap();
        assert_eq!(data, b"from locust import HttpUser\n");
    }

    #[test]
    fn test_relative_path_without_working_directory() {
        let err = FsLoader.load_file(&Application::default(), "locustfile.py").unwrap_err();
        assert!(matches!(err, GenerationError::FileLoad { .. }));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsLoader.load_file(&app_in(dir.path()), "missing.js").unwrap_err();
        let GenerationError::FileLoad { path, .. } = err else {
            panic!("expected a file load error");
        };
        assert!(path.ends_with("missing.js"));
    }
}
