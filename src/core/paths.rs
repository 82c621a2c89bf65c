//! Instance temp root layout.

use crate::constants;
use crate::core::temp_root;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct InstancePaths {
    pub root: PathBuf,
    pub webserver_private: PathBuf,
    pub info: PathBuf,
    pub master: PathBuf,
    pub backends: PathBuf,
    pub var: PathBuf,
}

impl InstancePaths {
    /// Use `root_arg` when given, otherwise the located temp root.
    pub fn resolve(root_arg: Option<PathBuf>, system_temp_dir: Option<&Path>) -> Self {
        match root_arg {
            Some(root) => Self::from_root(root),
            None => Self::from_root(temp_root::locate(false, system_temp_dir)),
        }
    }

    /// Create instance paths from a root directory.
    pub fn from_root(root: PathBuf) -> Self {
        let webserver_private = root.join(constants::WEBSERVER_PRIVATE_DIR);
        let info = root.join(constants::INFO_DIR);
        let master = root.join(constants::MASTER_DIR);
        let backends = root.join(constants::BACKENDS_DIR);
        let var = root.join(constants::VAR_DIR);
        Self {
            root,
            webserver_private,
            info,
            master,
            backends,
            var,
        }
    }

    /// Subdirectory path by its layout name.
    pub fn subdir(&self, name: &str) -> Option<&Path> {
        match name {
            constants::WEBSERVER_PRIVATE_DIR => Some(&self.webserver_private),
            constants::INFO_DIR => Some(&self.info),
            constants::MASTER_DIR => Some(&self.master),
            constants::BACKENDS_DIR => Some(&self.backends),
            constants::VAR_DIR => Some(&self.var),
            _ => None,
        }
    }
}

impl std::fmt::Display for InstancePaths {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "instance@{}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_root() {
        let paths = InstancePaths::from_root(PathBuf::from("/test"));
        assert_eq!(paths.root, PathBuf::from("/test"));
        assert_eq!(
            paths.webserver_private,
            PathBuf::from("/test/webserver_private")
        );
        assert_eq!(paths.info, PathBuf::from("/test/info"));
        assert_eq!(paths.master, PathBuf::from("/test/master"));
        assert_eq!(paths.backends, PathBuf::from("/test/backends"));
        assert_eq!(paths.var, PathBuf::from("/test/var"));
    }

    #[test]
    fn test_subdir_lookup() {
        let paths = InstancePaths::from_root(PathBuf::from("/test"));
        assert_eq!(paths.subdir("backends"), Some(Path::new("/test/backends")));
        assert_eq!(paths.subdir("elsewhere"), None);
    }

    #[test]
    fn test_resolve_prefers_explicit_root() {
        let paths = InstancePaths::resolve(Some(PathBuf::from("/explicit")), None);
        assert_eq!(paths.root, PathBuf::from("/explicit"));
        assert_eq!(paths.to_string(), "instance@/explicit");
    }
}
