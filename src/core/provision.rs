//! Provisioning of the instance temp tree.
//!
//! Which user owns each subdirectory, and with what mode, depends on
//! whether this process is privileged and whether workers run under
//! per-application users. That policy lives in [`matrix`] as plain data so
//! it can be audited and tested without touching the filesystem.

use crate::constants::{
    self, BACKENDS_DIR, INFO_DIR, MASTER_DIR, VAR_DIR, WEBSERVER_PRIVATE_DIR,
};
use crate::core::probe::{FileType, Prober};
use crate::error::ProvisionError;
use crate::util::privilege::{self, Identity, IdentityLookup, SystemUsers};
use crate::util::{fs as tree_fs, mode};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Privilege configuration the decision table is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    NonElevated,
    Elevated { user_switching: bool },
}

impl Privilege {
    /// Privilege of the running process (elevated iff euid is 0).
    pub fn detect(user_switching: bool) -> Self {
        if privilege::is_root() {
            Privilege::Elevated { user_switching }
        } else {
            Privilege::NonElevated
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Privilege::NonElevated => write!(f, "non-elevated"),
            Privilege::Elevated {
                user_switching: true,
            } => write!(f, "elevated, user switching on"),
            Privilege::Elevated {
                user_switching: false,
            } => write!(f, "elevated, user switching off"),
        }
    }
}

/// Who a provisioned directory is handed to after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// Leave the creating process as owner.
    Unchanged,
    Worker,
    Lowest,
    /// Lowest-privileged uid with the worker's gid.
    LowestUserWorkerGroup,
}

impl Owner {
    pub fn identity(self, lowest: Identity, worker: Identity) -> Option<Identity> {
        match self {
            Owner::Unchanged => None,
            Owner::Worker => Some(worker),
            Owner::Lowest => Some(lowest),
            Owner::LowestUserWorkerGroup => Some(lowest.with_group_of(&worker)),
        }
    }
}

/// One row of the decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirSpec {
    pub name: &'static str,
    pub mode: &'static str,
    pub owner: Owner,
}

const fn entry(name: &'static str, mode: &'static str, owner: Owner) -> DirSpec {
    DirSpec { name, mode, owner }
}

/// Mode and owner for each subdirectory of the temp root.
///
/// `backends` stays traversable by everyone under both elevated
/// configurations; inspection tools outside the server read it.
pub fn matrix(privilege: Privilege) -> [DirSpec; 5] {
    use Owner::{Lowest, LowestUserWorkerGroup, Unchanged, Worker};
    match privilege {
        Privilege::Elevated {
            user_switching: true,
        } => [
            entry(WEBSERVER_PRIVATE_DIR, "u=wxs,g=,o=", Worker),
            entry(INFO_DIR, "u=rwxs,g=,o=", Unchanged),
            entry(MASTER_DIR, "u=wxs,g=,o=", Worker),
            entry(BACKENDS_DIR, "u=rwxs,g=wx,o=wx", Unchanged),
            entry(VAR_DIR, "u=wxs,g=wx,o=wx", Unchanged),
        ],
        Privilege::Elevated {
            user_switching: false,
        } => [
            entry(WEBSERVER_PRIVATE_DIR, "u=wxs,g=,o=", Worker),
            entry(INFO_DIR, "u=rwxs,g=,o=", Lowest),
            entry(MASTER_DIR, "u=wxs,g=x,o=", LowestUserWorkerGroup),
            entry(BACKENDS_DIR, "u=rwxs,g=x,o=x", Lowest),
            entry(VAR_DIR, "u=wxs,g=,o=", Lowest),
        ],
        Privilege::NonElevated => [
            entry(WEBSERVER_PRIVATE_DIR, "u=wxs,g=,o=", Unchanged),
            entry(INFO_DIR, "u=rwxs,g=,o=", Unchanged),
            entry(MASTER_DIR, "u=wxs,g=,o=", Unchanged),
            entry(BACKENDS_DIR, "u=rwxs,g=x,o=x", Unchanged),
            entry(VAR_DIR, "u=wxs,g=,o=", Unchanged),
        ],
    }
}

/// Applies ownership to a freshly created directory.
pub trait SetOwner {
    fn set_owner(&self, path: &Path, uid: u32, gid: u32) -> nix::Result<()>;
}

/// `chown(2)` on the real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOwner;

impl SetOwner for SystemOwner {
    fn set_owner(&self, path: &Path, uid: u32, gid: u32) -> nix::Result<()> {
        tree_fs::chown(path, uid, gid)
    }
}

/// Builds the temp tree according to [`matrix`].
pub struct Provisioner {
    lookup: Box<dyn IdentityLookup>,
    owner: Box<dyn SetOwner>,
    prober: Prober,
    elevated: bool,
}

impl Default for Provisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl Provisioner {
    /// System users, real `chown`, uncached probing, elevation from euid.
    pub fn new() -> Self {
        Self {
            lookup: Box::new(SystemUsers),
            owner: Box::new(SystemOwner),
            prober: Prober::uncached(),
            elevated: privilege::is_root(),
        }
    }

    pub fn with_lookup(mut self, lookup: impl IdentityLookup + 'static) -> Self {
        self.lookup = Box::new(lookup);
        self
    }

    pub fn with_owner(mut self, owner: impl SetOwner + 'static) -> Self {
        self.owner = Box::new(owner);
        self
    }

    pub fn with_prober(mut self, prober: Prober) -> Self {
        self.prober = prober;
        self
    }

    /// Override the elevation detected from the effective uid.
    pub fn elevated(mut self, elevated: bool) -> Self {
        self.elevated = elevated;
        self
    }

    pub fn privilege(&self, user_switching: bool) -> Privilege {
        if self.elevated {
            Privilege::Elevated { user_switching }
        } else {
            Privilege::NonElevated
        }
    }

    /// Create `temp_root` and its five subdirectories.
    ///
    /// Existing paths are left untouched, so running this again is safe.
    /// The first failing directory aborts the run; directories created
    /// before it are kept.
    pub fn provision(
        &self,
        temp_root: &Path,
        user_switching: bool,
        lowest_user: &str,
        worker: Identity,
    ) -> Result<(), ProvisionError> {
        let lowest = privilege::resolve_lowest(self.lookup.as_ref(), lowest_user);
        let privilege = self.privilege(user_switching);

        self.make_dir_tree(temp_root, constants::ROOT_DIR_MODE, None)?;
        for dir in matrix(privilege) {
            let owner = dir.owner.identity(lowest, worker);
            self.make_dir_tree(&temp_root.join(dir.name), dir.mode, owner)?;
        }

        info!(
            root = %temp_root.display(),
            %privilege,
            lowest = %lowest,
            worker = %worker,
            "provisioned instance temp root"
        );
        Ok(())
    }

    fn make_dir_tree(
        &self,
        path: &Path,
        symbolic_mode: &str,
        owner: Option<Identity>,
    ) -> Result<(), ProvisionError> {
        if self.prober.classify(path)? != FileType::Nonexistent {
            debug!(path = %path.display(), "already present, skipping");
            return Ok(());
        }

        let bits = mode::parse(symbolic_mode).map_err(|source| ProvisionError::InvalidMode {
            path: path.to_path_buf(),
            source,
        })?;
        let creation_failed = |source| ProvisionError::CreationFailed {
            path: path.to_path_buf(),
            source,
        };
        tree_fs::create_dir_all(path).map_err(creation_failed)?;
        tree_fs::set_permissions(path, bits).map_err(creation_failed)?;
        debug!(path = %path.display(), mode = symbolic_mode, "created directory");

        match owner {
            Some(Identity::Resolved { uid, gid }) => {
                self.owner
                    .set_owner(path, uid, gid)
                    .map_err(|source| ProvisionError::OwnershipChangeFailed {
                        path: path.to_path_buf(),
                        uid,
                        gid,
                        source,
                    })?;
                debug!(path = %path.display(), uid, gid, "changed owner");
            }
            Some(Identity::Unresolved) => {
                warn!(path = %path.display(), "owner could not be resolved, leaving ownership as is");
            }
            None => {}
        }
        Ok(())
    }
}

/// Provision with system defaults; see [`Provisioner::provision`].
pub fn provision(
    temp_root: &Path,
    user_switching: bool,
    lowest_user: &str,
    worker: Identity,
) -> Result<(), ProvisionError> {
    Provisioner::new().provision(temp_root, user_switching, lowest_user, worker)
}

/// Remove the whole tree under `temp_root`.
///
/// Owner read/write/execute is granted on every directory first so that
/// write-only directories can be emptied; failures in that step are only
/// logged. Symlinks inside the tree are removed, never followed. A missing
/// `temp_root` is success.
pub fn teardown(temp_root: &Path) -> Result<(), ProvisionError> {
    let failures = tree_fs::relax_tree(temp_root, constants::TEARDOWN_RELAX_BITS);
    if failures > 0 {
        debug!(
            root = %temp_root.display(),
            failures,
            "some permissions could not be relaxed"
        );
    }
    tree_fs::remove_tree(temp_root).map_err(|source| ProvisionError::DeletionFailed {
        path: temp_root.to_path_buf(),
        source,
    })?;
    info!(root = %temp_root.display(), "removed instance temp root");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use crate::core::probe::StatCache;
    use std::io;
    use std::rc::Rc;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    const LOWEST: Identity = Identity::Resolved {
        uid: 65534,
        gid: 65533,
    };
    const WORKER: Identity = Identity::Resolved { uid: 33, gid: 34 };

    struct FakeUsers(HashMap<&'static str, Identity>);

    impl IdentityLookup for FakeUsers {
        fn lookup(&self, name: &str) -> Option<Identity> {
            self.0.get(name).copied()
        }
    }

    fn users() -> FakeUsers {
        FakeUsers(HashMap::from([("nobody", LOWEST)]))
    }

    #[derive(Clone, Default)]
    struct RecordingOwner(Rc<RefCell<Vec<(String, u32, u32)>>>);

    impl SetOwner for RecordingOwner {
        fn set_owner(&self, path: &Path, uid: u32, gid: u32) -> nix::Result<()> {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            self.0.borrow_mut().push((name, uid, gid));
            Ok(())
        }
    }

    struct FailingOwner;

    impl SetOwner for FailingOwner {
        fn set_owner(&self, _path: &Path, _uid: u32, _gid: u32) -> nix::Result<()> {
            Err(nix::errno::Errno::EPERM)
        }
    }

    /// Reports every path as absent, like a provisioner that lost the race
    /// between its existence check and `mkdir`.
    struct AlwaysMissing;

    impl StatCache for AlwaysMissing {
        fn stat_with_throttle(&self, _path: &Path, _max: Duration) -> io::Result<fs::Metadata> {
            Err(io::Error::from(io::ErrorKind::NotFound))
        }
    }

    fn row(privilege: Privilege, name: &str) -> DirSpec {
        matrix(privilege)
            .into_iter()
            .find(|d| d.name == name)
            .unwrap()
    }

    #[test]
    fn test_matrix_covers_all_dirs_in_order() {
        for privilege in [
            Privilege::NonElevated,
            Privilege::Elevated {
                user_switching: true,
            },
            Privilege::Elevated {
                user_switching: false,
            },
        ] {
            let names: Vec<_> = matrix(privilege).iter().map(|d| d.name).collect();
            assert_eq!(
                names,
                ["webserver_private", "info", "master", "backends", "var"]
            );
        }
    }

    #[test]
    fn test_matrix_non_elevated_never_changes_owner() {
        assert!(matrix(Privilege::NonElevated)
            .iter()
            .all(|d| d.owner == Owner::Unchanged));
    }

    #[test]
    fn test_matrix_switching_off_rows() {
        let p = Privilege::Elevated {
            user_switching: false,
        };
        assert_eq!(row(p, "info"), entry("info", "u=rwxs,g=,o=", Owner::Lowest));
        assert_eq!(
            row(p, "master"),
            entry("master", "u=wxs,g=x,o=", Owner::LowestUserWorkerGroup)
        );
        assert_eq!(row(p, "var").owner, Owner::Lowest);
    }

    #[test]
    fn test_matrix_switching_on_rows() {
        let p = Privilege::Elevated {
            user_switching: true,
        };
        assert_eq!(row(p, "info").owner, Owner::Unchanged);
        assert_eq!(row(p, "master").owner, Owner::Worker);
        assert_eq!(row(p, "var").mode, "u=wxs,g=wx,o=wx");
    }

    #[test]
    fn test_webserver_private_never_group_or_world_accessible() {
        for privilege in [
            Privilege::NonElevated,
            Privilege::Elevated {
                user_switching: true,
            },
            Privilege::Elevated {
                user_switching: false,
            },
        ] {
            let bits = mode::parse(row(privilege, "webserver_private").mode).unwrap();
            assert_eq!(bits & 0o077, 0, "{}", privilege);
        }
    }

    #[test]
    fn test_backends_world_traversable_when_elevated() {
        for switching in [true, false] {
            let p = Privilege::Elevated {
                user_switching: switching,
            };
            let bits = mode::parse(row(p, "backends").mode).unwrap();
            assert_eq!(bits & 0o001, 0o001);
        }
    }

    #[test]
    fn test_all_modes_parse() {
        assert!(mode::parse(constants::ROOT_DIR_MODE).is_ok());
        for privilege in [
            Privilege::NonElevated,
            Privilege::Elevated {
                user_switching: true,
            },
            Privilege::Elevated {
                user_switching: false,
            },
        ] {
            for dir in matrix(privilege) {
                assert!(mode::parse(dir.mode).is_ok(), "{}", dir.mode);
            }
        }
    }

    #[test]
    fn test_owner_identity() {
        assert_eq!(Owner::Unchanged.identity(LOWEST, WORKER), None);
        assert_eq!(Owner::Worker.identity(LOWEST, WORKER), Some(WORKER));
        assert_eq!(Owner::Lowest.identity(LOWEST, WORKER), Some(LOWEST));
        assert_eq!(
            Owner::LowestUserWorkerGroup.identity(LOWEST, WORKER),
            Some(Identity::new(65534, 34))
        );
    }

    #[test]
    fn test_elevated_switching_off_chowns_per_table() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("instance");
        let recorder = RecordingOwner::default();
        let provisioner = Provisioner::new()
            .with_lookup(users())
            .with_owner(recorder.clone())
            .elevated(true);

        provisioner.provision(&root, false, "ghost", WORKER).unwrap();

        let calls = recorder.0.borrow().clone();
        assert_eq!(
            calls,
            vec![
                ("webserver_private".to_string(), 33, 34),
                ("info".to_string(), 65534, 65533),
                ("master".to_string(), 65534, 34),
                ("backends".to_string(), 65534, 65533),
                ("var".to_string(), 65534, 65533),
            ]
        );
        teardown(&root).unwrap();
    }

    #[test]
    fn test_elevated_switching_on_chowns_only_worker_dirs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("instance");
        let recorder = RecordingOwner::default();
        Provisioner::new()
            .with_lookup(users())
            .with_owner(recorder.clone())
            .elevated(true)
            .provision(&root, true, "nobody", WORKER)
            .unwrap();

        let names: Vec<_> = recorder.0.borrow().iter().map(|c| c.0.clone()).collect();
        assert_eq!(names, ["webserver_private", "master"]);
        teardown(&root).unwrap();
    }

    #[test]
    fn test_unresolved_lowest_skips_chown_but_creates() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("instance");
        let recorder = RecordingOwner::default();
        Provisioner::new()
            .with_lookup(FakeUsers(HashMap::new()))
            .with_owner(recorder.clone())
            .elevated(true)
            .provision(&root, false, "ghost", WORKER)
            .unwrap();

        let names: Vec<_> = recorder.0.borrow().iter().map(|c| c.0.clone()).collect();
        assert_eq!(names, ["webserver_private"]);
        for name in ["info", "master", "backends", "var"] {
            assert!(root.join(name).is_dir(), "{}", name);
        }
        teardown(&root).unwrap();
    }

    #[test]
    fn test_non_elevated_applies_modes_without_chown() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("instance");
        let recorder = RecordingOwner::default();
        Provisioner::new()
            .with_lookup(users())
            .with_owner(recorder.clone())
            .elevated(false)
            .provision(&root, true, "nobody", WORKER)
            .unwrap();

        assert!(recorder.0.borrow().is_empty());
        let perm = |name: &str| fs::metadata(root.join(name)).unwrap().permissions().mode() & 0o777;
        assert_eq!(perm("webserver_private"), 0o300);
        assert_eq!(perm("info"), 0o700);
        assert_eq!(perm("master"), 0o300);
        assert_eq!(perm("backends"), 0o711);
        assert_eq!(perm("var"), 0o300);
        assert_eq!(fs::metadata(&root).unwrap().permissions().mode() & 0o777, 0o311);
        teardown(&root).unwrap();
    }

    #[test]
    fn test_existing_directory_is_not_touched() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("instance");
        fs::create_dir_all(root.join("info")).unwrap();
        fs::set_permissions(root.join("info"), fs::Permissions::from_mode(0o755)).unwrap();

        Provisioner::new()
            .with_lookup(users())
            .elevated(false)
            .provision(&root, false, "nobody", WORKER)
            .unwrap();

        let mode = fs::metadata(root.join("info")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        teardown(&root).unwrap();
    }

    #[test]
    fn test_directory_created_by_another_provisioner_is_kept() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("instance");
        Provisioner::new()
            .with_lookup(users())
            .elevated(false)
            .provision(&root, false, "nobody", WORKER)
            .unwrap();
        fs::write(root.join("backends").join("pid"), b"1").unwrap();

        Provisioner::new()
            .with_lookup(users())
            .with_prober(Prober::cached(Arc::new(AlwaysMissing), Duration::from_secs(1)))
            .elevated(false)
            .provision(&root, false, "nobody", WORKER)
            .unwrap();

        assert_eq!(fs::read(root.join("backends").join("pid")).unwrap(), b"1");
        for expected in matrix(Privilege::NonElevated) {
            assert!(root.join(expected.name).is_dir(), "{}", expected.name);
        }
        teardown(&root).unwrap();
    }

    #[test]
    fn test_chown_failure_aborts() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("instance");
        let err = Provisioner::new()
            .with_lookup(users())
            .with_owner(FailingOwner)
            .elevated(true)
            .provision(&root, false, "nobody", WORKER)
            .unwrap_err();

        match err {
            ProvisionError::OwnershipChangeFailed { path, uid, gid, .. } => {
                assert_eq!(path, root.join("webserver_private"));
                assert_eq!((uid, gid), (33, 34));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(root.join("webserver_private").is_dir());
        assert!(!root.join("info").exists());
        teardown(&root).unwrap();
    }

    #[test]
    fn test_unstatable_root_is_a_probe_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();

        let err = Provisioner::new()
            .with_lookup(users())
            .elevated(false)
            .provision(&blocker.join("instance"), false, "nobody", WORKER)
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Probe(_)));
    }

    #[test]
    fn test_creation_failure_reports_path() {
        if privilege::is_root() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("instance");
        fs::create_dir(&root).unwrap();
        fs::set_permissions(&root, fs::Permissions::from_mode(0o500)).unwrap();

        let err = Provisioner::new()
            .with_lookup(users())
            .elevated(false)
            .provision(&root, false, "nobody", WORKER)
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::CreationFailed { ref path, .. } if *path == root.join("webserver_private")
        ));
        teardown(&root).unwrap();
    }

    #[test]
    fn test_teardown_missing_root_is_ok() {
        let dir = TempDir::new().unwrap();
        teardown(&dir.path().join("never")).unwrap();
    }
}
