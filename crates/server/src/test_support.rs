use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use config::DATABASE_URL_ENV;
use utils_core::assets::ASSET_DIR_ENV;
use uuid::Uuid;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Scratch asset dir and file-backed database for one router test.
///
/// Holding it keeps other env-mutating tests out; dropping it restores the
/// previous variables and removes the scratch dir.
pub struct TestEnv {
    _lock: MutexGuard<'static, ()>,
    root: PathBuf,
    saved: Vec<(&'static str, Option<OsString>)>,
}

impl TestEnv {
    pub fn new() -> Self {
        let lock = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let root = std::env::temp_dir().join(format!("tiles-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&root).unwrap();

        let db_url = format!("sqlite://{}?mode=rwc", root.join("db.sqlite").display());
        let vars: [(&'static str, OsString); 2] = [
            (ASSET_DIR_ENV, root.clone().into_os_string()),
            (DATABASE_URL_ENV, db_url.into()),
        ];
        let saved = vars
            .iter()
            .map(|(key, _)| (*key, std::env::var_os(key)))
            .collect();

        // SAFETY: every test that touches these variables holds ENV_LOCK.
        unsafe {
            for (key, value) in &vars {
                std::env::set_var(key, value);
            }
        }

        Self {
            _lock: lock,
            root,
            saved,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        // SAFETY: ENV_LOCK is still held by this guard.
        unsafe {
            for (key, value) in &self.saved {
                match value {
                    Some(value) => std::env::set_var(key, value),
                    None => std::env::remove_var(key),
                }
            }
        }
        let _ = std::fs::remove_dir_all(&self.root);
    }
}
