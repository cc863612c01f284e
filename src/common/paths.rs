use std::fs;
use std::path::{Path, PathBuf};
use crate::common::error::Result;

/// On-disk layout under the data root.
///
/// ```text
/// <root>/users/           user documents
/// <root>/scooters/        scooter documents
/// <root>/chunks/<id>.txt  base64 spool of an in-progress upload
/// <root>/probes/<id>/     decoded probe image
/// <root>/galleries/<id>/  reference photos of nearby users
/// <root>/signup/<name>/   liveness check scratch
/// ```
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the top-level folders. Safe to call on every start.
    pub fn ensure(&self) -> Result<()> {
        for dir in [
            self.users_dir(),
            self.scooters_dir(),
            self.chunk_dir(),
            self.root.join("probes"),
            self.root.join("galleries"),
            self.root.join("signup"),
        ] {
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Per-scooter scaffolding created at provisioning time.
    pub fn ensure_scooter(&self, scooter_id: &str) -> Result<()> {
        fs::create_dir_all(self.probe_dir(scooter_id))?;
        fs::create_dir_all(self.gallery_dir(scooter_id))?;
        fs::create_dir_all(self.chunk_dir())?;
        let spool = self.spool_file(scooter_id);
        if !spool.exists() {
            fs::write(&spool, b"")?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn users_dir(&self) -> PathBuf {
        self.root.join("users")
    }

    pub fn scooters_dir(&self) -> PathBuf {
        self.root.join("scooters")
    }

    pub fn chunk_dir(&self) -> PathBuf {
        self.root.join("chunks")
    }

    pub fn spool_file(&self, scooter_id: &str) -> PathBuf {
        self.chunk_dir().join(format!("{}.txt", scooter_id))
    }

    pub fn probe_dir(&self, scooter_id: &str) -> PathBuf {
        self.root.join("probes").join(scooter_id)
    }

    pub fn probe_file(&self, scooter_id: &str) -> PathBuf {
        self.probe_dir(scooter_id).join("checkFace.jpg")
    }

    pub fn gallery_dir(&self, scooter_id: &str) -> PathBuf {
        self.root.join("galleries").join(scooter_id)
    }

    pub fn signup_dir(&self, username: &str) -> PathBuf {
        self.root.join("signup").join(username)
    }
}
