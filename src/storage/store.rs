use crate::common::{Result, VisiRideError};
use crate::core::geo::Location;
use crate::storage::records::{ScooterRecord, UserRecord, STORAGE_VERSION};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Durable user and scooter documents.
///
/// Update methods return `Ok(false)` when the target record does not exist.
pub trait Store: Send + Sync {
    fn insert_user(&self, user: &UserRecord) -> Result<()>;
    fn get_user(&self, username: &str) -> Result<Option<UserRecord>>;
    fn list_users(&self) -> Result<Vec<UserRecord>>;
    fn update_user_location(&self, username: &str, location: Location) -> Result<bool>;
    fn set_session_start(&self, username: &str, session_start: i64) -> Result<bool>;

    fn insert_scooter(&self, scooter: &ScooterRecord) -> Result<()>;
    fn get_scooter(&self, scooter_id: &str) -> Result<Option<ScooterRecord>>;
    fn list_scooters(&self) -> Result<Vec<ScooterRecord>>;
    fn update_scooter_location(&self, scooter_id: &str, location: Location) -> Result<bool>;
    fn set_assignment(&self, scooter_id: &str, username: Option<&str>) -> Result<bool>;

    fn scooters_assigned_to(&self, username: &str) -> Result<Vec<ScooterRecord>> {
        Ok(self
            .list_scooters()?
            .into_iter()
            .filter(|s| s.assigned_to.as_deref() == Some(username))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Documents {
    users: BTreeMap<String, UserRecord>,
    scooters: BTreeMap<String, ScooterRecord>,
}

/// Process-local store, used by `--ephemeral` and tests.
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<Documents>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn insert_user(&self, user: &UserRecord) -> Result<()> {
        let mut docs = self.docs.lock();
        if docs.users.contains_key(&user.username) {
            return Err(VisiRideError::AlreadyExists(format!("user {}", user.username)));
        }
        docs.users.insert(user.username.clone(), user.clone());
        Ok(())
    }

    fn get_user(&self, username: &str) -> Result<Option<UserRecord>> {
        Ok(self.docs.lock().users.get(username).cloned())
    }

    fn list_users(&self) -> Result<Vec<UserRecord>> {
        Ok(self.docs.lock().users.values().cloned().collect())
    }

    fn update_user_location(&self, username: &str, location: Location) -> Result<bool> {
        Ok(match self.docs.lock().users.get_mut(username) {
            Some(user) => {
                user.location = location;
                true
            }
            None => false,
        })
    }

    fn set_session_start(&self, username: &str, session_start: i64) -> Result<bool> {
        Ok(match self.docs.lock().users.get_mut(username) {
            Some(user) => {
                user.session_start = session_start;
                true
            }
            None => false,
        })
    }

    fn insert_scooter(&self, scooter: &ScooterRecord) -> Result<()> {
        let mut docs = self.docs.lock();
        if docs.scooters.contains_key(&scooter.scooter_id) {
            return Err(VisiRideError::AlreadyExists(format!("scooter {}", scooter.scooter_id)));
        }
        docs.scooters.insert(scooter.scooter_id.clone(), scooter.clone());
        Ok(())
    }

    fn get_scooter(&self, scooter_id: &str) -> Result<Option<ScooterRecord>> {
        Ok(self.docs.lock().scooters.get(scooter_id).cloned())
    }

    fn list_scooters(&self) -> Result<Vec<ScooterRecord>> {
        Ok(self.docs.lock().scooters.values().cloned().collect())
    }

    fn update_scooter_location(&self, scooter_id: &str, location: Location) -> Result<bool> {
        Ok(match self.docs.lock().scooters.get_mut(scooter_id) {
            Some(scooter) => {
                scooter.location = location;
                true
            }
            None => false,
        })
    }

    fn set_assignment(&self, scooter_id: &str, username: Option<&str>) -> Result<bool> {
        Ok(match self.docs.lock().scooters.get_mut(scooter_id) {
            Some(scooter) => {
                scooter.assigned_to = username.map(str::to_string);
                true
            }
            None => false,
        })
    }
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// One bincode file per document under `users/` and `scooters/`.
pub struct FileStore {
    users_dir: PathBuf,
    scooters_dir: PathBuf,
    // Serialises read-modify-write cycles
    write_lock: Mutex<()>,
}

fn io_to_store_error(context: &str, e: std::io::Error) -> VisiRideError {
    match e.kind() {
        ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            VisiRideError::StorageUnavailable(format!("{}: {}", context, e))
        }
        _ => VisiRideError::Storage(format!("{}: {}", context, e)),
    }
}

impl FileStore {
    pub fn new_with_paths(users_dir: PathBuf, scooters_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&users_dir)?;
        fs::create_dir_all(&scooters_dir)?;

        Ok(Self {
            users_dir,
            scooters_dir,
            write_lock: Mutex::new(()),
        })
    }

    fn read_doc<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_to_store_error("Failed to read document", e)),
        };
        let doc = bincode::deserialize(&data)
            .map_err(|e| VisiRideError::Storage(format!("Failed to deserialize: {}", e)))?;
        Ok(Some(doc))
    }

    fn write_doc<T: Serialize>(path: &Path, doc: &T) -> Result<()> {
        let encoded = bincode::serialize(doc)
            .map_err(|e| VisiRideError::Storage(format!("Failed to serialize: {}", e)))?;

        // Write-then-rename so readers never observe a partial document
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, encoded).map_err(|e| io_to_store_error("Failed to write document", e))?;
        fs::rename(&tmp, path).map_err(|e| io_to_store_error("Failed to replace document", e))?;
        Ok(())
    }

    fn list_docs<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| io_to_store_error("Failed to list documents", e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map_or(false, |ext| ext == "bincode"))
            .collect();
        paths.sort();

        let mut docs = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(doc) = Self::read_doc(&path)? {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    fn user_file(&self, username: &str) -> PathBuf {
        self.users_dir.join(format!("{}.bincode", username))
    }

    fn scooter_file(&self, scooter_id: &str) -> PathBuf {
        self.scooters_dir.join(format!("{}.bincode", scooter_id))
    }

    fn load_user(&self, username: &str) -> Result<Option<UserRecord>> {
        let mut user: Option<UserRecord> = Self::read_doc(&self.user_file(username))?;
        if let Some(user) = user.as_mut() {
            // Handle version migration if needed
            if user.version < STORAGE_VERSION {
                user.version = STORAGE_VERSION;
            }
        }
        Ok(user)
    }

    fn modify_user(&self, username: &str, f: impl FnOnce(&mut UserRecord)) -> Result<bool> {
        let _guard = self.write_lock.lock();
        match self.load_user(username)? {
            Some(mut user) => {
                f(&mut user);
                Self::write_doc(&self.user_file(username), &user)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn modify_scooter(&self, scooter_id: &str, f: impl FnOnce(&mut ScooterRecord)) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let path = self.scooter_file(scooter_id);
        match Self::read_doc::<ScooterRecord>(&path)? {
            Some(mut scooter) => {
                f(&mut scooter);
                Self::write_doc(&path, &scooter)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Store for FileStore {
    fn insert_user(&self, user: &UserRecord) -> Result<()> {
        let _guard = self.write_lock.lock();
        let path = self.user_file(&user.username);
        if path.exists() {
            return Err(VisiRideError::AlreadyExists(format!("user {}", user.username)));
        }
        Self::write_doc(&path, user)
    }

    fn get_user(&self, username: &str) -> Result<Option<UserRecord>> {
        self.load_user(username)
    }

    fn list_users(&self) -> Result<Vec<UserRecord>> {
        Self::list_docs(&self.users_dir)
    }

    fn update_user_location(&self, username: &str, location: Location) -> Result<bool> {
        self.modify_user(username, |user| user.location = location)
    }

    fn set_session_start(&self, username: &str, session_start: i64) -> Result<bool> {
        self.modify_user(username, |user| user.session_start = session_start)
    }

    fn insert_scooter(&self, scooter: &ScooterRecord) -> Result<()> {
        let _guard = self.write_lock.lock();
        let path = self.scooter_file(&scooter.scooter_id);
        if path.exists() {
            return Err(VisiRideError::AlreadyExists(format!("scooter {}", scooter.scooter_id)));
        }
        Self::write_doc(&path, scooter)
    }

    fn get_scooter(&self, scooter_id: &str) -> Result<Option<ScooterRecord>> {
        Self::read_doc(&self.scooter_file(scooter_id))
    }

    fn list_scooters(&self) -> Result<Vec<ScooterRecord>> {
        Self::list_docs(&self.scooters_dir)
    }

    fn update_scooter_location(&self, scooter_id: &str, location: Location) -> Result<bool> {
        self.modify_scooter(scooter_id, |scooter| scooter.location = location)
    }

    fn set_assignment(&self, scooter_id: &str, username: Option<&str>) -> Result<bool> {
        let username = username.map(str::to_string);
        self.modify_scooter(scooter_id, |scooter| scooter.assigned_to = username)
    }
}
