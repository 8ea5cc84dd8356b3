//! Test fixtures and backend helpers.
//!
//! Provides ready-made profile snapshots and temporary storage for tests.

use pushprofile_protocol::{Email, Gender, Installation, Phone, User, UserAttributes, UserIdentity};
use pushprofile_storage::{FileBackend, InMemoryBackend, PersistenceBackend};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A persistence backend with automatic cleanup.
pub struct TestBackend {
    /// The backend, shareable with the code under test.
    pub backend: Arc<dyn PersistenceBackend>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestBackend {
    /// Creates an in-memory backend.
    pub fn memory() -> Self {
        Self {
            backend: Arc::new(InMemoryBackend::new()),
            temp_dir: None,
        }
    }

    /// Creates a file backend inside a fresh temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let backend = FileBackend::open(temp_dir.path()).expect("Failed to open file backend");
        Self {
            backend: Arc::new(backend),
            temp_dir: Some(temp_dir),
        }
    }

    /// Opens a second backend over the same directory, as a restarted
    /// process would. In-memory backends return the same instance.
    pub fn reopen(&self) -> Arc<dyn PersistenceBackend> {
        match &self.temp_dir {
            Some(dir) => Arc::new(FileBackend::open(dir.path()).expect("Failed to reopen file backend")),
            None => Arc::clone(&self.backend),
        }
    }

    /// Returns the directory if file-based.
    pub fn path(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(|d| d.path())
    }

    /// Returns a new handle to the backend.
    pub fn shared(&self) -> Arc<dyn PersistenceBackend> {
        Arc::clone(&self.backend)
    }
}

/// An installation with `push_registration_id` and the given primary flag.
pub fn installation(push_registration_id: &str, primary: bool) -> Installation {
    Installation {
        is_primary_device: primary,
        ..Installation::with_registration(push_registration_id)
    }
}

/// A registered installation with device metadata filled in.
pub fn device(push_registration_id: &str) -> Installation {
    Installation {
        push_service_token: Some(format!("token-{push_registration_id}")),
        push_service_type: Some("GCM".into()),
        sdk_version: Some("1.0.0".into()),
        app_version: Some("2.3.4".into()),
        os: Some("Android".into()),
        os_version: Some("14".into()),
        device_manufacturer: Some("Acme".into()),
        device_model: Some("Phone 1".into()),
        language: Some("en".into()),
        device_timezone_id: Some("Europe/Zagreb".into()),
        ..Installation::with_registration(push_registration_id)
    }
}

/// A user with contact data and a list of installations.
pub fn user_with_installations(installations: Vec<Installation>) -> User {
    User {
        external_user_id: Some("luke".into()),
        first_name: Some("Luke".into()),
        last_name: Some("Skywalker".into()),
        gender: Some(Gender::Male),
        phones: Some(vec![Phone::new("385911234567")]),
        emails: Some(vec![Email::new("luke@tatooine.org")]),
        installations: Some(installations),
        ..User::default()
    }
}

/// The identity [`user_with_installations`] is personalized with.
pub fn luke_identity() -> UserIdentity {
    UserIdentity::new(
        Some(vec!["385911234567".into()]),
        Some(vec!["luke@tatooine.org".into()]),
        Some("luke".into()),
    )
    .expect("identity has components")
}

/// Attributes matching [`user_with_installations`].
pub fn luke_attributes() -> UserAttributes {
    UserAttributes {
        first_name: Some("Luke".into()),
        last_name: Some("Skywalker".into()),
        gender: Some(Gender::Male),
        ..UserAttributes::default()
    }
}
