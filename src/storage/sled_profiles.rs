//! Durable baseline profile store using the Sled embedded database.
//!
//! Key format: `profile:{tag_id}`. Each value is a JSON record carrying a
//! schema version; records written under another version read back as
//! missing so the tag falls back to window statistics until recalibrated.

use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::persistence::{ProfileStore, StoreError};
use crate::config::defaults::{PROFILE_KEY_PREFIX, PROFILE_SCHEMA_VERSION};
use crate::types::BaselineProfile;

#[derive(Serialize)]
struct ProfileRecordRef<'a> {
    schema_version: u32,
    profile: &'a BaselineProfile,
}

#[derive(Deserialize)]
struct VersionHeader {
    schema_version: u32,
}

#[derive(Deserialize)]
struct ProfileRecord {
    profile: BaselineProfile,
}

pub struct SledProfileStore {
    db: Db,
}

impl SledProfileStore {
    /// Open or create the profile database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref())?;
        info!(path = ?path.as_ref(), "Profile store opened");
        Ok(Self { db })
    }

    /// Open an in-memory database (for testing)
    pub fn open_temp() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    fn key(tag_id: &str) -> String {
        format!("{PROFILE_KEY_PREFIX}{tag_id}")
    }

    /// Tag ids with a stored record, in key order.
    pub fn tags(&self) -> Result<Vec<String>, StoreError> {
        let mut tags = Vec::new();
        for entry in self.db.scan_prefix(PROFILE_KEY_PREFIX.as_bytes()) {
            let (key, _) = entry?;
            if let Ok(key) = std::str::from_utf8(&key) {
                if let Some(tag) = key.strip_prefix(PROFILE_KEY_PREFIX) {
                    tags.push(tag.to_string());
                }
            }
        }
        Ok(tags)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

impl ProfileStore for SledProfileStore {
    fn get_profile(&self, tag_id: &str) -> Result<Option<Arc<BaselineProfile>>, StoreError> {
        let Some(bytes) = self.db.get(Self::key(tag_id))? else {
            return Ok(None);
        };

        let header: VersionHeader = serde_json::from_slice(&bytes)?;
        if header.schema_version != PROFILE_SCHEMA_VERSION {
            warn!(
                tag = %tag_id,
                stored = header.schema_version,
                expected = PROFILE_SCHEMA_VERSION,
                "Stored profile has a different schema version, recalibration required"
            );
            return Ok(None);
        }

        let record: ProfileRecord = serde_json::from_slice(&bytes)?;
        Ok(Some(Arc::new(record.profile)))
    }

    fn put_profile(&self, tag_id: &str, profile: &BaselineProfile) -> Result<(), StoreError> {
        let value = serde_json::to_vec(&ProfileRecordRef {
            schema_version: PROFILE_SCHEMA_VERSION,
            profile,
        })?;
        // Single-key insert: sled makes the replacement atomic
        self.db.insert(Self::key(tag_id).as_bytes(), value)?;
        debug!(tag = %tag_id, "Stored baseline profile");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "Sled"
    }
}
