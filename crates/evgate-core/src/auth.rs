//! Platform and vehicle authentication.
//!
//! Credential data is read-only after construction, so the service is shared
//! freely across connection tasks without locking.

use crate::config::Credential;
use crate::error::{Error, Result};
use std::collections::HashMap;

/// In-memory credential store for platform logins.
pub struct AuthService {
    platform_users: HashMap<String, String>,
}

impl AuthService {
    /// Build from configured credentials. The built-in `admin`/`admin` pair
    /// is always present; configured entries may override it.
    pub fn new(users: &[Credential]) -> Self {
        let mut platform_users = HashMap::with_capacity(users.len() + 1);
        platform_users.insert("admin".to_string(), "admin".to_string());
        for u in users {
            platform_users.insert(u.username.clone(), u.password.clone());
        }
        Self { platform_users }
    }

    /// Validate a platform login (command 0x05).
    pub fn platform_login(&self, username: &str, password: &str) -> Result<()> {
        match self.platform_users.get(username) {
            Some(expected) if expected == password => Ok(()),
            _ => Err(Error::AuthRejected),
        }
    }

    /// Validate a vehicle login (command 0x01).
    ///
    /// Currently permissive: the ICCID is decoded and logged upstream but no
    /// terminal-provisioning store exists to check it against.
    pub fn vehicle_login(&self, _vin: &str, _iccid: &str) -> Result<()> {
        Ok(())
    }
}
