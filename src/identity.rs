//! Identities as reported by the external identity provider.
//!
//! The store never authenticates anyone. [`IdentityHub`] is the seam the
//! presentation layer feeds with sign-in/sign-out results; the controller
//! subscribes to it with [`crate::engine::StoreController::follow`].

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Owner,
}

impl Role {
    /// Owner when the provider reports an admin claim, or when the signed-in
    /// email is the configured owner email (compared case-insensitively).
    pub fn resolve(admin_claim: bool, email: Option<&str>, owner_email: &str) -> Role {
        let email_matches = match email {
            Some(e) => !owner_email.is_empty() && e.trim().eq_ignore_ascii_case(owner_email.trim()),
            None => false,
        };
        if admin_claim || email_matches {
            Role::Owner
        } else {
            Role::Customer
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub role: Role,
}

impl Identity {
    pub fn customer(uid: impl Into<String>) -> Self {
        Self { uid: uid.into(), email: None, role: Role::Customer }
    }

    pub fn owner(uid: impl Into<String>) -> Self {
        Self { uid: uid.into(), email: None, role: Role::Owner }
    }

    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }
}

/// Publishes the current identity to every subscriber.
pub struct IdentityHub {
    tx: watch::Sender<Option<Identity>>,
    owner_email: String,
}

impl IdentityHub {
    pub fn new(owner_email: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx, owner_email: owner_email.into() }
    }

    pub fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }

    /// Records a successful sign-in and returns the resolved identity.
    pub fn sign_in(&self, uid: impl Into<String>, email: Option<String>, admin_claim: bool) -> Identity {
        let role = Role::resolve(admin_claim, email.as_deref(), &self.owner_email);
        let identity = Identity { uid: uid.into(), email, role };
        log::info!("Identity {} signed in as {:?}", identity.uid, identity.role);
        self.tx.send_replace(Some(identity.clone()));
        identity
    }

    pub fn sign_out(&self) {
        if let Some(previous) = self.tx.send_replace(None) {
            log::info!("Identity {} signed out", previous.uid);
        }
    }
}
