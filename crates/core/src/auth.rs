//! Auth capability surface consumed by the stores.
//!
//! Provider internals are out of scope; only the shape below is referenced.
//! The service instance is keyed on cloud *availability*, not on backend
//! mode: flipping the mode must never invalidate an authenticated session.

use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    Local,
    Cloud,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    pub is_anonymous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub access_token: String,
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

/// The frozen user identity every local-mode implementation runs as.
pub fn local_user() -> &'static AuthUser {
    static LOCAL_USER: OnceLock<AuthUser> = OnceLock::new();
    LOCAL_USER.get_or_init(|| AuthUser {
        id: "local".to_string(),
        email: None,
        is_anonymous: true,
        display_name: Some("Local User".to_string()),
    })
}

pub type AuthStateListener = Box<dyn Fn(Option<AuthUser>) + Send + Sync>;

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn initialize(&self) -> Result<()>;
    fn mode(&self) -> AuthMode;
    async fn current_user(&self) -> Result<Option<AuthUser>>;
    async fn is_authenticated(&self) -> bool;
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser>;
    async fn sign_out(&self) -> Result<()>;
    async fn reset_password(&self, email: &str) -> Result<()>;
    async fn session(&self) -> Result<Option<AuthSession>>;
    async fn refresh_session(&self) -> Result<Option<AuthSession>>;
    fn on_auth_state_change(&self, listener: AuthStateListener);
}

/// Local-mode auth: always signed in as [`local_user`].
#[derive(Debug, Default)]
pub struct LocalAuthService;

#[async_trait]
impl AuthService for LocalAuthService {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn mode(&self) -> AuthMode {
        AuthMode::Local
    }

    async fn current_user(&self) -> Result<Option<AuthUser>> {
        Ok(Some(local_user().clone()))
    }

    async fn is_authenticated(&self) -> bool {
        true
    }

    async fn sign_up(&self, _email: &str, _password: &str) -> Result<AuthUser> {
        Ok(local_user().clone())
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<AuthUser> {
        Ok(local_user().clone())
    }

    async fn sign_out(&self) -> Result<()> {
        Ok(())
    }

    async fn reset_password(&self, _email: &str) -> Result<()> {
        Ok(())
    }

    async fn session(&self) -> Result<Option<AuthSession>> {
        Ok(None)
    }

    async fn refresh_session(&self) -> Result<Option<AuthSession>> {
        Ok(None)
    }

    fn on_auth_state_change(&self, listener: AuthStateListener) {
        // Local identity never changes; report it once.
        listener(Some(local_user().clone()));
    }
}

type AuthFactory = Box<dyn Fn() -> Arc<dyn AuthService> + Send + Sync>;

/// Caches the active [`AuthService`], keyed on cloud availability.
///
/// `service(cloud_available)` rebuilds the instance only when availability
/// flipped since the last call; backend-mode changes go nowhere near this.
pub struct AuthRegistry {
    local_factory: AuthFactory,
    cloud_factory: AuthFactory,
    current: Mutex<Option<(bool, Arc<dyn AuthService>)>>,
}

impl AuthRegistry {
    pub fn new(local_factory: AuthFactory, cloud_factory: AuthFactory) -> Self {
        Self {
            local_factory,
            cloud_factory,
            current: Mutex::new(None),
        }
    }

    pub fn service(&self, cloud_available: bool) -> Arc<dyn AuthService> {
        let mut current = self.current.lock().expect("auth registry lock");
        match current.as_ref() {
            Some((cached_availability, service)) if *cached_availability == cloud_available => {
                Arc::clone(service)
            }
            _ => {
                let service = if cloud_available {
                    (self.cloud_factory)()
                } else {
                    (self.local_factory)()
                };
                *current = Some((cloud_available, Arc::clone(&service)));
                service
            }
        }
    }

    pub fn reset(&self) {
        *self.current.lock().expect("auth registry lock") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn local_user_is_frozen_shape() {
        let user = local_user();
        assert_eq!(user.id, "local");
        assert_eq!(user.email, None);
        assert!(user.is_anonymous);
        assert_eq!(user.display_name.as_deref(), Some("Local User"));
    }

    #[test]
    fn registry_rebuilds_only_on_availability_change() {
        static LOCAL_BUILDS: AtomicUsize = AtomicUsize::new(0);
        static CLOUD_BUILDS: AtomicUsize = AtomicUsize::new(0);

        let registry = AuthRegistry::new(
            Box::new(|| {
                LOCAL_BUILDS.fetch_add(1, Ordering::SeqCst);
                Arc::new(LocalAuthService) as Arc<dyn AuthService>
            }),
            Box::new(|| {
                CLOUD_BUILDS.fetch_add(1, Ordering::SeqCst);
                Arc::new(LocalAuthService) as Arc<dyn AuthService>
            }),
        );

        let a = registry.service(false);
        let b = registry.service(false);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(LOCAL_BUILDS.load(Ordering::SeqCst), 1);

        let _cloud = registry.service(true);
        assert_eq!(CLOUD_BUILDS.load(Ordering::SeqCst), 1);

        let _local_again = registry.service(false);
        assert_eq!(LOCAL_BUILDS.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn local_auth_is_always_authenticated() {
        let auth = LocalAuthService;
        assert!(auth.is_authenticated().await);
        let user = auth.current_user().await.unwrap().unwrap();
        assert_eq!(user.id, "local");
    }
}
