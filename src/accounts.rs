use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::AuthProvider;
use crate::error::{Result, TrackerError};
use crate::models::{Account, Role, UserRecord};
use crate::profile_cache::ProfileCache;
use crate::store::TrackerStore;

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    pub email: String,
    pub role: Option<Role>,
}

pub struct SignUp<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub role: Option<Role>,
}

/// Sign-up, sign-in and profile lookups on top of the auth provider, the
/// user records and the local profile cache.
pub struct AccountService {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn TrackerStore>,
    cache: ProfileCache,
}

impl AccountService {
    pub fn new(auth: Arc<dyn AuthProvider>, store: Arc<dyn TrackerStore>, cache: ProfileCache) -> Self {
        Self { auth, store, cache }
    }

    pub fn current_account(&self) -> Option<Account> {
        self.auth.current_account()
    }

    /// Creates the account, its user record and the cached profile entries.
    pub async fn sign_up(&self, form: SignUp<'_>) -> Result<(Account, Role)> {
        let role = match form.role {
            Some(role)
                if !form.name.trim().is_empty()
                    && !form.email.trim().is_empty()
                    && !form.password.is_empty() =>
            {
                role
            }
            _ => return Err(TrackerError::validation("Please fill in all fields")),
        };
        let name = form.name.trim();

        self.auth.sign_up(form.email, form.password).await?;
        let account = self.auth.set_display_name(name).await?;

        let record = UserRecord {
            uid: account.uid.clone(),
            name: name.to_string(),
            email: account.email.clone(),
            role,
            created_at: Utc::now(),
        };
        self.store.put_user(&record).await?;
        self.cache.store(role, name).await?;

        info!("Signed up {} as {}", account.uid, role);
        Ok((account, role))
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Account> {
        let account = self.auth.sign_in(email, password).await?;
        info!("Signed in {}", account.uid);
        Ok(account)
    }

    /// Signs out and forgets the cached role and name.
    pub async fn sign_out(&self) -> Result<()> {
        self.auth.sign_out().await?;
        self.cache.clear().await?;
        Ok(())
    }

    /// Name: cache, then the account's display name, then the user record.
    /// Role: cache, then the user record.
    pub async fn profile(&self) -> Result<Profile> {
        let account = self.auth.current_account().ok_or(TrackerError::Unauthenticated)?;

        let mut name = self
            .cache
            .name()
            .or_else(|| account.display_name.clone());
        let mut role = self.cache.role();

        if name.is_none() || role.is_none() {
            match self.store.get_user(&account.uid).await {
                Ok(Some(record)) => {
                    name = name.or(Some(record.name));
                    role = role.or(Some(record.role));
                }
                Ok(None) => {}
                Err(e) => warn!("Error loading profile for {}: {}", account.uid, e),
            }
        }

        Ok(Profile {
            name: name.unwrap_or_default(),
            email: account.email,
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::LocalAuth;
    use crate::store::MemoryStore;

    fn service(store: &MemoryStore, auth: Arc<LocalAuth>) -> AccountService {
        AccountService::new(auth, Arc::new(store.clone()), ProfileCache::in_memory())
    }

    fn form<'a>(role: Option<Role>) -> SignUp<'a> {
        SignUp {
            name: "Akosua",
            email: "akosua@ug.edu.gh",
            password: "pw",
            role,
        }
    }

    #[tokio::test]
    async fn test_sign_up_requires_role() {
        let store = MemoryStore::new();
        let accounts = service(&store, Arc::new(LocalAuth::new()));
        assert!(accounts.sign_up(form(None)).await.unwrap_err().is_validation());
        assert!(accounts.current_account().is_none());
    }

    #[tokio::test]
    async fn test_sign_up_writes_record_and_cache() {
        let store = MemoryStore::new();
        let accounts = service(&store, Arc::new(LocalAuth::new()));

        let (account, role) = accounts.sign_up(form(Some(Role::Driver))).await.unwrap();
        assert_eq!(role, Role::Driver);
        assert_eq!(account.display_name.as_deref(), Some("Akosua"));

        let record = store.get_user(&account.uid).await.unwrap().unwrap();
        assert_eq!(record.role, Role::Driver);

        let profile = accounts.profile().await.unwrap();
        assert_eq!(profile.name, "Akosua");
        assert_eq!(profile.role, Some(Role::Driver));
    }

    #[tokio::test]
    async fn test_profile_falls_back_to_user_record_after_sign_out() {
        let store = MemoryStore::new();
        let auth = Arc::new(LocalAuth::new());
        let accounts = service(&store, auth.clone());
        accounts.sign_up(form(Some(Role::User))).await.unwrap();

        accounts.sign_out().await.unwrap();
        assert!(matches!(
            accounts.profile().await,
            Err(TrackerError::Unauthenticated)
        ));

        accounts.sign_in("akosua@ug.edu.gh", "pw").await.unwrap();
        let profile = accounts.profile().await.unwrap();
        assert_eq!(profile.role, Some(Role::User));
        assert_eq!(profile.name, "Akosua");
        assert_eq!(profile.email, "akosua@ug.edu.gh");
    }
}
