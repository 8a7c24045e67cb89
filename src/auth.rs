//! Authentication provider seam.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::{Result, TrackerError};
use crate::models::Account;

pub trait AuthProvider: Send + Sync {
    fn sign_in<'a>(&'a self, email: &'a str, password: &'a str) -> BoxFuture<'a, Result<Account>>;

    /// Creates the account and signs it in.
    fn sign_up<'a>(&'a self, email: &'a str, password: &'a str) -> BoxFuture<'a, Result<Account>>;

    fn set_display_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Account>>;

    fn sign_out(&self) -> BoxFuture<'_, Result<()>>;

    fn current_account(&self) -> Option<Account>;

    /// Yields the signed-in account, or `None`, on every auth state change.
    fn subscribe(&self) -> watch::Receiver<Option<Account>>;
}

struct Credentials {
    account: Account,
    password: String,
}

/// Process-local auth provider for tests and offline demos. Accounts live
/// only as long as the provider.
pub struct LocalAuth {
    accounts: Mutex<HashMap<String, Credentials>>,
    state: watch::Sender<Option<Account>>,
}

impl Default for LocalAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalAuth {
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self {
            accounts: Mutex::new(HashMap::new()),
            state,
        }
    }

    /// Starts out signed in as an identity vouched for by the caller, such
    /// as the operator console's `--driver` account id. The account cannot
    /// sign in again after signing out.
    pub fn signed_in(account: Account) -> Self {
        let auth = Self::new();
        auth.set_current(Some(account));
        auth
    }

    fn set_current(&self, account: Option<Account>) {
        self.state.send_replace(account);
    }
}

fn require_credentials(email: &str, password: &str) -> Result<()> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(TrackerError::validation("Please enter both email and password."));
    }
    Ok(())
}

impl AuthProvider for LocalAuth {
    fn sign_in<'a>(&'a self, email: &'a str, password: &'a str) -> BoxFuture<'a, Result<Account>> {
        async move {
            require_credentials(email, password)?;
            let account = {
                let accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
                match accounts.get(email.trim()) {
                    Some(c) if c.password == password => c.account.clone(),
                    _ => {
                        return Err(TrackerError::Permission(
                            "invalid email or password".to_string(),
                        ))
                    }
                }
            };
            self.set_current(Some(account.clone()));
            Ok(account)
        }
        .boxed()
    }

    fn sign_up<'a>(&'a self, email: &'a str, password: &'a str) -> BoxFuture<'a, Result<Account>> {
        async move {
            require_credentials(email, password)?;
            let email = email.trim();
            let account = {
                let mut accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
                if accounts.contains_key(email) {
                    return Err(TrackerError::validation("That email is already in use."));
                }
                let account = Account {
                    uid: Uuid::new_v4().to_string(),
                    email: email.to_string(),
                    display_name: None,
                };
                accounts.insert(
                    email.to_string(),
                    Credentials {
                        account: account.clone(),
                        password: password.to_string(),
                    },
                );
                account
            };
            self.set_current(Some(account.clone()));
            Ok(account)
        }
        .boxed()
    }

    fn set_display_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Account>> {
        async move {
            let mut current = self.current_account().ok_or(TrackerError::Unauthenticated)?;
            current.display_name = Some(name.to_string());
            {
                let mut accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(c) = accounts.get_mut(&current.email) {
                    c.account = current.clone();
                }
            }
            self.set_current(Some(current.clone()));
            Ok(current)
        }
        .boxed()
    }

    fn sign_out(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            self.set_current(None);
            Ok(())
        }
        .boxed()
    }

    fn current_account(&self) -> Option<Account> {
        self.state.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Account>> {
        self.state.subscribe()
    }
}
