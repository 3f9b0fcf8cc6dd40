use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;

use super::traits::{
    AppKeyRecord, ClientRecord, CredentialStore, PrincipalRecord, PushKeyRecord,
    RefreshTokenRecord,
};

struct StoredUser {
    password: String,
    record: PrincipalRecord,
}

/// In-memory credential store backing the dev binary and the test suite.
/// Production deployments put the relational store behind the same trait.
#[derive(Default)]
pub struct MemoryCredentialStore {
    clients: RwLock<HashMap<String, ClientRecord>>,
    users: RwLock<HashMap<String, StoredUser>>,
    /// keyed by (service_id, user_id)
    service_users: RwLock<HashMap<(String, String), StoredUser>>,
    refresh_tokens: RwLock<Vec<RefreshTokenRecord>>,
    app_keys: RwLock<HashMap<String, AppKeyRecord>>,
    push_keys: RwLock<Vec<PushKeyRecord>>,
    fail_refresh_saves: RwLock<bool>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_client(&self, client: ClientRecord) {
        let mut clients = self.clients.write().await;
        clients.insert(client.client_id.clone(), client);
    }

    pub async fn add_user(&self, user_id: &str, password: &str, record: PrincipalRecord) {
        let mut users = self.users.write().await;
        users.insert(user_id.to_string(), StoredUser {
            password: password.to_string(),
            record,
        });
    }

    pub async fn add_service_user(
        &self,
        user_id: &str,
        service_id: &str,
        password: &str,
        record: PrincipalRecord,
    ) {
        let mut service_users = self.service_users.write().await;
        service_users.insert(
            (service_id.to_string(), user_id.to_string()),
            StoredUser {
                password: password.to_string(),
                record,
            },
        );
    }

    pub async fn add_app_key(&self, app_key: &str, record: AppKeyRecord) {
        let mut app_keys = self.app_keys.write().await;
        app_keys.insert(app_key.to_string(), record);
    }
}

/// Inspection and failure-injection helpers for the test suite.
#[cfg(test)]
impl MemoryCredentialStore {
    pub async fn set_user_status(&self, user_id: &str, status: &str) {
        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(user_id) {
            user.record.status = status.to_string();
        }
    }

    pub async fn set_service_user_status(&self, user_id: &str, service_id: &str, status: &str) {
        let mut service_users = self.service_users.write().await;
        if let Some(user) = service_users.get_mut(&(service_id.to_string(), user_id.to_string())) {
            user.record.status = status.to_string();
        }
    }

    /// All refresh-token associations written so far, oldest first.
    pub async fn refresh_token_records(&self) -> Vec<RefreshTokenRecord> {
        self.refresh_tokens.read().await.clone()
    }

    pub async fn push_key_records(&self) -> Vec<PushKeyRecord> {
        self.push_keys.read().await.clone()
    }

    /// Makes every subsequent refresh-token save report zero affected rows.
    pub async fn fail_refresh_token_saves(&self) {
        let mut flag = self.fail_refresh_saves.write().await;
        *flag = true;
    }
}

fn password_matches(stored: &str, presented: &str) -> bool {
    stored.as_bytes().ct_eq(presented.as_bytes()).into()
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_client(&self, client_id: &str) -> Result<Option<ClientRecord>> {
        let clients = self.clients.read().await;
        Ok(clients.get(client_id).cloned())
    }

    async fn find_user(&self, user_id: &str, password: &str) -> Result<Option<PrincipalRecord>> {
        let users = self.users.read().await;
        Ok(users
            .get(user_id)
            .filter(|user| password_matches(&user.password, password))
            .map(|user| user.record.clone()))
    }

    async fn find_service_user(
        &self,
        user_id: &str,
        service_id: &str,
        password: &str,
    ) -> Result<Option<PrincipalRecord>> {
        let service_users = self.service_users.read().await;
        Ok(service_users
            .get(&(service_id.to_string(), user_id.to_string()))
            .filter(|user| password_matches(&user.password, password))
            .map(|user| user.record.clone()))
    }

    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<PrincipalRecord>> {
        let users = self.users.read().await;
        Ok(users.get(user_id).map(|user| user.record.clone()))
    }

    async fn find_service_user_by_id(
        &self,
        user_id: &str,
        service_id: &str,
    ) -> Result<Option<PrincipalRecord>> {
        let service_users = self.service_users.read().await;
        Ok(service_users
            .get(&(service_id.to_string(), user_id.to_string()))
            .map(|user| user.record.clone()))
    }

    async fn save_refresh_token(&self, record: RefreshTokenRecord) -> Result<bool> {
        if *self.fail_refresh_saves.read().await {
            return Ok(false);
        }

        let mut refresh_tokens = self.refresh_tokens.write().await;
        refresh_tokens.push(record);
        Ok(true)
    }

    async fn find_app_key(&self, app_key: &str) -> Result<Option<AppKeyRecord>> {
        let app_keys = self.app_keys.read().await;
        Ok(app_keys.get(app_key).cloned())
    }

    async fn save_push_key(&self, record: PushKeyRecord) -> Result<()> {
        let mut push_keys = self.push_keys.write().await;
        push_keys.push(record);
        Ok(())
    }
}
