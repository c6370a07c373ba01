use async_trait::async_trait;
use serde_json::Map;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use super::{AdminRecord, AdminStore, NewAdmin, StorageError};
use crate::clients::firestore::{
    Document, FirestoreAuth, FirestoreClient, string_value, timestamp_value,
};
use crate::clients::google_oauth::{AccessTokenProvider, ServiceAccountKey};
use crate::config::{Config, StorageBackend};

pub struct FirestoreAdminStore {
    client: FirestoreClient,
    collection: String,
}

impl FirestoreAdminStore {
    #[must_use]
    pub fn new(client: FirestoreClient, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }

    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let storage = &config.storage;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.identity.request_timeout_seconds))
            .user_agent("academy-admin/1.0")
            .build()?;

        let client = if let Some(host) = &storage.firestore_emulator_host {
            tracing::info!(host = %host, "Using Firestore emulator");
            FirestoreClient::new(
                http,
                &format!("http://{host}"),
                &config.identity.project_id,
                FirestoreAuth::Emulator,
            )
        } else {
            let path = storage.service_account_path.as_deref().ok_or_else(|| {
                anyhow::anyhow!("storage.service_account_path is required for Firestore")
            })?;
            let key = ServiceAccountKey::from_file(Path::new(path))?;
            let project_id = key.project_id.clone();
            let provider = AccessTokenProvider::new(key, http.clone())?;
            // Fail at startup rather than on the first login.
            provider.access_token().await?;
            tracing::info!(project_id = %project_id, "Initialized Firebase Firestore");
            FirestoreClient::new(
                http,
                &storage.firestore_base_url,
                &project_id,
                FirestoreAuth::ServiceAccount(provider),
            )
        };

        Ok(Self::new(client, storage.admins_collection.clone()))
    }

    fn to_record(doc: &Document) -> Result<AdminRecord, StorageError> {
        let username = doc
            .string_field("username")
            .ok_or_else(|| StorageError::Malformed(format!("{} has no username", doc.id())))?;

        Ok(AdminRecord {
            id: doc.id().to_string(),
            username,
            email: doc.string_field("email"),
            password_hash: doc.string_field("password_hash"),
            created_at: doc
                .timestamp_field("created_at")
                .or_else(|| doc.create_time.clone())
                .unwrap_or_default(),
        })
    }

    async fn find_unique(
        &self,
        field: &str,
        value: &str,
    ) -> Result<Option<AdminRecord>, StorageError> {
        let docs = self.client.query_eq(&self.collection, field, value, 2).await?;

        match docs.as_slice() {
            [] => Ok(None),
            [doc] => Self::to_record(doc).map(Some),
            _ => {
                warn!(field, "Several admin records share one key; refusing to pick one");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl AdminStore for FirestoreAdminStore {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Firestore
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.client.list(&self.collection, Some(1)).await?;
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<AdminRecord>, StorageError> {
        self.find_unique("email", email).await
    }

    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AdminRecord>, StorageError> {
        self.find_unique("username", username).await
    }

    async fn is_empty(&self) -> Result<bool, StorageError> {
        let docs = self.client.list(&self.collection, Some(1)).await?;
        Ok(docs.is_empty())
    }

    async fn list(&self) -> Result<Vec<AdminRecord>, StorageError> {
        let docs = self.client.list(&self.collection, None).await?;
        docs.iter().map(Self::to_record).collect()
    }

    async fn insert(&self, admin: NewAdmin) -> Result<AdminRecord, StorageError> {
        if !self
            .client
            .query_eq(&self.collection, "username", &admin.username, 1)
            .await?
            .is_empty()
        {
            return Err(StorageError::Conflict(admin.username));
        }
        if let Some(email) = &admin.email
            && !self
                .client
                .query_eq(&self.collection, "email", email, 1)
                .await?
                .is_empty()
        {
            return Err(StorageError::Conflict(email.clone()));
        }

        let now = chrono::Utc::now().to_rfc3339();
        let mut fields = Map::new();
        fields.insert("username".to_string(), string_value(Some(&admin.username)));
        fields.insert("email".to_string(), string_value(admin.email.as_deref()));
        fields.insert(
            "password_hash".to_string(),
            string_value(admin.password_hash.as_deref()),
        );
        fields.insert("created_at".to_string(), timestamp_value(&now));

        let doc = self.client.create(&self.collection, fields).await?;
        Self::to_record(&doc)
    }

    async fn update_password_hash(
        &self,
        id: &str,
        password_hash: &str,
    ) -> Result<(), StorageError> {
        let mut fields = Map::new();
        fields.insert("password_hash".to_string(), string_value(Some(password_hash)));
        self.client.patch(&self.collection, id, fields).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOCS: &str = "/v1/projects/academy-test/databases/(default)/documents";

    fn store_for(server: &MockServer) -> FirestoreAdminStore {
        let client = FirestoreClient::new(
            reqwest::Client::new(),
            &server.uri(),
            "academy-test",
            FirestoreAuth::Emulator,
        );
        FirestoreAdminStore::new(client, "admins")
    }

    fn admin_doc(id: &str, username: &str, email: &str) -> serde_json::Value {
        json!({
            "document": {
                "name": format!("projects/academy-test/databases/(default)/documents/admins/{id}"),
                "fields": {
                    "username": { "stringValue": username },
                    "email": { "stringValue": email },
                    "password_hash": { "stringValue": "$argon2id$stub" }
                },
                "createTime": "2024-05-01T10:00:00Z"
            },
            "readTime": "2024-05-01T10:00:01Z"
        })
    }

    #[tokio::test]
    async fn finds_single_admin_by_email() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{DOCS}:runQuery")))
            .and(body_partial_json(json!({
                "structuredQuery": { "where": { "fieldFilter": {
                    "field": { "fieldPath": "email" },
                    "value": { "stringValue": "alice@academy.test" }
                }}}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([admin_doc("doc1", "alice", "alice@academy.test")])),
            )
            .mount(&server)
            .await;

        let admin = store_for(&server)
            .find_by_email("alice@academy.test")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(admin.id, "doc1");
        assert_eq!(admin.username, "alice");
        assert_eq!(admin.created_at, "2024-05-01T10:00:00Z");
    }

    #[tokio::test]
    async fn empty_result_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{DOCS}:runQuery")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{ "readTime": "2024-05-01T10:00:01Z" }])),
            )
            .mount(&server)
            .await;

        assert!(
            store_for(&server)
                .find_by_username("ghost")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn ambiguous_match_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{DOCS}:runQuery")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                admin_doc("doc1", "alice", "shared@academy.test"),
                admin_doc("doc2", "bob", "shared@academy.test")
            ])))
            .mount(&server)
            .await;

        assert!(
            store_for(&server)
                .find_by_email("shared@academy.test")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn is_empty_reads_at_most_one_document() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{DOCS}:runQuery")))
            .and(body_partial_json(json!({ "structuredQuery": { "limit": 1 } })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([admin_doc("doc1", "alice", "alice@academy.test")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        assert!(!store_for(&server).is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn copy_admins_moves_hashes_and_skips_existing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{DOCS}:runQuery")))
            .and(body_partial_json(json!({
                "structuredQuery": { "where": { "fieldFilter": {
                    "field": { "fieldPath": "username" },
                    "value": { "stringValue": "bob" }
                }}}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([admin_doc("doc9", "bob", "bob@academy.test")])),
            )
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{DOCS}:runQuery")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{ "readTime": "2024-05-01T10:00:01Z" }])),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{DOCS}/admins")))
            .and(body_partial_json(json!({ "fields": {
                "username": { "stringValue": "alice" },
                "password_hash": { "stringValue": "$argon2id$alice" }
            }})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(
                    admin_doc("doc1", "alice", "alice@academy.test")["document"].clone(),
                ),
            )
            .expect(1)
            .mount(&server)
            .await;

        let source = crate::storage::SqliteAdminStore::new(
            crate::db::Store::new("sqlite::memory:").await.unwrap(),
        );
        for (username, hash) in [("alice", "$argon2id$alice"), ("bob", "$argon2id$bob")] {
            source
                .insert(NewAdmin {
                    username: username.to_string(),
                    email: Some(format!("{username}@academy.test")),
                    password_hash: Some(hash.to_string()),
                })
                .await
                .unwrap();
        }

        let report = crate::storage::copy_admins(&source, &store_for(&server))
            .await
            .unwrap();

        assert_eq!(report.copied, vec!["alice".to_string()]);
        assert_eq!(report.skipped, vec!["bob".to_string()]);
    }

    #[tokio::test]
    async fn server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{DOCS}:runQuery")))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = store_for(&server)
            .find_by_email("alice@academy.test")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
    }

    #[tokio::test]
    async fn update_password_hash_patches_single_field() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(format!("{DOCS}/admins/doc1")))
            .and(query_param("updateMask.fieldPaths", "password_hash"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/academy-test/databases/(default)/documents/admins/doc1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        store_for(&server)
            .update_password_hash("doc1", "$argon2id$new")
            .await
            .unwrap();
    }
}
