//! Minimal Firestore REST client.
//!
//! Only what the admin store needs: equality queries, listing, document
//! creation and field patches on a single collection.

use anyhow::{Context, Result, bail};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;
use url::Url;

use super::google_oauth::AccessTokenProvider;

pub enum FirestoreAuth {
    /// The emulator accepts the fixed `owner` token.
    Emulator,
    ServiceAccount(AccessTokenProvider),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// `projects/{p}/databases/(default)/documents/{collection}/{id}`
    pub name: String,

    #[serde(default)]
    pub fields: Map<String, Value>,

    #[serde(default)]
    pub create_time: Option<String>,
}

impl Document {
    #[must_use]
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Reads a string field; `null` and missing fields are `None`.
    #[must_use]
    pub fn string_field(&self, key: &str) -> Option<String> {
        self.fields
            .get(key)?
            .get("stringValue")?
            .as_str()
            .map(ToString::to_string)
    }

    /// Reads a timestamp field, falling back to a string field of the same name.
    #[must_use]
    pub fn timestamp_field(&self, key: &str) -> Option<String> {
        let value = self.fields.get(key)?;
        value
            .get("timestampValue")
            .or_else(|| value.get("stringValue"))?
            .as_str()
            .map(ToString::to_string)
    }
}

#[derive(Deserialize)]
struct RunQueryItem {
    #[serde(default)]
    document: Option<Document>,
}

/// Encodes a Rust value as a Firestore typed value.
#[must_use]
pub fn string_value(value: Option<&str>) -> Value {
    value.map_or_else(
        || json!({ "nullValue": null }),
        |v| json!({ "stringValue": v }),
    )
}

#[must_use]
pub fn timestamp_value(rfc3339: &str) -> Value {
    json!({ "timestampValue": rfc3339 })
}

pub struct FirestoreClient {
    http: Client,
    documents_url: String,
    auth: FirestoreAuth,
}

impl FirestoreClient {
    #[must_use]
    pub fn new(http: Client, base_url: &str, project_id: &str, auth: FirestoreAuth) -> Self {
        let documents_url = format!(
            "{}/v1/projects/{}/databases/(default)/documents",
            base_url.trim_end_matches('/'),
            project_id
        );

        Self {
            http,
            documents_url,
            auth,
        }
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = match &self.auth {
            FirestoreAuth::Emulator => "owner".to_string(),
            FirestoreAuth::ServiceAccount(provider) => provider.access_token().await?,
        };
        Ok(request.bearer_auth(token))
    }

    async fn run_query(&self, structured_query: Value) -> Result<Vec<Document>> {
        let url = format!("{}:runQuery", self.documents_url);
        let request = self
            .http
            .post(&url)
            .json(&json!({ "structuredQuery": structured_query }));

        let response = self
            .authorize(request)
            .await?
            .send()
            .await
            .context("Firestore unreachable")?;

        if !response.status().is_success() {
            bail!("Firestore runQuery returned {}", response.status());
        }

        let items: Vec<RunQueryItem> = response
            .json()
            .await
            .context("Failed to parse Firestore runQuery response")?;

        Ok(items.into_iter().filter_map(|item| item.document).collect())
    }

    /// Documents whose `field` equals `value`, at most `limit` of them.
    pub async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
        limit: u32,
    ) -> Result<Vec<Document>> {
        debug!(collection, field, "Firestore equality query");
        self.run_query(json!({
            "from": [{ "collectionId": collection }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": field },
                    "op": "EQUAL",
                    "value": { "stringValue": value }
                }
            },
            "limit": limit
        }))
        .await
    }

    pub async fn list(&self, collection: &str, limit: Option<u32>) -> Result<Vec<Document>> {
        let mut query = json!({ "from": [{ "collectionId": collection }] });
        if let Some(limit) = limit {
            query["limit"] = json!(limit);
        }
        self.run_query(query).await
    }

    pub async fn create(&self, collection: &str, fields: Map<String, Value>) -> Result<Document> {
        let url = format!("{}/{}", self.documents_url, collection);
        let request = self.http.post(&url).json(&json!({ "fields": fields }));

        let response = self
            .authorize(request)
            .await?
            .send()
            .await
            .context("Firestore unreachable")?;

        if !response.status().is_success() {
            bail!("Firestore create returned {}", response.status());
        }

        response
            .json()
            .await
            .context("Failed to parse created Firestore document")
    }

    /// Overwrites the given fields of an existing document, leaving the rest untouched.
    pub async fn patch(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<()> {
        let mut url = Url::parse(&format!("{}/{}/{}", self.documents_url, collection, id))
            .context("Invalid Firestore document URL")?;
        {
            let mut pairs = url.query_pairs_mut();
            for field in fields.keys() {
                pairs.append_pair("updateMask.fieldPaths", field);
            }
            pairs.append_pair("currentDocument.exists", "true");
        }

        let request = self
            .http
            .patch(url.as_str())
            .json(&json!({ "fields": fields }));

        let response = self
            .authorize(request)
            .await?
            .send()
            .await
            .context("Firestore unreachable")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            bail!("Firestore document {collection}/{id} not found");
        }
        if !response.status().is_success() {
            bail!("Firestore patch returned {}", response.status());
        }

        Ok(())
    }
}
