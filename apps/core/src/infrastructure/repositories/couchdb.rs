// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! CouchDB Document Store
//!
//! Talks to CouchDB over its HTTP API. Each instance/doctype pair lives in
//! its own database named `<instance>/<doctype>` (dots and other characters
//! CouchDB rejects are replaced by `-`). Databases are created lazily on the
//! first write.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::domain::repository::{Document, DocumentStore, RepositoryError};

pub struct CouchDocumentStore {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    rev: String,
}

#[derive(Debug, Deserialize)]
struct AllDocsResponse {
    rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
struct AllDocsRow {
    id: String,
    #[serde(default)]
    doc: Option<serde_json::Value>,
}

impl CouchDocumentStore {
    pub fn new(base_url: &str) -> Result<Self, RepositoryError> {
        let base_url = Url::parse(base_url).map_err(|e| RepositoryError::Database(format!("invalid CouchDB URL: {}", e)))?;
        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// CouchDB database name of an instance/doctype pair
    pub fn db_name(db: &str, doc_type: &str) -> String {
        format!("{}/{}", db, doc_type)
            .to_lowercase()
            .chars()
            .map(|c| match c {
                'a'..='z' | '0'..='9' | '_' | '$' | '(' | ')' | '+' | '-' | '/' => c,
                _ => '-',
            })
            .collect()
    }

    fn url(&self, db: &str, doc_type: &str, id: Option<&str>) -> Result<Url, RepositoryError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| RepositoryError::Database("CouchDB URL cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.push(&Self::db_name(db, doc_type));
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn create_db(&self, db: &str, doc_type: &str) -> Result<(), RepositoryError> {
        let url = self.url(db, doc_type, None)?;
        let res = self.client.put(url).send().await?;
        match res.status() {
            s if s.is_success() || s == StatusCode::PRECONDITION_FAILED => {
                debug!("Created database {}", Self::db_name(db, doc_type));
                Ok(())
            }
            s => Err(RepositoryError::Database(format!("cannot create database: {}", s))),
        }
    }

    async fn put_doc(&self, db: &str, doc: &dyn Document) -> Result<reqwest::Response, RepositoryError> {
        let url = self.url(db, doc.doc_type(), Some(doc.id()))?;
        let mut body = doc.to_json()?;
        if let Some(obj) = body.as_object_mut() {
            obj.remove("_id");
            match doc.rev() {
                Some(rev) => {
                    obj.insert("_rev".to_string(), serde_json::Value::String(rev.to_string()));
                }
                None => {
                    obj.remove("_rev");
                }
            }
        }
        Ok(self.client.put(url).json(&body).send().await?)
    }

    async fn write_result(res: reqwest::Response, id: &str) -> Result<String, RepositoryError> {
        match res.status() {
            s if s.is_success() => {
                let body: WriteResponse = res.json().await?;
                Ok(body.rev)
            }
            StatusCode::CONFLICT => Err(RepositoryError::Conflict(id.to_string())),
            StatusCode::NOT_FOUND => Err(RepositoryError::NotFound(id.to_string())),
            s => Err(RepositoryError::Database(format!("{} on {}", s, id))),
        }
    }
}

#[async_trait]
impl DocumentStore for CouchDocumentStore {
    async fn create_named_doc(&self, db: &str, doc: &mut dyn Document) -> Result<(), RepositoryError> {
        let mut res = self.put_doc(db, doc).await?;
        if res.status() == StatusCode::NOT_FOUND {
            self.create_db(db, doc.doc_type()).await?;
            res = self.put_doc(db, doc).await?;
        }
        let rev = Self::write_result(res, doc.id()).await?;
        doc.set_rev(rev);
        Ok(())
    }

    async fn update_doc(&self, db: &str, doc: &mut dyn Document) -> Result<(), RepositoryError> {
        if doc.rev().is_none() {
            return Err(RepositoryError::Conflict(format!("{} has no revision", doc.id())));
        }
        let res = self.put_doc(db, doc).await?;
        let rev = Self::write_result(res, doc.id()).await?;
        doc.set_rev(rev);
        Ok(())
    }

    async fn delete_doc(&self, db: &str, doc: &dyn Document) -> Result<(), RepositoryError> {
        let url = self.url(db, doc.doc_type(), Some(doc.id()))?;
        let rev = doc.rev().unwrap_or_default();
        let res = self.client.delete(url).query(&[("rev", rev)]).send().await?;
        Self::write_result(res, doc.id()).await.map(|_| ())
    }

    async fn get_doc(&self, db: &str, doc_type: &str, id: &str) -> Result<serde_json::Value, RepositoryError> {
        let url = self.url(db, doc_type, Some(id))?;
        let res = self.client.get(url).send().await?;
        match res.status() {
            s if s.is_success() => Ok(res.json().await?),
            StatusCode::NOT_FOUND => Err(RepositoryError::NotFound(id.to_string())),
            s => Err(RepositoryError::Database(format!("{} on {}", s, id))),
        }
    }

    async fn all_docs(&self, db: &str, doc_type: &str) -> Result<Vec<serde_json::Value>, RepositoryError> {
        let url = self.url(db, doc_type, Some("_all_docs"))?;
        let res = self.client.get(url).query(&[("include_docs", "true")]).send().await?;
        match res.status() {
            s if s.is_success() => {
                let body: AllDocsResponse = res.json().await?;
                Ok(body
                    .rows
                    .into_iter()
                    .filter(|row| !row.id.starts_with("_design"))
                    .filter_map(|row| row.doc)
                    .collect())
            }
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            s => Err(RepositoryError::Database(format!("{} listing {}", s, doc_type))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_name() {
        assert_eq!(
            CouchDocumentStore::db_name("alice.cozy.example:8080", "io.cozy.apps"),
            "alice-cozy-example-8080/io-cozy-apps"
        );
    }

    #[test]
    fn test_url_escapes_slashes() {
        let store = CouchDocumentStore::new("http://localhost:5984/").unwrap();
        let url = store.url("alice", "io.cozy.apps", Some("io.cozy.apps/mini")).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5984/alice%2Fio-cozy-apps/io.cozy.apps%2Fmini"
        );
    }

    #[tokio::test]
    async fn test_get_doc_maps_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/alice%2Fio-cozy-apps/io.cozy.apps%2Fmini")
            .with_status(404)
            .with_body(r#"{"error":"not_found"}"#)
            .create_async()
            .await;

        let store = CouchDocumentStore::new(&server.url()).unwrap();
        let result = store.get_doc("alice", "io.cozy.apps", "io.cozy.apps/mini").await;
        assert!(matches!(result, Err(RepositoryError::NotFound(_))));
    }
}
