// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end installer runs against local git repositories, in-memory
//! stores and a mocked Swift endpoint.

use std::path::Path;
use std::sync::Arc;

use cozy_apps_core::application::{Installer, InstallerContext, InstallerOptions};
use cozy_apps_core::domain::app::{AppState, AppType, KONNECTOR_ARCHIVE_NAME};
use cozy_apps_core::domain::errors::AppError;
use cozy_apps_core::domain::manifest::{AppManifest, Manifest, ManifestContext};
use cozy_apps_core::domain::repository::{Document, DocumentStore};
use cozy_apps_core::domain::storage::Copier;
use cozy_apps_core::domain::trigger::Scheduler;
use cozy_apps_core::infrastructure::copier::{LocalCopier, MemCopier, SwiftCopier, WEBAPPS_CONTAINER};
use cozy_apps_core::infrastructure::fetcher::HttpClients;
use cozy_apps_core::infrastructure::permissions::DocumentPermissionStore;
use cozy_apps_core::infrastructure::registry_client::HttpVersionRegistry;
use cozy_apps_core::infrastructure::repositories::InMemoryDocumentStore;
use cozy_apps_core::infrastructure::scheduler::InMemoryScheduler;
use git2::{IndexAddOption, Repository, Signature};
use mockito::Matcher;
use tempfile::TempDir;
use url::Url;

const DOMAIN: &str = "alice.cozy.localhost";

struct Fixture {
    store: Arc<InMemoryDocumentStore>,
    scheduler: Arc<InMemoryScheduler>,
    context: InstallerContext,
}

fn fixture() -> Fixture {
    let store = Arc::new(InMemoryDocumentStore::new());
    let scheduler = Arc::new(InMemoryScheduler::new());
    let documents: Arc<dyn DocumentStore> = store.clone();
    let manifests = ManifestContext::new(
        DOMAIN,
        documents.clone(),
        Arc::new(DocumentPermissionStore::new(documents)),
        scheduler.clone(),
    );
    let registry = Arc::new(HttpVersionRegistry::new(reqwest::Client::new(), Vec::new()));
    Fixture {
        store,
        scheduler,
        context: InstallerContext::new(manifests, registry, HttpClients::default()),
    }
}

/// Write `files` into the repository at `dir` and commit them on HEAD
fn commit(dir: &Path, files: &[(&str, &str)], removed: &[&str]) -> String {
    let repo = match Repository::open(dir) {
        Ok(repo) => repo,
        Err(_) => Repository::init(dir).unwrap(),
    };
    for (path, content) in files {
        std::fs::write(dir.join(path), content).unwrap();
    }
    for path in removed {
        std::fs::remove_file(dir.join(path)).unwrap();
    }
    let mut index = repo.index().unwrap();
    index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None).unwrap();
    index.update_all(["*"].iter(), None).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::now("Cozy", "cozy@example.org").unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, "release", &tree, &parents)
        .unwrap()
        .to_string()
}

fn git_source(dir: &Path) -> String {
    format!("git+file://{}", dir.display())
}

const MINI_V1: &str = r#"{
    "name": "Mini",
    "slug": "mini",
    "version": "1.0.0",
    "permissions": {"files": {"type": "io.cozy.files", "verbs": ["GET"]}},
    "services": {
        "onPhoto": {"type": "node", "file": "onPhoto.js", "trigger": "@event io.cozy.files:CREATED"},
        "cleanup": {"type": "node", "file": "cleanup.js", "trigger": "@every 24h"}
    }
}"#;

const MINI_V2: &str = r#"{
    "name": "Mini",
    "slug": "mini",
    "version": "2.0.0",
    "permissions": {"files": {"type": "io.cozy.files", "verbs": ["GET"]}},
    "services": {
        "onPhoto": {"type": "node", "file": "onPhoto.js", "trigger": "@event io.cozy.files:CREATED"}
    }
}"#;

const BANK: &str = r#"{"name": "Bank", "slug": "bank", "type": "node", "version": "1.0.0"}"#;

#[tokio::test]
async fn test_install_webapp_from_git_then_update() {
    let fx = fixture();
    let repo = TempDir::new().unwrap();
    let storage = TempDir::new().unwrap();
    let first = commit(
        repo.path(),
        &[("manifest.webapp", MINI_V1), ("index.html", "<html>mini 1.0.0</html>")],
        &[],
    );

    let opts = InstallerOptions::install(AppType::Webapp, "mini", git_source(repo.path()));
    let installer = Arc::new(
        Installer::new(&fx.context, Box::new(LocalCopier::new(storage.path())), opts)
            .await
            .unwrap(),
    );
    let runner = installer.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    let (intermediate, done) = installer.poll().await.unwrap();
    assert_eq!(intermediate.state(), AppState::Installing);
    assert!(!done);
    let (installed, done) = installer.poll().await.unwrap();
    assert!(done);
    handle.await.unwrap();

    let version = format!("1.0.0-{}", first);
    assert_eq!(installed.state(), AppState::Ready);
    assert_eq!(installed.version(), version);
    let index = std::fs::read_to_string(storage.path().join("mini").join(&version).join("index.html")).unwrap();
    assert!(index.contains("1.0.0"));

    let triggers = fx.scheduler.triggers(DOMAIN).await.unwrap();
    assert_eq!(triggers.len(), 2);
    let cleanup_id = installed.as_webapp().unwrap().services["cleanup"].trigger_id.clone();
    assert!(triggers.iter().any(|t| t.id == cleanup_id));

    // The source advances to 2.0.0 and drops the cleanup service
    let second = commit(
        repo.path(),
        &[("manifest.webapp", MINI_V2), ("index.html", "<html>mini 2.0.0</html>")],
        &[],
    );
    let installer = Installer::new(
        &fx.context,
        Box::new(LocalCopier::new(storage.path())),
        InstallerOptions::update(AppType::Webapp, "mini"),
    )
    .await
    .unwrap();
    let updated = installer.run_sync().await.unwrap();

    assert_eq!(updated.state(), AppState::Ready);
    assert_eq!(updated.version(), format!("2.0.0-{}", second));
    let services = &updated.as_webapp().unwrap().services;
    assert!(!services.contains_key("cleanup"));
    assert!(services.contains_key("onPhoto"));

    let triggers = fx.scheduler.triggers(DOMAIN).await.unwrap();
    assert_eq!(triggers.len(), 1);
    assert!(triggers.iter().all(|t| t.id != cleanup_id));

    let stored = AppManifest::get_by_slug(&fx.context.manifests, "mini", AppType::Webapp).await.unwrap();
    assert_eq!(stored.version(), updated.version());
}

#[tokio::test]
async fn test_install_twice_is_rejected() {
    let fx = fixture();
    let repo = TempDir::new().unwrap();
    commit(repo.path(), &[("manifest.webapp", MINI_V1), ("index.html", "1.0.0")], &[]);

    let opts = InstallerOptions::install(AppType::Webapp, "mini", git_source(repo.path()));
    let installer = Installer::new(&fx.context, Box::new(MemCopier::new()), opts.clone())
        .await
        .unwrap();
    let first = installer.run_sync().await.unwrap();

    let second = Installer::new(&fx.context, Box::new(MemCopier::new()), opts).await;
    assert!(matches!(second, Err(AppError::AlreadyExists)));

    let stored = AppManifest::get_by_slug(&fx.context.manifests, "mini", AppType::Webapp).await.unwrap();
    assert_eq!(stored.rev(), first.rev());
    assert_eq!(stored.state(), AppState::Ready);
}

#[tokio::test]
async fn test_missing_source_creates_nothing() {
    let fx = fixture();
    let opts = InstallerOptions::install(AppType::Webapp, "mini", "");
    let result = Installer::new(&fx.context, Box::new(MemCopier::new()), opts).await;
    assert!(matches!(result, Err(AppError::MissingSource)));
    assert!(fx.store.is_empty());
}

#[tokio::test]
async fn test_update_and_delete_unknown_slug() {
    let fx = fixture();
    for opts in [
        InstallerOptions::update(AppType::Konnector, "nope"),
        InstallerOptions::delete(AppType::Konnector, "nope"),
    ] {
        let result = Installer::new(&fx.context, Box::new(MemCopier::new()), opts).await;
        assert!(matches!(result, Err(AppError::NotFound)));
    }
}

#[tokio::test]
async fn test_delete_while_upgrading_is_bad_state() {
    let fx = fixture();
    let mut man = AppManifest::new(AppType::Konnector, "bank");
    man.set_source("registry://bank".to_string());
    man.set_state(AppState::Upgrading);
    man.save_state(&fx.context.manifests).await.unwrap();

    let installer = Installer::new(
        &fx.context,
        Box::new(MemCopier::new()),
        InstallerOptions::delete(AppType::Konnector, "bank"),
    )
    .await
    .unwrap();
    assert!(matches!(installer.run_sync().await, Err(AppError::BadState)));

    let stored = AppManifest::get_by_slug(&fx.context.manifests, "bank", AppType::Konnector).await.unwrap();
    assert_eq!(stored.state(), AppState::Upgrading);
    assert_eq!(stored.rev(), man.rev());
    assert!(stored.error().is_none());
}

#[tokio::test]
async fn test_konnector_reinstall_of_same_commit_copies_nothing() {
    let fx = fixture();
    let repo = TempDir::new().unwrap();
    let hash = commit(repo.path(), &[("manifest.konnector", BANK), ("index.js", "run()")], &[]);
    let copier = MemCopier::new();

    let install = InstallerOptions::install(AppType::Konnector, "bank", git_source(repo.path()));
    let installer = Installer::new(&fx.context, Box::new(copier.clone()), install.clone())
        .await
        .unwrap();
    let man = installer.run_sync().await.unwrap();

    let version = format!("1.0.0-{}", hash);
    assert_eq!(man.version(), version);
    assert_eq!(man.state(), AppState::Ready);
    assert!(copier
        .file(&format!("bank/{}/{}", version, KONNECTOR_ARCHIVE_NAME))
        .is_some());
    assert_eq!(copier.file_names().len(), 1);
    assert_eq!(copier.counts(), (1, 1));

    let delete = Installer::new(
        &fx.context,
        Box::new(copier.clone()),
        InstallerOptions::delete(AppType::Konnector, "bank"),
    )
    .await
    .unwrap();
    delete.run_sync().await.unwrap();

    let again = Installer::new(&fx.context, Box::new(copier.clone()), install)
        .await
        .unwrap();
    let man = again.run_sync().await.unwrap();
    assert_eq!(man.version(), version);
    assert_eq!(copier.counts(), (2, 1));
}

#[tokio::test]
async fn test_swift_copy_failure_marks_errored_and_drops_marker() {
    let fx = fixture();
    let repo = TempDir::new().unwrap();
    let hash = commit(
        repo.path(),
        &[("manifest.webapp", MINI_V1), ("index.html", "<html>1.0.0</html>")],
        &[],
    );
    let marker = format!("/v1/AUTH_test/{}/mini/1.0.0-{}", WEBAPPS_CONTAINER, hash);

    let mut server = mockito::Server::new_async().await;
    let _head_marker = server.mock("HEAD", marker.as_str()).with_status(404).create_async().await;
    let _head_container = server
        .mock("HEAD", "/v1/AUTH_test/apps-web")
        .with_status(204)
        .create_async()
        .await;
    let _put_marker = server.mock("PUT", marker.as_str()).with_status(201).create_async().await;
    let _put_file = server
        .mock("PUT", Matcher::Regex(format!("^{}/.+$", marker)))
        .with_status(507)
        .create_async()
        .await;
    let delete_marker = server
        .mock("DELETE", marker.as_str())
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let storage_url = Url::parse(&format!("{}/v1/AUTH_test", server.url())).unwrap();
    let copier: Box<dyn Copier> = Box::new(SwiftCopier::new(
        reqwest::Client::new(),
        storage_url,
        "secret",
        WEBAPPS_CONTAINER,
    ));
    let opts = InstallerOptions::install(AppType::Webapp, "mini", git_source(repo.path()));
    let installer = Installer::new(&fx.context, copier, opts).await.unwrap();

    let result = installer.run_sync().await;
    assert!(matches!(result, Err(AppError::Copier(_))));
    delete_marker.assert_async().await;

    let stored = AppManifest::get_by_slug(&fx.context.manifests, "mini", AppType::Webapp).await.unwrap();
    assert_eq!(stored.state(), AppState::Errored);
    assert!(stored.error().unwrap().contains("507"));
}
