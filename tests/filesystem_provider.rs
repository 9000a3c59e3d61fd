use groundwork::config::FilesystemContentConfig;
use groundwork::connector_fs::FilesystemProvider;
use groundwork_core::content::ContentProvider;
use groundwork_core::error::RagError;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, body: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn setup() -> (TempDir, FilesystemProvider) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    write(root, "services/payments.yaml", "name: payments\nowner: team-a\n");
    write(root, "services/payments.docs.md", "# Payments\n\nHandles **refunds** too.");
    write(root, "services/mailer.yaml", "name: mailer\n");
    write(root, "README.md", "Top-level readme.");
    write(root, "notes.bin", "not included");
    write(root, ".git/config", "[core]");
    write(root, "node_modules/pkg/index.yaml", "ignored: true");

    let config = FilesystemContentConfig {
        root: root.to_path_buf(),
        include_globs: vec!["**/*.yaml".to_string(), "**/*.md".to_string()],
        exclude_globs: vec![],
        docs_suffix: ".docs.md".to_string(),
        follow_symlinks: false,
    };
    let provider = FilesystemProvider::new(&config).unwrap();
    (tmp, provider)
}

#[tokio::test]
async fn test_lists_items_sorted_without_sidecars() {
    let (_tmp, provider) = setup();
    let items = provider.fetch_all_items().await.unwrap();
    let refs: Vec<&str> = items.iter().map(|i| i.reference.as_str()).collect();
    assert_eq!(
        refs,
        vec!["README.md", "services/mailer.yaml", "services/payments.yaml"]
    );

    let payments = &items[2];
    assert_eq!(payments.name, "payments.yaml");
    assert_eq!(provider.extract_item_content(payments), "name: payments\nowner: team-a\n");
    assert_eq!(provider.item_ref(payments), "services/payments.yaml");
    assert_eq!(payments.metadata["path"], "services/payments.yaml");
}

#[tokio::test]
async fn test_supplementary_docs_sidecar() {
    let (_tmp, provider) = setup();

    assert!(provider
        .has_supplementary_docs("services/payments.yaml")
        .await
        .unwrap());
    let docs = provider
        .fetch_supplementary_docs("services/payments.yaml")
        .await
        .unwrap()
        .unwrap();
    assert!(docs.contains("refunds"));

    assert!(!provider
        .has_supplementary_docs("services/mailer.yaml")
        .await
        .unwrap());
    assert!(provider
        .fetch_supplementary_docs("services/mailer.yaml")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_fetch_item() {
    let (_tmp, provider) = setup();

    let item = provider.fetch_item("services/mailer.yaml").await.unwrap();
    assert_eq!(item.body, "name: mailer\n");

    for missing in [
        "services/unknown.yaml",
        "notes.bin",
        "services/payments.docs.md",
        "../outside.yaml",
        "/etc/passwd",
        "",
    ] {
        let err = provider.fetch_item(missing).await.unwrap_err();
        assert!(
            matches!(err, RagError::NotFound(_)),
            "expected NotFound for {:?}",
            missing
        );
    }
}

#[test]
fn test_missing_root_is_configuration_error() {
    let config = FilesystemContentConfig {
        root: "/definitely/not/here".into(),
        include_globs: vec!["**/*.md".to_string()],
        exclude_globs: vec![],
        docs_suffix: ".docs.md".to_string(),
        follow_symlinks: false,
    };
    assert!(matches!(
        FilesystemProvider::new(&config),
        Err(RagError::Configuration(_))
    ));
}

#[test]
fn test_invalid_glob_is_configuration_error() {
    let tmp = TempDir::new().unwrap();
    let config = FilesystemContentConfig {
        root: tmp.path().to_path_buf(),
        include_globs: vec!["[".to_string()],
        exclude_globs: vec![],
        docs_suffix: ".docs.md".to_string(),
        follow_symlinks: false,
    };
    assert!(matches!(
        FilesystemProvider::new(&config),
        Err(RagError::Configuration(_))
    ));
}
