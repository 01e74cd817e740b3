//! Deployment record tests

use escprov::config::model::parse_whitelist;
use escprov::filesys::dir::Dir;
use escprov::storage::layout::StorageLayout;
use escprov::storage::record::{load_record, save_record, RECORD_MODE};

use tokio_test::{assert_err, assert_ok};

use crate::fixtures::{example_config, REGISTRY_SECRET};

#[tokio::test]
async fn test_saved_record_reloads_without_the_secret() {
    let root = Dir::create_temp_dir("escprov-record").await.unwrap();
    let layout = StorageLayout::new(root.path());
    let file = layout.record_file();
    let config = escprov::config::DeploymentConfig {
        source_repo: Some("https://github.com/esc/app.git".into()),
        admin_ip_whitelist: parse_whitelist("203.0.113.5, 10.0.0.0/8").unwrap(),
        fail2ban_aggressive: true,
        ..example_config()
    };

    assert_eq!(assert_ok!(load_record(&file).await), None);
    assert_ok!(save_record(&file, &config).await);

    assert_eq!(assert_ok!(load_record(&file).await), Some(config));
    assert_eq!(file.mode().await, Some(RECORD_MODE));
    let text = file.read_string().await.unwrap();
    assert!(!text.contains(REGISTRY_SECRET));
    assert!(!text.to_lowercase().contains("password="));

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_corrupt_record_is_an_error() {
    let root = Dir::create_temp_dir("escprov-record").await.unwrap();
    let layout = StorageLayout::new(root.path());
    let file = layout.record_file();
    file.write_atomic(b"DOMAIN=example.com\nSSH_PORT=not-a-port\n", Some(RECORD_MODE))
        .await
        .unwrap();

    assert_err!(load_record(&file).await);

    root.delete().await.unwrap();
}
