//! Environment validation tests

use escprov::config::kv;
use escprov::filesys::dir::Dir;
use escprov::render::{placeholders, Renderer, TemplateId, ValidationState};
use escprov::storage::layout::StorageLayout;
use escprov::validate::Validator;

use crate::fixtures::{example_config, test_settings};

#[test]
fn test_fresh_template_needs_a_secret_key() {
    let layout = StorageLayout::new("/");
    let settings = test_settings();
    let mut artifact = Renderer::new(&layout, &settings).render(TemplateId::Environment, &example_config());

    let report = Validator.validate(&mut artifact);
    assert_eq!(artifact.validation, ValidationState::Invalid);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].key, "SECRET_KEY");
}

#[test]
fn test_replacing_the_placeholder_makes_it_valid() {
    let layout = StorageLayout::new("/");
    let settings = test_settings();
    let carried = vec![("SECRET_KEY".to_string(), "k3y-from-operator".to_string())];
    let mut artifact =
        Renderer::new(&layout, &settings).render_environment(&example_config(), &carried);

    let report = Validator.validate(&mut artifact);
    assert_eq!(artifact.validation, ValidationState::Valid);
    let warned: Vec<&str> = report.warnings.iter().map(|w| w.key.as_str()).collect();
    assert!(warned.contains(&"DATABASE_URL"));
    assert!(warned.contains(&"EMAIL_HOST_PASSWORD"));

    let entries = kv::parse(&artifact.contents);
    assert_eq!(kv::get(&entries, "SECRET_KEY"), Some("k3y-from-operator"));
}

#[test]
fn test_operator_edits_survive_but_derived_keys_do_not() {
    let layout = StorageLayout::new("/");
    let settings = test_settings();
    let carried = vec![
        ("SECRET_KEY".to_string(), "k3y".to_string()),
        ("DATABASE_URL".to_string(), "postgres://esc:pw@db:5432/esc".to_string()),
        ("ALLOWED_HOSTS".to_string(), "yourdomain.com".to_string()),
        ("FEATURE_FLAGS".to_string(), "beta".to_string()),
    ];
    let mut artifact =
        Renderer::new(&layout, &settings).render_environment(&example_config(), &carried);

    let report = Validator.validate(&mut artifact);
    assert!(report.is_valid(), "{:?}", report.errors);
    assert!(report.warnings.iter().all(|w| w.key != "DATABASE_URL"));

    let entries = kv::parse(&artifact.contents);
    assert_eq!(kv::get(&entries, "DATABASE_URL"), Some("postgres://esc:pw@db:5432/esc"));
    assert_eq!(kv::get(&entries, "FEATURE_FLAGS"), Some("beta"));
    assert!(!kv::get(&entries, "ALLOWED_HOSTS").unwrap().contains(placeholders::DOMAIN_TOKEN));
}

#[tokio::test]
async fn test_validate_file_on_disk() {
    let dir = Dir::create_temp_dir("escprov-validate").await.unwrap();
    let file = dir.file(".env");

    let text = format!("SECRET_KEY={}\nALLOWED_HOSTS=example.com\n", placeholders::SECRET_KEY);
    file.write_atomic(text.as_bytes(), Some(0o600)).await.unwrap();
    let report = Validator.validate_file(file.path()).await.unwrap();
    assert_eq!(report.state(), ValidationState::Invalid);

    file.write_atomic(b"SECRET_KEY=real\nALLOWED_HOSTS=example.com\n", Some(0o600))
        .await
        .unwrap();
    let report = Validator.validate_file(file.path()).await.unwrap();
    assert_eq!(report.state(), ValidationState::Valid);

    dir.delete().await.unwrap();
}
