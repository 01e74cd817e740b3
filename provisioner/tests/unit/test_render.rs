//! Rendered artifact tests

use escprov::config::model::parse_whitelist;
use escprov::config::SslMode;
use escprov::render::{Renderer, ScriptKind, TemplateId};
use escprov::storage::layout::StorageLayout;
use escprov::validate::Validator;

use crate::fixtures::{example_config, test_settings};

#[test]
fn test_hardened_example_renders_consistently() {
    let layout = StorageLayout::new("/");
    let settings = test_settings();
    let renderer = Renderer::new(&layout, &settings);
    let config = example_config();

    let sshd = renderer.render(TemplateId::SshdConfig, &config).contents;
    assert!(sshd.contains("\nPort 2222\n"));
    assert!(sshd.contains("\nPermitRootLogin no\n"));
    assert!(sshd.contains("\nPasswordAuthentication no\n"));
    assert!(!sshd.contains("AllowUsers"));

    let nginx = renderer.render(TemplateId::Nginx, &config).contents;
    assert!(nginx.contains("server_name example.com www.example.com;"));
    assert!(nginx.contains("/etc/ssl/esc/"));

    let jail = renderer.render(TemplateId::Fail2banJail, &config).contents;
    assert!(jail.contains("[sshd]\nenabled  = true\nfilter   = sshd\nport     = 2222\n"));

    let env = renderer.render(TemplateId::Environment, &config).contents;
    assert!(env.contains("ALLOWED_HOSTS=example.com,www.example.com,localhost,127.0.0.1\n"));
}

#[test]
fn test_whitelist_reaches_sshd_config() {
    let layout = StorageLayout::new("/");
    let settings = test_settings();
    let renderer = Renderer::new(&layout, &settings);
    let config = escprov::config::DeploymentConfig {
        admin_ip_whitelist: parse_whitelist("203.0.113.5,198.51.100.0/24").unwrap(),
        ..example_config()
    };

    let sshd = renderer.render(TemplateId::SshdConfig, &config).contents;
    assert!(sshd.contains("AllowUsers *@198.51.100.0/24 *@203.0.113.5\n"));
}

#[test]
fn test_plain_http_has_no_certificates() {
    let layout = StorageLayout::new("/");
    let settings = test_settings();
    let renderer = Renderer::new(&layout, &settings);
    let config = escprov::config::DeploymentConfig {
        ssl_mode: SslMode::None,
        ..example_config()
    };

    let nginx = renderer.render(TemplateId::Nginx, &config).contents;
    assert!(!nginx.contains("ssl_certificate"));
    assert!(!nginx.contains("listen 443"));
}

#[test]
fn test_every_template_is_deterministic_and_valid() {
    let layout = StorageLayout::new("/srv/scratch");
    let settings = test_settings();
    let renderer = Renderer::new(&layout, &settings);
    let config = example_config();

    let mut templates = vec![
        TemplateId::Nginx,
        TemplateId::Fail2banJail,
        TemplateId::SshdConfig,
        TemplateId::SystemdUnit,
    ];
    templates.extend(ScriptKind::ALL.into_iter().map(TemplateId::Script));

    for template in templates {
        let mut first = renderer.render(template, &config);
        let second = renderer.render(template, &config);
        assert_eq!(first.contents, second.contents, "{template}");
        assert_eq!(first.digest, second.digest, "{template}");
        assert!(first.path.starts_with("/srv/scratch"), "{template}");
        assert!(Validator.validate(&mut first).is_valid(), "{template}");
    }
}

#[test]
fn test_scripts_target_app_dir() {
    let layout = StorageLayout::new("/");
    let settings = test_settings();
    let renderer = Renderer::new(&layout, &settings);
    let config = example_config();

    let deploy = renderer.render(TemplateId::Script(ScriptKind::Deploy), &config);
    assert_eq!(deploy.path.to_str(), Some("/opt/apps/esc/deploy.sh"));
    assert_eq!(deploy.template.mode(), 0o755);
    assert!(deploy.contents.starts_with("#!/"));
    assert!(!deploy.contents.contains("git pull"));
}

#[test]
fn test_golden_files() {
    let layout = StorageLayout::new("/");
    let settings = test_settings();
    let renderer = Renderer::new(&layout, &settings);
    let config = example_config();

    let cases = [
        (TemplateId::SystemdUnit, include_str!("golden/esc.service")),
        (TemplateId::SshdConfig, include_str!("golden/sshd_config")),
    ];
    for (template, golden) in cases {
        assert_eq!(renderer.render(template, &config).contents, golden, "{template}");
    }
}
