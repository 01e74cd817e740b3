//! Provisioning pipeline tests against a scratch root

use escprov::collect::ScriptedPrompter;
use escprov::config::{DeploymentConfig, SslMode};
use escprov::filesys::dir::Dir;
use escprov::filesys::file::File;
use escprov::host::CommandOutput;
use escprov::pipeline::fsm::StepState;
use escprov::pipeline::Pipeline;
use escprov::render::sshd::configured_port;

use crate::fixtures::{
    example_config, host_runner, run_pipeline, run_pipeline_with, scratch_host, ss_listening,
    test_settings, REGISTRY_SECRET, STOCK_SSHD_CONFIG,
};

fn count(history: &[String], command: &str) -> usize {
    history.iter().filter(|c| c.as_str() == command).count()
}

fn position(history: &[String], command: &str) -> usize {
    history
        .iter()
        .position(|c| c == command)
        .unwrap_or_else(|| panic!("`{command}` never ran: {history:#?}"))
}

#[test]
fn test_steps_run_in_dependency_order() {
    assert_eq!(
        Pipeline::standard().step_names(),
        vec![
            "os-check",
            "packages",
            "container-runtime",
            "deployer-user",
            "app-source",
            "registry-auth",
            "environment",
            "reverse-proxy",
            "intrusion-prevention",
            "ssh-hardening",
            "firewall",
            "service-unit",
            "management-scripts",
            "persist-config",
        ]
    );
}

#[tokio::test]
async fn test_second_run_installs_nothing() {
    let config = example_config();
    let (root, layout) = scratch_host(&config).await;
    let runner = host_runner();
    runner.respond_once(
        "docker --version",
        CommandOutput::failed(127, "docker: command not found"),
        CommandOutput::ok("Docker version 27.3.1"),
    );

    let mut prompter = ScriptedPrompter::default();
    let first = run_pipeline(&layout, &config, runner.clone(), &mut prompter).await;
    assert!(first.succeeded(), "{:?}", first.error);
    assert_eq!(first.installed, vec!["container-runtime"]);
    assert!(first.rolled_back.is_empty());

    let second = run_pipeline(&layout, &config, runner.clone(), &mut prompter).await;
    assert!(second.succeeded(), "{:?}", second.error);
    assert!(second.installed.is_empty());
    assert_eq!(second.completed, first.completed);
    assert_eq!(runner.commands_starting_with("sh ").len(), 1);

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_hardened_sshd_config_is_installed() {
    let config = example_config();
    let (root, layout) = scratch_host(&config).await;
    let runner = host_runner();

    let mut prompter = ScriptedPrompter::default();
    let result = run_pipeline(&layout, &config, runner.clone(), &mut prompter).await;
    assert!(result.succeeded(), "{:?}", result.error);

    let text = layout.sshd_config_file().read_string().await.unwrap();
    assert_eq!(configured_port(&text), 2222);
    assert!(text.contains("PermitRootLogin no\n"));
    assert!(text.contains("PasswordAuthentication no\n"));

    // the new port is opened before sshd restarts, then used by the firewall
    let history = runner.history();
    let opened = history.iter().position(|c| c == "ufw allow 2222/tcp").unwrap();
    let restarted = history.iter().position(|c| c == "systemctl restart ssh").unwrap();
    assert!(opened < restarted);
    assert!(!history.contains(&"ufw allow 22/tcp".to_string()));

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_rejected_sshd_config_is_restored() {
    let config = example_config();
    let (root, layout) = scratch_host(&config).await;
    let runner = host_runner();
    runner.respond(
        "sshd -t",
        CommandOutput::failed(255, "/etc/ssh/sshd_config line 3: Bad configuration option: Portt"),
    );

    let mut prompter = ScriptedPrompter::default();
    let result = run_pipeline(&layout, &config, runner.clone(), &mut prompter).await;

    assert!(result.succeeded(), "{:?}", result.error);
    assert_eq!(result.rolled_back, vec!["ssh-hardening"]);
    assert_eq!(result.state_of("ssh-hardening"), Some(StepState::RolledBack));
    assert_eq!(result.state_of("persist-config"), Some(StepState::Completed));
    assert!(result.warnings.iter().any(|w| w.starts_with("ssh-hardening was rolled back")));

    let text = layout.sshd_config_file().read_string().await.unwrap();
    assert_eq!(text, STOCK_SSHD_CONFIG);
    let history = runner.history();
    assert_eq!(count(&history, "systemctl restart ssh"), 1);
    assert_eq!(count(&history, "systemctl restart ssh.socket"), 1);

    // the firewall keeps the port sshd still listens on
    assert!(history.contains(&"ufw allow 22/tcp".to_string()));
    assert!(!history.contains(&"ufw allow 2222/tcp".to_string()));

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_socket_activated_sshd_moves_to_the_new_port() {
    let config = example_config();
    let (root, layout) = scratch_host(&config).await;
    let runner = host_runner();
    runner.respond("systemctl is-enabled ssh.socket", CommandOutput::ok("enabled"));

    let mut prompter = ScriptedPrompter::default();
    let result = run_pipeline(&layout, &config, runner.clone(), &mut prompter).await;
    assert!(result.succeeded(), "{:?}", result.error);

    let history = runner.history();
    let opened = position(&history, "ufw allow 2222/tcp");
    let reloaded = position(&history, "systemctl daemon-reload");
    let socket = position(&history, "systemctl restart ssh.socket");
    let service = position(&history, "systemctl restart ssh");
    let checked = position(&history, "ss -Hltn");
    let denied = position(&history, "ufw default deny incoming");
    assert!(opened < reloaded);
    assert!(reloaded < socket);
    assert!(socket < service);
    assert!(service < checked);
    assert!(checked < denied);

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_service_only_sshd_skips_the_socket() {
    let config = example_config();
    let (root, layout) = scratch_host(&config).await;
    let runner = host_runner();
    runner.respond("systemctl is-enabled ssh.socket", CommandOutput::failed(1, "disabled"));

    let mut prompter = ScriptedPrompter::default();
    let result = run_pipeline(&layout, &config, runner.clone(), &mut prompter).await;
    assert!(result.succeeded(), "{:?}", result.error);

    let history = runner.history();
    assert_eq!(count(&history, "systemctl restart ssh"), 1);
    assert!(runner.commands_starting_with("systemctl restart ssh.socket").is_empty());

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_new_port_not_listening_is_rolled_back() {
    let config = example_config();
    let (root, layout) = scratch_host(&config).await;
    let runner = host_runner();
    runner.respond("ss -Hltn", CommandOutput::ok(ss_listening(&[22])));

    let mut prompter = ScriptedPrompter::default();
    let result = run_pipeline(&layout, &config, runner.clone(), &mut prompter).await;

    assert!(result.succeeded(), "{:?}", result.error);
    assert_eq!(result.rolled_back, vec!["ssh-hardening"]);
    assert!(result.warnings.iter().any(|w| w.contains("nothing listens on port 2222")));
    assert_eq!(
        layout.sshd_config_file().read_string().await.unwrap(),
        STOCK_SSHD_CONFIG
    );

    // sshd restarted twice: once for the new config, once for the restored one
    let history = runner.history();
    assert_eq!(count(&history, "systemctl restart ssh"), 2);
    assert_eq!(count(&history, "ss -Hltn"), 3);
    // the firewall never closes the port sshd still listens on
    let denied = position(&history, "ufw default deny incoming");
    assert!(history[denied..].contains(&"ufw allow 22/tcp".to_string()));
    assert!(!history[denied..].contains(&"ufw allow 2222/tcp".to_string()));

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_ssh_hardening_refuses_without_authorized_keys() {
    let config = example_config();
    let (root, layout) = scratch_host(&config).await;
    escprov::filesys::file::File::new(layout.host_path("/root/.ssh/authorized_keys"))
        .delete()
        .await
        .unwrap();
    let runner = host_runner();

    let mut prompter = ScriptedPrompter::default();
    let result = run_pipeline(&layout, &config, runner.clone(), &mut prompter).await;

    assert!(result.succeeded(), "{:?}", result.error);
    assert_eq!(result.rolled_back, vec!["ssh-hardening"]);
    assert_eq!(
        layout.sshd_config_file().read_string().await.unwrap(),
        STOCK_SSHD_CONFIG
    );
    assert!(runner.commands_starting_with("sshd -t").is_empty());
    assert!(runner.commands_starting_with("systemctl restart ssh").is_empty());

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_environment_rerender_backs_up_once() {
    let config = example_config();
    let (root, layout) = scratch_host(&config).await;
    let runner = host_runner();
    let env_file = layout.env_file(&config);

    let mut prompter = ScriptedPrompter::default();
    let first = run_pipeline(&layout, &config, runner.clone(), &mut prompter).await;
    assert!(first.succeeded(), "{:?}", first.error);
    let app_dir = layout.app_dir(&config);
    assert!(app_dir.list_files_with_prefix(".env.backup.").await.unwrap().is_empty());
    let first_env = env_file.read_string().await.unwrap();
    assert_eq!(env_file.mode().await, Some(0o600));

    let second = run_pipeline(&layout, &config, runner.clone(), &mut prompter).await;
    assert!(second.succeeded(), "{:?}", second.error);

    let backups = app_dir.list_files_with_prefix(".env.backup.").await.unwrap();
    assert_eq!(backups.len(), 1);
    let backup = escprov::filesys::file::File::new(&backups[0]);
    assert_eq!(backup.read_string().await.unwrap(), first_env);

    // the generated key survives the re-render
    assert_eq!(env_file.read_string().await.unwrap(), first_env);

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_unresolved_placeholder_offers_editor_then_aborts() {
    let config = example_config();
    let (root, layout) = scratch_host(&config).await;
    let runner = host_runner();
    let settings = escprov::storage::settings::Settings {
        generate_secret_key: false,
        ..test_settings()
    };

    // open the editor once, then give up
    let mut prompter = ScriptedPrompter::new(["y", "n"]);
    let result = run_pipeline_with(&layout, &config, settings, runner.clone(), &mut prompter).await;

    let err = result.error.as_ref().unwrap();
    assert_eq!(err.exit_code(), 4);
    assert!(err.to_string().contains("SECRET_KEY"));
    assert_eq!(result.failed_step, Some("environment"));
    assert_eq!(prompter.times_asked("edit_environment"), 2);
    assert_eq!(runner.commands_starting_with("true ").len(), 1);
    assert!(!layout.record_file().exists().await);

    root.delete().await.unwrap();
}

fn site_backups(site: &File) -> Dir {
    Dir::new(site.path().parent().unwrap())
}

#[tokio::test]
async fn test_rejected_nginx_site_restores_the_previous_one() {
    let config = example_config();
    let (root, layout) = scratch_host(&config).await;
    let runner = host_runner();
    let settings = test_settings();
    let site = layout.nginx_site_file(&settings);

    let mut prompter = ScriptedPrompter::default();
    let first = run_pipeline(&layout, &config, runner.clone(), &mut prompter).await;
    assert!(first.succeeded(), "{:?}", first.error);
    let served = site.read_string().await.unwrap();

    runner.respond(
        "nginx -t",
        CommandOutput::failed(1, "nginx: [emerg] unknown directive \"ssl_stapling_file\""),
    );
    let plain = DeploymentConfig {
        ssl_mode: SslMode::None,
        ..example_config()
    };
    let second = run_pipeline(&layout, &plain, runner.clone(), &mut prompter).await;

    let err = second.error.as_ref().unwrap();
    assert_eq!(err.exit_code(), 1);
    assert_eq!(second.failed_step, Some("reverse-proxy"));
    assert!(err.output().unwrap().contains("[emerg]"));

    assert_eq!(site.read_string().await.unwrap(), served);
    let backups = site_backups(&site).list_files_with_prefix("esc.backup.").await.unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(File::new(&backups[0]).read_string().await.unwrap(), served);
    assert!(File::new(layout.nginx_enabled_link(&settings)).exists().await);

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_first_rejected_nginx_site_keeps_the_default_site() {
    let config = example_config();
    let (root, layout) = scratch_host(&config).await;
    let settings = test_settings();
    let default_site = File::new(layout.nginx_default_link());
    default_site
        .write_atomic(b"server {\n    listen 80 default_server;\n}\n", None)
        .await
        .unwrap();
    let runner = host_runner();
    runner.respond("nginx -t", CommandOutput::failed(1, "nginx: configuration file test failed"));

    let mut prompter = ScriptedPrompter::default();
    let result = run_pipeline(&layout, &config, runner.clone(), &mut prompter).await;

    assert_eq!(result.failed_step, Some("reverse-proxy"));
    assert!(result.error.as_ref().unwrap().to_string().contains("the new site was removed"));
    assert!(default_site.exists().await);
    assert!(!layout.nginx_site_file(&settings).exists().await);
    assert!(!File::new(layout.nginx_enabled_link(&settings)).exists().await);
    assert!(runner.commands_starting_with("systemctl reload-or-restart nginx").is_empty());

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_letsencrypt_certificate_renews_through_nginx_hooks() {
    let config = DeploymentConfig {
        ssl_mode: SslMode::LetsEncrypt,
        ssl_email: "ops@example.com".into(),
        ..example_config()
    };
    let (root, layout) = scratch_host(&config).await;
    let settings = test_settings();
    let default_site = File::new(layout.nginx_default_link());
    default_site.write_atomic(b"server {}\n", None).await.unwrap();
    let runner = host_runner();

    let mut prompter = ScriptedPrompter::default();
    let result = run_pipeline(&layout, &config, runner.clone(), &mut prompter).await;
    assert!(result.succeeded(), "{:?}", result.error);

    let history = runner.history();
    assert_eq!(
        runner.commands_starting_with("certbot"),
        vec![
            "certbot certonly --standalone --non-interactive --agree-tos --email ops@example.com \
             --pre-hook systemctl stop nginx --post-hook systemctl start nginx \
             -d example.com -d www.example.com"
                .to_string()
        ]
    );
    assert!(!history.contains(&"systemctl stop nginx".to_string()));
    assert!(position(&history, "nginx -t") < position(&history, "systemctl reload-or-restart nginx"));

    let text = layout.nginx_site_file(&settings).read_string().await.unwrap();
    assert!(text.contains("ssl_certificate /etc/letsencrypt/live/example.com/"));
    assert!(!text.contains("acme-challenge"));
    assert!(!default_site.exists().await);

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_missing_open_ssh_rule_does_not_stop_the_firewall() {
    let config = DeploymentConfig {
        admin_ip_whitelist: escprov::config::model::parse_whitelist("203.0.113.5").unwrap(),
        ..example_config()
    };
    let (root, layout) = scratch_host(&config).await;
    let runner = host_runner();
    runner.respond(
        "ufw --force delete",
        CommandOutput::failed(1, "Could not delete non-existent rule"),
    );

    let mut prompter = ScriptedPrompter::default();
    let result = run_pipeline(&layout, &config, runner.clone(), &mut prompter).await;

    assert!(result.succeeded(), "{:?}", result.error);
    assert_eq!(result.state_of("firewall"), Some(StepState::Completed));
    let history = runner.history();
    assert_eq!(count(&history, "ufw --force delete allow 2222/tcp"), 1);
    assert!(history.contains(&"ufw allow from 203.0.113.5 to any port 2222 proto tcp".to_string()));
    assert!(history.contains(&"ufw --force enable".to_string()));

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_registry_failure_stops_pipeline() {
    let config = example_config();
    let (root, layout) = scratch_host(&config).await;
    let runner = host_runner();
    runner.respond("docker login", CommandOutput::failed(1, "Error response from daemon: unauthorized"));

    let mut prompter = ScriptedPrompter::default();
    let result = run_pipeline(&layout, &config, runner.clone(), &mut prompter).await;

    let err = result.error.as_ref().unwrap();
    assert_eq!(err.exit_code(), 3);
    assert_eq!(result.failed_step, Some("registry-auth"));
    assert_eq!(result.state_of("registry-auth"), Some(StepState::Failed));
    assert_eq!(result.state_of("environment"), None);
    assert!(!layout.env_file(&config).exists().await);
    assert!(!layout.record_file().exists().await);

    // the secret only ever travels on stdin
    assert!(runner.history().iter().all(|c| !c.contains(REGISTRY_SECRET)));

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_unsupported_os_stops_before_any_command() {
    let config = example_config();
    let (root, layout) = scratch_host(&config).await;
    layout
        .os_release_file()
        .write_atomic(b"NAME=\"Fedora Linux\"\nID=fedora\n", None)
        .await
        .unwrap();
    let runner = host_runner();

    let mut prompter = ScriptedPrompter::default();
    let result = run_pipeline(&layout, &config, runner.clone(), &mut prompter).await;

    let err = result.error.as_ref().unwrap();
    assert_eq!(err.exit_code(), 2);
    assert!(err.to_string().contains("fedora"));
    assert_eq!(result.states.len(), 1);
    assert!(runner.history().is_empty());

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_disabled_steps_are_skipped() {
    let config = escprov::config::DeploymentConfig {
        security_enabled: false,
        ssh_hardening: false,
        create_deployer_user: false,
        configure_firewall: false,
        ..example_config()
    };
    let (root, layout) = scratch_host(&config).await;
    let runner = host_runner();

    let mut prompter = ScriptedPrompter::default();
    let result = run_pipeline(&layout, &config, runner.clone(), &mut prompter).await;

    assert!(result.succeeded(), "{:?}", result.error);
    assert_eq!(
        result.skipped,
        vec!["deployer-user", "intrusion-prevention", "ssh-hardening", "firewall"]
    );
    assert!(runner.commands_starting_with("ufw").is_empty());
    assert_eq!(
        layout.sshd_config_file().read_string().await.unwrap(),
        STOCK_SSHD_CONFIG
    );

    root.delete().await.unwrap();
}
