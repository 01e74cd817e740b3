//! Configuration collection tests

use escprov::collect::{Collected, Collector, ScriptedPrompter, Tone};
use escprov::config::{DeploymentConfig, SslMode};
use escprov::errors::ProvisionError;

use crate::fixtures::example_config;

const APP_PORT: u16 = 8000;

/// Answers for a fresh self-signed install with SSH hardening on port 2222
fn fresh_answers(proceed: &str) -> Vec<&str> {
    vec![
        "example.com",       // domain
        "esc-bot",           // registry_username
        "token",             // registry_password
        "",                  // app_dir, default
        "none",              // source_repo
        "2",                 // ssl_mode
        "y",                 // security_enabled
        "admin@example.com", // admin_email
        "n",                 // fail2ban_aggressive
        "y",                 // ssh_hardening
        "2222",              // ssh_port
        "y",                 // disable_root_login
        "n",                 // password_auth
        "203.0.113.5, 198.51.100.0/24", // admin_ip_whitelist
        "y",                            // create_deployer_user
        "y",                            // configure_firewall
        proceed,
    ]
}

async fn collect(
    prompter: &mut ScriptedPrompter,
    existing: Option<&DeploymentConfig>,
) -> Result<Collected, ProvisionError> {
    Collector::new(prompter, APP_PORT).collect(existing).await
}

#[tokio::test]
async fn test_fresh_collection() {
    let mut prompter = ScriptedPrompter::new(fresh_answers("y"));
    let collected = collect(&mut prompter, None).await.unwrap();

    let Collected::Proceed { config, .. } = collected else {
        panic!("expected to proceed");
    };
    assert_eq!(config.domain, "example.com");
    assert_eq!(config.ssl_mode, SslMode::SelfSigned);
    assert_eq!(config.ssh_port, 2222);
    assert_eq!(config.app_dir.to_str(), Some("/opt/apps/esc"));
    assert_eq!(config.source_repo, None);
    assert_eq!(config.admin_ip_whitelist.len(), 2);
    assert_eq!(prompter.remaining(), 0);

    // the summary never shows the secret
    assert!(prompter.messages(Tone::Info).iter().all(|m| !m.contains("token")));
}

#[tokio::test]
async fn test_empty_required_answer_is_asked_again() {
    let mut answers = fresh_answers("y");
    answers.insert(0, "");
    let mut prompter = ScriptedPrompter::new(answers);

    let collected = collect(&mut prompter, None).await.unwrap();
    assert!(matches!(collected, Collected::Proceed { .. }));
    assert_eq!(prompter.times_asked("domain"), 2);
    assert!(prompter.messages(Tone::Warning).contains(&"This value is required."));
}

#[tokio::test]
async fn test_port_22_needs_confirmation() {
    let mut answers = fresh_answers("y");
    let at = answers.iter().position(|a| *a == "2222").unwrap();
    answers.insert(at, "n");
    answers.insert(at, "22");
    let mut prompter = ScriptedPrompter::new(answers);

    let Collected::Proceed { config, .. } = collect(&mut prompter, None).await.unwrap() else {
        panic!("expected to proceed");
    };
    assert_eq!(config.ssh_port, 2222);
    assert_eq!(prompter.times_asked("ssh_port"), 2);
    assert_eq!(prompter.times_asked("ssh_port_22_confirm"), 1);
}

#[tokio::test]
async fn test_reserved_port_is_refused() {
    let mut answers = fresh_answers("y");
    let at = answers.iter().position(|a| *a == "2222").unwrap();
    answers.insert(at, "443");
    let mut prompter = ScriptedPrompter::new(answers);

    let Collected::Proceed { config, .. } = collect(&mut prompter, None).await.unwrap() else {
        panic!("expected to proceed");
    };
    assert_eq!(config.ssh_port, 2222);
    assert_eq!(prompter.times_asked("ssh_port"), 2);
}

#[tokio::test]
async fn test_declining_summary_cancels() {
    let mut prompter = ScriptedPrompter::new(fresh_answers("n"));
    let collected = collect(&mut prompter, None).await.unwrap();
    assert!(matches!(collected, Collected::Cancelled));
}

#[tokio::test]
async fn test_existing_config_is_offered() {
    let existing = example_config();
    let mut prompter = ScriptedPrompter::new(["y", "token", "y"]);

    let Collected::Proceed { config, .. } = collect(&mut prompter, Some(&existing)).await.unwrap() else {
        panic!("expected to proceed");
    };
    assert_eq!(config, existing);
    assert_eq!(prompter.asked(), ["use_existing", "registry_password", "proceed"]);
}

#[tokio::test]
async fn test_existing_values_become_defaults() {
    let existing = example_config();
    // decline the shortcut, then accept every default; the secret and the
    // summary still need answers
    let mut answers = vec!["n", "", "", "token"];
    answers.extend([""; 13]);
    answers.push("y");
    let mut prompter = ScriptedPrompter::new(answers);

    let Collected::Proceed { config, .. } = collect(&mut prompter, Some(&existing)).await.unwrap() else {
        panic!("expected to proceed");
    };
    assert_eq!(config.domain, existing.domain);
    assert_eq!(config.ssh_port, existing.ssh_port);
    assert_eq!(config.ssl_mode, existing.ssl_mode);
    assert_eq!(prompter.remaining(), 0);
}

#[tokio::test]
async fn test_incomplete_stored_config_is_collected_again() {
    let existing = DeploymentConfig {
        admin_email: String::new(),
        ..example_config()
    };
    // no shortcut is offered; only the missing email needs an answer
    let mut answers = vec!["", "", "token", "", "", "", "", "admin@example.com"];
    answers.extend([""; 8]);
    answers.push("y");
    let mut prompter = ScriptedPrompter::new(answers);

    let Collected::Proceed { config, .. } = collect(&mut prompter, Some(&existing)).await.unwrap() else {
        panic!("expected to proceed");
    };
    assert!(!prompter.asked().contains(&"use_existing"));
    assert_eq!(prompter.asked()[0], "domain");
    assert_eq!(config.admin_email, "admin@example.com");
    assert_eq!(config.domain, existing.domain);
    assert_eq!(config.ssh_port, existing.ssh_port);
    assert_eq!(prompter.remaining(), 0);

    let warnings = prompter.messages(Tone::Warning);
    assert!(warnings.contains(&"The stored configuration is incomplete and needs review:"));
    assert!(warnings.contains(&"  an admin email is required when security is enabled"));
}
