//! Fail2Ban jail configuration

use crate::config::model::display_admin_ip;
use crate::config::DeploymentConfig;

/// Ban thresholds shared by every jail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BanPolicy {
    pub bantime: u64,
    pub findtime: u64,
    pub maxretry: u32,
}

impl BanPolicy {
    pub const STANDARD: BanPolicy = BanPolicy {
        bantime: 3600,
        findtime: 600,
        maxretry: 5,
    };

    pub const AGGRESSIVE: BanPolicy = BanPolicy {
        bantime: 86400,
        findtime: 3600,
        maxretry: 3,
    };

    pub fn for_config(config: &DeploymentConfig) -> Self {
        if config.fail2ban_aggressive {
            Self::AGGRESSIVE
        } else {
            Self::STANDARD
        }
    }
}

/// Render `jail.local`
pub fn render(config: &DeploymentConfig) -> String {
    let policy = BanPolicy::for_config(config);
    let domain = &config.server_names()[0];

    let mut ignore = vec!["127.0.0.1/8".to_string(), "::1".to_string()];
    ignore.extend(config.admin_ip_whitelist.iter().map(display_admin_ip));

    let banaction = if config.configure_firewall {
        "ufw"
    } else {
        "iptables-multiport"
    };

    let mut out = String::new();
    out.push_str("# Managed by escprov. Local changes are overwritten on the next run.\n");
    out.push_str(&format!(
        "# Policy: {}\n\n",
        if config.fail2ban_aggressive { "aggressive" } else { "standard" }
    ));

    out.push_str(&format!(
        "[DEFAULT]\n\
         bantime  = {}\n\
         findtime = {}\n\
         maxretry = {}\n\
         backend  = auto\n\
         ignoreip = {}\n\
         destemail = {}\n\
         sender   = fail2ban@{}\n\
         mta      = sendmail\n\
         banaction = {}\n\
         action   = %(action_mwl)s\n\n",
        policy.bantime,
        policy.findtime,
        policy.maxretry,
        ignore.join(" "),
        config.admin_email,
        domain,
        banaction
    ));

    let ssh_port = config.effective_ssh_port();
    out.push_str(&jail("sshd", "sshd", &ssh_port.to_string(), "/var/log/auth.log", policy.maxretry, None));

    if config.fail2ban_aggressive {
        out.push_str(&jail(
            "sshd-aggressive",
            "sshd[mode=aggressive]",
            &ssh_port.to_string(),
            "/var/log/auth.log",
            policy.maxretry.saturating_sub(1).max(1),
            None,
        ));
        out.push_str(&jail(
            "recidive",
            "recidive",
            "all",
            "/var/log/fail2ban.log",
            policy.maxretry,
            Some((604800, 86400)),
        ));
    }

    out.push_str(&jail(
        "nginx-http-auth",
        "nginx-http-auth",
        "http,https",
        "/var/log/nginx/error.log",
        policy.maxretry,
        None,
    ));
    out.push_str(&jail(
        "nginx-limit-req",
        "nginx-limit-req",
        "http,https",
        "/var/log/nginx/error.log",
        policy.maxretry * 2,
        None,
    ));
    out.push_str(&jail(
        "nginx-botsearch",
        "nginx-botsearch",
        "http,https",
        "/var/log/nginx/access.log",
        policy.maxretry,
        None,
    ));

    out
}

/// One jail section; `times` overrides (bantime, findtime)
fn jail(name: &str, filter: &str, port: &str, logpath: &str, maxretry: u32, times: Option<(u64, u64)>) -> String {
    let mut block = format!(
        "[{}]\nenabled  = true\nfilter   = {}\nport     = {}\nlogpath  = {}\nmaxretry = {}\n",
        name, filter, port, logpath, maxretry
    );
    if let Some((bantime, findtime)) = times {
        block.push_str(&format!("bantime  = {}\nfindtime = {}\n", bantime, findtime));
    }
    block.push('\n');
    block
}
