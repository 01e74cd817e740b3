//! Hardened SSH daemon configuration

use crate::config::model::display_admin_ip;
use crate::config::DeploymentConfig;

pub const CIPHERS: &[&str] = &[
    "chacha20-poly1305@openssh.com",
    "aes256-gcm@openssh.com",
    "aes128-gcm@openssh.com",
    "aes256-ctr",
    "aes192-ctr",
    "aes128-ctr",
];

pub const KEX_ALGORITHMS: &[&str] = &[
    "curve25519-sha256",
    "curve25519-sha256@libssh.org",
    "diffie-hellman-group16-sha512",
    "diffie-hellman-group18-sha512",
    "diffie-hellman-group-exchange-sha256",
];

pub const MACS: &[&str] = &[
    "hmac-sha2-512-etm@openssh.com",
    "hmac-sha2-256-etm@openssh.com",
    "umac-128-etm@openssh.com",
];

/// Render `sshd_config`.
///
/// No `Include /etc/ssh/sshd_config.d/*.conf`: sshd keeps the first value it
/// reads, so a cloud-init drop-in re-enabling password logins would win.
pub fn render(config: &DeploymentConfig) -> String {
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    let root_login = if config.disable_root_login {
        "no"
    } else {
        "prohibit-password"
    };

    let mut out = format!(
        "# Managed by escprov. Local changes are overwritten on the next run.\n\n\
         Port {}\n\
         AddressFamily any\n\
         Protocol 2\n\
         HostKey /etc/ssh/ssh_host_ed25519_key\n\
         HostKey /etc/ssh/ssh_host_rsa_key\n\n\
         # Authentication\n\
         PermitRootLogin {}\n\
         PasswordAuthentication {}\n\
         PubkeyAuthentication yes\n\
         AuthorizedKeysFile .ssh/authorized_keys\n\
         PermitEmptyPasswords no\n\
         KbdInteractiveAuthentication no\n\
         UsePAM yes\n\
         MaxAuthTries 3\n\
         MaxSessions 5\n\
         LoginGraceTime 30\n\n\
         # Session\n\
         X11Forwarding no\n\
         AllowAgentForwarding no\n\
         AllowTcpForwarding no\n\
         PermitTunnel no\n\
         ClientAliveInterval 300\n\
         ClientAliveCountMax 2\n\
         PrintMotd no\n\
         AcceptEnv LANG LC_*\n\n\
         # Logging\n\
         SyslogFacility AUTH\n\
         LogLevel VERBOSE\n\n\
         # Cryptography\n\
         Ciphers {}\n\
         KexAlgorithms {}\n\
         MACs {}\n\n\
         Subsystem sftp /usr/lib/openssh/sftp-server\n",
        config.ssh_port,
        root_login,
        yes_no(config.password_auth),
        CIPHERS.join(","),
        KEX_ALGORITHMS.join(","),
        MACS.join(",")
    );

    if !config.admin_ip_whitelist.is_empty() {
        let patterns: Vec<String> = config
            .admin_ip_whitelist
            .iter()
            .map(|net| format!("*@{}", display_admin_ip(net)))
            .collect();
        out.push_str("\n# Admin IP whitelist\n");
        out.push_str(&format!("AllowUsers {}\n", patterns.join(" ")));
    }

    out
}

/// Read the `Port` directive from an sshd config, 22 when absent
pub fn configured_port(text: &str) -> u16 {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.starts_with('#'))
        .find_map(|l| {
            let mut parts = l.split_whitespace();
            match parts.next() {
                Some(directive) if directive.eq_ignore_ascii_case("port") => {
                    parts.next().and_then(|p| p.parse::<u16>().ok())
                }
                _ => None,
            }
        })
        .unwrap_or(22)
}
