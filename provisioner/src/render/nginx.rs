//! Nginx site configuration

use std::path::PathBuf;

use crate::config::{DeploymentConfig, SslMode};
use crate::storage::layout::{
    letsencrypt_cert_path, letsencrypt_key_path, self_signed_cert_path, self_signed_key_path,
};
use crate::storage::settings::Settings;

/// Which site template applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NginxVariant {
    /// TLS with rate limiting
    Secured,
    /// TLS without rate limiting
    Ssl,
    /// Plain HTTP
    HttpOnly,
}

impl NginxVariant {
    pub fn for_config(config: &DeploymentConfig) -> Self {
        match (config.ssl_mode.is_tls(), config.security_enabled) {
            (true, true) => NginxVariant::Secured,
            (true, false) => NginxVariant::Ssl,
            (false, _) => NginxVariant::HttpOnly,
        }
    }
}

/// Certificate and key paths for the configured SSL mode
pub fn certificate_paths(config: &DeploymentConfig) -> Option<(PathBuf, PathBuf)> {
    let domain = &config.server_names()[0];
    match config.ssl_mode {
        SslMode::LetsEncrypt => Some((letsencrypt_cert_path(domain), letsencrypt_key_path(domain))),
        SslMode::SelfSigned => Some((self_signed_cert_path(domain), self_signed_key_path(domain))),
        SslMode::None => None,
    }
}

/// Render the site definition
pub fn render(config: &DeploymentConfig, settings: &Settings) -> String {
    let variant = NginxVariant::for_config(config);
    let server_names = config.server_names().join(" ");
    let upstream = format!("{}_app", settings.service_name);
    let app_dir = config.app_dir.display();
    let limits = &settings.rate_limits;

    let mut out = String::new();
    out.push_str("# Managed by escprov. Local changes are overwritten on the next run.\n\n");

    if variant == NginxVariant::Secured {
        out.push_str(&format!(
            "limit_req_zone $binary_remote_addr zone=general:10m rate={};\n\
             limit_req_zone $binary_remote_addr zone=api:10m rate={};\n\
             limit_req_zone $binary_remote_addr zone=auth:10m rate={};\n\
             limit_conn_zone $binary_remote_addr zone=conn_limit:10m;\n\
             limit_req_status {};\n\
             limit_conn_status {};\n\n",
            limits.general, limits.api, limits.auth, limits.status_code, limits.status_code
        ));
    }

    out.push_str(&format!(
        "upstream {} {{\n    server 127.0.0.1:{};\n    keepalive 32;\n}}\n\n",
        upstream, settings.app_port
    ));

    let (listen, tls_block) = match certificate_paths(config) {
        Some((cert, key)) => {
            out.push_str(&format!(
                "server {{\n\
                 \x20   listen 80;\n\
                 \x20   listen [::]:80;\n\
                 \x20   server_name {};\n\n\
                 \x20   location / {{\n\
                 \x20       return 301 https://$host$request_uri;\n\
                 \x20   }}\n\
                 }}\n\n",
                server_names
            ));
            (
                "    listen 443 ssl http2;\n    listen [::]:443 ssl http2;\n".to_string(),
                format!(
                    "    ssl_certificate {};\n\
                     \x20   ssl_certificate_key {};\n\
                     \x20   ssl_protocols TLSv1.2 TLSv1.3;\n\
                     \x20   ssl_prefer_server_ciphers off;\n\
                     \x20   ssl_session_cache shared:SSL:10m;\n\
                     \x20   ssl_session_timeout 1d;\n\
                     \x20   ssl_session_tickets off;\n\n\
                     \x20   add_header Strict-Transport-Security \"max-age=63072000; includeSubDomains\" always;\n",
                    cert.display(),
                    key.display()
                ),
            )
        }
        None => ("    listen 80;\n    listen [::]:80;\n".to_string(), String::new()),
    };

    out.push_str("server {\n");
    out.push_str(&listen);
    out.push_str(&format!("    server_name {};\n\n", server_names));
    out.push_str(&tls_block);
    out.push_str(
        "    add_header X-Frame-Options \"SAMEORIGIN\" always;\n\
         \x20   add_header X-Content-Type-Options \"nosniff\" always;\n\
         \x20   add_header Referrer-Policy \"strict-origin-when-cross-origin\" always;\n\
         \x20   server_tokens off;\n\n\
         \x20   client_max_body_size 20M;\n",
    );
    if variant == NginxVariant::Secured {
        out.push_str("    limit_conn conn_limit 20;\n");
    }
    out.push('\n');

    out.push_str(&format!(
        "    location /static/ {{\n\
         \x20       alias {}/staticfiles/;\n\
         \x20       expires 30d;\n\
         \x20       access_log off;\n\
         \x20   }}\n\n\
         \x20   location /media/ {{\n\
         \x20       alias {}/media/;\n\
         \x20       expires 7d;\n\
         \x20   }}\n\n",
        app_dir, app_dir
    ));

    if variant == NginxVariant::Secured {
        out.push_str(&location("/api/", Some("limit_req zone=api burst=20 nodelay;"), &upstream));
        out.push_str(&location(
            "~ ^/(accounts/login|admin/login|api/auth)/",
            Some("limit_req zone=auth burst=3 nodelay;"),
            &upstream,
        ));
        out.push_str(&location("/", Some("limit_req zone=general burst=20 nodelay;"), &upstream));
    } else {
        out.push_str(&location("/", None, &upstream));
    }

    out.push_str("}\n");
    out
}

fn location(path: &str, limit: Option<&str>, upstream: &str) -> String {
    let mut block = format!("    location {} {{\n", path);
    if let Some(limit) = limit {
        block.push_str(&format!("        {}\n", limit));
    }
    block.push_str(&format!(
        "        proxy_pass http://{};\n\
         \x20       proxy_http_version 1.1;\n\
         \x20       proxy_set_header Connection \"\";\n\
         \x20       proxy_set_header Host $host;\n\
         \x20       proxy_set_header X-Real-IP $remote_addr;\n\
         \x20       proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n\
         \x20       proxy_set_header X-Forwarded-Proto $scheme;\n\
         \x20       proxy_redirect off;\n\
         \x20       proxy_read_timeout 60s;\n\
         \x20   }}\n\n",
        upstream
    ));
    block
}
