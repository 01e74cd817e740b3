//! Application environment file

use std::collections::HashSet;

use crate::config::kv;
use crate::config::DeploymentConfig;
use crate::render::placeholders;
use crate::storage::settings::Settings;

/// Keys recomputed from the config on every render; edits to them are
/// overwritten.
pub const DERIVED_KEYS: &[&str] = &[
    "ALLOWED_HOSTS",
    "CSRF_TRUSTED_ORIGINS",
    "SITE_DOMAIN",
    "SITE_URL",
    "SECURE_SSL_REDIRECT",
    "SESSION_COOKIE_SECURE",
    "CSRF_COOKIE_SECURE",
];

struct Section {
    title: &'static str,
    entries: Vec<(&'static str, String)>,
}

fn sections(config: &DeploymentConfig, settings: &Settings) -> Vec<Section> {
    let names = config.server_names();
    let apex = &names[0];
    let tls = config.ssl_mode.is_tls();
    let scheme = if tls { "https" } else { "http" };
    let py_bool = |b: bool| if b { "True" } else { "False" }.to_string();
    let admin_email = if config.admin_email.is_empty() {
        format!("admin@{}", apex)
    } else {
        config.admin_email.clone()
    };
    let service = &settings.service_name;

    vec![
        Section {
            title: "Core",
            entries: vec![
                ("DEBUG", "False".into()),
                ("SECRET_KEY", placeholders::SECRET_KEY.into()),
                (
                    "ALLOWED_HOSTS",
                    format!("{},localhost,127.0.0.1", names.join(",")),
                ),
                (
                    "CSRF_TRUSTED_ORIGINS",
                    names
                        .iter()
                        .map(|n| format!("{}://{}", scheme, n))
                        .collect::<Vec<_>>()
                        .join(","),
                ),
                ("DJANGO_SETTINGS_MODULE", "config.settings.production".into()),
                ("TIME_ZONE", "UTC".into()),
            ],
        },
        Section {
            title: "Database",
            entries: vec![
                ("DATABASE_URL", placeholders::DATABASE_URL.into()),
                ("DB_CONN_MAX_AGE", "60".into()),
            ],
        },
        Section {
            title: "Cache",
            entries: vec![
                ("REDIS_URL", "redis://redis:6379/0".into()),
                ("CELERY_BROKER_URL", "redis://redis:6379/1".into()),
                ("CACHE_TTL", "300".into()),
            ],
        },
        Section {
            title: "Site",
            entries: vec![
                ("SITE_NAME", settings.site_name.clone()),
                ("SITE_DOMAIN", apex.clone()),
                ("SITE_URL", format!("{}://{}", scheme, apex)),
                ("SECURE_SSL_REDIRECT", py_bool(tls)),
                ("SESSION_COOKIE_SECURE", py_bool(tls)),
                ("CSRF_COOKIE_SECURE", py_bool(tls)),
            ],
        },
        Section {
            title: "Email",
            entries: vec![
                ("EMAIL_BACKEND", "django.core.mail.backends.smtp.EmailBackend".into()),
                ("EMAIL_HOST", "smtp.gmail.com".into()),
                ("EMAIL_PORT", "587".into()),
                ("EMAIL_USE_TLS", "True".into()),
                ("EMAIL_HOST_USER", format!("noreply@{}", apex)),
                ("EMAIL_HOST_PASSWORD", placeholders::EMAIL_PASSWORD.into()),
                ("DEFAULT_FROM_EMAIL", format!("{} <noreply@{}>", settings.site_name, apex)),
            ],
        },
        Section {
            title: "Object storage",
            entries: vec![
                ("AWS_ACCESS_KEY_ID", String::new()),
                ("AWS_SECRET_ACCESS_KEY", String::new()),
                ("AWS_S3_REGION_NAME", "us-east-1".into()),
                ("AWS_S3_ENDPOINT_URL", String::new()),
                ("AWS_STATIC_BUCKET_NAME", format!("{}-static", service)),
                ("AWS_MEDIA_BUCKET_NAME", format!("{}-media", service)),
                ("AWS_PRIVATE_BUCKET_NAME", format!("{}-private", service)),
                ("AWS_S3_CUSTOM_DOMAIN", String::new()),
            ],
        },
        Section {
            title: "Payment gateway",
            entries: vec![
                ("STRIPE_PUBLIC_KEY", String::new()),
                ("STRIPE_SECRET_KEY", String::new()),
                ("STRIPE_WEBHOOK_SECRET", String::new()),
            ],
        },
        Section {
            title: "OAuth",
            entries: vec![
                ("GOOGLE_OAUTH_CLIENT_ID", String::new()),
                ("GOOGLE_OAUTH_CLIENT_SECRET", String::new()),
                ("GITHUB_OAUTH_CLIENT_ID", String::new()),
                ("GITHUB_OAUTH_CLIENT_SECRET", String::new()),
            ],
        },
        Section {
            title: "Geolocation",
            entries: vec![
                ("GEOIP_PATH", "/app/geoip".into()),
                ("MAXMIND_LICENSE_KEY", String::new()),
            ],
        },
        Section {
            title: "Captcha",
            entries: vec![
                ("RECAPTCHA_PUBLIC_KEY", String::new()),
                ("RECAPTCHA_PRIVATE_KEY", String::new()),
            ],
        },
        Section {
            title: "Monitoring",
            entries: vec![
                ("SENTRY_DSN", String::new()),
                ("SENTRY_ENVIRONMENT", "production".into()),
                ("SENTRY_TRACES_SAMPLE_RATE", "0.1".into()),
            ],
        },
        Section {
            title: "Admin",
            entries: vec![
                ("ADMIN_URL", "admin/".into()),
                ("ADMIN_EMAIL", admin_email),
            ],
        },
    ]
}

/// Render the environment file.
///
/// `carried` holds entries from the file being replaced: their non-empty
/// values win over template defaults except for [`DERIVED_KEYS`], and keys
/// the template does not know are kept in a trailing section.
pub fn render(config: &DeploymentConfig, settings: &Settings, carried: &[(String, String)]) -> String {
    let mut out = String::new();
    out.push_str("# Application environment, generated by escprov.\n");
    out.push_str(&format!("# Domain: {}\n", config.domain));
    out.push_str("# Edit values below; keys listed as derived are recomputed on every run.\n");

    let mut known: HashSet<&str> = HashSet::new();
    for section in sections(config, settings) {
        out.push_str(&format!("\n# ===== {} =====\n", section.title));
        for (key, default) in section.entries {
            known.insert(key);
            let value = if DERIVED_KEYS.contains(&key) {
                default
            } else {
                kv::get(carried, key)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .unwrap_or(default)
            };
            out.push_str(&format!("{}={}\n", key, kv::format_value(&value)));
        }
    }

    let mut custom: Vec<&(String, String)> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for entry in carried.iter().rev() {
        if !known.contains(entry.0.as_str()) && seen.insert(entry.0.as_str()) {
            custom.push(entry);
        }
    }
    custom.reverse();
    if !custom.is_empty() {
        out.push_str("\n# ===== Custom =====\n");
        for (key, value) in custom {
            out.push_str(&format!("{}={}\n", key, kv::format_value(value)));
        }
    }

    out
}
