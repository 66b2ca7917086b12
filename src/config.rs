#![forbid(unsafe_code)]

use anyhow::{Context, Result, anyhow, bail};
use chrono::Duration;
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_DATABASE_URL: &str = "./data";
pub const DEFAULT_DB_NAME: &str = "vidtube";
pub const DEFAULT_MEDIA_ROOT: &str = "./media";
pub const DEFAULT_TEMP_UPLOAD_DIR: &str = "./public/temp";
pub const DEFAULT_FFPROBE: &str = "ffprobe";
pub const DEFAULT_ACCESS_EXPIRY: &str = "1d";
pub const DEFAULT_REFRESH_EXPIRY: &str = "10d";
pub const DEFAULT_MAX_UPLOAD_MB: u64 = 512;

/// Credentials for the hosted media store. Only present when all three keys
/// are configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudinaryCredentials {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub access_secret: String,
    pub access_expiry: Duration,
    pub refresh_secret: String,
    pub refresh_expiry: Duration,
}

/// Process-wide configuration resolved once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub database_url: PathBuf,
    pub db_name: String,
    pub cors_origin: Option<String>,
    pub tokens: TokenSettings,
    pub cloudinary: Option<CloudinaryCredentials>,
    pub media_root: PathBuf,
    pub public_url: String,
    pub temp_upload_dir: PathBuf,
    pub ffprobe_path: PathBuf,
    pub max_upload_bytes: usize,
    pub production: bool,
}

impl Settings {
    /// Full path of the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        self.database_url.join(format!("{}.db", self.db_name))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database_url: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_settings(overrides: SettingsOverrides) -> Result<Settings> {
    let env_path = overrides
        .env_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(&env_path)?;
    build_settings_with_overrides(&file_vars, env_var_string, overrides)
}

#[cfg(test)]
fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<Settings> {
    build_settings_with_overrides(file_vars, env_lookup, SettingsOverrides::default())
}

fn build_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: SettingsOverrides,
) -> Result<Settings> {
    let lookup = |key: &str| lookup_value(key, file_vars, &env_lookup);

    let host = overrides
        .host
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| lookup("HOST"))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = overrides
        .port
        .or_else(|| lookup("PORT").and_then(|value| value.parse::<u16>().ok()))
        .unwrap_or(DEFAULT_PORT);
    let database_url = overrides
        .database_url
        .or_else(|| lookup("DATABASE_URL").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_URL));
    let db_name = lookup("DB_NAME").unwrap_or_else(|| DEFAULT_DB_NAME.to_string());
    if db_name.contains(['/', '\\']) || db_name.starts_with('.') {
        bail!("DB_NAME must be a plain file stem, got {db_name:?}");
    }

    let access_secret = lookup("ACCESS_TOKEN_SECRET")
        .ok_or_else(|| anyhow!("ACCESS_TOKEN_SECRET not set"))?;
    let refresh_secret = lookup("REFRESH_TOKEN_SECRET")
        .ok_or_else(|| anyhow!("REFRESH_TOKEN_SECRET not set"))?;
    let access_expiry = parse_expiry(
        &lookup("ACCESS_TOKEN_EXPIRY").unwrap_or_else(|| DEFAULT_ACCESS_EXPIRY.to_string()),
    )
    .context("parsing ACCESS_TOKEN_EXPIRY")?;
    let refresh_expiry = parse_expiry(
        &lookup("REFRESH_TOKEN_EXPIRY").unwrap_or_else(|| DEFAULT_REFRESH_EXPIRY.to_string()),
    )
    .context("parsing REFRESH_TOKEN_EXPIRY")?;

    let cloudinary = match (
        lookup("CLOUDINARY_CLOUD_NAME"),
        lookup("CLOUDINARY_API_KEY"),
        lookup("CLOUDINARY_API_SECRET"),
    ) {
        (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryCredentials {
            cloud_name,
            api_key,
            api_secret,
        }),
        _ => None,
    };

    let public_url = lookup("PUBLIC_URL")
        .map(|value| value.trim_end_matches('/').to_string())
        .unwrap_or_else(|| format!("http://{host}:{port}"));
    let max_upload_mb = lookup("MAX_UPLOAD_MB")
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_UPLOAD_MB);
    let production = lookup("APP_ENV")
        .map(|value| value.eq_ignore_ascii_case("production"))
        .unwrap_or(false);

    Ok(Settings {
        host,
        port,
        database_url,
        db_name,
        cors_origin: lookup("CORS_ORIGIN"),
        tokens: TokenSettings {
            access_secret,
            access_expiry,
            refresh_secret,
            refresh_expiry,
        },
        cloudinary,
        media_root: lookup("MEDIA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MEDIA_ROOT)),
        public_url,
        temp_upload_dir: lookup("TEMP_UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMP_UPLOAD_DIR)),
        ffprobe_path: lookup("FFPROBE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FFPROBE)),
        max_upload_bytes: usize::try_from(max_upload_mb * 1024 * 1024).unwrap_or(usize::MAX),
        production,
    })
}

/// Parses expiry strings in the `<n>[s|m|h|d]` shape. A bare number is read
/// as seconds.
pub fn parse_expiry(value: &str) -> Result<Duration> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("empty duration");
    }
    let (digits, unit) = match trimmed.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&trimmed[..idx], Some(c)),
        _ => (trimmed, None),
    };
    let amount: i64 = digits
        .trim()
        .parse()
        .with_context(|| format!("invalid duration {trimmed:?}"))?;
    if amount <= 0 {
        bail!("duration must be positive, got {trimmed:?}");
    }
    let duration = match unit.map(|c| c.to_ascii_lowercase()) {
        None | Some('s') => Duration::try_seconds(amount),
        Some('m') => Duration::try_minutes(amount),
        Some('h') => Duration::try_hours(amount),
        Some('d') => Duration::try_days(amount),
        Some(other) => bail!("unknown duration unit {other:?} in {trimmed:?}"),
    };
    duration.ok_or_else(|| anyhow!("duration {trimmed:?} is out of range"))
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key)
        .or_else(|| file_vars.get(key).cloned())
        .filter(|value| !value.trim().is_empty())
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SECRETS: &str = "ACCESS_TOKEN_SECRET=\"access-secret-access-secret-0001\"\nREFRESH_TOKEN_SECRET=\"refresh-secret-refresh-secret-01\"\n";

    fn make_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn settings_from(contents: &str) -> Settings {
        let cfg = make_config(&format!("{SECRETS}{contents}"));
        let vars = read_env_file(cfg.path()).unwrap();
        build_settings(&vars, |_| None).unwrap()
    }

    #[test]
    fn defaults_apply_when_only_secrets_are_set() {
        let settings = settings_from("");
        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.host, DEFAULT_HOST);
        assert_eq!(
            settings.database_path(),
            PathBuf::from("./data/vidtube.db")
        );
        assert_eq!(settings.tokens.access_expiry, Duration::days(1));
        assert_eq!(settings.tokens.refresh_expiry, Duration::days(10));
        assert_eq!(settings.public_url, "http://127.0.0.1:8000");
        assert!(settings.cloudinary.is_none());
        assert!(settings.cors_origin.is_none());
        assert!(!settings.production);
    }

    #[test]
    fn missing_secrets_fail() {
        let vars = read_env_file(make_config("PORT=9000\n").path()).unwrap();
        let err = build_settings(&vars, |_| None).unwrap_err();
        assert!(err.to_string().contains("ACCESS_TOKEN_SECRET"));
    }

    #[test]
    fn reads_port_database_and_cors() {
        let settings = settings_from(
            "PORT=\"4242\"\nDATABASE_URL=\"/srv/db\"\nDB_NAME=\"tube\"\nCORS_ORIGIN=\"http://localhost:5173\"\n",
        );
        assert_eq!(settings.port, 4242);
        assert_eq!(settings.database_path(), PathBuf::from("/srv/db/tube.db"));
        assert_eq!(
            settings.cors_origin.as_deref(),
            Some("http://localhost:5173")
        );
    }

    #[test]
    fn cloudinary_requires_all_three_keys() {
        let partial = settings_from("CLOUDINARY_CLOUD_NAME=demo\nCLOUDINARY_API_KEY=key\n");
        assert!(partial.cloudinary.is_none());

        let full = settings_from(
            "CLOUDINARY_CLOUD_NAME=demo\nCLOUDINARY_API_KEY=key\nCLOUDINARY_API_SECRET=shh\n",
        );
        assert_eq!(
            full.cloudinary,
            Some(CloudinaryCredentials {
                cloud_name: "demo".into(),
                api_key: "key".into(),
                api_secret: "shh".into(),
            })
        );
    }

    #[test]
    fn env_wins_over_file_and_overrides_win_over_env() {
        let vars = read_env_file(make_config(&format!("{SECRETS}PORT=7000\nHOST=file-host\n")).path())
            .unwrap();
        let from_env = build_settings(&vars, |key| {
            if key == "PORT" {
                Some("8001".to_string())
            } else {
                None
            }
        })
        .unwrap();
        assert_eq!(from_env.port, 8001);
        assert_eq!(from_env.host, "file-host");

        let overridden = build_settings_with_overrides(
            &vars,
            |key| {
                if key == "PORT" {
                    Some("8001".to_string())
                } else {
                    None
                }
            },
            SettingsOverrides {
                port: Some(9000),
                host: Some("0.0.0.0".into()),
                database_url: Some(PathBuf::from("/override")),
                env_path: None,
            },
        )
        .unwrap();
        assert_eq!(overridden.port, 9000);
        assert_eq!(overridden.host, "0.0.0.0");
        assert_eq!(overridden.database_url, PathBuf::from("/override"));
    }

    #[test]
    fn blank_host_override_falls_back() {
        let vars = read_env_file(make_config(SECRETS).path()).unwrap();
        let settings = build_settings_with_overrides(
            &vars,
            |_| None,
            SettingsOverrides {
                host: Some("   ".into()),
                ..SettingsOverrides::default()
            },
        )
        .unwrap();
        assert_eq!(settings.host, DEFAULT_HOST);
    }

    #[test]
    fn invalid_port_and_upload_cap_default() {
        let settings = settings_from("PORT=\"nope\"\nMAX_UPLOAD_MB=0\n");
        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(
            settings.max_upload_bytes as u64,
            DEFAULT_MAX_UPLOAD_MB * 1024 * 1024
        );
    }

    #[test]
    fn production_flag_and_public_url() {
        let settings = settings_from("APP_ENV=Production\nPUBLIC_URL=https://cdn.example/\n");
        assert!(settings.production);
        assert_eq!(settings.public_url, "https://cdn.example");
    }

    #[test]
    fn rejects_db_name_with_path_separators() {
        let vars =
            read_env_file(make_config(&format!("{SECRETS}DB_NAME=../escape\n")).path()).unwrap();
        assert!(build_settings(&vars, |_| None).is_err());
    }

    #[test]
    fn parse_expiry_units() {
        assert_eq!(parse_expiry("15m").unwrap(), Duration::minutes(15));
        assert_eq!(parse_expiry("2h").unwrap(), Duration::hours(2));
        assert_eq!(parse_expiry("10d").unwrap(), Duration::days(10));
        assert_eq!(parse_expiry("90").unwrap(), Duration::seconds(90));
        assert_eq!(parse_expiry("30S").unwrap(), Duration::seconds(30));
        assert!(parse_expiry("").is_err());
        assert!(parse_expiry("0d").is_err());
        assert!(parse_expiry("5w").is_err());
        assert!(parse_expiry("abc").is_err());
    }

    #[test]
    fn parse_expiry_rejects_out_of_range_amounts() {
        let err = parse_expiry("999999999999d").unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(parse_expiry("9223372036854775807s").is_err());
        assert_eq!(parse_expiry("36500d").unwrap(), Duration::days(36500));
    }

    #[test]
    fn read_env_file_handles_export_and_quotes() {
        let cfg = make_config(
            r#"
            export DATABASE_URL="/db"
            MEDIA_ROOT='/media'
            HOST =  "0.0.0.0"
            PORT=9090
            # comment
            INVALID_LINE
            "#,
        );
        let vars = read_env_file(cfg.path()).unwrap();
        assert_eq!(vars.get("DATABASE_URL").unwrap(), "/db");
        assert_eq!(vars.get("MEDIA_ROOT").unwrap(), "/media");
        assert_eq!(vars.get("HOST").unwrap(), "0.0.0.0");
        assert_eq!(vars.get("PORT").unwrap(), "9090");
        assert!(!vars.contains_key("INVALID_LINE"));
    }

    #[test]
    fn read_env_file_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = read_env_file(&dir.path().join("missing.env")).unwrap();
        assert!(vars.is_empty());
    }
}
