use std::path::PathBuf;

use thiserror::Error;

use crate::constants;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Environment variable {0} is required")]
    Missing(&'static str),
    #[error("{name} must be one of {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeSettings {
    Recaptcha {
        site_key: String,
        secret_key: String,
        verify_url: String,
    },
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveBackend {
    Http { endpoint: String, token: Option<String> },
    Fs { root: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSettings {
    pub bucket: String,
    pub backend: ArchiveBackend,
}

/// Everything the server needs, gathered from the hosting environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_key: String,
    pub chat_endpoint: String,
    pub model: String,
    pub challenge: ChallengeSettings,
    /// `None` when no bucket is configured; submissions are then not archived.
    pub archive: Option<ArchiveSettings>,
    pub templates_dir: PathBuf,
    pub static_dir: PathBuf,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let api_key = require("API_KEY")?;

        let challenge = match get("CHALLENGE_MODE").as_deref().unwrap_or("recaptcha") {
            "recaptcha" => ChallengeSettings::Recaptcha {
                site_key: require("RECAPTCHA_SITE_KEY")?,
                secret_key: require("RECAPTCHA_SECRET_KEY")?,
                verify_url: get("RECAPTCHA_VERIFY_URL").unwrap_or_else(|| constants::RECAPTCHA_VERIFY_URL.clone()),
            },
            "image" => ChallengeSettings::Image,
            other => {
                return Err(ConfigError::Invalid {
                    name: "CHALLENGE_MODE",
                    value: other.to_string(),
                    expected: "recaptcha, image",
                })
            }
        };

        let archive = match get("BUCKET_NAME") {
            None => None,
            Some(bucket) => {
                let backend = match get("ARCHIVE_BACKEND").as_deref().unwrap_or("http") {
                    "http" => ArchiveBackend::Http {
                        endpoint: require("OBJECT_STORE_URL")?,
                        token: get("OBJECT_STORE_TOKEN"),
                    },
                    "fs" => ArchiveBackend::Fs {
                        root: PathBuf::from(get("ARCHIVE_DIR").unwrap_or_else(|| constants::ARCHIVE_DIR.clone())),
                    },
                    other => {
                        return Err(ConfigError::Invalid {
                            name: "ARCHIVE_BACKEND",
                            value: other.to_string(),
                            expected: "http, fs",
                        })
                    }
                };
                Some(ArchiveSettings { bucket, backend })
            }
        };

        Ok(Self {
            api_key,
            chat_endpoint: get("CHAT_COMPLETIONS_URL").unwrap_or_else(|| constants::CHAT_COMPLETIONS_URL.clone()),
            model: get("CHAT_MODEL").unwrap_or_else(|| constants::CHAT_MODEL.clone()),
            challenge,
            archive,
            templates_dir: PathBuf::from(constants::TEMPLATES_DIR.as_str()),
            static_dir: PathBuf::from(constants::STATIC_DIR.as_str()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_recaptcha_defaults() {
        let settings = Settings::from_lookup(lookup(&[
            ("API_KEY", "sk-test"),
            ("RECAPTCHA_SITE_KEY", "site"),
            ("RECAPTCHA_SECRET_KEY", "secret"),
        ]))
        .unwrap();
        assert_eq!(settings.api_key, "sk-test");
        assert!(matches!(
            settings.challenge,
            ChallengeSettings::Recaptcha { ref site_key, .. } if site_key == "site"
        ));
        assert!(settings.archive.is_none());
    }

    #[test]
    fn test_api_key_required() {
        assert_eq!(
            Settings::from_lookup(lookup(&[("CHALLENGE_MODE", "image")])),
            Err(ConfigError::Missing("API_KEY"))
        );
        assert_eq!(
            Settings::from_lookup(lookup(&[("API_KEY", "  "), ("CHALLENGE_MODE", "image")])),
            Err(ConfigError::Missing("API_KEY"))
        );
    }

    #[test]
    fn test_recaptcha_keys_required() {
        assert_eq!(
            Settings::from_lookup(lookup(&[("API_KEY", "k"), ("RECAPTCHA_SITE_KEY", "site")])),
            Err(ConfigError::Missing("RECAPTCHA_SECRET_KEY"))
        );
    }

    #[test]
    fn test_image_mode_with_fs_archive() {
        let settings = Settings::from_lookup(lookup(&[
            ("API_KEY", "k"),
            ("CHALLENGE_MODE", "image"),
            ("BUCKET_NAME", "profiles"),
            ("ARCHIVE_BACKEND", "fs"),
            ("ARCHIVE_DIR", "/tmp/finadvisor"),
            ("CHAT_MODEL", "gpt-4o"),
        ]))
        .unwrap();
        assert_eq!(settings.challenge, ChallengeSettings::Image);
        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(
            settings.archive,
            Some(ArchiveSettings {
                bucket: "profiles".to_string(),
                backend: ArchiveBackend::Fs {
                    root: PathBuf::from("/tmp/finadvisor")
                },
            })
        );
    }

    #[test]
    fn test_http_archive_needs_endpoint() {
        assert_eq!(
            Settings::from_lookup(lookup(&[
                ("API_KEY", "k"),
                ("CHALLENGE_MODE", "image"),
                ("BUCKET_NAME", "profiles"),
            ])),
            Err(ConfigError::Missing("OBJECT_STORE_URL"))
        );
    }

    #[test]
    fn test_unknown_modes() {
        assert!(matches!(
            Settings::from_lookup(lookup(&[("API_KEY", "k"), ("CHALLENGE_MODE", "hcaptcha")])),
            Err(ConfigError::Invalid { name: "CHALLENGE_MODE", .. })
        ));
        assert!(matches!(
            Settings::from_lookup(lookup(&[
                ("API_KEY", "k"),
                ("CHALLENGE_MODE", "image"),
                ("BUCKET_NAME", "b"),
                ("ARCHIVE_BACKEND", "ftp"),
            ])),
            Err(ConfigError::Invalid { name: "ARCHIVE_BACKEND", .. })
        ));
    }
}
