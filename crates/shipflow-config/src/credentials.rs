//! レジストリ認証情報の解決
//!
//! 解決順序は「環境変数 → プロジェクトプロパティ」。どちらにも値がなければ
//! プレースホルダー文字列を返さず、`ConfigError::MissingCredential` を返します。

use crate::error::{ConfigError, Result};
use crate::model::PipelineConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// 認証情報のフィールド
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialField {
    Url,
    Username,
    Password,
}

impl fmt::Display for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialField::Url => write!(f, "url"),
            CredentialField::Username => write!(f, "username"),
            CredentialField::Password => write!(f, "password"),
        }
    }
}

impl FromStr for CredentialField {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "url" => Ok(CredentialField::Url),
            "username" => Ok(CredentialField::Username),
            "password" => Ok(CredentialField::Password),
            other => Err(ConfigError::UnknownCredentialField(other.to_string())),
        }
    }
}

/// 1フィールド分の参照先（環境変数名とプロパティ名）
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CredentialSource {
    pub env: String,
    pub property: String,
}

impl CredentialSource {
    pub fn new(env: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            env: env.into(),
            property: property.into(),
        }
    }
}

/// `[credentials]` セクション
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CredentialNames {
    #[serde(default = "default_url_source")]
    pub url: CredentialSource,
    #[serde(default = "default_username_source")]
    pub username: CredentialSource,
    #[serde(default = "default_password_source")]
    pub password: CredentialSource,
}

impl Default for CredentialNames {
    fn default() -> Self {
        Self {
            url: default_url_source(),
            username: default_username_source(),
            password: default_password_source(),
        }
    }
}

fn default_url_source() -> CredentialSource {
    CredentialSource::new("DOCKER_REGISTRY_URL", "dockerRegistryUrl")
}

fn default_username_source() -> CredentialSource {
    CredentialSource::new("DOCKER_REGISTRY_USERNAME", "dockerRegistryUsername")
}

fn default_password_source() -> CredentialSource {
    CredentialSource::new("DOCKER_REGISTRY_PASSWORD", "dockerRegistryPassword")
}

impl CredentialNames {
    pub fn source(&self, field: CredentialField) -> &CredentialSource {
        match field {
            CredentialField::Url => &self.url,
            CredentialField::Username => &self.username,
            CredentialField::Password => &self.password,
        }
    }
}

/// 解決済みのレジストリ認証情報
///
/// 永続化しないこと。`Debug` ではパスワードを伏せる。
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub url: String,
    pub username: String,
    password: String,
}

impl RegistryCredentials {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// 環境変数とプロジェクトプロパティから認証情報を解決する
#[derive(Clone)]
pub struct CredentialResolver {
    names: CredentialNames,
    properties: BTreeMap<String, String>,
    env: EnvLookup,
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("names", &self.names)
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CredentialResolver {
    /// プロセス環境変数を参照するリゾルバを作成
    pub fn new(names: CredentialNames, properties: BTreeMap<String, String>) -> Self {
        Self {
            names,
            properties,
            env: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.credentials.clone(), config.properties.clone())
    }

    /// 環境変数の参照方法を差し替える
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    /// 1フィールドを解決
    ///
    /// 空文字列やリテラル `"null"` は未設定として扱う。
    pub fn resolve(&self, field: CredentialField) -> Result<String> {
        let source = self.names.source(field);

        if let Some(value) = (self.env)(&source.env).and_then(usable) {
            tracing::debug!(field = %field, env = %source.env, "Credential resolved from environment");
            return Ok(value);
        }

        if let Some(value) = self.properties.get(&source.property).cloned().and_then(usable) {
            tracing::debug!(field = %field, property = %source.property, "Credential resolved from property");
            return Ok(value);
        }

        Err(ConfigError::MissingCredential {
            field,
            env_var: source.env.clone(),
            property: source.property.clone(),
        })
    }

    /// url / username / password をまとめて解決
    pub fn resolve_all(&self) -> Result<RegistryCredentials> {
        Ok(RegistryCredentials {
            url: self.resolve(CredentialField::Url)?,
            username: self.resolve(CredentialField::Username)?,
            password: self.resolve(CredentialField::Password)?,
        })
    }
}

fn usable(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "null" {
        None
    } else {
        Some(value)
    }
}
