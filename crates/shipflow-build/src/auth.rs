//! レジストリ認証処理
//!
//! 解決済みの認証情報を Bollard の DockerCredentials に変換します。

use base64::Engine;
use bollard::auth::DockerCredentials;
use shipflow_config::RegistryCredentials;

/// 認証情報を Docker API の形式に変換
///
/// serveraddress には解決したレジストリ URL をそのまま使う。
pub fn docker_credentials(credentials: &RegistryCredentials) -> DockerCredentials {
    let auth = base64::engine::general_purpose::STANDARD.encode(format!(
        "{}:{}",
        credentials.username,
        credentials.password()
    ));

    DockerCredentials {
        username: Some(credentials.username.clone()),
        password: Some(credentials.password().to_string()),
        auth: Some(auth),
        serveraddress: Some(credentials.url.clone()),
        ..Default::default()
    }
}

/// イメージ名からレジストリを抽出
///
/// # Examples
/// - `ghcr.io/org/app:tag` -> `ghcr.io`
/// - `myuser/app:tag` -> `docker.io`
/// - `localhost:5000/app` -> `localhost:5000`
pub fn extract_registry(image: &str) -> String {
    let parts: Vec<&str> = image.split('/').collect();

    if parts.len() >= 2 {
        let first = parts[0];

        // `.` か `:` を含む先頭要素はレジストリ（例: ghcr.io, localhost:5000）
        if first.contains('.') || first.contains(':') {
            return first.to_string();
        }
    }

    // デフォルトは Docker Hub
    "docker.io".to_string()
}

/// レジストリ URL をホスト部分だけに正規化
///
/// `https://registry.example.com/v2/` -> `registry.example.com`
pub fn registry_host(url: &str) -> String {
    let without_scheme = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);
    without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .to_ascii_lowercase()
}

/// イメージ名が指すレジストリと認証先の URL が一致するか
pub fn registry_matches(image: &str, url: &str) -> bool {
    let host = registry_host(url);
    let registry = extract_registry(image);
    host == registry
        || (registry == "docker.io"
            && matches!(
                host.as_str(),
                "index.docker.io" | "registry-1.docker.io" | "registry.hub.docker.com"
            ))
}
