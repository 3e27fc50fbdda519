//! バージョンとイメージタグの解決
//!
//! バージョンはソース管理の状態（ブランチとコミット）から決まり、
//! 同じコミットからは常に同じタグが得られます。

use crate::error::{BuildError, BuildResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// 短縮コミットハッシュの桁数
const ABBREV_LEN: usize = 7;
const DETACHED: &str = "detached";

/// ソース管理の状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceVersion {
    /// None は detached HEAD
    pub branch: Option<String>,
    pub commit: String,
    pub dirty: bool,
}

impl SourceVersion {
    /// タグに使えない文字を `-` に置き換えたブランチ名
    pub fn branch_id(&self) -> String {
        match &self.branch {
            Some(branch) => branch
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                        c
                    } else {
                        '-'
                    }
                })
                .collect(),
            None => DETACHED.to_string(),
        }
    }

    /// `<branch-id>-<短縮コミット>`
    pub fn full(&self) -> String {
        let commit: String = self.commit.chars().take(ABBREV_LEN).collect();
        format!("{}-{}", self.branch_id(), commit)
    }
}

/// リポジトリの状態からバージョン文字列を決める
#[derive(Debug, Clone)]
pub struct VersionResolver {
    repo_dir: PathBuf,
    explicit: Option<String>,
}

impl VersionResolver {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            explicit: None,
        }
    }

    /// 明示的なバージョンを指定（ソース管理より優先）
    pub fn with_explicit(mut self, version: Option<String>) -> Self {
        self.explicit = version.filter(|v| !v.trim().is_empty());
        self
    }

    pub fn resolve(&self) -> BuildResult<String> {
        if let Some(version) = &self.explicit {
            tracing::debug!(version = %version, "Using explicit version");
            return Ok(version.trim().to_string());
        }

        let source = self.source_version()?;
        if source.dirty {
            tracing::warn!(
                "Work tree has uncommitted changes; version {} refers to the last commit",
                source.full()
            );
        }
        Ok(source.full())
    }

    /// git からブランチ・コミット・変更の有無を読む
    pub fn source_version(&self) -> BuildResult<SourceVersion> {
        let commit = git(&self.repo_dir, &["rev-parse", "HEAD"])?;
        if commit.is_empty() {
            return Err(BuildError::Version(
                "git rev-parse HEAD returned empty output".to_string(),
            ));
        }

        // detached HEAD では失敗する
        let branch = git(&self.repo_dir, &["symbolic-ref", "--short", "-q", "HEAD"])
            .ok()
            .filter(|b| !b.is_empty());

        let dirty = !git(&self.repo_dir, &["status", "--porcelain"])?.is_empty();

        Ok(SourceVersion {
            branch,
            commit,
            dirty,
        })
    }
}

fn git(repo_dir: &Path, args: &[&str]) -> BuildResult<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .map_err(|e| BuildError::Version(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BuildError::Version(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// `<name>:<version>` 形式のイメージタグ
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageTag {
    name: String,
    version: String,
}

impl ImageTag {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> BuildResult<Self> {
        let name = name.into();
        let version = version.into();

        if name.trim().is_empty() {
            return Err(BuildError::InvalidTag {
                tag: "(empty image name)".to_string(),
            });
        }
        validate_tag(&version)?;

        Ok(Self { name, version })
    }

    /// タグを含まないイメージ名（レジストリ込み）
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl fmt::Display for ImageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// タグのバリデーション
fn validate_tag(tag: &str) -> BuildResult<()> {
    // Docker タグの制約:
    // - 128文字以下
    // - 英数字、ピリオド、ハイフン、アンダースコアのみ
    // - 先頭はピリオドまたはハイフンではない

    if tag.is_empty() {
        return Err(BuildError::InvalidTag {
            tag: "(empty)".to_string(),
        });
    }

    if tag.len() > 128 {
        return Err(BuildError::InvalidTag {
            tag: format!("Tag too long ({} characters, max 128)", tag.len()),
        });
    }

    if tag.starts_with('.') || tag.starts_with('-') {
        return Err(BuildError::InvalidTag {
            tag: tag.to_string(),
        });
    }

    for c in tag.chars() {
        if !c.is_ascii_alphanumeric() && c != '.' && c != '-' && c != '_' {
            return Err(BuildError::InvalidTag {
                tag: format!("Invalid character '{}' in tag: {}", c, tag),
            });
        }
    }

    Ok(())
}
