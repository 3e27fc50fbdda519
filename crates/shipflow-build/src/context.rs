use crate::error::{BuildError, BuildResult};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::Path;
use tar::Builder;

/// ビルドコンテキストのサイズ警告の閾値
const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024; // 500MB

/// 記述子のディレクトリをビルドコンテキスト（tar.gz）にまとめる
///
/// ディレクトリには Dockerfile とアーティファクトが置かれている前提。
pub fn create_context(context_path: &Path) -> BuildResult<Vec<u8>> {
    if !context_path.is_dir() {
        return Err(BuildError::ContextNotFound(context_path.to_path_buf()));
    }

    tracing::debug!("Creating build context from: {}", context_path.display());

    let mut archive_data = Vec::new();
    {
        let encoder = GzEncoder::new(&mut archive_data, Compression::default());
        let mut tar = Builder::new(encoder);

        tar.append_dir_all(".", context_path)?;
        tar.into_inner()?.finish()?;
    }

    tracing::debug!("Build context created: {} bytes", archive_data.len());
    check_context_size(context_path, archive_data.len());

    Ok(archive_data)
}

fn check_context_size(context_path: &Path, size: usize) {
    if size > MAX_CONTEXT_SIZE {
        tracing::warn!(
            "警告: ビルドコンテキストが大きすぎます（{}MB）\n\
             アーティファクト以外のファイルが {} に置かれていないか確認してください。",
            size / 1024 / 1024,
            context_path.display()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_create_context() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("Dockerfile"), "FROM openjdk:8-jre").unwrap();
        fs::write(temp_dir.path().join("notifier-fat.jar"), "jar").unwrap();

        let archive = create_context(temp_dir.path()).unwrap();
        assert!(!archive.is_empty());

        // tarアーカイブとして展開できるか確認
        let extract_dir = tempdir().unwrap();
        let decoder = flate2::read::GzDecoder::new(std::io::Cursor::new(archive));
        let mut tar = tar::Archive::new(decoder);
        tar.unpack(extract_dir.path()).unwrap();

        assert!(extract_dir.path().join("Dockerfile").exists());
        assert_eq!(
            fs::read_to_string(extract_dir.path().join("notifier-fat.jar")).unwrap(),
            "jar"
        );
    }

    #[test]
    fn test_missing_context_dir() {
        let temp_dir = tempdir().unwrap();
        assert!(matches!(
            create_context(&temp_dir.path().join("docker")),
            Err(BuildError::ContextNotFound(_))
        ));
    }
}
