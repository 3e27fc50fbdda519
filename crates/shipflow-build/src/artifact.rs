//! 実行可能アーティファクトの組み立て
//!
//! ルートのコンパイル済みコードと全依存を1つのアーカイブにまとめます。
//! 同じパスのサービス登録ファイルは上書きせず行単位で連結し、
//! エントリ数・サイズに関係なく常に ZIP64 で書き出します。

use crate::error::{BuildError, BuildResult};
use shipflow_config::PipelineConfig;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
const SERVICES_PREFIX: &str = "META-INF/services/";
/// マニフェスト1行の最大バイト数（改行を除く）
const MANIFEST_LINE_LIMIT: usize = 72;

/// 組み立て済みのアーティファクト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    /// "fat" などの分類子
    pub classifier: String,
    /// マージ元（ルート + 依存）
    pub sources: Vec<PathBuf>,
    /// 起動コマンドが呼び出すエントリポイント
    pub entry_point: Option<String>,
    pub entry_count: usize,
}

/// エントリの扱い
#[derive(Debug, PartialEq, Eq)]
enum EntryKind {
    Regular,
    Service,
    Skip,
}

/// アーティファクトを組み立てる
#[derive(Debug, Clone)]
pub struct ArtifactAssembler {
    root: PathBuf,
    dependencies: Vec<PathBuf>,
    output: PathBuf,
    classifier: String,
    main_class: Option<String>,
    manifest: BTreeMap<String, String>,
    service_files: Vec<String>,
}

impl ArtifactAssembler {
    pub fn new(root: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dependencies: Vec::new(),
            output: output.into(),
            classifier: "fat".to_string(),
            main_class: None,
            manifest: BTreeMap::new(),
            service_files: Vec::new(),
        }
    }

    /// 設定から作成（出力先は build/libs/<name>-<classifier>.jar）
    pub fn from_config(config: &PipelineConfig) -> Self {
        let mut assembler = Self::new(
            config.artifact_root(),
            config.libs_dir().join(config.artifact_file_name()),
        )
        .with_dependencies(config.artifact_dependencies())
        .with_classifier(config.artifact.classifier.clone())
        .with_service_files(config.artifact.service_files.clone());

        if let Some(main_class) = &config.artifact.main_class {
            assembler = assembler.with_main_class(main_class.clone());
        }
        for (key, value) in &config.artifact.manifest {
            assembler = assembler.with_manifest_attribute(key.clone(), value.clone());
        }
        assembler
    }

    pub fn with_dependencies(mut self, dependencies: Vec<PathBuf>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = classifier.into();
        self
    }

    pub fn with_main_class(mut self, main_class: impl Into<String>) -> Self {
        self.main_class = Some(main_class.into());
        self
    }

    pub fn with_manifest_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.manifest.insert(key.into(), value.into());
        self
    }

    /// マージ対象のサービス登録ファイルを限定する（空なら全て）
    pub fn with_service_files(mut self, service_files: Vec<String>) -> Self {
        self.service_files = service_files;
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn entry_point(&self) -> Option<&str> {
        self.main_class.as_deref()
    }

    /// 出力の内容を左右する設定を1行1項目で並べたもの
    pub fn settings_fingerprint(&self) -> String {
        let mut lines = vec![
            format!("output={}", self.output.display()),
            format!("classifier={}", self.classifier),
            format!("main_class={}", self.main_class.as_deref().unwrap_or("")),
        ];
        for (key, value) in &self.manifest {
            lines.push(format!("manifest.{}={}", key, value));
        }
        for service in &self.service_files {
            lines.push(format!("service={}", service));
        }
        for source in self.inputs() {
            lines.push(format!("source={}", source.display()));
        }
        lines.join("\n")
    }

    /// マージ元（ルート + 依存、宣言順）
    pub fn inputs(&self) -> Vec<PathBuf> {
        std::iter::once(self.root.clone())
            .chain(self.dependencies.iter().cloned())
            .collect()
    }

    /// アーティファクトを組み立てる
    ///
    /// 一時ファイルに書いてから rename するので、失敗時に中途半端な
    /// アーティファクトは残らない。
    pub fn assemble(&self) -> BuildResult<Artifact> {
        let sources = self.inputs();
        for source in &sources {
            if !source.exists() {
                return Err(BuildError::DependencyNotFound(source.clone()));
            }
        }

        if let Some(parent) = self.output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file_name = self
            .output
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "artifact.jar".to_string());
        let staging = self.output.with_file_name(format!("{}.tmp", file_name));

        tracing::info!(
            "Assembling {} from {} source(s)",
            self.output.display(),
            sources.len()
        );

        let entry_count = match self.write_archive(&staging, &sources) {
            Ok(count) => count,
            Err(e) => {
                std::fs::remove_file(&staging).ok();
                return Err(e);
            }
        };
        std::fs::rename(&staging, &self.output)?;

        tracing::info!(
            entries = entry_count,
            "Artifact assembled: {}",
            self.output.display()
        );

        Ok(Artifact {
            path: self.output.clone(),
            classifier: self.classifier.clone(),
            sources,
            entry_point: self.main_class.clone(),
            entry_count,
        })
    }

    fn write_archive(&self, staging: &Path, sources: &[PathBuf]) -> BuildResult<usize> {
        let mut zip = ZipWriter::new(File::create(staging)?);

        zip.start_file(MANIFEST_PATH, entry_options())?;
        zip.write_all(self.render_manifest().as_bytes())?;
        let mut written = 1;

        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(MANIFEST_PATH.to_string());
        let mut services: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for source in sources {
            written += if source.is_dir() {
                self.add_directory(&mut zip, source, &mut seen, &mut services)?
            } else {
                self.add_archive(&mut zip, source, &mut seen, &mut services)?
            };
        }

        for (path, lines) in &services {
            tracing::debug!(path = %path, providers = lines.len(), "Writing merged service file");
            zip.start_file(path.as_str(), entry_options())?;
            let mut content = lines.join("\n");
            content.push('\n');
            zip.write_all(content.as_bytes())?;
            written += 1;
        }

        zip.finish()?;
        Ok(written)
    }

    fn add_directory(
        &self,
        zip: &mut ZipWriter<File>,
        dir: &Path,
        seen: &mut HashSet<String>,
        services: &mut BTreeMap<String, Vec<String>>,
    ) -> BuildResult<usize> {
        let pattern = format!("{}/**/*", glob::Pattern::escape(&dir.to_string_lossy()));
        let entries = glob::glob(&pattern).map_err(|e| BuildError::CorruptDependency {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut written = 0;
        for entry in entries {
            let path = entry.map_err(|e| BuildError::CorruptDependency {
                path: dir.to_path_buf(),
                message: e.to_string(),
            })?;
            if !path.is_file() {
                continue;
            }

            let name = entry_name(dir, &path);
            let content = std::fs::read(&path).map_err(|e| BuildError::CorruptDependency {
                path: path.clone(),
                message: e.to_string(),
            })?;

            if self.write_entry(zip, &name, content, seen, services)? {
                written += 1;
            }
        }

        Ok(written)
    }

    fn add_archive(
        &self,
        zip: &mut ZipWriter<File>,
        archive_path: &Path,
        seen: &mut HashSet<String>,
        services: &mut BTreeMap<String, Vec<String>>,
    ) -> BuildResult<usize> {
        let corrupt = |message: String| BuildError::CorruptDependency {
            path: archive_path.to_path_buf(),
            message,
        };

        let mut archive =
            ZipArchive::new(File::open(archive_path)?).map_err(|e| corrupt(e.to_string()))?;

        let mut written = 0;
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| corrupt(e.to_string()))?;
            if entry.is_dir() {
                continue;
            }

            let name = entry.name().to_string();
            // 壊れたエントリで書きかけにならないよう先に全部読む
            let mut content = Vec::new();
            entry
                .read_to_end(&mut content)
                .map_err(|e| corrupt(format!("{}: {}", name, e)))?;

            if self.write_entry(zip, &name, content, seen, services)? {
                written += 1;
            }
        }

        Ok(written)
    }

    /// エントリを書き込む。サービス登録ファイルは後でまとめて書くので溜めておく
    fn write_entry(
        &self,
        zip: &mut ZipWriter<File>,
        name: &str,
        content: Vec<u8>,
        seen: &mut HashSet<String>,
        services: &mut BTreeMap<String, Vec<String>>,
    ) -> BuildResult<bool> {
        match self.classify(name) {
            EntryKind::Skip => Ok(false),
            EntryKind::Service => {
                merge_service_lines(services, name, &String::from_utf8_lossy(&content));
                Ok(false)
            }
            EntryKind::Regular => {
                if !seen.insert(name.to_string()) {
                    tracing::debug!("Duplicate entry ignored: {}", name);
                    return Ok(false);
                }
                zip.start_file(name, entry_options())?;
                zip.write_all(&content)?;
                Ok(true)
            }
        }
    }

    fn classify(&self, name: &str) -> EntryKind {
        if name.eq_ignore_ascii_case(MANIFEST_PATH) || is_signature_file(name) {
            return EntryKind::Skip;
        }

        if name.starts_with(SERVICES_PREFIX)
            && name.len() > SERVICES_PREFIX.len()
            && (self.service_files.is_empty() || self.service_files.iter().any(|s| s == name))
        {
            return EntryKind::Service;
        }

        EntryKind::Regular
    }

    /// JAR マニフェスト（72バイトで折り返し、CRLF 区切り）
    fn render_manifest(&self) -> String {
        let mut attributes: Vec<(&str, &str)> = vec![("Manifest-Version", "1.0")];
        if let Some(main_class) = &self.main_class {
            attributes.push(("Main-Class", main_class));
        }
        for (key, value) in &self.manifest {
            if key == "Manifest-Version" || key == "Main-Class" {
                continue;
            }
            attributes.push((key, value));
        }

        let mut manifest = String::new();
        for (key, value) in attributes {
            manifest.push_str(&wrap_manifest_line(&format!("{}: {}", key, value)));
        }
        manifest.push_str("\r\n");
        manifest
    }
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .large_file(true)
}

/// ディレクトリ基準の相対パスを `/` 区切りのエントリ名にする
fn entry_name(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// META-INF 直下の署名ファイル（マージ後は無効になる）
fn is_signature_file(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("META-INF/") else {
        return false;
    };
    if rest.contains('/') {
        return false;
    }
    let upper = rest.to_ascii_uppercase();
    upper.ends_with(".SF") || upper.ends_with(".DSA") || upper.ends_with(".RSA")
}

/// 行単位で連結（空行・コメントは除外、重複は最初の1つのみ）
fn merge_service_lines(services: &mut BTreeMap<String, Vec<String>>, name: &str, content: &str) {
    let lines = services.entry(name.to_string()).or_default();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !lines.iter().any(|existing| existing == line) {
            lines.push(line.to_string());
        }
    }
}

fn wrap_manifest_line(line: &str) -> String {
    let mut out = String::new();
    let mut current = String::new();
    let mut limit = MANIFEST_LINE_LIMIT;

    for ch in line.chars() {
        if current.len() + ch.len_utf8() > limit {
            out.push_str(&current);
            out.push_str("\r\n ");
            current.clear();
            // 継続行は先頭の空白1バイト分短い
            limit = MANIFEST_LINE_LIMIT - 1;
        }
        current.push(ch);
    }
    out.push_str(&current);
    out.push_str("\r\n");
    out
}
