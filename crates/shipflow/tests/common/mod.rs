use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const CONFIG: &str = r#"
[project]
name = "notifier"

[artifact]
root = "classes"
main_class = "io.vertx.core.Launcher"

[artifact.manifest]
Main-Verticle = "io.weba.notifier.MainVerticle"

[docker]
base_image = "openjdk:8-jre"
image_name = "registry.weba.io/notifier"
maintainer = "Weba Team <dev@weba.io>"
default_java_opts = "-Xmx512m"
version = "1.4.0-7-gabc123"
"#;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    /// コンパイル済みクラスを1つ持つプロジェクト
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let classes = root.path().join("classes/io/weba/notifier");
        fs::create_dir_all(&classes).unwrap();
        fs::write(classes.join("MainVerticle.class"), "main").unwrap();
        Self { root }
    }

    pub fn write_config(&self, content: &str) -> PathBuf {
        let path = self.root.path().join("shipflow.toml");
        fs::write(&path, content).unwrap();
        path
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }
}
