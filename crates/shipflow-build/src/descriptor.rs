//! イメージ記述子（Dockerfile）の生成
//!
//! 同じ設定からは常にバイト単位で同じ内容を生成します。

use crate::error::{BuildError, BuildResult};
use serde::Serialize;
use shipflow_config::PipelineConfig;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tera::{Context, Tera};

const TEMPLATE: &str = r#"FROM {{ base_image }}
COPY {{ source }} {{ destination }}
{% for env in environment -%}
ENV {{ env.name }}={{ env.value }}
{% endfor -%}
ENTRYPOINT {{ entrypoint }}
CMD {{ command }}
{% for port in exposed_ports -%}
EXPOSE {{ port }}
{% endfor -%}
{% for label in labels -%}
LABEL {{ label.name }}={{ label.value }}
{% endfor -%}
"#;

pub const DEFAULT_OPTS_VAR: &str = "DEFAULT_JAVA_OPTS";
pub const OVERRIDE_OPTS_VAR: &str = "JAVA_OPTS";

/// アーティファクトのコピー元とイメージ内の配置先
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyInstruction {
    pub source: String,
    pub destination: String,
}

/// コンテナイメージの宣言的な記述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub base_image: String,
    pub copy: CopyInstruction,
    /// 宣言順を保つ
    pub environment: Vec<(String, String)>,
    pub entrypoint: Vec<String>,
    pub command: String,
    pub exposed_ports: Vec<u16>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct Pair {
    name: String,
    value: String,
}

impl ImageDescriptor {
    /// 設定とアーティファクトの配置から記述子を組み立てる
    ///
    /// `debug` が true ならリモートデバッグ用のエージェントを有効にし、
    /// デバッグポートも公開する。
    pub fn from_config(config: &PipelineConfig, debug: bool) -> BuildResult<Self> {
        let docker = &config.docker;
        let base_image = required(&docker.base_image, "docker.base_image")?;
        let maintainer = required(&docker.maintainer, "docker.maintainer")?;

        let mut default_opts = docker.default_java_opts.trim().to_string();
        let mut exposed_ports = vec![docker.port];
        if debug {
            let agent = format!(
                "-agentlib:jdwp=transport=dt_socket,server=y,suspend=n,address={}",
                docker.debug_port
            );
            if !default_opts.is_empty() {
                default_opts.push(' ');
            }
            default_opts.push_str(&agent);
            if docker.debug_port != docker.port {
                exposed_ports.push(docker.debug_port);
            }
        }

        let mut labels = BTreeMap::new();
        labels.insert("maintainer".to_string(), maintainer);

        Ok(Self {
            base_image,
            copy: CopyInstruction {
                source: config.artifact_file_name(),
                destination: docker.app_path.clone(),
            },
            environment: vec![
                (DEFAULT_OPTS_VAR.to_string(), default_opts),
                // 未定義の変数を参照しないよう、明示的に空で定義する
                (OVERRIDE_OPTS_VAR.to_string(), String::new()),
            ],
            entrypoint: vec!["sh".to_string(), "-c".to_string()],
            command: format!(
                "java ${} ${} -jar {}",
                DEFAULT_OPTS_VAR, OVERRIDE_OPTS_VAR, docker.app_path
            ),
            exposed_ports,
            labels,
        })
    }

    /// Dockerfile として描画
    pub fn render(&self) -> BuildResult<String> {
        let mut context = Context::new();
        context.insert("base_image", &self.base_image);
        context.insert("source", &self.copy.source);
        context.insert("destination", &self.copy.destination);
        context.insert(
            "environment",
            &self
                .environment
                .iter()
                .map(|(name, value)| Pair {
                    name: name.clone(),
                    value: quote(value),
                })
                .collect::<Vec<_>>(),
        );
        context.insert("entrypoint", &exec_form(&self.entrypoint));
        context.insert("command", &exec_form(std::slice::from_ref(&self.command)));
        context.insert("exposed_ports", &self.exposed_ports);
        context.insert(
            "labels",
            &self
                .labels
                .iter()
                .map(|(name, value)| Pair {
                    name: name.clone(),
                    value: quote(value),
                })
                .collect::<Vec<_>>(),
        );

        Tera::one_off(TEMPLATE, &context, false)
            .map_err(|e| BuildError::TemplateRender(e.to_string()))
    }
}

fn required(value: &Option<String>, key: &str) -> BuildResult<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(BuildError::MissingConfig(key.to_string())),
    }
}

/// JSON 文字列としてクォート（Dockerfile のダブルクォートと互換）
fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn exec_form(args: &[String]) -> String {
    let quoted: Vec<String> = args.iter().map(|a| quote(a)).collect();
    format!("[{}]", quoted.join(", "))
}

/// 記述子を固定パスに書き出す
pub struct ImageDescriptorGenerator {
    descriptor: ImageDescriptor,
    path: PathBuf,
}

impl ImageDescriptorGenerator {
    pub fn new(descriptor: ImageDescriptor, path: impl Into<PathBuf>) -> Self {
        Self {
            descriptor,
            path: path.into(),
        }
    }

    /// 既存のファイルが描画結果と一致するか
    pub fn is_current(&self) -> BuildResult<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        let existing = std::fs::read_to_string(&self.path)?;
        Ok(existing == self.descriptor.render()?)
    }

    /// 記述子を書き出す。内容が変わらなければ書き換えず false を返す
    pub fn generate(&self) -> BuildResult<bool> {
        // 描画に失敗した場合は何も書かない
        let rendered = self.descriptor.render()?;

        if self.path.exists() && std::fs::read_to_string(&self.path)? == rendered {
            tracing::debug!("Descriptor unchanged: {}", self.path.display());
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, rendered)?;

        tracing::info!("Descriptor written: {}", self.path.display());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::new("notifier", "classes");
        config.docker.base_image = Some("openjdk:8-jre".to_string());
        config.docker.image_name = Some("weba/notifier".to_string());
        config.docker.maintainer = Some("Weba Team <dev@weba.io>".to_string());
        config.docker.default_java_opts = "-Xms128m -Xmx512m".to_string();
        config
    }

    #[test]
    fn test_render() {
        let descriptor = ImageDescriptor::from_config(&config(), false).unwrap();
        let rendered = descriptor.render().unwrap();

        assert_eq!(
            rendered,
            "FROM openjdk:8-jre\n\
             COPY notifier-fat.jar /app/app.jar\n\
             ENV DEFAULT_JAVA_OPTS=\"-Xms128m -Xmx512m\"\n\
             ENV JAVA_OPTS=\"\"\n\
             ENTRYPOINT [\"sh\", \"-c\"]\n\
             CMD [\"java $DEFAULT_JAVA_OPTS $JAVA_OPTS -jar /app/app.jar\"]\n\
             EXPOSE 8080\n\
             LABEL maintainer=\"Weba Team <dev@weba.io>\"\n"
        );
    }

    #[test]
    fn test_debug_mode() {
        let descriptor = ImageDescriptor::from_config(&config(), true).unwrap();
        let rendered = descriptor.render().unwrap();

        assert!(rendered.contains(
            "ENV DEFAULT_JAVA_OPTS=\"-Xms128m -Xmx512m \
             -agentlib:jdwp=transport=dt_socket,server=y,suspend=n,address=5005\"\n"
        ));
        assert!(rendered.contains("EXPOSE 8080\nEXPOSE 5005\n"));
    }

    #[test]
    fn test_missing_required_key() {
        let mut config = config();
        config.docker.base_image = None;

        match ImageDescriptor::from_config(&config, false) {
            Err(BuildError::MissingConfig(key)) => assert_eq!(key, "docker.base_image"),
            other => panic!("Expected MissingConfig, got {:?}", other),
        }

        config.docker.base_image = Some("openjdk:8-jre".to_string());
        config.docker.maintainer = Some("  ".to_string());
        assert!(matches!(
            ImageDescriptor::from_config(&config, false),
            Err(BuildError::MissingConfig(_))
        ));
    }

    #[test]
    fn test_values_are_escaped() {
        let mut config = config();
        config.docker.default_java_opts = r#"-Dgreeting="hi""#.to_string();
        let rendered = ImageDescriptor::from_config(&config, false)
            .unwrap()
            .render()
            .unwrap();

        assert!(rendered.contains(r#"ENV DEFAULT_JAVA_OPTS="-Dgreeting=\"hi\"""#));
    }

    #[test]
    fn test_generate_is_deterministic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docker/Dockerfile");
        let descriptor = ImageDescriptor::from_config(&config(), false).unwrap();

        let generator = ImageDescriptorGenerator::new(descriptor.clone(), &path);
        assert!(!generator.is_current().unwrap());
        assert!(generator.generate().unwrap());
        let first = std::fs::read(&path).unwrap();

        let regenerated = ImageDescriptorGenerator::new(descriptor, &path);
        assert!(regenerated.is_current().unwrap());
        assert!(!regenerated.generate().unwrap());
        std::fs::remove_file(&path).unwrap();
        assert!(regenerated.generate().unwrap());

        assert_eq!(first, std::fs::read(&path).unwrap());
    }

    #[test]
    fn test_generate_detects_config_change() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Dockerfile");
        let generator =
            ImageDescriptorGenerator::new(ImageDescriptor::from_config(&config(), false).unwrap(), &path);
        generator.generate().unwrap();

        let mut changed = config();
        changed.docker.port = 9090;
        let generator =
            ImageDescriptorGenerator::new(ImageDescriptor::from_config(&changed, false).unwrap(), &path);
        assert!(!generator.is_current().unwrap());
        assert!(generator.generate().unwrap());
        assert!(std::fs::read_to_string(&path).unwrap().contains("EXPOSE 9090\n"));
    }
}
