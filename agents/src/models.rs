//! Agent-facing models
//!
//! Types crossing the boundary between the orchestrator and the analysis
//! agents: the source inventory handed to agents, the raw findings they
//! report back, and the agent trait itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use heimdall_core::{AnalysisOptions, ProjectRef, Severity};

/// One source file discovered during source collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path relative to the project root
    pub path: String,
    /// Detected language label
    pub language: String,
    /// Line count
    pub lines: u64,
}

/// The file inventory produced by the source-collection stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceInventory {
    /// All files selected for analysis
    pub files: Vec<SourceFile>,
}

impl SourceInventory {
    /// Total lines across the inventory
    pub fn total_lines(&self) -> u64 {
        self.files.iter().map(|f| f.lines).sum()
    }

    /// File count per language label
    pub fn language_histogram(&self) -> HashMap<String, u32> {
        let mut histogram = HashMap::new();
        for file in &self.files {
            *histogram.entry(file.language.clone()).or_insert(0) += 1;
        }
        histogram
    }
}

/// Everything an agent needs to analyze one project revision
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    /// The project under analysis
    pub project: ProjectRef,
    /// Options the run was started with
    pub options: AnalysisOptions,
    /// The collected source inventory
    pub inventory: SourceInventory,
}

/// A raw, un-normalized finding as reported by one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFinding {
    /// Name of the reporting agent
    pub agent: String,
    /// Path of the affected file
    pub file_path: String,
    /// First line of the affected range
    pub line_start: u32,
    /// Last line of the affected range
    pub line_end: u32,
    /// Severity claimed by the agent
    pub severity: Severity,
    /// Free-form category label, mapped to a main category later
    pub category_label: String,
    /// Rule identifier, normalized during rule parsing
    pub rule_id: String,
    /// Human-readable description
    pub message: String,
    /// Optional suggested fix
    pub suggestion: Option<String>,
}

/// An analysis agent invoked during the static-analysis stage.
///
/// Implementations live outside the pipeline core; the orchestrator only
/// depends on this trait and on the registry entry sharing the agent's
/// name.
#[async_trait]
pub trait AnalysisAgent: Send + Sync {
    /// Registry name of the agent
    fn name(&self) -> &str;

    /// Analyze the project and report raw findings
    async fn analyze(&self, context: &AnalysisContext) -> anyhow::Result<Vec<RawFinding>>;
}

/// Source-collection boundary; production deployments wire a VCS- or
/// filesystem-backed implementation
#[async_trait]
pub trait SourceCollector: Send + Sync {
    /// Collect the file inventory for a project
    async fn collect(
        &self,
        project: &ProjectRef,
        options: &AnalysisOptions,
    ) -> anyhow::Result<SourceInventory>;
}

/// Collector serving a fixed inventory, used in tests and single-process
/// deployments where the inventory is prepared out of band
pub struct StaticSourceCollector {
    inventory: SourceInventory,
}

impl StaticSourceCollector {
    pub fn new(inventory: SourceInventory) -> Self {
        Self { inventory }
    }
}

#[async_trait]
impl SourceCollector for StaticSourceCollector {
    async fn collect(
        &self,
        _project: &ProjectRef,
        options: &AnalysisOptions,
    ) -> anyhow::Result<SourceInventory> {
        let mut inventory = self.inventory.clone();
        if !options.include_tests {
            inventory
                .files
                .retain(|f| !f.path.contains("test") && !f.path.contains("spec"));
        }
        Ok(inventory)
    }
}

/// Filesystem-backed collector walking the project directory.
///
/// Hidden directories, build output, and vendored dependencies are
/// skipped; languages are detected by extension.
pub struct FsSourceCollector;

const SKIPPED_DIRS: &[&str] = &["target", "node_modules", "vendor", "dist", "build"];

fn language_for_extension(extension: &str) -> Option<&'static str> {
    match extension {
        "rs" => Some("rust"),
        "py" => Some("python"),
        "js" | "jsx" => Some("javascript"),
        "ts" | "tsx" => Some("typescript"),
        "go" => Some("go"),
        "java" => Some("java"),
        "c" | "h" => Some("c"),
        "cpp" | "cc" | "hpp" => Some("cpp"),
        "cs" => Some("csharp"),
        "rb" => Some("ruby"),
        "php" => Some("php"),
        "sh" => Some("shell"),
        _ => None,
    }
}

fn walk_sources(
    root: &std::path::Path,
    dir: &std::path::Path,
    include_tests: bool,
    files: &mut Vec<SourceFile>,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        if path.is_dir() {
            if name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_str()) {
                continue;
            }
            if !include_tests && (name == "tests" || name == "test") {
                continue;
            }
            walk_sources(root, &path, include_tests, files)?;
            continue;
        }

        let language = match path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(language_for_extension)
        {
            Some(language) => language,
            None => continue,
        };
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(_) => continue, // non-utf8 or unreadable, not a source file
        };
        let relative = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .to_string();
        files.push(SourceFile {
            path: relative,
            language: language.to_string(),
            lines: content.lines().count() as u64,
        });
    }
    Ok(())
}

#[async_trait]
impl SourceCollector for FsSourceCollector {
    async fn collect(
        &self,
        project: &ProjectRef,
        options: &AnalysisOptions,
    ) -> anyhow::Result<SourceInventory> {
        let root = std::path::PathBuf::from(&project.path);
        let include_tests = options.include_tests;
        let inventory = tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            walk_sources(&root, &root, include_tests, &mut files)?;
            files.sort_by(|a, b| a.path.cmp(&b.path));
            Ok::<_, std::io::Error>(SourceInventory { files })
        })
        .await??;
        Ok(inventory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heimdall_core::RevisionInfo;
    use uuid::Uuid;

    fn project() -> ProjectRef {
        ProjectRef {
            id: Uuid::new_v4(),
            name: "demo".to_string(),
            path: "/tmp/demo".to_string(),
            revision: RevisionInfo::default(),
        }
    }

    fn inventory() -> SourceInventory {
        SourceInventory {
            files: vec![
                SourceFile {
                    path: "src/main.rs".to_string(),
                    language: "rust".to_string(),
                    lines: 120,
                },
                SourceFile {
                    path: "src/lib.rs".to_string(),
                    language: "rust".to_string(),
                    lines: 300,
                },
                SourceFile {
                    path: "web/app.ts".to_string(),
                    language: "typescript".to_string(),
                    lines: 80,
                },
                SourceFile {
                    path: "tests/integration_test.rs".to_string(),
                    language: "rust".to_string(),
                    lines: 50,
                },
            ],
        }
    }

    #[test]
    fn test_language_histogram() {
        let histogram = inventory().language_histogram();
        assert_eq!(histogram["rust"], 3);
        assert_eq!(histogram["typescript"], 1);
        assert_eq!(inventory().total_lines(), 550);
    }

    #[tokio::test]
    async fn test_fs_collector_walks_project() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("target")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
        std::fs::write(dir.path().join("src/app.ts"), "export {};\n").unwrap();
        std::fs::write(dir.path().join("target/out.rs"), "fn ignored() {}\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "# readme\n").unwrap();

        let project = ProjectRef {
            id: Uuid::new_v4(),
            name: "demo".to_string(),
            path: dir.path().display().to_string(),
            revision: RevisionInfo::default(),
        };
        let inventory = FsSourceCollector
            .collect(&project, &AnalysisOptions::default())
            .await
            .unwrap();

        let paths: Vec<&str> = inventory.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, ["src/app.ts", "src/main.rs"]);
        assert_eq!(inventory.files[1].language, "rust");
    }

    #[tokio::test]
    async fn test_static_collector_filters_tests() {
        let collector = StaticSourceCollector::new(inventory());
        let without_tests = collector
            .collect(&project(), &AnalysisOptions::default())
            .await
            .unwrap();
        assert_eq!(without_tests.files.len(), 3);

        let options = AnalysisOptions {
            include_tests: true,
            ..AnalysisOptions::default()
        };
        let with_tests = collector.collect(&project(), &options).await.unwrap();
        assert_eq!(with_tests.files.len(), 4);
    }
}
