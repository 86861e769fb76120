//! Built-in offline capabilities for the `scribe` binary.
//!
//! These run entirely from the local filesystem: the profiler reads package
//! manifests, the planner applies a fixed section layout, and the writers
//! render deterministic markdown from the profile. They make `scribe generate`
//! useful without any model backend and double as reference implementations of
//! the capability traits.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use scribe_models::{Plan, Profile, ReviewVerdict, SectionSpec};
use scribe_orchestrator::capabilities::{
    Planner, Profiler, ReviewRequest, SectionReviewer, SectionWriter, WriteRequest,
};
use scribe_orchestrator::error::{OrchestratorError, Result};

/// Section ids handled by [`MetaWriter`] rather than the template writer.
pub const META_SECTIONS: [&str; 4] = ["license", "contributing", "acknowledgments", "contact"];

/// Profiles a project directory from its package manifest.
///
/// Recognizes `Cargo.toml`, `package.json`, and `pyproject.toml`, in that
/// order. A directory with none of them still profiles, just with nothing but
/// the subject name filled in.
pub struct ManifestProfiler;

#[async_trait]
impl Profiler for ManifestProfiler {
    async fn profile(&self, subject: &str, source: &str) -> Result<Profile> {
        let root = Path::new(source);
        if !root.is_dir() {
            return Err(OrchestratorError::Capability(format!(
                "source directory not found: {source}"
            )));
        }

        let cargo = root.join("Cargo.toml");
        if cargo.is_file() {
            debug!(path = %cargo.display(), "profiling from Cargo.toml");
            return profile_cargo(subject, &std::fs::read_to_string(&cargo)?);
        }
        let package = root.join("package.json");
        if package.is_file() {
            debug!(path = %package.display(), "profiling from package.json");
            return profile_node(subject, &std::fs::read_to_string(&package)?);
        }
        let pyproject = root.join("pyproject.toml");
        if pyproject.is_file() {
            debug!(path = %pyproject.display(), "profiling from pyproject.toml");
            return profile_python(subject, &std::fs::read_to_string(&pyproject)?);
        }

        debug!("no recognized manifest, using bare profile");
        Ok(Profile::unknown(subject))
    }
}

fn profile_cargo(subject: &str, manifest: &str) -> Result<Profile> {
    let value: toml::Value = manifest
        .parse()
        .map_err(|e| OrchestratorError::Capability(format!("invalid Cargo.toml: {e}")))?;
    let package = value.get("package");
    let field = |key: &str| {
        package
            .and_then(|p| p.get(key))
            .and_then(toml::Value::as_str)
            .map(str::to_string)
    };

    let name = field("name").unwrap_or_else(|| subject.to_string());
    let mut profile = Profile::unknown(&name);
    profile.main_language = "Rust".to_string();
    profile.description = field("description");
    profile.license_name = field("license");
    profile.homepage_url = field("homepage").or_else(|| field("repository"));
    profile.dependencies = table_keys(value.get("dependencies"));
    profile.project_type =
        if value.get("bin").is_some() || field("default-run").is_some() {
            "cli_tool".to_string()
        } else {
            "library".to_string()
        };
    profile.install_methods = vec![format!("cargo install {name}")];
    profile.commands = value
        .get("bin")
        .and_then(toml::Value::as_array)
        .map(|bins| {
            bins.iter()
                .filter_map(|b| b.get("name").and_then(toml::Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Ok(profile)
}

fn profile_node(subject: &str, manifest: &str) -> Result<Profile> {
    let value: serde_json::Value = serde_json::from_str(manifest)?;
    let field = |key: &str| value.get(key).and_then(|v| v.as_str()).map(str::to_string);

    let name = field("name").unwrap_or_else(|| subject.to_string());
    let mut profile = Profile::unknown(&name);
    profile.main_language = "JavaScript".to_string();
    profile.project_type = if value.get("bin").is_some() {
        "cli_tool".to_string()
    } else {
        "library".to_string()
    };
    profile.description = field("description");
    profile.license_name = field("license");
    profile.homepage_url = field("homepage");
    profile.dependencies = value
        .get("dependencies")
        .and_then(|d| d.as_object())
        .map(|d| d.keys().cloned().collect())
        .unwrap_or_default();
    profile.install_methods = vec![format!("npm install {name}")];
    Ok(profile)
}

fn profile_python(subject: &str, manifest: &str) -> Result<Profile> {
    let value: toml::Value = manifest
        .parse()
        .map_err(|e| OrchestratorError::Capability(format!("invalid pyproject.toml: {e}")))?;
    let project = value.get("project");
    let field = |key: &str| {
        project
            .and_then(|p| p.get(key))
            .and_then(toml::Value::as_str)
            .map(str::to_string)
    };

    let name = field("name").unwrap_or_else(|| subject.to_string());
    let mut profile = Profile::unknown(&name);
    profile.main_language = "Python".to_string();
    profile.project_type = "library".to_string();
    profile.description = field("description");
    profile.dependencies = project
        .and_then(|p| p.get("dependencies"))
        .and_then(toml::Value::as_array)
        .map(|deps| {
            deps.iter()
                .filter_map(toml::Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    profile.install_methods = vec![format!("pip install {name}")];
    Ok(profile)
}

fn table_keys(value: Option<&toml::Value>) -> Vec<String> {
    value
        .and_then(toml::Value::as_table)
        .map(|table| table.keys().cloned().collect())
        .unwrap_or_default()
}

/// Fixed README layout, with data-poor sections disabled up front.
pub struct DefaultPlanner;

#[async_trait]
impl Planner for DefaultPlanner {
    async fn plan(&self, profile: &Profile) -> Result<Plan> {
        let mut sections = vec![
            SectionSpec::new("overview")
                .with_title("Overview")
                .with_instructions("Introduce the project and what it is for."),
            SectionSpec::new("features").with_title("Features"),
            SectionSpec::new("installation")
                .with_title("Installation")
                .with_instructions("Show each install method in its own code block."),
            SectionSpec::new("usage")
                .with_title("Usage")
                .with_instructions("Lead with the most common invocation."),
            SectionSpec::new("configuration").with_title("Configuration"),
            SectionSpec::new("contributing").with_title("Contributing"),
            SectionSpec::new("license").with_title("License"),
        ];

        for section in &mut sections {
            let keep = match section.id.as_str() {
                "features" => !profile.key_features.is_empty(),
                "configuration" => !profile.config_options.is_empty(),
                "license" => profile.license_name.is_some(),
                _ => true,
            };
            if !keep {
                section.enabled = false;
            }
        }

        Ok(Plan::new(sections))
    }
}

/// Renders a section from profile data alone.
pub struct TemplateWriter;

#[async_trait]
impl SectionWriter for TemplateWriter {
    async fn write(&self, request: &WriteRequest) -> Result<String> {
        let profile = &request.profile;
        let body = match request.section_id.as_str() {
            "overview" => {
                let mut out = format!("# {}\n\n", profile.name);
                match &profile.description {
                    Some(description) => out.push_str(description),
                    None => out.push_str(&format!(
                        "{} is a {} project.",
                        profile.name,
                        language_label(profile)
                    )),
                }
                if let Some(url) = &profile.homepage_url {
                    out.push_str(&format!("\n\nSee <{url}> for more."));
                }
                out
            }
            "features" => bulleted(&request.title, &profile.key_features),
            "installation" => {
                let mut out = format!("## {}\n", request.title);
                if profile.install_methods.is_empty() {
                    out.push_str("\nBuild from source using your language toolchain.\n");
                } else {
                    for method in &profile.install_methods {
                        out.push_str(&format!("\n```sh\n{method}\n```\n"));
                    }
                }
                out
            }
            "usage" => {
                let mut out = format!("## {}\n", request.title);
                if profile.usage_snippets.is_empty() && profile.commands.is_empty() {
                    out.push_str(&format!(
                        "\nRun `{}` to get started.\n",
                        profile.name
                    ));
                } else {
                    for snippet in &profile.usage_snippets {
                        out.push_str(&format!("\n```\n{snippet}\n```\n"));
                    }
                    for command in &profile.commands {
                        out.push_str(&format!("\n```sh\n{command} --help\n```\n"));
                    }
                }
                out
            }
            "configuration" => bulleted(&request.title, &profile.config_options),
            other => format!("## {}\n\nNo content available for `{other}`.", request.title),
        };
        Ok(body.trim_end().to_string())
    }

    fn name(&self) -> &'static str {
        "template"
    }
}

fn language_label(profile: &Profile) -> String {
    if profile.main_language.is_empty() {
        "software".to_string()
    } else {
        profile.main_language.clone()
    }
}

fn bulleted(title: &str, items: &[String]) -> String {
    let mut out = format!("## {title}\n");
    for item in items {
        out.push_str(&format!("\n- {item}"));
    }
    out
}

/// Boilerplate sections that read from project metadata, not code.
pub struct MetaWriter;

#[async_trait]
impl SectionWriter for MetaWriter {
    async fn write(&self, request: &WriteRequest) -> Result<String> {
        let profile = &request.profile;
        let body = match request.section_id.as_str() {
            "license" => {
                let license = profile.license_name.as_deref().unwrap_or("the project license");
                format!("## {}\n\nDistributed under {license}. See `LICENSE` for details.", request.title)
            }
            "contributing" => format!(
                "## {}\n\nIssues and pull requests are welcome. Please open an issue to \
                 discuss larger changes before starting work.",
                request.title
            ),
            "acknowledgments" => format!(
                "## {}\n\nThanks to everyone who has contributed to {}.",
                request.title, profile.name
            ),
            "contact" => {
                let mut out = format!("## {}\n\nOpen an issue on the project tracker.", request.title);
                if let Some(url) = &profile.homepage_url {
                    out.push_str(&format!(" Project home: <{url}>."));
                }
                out
            }
            other => format!("## {}\n\nNo content available for `{other}`.", request.title),
        };
        Ok(body)
    }

    fn name(&self) -> &'static str {
        "meta"
    }
}

/// Rejects sections that do not start with a markdown heading.
pub struct HeadingReviewer;

#[async_trait]
impl SectionReviewer for HeadingReviewer {
    async fn review(&self, request: &ReviewRequest) -> Result<ReviewVerdict> {
        if request.content.trim_start().starts_with('#') {
            Ok(ReviewVerdict::pass(""))
        } else {
            Ok(ReviewVerdict::fail("section must start with a markdown heading"))
        }
    }

    fn name(&self) -> &'static str {
        "heading"
    }
}

/// Rejects sections that carry a heading and nothing else.
pub struct LengthReviewer;

#[async_trait]
impl SectionReviewer for LengthReviewer {
    async fn review(&self, request: &ReviewRequest) -> Result<ReviewVerdict> {
        let body_lines = request
            .content
            .lines()
            .filter(|line| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
            .count();
        if body_lines == 0 {
            Ok(ReviewVerdict::fail("section has a heading but no body"))
        } else {
            Ok(ReviewVerdict::pass(""))
        }
    }

    fn name(&self) -> &'static str {
        "length"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cargo_manifest_profiles_as_rust() {
        let manifest = r#"
            [package]
            name = "widget"
            description = "A widget maker"
            license = "MIT"

            [dependencies]
            serde = "1"
            tokio = "1"
        "#;
        let profile = profile_cargo("fallback", manifest).unwrap();
        assert_eq!(profile.name, "widget");
        assert_eq!(profile.main_language, "Rust");
        assert_eq!(profile.description.as_deref(), Some("A widget maker"));
        assert_eq!(profile.license_name.as_deref(), Some("MIT"));
        assert_eq!(profile.dependencies, vec!["serde", "tokio"]);
        assert_eq!(profile.install_methods, vec!["cargo install widget"]);
    }

    #[tokio::test]
    async fn package_json_profiles_as_javascript() {
        let manifest = r#"{
            "name": "widget-js",
            "description": "Widgets for the web",
            "license": "Apache-2.0",
            "bin": {"widget": "cli.js"},
            "dependencies": {"express": "^4"}
        }"#;
        let profile = profile_node("fallback", manifest).unwrap();
        assert_eq!(profile.name, "widget-js");
        assert_eq!(profile.main_language, "JavaScript");
        assert_eq!(profile.project_type, "cli_tool");
        assert_eq!(profile.dependencies, vec!["express"]);
    }

    #[tokio::test]
    async fn missing_directory_is_a_capability_error() {
        let result = ManifestProfiler.profile("x", "/nonexistent/path").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn planner_disables_sections_without_data() {
        let profile = Profile::unknown("demo");
        let plan = DefaultPlanner.plan(&profile).await.unwrap();

        assert!(plan.contains_enabled("overview"));
        assert!(plan.contains_enabled("installation"));
        assert!(!plan.contains_enabled("features"));
        assert!(!plan.contains_enabled("license"));
    }

    #[tokio::test]
    async fn planner_keeps_license_when_known() {
        let mut profile = Profile::unknown("demo");
        profile.license_name = Some("MIT".to_string());
        let plan = DefaultPlanner.plan(&profile).await.unwrap();
        assert!(plan.contains_enabled("license"));
    }

    #[tokio::test]
    async fn template_writer_output_survives_review() {
        let mut profile = Profile::unknown("demo");
        profile.description = Some("A demo project".to_string());
        let request = WriteRequest {
            section_id: "overview".to_string(),
            title: "Overview".to_string(),
            instructions: String::new(),
            profile: profile.clone(),
            prior_content: String::new(),
        };
        let content = TemplateWriter.write(&request).await.unwrap();

        let review = ReviewRequest {
            section_id: "overview".to_string(),
            content: content.clone(),
            profile,
        };
        assert!(HeadingReviewer.review(&review).await.unwrap().is_pass());
        assert!(LengthReviewer.review(&review).await.unwrap().is_pass());
    }

    #[tokio::test]
    async fn heading_reviewer_rejects_bare_prose() {
        let review = ReviewRequest {
            section_id: "usage".to_string(),
            content: "just some text".to_string(),
            profile: Profile::unknown("demo"),
        };
        let verdict = HeadingReviewer.review(&review).await.unwrap();
        assert!(!verdict.is_pass());
        assert!(verdict.feedback.contains("heading"));
    }
}
