use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::info;

pub const USER_MESSAGE_REWRITE: &str = "user_message_rewrite";
pub const SQL_SCHEMA_SELECTION: &str = "sql_schema_selection";
pub const SQL_QUERY_GENERATION: &str = "sql_query_generation";
pub const ANSWER: &str = "answer";

const BUILTIN_AGENTS: &[(&str, &str)] = &[
    (
        "user_message_rewrite.md",
        include_str!("../agents/user_message_rewrite.md"),
    ),
    (
        "sql_schema_selection.md",
        include_str!("../agents/sql_schema_selection.md"),
    ),
    (
        "sql_query_generation.md",
        include_str!("../agents/sql_query_generation.md"),
    ),
    ("answer.md", include_str!("../agents/answer.md")),
];

/// Which completion deployment an agent runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Full,
    Mini,
}

/// Agent configuration loaded from a .md file with YAML frontmatter.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub description: String,
    pub model: ModelTier,
    pub system_prompt: String,
}

/// Values substituted for `<<<key>>>` placeholders in system prompts.
#[derive(Debug, Clone, Default)]
pub struct PromptParameters(HashMap<String, String>);

impl PromptParameters {
    pub fn new(use_case: &str, engine: &str, row_limit: usize) -> Self {
        let mut params = Self::default();
        params.set("use_case", use_case);
        params.set("engine", engine);
        params.set("row_limit", &row_limit.to_string());
        params.set(
            "current_date",
            &chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string(),
        );
        params
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    pub fn render(&self, template: &str) -> String {
        self.0.iter().fold(template.to_string(), |text, (key, value)| {
            text.replace(&format!("<<<{key}>>>"), value)
        })
    }
}

/// The four pipeline agents with their bundled prompts.
pub fn builtin_agents() -> Result<HashMap<String, AgentConfig>, AgentConfigError> {
    BUILTIN_AGENTS
        .iter()
        .map(|(file, content)| {
            parse_agent(content, Path::new(file)).map(|config| (config.name.clone(), config))
        })
        .collect()
}

/// Built-in agents, overridden by any `.md` files in `agents_dir`.
pub fn load_agents(agents_dir: Option<&Path>) -> Result<HashMap<String, AgentConfig>, AgentConfigError> {
    let mut agents = builtin_agents()?;

    let Some(agents_dir) = agents_dir else {
        return Ok(agents);
    };
    if !agents_dir.exists() {
        return Err(AgentConfigError::DirNotFound(agents_dir.to_path_buf()));
    }

    let entries = std::fs::read_dir(agents_dir)
        .map_err(|e| AgentConfigError::IoError(agents_dir.to_path_buf(), e))?;

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "md") {
            match load_agent_file(&path) {
                Ok(config) => {
                    info!(agent = %config.name, model = ?config.model, "loaded agent override");
                    agents.insert(config.name.clone(), config);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping agent file");
                }
            }
        }
    }

    Ok(agents)
}

fn load_agent_file(path: &Path) -> Result<AgentConfig, AgentConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AgentConfigError::IoError(path.to_path_buf(), e))?;
    parse_agent(&content, path)
}

fn parse_agent(content: &str, path: &Path) -> Result<AgentConfig, AgentConfigError> {
    let (name, description, model) = parse_frontmatter(content, path)?;

    // Everything after the frontmatter is the system prompt
    let system_prompt = extract_body(content);

    Ok(AgentConfig {
        name,
        description,
        model,
        system_prompt,
    })
}

/// Parse YAML frontmatter from markdown content.
fn parse_frontmatter(
    content: &str,
    path: &Path,
) -> Result<(String, String, ModelTier), AgentConfigError> {
    let trimmed = content.trim_start();

    if !trimmed.starts_with("---") {
        return Err(AgentConfigError::NoFrontmatter(path.to_path_buf()));
    }

    let after_first = &trimmed[3..];
    let end = after_first
        .find("---")
        .ok_or_else(|| AgentConfigError::NoFrontmatter(path.to_path_buf()))?;

    let frontmatter = &after_first[..end];

    let mut name = None;
    let mut description = None;
    let mut model = ModelTier::Full;

    for line in frontmatter.lines() {
        let line = line.trim();
        let unquote = |val: &str| val.trim().trim_matches('"').trim_matches('\'').to_string();
        if let Some(val) = line.strip_prefix("name:") {
            name = Some(unquote(val));
        } else if let Some(val) = line.strip_prefix("description:") {
            description = Some(unquote(val));
        } else if let Some(val) = line.strip_prefix("model:") {
            model = match unquote(val).to_lowercase().as_str() {
                "mini" => ModelTier::Mini,
                "full" | "" => ModelTier::Full,
                other => {
                    return Err(AgentConfigError::InvalidField(
                        path.to_path_buf(),
                        "model",
                        other.to_string(),
                    ))
                }
            };
        }
    }

    let name = name.ok_or_else(|| AgentConfigError::MissingField(path.to_path_buf(), "name"))?;
    let description = description.unwrap_or_default();

    Ok((name, description, model))
}

/// Extract the body content after the YAML frontmatter.
fn extract_body(content: &str) -> String {
    let trimmed = content.trim_start();
    if !trimmed.starts_with("---") {
        return content.to_string();
    }

    let after_first = &trimmed[3..];
    if let Some(end) = after_first.find("---") {
        after_first[end + 3..].trim().to_string()
    } else {
        content.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentConfigError {
    #[error("agents directory not found: {0}")]
    DirNotFound(PathBuf),
    #[error("I/O error reading {0}: {1}")]
    IoError(PathBuf, std::io::Error),
    #[error("no YAML frontmatter in {0}")]
    NoFrontmatter(PathBuf),
    #[error("missing field '{1}' in {0}")]
    MissingField(PathBuf, &'static str),
    #[error("invalid value '{2}' for '{1}' in {0}")]
    InvalidField(PathBuf, &'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn builtin_agents_parse() {
        let agents = builtin_agents().unwrap();
        assert_eq!(agents.len(), 4);
        assert_eq!(agents[USER_MESSAGE_REWRITE].model, ModelTier::Mini);
        assert_eq!(agents[SQL_SCHEMA_SELECTION].model, ModelTier::Mini);
        assert_eq!(agents[SQL_QUERY_GENERATION].model, ModelTier::Full);
        assert!(agents[ANSWER].system_prompt.contains("follow_up_suggestions"));
        assert!(!agents[ANSWER].system_prompt.starts_with("---"));
    }

    #[test]
    fn prompts_render_placeholders() {
        let agents = builtin_agents().unwrap();
        let params = PromptParameters::new("query product data", "SQLITE", 25);
        let prompt = params.render(&agents[SQL_QUERY_GENERATION].system_prompt);
        assert!(prompt.contains("SQLITE engine"));
        assert!(prompt.contains("at most 25 rows"));
        assert!(!prompt.contains("<<<"));
    }

    #[test]
    fn overrides_replace_builtins() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("answer.md"),
            "---\nname: answer\ndescription: terse\nmodel: mini\n---\nBe terse.",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::write(dir.path().join("broken.md"), "no frontmatter here").unwrap();

        let agents = load_agents(Some(dir.path())).unwrap();
        assert_eq!(agents.len(), 4);
        assert_eq!(agents[ANSWER].system_prompt, "Be terse.");
        assert_eq!(agents[ANSWER].model, ModelTier::Mini);
    }

    #[test]
    fn missing_dir_is_an_error() {
        let err = load_agents(Some(Path::new("/definitely/not/here"))).unwrap_err();
        assert!(matches!(err, AgentConfigError::DirNotFound(_)));
    }

    #[test]
    fn bad_model_value_rejected() {
        let err = parse_agent("---\nname: x\nmodel: huge\n---\nbody", Path::new("x.md")).unwrap_err();
        assert!(matches!(err, AgentConfigError::InvalidField(_, "model", _)));
    }
}
