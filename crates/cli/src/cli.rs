use std::path::{Path, PathBuf};

use clap::Parser;
use mcx_domain::config::{check_with_env, LoadRequest, ModelSection};

/// Chat with an LLM that can call tools on your MCP servers.
#[derive(Debug, Parser)]
#[command(name = "mcx", version, about)]
pub struct Args {
    /// Multi-server config (`*.json`) or a single server script (`*.py`, `*.js`).
    pub target: Option<PathBuf>,

    /// Config file. With a server script this holds only the model settings.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Model provider: anthropic, qwen (dashscope) or openai.
    #[arg(long)]
    pub provider: Option<String>,

    /// Model name.
    #[arg(long)]
    pub model: Option<String>,

    /// API key for the model provider.
    #[arg(long)]
    pub api_key: Option<String>,

    /// Maximum tokens per model response.
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Validate the configuration, print any issues and exit.
    #[arg(long)]
    pub check: bool,
}

fn is_config_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

impl Args {
    /// Turn the command line into a [`LoadRequest`]: a `.json` target is
    /// the config file, any other target is a server script.
    ///
    /// A `.json` target together with `--config` names two config files and
    /// is rejected.
    pub fn load_request(&self) -> anyhow::Result<LoadRequest> {
        let (config_path, script) = match &self.target {
            Some(t) if is_config_file(t) => {
                if let Some(other) = &self.config {
                    anyhow::bail!(
                        "{} is already a config file; drop --config {} or pass a server script instead",
                        t.display(),
                        other.display()
                    );
                }
                (Some(t.clone()), None)
            }
            Some(t) => (self.config.clone(), Some(t.clone())),
            None => (self.config.clone(), None),
        };

        Ok(LoadRequest {
            config_path,
            script,
            overrides: ModelSection {
                provider: self.provider.clone(),
                model: self.model.clone(),
                api_key: self.api_key.clone(),
                max_tokens: self.max_tokens,
                ..Default::default()
            },
        })
    }
}

fn source_label(req: &LoadRequest) -> String {
    match (&req.config_path, &req.script) {
        (Some(c), _) => c.display().to_string(),
        (None, Some(s)) => s.display().to_string(),
        (None, None) => "(no configuration)".to_string(),
    }
}

/// `--check`: print every issue. Returns `true` when there are no errors.
pub fn check(args: &Args) -> anyhow::Result<bool> {
    let req = args.load_request()?;
    let label = source_label(&req);
    let (_, issues) = check_with_env(&req, &|name| std::env::var(name).ok())?;

    if issues.is_empty() {
        println!("Config OK ({label})");
        return Ok(true);
    }

    let error_count = issues.iter().filter(|i| i.is_error()).count();
    let warning_count = issues.len() - error_count;

    for issue in &issues {
        println!("{issue}");
    }
    println!("\n{error_count} error(s), {warning_count} warning(s) in {label}");

    Ok(error_count == 0)
}
