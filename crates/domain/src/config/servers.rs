//! MCP server descriptors.
//!
//! One entry per element of the `servers` array. The MCP client crate turns
//! a descriptor into a running child process; this module only knows how
//! to describe that process.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Configuration for a single MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Unique key for this server.
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Path to the server script. Relative paths are resolved against the
    /// directory of the config file that declared them.
    pub script_path: PathBuf,

    #[serde(default = "d_true")]
    pub enabled: bool,

    /// Server-specific settings. Carried along but not interpreted.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,

    /// Interpreter override. When unset, it is inferred from the script
    /// extension (`.py` → `python`, `.js` → `node`).
    #[serde(default)]
    pub command: Option<String>,

    /// Extra arguments placed after the script path.
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the spawned process.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl ServerDescriptor {
    /// Descriptor for single-server mode: the server is named after the
    /// script's file stem.
    pub fn from_script(script_path: impl Into<PathBuf>) -> Self {
        let script_path = script_path.into();
        let name = script_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "server".into());
        Self {
            name,
            description: String::new(),
            script_path,
            enabled: true,
            config: serde_json::Map::new(),
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    /// The program and argument list used to launch this server.
    pub fn launch_command(&self) -> Result<(String, Vec<String>), String> {
        let program = match &self.command {
            Some(cmd) if !cmd.trim().is_empty() => cmd.clone(),
            _ => interpreter_for(&self.script_path)
                .ok_or_else(|| {
                    format!(
                        "server script must be a .py or .js file (or set `command`): {}",
                        self.script_path.display()
                    )
                })?
                .to_string(),
        };

        let mut args = Vec::with_capacity(self.args.len() + 1);
        args.push(self.script_path.to_string_lossy().into_owned());
        args.extend(self.args.iter().cloned());
        Ok((program, args))
    }

    /// Resolve a relative `script_path` against `base`.
    pub(crate) fn resolve_relative_to(&mut self, base: &Path) {
        if self.script_path.is_relative() {
            self.script_path = base.join(&self.script_path);
        }
    }
}

fn interpreter_for(script: &Path) -> Option<&'static str> {
    match script.extension().and_then(|e| e.to_str()) {
        Some("py") => Some("python"),
        Some("js") => Some("node"),
        _ => None,
    }
}

fn d_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_minimal_descriptor() {
        let raw = r#"{ "name": "calculator", "script_path": "calc.py" }"#;
        let d: ServerDescriptor = serde_json::from_str(raw).unwrap();
        assert_eq!(d.name, "calculator");
        assert!(d.enabled);
        assert!(d.config.is_empty());
        assert!(d.description.is_empty());
    }

    #[test]
    fn deserialize_full_descriptor() {
        let raw = r#"{
            "name": "weather",
            "description": "天气服务",
            "script_path": "../mcp-server/weather/weather.py",
            "enabled": false,
            "config": { "units": "metric" },
            "env": { "WEATHER_TOKEN": "x" }
        }"#;
        let d: ServerDescriptor = serde_json::from_str(raw).unwrap();
        assert!(!d.enabled);
        assert_eq!(d.config.get("units").and_then(|v| v.as_str()), Some("metric"));
        assert_eq!(d.env.get("WEATHER_TOKEN").map(String::as_str), Some("x"));
    }

    #[test]
    fn launch_command_infers_interpreter() {
        let d = ServerDescriptor::from_script("/srv/calc.py");
        let (program, args) = d.launch_command().unwrap();
        assert_eq!(program, "python");
        assert_eq!(args, vec!["/srv/calc.py".to_string()]);

        let d = ServerDescriptor::from_script("/srv/weather.js");
        assert_eq!(d.launch_command().unwrap().0, "node");
    }

    #[test]
    fn launch_command_honours_override_and_args() {
        let mut d = ServerDescriptor::from_script("/srv/tool.bin");
        assert!(d.launch_command().is_err());
        d.command = Some("uv".into());
        d.args = vec!["--verbose".into()];
        let (program, args) = d.launch_command().unwrap();
        assert_eq!(program, "uv");
        assert_eq!(args, vec!["/srv/tool.bin".to_string(), "--verbose".to_string()]);
    }

    #[test]
    fn from_script_names_after_stem() {
        let d = ServerDescriptor::from_script("servers/text_processor.py");
        assert_eq!(d.name, "text_processor");
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let mut d = ServerDescriptor::from_script("calc.py");
        d.resolve_relative_to(Path::new("/etc/mcx"));
        assert_eq!(d.script_path, PathBuf::from("/etc/mcx/calc.py"));

        let mut d = ServerDescriptor::from_script("/abs/calc.py");
        d.resolve_relative_to(Path::new("/etc/mcx"));
        assert_eq!(d.script_path, PathBuf::from("/abs/calc.py"));
    }
}
