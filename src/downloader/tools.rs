use serde::{Deserialize, Serialize};
use std::process::Command;

/// External binaries the yt-dlp capability relies on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    /// Merging and audio transcoding (invoked by yt-dlp)
    Ffmpeg,
    /// Exact-size probe for finished files
    Ffprobe,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
            ToolType::Ffprobe => "ffprobe",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            // ffmpeg/ffprobe use a single dash
            ToolType::Ffmpeg | ToolType::Ffprobe => "-version",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

pub struct ToolManager;

impl ToolManager {
    pub fn new() -> Self {
        Self
    }

    /// Location and version of one tool. Runs the tool to read the version.
    pub fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let path = self.locate(tool_type);
        let version = path
            .as_deref()
            .and_then(|p| self.get_version(p, tool_type));

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            version,
            is_available: path.is_some(),
            path,
        }
    }

    /// Status of every tool, for startup reporting
    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp),
            self.get_tool_info(ToolType::Ffmpeg),
            self.get_tool_info(ToolType::Ffprobe),
        ]
    }

    /// Path of the tool, falling back to the bare name so `$PATH` lookup
    /// happens at spawn time
    pub fn resolve(&self, tool_type: ToolType) -> String {
        self.locate(tool_type)
            .unwrap_or_else(|| tool_type.as_str().to_string())
    }

    /// Where the tool is installed, without running it
    pub fn locate(&self, tool_type: ToolType) -> Option<String> {
        let binary_name = tool_type.as_str();

        // 1. Try common paths first
        let common_paths = [
            format!("/opt/homebrew/bin/{}", binary_name),
            format!("/usr/local/bin/{}", binary_name),
            format!("/usr/bin/{}", binary_name),
        ];

        for path in common_paths {
            if std::path::Path::new(&path).exists() {
                return Some(path);
            }
        }

        // 2. Try PATH
        let output = Command::new("which").arg(binary_name).output().ok()?;
        if !output.status.success() {
            return None;
        }
        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!path.is_empty()).then_some(path)
    }

    fn get_version(&self, path: &str, tool_type: ToolType) -> Option<String> {
        match Command::new(path).arg(tool_type.version_arg()).output() {
            Ok(output) if output.status.success() => {
                // ffmpeg prints a banner; the first line carries the version
                let out = String::from_utf8_lossy(&output.stdout);
                out.lines().next().map(|l| l.trim().to_string())
            }
            _ => None,
        }
    }
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_binaries() {
        assert_eq!(ToolType::YtDlp.as_str(), "yt-dlp");
        assert_eq!(ToolType::Ffprobe.version_arg(), "-version");
    }

    #[test]
    fn resolve_never_returns_empty() {
        let manager = ToolManager::new();
        for tool in [ToolType::YtDlp, ToolType::Ffmpeg, ToolType::Ffprobe] {
            let resolved = manager.resolve(tool);
            assert!(resolved.ends_with(tool.as_str()));
        }
    }

    #[test]
    fn status_lists_every_tool() {
        let manager = ToolManager::new();
        let tools = manager.get_all_tools();
        assert_eq!(tools.len(), 3);
        for info in tools {
            assert_eq!(info.is_available, info.path.is_some());
            assert_eq!(info.path, manager.locate(info.tool_type));
            if !info.is_available {
                assert!(info.version.is_none());
            }
        }
    }
}
