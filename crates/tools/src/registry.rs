//! Tool registry.
//!
//! Classification is derived from the tool name at registration time and
//! decides how the orchestrator executes a call: local RPC to the client,
//! remote API in-process, HITL review, inline round-trip, or sandbox.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use voco_domain::tool::{ToolDefinition, ToolKind};
use voco_mcp_client::McpManager;

use crate::builtin::builtin_definitions;

pub struct ToolRegistry {
    definitions: Vec<ToolDefinition>,
    kinds: HashMap<String, ToolKind>,
    mcp: Arc<McpManager>,
    http: reqwest::Client,
}

impl ToolRegistry {
    /// Register built-ins plus every dynamic tool the manager discovered.
    pub fn new(mcp: Arc<McpManager>) -> Self {
        let mut definitions = builtin_definitions();
        let mut kinds: HashMap<String, ToolKind> = definitions
            .iter()
            .map(|d| (d.name.clone(), classify_builtin(&d.name)))
            .collect();

        for def in mcp.tool_definitions() {
            tracing::info!(tool = %def.name, "registered dynamic tool");
            kinds.insert(def.name.clone(), ToolKind::RemoteApi);
            definitions.push(def);
        }

        Self {
            definitions,
            kinds,
            mcp,
            http: reqwest::Client::new(),
        }
    }

    /// The full catalog handed to the LLM.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }

    /// Classification for a tool name. Unknown names take the local-RPC
    /// default path.
    pub fn classify(&self, name: &str) -> ToolKind {
        self.kinds.get(name).copied().unwrap_or(ToolKind::LocalRpc)
    }

    /// JSON-RPC method invoked on the client for a local tool.
    pub fn rpc_method(&self, name: &str) -> String {
        match name {
            "search_codebase" => "local/search_project".into(),
            "read_file" => "local/read_file".into(),
            "list_directory" => "local/list_directory".into(),
            "glob_find" => "local/glob_find".into(),
            other => format!("local/{other}"),
        }
    }

    pub fn tool_count(&self) -> usize {
        self.definitions.len()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Remote-API execution
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Execute a remote-API tool in-process. Always returns a string so the
    /// graph can wrap the result in a Tool message.
    pub async fn execute_remote(&self, name: &str, args: &Value) -> String {
        if self.mcp.owns(name) {
            return self.mcp.invoke_text(name, args.clone()).await;
        }
        match name {
            "web_search" => self.web_search(args).await,
            "github_read_issue" => self.github_read_issue(args).await,
            "github_create_pr" => self.github_create_pr(args).await,
            other => format!("Error executing tool {other}: no remote handler registered."),
        }
    }

    async fn web_search(&self, args: &Value) -> String {
        let query = str_arg(args, "query");
        let api_key = std::env::var("TAVILY_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            return "Error: TAVILY_API_KEY environment variable is not set.".into();
        }
        let body = serde_json::json!({
            "api_key": api_key,
            "query": query,
            "max_results": 3,
        });
        let response = self
            .http
            .post("https://api.tavily.com/search")
            .json(&body)
            .send()
            .await;
        match response {
            Ok(resp) if resp.status().is_success() => match resp.json::<Value>().await {
                Ok(results) => serde_json::to_string_pretty(&results)
                    .unwrap_or_else(|_| "(unserializable search results)".into()),
                Err(e) => format!("Failed to parse search results: {e}"),
            },
            Ok(resp) => format!("Web search failed: HTTP {}", resp.status()),
            Err(e) => format!("Web search failed: {e}"),
        }
    }

    async fn github_read_issue(&self, args: &Value) -> String {
        let repo = str_arg(args, "repo_name");
        let number = args.get("issue_number").and_then(|n| n.as_u64()).unwrap_or(0);
        let token = std::env::var("GITHUB_TOKEN").unwrap_or_default();
        if token.is_empty() {
            return "Error: GITHUB_TOKEN environment variable is not set.".into();
        }

        let url = format!("https://api.github.com/repos/{repo}/issues/{number}");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .header("User-Agent", "voco-engine")
            .header("Accept", "application/vnd.github+json")
            .send()
            .await;
        let issue: Value = match response {
            Ok(resp) if resp.status().is_success() => match resp.json().await {
                Ok(v) => v,
                Err(e) => return format!("Failed to fetch issue: {e}"),
            },
            Ok(resp) => return format!("Failed to fetch issue: HTTP {}", resp.status()),
            Err(e) => return format!("Failed to fetch issue: {e}"),
        };

        let title = issue.get("title").and_then(|t| t.as_str()).unwrap_or("");
        let body = issue
            .get("body")
            .and_then(|b| b.as_str())
            .unwrap_or("(no body)");
        let labels = issue
            .get("labels")
            .and_then(|l| l.as_array())
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|l| l.get("name").and_then(|n| n.as_str()))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "none".into());

        format!("Issue #{number}: {title}\nLabels: {labels}\n\n{body}")
    }

    async fn github_create_pr(&self, args: &Value) -> String {
        let repo = str_arg(args, "repo_name");
        let token = std::env::var("GITHUB_TOKEN").unwrap_or_default();
        if token.is_empty() {
            return "Error: GITHUB_TOKEN environment variable is not set.".into();
        }

        let body = serde_json::json!({
            "title": str_arg(args, "title"),
            "body": str_arg(args, "body"),
            "head": str_arg(args, "head_branch"),
            "base": args.get("base_branch").and_then(|b| b.as_str()).unwrap_or("main"),
        });
        let url = format!("https://api.github.com/repos/{repo}/pulls");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .header("User-Agent", "voco-engine")
            .header("Accept", "application/vnd.github+json")
            .json(&body)
            .send()
            .await;
        match response {
            Ok(resp) if resp.status().is_success() => {
                let pr: Value = resp.json().await.unwrap_or(Value::Null);
                let number = pr.get("number").and_then(|n| n.as_u64()).unwrap_or(0);
                let html_url = pr.get("html_url").and_then(|u| u.as_str()).unwrap_or("");
                format!("Created PR #{number}: {html_url}")
            }
            Ok(resp) => format!("Failed to create PR: HTTP {}", resp.status()),
            Err(e) => format!("Failed to create PR: {e}"),
        }
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> &'a str {
    args.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

fn classify_builtin(name: &str) -> ToolKind {
    match name {
        "propose_file_creation" | "propose_file_edit" => ToolKind::FileProposal,
        "propose_command" => ToolKind::CommandProposal,
        "analyze_screen" => ToolKind::InlineScreen,
        "scan_security" => ToolKind::InlineScan,
        "create_sandbox_preview" | "update_sandbox_preview" => ToolKind::SandboxPreview,
        "web_search" | "github_read_issue" | "github_create_pr" => ToolKind::RemoteApi,
        _ => ToolKind::LocalRpc,
    }
}
