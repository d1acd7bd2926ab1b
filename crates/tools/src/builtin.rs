//! Built-in tool definitions.
//!
//! The engine never touches the user's filesystem directly — local tools
//! signal intent and the desktop client executes. Descriptions are written
//! for the model: they say when to reach for the tool, not how it works.

use serde_json::json;

use voco_domain::tool::ToolDefinition;

fn tool(name: &str, description: &str, parameters: serde_json::Value) -> ToolDefinition {
    ToolDefinition {
        name: name.into(),
        description: description.into(),
        parameters,
    }
}

fn string_prop(description: &str) -> serde_json::Value {
    json!({ "type": "string", "description": description })
}

/// All built-in tools, in registration order.
pub fn builtin_definitions() -> Vec<ToolDefinition> {
    vec![
        tool(
            "search_codebase",
            "Search for code patterns in the active project using ripgrep. Use this \
             when the user asks to find code, locate a function, or grep for any text \
             across the codebase.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": string_prop("Regex or literal string to search for."),
                    "project_path": string_prop("Absolute path to the project directory."),
                },
                "required": ["pattern", "project_path"],
            }),
        ),
        tool(
            "read_file",
            "Read the contents of a file in the user's project.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": string_prop("Path of the file to read, relative to the project root."),
                    "project_path": string_prop("Absolute path to the project directory."),
                },
                "required": ["file_path"],
            }),
        ),
        tool(
            "list_directory",
            "List the entries of a directory in the user's project.",
            json!({
                "type": "object",
                "properties": {
                    "path": string_prop("Directory to list, relative to the project root."),
                    "project_path": string_prop("Absolute path to the project directory."),
                },
                "required": ["path"],
            }),
        ),
        tool(
            "glob_find",
            "Find files matching a glob pattern in the user's project.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": string_prop("Glob pattern, e.g. 'src/**/*.ts'."),
                    "project_path": string_prop("Absolute path to the project directory."),
                },
                "required": ["pattern"],
            }),
        ),
        tool(
            "propose_file_creation",
            "Propose creating a new file in the user's project. The proposal is shown \
             to the user for review before anything is written.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": string_prop("Relative path for the new file."),
                    "content": string_prop("Full content of the new file."),
                    "description": string_prop("Short summary of what this file does."),
                },
                "required": ["file_path", "content", "description"],
            }),
        ),
        tool(
            "propose_file_edit",
            "Propose editing an existing file in the user's project. The proposal is \
             shown to the user for review before any change is made.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": string_prop("Relative path of the file to edit."),
                    "diff": string_prop("Unified diff or a clear description of the change."),
                    "description": string_prop("Short summary of what this edit does."),
                },
                "required": ["file_path", "diff", "description"],
            }),
        ),
        tool(
            "propose_command",
            "Propose a terminal command for the user to approve before execution. ALL \
             shell commands must go through this tool so the human stays in the loop.",
            json!({
                "type": "object",
                "properties": {
                    "command": string_prop("The shell command to execute."),
                    "description": string_prop("Short explanation of what this command does."),
                    "project_path": string_prop("Directory to run the command in."),
                },
                "required": ["command", "description"],
            }),
        ),
        tool(
            "analyze_screen",
            "Capture and analyze the user's screen. Use this when the user asks what is \
             on their screen or wants a visible bug diagnosed.",
            json!({
                "type": "object",
                "properties": {
                    "user_description": string_prop("What the user says is happening on screen."),
                },
            }),
        ),
        tool(
            "scan_security",
            "Run a security scan over the active project and summarize the findings.",
            json!({
                "type": "object",
                "properties": {
                    "project_path": string_prop("Absolute path to the project to scan."),
                },
            }),
        ),
        tool(
            "create_sandbox_preview",
            "Serve an HTML page in the sandbox preview pane so the user can see a live \
             mock-up immediately.",
            json!({
                "type": "object",
                "properties": {
                    "html_code": string_prop("Complete self-contained HTML document."),
                },
                "required": ["html_code"],
            }),
        ),
        tool(
            "update_sandbox_preview",
            "Replace the HTML currently shown in the sandbox preview pane.",
            json!({
                "type": "object",
                "properties": {
                    "html_code": string_prop("Complete self-contained HTML document."),
                },
                "required": ["html_code"],
            }),
        ),
        tool(
            "web_search",
            "Search the web for current documentation, library updates, error solutions, \
             or external technical knowledge not found in the local codebase.",
            json!({
                "type": "object",
                "properties": {
                    "query": string_prop("The search query."),
                },
                "required": ["query"],
            }),
        ),
        tool(
            "github_read_issue",
            "Fetch the title, body, and labels of a GitHub issue.",
            json!({
                "type": "object",
                "properties": {
                    "repo_name": string_prop("Repository in 'owner/repo' format."),
                    "issue_number": { "type": "integer", "description": "The issue number." },
                },
                "required": ["repo_name", "issue_number"],
            }),
        ),
        tool(
            "github_create_pr",
            "Create a pull request on GitHub. Commit and push the branch first.",
            json!({
                "type": "object",
                "properties": {
                    "repo_name": string_prop("Repository in 'owner/repo' format."),
                    "title": string_prop("PR title."),
                    "body": string_prop("PR description (markdown)."),
                    "head_branch": string_prop("The branch with the changes."),
                    "base_branch": string_prop("Target branch to merge into (default: main)."),
                },
                "required": ["repo_name", "title", "body", "head_branch"],
            }),
        ),
    ]
}
