use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::agent::{AgentTool, ToolContext, ToolHandler};
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolArgument};

pub const EXEC_TIMEOUT: Duration = Duration::from_secs(60);
pub const PYTHON_DEFAULT_PATH: &str = "/mnt/data/main.py";

/// Commands that would just open an interactive prompt
const INTERACTIVE_COMMANDS: [&str; 3] = ["python", "python3", "node"];

pub fn exec() -> AgentTool {
    exec_with_timeout(EXEC_TIMEOUT)
}

pub fn exec_with_timeout(timeout: Duration) -> AgentTool {
    AgentTool::new(
        Tool::new("exec")
            .with_description(
                "Executes a command in non interactive, text only linux environment. \
                 Do not use interactive commands like nano, vim, etc. because you are gonna get stuck.",
            )
            .with_argument(ToolArgument::string("command").required()),
        ExecTool { timeout },
    )
}

pub fn save_file() -> AgentTool {
    AgentTool::new(
        Tool::new("save_file")
            .with_description("Saves a file at given path. Use it instead of echo.")
            .with_argument(
                ToolArgument::string("text")
                    .required()
                    .with_description("Source code"),
            )
            .with_argument(
                ToolArgument::string("path")
                    .required()
                    .with_description("Absolute path"),
            ),
        SaveFileTool,
    )
}

pub fn python() -> AgentTool {
    AgentTool::new(
        Tool::new("python")
            .with_description("Executes Python code as actual Python file.")
            .with_argument(
                ToolArgument::string("code")
                    .required()
                    .with_description("You MUST use `plt.savefig(PATH)` to save plots."),
            ),
        PythonTool,
    )
}

/// Package manager output is long and useless to the model once it succeeded
fn is_noisy_install(command: &str) -> bool {
    let has = |needle: &str| command.contains(needle);
    (has("pip") && has("install"))
        || (has("npm") && has("install"))
        || (has("yarn") && has("install"))
        || (has("apt-get") && (has("install") || has("update")))
}

struct ExecTool {
    timeout: Duration,
}

#[async_trait]
impl ToolHandler for ExecTool {
    async fn call(&self, ctx: &mut ToolContext<'_>) -> AgentResult<()> {
        let command = ctx.str_arg("command")?.to_string();

        if INTERACTIVE_COMMANDS.contains(&command.trim()) {
            debug!("Skipping interactive command {}", command);
            ctx.out.command(Some(command), "", 0);
            return Ok(());
        }

        let output = tokio::time::timeout(self.timeout, ctx.sandbox.exec(&command))
            .await
            .map_err(|_| AgentError::Timeout(self.timeout.as_secs()))??;

        let exit_code = output.code();
        let stdout = if exit_code == 0 && is_noisy_install(&command) {
            String::new()
        } else {
            output.stdout
        };
        ctx.out.command(Some(command), stdout, exit_code);
        Ok(())
    }
}

struct SaveFileTool;

#[async_trait]
impl ToolHandler for SaveFileTool {
    async fn call(&self, ctx: &mut ToolContext<'_>) -> AgentResult<()> {
        let text = ctx.str_arg("text")?.to_string();
        let path = ctx.str_arg("path")?.to_string();

        let output = ctx.sandbox.write_file(&path, &text).await?;
        let exit_code = output.code();
        ctx.out.command(None, output.stdout, exit_code);
        if exit_code == 0 {
            ctx.out.text(format!("Saved file at {}", path));
        }
        Ok(())
    }
}

struct PythonTool;

#[async_trait]
impl ToolHandler for PythonTool {
    async fn call(&self, ctx: &mut ToolContext<'_>) -> AgentResult<()> {
        let code = ctx.str_arg("code")?.to_string();

        // `python3 script.py` runs an existing file instead of inline code
        let trimmed = code.trim();
        let script = trimmed
            .strip_prefix("python3 ")
            .or_else(|| trimmed.strip_prefix("python "))
            .and_then(|rest| rest.split_whitespace().next());

        let path = match script {
            Some(path) => {
                if !ctx.sandbox.exists(path).await? {
                    return Err(AgentError::ExecutionError(format!(
                        "File not found: {}",
                        path
                    )));
                }
                path.to_string()
            }
            None => {
                if code.contains("plt.show()") && !code.contains("plt.savefig(") {
                    return Err(AgentError::ExecutionError(
                        "You MUST use `plt.savefig(PATH)` to save plots.".into(),
                    ));
                }
                ctx.sandbox.write_file(PYTHON_DEFAULT_PATH, &code).await?;
                PYTHON_DEFAULT_PATH.to_string()
            }
        };

        let command = format!("python3 {}", path);
        let output = ctx.sandbox.exec(&command).await?;
        let exit_code = output.code();
        ctx.out.command(Some(command), output.stdout, exit_code);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentState;
    use crate::models::artifact::Artifact;
    use crate::models::message::{Message, ToolCall};
    use crate::providers::mock::MockSandbox;
    use crate::sandbox::{CommandOutput, Sandbox};
    use anyhow::Result;
    use serde_json::{json, Value};
    use std::sync::Arc;

    async fn run(tool: &AgentTool, sandbox: Arc<dyn Sandbox>, args: Value) -> AgentResult<Vec<Artifact>> {
        let call = ToolCall::new("1", tool.id(), args.clone());
        let message = Message::assistant().with_tool_call(call.clone());
        let mut state = AgentState::new();
        let mut ctx = ToolContext::new(
            args.as_object().cloned().unwrap_or_default(),
            "worker",
            &mut state,
            &tool.tool,
            (message, call),
            sandbox,
        )?;
        tool.call(&mut ctx).await?;
        Ok(ctx.out.into_artifacts())
    }

    #[tokio::test]
    async fn test_exec_returns_command_artifact() {
        let sandbox = Arc::new(
            MockSandbox::new().with_output("ls /mnt/data", CommandOutput::new("main.py\n", 0)),
        );
        let artifacts = run(&exec(), sandbox, json!({"command": "ls /mnt/data"}))
            .await
            .unwrap();
        assert_eq!(
            artifacts,
            vec![Artifact::command(Some("ls /mnt/data".into()), "main.py\n", 0)]
        );
    }

    #[tokio::test]
    async fn test_exec_skips_interactive_commands() {
        let sandbox = Arc::new(MockSandbox::new());
        let artifacts = run(&exec(), sandbox.clone(), json!({"command": " python3 "}))
            .await
            .unwrap();
        assert_eq!(
            artifacts,
            vec![Artifact::command(Some(" python3 ".into()), "", 0)]
        );
        assert!(sandbox.commands().is_empty());
    }

    #[tokio::test]
    async fn test_exec_blanks_successful_installs() {
        let sandbox = Arc::new(
            MockSandbox::new()
                .with_output("pip install numpy", CommandOutput::new("lots of output", 0))
                .with_output("npm install left-pad", CommandOutput::new("npm ERR!", 1)),
        );
        let ok = run(&exec(), sandbox.clone(), json!({"command": "pip install numpy"}))
            .await
            .unwrap();
        assert_eq!(ok, vec![Artifact::command(Some("pip install numpy".into()), "", 0)]);

        let failed = run(&exec(), sandbox, json!({"command": "npm install left-pad"}))
            .await
            .unwrap();
        assert_eq!(
            failed,
            vec![Artifact::command(Some("npm install left-pad".into()), "npm ERR!", 1)]
        );
    }

    struct StuckSandbox;

    #[async_trait]
    impl Sandbox for StuckSandbox {
        async fn exec(&self, _command: &str) -> Result<CommandOutput> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(CommandOutput::default())
        }

        async fn write_file(&self, _path: &str, _text: &str) -> Result<CommandOutput> {
            Ok(CommandOutput::default())
        }

        async fn exists(&self, _path: &str) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_exec_deadline() {
        let tool = exec_with_timeout(Duration::from_millis(20));
        let err = run(&tool, Arc::new(StuckSandbox), json!({"command": "sleep 100"}))
            .await
            .unwrap_err();
        assert_eq!(err, AgentError::Timeout(0));
    }

    #[tokio::test]
    async fn test_save_file() {
        let sandbox = Arc::new(MockSandbox::new());
        let artifacts = run(
            &save_file(),
            sandbox.clone(),
            json!({"text": "print(1)", "path": "/mnt/data/a.py"}),
        )
        .await
        .unwrap();
        assert_eq!(
            artifacts,
            vec![
                Artifact::command(None, "", 0),
                Artifact::text("Saved file at /mnt/data/a.py")
            ]
        );
        assert_eq!(
            sandbox.files.lock().unwrap().get("/mnt/data/a.py").map(String::as_str),
            Some("print(1)")
        );
    }

    #[tokio::test]
    async fn test_python_writes_and_runs_code() {
        let sandbox = Arc::new(MockSandbox::new().with_output(
            "python3 /mnt/data/main.py",
            CommandOutput::new("2\n", 0),
        ));
        let artifacts = run(&python(), sandbox.clone(), json!({"code": "print(1 + 1)"}))
            .await
            .unwrap();
        assert_eq!(
            artifacts,
            vec![Artifact::command(Some("python3 /mnt/data/main.py".into()), "2\n", 0)]
        );
        assert_eq!(
            sandbox.files.lock().unwrap().get(PYTHON_DEFAULT_PATH).map(String::as_str),
            Some("print(1 + 1)")
        );
    }

    #[tokio::test]
    async fn test_python_runs_existing_script() {
        let sandbox = Arc::new(MockSandbox::new());
        sandbox
            .write_file("/mnt/data/job.py", "print('job')")
            .await
            .unwrap();

        run(&python(), sandbox.clone(), json!({"code": "python3 /mnt/data/job.py"}))
            .await
            .unwrap();
        assert_eq!(sandbox.commands(), vec!["python3 /mnt/data/job.py".to_string()]);
        assert!(!sandbox.files.lock().unwrap().contains_key(PYTHON_DEFAULT_PATH));

        let err = run(&python(), sandbox, json!({"code": "python missing.py"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "File not found: missing.py");
    }

    #[tokio::test]
    async fn test_python_requires_savefig() {
        let sandbox = Arc::new(MockSandbox::new());
        let err = run(
            &python(),
            sandbox.clone(),
            json!({"code": "import matplotlib.pyplot as plt\nplt.plot([1])\nplt.show()"}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "You MUST use `plt.savefig(PATH)` to save plots.");
        assert!(sandbox.commands().is_empty());
    }
}
