//! Local subprocess connector for the `local` `LLM_TYPE` (§4.4): invokes a
//! llama.cpp-compatible executable with a controlled argument vector and
//! strips the echoed prompt prefix from stdout.

use async_trait::async_trait;
use pipeline_core::prelude::*;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

mod config;
pub use config::LocalLlmConfig;

pub struct LocalLlmConnector {
    config: LocalLlmConfig,
}

impl LocalLlmConnector {
    pub fn new(config: LocalLlmConfig) -> Self {
        Self { config }
    }

    fn command(&self, prompt: &str, max_tokens: u32) -> Command {
        let mut cmd = Command::new(&self.config.llama_executable);
        cmd.arg("-m")
            .arg(&self.config.model_path)
            .arg("-t")
            .arg(self.config.threads.to_string())
            .arg("--n-gpu-layers")
            .arg(self.config.gpu_layers.to_string())
            .arg("--ctx-size")
            .arg(self.config.ctx_size.to_string())
            .arg("-n")
            .arg(max_tokens.to_string())
            .arg("--temp")
            .arg(self.config.temperature.to_string())
            .arg("-p")
            .arg(prompt)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

#[async_trait]
impl LlmConnector for LocalLlmConnector {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
        debug!(prompt_preview = %&prompt[..prompt.len().min(100)], "invoking local llm subprocess");

        let output = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            self.command(prompt, max_tokens).output(),
        )
        .await
        .map_err(|_| LlmError::Timeout)?
        .map_err(|e| LlmError::InternalError(format!("failed to spawn {}: {e}", self.config.llama_executable)))?;

        if !output.status.success() {
            warn!(
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "local llm subprocess exited non-zero"
            );
            return Err(LlmError::InternalError(format!(
                "subprocess exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let trimmed = match stdout.find(prompt) {
            Some(idx) => &stdout[idx + prompt.len()..],
            None => &stdout,
        };
        Ok(trimmed.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Writes a shell script that echoes the prompt back followed by a fixed
    /// continuation, mimicking llama.cpp's behaviour of printing the prompt
    /// before the generated text.
    async fn fake_llama_script(dir: &std::path::Path, continuation: &str) -> String {
        let path = dir.join("fake-llama.sh");
        tokio::fs::write(&path, format!("#!/bin/bash\nlast=\"${{@: -1}}\"\nprintf '%s%s' \"$last\" \"{continuation}\"\n"))
            .await
            .unwrap();
        let mut perms = tokio::fs::metadata(&path).await.unwrap().permissions();
        perms.set_mode(0o755);
        tokio::fs::set_permissions(&path, perms).await.unwrap();
        path.to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn generate_strips_echoed_prompt_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_llama_script(dir.path(), " the answer is 4").await;
        let connector = LocalLlmConnector::new(LocalLlmConfig::new(script, "unused.gguf"));

        let output = connector.generate("what is 2+2?", 16).await.unwrap();
        assert_eq!(output, "the answer is 4");
    }

    #[tokio::test]
    async fn nonexistent_executable_becomes_internal_error() {
        let connector = LocalLlmConnector::new(LocalLlmConfig::new("/no/such/binary", "unused.gguf"));
        let err = connector.generate("hi", 16).await.unwrap_err();
        assert!(matches!(err, LlmError::InternalError(_)));
    }

    #[tokio::test]
    async fn complete_chat_uses_default_tag_framing() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_llama_script(dir.path(), " hi there").await;
        let connector = LocalLlmConnector::new(LocalLlmConfig::new(script, "unused.gguf"));

        let messages = vec![ChatMessage::system("be terse"), ChatMessage::user("hello")];
        let output = connector.complete_chat(&messages, 16).await.unwrap();
        assert_eq!(output, "hi there");
    }
}
