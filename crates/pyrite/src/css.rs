//! External style post-processor invocation.
//!
//! The collected style-class set is handed to an external CLI (by default the
//! tailwind binary) on stdin as a minimal HTML document; its stdout is the
//! generated stylesheet. A non-zero exit is an external-tool failure and
//! aborts the translation.

use std::{
    collections::BTreeSet,
    io::Write,
    process::{Command, Stdio},
};

use crate::error::{CompileError, CompileResult};

/// Shell-out wrapper for the style post-processor.
#[derive(Debug, Clone)]
pub struct StyleProcessor {
    program: String,
}

impl Default for StyleProcessor {
    fn default() -> Self {
        Self {
            program: "tailwindcss".to_string(),
        }
    }
}

impl StyleProcessor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Generates CSS for the given style classes.
    pub fn generate(&self, classes: &BTreeSet<String>) -> CompileResult<String> {
        let tokens: Vec<&str> = classes.iter().map(String::as_str).collect();
        let html = format!("<div class=\"{}\"></div>", tokens.join(" "));

        let mut child = Command::new(&self.program)
            .args(["--content", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CompileError::external(format!("failed to launch `{}`: {e}", self.program)))?;
        child
            .stdin
            .take()
            .expect("stdin piped")
            .write_all(html.as_bytes())
            .map_err(|e| CompileError::external(format!("failed to write to `{}`: {e}", self.program)))?;
        let output = child
            .wait_with_output()
            .map_err(|e| CompileError::external(format!("`{}` did not finish: {e}", self.program)))?;
        if !output.status.success() {
            return Err(CompileError::external(format!(
                "`{}` exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim(),
            )));
        }
        String::from_utf8(output.stdout).map_err(|e| CompileError::external(format!("invalid stylesheet output: {e}")))
    }
}
