//! Restricted in-process executor.
//!
//! Runs trusted-language payloads without container isolation: a static
//! denylist scan rejects dangerous imports and call targets before anything
//! executes, then the payload runs in a minimal interpreter whose namespace
//! holds only safe builtins.
//!
//! Timeout enforcement races a wall-clock deadline against a dedicated worker
//! thread. On expiry the worker is detached, not killed: a pathological
//! non-yielding loop keeps its thread until process exit. This is a known
//! residual risk of the tier, accepted in exchange for zero process overhead;
//! payloads that need a hard kill belong in the subprocess or container tier.

mod interp;
mod lexer;
mod parser;

pub use interp::BUILTINS;

use std::collections::HashSet;
use std::sync::mpsc;
use std::time::Duration;

use tierbox_core::{Error, Result};

// =============================================================================
// Denylist
// =============================================================================

/// Forbidden import and call targets, checked by static scan before any
/// statement executes. Swappable per language.
#[derive(Debug, Clone)]
pub struct DenySet {
    pub imports: HashSet<String>,
    pub calls: HashSet<String>,
}

impl DenySet {
    /// Default denylist for the primary scripting language.
    pub fn python_default() -> Self {
        let imports = [
            "os", "sys", "subprocess", "shutil", "socket", "importlib", "ctypes", "pickle",
            "marshal", "signal", "threading", "multiprocessing", "pathlib", "io", "builtins",
            "urllib", "http",
        ];
        let calls = [
            "eval", "exec", "open", "compile", "__import__", "getattr", "setattr", "delattr",
            "globals", "locals", "vars", "input", "exit", "quit", "breakpoint", "memoryview",
        ];
        Self {
            imports: imports.iter().map(|s| s.to_string()).collect(),
            calls: calls.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Scan `source` for denylisted imports and call targets.
    ///
    /// Runs before parsing, so even payloads the interpreter would reject are
    /// security-checked first.
    pub fn scan(&self, source: &str) -> Result<()> {
        for line in source.lines() {
            let line = line.trim_start();
            if let Some(rest) = line.strip_prefix("import ") {
                for module in rest.split(',') {
                    self.check_import(module)?;
                }
            } else if let Some(rest) = line.strip_prefix("from ") {
                if let Some(module) = rest.split_whitespace().next() {
                    self.check_import(module)?;
                }
            }
        }

        for target in call_targets(source) {
            if self.calls.contains(&target) {
                return Err(Error::security(format!(
                    "use of denylisted call '{}'",
                    target
                )));
            }
        }
        Ok(())
    }

    fn check_import(&self, module: &str) -> Result<()> {
        // "import os.path as p" denies on the root segment
        let module = module.trim();
        let root = module
            .split_whitespace()
            .next()
            .unwrap_or(module)
            .split('.')
            .next()
            .unwrap_or(module);
        if self.imports.contains(root) {
            return Err(Error::security(format!(
                "use of denylisted import '{}'",
                root
            )));
        }
        Ok(())
    }
}

/// Every identifier immediately followed by `(` in `source`.
fn call_targets(source: &str) -> Vec<String> {
    let chars: Vec<char> = source.chars().collect();
    let mut targets = Vec::new();
    let mut i = 0usize;
    while i < chars.len() {
        let c = chars[i];
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let mut j = i;
            while j < chars.len() && (chars[j] == ' ' || chars[j] == '\t') {
                j += 1;
            }
            if chars.get(j) == Some(&'(') {
                targets.push(chars[start..i].iter().collect());
            }
        } else {
            i += 1;
        }
    }
    targets
}

// =============================================================================
// Executor
// =============================================================================

/// Captured output of a restricted-tier run.
#[derive(Debug, Clone)]
pub struct RestrictedOutput {
    pub stdout: String,
    pub stderr: String,
}

impl RestrictedOutput {
    /// Success iff the error buffer is empty.
    pub fn success(&self) -> bool {
        self.stderr.is_empty()
    }
}

/// Restricted in-process executor for the primary scripting language.
pub struct RestrictedExecutor {
    deny: DenySet,
    output_cap: usize,
}

impl RestrictedExecutor {
    pub fn new(output_cap: usize) -> Self {
        Self {
            deny: DenySet::python_default(),
            output_cap,
        }
    }

    pub fn with_denylist(mut self, deny: DenySet) -> Self {
        self.deny = deny;
        self
    }

    /// Scan, then run `source` on a worker thread with a wall-clock deadline.
    pub fn execute(&self, source: &str, timeout: Duration) -> Result<RestrictedOutput> {
        self.execute_with_cap(source, timeout, self.output_cap)
    }

    /// Like [`execute`](Self::execute) with a per-call output cap.
    pub fn execute_with_cap(
        &self,
        source: &str,
        timeout: Duration,
        output_cap: usize,
    ) -> Result<RestrictedOutput> {
        self.deny.scan(source)?;

        let payload = source.to_string();
        let cap = output_cap;
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("restricted-exec".to_string())
            .spawn(move || {
                let _ = tx.send(run_payload(&payload, cap));
            })
            .map_err(|e| Error::internal(format!("failed to spawn worker thread: {}", e)))?;

        match rx.recv_timeout(timeout) {
            Ok(output) => Ok(output),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(?timeout, "restricted payload timed out, detaching worker thread");
                Err(Error::timeout(format!(
                    "payload exceeded {:?} (worker thread detached)",
                    timeout
                )))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(Error::internal("restricted worker thread panicked"))
            }
        }
    }
}

fn run_payload(source: &str, output_cap: usize) -> RestrictedOutput {
    let parsed = lexer::tokenize(source).and_then(|tokens| parser::Parser::new(tokens).parse_program());
    match parsed {
        Ok(program) => {
            let mut interp = interp::Interp::new(output_cap);
            let stderr = match interp.run(&program) {
                Ok(()) => String::new(),
                Err(e) => e,
            };
            RestrictedOutput {
                stdout: interp.stdout.into_string(),
                stderr,
            }
        }
        Err(e) => RestrictedOutput {
            stdout: String::new(),
            stderr: e,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_clean_payload_succeeds() {
        let executor = RestrictedExecutor::new(10_000);
        let out = executor.execute("print(2+2)", TIMEOUT).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "4\n");
    }

    #[test]
    fn test_denylisted_import_names_module() {
        let executor = RestrictedExecutor::new(10_000);
        let err = executor.execute("import os", TIMEOUT).unwrap_err();
        match err {
            Error::Security(msg) => assert!(msg.contains("'os'"), "message was: {}", msg),
            other => panic!("expected security error, got {:?}", other),
        }
    }

    #[test]
    fn test_denylist_fires_before_any_statement_runs() {
        let executor = RestrictedExecutor::new(10_000);
        // the print on line 1 must never execute
        let err = executor
            .execute("print('side effect')\nimport subprocess", TIMEOUT)
            .unwrap_err();
        assert!(matches!(err, Error::Security(_)));
    }

    #[test]
    fn test_denylisted_call_rejected() {
        let executor = RestrictedExecutor::new(10_000);
        for payload in ["eval('1+1')", "open('/etc/passwd')", "__import__ ('os')"] {
            let err = executor.execute(payload, TIMEOUT).unwrap_err();
            assert!(matches!(err, Error::Security(_)), "payload: {}", payload);
        }
    }

    #[test]
    fn test_from_import_rejected() {
        let executor = RestrictedExecutor::new(10_000);
        let err = executor
            .execute("from subprocess import run", TIMEOUT)
            .unwrap_err();
        match err {
            Error::Security(msg) => assert!(msg.contains("'subprocess'")),
            other => panic!("expected security error, got {:?}", other),
        }
    }

    #[test]
    fn test_dotted_import_denied_on_root() {
        let executor = RestrictedExecutor::new(10_000);
        assert!(executor.execute("import os.path", TIMEOUT).is_err());
    }

    #[test]
    fn test_runtime_error_is_failure_not_error() {
        let executor = RestrictedExecutor::new(10_000);
        let out = executor.execute("print(1/0)", TIMEOUT).unwrap();
        assert!(!out.success());
        assert!(out.stderr.contains("zero"));
    }

    #[test]
    fn test_timeout_detaches_thread() {
        let executor = RestrictedExecutor::new(10_000);
        let err = executor
            .execute("while True:\n    x = 1", Duration::from_millis(200))
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[test]
    fn test_per_call_output_cap() {
        let executor = RestrictedExecutor::new(10_000);
        let out = executor
            .execute_with_cap("print('aaaaaaaaaa' * 10)", TIMEOUT, 20)
            .unwrap();
        assert!(out.success());
        assert!(out.stdout.contains("(output truncated)"));
    }

    #[test]
    fn test_benign_call_names_allowed() {
        let executor = RestrictedExecutor::new(10_000);
        let out = executor
            .execute("xs = sorted([3, 1, 2])\nprint(len(xs))", TIMEOUT)
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "3\n");
    }
}
