use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::error::{BuildError, BuildResult, CompilationError, UnitDiagnostics};
use crate::core::java::RuntimeHandle;

/// What a compiler needs for one compilation.
#[derive(Debug, Clone)]
pub struct CompileRequest<'a> {
    pub toolchain: &'a RuntimeHandle,
    pub sources: &'a [PathBuf],
    pub classpath: &'a [PathBuf],
    pub output_dir: &'a Path,
}

/// Turns Java sources into class files in `output_dir`.
#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(&self, request: &CompileRequest<'_>) -> BuildResult<()>;
}

/// The toolchain's own `javac`.
#[derive(Debug, Clone, Default)]
pub struct JavacCompiler;

#[async_trait]
impl Compiler for JavacCompiler {
    async fn compile(&self, request: &CompileRequest<'_>) -> BuildResult<()> {
        let javac = request.toolchain.require_javac()?;
        let mut cmd = tokio::process::Command::new(javac);
        cmd.args(javac_args(request));
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        info!(
            "Compiling {} source file(s) with Java {}",
            request.sources.len(),
            request.toolchain.major
        );
        debug!("Command (copy/paste): {}", format_command_for_logs(javac, &javac_args(request)));

        let output = cmd.output().await.map_err(|e| BuildError::Io {
            path: javac.clone(),
            source: e,
        })?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut units = parse_diagnostics(&stderr);
        if units.is_empty() {
            let text = format!("{}{}", stdout.trim(), stderr.trim());
            units.push(UnitDiagnostics {
                source: PathBuf::from("javac"),
                messages: vec![if text.is_empty() {
                    format!("javac exited with {}", output.status)
                } else {
                    text
                }],
            });
        }
        Err(CompilationError { units }.into())
    }
}

fn javac_args(request: &CompileRequest<'_>) -> Vec<String> {
    let major = request.toolchain.major.to_string();
    let mut args = Vec::new();
    if request.toolchain.major >= 9 {
        args.extend(["--release".to_string(), major]);
    } else {
        args.extend(["-source".to_string(), major.clone(), "-target".to_string(), major]);
    }
    args.extend(["-encoding".to_string(), "UTF-8".to_string()]);
    args.extend(["-d".to_string(), request.output_dir.to_string_lossy().to_string()]);
    if !request.classpath.is_empty() {
        args.push("-cp".to_string());
        args.push(join_classpath(request.classpath));
    }
    args.extend(request.sources.iter().map(|s| s.to_string_lossy().to_string()));
    args
}

pub fn classpath_separator() -> &'static str {
    if cfg!(target_os = "windows") {
        ";"
    } else {
        ":"
    }
}

pub fn join_classpath(entries: &[PathBuf]) -> String {
    entries
        .iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join(classpath_separator())
}

/// Group `javac` error output by source file.
///
/// ```text
/// src/main/java/a/B.java:12: error: cannot find symbol
///         foo();
///         ^
///   symbol:   method foo()
/// 1 error
/// ```
///
/// Continuation lines belong to the preceding message. Warnings are dropped.
pub fn parse_diagnostics(stderr: &str) -> Vec<UnitDiagnostics> {
    let mut units: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
    let mut current: Option<PathBuf> = None;

    for line in stderr.lines() {
        if let Some((source, line_no, kind, message)) = split_header(line) {
            if kind == "error" {
                units
                    .entry(source.clone())
                    .or_default()
                    .push(format!("line {line_no}: {message}"));
                current = Some(source);
            } else {
                current = None;
            }
            continue;
        }
        if is_summary(line) {
            current = None;
            continue;
        }
        if let Some(messages) = current.as_ref().and_then(|s| units.get_mut(s)) {
            if let Some(last) = messages.last_mut() {
                last.push('\n');
                last.push_str(line);
            }
        }
    }

    units
        .into_iter()
        .map(|(source, messages)| UnitDiagnostics { source, messages })
        .collect()
}

/// `<file>.java:<line>: <kind>: <message>`
fn split_header(line: &str) -> Option<(PathBuf, u32, &str, &str)> {
    let idx = line.find(".java:")?;
    let source = PathBuf::from(&line[..idx + 5]);
    let rest = &line[idx + 6..];
    let (line_no, rest) = rest.split_once(':')?;
    let line_no = line_no.parse().ok()?;
    let (kind, message) = rest.trim_start().split_once(':')?;
    Some((source, line_no, kind.trim(), message.trim()))
}

/// `3 errors`, `1 warning`
fn is_summary(line: &str) -> bool {
    let mut parts = line.split_whitespace();
    matches!(
        (parts.next().map(|n| n.parse::<u32>().is_ok()), parts.next(), parts.next()),
        (Some(true), Some("error" | "errors" | "warning" | "warnings"), None)
    )
}

fn format_command_for_logs(program: &Path, args: &[String]) -> String {
    std::iter::once(shell_escape(&program.to_string_lossy()))
        .chain(args.iter().map(|a| shell_escape(a)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }
    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=' | ';')
    }) {
        return raw.to_string();
    }
    format!("\"{}\"", raw.replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_errors_per_source_file() {
        let stderr = "\
src/main/java/com/example/A.java:3: error: cannot find symbol
        foo();
        ^
  symbol:   method foo()
src/main/java/com/example/B.java:7: warning: [deprecation] bar() is deprecated
src/main/java/com/example/B.java:9: error: ';' expected
src/main/java/com/example/A.java:5: error: missing return statement
3 errors
1 warning
";
        let units = parse_diagnostics(stderr);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].source, PathBuf::from("src/main/java/com/example/A.java"));
        assert_eq!(units[0].messages.len(), 2);
        assert!(units[0].messages[0].starts_with("line 3: cannot find symbol\n"));
        assert!(units[0].messages[0].contains("symbol:   method foo()"));
        assert_eq!(units[1].messages, vec!["line 9: ';' expected"]);
    }

    #[test]
    fn javac_arguments() {
        let toolchain = RuntimeHandle {
            java_home: PathBuf::from("/jdk"),
            java_bin: PathBuf::from("/jdk/bin/java"),
            javac_bin: Some(PathBuf::from("/jdk/bin/javac")),
            version: "21.0.5".into(),
            major: 21,
            vendor: "Eclipse Adoptium".into(),
            provisioned: false,
        };
        let sources = vec![PathBuf::from("A.java")];
        let classpath = vec![PathBuf::from("a.jar"), PathBuf::from("b.jar")];
        let args = javac_args(&CompileRequest {
            toolchain: &toolchain,
            sources: &sources,
            classpath: &classpath,
            output_dir: Path::new("out"),
        });
        let sep = classpath_separator();
        assert_eq!(
            args,
            vec![
                "--release".to_string(),
                "21".into(),
                "-encoding".into(),
                "UTF-8".into(),
                "-d".into(),
                "out".into(),
                "-cp".into(),
                format!("a.jar{sep}b.jar"),
                "A.java".into(),
            ]
        );
    }
}
