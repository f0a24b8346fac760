use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::process::Command;
use url::Url;

use crate::capture::{Capturer, Navigator, Session};
use crate::config::{CaptureCommandConfig, CommandSpec};
use crate::formats::PageDescriptor;

pub const SESSION_DIR_ENV: &str = "BOOKGRAB_SESSION_DIR";
pub const BOOK_ID_ENV: &str = "BOOKGRAB_BOOK_ID";

/// Drives an external renderer (headless browser script) once per page.
///
/// Each capture spawns its own process, so every concurrent capture owns a
/// separate browsing context. Processes are killed if the capture future is
/// dropped, e.g. on timeout.
#[derive(Debug, Clone)]
pub struct CommandAdapter {
    config: CaptureCommandConfig,
}

impl CommandAdapter {
    pub fn new(config: CaptureCommandConfig) -> Self {
        Self { config }
    }

    fn reader_url(&self, book_id: &str, page: &PageDescriptor) -> anyhow::Result<Url> {
        if self.config.reader_url.trim().is_empty() {
            anyhow::bail!("capture.reader_url is not configured");
        }
        let page_num = page.page_num.to_string();
        let raw = expand_placeholders(
            &self.config.reader_url,
            &[
                ("book_id", book_id),
                ("page_id", page.id.as_str()),
                ("page_num", page_num.as_str()),
            ],
        );
        let url = Url::parse(&raw).with_context(|| format!("parse reader url: {raw}"))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!("reader url must be http/https: {url}");
        }
        Ok(url)
    }
}

#[async_trait]
impl Navigator for CommandAdapter {
    async fn open_session(&self, book_id: &str) -> anyhow::Result<Session> {
        let mut session = Session::new(book_id)?;

        let Some(login) = self.config.login.as_ref() else {
            tracing::debug!("no login command configured; using anonymous session");
            return Ok(session);
        };

        tracing::info!(program = %login.program, book_id, "logging in");
        let args = login
            .args
            .iter()
            .map(|arg| expand_placeholders(arg, &[("book_id", book_id)]))
            .collect::<Vec<_>>();
        let output = Command::new(&login.program)
            .args(&args)
            .env(SESSION_DIR_ENV, session.dir())
            .env(BOOK_ID_ENV, book_id)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("spawn login command: {}", login.program))?;
        if !output.status.success() {
            anyhow::bail!(
                "login command failed ({}): {}",
                output.status,
                stderr_tail(&output.stderr)
            );
        }

        for (key, value) in parse_env_lines(&String::from_utf8_lossy(&output.stdout)) {
            session.set_env(key, value);
        }
        tracing::info!(credentials = session.env().len(), "session established");
        Ok(session)
    }
}

#[async_trait]
impl Capturer for CommandAdapter {
    async fn capture(
        &self,
        session: &Session,
        page: &PageDescriptor,
        target: &Path,
    ) -> anyhow::Result<PathBuf> {
        let CommandSpec { program, args } = &self.config.command;
        if program.trim().is_empty() {
            anyhow::bail!("capture.command.program is not configured");
        }

        let url = self.reader_url(session.book_id(), page)?;
        let page_num = page.page_num.to_string();
        let out = target.to_string_lossy();
        let vars = [
            ("url", url.as_str()),
            ("out", &*out),
            ("book_id", session.book_id()),
            ("page_id", page.id.as_str()),
            ("page_num", page_num.as_str()),
            ("title", page.title.as_str()),
        ];
        let args = args
            .iter()
            .map(|arg| expand_placeholders(arg, &vars))
            .collect::<Vec<_>>();

        tracing::debug!(%program, ?args, page_num = page.page_num, "capture command");
        let output = Command::new(program)
            .args(&args)
            .envs(session.env().iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env(SESSION_DIR_ENV, session.dir())
            .env(BOOK_ID_ENV, session.book_id())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("spawn capture command: {program}"))?;
        if !output.status.success() {
            anyhow::bail!(
                "capture command failed ({}): {}",
                output.status,
                stderr_tail(&output.stderr)
            );
        }

        let meta = tokio::fs::metadata(target)
            .await
            .with_context(|| format!("capture produced no artifact: {}", target.display()))?;
        if !meta.is_file() {
            anyhow::bail!("capture artifact is not a file: {}", target.display());
        }
        Ok(target.to_path_buf())
    }
}

/// Replaces every `{name}` in `template` with its value; unknown names stay.
/// Replaces `{name}` with its value in a single pass; substituted values are
/// never expanded again and unknown placeholders are kept verbatim.
pub fn expand_placeholders(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let value = tail.find('}').and_then(|close| {
            let name = &tail[1..close];
            vars.iter()
                .find(|(var, _)| *var == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// `KEY=VALUE` lines; blanks, comments and malformed lines are ignored.
fn parse_env_lines(stdout: &str) -> Vec<(String, String)> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value))
        .filter(|(key, _)| !key.is_empty() && !key.contains(char::is_whitespace))
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines = text.lines().collect::<Vec<_>>();
    let start = lines.len().saturating_sub(5);
    lines[start..].join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(program: &str, args: &[&str], login: Option<CommandSpec>) -> CommandAdapter {
        CommandAdapter::new(CaptureCommandConfig {
            reader_url: "https://reader.test/books/{book_id}/{page_id}".to_owned(),
            command: CommandSpec {
                program: program.to_owned(),
                args: args.iter().map(|a| (*a).to_owned()).collect(),
            },
            login,
        })
    }

    #[test]
    fn placeholders_are_expanded() {
        let out = expand_placeholders(
            "{url} -> {out} {unknown}",
            &[("url", "https://x"), ("out", "/tmp/a.pdf")],
        );
        assert_eq!(out, "https://x -> /tmp/a.pdf {unknown}");
    }

    #[test]
    fn substituted_values_are_not_expanded_again() {
        let out = expand_placeholders(
            "{title}|{out}",
            &[("title", "Cap {out} {page_num}"), ("out", "/tmp/p.pdf"), ("page_num", "3")],
        );
        assert_eq!(out, "Cap {out} {page_num}|/tmp/p.pdf");
        assert_eq!(expand_placeholders("{ {out}", &[("out", "o")]), "{ o");
    }

    #[test]
    fn env_lines_are_parsed() {
        let parsed = parse_env_lines("# comment\nCOOKIE=a=b\n\nnot a pair\n BAD KEY=1\nTOKEN=xyz\n");
        assert_eq!(
            parsed,
            vec![
                ("COOKIE".to_owned(), "a=b".to_owned()),
                ("TOKEN".to_owned(), "xyz".to_owned()),
            ]
        );
    }

    #[test]
    fn reader_url_must_be_http() {
        let mut adapter = adapter("sh", &[], None);
        adapter.config.reader_url = "file:///{page_id}".to_owned();
        let page = PageDescriptor::new("p1", "One", 1);
        assert!(adapter.reader_url("b", &page).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn login_output_becomes_session_env_and_reaches_capture() -> anyhow::Result<()> {
        let login = CommandSpec {
            program: "sh".to_owned(),
            args: vec!["-c".to_owned(), "echo SITE_TOKEN=secret-{book_id}".to_owned()],
        };
        let adapter = adapter(
            "sh",
            &["-c", "printf '%s %s' \"$SITE_TOKEN\" \"$1\" > \"$2\"", "sh", "{url}", "{out}"],
            Some(login),
        );
        let session = adapter.open_session("b1").await?;
        assert_eq!(
            session.env(),
            &[("SITE_TOKEN".to_owned(), "secret-b1".to_owned())]
        );

        let temp = tempfile::TempDir::new()?;
        let target = temp.path().join("page_001_p1.pdf");
        let page = PageDescriptor::new("p1", "One", 1);
        let path = adapter.capture(&session, &page, &target).await?;

        assert_eq!(path, target);
        assert_eq!(
            std::fs::read_to_string(&target)?,
            "secret-b1 https://reader.test/books/b1/p1"
        );
        session.close()?;
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_reports_stderr() -> anyhow::Result<()> {
        let adapter = adapter("sh", &["-c", "echo render crashed >&2; exit 3"], None);
        let session = adapter.open_session("b1").await?;
        let temp = tempfile::TempDir::new()?;
        let page = PageDescriptor::new("p1", "One", 1);

        let err = adapter
            .capture(&session, &page, &temp.path().join("x.pdf"))
            .await
            .expect_err("command fails");
        assert!(format!("{err:#}").contains("render crashed"));
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn success_without_artifact_is_a_failure() -> anyhow::Result<()> {
        let adapter = adapter("sh", &["-c", "true"], None);
        let session = adapter.open_session("b1").await?;
        let temp = tempfile::TempDir::new()?;
        let page = PageDescriptor::new("p1", "One", 1);

        let err = adapter
            .capture(&session, &page, &temp.path().join("x.pdf"))
            .await
            .expect_err("no artifact");
        assert!(format!("{err:#}").contains("no artifact"));
        Ok(())
    }
}
