use colored::Colorize;
use strum::Display;

use crate::{
    error::RunnerError,
    frontend::{Position, SourceFile, lexer::Span},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub path: String,
    pub position: Option<Position>,
    /// Compiler location that raised the diagnostic, when recorded
    pub origin: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            path: path.into(),
            position: None,
            origin: None,
        }
    }

    /// A diagnostic pointing at `span` within `source`
    pub fn at(severity: Severity, message: impl Into<String>, source: &SourceFile, span: Span) -> Self {
        Self {
            position: Some(source.position_of(span.start)),
            ..Self::new(severity, message, source.origin.to_string())
        }
    }

    pub fn with_origin(mut self, origin: Option<String>) -> Self {
        self.origin = origin;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl From<RunnerError> for Diagnostic {
    fn from(error: RunnerError) -> Self {
        let path = match &error {
            RunnerError::DuplicateRegistration(path) => path.display().to_string(),
        };

        Self::new(Severity::Error, error.to_string(), path)
    }
}

impl core::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let location = match self.position {
            Some(position) => format!("{}:{position}", self.path),
            None => self.path.clone(),
        };

        let severity = match self.severity {
            Severity::Info => self.severity.to_string().blue(),
            Severity::Warning => self.severity.to_string().yellow(),
            Severity::Error => self.severity.to_string().red(),
        };

        write!(f, "{}: {}: {}", location.bold(), severity.bold(), self.message)?;

        if let Some(origin) = &self.origin {
            write!(f, "\n{}: {}", "backtrace".blue(), origin.white())?;
        }

        Ok(())
    }
}

/// Ordered diagnostics of one translation unit. Messages only arrive while
/// the owning run is in progress.
#[derive(Debug, Default)]
pub struct MessageLog {
    running: bool,
    messages: Vec<Diagnostic>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Appends `diagnostic`, or drops it if no run is in progress
    pub fn log(&mut self, diagnostic: Diagnostic) {
        if self.running {
            self.messages.push(diagnostic);
        }
    }

    pub fn has_error(&self) -> bool {
        self.messages.iter().any(Diagnostic::is_error)
    }

    pub fn messages(&self) -> &[Diagnostic] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Diagnostic> {
        self.messages
    }
}

/// State threaded through the passes of one translation unit
#[derive(Debug)]
pub struct CompileContext<'a> {
    pub source: &'a SourceFile,
    pub log: &'a mut MessageLog,
}

impl<'a> CompileContext<'a> {
    pub fn new(source: &'a SourceFile, log: &'a mut MessageLog) -> Self {
        Self { source, log }
    }

    pub fn report(
        &mut self,
        severity: Severity,
        span: Span,
        message: impl Into<String>,
        origin: Option<String>,
    ) {
        let diagnostic = Diagnostic::at(severity, message, self.source, span).with_origin(origin);
        self.log.log(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_dropped_while_not_running() {
        let mut log = MessageLog::new();
        log.log(Diagnostic::new(Severity::Error, "too early", "a.gv"));
        assert!(log.messages().is_empty());

        log.set_running(true);
        assert!(log.is_running());
        log.log(Diagnostic::new(Severity::Warning, "kept", "a.gv"));
        assert!(!log.has_error());
        log.log(Diagnostic::new(Severity::Error, "also kept", "a.gv"));
        assert!(log.has_error());

        log.set_running(false);
        log.log(Diagnostic::new(Severity::Error, "too late", "a.gv"));
        assert_eq!(log.messages().len(), 2);
    }

    #[test]
    fn rendering_includes_location() {
        let source = SourceFile::memory("var a = 1;\nvar b = c;");
        let diagnostic = Diagnostic::at(Severity::Error, "unknown name `c`", &source, Span::new(19, 20));

        let rendered = strip_ansi_escapes::strip_str(diagnostic.to_string());
        assert_eq!(rendered, "<memory>:2:9: error: unknown name `c`");
    }
}
