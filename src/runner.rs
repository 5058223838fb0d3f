//! Drives one translation unit from source text to LIR. Each [`Runner`]
//! registers its pathname with the [`GenerationEngine`] on construction and
//! runs exactly once.

use std::{
    collections::BTreeSet,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tracing::{debug, debug_span, error, info_span};

use crate::{
    backend::{
        codegen::generate,
        lir::{self, LirBuilder},
        pretty_print::pretty_print_lir,
    },
    diagnostics::{CompileContext, Diagnostic, MessageLog, Severity},
    error::{FatalError, RunnerError},
    frontend::{
        SourceFile, SourceFileOrigin,
        parser::{ParseError, Parser},
    },
    middle::resolve::resolve_tree,
};

/// Exit code of a unit whose file is missing or whose program has errors
pub const EXIT_FAILURE: i32 = 1;
/// Exit code of a unit abandoned because of an internal compiler error
pub const EXIT_INTERNAL_ERROR: i32 = 2;

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Print the generated LIR of every successful unit
    pub emit_lir: bool,
}

/// Tracks every registered unit and the one currently running
#[derive(Debug, Default)]
pub struct GenerationEngine {
    runners: BTreeSet<PathBuf>,
    active: Option<PathBuf>,
}

impl GenerationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a unit. Returns false if one with the same path exists.
    pub fn add_runner(&mut self, pathname: &Path) -> bool {
        self.runners.insert(pathname.to_path_buf())
    }

    pub fn set_active(&mut self, pathname: Option<&Path>) {
        self.active = pathname.map(Path::to_path_buf);
    }

    pub fn active(&self) -> Option<&Path> {
        self.active.as_deref()
    }
}

#[derive(Debug)]
pub struct RunResult {
    pub pathname: PathBuf,
    pub succeeded: bool,
    pub exit_code: i32,
    pub diagnostics: Vec<Diagnostic>,
    /// Generated code, present when the unit compiled without errors
    pub module: Option<lir::Module>,
}

#[derive(Debug)]
pub struct Runner {
    pathname: PathBuf,
    options: CompileOptions,
    log: MessageLog,
    /// Checked between phases, once set no further phase starts
    halted: bool,
}

impl Runner {
    pub fn new(
        engine: &mut GenerationEngine,
        pathname: impl Into<PathBuf>,
        options: CompileOptions,
    ) -> Result<Self, RunnerError> {
        let pathname = pathname.into();

        if !engine.add_runner(&pathname) {
            return Err(RunnerError::DuplicateRegistration(pathname));
        }

        Ok(Self {
            pathname,
            options,
            log: MessageLog::new(),
            halted: false,
        })
    }

    pub fn pathname(&self) -> &Path {
        &self.pathname
    }

    /// Stops the run before its next phase. A halted run never succeeds.
    pub fn halt_run(&mut self) {
        debug!(path = %self.pathname.display(), "halting run");
        self.halted = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Compiles the unit. Consumes the runner so it can only run once.
    pub fn run(mut self, engine: &mut GenerationEngine) -> RunResult {
        let span = info_span!("run", path = %self.pathname.display());
        let _enter = span.enter();

        self.log.set_running(true);
        engine.set_active(Some(&self.pathname));

        let (mut exit_code, module) = match self.compile() {
            Ok(module) => (0, module),
            Err(code) => (code, None),
        };

        engine.set_active(None);
        self.log.set_running(false);

        if exit_code == 0 && (self.halted || self.log.has_error()) {
            exit_code = EXIT_FAILURE;
        }

        let succeeded = exit_code == 0 && !self.halted && !self.log.has_error();
        debug!(succeeded, exit_code, "finished");

        if succeeded && self.options.emit_lir {
            if let Some(module) = &module {
                pretty_print_lir(module);
            }
        }

        RunResult {
            pathname: self.pathname,
            succeeded,
            exit_code,
            diagnostics: self.log.into_messages(),
            module,
        }
    }

    fn path_string(&self) -> String {
        self.pathname.display().to_string()
    }

    /// Records an internal error and yields the exit code that ends the run
    fn fatal(&mut self, error: FatalError) -> i32 {
        error!(%error, origin = ?error.origin, "internal compiler error");
        self.halt_run();

        let diagnostic = Diagnostic::new(
            Severity::Error,
            format!("internal compiler error: {error}"),
            self.path_string(),
        )
        .with_origin(error.origin);
        self.log.log(diagnostic);

        EXIT_INTERNAL_ERROR
    }

    /// Returns the generated module, `None` if diagnostics stopped the
    /// pipeline, or an exit code if it could not run at all
    fn compile(&mut self) -> Result<Option<lir::Module>, i32> {
        if self.halted {
            return Ok(None);
        }

        let contents = match std::fs::read_to_string(&self.pathname) {
            Ok(contents) => contents,
            Err(error) => {
                let message = match error.kind() {
                    ErrorKind::NotFound => format!("file {} not found.", self.path_string()),
                    _ => format!("cannot read file {}: {error}", self.path_string()),
                };

                self.log
                    .log(Diagnostic::new(Severity::Error, message, self.path_string()));
                return Err(EXIT_FAILURE);
            }
        };

        let source = SourceFile {
            contents,
            origin: SourceFileOrigin::File(self.pathname.clone()),
        };

        let parsed = {
            let _span = debug_span!("parse").entered();
            Parser::parse_module(&source)
        };

        let mut tree = match parsed {
            Ok(tree) => tree,
            Err(ParseError::Syntax { message, span }) => {
                self.log
                    .log(Diagnostic::at(Severity::Error, message, &source, span));
                self.halt_run();
                return Ok(None);
            }
            Err(ParseError::Fatal(error)) => return Err(self.fatal(error)),
        };

        let resolved = {
            let _span = debug_span!("resolve").entered();
            let mut context = CompileContext::new(&source, &mut self.log);
            resolve_tree(&mut tree, &mut context)
        };

        if let Err(error) = resolved {
            return Err(self.fatal(error));
        }

        if self.log.has_error() {
            self.halt_run();
        }

        if self.halted {
            return Ok(None);
        }

        let _span = debug_span!("codegen").entered();
        let mut builder = LirBuilder::new();

        match generate(&tree, &mut builder) {
            Ok(()) => Ok(Some(builder.into_module())),
            Err(error) => Err(self.fatal(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use indoc::indoc;
    use mktemp::Temp;

    use super::*;
    use crate::frontend::Position;

    fn source_file(contents: &str) -> Temp {
        let file = Temp::new_file().unwrap();
        fs::write(file.to_path_buf(), contents).unwrap();
        file
    }

    fn run(path: &Path) -> RunResult {
        let mut engine = GenerationEngine::new();
        let runner = Runner::new(&mut engine, path, CompileOptions::default()).unwrap();
        runner.run(&mut engine)
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut engine = GenerationEngine::new();
        let path = PathBuf::from("unit.gv");

        let runner = Runner::new(&mut engine, &path, CompileOptions::default()).unwrap();
        assert_eq!(runner.pathname(), path);

        let error = Runner::new(&mut engine, &path, CompileOptions::default()).unwrap_err();
        assert_eq!(error, RunnerError::DuplicateRegistration(path.clone()));

        let diagnostic = Diagnostic::from(error);
        assert!(diagnostic.is_error());
        assert_eq!(diagnostic.path, path.display().to_string());
        assert!(diagnostic.message.contains("already registered"));

        assert!(Runner::new(&mut engine, "other.gv", CompileOptions::default()).is_ok());
    }

    #[test]
    fn missing_file_fails_with_one_diagnostic() {
        let directory = Temp::new_dir().unwrap();
        let path = directory.to_path_buf().join("missing.gv");

        let result = run(&path);

        assert!(!result.succeeded);
        assert_eq!(result.exit_code, EXIT_FAILURE);
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.diagnostics[0].message.contains(&path.display().to_string()));
        assert!(result.module.is_none());
    }

    #[test]
    fn valid_program_compiles() {
        let file = source_file(indoc! {"
            class Point {
                x: int;
                y: int;

                def getX() -> int {
                    return x;
                }
            }

            def main() -> int {
                var p: Point;
                p.x = 4;
                return p.getX();
            }
        "});

        let mut engine = GenerationEngine::new();
        let runner = Runner::new(&mut engine, file.to_path_buf(), CompileOptions::default()).unwrap();
        let result = runner.run(&mut engine);

        assert!(result.succeeded, "{:?}", result.diagnostics);
        assert_eq!(result.exit_code, 0);
        assert!(result.diagnostics.is_empty());
        assert!(engine.active().is_none());

        let module = result.module.unwrap();
        assert!(module.function("Point.getX").is_some());
        assert!(module.function("main").is_some());
    }

    #[test]
    fn semantic_errors_are_collected() {
        let file = source_file(indoc! {"
            def f() -> int {
                var a: bool = 1;
                return c;
            }
        "});

        let result = run(&file.to_path_buf());

        assert!(!result.succeeded);
        assert_eq!(result.exit_code, EXIT_FAILURE);
        assert!(result.module.is_none());

        let messages: Vec<_> = result
            .diagnostics
            .iter()
            .map(|diagnostic| (diagnostic.message.as_str(), diagnostic.position))
            .collect();
        assert_eq!(
            messages,
            vec![
                (
                    "cannot initialize `a` of type `bool` with a value of type `int`",
                    Some(Position { line: 2, column: 19 })
                ),
                ("unknown name `c`", Some(Position { line: 3, column: 12 })),
            ]
        );
    }

    #[test]
    fn halted_runs_skip_every_phase() {
        let file = source_file("def main() -> int { return 0; }");

        let mut engine = GenerationEngine::new();
        let mut runner = Runner::new(&mut engine, file.to_path_buf(), CompileOptions::default()).unwrap();
        runner.halt_run();
        assert!(runner.is_halted());

        let result = runner.run(&mut engine);

        assert!(!result.succeeded);
        assert_eq!(result.exit_code, EXIT_FAILURE);
        assert!(result.diagnostics.is_empty());
        assert!(result.module.is_none());
    }

    #[test]
    fn self_containing_classes_stop_before_codegen() {
        let file = source_file(indoc! {"
            class A {
                next: A;
            }

            def main() -> int {
                var a: A;
                return 0;
            }
        "});

        let result = run(&file.to_path_buf());

        assert!(!result.succeeded);
        assert_eq!(result.exit_code, EXIT_FAILURE);
        assert!(result.module.is_none());
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].message, "class `A` contains itself by value");
    }

    #[test]
    fn syntax_errors_stop_before_resolution() {
        let file = source_file("def f() { return 1 }");

        let result = run(&file.to_path_buf());

        assert!(!result.succeeded);
        assert_eq!(result.exit_code, EXIT_FAILURE);
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.diagnostics[0].is_error());
    }
}
