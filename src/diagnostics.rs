use crate::cli::config::{CheckerOptions, StrictLevel};
use crate::errors::CompilationError;
use crate::span::Span;
use crate::types::Type;
use serde::Serialize;
use std::sync::Mutex;

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Info,
}

/// Diagnostic code for categorization and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagnosticCode {
    /// Numeric code (e.g., 3101)
    pub code: u16,
    /// Category prefix (e.g., "E" for error, "W" for warning)
    pub prefix: char,
}

impl DiagnosticCode {
    pub const fn new(prefix: char, code: u16) -> Self {
        Self { code, prefix }
    }

    /// Format as string (e.g., "E3101", "W3106")
    pub fn as_str(&self) -> String {
        format!("{}{:04}", self.prefix, self.code)
    }
}

/// Related information for a diagnostic (additional context from other locations)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRelatedInformation {
    pub span: Span,
    pub message: String,
}

/// Suggested fix for a diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticSuggestion {
    pub span: Span,
    pub replacement: String,
    pub message: String,
}

/// Family of a type mismatch found at an expression site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MismatchKind {
    IndexKey,
    NullableArgument,
    ArgumentType,
    CallbackSignature,
    AssignmentType,
    UnreachableNarrowing,
}

impl MismatchKind {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            MismatchKind::IndexKey => error_codes::INDEX_KEY_TYPE,
            MismatchKind::NullableArgument => error_codes::NULLABLE_ARGUMENT,
            MismatchKind::ArgumentType => error_codes::ARGUMENT_TYPE,
            MismatchKind::CallbackSignature => error_codes::CALLBACK_SIGNATURE,
            MismatchKind::AssignmentType => error_codes::ASSIGNMENT_TYPE,
            MismatchKind::UnreachableNarrowing => error_codes::UNREACHABLE_NARROWING,
        }
    }
}

/// Which part of a callback's signature failed to match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackSlot {
    Param(usize),
    Return,
}

/// Site details a message needs beyond the types themselves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MismatchContext {
    Index {
        string_receiver: bool,
    },
    Argument {
        function: String,
        param: String,
        /// Everything the argument could be, not only the offending part
        passed: Type,
    },
    Callback {
        function: String,
        slot: CallbackSlot,
    },
    Assignment {
        property: String,
        class: Option<String>,
        declared_at: Option<Span>,
    },
    Unreachable,
}

/// One violation: `expression` can hold each of `actual`, none of which fits `required`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMismatch {
    pub kind: MismatchKind,
    pub span: Span,
    pub expression: String,
    pub required: Type,
    pub actual: Vec<Type>,
    pub context: MismatchContext,
}

impl TypeMismatch {
    fn actual_text(&self) -> String {
        match self.actual.as_slice() {
            [single] => single.to_string(),
            many => Type::union(many.iter().cloned()).to_string(),
        }
    }

    pub fn message(&self) -> String {
        match &self.context {
            MismatchContext::Index { string_receiver } => {
                let (allowed, receiver) = if *string_receiver {
                    ("int", "string")
                } else {
                    ("int|string", "array")
                };
                format!(
                    "Only {} can be used as {} index, but {} type is passed",
                    allowed,
                    receiver,
                    self.actual_text()
                )
            }
            MismatchContext::Argument {
                function,
                param,
                passed,
            } => match self.kind {
                MismatchKind::NullableArgument if *passed == Type::Null => format!(
                    "passed null value as ${} argument to {}, but {} is required",
                    param, function, self.required
                ),
                MismatchKind::NullableArgument => format!(
                    "passed nullable {} value as ${} argument to {}",
                    passed.without_null(),
                    param,
                    function
                ),
                _ => format!(
                    "passed {} value as ${} argument to {}, but {} is required",
                    self.actual_text(),
                    param,
                    function,
                    self.required
                ),
            },
            MismatchContext::Callback { function, slot } => match slot {
                CallbackSlot::Param(index) => format!(
                    "callback passed to {} must accept {} as parameter {}, but it accepts {}",
                    function,
                    self.required,
                    index + 1,
                    self.actual_text()
                ),
                CallbackSlot::Return => format!(
                    "callback passed to {} must return {}, but it returns {}",
                    function,
                    self.required,
                    self.actual_text()
                ),
            },
            MismatchContext::Assignment { .. } => format!(
                "Cannot assign {} to {} of type {}",
                self.actual_text(),
                self.expression,
                self.required
            ),
            MismatchContext::Unreachable => format!(
                "Condition narrows {} of type {} to never; the branch is unreachable",
                self.expression,
                self.actual_text()
            ),
        }
    }
}

/// A diagnostic message with location, severity, and optional metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub span: Span,
    pub message: String,
    pub code: Option<DiagnosticCode>,
    pub related_information: Vec<DiagnosticRelatedInformation>,
    pub suggestions: Vec<DiagnosticSuggestion>,
    /// The structured violation behind this diagnostic, if it came from the checker
    pub mismatch: Option<TypeMismatch>,
}

impl Diagnostic {
    fn with_level(level: DiagnosticLevel, span: Span, message: String) -> Self {
        Self {
            level,
            span,
            message,
            code: None,
            related_information: Vec::new(),
            suggestions: Vec::new(),
            mismatch: None,
        }
    }

    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Error, span, message.into())
    }

    pub fn warning(span: Span, message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Warning, span, message.into())
    }

    pub fn info(span: Span, message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Info, span, message.into())
    }

    /// Create an error with a diagnostic code
    pub fn error_with_code(span: Span, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::error(span, message).with_code(code)
    }

    /// Add related information to this diagnostic
    pub fn with_related(mut self, span: Span, message: impl Into<String>) -> Self {
        self.related_information.push(DiagnosticRelatedInformation {
            span,
            message: message.into(),
        });
        self
    }

    /// Add a suggestion to this diagnostic
    pub fn with_suggestion(
        mut self,
        span: Span,
        replacement: String,
        message: impl Into<String>,
    ) -> Self {
        self.suggestions.push(DiagnosticSuggestion {
            span,
            replacement,
            message: message.into(),
        });
        self
    }

    /// Set the diagnostic code
    pub fn with_code(mut self, code: DiagnosticCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_mismatch(mut self, mismatch: TypeMismatch) -> Self {
        self.mismatch = Some(mismatch);
        self
    }

    /// `error [E3102] at 4:9: passed nullable Bar value ...`
    pub fn render(&self, pretty: bool) -> String {
        let level_str = match self.level {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warning",
            DiagnosticLevel::Info => "info",
        };
        let code_str = self
            .code
            .map(|code| format!("[{}] ", code.as_str()))
            .unwrap_or_default();

        let mut out = if pretty {
            format!(
                "\x1b[1m{}\x1b[0m {}at {}: {}",
                level_str, code_str, self.span, self.message
            )
        } else {
            format!("{} {}at {}: {}", level_str, code_str, self.span, self.message)
        };
        for related in &self.related_information {
            if pretty {
                out.push_str(&format!(
                    "\n  \x1b[36mNote\x1b[0m at {}: {}",
                    related.span, related.message
                ));
            } else {
                out.push_str(&format!("\n  Note at {}: {}", related.span, related.message));
            }
        }
        for suggestion in &self.suggestions {
            if pretty {
                out.push_str(&format!("\n  \x1b[32mSuggestion\x1b[0m: {}", suggestion.message));
            } else {
                out.push_str(&format!("\n  Suggestion: {}", suggestion.message));
            }
        }
        out
    }
}

/// Trait for handling diagnostics
/// This allows for dependency injection and testing with mock handlers
pub trait DiagnosticHandler: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);

    fn error(&self, span: Span, message: &str) {
        self.report(Diagnostic::error(span, message.to_string()));
    }

    fn warning(&self, span: Span, message: &str) {
        self.report(Diagnostic::warning(span, message.to_string()));
    }

    fn info(&self, span: Span, message: &str) {
        self.report(Diagnostic::info(span, message.to_string()));
    }

    fn has_errors(&self) -> bool;
    fn error_count(&self) -> usize;
    fn warning_count(&self) -> usize;
    fn get_diagnostics(&self) -> Vec<Diagnostic>;
}

fn count_level(diagnostics: &Mutex<Vec<Diagnostic>>, level: DiagnosticLevel) -> usize {
    diagnostics
        .lock()
        .map(|d| d.iter().filter(|d| d.level == level).count())
        .unwrap_or(0)
}

/// Console-based diagnostic handler that prints to stderr
pub struct ConsoleDiagnosticHandler {
    diagnostics: Mutex<Vec<Diagnostic>>,
    pretty: bool,
}

impl ConsoleDiagnosticHandler {
    pub fn new(pretty: bool) -> Self {
        Self {
            diagnostics: Mutex::new(Vec::new()),
            pretty,
        }
    }
}

impl DiagnosticHandler for ConsoleDiagnosticHandler {
    fn report(&self, diagnostic: Diagnostic) {
        eprintln!("{}", diagnostic.render(self.pretty));
        if let Ok(mut diagnostics) = self.diagnostics.lock() {
            diagnostics.push(diagnostic);
        }
    }

    fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    fn error_count(&self) -> usize {
        count_level(&self.diagnostics, DiagnosticLevel::Error)
    }

    fn warning_count(&self) -> usize {
        count_level(&self.diagnostics, DiagnosticLevel::Warning)
    }

    fn get_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

/// Collecting diagnostic handler for testing
/// Collects all diagnostics without printing
pub struct CollectingDiagnosticHandler {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl CollectingDiagnosticHandler {
    pub fn new() -> Self {
        Self {
            diagnostics: Mutex::new(Vec::new()),
        }
    }
}

impl Default for CollectingDiagnosticHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticHandler for CollectingDiagnosticHandler {
    fn report(&self, diagnostic: Diagnostic) {
        if let Ok(mut diagnostics) = self.diagnostics.lock() {
            diagnostics.push(diagnostic);
        }
    }

    fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    fn error_count(&self) -> usize {
        count_level(&self.diagnostics, DiagnosticLevel::Error)
    }

    fn warning_count(&self) -> usize {
        count_level(&self.diagnostics, DiagnosticLevel::Warning)
    }

    fn get_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

/// Error codes for checker diagnostics
///
/// - E3101-E3105: compatibility violations
/// - W3106: narrowing warnings (promoted to an error by configuration)
pub mod error_codes {
    use super::DiagnosticCode;

    /// Index key type not usable for the indexed value
    pub const INDEX_KEY_TYPE: DiagnosticCode = DiagnosticCode::new('E', 3101);

    /// Possibly-null argument for a non-nullable parameter
    pub const NULLABLE_ARGUMENT: DiagnosticCode = DiagnosticCode::new('E', 3102);

    /// Argument type not accepted by the parameter
    pub const ARGUMENT_TYPE: DiagnosticCode = DiagnosticCode::new('E', 3103);

    /// Callable argument does not fit the required callback signature
    pub const CALLBACK_SIGNATURE: DiagnosticCode = DiagnosticCode::new('E', 3104);

    /// Value not assignable to a typed property
    pub const ASSIGNMENT_TYPE: DiagnosticCode = DiagnosticCode::new('E', 3105);

    /// Condition narrows a tracked expression to never
    pub const UNREACHABLE_NARROWING: DiagnosticCode = DiagnosticCode::new('W', 3106);
}

/// Turns the checker's mismatches into diagnostics for one unit.
pub struct DiagnosticReporter {
    unreachable_narrowing: StrictLevel,
}

impl DiagnosticReporter {
    pub fn new(options: &CheckerOptions) -> Self {
        Self {
            unreachable_narrowing: options.unreachable_narrowing,
        }
    }

    /// `None` when the kind is switched off by configuration.
    pub fn to_diagnostic(&self, mismatch: TypeMismatch) -> Option<Diagnostic> {
        let level = match mismatch.kind {
            MismatchKind::UnreachableNarrowing => match self.unreachable_narrowing {
                StrictLevel::Off => return None,
                StrictLevel::Warning => DiagnosticLevel::Warning,
                StrictLevel::Error => DiagnosticLevel::Error,
            },
            _ => DiagnosticLevel::Error,
        };

        let mut diagnostic = Diagnostic::with_level(level, mismatch.span, mismatch.message())
            .with_code(mismatch.kind.code());

        match &mismatch.context {
            MismatchContext::Argument { .. } if mismatch.kind == MismatchKind::NullableArgument => {
                diagnostic = diagnostic.with_suggestion(
                    mismatch.span,
                    format!("{} !== null", mismatch.expression),
                    format!(
                        "Add a `{} !== null` check before the call",
                        mismatch.expression
                    ),
                );
            }
            MismatchContext::Assignment {
                property,
                class,
                declared_at: Some(span),
            } => {
                let owner = class.as_deref().unwrap_or("?");
                diagnostic = diagnostic.with_related(
                    *span,
                    format!("Property {}::${} declared here", owner, property),
                );
            }
            _ => {}
        }

        Some(diagnostic.with_mismatch(mismatch))
    }

    /// Drops repeats and orders by position; identical facts from duplicated code report once.
    pub fn report_unit(&self, mismatches: Vec<TypeMismatch>) -> Vec<Diagnostic> {
        let mut unique: Vec<TypeMismatch> = Vec::with_capacity(mismatches.len());
        for mismatch in mismatches {
            if !unique.contains(&mismatch) {
                unique.push(mismatch);
            }
        }
        unique.sort_by_key(|m| m.span.start);
        unique
            .into_iter()
            .filter_map(|m| self.to_diagnostic(m))
            .collect()
    }
}

/// Outcome of checking a program: every diagnostic of every unit, in report order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilationResult {
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Location {
    line: u32,
    column: u32,
    start: u32,
    end: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DiagnosticRecord<'a> {
    kind: Option<MismatchKind>,
    code: Option<String>,
    level: DiagnosticLevel,
    location: Location,
    message: &'a str,
    required_type: Option<String>,
    actual_types: Vec<String>,
    expression_text: Option<&'a str>,
}

impl CompilationResult {
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        Self { diagnostics }
    }

    /// Warnings alone do not fail a unit
    pub fn is_success(&self) -> bool {
        self.error_count() == 0
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warning)
            .count()
    }

    pub fn mismatches(&self) -> impl Iterator<Item = &TypeMismatch> {
        self.diagnostics.iter().filter_map(|d| d.mismatch.as_ref())
    }

    pub fn into_result(self) -> Result<Vec<Diagnostic>, CompilationError> {
        match self.error_count() {
            0 => Ok(self.diagnostics),
            errors => Err(CompilationError::TypeErrors(errors)),
        }
    }

    pub fn render_text(&self, pretty: bool) -> String {
        self.diagnostics
            .iter()
            .map(|d| d.render(pretty))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Structured records: `{kind, location, requiredType, actualTypes, expressionText}`
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let records: Vec<DiagnosticRecord<'_>> = self
            .diagnostics
            .iter()
            .map(|d| DiagnosticRecord {
                kind: d.mismatch.as_ref().map(|m| m.kind),
                code: d.code.map(|c| c.as_str()),
                level: d.level,
                location: Location {
                    line: d.span.line,
                    column: d.span.column,
                    start: d.span.start,
                    end: d.span.end,
                },
                message: &d.message,
                required_type: d.mismatch.as_ref().map(|m| m.required.to_string()),
                actual_types: d
                    .mismatch
                    .as_ref()
                    .map(|m| m.actual.iter().map(Type::to_string).collect())
                    .unwrap_or_default(),
                expression_text: d.mismatch.as_ref().map(|m| m.expression.as_str()),
            })
            .collect();
        serde_json::to_string_pretty(&records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nullable_argument(span: Span) -> TypeMismatch {
        TypeMismatch {
            kind: MismatchKind::NullableArgument,
            span,
            expression: "$b->x".to_string(),
            required: Type::instance("Bar"),
            actual: vec![Type::Null],
            context: MismatchContext::Argument {
                function: "g".to_string(),
                param: "bar".to_string(),
                passed: Type::nullable(Type::instance("Bar")),
            },
        }
    }

    #[test]
    fn test_diagnostic_creation() {
        let span = Span::new(0, 5, 1, 1);
        let diag = Diagnostic::error(span, "Test error");

        assert_eq!(diag.level, DiagnosticLevel::Error);
        assert_eq!(diag.message, "Test error");
        assert!(diag.code.is_none());
        assert!(diag.related_information.is_empty());
        assert!(diag.suggestions.is_empty());
        assert!(diag.mismatch.is_none());
    }

    #[test]
    fn test_diagnostic_builder_chain() {
        let span = Span::new(0, 5, 1, 1);
        let related_span = Span::new(10, 15, 2, 1);

        let diag = Diagnostic::error(span, "Type mismatch")
            .with_code(error_codes::ASSIGNMENT_TYPE)
            .with_related(related_span, "Property declared here")
            .with_suggestion(span, "int".to_string(), "Use 'int' type");

        assert_eq!(diag.code, Some(error_codes::ASSIGNMENT_TYPE));
        assert_eq!(diag.related_information[0].span, related_span);
        assert_eq!(diag.suggestions[0].replacement, "int");
    }

    #[test]
    fn test_collecting_handler() {
        let handler = CollectingDiagnosticHandler::new();
        let span = Span::new(0, 5, 1, 1);

        handler.error(span, "Error 1");
        handler.warning(span, "Warning 1");
        handler.info(span, "Info 1");

        assert_eq!(handler.error_count(), 1);
        assert_eq!(handler.warning_count(), 1);
        assert!(handler.has_errors());
        assert_eq!(handler.get_diagnostics().len(), 3);
    }

    #[test]
    fn test_error_codes() {
        use super::error_codes::*;
        let codes = [
            INDEX_KEY_TYPE,
            NULLABLE_ARGUMENT,
            ARGUMENT_TYPE,
            CALLBACK_SIGNATURE,
            ASSIGNMENT_TYPE,
            UNREACHABLE_NARROWING,
        ];
        let rendered: Vec<String> = codes.iter().map(DiagnosticCode::as_str).collect();
        assert_eq!(rendered, ["E3101", "E3102", "E3103", "E3104", "E3105", "W3106"]);
        assert_eq!(DiagnosticCode::new('E', 1).as_str(), "E0001");
    }

    #[test]
    fn test_nullable_argument_message() {
        let reporter = DiagnosticReporter::new(&CheckerOptions::default());
        let diag = reporter
            .to_diagnostic(nullable_argument(Span::new(3, 8, 4, 9)))
            .unwrap();
        assert_eq!(diag.message, "passed nullable Bar value as $bar argument to g");
        assert_eq!(diag.code, Some(error_codes::NULLABLE_ARGUMENT));
        assert_eq!(diag.suggestions[0].replacement, "$b->x !== null");
        assert_eq!(
            diag.render(false).lines().next(),
            Some("error [E3102] at 4:9: passed nullable Bar value as $bar argument to g")
        );
    }

    #[test]
    fn test_index_messages() {
        let mut mismatch = TypeMismatch {
            kind: MismatchKind::IndexKey,
            span: Span::dummy(),
            expression: "$str[$b]".to_string(),
            required: Type::Int,
            actual: vec![Type::Bool],
            context: MismatchContext::Index {
                string_receiver: true,
            },
        };
        assert_eq!(
            mismatch.message(),
            "Only int can be used as string index, but bool type is passed"
        );
        mismatch.context = MismatchContext::Index {
            string_receiver: false,
        };
        mismatch.actual = vec![Type::array(Type::Int)];
        assert_eq!(
            mismatch.message(),
            "Only int|string can be used as array index, but int[] type is passed"
        );
    }

    #[test]
    fn test_unreachable_level_follows_options() {
        let mismatch = TypeMismatch {
            kind: MismatchKind::UnreachableNarrowing,
            span: Span::dummy(),
            expression: "$a".to_string(),
            required: Type::Never,
            actual: vec![Type::instance("Foo")],
            context: MismatchContext::Unreachable,
        };
        let mut options = CheckerOptions::default();
        let warning = DiagnosticReporter::new(&options)
            .to_diagnostic(mismatch.clone())
            .unwrap();
        assert_eq!(warning.level, DiagnosticLevel::Warning);
        assert!(CompilationResult::new(vec![warning]).is_success());

        options.unreachable_narrowing = StrictLevel::Off;
        assert!(DiagnosticReporter::new(&options)
            .to_diagnostic(mismatch)
            .is_none());
    }

    #[test]
    fn test_report_unit_dedupes_and_sorts() {
        let reporter = DiagnosticReporter::new(&CheckerOptions::default());
        let late = nullable_argument(Span::new(20, 25, 3, 1));
        let early = nullable_argument(Span::new(5, 9, 1, 5));
        let diagnostics = reporter.report_unit(vec![late.clone(), early, late]);
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].span.start, 5);
    }

    #[test]
    fn test_json_records() {
        let reporter = DiagnosticReporter::new(&CheckerOptions::default());
        let result = CompilationResult::new(reporter.report_unit(vec![nullable_argument(
            Span::new(3, 8, 4, 9),
        )]));
        assert!(!result.is_success());
        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(json[0]["kind"], "NullableArgument");
        assert_eq!(json[0]["requiredType"], "Bar");
        assert_eq!(json[0]["actualTypes"][0], "null");
        assert_eq!(json[0]["expressionText"], "$b->x");
        assert_eq!(json[0]["location"]["line"], 4);
        assert!(matches!(
            result.into_result(),
            Err(CompilationError::TypeErrors(1))
        ));
    }
}
