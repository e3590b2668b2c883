// Plain-text diagnostics, one block per issue

use super::consumer::{DiagnosticSet, PathDiagnosticConsumer, ReportError};
use super::diagnostic::PathDiagnostic;
use crate::config::PathScheme;
use std::io::Write;

pub struct TextDiagnostics<W: Write> {
    out: W,
    diagnostics: DiagnosticSet,
    scheme: PathScheme,
}

impl<W: Write> TextDiagnostics<W> {
    pub fn new(out: W, scheme: PathScheme) -> Self {
        Self {
            out,
            diagnostics: DiagnosticSet::new(),
            scheme,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> PathDiagnosticConsumer for TextDiagnostics<W> {
    fn name(&self) -> &'static str {
        "text"
    }

    fn generation_scheme(&self) -> PathScheme {
        self.scheme
    }

    fn handle_path_diagnostic(&mut self, diagnostic: PathDiagnostic) {
        self.diagnostics.insert(diagnostic);
    }

    fn flush_diagnostics(&mut self) -> Result<(), ReportError> {
        let diagnostics = std::mem::take(&mut self.diagnostics);
        for diagnostic in diagnostics.iter() {
            write_diagnostic(&mut self.out, diagnostic)?;
        }
        self.out.flush()?;
        Ok(())
    }
}

/// ```text
/// test.c:3:5: warning: Dereference of null pointer (loaded from variable 'p') [Logic error]
///   test.c:2:5: note: Variable 'p' initialized to a null pointer value
///   test.c:3:5: note: Dereference of null pointer (loaded from variable 'p')
/// ```
fn write_diagnostic(out: &mut impl Write, diagnostic: &PathDiagnostic) -> std::io::Result<()> {
    writeln!(
        out,
        "{}:{}: warning: {} [{}]",
        diagnostic.file, diagnostic.location, diagnostic.description, diagnostic.category
    )?;
    for (depth, event) in diagnostic.events() {
        writeln!(
            out,
            "{:indent$}{}:{}: note: {}",
            "",
            diagnostic.file,
            event.location,
            event.message,
            indent = 2 + 2 * depth
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::SourceLocation;
    use crate::report::diagnostic::{EventPiece, PathPiece};

    #[test]
    fn test_text_layout() {
        let location = SourceLocation::new(3, 5);
        let diagnostic = PathDiagnostic {
            file: "test.c".to_string(),
            bug_type: "Null dereference".to_string(),
            category: "Logic error".to_string(),
            description: "Dereference of null pointer".to_string(),
            location,
            issue_context: None,
            path: vec![
                PathPiece::Event(EventPiece::new(SourceLocation::new(2, 5), "Null pointer value stored to 'p'")),
                PathPiece::Event(EventPiece::new(location, "Dereference of null pointer")),
            ],
        };
        let mut consumer = TextDiagnostics::new(Vec::new(), PathScheme::Minimal);
        consumer.handle_path_diagnostic(diagnostic);
        consumer.flush_diagnostics().unwrap();
        let text = String::from_utf8(consumer.into_inner()).unwrap();
        assert_eq!(
            text,
            "test.c:3:5: warning: Dereference of null pointer [Logic error]\n\
             \x20 test.c:2:5: note: Null pointer value stored to 'p'\n\
             \x20 test.c:3:5: note: Dereference of null pointer\n"
        );
    }
}
