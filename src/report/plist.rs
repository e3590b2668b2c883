//! Property-list output
//!
//! Writes the XML plist consumed by IDE integrations and `scan-build`
//! style tooling. Field names, their order and the indentation are part
//! of the format: downstream tools compare the text, so the writer below
//! spells every line out instead of going through a generic serializer.
//!
//! ```text
//! <plist version="1.0">
//! <dict>
//!  <key>files</key>        file names, indexed by the `file` integers
//!  <key>diagnostics</key>  one dict per diagnostic: path, description,
//!                          category, type, issue context, location
//! </dict>
//! </plist>
//! ```

use super::consumer::{DiagnosticSet, PathDiagnosticConsumer, ReportError};
use super::diagnostic::{CallPiece, ControlFlowPiece, EventPiece, PathDiagnostic, PathPiece};
use crate::config::PathScheme;
use crate::frontend::ast::{SourceLocation, SourceRange};
use std::fmt::Write as _;
use std::io::Write;

const HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<!DOCTYPE plist PUBLIC \"-//Apple Computer//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
<plist version=\"1.0\">\n";

/// Collects diagnostics and writes them as one plist document on flush.
pub struct PlistDiagnostics<W: Write> {
    out: W,
    diagnostics: DiagnosticSet,
}

impl<W: Write> PlistDiagnostics<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            diagnostics: DiagnosticSet::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> PathDiagnosticConsumer for PlistDiagnostics<W> {
    fn name(&self) -> &'static str {
        "plist"
    }

    fn generation_scheme(&self) -> PathScheme {
        PathScheme::Extensive
    }

    fn handle_path_diagnostic(&mut self, diagnostic: PathDiagnostic) {
        self.diagnostics.insert(diagnostic);
    }

    fn flush_diagnostics(&mut self) -> Result<(), ReportError> {
        let diagnostics = std::mem::take(&mut self.diagnostics).into_vec();
        let document = render_plist(&diagnostics);
        self.out.write_all(document.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}

/// The whole plist document for `diagnostics`.
pub fn render_plist(diagnostics: &[PathDiagnostic]) -> String {
    let mut files: Vec<&str> = Vec::new();
    for diagnostic in diagnostics {
        if !files.contains(&diagnostic.file.as_str()) {
            files.push(&diagnostic.file);
        }
    }

    let mut o = String::new();
    o.push_str(HEADER);
    o.push_str("<dict>\n <key>files</key>\n <array>\n");
    for file in &files {
        let _ = writeln!(o, "  {}", plist_string(file));
    }
    o.push_str(" </array>\n <key>diagnostics</key>\n <array>\n");

    for diagnostic in diagnostics {
        let file = files.iter().position(|f| *f == diagnostic.file).unwrap_or(0);
        let mut writer = PieceWriter { o: &mut o, file };
        writer.diagnostic(diagnostic);
    }

    o.push_str(" </array>\n</dict>\n</plist>");
    o
}

/// `<string>..</string>` with XML escapes.
pub fn plist_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 17);
    out.push_str("<string>");
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out.push_str("</string>");
    out
}

struct PieceWriter<'o> {
    o: &'o mut String,
    /// Index of the diagnostic's file in the files table
    file: usize,
}

impl PieceWriter<'_> {
    fn line(&mut self, indent: usize, text: &str) {
        for _ in 0..indent {
            self.o.push(' ');
        }
        self.o.push_str(text);
        self.o.push('\n');
    }

    fn diagnostic(&mut self, diagnostic: &PathDiagnostic) {
        self.o.push_str("  <dict>\n   <key>path</key>\n   <array>\n");
        for piece in &diagnostic.path {
            self.piece(piece, 4, 0, true);
        }
        self.o.push_str("   </array>\n");
        let _ = writeln!(self.o, "   <key>description</key>{}", plist_string(&diagnostic.description));
        let _ = writeln!(self.o, "   <key>category</key>{}", plist_string(&diagnostic.category));
        let _ = writeln!(self.o, "   <key>type</key>{}", plist_string(&diagnostic.bug_type));
        if let Some(context) = &diagnostic.issue_context {
            let _ = writeln!(self.o, "  <key>issue_context_kind</key>{}", plist_string(&context.kind));
            let _ = writeln!(self.o, "  <key>issue_context</key>{}", plist_string(&context.name));
        }
        self.o.push_str("  <key>location</key>\n");
        self.location(diagnostic.location, 2);
        self.o.push_str("  </dict>\n");
    }

    fn location(&mut self, location: SourceLocation, indent: usize) {
        self.line(indent, "<dict>");
        self.line(indent, &format!(" <key>line</key><integer>{}</integer>", location.line));
        self.line(indent, &format!(" <key>col</key><integer>{}</integer>", location.column));
        self.line(indent, &format!(" <key>file</key><integer>{}</integer>", self.file));
        self.line(indent, "</dict>");
    }

    fn range(&mut self, range: SourceRange, indent: usize) {
        self.line(indent, "<array>");
        self.location(range.begin, indent + 1);
        self.location(range.end, indent + 1);
        self.line(indent, "</array>");
    }

    fn piece(&mut self, piece: &PathPiece, indent: usize, depth: usize, include_control_flow: bool) {
        match piece {
            PathPiece::ControlFlow(control) if include_control_flow => self.control_flow(control, indent),
            PathPiece::ControlFlow(_) => {}
            PathPiece::Event(event) => self.event(event, indent, depth),
            PathPiece::Call(call) => self.call(call, indent, depth),
            // pieces of a macro are written in place, without their jumps
            PathPiece::Macro(group) => {
                for sub in &group.sub_pieces {
                    self.piece(sub, indent, depth, false);
                }
            }
        }
    }

    fn call(&mut self, call: &CallPiece, indent: usize, depth: usize) {
        if let Some(enter) = &call.call_enter {
            self.event(enter, indent, depth);
        }
        let depth = depth + 1;
        if let Some(within) = &call.call_enter_within_caller {
            self.event(within, indent, depth);
        }
        for piece in &call.path {
            self.piece(piece, indent, depth, true);
        }
        if let Some(exit) = &call.call_exit {
            self.event(exit, indent, depth);
        }
    }

    fn control_flow(&mut self, control: &ControlFlowPiece, indent: usize) {
        self.line(indent, "<dict>");
        let inner = indent + 1;
        self.line(inner, "<key>kind</key><string>control</string>");
        self.line(inner, "<key>edges</key>");
        self.line(inner + 1, "<array>");
        for edge in &control.edges {
            self.line(inner + 2, "<dict>");
            self.line(inner + 3, "<key>start</key>");
            self.range(edge.start, inner + 4);
            self.line(inner + 3, "<key>end</key>");
            self.range(edge.end, inner + 4);
            self.line(inner + 2, "</dict>");
        }
        self.line(inner + 1, "</array>");
        if !control.message.is_empty() {
            self.line(inner, &format!("<key>alternate</key>{}", plist_string(&control.message)));
        }
        self.line(indent, "</dict>");
    }

    fn event(&mut self, event: &EventPiece, indent: usize, depth: usize) {
        self.line(indent, "<dict>");
        let inner = indent + 1;
        self.line(inner, "<key>kind</key><string>event</string>");
        self.line(inner, "<key>location</key>");
        self.location(event.location, inner);
        if !event.ranges.is_empty() {
            self.line(inner, "<key>ranges</key>");
            self.line(inner, "<array>");
            for range in &event.ranges {
                self.range(*range, inner + 2);
            }
            self.line(inner, "</array>");
        }
        self.line(inner, &format!("<key>depth</key><integer>{}</integer>", depth));
        self.line(inner, "<key>extended_message</key>");
        self.line(inner, &plist_string(&event.message));
        self.line(inner, "<key>message</key>");
        self.line(0, &plist_string(&event.message));
        self.line(indent, "</dict>");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::diagnostic::{ControlEdge, IssueContext, MacroPiece};

    fn at(line: u32, column: u32) -> SourceLocation {
        SourceLocation::new(line, column)
    }

    #[test]
    fn test_escaping() {
        assert_eq!(
            plist_string("a < b && 'c' > \"d\""),
            "<string>a &lt; b &amp;&amp; &apos;c&apos; &gt; &quot;d&quot;</string>"
        );
    }

    #[test]
    fn test_empty_document() {
        let out = render_plist(&[]);
        assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"));
        assert!(out.ends_with(" <key>files</key>\n <array>\n </array>\n <key>diagnostics</key>\n <array>\n </array>\n</dict>\n</plist>"));
    }

    #[test]
    fn test_event_and_control_layout() {
        let diagnostic = PathDiagnostic {
            file: "a.c".to_string(),
            bug_type: "Bug".to_string(),
            category: "Cat".to_string(),
            description: "Bad".to_string(),
            location: at(3, 5),
            issue_context: Some(IssueContext {
                kind: "function".to_string(),
                name: "f".to_string(),
            }),
            path: vec![
                PathPiece::ControlFlow(ControlFlowPiece {
                    edges: vec![ControlEdge {
                        start: SourceRange::new(at(2, 7), at(2, 7)),
                        end: SourceRange::new(at(3, 5), at(3, 6)),
                    }],
                    message: "Taking true branch".to_string(),
                }),
                PathPiece::Macro(MacroPiece {
                    name: "M".to_string(),
                    location: at(3, 5),
                    sub_pieces: vec![
                        PathPiece::ControlFlow(ControlFlowPiece {
                            edges: Vec::new(),
                            message: String::new(),
                        }),
                        PathPiece::Event(EventPiece::new(at(3, 5), "Bad")),
                    ],
                }),
            ],
        };

        let out = render_plist(std::slice::from_ref(&diagnostic));
        let expected_body = concat!(
            " <key>files</key>\n",
            " <array>\n",
            "  <string>a.c</string>\n",
            " </array>\n",
            " <key>diagnostics</key>\n",
            " <array>\n",
            "  <dict>\n",
            "   <key>path</key>\n",
            "   <array>\n",
            "    <dict>\n",
            "     <key>kind</key><string>control</string>\n",
            "     <key>edges</key>\n",
            "      <array>\n",
            "       <dict>\n",
            "        <key>start</key>\n",
            "         <array>\n",
            "          <dict>\n",
            "           <key>line</key><integer>2</integer>\n",
            "           <key>col</key><integer>7</integer>\n",
            "           <key>file</key><integer>0</integer>\n",
            "          </dict>\n",
            "          <dict>\n",
            "           <key>line</key><integer>2</integer>\n",
            "           <key>col</key><integer>7</integer>\n",
            "           <key>file</key><integer>0</integer>\n",
            "          </dict>\n",
            "         </array>\n",
            "        <key>end</key>\n",
            "         <array>\n",
            "          <dict>\n",
            "           <key>line</key><integer>3</integer>\n",
            "           <key>col</key><integer>5</integer>\n",
            "           <key>file</key><integer>0</integer>\n",
            "          </dict>\n",
            "          <dict>\n",
            "           <key>line</key><integer>3</integer>\n",
            "           <key>col</key><integer>6</integer>\n",
            "           <key>file</key><integer>0</integer>\n",
            "          </dict>\n",
            "         </array>\n",
            "       </dict>\n",
            "      </array>\n",
            "     <key>alternate</key><string>Taking true branch</string>\n",
            "    </dict>\n",
            "    <dict>\n",
            "     <key>kind</key><string>event</string>\n",
            "     <key>location</key>\n",
            "     <dict>\n",
            "      <key>line</key><integer>3</integer>\n",
            "      <key>col</key><integer>5</integer>\n",
            "      <key>file</key><integer>0</integer>\n",
            "     </dict>\n",
            "     <key>depth</key><integer>0</integer>\n",
            "     <key>extended_message</key>\n",
            "     <string>Bad</string>\n",
            "     <key>message</key>\n",
            "<string>Bad</string>\n",
            "    </dict>\n",
            "   </array>\n",
            "   <key>description</key><string>Bad</string>\n",
            "   <key>category</key><string>Cat</string>\n",
            "   <key>type</key><string>Bug</string>\n",
            "  <key>issue_context_kind</key><string>function</string>\n",
            "  <key>issue_context</key><string>f</string>\n",
            "  <key>location</key>\n",
            "  <dict>\n",
            "   <key>line</key><integer>3</integer>\n",
            "   <key>col</key><integer>5</integer>\n",
            "   <key>file</key><integer>0</integer>\n",
            "  </dict>\n",
            "  </dict>\n",
            " </array>\n",
            "</dict>\n",
            "</plist>"
        );
        assert_eq!(out, format!("{}<dict>\n{}", HEADER, expected_body));
    }

    #[test]
    fn test_call_depths() {
        let call = CallPiece {
            call_enter: Some(EventPiece::new(at(5, 3), "Calling 'g'")),
            call_enter_within_caller: Some(EventPiece::new(at(1, 1), "Entered call from 'f'")),
            path: vec![PathPiece::Event(EventPiece::new(at(2, 3), "inside"))],
            call_exit: Some(EventPiece::new(at(5, 3), "Returning from 'g'")),
            call_site: at(5, 3),
        };
        let diagnostic = PathDiagnostic {
            file: "a.c".to_string(),
            bug_type: "Bug".to_string(),
            category: "Cat".to_string(),
            description: "Bad".to_string(),
            location: at(6, 1),
            issue_context: None,
            path: vec![PathPiece::Call(call)],
        };
        let out = render_plist(std::slice::from_ref(&diagnostic));
        let depths: Vec<&str> = out
            .lines()
            .filter(|line| line.contains("<key>depth</key>"))
            .map(str::trim)
            .collect();
        assert_eq!(
            depths,
            vec![
                "<key>depth</key><integer>0</integer>",
                "<key>depth</key><integer>1</integer>",
                "<key>depth</key><integer>1</integer>",
                "<key>depth</key><integer>1</integer>",
            ]
        );
        assert!(!out.contains("issue_context"));
    }

    #[test]
    fn test_flush_writes_to_the_sink() {
        let mut consumer = PlistDiagnostics::new(Vec::new());
        consumer.flush_diagnostics().unwrap();
        let text = String::from_utf8(consumer.into_inner()).unwrap();
        assert!(text.ends_with("</plist>"));
    }
}
