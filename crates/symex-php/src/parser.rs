//! The seam between the interpreter and the PHP parser

use crate::error::ParseFailure;
use crate::ir;
use crate::lower::lower_program;
use bumpalo::Bump;
use mago_database::file::FileId;
use mago_span::HasSpan;
use std::fs;
use std::path::Path;

/// Turns PHP source into an owned program
pub trait UnitParser {
    fn parse(&self, path: &Path, source: &str) -> Result<ir::Program, ParseFailure>;

    /// Read and parse the unit at `path`
    fn parse_file(&self, path: &Path) -> Result<ir::Program, ParseFailure> {
        let source = fs::read_to_string(path)
            .map_err(|e| ParseFailure::new(path, 0, format!("Failed to read file: {}", e)))?;
        self.parse(path, &source)
    }
}

/// Parser backed by mago-syntax
#[derive(Debug, Clone, Copy, Default)]
pub struct MagoParser;

impl UnitParser for MagoParser {
    fn parse(&self, path: &Path, source: &str) -> Result<ir::Program, ParseFailure> {
        let arena = Bump::new();
        let file_id = FileId::new(path.to_string_lossy().as_ref());
        let (program, error) = mago_syntax::parser::parse_file_content(&arena, file_id, source);

        if let Some(error) = error {
            let offset = error.span().start.offset as usize;
            let line = source
                .get(..offset)
                .map_or(0, |before| before.matches('\n').count() as u32 + 1);
            return Err(ParseFailure::new(path, line, error.to_string()));
        }

        Ok(lower_program(program, source, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::StmtKind;

    #[test]
    fn test_parse_valid_unit() {
        let program = MagoParser
            .parse(Path::new("/app/index.php"), "<?php echo 'hi';")
            .unwrap();
        assert!(program
            .statements
            .iter()
            .any(|s| matches!(s.kind, StmtKind::Echo(_))));
    }

    #[test]
    fn test_parse_failure_has_location() {
        let failure = MagoParser
            .parse(Path::new("/app/broken.php"), "<?php\n\nif (\n")
            .unwrap_err();
        assert_eq!(failure.path, Path::new("/app/broken.php"));
        assert!(failure.line >= 1);
        assert!(!failure.message.is_empty());
    }

    #[test]
    fn test_missing_file() {
        let failure = MagoParser
            .parse_file(Path::new("/nonexistent/dir/unit.php"))
            .unwrap_err();
        assert!(failure.message.starts_with("Failed to read file"));
    }
}
