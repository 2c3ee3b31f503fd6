// SPDX-License-Identifier: MIT

//! Default gates.
//!
//! Every gate is self-contained: it reads only files under the context's
//! workspace root, honors the exclusion list, and reports findings
//! instead of failing the pipeline.

mod anti_abstraction;
mod checklist;
mod coverage;
mod format;
mod library_first;
mod lint;
mod security;
mod simplicity;
mod test;
mod test_first;
mod typing;

pub use anti_abstraction::AntiAbstractionGate;
pub use checklist::ChecklistGate;
pub use coverage::CoverageGate;
pub use format::FormatGate;
pub use library_first::LibraryFirstGate;
pub use lint::LintGate;
pub use security::SecurityGate;
pub use simplicity::SimplicityGate;
pub use test::TestGate;
pub use test_first::TestFirstGate;
pub use typing::TypeGate;

use std::path::Path;

/// Source file extensions the analyzers care about.
pub(crate) const SOURCE_EXTENSIONS: &[&str] = &["py", "js", "jsx", "ts", "tsx", "rs", "go"];

/// Read a file as UTF-8, skipping binaries and unreadable files.
pub(crate) fn read_text(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

/// True when the path looks like a test file.
pub(crate) fn is_test_file(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let in_test_dir = path.components().any(|c| {
        matches!(
            c.as_os_str().to_str(),
            Some("tests") | Some("test") | Some("__tests__") | Some("spec")
        )
    });
    in_test_dir
        || name.starts_with("test_")
        || name.ends_with("_test.py")
        || name.ends_with("_test.go")
        || name.ends_with("_test.rs")
        || name.ends_with("_tests.rs")
        || name.ends_with(".test.js")
        || name.ends_with(".test.ts")
        || name.ends_with(".spec.js")
        || name.ends_with(".spec.ts")
}
