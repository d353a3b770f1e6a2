//! Compile errors reported by a pass.

use std::fmt;

use crate::core::PagePath;

/// Broad error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced module (or the page source itself) does not exist
    ModuleNotFound,
    /// The compiler rejected the module
    Build,
    /// I/O and everything else
    Other,
}

/// One error from a compile pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    /// Page whose entry point produced the error
    pub entry: Option<PagePath>,
    /// Module the error is attributed to
    pub module: String,
    pub kind: ErrorKind,
    pub message: String,
    /// Error sits in the page's own module rather than a dependency
    pub is_entry_module: bool,
    /// Number of dependencies of the failing module
    pub dependencies: usize,
}

impl CompileError {
    pub fn new(kind: ErrorKind, module: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entry: None,
            module: module.into(),
            kind,
            message: message.into(),
            is_entry_module: false,
            dependencies: 0,
        }
    }

    /// Attribute to a page's own module.
    pub fn in_entry(mut self, page: PagePath) -> Self {
        self.entry = Some(page);
        self.is_entry_module = true;
        self
    }

    /// Attribute to a dependency of a page.
    pub fn in_dependency_of(mut self, page: PagePath, dependencies: usize) -> Self {
        self.entry = Some(page);
        self.is_entry_module = false;
        self.dependencies = dependencies;
        self
    }

    /// The compiler's module graph no longer matches the filesystem.
    ///
    /// A missing module that is either a page entry or a leaf with no
    /// dependencies of its own cannot be fixed by recompiling the page.
    pub fn is_hard_failure(&self) -> bool {
        self.kind == ErrorKind::ModuleNotFound && (self.is_entry_module || self.dependencies == 0)
    }

    /// Error belongs to the page's own module and is shown for that page.
    pub fn is_page_error(&self) -> bool {
        self.entry.is_some() && self.is_entry_module
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.module, self.message)
    }
}

impl std::error::Error for CompileError {}
