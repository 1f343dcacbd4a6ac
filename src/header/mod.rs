//! Patch-file metadata headers.
//!
//! A patch file may start with free text before the diff body. Lines in that
//! region of the form `Tag: value` (or `@tag value`) carry metadata:
//!
//! ```text
//! Fix double escaping in the renderer
//!
//! Target: acme/lib
//! Version: >=1.2 <2.0
//! Ticket: ACME-42
//! After: patches/base.patch
//!
//! --- a/src/Renderer.php
//! +++ b/src/Renderer.php
//! ```

pub mod aliases;
pub mod parser;

pub use aliases::{apply_aliases, default_aliases, TagAliases};
pub use parser::{extract_header, parse_tags, HeaderTags};

/// Canonical tag names.
pub mod tags {
    pub const LABEL: &str = "label";
    pub const ISSUE: &str = "issue";
    pub const LINK: &str = "link";
    pub const PACKAGE: &str = "package";
    pub const DEPENDS: &str = "depends";
    pub const VERSION: &str = "version";
    pub const AFTER: &str = "after";
    pub const SKIP: &str = "skip";
}

/// Parse a patch file's contents into alias-resolved header tags.
pub fn read_tags(contents: &str) -> HeaderTags {
    let header = extract_header(contents);
    apply_aliases(parse_tags(&header), default_aliases())
}
