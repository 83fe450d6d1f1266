//! The `Document` value type and its pure operations.
//!
//! Everything here is side-effect free: a [`Document`] in, a new [`Document`]
//! out (or an error). Persistence, locking and revision-conflict policy live
//! one layer up in [`crate::persistence`] and [`crate::command`]; this module
//! only knows how to parse, edit and re-render the value itself, the way the
//! teacher's `session.rs` keeps transcript mutation free of its store's I/O.

use crate::error::{FolioError, Result};
use crate::frontmatter::{Header, HeaderSyntax, FrontmatterRegistry};
use std::path::PathBuf;

/// An in-memory markdown-plus-metadata document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Workspace-relative path this document was loaded from, if any.
    pub path: Option<PathBuf>,
    pub header: Header,
    pub body: String,
    /// Monotonically increasing value-level revision; bumped only by edits
    /// that actually change header or body content.
    pub revision: u64,
    /// True once `revision` has moved past the value it held at load time.
    pub dirty: bool,
    /// Declarative schema name bound to this document, if any (§4.7).
    pub schema: Option<String>,
    /// Header syntax to prefer on serialization; `None` means "no frontmatter".
    pub header_syntax: Option<HeaderSyntax>,
}

impl Document {
    /// Build a fresh, unparsed document with an empty header and given body.
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            path: None,
            header: Header::new(),
            body: body.into(),
            revision: 0,
            dirty: false,
            schema: None,
            header_syntax: None,
        }
    }

    fn from_parts(header: Header, body: String, header_syntax: Option<HeaderSyntax>) -> Self {
        Self {
            path: None,
            header,
            body,
            revision: 0,
            dirty: false,
            schema: None,
            header_syntax,
        }
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

/// Parse raw file content into a [`Document`].
///
/// A document opens with a line that is exactly `---` (YAML) or `+++` (TOML)
/// and closes with a matching line of the same delimiter; everything after
/// the closing delimiter's newline is body text verbatim. Content with no
/// recognized opening delimiter has no header at all, not an empty one.
pub fn parse(raw: &str, registry: &FrontmatterRegistry) -> Result<Document> {
    let first_line_end = raw.find('\n').map(|i| i + 1).unwrap_or(raw.len());
    let first_line = trim_eol(&raw[..first_line_end]);

    let syntax = match first_line {
        "---" => HeaderSyntax::Yaml,
        "+++" => HeaderSyntax::Toml,
        _ => return Ok(Document::from_parts(Header::new(), raw.to_string(), None)),
    };
    let delimiter = syntax.delimiter();

    let mut scan_pos = first_line_end;
    let mut line_no = 1usize;
    loop {
        if scan_pos >= raw.len() {
            return Err(FolioError::parse_failed(
                line_no,
                format!("unterminated {delimiter} frontmatter block"),
            ));
        }
        let next_nl = raw[scan_pos..]
            .find('\n')
            .map(|i| scan_pos + i + 1)
            .unwrap_or(raw.len());
        line_no += 1;
        let line = trim_eol(&raw[scan_pos..next_nl]);
        if line == delimiter {
            let header_text = &raw[first_line_end..scan_pos];
            let body_text = &raw[next_nl..];
            let header = registry.adapter(syntax).parse(header_text)?;
            return Ok(Document::from_parts(header, body_text.to_string(), Some(syntax)));
        }
        if next_nl == raw.len() {
            return Err(FolioError::parse_failed(
                line_no,
                format!("unterminated {delimiter} frontmatter block"),
            ));
        }
        scan_pos = next_nl;
    }
}

fn trim_eol(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

/// Options controlling [`serialize`].
#[derive(Debug, Clone)]
pub struct SerializeOpts {
    /// Lexicographic header key order when `true`; insertion order otherwise.
    pub sorted: bool,
    /// Emit a frontmatter block even when the header is empty.
    pub emit_empty_frontmatter: bool,
    /// Force a header syntax regardless of what the document was parsed with.
    pub syntax_override: Option<HeaderSyntax>,
}

impl Default for SerializeOpts {
    fn default() -> Self {
        Self {
            sorted: true,
            emit_empty_frontmatter: false,
            syntax_override: None,
        }
    }
}

/// Render a [`Document`] back to raw file content.
pub fn serialize(doc: &Document, registry: &FrontmatterRegistry, opts: &SerializeOpts) -> Result<String> {
    let syntax = opts
        .syntax_override
        .or(doc.header_syntax)
        .unwrap_or(HeaderSyntax::Yaml);

    if doc.header.is_empty() && !opts.emit_empty_frontmatter {
        return Ok(doc.body.clone());
    }

    let delimiter = syntax.delimiter();
    let header_text = registry.adapter(syntax).serialize(&doc.header, opts.sorted)?;
    let mut out = String::with_capacity(header_text.len() + doc.body.len() + delimiter.len() * 2 + 2);
    out.push_str(delimiter);
    out.push('\n');
    out.push_str(&header_text);
    if !header_text.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(delimiter);
    out.push('\n');
    out.push_str(&doc.body);
    Ok(out)
}

/// Line ending policy applied by [`update_body`] and [`canonicalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEndings {
    Lf,
    Crlf,
    Preserve,
}

#[derive(Debug, Clone)]
pub struct BodyUpdateOpts {
    pub line_endings: LineEndings,
    pub trim_trailing_whitespace: bool,
}

impl Default for BodyUpdateOpts {
    fn default() -> Self {
        Self {
            line_endings: LineEndings::Lf,
            trim_trailing_whitespace: false,
        }
    }
}

fn normalize_body(text: &str, opts: &BodyUpdateOpts) -> String {
    let normalized_eol = match opts.line_endings {
        LineEndings::Preserve => text.to_string(),
        LineEndings::Lf => text.replace("\r\n", "\n"),
        LineEndings::Crlf => {
            let lf_first = text.replace("\r\n", "\n");
            lf_first.replace('\n', "\r\n")
        }
    };
    if !opts.trim_trailing_whitespace {
        return normalized_eol;
    }
    let eol = if opts.line_endings == LineEndings::Crlf { "\r\n" } else { "\n" };
    normalized_eol
        .split(eol)
        .map(|line| line.trim_end_matches([' ', '\t']))
        .collect::<Vec<_>>()
        .join(eol)
}

/// Replace the body text. Returns `self` unchanged (same revision) if the
/// normalized result equals the prior body — a no-op edit never bumps
/// revision, so idempotent re-saves don't manufacture history entries.
pub fn update_body(doc: &Document, text: &str, opts: &BodyUpdateOpts) -> Document {
    let normalized = normalize_body(text, opts);
    if normalized == doc.body {
        return doc.clone();
    }
    let mut next = doc.clone();
    next.body = normalized;
    next.revision += 1;
    next.dirty = true;
    next
}

/// How [`update_header`] combines caller-supplied changes with the existing header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderUpdateMode {
    /// Caller-supplied keys overwrite or add; untouched keys survive.
    Merge,
    /// The header becomes exactly the caller-supplied mapping.
    Replace,
}

/// Update the header. A no-op change (resulting header equals the prior one)
/// leaves revision untouched, mirroring [`update_body`].
pub fn update_header(doc: &Document, changes: Header, mode: HeaderUpdateMode) -> Document {
    let new_header = match mode {
        HeaderUpdateMode::Replace => changes,
        HeaderUpdateMode::Merge => {
            let mut merged = doc.header.clone();
            for (k, v) in changes {
                merged.insert(k, v);
            }
            merged
        }
    };
    if new_header == doc.header {
        return doc.clone();
    }
    let mut next = doc.clone();
    next.header = new_header;
    next.revision += 1;
    next.dirty = true;
    next
}

/// A body mutation expressed independently of the caller's editor surface.
pub enum BodyPatch {
    /// Replace the body outright.
    Replace(String),
    /// Substring search/replace; `global` replaces every occurrence, not just the first.
    SearchReplace {
        search: String,
        replace: String,
        global: bool,
    },
    /// Caller-supplied unary transform over the current body, e.g. a
    /// programmatic rewrite a host embedding this crate runs in-process
    /// (not representable on the wire command surface).
    Transform(std::sync::Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl Clone for BodyPatch {
    fn clone(&self) -> Self {
        match self {
            BodyPatch::Replace(text) => BodyPatch::Replace(text.clone()),
            BodyPatch::SearchReplace { search, replace, global } => BodyPatch::SearchReplace {
                search: search.clone(),
                replace: replace.clone(),
                global: *global,
            },
            BodyPatch::Transform(f) => BodyPatch::Transform(std::sync::Arc::clone(f)),
        }
    }
}

impl std::fmt::Debug for BodyPatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BodyPatch::Replace(text) => f.debug_tuple("Replace").field(text).finish(),
            BodyPatch::SearchReplace { search, replace, global } => f
                .debug_struct("SearchReplace")
                .field("search", search)
                .field("replace", replace)
                .field("global", global)
                .finish(),
            BodyPatch::Transform(_) => f.debug_tuple("Transform").field(&"<fn>").finish(),
        }
    }
}

/// Apply a [`BodyPatch`], then run the result through [`update_body`].
pub fn apply_body_patch(doc: &Document, patch: &BodyPatch, opts: &BodyUpdateOpts) -> Result<Document> {
    let new_body = match patch {
        BodyPatch::Replace(text) => text.clone(),
        BodyPatch::SearchReplace { search, replace, global } => {
            if search.is_empty() {
                return Err(FolioError::invalid_params("search pattern must not be empty"));
            }
            if *global {
                doc.body.replace(search.as_str(), replace)
            } else {
                doc.body.replacen(search.as_str(), replace, 1)
            }
        }
        BodyPatch::Transform(transform) => transform(&doc.body),
    };
    Ok(update_body(doc, &new_body, opts))
}

/// Options for [`canonicalize`].
#[derive(Debug, Clone)]
pub struct CanonicalizeOpts {
    pub line_endings: LineEndings,
    pub trim_trailing_whitespace: bool,
    /// Re-order header keys lexicographically in the returned value.
    pub sort_header: bool,
}

impl Default for CanonicalizeOpts {
    fn default() -> Self {
        Self {
            line_endings: LineEndings::Lf,
            trim_trailing_whitespace: false,
            sort_header: true,
        }
    }
}

/// Produce the canonical value for a document: fixed line endings, optional
/// trailing-whitespace trim, and (optionally) a lexicographically sorted
/// header. `canonicalize(canonicalize(d)) == canonicalize(d)` for any `d`,
/// the fixed-point property exercised in §8's property tests. This does not
/// count as an edit: revision and `dirty` are left untouched.
pub fn canonicalize(doc: &Document, opts: &CanonicalizeOpts) -> Document {
    let body_opts = BodyUpdateOpts {
        line_endings: opts.line_endings,
        trim_trailing_whitespace: opts.trim_trailing_whitespace,
    };
    let body = normalize_body(&doc.body, &body_opts);
    let header = if opts.sort_header {
        let mut entries: Vec<_> = doc.header.clone().into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.into_iter().collect()
    } else {
        doc.header.clone()
    };
    Document {
        path: doc.path.clone(),
        header,
        body,
        revision: doc.revision,
        dirty: doc.dirty,
        schema: doc.schema.clone(),
        header_syntax: doc.header_syntax,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontmatter::FrontmatterRegistry;

    fn registry() -> FrontmatterRegistry {
        FrontmatterRegistry::default()
    }

    #[test]
    fn parse_reads_yaml_frontmatter_and_body() {
        let doc = parse("---\ntitle: Hi\n---\nbody text\n", &registry()).unwrap();
        assert_eq!(doc.header["title"], serde_json::json!("Hi"));
        assert_eq!(doc.body, "body text\n");
        assert_eq!(doc.header_syntax, Some(HeaderSyntax::Yaml));
    }

    #[test]
    fn parse_with_no_delimiter_has_no_header() {
        let doc = parse("just body\ntext\n", &registry()).unwrap();
        assert!(doc.header.is_empty());
        assert_eq!(doc.header_syntax, None);
        assert_eq!(doc.body, "just body\ntext\n");
    }

    #[test]
    fn parse_unterminated_block_is_parse_failed() {
        let err = parse("---\ntitle: Hi\nbody without closer\n", &registry()).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::ParseFailed);
    }

    #[test]
    fn serialize_round_trips_yaml() {
        let doc = parse("---\ntitle: Hi\n---\nbody\n", &registry()).unwrap();
        let text = serialize(&doc, &registry(), &SerializeOpts::default()).unwrap();
        let reparsed = parse(&text, &registry()).unwrap();
        assert_eq!(reparsed.header, doc.header);
        assert_eq!(reparsed.body, doc.body);
    }

    #[test]
    fn serialize_with_empty_header_has_no_frontmatter_by_default() {
        let doc = Document::new("hello\n");
        let text = serialize(&doc, &registry(), &SerializeOpts::default()).unwrap();
        assert_eq!(text, "hello\n");
    }

    #[test]
    fn update_body_is_noop_for_unchanged_content() {
        let doc = Document::new("same\n");
        let next = update_body(&doc, "same\n", &BodyUpdateOpts::default());
        assert_eq!(next.revision, 0);
        assert!(!next.dirty);
    }

    #[test]
    fn update_body_bumps_revision_on_real_change() {
        let doc = Document::new("old\n");
        let next = update_body(&doc, "new\n", &BodyUpdateOpts::default());
        assert_eq!(next.revision, 1);
        assert!(next.dirty);
    }

    #[test]
    fn update_body_normalizes_crlf_to_lf_by_default() {
        let doc = Document::new("old\n");
        let next = update_body(&doc, "line1\r\nline2\r\n", &BodyUpdateOpts::default());
        assert_eq!(next.body, "line1\nline2\n");
    }

    #[test]
    fn update_header_merge_preserves_untouched_keys() {
        let doc = parse("---\na: 1\nb: 2\n---\nbody\n", &registry()).unwrap();
        let mut changes = Header::new();
        changes.insert("b".to_string(), serde_json::json!(9));
        let next = update_header(&doc, changes, HeaderUpdateMode::Merge);
        assert_eq!(next.header["a"], serde_json::json!(1));
        assert_eq!(next.header["b"], serde_json::json!(9));
        assert_eq!(next.revision, 1);
    }

    #[test]
    fn update_header_replace_drops_untouched_keys() {
        let doc = parse("---\na: 1\nb: 2\n---\nbody\n", &registry()).unwrap();
        let mut changes = Header::new();
        changes.insert("c".to_string(), serde_json::json!(3));
        let next = update_header(&doc, changes, HeaderUpdateMode::Replace);
        assert!(!next.header.contains_key("a"));
        assert_eq!(next.header["c"], serde_json::json!(3));
    }

    #[test]
    fn apply_body_patch_global_replace() {
        let doc = Document::new("foo bar foo\n");
        let patch = BodyPatch::SearchReplace {
            search: "foo".to_string(),
            replace: "baz".to_string(),
            global: true,
        };
        let next = apply_body_patch(&doc, &patch, &BodyUpdateOpts::default()).unwrap();
        assert_eq!(next.body, "baz bar baz\n");
    }

    #[test]
    fn apply_body_patch_rejects_empty_search() {
        let doc = Document::new("foo\n");
        let patch = BodyPatch::SearchReplace {
            search: String::new(),
            replace: "x".to_string(),
            global: false,
        };
        assert!(apply_body_patch(&doc, &patch, &BodyUpdateOpts::default()).is_err());
    }

    #[test]
    fn canonicalize_is_a_fixed_point() {
        let doc = parse("---\nzebra: 1\nalpha: 2\n---\nline  \r\nother\r\n", &registry()).unwrap();
        let once = canonicalize(&doc, &CanonicalizeOpts::default());
        let twice = canonicalize(&once, &CanonicalizeOpts::default());
        assert_eq!(once, twice);
    }

    #[test]
    fn canonicalize_sorts_header_keys() {
        let doc = parse("---\nzebra: 1\nalpha: 2\n---\nbody\n", &registry()).unwrap();
        let canon = canonicalize(&doc, &CanonicalizeOpts::default());
        let keys: Vec<_> = canon.header.keys().collect();
        assert_eq!(keys, vec!["alpha", "zebra"]);
    }
}
