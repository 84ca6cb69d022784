// src/render.rs

//! Markdown documents and directory listings rendered as HTML pages.
//!
//! Everything here is stateless: each call reads what it needs from disk and
//! returns a finished value. Every page embeds its view identifier so the
//! browser can hand it back when it opens the live-reload channel.

use crate::error::ServeError;
use crate::paths::is_markdown;
use crate::resolver::Target;
use crate::view_match::ViewKind;
use pulldown_cmark::escape::{escape_href, escape_html};
use pulldown_cmark::{html, Event, HeadingLevel, Options, Parser, Tag};
use std::fs;
use std::path::Path;
use tracing::debug;

const INDEX_FILE: &str = "index.md";

/// A rendered HTML page.
#[derive(Debug, Clone)]
pub struct Page {
    /// Full HTML document
    pub html: String,
    pub title: String,
    /// Canonical relative path the viewer is looking at
    pub view_id: String,
    pub view_kind: ViewKind,
}

/// A raw image served from the root.
#[derive(Debug, Clone)]
pub struct Image {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone)]
pub enum Rendered {
    Page(Page),
    Image(Image),
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub is_dir: bool,
}

/// Renders a resolved target.
///
/// Markdown files and directories become pages, images are returned as raw
/// bytes, anything else is forbidden.
pub fn render(target: &Target, preview_lines: usize) -> Result<Rendered, ServeError> {
    match target {
        Target::Directory { path, rel } => {
            render_directory(path, rel, preview_lines).map(Rendered::Page)
        }
        Target::File { path, rel } if is_markdown(rel) => {
            render_document(path, rel).map(Rendered::Page)
        }
        Target::File { path, rel } => match image_content_type(rel) {
            Some(content_type) => Ok(Rendered::Image(Image {
                bytes: fs::read(path)?,
                content_type,
            })),
            None => Err(ServeError::ForbiddenPath(rel.clone())),
        },
    }
}

/// Converts markdown to an HTML fragment. Embedded HTML passes through untouched.
pub fn markdown_to_html(source: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(source, options);
    let mut out = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Plain text of the first level-1 heading, if any.
pub fn markdown_title(source: &str) -> Option<String> {
    let mut in_title = false;
    let mut title = String::new();
    for event in Parser::new(source) {
        match event {
            Event::Start(Tag::Heading(HeadingLevel::H1, _, _)) => in_title = true,
            Event::End(Tag::Heading(HeadingLevel::H1, _, _)) => break,
            Event::Text(text) | Event::Code(text) if in_title => title.push_str(&text),
            _ => {}
        }
    }
    let title = title.trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// Renders a markdown document.
pub fn render_document(path: &Path, rel: &str) -> Result<Page, ServeError> {
    if !is_markdown(rel) {
        return Err(ServeError::ForbiddenPath(rel.to_string()));
    }
    let source = read_lossy(path)?;
    let title = markdown_title(&source).unwrap_or_else(|| file_name(rel).to_string());
    let body = format!(
        "<article class=\"markdown-body\">\n{}</article>\n",
        markdown_to_html(&source)
    );
    debug!("Rendered document {} ({} bytes)", rel, source.len());
    Ok(Page {
        html: page_shell(&title, rel, ViewKind::Document, &body),
        title,
        view_id: rel.to_string(),
        view_kind: ViewKind::Document,
    })
}

/// Reads a text file, replacing invalid UTF-8 instead of failing on it.
fn read_lossy(path: &Path) -> Result<String, ServeError> {
    let bytes = fs::read(path)?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

/// Immediate children worth listing: subdirectories and `.md` files,
/// directories first, each group sorted by name.
pub fn list_directory(path: &Path) -> Result<Vec<Entry>, ServeError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        // file_type() does not follow symlinks; stat the literal path instead.
        let is_dir = entry.path().is_dir();
        if is_dir || is_markdown(&name) {
            entries.push(Entry { name, is_dir });
        }
    }
    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
    Ok(entries)
}

/// Renders a directory listing, with a preview of its `index.md` when present.
pub fn render_directory(path: &Path, rel: &str, preview_lines: usize) -> Result<Page, ServeError> {
    let entries = list_directory(path)?;
    let title = format!("/{}", rel);

    let mut body = String::from("<nav class=\"listing\">\n<ul>\n");
    if !rel.is_empty() {
        let parent = rel.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
        body.push_str(&format!(
            "<li class=\"parent\"><a href=\"{}\">../</a></li>\n",
            href(parent, true)
        ));
    }
    for entry in &entries {
        let child = join_rel(rel, &entry.name);
        let (class, label) = if entry.is_dir {
            ("dir", format!("{}/", entry.name))
        } else {
            ("doc", entry.name.clone())
        };
        body.push_str(&format!(
            "<li class=\"{}\"><a href=\"{}\">{}</a></li>\n",
            class,
            href(&child, entry.is_dir),
            escape_text(&label)
        ));
    }
    body.push_str("</ul>\n</nav>\n");

    let index_path = path.join(INDEX_FILE);
    if index_path.is_file() {
        // The index may change between the listing and this read; a stale
        // preview is fine since the next change reloads the page anyway.
        match read_lossy(&index_path) {
            Ok(source) => {
                let preview: Vec<&str> = source.lines().take(preview_lines).collect();
                body.push_str(&format!(
                    "<a class=\"index-preview\" href=\"{}\">\n<div class=\"markdown-body\">\n{}</div>\n</a>\n",
                    href(&join_rel(rel, INDEX_FILE), false),
                    markdown_to_html(&preview.join("\n"))
                ));
            }
            Err(e) => debug!("Skipping index preview for /{}: {}", rel, e),
        }
    }

    Ok(Page {
        html: page_shell(&title, rel, ViewKind::Listing, &body),
        title,
        view_id: rel.to_string(),
        view_kind: ViewKind::Listing,
    })
}

/// Content type for an image file name, `None` for anything else.
pub fn image_content_type(name: &str) -> Option<String> {
    let mime = mime_guess::from_path(name).first()?;
    (mime.type_() == mime_guess::mime::IMAGE).then(|| mime.essence_str().to_string())
}

fn page_shell(title: &str, view_id: &str, view_kind: ViewKind, body: &str) -> String {
    // JSON string literal, with `</` broken up so the id cannot close the script tag.
    let view_literal = serde_json::to_string(view_id)
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace("</", "<\\/");
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<link rel="stylesheet" href="/static/style.css">
</head>
<body>
<header class="breadcrumbs">{crumbs}</header>
<main>
{body}</main>
<script>window.MDLIVE_VIEW = {view_literal}; window.MDLIVE_VIEW_KIND = "{view_kind}";</script>
<script src="/static/livereload.js"></script>
</body>
</html>
"#,
        title = escape_text(title),
        crumbs = breadcrumbs(view_id),
        body = body,
        view_literal = view_literal,
        view_kind = view_kind.as_str(),
    )
}

fn breadcrumbs(view_id: &str) -> String {
    let mut out = format!("<a href=\"{}\">~</a>", href("", true));
    let mut acc = String::new();
    let segments: Vec<&str> = view_id.split('/').filter(|s| !s.is_empty()).collect();
    for (i, segment) in segments.iter().enumerate() {
        acc = join_rel(&acc, segment);
        let is_last = i + 1 == segments.len();
        if is_last {
            out.push_str(&format!(" / <span>{}</span>", escape_text(segment)));
        } else {
            out.push_str(&format!(
                " / <a href=\"{}\">{}</a>",
                href(&acc, true),
                escape_text(segment)
            ));
        }
    }
    out
}

fn join_rel(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

fn file_name(rel: &str) -> &str {
    rel.rsplit('/').next().unwrap_or(rel)
}

/// Absolute link to a relative path, escaped for use in an attribute.
/// Directories get a trailing slash.
fn href(rel: &str, is_dir: bool) -> String {
    // escape_href keeps URL delimiters, but here they are part of file names.
    let mut path = String::from("/");
    for c in rel.chars() {
        match c {
            '%' => path.push_str("%25"),
            '#' => path.push_str("%23"),
            '?' => path.push_str("%3F"),
            _ => path.push(c),
        }
    }
    if is_dir && !rel.is_empty() {
        path.push('/');
    }
    let mut out = String::with_capacity(path.len());
    // Writing into a String cannot fail.
    let _ = escape_href(&mut out, &path);
    out
}

fn escape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let _ = escape_html(&mut out, raw);
    out
}
