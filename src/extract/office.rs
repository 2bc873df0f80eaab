//! Text-run extraction for zipped office-XML documents.
//!
//! Both formats are zip containers holding XML parts; the surrogate only
//! needs the human-visible run contents, so the parts are scanned for
//! text runs directly instead of being parsed as full XML trees.

use std::io::{Cursor, Read};

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use zip::ZipArchive;

/// `<w:t>` runs hold the visible text of a word-processing body.
static WORD_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<w:t[^>]*>([^<]*)</w:t>").unwrap());
/// `<a:t>` runs hold the visible text of presentation shapes.
static SLIDE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<a:t[^>]*>([^<]*)</a:t>").unwrap());
static SLIDE_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ppt/slides/slide([0-9]+)\.xml$").unwrap());

/// Extract the text runs of the main document body, in document order,
/// joined by single spaces.
pub fn extract_document_text(bytes: &[u8]) -> anyhow::Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).context("word container")?;
    let xml = read_entry(&mut archive, "word/document.xml")?;

    Ok(collect_runs(&WORD_RUN, &xml))
}

/// Extract the text runs of every slide, slides in numeric order, slide
/// texts separated by a single space.
pub fn extract_slide_text(bytes: &[u8]) -> anyhow::Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).context("presentation container")?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let captures = SLIDE_PART.captures(name)?;
            let number = captures[1].parse::<u32>().ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slides.sort_by_key(|(number, _)| *number);

    let mut texts = Vec::with_capacity(slides.len());
    for (_, name) in slides {
        let xml = read_entry(&mut archive, &name)?;
        texts.push(collect_runs(&SLIDE_RUN, &xml));
    }

    Ok(texts.join(" "))
}

fn read_entry(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> anyhow::Result<String> {
    let mut entry = archive
        .by_name(name)
        .with_context(|| format!("missing container part {name}"))?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    Ok(xml)
}

fn collect_runs(run: &Regex, xml: &str) -> String {
    run.captures_iter(xml)
        .map(|captures| captures[1].to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
