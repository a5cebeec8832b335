//! Chunker (C2): splits cleaned pages into bounded, context-aware chunks.
//!
//! Grounded on the teacher's `chunking::traits::Chunker` trait shape and
//! factory convention; the packing algorithm itself implements this crate's
//! resolved per-page variant (`SPEC_FULL.md` ?9), not the teacher's sliding-
//! window strategies nor the rejected doc-concatenated Python chunker.

use crate::clean::is_verbatim_ish;
use crate::config::Settings;
use crate::core::Chunk;
use crate::core::Page;

/// Splits a page's cleaned text into blank-line-delimited blocks, joining
/// non-verbatim lines within a block with single spaces and preserving
/// line breaks within verbatim-majority blocks.
fn split_into_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.split('\n') {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(render_block(&current));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(render_block(&current));
    }
    blocks
}

fn render_block(lines: &[&str]) -> String {
    let verbatim_count = lines.iter().filter(|l| is_verbatim_ish(l)).count();
    if verbatim_count * 2 >= lines.len() {
        lines.join("\n")
    } else {
        lines
            .iter()
            .map(|l| l.trim())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Greedily packs a page's blocks into chunks bounded by `target_chars`/
/// `max_chars`/`min_chars`, carrying the last `overlap_blocks` blocks
/// forward across a flush.
fn pack_blocks(blocks: &[String], config: &Settings) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0usize;

    let flush = |current: &mut Vec<String>, current_len: &mut usize, chunks: &mut Vec<String>| {
        if !current.is_empty() {
            let joined = current.join("\n\n");
            if joined.chars().count() >= config.chunk_min_chars {
                chunks.push(joined);
            }
        }
        *current = Vec::new();
        *current_len = 0;
    };

    for block in blocks {
        let block_len = block.chars().count();

        if current.is_empty() && block_len > config.chunk_max_chars {
            chunks.push(block.clone());
            continue;
        }

        let separator_len = if current.is_empty() { 0 } else { 2 };
        let fits_target = current_len + separator_len + block_len <= config.chunk_target_chars;
        let fits_while_small =
            current_len + separator_len + block_len <= config.chunk_max_chars && current_len < config.chunk_min_chars;

        if current.is_empty() || fits_target || fits_while_small {
            current.push(block.clone());
            current_len += separator_len + block_len;
        } else {
            let overlap: Vec<String> = current
                .iter()
                .rev()
                .take(config.chunk_overlap_blocks)
                .rev()
                .cloned()
                .collect();
            flush(&mut current, &mut current_len, &mut chunks);
            for carried in overlap {
                let carried_len = carried.chars().count();
                current_len += if current.is_empty() { carried_len } else { 2 + carried_len };
                current.push(carried);
            }
            current.push(block.clone());
            current_len += if current.len() > 1 { 2 } else { 0 } + block_len;
        }
    }
    flush(&mut current, &mut current_len, &mut chunks);

    chunks
}

/// Splits cleaned pages into an ordered list of chunks, one page at a time.
/// Output ordering is `(doc_id, page_number, index)`; every chunk has
/// `start_page == end_page`.
#[must_use]
pub fn chunk_pages(pages: &[Page], settings: &Settings) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for page in pages {
        let blocks = split_into_blocks(&page.text);
        if blocks.is_empty() {
            continue;
        }
        let packed = pack_blocks(&blocks, settings);
        for (index, text) in packed.into_iter().enumerate() {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }
            let chunk_id = Chunk::make_id(&page.doc_id, page.page_number, index);
            chunks.push(Chunk::new(
                chunk_id,
                page.doc_id.clone(),
                page.page_number,
                page.page_number,
                trimmed.to_string(),
            ));
        }
    }
    chunks
}
