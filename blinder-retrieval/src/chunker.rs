//! Chunker (C9, §4.9): splits blinded document text into retrievable
//! windows. Prose text is windowed by whitespace-token count; pipe-
//! delimited tabular text keeps its header attached to every chunk so
//! column context survives retrieval.

/// Separator used by the blinded tabular format; also used by the
/// tabular query engine.
pub const TABULAR_SEPARATOR: &str = " | ";

/// Detect pipe-delimited tabular text: at least 2 of the first 6 lines
/// contain at least 2 occurrences of the separator (§4.9, §4.11).
pub fn is_tabular(text: &str) -> bool {
    let pipe_lines = text
        .lines()
        .take(6)
        .filter(|line| line.matches(TABULAR_SEPARATOR).count() >= 2)
        .count();
    pipe_lines >= 2
}

/// Split `text` into chunks, auto-detecting tabular vs prose layout.
pub fn chunk_document(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if is_tabular(text) {
        chunk_tabular(text, chunk_size)
    } else {
        chunk_prose(text, chunk_size, chunk_overlap)
    }
}

/// Sliding-window chunking over whitespace tokens (§4.9).
pub fn chunk_prose(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return Vec::new();
    }

    let stride = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(tokens.len());
        chunks.push(tokens[start..end].join(" "));
        if end == tokens.len() {
            break;
        }
        start += stride;
    }
    chunks
}

/// Header-preserving chunking for pipe-delimited tabular text (§4.9).
/// Each chunk carries the header line plus as many data lines as fit
/// within `max(chunk_size - header_tokens, chunk_size / 2)` tokens, so a
/// very wide header never starves every chunk down to nothing.
pub fn chunk_tabular(text: &str, chunk_size: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let header = lines[0];
    let header_tokens = header.split_whitespace().count();
    let capacity = chunk_size.saturating_sub(header_tokens).max(chunk_size / 2);

    let mut chunks = Vec::new();
    let mut current_lines: Vec<&str> = Vec::new();
    let mut current_tokens = 0usize;

    for line in &lines[1..] {
        let line_tokens = line.split_whitespace().count();
        if current_tokens + line_tokens > capacity && !current_lines.is_empty() {
            chunks.push(format_tabular_chunk(header, &current_lines));
            current_lines.clear();
            current_tokens = 0;
        }
        current_lines.push(line);
        current_tokens += line_tokens;
    }
    if !current_lines.is_empty() {
        chunks.push(format_tabular_chunk(header, &current_lines));
    }
    if chunks.is_empty() {
        chunks.push(header.to_string());
    }
    chunks
}

fn format_tabular_chunk(header: &str, data_lines: &[&str]) -> String {
    let mut out = String::from(header);
    for line in data_lines {
        out.push('\n');
        out.push_str(line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_tabular_detects_pipe_delimited_rows() {
        let text = "Name | Age | City\nJane | 30 | NYC\nJohn | 40 | LA";
        assert!(is_tabular(text));
    }

    #[test]
    fn is_tabular_rejects_prose() {
        assert!(!is_tabular("This is an ordinary paragraph of text."));
    }

    #[test]
    fn chunk_prose_produces_overlapping_windows() {
        let text = (1..=20).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        let chunks = chunk_prose(&text, 10, 2);
        assert_eq!(chunks[0], (1..=10).map(|i| i.to_string()).collect::<Vec<_>>().join(" "));
        // Second window starts at token index 8 (stride = 10 - 2 = 8).
        assert!(chunks[1].starts_with("9 10 11"));
    }

    #[test]
    fn chunk_prose_handles_short_text_as_one_chunk() {
        let chunks = chunk_prose("short text here", 512, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "short text here");
    }

    #[test]
    fn chunk_tabular_repeats_header_in_every_chunk() {
        let mut text = String::from("Name | Age | City");
        for i in 0..300 {
            text.push_str(&format!("\nPerson{i} | {} | City{i}", 20 + i % 50));
        }
        let chunks = chunk_tabular(&text, 20);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.starts_with("Name | Age | City"));
        }
    }

    #[test]
    fn chunk_tabular_single_row_is_one_chunk() {
        let text = "Name | Age\nJane | 30";
        let chunks = chunk_tabular(text, 512);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("Jane | 30"));
    }
}
