//! Small text-scanning helpers shared by the merger and the chunker.

/// Byte spans of the sentences in `text`, trimmed of surrounding
/// whitespace. A sentence ends at `.`, `!` or `?` followed by whitespace
/// or end of input; the terminator stays inside the span. Trailing text
/// without a terminator counts as a final sentence.
pub fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0usize;
    let mut iter = text.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        let is_terminator = matches!(c, '.' | '!' | '?');
        let at_boundary = is_terminator
            && iter
                .peek()
                .map(|&(_, next)| next.is_whitespace())
                .unwrap_or(true);

        if at_boundary {
            let end = i + c.len_utf8();
            if let Some(span) = trim_span(text, start, end) {
                spans.push(span);
            }
            start = end;
        }
    }

    if start < bytes.len() {
        if let Some(span) = trim_span(text, start, bytes.len()) {
            spans.push(span);
        }
    }

    spans
}

/// Sentences of `text` as trimmed slices
pub fn split_sentences(text: &str) -> Vec<&str> {
    sentence_spans(text)
        .into_iter()
        .map(|(s, e)| &text[s..e])
        .collect()
}

/// Byte spans of whitespace-separated words in `text`
pub fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }

    spans
}

/// Last `count` characters of `text`, on a char boundary
pub fn char_suffix(text: &str, count: usize) -> &str {
    let total = text.chars().count();
    if total <= count {
        return text;
    }
    let skip = total - count;
    match text.char_indices().nth(skip) {
        Some((i, _)) => &text[i..],
        None => text,
    }
}

/// First `count` characters of `text`, on a char boundary
pub fn char_prefix(text: &str, count: usize) -> &str {
    match text.char_indices().nth(count) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

fn trim_span(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let slice = &text[start..end];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return None;
    }
    let offset = slice.len() - slice.trim_start().len();
    let s = start + offset;
    Some((s, s + trimmed.len()))
}
