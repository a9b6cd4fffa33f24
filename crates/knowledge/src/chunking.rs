//! Splits ingested document text into overlapping, sentence-aligned chunks.

const TARGET_CHARS: usize = 1600;
const OVERLAP_RATIO: f32 = 0.12;

/// Split `text` into chunks of roughly `TARGET_CHARS` characters, breaking on
/// sentence boundaries (`. `, `? `, `! `, newline) where possible, with a
/// ~12% character overlap between consecutive chunks so a fact split across
/// a boundary isn't lost entirely.
pub fn chunk_text(text: &str) -> Vec<String> {
    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return Vec::new();
    }

    let overlap_chars = (TARGET_CHARS as f32 * OVERLAP_RATIO) as usize;
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut carry = String::new();

    for sentence in sentences {
        if !current.is_empty() && current.len() + sentence.len() > TARGET_CHARS {
            chunks.push(std::mem::take(&mut current));
            current.push_str(&carry);
            carry.clear();
        }
        current.push_str(&sentence);

        if current.len() + overlap_chars >= TARGET_CHARS {
            let start = current.len().saturating_sub(overlap_chars);
            carry = current[start..].to_string();
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }

    chunks
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        let is_boundary = (b == b'.' || b == b'?' || b == b'!' || b == b'\n')
            && (i + 1 == bytes.len() || bytes[i + 1] == b' ' || bytes[i + 1] == b'\n');
        if is_boundary {
            let s = &text[start..=i];
            if !s.trim().is_empty() {
                sentences.push(format!("{} ", s.trim()));
            }
            start = i + 1;
        }
    }
    if start < text.len() {
        let rest = text[start..].trim();
        if !rest.is_empty() {
            sentences.push(format!("{rest} "));
        }
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("").is_empty());
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = chunk_text("One sentence. Another sentence.");
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn long_text_splits_on_sentence_boundaries() {
        let sentence = "The quick brown fox jumps over the lazy dog. ".repeat(60);
        let chunks = chunk_text(&sentence);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.trim_end().ends_with('.'));
        }
    }
}
