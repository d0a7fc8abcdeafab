use tracing::debug;

/// Consecutive texts sent as one translation request
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationBatch {
    pub index: usize,
    /// Input position of each text, for unbatching
    pub positions: Vec<usize>,
    pub texts: Vec<String>,
}

impl TranslationBatch {
    /// Characters counted against the budget; separators are free
    pub fn char_count(&self) -> usize {
        self.texts.iter().map(|t| t.chars().count()).sum()
    }

    /// One text per line
    pub fn joined(&self) -> String {
        self.texts.join("\n")
    }

    /// Split a response back into per-text translations. `None` when the
    /// backend did not keep one line per text.
    pub fn unbatch(&self, response: &str) -> Option<Vec<String>> {
        let lines: Vec<String> = response
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        if lines.len() == self.texts.len() {
            Some(lines)
        } else {
            debug!(
                "Batch {} came back with {} lines for {} texts",
                self.index,
                lines.len(),
                self.texts.len()
            );
            None
        }
    }
}

/// Group non-empty texts into batches of at most `max_chars` characters.
///
/// A text is never split across batches; one longer than the budget gets a
/// batch of its own. Empty texts are left out.
pub fn build_batches(texts: &[String], max_chars: usize) -> Vec<TranslationBatch> {
    let mut batches: Vec<TranslationBatch> = Vec::new();
    let mut current: Option<TranslationBatch> = None;

    for (position, text) in texts.iter().enumerate() {
        // Lines are the unbatching boundary
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            continue;
        }
        let len = text.chars().count();

        if let Some(batch) = current.as_mut() {
            if batch.char_count() + len <= max_chars {
                batch.positions.push(position);
                batch.texts.push(text);
                continue;
            }
        }
        if let Some(full) = current.take() {
            batches.push(full);
        }
        current = Some(TranslationBatch {
            index: batches.len(),
            positions: vec![position],
            texts: vec![text],
        });
    }

    if let Some(last) = current {
        batches.push(last);
    }
    batches
}
