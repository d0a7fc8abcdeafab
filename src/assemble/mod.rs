// Event assembly
//
// Passes run in a fixed order:
//   key tags | auto modes -> manual hints -> finalize -> capitalize -> trim

pub mod rules;

use tracing::{debug, info, warn};

use crate::config::{AutoMode, HintAction, JoinConfig, KeyTag};
use crate::region::AudioRegion;
use crate::subtitle::SubtitleEvent;

/// One surviving region with its recognized and translated text
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyInput {
    pub region: AudioRegion,
    pub src_text: String,
    pub dst_text: Option<String>,
    pub missing_translation: bool,
    /// Where speech actually starts and ends inside the region
    pub speech_span: Option<(f64, f64)>,
}

impl AssemblyInput {
    pub fn new<S: Into<String>>(region: AudioRegion, src_text: S) -> Self {
        Self {
            region,
            src_text: src_text.into(),
            dst_text: None,
            missing_translation: false,
            speech_span: None,
        }
    }

    pub fn with_translation(mut self, dst_text: Option<String>, requested: bool) -> Self {
        self.missing_translation = requested && dst_text.is_none();
        self.dst_text = dst_text;
        self
    }

    pub fn with_speech_span(mut self, span: Option<(f64, f64)>) -> Self {
        self.speech_span = span;
        self
    }
}

/// Verdict for the boundary between two adjacent drafts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinDecision {
    Merge,
    /// Forced apart by a stop word or delimiter; later auto passes keep it
    Split,
    /// Size or gap limits not met
    Unchanged,
}

#[derive(Debug, Clone)]
struct Piece {
    source: usize,
    start: f64,
    end: f64,
    src: String,
    dst: Option<String>,
    missing: bool,
    speech: Option<(f64, f64)>,
}

impl From<AssemblyInput> for Piece {
    fn from(input: AssemblyInput) -> Self {
        Self {
            source: input.region.index,
            start: input.region.start,
            end: input.region.end,
            src: input.src_text.trim().to_string(),
            dst: input.dst_text.map(|dst| dst.trim().to_string()),
            missing: input.missing_translation,
            speech: input.speech_span,
        }
    }
}

/// A run of pieces that will become one event
#[derive(Debug, Clone)]
struct Draft {
    pieces: Vec<Piece>,
    /// The boundary after this draft must not be merged by auto passes
    locked_after: bool,
}

impl Draft {
    fn single(piece: Piece) -> Self {
        Self { pieces: vec![piece], locked_after: false }
    }

    fn start(&self) -> f64 {
        self.pieces.first().map_or(0.0, |p| p.start)
    }

    fn end(&self) -> f64 {
        self.pieces.last().map_or(0.0, |p| p.end)
    }

    fn first_source(&self) -> Option<usize> {
        self.pieces.first().map(|p| p.source)
    }

    fn last_source(&self) -> Option<usize> {
        self.pieces.last().map(|p| p.source)
    }

    fn src_text(&self) -> String {
        self.pieces.iter().fold(String::new(), |acc, p| rules::join_text(&acc, &p.src))
    }

    fn absorb(&mut self, other: Draft) {
        self.pieces.extend(other.pieces);
        self.locked_after = other.locked_after;
    }

    fn into_event(self) -> SubtitleEvent {
        let mut event = SubtitleEvent::new(self.start(), self.end(), self.src_text());
        let translated: Vec<&str> = self.pieces.iter().filter_map(|p| p.dst.as_deref()).collect();
        if !translated.is_empty() {
            event.dst_text = Some(
                translated.iter().fold(String::new(), |acc, dst| rules::join_text(&acc, dst)),
            );
        }
        event.missing_translation = self.pieces.iter().any(|p| p.missing);
        event
    }

    /// Tightest interval holding the speech of every piece
    fn speech_bounds(&self) -> Option<(f64, f64)> {
        let spans: Vec<(f64, f64)> = self.pieces.iter().filter_map(|p| p.speech).collect();
        let start = spans.iter().map(|s| s.0).reduce(f64::min)?;
        let end = spans.iter().map(|s| s.1).reduce(f64::max)?;
        Some((start, end))
    }
}

pub struct EventAssembler {
    config: JoinConfig,
}

impl EventAssembler {
    pub fn new(config: JoinConfig) -> Self {
        Self { config }
    }

    /// Turn ordered per-region texts into the final event sequence.
    /// The result depends only on `inputs` and the join settings.
    pub fn assemble(&self, inputs: Vec<AssemblyInput>) -> Vec<SubtitleEvent> {
        let input_count = inputs.len();
        let mut drafts: Vec<Draft> = inputs.into_iter().map(|i| Draft::single(i.into())).collect();

        if let Some(tag) = self.config.key_tag {
            drafts = self.join_by_key_tag(drafts, tag);
        } else {
            for mode in &self.config.auto_modes {
                if *mode == AutoMode::PunctAuto && !self.config.dont_split {
                    drafts = self.split_sentences(drafts);
                }
                drafts = self.auto_merge(drafts);
                debug!("After {:?}: {} drafts", mode, drafts.len());
            }
        }
        drafts = self.apply_hints(drafts);

        let mut events: Vec<SubtitleEvent> = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let bounds = draft.speech_bounds();
            let mut event = draft.into_event();
            if self.config.capitalize {
                event.src_text = rules::capitalize_sentence(&event.src_text);
                event.dst_text = event.dst_text.map(|dst| rules::capitalize_sentence(&dst));
            }
            if self.config.trim {
                trim_to_speech(&mut event, bounds);
            }
            events.push(event);
        }

        info!("Assembled {} events from {} regions", events.len(), input_count);
        events
    }

    /// Merge while the left text ends with the key tag, then strip every tag
    fn join_by_key_tag(&self, drafts: Vec<Draft>, tag: KeyTag) -> Vec<Draft> {
        let mut joined: Vec<Draft> = Vec::with_capacity(drafts.len());
        for draft in drafts {
            match joined.last_mut() {
                Some(last)
                    if last.pieces.last().is_some_and(|p| rules::ends_with_key_tag(&p.src, tag)) =>
                {
                    last.absorb(draft)
                }
                _ => joined.push(draft),
            }
        }
        for piece in joined.iter_mut().flat_map(|d| d.pieces.iter_mut()) {
            piece.src = rules::strip_key_tags(&piece.src);
            piece.dst = piece.dst.as_deref().map(rules::strip_key_tags);
        }
        joined
    }

    pub fn decide(&self, left: &str, right: &str, gap: f64) -> JoinDecision {
        let config = &self.config;
        if config.stop_words_1.iter().any(|w| rules::ends_with_word(left, w))
            || config.stop_words_2.iter().any(|w| rules::starts_with_word(right, w))
            || rules::delimiter_at_boundary(left, right, &config.delimiters)
        {
            return JoinDecision::Split;
        }
        let merged_length = rules::char_len(left) + rules::char_len(right);
        if merged_length <= config.max_join_size && gap <= config.max_delta_time {
            JoinDecision::Merge
        } else {
            JoinDecision::Unchanged
        }
    }

    fn auto_merge(&self, drafts: Vec<Draft>) -> Vec<Draft> {
        let mut merged: Vec<Draft> = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let Some(last) = merged.last_mut() else {
                merged.push(draft);
                continue;
            };
            if last.locked_after {
                merged.push(draft);
                continue;
            }
            let gap = draft.start() - last.end();
            match self.decide(&last.src_text(), &draft.src_text(), gap) {
                JoinDecision::Merge => last.absorb(draft),
                JoinDecision::Split => {
                    last.locked_after = true;
                    merged.push(draft);
                }
                JoinDecision::Unchanged => merged.push(draft),
            }
        }
        merged
    }

    /// Break drafts at sentence delimiters inside a piece's text
    fn split_sentences(&self, drafts: Vec<Draft>) -> Vec<Draft> {
        let mut result = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let locked_after = draft.locked_after;
            let mut current: Vec<Piece> = Vec::new();
            for piece in draft.pieces {
                let mut parts = split_piece(&piece, &self.config.delimiters).into_iter();
                let Some(first) = parts.next() else { continue };
                current.push(first);
                for part in parts {
                    result.push(Draft { pieces: std::mem::take(&mut current), locked_after: true });
                    current.push(part);
                }
            }
            if !current.is_empty() {
                result.push(Draft { pieces: current, locked_after });
            }
        }
        result
    }

    fn apply_hints(&self, mut drafts: Vec<Draft>) -> Vec<Draft> {
        for hint in &self.config.hints {
            match hint.action {
                HintAction::Merge => {
                    let position = drafts.windows(2).position(|pair| {
                        pair[0].last_source() == Some(hint.after)
                            && pair[1].first_source().is_some_and(|s| s > hint.after)
                    });
                    match position {
                        Some(i) => {
                            let right = drafts.remove(i + 1);
                            drafts[i].absorb(right);
                        }
                        None => warn!("No boundary after region {} to merge", hint.after),
                    }
                }
                HintAction::Split if self.config.dont_split => {
                    debug!("Ignoring split hint after region {} (merge-only)", hint.after);
                }
                HintAction::Split => {
                    let found = drafts.iter().enumerate().find_map(|(i, draft)| {
                        draft
                            .pieces
                            .windows(2)
                            .position(|pair| pair[0].source == hint.after && pair[1].source > hint.after)
                            .map(|p| (i, p + 1))
                    });
                    match found {
                        Some((i, at)) => {
                            let tail = drafts[i].pieces.split_off(at);
                            let locked_after = drafts[i].locked_after;
                            drafts[i].locked_after = true;
                            drafts.insert(i + 1, Draft { pieces: tail, locked_after });
                        }
                        None => debug!("Boundary after region {} is already split", hint.after),
                    }
                }
            }
        }
        drafts
    }
}

/// Divide a piece at internal sentence ends, sharing time by character count.
/// A translation that does not break into the same number of sentences keeps
/// the piece whole.
fn split_piece(piece: &Piece, delimiters: &str) -> Vec<Piece> {
    let src_parts = rules::split_sentences(&piece.src, delimiters);
    if src_parts.len() < 2 {
        return vec![piece.clone()];
    }
    let dst_parts: Option<Vec<String>> = match &piece.dst {
        Some(dst) => {
            let parts = rules::split_sentences(dst, delimiters);
            if parts.len() != src_parts.len() {
                return vec![piece.clone()];
            }
            Some(parts)
        }
        None => None,
    };

    let total_chars: usize = src_parts.iter().map(|p| rules::char_len(p)).sum();
    let duration = piece.end - piece.start;
    let mut consumed = 0usize;
    let mut pieces = Vec::with_capacity(src_parts.len());

    for (i, src) in src_parts.iter().enumerate() {
        let start = piece.start + duration * consumed as f64 / total_chars as f64;
        consumed += rules::char_len(src);
        let end = if i + 1 == src_parts.len() {
            piece.end
        } else {
            piece.start + duration * consumed as f64 / total_chars as f64
        };
        let speech = piece.speech.and_then(|(s, e)| {
            let (s, e) = (s.max(start), e.min(end));
            (e > s).then_some((s, e))
        });
        pieces.push(Piece {
            source: piece.source,
            start,
            end,
            src: src.clone(),
            dst: dst_parts.as_ref().map(|parts| parts[i].clone()),
            missing: piece.missing,
            speech,
        });
    }
    pieces
}

fn trim_to_speech(event: &mut SubtitleEvent, bounds: Option<(f64, f64)>) {
    if let Some((start, end)) = bounds {
        let start = start.max(event.start);
        let end = end.min(event.end);
        if end > start {
            event.start = start;
            event.end = end;
        }
    }
}
