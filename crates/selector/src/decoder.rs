// Beam-search selector over a unit stream.
//
// Window layout, relative to the unit being decided (`queue[cur_word]`):
//
//   prev:   up to `lookbehind` committed units, oldest first
//   queue:  units read but not committed; `cur_word` indexes the current one
//           and at least `lookahead` more are kept behind it when available
//   path:   beam layers. The first `prev.len() + 1` layers are single seed
//           hypotheses standing for the committed units; after that there is
//           one layer per decided queue unit.
//
// Hypotheses point at their predecessor by index into the previous layer,
// so a branch's reading history is recovered by walking layers backward.
// An unambiguous unit ends the undecided run: the best path is written out
// and the window slides.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::io::{BufRead, Read, Write};

use selector_core::stream::NULL_FLUSH;
use selector_core::{CharReader, FeatSet, LexicalUnit};
use tracing::{debug, trace};

use crate::SelectorError;
use crate::feature_set::FeatureSet;

/// One beam entry: (negated path score, chosen reading, predecessor index).
#[derive(Debug, Clone, Copy, PartialEq)]
struct Hypothesis {
    neg_score: f64,
    reading: usize,
    prev: usize,
}

impl Hypothesis {
    const SEED: Hypothesis = Hypothesis {
        neg_score: 0.0,
        reading: 0,
        prev: 0,
    };

    /// Best first: lowest negated score, then lowest reading, then predecessor.
    fn rank(&self, other: &Self) -> Ordering {
        self.neg_score
            .total_cmp(&other.neg_score)
            .then(self.reading.cmp(&other.reading))
            .then(self.prev.cmp(&other.prev))
    }
}

/// Stream disambiguator.
pub struct Selector {
    fs: FeatureSet,
    null_flush: bool,
    prev: VecDeque<LexicalUnit>,
    queue: VecDeque<LexicalUnit>,
    path: Vec<Vec<Hypothesis>>,
    cur_word: usize,
    at_eof: bool,
    committed_score: f64,
}

impl Selector {
    /// Load a compiled weights file.
    pub fn load<R: Read>(input: &mut R) -> Result<Self, SelectorError> {
        Ok(Self::from_feature_set(FeatureSet::load(input)?))
    }

    pub fn from_feature_set(fs: FeatureSet) -> Self {
        Self {
            fs,
            null_flush: false,
            prev: VecDeque::new(),
            queue: VecDeque::new(),
            path: vec![vec![Hypothesis::SEED]],
            cur_word: 0,
            at_eof: false,
            committed_score: 0.0,
        }
    }

    /// Flush the output after every NUL segment separator.
    pub fn with_null_flush(mut self, null_flush: bool) -> Self {
        self.null_flush = null_flush;
        self
    }

    pub fn feature_set(&self) -> &FeatureSet {
        &self.fs
    }

    /// Sum of the scores of every path written so far.
    pub fn committed_score(&self) -> f64 {
        self.committed_score
    }

    /// Disambiguate `input` into `output` until the input is exhausted.
    ///
    /// Each unit is written with its source reading and the selected target;
    /// blanks and NUL separators pass through unchanged.
    pub fn process<R: BufRead, W: Write>(
        &mut self,
        input: R,
        output: &mut W,
    ) -> Result<(), SelectorError> {
        let mut input = CharReader::new(input);
        while !input.is_eof()? {
            self.at_eof = false;
            self.refill_queue(&mut input)?;
            while !self.queue.is_empty() {
                self.process_next_word(output)?;
                self.refill_queue(&mut input)?;
            }
            if input.peek()? == Some(NULL_FLUSH) {
                input.next_char()?;
                output.write_all(&[0])?;
                if self.null_flush {
                    output.flush()?;
                }
            }
        }
        output.flush()?;
        Ok(())
    }

    /// Read until the current unit has `lookahead` units behind it, or the
    /// segment ends.
    fn refill_queue<R: BufRead>(&mut self, input: &mut CharReader<R>) -> Result<(), SelectorError> {
        if self.at_eof || self.queue.back().is_some_and(LexicalUnit::is_eof) {
            return Ok(());
        }
        while self.queue.len() < self.cur_word + self.fs.lookahead() + 1 {
            let lu = self.fs.read_lu(input)?;
            let eof = lu.is_eof();
            self.queue.push_back(lu);
            if eof {
                self.at_eof = true;
                break;
            }
        }
        Ok(())
    }

    /// The unit at window offset `pos`, where `pos == lookbehind` is the current unit.
    fn get_lu(&self, pos: usize) -> Option<&LexicalUnit> {
        let idx = (self.cur_word + pos) as isize - self.fs.lookbehind() as isize;
        if idx >= 0 {
            self.queue.get(idx as usize)
        } else {
            let back = self.prev.len() as isize + idx;
            if back >= 0 {
                self.prev.get(back as usize)
            } else {
                None
            }
        }
    }

    /// Add the candidate reading's features at 0 and the readings this
    /// branch chose for the preceding units at negative offsets.
    fn add_path_features(&self, feats: &mut FeatSet, reading: usize, pred: usize) {
        let lookbehind = self.fs.lookbehind();
        if let Some(r) = self.queue[self.cur_word].target_or_sole(reading) {
            r.collect_features(0, feats);
        }
        let mut state = pred;
        for loc in 0..lookbehind {
            if loc == self.path.len() {
                break;
            }
            let Some(lu) = self.get_lu(lookbehind - loc - 1) else {
                break;
            };
            let hyp = self.path[self.path.len() - loc - 1][state];
            state = hyp.prev;
            if let Some(r) = lu.target_or_sole(hyp.reading) {
                r.collect_features(-(loc as i32 + 1), feats);
            }
        }
    }

    fn process_next_word<W: Write>(&mut self, output: &mut W) -> Result<(), SelectorError> {
        let lookbehind = self.fs.lookbehind() as i32;
        let window = self.fs.lookbehind() + 1 + self.fs.lookahead();
        let mut context = FeatSet::new();
        for i in 0..window {
            if let Some(source) = self.get_lu(i).and_then(LexicalUnit::source) {
                source.collect_features(i as i32 - lookbehind, &mut context);
            }
        }

        let cur = &self.queue[self.cur_word];
        let ambiguous = cur.ambiguous();
        let readings = cur.targets().len().max(1);
        let last = self.path.last().map_or(&[][..], Vec::as_slice);
        let mut layer = Vec::with_capacity(readings * last.len());
        for reading in 0..readings {
            for (pred, hyp) in last.iter().enumerate() {
                let mut feats = context.clone();
                self.add_path_features(&mut feats, reading, pred);
                layer.push(Hypothesis {
                    neg_score: hyp.neg_score - self.fs.get_weight(&feats),
                    reading,
                    prev: pred,
                });
            }
        }
        layer.sort_by(Hypothesis::rank);
        if self.fs.beam_size() > 0 {
            layer.truncate(self.fs.beam_size());
        }
        trace!(unit = self.cur_word, hypotheses = layer.len(), "beam layer");
        self.path.push(layer);

        if ambiguous {
            self.cur_word += 1;
            Ok(())
        } else {
            self.commit(output)
        }
    }

    /// Write every queued unit up to the current one along the best path.
    fn commit<W: Write>(&mut self, output: &mut W) -> Result<(), SelectorError> {
        let count = self.cur_word + 1;
        let mut selected = vec![0; count];
        let mut state = 0;
        for i in 0..count {
            let hyp = self.path[self.path.len() - 1 - i][state];
            selected[count - 1 - i] = hyp.reading;
            state = hyp.prev;
        }
        if let Some(best) = self.path.last().and_then(|layer| layer.first()) {
            self.committed_score -= best.neg_score;
        }

        for (mut lu, sel) in self.queue.drain(..count).zip(selected) {
            lu.write(output, sel, false, true)?;
            lu.keep_only(sel);
            self.prev.push_back(lu);
        }
        while self.prev.len() > self.fs.lookbehind() {
            self.prev.pop_front();
        }
        debug!(units = count, "committed path");

        self.path.clear();
        self.path
            .resize(self.prev.len() + 1, vec![Hypothesis::SEED]);
        self.cur_word = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(rules: &str, input: &str) -> String {
        let fs = FeatureSet::read(rules.as_bytes()).unwrap();
        let mut selector = Selector::from_feature_set(fs);
        let mut out = Vec::new();
        selector.process(input.as_bytes(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    const RULES: &str = "L 1\nR 1\nP N1 f\nW 0:N1 -1:N1 5\n";

    #[test]
    fn hypothesis_ranking() {
        let a = Hypothesis {
            neg_score: -5.0,
            reading: 1,
            prev: 0,
        };
        let b = Hypothesis {
            neg_score: 0.0,
            reading: 0,
            prev: 0,
        };
        let c = Hypothesis {
            neg_score: 0.0,
            reading: 0,
            prev: 1,
        };
        let mut v = vec![c, b, a];
        v.sort_by(Hypothesis::rank);
        assert_eq!(v, [a, b, c]);
    }

    #[test]
    fn passes_through_blanks() {
        assert_eq!(select(RULES, ""), "");
        assert_eq!(select(RULES, "just text\n"), "just text\n");
        assert_eq!(select(RULES, "[<b>] ^a/b$ x"), "[<b>] ^a/b$ x");
    }

    #[test]
    fn picks_the_weighted_reading() {
        assert_eq!(select(RULES, "^f/f$ ^x/g/f$\n"), "^f/f$ ^x/f$\n");
    }

    #[test]
    fn ties_keep_the_first_reading() {
        assert_eq!(select(RULES, "^y/y$ ^x/g/f$"), "^y/y$ ^x/g$");
    }

    #[test]
    fn without_lookahead() {
        let rules = "L 1\nR 0\nP N1 f\nW 0:N1 -1:N1 5\n";
        assert_eq!(select(rules, "^f/f$ ^x/g/f$ ^z/z$"), "^f/f$ ^x/f$ ^z/z$");
    }

    #[test]
    fn lookbehind_follows_the_branch() {
        // The second unit prefers whatever the first unit chose; the first
        // unit prefers "f" on its own.
        let rules = "\
L 1
R 1
P F tl/f
P G tl/g
W 0:F 1
W -1:F 0:F 3
W -1:G 0:G 3
";
        let out = select(rules, "^a/g/f$ ^b/g/f$ ^c/c$");
        assert_eq!(out, "^a/f$ ^b/f$ ^c/c$");
    }

    #[test]
    fn null_separates_segments() {
        let fs = FeatureSet::read(RULES.as_bytes()).unwrap();
        let mut selector = Selector::from_feature_set(fs).with_null_flush(true);
        let mut out = Vec::new();
        selector
            .process("^f/f$ ^x/g/f$\0^a/b/c$\0".as_bytes(), &mut out)
            .unwrap();
        assert_eq!(out, b"^f/f$ ^x/f$\0^a/b$\0");
    }

    #[test]
    fn lookbehind_spans_null_separator() {
        // The blank unit closing a segment takes one lookbehind slot, so the
        // last real unit of the previous segment sits at -2.
        let rules = "L 2\nR 1\nP N1 f\nW 0:N1 -2:N1 5\n";
        assert_eq!(select(rules, "^x/g/f$\0"), "^x/g$\0");

        let fs = FeatureSet::read(rules.as_bytes()).unwrap();
        let mut selector = Selector::from_feature_set(fs).with_null_flush(true);
        let mut out = Vec::new();
        selector
            .process("^f/f$\0^x/g/f$\0".as_bytes(), &mut out)
            .unwrap();
        assert_eq!(out, b"^f/f$\0^x/f$\0");
        assert_eq!(selector.committed_score(), 5.0);
        assert_eq!(selector.cur_word, 0);
        assert_eq!(selector.prev.len(), 2);
        assert_eq!(selector.prev[0].source().map(|r| r.form()), Some("x"));
        assert!(selector.prev[1].is_eof());
    }

    #[test]
    fn committed_score_accumulates() {
        let fs = FeatureSet::read(RULES.as_bytes()).unwrap();
        let mut selector = Selector::from_feature_set(fs);
        let mut out = Vec::new();
        selector
            .process("^f/f$ ^x/g/f$ ^f/f$ ^q/f/g$".as_bytes(), &mut out)
            .unwrap();
        // 5 + 5 for the first run through the third unit, 5 for the last unit.
        assert_eq!(selector.committed_score(), 15.0);
        assert_eq!(out, b"^f/f$ ^x/f$ ^f/f$ ^q/f$");
    }
}
