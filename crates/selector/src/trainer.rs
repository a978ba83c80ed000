// Averaged-perceptron training of pairwise weights.
//
// The corpus is a pair of parallel streams: "raw" with the ambiguous units
// and "gold" with the one correct target per unit. Each ambiguous unit is
// one training instance. The context is built from the gold choices to the
// left and source readings to the right, stopping at sentence boundaries.
//
// Only pairs that already have a stored weight take part in scoring, so
// training adjusts the pairs declared in the seed weights file and never
// invents new ones.
//
// Averaging is lazy: `totals[p]` accumulates weight * instances elapsed,
// and is brought up to date only when `p` changes and once at the end of
// the iteration.

use std::io::{self, BufRead, Write};

use hashbrown::HashMap;
use selector_core::{CharReader, FeatPair, FeatPairSet, FeatSet, LexicalUnit, StreamError};
use tracing::{debug, info, warn};

use crate::feature_set::FeatureSet;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// What is wrong with a raw/gold unit pair.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorpusProblem {
    #[error("gold corpus ends before raw corpus")]
    GoldEndsEarly,
    #[error("raw corpus ends before gold corpus")]
    RawEndsEarly,
    #[error("raw and gold corpora have line breaks in different places")]
    LineBreakMismatch,
    #[error("raw unit has no target readings")]
    NoTargets,
    #[error("gold unit must have exactly 1 target reading, found {0}")]
    GoldReadingCount(usize),
    #[error("gold target {0:?} is not among the raw targets")]
    GoldNotInRaw(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    /// `unit` is 1-based within the sentence.
    #[error("line {line}, unit {unit}: {problem}")]
    Corpus {
        line: usize,
        unit: usize,
        problem: CorpusProblem,
    },
    #[error(transparent)]
    Stream(#[from] StreamError),
}

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainerOptions {
    /// Passes over the corpus.
    pub iterations: usize,
}

impl Default for TrainerOptions {
    fn default() -> Self {
        Self { iterations: 5 }
    }
}

/// Counts from the last iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainingSummary {
    pub iterations: usize,
    /// Ambiguous units seen per iteration.
    pub instances: usize,
    /// Instances whose highest-scoring reading was not the gold one.
    pub mistakes: usize,
}

// ---------------------------------------------------------------------------
// Trainer
// ---------------------------------------------------------------------------

pub struct SelectorTrainer {
    fs: FeatureSet,
    options: TrainerOptions,
    /// Sentences of (raw unit, gold target index).
    examples: Vec<Vec<(LexicalUnit, usize)>>,
    totals: HashMap<FeatPair, f64>,
    last_update: HashMap<FeatPair, usize>,
    cur_inst: usize,
}

impl SelectorTrainer {
    /// Start from the seed weights in `fs`.
    pub fn new(fs: FeatureSet, options: TrainerOptions) -> Self {
        Self {
            fs,
            options,
            examples: Vec::new(),
            totals: HashMap::new(),
            last_update: HashMap::new(),
            cur_inst: 0,
        }
    }

    pub fn feature_set(&self) -> &FeatureSet {
        &self.fs
    }

    pub fn into_feature_set(self) -> FeatureSet {
        self.fs
    }

    /// Write the current weights as a rule file.
    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.fs.write(out)
    }

    /// Load the corpus and run the configured number of iterations.
    pub fn train<R: BufRead, G: BufRead>(
        &mut self,
        raw: R,
        gold: G,
    ) -> Result<TrainingSummary, TrainError> {
        self.load_corpus(raw, gold)?;
        let mut summary = TrainingSummary::default();
        for iteration in 1..=self.options.iterations {
            let (instances, mistakes) = self.run_iteration();
            if instances == 0 {
                warn!(iteration, "no ambiguous units in the corpus");
            }
            info!(iteration, instances, mistakes, "training iteration");
            summary = TrainingSummary {
                iterations: iteration,
                instances,
                mistakes,
            };
        }
        Ok(summary)
    }

    /// Pair raw and gold units, grouping them into sentences at line breaks.
    pub fn load_corpus<R: BufRead, G: BufRead>(
        &mut self,
        raw: R,
        gold: G,
    ) -> Result<(), TrainError> {
        let mut raw = CharReader::new(raw);
        let mut gold = CharReader::new(gold);
        self.examples = vec![Vec::new()];
        let mut line = 1;

        loop {
            let raw_lu = self.fs.read_lu(&mut raw)?;
            let gold_lu = self.fs.read_lu(&mut gold)?;
            if raw_lu.is_eof() {
                if !gold_lu.is_eof() {
                    return Err(self.corpus_error(line, CorpusProblem::RawEndsEarly));
                }
                break;
            }
            if gold_lu.is_eof() {
                return Err(self.corpus_error(line, CorpusProblem::GoldEndsEarly));
            }
            let newlines = raw_lu.newlines();
            if newlines != gold_lu.newlines() {
                return Err(self.corpus_error(line, CorpusProblem::LineBreakMismatch));
            }
            if newlines > 0 {
                line += newlines;
                self.examples.push(Vec::new());
            }
            if raw_lu.targets().is_empty() {
                return Err(self.corpus_error(line, CorpusProblem::NoTargets));
            }
            if !raw_lu.ambiguous() {
                self.push_example(raw_lu, 0);
                continue;
            }
            let [gold_reading] = gold_lu.targets() else {
                let found = gold_lu.targets().len();
                return Err(self.corpus_error(line, CorpusProblem::GoldReadingCount(found)));
            };
            let Some(idx) = raw_lu
                .targets()
                .iter()
                .position(|t| t.form() == gold_reading.form())
            else {
                let form = gold_reading.form().to_string();
                return Err(self.corpus_error(line, CorpusProblem::GoldNotInRaw(form)));
            };
            self.push_example(raw_lu, idx);
        }

        debug!(
            sentences = self.examples.len(),
            units = self.examples.iter().map(Vec::len).sum::<usize>(),
            "loaded training corpus"
        );
        Ok(())
    }

    fn corpus_error(&self, line: usize, problem: CorpusProblem) -> TrainError {
        TrainError::Corpus {
            line,
            unit: self.examples.last().map_or(0, Vec::len) + 1,
            problem,
        }
    }

    fn push_example(&mut self, lu: LexicalUnit, gold: usize) {
        if let Some(sentence) = self.examples.last_mut() {
            sentence.push((lu, gold));
        }
    }

    /// One pass over the corpus. Returns (instances, mistakes).
    fn run_iteration(&mut self) -> (usize, usize) {
        self.cur_inst = 0;
        self.totals = self.fs.all_weights().collect();
        self.last_update = self.totals.keys().map(|&p| (p, 0)).collect();

        let mut mistakes = 0;
        for s in 0..self.examples.len() {
            for w in 0..self.examples[s].len() {
                if !self.examples[s][w].0.ambiguous() {
                    continue;
                }
                self.cur_inst += 1;
                if let Some(updates) = self.run_instance(s, w) {
                    mistakes += 1;
                    for (pair, delta) in updates {
                        self.update_weight(pair, delta);
                    }
                }
            }
        }

        if self.cur_inst > 0 {
            let n = self.cur_inst;
            for (&pair, &total) in &self.totals {
                let last = self.last_update.get(&pair).copied().unwrap_or(0);
                if last > 0 {
                    let current = self.fs.weight(pair);
                    let averaged = (total + current * (n - last) as f64) / n as f64;
                    self.fs.set_weight(pair, averaged);
                }
            }
        }
        (self.cur_inst, mistakes)
    }

    /// Score every target of one instance. On a wrong prediction, return the
    /// updates: +1 for pairs only the gold reading has, -1 for pairs only
    /// the predicted reading has.
    fn run_instance(&self, sentence: usize, word: usize) -> Option<Vec<(FeatPair, f64)>> {
        let sent = &self.examples[sentence];
        let (lu, gold) = &sent[word];

        let mut context = FeatSet::new();
        for i in 1..=self.fs.lookbehind().min(word) {
            let (left, chosen) = &sent[word - i];
            let pos = -(i as i32);
            if let Some(source) = left.source() {
                source.collect_features(pos, &mut context);
            }
            if let Some(target) = left.target_or_sole(*chosen) {
                target.collect_features(pos, &mut context);
            }
        }
        if let Some(source) = lu.source() {
            source.collect_features(0, &mut context);
        }
        for i in 1..=self.fs.lookahead() {
            let Some((right, _)) = sent.get(word + i) else {
                break;
            };
            if let Some(source) = right.source() {
                source.collect_features(i as i32, &mut context);
            }
        }

        let mut scores = Vec::with_capacity(lu.targets().len());
        let mut pairs = Vec::with_capacity(lu.targets().len());
        for target in lu.targets() {
            let mut feats = context.clone();
            target.collect_features(0, &mut feats);
            let mut used = FeatPairSet::new();
            scores.push(self.fs.get_weight_with_pairs(&feats, &mut used));
            pairs.push(used);
        }
        let mut best = 0;
        for (i, &score) in scores.iter().enumerate().skip(1) {
            if score > scores[best] {
                best = i;
            }
        }
        if best == *gold {
            return None;
        }

        let good = &pairs[*gold];
        let bad = &pairs[best];
        Some(
            good.difference(bad)
                .map(|&p| (p, 1.0))
                .chain(bad.difference(good).map(|&p| (p, -1.0)))
                .collect(),
        )
    }

    fn update_weight(&mut self, pair: FeatPair, delta: f64) {
        let old = self.fs.weight(pair);
        self.fs.set_weight(pair, old + delta);
        let last = self.last_update.get(&pair).copied().unwrap_or(0);
        *self.totals.entry(pair).or_insert(0.0) += old * (self.cur_inst - last) as f64;
        self.last_update.insert(pair, self.cur_inst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selector_core::FeatLoc;

    const RULES: &str = "\
L 1
R 1
P A tl/a
P B tl/b
P X sl/x
W 0:X 0:A 0
W 0:X 0:B 0
";

    fn trainer() -> SelectorTrainer {
        let fs = FeatureSet::read(RULES.as_bytes()).unwrap();
        SelectorTrainer::new(fs, TrainerOptions::default())
    }

    fn pair(t: &SelectorTrainer, a: &str, b: &str) -> FeatPair {
        let fs = t.feature_set();
        FeatPair::new(
            FeatLoc::new(0, fs.feature_id(a).unwrap()),
            FeatLoc::new(0, fs.feature_id(b).unwrap()),
        )
    }

    fn load_err(raw: &str, gold: &str) -> (usize, usize, CorpusProblem) {
        match trainer().load_corpus(raw.as_bytes(), gold.as_bytes()) {
            Err(TrainError::Corpus {
                line,
                unit,
                problem,
            }) => (line, unit, problem),
            other => panic!("expected a corpus error, got {other:?}"),
        }
    }

    #[test]
    fn loads_sentences() {
        let mut t = trainer();
        t.load_corpus(
            "^x/b/a$ ^y/y$\n^x/a/b$\n".as_bytes(),
            "^x/a$ ^y/y$\n^x/a$\n".as_bytes(),
        )
        .unwrap();
        assert_eq!(t.examples.len(), 2);
        assert_eq!(t.examples[0].len(), 2);
        assert_eq!(t.examples[0][0].1, 1);
        assert_eq!(t.examples[0][1].1, 0);
        assert_eq!(t.examples[1][0].1, 0);
    }

    #[test]
    fn corpus_errors() {
        assert_eq!(
            load_err("^x/a/b$", ""),
            (1, 1, CorpusProblem::GoldEndsEarly)
        );
        assert_eq!(
            load_err("^x/a/b$", "^x/a$ ^y/y$"),
            (1, 2, CorpusProblem::RawEndsEarly)
        );
        assert_eq!(
            load_err("^y/y$\n^x/a/b$", "^y/y$ ^x/a$"),
            (1, 2, CorpusProblem::LineBreakMismatch)
        );
        assert_eq!(
            load_err("^y/y$\n\n^x$", "^y/y$\n\n^x/x$"),
            (3, 1, CorpusProblem::NoTargets)
        );
        assert_eq!(
            load_err("^x/a/b$", "^x/a/b$"),
            (1, 1, CorpusProblem::GoldReadingCount(2))
        );
        assert_eq!(
            load_err("^y/y$ ^x/a/b$", "^y/y$ ^x/c$"),
            (1, 2, CorpusProblem::GoldNotInRaw("c".to_string()))
        );
    }

    #[test]
    fn unambiguous_units_need_no_gold_match() {
        let mut t = trainer();
        t.load_corpus("^y/y$".as_bytes(), "^y/z/w$".as_bytes())
            .unwrap();
        assert_eq!(t.examples[0][0].1, 0);
    }

    #[test]
    fn mistake_moves_weights_toward_gold() {
        let mut t = trainer();
        let summary = t
            .train(
                "^x/b/a$\n^x/b/a$\n".as_bytes(),
                "^x/a$\n^x/a$\n".as_bytes(),
            )
            .unwrap();
        assert_eq!(summary.iterations, 5);
        assert_eq!(summary.instances, 2);
        assert_eq!(summary.mistakes, 0);
        // First iteration: wrong at instance 1, right at instance 2, so the
        // averaged weights are half a step.
        assert_eq!(t.feature_set().weight(pair(&t, "X", "A")), 0.5);
        assert_eq!(t.feature_set().weight(pair(&t, "X", "B")), -0.5);
    }

    #[test]
    fn pairs_outside_the_table_are_not_learned() {
        let mut t = trainer();
        let summary = t
            .train("^q/b/a$\n".as_bytes(), "^q/a$\n".as_bytes())
            .unwrap();
        assert_eq!(summary.mistakes, 1);
        assert_eq!(t.feature_set().weight_count(), 2);
        assert_eq!(t.feature_set().weight(pair(&t, "X", "A")), 0.0);
    }

    #[test]
    fn neighbours_stay_within_the_sentence() {
        let rules = "L 1\nR 1\nP X sl/x\nP Y tl/y\nP Z sl/z\nW -1:X 0:Y 0\nW 0:Y 1:Z 0\n";
        let fs = FeatureSet::read(rules.as_bytes()).unwrap();
        let mut t = SelectorTrainer::new(fs, TrainerOptions { iterations: 1 });
        t.load_corpus(
            "^x/x$ ^w/n/y$ ^z/z$ ^x/x$\n^w/n/y$ ^q/q$\n".as_bytes(),
            "^x/x$ ^w/y$ ^z/z$ ^x/x$\n^w/y$ ^q/q$\n".as_bytes(),
        )
        .unwrap();
        let id = |name: &str| t.feature_set().feature_id(name).unwrap();
        let behind = FeatPair::new(FeatLoc::new(-1, id("X")), FeatLoc::new(0, id("Y")));
        let ahead = FeatPair::new(FeatLoc::new(0, id("Y")), FeatLoc::new(1, id("Z")));

        // "n" wins the tie; both neighbour pairs belong to the gold "y".
        let mut updates = t.run_instance(0, 1).unwrap();
        updates.sort_by_key(|&(p, _)| p);
        assert_eq!(updates, [(behind, 1.0), (ahead, 1.0)]);

        // Sentence start: the trailing "x" of the previous line is not at -1.
        assert_eq!(t.run_instance(1, 0), Some(Vec::new()));
        t.fs.set_weight(behind, 1.0);
        assert_eq!(t.run_instance(0, 1), None);
        assert_eq!(t.run_instance(1, 0), Some(Vec::new()));

        t.fs.set_weight(behind, 0.0);
        assert_eq!(t.run_iteration(), (2, 2));
        assert_eq!(t.feature_set().weight(behind), 0.5);
        assert_eq!(t.feature_set().weight(ahead), 0.5);
    }

    #[test]
    fn write_emits_rule_file() {
        let t = trainer();
        let mut out = Vec::new();
        t.write(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("B 0\nL 1\nR 1\n"));
        assert!(text.contains("W 0:A 0:X 0\n"));
    }
}
