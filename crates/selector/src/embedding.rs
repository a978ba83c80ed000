// Skip-gram embedding pretraining over source surface forms.
//
// Every unit with a source reading contributes its surface form as one
// vocabulary key; line breaks in the blank start a new sentence. Keys seen
// fewer than `min_count` times are folded into UNK (id 0). Training is the
// usual skip-gram with negative sampling: for each word, every distinct key
// in the surrounding window is a positive example and `negative_samples`
// keys drawn from a unigram^0.75 table are negatives.
//
// The output is a rule-file fragment: one `P F<i> <form>` line per key,
// so the learned keys can be used as features, followed by its vector on a
// `V` line, which the rule reader ignores.

use std::io::{self, BufRead, Write};

use hashbrown::HashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use selector_core::lu::NoTags;
use selector_core::stream::NULL_FLUSH;
use selector_core::{CharReader, LexicalUnit, StreamError};
use tracing::{debug, info, warn};

const SIGMOID_TABLE_SIZE: usize = 1000;
const MAX_EXP: f64 = 6.0;

/// Id of the catch-all key for rare forms.
pub const UNK: usize = 0;

/// Hyperparameters of the embedding trainer.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingConfig {
    /// Context words on each side.
    pub window: usize,
    /// Keys seen fewer times than this become UNK.
    pub min_count: u64,
    pub learning_rate: f64,
    pub dimension: usize,
    pub negative_samples: usize,
    pub iterations: usize,
    pub unigram_table_size: usize,
    pub seed: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            window: 5,
            min_count: 5,
            learning_rate: 0.005,
            dimension: 100,
            negative_samples: 5,
            iterations: 5,
            unigram_table_size: 1_000_000,
            seed: 1,
        }
    }
}

/// Vocabulary, corpus and layers of one embedding run.
pub struct EmbeddingTrainer {
    config: EmbeddingConfig,
    counts: Vec<u64>,
    forms: Vec<String>,
    ids: HashMap<String, usize>,
    sentences: Vec<Vec<usize>>,
    unigram: Vec<usize>,
    sigmoid: Vec<f64>,
    /// Input vectors, `dimension` per key. These are the embeddings written out.
    hidden: Vec<f64>,
    /// Output (context) vectors, `dimension` per key.
    output: Vec<f64>,
    rng: StdRng,
}

impl EmbeddingTrainer {
    pub fn new(config: EmbeddingConfig) -> Self {
        let sigmoid = (0..SIGMOID_TABLE_SIZE)
            .map(|i| {
                let e = ((i as f64 / SIGMOID_TABLE_SIZE as f64 * 2.0 - 1.0) * MAX_EXP).exp();
                e / (e + 1.0)
            })
            .collect();
        let rng = StdRng::seed_from_u64(config.seed);
        let mut trainer = Self {
            config,
            counts: Vec::new(),
            forms: Vec::new(),
            ids: HashMap::new(),
            sentences: Vec::new(),
            unigram: Vec::new(),
            sigmoid,
            hidden: Vec::new(),
            output: Vec::new(),
            rng,
        };
        trainer.reset_corpus();
        trainer
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    /// Number of keys, UNK included.
    pub fn vocab_size(&self) -> usize {
        self.counts.len()
    }

    pub fn count(&self, id: usize) -> u64 {
        self.counts.get(id).copied().unwrap_or(0)
    }

    /// Surface form of a key; UNK is the empty string.
    pub fn form(&self, id: usize) -> Option<&str> {
        self.forms.get(id).map(String::as_str)
    }

    pub fn id(&self, form: &str) -> Option<usize> {
        self.ids.get(form).copied()
    }

    /// Corpus as key ids, one vector per sentence.
    pub fn sentences(&self) -> &[Vec<usize>] {
        &self.sentences
    }

    /// Trained vector of a key; empty before [`train`](Self::train).
    pub fn vector(&self, id: usize) -> &[f64] {
        let dim = self.config.dimension;
        self.hidden.get(id * dim..(id + 1) * dim).unwrap_or(&[])
    }

    fn reset_corpus(&mut self) {
        self.counts = vec![0];
        self.forms = vec![String::new()];
        self.ids.clear();
        self.ids.insert(String::new(), UNK);
        self.sentences = vec![Vec::new()];
    }

    fn intern(&mut self, form: &str) -> usize {
        if let Some(&id) = self.ids.get(form) {
            return id;
        }
        let id = self.counts.len();
        self.counts.push(0);
        self.forms.push(form.to_string());
        self.ids.insert(form.to_string(), id);
        id
    }

    /// Read the whole corpus, replacing any previous one, then trim the
    /// vocabulary and build the negative-sampling table.
    pub fn read_corpus<R: BufRead>(&mut self, input: R) -> Result<(), StreamError> {
        self.reset_corpus();
        let mut input = CharReader::new(input);
        let mut units = 0usize;
        loop {
            let lu = LexicalUnit::read(&mut input, &NoTags)?;
            let Some(source) = lu.source() else {
                if input.peek()? == Some(NULL_FLUSH) {
                    input.next_char()?;
                    continue;
                }
                break;
            };
            if lu.newlines() > 0 && self.sentences.last().is_some_and(|s| !s.is_empty()) {
                self.sentences.push(Vec::new());
            }
            let id = self.intern(source.form());
            self.counts[id] += 1;
            if let Some(sentence) = self.sentences.last_mut() {
                sentence.push(id);
            }
            units += 1;
        }
        self.trim_vocab();
        self.build_unigram_table();
        info!(
            units,
            sentences = self.sentences.len(),
            vocab = self.counts.len(),
            "read embedding corpus"
        );
        if self.counts.len() <= 1 {
            warn!("every key is below min_count; only UNK will be trained");
        }
        Ok(())
    }

    /// Renumber keys by descending count (first seen wins ties), folding
    /// rare keys into UNK.
    fn trim_vocab(&mut self) {
        let mut order: Vec<usize> = (1..self.counts.len()).collect();
        order.sort_by(|&a, &b| self.counts[b].cmp(&self.counts[a]).then(a.cmp(&b)));

        let mut remap = vec![UNK; self.counts.len()];
        let mut counts = vec![self.counts[UNK]];
        let mut forms = vec![String::new()];
        let mut ids = HashMap::new();
        ids.insert(String::new(), UNK);
        for old in order {
            let count = self.counts[old];
            if count < self.config.min_count {
                counts[UNK] += count;
                continue;
            }
            let new = counts.len();
            remap[old] = new;
            counts.push(count);
            let form = std::mem::take(&mut self.forms[old]);
            ids.insert(form.clone(), new);
            forms.push(form);
        }

        for id in self.sentences.iter_mut().flatten() {
            *id = remap[*id];
        }
        self.counts = counts;
        self.forms = forms;
        self.ids = ids;
    }

    /// Fill the sampling table in proportion to count^0.75. UNK is never
    /// sampled.
    fn build_unigram_table(&mut self) {
        self.unigram.clear();
        if self.counts.len() <= 1 {
            return;
        }
        let power = |count: u64| (count as f64).powf(0.75);
        let total: f64 = self.counts[1..].iter().map(|&c| power(c)).sum();
        let size = self.config.unigram_table_size;
        self.unigram.reserve(size);

        let mut id = 1;
        let mut cumulative = power(self.counts[id]) / total;
        for i in 0..size {
            self.unigram.push(id);
            if (i + 1) as f64 / size as f64 > cumulative && id + 1 < self.counts.len() {
                id += 1;
                cumulative += power(self.counts[id]) / total;
            }
        }
    }

    fn sigmoid(&self, x: f64) -> f64 {
        if x >= MAX_EXP {
            1.0
        } else if x <= -MAX_EXP {
            0.0
        } else {
            let idx = ((x + MAX_EXP) * (SIGMOID_TABLE_SIZE as f64 / MAX_EXP / 2.0)) as usize;
            self.sigmoid[idx.min(SIGMOID_TABLE_SIZE - 1)]
        }
    }

    /// Initialise the layers and run every iteration over the corpus.
    pub fn train(&mut self) {
        let dim = self.config.dimension;
        let len = self.counts.len() * dim;
        let rng = &mut self.rng;
        self.hidden = (0..len)
            .map(|_| (rng.random::<f64>() - 0.5) / dim as f64)
            .collect();
        self.output = vec![0.0; len];

        let mut errors = vec![0.0; dim];
        for iteration in 0..self.config.iterations {
            for sent in 0..self.sentences.len() {
                for word in 0..self.sentences[sent].len() {
                    self.train_word(sent, word, &mut errors);
                }
            }
            debug!(iteration = iteration + 1, "embedding iteration done");
        }
    }

    fn train_word(&mut self, sent: usize, word: usize, errors: &mut [f64]) {
        let sentence = &self.sentences[sent];
        let input = sentence[word];
        let start = word.saturating_sub(self.config.window);
        let end = (word + self.config.window + 1).min(sentence.len());
        let mut context: Vec<usize> = (start..end)
            .filter(|&i| i != word)
            .map(|i| sentence[i])
            .collect();
        context.sort_unstable();
        context.dedup();

        errors.fill(0.0);
        for &ctx in &context {
            self.train_pair(input, ctx, 1.0, errors);
            if self.unigram.is_empty() {
                continue;
            }
            for _ in 0..self.config.negative_samples {
                let neg = self.unigram[self.rng.random_range(0..self.unigram.len())];
                if context.binary_search(&neg).is_ok() {
                    continue;
                }
                self.train_pair(input, neg, 0.0, errors);
            }
        }

        let dim = self.config.dimension;
        for (h, e) in self.hidden[input * dim..(input + 1) * dim]
            .iter_mut()
            .zip(errors.iter())
        {
            *h += e;
        }
    }

    /// One logistic step of `input` against `output` with target `label`.
    /// The output vector moves now; the input's change is accumulated in
    /// `errors` and applied once per word.
    fn train_pair(&mut self, input: usize, output: usize, label: f64, errors: &mut [f64]) {
        let dim = self.config.dimension;
        let in_span = input * dim..(input + 1) * dim;
        let out_span = output * dim..(output + 1) * dim;
        let dot: f64 = self.hidden[in_span.clone()]
            .iter()
            .zip(&self.output[out_span.clone()])
            .map(|(h, o)| h * o)
            .sum();
        let g = (label - self.sigmoid(dot)) * self.config.learning_rate;

        let hidden = &self.hidden[in_span];
        for ((e, o), h) in errors
            .iter_mut()
            .zip(&mut self.output[out_span])
            .zip(hidden)
        {
            *e += g * *o;
            *o += g * h;
        }
    }

    /// Write the `P`/`V` rule-file fragment.
    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (id, form) in self.forms.iter().enumerate() {
            if id == UNK {
                out.write_all(b"V UNK")?;
            } else {
                writeln!(out, "P F{id} {}", pattern_text(form))?;
                write!(out, "V F{id}")?;
            }
            for v in self.vector(id) {
                write!(out, " {v:.6}")?;
            }
            writeln!(out)?;
        }
        out.flush()
    }
}

/// A surface form as a literal pattern: bare `*` and whitespace get a
/// backslash, existing escapes are kept.
fn pattern_text(form: &str) -> String {
    let mut text = String::with_capacity(form.len());
    let mut chars = form.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            text.push(c);
            if let Some(escaped) = chars.next() {
                text.push(escaped);
            }
            continue;
        }
        if c == '*' || c.is_whitespace() {
            text.push('\\');
        }
        text.push(c);
    }
    text
}
