// Feature pattern compiler and matcher.
//
// Every pattern becomes its own chain of states hanging off the initial
// state: a side arc (source, target, or both), one arc per literal symbol,
// wildcard self-loops, and finally a marker arc `<RULE_NUMBER:id>` into a
// final state. After minimization the marker arcs are turned into
// annotations: a state with a marker arc into a final state is where that
// feature's pattern has been fully consumed. Those states become the only
// finals and each one remembers which features it signals.

use std::io::{Read, Write};

use hashbrown::HashMap;
use selector_core::{FeatureId, Reading, Symbol};
use selector_fst::StateId;
use selector_fst::automaton::Automaton;
use selector_fst::builder::TransducerBuilder;
use selector_fst::compression::{read_len, read_varint, write_len, write_varint};
use selector_fst::format::{read_automaton, write_automaton};
use selector_fst::symbols::{ANY_CHAR, ANY_TAG, Alphabet, SIDE_SL, SIDE_TL, SymbolId};
use selector_fst::FstError;

/// Which reading of a unit a pattern applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Source,
    Target,
}

impl Side {
    fn symbol(self) -> SymbolId {
        match self {
            Side::Source => SIDE_SL,
            Side::Target => SIDE_TL,
        }
    }
}

/// One element of a parsed pattern body.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Atom {
    Char(char),
    Tag(String),
    /// `*`: zero or more plain characters
    AnyChars,
    /// `<*>`: zero or more tags
    AnyTags,
}

/// Split a pattern into its side restriction and body atoms.
fn parse_pattern(pattern: &str) -> (Option<Side>, Vec<Atom>) {
    let (side, body) = if let Some(rest) = pattern.strip_prefix("sl/") {
        (Some(Side::Source), rest)
    } else if let Some(rest) = pattern.strip_prefix("tl/") {
        (Some(Side::Target), rest)
    } else {
        (None, pattern)
    };

    let mut atoms = Vec::new();
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    atoms.push(Atom::Char(escaped));
                }
            }
            '*' => atoms.push(Atom::AnyChars),
            '<' => match body[i..].find('>') {
                Some(len) => {
                    let tag = &body[i..=i + len];
                    if tag == "<*>" {
                        atoms.push(Atom::AnyTags);
                    } else {
                        atoms.push(Atom::Tag(tag.to_string()));
                    }
                    // Skip the rest of the tag; '>' is one byte.
                    for _ in tag[1..].chars() {
                        chars.next();
                    }
                }
                None => atoms.push(Atom::Char('<')),
            },
            _ => atoms.push(Atom::Char(c)),
        }
    }
    (side, atoms)
}

fn rule_marker(feat: FeatureId) -> String {
    format!("<RULE_NUMBER:{feat}>")
}

/// Compiled feature patterns.
///
/// Matching a reading feeds the side symbol and then every symbol of the
/// reading; the features reported are those whose pattern accepts the whole
/// symbol sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatcher {
    alphabet: Alphabet,
    automaton: Automaton,
    /// (state, feature) pairs, sorted: a multimap from final state to features.
    feature_states: Vec<(StateId, FeatureId)>,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::compile(std::iter::empty::<(FeatureId, &str)>())
    }
}

impl PatternMatcher {
    /// Build the matcher for a list of (feature id, pattern) pairs.
    ///
    /// A feature may appear with several patterns; it fires if any of them matches.
    pub fn compile<'a>(patterns: impl IntoIterator<Item = (FeatureId, &'a str)>) -> Self {
        let mut alphabet = Alphabet::new();
        let mut builder = TransducerBuilder::new();
        let mut markers: HashMap<SymbolId, FeatureId> = HashMap::new();

        for (feat, pattern) in patterns {
            let marker = alphabet.intern_special(&rule_marker(feat));
            markers.insert(marker, feat);

            let (side, atoms) = parse_pattern(pattern);
            let mut state = match side {
                Some(side) => builder.add_arc(TransducerBuilder::INITIAL, side.symbol()),
                None => {
                    let s = builder.add_arc(TransducerBuilder::INITIAL, SIDE_SL);
                    builder.link(TransducerBuilder::INITIAL, s, SIDE_TL);
                    s
                }
            };
            for atom in atoms {
                match atom {
                    Atom::AnyChars => builder.link(state, state, ANY_CHAR),
                    Atom::AnyTags => builder.link(state, state, ANY_TAG),
                    Atom::Char(c) => state = builder.add_arc(state, alphabet.intern_char(c)),
                    Atom::Tag(tag) => state = builder.add_arc(state, alphabet.intern_tag(&tag)),
                }
            }
            let end = builder.add_arc(state, marker);
            builder.set_final(end);
        }

        let minimal = builder.minimize();
        let mut feature_states = Vec::new();
        for state in 0..minimal.state_count() as StateId {
            for arc in minimal.transitions(state) {
                if let Some(&feat) = markers.get(&arc.symbol) {
                    if minimal.is_final(arc.target) {
                        feature_states.push((state, feat));
                    }
                }
            }
        }
        feature_states.sort_unstable();
        feature_states.dedup();
        let automaton = minimal.with_finals(feature_states.iter().map(|&(s, _)| s));

        Self {
            alphabet,
            automaton,
            feature_states,
        }
    }

    /// The alphabet readings must be parsed against.
    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn automaton(&self) -> &Automaton {
        &self.automaton
    }

    /// Features whose pattern matches the reading on the given side, ascending.
    pub fn features(&self, reading: &Reading, side: Side) -> Vec<FeatureId> {
        let mut state = self.automaton.start();
        state.step(side.symbol());
        for symbol in reading.symbols() {
            if state.is_dead() {
                return Vec::new();
            }
            match *symbol {
                Symbol::Char(c) => state.step_either(self.alphabet.char_symbol(c), ANY_CHAR),
                Symbol::Tag(id) => state.step_either(id, ANY_TAG),
            }
        }

        let mut feats = Vec::new();
        for s in state.finals() {
            let start = self.feature_states.partition_point(|&(fs, _)| fs < s);
            feats.extend(
                self.feature_states[start..]
                    .iter()
                    .take_while(|&&(fs, _)| fs == s)
                    .map(|&(_, feat)| feat),
            );
        }
        feats.sort_unstable();
        feats.dedup();
        feats
    }

    /// Add every matching feature to the reading.
    pub fn annotate(&self, reading: &mut Reading, side: Side) {
        for feat in self.features(reading, side) {
            reading.add_feature(feat);
        }
    }

    /// Serialize as: alphabet, automaton blob, feature-state count, (state, feature) pairs.
    pub fn write<W: Write>(&self, out: &mut W) -> Result<(), FstError> {
        self.alphabet.write(out)?;
        write_automaton(out, &self.automaton)?;
        write_len(out, self.feature_states.len())?;
        for &(state, feat) in &self.feature_states {
            write_varint(out, u64::from(state))?;
            write_varint(out, feat)?;
        }
        Ok(())
    }

    pub fn read<R: Read>(input: &mut R) -> Result<Self, FstError> {
        let alphabet = Alphabet::read(input)?;
        let automaton = read_automaton(input)?;
        let count = read_len(input)?;
        let mut feature_states = Vec::new();
        for _ in 0..count {
            let state = read_varint(input)?;
            if state >= automaton.state_count() as u64 {
                return Err(FstError::InvalidState {
                    state,
                    count: automaton.state_count(),
                });
            }
            let feat = read_varint(input)?;
            feature_states.push((state as StateId, feat));
        }
        feature_states.sort_unstable();
        feature_states.dedup();
        let automaton = automaton.with_finals(feature_states.iter().map(|&(s, _)| s));
        Ok(Self {
            alphabet,
            automaton,
            feature_states,
        })
    }
}
