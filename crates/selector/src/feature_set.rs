// Feature store: window settings, named feature patterns, pairwise weights.
//
// Text form (read/write) is the human-authored rule file described in
// `rules`. Binary form (compile/load):
//
//   "APSL"                         magic
//   u64 LE                         feature flags; unknown bits are fatal
//   varint beam, lookbehind, lookahead
//   pattern matcher                alphabet, automaton, feature states
//   varint first-loc count
//     per first loc:  varint pos+lookbehind, varint feature, varint count
//       per second:   varint pos+lookbehind, varint feature, weight (f64 codec)
//
// The binary form carries feature ids only; names and pattern sources stay
// in the text form.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Read, Write};
use std::ops::Bound;

use byteorder::{LE, ReadBytesExt, WriteBytesExt};
use hashbrown::HashMap;
use selector_core::{
    CharReader, FeatLoc, FeatPair, FeatPairSet, FeatSet, FeatureId, LexicalUnit, StreamError,
    UNIVERSAL_FEATURE,
};
use selector_fst::compression::{read_f64, read_len, read_varint, write_f64, write_len, write_varint};
use tracing::debug;

use crate::pattern::{PatternMatcher, Side};
use crate::rules::{self, Command, LocToken, RuleLineError};
use crate::{HEADER_MAGIC, KNOWN_FEATURES, SelectorError};

/// Everything a selector or trainer needs to turn units into scored features.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    beam_size: usize,
    lookbehind: usize,
    lookahead: usize,
    /// Indexed by feature id. Entry 0 is the universal feature, named "".
    feature_names: Vec<String>,
    feature_ids: HashMap<String, FeatureId>,
    /// Pattern sources, indexed by feature id.
    patterns: Vec<Vec<String>>,
    /// first loc -> second loc -> weight, with first <= second.
    weights: BTreeMap<FeatLoc, BTreeMap<FeatLoc, f64>>,
    matcher: PatternMatcher,
}

impl Default for FeatureSet {
    fn default() -> Self {
        let mut feature_ids = HashMap::new();
        feature_ids.insert(String::new(), UNIVERSAL_FEATURE);
        Self {
            beam_size: 0,
            lookbehind: 0,
            lookahead: 0,
            feature_names: vec![String::new()],
            feature_ids,
            patterns: vec![Vec::new()],
            weights: BTreeMap::new(),
            matcher: PatternMatcher::default(),
        }
    }
}

impl FeatureSet {
    // ---- text form ----

    /// Parse a rule file. Malformed lines are skipped.
    pub fn read<R: BufRead>(input: R) -> Result<Self, SelectorError> {
        let mut fs = Self::default();
        for (idx, line) in input.lines().enumerate() {
            let line = line?;
            let applied = rules::parse_line(&line).and_then(|cmd| match cmd {
                Some(cmd) => fs.apply(cmd),
                None => Ok(()),
            });
            if let Err(err) = applied {
                debug!(line = idx + 1, error = %err, "skipping rule line");
            }
        }
        fs.rebuild_matcher();
        debug!(
            features = fs.feature_names.len() - 1,
            weights = fs.weight_count(),
            beam = fs.beam_size,
            lookbehind = fs.lookbehind,
            lookahead = fs.lookahead,
            "read rule file"
        );
        Ok(fs)
    }

    fn apply(&mut self, cmd: Command<'_>) -> Result<(), RuleLineError> {
        match cmd {
            Command::Beam(n) => set_once(&mut self.beam_size, n),
            Command::Lookbehind(n) => set_once(&mut self.lookbehind, n),
            Command::Lookahead(n) => set_once(&mut self.lookahead, n),
            Command::Pattern { name, patterns } => {
                let id = self.intern_feature(name);
                self.patterns[id as usize].extend(patterns.into_iter().map(str::to_string));
            }
            Command::Weight {
                first,
                second,
                weight,
            } => {
                let a = self.resolve(first)?;
                let pair = match second {
                    Some(b) => FeatPair::new(a, self.resolve(b)?),
                    None => FeatPair::unary(a),
                };
                self.weights
                    .entry(pair.first())
                    .or_default()
                    .entry(pair.second())
                    .or_insert(weight);
            }
        }
        Ok(())
    }

    fn intern_feature(&mut self, name: &str) -> FeatureId {
        if let Some(&id) = self.feature_ids.get(name) {
            return id;
        }
        let id = self.feature_names.len() as FeatureId;
        self.feature_names.push(name.to_string());
        self.feature_ids.insert(name.to_string(), id);
        self.patterns.push(Vec::new());
        id
    }

    fn resolve(&self, loc: LocToken<'_>) -> Result<FeatLoc, RuleLineError> {
        let in_window = if loc.pos < 0 {
            loc.pos.unsigned_abs() as usize <= self.lookbehind
        } else {
            loc.pos as usize <= self.lookahead
        };
        if !in_window {
            return Err(RuleLineError::PositionOutOfRange {
                pos: loc.pos,
                lookbehind: self.lookbehind,
                lookahead: self.lookahead,
            });
        }
        let feat = self
            .feature_id(loc.name)
            .filter(|&id| id != UNIVERSAL_FEATURE)
            .ok_or_else(|| RuleLineError::UnknownFeature(loc.name.to_string()))?;
        Ok(FeatLoc::new(loc.pos, feat))
    }

    fn rebuild_matcher(&mut self) {
        let patterns = self
            .patterns
            .iter()
            .enumerate()
            .flat_map(|(id, pats)| pats.iter().map(move |p| (id as FeatureId, p.as_str())));
        self.matcher = PatternMatcher::compile(patterns);
    }

    /// Write the rule file: settings, patterns, then weights.
    ///
    /// Pairs with the universal feature at position 0 are written as unary
    /// weights. Features without a known name (after [`load`](Self::load))
    /// are written by id.
    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "B {}", self.beam_size)?;
        writeln!(out, "L {}", self.lookbehind)?;
        writeln!(out, "R {}", self.lookahead)?;
        for (id, pats) in self.patterns.iter().enumerate().skip(1) {
            for p in pats {
                writeln!(out, "P {} {}", self.feature_names[id], p)?;
            }
        }
        for (pair, weight) in self.all_weights() {
            match pair.unary_loc() {
                Some(loc) => writeln!(out, "W {} {}", self.loc_text(loc), weight)?,
                None => writeln!(
                    out,
                    "W {} {} {}",
                    self.loc_text(pair.first()),
                    self.loc_text(pair.second()),
                    weight
                )?,
            }
        }
        Ok(())
    }

    fn loc_text(&self, loc: FeatLoc) -> String {
        match self.feature_name(loc.feat) {
            Some(name) if !name.is_empty() => format!("{}:{}", loc.pos, name),
            _ => loc.to_string(),
        }
    }

    // ---- binary form ----

    pub fn compile<W: Write>(&self, out: &mut W) -> Result<(), SelectorError> {
        out.write_all(&HEADER_MAGIC)?;
        out.write_u64::<LE>(KNOWN_FEATURES)?;
        write_len(out, self.beam_size)?;
        write_len(out, self.lookbehind)?;
        write_len(out, self.lookahead)?;
        self.matcher.write(out)?;

        write_len(out, self.weights.len())?;
        for (first, row) in &self.weights {
            write_varint(out, self.stored_pos(first.pos)?)?;
            write_varint(out, first.feat)?;
            write_len(out, row.len())?;
            for (second, &weight) in row {
                write_varint(out, self.stored_pos(second.pos)?)?;
                write_varint(out, second.feat)?;
                write_f64(out, weight)?;
            }
        }
        Ok(())
    }

    pub fn load<R: Read>(input: &mut R) -> Result<Self, SelectorError> {
        let mut magic = [0u8; 4];
        match input.read_exact(&mut magic) {
            Ok(()) if magic == HEADER_MAGIC => {}
            Ok(()) => return Err(SelectorError::MissingHeader),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(SelectorError::MissingHeader);
            }
            Err(e) => return Err(e.into()),
        }
        let flags = input.read_u64::<LE>()?;
        if flags & !KNOWN_FEATURES != 0 {
            return Err(SelectorError::UnsupportedFeatures { flags });
        }

        let mut fs = Self {
            beam_size: read_len(input)?,
            lookbehind: read_len(input)?,
            lookahead: read_len(input)?,
            matcher: PatternMatcher::read(input)?,
            ..Self::default()
        };

        let firsts = read_len(input)?;
        for _ in 0..firsts {
            let first = FeatLoc::new(fs.decode_pos(read_varint(input)?)?, read_varint(input)?);
            let mut row = BTreeMap::new();
            for _ in 0..read_len(input)? {
                let second = FeatLoc::new(fs.decode_pos(read_varint(input)?)?, read_varint(input)?);
                row.insert(second, read_f64(input)?);
            }
            fs.weights.insert(first, row);
        }
        debug!(
            weights = fs.weight_count(),
            beam = fs.beam_size,
            lookbehind = fs.lookbehind,
            lookahead = fs.lookahead,
            "loaded compiled weights"
        );
        Ok(fs)
    }

    fn stored_pos(&self, pos: i32) -> Result<u64, SelectorError> {
        u64::try_from(i64::from(pos) + self.lookbehind as i64).map_err(|_| {
            SelectorError::PositionOutOfWindow {
                pos: i64::from(pos),
                lookbehind: self.lookbehind,
                lookahead: self.lookahead,
            }
        })
    }

    fn decode_pos(&self, stored: u64) -> Result<i32, SelectorError> {
        let pos = i64::try_from(stored).unwrap_or(i64::MAX) - self.lookbehind as i64;
        i32::try_from(pos).map_err(|_| SelectorError::PositionOutOfWindow {
            pos,
            lookbehind: self.lookbehind,
            lookahead: self.lookahead,
        })
    }

    // ---- features and weights ----

    /// Read one unit and attach features: the universal feature plus pattern
    /// matches, source side for the source reading and target side for each
    /// target reading.
    pub fn read_lu<R: BufRead>(
        &self,
        input: &mut CharReader<R>,
    ) -> Result<LexicalUnit, StreamError> {
        let mut lu = LexicalUnit::read(input, self.matcher.alphabet())?;
        if let Some(source) = lu.source_mut() {
            source.add_feature(UNIVERSAL_FEATURE);
            self.matcher.annotate(source, Side::Source);
        }
        for target in lu.targets_mut() {
            target.add_feature(UNIVERSAL_FEATURE);
            self.matcher.annotate(target, Side::Target);
        }
        Ok(lu)
    }

    /// Sum of the stored weights of every pair drawn from `feats`.
    pub fn get_weight(&self, feats: &FeatSet) -> f64 {
        self.sum_pairs(feats, |_| {})
    }

    /// Like [`get_weight`](Self::get_weight), also collecting the pairs that
    /// have a stored weight.
    pub fn get_weight_with_pairs(&self, feats: &FeatSet, pairs: &mut FeatPairSet) -> f64 {
        self.sum_pairs(feats, |pair| {
            pairs.insert(pair);
        })
    }

    fn sum_pairs(&self, feats: &FeatSet, mut found: impl FnMut(FeatPair)) -> f64 {
        let mut total = 0.0;
        for first in feats {
            let Some(row) = self.weights.get(first) else {
                continue;
            };
            for second in feats.range((Bound::Excluded(*first), Bound::Unbounded)) {
                if let Some(&w) = row.get(second) {
                    total += w;
                    found(FeatPair::new(*first, *second));
                }
            }
        }
        total
    }

    /// Stored weight of one pair, 0 if absent.
    pub fn weight(&self, pair: FeatPair) -> f64 {
        self.weights
            .get(&pair.first())
            .and_then(|row| row.get(&pair.second()))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn set_weight(&mut self, pair: FeatPair, weight: f64) {
        self.weights
            .entry(pair.first())
            .or_default()
            .insert(pair.second(), weight);
    }

    /// Every stored (pair, weight), in pair order.
    pub fn all_weights(&self) -> impl Iterator<Item = (FeatPair, f64)> + '_ {
        self.weights.iter().flat_map(|(&first, row)| {
            row.iter()
                .map(move |(&second, &w)| (FeatPair::new(first, second), w))
        })
    }

    pub fn weight_count(&self) -> usize {
        self.weights.values().map(BTreeMap::len).sum()
    }

    // ---- accessors ----

    pub fn beam_size(&self) -> usize {
        self.beam_size
    }

    pub fn lookbehind(&self) -> usize {
        self.lookbehind
    }

    pub fn lookahead(&self) -> usize {
        self.lookahead
    }

    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }

    pub fn feature_name(&self, id: FeatureId) -> Option<&str> {
        self.feature_names.get(id as usize).map(String::as_str)
    }

    pub fn feature_id(&self, name: &str) -> Option<FeatureId> {
        self.feature_ids.get(name).copied()
    }
}

/// Settings keep their first non-zero value.
fn set_once(slot: &mut usize, value: usize) {
    if *slot == 0 {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selector_core::Reading;

    const RULES: &str = "\
B 3
L 1
R 1
P N1 f
P Adj tl/*<adj>
P N1 sl/g*
W 0:N1 -1:N1 5
W 1:Adj -2.5
W 0:Nope 1
W 5:N1 1
garbage line
W 0:N1 -1:N1 7
";

    fn rules() -> FeatureSet {
        FeatureSet::read(RULES.as_bytes()).unwrap()
    }

    fn loc(fs: &FeatureSet, pos: i32, name: &str) -> FeatLoc {
        FeatLoc::new(pos, fs.feature_id(name).unwrap())
    }

    #[test]
    fn read_settings_and_features() {
        let fs = rules();
        assert_eq!(fs.beam_size(), 3);
        assert_eq!(fs.lookbehind(), 1);
        assert_eq!(fs.lookahead(), 1);
        assert_eq!(fs.feature_id(""), Some(UNIVERSAL_FEATURE));
        assert_eq!(fs.feature_id("N1"), Some(1));
        assert_eq!(fs.feature_id("Adj"), Some(2));
        assert_eq!(fs.feature_name(2), Some("Adj"));
        assert_eq!(fs.feature_id("Nope"), None);
    }

    #[test]
    fn first_setting_wins() {
        let fs = FeatureSet::read("B 0\nB 2\nB 9\nL 1\nL 4\n".as_bytes()).unwrap();
        assert_eq!(fs.beam_size(), 2);
        assert_eq!(fs.lookbehind(), 1);
    }

    #[test]
    fn weights_skip_bad_lines_and_keep_first() {
        let fs = rules();
        assert_eq!(fs.weight_count(), 2);
        let pair = FeatPair::new(loc(&fs, -1, "N1"), loc(&fs, 0, "N1"));
        assert_eq!(fs.weight(pair), 5.0);
        assert_eq!(fs.weight(FeatPair::unary(loc(&fs, 1, "Adj"))), -2.5);
    }

    #[test]
    fn weight_keys_are_symmetric() {
        let mut fs = rules();
        let a = loc(&fs, -1, "Adj");
        let b = loc(&fs, 1, "N1");
        fs.set_weight(FeatPair::new(b, a), 1.5);
        assert_eq!(fs.weight(FeatPair::new(a, b)), 1.5);
        fs.set_weight(FeatPair::new(a, b), 2.0);
        assert_eq!(fs.weight(FeatPair::new(b, a)), 2.0);
        assert_eq!(fs.weight_count(), 3);
    }

    #[test]
    fn get_weight_sums_present_pairs() {
        let fs = rules();
        let n1 = fs.feature_id("N1").unwrap();
        let adj = fs.feature_id("Adj").unwrap();
        let feats: FeatSet = [
            FeatLoc::new(-1, n1),
            FeatLoc::UNIVERSAL,
            FeatLoc::new(0, n1),
            FeatLoc::new(1, adj),
        ]
        .into_iter()
        .collect();
        let mut pairs = FeatPairSet::new();
        let w = fs.get_weight_with_pairs(&feats, &mut pairs);
        assert_eq!(w, 2.5);
        assert_eq!(fs.get_weight(&feats), w);
        assert_eq!(pairs.len(), 2);

        let only_left: FeatSet = [FeatLoc::new(-1, n1)].into_iter().collect();
        assert_eq!(fs.get_weight(&only_left), 0.0);
    }

    #[test]
    fn read_lu_attaches_side_features() {
        let fs = rules();
        let mut input = CharReader::new("^gx/fox<n>/big<adj>$".as_bytes());
        let lu = fs.read_lu(&mut input).unwrap();
        let n1 = fs.feature_id("N1").unwrap();
        let adj = fs.feature_id("Adj").unwrap();
        let source = lu.source().unwrap();
        assert!(source.features().contains(&UNIVERSAL_FEATURE));
        assert!(source.features().contains(&n1));
        assert_eq!(lu.targets()[0].features().len(), 1);
        assert!(lu.targets()[1].features().contains(&adj));
        assert!(!lu.targets()[1].features().contains(&n1));
    }

    #[test]
    fn text_roundtrip() {
        let fs = rules();
        let mut out = Vec::new();
        fs.write(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("W -1:N1 0:N1 5\n"));
        assert!(text.contains("W 1:Adj -2.5\n"));
        let again = FeatureSet::read(text.as_bytes()).unwrap();
        assert_eq!(
            again.all_weights().collect::<Vec<_>>(),
            fs.all_weights().collect::<Vec<_>>()
        );
        assert_eq!(again.matcher(), fs.matcher());
    }

    #[test]
    fn binary_roundtrip() {
        let fs = rules();
        let mut buf = Vec::new();
        fs.compile(&mut buf).unwrap();
        assert_eq!(&buf[..4], b"APSL");
        let loaded = FeatureSet::load(&mut buf.as_slice()).unwrap();
        assert_eq!(loaded.beam_size(), 3);
        assert_eq!(loaded.lookbehind(), 1);
        assert_eq!(loaded.lookahead(), 1);
        assert_eq!(
            loaded.all_weights().collect::<Vec<_>>(),
            fs.all_weights().collect::<Vec<_>>()
        );
        let reading = Reading::parse("fox", fs.matcher().alphabet()).unwrap();
        assert_eq!(
            loaded.matcher().features(&reading, Side::Target),
            fs.matcher().features(&reading, Side::Target)
        );
    }

    #[test]
    fn load_rejects_bad_header() {
        assert!(matches!(
            FeatureSet::load(&mut "APS".as_bytes()),
            Err(SelectorError::MissingHeader)
        ));
        assert!(matches!(
            FeatureSet::load(&mut "XXXX\0\0\0\0\0\0\0\0".as_bytes()),
            Err(SelectorError::MissingHeader)
        ));
        let mut buf = Vec::new();
        rules().compile(&mut buf).unwrap();
        buf[4] = 1;
        assert!(matches!(
            FeatureSet::load(&mut buf.as_slice()),
            Err(SelectorError::UnsupportedFeatures { flags: 1 })
        ));
        buf[4] = 0;
        buf[11] = 0x80;
        assert!(matches!(
            FeatureSet::load(&mut buf.as_slice()),
            Err(SelectorError::UnsupportedFeatures { .. })
        ));
    }

    #[test]
    fn load_rejects_truncation() {
        let mut buf = Vec::new();
        rules().compile(&mut buf).unwrap();
        buf.truncate(buf.len() - 1);
        assert!(FeatureSet::load(&mut buf.as_slice()).is_err());
    }
}
