// Readings and lexical units of the tagged text stream.
//
// A unit looks like `^source/target1/target2$`, preceded by free "blank"
// text. Each reading is kept twice: as the surface form exactly as it was
// read (so it can be written back byte for byte) and as a sequence of
// symbols for the pattern matcher.

use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};

use crate::StreamError;
use crate::feature::{FeatLoc, FeatSet, FeatureId};
use crate::stream::{CharReader, ESCAPE, NULL_FLUSH, READING_SEPARATOR, UNIT_CLOSE, UNIT_OPEN};

/// One atom of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// A plain (possibly escaped) character.
    Char(char),
    /// A bracketed tag, resolved against the matcher's alphabet.
    /// `None` means the tag is not in the alphabet: it can only match `<*>`.
    Tag(Option<u32>),
}

/// Resolves tag strings (including the angle brackets) to alphabet ids.
///
/// Implemented by the automaton alphabet; lookups never intern new tags,
/// so reading the stream cannot grow the compiled matcher.
pub trait TagLookup {
    fn tag_symbol(&self, tag: &str) -> Option<u32>;
}

/// Lookup that knows no tags. Useful when only surface forms matter.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTags;

impl TagLookup for NoTags {
    fn tag_symbol(&self, _tag: &str) -> Option<u32> {
        None
    }
}

/// One candidate analysis of a token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reading {
    form: String,
    symbols: Vec<Symbol>,
    feats: BTreeSet<FeatureId>,
}

impl Reading {
    /// Read a reading up to (not including) the next `/`, `$` or NUL.
    pub fn read<R: BufRead>(
        input: &mut CharReader<R>,
        tags: &impl TagLookup,
    ) -> Result<Self, StreamError> {
        let mut reading = Reading::default();
        while let Some(c) = input.peek()? {
            if c == NULL_FLUSH || c == READING_SEPARATOR || c == UNIT_CLOSE {
                break;
            }
            input.next_char()?;
            match c {
                ESCAPE => {
                    reading.form.push(c);
                    if let Some(escaped) = input.next_char()? {
                        reading.form.push(escaped);
                        reading.symbols.push(Symbol::Char(escaped));
                    }
                }
                '<' => {
                    let tag = input.read_tag()?;
                    reading.symbols.push(Symbol::Tag(tags.tag_symbol(&tag)));
                    reading.form.push_str(&tag);
                }
                _ => {
                    reading.form.push(c);
                    reading.symbols.push(Symbol::Char(c));
                }
            }
        }
        Ok(reading)
    }

    /// Parse a reading from a string (everything after a stop character is ignored).
    pub fn parse(text: &str, tags: &impl TagLookup) -> Result<Self, StreamError> {
        Self::read(&mut CharReader::new(text.as_bytes()), tags)
    }

    /// Surface form, escapes and tags included, exactly as read.
    pub fn form(&self) -> &str {
        &self.form
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Feature ids discovered for this reading, in ascending order.
    pub fn features(&self) -> &BTreeSet<FeatureId> {
        &self.feats
    }

    pub fn add_feature(&mut self, feat: FeatureId) {
        self.feats.insert(feat);
    }

    /// Insert every feature of this reading into `out`, located at `pos`.
    pub fn collect_features(&self, pos: i32, out: &mut FeatSet) {
        out.extend(self.feats.iter().map(|&feat| FeatLoc::new(pos, feat)));
    }

    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(self.form.as_bytes())
    }
}

/// One stream position: blank, optional source reading, target readings.
///
/// A unit without a source reading marks the end of the stream (or of a
/// null-flush segment) and only carries the trailing blank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LexicalUnit {
    blank: String,
    source: Option<Reading>,
    targets: Vec<Reading>,
}

impl LexicalUnit {
    pub fn read<R: BufRead>(
        input: &mut CharReader<R>,
        tags: &impl TagLookup,
    ) -> Result<Self, StreamError> {
        let blank = input.read_blank()?;
        let mut unit = LexicalUnit {
            blank,
            source: None,
            targets: Vec::new(),
        };
        if input.peek()? != Some(UNIT_OPEN) {
            return Ok(unit);
        }
        input.next_char()?;
        unit.source = Some(Reading::read(input, tags)?);
        while input.peek()? == Some(READING_SEPARATOR) {
            input.next_char()?;
            unit.targets.push(Reading::read(input, tags)?);
        }
        if input.peek()? == Some(UNIT_CLOSE) {
            input.next_char()?;
        }
        Ok(unit)
    }

    /// Write the unit back, choosing the target at `selected`.
    ///
    /// With `selected_first`, the remaining targets follow the chosen one in
    /// their original order. Without `with_surface`, the source reading and
    /// its separator are omitted. An out-of-range `selected` writes no target.
    pub fn write<W: Write>(
        &self,
        out: &mut W,
        selected: usize,
        selected_first: bool,
        with_surface: bool,
    ) -> io::Result<()> {
        out.write_all(self.blank.as_bytes())?;
        let Some(source) = &self.source else {
            return Ok(());
        };
        write!(out, "{UNIT_OPEN}")?;
        if with_surface {
            source.write(out)?;
        }
        if let Some(target) = self.targets.get(selected) {
            if with_surface {
                write!(out, "{READING_SEPARATOR}")?;
            }
            target.write(out)?;
        }
        if selected_first {
            for (i, target) in self.targets.iter().enumerate() {
                if i == selected {
                    continue;
                }
                write!(out, "{READING_SEPARATOR}")?;
                target.write(out)?;
            }
        }
        write!(out, "{UNIT_CLOSE}")
    }

    /// More than one target reading.
    pub fn ambiguous(&self) -> bool {
        self.targets.len() > 1
    }

    /// No source reading: this unit terminates the stream or segment.
    pub fn is_eof(&self) -> bool {
        self.source.is_none()
    }

    pub fn blank(&self) -> &str {
        &self.blank
    }

    /// Number of line breaks in the preceding blank.
    pub fn newlines(&self) -> usize {
        self.blank.matches('\n').count()
    }

    pub fn source(&self) -> Option<&Reading> {
        self.source.as_ref()
    }

    pub fn source_mut(&mut self) -> Option<&mut Reading> {
        self.source.as_mut()
    }

    pub fn targets(&self) -> &[Reading] {
        &self.targets
    }

    pub fn targets_mut(&mut self) -> &mut [Reading] {
        &mut self.targets
    }

    /// The target at `idx`, or the only target when `idx` is out of range.
    ///
    /// Units trimmed by [`keep_only`](Self::keep_only) have a single target
    /// regardless of which index was selected, so any index reaches it.
    pub fn target_or_sole(&self, idx: usize) -> Option<&Reading> {
        match self.targets.get(idx) {
            Some(r) => Some(r),
            None if self.targets.len() == 1 => self.targets.first(),
            None => None,
        }
    }

    /// Drop every target except the one at `idx`.
    ///
    /// An out-of-range index drops them all.
    pub fn keep_only(&mut self, idx: usize) {
        if idx < self.targets.len() {
            let kept = self.targets.swap_remove(idx);
            self.targets.clear();
            self.targets.push(kept);
        } else {
            self.targets.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tags;

    impl TagLookup for Tags {
        fn tag_symbol(&self, tag: &str) -> Option<u32> {
            match tag {
                "<n>" => Some(10),
                "<v>" => Some(11),
                _ => None,
            }
        }
    }

    fn read_all(text: &str) -> Vec<LexicalUnit> {
        let mut input = CharReader::new(text.as_bytes());
        let mut units = Vec::new();
        loop {
            let lu = LexicalUnit::read(&mut input, &Tags).unwrap();
            let eof = lu.is_eof();
            units.push(lu);
            if eof {
                break;
            }
        }
        units
    }

    fn written(lu: &LexicalUnit, selected: usize, selected_first: bool, surf: bool) -> String {
        let mut out = Vec::new();
        lu.write(&mut out, selected, selected_first, surf).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn parse_reading_symbols() {
        let r = Reading::parse(r"a\/<n><pl>", &Tags).unwrap();
        assert_eq!(r.form(), r"a\/<n><pl>");
        assert_eq!(
            r.symbols(),
            &[
                Symbol::Char('a'),
                Symbol::Char('/'),
                Symbol::Tag(Some(10)),
                Symbol::Tag(None)
            ]
        );
    }

    #[test]
    fn parse_units_and_blanks() {
        let units = read_all("[x] ^cat/cat<n>/cat<v>$ ^dog/dog<n>$\n");
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].blank(), "[x] ");
        assert_eq!(units[0].source().unwrap().form(), "cat");
        assert_eq!(units[0].targets().len(), 2);
        assert!(units[0].ambiguous());
        assert!(!units[1].ambiguous());
        assert!(units[2].is_eof());
        assert_eq!(units[2].blank(), "\n");
        assert_eq!(units[2].newlines(), 1);
    }

    #[test]
    fn unit_without_targets() {
        let units = read_all("^word$");
        assert_eq!(units[0].targets().len(), 0);
        assert!(!units[0].ambiguous());
        assert!(!units[0].is_eof());
        assert_eq!(written(&units[0], 0, false, true), "^word$");
    }

    #[test]
    fn write_selected_reading() {
        let units = read_all(" ^cat/cat<n>/cat<v>/kat<n>$");
        let lu = &units[0];
        assert_eq!(written(lu, 1, false, true), " ^cat/cat<v>$");
        assert_eq!(written(lu, 1, true, true), " ^cat/cat<v>/cat<n>/kat<n>$");
        assert_eq!(written(lu, 2, false, false), " ^kat<n>$");
    }

    #[test]
    fn write_eof_unit_is_blank_only() {
        let units = read_all(" tail\n");
        assert_eq!(written(&units[0], 0, false, true), " tail\n");
    }

    #[test]
    fn keep_only_trims_targets() {
        let mut lu = read_all("^a/a<n>/a<v>/a<adj>$").remove(0);
        lu.keep_only(2);
        assert_eq!(lu.targets().len(), 1);
        assert_eq!(lu.targets()[0].form(), "a<adj>");
        assert_eq!(lu.target_or_sole(7).unwrap().form(), "a<adj>");
        lu.keep_only(3);
        assert!(lu.targets().is_empty());
        assert!(lu.target_or_sole(0).is_none());
    }

    #[test]
    fn reading_stops_at_null() {
        let mut input = CharReader::new("^a/b\0rest".as_bytes());
        let lu = LexicalUnit::read(&mut input, &Tags).unwrap();
        assert_eq!(lu.targets()[0].form(), "b");
        assert_eq!(input.peek().unwrap(), Some('\0'));
    }

    #[test]
    fn collect_features_at_position() {
        let mut r = Reading::default();
        r.add_feature(0);
        r.add_feature(4);
        let mut set = FeatSet::new();
        r.collect_features(-1, &mut set);
        assert!(set.contains(&FeatLoc::new(-1, 0)));
        assert!(set.contains(&FeatLoc::new(-1, 4)));
        assert_eq!(set.len(), 2);
    }
}
