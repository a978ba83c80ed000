// Symbol alphabet: interning of characters, tags and automaton-internal symbols.
//
// The first four ids are reserved and identical in every alphabet:
//   0  <ANY_CHAR>   wildcard arc matching any plain character
//   1  <ANY_TAG>    wildcard arc matching any tag
//   2  <side:sl>    entry arc for source-side readings
//   3  <side:tl>    entry arc for target-side readings
// Everything after that is interned in order of first use.

use std::io::{Read, Write};

use hashbrown::HashMap;
use selector_core::TagLookup;

use crate::FstError;
use crate::compression::{read_len, read_str, read_u8, write_len, write_str};

/// Symbol index within an [`Alphabet`].
pub type SymbolId = u32;

pub const ANY_CHAR: SymbolId = 0;
pub const ANY_TAG: SymbolId = 1;
pub const SIDE_SL: SymbolId = 2;
pub const SIDE_TL: SymbolId = 3;

const RESERVED: [&str; 4] = ["<ANY_CHAR>", "<ANY_TAG>", "<side:sl>", "<side:tl>"];

/// What a symbol stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Wildcards, side markers and rule markers: never produced by input.
    Special,
    /// A single plain character.
    Char,
    /// A bracketed tag, brackets included.
    Tag,
}

impl SymbolKind {
    fn to_byte(self) -> u8 {
        match self {
            SymbolKind::Special => 0,
            SymbolKind::Char => 1,
            SymbolKind::Tag => 2,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(SymbolKind::Special),
            1 => Some(SymbolKind::Char),
            2 => Some(SymbolKind::Tag),
            _ => None,
        }
    }
}

/// Interned alphabet shared by the pattern compiler and the stream reader.
///
/// Characters, tags and special symbols live in separate namespaces: a
/// reading containing the literal tag `<side:sl>` does not collide with the
/// reserved side marker of the same spelling.
#[derive(Debug, Clone)]
pub struct Alphabet {
    symbol_strings: Vec<String>,
    kinds: Vec<SymbolKind>,
    char_to_symbol: HashMap<char, SymbolId>,
    tag_to_symbol: HashMap<String, SymbolId>,
    special_to_symbol: HashMap<String, SymbolId>,
}

impl Default for Alphabet {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Alphabet {
    fn eq(&self, other: &Self) -> bool {
        self.symbol_strings == other.symbol_strings && self.kinds == other.kinds
    }
}

impl Alphabet {
    /// Create an alphabet containing only the reserved symbols.
    pub fn new() -> Self {
        let mut alphabet = Self {
            symbol_strings: Vec::new(),
            kinds: Vec::new(),
            char_to_symbol: HashMap::new(),
            tag_to_symbol: HashMap::new(),
            special_to_symbol: HashMap::new(),
        };
        for name in RESERVED {
            alphabet.push(name.to_string(), SymbolKind::Special);
        }
        alphabet
    }

    pub fn intern_char(&mut self, c: char) -> SymbolId {
        if let Some(&id) = self.char_to_symbol.get(&c) {
            return id;
        }
        self.push(c.to_string(), SymbolKind::Char)
    }

    pub fn intern_tag(&mut self, tag: &str) -> SymbolId {
        if let Some(&id) = self.tag_to_symbol.get(tag) {
            return id;
        }
        self.push(tag.to_string(), SymbolKind::Tag)
    }

    /// Intern an automaton-internal symbol such as a rule marker.
    pub fn intern_special(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.special_to_symbol.get(name) {
            return id;
        }
        self.push(name.to_string(), SymbolKind::Special)
    }

    pub fn char_symbol(&self, c: char) -> Option<SymbolId> {
        self.char_to_symbol.get(&c).copied()
    }

    pub fn special_symbol(&self, name: &str) -> Option<SymbolId> {
        self.special_to_symbol.get(name).copied()
    }

    pub fn kind(&self, id: SymbolId) -> Option<SymbolKind> {
        self.kinds.get(id as usize).copied()
    }

    pub fn symbol_string(&self, id: SymbolId) -> Option<&str> {
        self.symbol_strings.get(id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.symbol_strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbol_strings.is_empty()
    }

    /// Serialize as: symbol count, then (kind byte, length-prefixed string) per symbol.
    pub fn write<W: Write>(&self, out: &mut W) -> Result<(), FstError> {
        write_len(out, self.symbol_strings.len())?;
        for (s, kind) in self.symbol_strings.iter().zip(&self.kinds) {
            out.write_all(&[kind.to_byte()])?;
            write_str(out, s)?;
        }
        Ok(())
    }

    pub fn read<R: Read>(input: &mut R) -> Result<Self, FstError> {
        let count = read_len(input)?;
        if count < RESERVED.len() {
            return Err(FstError::InvalidSymbolTable(format!(
                "{count} symbols, at least {} reserved symbols required",
                RESERVED.len()
            )));
        }
        let mut alphabet = Self {
            symbol_strings: Vec::with_capacity(count),
            kinds: Vec::with_capacity(count),
            char_to_symbol: HashMap::new(),
            tag_to_symbol: HashMap::new(),
            special_to_symbol: HashMap::new(),
        };
        for i in 0..count {
            let kind_byte = read_u8(input)?;
            let kind = SymbolKind::from_byte(kind_byte).ok_or_else(|| {
                FstError::InvalidSymbolTable(format!("unknown kind {kind_byte} for symbol {i}"))
            })?;
            let s = read_str(input)?;
            if let Some(&expected) = RESERVED.get(i) {
                if s != expected || kind != SymbolKind::Special {
                    return Err(FstError::InvalidSymbolTable(format!(
                        "symbol {i} must be the reserved {expected}, found {s:?}"
                    )));
                }
            }
            if kind == SymbolKind::Char && s.chars().count() != 1 {
                return Err(FstError::InvalidSymbolTable(format!(
                    "character symbol {i} is {s:?}"
                )));
            }
            alphabet.push(s, kind);
        }
        Ok(alphabet)
    }

    fn push(&mut self, s: String, kind: SymbolKind) -> SymbolId {
        let id = self.symbol_strings.len() as SymbolId;
        match kind {
            SymbolKind::Char => {
                if let Some(c) = s.chars().next() {
                    self.char_to_symbol.insert(c, id);
                }
            }
            SymbolKind::Tag => {
                self.tag_to_symbol.insert(s.clone(), id);
            }
            SymbolKind::Special => {
                if id as usize >= RESERVED.len() {
                    self.special_to_symbol.insert(s.clone(), id);
                }
            }
        }
        self.symbol_strings.push(s);
        self.kinds.push(kind);
        id
    }
}

impl TagLookup for Alphabet {
    fn tag_symbol(&self, tag: &str) -> Option<u32> {
        self.tag_to_symbol.get(tag).copied()
    }
}
