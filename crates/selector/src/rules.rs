// Line grammar of the text rule file.
//
// Each line starts with a one-letter command; the rest of the line is split
// on whitespace, where a backslash keeps the next character (whitespace
// included) inside the current token:
//
//   B <beam>                      beam width, 0 = unbounded
//   L <n> / R <n>                 lookbehind / lookahead
//   P <name> <pattern>...         patterns for feature <name>
//   W <pos:name> [<pos:name>] <w> unary or pairwise weight
//
// Other lines (blank, comments, `V` vectors from the embedding tool) are
// ignored. Parsing here is context-free; name and range checks happen in
// the feature store, which knows the declared features and window.

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a rule line was skipped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleLineError {
    #[error("`{command}` expects {expected} arguments, found {found}")]
    Arity {
        command: char,
        expected: &'static str,
        found: usize,
    },
    #[error("invalid count {0:?}")]
    BadCount(String),
    #[error("invalid weight {0:?}")]
    BadWeight(String),
    #[error("invalid feature location {0:?}")]
    BadLocation(String),
    #[error("unknown feature {0:?}")]
    UnknownFeature(String),
    #[error("position {pos} outside the window -{lookbehind}..={lookahead}")]
    PositionOutOfRange {
        pos: i32,
        lookbehind: usize,
        lookahead: usize,
    },
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// A feature location as written: relative position and feature name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocToken<'a> {
    pub pos: i32,
    pub name: &'a str,
}

/// One parsed rule line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command<'a> {
    Beam(usize),
    Lookbehind(usize),
    Lookahead(usize),
    Pattern {
        name: &'a str,
        patterns: Vec<&'a str>,
    },
    Weight {
        first: LocToken<'a>,
        second: Option<LocToken<'a>>,
        weight: f64,
    },
}

/// Parse one line. `Ok(None)` means the line carries no command.
pub fn parse_line(line: &str) -> Result<Option<Command<'_>>, RuleLineError> {
    let line = line.trim_start();
    let mut chars = line.chars();
    let Some(command) = chars.next() else {
        return Ok(None);
    };
    let tokens = tokenize(chars.as_str());
    match command {
        'B' | 'L' | 'R' => {
            let [token] = tokens[..] else {
                return Err(RuleLineError::Arity {
                    command,
                    expected: "1",
                    found: tokens.len(),
                });
            };
            let n = parse_count(token)?;
            Ok(Some(match command {
                'B' => Command::Beam(n),
                'L' => Command::Lookbehind(n),
                _ => Command::Lookahead(n),
            }))
        }
        'P' => match tokens.split_first() {
            Some((&name, patterns)) => Ok(Some(Command::Pattern {
                name,
                patterns: patterns.to_vec(),
            })),
            None => Err(RuleLineError::Arity {
                command,
                expected: "at least 1",
                found: 0,
            }),
        },
        'W' => {
            let (first, second, weight) = match tokens[..] {
                [a, w] => (parse_loc(a)?, None, w),
                [a, b, w] => (parse_loc(a)?, Some(parse_loc(b)?), w),
                _ => {
                    return Err(RuleLineError::Arity {
                        command,
                        expected: "2 or 3",
                        found: tokens.len(),
                    });
                }
            };
            let weight = weight
                .parse::<f64>()
                .map_err(|_| RuleLineError::BadWeight(weight.to_string()))?;
            Ok(Some(Command::Weight {
                first,
                second,
                weight,
            }))
        }
        _ => Ok(None),
    }
}

/// Split on whitespace, keeping `\x` pairs (backslash included) inside tokens.
pub fn tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = None;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
            start.get_or_insert(i);
        } else if c.is_whitespace() {
            if let Some(s) = start.take() {
                tokens.push(&text[s..i]);
            }
        } else {
            start.get_or_insert(i);
        }
    }
    if let Some(s) = start {
        tokens.push(&text[s..]);
    }
    tokens
}

fn parse_count(token: &str) -> Result<usize, RuleLineError> {
    token
        .parse::<usize>()
        .map_err(|_| RuleLineError::BadCount(token.to_string()))
}

/// `pos:name`, where pos is an optionally negative decimal and name is non-empty.
fn parse_loc(token: &str) -> Result<LocToken<'_>, RuleLineError> {
    let bad = || RuleLineError::BadLocation(token.to_string());
    let (pos, name) = token.split_once(':').ok_or_else(bad)?;
    let digits = pos.strip_prefix('-').unwrap_or(pos);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) || name.is_empty() {
        return Err(bad());
    }
    let pos = pos.parse::<i32>().map_err(|_| bad())?;
    Ok(LocToken { pos, name })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_keeps_escapes() {
        assert_eq!(tokenize("  a  b\tc "), ["a", "b", "c"]);
        assert_eq!(tokenize("a\\ b c"), ["a\\ b", "c"]);
        assert_eq!(tokenize("\\\\x"), ["\\\\x"]);
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn settings() {
        assert_eq!(parse_line("B 4"), Ok(Some(Command::Beam(4))));
        assert_eq!(parse_line("  L 2"), Ok(Some(Command::Lookbehind(2))));
        assert_eq!(parse_line("R 0"), Ok(Some(Command::Lookahead(0))));
        assert!(matches!(
            parse_line("B -1"),
            Err(RuleLineError::BadCount(_))
        ));
        assert!(matches!(
            parse_line("L 1 2"),
            Err(RuleLineError::Arity { found: 2, .. })
        ));
    }

    #[test]
    fn patterns() {
        assert_eq!(
            parse_line("P N1 f sl/x<*> tl/\\ y"),
            Ok(Some(Command::Pattern {
                name: "N1",
                patterns: vec!["f", "sl/x<*>", "tl/\\ y"],
            }))
        );
        assert_eq!(
            parse_line("P lonely"),
            Ok(Some(Command::Pattern {
                name: "lonely",
                patterns: vec![],
            }))
        );
        assert!(parse_line("P").is_err());
    }

    #[test]
    fn weights() {
        assert_eq!(
            parse_line("W 0:N1 -1:N1 5"),
            Ok(Some(Command::Weight {
                first: LocToken { pos: 0, name: "N1" },
                second: Some(LocToken {
                    pos: -1,
                    name: "N1"
                }),
                weight: 5.0,
            }))
        );
        assert_eq!(
            parse_line("W 1:a:b -0.25"),
            Ok(Some(Command::Weight {
                first: LocToken { pos: 1, name: "a:b" },
                second: None,
                weight: -0.25,
            }))
        );
        assert!(matches!(
            parse_line("W +1:x 2"),
            Err(RuleLineError::BadLocation(_))
        ));
        assert!(matches!(
            parse_line("W 1: 2"),
            Err(RuleLineError::BadLocation(_))
        ));
        assert!(matches!(
            parse_line("W 1:x abc"),
            Err(RuleLineError::BadWeight(_))
        ));
        assert!(parse_line("W 1:x").is_err());
    }

    #[test]
    fn ignored_lines() {
        assert_eq!(parse_line(""), Ok(None));
        assert_eq!(parse_line("# comment"), Ok(None));
        assert_eq!(parse_line("V F1 0.1 0.2"), Ok(None));
    }
}
