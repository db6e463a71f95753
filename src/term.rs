use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// An owned canonical term: the serialization syntax for derivations.
///
/// Printing is canonical (no whitespace, fixed escapes), so two equal terms
/// always print to identical bytes and the printed form is what gets hashed
/// and persisted.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Term {
    /// A quoted string literal.
    Atom(String),
    /// An ordered, bracketed sequence: `[t1,t2]`.
    List(Vec<Term>),
    /// A constructor application `Name(t1,t2)`; an empty name prints as a
    /// bare tuple `(t1,t2)`.
    App(String, Vec<Term>),
}

impl Term {
    pub fn atom<S: Into<String>>(s: S) -> Term {
        Term::Atom(s.into())
    }

    pub fn tuple(elems: Vec<Term>) -> Term {
        Term::App(String::new(), elems)
    }

    /// The canonical byte form of this term.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

fn write_atom(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for ch in s.chars() {
        match ch {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c => write!(f, "{}", c)?,
        }
    }
    f.write_str("\"")
}

fn write_seq(f: &mut fmt::Formatter<'_>, elems: &[Term]) -> fmt::Result {
    for (i, elem) in elems.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{}", elem)?;
    }
    Ok(())
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Atom(s) => write_atom(f, s),
            Term::List(elems) => {
                f.write_str("[")?;
                write_seq(f, elems)?;
                f.write_str("]")
            }
            Term::App(name, elems) => {
                f.write_str(name)?;
                f.write_str("(")?;
                write_seq(f, elems)?;
                f.write_str(")")
            }
        }
    }
}

/// Failure to read a byte sequence as a term, or to read a term as the
/// structure a decoder expects (wrong constructor, wrong arity, wrong
/// nesting).
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum MalformedTerm {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unexpected byte {1:?} at offset {0}")]
    UnexpectedByte(usize, char),
    #[error("invalid escape '\\{1}' at offset {0}")]
    InvalidEscape(usize, char),
    #[error("trailing input after term at offset {0}")]
    TrailingInput(usize),
    #[error("expected {expected}, found {found}")]
    Unexpected {
        expected: &'static str,
        found: &'static str,
    },
    #[error("unknown constructor '{0}'")]
    UnknownConstructor(String),
    #[error("expected {expected} fields, found {found}")]
    Arity { expected: usize, found: usize },
}

impl Term {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Term::Atom(_) => "an atom",
            Term::List(_) => "a list",
            Term::App(_, _) => "a tuple",
        }
    }

    pub(crate) fn as_atom(&self) -> Result<&str, MalformedTerm> {
        match self {
            Term::Atom(s) => Ok(s),
            other => Err(MalformedTerm::Unexpected {
                expected: "an atom",
                found: other.kind(),
            }),
        }
    }

    pub(crate) fn as_list(&self) -> Result<&[Term], MalformedTerm> {
        match self {
            Term::List(elems) => Ok(elems),
            other => Err(MalformedTerm::Unexpected {
                expected: "a list",
                found: other.kind(),
            }),
        }
    }

    pub(crate) fn as_tuple(&self, arity: usize) -> Result<&[Term], MalformedTerm> {
        match self {
            Term::App(name, elems) if name.is_empty() => {
                if elems.len() != arity {
                    return Err(MalformedTerm::Arity {
                        expected: arity,
                        found: elems.len(),
                    });
                }
                Ok(elems)
            }
            Term::App(name, _) => Err(MalformedTerm::UnknownConstructor(name.clone())),
            other => Err(MalformedTerm::Unexpected {
                expected: "a tuple",
                found: other.kind(),
            }),
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Result<char, MalformedTerm> {
        let ch = self.peek().ok_or(MalformedTerm::UnexpectedEof)?;
        self.pos += ch.len_utf8();
        Ok(ch)
    }

    fn expect(&mut self, expected: char) -> Result<(), MalformedTerm> {
        let at = self.pos;
        let ch = self.bump()?;
        if ch != expected {
            return Err(MalformedTerm::UnexpectedByte(at, ch));
        }
        Ok(())
    }

    fn atom(&mut self) -> Result<Term, MalformedTerm> {
        self.expect('"')?;
        let mut out = String::new();
        loop {
            let at = self.pos;
            match self.bump()? {
                '"' => return Ok(Term::Atom(out)),
                '\\' => match self.bump()? {
                    '"' => out.push('"'),
                    '\\' => out.push('\\'),
                    'n' => out.push('\n'),
                    'r' => out.push('\r'),
                    't' => out.push('\t'),
                    other => return Err(MalformedTerm::InvalidEscape(at, other)),
                },
                ch => out.push(ch),
            }
        }
    }

    fn seq(&mut self, close: char) -> Result<Vec<Term>, MalformedTerm> {
        let mut elems = Vec::new();
        if self.peek() == Some(close) {
            self.bump()?;
            return Ok(elems);
        }
        loop {
            elems.push(self.term()?);
            let at = self.pos;
            match self.bump()? {
                ',' => continue,
                ch if ch == close => return Ok(elems),
                ch => return Err(MalformedTerm::UnexpectedByte(at, ch)),
            }
        }
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_owned()
    }

    fn term(&mut self) -> Result<Term, MalformedTerm> {
        match self.peek().ok_or(MalformedTerm::UnexpectedEof)? {
            '"' => self.atom(),
            '[' => {
                self.bump()?;
                Ok(Term::List(self.seq(']')?))
            }
            '(' => {
                self.bump()?;
                Ok(Term::App(String::new(), self.seq(')')?))
            }
            ch if ch.is_ascii_alphabetic() || ch == '_' => {
                let name = self.ident();
                self.expect('(')?;
                Ok(Term::App(name, self.seq(')')?))
            }
            ch => Err(MalformedTerm::UnexpectedByte(self.pos, ch)),
        }
    }
}

impl FromStr for Term {
    type Err = MalformedTerm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser { input: s, pos: 0 };
        let term = parser.term()?;
        if parser.pos != s.len() {
            return Err(MalformedTerm::TrailingInput(parser.pos));
        }
        Ok(term)
    }
}

impl Term {
    /// Strict parse of canonical bytes. The input must be UTF-8 since atoms
    /// are strings.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Term, MalformedTerm> {
        let s = std::str::from_utf8(bytes).map_err(|e| {
            MalformedTerm::UnexpectedByte(e.valid_up_to(), char::REPLACEMENT_CHARACTER)
        })?;
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::atom(Term::atom("hello"), r#""hello""#)]
    #[case::empty_atom(Term::atom(""), r#""""#)]
    #[case::escapes(Term::atom("a\"b\\c\nd\re\tf"), r#""a\"b\\c\nd\re\tf""#)]
    #[case::empty_list(Term::List(vec![]), "[]")]
    #[case::list(Term::List(vec![Term::atom("a"), Term::atom("b")]), r#"["a","b"]"#)]
    #[case::tuple(Term::tuple(vec![Term::atom("x"), Term::List(vec![])]), r#"("x",[])"#)]
    #[case::app(
        Term::App("Derive".into(), vec![Term::List(vec![]), Term::atom("s")]),
        r#"Derive([],"s")"#
    )]
    fn print_parse(#[case] term: Term, #[case] printed: &str) {
        assert_eq!(term.to_string(), printed);
        assert_eq!(printed.parse::<Term>().unwrap(), term);
    }

    #[rstest]
    #[case::empty("", MalformedTerm::UnexpectedEof)]
    #[case::unclosed_atom("\"abc", MalformedTerm::UnexpectedEof)]
    #[case::unclosed_list("[\"a\"", MalformedTerm::UnexpectedEof)]
    #[case::bad_escape(r#""a\q""#, MalformedTerm::InvalidEscape(2, 'q'))]
    #[case::bad_start("|", MalformedTerm::UnexpectedByte(0, '|'))]
    #[case::bad_separator(r#"["a";"b"]"#, MalformedTerm::UnexpectedByte(4, ';'))]
    #[case::trailing(r#""a""b""#, MalformedTerm::TrailingInput(3))]
    #[case::space_is_not_canonical(r#"[ "a"]"#, MalformedTerm::UnexpectedByte(1, ' '))]
    fn parse_errors(#[case] input: &str, #[case] expected: MalformedTerm) {
        assert_eq!(input.parse::<Term>().unwrap_err(), expected);
    }

    #[test]
    fn structure_accessors() {
        let t = Term::tuple(vec![Term::atom("a"), Term::atom("b")]);
        assert_eq!(t.as_tuple(2).unwrap().len(), 2);
        assert_eq!(
            t.as_tuple(3).unwrap_err(),
            MalformedTerm::Arity {
                expected: 3,
                found: 2
            }
        );
        assert_eq!(
            t.as_atom().unwrap_err(),
            MalformedTerm::Unexpected {
                expected: "an atom",
                found: "a tuple"
            }
        );
        assert_eq!(
            Term::atom("x").as_list().unwrap_err(),
            MalformedTerm::Unexpected {
                expected: "a list",
                found: "an atom"
            }
        );
    }

    fn arb_term() -> impl Strategy<Value = Term> {
        let leaf = any::<String>().prop_map(Term::Atom);
        leaf.prop_recursive(4, 32, 5, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..5).prop_map(Term::List),
                ("[A-Za-z_][A-Za-z0-9_]{0,8}", prop::collection::vec(inner.clone(), 0..5))
                    .prop_map(|(name, elems)| Term::App(name, elems)),
                prop::collection::vec(inner, 0..5).prop_map(Term::tuple),
            ]
        })
    }

    proptest! {
        #[test]
        fn roundtrip(term in arb_term()) {
            let printed = term.to_string();
            let parsed = printed.parse::<Term>().unwrap();
            prop_assert_eq!(term, parsed);
        }

        #[test]
        fn printing_is_deterministic(term in arb_term()) {
            prop_assert_eq!(term.to_string(), term.to_string());
        }
    }
}
