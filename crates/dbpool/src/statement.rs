//! Statement text and parameter checking.
//!
//! Placeholders are located with a small lexer that skips string literals,
//! quoted identifiers, and comments. The text itself is never rewritten: it
//! is handed to the driver exactly as written.
//!
//! Positional values are counted the way SQLite assigns bind indexes:
//! `:N` forms bind in order of first appearance, `?N` binds at index `N`,
//! and a bare `?` binds one past the highest index seen so far. A statement
//! uses one of these families, never a mix.

use std::collections::HashSet;

use dbpool_types::Params;
use thiserror::Error;

/// One placeholder occurrence in statement text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// `:1`, `:2`, ...
    Numbered(u32),
    /// `?1`, `?2`, ...
    Indexed(u32),
    /// `:name`, `@name` or `$name`, stored without the sigil.
    Named(String),
    /// A bare `?`.
    Anonymous,
}

/// A statement plus the placeholders found in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    text: String,
    placeholders: Vec<Placeholder>,
}

/// A mismatch between a statement's placeholders and the bound parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// Wrong number of positional values.
    #[error("statement expects {expected} parameter(s), {given} given")]
    CountMismatch {
        /// Distinct placeholders in the statement.
        expected: usize,
        /// Values supplied.
        given: usize,
    },

    /// The statement mixes placeholder families: named with positional,
    /// or `:N` with `?`/`?N`.
    #[error("statement mixes placeholder styles")]
    MixedStyles,

    /// Positional values for a statement with named placeholders.
    #[error("statement uses named placeholders but positional parameters were given")]
    ExpectedNamed,

    /// Named values for a statement with positional placeholders.
    #[error("statement uses positional placeholders but named parameters were given")]
    ExpectedPositional,

    /// A named placeholder has no value.
    #[error("no value bound for placeholder :{0}")]
    MissingName(String),

    /// A value was bound to a name the statement does not use.
    #[error("statement has no placeholder :{0}")]
    UnknownName(String),

    /// The same name was bound twice.
    #[error("parameter :{0} bound more than once")]
    DuplicateName(String),
}

impl Statement {
    /// Wraps statement text and locates its placeholders.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let placeholders = scan(&text);
        Self { text, placeholders }
    }

    /// The statement text, unchanged.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Placeholder occurrences in order of appearance.
    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    /// Distinct named placeholders in order of first appearance.
    pub fn names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.placeholders
            .iter()
            .filter_map(|p| match p {
                Placeholder::Named(name) => Some(name.as_str()),
                _ => None,
            })
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Number of values a positional binding must supply.
    ///
    /// Repeated `:N` placeholders share one value. For `?` forms this is the
    /// highest bind index: `?N` sits at `N` and each bare `?` at one past the
    /// highest index before it, so `?, ?1` takes one value and `?2` takes two.
    pub fn positional_count(&self) -> usize {
        let mut numbered = HashSet::new();
        let mut highest = 0usize;
        for placeholder in &self.placeholders {
            match placeholder {
                Placeholder::Numbered(n) => {
                    numbered.insert(*n);
                }
                Placeholder::Indexed(n) => highest = highest.max(*n as usize),
                Placeholder::Anonymous => highest += 1,
                Placeholder::Named(_) => {}
            }
        }
        numbered.len() + highest
    }

    fn has_named(&self) -> bool {
        self.placeholders
            .iter()
            .any(|p| matches!(p, Placeholder::Named(_)))
    }

    fn has_positional(&self) -> bool {
        self.placeholders
            .iter()
            .any(|p| !matches!(p, Placeholder::Named(_)))
    }

    fn mixes_styles(&self) -> bool {
        let colon = self
            .placeholders
            .iter()
            .any(|p| matches!(p, Placeholder::Numbered(_)));
        let question = self
            .placeholders
            .iter()
            .any(|p| matches!(p, Placeholder::Indexed(_) | Placeholder::Anonymous));
        [self.has_named(), colon, question]
            .into_iter()
            .filter(|used| *used)
            .count()
            > 1
    }

    /// Checks that `params` can bind this statement.
    ///
    /// # Errors
    ///
    /// Returns a [`BindError`] describing the first mismatch.
    pub fn check(&self, params: &Params) -> Result<(), BindError> {
        if self.mixes_styles() {
            return Err(BindError::MixedStyles);
        }

        match params {
            Params::None => {
                let expected = self.positional_count() + self.names().len();
                if expected != 0 {
                    return Err(BindError::CountMismatch { expected, given: 0 });
                }
            }
            Params::Positional(values) => {
                if self.has_named() {
                    return Err(BindError::ExpectedNamed);
                }
                let expected = self.positional_count();
                if values.len() != expected {
                    return Err(BindError::CountMismatch {
                        expected,
                        given: values.len(),
                    });
                }
            }
            Params::Named(pairs) => {
                if self.has_positional() {
                    return Err(BindError::ExpectedPositional);
                }
                let names = self.names();
                let mut bound = HashSet::new();
                for (name, _) in pairs {
                    if !bound.insert(name.as_str()) {
                        return Err(BindError::DuplicateName(name.clone()));
                    }
                    if !names.contains(&name.as_str()) {
                        return Err(BindError::UnknownName(name.clone()));
                    }
                }
                if let Some(missing) = names.iter().find(|n| !bound.contains(*n)) {
                    return Err(BindError::MissingName((*missing).to_string()));
                }
            }
        }

        Ok(())
    }
}

impl From<&str> for Statement {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Statement {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || c == '#'
}

fn scan(text: &str) -> Vec<Placeholder> {
    let mut found = Vec::new();
    let mut chars = text.chars().peekable();
    let mut prev = '\0';

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                for inner in chars.by_ref() {
                    if inner == c {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for inner in chars.by_ref() {
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
            }
            ':' => match chars.peek().copied() {
                // `::` type cast
                Some(':') => {
                    chars.next();
                }
                Some(d) if d.is_ascii_digit() => {
                    found.push(Placeholder::Numbered(take_number(&mut chars)));
                }
                Some(n) if is_name_start(n) => {
                    found.push(Placeholder::Named(take_name(&mut chars)));
                }
                _ => {}
            },
            // `t@dblink` and `a$b` are identifiers, not placeholders.
            '@' | '$' if !is_name_char(prev) => match chars.peek().copied() {
                Some(n) if is_name_start(n) => {
                    found.push(Placeholder::Named(take_name(&mut chars)));
                }
                _ => {}
            },
            '?' => match chars.peek().copied() {
                Some(d) if d.is_ascii_digit() => {
                    found.push(Placeholder::Indexed(take_number(&mut chars)));
                }
                _ => found.push(Placeholder::Anonymous),
            },
            _ => {}
        }
        prev = c;
    }

    found
}

fn take_name(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut name = String::new();
    while let Some(&n) = chars.peek() {
        if !is_name_char(n) {
            break;
        }
        name.push(n);
        chars.next();
    }
    name
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> u32 {
    let mut n: u32 = 0;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        n = n.saturating_mul(10).saturating_add(d);
        chars.next();
    }
    n
}
