use nom::{
    branch::alt,
    bytes::complete::{is_not, tag},
    character::complete::char,
    combinator::{map, value},
    multi::many0,
    IResult,
};

use crate::{file_error, runner::decode, Output, Result, TestCase};

/// Line separating the recorded stdout from the recorded stderr
pub const SEPARATOR: &str = "$stderr:\n";
/// First line of fixtures whose streams have `$` escaped as `$$`. Fixtures without it use the
/// raw layout: stdout, separator, stderr, verbatim
pub const ESCAPED_HEADER: &str = "$escaped:\n";

/// Result of reading a test case's recorded output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fixture {
    Found(Output),
    Missing,
    Malformed { separators: usize },
}

/// Overwrites the fixture of `case` with `output`
pub fn save(case: &TestCase, output: &Output) -> Result<()> {
    let path = case.golden_path();
    log::debug!("recording {}", path.display());
    std::fs::write(&path, encode(output)).map_err(file_error(&path))
}

pub fn load(case: &TestCase) -> Result<Fixture> {
    let path = case.golden_path();
    match std::fs::read(&path) {
        Ok(bytes) => Ok(decode_fixture(&decode(&bytes))),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Fixture::Missing),
        Err(err) => Err(file_error(&path)(err)),
    }
}

// `$` is doubled inside both streams so the separator can't occur in recorded text
pub(crate) fn encode(output: &Output) -> String {
    let mut encoded = ESCAPED_HEADER.to_owned();
    encoded.push_str(&escape(&output.stdout));
    encoded.push_str(SEPARATOR);
    encoded.push_str(&escape(&output.stderr));
    encoded
}

fn escape(text: &str) -> String {
    text.replace('$', "$$")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Text(&'a str),
    Dollar,
    Separator,
}

// a `$` that is neither doubled nor the separator is kept as is
fn token(i: &str) -> IResult<&str, Token> {
    alt((
        value(Token::Dollar, tag("$$")),
        value(Token::Separator, tag(SEPARATOR)),
        map(is_not("$"), Token::Text),
        value(Token::Dollar, char('$')),
    ))(i)
}

pub(crate) fn decode_fixture(input: &str) -> Fixture {
    match input.strip_prefix(ESCAPED_HEADER) {
        Some(body) => decode_escaped(body),
        None => decode_raw(input),
    }
}

// fixtures recorded before escaping was introduced
fn decode_raw(input: &str) -> Fixture {
    match input.split_once(SEPARATOR) {
        Some((stdout, stderr)) if !stderr.contains(SEPARATOR) => {
            Fixture::Found(Output::new(stdout, stderr))
        }
        _ => Fixture::Malformed {
            separators: input.matches(SEPARATOR).count(),
        },
    }
}

fn decode_escaped(input: &str) -> Fixture {
    // every input char is accepted by some branch of `token`
    let tokens = match many0(token)(input) {
        Ok((_, tokens)) => tokens,
        Err(_) => return Fixture::Malformed { separators: 0 },
    };

    let mut streams = Vec::new();
    let mut current = String::new();
    for token in tokens {
        match token {
            Token::Text(text) => current.push_str(text),
            Token::Dollar => current.push('$'),
            Token::Separator => streams.push(std::mem::take(&mut current)),
        }
    }
    streams.push(current);

    match <[String; 2]>::try_from(streams) {
        Ok([stdout, stderr]) => Fixture::Found(Output { stdout, stderr }),
        Err(streams) => Fixture::Malformed {
            separators: streams.len() - 1,
        },
    }
}
