pub mod error;
pub mod token;

use error::LexerError;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{escaped_transform, tag, take_until, take_while, take_while_m_n},
    character::complete::{char, digit1, hex_digit1, multispace1, none_of, not_line_ending, one_of, satisfy},
    combinator::{map, map_opt, map_res, opt, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded},
};
use smallvec::SmallVec;
use smol_str::SmolStr;
use token::{Token, TokenKind};

use crate::ast::op::Operator;
use crate::number::Number;
use crate::range::{Range, Span};

macro_rules! define_token_parser {
    ($name:ident, $tag:expr, $kind:expr) => {
        fn $name(input: Span) -> IResult<Span, Token> {
            map(tag($tag), |span: Span| Token {
                range: Range::from_span(&span, 0),
                kind: $kind,
            })
            .parse(input)
        }
    };
}

/// On-demand tokenizer over a source fragment.
///
/// Tokens are produced one at a time from a single cursor; nothing is
/// buffered beyond the position before the last token, which [`Lexer::back`]
/// restores.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    base: usize,
    rest: Span<'a>,
    last: Span<'a>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::with_offset(source, 0)
    }

    /// Lexes `fragment`, reporting ranges as if it started at byte `base`
    /// of the enclosing source.
    pub fn with_offset(fragment: &'a str, base: usize) -> Self {
        let span = Span::new(fragment);
        Self {
            base,
            rest: span,
            last: span,
        }
    }

    /// Absolute byte offset of the cursor.
    pub fn offset(&self) -> usize {
        self.base + self.rest.location_offset()
    }

    pub fn next_token(&mut self) -> Result<Token, LexerError> {
        self.last = self.rest;
        self.skip_trivia()?;

        let Some(c) = self.rest.fragment().chars().next() else {
            let at = self.offset();
            return Ok(Token {
                range: Range::new(at, at),
                kind: TokenKind::Eof,
            });
        };

        let (rest, mut token) = match c {
            '[' => self.inline_collection()?,
            '"' | '\'' => string_literal(self.rest).map_err(|_| {
                LexerError::UnterminatedString(Range::new(self.offset(), self.base + self.end_offset()))
            })?,
            c if c.is_ascii_digit() => self.number()?,
            c if is_ident_start(c) => self.property()?,
            _ => alt((operators, punctuations))
                .parse(self.rest)
                .map_err(|_| LexerError::UnexpectedCharacter(c, Range::new(self.offset(), self.offset() + c.len_utf8())))?,
        };

        token.range = Range::new(token.range.start + self.base, token.range.end + self.base);
        self.rest = rest;
        Ok(token)
    }

    pub fn peek_token(&mut self) -> Result<Token, LexerError> {
        let (rest, last) = (self.rest, self.last);
        let token = self.next_token();
        self.rest = rest;
        self.last = last;
        token
    }

    /// Rewinds the cursor by one token.
    pub fn back(&mut self) {
        self.rest = self.last;
    }

    /// Collects every remaining token, ending with `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if eof {
                return Ok(tokens);
            }
        }
    }

    fn end_offset(&self) -> usize {
        self.rest.location_offset() + self.rest.fragment().len()
    }

    fn skip_trivia(&mut self) -> Result<(), LexerError> {
        if let Ok((rest, _)) = trivia(self.rest) {
            self.rest = rest;
        }
        if self.rest.fragment().starts_with("/*") {
            return Err(LexerError::UnterminatedComment(Range::new(
                self.offset(),
                self.base + self.end_offset(),
            )));
        }
        Ok(())
    }

    fn inline_collection(&self) -> Result<(Span<'a>, Token), LexerError> {
        let start = self.rest.location_offset();
        let len = balanced_end(self.rest.fragment())
            .ok_or_else(|| LexerError::UnbalancedBracket('[', Range::new(self.offset(), self.offset() + 1)))?;
        let (rest, _) = split_at(self.rest, len);
        Ok((
            rest,
            Token {
                range: Range::new(start, start + len),
                // content without the brackets, absolute
                kind: TokenKind::InlineCollection(Range::new(self.base + start + 1, self.base + start + len - 1)),
            },
        ))
    }

    fn number(&self) -> Result<(Span<'a>, Token), LexerError> {
        let malformed = |len: usize| {
            let text = &self.rest.fragment()[..len];
            LexerError::MalformedNumber(text.into(), Range::new(self.offset(), self.offset() + len))
        };

        let (rest, span) = number_literal(self.rest).map_err(|_| malformed(1))?;
        let text = span.fragment();
        let trailing = rest.fragment().chars().next().is_some_and(is_ident_char);
        match Number::from_literal(text) {
            Some(number) if !trailing => Ok((
                rest,
                Token {
                    range: Range::from_span(&span, 0),
                    kind: TokenKind::NumberLiteral(number),
                },
            )),
            _ => {
                let len = text.len() + rest.fragment().chars().take_while(|c| is_ident_char(*c)).map(char::len_utf8).sum::<usize>();
                Err(malformed(len))
            }
        }
    }

    fn property(&self) -> Result<(Span<'a>, Token), LexerError> {
        let fragment = *self.rest.fragment();
        let name_len = ident_len(fragment);
        let word = &fragment[..name_len];
        let start = self.rest.location_offset();

        if let Some(kind) = TokenKind::keyword(word) {
            let (rest, _) = split_at(self.rest, name_len);
            return Ok((
                rest,
                Token {
                    range: Range::new(start, start + name_len),
                    kind,
                },
            ));
        }

        let mut len = name_len;
        loop {
            let tail = &fragment[len..];
            if let Some(after) = tail.strip_prefix(".?").filter(|s| s.starts_with(is_ident_start)) {
                len += 2 + ident_len(after);
            } else if let Some(after) = tail.strip_prefix('.').filter(|s| s.starts_with(is_ident_start)) {
                len += 1 + ident_len(after);
            } else if let Some(open) = tail.chars().next().filter(|c| matches!(c, '[' | '(')) {
                let closing = balanced_end(tail).ok_or_else(|| {
                    let at = self.offset() + len;
                    LexerError::UnbalancedBracket(open, Range::new(at, at + 1))
                })?;
                len += closing;
            } else {
                break;
            }
        }

        let (rest, _) = split_at(self.rest, len);
        Ok((
            rest,
            Token {
                range: Range::new(start, start + len),
                kind: TokenKind::Property(SmolStr::new(&fragment[..len])),
            },
        ))
    }
}

fn split_at(span: Span<'_>, len: usize) -> (Span<'_>, Span<'_>) {
    use nom::Input;
    (span.take_from(len), span.take(len))
}

pub(crate) fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn ident_len(s: &str) -> usize {
    match ident(Span::new(s)) {
        Ok((_, span)) => span.fragment().len(),
        Err(_) => 0,
    }
}

/// Byte length of the bracketed region that `text` starts with, including
/// both delimiters. Quoted strings inside are opaque.
pub(crate) fn balanced_end(text: &str) -> Option<usize> {
    let mut closers: SmallVec<[char; 8]> = SmallVec::new();
    let mut quote: Option<char> = None;
    let mut chars = text.char_indices();

    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            if c == '\\' {
                chars.next();
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' => closers.push(')'),
            '[' => closers.push(']'),
            '{' => closers.push('}'),
            ')' | ']' | '}' => {
                if closers.pop() != Some(c) {
                    return None;
                }
                if closers.is_empty() {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn ident(input: Span) -> IResult<Span, Span> {
    recognize(pair(satisfy(is_ident_start), take_while(is_ident_char))).parse(input)
}

fn trivia(input: Span) -> IResult<Span, Span> {
    recognize(many0(alt((
        multispace1,
        recognize(pair(tag("//"), not_line_ending)),
        recognize((tag("/*"), take_until("*/"), tag("*/"))),
    ))))
    .parse(input)
}

fn number_literal(input: Span) -> IResult<Span, Span> {
    alt((
        recognize((alt((tag("0x"), tag("0X"))), hex_digit1, opt(one_of("lL")))),
        recognize((
            digit1,
            opt((char('.'), digit1)),
            opt((one_of("eE"), opt(one_of("+-")), digit1)),
            opt(one_of("lLfFdDbBiI")),
        )),
    ))
    .parse(input)
}

fn unicode(input: Span) -> IResult<Span, char> {
    map_opt(
        map_res(
            preceded(
                char('u'),
                delimited(
                    char('{'),
                    take_while_m_n(1, 6, |c: char| c.is_ascii_hexdigit()),
                    char('}'),
                ),
            ),
            |span: Span| u32::from_str_radix(span.fragment(), 16),
        ),
        char::from_u32,
    )
    .parse(input)
}

fn escape(input: Span) -> IResult<Span, char> {
    alt((
        value('\\', char('\\')),
        value('"', char('"')),
        value('\'', char('\'')),
        value('\r', char('r')),
        value('\n', char('n')),
        value('\t', char('t')),
        value('\0', char('0')),
        unicode,
    ))
    .parse(input)
}

fn string_literal(input: Span) -> IResult<Span, Token> {
    let (rest, text) = alt((
        value(String::new(), alt((tag("\"\""), tag("''")))),
        delimited(char('"'), escaped_transform(none_of("\"\\"), '\\', escape), char('"')),
        delimited(char('\''), escaped_transform(none_of("'\\"), '\\', escape), char('\'')),
    ))
    .parse(input)?;

    let start = input.location_offset();
    Ok((
        rest,
        Token {
            range: Range::new(start, rest.location_offset()),
            kind: TokenKind::StringLiteral(text.into()),
        },
    ))
}

define_token_parser!(ushr, ">>>", TokenKind::Operator(Operator::UShr));
define_token_parser!(shl_assign, "<<=", TokenKind::CompoundAssign(Operator::Shl));
define_token_parser!(shr_assign, ">>=", TokenKind::CompoundAssign(Operator::Shr));
define_token_parser!(pow, "**", TokenKind::Operator(Operator::Pow));
define_token_parser!(eq_eq, "==", TokenKind::Operator(Operator::Eq));
define_token_parser!(ne_eq, "!=", TokenKind::Operator(Operator::Ne));
define_token_parser!(lte, "<=", TokenKind::Operator(Operator::Le));
define_token_parser!(gte, ">=", TokenKind::Operator(Operator::Ge));
define_token_parser!(and_and, "&&", TokenKind::Operator(Operator::And));
define_token_parser!(or_or, "||", TokenKind::Operator(Operator::Or));
define_token_parser!(add_assign, "+=", TokenKind::CompoundAssign(Operator::Add));
define_token_parser!(sub_assign, "-=", TokenKind::CompoundAssign(Operator::Sub));
define_token_parser!(mul_assign, "*=", TokenKind::CompoundAssign(Operator::Mul));
define_token_parser!(div_assign, "/=", TokenKind::CompoundAssign(Operator::Div));
define_token_parser!(rem_assign, "%=", TokenKind::CompoundAssign(Operator::Rem));
define_token_parser!(append_assign, "#=", TokenKind::CompoundAssign(Operator::StrAppend));
define_token_parser!(and_assign, "&=", TokenKind::CompoundAssign(Operator::BitAnd));
define_token_parser!(or_assign, "|=", TokenKind::CompoundAssign(Operator::BitOr));
define_token_parser!(xor_assign, "^=", TokenKind::CompoundAssign(Operator::BitXor));
define_token_parser!(regex, "~=", TokenKind::Operator(Operator::Regex));
define_token_parser!(increment, "++", TokenKind::Increment);
define_token_parser!(decrement, "--", TokenKind::Decrement);
define_token_parser!(shl, "<<", TokenKind::Operator(Operator::Shl));
define_token_parser!(shr, ">>", TokenKind::Operator(Operator::Shr));
define_token_parser!(plus, "+", TokenKind::Operator(Operator::Add));
define_token_parser!(minus, "-", TokenKind::Operator(Operator::Sub));
define_token_parser!(star, "*", TokenKind::Operator(Operator::Mul));
define_token_parser!(slash, "/", TokenKind::Operator(Operator::Div));
define_token_parser!(percent, "%", TokenKind::Operator(Operator::Rem));
define_token_parser!(hash, "#", TokenKind::Operator(Operator::StrAppend));
define_token_parser!(lt, "<", TokenKind::Operator(Operator::Lt));
define_token_parser!(gt, ">", TokenKind::Operator(Operator::Gt));
define_token_parser!(amp, "&", TokenKind::Operator(Operator::BitAnd));
define_token_parser!(pipe, "|", TokenKind::Operator(Operator::BitOr));
define_token_parser!(caret, "^", TokenKind::Operator(Operator::BitXor));
define_token_parser!(not, "!", TokenKind::Not);
define_token_parser!(tilde, "~", TokenKind::Tilde);
define_token_parser!(assign, "=", TokenKind::Assign);
define_token_parser!(question, "?", TokenKind::Question);
define_token_parser!(colon, ":", TokenKind::Colon);
define_token_parser!(semi_colon, ";", TokenKind::SemiColon);
define_token_parser!(comma, ",", TokenKind::Comma);
define_token_parser!(l_paren, "(", TokenKind::LParen);
define_token_parser!(r_paren, ")", TokenKind::RParen);
define_token_parser!(l_brace, "{", TokenKind::LBrace);
define_token_parser!(r_brace, "}", TokenKind::RBrace);

fn operators(input: Span) -> IResult<Span, Token> {
    alt((
        alt((
            ushr,
            shl_assign,
            shr_assign,
            pow,
            eq_eq,
            ne_eq,
            lte,
            gte,
            and_and,
            or_or,
            add_assign,
            sub_assign,
            mul_assign,
            div_assign,
            rem_assign,
            append_assign,
            and_assign,
            or_assign,
            xor_assign,
            regex,
        )),
        alt((
            increment, decrement, shl, shr, plus, minus, star, slash, percent, hash, lt, gt, amp, pipe, caret, not, tilde, assign,
        )),
    ))
    .parse(input)
}

fn punctuations(input: Span) -> IResult<Span, Token> {
    alt((
        question, colon, semi_colon, comma, l_paren, r_paren, l_brace, r_brace,
    ))
    .parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn kinds(source: &str) -> Result<Vec<TokenKind>, LexerError> {
        Lexer::new(source)
            .tokenize()
            .map(|tokens| tokens.into_iter().map(|t| t.kind).collect())
    }

    #[rstest]
    #[case("2 + 3 * 4", Ok(vec![
        TokenKind::NumberLiteral(Number::Int(2)),
        TokenKind::Operator(Operator::Add),
        TokenKind::NumberLiteral(Number::Int(3)),
        TokenKind::Operator(Operator::Mul),
        TokenKind::NumberLiteral(Number::Int(4)),
        TokenKind::Eof,
    ]))]
    #[case("a.b.?c[x + 1].d(1, \")\")", Ok(vec![
        TokenKind::Property("a.b.?c[x + 1].d(1, \")\")".into()),
        TokenKind::Eof,
    ]))]
    #[case("x += 'it''s'", Ok(vec![
        TokenKind::Property("x".into()),
        TokenKind::CompoundAssign(Operator::Add),
        TokenKind::StringLiteral("it".into()),
        TokenKind::StringLiteral("s".into()),
        TokenKind::Eof,
    ]))]
    #[case("if (a) { b } else { c }", Ok(vec![
        TokenKind::If,
        TokenKind::LParen,
        TokenKind::Property("a".into()),
        TokenKind::RParen,
        TokenKind::LBrace,
        TokenKind::Property("b".into()),
        TokenKind::RBrace,
        TokenKind::Else,
        TokenKind::LBrace,
        TokenKind::Property("c".into()),
        TokenKind::RBrace,
        TokenKind::Eof,
    ]))]
    #[case("a >>> 2 >>= b", Ok(vec![
        TokenKind::Property("a".into()),
        TokenKind::Operator(Operator::UShr),
        TokenKind::NumberLiteral(Number::Int(2)),
        TokenKind::CompoundAssign(Operator::Shr),
        TokenKind::Property("b".into()),
        TokenKind::Eof,
    ]))]
    #[case("s contains \"x\" && t ~= 'a.*'", Ok(vec![
        TokenKind::Property("s".into()),
        TokenKind::Operator(Operator::Contains),
        TokenKind::StringLiteral("x".into()),
        TokenKind::Operator(Operator::And),
        TokenKind::Property("t".into()),
        TokenKind::Operator(Operator::Regex),
        TokenKind::StringLiteral("a.*".into()),
        TokenKind::Eof,
    ]))]
    #[case("null != nil // trailing\n/* block */ true", Ok(vec![
        TokenKind::NullLiteral,
        TokenKind::Operator(Operator::Ne),
        TokenKind::NullLiteral,
        TokenKind::BoolLiteral(true),
        TokenKind::Eof,
    ]))]
    #[case("\"a\\n\\u{41}\" ''", Ok(vec![
        TokenKind::StringLiteral("a\nA".into()),
        TokenKind::StringLiteral("".into()),
        TokenKind::Eof,
    ]))]
    #[case("café.größe + 1", Ok(vec![
        TokenKind::Property("café.größe".into()),
        TokenKind::Operator(Operator::Add),
        TokenKind::NumberLiteral(Number::Int(1)),
        TokenKind::Eof,
    ]))]
    #[case("\"open", Err(LexerError::UnterminatedString(Range::new(0, 5))))]
    #[case("a[1", Err(LexerError::UnbalancedBracket('[', Range::new(1, 2))))]
    #[case("[1, 2", Err(LexerError::UnbalancedBracket('[', Range::new(0, 1))))]
    #[case("1 @ 2", Err(LexerError::UnexpectedCharacter('@', Range::new(2, 3))))]
    #[case("12abc", Err(LexerError::MalformedNumber("12abc".into(), Range::new(0, 5))))]
    #[case("/* open", Err(LexerError::UnterminatedComment(Range::new(0, 7))))]
    fn test_tokenize(#[case] source: &str, #[case] expected: Result<Vec<TokenKind>, LexerError>) {
        assert_eq!(kinds(source), expected);
    }

    #[test]
    fn test_inline_collection_range() {
        let mut lexer = Lexer::with_offset("[1, [2]]", 10);
        let token = lexer.next_token().unwrap();
        assert_eq!(token.range, Range::new(10, 18));
        assert_eq!(token.kind, TokenKind::InlineCollection(Range::new(11, 17)));
    }

    #[test]
    fn test_peek_and_back() {
        let mut lexer = Lexer::new("a + b");
        assert_eq!(lexer.peek_token().unwrap().kind, TokenKind::Property("a".into()));
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Property("a".into()));
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Operator(Operator::Add));
        lexer.back();
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Operator(Operator::Add));
        assert_eq!(lexer.offset(), 3);
    }

    #[rstest]
    #[case("(a)", Some(3))]
    #[case("[a, (b)]", Some(8))]
    #[case("(\")\")", Some(5))]
    #[case("(a]", None)]
    #[case("((a)", None)]
    fn test_balanced_end(#[case] text: &str, #[case] expected: Option<usize>) {
        assert_eq!(balanced_end(text), expected);
    }
}
