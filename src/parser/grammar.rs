//! Markup grammar using chumsky
//!
//! Tag and variable markup is lexed with logos and parsed here into
//! expressions, filter pipelines and `if` conditions.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::error::ParseError;
use crate::parser::ast::*;
use crate::parser::lexer::{self, Token};

/// `and` / `or` between two comparisons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    And,
    Or,
}

/// Parse the inside of `{{ ... }}` into an expression and its filters.
///
/// `offset` is the byte position of `markup` in the template source and is
/// added to every reported span.
pub fn parse_variable_markup(
    markup: &str,
    offset: usize,
) -> Result<(Expr, Vec<FilterCall>), ParseError> {
    if markup.trim().is_empty() {
        return Ok((Expr::Literal(Literal::Nil), Vec::new()));
    }

    let len = markup.len();
    let token_iter = lex_markup(markup, offset)?.into_iter();

    // Turn the token iterator into a stream that chumsky can use
    let token_stream = Stream::from_iter(token_iter)
        // Split (Token, SimpleSpan) into token and span parts
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    variable_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| first_error(errs, markup, offset))
}

/// Parse `if`/`elsif` markup into a condition
pub fn parse_condition(markup: &str, offset: usize) -> Result<Condition, ParseError> {
    let len = markup.len();
    let token_iter = lex_markup(markup, offset)
        .map_err(ParseError::into_invalid_condition)?
        .into_iter();

    let token_stream = Stream::from_iter(token_iter)
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    condition_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| first_error(errs, markup, offset).into_invalid_condition())
}

fn lex_markup(markup: &str, offset: usize) -> Result<Vec<(Token, SimpleSpan)>, ParseError> {
    let tokens = lexer::lex(markup).map_err(|span| ParseError::Syntax {
        span: offset + span.start..offset + span.end,
        message: format!("Unexpected character '{}'", &markup[span.clone()]),
        expected: Vec::new(),
    })?;

    Ok(tokens
        .into_iter()
        .map(|(tok, span)| (tok, SimpleSpan::from(span)))
        .collect())
}

fn first_error(errs: Vec<Rich<'_, Token>>, markup: &str, offset: usize) -> ParseError {
    match errs.into_iter().next() {
        Some(err) => ParseError::from_rich(err, offset),
        None => ParseError::Syntax {
            span: offset..offset + markup.len(),
            message: format!("Invalid markup '{}'", markup),
            expected: Vec::new(),
        },
    }
}

/// Literal or lookup expression
fn expression<'a, I>() -> impl Parser<'a, I, Expr, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let literal = select! {
            Token::Nil => Literal::Nil,
            Token::True => Literal::Bool(true),
            Token::False => Literal::Bool(false),
            Token::Integer(n) => Literal::Int(n),
            Token::Float(f) => Literal::Float(f),
            Token::String(s) => Literal::Str(s),
        }
        .map(Expr::Literal);

        let identifier = select! {
            Token::Ident(s) => s,
        };

        let accessor = choice((
            just(Token::Dot)
                .ignore_then(identifier.clone())
                .map(Accessor::Member),
            expr.delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
                .map(|e| Accessor::Index(Box::new(e))),
        ));

        let lookup = identifier
            .then(accessor.repeated().collect::<Vec<_>>())
            .map(|(root, path)| Expr::Lookup { root, path });

        choice((literal, lookup)).boxed()
    })
}

fn variable_parser<'a, I>(
) -> impl Parser<'a, I, (Expr, Vec<FilterCall>), extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let identifier = select! {
        Token::Ident(s) => s,
    };

    let arguments = expression()
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>();

    let filter = just(Token::Pipe)
        .ignore_then(identifier)
        .then(just(Token::Colon).ignore_then(arguments).or_not())
        .map(|(name, args)| FilterCall {
            name,
            args: args.unwrap_or_default(),
        });

    expression()
        .then(filter.repeated().collect::<Vec<_>>())
        .then_ignore(end())
}

fn condition_parser<'a, I>() -> impl Parser<'a, I, Condition, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let operator = choice((
        just(Token::Eq).to(Operator::Eq),
        just(Token::Ne).to(Operator::Ne),
        just(Token::Le).to(Operator::Le),
        just(Token::Ge).to(Operator::Ge),
        just(Token::Lt).to(Operator::Lt),
        just(Token::Gt).to(Operator::Gt),
        just(Token::Contains).to(Operator::Contains),
    ));

    let comparison = expression()
        .then(operator.then(expression()).or_not())
        .map(|(left, op)| Comparison { left, op });

    let combinator = choice((
        just(Token::And).to(Combinator::And),
        just(Token::Or).to(Combinator::Or),
    ));

    comparison
        .clone()
        .then(combinator.then(comparison).repeated().collect::<Vec<_>>())
        .then_ignore(end())
        .map(|(first, rest)| fold_right(first, rest))
}

/// Combine `c0 op1 c1 op2 c2 ...` as `c0 op1 (c1 op2 (c2 ...))`
fn fold_right(first: Comparison, rest: Vec<(Combinator, Comparison)>) -> Condition {
    let mut pending = Vec::with_capacity(rest.len());
    let mut last = first;
    for (combinator, next) in rest {
        pending.push((last, combinator));
        last = next;
    }

    pending
        .into_iter()
        .rev()
        .fold(Condition::Compare(last), |acc, (left, combinator)| {
            let left = Box::new(Condition::Compare(left));
            match combinator {
                Combinator::And => Condition::And(left, Box::new(acc)),
                Combinator::Or => Condition::Or(left, Box::new(acc)),
            }
        })
}
