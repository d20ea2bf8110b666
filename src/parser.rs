extern crate combine;
use crate::syntax::*;

use crate::error::Error;
use combine::error::ParseError;
use combine::parser::char::{alpha_num, char, digit, letter, space, string};
use combine::stream::easy;
use combine::stream::Stream;
use combine::{
    attempt, between, chainl1, eof, many, many1, optional, satisfy, satisfy_map, skip_many,
    token, Parser,
};
use std::fmt;

#[derive(Debug, PartialEq, Clone)]
pub enum Tok {
    LParen,
    RParen,
    Let,
    In,
    End,
    If,
    Then,
    Else,
    Fn,
    Not,
    And,
    Or,
    Int,
    Bool,
    True,
    False,
    Assign,
    DArrow,
    Arrow,
    Colon,
    Neg,
    Op2(Op2),
    Num(String),
    Id(String),
    Eof,
}

impl fmt::Display for Tok {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

fn keyword(w: String) -> Tok {
    let kw = match &w[..] {
        "let" => Some(Tok::Let),
        "in" => Some(Tok::In),
        "end" => Some(Tok::End),
        "if" => Some(Tok::If),
        "then" => Some(Tok::Then),
        "else" => Some(Tok::Else),
        "fn" => Some(Tok::Fn),
        "not" => Some(Tok::Not),
        "and" => Some(Tok::And),
        "or" => Some(Tok::Or),
        "int" => Some(Tok::Int),
        "bool" => Some(Tok::Bool),
        "true" => Some(Tok::True),
        "false" => Some(Tok::False),
        _ => None,
    };
    kw.unwrap_or_else(|| Tok::Id(w))
}

// Whitespace and `--` comments, which run to the end of the line.
fn blank<I>() -> impl Parser<Input = I, Output = ()>
where
    I: Stream<Item = char>,
    I::Error: ParseError<I::Item, I::Range, I::Position>,
{
    let comment = attempt(string("--")).with(skip_many(satisfy(|c: char| c != '\n')));
    skip_many(space().map(|_x| ()).or(comment))
}

fn tok<I>() -> impl Parser<Input = I, Output = Tok>
where
    I: Stream<Item = char>,
    I::Error: ParseError<I::Item, I::Range, I::Position>,
{
    let word = letter()
        .and(many(alpha_num().or(char('_'))))
        .map(|(c, rest): (char, String)| keyword(format!("{}{}", c, rest)));

    let number = many1(digit()).map(|digits: String| Tok::Num(digits));

    let symbol = string("(")
        .map(|_x| Tok::LParen)
        .or(string(")").map(|_x| Tok::RParen))
        .or(attempt(string("<-")).map(|_x| Tok::Assign))
        .or(attempt(string("<=")).map(|_x| Tok::Op2(Op2::Leq)))
        .or(string("<").map(|_x| Tok::Op2(Op2::LT)))
        .or(attempt(string("=>")).map(|_x| Tok::DArrow))
        .or(string("=").map(|_x| Tok::Op2(Op2::Eq)))
        .or(attempt(string("->")).map(|_x| Tok::Arrow))
        .or(string("-").map(|_x| Tok::Op2(Op2::Sub)))
        .or(string("+").map(|_x| Tok::Op2(Op2::Add)))
        .or(string("*").map(|_x| Tok::Op2(Op2::Mul)))
        .or(string("/").map(|_x| Tok::Op2(Op2::Div)))
        .or(string("~").map(|_x| Tok::Neg))
        .or(string(":").map(|_x| Tok::Colon));

    word.or(number).or(symbol)
}

fn lex(s: &str) -> Result<Vec<Tok>, easy::ParseError<&str>> {
    let mut toks = blank()
        .with(many(tok().skip(blank())))
        .skip(eof())
        .map(|mut tokens: Vec<Tok>| {
            tokens.push(Tok::Eof);
            tokens
        });
    toks.easy_parse(s).map(|tuple| tuple.0)
}

fn name<I>() -> impl Parser<Input = I, Output = Name>
where
    I: Stream<Item = Tok>,
    I::Error: ParseError<I::Item, I::Range, I::Position>,
{
    satisfy_map(|t| match t {
        Tok::Id(x) => Option::Some(Name::new(&x)),
        _ => Option::None,
    })
}

fn op2<I>(ops: &'static [Op2]) -> impl Parser<Input = I, Output = Op2>
where
    I: Stream<Item = Tok>,
    I::Error: ParseError<I::Item, I::Range, I::Position>,
{
    satisfy_map(move |t| match t {
        Tok::Op2(op) if ops.contains(&op) => Option::Some(op),
        _ => Option::None,
    })
}

// A left-associative level of binary operators.
fn binary<I, P>(operand: P, ops: &'static [Op2]) -> impl Parser<Input = I, Output = Expr>
where
    I: Stream<Item = Tok>,
    I::Error: ParseError<I::Item, I::Range, I::Position>,
    P: Parser<Input = I, Output = Expr>,
{
    chainl1(
        operand,
        op2(ops).map(|op| move |l, r| Expr::op2(op, l, r)),
    )
}

fn base_type<I>() -> impl Parser<Input = I, Output = Type>
where
    I: Stream<Item = Tok>,
    I::Error: ParseError<I::Item, I::Range, I::Position>,
{
    token(Tok::Int)
        .map(|_x| Type::Int)
        .or(token(Tok::Bool).map(|_x| Type::Bool))
        .or(between(token(Tok::LParen), token(Tok::RParen), types()))
}

// `->` associates to the right.
fn types_<I>() -> impl Parser<Input = I, Output = Type>
where
    I: Stream<Item = Tok>,
    I::Error: ParseError<I::Item, I::Range, I::Position>,
{
    base_type()
        .and(optional(token(Tok::Arrow).with(types())))
        .map(|(t, rest)| match rest {
            Some(r) => Type::Arrow(Box::new(t), Box::new(r)),
            None => t,
        })
}

parser!{
    fn types[I]()(I) -> Type
    where [I: Stream<Item = Tok>]
    {
        types_()
    }
}

fn annotation<I>() -> impl Parser<Input = I, Output = Option<Type>>
where
    I: Stream<Item = Tok>,
    I::Error: ParseError<I::Item, I::Range, I::Position>,
{
    optional(token(Tok::Colon).with(types()))
}

fn atom<I>() -> impl Parser<Input = I, Output = Expr>
where
    I: Stream<Item = Tok>,
    I::Error: ParseError<I::Item, I::Range, I::Position>,
{
    // Literals that overflow an i32 fail to parse.
    let num = satisfy_map(|t| match t {
        Tok::Num(n) => n.parse::<i32>().ok().map(Expr::Num),
        _ => Option::None,
    });

    name()
        .map(Expr::Var)
        .or(num)
        .or(token(Tok::True).map(|_x| Expr::Bln(true)))
        .or(token(Tok::False).map(|_x| Expr::Bln(false)))
        .or(between(token(Tok::LParen), token(Tok::RParen), expr()))
}

fn app<I>() -> impl Parser<Input = I, Output = Expr>
where
    I: Stream<Item = Tok>,
    I::Error: ParseError<I::Item, I::Range, I::Position>,
{
    atom()
        .and(many(atom()))
        .map(|(f, args): (Expr, Vec<Expr>)| args.into_iter().fold(f, Expr::app))
}

fn let_exp<I>() -> impl Parser<Input = I, Output = Expr>
where
    I: Stream<Item = Tok>,
    I::Error: ParseError<I::Item, I::Range, I::Position>,
{
    token(Tok::Let)
        .with(name())
        .and(annotation())
        .skip(token(Tok::Assign))
        .and(expr())
        .skip(token(Tok::In))
        .and(expr())
        .skip(token(Tok::End))
        .map(|(((x, t), e1), e2)| Expr::Let(x, t, Box::new(e1), Box::new(e2)))
        .or(app())
}

fn unary_<I>() -> impl Parser<Input = I, Output = Expr>
where
    I: Stream<Item = Tok>,
    I::Error: ParseError<I::Item, I::Range, I::Position>,
{
    token(Tok::Not)
        .with(unary())
        .map(Expr::not)
        .or(token(Tok::Neg).with(unary()).map(Expr::neg))
        .or(let_exp())
}

parser!{
    fn unary[I]()(I) -> Expr
    where [I: Stream<Item = Tok>]
    {
        unary_()
    }
}

fn or_exp<I>() -> impl Parser<Input = I, Output = Expr>
where
    I: Stream<Item = Tok>,
    I::Error: ParseError<I::Item, I::Range, I::Position>,
{
    let mul = binary(unary(), &[Op2::Mul, Op2::Div]);
    let add = binary(mul, &[Op2::Add, Op2::Sub]);
    let cmp = binary(add, &[Op2::Leq, Op2::LT]);
    let eq = binary(cmp, &[Op2::Eq]);
    let and = chainl1(eq, token(Tok::And).map(|_x| Expr::and));
    chainl1(and, token(Tok::Or).map(|_x| Expr::or))
}

fn if_exp<I>() -> impl Parser<Input = I, Output = Expr>
where
    I: Stream<Item = Tok>,
    I::Error: ParseError<I::Item, I::Range, I::Position>,
{
    token(Tok::If)
        .with(expr())
        .skip(token(Tok::Then))
        .and(expr())
        .skip(token(Tok::Else))
        .and(expr())
        .map(|((c, t), e)| Expr::if_(c, t, e))
        .or(or_exp())
}

fn expr_<I>() -> impl Parser<Input = I, Output = Expr>
where
    I: Stream<Item = Tok>,
    I::Error: ParseError<I::Item, I::Range, I::Position>,
{
    token(Tok::Fn)
        .with(name())
        .and(annotation())
        .skip(token(Tok::DArrow))
        .and(expr())
        .map(|((x, t), body)| Expr::Fn(x, t, Box::new(body)))
        .or(if_exp())
}

parser!{
    fn expr[I]()(I) -> Expr
    where [I: Stream<Item = Tok>]
    {
        expr_()
    }
}

pub fn parse(input: &str) -> Result<Expr, Error> {
    match lex(input) {
        Result::Err(e) => Result::Err(Error::Parse(format!("{:?}", e))),
        Result::Ok(tokens) => {
            let mut ast = expr().skip(token(Tok::Eof));
            match ast.easy_parse(&tokens[..]) {
                Result::Err(e) => Result::Err(Error::Parse(format!("{:?}", e))),
                Result::Ok(tuple) => Result::Ok(tuple.0),
            }
        }
    }
}

#[cfg(test)]
mod tests {

    use super::{lex, parse, Tok};
    use crate::syntax::{Expr, Name, Op2, Type};

    fn kinds(s: &str) -> Vec<Tok> {
        lex(s).unwrap()
    }

    #[test]
    fn test_lex_arith() {
        assert_eq!(
            kinds("1 + 3"),
            vec![
                Tok::Num("1".to_string()),
                Tok::Op2(Op2::Add),
                Tok::Num("3".to_string()),
                Tok::Eof
            ]
        );
    }

    #[test]
    fn test_lex_comment() {
        assert_eq!(
            kinds("1 * 2 -- 3\n"),
            vec![
                Tok::Num("1".to_string()),
                Tok::Op2(Op2::Mul),
                Tok::Num("2".to_string()),
                Tok::Eof
            ]
        );
    }

    #[test]
    fn test_lex_let() {
        assert_eq!(
            kinds("let v <- 2 in v end"),
            vec![
                Tok::Let,
                Tok::Id("v".to_string()),
                Tok::Assign,
                Tok::Num("2".to_string()),
                Tok::In,
                Tok::Id("v".to_string()),
                Tok::End,
                Tok::Eof
            ]
        );
    }

    #[test]
    fn test_lex_symbols() {
        assert_eq!(
            kinds("<= < <- => = -> - ~ :"),
            vec![
                Tok::Op2(Op2::Leq),
                Tok::Op2(Op2::LT),
                Tok::Assign,
                Tok::DArrow,
                Tok::Op2(Op2::Eq),
                Tok::Arrow,
                Tok::Op2(Op2::Sub),
                Tok::Neg,
                Tok::Colon,
                Tok::Eof
            ]
        );
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        assert_eq!(kinds("iffy"), vec![Tok::Id("iffy".to_string()), Tok::Eof]);
    }

    #[test]
    fn test_lex_garbage() {
        assert!(lex("1 $ 2").is_err());
    }

    #[test]
    fn test_precedence() {
        let e = parse("2 * (3 + 4) - 1").unwrap();
        let expected = Expr::op2(
            Op2::Sub,
            Expr::op2(
                Op2::Mul,
                Expr::Num(2),
                Expr::op2(Op2::Add, Expr::Num(3), Expr::Num(4)),
            ),
            Expr::Num(1),
        );
        assert_eq!(e, expected);
    }

    #[test]
    fn test_left_associative() {
        let e = parse("10 - 3 - 2").unwrap();
        let expected = Expr::op2(
            Op2::Sub,
            Expr::op2(Op2::Sub, Expr::Num(10), Expr::Num(3)),
            Expr::Num(2),
        );
        assert_eq!(e, expected);
    }

    #[test]
    fn test_logic_precedence() {
        let e = parse("not true or 1 < 2 and 2 <= 3 = true").unwrap();
        let cmp = Expr::op2(
            Op2::Eq,
            Expr::op2(Op2::Leq, Expr::Num(2), Expr::Num(3)),
            Expr::Bln(true),
        );
        let expected = Expr::or(
            Expr::not(Expr::Bln(true)),
            Expr::and(Expr::op2(Op2::LT, Expr::Num(1), Expr::Num(2)), cmp),
        );
        assert_eq!(e, expected);
    }

    #[test]
    fn test_negation() {
        let e = parse("3 * ~4").unwrap();
        assert_eq!(e, Expr::op2(Op2::Mul, Expr::Num(3), Expr::neg(Expr::Num(4))));
    }

    #[test]
    fn test_let_with_annotation() {
        let e = parse("let v: int <- 21 in v + v end").unwrap();
        let expected = Expr::Let(
            Name::new("v"),
            Some(Type::Int),
            Box::new(Expr::Num(21)),
            Box::new(Expr::op2(Op2::Add, Expr::var("v"), Expr::var("v"))),
        );
        assert_eq!(e, expected);
    }

    #[test]
    fn test_if() {
        let e = parse("if 2 < 3 then 1 else 2").unwrap();
        let expected = Expr::if_(
            Expr::op2(Op2::LT, Expr::Num(2), Expr::Num(3)),
            Expr::Num(1),
            Expr::Num(2),
        );
        assert_eq!(e, expected);
    }

    #[test]
    fn test_fn_and_application() {
        let e = parse("(fn v: int => v + 1) 2").unwrap();
        let f = Expr::Fn(
            Name::new("v"),
            Some(Type::Int),
            Box::new(Expr::op2(Op2::Add, Expr::var("v"), Expr::Num(1))),
        );
        assert_eq!(e, Expr::app(f, Expr::Num(2)));
    }

    #[test]
    fn test_application_is_left_associative() {
        let e = parse("f x y").unwrap();
        let expected = Expr::app(Expr::app(Expr::var("f"), Expr::var("x")), Expr::var("y"));
        assert_eq!(e, expected);
    }

    #[test]
    fn test_arrow_type_is_right_associative() {
        let e = parse("fn f: int -> bool -> int => f").unwrap();
        let t = Type::Arrow(
            Box::new(Type::Int),
            Box::new(Type::Arrow(Box::new(Type::Bool), Box::new(Type::Int))),
        );
        assert_eq!(e, Expr::Fn(Name::new("f"), Some(t), Box::new(Expr::var("f"))));
    }

    #[test]
    fn test_parenthesized_arrow_type() {
        let e = parse("fn f: (int -> int) -> int => f 1").unwrap();
        match e {
            Expr::Fn(_, Some(Type::Arrow(a, _)), _) => {
                assert_eq!(*a, Type::Arrow(Box::new(Type::Int), Box::new(Type::Int)))
            }
            _ => panic!("unexpected parse {:?}", e),
        }
    }

    #[test]
    fn test_trailing_garbage() {
        assert!(parse("1 + 2 )").is_err());
    }

    #[test]
    fn test_number_too_large() {
        assert!(parse("99999999999").is_err());
    }
}
