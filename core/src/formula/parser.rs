//! Parser for the text notation of operations, e.g.
//! `subtract(add(base, bonus), percent(base, tax_rate))`.

use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::{map, map_res, recognize},
    multi::separated_list0,
    number::complete::recognize_float,
    sequence::{delimited, pair},
    IResult, Parser,
};

use crate::error::FormulaError;
use crate::formula::ast::{Operand, Operation, OperatorTag};

/// Syntax tree before operator names are resolved.
enum Node<'a> {
    Call { name: &'a str, args: Vec<Node<'a>> },
    Number(f64),
    Name(String),
}

impl Node<'_> {
    fn into_operand(self) -> Result<Operand, FormulaError> {
        match self {
            Node::Number(n) => Ok(Operand::Number(n)),
            Node::Name(name) => Ok(Operand::Name(name)),
            call @ Node::Call { .. } => Ok(Operand::nested(call.into_operation()?)),
        }
    }

    fn into_operation(self) -> Result<Operation, FormulaError> {
        match self {
            Node::Call { name, args } => {
                let operator = OperatorTag::from_name(name)
                    .ok_or_else(|| FormulaError::UnknownOperator(name.to_string()))?;
                let parameters = args
                    .into_iter()
                    .map(Node::into_operand)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Operation::new(operator, parameters))
            }
            _ => Err(FormulaError::ParseError {
                position: 0,
                message: "expected an operation such as `add(a, b)`".to_string(),
            }),
        }
    }
}

/// Parse the text notation of an operation.
pub fn parse(input: &str) -> Result<Operation, FormulaError> {
    parse_node(input)?.into_operation()
}

/// Parse a single operand: a number, a name or an operation.
pub fn parse_operand(input: &str) -> Result<Operand, FormulaError> {
    parse_node(input)?.into_operand()
}

fn parse_node(input: &str) -> Result<Node<'_>, FormulaError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(FormulaError::EmptyExpression);
    }

    match node(input) {
        Ok((remaining, node)) => {
            let remaining = remaining.trim();
            if remaining.is_empty() {
                Ok(node)
            } else {
                Err(FormulaError::ParseError {
                    position: input.len() - remaining.len(),
                    message: format!("unexpected characters: '{}'", remaining),
                })
            }
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(FormulaError::ParseError {
            position: input.len() - e.input.len(),
            message: format!("unexpected input near '{}'", e.input),
        }),
        Err(nom::Err::Incomplete(_)) => Err(FormulaError::ParseError {
            position: input.len(),
            message: "unexpected end of input".to_string(),
        }),
    }
}

fn ws<'a, F, O>(inner: F) -> impl Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>
where
    F: Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>,
{
    delimited(multispace0, inner, multispace0)
}

fn node(input: &str) -> IResult<&str, Node<'_>> {
    ws(alt((call, number, quoted_name, name))).parse(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))
    .parse(input)
}

fn call(input: &str) -> IResult<&str, Node<'_>> {
    let (input, name) = identifier(input)?;

    // The opening parenthesis may follow the name after whitespace.
    let (input, _) = multispace0(input)?;
    let (input, _) = char('(').parse(input)?;

    let (input, args) = separated_list0(ws(char(',')), node).parse(input)?;

    let (input, _) = multispace0(input)?;
    let (input, _) = char(')').parse(input)?;

    Ok((input, Node::Call { name, args }))
}

fn number(input: &str) -> IResult<&str, Node<'_>> {
    map(map_res(recognize_float, str::parse::<f64>), Node::Number).parse(input)
}

fn quoted_name(input: &str) -> IResult<&str, Node<'_>> {
    map(
        delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
        |s: &str| Node::Name(s.to_string()),
    )
    .parse(input)
}

fn name(input: &str) -> IResult<&str, Node<'_>> {
    map(identifier, |s: &str| Node::Name(s.to_string())).parse(input)
}
