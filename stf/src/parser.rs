// Copyright 2024 Oxide Computer Company

//! A recursive descent parser for STF scenarios.

use crate::ast::{
    ActionArg, ActionCall, Comparison, CounterCheck, CounterCondition,
    CounterIndex, CounterUnit, Located, Match, MatchValue, PacketData,
    QualifiedName, Scenario, Segment, SetDefault, Statement, TableAdd,
};
use crate::error::{Error, ParserError};
use crate::lexer::{Kind, Lexer, Token};
use crate::number::Number;

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    backlog: Vec<Token>,
}

impl<'a> Parser<'a> {
    pub fn new(lexer: Lexer<'a>) -> Self {
        Parser {
            lexer,
            backlog: Vec::new(),
        }
    }

    /// Parse the whole input. Errors do not stop the parse: each one is
    /// recorded and parsing resumes at the next line.
    pub fn run(&mut self) -> Scenario {
        let mut scenario = Scenario::default();
        loop {
            let token = match self.next_token() {
                Ok(token) => token,
                Err(e) => {
                    self.recover(e, &mut scenario);
                    continue;
                }
            };
            match token.kind {
                Kind::Eof => break,
                Kind::Newline => continue,
                _ => {}
            }
            match self.parse_statement(&token) {
                Ok(item) => scenario.statements.push(Located { item, token }),
                Err(e) => self.recover(e, &mut scenario),
            }
        }
        scenario
    }

    fn recover(&mut self, e: Error, scenario: &mut Scenario) {
        scenario.errors.push(e);
        self.backlog.clear();
        if !self.lexer.at_line_start() {
            self.lexer.skip_line();
        }
    }

    pub fn next_token(&mut self) -> Result<Token, Error> {
        match self.backlog.pop() {
            Some(token) => Ok(token),
            None => Ok(self.lexer.next()?),
        }
    }

    fn error(&self, token: &Token, message: String) -> Error {
        ParserError {
            at: token.clone(),
            message,
            source: self
                .lexer
                .lines
                .get(token.line)
                .copied()
                .unwrap_or("")
                .into(),
        }
        .into()
    }

    fn expect_token(&mut self, expected: Kind) -> Result<Token, Error> {
        let token = self.next_token()?;
        if token.kind != expected {
            return Err(self.error(
                &token,
                format!("Found {} expected '{}'.", token.kind, expected),
            ));
        }
        Ok(token)
    }

    /// Every statement occupies exactly one line.
    fn expect_end(&mut self) -> Result<(), Error> {
        let token = self.next_token()?;
        match token.kind {
            Kind::Newline => Ok(()),
            Kind::Eof => {
                self.backlog.push(token);
                Ok(())
            }
            _ => Err(self.error(
                &token,
                format!("Found {} expected end of line.", token.kind),
            )),
        }
    }

    fn parse_statement(&mut self, token: &Token) -> Result<Statement, Error> {
        let statement = match &token.kind {
            Kind::Add => Statement::Add(self.parse_table_add()?),
            Kind::SetDefault => {
                let table = self.parse_name()?;
                let action = self.parse_action_call()?;
                Statement::SetDefault(SetDefault { table, action })
            }
            Kind::Remove => {
                let t = self.next_token()?;
                match &t.kind {
                    Kind::Identifier(s) if s == "all" => Statement::RemoveAll,
                    _ => {
                        return Err(self.error(
                            &t,
                            format!(
                                "Found {}, only 'remove all' is supported.",
                                t.kind
                            ),
                        ))
                    }
                }
            }
            Kind::Expect => self.parse_expect()?,
            Kind::NoPacket => Statement::NoPacket,
            Kind::Packet => {
                let port = self.parse_port()?;
                let data = self.parse_packet_data()?;
                Statement::Packet(port, data)
            }
            Kind::Wait => Statement::Wait,
            Kind::CheckCounter => {
                Statement::CheckCounter(self.parse_counter_check()?)
            }
            Kind::Directive(d) => {
                let args = match self.lexer.rest_of_line().kind {
                    Kind::Data(s) => s,
                    _ => String::new(),
                };
                Statement::Direct(*d, args)
            }
            _ => {
                return Err(self.error(
                    token,
                    format!("Found {} expected a statement.", token.kind),
                ))
            }
        };
        self.expect_end()?;
        Ok(statement)
    }

    fn parse_table_add(&mut self) -> Result<TableAdd, Error> {
        let table = self.parse_name()?;

        let token = self.next_token()?;
        let priority = match &token.kind {
            Kind::Number(n) => Some(self.number_u32(n, &token)?),
            _ => {
                self.backlog.push(token);
                None
            }
        };

        let mut matches = Vec::new();
        let action = loop {
            let name = self.parse_name()?;
            let token = self.next_token()?;
            match token.kind {
                Kind::Colon => matches.push(Match {
                    field: name,
                    value: self.parse_match_value()?,
                }),
                Kind::ParenOpen => {
                    break ActionCall {
                        name,
                        args: self.parse_action_args()?,
                    }
                }
                _ => {
                    return Err(self.error(
                        &token,
                        format!("Found {} expected ':' or '('.", token.kind),
                    ))
                }
            }
        };

        let token = self.next_token()?;
        let id = match token.kind {
            Kind::Equals => {
                let t = self.next_token()?;
                match t.kind {
                    Kind::Identifier(s) => Some(s),
                    Kind::Number(n) => Some(n.to_string()),
                    _ => {
                        return Err(self.error(
                            &t,
                            format!("Found {} expected entry id.", t.kind),
                        ))
                    }
                }
            }
            _ => {
                self.backlog.push(token);
                None
            }
        };

        Ok(TableAdd {
            table,
            priority,
            matches,
            action,
            id,
        })
    }

    fn parse_identifier(&mut self) -> Result<(String, Token), Error> {
        let token = self.next_token()?;
        match &token.kind {
            Kind::Identifier(name) => Ok((name.clone(), token)),
            _ => Err(self.error(
                &token,
                format!("Found {} expected identifier.", token.kind),
            )),
        }
    }

    fn parse_number(&mut self) -> Result<(Number, Token), Error> {
        let token = self.next_token()?;
        match &token.kind {
            Kind::Number(n) => Ok((n.clone(), token)),
            _ => Err(self.error(
                &token,
                format!("Found {} expected numeric literal.", token.kind),
            )),
        }
    }

    fn number_u32(&self, n: &Number, token: &Token) -> Result<u32, Error> {
        n.to_u32().ok_or_else(|| {
            self.error(token, format!("{} is not a 32 bit integer.", n))
        })
    }

    fn number_u64(&self, n: &Number, token: &Token) -> Result<u64, Error> {
        n.to_u64().ok_or_else(|| {
            self.error(token, format!("{} is not a 64 bit integer.", n))
        })
    }

    /// Parse a dotted name whose components may carry a `[index]`
    /// subscript.
    pub fn parse_name(&mut self) -> Result<QualifiedName, Error> {
        let mut segments = Vec::new();
        loop {
            let (name, _) = self.parse_identifier()?;
            let mut segment = Segment { name, index: None };
            let mut token = self.next_token()?;
            if token.kind == Kind::SquareOpen {
                let (n, t) = self.parse_number()?;
                segment.index = Some(self.number_u64(&n, &t)?);
                self.expect_token(Kind::SquareClose)?;
                token = self.next_token()?;
            }
            segments.push(segment);
            if token.kind != Kind::Dot {
                self.backlog.push(token);
                break;
            }
        }
        Ok(QualifiedName { segments })
    }

    fn parse_match_value(&mut self) -> Result<MatchValue, Error> {
        let (value, _) = self.parse_number()?;
        let token = self.next_token()?;
        Ok(match token.kind {
            Kind::Forwardslash => {
                let (n, t) = self.parse_number()?;
                MatchValue::Prefix(value, self.number_u32(&n, &t)?)
            }
            Kind::Mask => MatchValue::Masked(value, self.parse_number()?.0),
            Kind::DotDot => MatchValue::Range(value, self.parse_number()?.0),
            _ => {
                self.backlog.push(token);
                MatchValue::Number(value)
            }
        })
    }

    fn parse_action_call(&mut self) -> Result<ActionCall, Error> {
        let name = self.parse_name()?;
        self.expect_token(Kind::ParenOpen)?;
        let args = self.parse_action_args()?;
        Ok(ActionCall { name, args })
    }

    /// Parse `name:value` pairs up to and including the closing paren.
    fn parse_action_args(&mut self) -> Result<Vec<ActionArg>, Error> {
        let mut args = Vec::new();
        let token = self.next_token()?;
        if token.kind == Kind::ParenClose {
            return Ok(args);
        }
        self.backlog.push(token);
        loop {
            let (name, _) = self.parse_identifier()?;
            self.expect_token(Kind::Colon)?;
            let (value, _) = self.parse_number()?;
            args.push(ActionArg { name, value });
            let token = self.next_token()?;
            match token.kind {
                Kind::Comma => continue,
                Kind::ParenClose => break,
                _ => {
                    return Err(self.error(
                        &token,
                        format!("Found {} expected ',' or ')'.", token.kind),
                    ))
                }
            }
        }
        Ok(args)
    }

    fn parse_port(&mut self) -> Result<u32, Error> {
        let (n, t) = self.parse_number()?;
        self.number_u32(&n, &t)
    }

    fn parse_expect(&mut self) -> Result<Statement, Error> {
        let token = self.next_token()?;
        let port = match &token.kind {
            Kind::Number(n) => self.number_u32(n, &token)?,
            // a bare expect asserts nothing
            Kind::Newline | Kind::Eof => {
                self.backlog.push(token);
                return Ok(Statement::NoPacket);
            }
            _ => {
                return Err(self.error(
                    &token,
                    format!("Found {} expected port number.", token.kind),
                ))
            }
        };
        let token = self.lexer.rest_of_line();
        let text = match &token.kind {
            Kind::Data(s) => s.as_str(),
            _ => "",
        };
        if text.is_empty() {
            return Ok(Statement::Expect(port, None));
        }
        let data = PacketData::parse(text).map_err(|e| self.error(&token, e))?;
        Ok(Statement::Expect(port, Some(data)))
    }

    fn parse_packet_data(&mut self) -> Result<PacketData, Error> {
        let token = self.lexer.rest_of_line();
        let text = match &token.kind {
            Kind::Data(s) => s.as_str(),
            _ => "",
        };
        if text.is_empty() {
            return Err(self.error(&token, "Packet data missing.".into()));
        }
        let data = PacketData::parse(text).map_err(|e| self.error(&token, e))?;
        if data.exact {
            return Err(
                self.error(&token, "'$' is only meaningful in expect.".into())
            );
        }
        data.to_bytes().map_err(|e| self.error(&token, e))?;
        Ok(data)
    }

    fn parse_counter_check(&mut self) -> Result<CounterCheck, Error> {
        let counter = self.parse_name()?;
        self.expect_token(Kind::ParenOpen)?;
        let token = self.next_token()?;
        let index = match &token.kind {
            Kind::Number(n) => CounterIndex::Number(self.number_u64(n, &token)?),
            Kind::Identifier(s) => CounterIndex::Name(s.clone()),
            _ => {
                return Err(self.error(
                    &token,
                    format!("Found {} expected counter index.", token.kind),
                ))
            }
        };
        self.expect_token(Kind::ParenClose)?;

        let token = self.next_token()?;
        let unit = match &token.kind {
            Kind::Identifier(s) if s == "packets" => CounterUnit::Packets,
            Kind::Identifier(s) if s == "bytes" => CounterUnit::Bytes,
            _ => {
                self.backlog.push(token);
                return Ok(CounterCheck {
                    counter,
                    index,
                    condition: None,
                });
            }
        };

        let token = self.next_token()?;
        let comparison = match token.kind {
            Kind::DoubleEquals => Comparison::Eq,
            Kind::NotEquals => Comparison::Ne,
            Kind::AngleOpen => Comparison::Lt,
            Kind::LessThanEquals => Comparison::Le,
            Kind::AngleClose => Comparison::Gt,
            Kind::GreaterThanEquals => Comparison::Ge,
            _ => {
                return Err(self.error(
                    &token,
                    format!("Found {} expected comparison.", token.kind),
                ))
            }
        };
        let (n, t) = self.parse_number()?;
        let value = self.number_u64(&n, &t)?;

        Ok(CounterCheck {
            counter,
            index,
            condition: Some(CounterCondition {
                unit,
                comparison,
                value,
            }),
        })
    }
}
