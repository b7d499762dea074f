//! Recursive-descent parser.
//!
//! Consumes the full token stream and produces a [`NodeKind::Module`] node
//! whose children are top-level statements. Blocks are indentation-driven:
//! a body is either `:` followed by a single statement on the same line, or
//! the following lines at a column strictly greater than the introducer's,
//! aligned with each other. Expressions may continue across newlines after
//! an operator; a newline before an operator ends the expression.
//!
//! The precedence ladder, lowest to highest: assignment, range (`:`),
//! conditionals (`? :` and `?:`), `or`, `and`, equality, relational,
//! additive, multiplicative, null-coalesce (`??`), unary, then the postfix
//! chain (call, subscript, attribute, `as`).

use std::rc::Rc;

use crate::ast::{BinOp, Node, NodeKind, UnaryOp};
use crate::error::Error;
use crate::tokenize::{Token, TokenKind};

/// Binary levels below the conditionals, lowest first.
const BINARY_LEVELS: [&[(TokenKind, BinOp)]; 7] = [
    &[(TokenKind::Or, BinOp::Or)],
    &[(TokenKind::And, BinOp::And)],
    &[(TokenKind::Eq, BinOp::Eq), (TokenKind::NotEq, BinOp::NotEq)],
    &[
        (TokenKind::Less, BinOp::Less),
        (TokenKind::LessEq, BinOp::LessEq),
        (TokenKind::Greater, BinOp::Greater),
        (TokenKind::GreaterEq, BinOp::GreaterEq),
    ],
    &[(TokenKind::Add, BinOp::Add), (TokenKind::Sub, BinOp::Sub)],
    &[
        (TokenKind::Mul, BinOp::Mul),
        (TokenKind::Div, BinOp::Div),
        (TokenKind::IntDiv, BinOp::IntDiv),
        (TokenKind::Mod, BinOp::Mod),
    ],
    &[(TokenKind::Coalesce, BinOp::Coalesce)],
];

/// Parses a token stream into a module node.
///
/// The returned root spans the entire stream. Syntax errors are fatal and
/// positioned at the offending token.
pub fn parse(tokens: &[Token], filename: &str) -> Result<Rc<Node>, Error> {
    let mut parser = Parser {
        tokens,
        filename,
        pos: 0,
    };

    let mut root = Node::structural(NodeKind::Module, 0);
    loop {
        parser.skip_space();
        if parser.kind() == TokenKind::Eof {
            break;
        }
        if parser.is_terminator() {
            return Err(parser.unexpected("a statement"));
        }
        let column = parser.column();
        parser.parse_block_into(&mut root, column)?;
    }
    root.first_token = 0;
    root.last_token = tokens.len() - 1;
    Ok(Rc::new(root))
}

struct Parser<'a> {
    tokens: &'a [Token],
    filename: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn token(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn kind(&self) -> TokenKind {
        self.token().kind
    }

    fn column(&self) -> u32 {
        self.token().begin.column
    }

    fn line(&self) -> u32 {
        self.token().begin.line
    }

    fn bump(&mut self) -> usize {
        let idx = self.pos;
        self.pos += 1;
        idx
    }

    /// Skips whitespace and comments within the current line.
    fn skip_line_space(&mut self) {
        while self.kind().is_line_space() {
            self.pos += 1;
        }
    }

    /// Skips whitespace, comments and newlines.
    fn skip_space(&mut self) {
        while self.kind().is_space() {
            self.pos += 1;
        }
    }

    /// True at tokens that end a block or expression list.
    fn is_terminator(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Eof
                | TokenKind::RParen
                | TokenKind::RSquare
                | TokenKind::Comma
                | TokenKind::Else
        )
    }

    fn error_at(&self, token: usize, message: String) -> Error {
        Error::syntax(self.filename, self.tokens[token].begin, message)
    }

    fn error(&self, message: String) -> Error {
        self.error_at(self.pos, message)
    }

    fn unexpected(&self, expected: &str) -> Error {
        if self.kind() == TokenKind::Invalid {
            self.error(format!(
                "Unexpected character \"{}\"",
                self.token().kind.name()
            ))
        } else {
            self.error(format!(
                "Unexpected token \"{}\", expected {expected}",
                self.kind()
            ))
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<usize, Error> {
        if self.kind() == kind {
            Ok(self.bump())
        } else {
            Err(self.unexpected(&format!("\"{kind}\"")))
        }
    }

    // ------------------------------------------------------------------
    // Blocks and statements

    /// Parses statements at `indentation` into `parent` until a dedent or
    /// terminator. A run of lines indented deeper than `indentation` that
    /// does not belong to a statement body becomes a nested block child.
    fn parse_block_into(&mut self, parent: &mut Node, indentation: u32) -> Result<(), Error> {
        loop {
            let statement = self.parse_statement()?;
            parent.push(statement);

            self.skip_space();
            if self.column() > indentation && !self.is_terminator() {
                let column = self.column();
                let mut block = Node::structural(NodeKind::Block, self.pos);
                self.parse_block_into(&mut block, column)?;
                parent.push(finish_block(block));
                self.skip_space();
            }

            if self.is_terminator() || self.column() != indentation {
                return Ok(());
            }
        }
    }

    fn parse_statement(&mut self) -> Result<Rc<Node>, Error> {
        self.parse_assignment(true)
    }

    /// Assignment level: right-associative, validates the target.
    fn parse_assignment(&mut self, eat_tuple: bool) -> Result<Rc<Node>, Error> {
        let lhs = self.parse_expression(eat_tuple, false)?;
        self.skip_line_space();

        let kind = match self.kind() {
            TokenKind::Assign => NodeKind::Assign,
            TokenKind::AddAssign => NodeKind::AssignAdd,
            TokenKind::SubAssign => NodeKind::AssignSub,
            TokenKind::MulAssign => NodeKind::AssignMul,
            TokenKind::DivAssign => NodeKind::AssignDiv,
            TokenKind::IntDivAssign => NodeKind::AssignIntDiv,
            TokenKind::ModAssign => NodeKind::AssignMod,
            _ => return Ok(lhs),
        };
        let op_token = self.bump();

        if kind == NodeKind::Assign {
            if !is_assignment_target(&lhs, true) {
                return Err(
                    self.error_at(op_token, format!("Illegal assignment to \"{}\"", lhs.kind))
                );
            }
        } else if !is_assignment_target(&lhs, false) {
            return Err(self.error_at(
                op_token,
                format!("Illegal augmented assignment to \"{}\"", lhs.kind),
            ));
        }

        let rhs = self.parse_assignment(eat_tuple)?;
        let mut node = Node::wrapping(kind, lhs);
        node.token = Some(op_token);
        node.set_last(op_token);
        node.push(rhs);
        Ok(Rc::new(node))
    }

    // ------------------------------------------------------------------
    // Expressions

    /// Full expression: range level, `->` lambdas, optional bare tuples.
    ///
    /// With `header` set (loop targets, iterables and conditions) the range
    /// level is skipped so a trailing `:` introduces the statement body
    /// instead; parenthesized ranges still parse normally.
    fn parse_expression(&mut self, eat_tuple: bool, header: bool) -> Result<Rc<Node>, Error> {
        let mut node = self.parse_range(header)?;

        self.skip_line_space();
        if self.kind() == TokenKind::Arrow {
            node = self.parse_lambda(node)?;
        }

        if eat_tuple {
            self.skip_line_space();
            if self.kind() == TokenKind::Comma {
                let mut tuple = Node::wrapping(NodeKind::Tuple, node);
                tuple.set_last(self.bump());
                loop {
                    self.skip_line_space();
                    if !self.kind().starts_subexpression() {
                        break;
                    }
                    tuple.push(self.parse_expression(false, header)?);
                    self.skip_line_space();
                    if self.kind() == TokenKind::Comma {
                        tuple.set_last(self.bump());
                    } else {
                        break;
                    }
                }
                node = Rc::new(tuple);
            }
        }

        Ok(node)
    }

    /// `(params) -> expr` becomes an anonymous function whose body is a
    /// single return statement.
    fn parse_lambda(&mut self, params: Rc<Node>) -> Result<Rc<Node>, Error> {
        let arrow = self.bump();

        let params = if params.kind == NodeKind::Tuple {
            params
        } else {
            Rc::new(Node::wrapping(NodeKind::Tuple, params))
        };
        self.validate_parameters(&params)?;

        let mut ret = Node::new(NodeKind::Return, arrow);
        ret.push(self.parse_expression(false, false)?);

        let mut func = Node::new(NodeKind::Function, arrow);
        func.first_token = params.first_token;
        func.push(Rc::new(Node::structural(NodeKind::Invalid, arrow)));
        func.push(params);
        func.push(Rc::new(ret));
        Ok(Rc::new(func))
    }

    fn parse_range(&mut self, header: bool) -> Result<Rc<Node>, Error> {
        let mut node = self.parse_conditional()?;
        if header {
            return Ok(node);
        }

        self.skip_line_space();
        if self.kind() == TokenKind::Colon {
            let mut range = Node::wrapping(NodeKind::Range, node);
            range.set_last(self.bump());
            range.push(self.parse_conditional()?);
            self.skip_line_space();
            if self.kind() == TokenKind::Colon {
                range.set_last(self.bump());
                range.push(self.parse_conditional()?);
            }
            node = Rc::new(range);
        }
        Ok(node)
    }

    fn parse_conditional(&mut self) -> Result<Rc<Node>, Error> {
        let mut node = self.parse_binary(0)?;

        self.skip_line_space();
        if self.kind() == TokenKind::Question {
            let mut ternary = Node::wrapping(NodeKind::TernaryConditional, node);
            ternary.token = Some(self.pos);
            ternary.set_last(self.bump());
            ternary.push(self.parse_binary(0)?);
            self.skip_line_space();
            self.expect(TokenKind::Colon)?;
            ternary.push(self.parse_binary(0)?);
            node = Rc::new(ternary);
        } else if self.kind() == TokenKind::Elvis {
            let mut elvis = Node::wrapping(NodeKind::BinOp(BinOp::Conditional), node);
            elvis.token = Some(self.pos);
            elvis.set_last(self.bump());
            elvis.push(self.parse_binary(0)?);
            node = Rc::new(elvis);
        }
        Ok(node)
    }

    fn parse_binary(&mut self, level: usize) -> Result<Rc<Node>, Error> {
        let mut node = if level + 1 < BINARY_LEVELS.len() {
            self.parse_binary(level + 1)?
        } else {
            self.parse_subexpression()?
        };

        loop {
            self.skip_line_space();
            let Some(&(_, op)) = BINARY_LEVELS[level]
                .iter()
                .find(|(kind, _)| *kind == self.kind())
            else {
                return Ok(node);
            };

            let mut bin = Node::wrapping(NodeKind::BinOp(op), node);
            bin.token = Some(self.pos);
            bin.set_last(self.bump());
            let rhs = if level + 1 < BINARY_LEVELS.len() {
                self.parse_binary(level + 1)?
            } else {
                self.parse_subexpression()?
            };
            bin.push(rhs);
            node = Rc::new(bin);
        }
    }

    /// Literals, names, grouping, statement forms and the postfix chain.
    fn parse_subexpression(&mut self) -> Result<Rc<Node>, Error> {
        self.skip_space();
        let start = self.pos;

        let node = match self.kind() {
            TokenKind::Name => {
                self.bump();
                Node::new(NodeKind::Name, start)
            }
            TokenKind::Int => {
                self.bump();
                Node::new(NodeKind::Int, start)
            }
            TokenKind::Float => {
                self.bump();
                Node::new(NodeKind::Float, start)
            }
            TokenKind::Str => {
                self.bump();
                Node::new(NodeKind::Str, start)
            }
            TokenKind::Null => {
                self.bump();
                return Ok(Rc::new(Node::new(NodeKind::Null, start)));
            }
            TokenKind::Sub | TokenKind::Add | TokenKind::Not => {
                let op = match self.kind() {
                    TokenKind::Sub => UnaryOp::Neg,
                    TokenKind::Add => UnaryOp::Pos,
                    _ => UnaryOp::Not,
                };
                self.bump();
                let mut node = Node::new(NodeKind::UnaryOp(op), start);
                node.push(self.parse_subexpression()?);
                node
            }
            TokenKind::LParen => {
                self.bump();
                let mut tuple = Node::new(NodeKind::Tuple, start);
                let is_tuple = self.parse_expression_list(&mut tuple, TokenKind::RParen)?;
                if !is_tuple && tuple.children.len() == 1 {
                    // Plain grouping: unwrap, keeping the parenthesized span.
                    extract_single_child(tuple)
                } else {
                    tuple
                }
            }
            TokenKind::LSquare => {
                self.bump();
                let mut list = Node::new(NodeKind::List, start);
                self.parse_expression_list(&mut list, TokenKind::RSquare)?;
                list
            }
            TokenKind::LBrace => self.parse_map_literal(start)?,
            TokenKind::For => return self.parse_for(start),
            TokenKind::While => return self.parse_while(start),
            TokenKind::If => return self.parse_if(start),
            TokenKind::Proc | TokenKind::Func => return self.parse_function(start),
            TokenKind::Return | TokenKind::Emit | TokenKind::Break => {
                let kind = match self.kind() {
                    TokenKind::Return => NodeKind::Return,
                    TokenKind::Emit => NodeKind::Emit,
                    _ => NodeKind::Break,
                };
                self.bump();
                let mut node = Node::new(kind, start);
                self.skip_line_space();
                if !matches!(
                    self.kind(),
                    TokenKind::Eof
                        | TokenKind::Newline
                        | TokenKind::RParen
                        | TokenKind::RSquare
                        | TokenKind::Comma
                ) {
                    node.push(self.parse_expression(true, false)?);
                }
                return Ok(Rc::new(node));
            }
            TokenKind::Continue => {
                self.bump();
                return Ok(Rc::new(Node::new(NodeKind::Continue, start)));
            }
            TokenKind::Delete => {
                self.bump();
                let mut node = Node::new(NodeKind::Delete, start);
                node.push(self.parse_expression(true, false)?);
                return Ok(Rc::new(node));
            }
            TokenKind::Import | TokenKind::From => return self.parse_import(start),
            TokenKind::Assert => {
                self.bump();
                let mut node = Node::new(NodeKind::Assert, start);
                node.push(self.parse_expression(false, false)?);
                self.skip_line_space();
                if self.kind() == TokenKind::Comma {
                    self.bump();
                    node.push(self.parse_expression(false, false)?);
                }
                return Ok(Rc::new(node));
            }
            _ => return Err(self.unexpected("an expression")),
        };

        self.parse_postfix(Rc::new(node))
    }

    /// Postfix chain: call, subscript, attribute, `as name`.
    fn parse_postfix(&mut self, mut node: Rc<Node>) -> Result<Rc<Node>, Error> {
        loop {
            self.skip_line_space();
            match self.kind() {
                TokenKind::LParen => {
                    self.bump();
                    let mut call = Node::wrapping(NodeKind::Call, node);
                    self.parse_expression_list(&mut call, TokenKind::RParen)?;
                    node = Rc::new(call);
                }
                TokenKind::LSquare => {
                    self.bump();
                    let mut subscript = Node::wrapping(NodeKind::Subscript, node);
                    self.parse_expression_list(&mut subscript, TokenKind::RSquare)?;
                    node = Rc::new(subscript);
                }
                TokenKind::Dot => {
                    self.bump();
                    self.skip_line_space();
                    let mut attribute = Node::wrapping(NodeKind::Attribute, node);
                    let name = self.expect(TokenKind::Name)?;
                    attribute.push(Rc::new(Node::new(NodeKind::Name, name)));
                    node = Rc::new(attribute);
                }
                TokenKind::As => {
                    self.bump();
                    self.skip_line_space();
                    let mut alias = Node::wrapping(NodeKind::As, node);
                    let name = self.expect(TokenKind::Name)?;
                    alias.push(Rc::new(Node::new(NodeKind::Name, name)));
                    node = Rc::new(alias);
                }
                _ => return Ok(node),
            }
        }
    }

    /// Comma-separated expressions up to `end`. Returns whether the list
    /// was tuple-shaped (empty, or with a trailing or separating comma).
    fn parse_expression_list(&mut self, parent: &mut Node, end: TokenKind) -> Result<bool, Error> {
        let mut is_tuple = true;
        loop {
            self.skip_space();
            if self.kind() == end {
                parent.set_last(self.bump());
                return Ok(is_tuple);
            }
            if self.kind() == TokenKind::Eof {
                return Err(self.unexpected(&format!("\"{end}\"")));
            }

            is_tuple = false;
            parent.push(self.parse_assignment(false)?);

            self.skip_space();
            if self.kind() == end {
                parent.set_last(self.bump());
                return Ok(is_tuple);
            }
            if self.kind() != TokenKind::Comma {
                return Err(self.unexpected(&format!("\",\" or \"{end}\"")));
            }
            is_tuple = true;
            parent.set_last(self.bump());
        }
    }

    /// `{key: value, ...}` where keys are names or strings.
    fn parse_map_literal(&mut self, start: usize) -> Result<Node, Error> {
        self.bump();
        let mut map = Node::new(NodeKind::Map, start);
        loop {
            self.skip_space();
            if self.kind() == TokenKind::RBrace {
                map.set_last(self.bump());
                return Ok(map);
            }

            let key = match self.kind() {
                TokenKind::Name => Node::new(NodeKind::Name, self.bump()),
                TokenKind::Str => Node::new(NodeKind::Str, self.bump()),
                _ => return Err(self.unexpected("a map key")),
            };
            self.skip_line_space();
            self.expect(TokenKind::Colon)?;
            self.skip_space();
            let value = self.parse_expression(false, false)?;
            map.push(Rc::new(key));
            map.push(value);

            self.skip_space();
            if self.kind() == TokenKind::RBrace {
                map.set_last(self.bump());
                return Ok(map);
            }
            self.expect(TokenKind::Comma)?;
        }
    }

    // ------------------------------------------------------------------
    // Statement forms

    /// Body after a block introducer: `: statement` on the same line, or
    /// the following lines at a column strictly greater than the
    /// introducer's. Pushes at most one child onto `node`.
    fn parse_body(&mut self, node: &mut Node, intro: usize) -> Result<(), Error> {
        let intro_column = self.tokens[intro].begin.column;

        self.skip_line_space();
        if self.kind() == TokenKind::Colon {
            node.set_last(self.bump());
            self.skip_line_space();
            if !matches!(self.kind(), TokenKind::Newline | TokenKind::Eof) {
                node.push(self.parse_statement()?);
                return Ok(());
            }
        }

        self.skip_space();
        if self.is_terminator() {
            return Ok(());
        }
        if self.column() > intro_column {
            let column = self.column();
            let mut block = Node::structural(NodeKind::Block, self.pos);
            self.parse_block_into(&mut block, column)?;
            node.push(finish_block(block));
        }
        Ok(())
    }

    fn parse_for(&mut self, start: usize) -> Result<Rc<Node>, Error> {
        self.bump();
        let target = self.parse_expression(true, true)?;
        if !is_assignment_target(&target, true) {
            return Err(self.error_at(
                target.first_token,
                format!("Illegal loop target \"{}\"", target.kind),
            ));
        }
        self.skip_line_space();
        self.expect(TokenKind::In)?;
        let iterable = self.parse_expression(true, true)?;

        let mut node = Node::new(NodeKind::For, start);
        node.push(target);
        node.push(iterable);
        self.parse_body(&mut node, start)?;
        Ok(Rc::new(node))
    }

    fn parse_while(&mut self, start: usize) -> Result<Rc<Node>, Error> {
        self.bump();
        let condition = self.parse_expression(true, true)?;
        let mut node = Node::new(NodeKind::While, start);
        node.push(condition);
        self.parse_body(&mut node, start)?;
        Ok(Rc::new(node))
    }

    fn parse_if(&mut self, start: usize) -> Result<Rc<Node>, Error> {
        self.parse_if_anchored(start, start)
    }

    /// `anchor` is the token the chain aligns against and the body-column
    /// reference: the `if` itself, or for `else if` the preceding `else`.
    fn parse_if_anchored(&mut self, start: usize, anchor: usize) -> Result<Rc<Node>, Error> {
        self.bump();
        let condition = self.parse_expression(false, true)?;
        let mut node = Node::new(NodeKind::If, start);
        node.push(condition);
        self.parse_body(&mut node, anchor)?;

        // An else belongs to this `if` when it shares the anchor's column
        // or line.
        let save = self.pos;
        self.skip_space();
        if self.kind() != TokenKind::Else || !self.else_matches(anchor) {
            self.pos = save;
            return Ok(Rc::new(node));
        }

        let else_token = self.pos;
        node.set_last(self.bump());
        if node.children.len() == 1 {
            node.push(Rc::new(Node::structural(NodeKind::Nop, else_token)));
        }

        self.skip_line_space();
        if self.kind() == TokenKind::If {
            let nested_start = self.pos;
            node.push(self.parse_if_anchored(nested_start, else_token)?);
        } else {
            self.parse_body(&mut node, else_token)?;
            let save = self.pos;
            self.skip_space();
            if self.kind() == TokenKind::Else && self.else_matches(else_token) {
                return Err(self.error("Cannot have consecutive else".to_owned()));
            }
            self.pos = save;
        }
        Ok(Rc::new(node))
    }

    fn else_matches(&self, anchor: usize) -> bool {
        let anchor = self.tokens[anchor].begin;
        self.column() == anchor.column || self.line() == anchor.line
    }

    fn parse_function(&mut self, start: usize) -> Result<Rc<Node>, Error> {
        let kind = if self.kind() == TokenKind::Func {
            NodeKind::Function
        } else {
            NodeKind::Procedure
        };
        self.bump();
        self.skip_line_space();

        let mut node = Node::new(kind, start);

        if self.kind() == TokenKind::Name {
            let mut name = Rc::new(Node::new(NodeKind::Name, self.bump()));
            self.skip_line_space();
            while self.kind() == TokenKind::Dot {
                self.bump();
                self.skip_line_space();
                let attr = self.expect(TokenKind::Name)?;
                let mut attribute = Node::wrapping(NodeKind::Attribute, name);
                attribute.push(Rc::new(Node::new(NodeKind::Name, attr)));
                name = Rc::new(attribute);
                self.skip_line_space();
            }
            node.push(name);
        } else {
            node.push(Rc::new(Node::structural(NodeKind::Invalid, self.pos)));
        }

        self.skip_line_space();
        let lparen = self.expect(TokenKind::LParen)?;
        let mut params = Node::new(NodeKind::Tuple, lparen);
        self.parse_parameters(&mut params)?;
        let params = Rc::new(params);
        self.validate_parameters(&params)?;
        node.push(params);

        self.parse_body(&mut node, start)?;
        Ok(Rc::new(node))
    }

    /// Parameter list: `name`, `name: type`, `name = default`, combined.
    fn parse_parameters(&mut self, params: &mut Node) -> Result<(), Error> {
        loop {
            self.skip_space();
            if self.kind() == TokenKind::RParen {
                params.set_last(self.bump());
                return Ok(());
            }

            let name_token = self.expect(TokenKind::Name)?;
            let mut name = Node::new(NodeKind::Name, name_token);
            self.skip_line_space();
            if self.kind() == TokenKind::Colon {
                self.bump();
                name.push(self.parse_type()?);
                self.skip_line_space();
            }

            if self.kind() == TokenKind::Assign {
                let op_token = self.bump();
                let mut assign = Node::wrapping(NodeKind::Assign, Rc::new(name));
                assign.token = Some(op_token);
                assign.set_last(op_token);
                assign.push(self.parse_expression(false, false)?);
                params.push(Rc::new(assign));
            } else {
                params.push(Rc::new(name));
            }

            self.skip_space();
            if self.kind() == TokenKind::RParen {
                params.set_last(self.bump());
                return Ok(());
            }
            self.expect(TokenKind::Comma)?;
        }
    }

    /// Type annotation: `name`, `name<type, ...>`, optionally `?`-suffixed.
    fn parse_type(&mut self) -> Result<Rc<Node>, Error> {
        self.skip_line_space();
        let name_token = self.expect(TokenKind::Name)?;
        let mut ty = Node::new(NodeKind::Name, name_token);

        if self.kind() == TokenKind::Less {
            self.bump();
            loop {
                ty.push(self.parse_type()?);
                self.skip_space();
                if self.kind() == TokenKind::Greater {
                    ty.set_last(self.bump());
                    break;
                }
                self.expect(TokenKind::Comma)?;
            }
        }

        if self.kind() == TokenKind::Question {
            let mut optional = Node::wrapping(NodeKind::Optional, Rc::new(ty));
            optional.set_last(self.bump());
            return Ok(Rc::new(optional));
        }
        Ok(Rc::new(ty))
    }

    fn validate_parameters(&self, params: &Rc<Node>) -> Result<(), Error> {
        let mut default_seen = false;
        let mut names: Vec<&str> = Vec::new();

        for parameter in &params.children {
            let (name_node, has_default) = match parameter.kind {
                NodeKind::Assign => (parameter.child(0), true),
                NodeKind::Name => (parameter, false),
                _ => {
                    return Err(self.error_at(
                        parameter.first_token,
                        format!("Invalid parameter \"{}\"", parameter.kind),
                    ));
                }
            };
            let token = name_node.token.expect("parameter name without token");
            let name = self.tokens[token].payload.as_str();

            if names.contains(&name) {
                return Err(self.error_at(token, format!("Duplicate parameter \"{name}\"")));
            }
            names.push(name);

            if default_seen && !has_default {
                return Err(self.error_at(
                    token,
                    format!("Default argument missing for parameter \"{name}\""),
                ));
            }
            default_seen |= has_default;
        }
        Ok(())
    }

    /// `import a, b as c, ...` and `from a import x, y as z` / `import *`.
    fn parse_import(&mut self, start: usize) -> Result<Rc<Node>, Error> {
        if self.kind() == TokenKind::Import {
            self.bump();
            let mut node = Node::new(NodeKind::Import, start);
            self.parse_name_tuple(&mut node)?;
            if node.children.is_empty() {
                return Err(self.unexpected("a module name"));
            }
            self.validate_import_names(&node, 0)?;
            return Ok(Rc::new(node));
        }

        self.bump();
        let mut node = Node::new(NodeKind::ImportFrom, start);
        self.skip_line_space();
        let module = self.expect(TokenKind::Name)?;
        node.push(Rc::new(Node::new(NodeKind::Name, module)));

        self.skip_line_space();
        self.expect(TokenKind::Import)?;
        self.skip_line_space();

        if self.kind() == TokenKind::Mul {
            node.set_last(self.bump());
            return Ok(Rc::new(node));
        }

        self.parse_name_tuple(&mut node)?;
        if node.children.len() < 2 {
            return Err(self.unexpected("a name to import"));
        }
        self.validate_import_names(&node, 1)?;
        Ok(Rc::new(node))
    }

    fn parse_name_tuple(&mut self, node: &mut Node) -> Result<(), Error> {
        loop {
            self.skip_line_space();
            if !self.kind().starts_subexpression() {
                return Ok(());
            }
            node.push(self.parse_expression(false, false)?);
            self.skip_line_space();
            if self.kind() == TokenKind::Comma {
                node.set_last(self.bump());
            } else {
                return Ok(());
            }
        }
    }

    fn validate_import_names(&self, node: &Node, from: usize) -> Result<(), Error> {
        for child in &node.children[from..] {
            let valid = match child.kind {
                NodeKind::Name => true,
                NodeKind::As => {
                    child.children.len() == 2
                        && child.child(0).kind == NodeKind::Name
                        && child.child(1).kind == NodeKind::Name
                }
                _ => false,
            };
            if !valid {
                return Err(self.error_at(
                    child.first_token,
                    format!("Expected a name in import, received \"{}\"", child.kind),
                ));
            }
        }
        Ok(())
    }
}

/// A tuple target may nest; augmented targets may not be tuples.
fn is_assignment_target(node: &Node, allow_tuple: bool) -> bool {
    match node.kind {
        NodeKind::Name | NodeKind::Subscript | NodeKind::Attribute => true,
        NodeKind::Tuple if allow_tuple => node
            .children
            .iter()
            .all(|child| is_assignment_target(child, true)),
        _ => false,
    }
}

/// Unwraps a single-statement block to the statement itself.
fn finish_block(mut block: Node) -> Rc<Node> {
    if block.children.len() == 1 {
        block.children.pop().expect("block has one child")
    } else {
        Rc::new(block)
    }
}

/// Unwraps `(expr)` grouping, widening the inner span over the parens.
fn extract_single_child(mut tuple: Node) -> Node {
    let child = tuple.children.pop().expect("group has one child");
    let mut inner = Rc::try_unwrap(child).expect("grouped child is uniquely owned");
    inner.first_token = tuple.first_token;
    inner.last_token = tuple.last_token;
    inner
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenize::tokenize;

    fn parse_source(source: &str) -> Rc<Node> {
        let tokens = tokenize(source, "<test>").unwrap();
        parse(&tokens, "<test>").unwrap()
    }

    fn parse_error(source: &str) -> Error {
        let tokens = tokenize(source, "<test>").unwrap();
        parse(&tokens, "<test>").unwrap_err()
    }

    #[test]
    fn precedence_shapes_the_tree() {
        let root = parse_source("x = 1 + 2 * 3");
        let assign = root.child(0);
        assert_eq!(assign.kind, NodeKind::Assign);
        let sum = assign.child(1);
        assert_eq!(sum.kind, NodeKind::BinOp(BinOp::Add));
        assert_eq!(sum.child(1).kind, NodeKind::BinOp(BinOp::Mul));
    }

    #[test]
    fn coalesce_binds_tighter_than_multiplication() {
        let root = parse_source("x = a * b ?? c");
        let mul = root.child(0).child(1);
        assert_eq!(mul.kind, NodeKind::BinOp(BinOp::Mul));
        assert_eq!(mul.child(1).kind, NodeKind::BinOp(BinOp::Coalesce));
    }

    #[test]
    fn spans_cover_children() {
        let root = parse_source("total = f(1, 2) + [3, 4][0]");
        fn check(node: &Node) {
            for child in &node.children {
                assert!(node.first_token <= child.first_token);
                assert!(node.last_token >= child.last_token);
                check(child);
            }
        }
        check(&root);
    }

    #[test]
    fn module_spans_whole_stream() {
        let source = "a = 1\nb = 2\n";
        let tokens = tokenize(source, "<test>").unwrap();
        let root = parse(&tokens, "<test>").unwrap();
        assert_eq!(root.first_token, 0);
        assert_eq!(root.last_token, tokens.len() - 1);
    }

    #[test]
    fn lambda_becomes_anonymous_function() {
        let root = parse_source("add = (x, y) -> x + y");
        let func = root.child(0).child(1);
        assert_eq!(func.kind, NodeKind::Function);
        assert_eq!(func.child(0).kind, NodeKind::Invalid);
        assert_eq!(func.child(1).kind, NodeKind::Tuple);
        assert_eq!(func.child(1).children.len(), 2);
        assert_eq!(func.child(2).kind, NodeKind::Return);
    }

    #[test]
    fn single_parameter_lambda_needs_no_tuple() {
        let root = parse_source("inc = (x) -> x + 1");
        let func = root.child(0).child(1);
        assert_eq!(func.child(1).kind, NodeKind::Tuple);
        assert_eq!(func.child(1).children.len(), 1);
    }

    #[test]
    fn parallel_assignment_target_is_tuple() {
        let root = parse_source("a, b = 1, 2");
        let assign = root.child(0);
        assert_eq!(assign.child(0).kind, NodeKind::Tuple);
        assert_eq!(assign.child(1).kind, NodeKind::Tuple);
    }

    #[test]
    fn illegal_assignment_target_is_fatal() {
        let err = parse_error("1 + 2 = 3");
        assert!(err.to_string().contains("Illegal assignment"));
        let err = parse_error("a, b += 1");
        assert!(err.to_string().contains("Illegal augmented assignment"));
    }

    #[test]
    fn duplicate_parameter_is_fatal() {
        let err = parse_error("func f(a, a): return a");
        assert!(err.to_string().contains("Duplicate parameter \"a\""));
    }

    #[test]
    fn default_before_required_is_fatal() {
        let err = parse_error("func f(a = 1, b): return b");
        assert!(err.to_string().contains("Default argument missing"));
    }

    #[test]
    fn indented_block_belongs_to_loop() {
        let root = parse_source("for i in xs\n    f(i)\n    g(i)\nh()");
        let for_node = root.child(0);
        assert_eq!(for_node.kind, NodeKind::For);
        assert_eq!(for_node.children.len(), 3);
        assert_eq!(for_node.child(2).kind, NodeKind::Block);
        assert_eq!(root.children.len(), 2);
    }

    #[test]
    fn colon_body_on_same_line() {
        let root = parse_source("for i in xs: f(i)\ng()");
        let for_node = root.child(0);
        assert_eq!(for_node.children.len(), 3);
        assert_eq!(for_node.child(2).kind, NodeKind::Call);
        assert_eq!(root.children.len(), 2);
    }

    #[test]
    fn else_chain_nests() {
        let root = parse_source("if a: f()\nelse if b: g()\nelse: h()");
        let if_node = root.child(0);
        assert_eq!(if_node.kind, NodeKind::If);
        assert_eq!(if_node.children.len(), 3);
        let nested = if_node.child(2);
        assert_eq!(nested.kind, NodeKind::If);
        assert_eq!(nested.children.len(), 3);
    }

    #[test]
    fn subscript_range_has_range_index() {
        let root = parse_source("y = xs[1:3]");
        let subscript = root.child(0).child(1);
        assert_eq!(subscript.kind, NodeKind::Subscript);
        assert_eq!(subscript.child(1).kind, NodeKind::Range);
    }

    #[test]
    fn import_forms() {
        let root = parse_source("import geometry, math as m");
        let import = root.child(0);
        assert_eq!(import.kind, NodeKind::Import);
        assert_eq!(import.child(0).kind, NodeKind::Name);
        assert_eq!(import.child(1).kind, NodeKind::As);

        let root = parse_source("from shapes import cube, sphere as ball");
        let from = root.child(0);
        assert_eq!(from.kind, NodeKind::ImportFrom);
        assert_eq!(from.children.len(), 3);

        let root = parse_source("from shapes import *");
        assert_eq!(root.child(0).children.len(), 1);
    }

    #[test]
    fn typed_parameters_parse() {
        let root = parse_source("func f(x: int, xs: list<int>?): return x");
        let params = root.child(0).child(1);
        assert_eq!(params.children.len(), 2);
        assert_eq!(params.child(0).child(0).kind, NodeKind::Name);
        assert_eq!(params.child(1).child(0).kind, NodeKind::Optional);
    }

    #[test]
    fn invalid_character_is_positioned() {
        let err = parse_error("x = $");
        let text = err.to_string();
        assert!(text.contains("<test>:1:5"), "{text}");
    }
}
