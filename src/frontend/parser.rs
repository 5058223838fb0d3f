use thiserror::Error;
use tracing::debug;

use super::{
    SourceFile,
    ast::{
        Assign, Binary, BinaryOperatorKind, Block, Call, ClassDecl, ExprStmt, ExternFunction,
        Function, Identifier, IfStmt, IntLiteral, MemberAccess, Module, NodeId, NodeKind,
        Parameter, ReturnExpr, This, Tree, TypeExpr, Unary, UnaryOperatorKind, VarDecl,
    },
    intern::InternedSymbol,
    lexer::{Keyword, LexError, Lexer, Span, Token, TokenKind},
};
use crate::{
    error::FatalError,
    middle::desugar::{MethodSignature, create_class_method},
};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{message}")]
    Syntax { message: String, span: Span },
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl From<LexError> for ParseError {
    fn from(error: LexError) -> Self {
        ParseError::Syntax {
            message: error.message,
            span: error.span,
        }
    }
}

type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug)]
pub struct Parser<'source> {
    lexer: Lexer<'source>,
    tree: Tree,
}

/// Pieces of a function definition shared by free functions and methods
struct FunctionParts {
    name: InternedSymbol,
    params: Vec<NodeId>,
    return_type: Option<TypeExpr>,
    body: NodeId,
    span: Span,
}

impl<'source> Parser<'source> {
    pub fn parse_module(source_file: &'source SourceFile) -> ParseResult<Tree> {
        let mut parser = Self {
            lexer: Lexer::new(source_file),
            tree: Tree::new(),
        };

        let mut items = Vec::new();
        while parser.lexer.peek()?.is_some() {
            items.push(parser.parse_module_item()?);
        }

        let span = Span::new(0, source_file.contents.len());
        let root = parser.tree.add(NodeKind::Module(Module { items }), span);
        parser.tree.set_root(root);

        debug!(nodes = parser.tree.len(), "parsed module");

        Ok(parser.tree)
    }

    fn error<T>(&self, span: Span, message: impl Into<String>) -> ParseResult<T> {
        Err(ParseError::Syntax {
            message: message.into(),
            span,
        })
    }

    fn eof_span(&self) -> Span {
        Span::new(self.lexer.position(), self.lexer.position())
    }

    fn expect_peek(&mut self, expecting: &str) -> ParseResult<Token> {
        match self.lexer.peek()? {
            Some(token) => Ok(token),
            None => self.error(
                self.eof_span(),
                format!("Expected {expecting} but reached end of file"),
            ),
        }
    }

    fn expect_next(&mut self, expecting: &str) -> ParseResult<Token> {
        match self.lexer.next()? {
            Some(token) => Ok(token),
            None => self.error(
                self.eof_span(),
                format!("Expected {expecting} but reached end of file"),
            ),
        }
    }

    fn expect_next_to_be(&mut self, kind: TokenKind) -> ParseResult<Token> {
        let token = self.expect_next(&format!("{kind:?}"))?;

        if token.kind != kind {
            return self.error(
                token.span,
                format!(
                    "Expected {:?} but found {:?} ({})",
                    kind,
                    token.kind,
                    self.lexer.source().value_of_span(token.span)
                ),
            );
        }

        Ok(token)
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> ParseResult<Token> {
        self.expect_next_to_be(TokenKind::Keyword(keyword))
    }

    fn peek_is(&mut self, kind: TokenKind) -> ParseResult<bool> {
        Ok(self.lexer.peek()?.is_some_and(|token| token.kind == kind))
    }

    fn span_of(&self, id: NodeId) -> Span {
        self.tree.span(id)
    }

    fn parse_module_item(&mut self) -> ParseResult<NodeId> {
        let peeked = self.expect_peek("module item")?;

        match peeked.kind {
            TokenKind::Keyword(Keyword::Class) => self.parse_class(),
            TokenKind::Keyword(Keyword::Def) => {
                let parts = self.parse_function_parts()?;

                Ok(self.tree.add(
                    NodeKind::Function(Function {
                        name: parts.name,
                        params: parts.params,
                        return_type: parts.return_type,
                        body: parts.body,
                        ty: None,
                    }),
                    parts.span,
                ))
            }
            TokenKind::Keyword(Keyword::Extern) => self.parse_extern(),
            _ => self.error(
                peeked.span,
                format!(
                    "Expected class, function or extern in module but found: {} ({:?})",
                    self.lexer.source().value_of_span(peeked.span),
                    peeked.kind
                ),
            ),
        }
    }

    /// class Name { x: int; def method() {} }
    fn parse_class(&mut self) -> ParseResult<NodeId> {
        let class_keyword = self.expect_keyword(Keyword::Class)?;
        let (name, _) = self.parse_identifier()?;

        // The class node exists before its members so methods can bind to it
        let class = self.tree.add(
            NodeKind::ClassDecl(ClassDecl {
                name,
                members: Vec::new(),
                ty: None,
            }),
            class_keyword.span,
        );

        self.expect_next_to_be(TokenKind::OpenBrace)?;

        while !self.peek_is(TokenKind::CloseBrace)? {
            let member = if self.peek_is(TokenKind::Keyword(Keyword::Def))? {
                let parts = self.parse_function_parts()?;

                create_class_method(
                    &mut self.tree,
                    Some(class),
                    MethodSignature {
                        name: parts.name,
                        params: parts.params,
                        return_type: parts.return_type,
                        body: parts.body,
                        span: parts.span,
                    },
                )?
            } else {
                self.parse_field()?
            };

            self.tree.append_child(class, member)?;
        }

        let close_brace = self.expect_next_to_be(TokenKind::CloseBrace)?;
        self.tree.node_mut(class).span = class_keyword.span.to(close_brace.span);

        Ok(class)
    }

    // var x: int = 5;
    fn parse_field(&mut self) -> ParseResult<NodeId> {
        let start = self.expect_peek("field")?.span;
        if self.peek_is(TokenKind::Keyword(Keyword::Var))? {
            self.expect_keyword(Keyword::Var)?;
        }

        let (name, _) = self.parse_identifier()?;
        self.expect_next_to_be(TokenKind::Colon)?;
        let declared = self.parse_type()?;

        let initializer = if self.peek_is(TokenKind::Equals)? {
            self.expect_next_to_be(TokenKind::Equals)?;
            Some(self.parse_expression()?)
        } else {
            None
        };

        let semicolon = self.expect_next_to_be(TokenKind::Semicolon)?;

        Ok(self.tree.add(
            NodeKind::MemberVarDecl(VarDecl {
                name,
                declared: Some(declared),
                initializer,
                ty: None,
            }),
            start.to(semicolon.span),
        ))
    }

    /// def name(param: ty) -> return_type {}
    fn parse_function_parts(&mut self) -> ParseResult<FunctionParts> {
        let def_keyword = self.expect_keyword(Keyword::Def)?;
        let (name, _) = self.parse_identifier()?;
        let (params, _) = self.parse_parameter_list(false)?;
        let return_type = self.parse_return_type()?;
        let body = self.parse_block()?;

        Ok(FunctionParts {
            name,
            params,
            return_type,
            body,
            span: def_keyword.span.to(self.span_of(body)),
        })
    }

    /// extern def printf(format: int, ...) -> int;
    fn parse_extern(&mut self) -> ParseResult<NodeId> {
        let extern_keyword = self.expect_keyword(Keyword::Extern)?;
        self.expect_keyword(Keyword::Def)?;
        let (name, _) = self.parse_identifier()?;
        let (params, variadic) = self.parse_parameter_list(true)?;
        let return_type = self.parse_return_type()?;
        let semicolon = self.expect_next_to_be(TokenKind::Semicolon)?;

        Ok(self.tree.add(
            NodeKind::ExternFunction(ExternFunction {
                name,
                params,
                return_type,
                variadic,
                ty: None,
            }),
            extern_keyword.span.to(semicolon.span),
        ))
    }

    fn parse_return_type(&mut self) -> ParseResult<Option<TypeExpr>> {
        if self.peek_is(TokenKind::Arrow)? {
            self.expect_next_to_be(TokenKind::Arrow)?;
            Ok(Some(self.parse_type()?))
        } else {
            Ok(None)
        }
    }

    // (a: int, b: bool, ...)
    fn parse_parameter_list(&mut self, allow_variadic: bool) -> ParseResult<(Vec<NodeId>, bool)> {
        let mut parameters = Vec::new();
        let mut variadic = false;

        self.expect_next_to_be(TokenKind::OpenParen)?;

        if !self.peek_is(TokenKind::CloseParen)? {
            parameters.push(self.parse_parameter()?);

            while self.peek_is(TokenKind::Comma)? {
                self.expect_next_to_be(TokenKind::Comma)?;

                let peeked = self.expect_peek("parameter or ellipsis")?;
                if peeked.kind == TokenKind::Ellipsis {
                    if !allow_variadic {
                        return self.error(
                            peeked.span,
                            "Only extern functions may be variadic",
                        );
                    }

                    self.expect_next_to_be(TokenKind::Ellipsis)?;
                    variadic = true;
                    break;
                }

                parameters.push(self.parse_parameter()?);
            }
        }

        self.expect_next_to_be(TokenKind::CloseParen)?;

        Ok((parameters, variadic))
    }

    // argc: int
    fn parse_parameter(&mut self) -> ParseResult<NodeId> {
        let (name, name_span) = self.parse_identifier()?;
        self.expect_next_to_be(TokenKind::Colon)?;
        let declared = self.parse_type()?;

        let end = match &declared {
            TypeExpr::Named { span, .. } => *span,
            TypeExpr::Known(_) => name_span,
        };

        Ok(self.tree.add(
            NodeKind::Parameter(Parameter {
                name,
                declared,
                ty: None,
            }),
            name_span.to(end),
        ))
    }

    // main
    fn parse_identifier(&mut self) -> ParseResult<(InternedSymbol, Span)> {
        let token = self.expect_next_to_be(TokenKind::Identifier)?;

        Ok((
            InternedSymbol::new(self.lexer.source().value_of_span(token.span)),
            token.span,
        ))
    }

    // int, uint8, Point
    fn parse_type(&mut self) -> ParseResult<TypeExpr> {
        let (name, span) = self.parse_identifier()?;

        Ok(TypeExpr::Named { name, span })
    }

    // "{" ( statement )* "}"
    fn parse_block(&mut self) -> ParseResult<NodeId> {
        let open_brace = self.expect_next_to_be(TokenKind::OpenBrace)?;

        let mut statements = Vec::new();
        while !self.peek_is(TokenKind::CloseBrace)? {
            statements.push(self.parse_statement()?);
        }

        let close_brace = self.expect_next_to_be(TokenKind::CloseBrace)?;

        Ok(self.tree.add(
            NodeKind::Block(Block {
                statements,
                ..Default::default()
            }),
            open_brace.span.to(close_brace.span),
        ))
    }

    fn parse_statement(&mut self) -> ParseResult<NodeId> {
        let peeked = self.expect_peek("statement")?;

        match peeked.kind {
            TokenKind::Keyword(Keyword::Var) => self.parse_local(Keyword::Var),
            TokenKind::Keyword(Keyword::Const) => self.parse_local(Keyword::Const),
            TokenKind::Keyword(Keyword::Return) => self.parse_return(),
            TokenKind::Keyword(Keyword::If) => self.parse_if(Keyword::If),
            _ => {
                let expression = self.parse_expression()?;
                let semicolon = self.expect_next_to_be(TokenKind::Semicolon)?;

                Ok(self.tree.add(
                    NodeKind::ExprStmt(ExprStmt { expression }),
                    self.span_of(expression).to(semicolon.span),
                ))
            }
        }
    }

    // var a: int = 1; const b = 2;
    fn parse_local(&mut self, keyword: Keyword) -> ParseResult<NodeId> {
        let keyword_token = self.expect_keyword(keyword)?;
        let (name, _) = self.parse_identifier()?;

        let declared = if self.peek_is(TokenKind::Colon)? {
            self.expect_next_to_be(TokenKind::Colon)?;
            Some(self.parse_type()?)
        } else {
            None
        };

        let initializer = if keyword == Keyword::Const || self.peek_is(TokenKind::Equals)? {
            self.expect_next_to_be(TokenKind::Equals)?;
            Some(self.parse_expression()?)
        } else {
            None
        };

        let semicolon = self.expect_next_to_be(TokenKind::Semicolon)?;

        let var = VarDecl {
            name,
            declared,
            initializer,
            ty: None,
        };
        let kind = match keyword {
            Keyword::Const => NodeKind::ConstVarExpr(var),
            _ => NodeKind::VarDecl(var),
        };

        Ok(self.tree.add(kind, keyword_token.span.to(semicolon.span)))
    }

    fn parse_return(&mut self) -> ParseResult<NodeId> {
        let return_keyword = self.expect_keyword(Keyword::Return)?;

        let value = if self.peek_is(TokenKind::Semicolon)? {
            None
        } else {
            Some(self.parse_expression()?)
        };

        let semicolon = self.expect_next_to_be(TokenKind::Semicolon)?;

        Ok(self.tree.add(
            NodeKind::ReturnExpr(ReturnExpr { value }),
            return_keyword.span.to(semicolon.span),
        ))
    }

    /// "if" "(" expr ")" block ( "elif" "(" expr ")" block )* ( "else" block )?
    ///
    /// Each `elif` becomes an if statement nested in the else branch of the
    /// previous one.
    fn parse_if(&mut self, keyword: Keyword) -> ParseResult<NodeId> {
        let keyword_token = self.expect_keyword(keyword)?;

        self.expect_next_to_be(TokenKind::OpenParen)?;
        let condition = self.parse_expression()?;
        self.expect_next_to_be(TokenKind::CloseParen)?;
        let then_block = self.parse_block()?;

        let else_branch = if self.peek_is(TokenKind::Keyword(Keyword::Elif))? {
            Some(self.parse_if(Keyword::Elif)?)
        } else if self.peek_is(TokenKind::Keyword(Keyword::Else))? {
            self.expect_keyword(Keyword::Else)?;
            Some(self.parse_block()?)
        } else {
            None
        };

        let end = self.span_of(else_branch.unwrap_or(then_block));

        Ok(self.tree.add(
            NodeKind::IfStmt(IfStmt {
                condition,
                then_block,
                else_branch,
            }),
            keyword_token.span.to(end),
        ))
    }

    /// expression     -> assignment
    /// assignment     -> logical_or ( "=" assignment )?
    /// logical_or     -> logical_and ( "||" logical_and )*
    /// logical_and    -> comparison ( "&&" comparison )*
    /// comparison     -> term ( ( "!=" | "==" | "<" | "<=" | ">" | ">=" ) term )*
    /// term           -> factor ( ( "-" | "+" ) factor )*
    /// factor         -> unary ( ( "/" | "*" | "%" ) unary )*
    /// unary          -> ( "!" | "-" ) unary
    ///                   | postfix
    /// postfix        -> atom ( "(" arguments? ")" | "." IDENTIFIER )*
    /// atom           -> IDENTIFIER | NUMBER | BOOL | "this"
    ///                   | "(" expression ")"
    fn parse_expression(&mut self) -> ParseResult<NodeId> {
        self.parse_assignment_expression()
    }

    fn parse_assignment_expression(&mut self) -> ParseResult<NodeId> {
        let target = self.parse_logical_or_expression()?;

        if !self.peek_is(TokenKind::Equals)? {
            return Ok(target);
        }

        self.expect_next_to_be(TokenKind::Equals)?;
        let value = self.parse_assignment_expression()?;
        let span = self.span_of(target).to(self.span_of(value));

        Ok(self.tree.add(
            NodeKind::Assign(Assign {
                target,
                value,
                ty: None,
            }),
            span,
        ))
    }

    fn binary(&mut self, operator: BinaryOperatorKind, lhs: NodeId, rhs: NodeId) -> NodeId {
        let span = self.span_of(lhs).to(self.span_of(rhs));

        self.tree.add(
            NodeKind::Binary(Binary {
                operator,
                lhs,
                rhs,
                ty: None,
            }),
            span,
        )
    }

    fn parse_logical_or_expression(&mut self) -> ParseResult<NodeId> {
        let mut expression = self.parse_logical_and_expression()?;

        while self.peek_is(TokenKind::LogicalOr)? {
            self.expect_next_to_be(TokenKind::LogicalOr)?;
            let rhs = self.parse_logical_and_expression()?;

            expression = self.binary(BinaryOperatorKind::LogicalOr, expression, rhs);
        }

        Ok(expression)
    }

    fn parse_logical_and_expression(&mut self) -> ParseResult<NodeId> {
        let mut expression = self.parse_comparison_expression()?;

        while self.peek_is(TokenKind::LogicalAnd)? {
            self.expect_next_to_be(TokenKind::LogicalAnd)?;
            let rhs = self.parse_comparison_expression()?;

            expression = self.binary(BinaryOperatorKind::LogicalAnd, expression, rhs);
        }

        Ok(expression)
    }

    fn parse_comparison_expression(&mut self) -> ParseResult<NodeId> {
        let mut expression = self.parse_term_expression()?;

        while self
            .expect_peek("comparison operator or expression")?
            .kind
            .is_comparison_operator()
        {
            let operator = self.expect_next("comparison operator")?;
            let kind = match operator.kind {
                TokenKind::NotEquals => BinaryOperatorKind::NotEquals,
                TokenKind::DoubleEquals => BinaryOperatorKind::Equals,
                TokenKind::LessThan => BinaryOperatorKind::LessThan,
                TokenKind::LessThanOrEqualTo => BinaryOperatorKind::LessThanOrEqualTo,
                TokenKind::GreaterThan => BinaryOperatorKind::GreaterThan,
                _ => BinaryOperatorKind::GreaterThanOrEqualTo,
            };
            let rhs = self.parse_term_expression()?;

            expression = self.binary(kind, expression, rhs);
        }

        Ok(expression)
    }

    fn parse_term_expression(&mut self) -> ParseResult<NodeId> {
        let mut expression = self.parse_factor_expression()?;

        while self
            .expect_peek("term operator or expression")?
            .kind
            .is_term_operator()
        {
            let operator = self.expect_next("term operator")?;
            let kind = match operator.kind {
                TokenKind::Plus => BinaryOperatorKind::Add,
                _ => BinaryOperatorKind::Subtract,
            };
            let rhs = self.parse_factor_expression()?;

            expression = self.binary(kind, expression, rhs);
        }

        Ok(expression)
    }

    fn parse_factor_expression(&mut self) -> ParseResult<NodeId> {
        let mut expression = self.parse_unary_expression()?;

        while self
            .expect_peek("factor operator or expression")?
            .kind
            .is_factor_operator()
        {
            let operator = self.expect_next("factor operator")?;
            let kind = match operator.kind {
                TokenKind::Asterisk => BinaryOperatorKind::Multiply,
                TokenKind::Divide => BinaryOperatorKind::Divide,
                _ => BinaryOperatorKind::Modulus,
            };
            let rhs = self.parse_unary_expression()?;

            expression = self.binary(kind, expression, rhs);
        }

        Ok(expression)
    }

    fn parse_unary_expression(&mut self) -> ParseResult<NodeId> {
        let peeked = self.expect_peek("unary operator or expression")?;

        let operator = match peeked.kind {
            TokenKind::Bang => UnaryOperatorKind::LogicalNot,
            TokenKind::Minus => UnaryOperatorKind::Negate,
            _ => return self.parse_postfix_expression(),
        };

        self.expect_next("unary operator")?;
        let operand = self.parse_unary_expression()?;

        Ok(self.tree.add(
            NodeKind::Unary(Unary {
                operator,
                operand,
                ty: None,
            }),
            peeked.span.to(self.span_of(operand)),
        ))
    }

    fn parse_postfix_expression(&mut self) -> ParseResult<NodeId> {
        let mut expression = self.parse_atomic_expression()?;

        loop {
            if self.peek_is(TokenKind::OpenParen)? {
                self.expect_next_to_be(TokenKind::OpenParen)?;

                let mut arguments = Vec::new();
                if !self.peek_is(TokenKind::CloseParen)? {
                    arguments.push(self.parse_expression()?);

                    while self.peek_is(TokenKind::Comma)? {
                        self.expect_next_to_be(TokenKind::Comma)?;
                        arguments.push(self.parse_expression()?);
                    }
                }

                let close_paren = self.expect_next_to_be(TokenKind::CloseParen)?;
                let span = self.span_of(expression).to(close_paren.span);

                expression = self.tree.add(
                    NodeKind::Call(Call {
                        callee: expression,
                        arguments,
                        target: None,
                        ty: None,
                    }),
                    span,
                );
            } else if self.peek_is(TokenKind::Dot)? {
                self.expect_next_to_be(TokenKind::Dot)?;
                let (member, member_span) = self.parse_identifier()?;
                let span = self.span_of(expression).to(member_span);

                expression = self.tree.add(
                    NodeKind::MemberAccess(MemberAccess {
                        target: expression,
                        member,
                        member_span,
                        resolved_member: None,
                        ty: None,
                    }),
                    span,
                );
            } else {
                return Ok(expression);
            }
        }
    }

    fn parse_atomic_expression(&mut self) -> ParseResult<NodeId> {
        let token = self.expect_next("expression")?;

        let kind = match token.kind {
            TokenKind::IntegerLiteral(literal) => NodeKind::IntLiteral(IntLiteral {
                value: literal.value,
                kind: literal.kind,
            }),
            TokenKind::BooleanLiteral => {
                NodeKind::BoolLiteral(self.lexer.source().value_of_span(token.span) == "true")
            }
            TokenKind::Identifier => NodeKind::Identifier(Identifier {
                name: InternedSymbol::new(self.lexer.source().value_of_span(token.span)),
                binding: None,
                ty: None,
            }),
            TokenKind::Keyword(Keyword::This) => NodeKind::This(This::default()),
            TokenKind::OpenParen => {
                let expression = self.parse_expression()?;
                let close_paren = self.expect_next_to_be(TokenKind::CloseParen)?;
                self.tree.node_mut(expression).span = token.span.to(close_paren.span);

                return Ok(expression);
            }
            _ => {
                return self.error(
                    token.span,
                    format!(
                        "Expected expression but found {:?} ({})",
                        token.kind,
                        self.lexer.source().value_of_span(token.span)
                    ),
                );
            }
        };

        Ok(self.tree.add(kind, token.span))
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    fn parse(source: &str) -> Tree {
        let source = SourceFile::memory(source);
        Parser::parse_module(&source).unwrap()
    }

    fn items(tree: &Tree) -> Vec<NodeId> {
        let root = tree.root().unwrap();
        let NodeKind::Module(module) = tree.kind(root) else {
            unreachable!()
        };
        module.items.clone()
    }

    #[test]
    fn class_with_fields_and_method() {
        let tree = parse(indoc! {"
            class Point {
                x: int;
                var y: int = 3;

                def getX() -> int {
                    return x;
                }
            }
        "});

        let items = items(&tree);
        assert_eq!(items.len(), 1);

        let NodeKind::ClassDecl(class) = tree.kind(items[0]) else {
            panic!("expected a class");
        };
        assert_eq!(class.name.value(), "Point");
        assert_eq!(class.members.len(), 3);
        assert!(matches!(tree.kind(class.members[0]), NodeKind::MemberVarDecl(_)));

        let NodeKind::ClassMethod(method) = tree.kind(class.members[2]) else {
            panic!("expected a method");
        };
        assert_eq!(method.class, items[0]);
        assert_eq!(method.function.params, vec![method.this_param]);
        assert_eq!(tree.parent(class.members[2]), Some(items[0]));
        assert!(tree.is_consistent());
    }

    #[test]
    fn extern_functions_may_be_variadic() {
        let tree = parse("extern def printf(format: int, ...) -> int;");

        let NodeKind::ExternFunction(function) = tree.kind(items(&tree)[0]) else {
            panic!("expected an extern");
        };
        assert!(function.variadic);
        assert_eq!(function.params.len(), 1);
    }

    #[test]
    fn only_externs_are_variadic() {
        let source = SourceFile::memory("def f(a: int, ...) {}");

        assert!(matches!(
            Parser::parse_module(&source),
            Err(ParseError::Syntax { .. })
        ));
    }

    #[test]
    fn factors_bind_tighter_than_terms() {
        let tree = parse("def f() -> int { return 1 + 2 * 3; }");

        let ret = tree
            .preorder(tree.root().unwrap())
            .into_iter()
            .find(|id| matches!(tree.kind(*id), NodeKind::ReturnExpr(_)))
            .unwrap();
        let NodeKind::ReturnExpr(ReturnExpr { value: Some(value) }) = tree.kind(ret) else {
            unreachable!()
        };
        let NodeKind::Binary(sum) = tree.kind(*value) else {
            panic!("expected a binary expression");
        };
        assert_eq!(sum.operator, BinaryOperatorKind::Add);
        assert!(matches!(
            tree.kind(sum.rhs),
            NodeKind::Binary(Binary {
                operator: BinaryOperatorKind::Multiply,
                ..
            })
        ));
    }

    #[test]
    fn elif_nests_in_else_branch() {
        let tree = parse(indoc! {"
            def f(a: int) -> int {
                if (a == 1) { return 1; } elif (a == 2) { return 2; } else { return 3; }
            }
        "});

        let ifs: Vec<_> = tree
            .preorder(tree.root().unwrap())
            .into_iter()
            .filter(|id| matches!(tree.kind(*id), NodeKind::IfStmt(_)))
            .collect();
        assert_eq!(ifs.len(), 2);

        let NodeKind::IfStmt(outer) = tree.kind(ifs[0]) else {
            unreachable!()
        };
        assert_eq!(outer.else_branch, Some(ifs[1]));

        let NodeKind::IfStmt(inner) = tree.kind(ifs[1]) else {
            unreachable!()
        };
        assert!(matches!(
            inner.else_branch.map(|id| tree.kind(id)),
            Some(NodeKind::Block(_))
        ));
    }

    #[test]
    fn postfix_chains() {
        let tree = parse("def f() { p.move(1).x = 2; }");

        let assign = tree
            .preorder(tree.root().unwrap())
            .into_iter()
            .find(|id| matches!(tree.kind(*id), NodeKind::Assign(_)))
            .unwrap();
        let NodeKind::Assign(assign) = tree.kind(assign) else {
            unreachable!()
        };
        let NodeKind::MemberAccess(access) = tree.kind(assign.target) else {
            panic!("expected a member access");
        };
        assert_eq!(access.member.value(), "x");
        assert!(matches!(tree.kind(access.target), NodeKind::Call(_)));
    }

    #[test]
    fn missing_semicolon_is_a_syntax_error() {
        let source = SourceFile::memory("def f() { return 1 }");

        let Err(ParseError::Syntax { message, span }) = Parser::parse_module(&source) else {
            panic!("expected a syntax error");
        };
        assert!(message.contains("Semicolon"));
        assert_eq!(span, Span::new(19, 20));
    }

    #[test]
    fn constants_require_an_initializer() {
        let source = SourceFile::memory("def f() { const a: int; }");

        assert!(Parser::parse_module(&source).is_err());
    }
}
