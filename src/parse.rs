//! Análisis sintáctico.
//!
//! Un parser descendente recursivo construye el árbol a partir del
//! vector de tokens del lexer. Durante el descenso se puebla la
//! [`SymbolTable`]: cada declaración se inserta al encontrarla y
//! toda referencia a un símbolo se valida contra lo ya declarado,
//! por lo que el lenguaje exige declarar antes de usar. Los `goto`
//! son la excepción: pueden referir a estados posteriores y se
//! validan después con [`Unit::fix`].
//!
//! El único punto del lenguaje que requiere retroceso es el inicio
//! de una condición, donde `(` puede abrir tanto una comparación
//! (`(x + 1) == 2`) como una condición agrupada (`(a == b && ...)`).
//! El parser intenta la comparación y restaura el cursor si falla.

use std::rc::Rc;

use thiserror::Error;

use crate::ast::{
    Automaton, Binop, Comp, Cond, Decl, Expr, Name, SemanticError, State, Stmt, SymbolTable, Unit,
    Unop, When,
};
use crate::lex::{Keyword, Token};
use crate::source::{Located, Pos};

/// Error de análisis sintáctico.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    /// Se esperaba un token específico.
    #[error("expected {0}, found {1}")]
    Expected(Token, Token),

    /// Se esperaba una clase de constructo.
    #[error("expected {0}, found {1}")]
    ExpectedDesc(&'static str, Token),

    /// La entrada terminó a mitad de un constructo.
    #[error("unexpected end of input")]
    Eof,

    /// Un valor de declaración `const` no es constante.
    #[error("initializer of `{0}` is not constant")]
    NotConstant(Name),

    /// Error semántico detectado durante el descenso.
    #[error(transparent)]
    Semantic(#[from] SemanticError),
}

type Parse<T> = Result<T, Located<ParserError>>;

/// Analiza un programa completo.
pub fn parse(file: impl Into<Rc<str>>, tokens: Vec<Located<Token>>) -> Parse<Unit> {
    Parser::new(file, tokens).parse_unit()
}

struct Parser {
    tokens: Vec<Located<Token>>,
    cursor: usize,
    last: Pos,
}

impl Parser {
    fn new(file: impl Into<Rc<str>>, tokens: Vec<Located<Token>>) -> Self {
        Parser {
            tokens,
            cursor: 0,
            last: Pos::start(file),
        }
    }

    /****** Manejo de tokens ******/

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(Located::val)
    }

    fn here(&self) -> Pos {
        self.tokens
            .get(self.cursor)
            .map(|token| token.pos().clone())
            .unwrap_or_else(|| self.last.clone())
    }

    fn advance(&mut self) -> Option<&Located<Token>> {
        let token = self.tokens.get(self.cursor)?;
        self.cursor += 1;
        self.last = token.pos().clone();
        Some(token)
    }

    /// Consume el siguiente token si es igual al esperado.
    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Parse<Pos> {
        match self.peek() {
            Some(found) if *found == expected => {
                let pos = self.here();
                self.advance();
                Ok(pos)
            }

            Some(found) => Err(Located::at(
                ParserError::Expected(expected, found.clone()),
                self.here(),
            )),

            None => Err(Located::at(ParserError::Eof, self.last.clone())),
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Parse<Pos> {
        self.expect(Token::Keyword(keyword))
    }

    fn expect_id(&mut self) -> Parse<Located<Name>> {
        match self.peek() {
            Some(Token::Id(name)) => {
                let name = name.clone();
                let pos = self.here();
                self.advance();
                Ok(Located::at(name, pos))
            }

            Some(found) => Err(Located::at(
                ParserError::ExpectedDesc("an identifier", found.clone()),
                self.here(),
            )),

            None => Err(Located::at(ParserError::Eof, self.last.clone())),
        }
    }

    fn expect_int(&mut self) -> Parse<u32> {
        match self.peek() {
            Some(Token::IntLiteral(value)) => {
                let value = *value;
                self.advance();
                Ok(value)
            }

            Some(found) => Err(Located::at(
                ParserError::ExpectedDesc("an integer literal", found.clone()),
                self.here(),
            )),

            None => Err(Located::at(ParserError::Eof, self.last.clone())),
        }
    }

    /****** Declaraciones ******/

    fn parse_unit(mut self) -> Parse<Unit> {
        let mut symbols = SymbolTable::default();
        let mut autos = Vec::new();

        while let Some(token) = self.peek() {
            match token {
                Token::Keyword(Keyword::Const) => self.parse_const(&mut symbols)?,
                Token::Keyword(Keyword::Var) => self.parse_var(&mut symbols)?,
                Token::Keyword(Keyword::Reg) => self.parse_reg(&mut symbols)?,
                Token::Keyword(Keyword::Sig) => self.parse_sig(&mut symbols)?,
                Token::Keyword(Keyword::Auto) => {
                    let auto = self.parse_auto(&mut symbols)?;
                    autos.push(auto);
                }

                _ => {
                    return Err(Located::at(
                        ParserError::ExpectedDesc("a declaration", token.clone()),
                        self.here(),
                    ))
                }
            }
        }

        Ok(Unit { symbols, autos })
    }

    fn parse_const(&mut self, symbols: &mut SymbolTable) -> Parse<()> {
        self.expect_keyword(Keyword::Const)?;
        let (pos, name) = self.expect_id()?.split();
        self.expect(Token::Assign)?;

        // El inicializador debe plegarse a una constante aquí mismo
        let expr = self.parse_expr(symbols)?;
        let value = expr
            .eval(symbols)
            .ok_or_else(|| Located::at(ParserError::NotConstant(name.clone()), pos.clone()))?;

        self.expect(Token::Semicolon)?;
        insert(symbols, name, Decl::Const(value), pos)
    }

    fn parse_var(&mut self, symbols: &mut SymbolTable) -> Parse<()> {
        self.expect_keyword(Keyword::Var)?;
        let (pos, name) = self.expect_id()?.split();
        self.expect(Token::Semicolon)?;
        insert(symbols, name, Decl::Var, pos)
    }

    fn parse_reg(&mut self, symbols: &mut SymbolTable) -> Parse<()> {
        self.expect_keyword(Keyword::Reg)?;
        let (pos, name) = self.expect_id()?.split();
        self.expect(Token::Assign)?;
        let addr = self.expect_int()?;
        self.expect(Token::Semicolon)?;
        insert(symbols, name, Decl::Reg(addr), pos)
    }

    fn parse_sig(&mut self, symbols: &mut SymbolTable) -> Parse<()> {
        self.expect_keyword(Keyword::Sig)?;
        let (pos, name) = self.expect_id()?.split();
        self.expect(Token::Assign)?;

        let (reg_pos, reg) = self.expect_id()?.split();
        match symbols.get(&reg) {
            Some(Decl::Reg(_)) => (),
            Some(_) => {
                return Err(Located::at(
                    SemanticError::NotARegister(reg).into(),
                    reg_pos,
                ))
            }
            None => {
                return Err(Located::at(
                    SemanticError::Undefined(reg).into(),
                    reg_pos,
                ))
            }
        }

        self.expect(Token::OpenBracket)?;
        let bit = self.expect_int()?;
        self.expect(Token::CloseBracket)?;
        self.expect(Token::Semicolon)?;

        insert(symbols, name, Decl::Sig { reg, bit }, pos)
    }

    fn parse_auto(&mut self, symbols: &mut SymbolTable) -> Parse<Automaton> {
        self.expect_keyword(Keyword::Auto)?;
        let (pos, name) = self.expect_id()?.split();

        // El nombre se reserva para detectar colisiones, aunque el
        // autómata no viva en la tabla
        symbols
            .reserve(name.clone())
            .map_err(|error| Located::at(error.into(), pos.clone()))?;

        self.expect(Token::OpenCurly)?;
        self.expect_keyword(Keyword::Init)?;
        let init = self.parse_block(symbols)?;

        let mut states: Vec<State> = Vec::new();
        while let Some(Token::Keyword(Keyword::State)) = self.peek() {
            let state = self.parse_state(symbols)?;

            if states.iter().any(|s| s.name == state.name) {
                return Err(Located::at(
                    SemanticError::Duplicate(state.name).into(),
                    self.last.clone(),
                ));
            }
            states.push(state);
        }

        self.expect(Token::CloseCurly)?;

        Ok(Automaton {
            name,
            pos,
            init,
            states,
        })
    }

    fn parse_state(&mut self, symbols: &mut SymbolTable) -> Parse<State> {
        self.expect_keyword(Keyword::State)?;
        let name = self.expect_id()?.into_inner();
        self.expect(Token::OpenCurly)?;

        let entry = if let Some(Token::Keyword(Keyword::Entry)) = self.peek() {
            self.advance();
            self.parse_block(symbols)?
        } else {
            Stmt::Nop
        };

        let mut whens = Vec::new();
        while let Some(Token::Keyword(Keyword::When)) = self.peek() {
            whens.push(self.parse_when(symbols)?);
        }

        self.expect(Token::CloseCurly)?;

        Ok(State { name, entry, whens })
    }

    fn parse_when(&mut self, symbols: &mut SymbolTable) -> Parse<When> {
        let pos = self.expect_keyword(Keyword::When)?;
        let neg = self.eat(&Token::Bang);

        let (sig_pos, sig) = self.expect_id()?.split();
        match symbols.get(&sig) {
            Some(Decl::Sig { .. }) => (),
            Some(_) => {
                return Err(Located::at(
                    SemanticError::NotASignal(sig).into(),
                    sig_pos,
                ))
            }
            None => {
                return Err(Located::at(
                    SemanticError::Undefined(sig).into(),
                    sig_pos,
                ))
            }
        }

        let action = self.parse_block(symbols)?;

        Ok(When {
            pos,
            neg,
            sig,
            action,
        })
    }

    /****** Sentencias ******/

    /// Un bloque `{ ... }` se pliega en secuencias anidadas a la
    /// derecha; el bloque vacío es NOP.
    fn parse_block(&mut self, symbols: &mut SymbolTable) -> Parse<Stmt> {
        self.expect(Token::OpenCurly)?;

        let mut stmts = Vec::new();
        while self.peek() != Some(&Token::CloseCurly) {
            if self.peek().is_none() {
                return Err(Located::at(ParserError::Eof, self.last.clone()));
            }
            stmts.push(self.parse_statement(symbols)?);
        }

        self.expect(Token::CloseCurly)?;

        Ok(stmts
            .into_iter()
            .rev()
            .reduce(|tail, stmt| Stmt::Seq(Box::new(stmt), Box::new(tail)))
            .unwrap_or(Stmt::Nop))
    }

    fn parse_statement(&mut self, symbols: &mut SymbolTable) -> Parse<Stmt> {
        match self.peek() {
            Some(Token::Semicolon) => {
                self.advance();
                Ok(Stmt::Nop)
            }

            Some(Token::Keyword(Keyword::If)) => {
                let pos = self.expect_keyword(Keyword::If)?;
                let cond = self.parse_cond(symbols)?;
                let then = self.parse_block(symbols)?;

                let orelse = if self.eat(&Token::Keyword(Keyword::Else)) {
                    Some(Box::new(self.parse_block(symbols)?))
                } else {
                    None
                };

                Ok(Stmt::If(pos, cond, Box::new(then), orelse))
            }

            Some(Token::Keyword(Keyword::Goto)) => {
                let pos = self.expect_keyword(Keyword::Goto)?;
                let state = self.expect_id()?.into_inner();
                self.expect(Token::Semicolon)?;
                Ok(Stmt::Goto(pos, state))
            }

            Some(Token::Keyword(Keyword::Stop)) => {
                let pos = self.expect_keyword(Keyword::Stop)?;
                self.expect(Token::Semicolon)?;
                Ok(Stmt::Stop(pos))
            }

            Some(Token::Id(_)) => self.parse_assignment(symbols),

            Some(found) => Err(Located::at(
                ParserError::ExpectedDesc("a statement", found.clone()),
                self.here(),
            )),

            None => Err(Located::at(ParserError::Eof, self.last.clone())),
        }
    }

    fn parse_assignment(&mut self, symbols: &mut SymbolTable) -> Parse<Stmt> {
        let (pos, name) = self.expect_id()?.split();

        // Solo variables y registros admiten asignación
        match symbols.get(&name) {
            Some(Decl::Var) | Some(Decl::Reg(_)) => (),
            Some(_) => {
                return Err(Located::at(
                    SemanticError::NotAssignable(name).into(),
                    pos,
                ))
            }
            None => {
                return Err(Located::at(
                    SemanticError::Undefined(name).into(),
                    pos,
                ))
            }
        }

        if self.eat(&Token::OpenBracket) {
            let hi = self.parse_expr(symbols)?;
            let lo = if self.eat(&Token::Colon) {
                self.parse_expr(symbols)?
            } else {
                // `x[b] = e` equivale a `x[b:b] = e`
                hi.clone()
            };
            self.expect(Token::CloseBracket)?;
            self.expect(Token::Assign)?;

            let value = self.parse_expr(symbols)?;
            self.expect(Token::Semicolon)?;

            Ok(Stmt::SetField(pos, name, hi, lo, value))
        } else {
            self.expect(Token::Assign)?;
            let value = self.parse_expr(symbols)?;
            self.expect(Token::Semicolon)?;

            Ok(Stmt::Set(pos, name, value))
        }
    }

    /****** Condiciones ******/

    fn parse_cond(&mut self, symbols: &mut SymbolTable) -> Parse<Cond> {
        let mut cond = self.parse_cand(symbols)?;
        while self.eat(&Token::OrOr) {
            let rhs = self.parse_cand(symbols)?;
            cond = Cond::Or(Box::new(cond), Box::new(rhs));
        }
        Ok(cond)
    }

    fn parse_cand(&mut self, symbols: &mut SymbolTable) -> Parse<Cond> {
        let mut cond = self.parse_cfactor(symbols)?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.parse_cfactor(symbols)?;
            cond = Cond::And(Box::new(cond), Box::new(rhs));
        }
        Ok(cond)
    }

    fn parse_cfactor(&mut self, symbols: &mut SymbolTable) -> Parse<Cond> {
        if self.eat(&Token::Bang) {
            let cond = self.parse_cfactor(symbols)?;
            return Ok(Cond::Not(Box::new(cond)));
        }

        // `(` es ambiguo: puede abrir una comparación o agrupar una
        // condición. Se intenta la comparación y se restaura el
        // cursor si no lo era.
        let checkpoint = self.cursor;
        match self.parse_comparison(symbols) {
            Ok(cond) => Ok(cond),

            Err(error) => {
                self.cursor = checkpoint;

                if self.eat(&Token::OpenParen) {
                    let cond = self.parse_cond(symbols)?;
                    self.expect(Token::CloseParen)?;
                    Ok(cond)
                } else {
                    Err(error)
                }
            }
        }
    }

    fn parse_comparison(&mut self, symbols: &mut SymbolTable) -> Parse<Cond> {
        let lhs = self.parse_expr(symbols)?;

        let comp = match self.peek() {
            Some(Token::EqEq) => Comp::Eq,
            Some(Token::Ne) => Comp::Ne,
            Some(Token::Lt) => Comp::Lt,
            Some(Token::Le) => Comp::Le,
            Some(Token::Gt) => Comp::Gt,
            Some(Token::Ge) => Comp::Ge,

            Some(found) => {
                return Err(Located::at(
                    ParserError::ExpectedDesc("a comparison operator", found.clone()),
                    self.here(),
                ))
            }

            None => return Err(Located::at(ParserError::Eof, self.last.clone())),
        };

        self.advance();
        let rhs = self.parse_expr(symbols)?;

        Ok(Cond::Comp(comp, lhs, rhs))
    }

    /****** Expresiones ******/

    fn parse_expr(&mut self, symbols: &mut SymbolTable) -> Parse<Expr> {
        self.parse_bor(symbols)
    }

    fn parse_bor(&mut self, symbols: &mut SymbolTable) -> Parse<Expr> {
        let mut expr = self.parse_bxor(symbols)?;
        while self.eat(&Token::Pipe) {
            let rhs = self.parse_bxor(symbols)?;
            expr = Expr::Binop(Binop::Or, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_bxor(&mut self, symbols: &mut SymbolTable) -> Parse<Expr> {
        let mut expr = self.parse_band(symbols)?;
        while self.eat(&Token::Caret) {
            let rhs = self.parse_band(symbols)?;
            expr = Expr::Binop(Binop::Xor, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_band(&mut self, symbols: &mut SymbolTable) -> Parse<Expr> {
        let mut expr = self.parse_shift(symbols)?;
        while self.eat(&Token::Amp) {
            let rhs = self.parse_shift(symbols)?;
            expr = Expr::Binop(Binop::And, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_shift(&mut self, symbols: &mut SymbolTable) -> Parse<Expr> {
        let mut expr = self.parse_add(symbols)?;

        loop {
            let op = match self.peek() {
                Some(Token::Shl) => Binop::Shl,
                Some(Token::Shr) => Binop::Shr,
                Some(Token::Rol) => Binop::Rol,
                Some(Token::Ror) => Binop::Ror,
                _ => break,
            };

            self.advance();
            let rhs = self.parse_add(symbols)?;
            expr = Expr::Binop(op, Box::new(expr), Box::new(rhs));
        }

        Ok(expr)
    }

    fn parse_add(&mut self, symbols: &mut SymbolTable) -> Parse<Expr> {
        let mut expr = self.parse_mul(symbols)?;

        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Binop::Add,
                Some(Token::Minus) => Binop::Sub,
                _ => break,
            };

            self.advance();
            let rhs = self.parse_mul(symbols)?;
            expr = Expr::Binop(op, Box::new(expr), Box::new(rhs));
        }

        Ok(expr)
    }

    fn parse_mul(&mut self, symbols: &mut SymbolTable) -> Parse<Expr> {
        let mut expr = self.parse_unary(symbols)?;

        loop {
            let op = match self.peek() {
                Some(Token::Times) => Binop::Mul,
                Some(Token::Slash) => Binop::Div,
                Some(Token::Percent) => Binop::Mod,
                _ => break,
            };

            self.advance();
            let rhs = self.parse_unary(symbols)?;
            expr = Expr::Binop(op, Box::new(expr), Box::new(rhs));
        }

        Ok(expr)
    }

    fn parse_unary(&mut self, symbols: &mut SymbolTable) -> Parse<Expr> {
        if self.eat(&Token::Minus) {
            let arg = self.parse_unary(symbols)?;
            Ok(Expr::Unop(Unop::Neg, Box::new(arg)))
        } else if self.eat(&Token::Tilde) {
            let arg = self.parse_unary(symbols)?;
            Ok(Expr::Unop(Unop::Inv, Box::new(arg)))
        } else {
            self.parse_postfix(symbols)
        }
    }

    fn parse_postfix(&mut self, symbols: &mut SymbolTable) -> Parse<Expr> {
        let mut expr = self.parse_primary(symbols)?;

        while self.eat(&Token::OpenBracket) {
            let hi = self.parse_expr(symbols)?;
            let lo = if self.eat(&Token::Colon) {
                self.parse_expr(symbols)?
            } else {
                hi.clone()
            };
            self.expect(Token::CloseBracket)?;

            expr = Expr::BitField(Box::new(expr), Box::new(hi), Box::new(lo));
        }

        Ok(expr)
    }

    fn parse_primary(&mut self, symbols: &mut SymbolTable) -> Parse<Expr> {
        match self.peek() {
            Some(Token::IntLiteral(value)) => {
                let value = *value as i32;
                self.advance();
                Ok(Expr::Const(value))
            }

            Some(Token::Id(_)) => {
                let (pos, name) = self.expect_id()?.split();

                // Solo constantes, variables y registros son valores
                match symbols.get(&name) {
                    Some(Decl::Const(_)) | Some(Decl::Var) | Some(Decl::Reg(_)) => {
                        Ok(Expr::Mem(name))
                    }
                    Some(_) => Err(Located::at(
                        SemanticError::NotAValue(name).into(),
                        pos,
                    )),
                    None => Err(Located::at(
                        SemanticError::Undefined(name).into(),
                        pos,
                    )),
                }
            }

            Some(Token::OpenParen) => {
                self.advance();
                let expr = self.parse_expr(symbols)?;
                self.expect(Token::CloseParen)?;
                Ok(expr)
            }

            Some(found) => Err(Located::at(
                ParserError::ExpectedDesc("an expression", found.clone()),
                self.here(),
            )),

            None => Err(Located::at(ParserError::Eof, self.last.clone())),
        }
    }
}

fn insert(symbols: &mut SymbolTable, name: Name, decl: Decl, pos: Pos) -> Parse<()> {
    symbols
        .insert(name, decl)
        .map_err(|error| Located::at(error.into(), pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::Lexer;

    fn parse_source(source: &str) -> Parse<Unit> {
        let tokens = Lexer::new(source, "test").try_exhaustive().expect("lexer");
        parse("test", tokens)
    }

    #[test]
    fn declarations() {
        let unit = parse_source(
            "const n = 2 + 3;\n\
             var x;\n\
             reg porta = 0x40000000;\n\
             sig ready = porta[2];\n",
        )
        .unwrap();

        assert!(matches!(unit.symbols.get("n"), Some(Decl::Const(5))));
        assert!(matches!(unit.symbols.get("x"), Some(Decl::Var)));
        assert!(matches!(
            unit.symbols.get("porta"),
            Some(Decl::Reg(0x4000_0000))
        ));
        assert!(
            matches!(unit.symbols.get("ready"), Some(Decl::Sig { reg, bit: 2 }) if &**reg == "porta")
        );
    }

    #[test]
    fn const_initializer_must_fold() {
        let error = parse_source("var x; const n = x + 1;").unwrap_err();
        assert!(matches!(error.val(), ParserError::NotConstant(_)));
    }

    #[test]
    fn duplicate_declaration_is_an_error() {
        let error = parse_source("var x; var x;").unwrap_err();
        assert!(matches!(
            error.val(),
            ParserError::Semantic(SemanticError::Duplicate(_))
        ));
    }

    #[test]
    fn sig_requires_a_register() {
        let error = parse_source("var x; sig s = x[0];").unwrap_err();
        assert!(matches!(
            error.val(),
            ParserError::Semantic(SemanticError::NotARegister(_))
        ));
    }

    #[test]
    fn undefined_symbol_in_expression() {
        let error = parse_source("var x; auto a { init { x = y; } }").unwrap_err();
        assert!(matches!(
            error.val(),
            ParserError::Semantic(SemanticError::Undefined(name)) if &**name == "y"
        ));
    }

    #[test]
    fn constants_are_not_assignable() {
        let error = parse_source("const n = 1; auto a { init { n = 2; } }").unwrap_err();
        assert!(matches!(
            error.val(),
            ParserError::Semantic(SemanticError::NotAssignable(_))
        ));
    }

    #[test]
    fn precedence_mul_over_add() {
        let unit = parse_source("var x; auto a { init { x = 1 + 2 * 3; } }").unwrap();

        match &unit.autos[0].init {
            Stmt::Set(_, _, Expr::Binop(Binop::Add, lhs, rhs)) => {
                assert!(matches!(**lhs, Expr::Const(1)));
                assert!(matches!(**rhs, Expr::Binop(Binop::Mul, _, _)));
            }
            other => panic!("unexpected init: {:?}", other),
        }
    }

    #[test]
    fn bit_field_postfix_and_single_bit() {
        let unit = parse_source("var x; var y; auto a { init { y = x[7:4] + x[3]; } }").unwrap();

        match &unit.autos[0].init {
            Stmt::Set(_, _, Expr::Binop(Binop::Add, lhs, rhs)) => {
                assert!(matches!(**lhs, Expr::BitField(..)));

                // x[3] es x[3:3]
                match &**rhs {
                    Expr::BitField(_, hi, lo) => {
                        assert!(matches!(**hi, Expr::Const(3)));
                        assert!(matches!(**lo, Expr::Const(3)));
                    }
                    other => panic!("unexpected rhs: {:?}", other),
                }
            }
            other => panic!("unexpected init: {:?}", other),
        }
    }

    #[test]
    fn field_assignment() {
        let unit = parse_source("reg p = 0x10; auto a { init { p[3:1] = 5; } }").unwrap();
        assert!(matches!(&unit.autos[0].init, Stmt::SetField(..)));
    }

    #[test]
    fn parenthesized_expression_in_comparison() {
        // El retroceso del parser debe aceptar `(x + 1) == 2`
        let unit =
            parse_source("var x; auto a { init { if (x + 1) == 2 { x = 0; } } }").unwrap();
        assert!(matches!(&unit.autos[0].init, Stmt::If(..)));
    }

    #[test]
    fn grouped_conditions_with_short_circuit() {
        let unit = parse_source(
            "var x; auto a { init { if !(x == 1 || x == 2) && x < 10 { x = 0; } } }",
        )
        .unwrap();

        match &unit.autos[0].init {
            Stmt::If(_, Cond::And(lhs, _), _, _) => {
                assert!(matches!(**lhs, Cond::Not(_)));
            }
            other => panic!("unexpected init: {:?}", other),
        }
    }

    #[test]
    fn blocks_fold_into_sequences() {
        let unit = parse_source("var x; auto a { init { x = 1; x = 2; x = 3; } }").unwrap();

        // Asociatividad a la derecha: SEQ(s1, SEQ(s2, s3))
        match &unit.autos[0].init {
            Stmt::Seq(first, tail) => {
                assert!(matches!(**first, Stmt::Set(..)));
                assert!(matches!(**tail, Stmt::Seq(..)));
            }
            other => panic!("unexpected init: {:?}", other),
        }
    }

    #[test]
    fn empty_block_is_nop() {
        let unit = parse_source("auto a { init { } }").unwrap();
        assert!(matches!(unit.autos[0].init, Stmt::Nop));
    }

    #[test]
    fn full_automaton() {
        let unit = parse_source(
            "reg porta = 0x40000000;\n\
             sig boton = porta[2];\n\
             var cuenta;\n\
             auto contador {\n\
                 init { cuenta = 0; }\n\
                 state espera {\n\
                     entry { porta = 0; }\n\
                     when boton { goto activo; }\n\
                     when !boton { cuenta = cuenta + 1; }\n\
                 }\n\
                 state activo {\n\
                     entry { porta[3] = 1; }\n\
                     when boton { stop; }\n\
                 }\n\
             }\n",
        )
        .unwrap();

        assert_eq!(unit.autos.len(), 1);
        let auto = &unit.autos[0];
        assert_eq!(&*auto.name, "contador");
        assert_eq!(auto.states.len(), 2);
        assert_eq!(auto.states[0].whens.len(), 2);
        assert!(auto.states[0].whens[1].neg);
        assert!(matches!(
            auto.states[1].whens[0].action,
            Stmt::Stop(_)
        ));

        // La unidad pasa la resolución de estados
        assert!(unit.fix().is_ok());
    }

    #[test]
    fn goto_unknown_state_fails_fix() {
        let unit = parse_source(
            "auto a { init { } state s { entry { goto t; } } }",
        )
        .unwrap();

        assert!(unit.fix().is_err());
    }

    #[test]
    fn automaton_name_collides_with_variable() {
        let error = parse_source("var x; auto x { init { } }").unwrap_err();
        assert!(matches!(
            error.val(),
            ParserError::Semantic(SemanticError::Duplicate(_))
        ));
    }
}
