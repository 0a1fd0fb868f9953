//! Reducción de expresiones constantes.
//!
//! La reducción recorre expresiones de abajo hacia arriba y
//! reemplaza cada subárbol completamente constante por un nodo
//! [`Expr::Const`] con su valor evaluado. La operación es
//! idempotente.
//!
//! Sobre sentencias la reducción es superficial a propósito: solo
//! la expresión de `Set` y los hijos de `Seq` se reducen aquí. Las
//! subexpresiones de `SetField` y de las condiciones se pliegan de
//! manera perezosa durante la generación, que consulta `eval`
//! directamente sobre ellas.

use crate::ast::{Automaton, Expr, Stmt, SymbolTable, Unit};

impl Expr {
    /// Reduce la expresión, reemplazando subárboles constantes.
    pub fn reduce(self, symbols: &SymbolTable) -> Expr {
        let reduced = match self {
            Expr::Const(_) | Expr::Mem(_) => self,

            Expr::Unop(op, arg) => Expr::Unop(op, Box::new(arg.reduce(symbols))),

            Expr::Binop(op, arg1, arg2) => Expr::Binop(
                op,
                Box::new(arg1.reduce(symbols)),
                Box::new(arg2.reduce(symbols)),
            ),

            Expr::BitField(expr, hi, lo) => Expr::BitField(
                Box::new(expr.reduce(symbols)),
                Box::new(hi.reduce(symbols)),
                Box::new(lo.reduce(symbols)),
            ),
        };

        if matches!(reduced, Expr::Const(_)) {
            return reduced;
        }

        // Un nodo cuyos hijos quedaron constantes se pliega entero,
        // salvo casos no evaluables (división entre cero)
        if reduced.children_are_const() {
            if let Some(value) = reduced.eval(symbols) {
                return Expr::Const(value);
            }
        }

        reduced
    }

    fn children_are_const(&self) -> bool {
        let is_const = |e: &Expr| matches!(e, Expr::Const(_));

        match self {
            Expr::Const(_) => true,
            Expr::Mem(_) => false,
            Expr::Unop(_, arg) => is_const(arg),
            Expr::Binop(_, arg1, arg2) => is_const(arg1) && is_const(arg2),
            Expr::BitField(expr, hi, lo) => is_const(expr) && is_const(hi) && is_const(lo),
        }
    }
}

impl Stmt {
    /// Reduce las expresiones constantes de la sentencia.
    pub fn reduce(&mut self, symbols: &SymbolTable) {
        match self {
            Stmt::Seq(a, b) => {
                a.reduce(symbols);
                b.reduce(symbols);
            }

            Stmt::Set(_, _, expr) => {
                let reduced = std::mem::replace(expr, Expr::Const(0)).reduce(symbols);
                *expr = reduced;
            }

            Stmt::Nop
            | Stmt::SetField(..)
            | Stmt::If(..)
            | Stmt::Goto(..)
            | Stmt::Stop(_) => (),
        }
    }
}

impl Automaton {
    /// Reduce las expresiones constantes del autómata.
    pub fn reduce(&mut self, symbols: &SymbolTable) {
        self.init.reduce(symbols);
        for state in &mut self.states {
            state.entry.reduce(symbols);
            for when in &mut state.whens {
                when.action.reduce(symbols);
            }
        }
    }
}

impl Unit {
    /// Reduce las expresiones constantes de todo el programa.
    pub fn reduce(&mut self) {
        for auto in &mut self.autos {
            auto.reduce(&self.symbols);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Binop, Decl};
    use crate::source::Pos;
    use std::rc::Rc;

    fn cst(v: i32) -> Expr {
        Expr::Const(v)
    }

    fn bin(op: Binop, a: Expr, b: Expr) -> Expr {
        Expr::Binop(op, Box::new(a), Box::new(b))
    }

    #[test]
    fn folds_nested_arithmetic() {
        // 3 + 4 * 5 == 23
        let e = bin(Binop::Add, cst(3), bin(Binop::Mul, cst(4), cst(5)));
        let reduced = e.reduce(&SymbolTable::default());

        assert!(matches!(reduced, Expr::Const(23)));
    }

    #[test]
    fn folds_const_declarations() {
        let mut symbols = SymbolTable::default();
        symbols.insert(Rc::from("n"), Decl::Const(10)).unwrap();

        let e = bin(Binop::Add, Expr::Mem(Rc::from("n")), cst(1));
        assert!(matches!(e.reduce(&symbols), Expr::Const(11)));
    }

    #[test]
    fn keeps_variable_subtrees() {
        let mut symbols = SymbolTable::default();
        symbols.insert(Rc::from("x"), Decl::Var).unwrap();

        // (2 * 3) + x reduce el producto pero no la suma
        let e = bin(
            Binop::Add,
            bin(Binop::Mul, cst(2), cst(3)),
            Expr::Mem(Rc::from("x")),
        );

        match e.reduce(&symbols) {
            Expr::Binop(Binop::Add, a, b) => {
                assert!(matches!(*a, Expr::Const(6)));
                assert!(matches!(*b, Expr::Mem(_)));
            }
            other => panic!("unexpected reduction: {:?}", other),
        }
    }

    #[test]
    fn division_by_zero_stays() {
        let e = bin(Binop::Div, cst(1), cst(0));
        assert!(matches!(
            e.reduce(&SymbolTable::default()),
            Expr::Binop(Binop::Div, _, _)
        ));
    }

    #[test]
    fn reduce_is_idempotent() {
        let symbols = SymbolTable::default();
        let e = bin(Binop::Add, cst(3), bin(Binop::Mul, cst(4), cst(5)));

        let once = e.reduce(&symbols);
        let twice = once.clone().reduce(&symbols);

        assert_eq!(format!("{:?}", once), format!("{:?}", twice));
    }

    #[test]
    fn statement_reduction_is_shallow() {
        let symbols = SymbolTable::default();
        let pos = Pos::start("test");

        let mut stmt = Stmt::Seq(
            Box::new(Stmt::Set(
                pos.clone(),
                Rc::from("x"),
                bin(Binop::Add, cst(1), cst(2)),
            )),
            Box::new(Stmt::SetField(
                pos,
                Rc::from("x"),
                cst(3),
                cst(0),
                bin(Binop::Add, cst(1), cst(2)),
            )),
        );

        stmt.reduce(&symbols);

        match stmt {
            Stmt::Seq(a, b) => {
                // Set se reduce...
                assert!(matches!(*a, Stmt::Set(_, _, Expr::Const(3))));
                // ...pero SetField queda para la generación perezosa
                assert!(matches!(
                    *b,
                    Stmt::SetField(_, _, _, _, Expr::Binop(Binop::Add, _, _))
                ));
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }
}
