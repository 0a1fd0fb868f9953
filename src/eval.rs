//! Evaluación de expresiones constantes.
//!
//! La evaluación es pura: produce `Some(valor)` cuando todas las
//! hojas de la expresión son constantes (literales o declaraciones
//! `const`) y `None` en cuanto interviene una variable o un registro.
//! La semántica es de enteros de 32 bits en complemento a dos,
//! consistente con las instrucciones que finalmente se emiten:
//! la división trunca hacia cero (`sdiv`), el corrimiento a la
//! derecha es lógico (`lsr`) y las rotaciones toman el conteo
//! módulo 32.

use crate::ast::{Binop, Decl, Expr, SymbolTable, Unop};

/// Máscara de un campo de `width` bits.
///
/// Un ancho de 32 o más produce la palabra completa; un ancho no
/// positivo (campo degenerado) produce cero.
pub(crate) fn field_mask(width: i32) -> i32 {
    if width >= 32 {
        -1
    } else if width <= 0 {
        0
    } else {
        (1i32 << width) - 1
    }
}

impl Expr {
    /// Evalúa la expresión como constante, si es posible.
    pub fn eval(&self, symbols: &SymbolTable) -> Option<i32> {
        match self {
            Expr::Const(v) => Some(*v),

            Expr::Mem(name) => match symbols.get(name) {
                Some(Decl::Const(v)) => Some(*v),
                _ => None,
            },

            Expr::Unop(op, arg) => {
                let a = arg.eval(symbols)?;
                Some(match op {
                    Unop::Neg => a.wrapping_neg(),
                    Unop::Inv => !a,
                })
            }

            Expr::Binop(op, arg1, arg2) => {
                let a = arg1.eval(symbols)?;
                let b = arg2.eval(symbols)?;

                match op {
                    Binop::Add => Some(a.wrapping_add(b)),
                    Binop::Sub => Some(a.wrapping_sub(b)),
                    Binop::Mul => Some(a.wrapping_mul(b)),

                    // La división entre una constante cero no es
                    // evaluable; la decisión queda para el programa
                    // generado
                    Binop::Div if b == 0 => None,
                    Binop::Div => Some(a.wrapping_div(b)),
                    Binop::Mod if b == 0 => None,
                    Binop::Mod => Some(a.wrapping_rem(b)),

                    Binop::And => Some(a & b),
                    Binop::Or => Some(a | b),
                    Binop::Xor => Some(a ^ b),

                    // Conteos módulo 32; corrimiento derecho lógico
                    Binop::Shl => Some(a.wrapping_shl(b as u32)),
                    Binop::Shr => Some(((a as u32).wrapping_shr(b as u32)) as i32),
                    Binop::Rol => Some((a as u32).rotate_left(b as u32) as i32),
                    Binop::Ror => Some((a as u32).rotate_right(b as u32) as i32),
                }
            }

            Expr::BitField(expr, hi, lo) => {
                let e = expr.eval(symbols)?;
                let h = hi.eval(symbols)?;
                let l = lo.eval(symbols)?;

                let shifted = ((e as u32).wrapping_shr(l as u32)) as i32;
                Some(shifted & field_mask(h.wrapping_sub(l).wrapping_add(1)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn cst(v: i32) -> Expr {
        Expr::Const(v)
    }

    fn bin(op: Binop, a: Expr, b: Expr) -> Expr {
        Expr::Binop(op, Box::new(a), Box::new(b))
    }

    fn eval(e: &Expr) -> Option<i32> {
        e.eval(&SymbolTable::default())
    }

    #[test]
    fn arithmetic() {
        assert_eq!(eval(&bin(Binop::Add, cst(3), cst(4))), Some(7));
        assert_eq!(eval(&bin(Binop::Sub, cst(3), cst(4))), Some(-1));
        assert_eq!(eval(&bin(Binop::Mul, cst(-3), cst(4))), Some(-12));
        assert_eq!(eval(&bin(Binop::Div, cst(7), cst(-2))), Some(-3));
        assert_eq!(eval(&bin(Binop::Mod, cst(7), cst(-2))), Some(1));
    }

    #[test]
    fn arithmetic_wraps() {
        assert_eq!(
            eval(&bin(Binop::Add, cst(i32::MAX), cst(1))),
            Some(i32::MIN)
        );
        assert_eq!(
            eval(&bin(Binop::Mul, cst(0x4000_0000), cst(2))),
            Some(i32::MIN)
        );
        assert_eq!(eval(&Expr::Unop(Unop::Neg, Box::new(cst(i32::MIN)))), Some(i32::MIN));
    }

    #[test]
    fn division_by_zero_is_unknown() {
        assert_eq!(eval(&bin(Binop::Div, cst(1), cst(0))), None);
        assert_eq!(eval(&bin(Binop::Mod, cst(1), cst(0))), None);
    }

    #[test]
    fn shifts() {
        assert_eq!(eval(&bin(Binop::Shl, cst(1), cst(4))), Some(16));
        assert_eq!(eval(&bin(Binop::Shr, cst(16), cst(4))), Some(1));

        // El corrimiento derecho es lógico, como `lsr`
        assert_eq!(eval(&bin(Binop::Shr, cst(-1), cst(28))), Some(0xF));

        // Conteo módulo 32
        assert_eq!(eval(&bin(Binop::Shl, cst(1), cst(33))), Some(2));
    }

    #[test]
    fn rotations() {
        assert_eq!(eval(&bin(Binop::Rol, cst(1), cst(31))), Some(i32::MIN));
        assert_eq!(eval(&bin(Binop::Ror, cst(2), cst(1))), Some(1));
        assert_eq!(eval(&bin(Binop::Ror, cst(1), cst(1))), Some(i32::MIN));

        // Rotar por 0 o por 32 es la identidad
        assert_eq!(eval(&bin(Binop::Rol, cst(0x1234), cst(0))), Some(0x1234));
        assert_eq!(eval(&bin(Binop::Rol, cst(0x1234), cst(32))), Some(0x1234));
        assert_eq!(eval(&bin(Binop::Ror, cst(0x1234), cst(32))), Some(0x1234));
    }

    #[test]
    fn bit_fields() {
        let field = |e, h, l| Expr::BitField(Box::new(e), Box::new(h), Box::new(l));

        assert_eq!(eval(&field(cst(0b1011_0100), cst(7), cst(4))), Some(0b1011));

        // hi == lo extrae exactamente un bit
        assert_eq!(eval(&field(cst(0b100), cst(2), cst(2))), Some(1));
        assert_eq!(eval(&field(cst(0b100), cst(1), cst(1))), Some(0));

        // Campo de palabra completa
        assert_eq!(eval(&field(cst(-1), cst(31), cst(0))), Some(-1));
    }

    #[test]
    fn memory_folds_only_constants() {
        let mut symbols = SymbolTable::default();
        symbols.insert(Rc::from("n"), Decl::Const(12)).unwrap();
        symbols.insert(Rc::from("x"), Decl::Var).unwrap();
        symbols.insert(Rc::from("porta"), Decl::Reg(0x4000_0000)).unwrap();

        assert_eq!(Expr::Mem(Rc::from("n")).eval(&symbols), Some(12));
        assert_eq!(Expr::Mem(Rc::from("x")).eval(&symbols), None);
        assert_eq!(Expr::Mem(Rc::from("porta")).eval(&symbols), None);
    }

    #[test]
    fn unknown_propagates() {
        let e = bin(Binop::Add, cst(1), Expr::Mem(Rc::from("x")));
        assert_eq!(eval(&e), None);
    }
}
