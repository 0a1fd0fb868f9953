//! Generación de representación intermedia.
//!
//! Esta fase baja el árbol sintáctico a cuádruplas lineales. Las
//! expresiones producen un registro virtual con su resultado; las
//! condiciones se generan por continuaciones, saltando a una
//! etiqueta de verdad o de falsedad; las sentencias encadenan ambas
//! cosas. Cada autómata produce un programa con la forma:
//!
//! ```text
//! <init>
//! L<estado>:          ; por cada estado, en orden de declaración
//!     <entry>
//! L<lazo>:
//!     <when...>       ; guardas que saltan sobre su acción
//!     goto L<lazo>
//! L<stop>:
//!     return
//! ```
//!
//! El generador asume un árbol ya validado ([`Unit::fix`]); una
//! referencia sin resolver aquí es un error de programación.

use std::collections::HashMap;

use crate::ast::{Automaton, Binop, Comp, Cond, Decl, Expr, Name, State, Stmt, SymbolTable, Unop, When};
use crate::eval::field_mask;
use crate::quad::{Lab, Quad, QuadProgram, Reg};

/// Contexto de generación de un autómata.
struct Frame<'a> {
    symbols: &'a SymbolTable,
    /// Mapa de backpatch: nombre de estado → etiqueta.
    labels: HashMap<Name, Lab>,
    stop: Lab,
}

/// Genera las cuádruplas de un autómata completo.
pub fn generate(auto: &Automaton, symbols: &SymbolTable, prog: &mut QuadProgram) {
    let stop = prog.new_lab();
    let labels = auto
        .states
        .iter()
        .map(|state| (state.name.clone(), prog.new_lab()))
        .collect();

    let frame = Frame {
        symbols,
        labels,
        stop,
    };

    auto.init.gen(&frame, prog);
    for state in &auto.states {
        state.gen(&frame, prog);
    }

    prog.emit(Quad::lab(stop));
    prog.emit(Quad::ret());
}

impl Expr {
    /// Genera la expresión; retorna el registro con el resultado.
    fn gen(&self, frame: &Frame, prog: &mut QuadProgram) -> Reg {
        match self {
            Expr::Const(value) => {
                let r = prog.new_reg();
                prog.emit(Quad::seti(r, *value));
                r
            }

            Expr::Mem(name) => match frame.symbols.get(name) {
                Some(Decl::Const(value)) => {
                    let r = prog.new_reg();
                    prog.emit(Quad::seti(r, *value));
                    r
                }

                // El registro hogar de la variable es el resultado
                Some(Decl::Var) => prog.reg_for(name),

                Some(Decl::Reg(addr)) => {
                    let ra = prog.new_reg();
                    let rd = prog.new_reg();
                    prog.emit(Quad::seti(ra, *addr as i32));
                    prog.emit(Quad::load(rd, ra));
                    rd
                }

                _ => unreachable!("unresolved memory reference `{}`", name),
            },

            Expr::Unop(op, arg) => {
                let ro = arg.gen(frame, prog);
                let r = prog.new_reg();
                match op {
                    Unop::Neg => prog.emit(Quad::neg(r, ro)),
                    Unop::Inv => prog.emit(Quad::inv(r, ro)),
                }
                r
            }

            Expr::Binop(op, arg1, arg2) => {
                let r1 = arg1.gen(frame, prog);
                let r2 = arg2.gen(frame, prog);
                let rd = prog.new_reg();

                let quad = match op {
                    Binop::Add => Quad::add(rd, r1, r2),
                    Binop::Sub => Quad::sub(rd, r1, r2),
                    Binop::Mul => Quad::mul(rd, r1, r2),
                    Binop::Div => Quad::div(rd, r1, r2),
                    Binop::Mod => Quad::modulo(rd, r1, r2),
                    Binop::And => Quad::and(rd, r1, r2),
                    Binop::Or => Quad::or(rd, r1, r2),
                    Binop::Xor => Quad::xor(rd, r1, r2),
                    Binop::Shl => Quad::shl(rd, r1, r2),
                    Binop::Shr => Quad::shr(rd, r1, r2),
                    Binop::Rol => Quad::rol(rd, r1, r2),
                    Binop::Ror => Quad::ror(rd, r1, r2),
                };

                prog.emit(quad);
                rd
            }

            Expr::BitField(expr, hi, lo) => {
                let expr_reg = expr.gen(frame, prog);
                let result = prog.new_reg();

                match (hi.eval(frame.symbols), lo.eval(frame.symbols)) {
                    // Ambos límites conocidos: la máscara se precalcula.
                    // El par SETI/SHR queda adyacente para que el
                    // selector lo funda en un corrimiento inmediato.
                    (Some(hi_val), Some(lo_val)) => {
                        let lo_reg = prog.new_reg();
                        prog.emit(Quad::seti(lo_reg, lo_val));

                        let shifted = prog.new_reg();
                        prog.emit(Quad::shr(shifted, expr_reg, lo_reg));

                        let mask = if hi_val == lo_val {
                            // Caso especial: extracción de un solo bit
                            1
                        } else {
                            field_mask(hi_val.wrapping_sub(lo_val).wrapping_add(1))
                        };

                        let mask_reg = prog.new_reg();
                        prog.emit(Quad::seti(mask_reg, mask));
                        prog.emit(Quad::and(result, shifted, mask_reg));
                    }

                    // Límites dinámicos: la máscara se computa en
                    // tiempo de ejecución como (1 << (hi-lo+1)) - 1
                    _ => {
                        let hi_reg = hi.gen(frame, prog);
                        let lo_reg = lo.gen(frame, prog);

                        let one = prog.new_reg();
                        prog.emit(Quad::seti(one, 1));

                        let n = prog.new_reg();
                        prog.emit(Quad::sub(n, hi_reg, lo_reg));
                        prog.emit(Quad::add(n, n, one));

                        let mask = prog.new_reg();
                        prog.emit(Quad::shl(mask, one, n));
                        prog.emit(Quad::sub(mask, mask, one));

                        let shifted = prog.new_reg();
                        prog.emit(Quad::shr(shifted, expr_reg, lo_reg));
                        prog.emit(Quad::and(result, shifted, mask));
                    }
                }

                result
            }
        }
    }
}

impl Cond {
    /// Genera la condición saltando a `lab_true` o `lab_false`.
    fn gen(&self, lab_true: Lab, lab_false: Lab, frame: &Frame, prog: &mut QuadProgram) {
        match self {
            Cond::Comp(comp, arg1, arg2) => {
                let a1 = arg1.gen(frame, prog);
                let a2 = arg2.gen(frame, prog);

                let quad = match comp {
                    Comp::Eq => Quad::goto_eq(lab_true, a1, a2),
                    Comp::Ne => Quad::goto_ne(lab_true, a1, a2),
                    Comp::Lt => Quad::goto_lt(lab_true, a1, a2),
                    Comp::Le => Quad::goto_le(lab_true, a1, a2),
                    Comp::Gt => Quad::goto_gt(lab_true, a1, a2),
                    Comp::Ge => Quad::goto_ge(lab_true, a1, a2),
                };

                prog.emit(quad);
                prog.emit(Quad::goto(lab_false));
            }

            Cond::Not(cond) => cond.gen(lab_false, lab_true, frame, prog),

            // Cortocircuito: la segunda condición solo se evalúa si
            // la primera no decidió el salto
            Cond::And(cond1, cond2) => {
                let lab_mid = prog.new_lab();
                cond1.gen(lab_mid, lab_false, frame, prog);
                prog.emit(Quad::lab(lab_mid));
                cond2.gen(lab_true, lab_false, frame, prog);
            }

            Cond::Or(cond1, cond2) => {
                let lab_mid = prog.new_lab();
                cond1.gen(lab_true, lab_mid, frame, prog);
                prog.emit(Quad::lab(lab_mid));
                cond2.gen(lab_true, lab_false, frame, prog);
            }
        }
    }
}

impl Stmt {
    fn gen(&self, frame: &Frame, prog: &mut QuadProgram) {
        match self {
            Stmt::Nop => (),

            Stmt::Seq(stmt1, stmt2) => {
                stmt1.gen(frame, prog);
                stmt2.gen(frame, prog);
            }

            Stmt::Set(pos, name, expr) => {
                prog.comment(pos.clone());
                let r = expr.gen(frame, prog);

                match frame.symbols.get(name) {
                    Some(Decl::Var) => {
                        let home = prog.reg_for(name);
                        prog.emit(Quad::set(home, r));
                    }

                    Some(Decl::Reg(addr)) => {
                        let ra = prog.new_reg();
                        prog.emit(Quad::seti(ra, *addr as i32));
                        prog.emit(Quad::store(ra, r));
                    }

                    _ => unreachable!("assignment to unresolved `{}`", name),
                }
            }

            Stmt::SetField(pos, name, hi, lo, expr) => {
                prog.comment(pos.clone());
                self.gen_set_field(name, hi, lo, expr, frame, prog);
            }

            Stmt::If(pos, cond, stmt1, stmt2) => {
                prog.comment(pos.clone());

                let lab_true = prog.new_lab();
                let lab_false = prog.new_lab();
                let lab_end = prog.new_lab();

                cond.gen(lab_true, lab_false, frame, prog);
                prog.emit(Quad::lab(lab_true));
                stmt1.gen(frame, prog);
                prog.emit(Quad::goto(lab_end));
                prog.emit(Quad::lab(lab_false));
                if let Some(stmt2) = stmt2 {
                    stmt2.gen(frame, prog);
                }
                prog.emit(Quad::lab(lab_end));
            }

            Stmt::Goto(pos, state) => {
                prog.comment(pos.clone());
                let label = frame.labels[state];
                prog.emit(Quad::goto(label));
            }

            Stmt::Stop(pos) => {
                prog.comment(pos.clone());
                prog.emit(Quad::goto(frame.stop));
            }
        }
    }

    /// Asignación de campo de bits: limpia el campo en la palabra
    /// actual y superpone el valor alineado.
    fn gen_set_field(
        &self,
        name: &Name,
        hi: &Expr,
        lo: &Expr,
        expr: &Expr,
        frame: &Frame,
        prog: &mut QuadProgram,
    ) {
        let hi_reg = hi.gen(frame, prog);
        let lo_reg = lo.gen(frame, prog);
        let mut value_reg = expr.gen(frame, prog);

        // Se materializa la palabra completa actual: el hogar de la
        // variable, o una carga desde la dirección del registro E/S
        let (e_reg, addr_reg) = match frame.symbols.get(name) {
            Some(Decl::Var) => (prog.reg_for(name), None),

            Some(Decl::Reg(addr)) => {
                let ra = prog.new_reg();
                prog.emit(Quad::seti(ra, *addr as i32));
                let e = prog.new_reg();
                prog.emit(Quad::load(e, ra));
                (e, Some(ra))
            }

            _ => unreachable!("field assignment to unresolved `{}`", name),
        };

        // Si el valor es la misma palabra destino (x[h:l] = x), se
        // rompe el alias copiándolo a un registro fresco
        if e_reg == value_reg {
            let temp = prog.new_reg();
            prog.emit(Quad::set(temp, value_reg));
            value_reg = temp;
        }

        let hi_val = hi.eval(frame.symbols);
        let lo_val = lo.eval(frame.symbols);
        let value_val = expr.eval(frame.symbols);

        match (hi_val, lo_val, value_val) {
            // Todo constante: máscara y valor alineado precalculados
            (Some(hi_val), Some(lo_val), Some(value_val)) => {
                let width = hi_val.wrapping_sub(lo_val).wrapping_add(1);
                let mask_val = field_mask(width).wrapping_shl(lo_val as u32);

                let mask_reg = prog.new_reg();
                prog.emit(Quad::seti(mask_reg, mask_val));

                let inv_mask = prog.new_reg();
                prog.emit(Quad::inv(inv_mask, mask_reg));
                prog.emit(Quad::and(e_reg, e_reg, inv_mask));

                let aligned = (value_val & field_mask(width)).wrapping_shl(lo_val as u32);
                let aligned_reg = prog.new_reg();
                prog.emit(Quad::seti(aligned_reg, aligned));

                prog.emit(Quad::or(e_reg, e_reg, aligned_reg));
            }

            // Caso dinámico: mask = ((1 << (hi-lo+1)) - 1) << lo
            _ => {
                let one = prog.new_reg();
                prog.emit(Quad::seti(one, 1));

                let n = prog.new_reg();
                prog.emit(Quad::sub(n, hi_reg, lo_reg));
                prog.emit(Quad::add(n, n, one));

                let power = prog.new_reg();
                prog.emit(Quad::shl(power, one, n));

                let mask = prog.new_reg();
                prog.emit(Quad::sub(mask, power, one));
                prog.emit(Quad::shl(mask, mask, lo_reg));

                let inv_mask = prog.new_reg();
                prog.emit(Quad::inv(inv_mask, mask));
                prog.emit(Quad::and(e_reg, e_reg, inv_mask));

                // El valor se recorta al ancho del campo antes de
                // alinearlo, reutilizando (1 << n) - 1
                let value_mask = prog.new_reg();
                prog.emit(Quad::sub(value_mask, power, one));

                let aligned = prog.new_reg();
                prog.emit(Quad::and(aligned, value_reg, value_mask));
                prog.emit(Quad::shl(aligned, aligned, lo_reg));

                prog.emit(Quad::or(e_reg, e_reg, aligned));
            }
        }

        // Los registros E/S requieren reescribir la palabra
        if let Some(addr_reg) = addr_reg {
            prog.emit(Quad::store(addr_reg, e_reg));
        }
    }
}

impl When {
    /// Genera la guarda y la acción de una cláusula `when`.
    ///
    /// La palabra del registro se carga y se enmascara con el bit de
    /// la señal; un salto condicional brinca la acción cuando la
    /// guarda no se cumple.
    fn gen(&self, frame: &Frame, prog: &mut QuadProgram) {
        prog.comment(self.pos.clone());

        let (reg_addr, bit) = match frame.symbols.get(&self.sig) {
            Some(Decl::Sig { reg, bit }) => match frame.symbols.get(reg) {
                Some(Decl::Reg(addr)) => (*addr, *bit),
                _ => unreachable!("signal `{}` over unresolved register", self.sig),
            },
            _ => unreachable!("unresolved signal `{}`", self.sig),
        };

        let sig_addr = prog.new_reg();
        let sig_val = prog.new_reg();
        prog.emit(Quad::seti(sig_addr, reg_addr as i32));
        prog.emit(Quad::load(sig_val, sig_addr));

        let bit_pos = prog.new_reg();
        prog.emit(Quad::seti(bit_pos, bit as i32));

        let one = prog.new_reg();
        prog.emit(Quad::seti(one, 1));

        let bit_mask = prog.new_reg();
        prog.emit(Quad::shl(bit_mask, one, bit_pos));

        let masked = prog.new_reg();
        prog.emit(Quad::and(masked, sig_val, bit_mask));

        let skip = prog.new_lab();
        if self.neg {
            // Dispara con el bit apagado: brinca si está encendido
            prog.emit(Quad::goto_eq(skip, masked, bit_mask));
        } else {
            // Dispara con el bit encendido: brinca si está apagado
            prog.emit(Quad::goto_ne(skip, masked, bit_mask));
        }

        self.action.gen(frame, prog);
        prog.emit(Quad::lab(skip));
    }
}

impl State {
    /// Genera un estado: acción de entrada y lazo de sondeo.
    fn gen(&self, frame: &Frame, prog: &mut QuadProgram) {
        prog.emit(Quad::lab(frame.labels[&self.name]));
        self.entry.gen(frame, prog);

        let lab_loop = prog.new_lab();
        prog.emit(Quad::lab(lab_loop));
        for when in &self.whens {
            when.gen(frame, prog);
        }
        prog.emit(Quad::goto(lab_loop));
    }
}
