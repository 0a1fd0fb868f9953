//! Representación intermedia por cuádruplas.
//!
//! La representación intermedia es lineal y recuerda ligeramente
//! a lenguajes ensambladores de tres direcciones. Cada cuádrupla
//! tiene una operación y hasta tres ranuras de 32 bits: destino,
//! primer operando y segundo operando. La ocupación de las ranuras
//! depende de la operación; las no usadas quedan en cero.
//!
//! # Registros virtuales
//! El generador dispone de un archivo ilimitado de registros
//! virtuales, acuñados monótonamente por el constructor de
//! programas. Cada variable del programa fuente tiene un registro
//! virtual estable que actúa como su hogar.
//!
//! # Etiquetas
//! El control de flujo se realiza a través de etiquetas y saltos.
//! Las etiquetas existen por el hecho de ser identificadas
//! numéricamente y no se declaran de alguna otra manera. Todo salto
//! refiere a una etiqueta que aparece exactamente una vez como
//! cuádrupla [`Op::Lab`].

use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
};

use crate::ast::Name;
use crate::source::Pos;

/// Cantidad de registros físicos reservados para asignación.
pub const ALLOC_COUNT: u32 = 8;

/// Un registro virtual.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reg(pub u32);

impl Display for Reg {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        write!(fmt, "r{}", self.0)
    }
}

/// Una etiqueta de salto.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Lab(pub u32);

impl Display for Lab {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        write!(fmt, "L{}", self.0)
    }
}

/// Operación de una cuádrupla.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Nop,
    /// `d := a`
    Set,
    /// `d := inmediato a`
    Seti,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Rol,
    Ror,
    Neg,
    Inv,
    /// `d := mem[a]`
    Load,
    /// `mem[d] := a`
    Store,
    /// Etiqueta `a`.
    Lab,
    /// Salto incondicional a `a`.
    Goto,
    /// Saltos condicionales a `d` comparando `a` con `b`.
    GotoEq,
    GotoNe,
    GotoLt,
    GotoLe,
    GotoGt,
    GotoGe,
    /// Llamada a `d`.
    Call,
    Return,
}

/// Una cuádrupla de tres direcciones.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Quad {
    pub op: Op,
    pub d: u32,
    pub a: u32,
    pub b: u32,
}

impl Quad {
    fn make(op: Op, d: u32, a: u32, b: u32) -> Quad {
        Quad { op, d, a, b }
    }

    pub fn nop() -> Quad {
        Quad::make(Op::Nop, 0, 0, 0)
    }

    pub fn set(d: Reg, a: Reg) -> Quad {
        Quad::make(Op::Set, d.0, a.0, 0)
    }

    /// El operando `a` es un inmediato literal, no un registro.
    pub fn seti(d: Reg, value: i32) -> Quad {
        Quad::make(Op::Seti, d.0, value as u32, 0)
    }

    pub fn add(d: Reg, a: Reg, b: Reg) -> Quad {
        Quad::make(Op::Add, d.0, a.0, b.0)
    }

    pub fn sub(d: Reg, a: Reg, b: Reg) -> Quad {
        Quad::make(Op::Sub, d.0, a.0, b.0)
    }

    pub fn mul(d: Reg, a: Reg, b: Reg) -> Quad {
        Quad::make(Op::Mul, d.0, a.0, b.0)
    }

    pub fn div(d: Reg, a: Reg, b: Reg) -> Quad {
        Quad::make(Op::Div, d.0, a.0, b.0)
    }

    pub fn modulo(d: Reg, a: Reg, b: Reg) -> Quad {
        Quad::make(Op::Mod, d.0, a.0, b.0)
    }

    pub fn and(d: Reg, a: Reg, b: Reg) -> Quad {
        Quad::make(Op::And, d.0, a.0, b.0)
    }

    pub fn or(d: Reg, a: Reg, b: Reg) -> Quad {
        Quad::make(Op::Or, d.0, a.0, b.0)
    }

    pub fn xor(d: Reg, a: Reg, b: Reg) -> Quad {
        Quad::make(Op::Xor, d.0, a.0, b.0)
    }

    pub fn shl(d: Reg, a: Reg, b: Reg) -> Quad {
        Quad::make(Op::Shl, d.0, a.0, b.0)
    }

    pub fn shr(d: Reg, a: Reg, b: Reg) -> Quad {
        Quad::make(Op::Shr, d.0, a.0, b.0)
    }

    pub fn rol(d: Reg, a: Reg, b: Reg) -> Quad {
        Quad::make(Op::Rol, d.0, a.0, b.0)
    }

    pub fn ror(d: Reg, a: Reg, b: Reg) -> Quad {
        Quad::make(Op::Ror, d.0, a.0, b.0)
    }

    pub fn neg(d: Reg, a: Reg) -> Quad {
        Quad::make(Op::Neg, d.0, a.0, 0)
    }

    pub fn inv(d: Reg, a: Reg) -> Quad {
        Quad::make(Op::Inv, d.0, a.0, 0)
    }

    pub fn load(d: Reg, addr: Reg) -> Quad {
        Quad::make(Op::Load, d.0, addr.0, 0)
    }

    pub fn store(addr: Reg, value: Reg) -> Quad {
        Quad::make(Op::Store, addr.0, value.0, 0)
    }

    pub fn lab(label: Lab) -> Quad {
        Quad::make(Op::Lab, 0, label.0, 0)
    }

    pub fn goto(label: Lab) -> Quad {
        Quad::make(Op::Goto, 0, label.0, 0)
    }

    pub fn goto_eq(label: Lab, a: Reg, b: Reg) -> Quad {
        Quad::make(Op::GotoEq, label.0, a.0, b.0)
    }

    pub fn goto_ne(label: Lab, a: Reg, b: Reg) -> Quad {
        Quad::make(Op::GotoNe, label.0, a.0, b.0)
    }

    pub fn goto_lt(label: Lab, a: Reg, b: Reg) -> Quad {
        Quad::make(Op::GotoLt, label.0, a.0, b.0)
    }

    pub fn goto_le(label: Lab, a: Reg, b: Reg) -> Quad {
        Quad::make(Op::GotoLe, label.0, a.0, b.0)
    }

    pub fn goto_gt(label: Lab, a: Reg, b: Reg) -> Quad {
        Quad::make(Op::GotoGt, label.0, a.0, b.0)
    }

    pub fn goto_ge(label: Lab, a: Reg, b: Reg) -> Quad {
        Quad::make(Op::GotoGe, label.0, a.0, b.0)
    }

    pub fn call(label: Lab) -> Quad {
        Quad::make(Op::Call, label.0, 0, 0)
    }

    pub fn ret() -> Quad {
        Quad::make(Op::Return, 0, 0, 0)
    }
}

impl Display for Quad {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        use Op::*;

        let Quad { d, a, b, .. } = *self;
        match self.op {
            Nop => write!(fmt, "nop"),
            Set => write!(fmt, "set r{}, r{}", d, a),
            Seti => write!(fmt, "seti r{}, {}", d, a as i32),
            Add => write!(fmt, "add r{}, r{}, r{}", d, a, b),
            Sub => write!(fmt, "sub r{}, r{}, r{}", d, a, b),
            Mul => write!(fmt, "mul r{}, r{}, r{}", d, a, b),
            Div => write!(fmt, "div r{}, r{}, r{}", d, a, b),
            Mod => write!(fmt, "mod r{}, r{}, r{}", d, a, b),
            And => write!(fmt, "and r{}, r{}, r{}", d, a, b),
            Or => write!(fmt, "or r{}, r{}, r{}", d, a, b),
            Xor => write!(fmt, "xor r{}, r{}, r{}", d, a, b),
            Shl => write!(fmt, "shl r{}, r{}, r{}", d, a, b),
            Shr => write!(fmt, "shr r{}, r{}, r{}", d, a, b),
            Rol => write!(fmt, "rol r{}, r{}, r{}", d, a, b),
            Ror => write!(fmt, "ror r{}, r{}, r{}", d, a, b),
            Neg => write!(fmt, "neg r{}, r{}", d, a),
            Inv => write!(fmt, "inv r{}, r{}", d, a),
            Load => write!(fmt, "load r{}, [r{}]", d, a),
            Store => write!(fmt, "store [r{}], r{}", d, a),
            Lab => write!(fmt, "L{}:", a),
            Goto => write!(fmt, "goto L{}", a),
            GotoEq => write!(fmt, "goto_eq L{}, r{}, r{}", d, a, b),
            GotoNe => write!(fmt, "goto_ne L{}, r{}, r{}", d, a, b),
            GotoLt => write!(fmt, "goto_lt L{}, r{}, r{}", d, a, b),
            GotoLe => write!(fmt, "goto_le L{}, r{}, r{}", d, a, b),
            GotoGt => write!(fmt, "goto_gt L{}, r{}, r{}", d, a, b),
            GotoGe => write!(fmt, "goto_ge L{}, r{}, r{}", d, a, b),
            Call => write!(fmt, "call L{}", d),
            Return => write!(fmt, "return"),
        }
    }
}

/// Constructor de programas en representación intermedia.
///
/// Acuña registros y etiquetas, acumula cuádruplas en orden de
/// emisión y mantiene el mapa de variables a sus registros hogar.
/// Todas las operaciones son O(1) amortizado.
#[derive(Default)]
pub struct QuadProgram {
    quads: Vec<Quad>,
    comments: Vec<(usize, Pos)>,
    next_reg: u32,
    next_lab: u32,
    homes: HashMap<Name, Reg>,
}

impl QuadProgram {
    pub fn new() -> Self {
        Default::default()
    }

    /// Acuña un registro virtual nuevo.
    pub fn new_reg(&mut self) -> Reg {
        let reg = Reg(self.next_reg);
        self.next_reg += 1;
        reg
    }

    /// Acuña una etiqueta nueva.
    pub fn new_lab(&mut self) -> Lab {
        let lab = Lab(self.next_lab);
        self.next_lab += 1;
        lab
    }

    /// Obtiene el registro hogar de una variable, acuñándolo en el
    /// primer uso.
    pub fn reg_for(&mut self, name: &Name) -> Reg {
        if let Some(&reg) = self.homes.get(name) {
            return reg;
        }

        let reg = self.new_reg();
        self.homes.insert(name.clone(), reg);
        reg
    }

    /// Agrega una cuádrupla al final del programa.
    pub fn emit(&mut self, quad: Quad) {
        self.quads.push(quad);
    }

    /// Asocia un marcador de posición fuente a la siguiente
    /// cuádrupla emitida. Es puramente informativo.
    pub fn comment(&mut self, pos: Pos) {
        self.comments.push((self.quads.len(), pos));
    }

    pub fn quads(&self) -> &[Quad] {
        &self.quads
    }

    /// Comentarios como pares (índice de cuádrupla, posición).
    pub fn comments(&self) -> &[(usize, Pos)] {
        &self.comments
    }

    /// Cantidad de registros virtuales acuñados hasta ahora.
    ///
    /// El selector puede acuñar registros frescos a partir de este
    /// valor sin colisionar con el programa.
    pub fn reg_count(&self) -> u32 {
        self.next_reg
    }

    /// Itera sobre los registros hogar de variables.
    pub fn homes(&self) -> impl Iterator<Item = (&Name, Reg)> {
        self.homes.iter().map(|(name, &reg)| (name, reg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn minting_is_monotonic() {
        let mut prog = QuadProgram::new();

        assert_eq!(prog.new_reg(), Reg(0));
        assert_eq!(prog.new_reg(), Reg(1));
        assert_eq!(prog.new_lab(), Lab(0));
        assert_eq!(prog.new_lab(), Lab(1));
    }

    #[test]
    fn homes_are_stable() {
        let mut prog = QuadProgram::new();
        let x: Name = Rc::from("x");
        let y: Name = Rc::from("y");

        let rx = prog.reg_for(&x);
        let ry = prog.reg_for(&y);

        assert_ne!(rx, ry);
        assert_eq!(prog.reg_for(&x), rx);
        assert_eq!(prog.reg_for(&y), ry);
    }

    #[test]
    fn emission_preserves_order() {
        let mut prog = QuadProgram::new();
        let r = prog.new_reg();

        prog.emit(Quad::seti(r, 1));
        prog.emit(Quad::ret());

        assert_eq!(prog.quads()[0].op, Op::Seti);
        assert_eq!(prog.quads()[1].op, Op::Return);
    }

    #[test]
    fn display_forms() {
        let q = Quad::seti(Reg(3), -2);
        assert_eq!(q.to_string(), "seti r3, -2");

        let q = Quad::goto_eq(Lab(5), Reg(1), Reg(2));
        assert_eq!(q.to_string(), "goto_eq L5, r1, r2");

        let q = Quad::store(Reg(4), Reg(7));
        assert_eq!(q.to_string(), "store [r4], r7");
    }
}
