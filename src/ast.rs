//! Árbol de sintaxis abstracta de IOML.
//!
//! Un programa IOML se compone de declaraciones: constantes,
//! variables, registros E/S, señales (un bit de un registro) y
//! autómatas. Cada autómata es una máquina de estados cuyo estado
//! tiene una acción de entrada y una lista ordenada de cláusulas
//! `when` que se sondean en un lazo cerrado.
//!
//! El árbol se representa con tipos suma; no hay jerarquías de
//! herencia ni celdas mutables compartidas. Las referencias entre
//! nodos y declaraciones son por nombre y se resuelven contra la
//! [`SymbolTable`], que es la única dueña de las declaraciones.
//! Las etiquetas de estados no viven en el árbol: el generador
//! construye un mapa nombre → etiqueta por autómata.

use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
    rc::Rc,
};

use thiserror::Error;

use crate::source::{Located, Pos};

/// Nombre de un símbolo.
pub type Name = Rc<str>;

/// Error semántico detectado antes de la generación de código.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SemanticError {
    /// El símbolo ya fue declarado.
    #[error("symbol `{0}` already exists")]
    Duplicate(Name),

    /// Se usó un símbolo nunca declarado.
    #[error("symbol `{0}` is undefined")]
    Undefined(Name),

    /// Una señal debe declararse sobre un registro.
    #[error("`{0}` is not a register")]
    NotARegister(Name),

    /// Una cláusula `when` debe observar una señal.
    #[error("`{0}` is not a signal")]
    NotASignal(Name),

    /// Solo variables y registros admiten asignación.
    #[error("`{0}` cannot be assigned")]
    NotAssignable(Name),

    /// Solo constantes, variables y registros se leen en expresiones.
    #[error("`{0}` cannot be used in an expression")]
    NotAValue(Name),

    /// Un `goto` nombra un estado inexistente en su autómata.
    #[error("unknown state `{0}`")]
    UnknownState(Name),
}

/// Operador unario.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Unop {
    /// Negación aritmética.
    Neg,
    /// Inversión de bits.
    Inv,
}

/// Operador binario.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Binop {
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
}

/// Operador de comparación.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Comp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Una expresión.
#[derive(Clone, Debug)]
pub enum Expr {
    /// Constante literal.
    Const(i32),

    /// Lectura de una declaración (constante, variable o registro).
    Mem(Name),

    /// Operación unaria.
    Unop(Unop, Box<Expr>),

    /// Operación binaria.
    Binop(Binop, Box<Expr>, Box<Expr>),

    /// Extracción del campo de bits `[hi:lo]` de una expresión.
    BitField(Box<Expr>, Box<Expr>, Box<Expr>),
}

/// Una condición de control de flujo.
///
/// Las condiciones no son expresiones: solo aparecen en `if` y se
/// generan por continuaciones (saltos a etiquetas), nunca como un
/// valor en un registro.
#[derive(Clone, Debug)]
pub enum Cond {
    /// Comparación entre dos expresiones.
    Comp(Comp, Expr, Expr),

    /// Negación.
    Not(Box<Cond>),

    /// Conjunción con cortocircuito.
    And(Box<Cond>, Box<Cond>),

    /// Disyunción con cortocircuito.
    Or(Box<Cond>, Box<Cond>),
}

/// Una sentencia.
#[derive(Clone, Debug)]
pub enum Stmt {
    /// No hace nada.
    Nop,

    /// Secuencia de dos sentencias.
    Seq(Box<Stmt>, Box<Stmt>),

    /// Asignación a una variable o registro.
    Set(Pos, Name, Expr),

    /// Asignación al campo de bits `[hi:lo]` de una variable o registro.
    SetField(Pos, Name, Expr, Expr, Expr),

    /// Condicional con rama `else` opcional.
    If(Pos, Cond, Box<Stmt>, Option<Box<Stmt>>),

    /// Transición a otro estado del autómata.
    Goto(Pos, Name),

    /// Detención del autómata.
    Stop(Pos),
}

/// Una declaración que no es un autómata.
#[derive(Clone, Debug)]
pub enum Decl {
    /// Constante con nombre.
    Const(i32),

    /// Variable.
    Var,

    /// Registro E/S mapeado en memoria.
    Reg(u32),

    /// Señal: un bit de un registro.
    Sig {
        /// Nombre del registro subyacente.
        reg: Name,
        /// Índice del bit observado.
        bit: u32,
    },
}

/// Cláusula `when` de un estado.
#[derive(Clone, Debug)]
pub struct When {
    pub pos: Pos,
    /// Si la cláusula dispara con el bit apagado en vez de encendido.
    pub neg: bool,
    /// Señal observada.
    pub sig: Name,
    /// Acción a ejecutar cuando la guarda se cumple.
    pub action: Stmt,
}

/// Estado de un autómata.
#[derive(Clone, Debug)]
pub struct State {
    pub name: Name,
    /// Acción de entrada; se ejecuta una única vez al entrar.
    pub entry: Stmt,
    /// Cláusulas sondeadas en orden dentro del lazo del estado.
    pub whens: Vec<When>,
}

/// Un autómata declarado en el programa.
#[derive(Clone, Debug)]
pub struct Automaton {
    pub name: Name,
    pub pos: Pos,
    /// Sentencia de inicialización, previa al primer estado.
    pub init: Stmt,
    pub states: Vec<State>,
}

/// Tabla de símbolos del programa.
///
/// La tabla toma ownership de cada declaración al insertarla y las
/// libera todas al ser descartada. Los autómatas no viven aquí (son
/// propiedad de la [`Unit`]), pero sus nombres sí se reservan para
/// detectar duplicados.
#[derive(Default, Debug)]
pub struct SymbolTable {
    symbols: HashMap<Name, Decl>,
    reserved: Vec<Name>,
}

impl SymbolTable {
    /// Inserta una declaración, fallando si el nombre ya existe.
    pub fn insert(&mut self, name: Name, decl: Decl) -> Result<(), SemanticError> {
        if self.is_taken(&name) {
            return Err(SemanticError::Duplicate(name));
        }

        self.symbols.insert(name, decl);
        Ok(())
    }

    /// Reserva el nombre de un autómata sin asociarle declaración.
    pub fn reserve(&mut self, name: Name) -> Result<(), SemanticError> {
        if self.is_taken(&name) {
            return Err(SemanticError::Duplicate(name));
        }

        self.reserved.push(name);
        Ok(())
    }

    /// Busca una declaración por nombre.
    pub fn get(&self, name: &str) -> Option<&Decl> {
        self.symbols.get(name)
    }

    fn is_taken(&self, name: &str) -> bool {
        self.symbols.contains_key(name) || self.reserved.iter().any(|r| &**r == name)
    }
}

/// Un programa completo: tabla de símbolos y autómatas en orden
/// de declaración.
#[derive(Debug)]
pub struct Unit {
    pub symbols: SymbolTable,
    pub autos: Vec<Automaton>,
}

impl Unit {
    /// Verifica que todo `goto` nombre un estado existente de su
    /// autómata.
    ///
    /// La resolución efectiva de etiquetas ocurre durante la
    /// generación, a través de un mapa nombre → etiqueta construido
    /// por autómata; aquí solo se valida que ese mapa vaya a estar
    /// completo.
    pub fn fix(&self) -> Result<(), Located<SemanticError>> {
        for auto in &self.autos {
            let states: Vec<&str> = auto.states.iter().map(|s| &*s.name).collect();

            check_stmt(&auto.init, &states)?;
            for state in &auto.states {
                check_stmt(&state.entry, &states)?;
                for when in &state.whens {
                    check_stmt(&when.action, &states)?;
                }
            }
        }

        Ok(())
    }
}

fn check_stmt(stmt: &Stmt, states: &[&str]) -> Result<(), Located<SemanticError>> {
    match stmt {
        Stmt::Seq(a, b) => {
            check_stmt(a, states)?;
            check_stmt(b, states)
        }

        Stmt::If(_, _, then, orelse) => {
            check_stmt(then, states)?;
            match orelse {
                Some(orelse) => check_stmt(orelse, states),
                None => Ok(()),
            }
        }

        Stmt::Goto(pos, name) => {
            if states.contains(&&**name) {
                Ok(())
            } else {
                Err(Located::at(
                    SemanticError::UnknownState(name.clone()),
                    pos.clone(),
                ))
            }
        }

        Stmt::Nop | Stmt::Set(..) | Stmt::SetField(..) | Stmt::Stop(_) => Ok(()),
    }
}

/****** Impresión del árbol ******/

/// Ancho de un nivel de indentación en el dump del AST.
const INDENT: usize = 4;

impl Display for Unit {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&Name> = self.symbols.symbols.keys().collect();
        names.sort();

        for name in names {
            let decl = &self.symbols.symbols[name];
            match decl {
                Decl::Const(v) => writeln!(fmt, "{}: CONST({})", name, v)?,
                Decl::Var => writeln!(fmt, "{}: VAR", name)?,
                Decl::Reg(addr) => writeln!(fmt, "{}: REG(0x{:x})", name, addr)?,
                Decl::Sig { reg, bit } => writeln!(fmt, "{}: SIG({}, {})", name, reg, bit)?,
            }
        }

        for auto in &self.autos {
            writeln!(fmt, "{}: AUTO", auto.name)?;
            fmt_stmt(fmt, &auto.init, 1)?;
            writeln!(fmt)?;

            for state in &auto.states {
                writeln!(fmt, "{}STATE {}:", pad(1), state.name)?;
                fmt_stmt(fmt, &state.entry, 2)?;
                writeln!(fmt)?;

                for when in &state.whens {
                    let neg = if when.neg { "!" } else { "" };
                    writeln!(fmt, "{}WHEN {}{}:", pad(2), neg, when.sig)?;
                    fmt_stmt(fmt, &when.action, 3)?;
                    writeln!(fmt)?;
                }
            }
        }

        Ok(())
    }
}

impl Display for Expr {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt_expr(fmt, self, 0)
    }
}

impl Display for Stmt {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt_stmt(fmt, self, 0)
    }
}

fn pad(indent: usize) -> String {
    " ".repeat(indent * INDENT)
}

fn fmt_stmt(fmt: &mut Formatter<'_>, stmt: &Stmt, indent: usize) -> fmt::Result {
    match stmt {
        Stmt::Nop => write!(fmt, "{}NOP", pad(indent)),

        Stmt::Seq(a, b) => {
            writeln!(fmt, "{}SEQ(", pad(indent))?;
            fmt_stmt(fmt, a, indent + 1)?;
            writeln!(fmt, ",")?;
            fmt_stmt(fmt, b, indent + 1)?;
            write!(fmt, "\n{})", pad(indent))
        }

        Stmt::Set(_, name, expr) => {
            writeln!(fmt, "{}SET({},", pad(indent), name)?;
            fmt_expr(fmt, expr, indent + 1)?;
            write!(fmt, "\n{})", pad(indent))
        }

        Stmt::SetField(_, name, hi, lo, expr) => {
            writeln!(fmt, "{}SET_FIELD({},", pad(indent), name)?;
            fmt_expr(fmt, hi, indent + 1)?;
            writeln!(fmt, ",")?;
            fmt_expr(fmt, lo, indent + 1)?;
            writeln!(fmt, ",")?;
            fmt_expr(fmt, expr, indent + 1)?;
            write!(fmt, "\n{})", pad(indent))
        }

        Stmt::If(_, cond, then, orelse) => {
            writeln!(fmt, "{}IF(", pad(indent))?;
            fmt_cond(fmt, cond, indent + 1)?;
            writeln!(fmt, ",")?;
            fmt_stmt(fmt, then, indent + 1)?;
            writeln!(fmt, ",")?;
            match orelse {
                Some(orelse) => fmt_stmt(fmt, orelse, indent + 1)?,
                None => write!(fmt, "{}NOP", pad(indent + 1))?,
            }
            write!(fmt, "\n{})", pad(indent))
        }

        Stmt::Goto(_, name) => write!(fmt, "{}GOTO({})", pad(indent), name),
        Stmt::Stop(_) => write!(fmt, "{}STOP", pad(indent)),
    }
}

fn fmt_expr(fmt: &mut Formatter<'_>, expr: &Expr, indent: usize) -> fmt::Result {
    match expr {
        // Las constantes grandes suelen ser direcciones o máscaras;
        // se imprimen en hexadecimal
        Expr::Const(v) if *v > 10000 => write!(fmt, "{}CST(0x{:x})", pad(indent), v),
        Expr::Const(v) => write!(fmt, "{}CST({})", pad(indent), v),

        Expr::Mem(name) => write!(fmt, "{}MEM({})", pad(indent), name),

        Expr::Unop(op, arg) => {
            writeln!(fmt, "{}UNOP({:?},", pad(indent), op)?;
            fmt_expr(fmt, arg, indent + 1)?;
            write!(fmt, "\n{})", pad(indent))
        }

        Expr::Binop(op, a, b) => {
            writeln!(fmt, "{}BINOP({:?},", pad(indent), op)?;
            fmt_expr(fmt, a, indent + 1)?;
            writeln!(fmt, ",")?;
            fmt_expr(fmt, b, indent + 1)?;
            write!(fmt, "\n{})", pad(indent))
        }

        Expr::BitField(e, hi, lo) => {
            writeln!(fmt, "{}BITFIELD(", pad(indent))?;
            fmt_expr(fmt, e, indent + 1)?;
            writeln!(fmt, ",")?;
            fmt_expr(fmt, hi, indent + 1)?;
            writeln!(fmt, ",")?;
            fmt_expr(fmt, lo, indent + 1)?;
            write!(fmt, "\n{})", pad(indent))
        }
    }
}

fn fmt_cond(fmt: &mut Formatter<'_>, cond: &Cond, indent: usize) -> fmt::Result {
    match cond {
        Cond::Comp(op, a, b) => {
            writeln!(fmt, "{}COMP({:?},", pad(indent), op)?;
            fmt_expr(fmt, a, indent + 1)?;
            writeln!(fmt, ",")?;
            fmt_expr(fmt, b, indent + 1)?;
            write!(fmt, "\n{})", pad(indent))
        }

        Cond::Not(c) => {
            writeln!(fmt, "{}NOT(", pad(indent))?;
            fmt_cond(fmt, c, indent + 1)?;
            write!(fmt, "\n{})", pad(indent))
        }

        Cond::And(a, b) => {
            writeln!(fmt, "{}AND(", pad(indent))?;
            fmt_cond(fmt, a, indent + 1)?;
            writeln!(fmt, ",")?;
            fmt_cond(fmt, b, indent + 1)?;
            write!(fmt, "\n{})", pad(indent))
        }

        Cond::Or(a, b) => {
            writeln!(fmt, "{}OR(", pad(indent))?;
            fmt_cond(fmt, a, indent + 1)?;
            writeln!(fmt, ",")?;
            fmt_cond(fmt, b, indent + 1)?;
            write!(fmt, "\n{})", pad(indent))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Pos {
        Pos::start("test")
    }

    #[test]
    fn table_rejects_duplicates() {
        let mut table = SymbolTable::default();
        table.insert(Rc::from("x"), Decl::Var).unwrap();

        assert!(matches!(
            table.insert(Rc::from("x"), Decl::Const(1)),
            Err(SemanticError::Duplicate(_))
        ));
        assert!(matches!(
            table.reserve(Rc::from("x")),
            Err(SemanticError::Duplicate(_))
        ));
    }

    #[test]
    fn fix_accepts_known_states() {
        let auto = Automaton {
            name: Rc::from("a"),
            pos: pos(),
            init: Stmt::Nop,
            states: vec![State {
                name: Rc::from("s0"),
                entry: Stmt::Goto(pos(), Rc::from("s0")),
                whens: vec![],
            }],
        };

        let unit = Unit {
            symbols: SymbolTable::default(),
            autos: vec![auto],
        };

        assert!(unit.fix().is_ok());
    }

    #[test]
    fn fix_rejects_unknown_states() {
        let auto = Automaton {
            name: Rc::from("a"),
            pos: pos(),
            init: Stmt::Nop,
            states: vec![State {
                name: Rc::from("s0"),
                entry: Stmt::Nop,
                whens: vec![When {
                    pos: pos(),
                    neg: false,
                    sig: Rc::from("go"),
                    action: Stmt::Goto(pos(), Rc::from("missing")),
                }],
            }],
        };

        let unit = Unit {
            symbols: SymbolTable::default(),
            autos: vec![auto],
        };

        let error = unit.fix().unwrap_err();
        assert!(matches!(error.val(), SemanticError::UnknownState(name) if &**name == "missing"));
    }

    #[test]
    fn print_shows_tree_shape() {
        let stmt = Stmt::Seq(
            Box::new(Stmt::Set(
                pos(),
                Rc::from("x"),
                Expr::Binop(
                    Binop::Add,
                    Box::new(Expr::Const(1)),
                    Box::new(Expr::Mem(Rc::from("y"))),
                ),
            )),
            Box::new(Stmt::Stop(pos())),
        );

        let text = stmt.to_string();
        assert!(text.contains("SEQ("));
        assert!(text.contains("SET(x,"));
        assert!(text.contains("BINOP(Add,"));
        assert!(text.contains("CST(1)"));
        assert!(text.contains("MEM(y)"));
        assert!(text.contains("STOP"));
    }
}
