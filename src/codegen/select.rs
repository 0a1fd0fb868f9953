//! Selección de instrucciones por plantillas.
//!
//! El selector recorre la lista de cuádruplas y la cubre con un
//! teselado voraz: en cada posición prueba las plantillas de la
//! tabla en su orden de declaración y emite la primera que calza,
//! avanzando sobre las cuádruplas consumidas. El orden de la tabla
//! codifica prioridad: las plantillas especializadas (inmediatos
//! plegados, multiplicación por potencia de dos, comparación y
//! salto fundidos) preceden a los respaldos generales.
//!
//! Cada plantilla empareja de una a cinco cuádruplas adyacentes.
//! Las ranuras del patrón llevan un chequeo ([`Chk`]) que puede
//! ligar variables de plantilla o exigir igualdad con una ya
//! ligada; la emisión instancia instrucciones cuyos parámetros se
//! derivan de esas variables mediante acciones ([`Act`]).
//!
//! Una cuádrupla sin plantilla aplicable produce una advertencia y
//! se descarta: la salida puede quedar incompleta pero inspeccionable.

use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};

use log::warn;

use crate::quad::{Op, Quad, QuadProgram};

/// Cantidad de variables de plantilla disponibles.
const VARS: usize = 16;

/// Clase de un parámetro de instrucción.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Kind {
    /// Ranura vacía.
    None,
    /// Lee un registro.
    Read,
    /// Escribe un registro.
    Write,
    /// Constante literal (inmediato, etiqueta o desplazamiento).
    Cst,
}

/// Parámetro de una instrucción de máquina.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Param {
    kind: Kind,
    value: i32,
}

impl Param {
    pub const NONE: Param = Param {
        kind: Kind::None,
        value: 0,
    };

    pub fn read(value: i32) -> Param {
        Param {
            kind: Kind::Read,
            value,
        }
    }

    pub fn write(value: i32) -> Param {
        Param {
            kind: Kind::Write,
            value,
        }
    }

    pub fn cst(value: i32) -> Param {
        Param {
            kind: Kind::Cst,
            value,
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn value(&self) -> i32 {
        self.value
    }
}

/// Una instrucción de máquina.
///
/// El formato es texto ensamblador con huecos `%n` que se rellenan
/// con el valor del parámetro `n` al imprimir. Los registros del
/// formato (`R%0`) refieren a registros virtuales hasta que el
/// asignador los reescribe a físicos.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inst {
    fmt: Cow<'static, str>,
    params: [Param; 4],
}

impl Inst {
    pub fn new(fmt: impl Into<Cow<'static, str>>, params: &[Param]) -> Inst {
        assert!(params.len() <= 4, "too many instruction parameters");

        let mut all = [Param::NONE; 4];
        all[..params.len()].copy_from_slice(params);

        Inst {
            fmt: fmt.into(),
            params: all,
        }
    }

    /// Línea de comentario; pasa intacta por el asignador.
    pub fn comment(text: String) -> Inst {
        Inst::new(text, &[])
    }

    pub fn param(&self, index: usize) -> &Param {
        &self.params[index]
    }

    pub fn param_mut(&mut self, index: usize) -> &mut Param {
        &mut self.params[index]
    }

    /// La instrucción es una etiqueta y comienza un bloque básico.
    pub fn is_label(&self) -> bool {
        self.fmt == "L%0:"
    }

    /// La instrucción es un salto y termina un bloque básico.
    pub fn is_branch(&self) -> bool {
        self.fmt.starts_with("\tb")
    }

    pub fn is_comment(&self) -> bool {
        self.fmt.starts_with('@')
    }
}

impl Display for Inst {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        let mut chars = self.fmt.chars();

        while let Some(c) = chars.next() {
            if c != '%' {
                write!(fmt, "{}", c)?;
            } else {
                let index = chars
                    .next()
                    .and_then(|d| d.to_digit(10))
                    .expect("malformed instruction format") as usize;

                write!(fmt, "{}", self.params[index].value())?;
            }
        }

        Ok(())
    }
}

/// Chequeo sobre una ranura de cuádrupla del patrón.
#[derive(Copy, Clone, Debug)]
enum Chk {
    /// Calza siempre.
    Ign,
    /// Calza siempre y liga `vars[i]` al operando.
    Rec(usize),
    /// Calza si el operando es igual a `vars[i]`.
    Eq(usize),
    /// Calza si el operando es codificable como inmediato; liga.
    Imm(usize),
    /// Calza si el operando es potencia de dos; liga.
    Pow2(usize),
    /// Calza si el operando es exactamente el literal.
    Lit(i32),
}

/// Una cuádrupla de patrón.
#[derive(Copy, Clone, Debug)]
struct Pat {
    op: Op,
    d: Chk,
    a: Chk,
    b: Chk,
}

/// Acción que deriva el valor de un parámetro emitido.
#[derive(Copy, Clone, Debug)]
enum Act {
    /// Usa `vars[i]`.
    Copy(usize),
    /// Usa el índice del bit encendido de `vars[i]`.
    Log2(usize),
    /// Usa `32 - vars[i]`, para rotaciones complementadas.
    Sub32(usize),
    /// Acuña un registro virtual fresco en `vars[i]` (una única vez
    /// por emisión) y lo usa.
    Fresh(usize),
}

/// Parámetro de plantilla: clase más acción.
#[derive(Copy, Clone, Debug)]
struct Arg {
    kind: Kind,
    act: Act,
}

/// Plantilla de una instrucción emitida.
#[derive(Copy, Clone, Debug)]
struct Tpl {
    fmt: &'static str,
    args: &'static [Arg],
}

/// Regla de selección: patrón de cuádruplas y emisión.
struct Rule {
    pat: &'static [Pat],
    emit: &'static [Tpl],
}

const fn q(op: Op, d: Chk, a: Chk, b: Chk) -> Pat {
    Pat { op, d, a, b }
}

const fn w(act: Act) -> Arg {
    Arg {
        kind: Kind::Write,
        act,
    }
}

const fn r(act: Act) -> Arg {
    Arg {
        kind: Kind::Read,
        act,
    }
}

const fn c(act: Act) -> Arg {
    Arg {
        kind: Kind::Cst,
        act,
    }
}

/// La tabla de selección. El orden es significativo.
static RULES: &[Rule] = {
    use Act::*;
    use Chk::*;
    use Op::*;

    &[
        // Identidades con cero y uno
        Rule {
            // seti t, 0; add d, a, t  ->  mov d, a
            pat: &[
                q(Seti, Rec(1), Lit(0), Ign),
                q(Add, Rec(2), Rec(3), Eq(1)),
            ],
            emit: &[Tpl {
                fmt: "\tmov R%0, R%1",
                args: &[w(Copy(2)), r(Copy(3))],
            }],
        },
        Rule {
            // seti t, 0; sub d, a, t  ->  mov d, a
            pat: &[
                q(Seti, Rec(1), Lit(0), Ign),
                q(Sub, Rec(2), Rec(3), Eq(1)),
            ],
            emit: &[Tpl {
                fmt: "\tmov R%0, R%1",
                args: &[w(Copy(2)), r(Copy(3))],
            }],
        },
        Rule {
            // seti t, 0; sub d, t, a  ->  neg d, a
            pat: &[
                q(Seti, Rec(1), Lit(0), Ign),
                q(Sub, Rec(2), Eq(1), Rec(3)),
            ],
            emit: &[Tpl {
                fmt: "\tneg R%0, R%1",
                args: &[w(Copy(2)), r(Copy(3))],
            }],
        },
        Rule {
            // seti t, 0; mul d, a, t  ->  mov d, #0
            pat: &[q(Seti, Rec(1), Lit(0), Ign), q(Mul, Rec(2), Ign, Eq(1))],
            emit: &[Tpl {
                fmt: "\tmov R%0, #0",
                args: &[w(Copy(2))],
            }],
        },
        Rule {
            // seti t, 1; mul d, a, t  ->  mov d, a
            pat: &[
                q(Seti, Rec(1), Lit(1), Ign),
                q(Mul, Rec(2), Rec(3), Eq(1)),
            ],
            emit: &[Tpl {
                fmt: "\tmov R%0, R%1",
                args: &[w(Copy(2)), r(Copy(3))],
            }],
        },
        // Operaciones con inmediato plegado
        Rule {
            pat: &[
                q(Seti, Rec(2), Imm(3), Ign),
                q(Add, Rec(0), Rec(1), Eq(2)),
            ],
            emit: &[Tpl {
                fmt: "\tadd R%0, R%1, #%2",
                args: &[w(Copy(0)), r(Copy(1)), c(Copy(3))],
            }],
        },
        Rule {
            pat: &[
                q(Seti, Rec(2), Imm(3), Ign),
                q(Sub, Rec(0), Rec(1), Eq(2)),
            ],
            emit: &[Tpl {
                fmt: "\tsub R%0, R%1, #%2",
                args: &[w(Copy(0)), r(Copy(1)), c(Copy(3))],
            }],
        },
        Rule {
            pat: &[
                q(Seti, Rec(2), Imm(3), Ign),
                q(And, Rec(0), Rec(1), Eq(2)),
            ],
            emit: &[Tpl {
                fmt: "\tand R%0, R%1, #%2",
                args: &[w(Copy(0)), r(Copy(1)), c(Copy(3))],
            }],
        },
        Rule {
            pat: &[q(Seti, Rec(2), Imm(3), Ign), q(Or, Rec(0), Rec(1), Eq(2))],
            emit: &[Tpl {
                fmt: "\torr R%0, R%1, #%2",
                args: &[w(Copy(0)), r(Copy(1)), c(Copy(3))],
            }],
        },
        Rule {
            pat: &[
                q(Seti, Rec(2), Imm(3), Ign),
                q(Xor, Rec(0), Rec(1), Eq(2)),
            ],
            emit: &[Tpl {
                fmt: "\teor R%0, R%1, #%2",
                args: &[w(Copy(0)), r(Copy(1)), c(Copy(3))],
            }],
        },
        Rule {
            pat: &[
                q(Seti, Rec(2), Imm(3), Ign),
                q(Shl, Rec(0), Rec(1), Eq(2)),
            ],
            emit: &[Tpl {
                fmt: "\tmov R%0, R%1, lsl #%2",
                args: &[w(Copy(0)), r(Copy(1)), c(Copy(3))],
            }],
        },
        Rule {
            pat: &[
                q(Seti, Rec(2), Imm(3), Ign),
                q(Shr, Rec(0), Rec(1), Eq(2)),
            ],
            emit: &[Tpl {
                fmt: "\tmov R%0, R%1, lsr #%2",
                args: &[w(Copy(0)), r(Copy(1)), c(Copy(3))],
            }],
        },
        Rule {
            pat: &[
                q(Seti, Rec(2), Imm(3), Ign),
                q(Ror, Rec(0), Rec(1), Eq(2)),
            ],
            emit: &[Tpl {
                fmt: "\tror R%0, R%1, #%2",
                args: &[w(Copy(0)), r(Copy(1)), c(Copy(3))],
            }],
        },
        Rule {
            // Rotar a la izquierda por constante es rotar a la
            // derecha por el complemento
            pat: &[
                q(Seti, Rec(2), Imm(3), Ign),
                q(Rol, Rec(0), Rec(1), Eq(2)),
            ],
            emit: &[Tpl {
                fmt: "\tror R%0, R%1, #%2",
                args: &[w(Copy(0)), r(Copy(1)), c(Sub32(3))],
            }],
        },
        // Saltos fundidos con su etiqueta o comparación
        Rule {
            // goto L; L:  ->  L:
            pat: &[q(Goto, Ign, Rec(0), Ign), q(Lab, Ign, Eq(0), Ign)],
            emit: &[Tpl {
                fmt: "L%0:",
                args: &[c(Copy(0))],
            }],
        },
        Rule {
            // goto_eq L, a, b; goto M; L:  ->  cmp a, b; bne M; L:
            pat: &[
                q(GotoEq, Rec(0), Rec(1), Rec(2)),
                q(Goto, Ign, Rec(3), Ign),
                q(Lab, Ign, Eq(0), Ign),
            ],
            emit: &[
                Tpl {
                    fmt: "\tcmp R%0, R%1",
                    args: &[r(Copy(1)), r(Copy(2))],
                },
                Tpl {
                    fmt: "\tbne L%0",
                    args: &[c(Copy(3))],
                },
                Tpl {
                    fmt: "L%0:",
                    args: &[c(Copy(0))],
                },
            ],
        },
        Rule {
            pat: &[
                q(GotoNe, Rec(0), Rec(1), Rec(2)),
                q(Goto, Ign, Rec(3), Ign),
                q(Lab, Ign, Eq(0), Ign),
            ],
            emit: &[
                Tpl {
                    fmt: "\tcmp R%0, R%1",
                    args: &[r(Copy(1)), r(Copy(2))],
                },
                Tpl {
                    fmt: "\tbeq L%0",
                    args: &[c(Copy(3))],
                },
                Tpl {
                    fmt: "L%0:",
                    args: &[c(Copy(0))],
                },
            ],
        },
        Rule {
            pat: &[
                q(GotoLt, Rec(0), Rec(1), Rec(2)),
                q(Goto, Ign, Rec(3), Ign),
                q(Lab, Ign, Eq(0), Ign),
            ],
            emit: &[
                Tpl {
                    fmt: "\tcmp R%0, R%1",
                    args: &[r(Copy(1)), r(Copy(2))],
                },
                Tpl {
                    fmt: "\tbge L%0",
                    args: &[c(Copy(3))],
                },
                Tpl {
                    fmt: "L%0:",
                    args: &[c(Copy(0))],
                },
            ],
        },
        Rule {
            pat: &[
                q(GotoLe, Rec(0), Rec(1), Rec(2)),
                q(Goto, Ign, Rec(3), Ign),
                q(Lab, Ign, Eq(0), Ign),
            ],
            emit: &[
                Tpl {
                    fmt: "\tcmp R%0, R%1",
                    args: &[r(Copy(1)), r(Copy(2))],
                },
                Tpl {
                    fmt: "\tbgt L%0",
                    args: &[c(Copy(3))],
                },
                Tpl {
                    fmt: "L%0:",
                    args: &[c(Copy(0))],
                },
            ],
        },
        Rule {
            pat: &[
                q(GotoGt, Rec(0), Rec(1), Rec(2)),
                q(Goto, Ign, Rec(3), Ign),
                q(Lab, Ign, Eq(0), Ign),
            ],
            emit: &[
                Tpl {
                    fmt: "\tcmp R%0, R%1",
                    args: &[r(Copy(1)), r(Copy(2))],
                },
                Tpl {
                    fmt: "\tble L%0",
                    args: &[c(Copy(3))],
                },
                Tpl {
                    fmt: "L%0:",
                    args: &[c(Copy(0))],
                },
            ],
        },
        Rule {
            pat: &[
                q(GotoGe, Rec(0), Rec(1), Rec(2)),
                q(Goto, Ign, Rec(3), Ign),
                q(Lab, Ign, Eq(0), Ign),
            ],
            emit: &[
                Tpl {
                    fmt: "\tcmp R%0, R%1",
                    args: &[r(Copy(1)), r(Copy(2))],
                },
                Tpl {
                    fmt: "\tblt L%0",
                    args: &[c(Copy(3))],
                },
                Tpl {
                    fmt: "L%0:",
                    args: &[c(Copy(0))],
                },
            ],
        },
        // Multiplicación y división por potencias de dos
        Rule {
            pat: &[
                q(Seti, Rec(2), Pow2(3), Ign),
                q(Mul, Rec(0), Rec(1), Eq(2)),
            ],
            emit: &[Tpl {
                fmt: "\tmov R%0, R%1, lsl #%2",
                args: &[w(Copy(0)), r(Copy(1)), c(Log2(3))],
            }],
        },
        Rule {
            pat: &[
                q(Seti, Rec(2), Pow2(3), Ign),
                q(Div, Rec(0), Rec(1), Eq(2)),
            ],
            emit: &[Tpl {
                fmt: "\tmov R%0, R%1, lsr #%2",
                args: &[w(Copy(0)), r(Copy(1)), c(Log2(3))],
            }],
        },
        // Respaldos generales por operación
        Rule {
            pat: &[q(Add, Rec(0), Rec(1), Rec(2))],
            emit: &[Tpl {
                fmt: "\tadd R%0, R%1, R%2",
                args: &[w(Copy(0)), r(Copy(1)), r(Copy(2))],
            }],
        },
        Rule {
            // Inmediato plegado en el operando izquierdo
            pat: &[
                q(Seti, Rec(2), Imm(3), Ign),
                q(Add, Rec(0), Eq(2), Rec(1)),
            ],
            emit: &[Tpl {
                fmt: "\tadd R%0, R%1, #%2",
                args: &[w(Copy(0)), r(Copy(1)), c(Copy(3))],
            }],
        },
        Rule {
            pat: &[q(Sub, Rec(0), Rec(1), Rec(2))],
            emit: &[Tpl {
                fmt: "\tsub R%0, R%1, R%2",
                args: &[w(Copy(0)), r(Copy(1)), r(Copy(2))],
            }],
        },
        Rule {
            // mul exige Rd distinto de Rm; los operandos se invierten
            pat: &[q(Mul, Rec(0), Rec(1), Rec(2))],
            emit: &[Tpl {
                fmt: "\tmul R%0, R%1, R%2",
                args: &[w(Copy(0)), r(Copy(2)), r(Copy(1))],
            }],
        },
        Rule {
            pat: &[q(Div, Rec(0), Rec(1), Rec(2))],
            emit: &[Tpl {
                fmt: "\tsdiv R%0, R%1, R%2",
                args: &[w(Copy(0)), r(Copy(1)), r(Copy(2))],
            }],
        },
        Rule {
            // a % b = a - (a / b) * b, con dos temporales frescos
            pat: &[q(Mod, Rec(0), Rec(1), Rec(2))],
            emit: &[
                Tpl {
                    fmt: "\tsdiv R%0, R%1, R%2",
                    args: &[w(Fresh(3)), r(Copy(1)), r(Copy(2))],
                },
                Tpl {
                    fmt: "\tmul R%0, R%1, R%2",
                    args: &[w(Fresh(4)), r(Copy(3)), r(Copy(2))],
                },
                Tpl {
                    fmt: "\tsub R%0, R%1, R%2",
                    args: &[w(Copy(0)), r(Copy(1)), r(Copy(4))],
                },
            ],
        },
        Rule {
            pat: &[q(And, Rec(0), Rec(1), Rec(2))],
            emit: &[Tpl {
                fmt: "\tand R%0, R%1, R%2",
                args: &[w(Copy(0)), r(Copy(1)), r(Copy(2))],
            }],
        },
        Rule {
            pat: &[q(Or, Rec(0), Rec(1), Rec(2))],
            emit: &[Tpl {
                fmt: "\torr R%0, R%1, R%2",
                args: &[w(Copy(0)), r(Copy(1)), r(Copy(2))],
            }],
        },
        Rule {
            pat: &[q(Xor, Rec(0), Rec(1), Rec(2))],
            emit: &[Tpl {
                fmt: "\teor R%0, R%1, R%2",
                args: &[w(Copy(0)), r(Copy(1)), r(Copy(2))],
            }],
        },
        Rule {
            pat: &[q(Shl, Rec(0), Rec(1), Rec(2))],
            emit: &[Tpl {
                fmt: "\tmov R%0, R%1, lsl R%2",
                args: &[w(Copy(0)), r(Copy(1)), r(Copy(2))],
            }],
        },
        Rule {
            pat: &[q(Shr, Rec(0), Rec(1), Rec(2))],
            emit: &[Tpl {
                fmt: "\tmov R%0, R%1, lsr R%2",
                args: &[w(Copy(0)), r(Copy(1)), r(Copy(2))],
            }],
        },
        Rule {
            pat: &[q(Ror, Rec(0), Rec(1), Rec(2))],
            emit: &[Tpl {
                fmt: "\tror R%0, R%1, R%2",
                args: &[w(Copy(0)), r(Copy(1)), r(Copy(2))],
            }],
        },
        Rule {
            // rol d, a, n = ror d, a, 32 - n
            pat: &[q(Rol, Rec(0), Rec(1), Rec(2))],
            emit: &[
                Tpl {
                    fmt: "\trsb R%0, R%1, #32",
                    args: &[w(Fresh(3)), r(Copy(2))],
                },
                Tpl {
                    fmt: "\tror R%0, R%1, R%2",
                    args: &[w(Copy(0)), r(Copy(1)), r(Copy(3))],
                },
            ],
        },
        Rule {
            pat: &[q(Neg, Rec(0), Rec(1), Ign)],
            emit: &[Tpl {
                fmt: "\tneg R%0, R%1",
                args: &[w(Copy(0)), r(Copy(1))],
            }],
        },
        Rule {
            pat: &[q(Inv, Rec(0), Rec(1), Ign)],
            emit: &[Tpl {
                fmt: "\tmvn R%0, R%1",
                args: &[w(Copy(0)), r(Copy(1))],
            }],
        },
        Rule {
            pat: &[q(Load, Rec(0), Rec(1), Ign)],
            emit: &[Tpl {
                fmt: "\tldr R%0, [R%1]",
                args: &[w(Copy(0)), r(Copy(1))],
            }],
        },
        Rule {
            pat: &[q(Store, Rec(0), Rec(1), Ign)],
            emit: &[Tpl {
                fmt: "\tstr R%0, [R%1]",
                args: &[r(Copy(1)), r(Copy(0))],
            }],
        },
        Rule {
            pat: &[q(Goto, Ign, Rec(0), Ign)],
            emit: &[Tpl {
                fmt: "\tb L%0",
                args: &[c(Copy(0))],
            }],
        },
        Rule {
            pat: &[q(GotoEq, Rec(0), Rec(1), Rec(2))],
            emit: &[
                Tpl {
                    fmt: "\tcmp R%0, R%1",
                    args: &[r(Copy(1)), r(Copy(2))],
                },
                Tpl {
                    fmt: "\tbeq L%0",
                    args: &[c(Copy(0))],
                },
            ],
        },
        Rule {
            pat: &[q(GotoNe, Rec(0), Rec(1), Rec(2))],
            emit: &[
                Tpl {
                    fmt: "\tcmp R%0, R%1",
                    args: &[r(Copy(1)), r(Copy(2))],
                },
                Tpl {
                    fmt: "\tbne L%0",
                    args: &[c(Copy(0))],
                },
            ],
        },
        Rule {
            pat: &[q(GotoLt, Rec(0), Rec(1), Rec(2))],
            emit: &[
                Tpl {
                    fmt: "\tcmp R%0, R%1",
                    args: &[r(Copy(1)), r(Copy(2))],
                },
                Tpl {
                    fmt: "\tblt L%0",
                    args: &[c(Copy(0))],
                },
            ],
        },
        Rule {
            pat: &[q(GotoLe, Rec(0), Rec(1), Rec(2))],
            emit: &[
                Tpl {
                    fmt: "\tcmp R%0, R%1",
                    args: &[r(Copy(1)), r(Copy(2))],
                },
                Tpl {
                    fmt: "\tble L%0",
                    args: &[c(Copy(0))],
                },
            ],
        },
        Rule {
            pat: &[q(GotoGt, Rec(0), Rec(1), Rec(2))],
            emit: &[
                Tpl {
                    fmt: "\tcmp R%0, R%1",
                    args: &[r(Copy(1)), r(Copy(2))],
                },
                Tpl {
                    fmt: "\tbgt L%0",
                    args: &[c(Copy(0))],
                },
            ],
        },
        Rule {
            pat: &[q(GotoGe, Rec(0), Rec(1), Rec(2))],
            emit: &[
                Tpl {
                    fmt: "\tcmp R%0, R%1",
                    args: &[r(Copy(1)), r(Copy(2))],
                },
                Tpl {
                    fmt: "\tbge L%0",
                    args: &[c(Copy(0))],
                },
            ],
        },
        // Soporte restante
        Rule {
            pat: &[q(Call, Rec(0), Ign, Ign)],
            emit: &[Tpl {
                fmt: "\tbl L%0",
                args: &[c(Copy(0))],
            }],
        },
        Rule {
            pat: &[q(Lab, Ign, Rec(0), Ign)],
            emit: &[Tpl {
                fmt: "L%0:",
                args: &[c(Copy(0))],
            }],
        },
        Rule {
            pat: &[q(Set, Rec(0), Rec(1), Ign)],
            emit: &[Tpl {
                fmt: "\tmov R%0, R%1",
                args: &[w(Copy(0)), r(Copy(1))],
            }],
        },
        Rule {
            pat: &[q(Seti, Rec(0), Imm(1), Ign)],
            emit: &[Tpl {
                fmt: "\tmov R%0, #%1",
                args: &[w(Copy(0)), c(Copy(1))],
            }],
        },
        Rule {
            // Constante no codificable: carga desde el pool de literales
            pat: &[q(Seti, Rec(0), Rec(1), Ign)],
            emit: &[Tpl {
                fmt: "\tldr R%0, =%1",
                args: &[w(Copy(0)), c(Copy(1))],
            }],
        },
        Rule {
            pat: &[q(Return, Ign, Ign, Ign)],
            emit: &[Tpl {
                fmt: "\tbx LR",
                args: &[],
            }],
        },
        Rule {
            pat: &[q(Nop, Ign, Ign, Ign)],
            emit: &[Tpl {
                fmt: "\tnop",
                args: &[],
            }],
        },
    ]
};

/// Determina si una constante es codificable como inmediato ARM:
/// cero, o un valor de 8 bits rotado a la derecha una cantidad par.
pub fn is_immediate(x: u32) -> bool {
    x == 0 || (0..16).any(|s| (x.rotate_right(2 * s) & 0xFFFF_FF00) == 0)
}

fn match_param(check: Chk, arg: u32, vars: &mut [u32; VARS]) -> bool {
    match check {
        Chk::Ign => true,

        Chk::Rec(i) => {
            vars[i] = arg;
            true
        }

        Chk::Eq(i) => vars[i] == arg,

        Chk::Imm(i) => {
            if is_immediate(arg) {
                vars[i] = arg;
                true
            } else {
                false
            }
        }

        Chk::Pow2(i) => {
            if arg.count_ones() == 1 {
                vars[i] = arg;
                true
            } else {
                false
            }
        }

        Chk::Lit(value) => arg == value as u32,
    }
}

fn match_quad(pat: &Pat, quad: &Quad, vars: &mut [u32; VARS]) -> bool {
    pat.op == quad.op
        && match_param(pat.d, quad.d, vars)
        && match_param(pat.a, quad.a, vars)
        && match_param(pat.b, quad.b, vars)
}

/// El patrón completo debe caber en las cuádruplas restantes.
fn matches_at(rule: &Rule, quads: &[Quad], vars: &mut [u32; VARS]) -> bool {
    if rule.pat.len() > quads.len() {
        return false;
    }

    rule.pat
        .iter()
        .zip(quads)
        .all(|(pat, quad)| match_quad(pat, quad, vars))
}

fn instantiate(
    tpl: &Tpl,
    vars: &mut [u32; VARS],
    minted: &mut [bool; VARS],
    next_reg: &mut u32,
) -> Inst {
    let mut params = [Param::NONE; 4];

    for (slot, arg) in tpl.args.iter().enumerate() {
        let value = match arg.act {
            Act::Copy(i) => vars[i] as i32,
            Act::Log2(i) => vars[i].trailing_zeros() as i32,
            Act::Sub32(i) => 32 - vars[i] as i32,
            Act::Fresh(i) => {
                if !minted[i] {
                    vars[i] = *next_reg;
                    *next_reg += 1;
                    minted[i] = true;
                }
                vars[i] as i32
            }
        };

        params[slot] = Param {
            kind: arg.kind,
            value,
        };
    }

    Inst {
        fmt: Cow::Borrowed(tpl.fmt),
        params,
    }
}

/// Cubre el programa de cuádruplas con la tabla de plantillas.
///
/// Los comentarios de posición registrados en el programa se
/// intercalan como líneas `@` antes de las instrucciones de la
/// cuádrupla comentada.
pub fn select(prog: &QuadProgram) -> Vec<Inst> {
    let quads = prog.quads();
    let mut insts = Vec::new();
    let mut vars = [0u32; VARS];
    let mut next_reg = prog.reg_count();
    let mut comments = prog.comments().iter().peekable();

    let mut i = 0;
    while i < quads.len() {
        while let Some((index, pos)) = comments.peek() {
            if *index <= i {
                insts.push(Inst::comment(format!("@ {}", pos)));
                comments.next();
            } else {
                break;
            }
        }

        match RULES
            .iter()
            .find(|rule| matches_at(rule, &quads[i..], &mut vars))
        {
            Some(rule) => {
                let mut minted = [false; VARS];
                for tpl in rule.emit {
                    insts.push(instantiate(tpl, &mut vars, &mut minted, &mut next_reg));
                }
                i += rule.pat.len();
            }

            None => {
                warn!("cannot translate {}", quads[i]);
                i += 1;
            }
        }
    }

    insts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quad::{Lab, Quad, Reg};

    fn program(quads: &[Quad]) -> QuadProgram {
        let mut prog = QuadProgram::new();

        // Los registros de estas pruebas son pequeños; 16 cubre todos
        for _ in 0..16 {
            prog.new_reg();
        }

        for quad in quads {
            prog.emit(*quad);
        }
        prog
    }

    fn lines(insts: &[Inst]) -> Vec<String> {
        insts.iter().map(Inst::to_string).collect()
    }

    #[test]
    fn immediate_encoding_rule() {
        assert!(is_immediate(0));
        assert!(is_immediate(0xFF));
        assert!(is_immediate(0x3FC)); // 0xFF << 2
        assert!(is_immediate(0xFF00_0000));
        assert!(is_immediate(0xF000_000F)); // 0xFF ror 4

        // Bits 1 y 8: la ventana de 8 bits requeriría rotación impar
        assert!(!is_immediate(0x102));
        assert!(!is_immediate(0x1FF)); // nueve bits seguidos
        assert!(!is_immediate(0xFFFF_FFFF));
    }

    #[test]
    fn power_of_two_multiply_becomes_shift() {
        let prog = program(&[
            Quad::seti(Reg(2), 8),
            Quad::mul(Reg(0), Reg(1), Reg(2)),
        ]);

        assert_eq!(lines(&select(&prog)), vec!["\tmov R0, R1, lsl #3"]);
    }

    #[test]
    fn power_of_two_divide_becomes_shift() {
        let prog = program(&[
            Quad::seti(Reg(2), 4),
            Quad::div(Reg(0), Reg(1), Reg(2)),
        ]);

        assert_eq!(lines(&select(&prog)), vec!["\tmov R0, R1, lsr #2"]);
    }

    #[test]
    fn compare_branch_fusion() {
        let prog = program(&[
            Quad::goto_eq(Lab(5), Reg(1), Reg(2)),
            Quad::goto(Lab(9)),
            Quad::lab(Lab(5)),
        ]);

        assert_eq!(
            lines(&select(&prog)),
            vec!["\tcmp R1, R2", "\tbne L9", "L5:"]
        );
    }

    #[test]
    fn fused_le_inverts_to_bgt() {
        let prog = program(&[
            Quad::goto_le(Lab(1), Reg(1), Reg(2)),
            Quad::goto(Lab(2)),
            Quad::lab(Lab(1)),
        ]);

        assert_eq!(
            lines(&select(&prog)),
            vec!["\tcmp R1, R2", "\tbgt L2", "L1:"]
        );
    }

    #[test]
    fn jump_to_next_label_folds_away() {
        let prog = program(&[Quad::goto(Lab(3)), Quad::lab(Lab(3))]);
        assert_eq!(lines(&select(&prog)), vec!["L3:"]);
    }

    #[test]
    fn add_immediate_folds() {
        let prog = program(&[
            Quad::seti(Reg(2), 5),
            Quad::add(Reg(0), Reg(1), Reg(2)),
        ]);

        assert_eq!(lines(&select(&prog)), vec!["\tadd R0, R1, #5"]);
    }

    #[test]
    fn add_immediate_on_the_left_commutes() {
        let prog = program(&[
            Quad::seti(Reg(2), 5),
            Quad::add(Reg(0), Reg(2), Reg(1)),
        ]);

        assert_eq!(lines(&select(&prog)), vec!["\tadd R0, R1, #5"]);
    }

    #[test]
    fn add_zero_is_a_move() {
        let prog = program(&[
            Quad::seti(Reg(2), 0),
            Quad::add(Reg(0), Reg(1), Reg(2)),
        ]);

        assert_eq!(lines(&select(&prog)), vec!["\tmov R0, R1"]);
    }

    #[test]
    fn subtract_from_zero_negates() {
        let prog = program(&[
            Quad::seti(Reg(2), 0),
            Quad::sub(Reg(0), Reg(2), Reg(1)),
        ]);

        assert_eq!(lines(&select(&prog)), vec!["\tneg R0, R1"]);
    }

    #[test]
    fn multiply_by_one_is_a_move() {
        let prog = program(&[
            Quad::seti(Reg(2), 1),
            Quad::mul(Reg(0), Reg(1), Reg(2)),
        ]);

        assert_eq!(lines(&select(&prog)), vec!["\tmov R0, R1"]);
    }

    #[test]
    fn unencodable_constant_uses_literal_pool() {
        let prog = program(&[Quad::seti(Reg(0), 0x1234_5678)]);
        assert_eq!(lines(&select(&prog)), vec!["\tldr R0, =305419896"]);
    }

    #[test]
    fn encodable_constant_uses_mov() {
        let prog = program(&[Quad::seti(Reg(0), 0xFF)]);
        assert_eq!(lines(&select(&prog)), vec!["\tmov R0, #255"]);
    }

    #[test]
    fn modulo_expands_with_fresh_scratch_registers() {
        let prog = program(&[Quad::modulo(Reg(5), Reg(1), Reg(2))]);
        let watermark = prog.reg_count();

        let insts = select(&prog);
        let expected = vec![
            format!("\tsdiv R{}, R1, R2", watermark),
            format!("\tmul R{}, R{}, R2", watermark + 1, watermark),
            format!("\tsub R5, R1, R{}", watermark + 1),
        ];

        assert_eq!(lines(&insts), expected);
    }

    #[test]
    fn rotate_left_complements_the_count() {
        let prog = program(&[Quad::rol(Reg(0), Reg(1), Reg(2))]);
        let watermark = prog.reg_count();

        let insts = select(&prog);
        assert_eq!(
            lines(&insts),
            vec![
                format!("\trsb R{}, R2, #32", watermark),
                format!("\tror R0, R1, R{}", watermark),
            ]
        );
    }

    #[test]
    fn rotate_left_by_constant_becomes_ror() {
        let prog = program(&[
            Quad::seti(Reg(2), 3),
            Quad::rol(Reg(0), Reg(1), Reg(2)),
        ]);

        assert_eq!(lines(&select(&prog)), vec!["\tror R0, R1, #29"]);
    }

    #[test]
    fn store_swaps_operand_order() {
        let prog = program(&[Quad::store(Reg(4), Reg(7))]);
        assert_eq!(lines(&select(&prog)), vec!["\tstr R7, [R4]"]);
    }

    #[test]
    fn selection_is_deterministic() {
        let prog = program(&[
            Quad::seti(Reg(2), 8),
            Quad::mul(Reg(0), Reg(1), Reg(2)),
            Quad::goto_eq(Lab(5), Reg(1), Reg(2)),
            Quad::goto(Lab(9)),
            Quad::lab(Lab(5)),
            Quad::modulo(Reg(6), Reg(0), Reg(1)),
            Quad::ret(),
        ]);

        assert_eq!(lines(&select(&prog)), lines(&select(&prog)));
    }

    #[test]
    fn block_boundary_predicates() {
        let prog = program(&[
            Quad::lab(Lab(0)),
            Quad::goto(Lab(1)),
            Quad::lab(Lab(1)),
            Quad::ret(),
        ]);

        let insts = select(&prog);

        // goto L1; L1: se funde, quedando etiqueta, etiqueta, bx
        assert!(insts[0].is_label());
        assert!(insts[1].is_label());
        assert!(insts[2].is_branch());
        assert!(!insts[0].is_branch());
    }
}
