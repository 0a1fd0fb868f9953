//! Compilador de IOML.
//!
//! IOML describe máquinas de estados dirigidas por eventos sobre
//! registros E/S mapeados en memoria. La compilación procede por
//! etapas estrictamente secuenciales: análisis léxico y sintáctico
//! ([`lex`], [`parse`]), resolución y plegado de constantes
//! ([`ast`], reducción), generación de cuádruplas ([`gen`]),
//! selección de instrucciones y asignación de registros
//! ([`codegen`]), con salida en ensamblador de la familia ARM.

pub mod ast;
pub mod codegen;
pub mod gen;
pub mod lex;
pub mod parse;
pub mod quad;
pub mod source;

mod eval;
mod reduce;
