//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone el texto fuente
//! en unidades léxicas denominadas tokens. Los espacios en blanco y
//! los comentarios `//` se descartan durante esta operación. Cada token
//! emitido está asociado a la línea del código fuente donde comienza,
//! lo cual permite rastrear errores tanto en los tokens como en
//! constructos más elevados de fases posteriores.
//!
//! # Contenido de un token
//! Este lexer no produce lexemas para casos donde no son necesarios.
//! Operadores, puntuación y palabras clave se identifican por el hecho
//! de lo que son y no incluyen lexemas. Los identificadores sí incluyen
//! su lexema original. Las constantes literales se resuelven a sus
//! valores en vez de preservar sus lexemas.
//!
//! # Reglas importantes del lenguaje
//! - Los identificadores comienzan con una letra o `'_'`.
//! - Las constantes enteras son decimales o hexadecimales (`0x...`).
//! - Las constantes decimales se limitan al rango de `i32`; las
//!   hexadecimales al rango de `u32` (direcciones de registros).
//!
//! # Errores
//! El lexer es capaz de recuperarse parcialmente de condiciones de
//! error, descartando la línea donde ocurren. Esto permite reportar
//! más de un error por ejecución, pero no permite el avance a las
//! demás fases de la compilación.

use crate::source::{Located, Pos};
use std::{
    fmt::{self, Display},
    rc::Rc,
    str::{Chars, FromStr},
};

use thiserror::Error;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Carácter desconocido o inesperado en el flujo de entrada.
    #[error("Bad character {0:?} in input stream")]
    BadChar(char),

    /// Se esperaba al menos un dígito hexadecimal tras `0x`.
    #[error("Expected hexadecimal digit")]
    BadHex,

    /// Una constante entera se encuentra fuera de rango.
    #[error("Integer literal overflow")]
    IntOverflow,
}

/// Objeto resultante del análisis léxico.
///
/// Un token contiene suficiente información para describir completamente
/// a una entidad léxica en el programa fuente.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identificador.
    Id(Rc<str>),

    /// Palabra clave.
    Keyword(Keyword),

    /// Literal de entero, decimal o hexadecimal.
    IntLiteral(u32),

    /// `=`
    Assign,

    /// `;`
    Semicolon,

    /// `:`
    Colon,

    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// `{`
    OpenCurly,

    /// `}`
    CloseCurly,

    /// `[`
    OpenBracket,

    /// `]`
    CloseBracket,

    /// `+`
    Plus,

    /// `-`
    Minus,

    /// `*`
    Times,

    /// `/`
    Slash,

    /// `%`
    Percent,

    /// `&`
    Amp,

    /// `|`
    Pipe,

    /// `^`
    Caret,

    /// `~`
    Tilde,

    /// `!`
    Bang,

    /// `<<`
    Shl,

    /// `>>`
    Shr,

    /// `<<<`
    Rol,

    /// `>>>`
    Ror,

    /// `==`
    EqEq,

    /// `!=`
    Ne,

    /// `<`
    Lt,

    /// `<=`
    Le,

    /// `>`
    Gt,

    /// `>=`
    Ge,

    /// `&&`
    AndAnd,

    /// `||`
    OrOr,
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Token::*;

        match self {
            Id(id) => write!(fmt, "identifier `{}`", id),
            Keyword(keyword) => write!(fmt, "keyword `{}`", keyword),
            IntLiteral(integer) => write!(fmt, "literal `{}`", integer),
            Assign => fmt.write_str("`=`"),
            Semicolon => fmt.write_str("`;`"),
            Colon => fmt.write_str("`:`"),
            OpenParen => fmt.write_str("`(`"),
            CloseParen => fmt.write_str("`)`"),
            OpenCurly => fmt.write_str("`{`"),
            CloseCurly => fmt.write_str("`}`"),
            OpenBracket => fmt.write_str("`[`"),
            CloseBracket => fmt.write_str("`]`"),
            Plus => fmt.write_str("`+`"),
            Minus => fmt.write_str("`-`"),
            Times => fmt.write_str("`*`"),
            Slash => fmt.write_str("`/`"),
            Percent => fmt.write_str("`%`"),
            Amp => fmt.write_str("`&`"),
            Pipe => fmt.write_str("`|`"),
            Caret => fmt.write_str("`^`"),
            Tilde => fmt.write_str("`~`"),
            Bang => fmt.write_str("`!`"),
            Shl => fmt.write_str("`<<`"),
            Shr => fmt.write_str("`>>`"),
            Rol => fmt.write_str("`<<<`"),
            Ror => fmt.write_str("`>>>`"),
            EqEq => fmt.write_str("`==`"),
            Ne => fmt.write_str("`!=`"),
            Lt => fmt.write_str("`<`"),
            Le => fmt.write_str("`<=`"),
            Gt => fmt.write_str("`>`"),
            Ge => fmt.write_str("`>=`"),
            AndAnd => fmt.write_str("`&&`"),
            OrOr => fmt.write_str("`||`"),
        }
    }
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Const,
    Var,
    Reg,
    Sig,
    Auto,
    State,
    Init,
    Entry,
    When,
    If,
    Else,
    Goto,
    Stop,
}

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Keyword::*;
        let string = match self {
            Const => "const",
            Var   => "var",
            Reg   => "reg",
            Sig   => "sig",
            Auto  => "auto",
            State => "state",
            Init  => "init",
            Entry => "entry",
            When  => "when",
            If    => "if",
            Else  => "else",
            Goto  => "goto",
            Stop  => "stop",
        };

        fmt.write_str(string)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        use Keyword::*;

        const KEYWORDS: &[(&str, Keyword)] = &[
            ("const", Const),
            ("var",   Var),
            ("reg",   Reg),
            ("sig",   Sig),
            ("auto",  Auto),
            ("state", State),
            ("init",  Init),
            ("entry", Entry),
            ("when",  When),
            ("if",    If),
            ("else",  Else),
            ("goto",  Goto),
            ("stop",  Stop),
        ];

        KEYWORDS
            .iter()
            .find(|&&(name, _)| name == string)
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Máquina de estados para análisis léxico.
///
/// Un lexer puede encontrarse en uno de diversos estados. La
/// salida del lexer, así como su siguiente estado, se define
/// a partir de tanto su estado actual como el siguiente carácter
/// encontrado en el flujo de entrada.
pub struct Lexer<'a> {
    source: std::iter::Peekable<Chars<'a>>,
    state: State,
    start: Pos,
    here: Pos,
}

/// Posibles estados del lexer.
enum State {
    /// Estado que ocurre antes de encontrar el inicio de un token.
    Start,

    /// Estado de error; descarta la línea actual.
    Error,

    /// Estado de completitud; siempre emite el token incluido
    /// y pasa a [`State::Start`].
    Complete(Token),

    /// Se encontró `/`; otro `/` inicia un comentario.
    AfterSlash,

    /// Comentario de línea; vuelve a [`State::Start`] en `'\n'`.
    Comment,

    /// Se encontró `'0'`; puede seguir `x` para una constante
    /// hexadecimal o más dígitos decimales.
    Zero,

    /// Constante entera decimal en acumulación.
    Integer(u32),

    /// Se encontró `0x`; debe seguir al menos un dígito.
    HexPrefix,

    /// Constante entera hexadecimal en acumulación.
    Hex(u32),

    /// Término que puede ser un identificador o una palabra clave.
    Word(String),

    /// Se encontró `<`.
    AfterLt,

    /// Se encontró `<<`.
    AfterShl,

    /// Se encontró `>`.
    AfterGt,

    /// Se encontró `>>`.
    AfterShr,

    /// Se encontró `=`.
    AfterEq,

    /// Se encontró `!`.
    AfterBang,

    /// Se encontró `&`.
    AfterAmp,

    /// Se encontró `|`.
    AfterPipe,
}

impl<'a> Lexer<'a> {
    /// Crea un lexer en estado inicial sobre un texto fuente.
    pub fn new(source: &'a str, file: impl Into<Rc<str>>) -> Self {
        let start = Pos::start(file);
        let here = start.clone();

        Lexer {
            source: source.chars().peekable(),
            state: State::Start,
            start,
            here,
        }
    }

    /// Reduce la entrada a sea una secuencia conocida de tokens
    /// infalibles o una secuencia de errores.
    ///
    /// En caso de que ocurra al menos un error, el lexer dejará
    /// de buscar tokens exitosos y comenzará a acumular solamente
    /// errores. El propósito de esta función es permitir la
    /// recolección de múltiples errores léxicos en una misma
    /// ejecución del compilador.
    pub fn try_exhaustive(mut self) -> Result<Vec<Located<Token>>, Vec<Located<LexerError>>> {
        let mut tokens = Vec::new();

        while let Some(result) = self.next() {
            match result {
                Ok(token) => tokens.push(token),
                Err(error) => {
                    drop(tokens);

                    let mut errors = vec![error];
                    errors.extend(self.filter_map(Result::err));

                    return Err(errors);
                }
            }
        }

        Ok(tokens)
    }

    /// Intenta construir un siguiente token.
    fn lex(&mut self) -> Result<Option<Token>, LexerError> {
        use {State::*, Token::*};

        let token = loop {
            let next_char = self.source.peek().copied();

            // La posición de origen se mueve junto a la posición
            // actual siempre que no se haya encontrado una frontera
            // de token
            if let Start = self.state {
                self.start = self.here.clone();
            }

            // Switch table principal, determina cambios de estado
            // y de salida del lexer a partir de combinaciones del
            // estado actual y el siguiente carácter
            match (&mut self.state, next_char) {
                // Condiciones de error: se descarta la línea donde
                // ocurrió el error. Al llegar al final de la línea
                // el lexer se recupera y reinicia.
                (Error, None) => return Ok(None),
                (Error, Some('\n')) => self.state = Start,
                (Error, Some(_)) => (),

                // Tokens triviales
                (Start, None) => return Ok(None),
                (Start, Some(';')) => self.state = Complete(Semicolon),
                (Start, Some(':')) => self.state = Complete(Colon),
                (Start, Some('(')) => self.state = Complete(OpenParen),
                (Start, Some(')')) => self.state = Complete(CloseParen),
                (Start, Some('{')) => self.state = Complete(OpenCurly),
                (Start, Some('}')) => self.state = Complete(CloseCurly),
                (Start, Some('[')) => self.state = Complete(OpenBracket),
                (Start, Some(']')) => self.state = Complete(CloseBracket),
                (Start, Some('+')) => self.state = Complete(Plus),
                (Start, Some('-')) => self.state = Complete(Minus),
                (Start, Some('*')) => self.state = Complete(Times),
                (Start, Some('%')) => self.state = Complete(Percent),
                (Start, Some('^')) => self.state = Complete(Caret),
                (Start, Some('~')) => self.state = Complete(Tilde),

                // Operadores de más de un carácter
                (Start, Some('/')) => self.state = AfterSlash,
                (Start, Some('<')) => self.state = AfterLt,
                (Start, Some('>')) => self.state = AfterGt,
                (Start, Some('=')) => self.state = AfterEq,
                (Start, Some('!')) => self.state = AfterBang,
                (Start, Some('&')) => self.state = AfterAmp,
                (Start, Some('|')) => self.state = AfterPipe,

                // Identificadores y palabras clave
                (Start, Some(c)) if c.is_ascii_alphabetic() || c == '_' => {
                    self.state = Word(c.to_string())
                }

                // Inicio de una constante numérica. `'0'` puede
                // introducir una constante hexadecimal; cualquier
                // otro dígito comienza una decimal. No se consume
                // el dígito, ya que esta lógica está implementada
                // en el estado de acumulación decimal.
                (Start, Some('0')) => self.state = Zero,
                (Start, Some(c)) if c.is_ascii_digit() => {
                    self.state = Integer(0);
                    continue;
                }

                // Espacios en blanco y caracteres inesperados
                (Start, Some(c)) if c.is_ascii_whitespace() => (),
                (Start, Some(c)) => break Err(LexerError::BadChar(c)),

                // Emisión retardada de tokens cualesquiera
                (Complete(value), _) => break Ok(std::mem::replace(value, Plus)),

                // `/` inicia un comentario solo en la forma `//`
                (AfterSlash, Some('/')) => self.state = Comment,
                (AfterSlash, _) => break Ok(Token::Slash),

                // Los comentarios descartan la línea donde ocurren
                (Comment, Some('\n')) => self.state = Start,
                (Comment, Some(_)) => (),
                (Comment, None) => self.state = Start,

                // `0` aislado, `0x...` o decimal con cero inicial
                (Zero, Some(c)) if c == 'x' || c == 'X' => self.state = HexPrefix,
                (Zero, Some(c)) if c.is_ascii_digit() => {
                    self.state = Integer(0);
                    continue;
                }
                (Zero, _) => break Ok(IntLiteral(0)),

                // Acumulación dígito por dígito de constantes decimales,
                // limitadas al rango de i32
                (Integer(accumulated), Some(digit)) if digit.is_ascii_digit() => {
                    let digit = digit.to_digit(10).unwrap();

                    match accumulated
                        .checked_mul(10)
                        .and_then(|n| n.checked_add(digit))
                        .filter(|&n| n <= i32::MAX as u32)
                    {
                        Some(result) => *accumulated = result,
                        None => break Err(LexerError::IntOverflow),
                    }
                }

                // Si sigue algo que no es un dígito, la constante ha terminado
                (Integer(integer), _) => break Ok(IntLiteral(*integer)),

                // `0x` requiere al menos un dígito
                (HexPrefix, Some(digit)) if digit.is_ascii_hexdigit() => {
                    self.state = Hex(0);
                    continue;
                }
                (HexPrefix, _) => break Err(LexerError::BadHex),

                // Acumulación de constantes hexadecimales, hasta u32
                (Hex(accumulated), Some(digit)) if digit.is_ascii_hexdigit() => {
                    let digit = digit.to_digit(16).unwrap();

                    match accumulated
                        .checked_mul(16)
                        .and_then(|n| n.checked_add(digit))
                    {
                        Some(result) => *accumulated = result,
                        None => break Err(LexerError::IntOverflow),
                    }
                }

                (Hex(integer), _) => break Ok(IntLiteral(*integer)),

                // Extensión de términos
                (Word(word), Some(c)) if is_word_char(c) => {
                    word.push(c);
                }

                // Si sigue algo que no puede formar parte del término, ha terminado
                (Word(word), _) => {
                    if let Ok(keyword) = self::Keyword::from_str(word) {
                        break Ok(Keyword(keyword));
                    } else {
                        break Ok(Id(Rc::from(std::mem::take(word).as_str())));
                    }
                }

                // Continuaciones de operadores
                (AfterLt, Some('<')) => self.state = AfterShl,
                (AfterLt, Some('=')) => self.state = Complete(Le),
                (AfterLt, _) => break Ok(Lt),

                (AfterShl, Some('<')) => self.state = Complete(Rol),
                (AfterShl, _) => break Ok(Shl),

                (AfterGt, Some('>')) => self.state = AfterShr,
                (AfterGt, Some('=')) => self.state = Complete(Ge),
                (AfterGt, _) => break Ok(Gt),

                (AfterShr, Some('>')) => self.state = Complete(Ror),
                (AfterShr, _) => break Ok(Shr),

                (AfterEq, Some('=')) => self.state = Complete(EqEq),
                (AfterEq, _) => break Ok(Assign),

                (AfterBang, Some('=')) => self.state = Complete(Ne),
                (AfterBang, _) => break Ok(Bang),

                (AfterAmp, Some('&')) => self.state = Complete(AndAnd),
                (AfterAmp, _) => break Ok(Amp),

                (AfterPipe, Some('|')) => self.state = Complete(OrOr),
                (AfterPipe, _) => break Ok(Pipe),
            }

            // Si no hubo `continue` ni `break`, aquí se consume el
            // carácter que se observó con lookahead anteriormente
            if let Some(c) = self.source.next() {
                if c == '\n' {
                    self.here.newline();
                }
            }
        };

        token.map(Some)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Located<Token>, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.lex() {
            Ok(None) => None,
            Ok(Some(token)) => {
                self.state = State::Start;
                Some(Ok(Located::at(token, self.start.clone())))
            }

            Err(error) => {
                self.state = State::Error;
                Some(Err(Located::at(error, self.here.clone())))
            }
        }
    }
}

/// Determina si un carácter puede pertenecer a un término.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphabetic() || c.is_ascii_digit() || c == '_'
}
